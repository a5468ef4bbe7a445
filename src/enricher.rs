use crate::api::{AskAsync, ChatClient, RetryAsk, RetryPolicy, TranslateAsk};
use crate::config::{EnrichMode, EnrichmentConfig};
use crate::models::{EnrichedFields, Enrichment};
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Closed category set the analysis backend must pick from.
const TAG_SET: &[&str] = &["military", "nuclear", "economic", "political", "social"];

/// Context shorter than this is useless for analysis; the headline alone
/// carries more signal.
const MIN_CONTEXT_CHARS: usize = 100;

/// Chunk bound for translation bodies, kept under the backend input limit.
const MAX_CHUNK_CHARS: usize = 3900;

/// Translation calls get a second attempt; analysis calls get none (the
/// next scheduled run is the retry, gated by the seen history).
const TRANSLATE_ATTEMPTS: usize = 2;

const INTER_CHUNK_DELAY: Duration = Duration::from_millis(300);

const PLACEHOLDER_IMAGE: &str = "https://placehold.co/800x600?text=News";

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("fence regex"));

/// Strict shape the analysis backend is instructed to emit. A response
/// missing any field fails the decode and falls back wholesale.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    title_localized: String,
    summary: Vec<String>,
    impact: String,
    sentiment: f64,
    tag: String,
}

/// Produces a localized/annotated representation for each item through a
/// pluggable backend, always yielding usable fields via deterministic
/// fallback when the backend is missing, unreachable, or malformed.
pub struct Enricher {
    mode: EnrichMode,
    client: ChatClient,
    language: String,
    summary_points: usize,
    image_endpoint: String,
}

impl Enricher {
    pub fn new(cfg: &EnrichmentConfig) -> Self {
        Self {
            mode: cfg.mode,
            client: ChatClient::new(cfg),
            language: cfg.language.clone(),
            summary_points: cfg.summary_points.max(1),
            image_endpoint: cfg.image_endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Enrich one item. Never raises: every failure path lands on the
    /// tagged fallback variant with complete fields.
    #[instrument(level = "debug", skip_all, fields(title = %truncate_for_log(title, 60)))]
    pub async fn enrich(&self, title: &str, text: &str) -> Enrichment {
        match self.mode {
            EnrichMode::Analysis => self.analyze(title, text).await,
            EnrichMode::Translation => self.translate(title, text).await,
        }
    }

    async fn analyze(&self, title: &str, text: &str) -> Enrichment {
        if !self.client.has_credentials() {
            return Enrichment::Fallback(self.fallback_fields(title, text));
        }

        // A failed scrape leaves little or no text; analyze the headline alone.
        let context = if text.chars().count() > MIN_CONTEXT_CHARS {
            text
        } else {
            title
        };
        let user = format!("HEADLINE: {title}\n\nTEXT: {context}");

        match self.client.complete(&self.analysis_prompt(), &user).await {
            Ok(raw) => match parse_analysis(&raw) {
                Some(payload) => Enrichment::Ok(EnrichedFields {
                    title_localized: payload.title_localized,
                    body_localized: text.to_string(),
                    summary: Some(payload.summary),
                    impact: Some(payload.impact),
                    sentiment: Some(payload.sentiment.clamp(-1.0, 1.0)),
                    tag: Some(payload.tag),
                }),
                None => Enrichment::Fallback(self.fallback_fields(title, text)),
            },
            Err(e) => {
                warn!(error = %e, "Analysis backend call failed; using fallback");
                Enrichment::Fallback(self.fallback_fields(title, text))
            }
        }
    }

    fn analysis_prompt(&self) -> String {
        format!(
            "You are an intelligence analyst. Read the news text provided. \
             Output a strictly valid JSON object with the following fields:\n\
             1. 'title_localized': the headline translated into professional {lang}.\n\
             2. 'summary': an array of {n} short bullet-point strings in {lang} summarizing the event.\n\
             3. 'impact': a single sentence in {lang} explaining the strategic impact.\n\
             4. 'sentiment': a float from -1.0 (critical/negative) to 1.0 (positive).\n\
             5. 'tag': one category from [{tags}], written in {lang}.\n\
             Do not use markdown code blocks. Just the JSON.",
            lang = self.language,
            n = self.summary_points,
            tags = TAG_SET.join(", "),
        )
    }

    async fn translate(&self, title: &str, text: &str) -> Enrichment {
        if !self.client.has_credentials() {
            return Enrichment::Fallback(untranslated_fields(title, text));
        }

        let translator = RetryAsk::new(
            TranslateAsk {
                client: &self.client,
                language: &self.language,
            },
            RetryPolicy::new(TRANSLATE_ATTEMPTS, Duration::from_millis(500)),
        );

        let mut degraded = false;
        let title_localized = match translator.ask(title).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Title translation failed; keeping original");
                degraded = true;
                title.to_string()
            }
        };

        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        let total = chunks.len();
        let mut translated = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            match translator.ask(chunk).await {
                Ok(t) => translated.push(t),
                Err(e) => {
                    warn!(error = %e, chunk = i, "Chunk translation failed; keeping original");
                    degraded = true;
                    translated.push(chunk.clone());
                }
            }
            // Backend rate limits; pause between chunks, not after the last.
            if i + 1 < total {
                sleep(INTER_CHUNK_DELAY).await;
            }
        }
        debug!(chunks = total, degraded, "Translated body");

        let fields = EnrichedFields {
            title_localized,
            body_localized: translated.join("\n\n"),
            summary: None,
            impact: None,
            sentiment: None,
            tag: None,
        };
        if degraded {
            Enrichment::Fallback(fields)
        } else {
            Enrichment::Ok(fields)
        }
    }

    /// Deterministic analysis fallback: original title, generic summary,
    /// neutral sentiment, generic category.
    fn fallback_fields(&self, title: &str, text: &str) -> EnrichedFields {
        EnrichedFields {
            title_localized: title.to_string(),
            body_localized: text.to_string(),
            summary: Some(vec![
                "Full article text could not be retrieved.".to_string(),
                "Automated analysis is unavailable for this item.".to_string(),
            ]),
            impact: Some("No analysis available.".to_string()),
            sentiment: Some(0.0),
            tag: Some("general".to_string()),
        }
    }

    /// Deterministic illustration reference for items without a scraped
    /// lead image. Same title, same URL; a blank title degrades to the
    /// static placeholder.
    pub fn illustration_url(&self, title: &str) -> String {
        let title = title.trim();
        if title.is_empty() {
            return PLACEHOLDER_IMAGE.to_string();
        }
        let prompt = urlencoding::encode(&format!(
            "Editorial illustration, {title}, news context, highly detailed"
        ))
        .into_owned();
        format!(
            "{}/{}?width=800&height=600&nologo=true",
            self.image_endpoint, prompt
        )
    }
}

/// Untranslated passthrough used when the translation backend is absent.
fn untranslated_fields(title: &str, text: &str) -> EnrichedFields {
    EnrichedFields {
        title_localized: title.to_string(),
        body_localized: text.to_string(),
        summary: None,
        impact: None,
        sentiment: None,
        tag: None,
    }
}

/// Strict decode of the backend's JSON report, tolerating incidental
/// markdown fences. Any mismatch means fallback, never an error.
fn parse_analysis(raw: &str) -> Option<AnalysisPayload> {
    let cleaned = strip_wrappers(raw);
    match serde_json::from_str::<AnalysisPayload>(&cleaned) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(
                truncated = looks_truncated(&e),
                error = %e,
                response_preview = %truncate_for_log(&cleaned, 300),
                "Backend returned non-conforming JSON; falling back"
            );
            None
        }
    }
}

/// Remove a surrounding ```json fence if the backend added one anyway.
fn strip_wrappers(raw: &str) -> String {
    let trimmed = raw.trim();
    match FENCE_RE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// Split text on paragraph boundaries into chunks of at most `max_chars`
/// characters, preserving order. A single paragraph over the limit is
/// hard-split on character boundaries.
fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in text.split("\n\n") {
        let para_chars = para.chars().count();

        if para_chars > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let mut piece = String::new();
            let mut piece_chars = 0usize;
            for c in para.chars() {
                piece.push(c);
                piece_chars += 1;
                if piece_chars == max_chars {
                    chunks.push(std::mem::take(&mut piece));
                    piece_chars = 0;
                }
            }
            if !piece.is_empty() {
                chunks.push(piece);
            }
            continue;
        }

        if !current.is_empty() && current_chars + 2 + para_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_chars += 2;
        }
        current.push_str(para);
        current_chars += para_chars;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
