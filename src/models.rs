use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single discovered news entry, before any fetching or enrichment.
/// Lives for one run only.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub publisher: String,
    pub published_at: String,
    pub description: Option<String>,
}

/// Result of resolving a discovery link. `body` is `None` when retrieval
/// failed (timeout, non-2xx, network error); `final_url` falls back to the
/// discovery URL when resolution itself failed.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub body: Option<String>,
}

/// Best-effort article content. Both fields may be empty; extraction never
/// fails outright.
#[derive(Debug, Clone, Default)]
pub struct ExtractedArticle {
    pub text: String,
    pub image: Option<String>,
}

/// Fields produced by the enrichment backend (or its fallback).
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedFields {
    pub title_localized: String,
    pub body_localized: String,
    pub summary: Option<Vec<String>>,
    pub impact: Option<String>,
    pub sentiment: Option<f64>,
    pub tag: Option<String>,
}

/// Tagged enrichment result: `Ok` carries backend output, `Fallback` carries
/// the deterministic degraded fields. Both are always usable downstream.
#[derive(Debug, Clone)]
pub enum Enrichment {
    Ok(EnrichedFields),
    Fallback(EnrichedFields),
}

impl Enrichment {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Enrichment::Fallback(_))
    }

    pub fn into_fields(self) -> EnrichedFields {
        match self {
            Enrichment::Ok(f) | Enrichment::Fallback(f) => f,
        }
    }
}

/// The persisted atom of the news store. Created once per successful
/// candidate, never mutated, evicted only by the store's trim step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredItem {
    pub title_localized: String,
    pub title_original: String,
    pub body_localized: String,
    #[serde(default)]
    pub summary: Option<Vec<String>>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub tag: Option<String>,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    pub published_at: String,
    pub timestamp: i64,
}

/// Derive an epoch timestamp from a feed's published string. RSS feeds emit
/// RFC 2822; some providers emit RFC 3339. Anything unparseable maps to the
/// current time so the item still sorts near the top once.
pub fn published_epoch(raw: &str) -> i64 {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|_| Utc::now().timestamp())
}
