use crate::enricher::Enricher;
use crate::extractor;
use crate::fetcher;
use crate::models::{Candidate, StoredItem, published_epoch};
use crate::seen::SeenSet;
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

/// Everything a batch produced: the enriched items, and the URL identities
/// (discovery + resolved, per item) to mark seen once the store commit
/// succeeds.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<StoredItem>,
    pub identities: Vec<String>,
}

/// Drop candidates whose discovery URL was processed in an earlier run,
/// before any network work is spent on them.
pub fn prefilter(candidates: Vec<Candidate>, seen: &SeenSet) -> Vec<Candidate> {
    let before = candidates.len();
    let fresh: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| !seen.contains(&c.url))
        .collect();
    info!(
        fresh = fresh.len(),
        skipped = before - fresh.len(),
        "Pre-filtered candidates against history"
    );
    fresh
}

/// Run the per-candidate pipeline across a bounded pool of concurrent
/// workers. Results are collected in completion order — nothing downstream
/// may assume submission order. Individual failures drop the item, never
/// the batch.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len(), workers = workers))]
pub async fn process_batch(
    candidates: Vec<Candidate>,
    seen: &SeenSet,
    enricher: &Enricher,
    workers: usize,
) -> BatchOutcome {
    let total = candidates.len();
    let results: Vec<Option<(StoredItem, [String; 2])>> = stream::iter(candidates)
        .map(|candidate| process_candidate(candidate, seen, enricher))
        .buffer_unordered(workers.max(1))
        .collect()
        .await;

    let mut outcome = BatchOutcome::default();
    for (item, identities) in results.into_iter().flatten() {
        outcome.items.push(item);
        outcome.identities.extend(identities);
    }
    info!(
        total,
        successful = outcome.items.len(),
        dropped = total - outcome.items.len(),
        "Batch processing complete"
    );
    outcome
}

/// One worker's unit of work: resolve, re-check history under the resolved
/// identity, extract, enrich, assemble. Returns `None` when the item turns
/// out to be already seen; every other path yields an item, degraded or
/// not.
async fn process_candidate(
    candidate: Candidate,
    seen: &SeenSet,
    enricher: &Enricher,
) -> Option<(StoredItem, [String; 2])> {
    let page = fetcher::resolve(&candidate.url).await;

    // The discovery link was fresh, but the resolved article may have been
    // reached through a different discovery URL in an earlier run.
    if seen.contains(&page.final_url) {
        debug!(url = %page.final_url, "Resolved URL already seen; dropping");
        return None;
    }

    let article = extractor::extract(&page);
    // A failed scrape still leaves the feed's own description to work with.
    let body = if article.text.is_empty() {
        candidate.description.clone().unwrap_or_default()
    } else {
        article.text.clone()
    };

    let enrichment = enricher.enrich(&candidate.title, &body).await;
    let degraded = enrichment.is_fallback();
    let fields = enrichment.into_fields();

    let image = article
        .image
        .unwrap_or_else(|| enricher.illustration_url(&candidate.title));

    let item = StoredItem {
        title_localized: fields.title_localized,
        title_original: candidate.title.clone(),
        body_localized: fields.body_localized,
        summary: fields.summary,
        impact: fields.impact,
        sentiment: fields.sentiment,
        tag: fields.tag,
        source: candidate.publisher.clone(),
        url: page.final_url.clone(),
        image: Some(image),
        published_at: candidate.published_at.clone(),
        timestamp: published_epoch(&candidate.published_at),
    };

    info!(
        degraded,
        title = %truncate_for_log(&candidate.title, 40),
        "Processed candidate"
    );
    Some((item, [candidate.url, page.final_url]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidate(url: &str) -> Candidate {
        Candidate {
            title: format!("title for {url}"),
            url: url.to_string(),
            publisher: "pub".to_string(),
            published_at: "Wed, 18 Jun 2025 14:30:00 GMT".to_string(),
            description: None,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "news_radar_pipeline_{}_{}",
            std::process::id(),
            name
        ))
    }

    #[tokio::test]
    async fn test_prefilter_blocks_seen_discovery_urls() {
        let path = temp_path("prefilter");
        let _ = std::fs::remove_file(&path);

        let mut seen = SeenSet::load(path.clone()).await;
        seen.commit(&["https://news.example/seen".to_string()])
            .await
            .unwrap();

        let fresh = prefilter(
            vec![
                candidate("https://news.example/seen"),
                candidate("https://news.example/new"),
            ],
            &seen,
        );

        // The seen candidate never reaches the worker pool, so no fetch is
        // ever issued for it.
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].url, "https://news.example/new");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_prefilter_is_idempotent_once_committed() {
        let path = temp_path("idempotent");
        let _ = std::fs::remove_file(&path);

        let batch = vec![candidate("https://a/1"), candidate("https://a/2")];

        let mut seen = SeenSet::load(path.clone()).await;
        let first = prefilter(batch.clone(), &seen);
        assert_eq!(first.len(), 2);

        // Simulate a successful run committing both identities per item.
        seen.commit(&[
            "https://a/1".to_string(),
            "https://resolved/1".to_string(),
            "https://a/2".to_string(),
            "https://resolved/2".to_string(),
        ])
        .await
        .unwrap();

        // Identical candidate set on the next run yields nothing to do.
        let second = prefilter(batch, &seen);
        assert!(second.is_empty());

        let _ = std::fs::remove_file(&path);
    }
}
