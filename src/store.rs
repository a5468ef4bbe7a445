use crate::models::StoredItem;
use itertools::Itertools;
use std::error::Error;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Load the persisted store. A missing or corrupt file is prior state we
/// can live without, never a fatal condition.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load(path: &Path) -> Vec<StoredItem> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "Could not read store file; treating as empty");
            }
            return Vec::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "Store file is corrupt; treating as empty");
            Vec::new()
        }
    }
}

/// Merge new items ahead of existing ones, deduplicate by final URL (a new
/// item replaces a stored one sharing its URL), sort newest-first and trim
/// to capacity. Pure; the caller persists the result.
pub fn merge_sort_trim(
    new_items: Vec<StoredItem>,
    existing: Vec<StoredItem>,
    capacity: usize,
) -> Vec<StoredItem> {
    let mut merged: Vec<StoredItem> = new_items
        .into_iter()
        .chain(existing)
        .unique_by(|item| item.url.clone())
        .collect();
    // Stable sort: equal timestamps keep the new-first bias of the merge.
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(capacity);
    merged
}

/// Commit a batch of freshly enriched items. An empty batch leaves the
/// store untouched. The write goes to a temp file first and is renamed
/// into place, so a failure mid-write never leaves a truncated store.
#[instrument(level = "info", skip_all, fields(path = %path.display(), new = new_items.len()))]
pub async fn commit(
    path: &Path,
    new_items: Vec<StoredItem>,
    capacity: usize,
) -> Result<usize, Box<dyn Error>> {
    if new_items.is_empty() {
        info!("No new items; store left untouched");
        return Ok(0);
    }

    let existing = load(path).await;
    let merged = merge_sort_trim(new_items, existing, capacity);
    let json = serde_json::to_string_pretty(&merged)?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;

    info!(count = merged.len(), "Wrote store");
    Ok(merged.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(url: &str, timestamp: i64) -> StoredItem {
        StoredItem {
            title_localized: format!("t:{url}"),
            title_original: format!("t:{url}"),
            body_localized: String::new(),
            summary: None,
            impact: None,
            sentiment: Some(0.0),
            tag: None,
            source: "test".to_string(),
            url: url.to_string(),
            image: None,
            published_at: String::new(),
            timestamp,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("news_radar_store_{}_{}.json", std::process::id(), name))
    }

    #[test]
    fn test_merge_into_empty_store() {
        let merged = merge_sort_trim(vec![item("https://a/1", 100)], Vec::new(), 60);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].url, "https://a/1");
    }

    #[test]
    fn test_new_item_replaces_same_url() {
        let existing = vec![item("https://a/1", 100)];
        let merged = merge_sort_trim(vec![item("https://a/1", 200)], existing, 60);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].timestamp, 200);
    }

    #[test]
    fn test_sorted_descending_and_trimmed() {
        let existing = vec![item("https://a/2", 50), item("https://a/3", 300)];
        let new_items = vec![item("https://a/4", 200), item("https://a/5", 10)];
        let merged = merge_sort_trim(new_items, existing, 3);

        assert_eq!(merged.len(), 3);
        let stamps: Vec<i64> = merged.iter().map(|i| i.timestamp).collect();
        assert_eq!(stamps, vec![300, 200, 50]);
        for pair in merged.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn test_equal_timestamps_keep_new_first() {
        let existing = vec![item("https://old", 100)];
        let merged = merge_sort_trim(vec![item("https://new", 100)], existing, 60);
        assert_eq!(merged[0].url, "https://new");
        assert_eq!(merged[1].url, "https://old");
    }

    #[test]
    fn test_no_duplicate_urls_after_merge() {
        let existing = vec![item("https://a/1", 1), item("https://a/2", 2)];
        let new_items = vec![item("https://a/2", 5), item("https://a/3", 4)];
        let merged = merge_sort_trim(new_items, existing, 60);

        let mut urls: Vec<&str> = merged.iter().map(|i| i.url.as_str()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), merged.len());
    }

    #[tokio::test]
    async fn test_commit_roundtrip_and_replacement() {
        let path = temp_path("roundtrip");
        let _ = std::fs::remove_file(&path);

        let stored = commit(&path, vec![item("https://a/1", 100)], 60).await.unwrap();
        assert_eq!(stored, 1);
        let loaded = load(&path).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].timestamp, 100);

        // Same URL, newer timestamp: replacement, not duplication.
        commit(&path, vec![item("https://a/1", 200)], 60).await.unwrap();
        let loaded = load(&path).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].timestamp, 200);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_commit_empty_batch_is_a_noop() {
        let path = temp_path("noop");
        let _ = std::fs::remove_file(&path);

        let stored = commit(&path, Vec::new(), 60).await.unwrap();
        assert_eq!(stored, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_store_loads_empty() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "{ this is not json ]").unwrap();

        let loaded = load(&path).await;
        assert!(loaded.is_empty());

        // And a commit on top of the corrupt file simply starts over.
        commit(&path, vec![item("https://a/9", 9)], 60).await.unwrap();
        assert_eq!(load(&path).await.len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
