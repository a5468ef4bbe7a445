use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

/// Persistent record of URL identities already processed in earlier runs.
///
/// The backing file is line-oriented, one URL per line, and append-only:
/// entries are never expired or pruned, so the file grows for the lifetime
/// of the deployment. The whole file is loaded at run start for O(1)
/// membership checks; nothing touches it again until the coordinator
/// commits the batch.
pub struct SeenSet {
    path: PathBuf,
    urls: HashSet<String>,
}

impl SeenSet {
    /// Load the history file. A missing file is a first run, not an error.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: PathBuf) -> Self {
        let urls = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect(),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "Could not read history file; starting empty");
                }
                HashSet::new()
            }
        };
        info!(count = urls.len(), "Loaded seen-URL history");
        Self { path, urls }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Append the given identities to the history file and the in-memory
    /// set. Call this only with identities of successfully enriched items;
    /// failed items stay un-seen so the next run retries them.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn commit(&mut self, identities: &[String]) -> Result<(), Box<dyn Error>> {
        let fresh: Vec<&String> = identities
            .iter()
            .filter(|u| !u.is_empty() && !self.urls.contains(u.as_str()))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for url in &fresh {
            lines.push_str(url.as_str());
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(lines.as_bytes()).await?;

        for url in fresh {
            self.urls.insert(url.clone());
        }
        info!(total = self.urls.len(), "Committed processed identities");
        Ok(())
    }
}
