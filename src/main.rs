//! # News Radar
//!
//! A recurring news pipeline: discover articles matching a topical query,
//! resolve and scrape their content, enrich each item through an AI
//! analysis or translation backend, deduplicate against a persistent
//! history, and maintain a bounded, time-ordered JSON store of the most
//! recent enriched items.
//!
//! ## Usage
//!
//! ```sh
//! news_radar -d ./data -c ./radar.yaml
//! ```
//!
//! ## Architecture
//!
//! One run is a single pass through the pipeline:
//! 1. **Market**: best-effort refresh of the reference-rate snapshot
//! 2. **Discovery**: query the news feed for candidate items (fatal on failure)
//! 3. **Pre-filter**: drop candidates already in the seen history
//! 4. **Processing**: fetch → extract → enrich per candidate, across a
//!    bounded worker pool, collecting successes in completion order
//! 5. **Persist**: merge/sort/trim the store, then commit seen identities
//!
//! Shared state is only touched in the single-threaded phases before and
//! after the concurrent step, so the workers never need a lock.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod discovery;
mod enricher;
mod extractor;
mod fetcher;
mod market;
mod models;
mod pipeline;
mod seen;
mod store;
mod utils;

use cli::Cli;
use enricher::Enricher;
use seen::SeenSet;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_radar starting up");

    let args = Cli::parse();
    debug!(?args.data_dir, ?args.config, "Parsed CLI arguments");

    let config_path = args.config.as_deref().unwrap_or("radar.yaml");
    let cfg = config::load_config(Path::new(config_path)).await?;

    // Early check: ensure the data directory is writable before any
    // network work is spent.
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let data_dir = Path::new(&args.data_dir);
    let news_path = data_dir.join(&cfg.files.news);
    let market_path = data_dir.join(&cfg.files.market);
    let history_path = data_dir.join(&cfg.files.history);

    // ---- Market snapshot (best-effort, decoupled from the pipeline) ----
    market::refresh(&cfg.market, &market_path).await;

    // ---- Discovery (fatal: with no candidates there is no run) ----
    let candidates = match discovery::search(&cfg.search).await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "Discovery failed; aborting run with nothing persisted");
            return Err(e);
        }
    };

    // ---- History + pre-filter ----
    let mut seen = SeenSet::load(history_path).await;
    let fresh = pipeline::prefilter(candidates, &seen);
    if fresh.is_empty() {
        info!("No unseen candidates this run");
        log_elapsed(start_time);
        return Ok(());
    }

    // ---- Parallel per-candidate processing ----
    let enricher = Enricher::new(&cfg.enrichment);
    let outcome = pipeline::process_batch(fresh, &seen, &enricher, cfg.pipeline.workers).await;

    // ---- Persist: store first, then mark identities as processed ----
    if outcome.items.is_empty() {
        info!("No new items produced; store left untouched");
    } else {
        let stored = store::commit(&news_path, outcome.items, cfg.pipeline.store_capacity).await?;
        seen.commit(&outcome.identities).await?;
        info!(stored, history = seen.len(), "Run persisted");
    }

    log_elapsed(start_time);
    Ok(())
}

fn log_elapsed(start_time: std::time::Instant) {
    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
}
