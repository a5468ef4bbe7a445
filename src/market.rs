use crate::config::MarketConfig;
use crate::fetcher;
use chrono::Local;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument, warn};

static RATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[data-curr="tmn"]"#).expect("rate selector"));

/// One reference-rate reading, refreshed once per run. Decoupled from the
/// news pipeline: every failure path degrades to the `N/A` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub usd: String,
    pub updated: String,
}

impl MarketSnapshot {
    fn unavailable() -> Self {
        Self {
            usd: "N/A".to_string(),
            updated: "--:--".to_string(),
        }
    }
}

/// Fetch the configured rate page and write the snapshot artifact.
/// Best-effort by design; the run continues regardless of the outcome.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn refresh(cfg: &MarketConfig, path: &Path) {
    if !cfg.enabled {
        return;
    }

    let page = fetcher::resolve(&cfg.url).await;
    let snapshot = page
        .body
        .as_deref()
        .and_then(parse_rate)
        .map(|toman| MarketSnapshot {
            usd: group_thousands(toman),
            updated: Local::now().format("%H:%M").to_string(),
        })
        .unwrap_or_else(|| {
            warn!(url = %cfg.url, "Market rate unavailable");
            MarketSnapshot::unavailable()
        });

    let json = match serde_json::to_string(&snapshot) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Could not serialize market snapshot");
            return;
        }
    };
    let tmp = path.with_extension("json.tmp");
    let written = async {
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;
    match written {
        Ok(()) => info!(usd = %snapshot.usd, "Wrote market snapshot"),
        Err(e) => warn!(error = %e, "Could not write market snapshot"),
    }
}

/// The page quotes rials in a form input; the published figure is tomans
/// (rials / 10).
fn parse_rate(body: &str) -> Option<u64> {
    let document = Html::parse_document(body);
    let input = document.select(&RATE_SELECTOR).next()?;
    let raw = input
        .value()
        .attr("data-price")
        .filter(|v| !v.trim().is_empty())
        .or_else(|| input.value().attr("value"))?;
    let rial: u64 = raw.replace(',', "").trim().parse().ok()?;
    let toman = rial / 10;
    (toman > 0).then_some(toman)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
