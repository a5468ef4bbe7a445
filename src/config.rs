use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use tracing::{info, warn};

/// Full run configuration, loaded from a YAML file. Every field has a
/// default so a missing file (or a partial one) still yields a runnable
/// radar.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub enrichment: EnrichmentConfig,
    pub market: MarketConfig,
    pub files: FilesConfig,
}

/// Discovery query parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub query: String,
    pub language: String,
    pub region: String,
    /// Recency window in the provider's `when:` syntax, e.g. "4h" or "1d".
    pub period: String,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: "Iran AND (Israel OR USA OR nuclear OR conflict OR sanctions OR currency OR IRGC)"
                .to_string(),
            language: "en".to_string(),
            region: "US".to_string(),
            period: "4h".to_string(),
            max_results: 15,
        }
    }
}

/// Orchestration and store bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Fixed worker-pool size; each worker handles one candidate end to end.
    pub workers: usize,
    /// Store capacity after merge/sort/trim.
    pub store_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            store_capacity: 60,
        }
    }
}

/// Which enrichment strategy runs for each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichMode {
    Analysis,
    Translation,
}

/// Enrichment backend settings. The API key comes from the environment so
/// the config file can be committed; a missing key degrades enrichment to
/// its fallback path rather than failing the run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub mode: EnrichMode,
    /// OpenAI-compatible chat-completions endpoint.
    pub api_url: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub model: String,
    /// Human-readable target language used in backend instructions.
    pub language: String,
    /// Number of summary bullets requested in analysis mode.
    pub summary_points: usize,
    /// Base URL for synthesized illustration references.
    pub image_endpoint: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            mode: EnrichMode::Analysis,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "NEWS_RADAR_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            language: "Persian".to_string(),
            summary_points: 3,
            image_endpoint: "https://image.pollinations.ai/prompt".to_string(),
        }
    }
}

/// Optional once-per-run reference-rate snapshot, decoupled from the news
/// pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://alanchand.com/en/currencies-price/usd".to_string(),
        }
    }
}

/// Artifact file names, resolved against the CLI data directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub news: String,
    pub market: String,
    pub history: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            news: "news.json".to_string(),
            market: "market.json".to_string(),
            history: "seen_news.txt".to_string(),
        }
    }
}

/// Load configuration from `path`. A missing file yields the defaults; a
/// present-but-invalid file is an operator error and aborts the run.
pub async fn load_config(path: &Path) -> Result<RadarConfig, Box<dyn Error>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => {
            let cfg: RadarConfig = serde_yaml::from_str(&raw)?;
            info!(path = %path.display(), "Loaded configuration");
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "No config file found; using defaults");
            Ok(RadarConfig::default())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RadarConfig::default();
        assert_eq!(cfg.pipeline.workers, 4);
        assert_eq!(cfg.pipeline.store_capacity, 60);
        assert_eq!(cfg.search.max_results, 15);
        assert_eq!(cfg.enrichment.mode, EnrichMode::Analysis);
        assert_eq!(cfg.files.history, "seen_news.txt");
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
search:
  query: "grid outages"
  period: "1d"
enrichment:
  mode: translation
"#;
        let cfg: RadarConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.search.query, "grid outages");
        assert_eq!(cfg.search.period, "1d");
        // untouched sections keep their defaults
        assert_eq!(cfg.search.language, "en");
        assert_eq!(cfg.enrichment.mode, EnrichMode::Translation);
        assert_eq!(cfg.enrichment.summary_points, 3);
        assert_eq!(cfg.pipeline.workers, 4);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let yaml = "enrichment:\n  mode: telepathy\n";
        assert!(serde_yaml::from_str::<RadarConfig>(yaml).is_err());
    }
}
