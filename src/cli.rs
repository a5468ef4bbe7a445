use clap::Parser;

/// Recurring news radar: discover, scrape, enrich and store news items
/// matching the configured query. Intended to be invoked on a fixed
/// external schedule.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the store, history and market artifacts
    #[arg(short, long, default_value = ".")]
    pub data_dir: String,

    /// Optional path to the radar.yaml config file
    #[arg(short, long)]
    pub config: Option<String>,
}
