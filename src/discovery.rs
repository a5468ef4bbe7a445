use crate::config::SearchConfig;
use crate::models::Candidate;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(concat!(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) ",
            "AppleWebKit/537.36 (KHTML, like Gecko) ",
            "Chrome/127.0.0.0 Safari/537.36"
        ))
        .timeout(Duration::from_secs(20))
        .pool_idle_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("failed to build reqwest client")
});

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<SourceTag>,
}

/// `<source url="...">Publisher</source>` on each feed item.
#[derive(Debug, Deserialize)]
struct SourceTag {
    #[serde(rename = "$text")]
    name: Option<String>,
}

/// Search the news feed for the configured query and return candidate
/// items. Discovery failure is fatal to the run: with no candidates there
/// is nothing to process, so the error propagates to the caller and
/// nothing gets persisted.
#[instrument(level = "info", skip_all, fields(query = %cfg.query))]
pub async fn search(cfg: &SearchConfig) -> Result<Vec<Candidate>, Box<dyn Error>> {
    let query = format!("{} when:{}", cfg.query, cfg.period);
    let url = format!(
        "https://news.google.com/rss/search?q={}&hl={}&gl={}&ceid={}:{}",
        urlencoding::encode(&query),
        cfg.language,
        cfg.region,
        cfg.region,
        cfg.language
    );
    debug!(%url, "Fetching discovery feed");

    let response = CLIENT.get(&url).send().await?;
    if !response.status().is_success() {
        let status = response.status();
        error!(%status, "Discovery feed request failed");
        return Err(format!("discovery feed returned status {}", status).into());
    }
    let xml = response.text().await?;

    let candidates = parse_feed(&xml, cfg.max_results)?;
    info!(count = candidates.len(), "Indexed candidate items");
    Ok(candidates)
}

/// Parse an RSS 2.0 payload into candidates, capped at `max_results`.
fn parse_feed(xml: &str, max_results: usize) -> Result<Vec<Candidate>, Box<dyn Error>> {
    let rss: Rss = quick_xml::de::from_str(xml)?;

    let mut candidates = Vec::new();
    for item in rss.channel.items {
        let (Some(raw_title), Some(link)) = (item.title, item.link) else {
            continue;
        };
        // The feed appends the publisher to the headline: "Title - Source".
        let (title, title_publisher) = split_publisher_suffix(&raw_title);
        let publisher = item
            .source
            .and_then(|s| s.name)
            .or(title_publisher)
            .unwrap_or_else(|| "Source".to_string());

        candidates.push(Candidate {
            title,
            url: link,
            publisher,
            published_at: item.pub_date.unwrap_or_default(),
            description: item.description.map(|d| strip_html(&d)).filter(|d| !d.is_empty()),
        });
        if candidates.len() >= max_results {
            break;
        }
    }
    Ok(candidates)
}

/// Split the trailing " - Publisher" the feed folds into headlines.
fn split_publisher_suffix(raw: &str) -> (String, Option<String>) {
    match raw.rsplit_once(" - ") {
        Some((title, publisher)) => (title.trim().to_string(), Some(publisher.trim().to_string())),
        None => (raw.trim().to_string(), None),
    }
}

/// Feed descriptions arrive as HTML snippets; reduce them to plain text.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
