use crate::models::FetchedPage;
use once_cell::sync::Lazy;
use rand::{Rng, rng};
use reqwest::Client;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};
use std::time::Duration;
use tracing::{debug, instrument, warn};

// Per-request timeout; failures degrade, they are never retried here.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(FETCH_TIMEOUT)
        .pool_idle_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("failed to build reqwest client")
});

// Rotated per request so consecutive fetches do not share one identity.
const UA_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

fn random_user_agent() -> &'static str {
    UA_POOL[rng().random_range(0..UA_POOL.len())]
}

/// Resolve a discovery link to its final destination and retrieve the page.
///
/// Follows redirects and reports the resolved address distinctly from the
/// input. Timeouts, connection errors and non-2xx statuses all degrade to
/// `body: None` — the orchestrator treats that as "no content", never as a
/// batch failure.
#[instrument(level = "debug", skip_all, fields(%url))]
pub async fn resolve(url: &str) -> FetchedPage {
    let request = CLIENT
        .get(url)
        .header(USER_AGENT, random_user_agent())
        .header(
            ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        )
        .header(REFERER, "https://www.google.com/")
        .header("Upgrade-Insecure-Requests", "1");

    let response = match request.send().await {
        Ok(res) => res,
        Err(e) => {
            warn!(error = %e, "Fetch failed; keeping discovery URL with no content");
            return FetchedPage {
                final_url: url.to_string(),
                body: None,
            };
        }
    };

    let final_url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
        warn!(%status, %final_url, "Fetch returned non-success status");
        return FetchedPage {
            final_url,
            body: None,
        };
    }

    match response.text().await {
        Ok(body) => {
            debug!(bytes = body.len(), %final_url, "Fetched page");
            FetchedPage {
                final_url,
                body: Some(body),
            }
        }
        Err(e) => {
            warn!(error = %e, %final_url, "Failed reading response body");
            FetchedPage {
                final_url,
                body: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_comes_from_pool() {
        for _ in 0..20 {
            let ua = random_user_agent();
            assert!(UA_POOL.contains(&ua));
        }
    }
}
