use crate::config::EnrichmentConfig;
use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Trait for async backend interaction
pub trait AskAsync {
    type Response;
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Explicit retry policy: attempt bound, exponential backoff, delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: StdDuration,
    pub max_delay: StdDuration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

/// Wrapper that adds bounded backoff retry to any AskAsync implementation
pub struct RetryAsk<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk").field("policy", &self.policy).finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt >= self.policy.max_attempts {
                        error!(
                            attempt,
                            max = self.policy.max_attempts,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                            elapsed_ms_total = total_dt.as_millis() as u128,
                            error = %e,
                            "ask() exhausted attempts"
                        );
                        return Err(e);
                    }

                    // backoff calc
                    let mut delay = self.policy.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.policy.max_delay {
                        delay = self.policy.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.policy.max_attempts,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u128,
                        elapsed_ms_total = total_dt.as_millis() as u128,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions backend. Credentials
/// are optional at this level; `has_credentials` lets callers pick the
/// fallback path before spending a request.
pub struct ChatClient {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("has_credentials", &self.api_key.is_some())
            .finish()
    }
}

impl ChatClient {
    pub fn new(cfg: &EnrichmentConfig) -> Self {
        let api_key = std::env::var(&cfg.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(env = %cfg.api_key_env, "No backend API key found; enrichment will fall back");
        }
        let http = Client::builder()
            .connect_timeout(StdDuration::from_secs(4))
            .timeout(StdDuration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            api_url: cfg.api_url.clone(),
            api_key,
            model: cfg.model.clone(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// One completion round-trip: system instruction plus user content in,
    /// the assistant's text out.
    #[instrument(level = "debug", skip_all)]
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, Box<dyn Error>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err("no backend credentials configured".into());
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
        };

        let t0 = Instant::now();
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, elapsed_ms = t0.elapsed().as_millis() as u128, "Backend call failed");
            return Err(format!("backend returned status {}", status).into());
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or("backend response had no choices")?;
        Ok(content)
    }
}

/// Translation ask over the completion contract: one call translates one
/// piece of text into the target language.
#[derive(Debug)]
pub struct TranslateAsk<'a> {
    pub client: &'a ChatClient,
    pub language: &'a str,
}

impl AskAsync for TranslateAsk<'_> {
    type Response = String;

    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let system = format!(
            "You are a professional news translator. Translate the user's text into {}. \
             Preserve meaning and tone. Output only the translation, nothing else.",
            self.language
        );
        self.client.complete(&system, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err("transient".into())
            } else {
                Ok(format!("ok:{text}"))
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let flaky = Flaky {
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(5),
        };
        let api = RetryAsk::new(flaky, policy);
        let out = api.ask("hello").await.unwrap();
        assert_eq!(out, "ok:hello");
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let flaky = Flaky {
            failures: 10,
            calls: AtomicUsize::new(0),
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: StdDuration::from_millis(1),
            max_delay: StdDuration::from_millis(5),
        };
        let api = RetryAsk::new(flaky, policy);
        assert!(api.ask("hello").await.is_err());
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_policy_floor_is_one_attempt() {
        let policy = RetryPolicy::new(0, StdDuration::from_millis(1));
        assert_eq!(policy.max_attempts, 1);
    }
}
