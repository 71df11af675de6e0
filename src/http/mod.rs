// Blocking JSON-over-HTTP helper shared by the OpenAI and Pinecone clients


use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    retry_attempts: u32,
    backoff_unit_ms: u64,
}

impl HttpClient {
    #[inline]
    pub fn new(timeout: Duration, retry_attempts: u32) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            retry_attempts: retry_attempts.max(1),
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }

    /// Scale the wait between attempts: attempt `n` waits `2^(n-1) * unit_ms`
    #[inline]
    #[must_use]
    pub fn with_backoff_unit(mut self, unit_ms: u64) -> Self {
        self.backoff_unit_ms = unit_ms;
        self
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<String> {
        self.make_request_with_retry(url, || {
            let mut request = self.agent.get(url.as_str());
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn post_json<T: Serialize>(
        &self,
        url: &Url,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<String> {
        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        self.make_request_with_retry(url, || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            request
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, url: &Url, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            debug!("{} attempt {}/{}", url, attempt, self.retry_attempts);

            let error = match request_fn() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match classify(&error) {
                Failure::Client(status) => {
                    warn!("{} rejected the request with status {}", url, status);
                    return Err(anyhow::anyhow!("Client error: HTTP {} from {}", status, url));
                }
                Failure::Fatal => {
                    return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                }
                Failure::Transient => {
                    warn!(
                        "Transient failure from {}: {} (attempt {}/{})",
                        url, error, attempt, self.retry_attempts
                    );
                }
            }

            if attempt >= self.retry_attempts {
                error!("Giving up on {} after {} attempts", url, attempt);
                return Err(anyhow::anyhow!(
                    "Request failed after {} attempts: {}",
                    attempt,
                    error
                ));
            }

            let delay = Duration::from_millis(
                EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * self.backoff_unit_ms,
            );
            debug!("Retrying in {:?}", delay);
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

enum Failure {
    /// 4xx other than 429
    Client(u16),
    /// 5xx, 429, or a transport problem
    Transient,
    Fatal,
}

fn classify(error: &ureq::Error) -> Failure {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 || *status == 429 => Failure::Transient,
        ureq::Error::StatusCode(status) => Failure::Client(*status),
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Failure::Transient,
        _ => Failure::Fatal,
    }
}
