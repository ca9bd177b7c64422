//! Outbound HTTP access to third-party services.
//!
//! Callers never see transport failures as panics or propagated errors: the
//! aggregation layer turns every [`UpstreamError`] into an empty value. This
//! module only classifies what went wrong so it can be logged.

use std::{collections::HashMap, io::Read, sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Response bodies above these sizes are rejected with [`UpstreamError::TooLarge`].
pub const MAX_JSON_BYTES: u64 = 8 * 1024 * 1024;
pub const MAX_IMAGE_BYTES: u64 = 4 * 1024 * 1024;

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:92.0) Gecko/20100101 Firefox/92.0",
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("response body exceeds {0} bytes")]
    TooLarge(u64),
}

/// Connect/read deadline pair for one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeouts {
    pub const fn secs(connect: u64, read: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            read: Duration::from_secs(read),
        }
    }

    pub fn total(&self) -> Duration {
        self.connect + self.read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Retry budget for the mirrored metadata API.
    pub const MIRROR: Self = Self {
        retries: 2,
        backoff_base: Duration::from_millis(100),
    };

    pub const SINGLE_ATTEMPT: Self = Self {
        retries: 0,
        backoff_base: Duration::ZERO,
    };

    fn should_retry(status: u16) -> bool {
        matches!(status, 500 | 502 | 503 | 504)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub user_agent: &'static str,
    pub timeouts: Timeouts,
    pub max_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single GET against the network. Any status the server answers with is
/// returned as `Ok`; only failures to obtain a response are errors.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// Blocking transport over bounded ureq connection pools.
///
/// ureq fixes the connect timeout per agent, so one agent is kept for each
/// distinct connect budget; every upstream sharing a budget shares its pool.
pub struct UreqTransport {
    pool_size: usize,
    agents: Mutex<HashMap<Duration, ureq::Agent>>,
}

impl UreqTransport {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            agents: Mutex::new(HashMap::new()),
        }
    }

    fn agent(&self, connect: Duration) -> ureq::Agent {
        self.agents
            .lock()
            .entry(connect)
            .or_insert_with(|| {
                ureq::AgentBuilder::new()
                    .max_idle_connections(self.pool_size)
                    .max_idle_connections_per_host(self.pool_size)
                    .timeout_connect(connect)
                    .build()
            })
            .clone()
    }

    #[cfg(test)]
    fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }
}

impl Transport for UreqTransport {
    fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        // The per-request deadline covers connect plus read; the agent caps
        // the connect phase alone.
        let outcome = self
            .agent(request.timeouts.connect)
            .get(&request.url)
            .set("User-Agent", request.user_agent)
            .timeout(request.timeouts.total())
            .call();
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(UpstreamError::Transport(err.to_string()));
            }
        };

        let status = response.status();
        let content_type = response.header("Content-Type").map(str::to_string);
        let body = read_capped(response.into_reader(), request.max_bytes)?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Reads a body of at most `max_bytes`. Longer bodies are an error, never
/// silently truncated.
fn read_capped(reader: impl Read, max_bytes: u64) -> Result<Vec<u8>, UpstreamError> {
    let mut body = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|err| UpstreamError::Transport(err.to_string()))?;
    if body.len() as u64 > max_bytes {
        return Err(UpstreamError::TooLarge(max_bytes));
    }
    Ok(body)
}

/// Best-effort GET helper layered over a [`Transport`].
#[derive(Clone)]
pub struct UpstreamClient {
    transport: Arc<dyn Transport>,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches `url` and decodes a JSON body, requiring a 2xx status.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeouts: Timeouts,
        retry: RetryPolicy,
    ) -> Result<T, UpstreamError> {
        let response = self.get_with_retry(url, timeouts, retry, MAX_JSON_BYTES)?;
        serde_json::from_slice(&response.body).map_err(|err| UpstreamError::Decode(err.to_string()))
    }

    /// Fetches raw bytes, requiring a 2xx status. Single attempt.
    pub fn get_bytes(&self, url: &str, timeouts: Timeouts) -> Result<UpstreamResponse, UpstreamError> {
        self.get_with_retry(url, timeouts, RetryPolicy::SINGLE_ATTEMPT, MAX_IMAGE_BYTES)
    }

    fn get_with_retry(
        &self,
        url: &str,
        timeouts: Timeouts,
        retry: RetryPolicy,
        max_bytes: u64,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut attempt = 0;
        loop {
            let request = UpstreamRequest {
                url: url.to_string(),
                user_agent: random_user_agent(),
                timeouts,
                max_bytes,
            };
            let response = self.transport.fetch(&request)?;
            if response.body.len() as u64 > max_bytes {
                return Err(UpstreamError::TooLarge(max_bytes));
            }
            if response.is_success() {
                return Ok(response);
            }
            if attempt >= retry.retries || !RetryPolicy::should_retry(response.status) {
                return Err(UpstreamError::Status(response.status));
            }
            let delay = retry.backoff(attempt);
            debug!(url, status = response.status, ?delay, "retrying upstream request");
            thread::sleep(delay);
            attempt += 1;
        }
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
