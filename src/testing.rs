//! Offline transport used by unit tests.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde_json::Value;

use crate::cache::Clock;
use crate::upstream::{Transport, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Serves canned responses keyed by exact URL and records every request.
/// Unknown URLs fail with a transport error, like an unreachable host.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, UpstreamResponse>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_json(&self, url: &str, body: Value) {
        self.respond_bytes(url, 200, "application/json", body.to_string().as_bytes());
    }

    pub fn respond_status(&self, url: &str, status: u16) {
        self.respond_bytes(url, status, "text/plain", b"");
    }

    pub fn respond_bytes(&self, url: &str, status: u16, content_type: &str, body: &[u8]) {
        self.routes.lock().insert(
            url.to_string(),
            UpstreamResponse {
                status,
                content_type: Some(content_type.to_string()),
                body: body.to_vec(),
            },
        );
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|req| req.url.clone()).collect()
    }

    pub fn clear_calls(&self) {
        self.requests.lock().clear();
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().push(request.clone());
        self.routes
            .lock()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| UpstreamError::Transport(format!("no route to {}", request.url)))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}
