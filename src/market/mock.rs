//! Scripted odds feed for unit testing.
//!
//! Responses are served in the order they were pushed; once the script is
//! exhausted the fallback response is returned. Every call is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use super::client::{FeedRequest, FeedResponse, OddsFeed};

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<FeedResponse>,
    by_key: HashMap<String, FeedResponse>,
    fallback: Option<FeedResponse>,
    calls: Vec<(String, FeedRequest)>,
}

/// In-memory [`OddsFeed`].
#[derive(Debug, Clone, Default)]
pub struct MockOddsFeed {
    state: Arc<Mutex<MockState>>,
}

impl MockOddsFeed {
    /// Empty feed answering `[]` with quota 500/0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn push_response(&self, response: FeedResponse) {
        self.state.lock().script.push_back(response);
    }

    /// Queue a successful odds payload.
    pub fn push_events(&self, events: serde_json::Value, quota_remaining: u32) {
        self.push_response(FeedResponse::ok(events, quota_remaining, 1));
    }

    /// Always answer `response` for `api_key`, ahead of the script.
    pub fn respond_for_key(&self, api_key: &str, response: FeedResponse) {
        self.state.lock().by_key.insert(api_key.to_string(), response);
    }

    /// Response used once the script is exhausted.
    pub fn set_fallback(&self, response: FeedResponse) {
        self.state.lock().fallback = Some(response);
    }

    /// Recorded `(api_key, request)` pairs.
    pub fn calls(&self) -> Vec<(String, FeedRequest)> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// API keys used, in call order.
    pub fn keys_used(&self) -> Vec<String> {
        self.state.lock().calls.iter().map(|(k, _)| k.clone()).collect()
    }
}

#[async_trait]
impl OddsFeed for MockOddsFeed {
    async fn fetch(&self, api_key: &str, request: &FeedRequest) -> FeedResponse {
        let mut state = self.state.lock();
        state.calls.push((api_key.to_string(), request.clone()));

        if let Some(response) = state.by_key.get(api_key) {
            return response.clone();
        }
        if let Some(response) = state.script.pop_front() {
            return response;
        }
        state
            .fallback
            .clone()
            .unwrap_or_else(|| FeedResponse::ok(json!([]), 500, 0))
    }
}
