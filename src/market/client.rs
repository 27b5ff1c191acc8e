//! Rate-limited odds provider client.

use std::time::{Duration, Instant as StdInstant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

use super::types::{Event, ScoreEvent, Sport};
use crate::config::Config;
use crate::error::FeedError;
use crate::metrics;

/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";

/// Remaining-requests response header.
pub const HEADER_REQUESTS_REMAINING: &str = "x-requests-remaining";
/// Used-requests response header.
pub const HEADER_REQUESTS_USED: &str = "x-requests-used";

/// Longest error body kept on a failed response.
const MAX_ERROR_BODY: usize = 500;

/// Provider endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedRequest {
    /// `GET /sports`.
    Sports {
        /// Include out-of-season sports.
        all: bool,
    },
    /// `GET /sports/{sport}/events`.
    Events {
        /// Sport key.
        sport: String,
        /// Lower bound on start time.
        commence_from: Option<OffsetDateTime>,
        /// Upper bound on start time.
        commence_to: Option<OffsetDateTime>,
    },
    /// `GET /sports/{sport}/odds`.
    Odds {
        /// Sport key.
        sport: String,
        /// Region filter ("eu,fr").
        regions: String,
        /// Market keys ("h2h,totals").
        markets: String,
        /// Bookmaker filter.
        bookmakers: Option<String>,
    },
    /// `GET /sports/{sport}/events/{event}/odds`.
    EventOdds {
        /// Sport key.
        sport: String,
        /// Event identifier.
        event_id: String,
        /// Region filter.
        regions: String,
        /// Market keys (player props allowed).
        markets: String,
        /// Bookmaker filter.
        bookmakers: Option<String>,
    },
    /// `GET /sports/{sport}/scores`.
    Scores {
        /// Sport key.
        sport: String,
        /// Include completed events from this many days back (1..=3).
        days_from: Option<u8>,
    },
}

impl FeedRequest {
    /// Short endpoint name for logs and metrics.
    pub fn endpoint(&self) -> &'static str {
        match self {
            FeedRequest::Sports { .. } => "sports",
            FeedRequest::Events { .. } => "events",
            FeedRequest::Odds { .. } => "odds",
            FeedRequest::EventOdds { .. } => "event_odds",
            FeedRequest::Scores { .. } => "scores",
        }
    }

    /// Path relative to the base URL.
    pub fn path(&self) -> String {
        match self {
            FeedRequest::Sports { .. } => "sports".to_string(),
            FeedRequest::Events { sport, .. } => format!("sports/{sport}/events"),
            FeedRequest::Odds { sport, .. } => format!("sports/{sport}/odds"),
            FeedRequest::EventOdds { sport, event_id, .. } => {
                format!("sports/{sport}/events/{event_id}/odds")
            }
            FeedRequest::Scores { sport, .. } => format!("sports/{sport}/scores"),
        }
    }

    /// Query parameters, excluding the credential.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        match self {
            FeedRequest::Sports { all } => {
                if *all {
                    query.push(("all", "true".to_string()));
                }
            }
            FeedRequest::Events {
                commence_from,
                commence_to,
                ..
            } => {
                query.push(("dateFormat", "iso".to_string()));
                if let Some(from) = commence_from.and_then(iso_seconds) {
                    query.push(("commenceTimeFrom", from));
                }
                if let Some(to) = commence_to.and_then(iso_seconds) {
                    query.push(("commenceTimeTo", to));
                }
            }
            FeedRequest::Odds {
                regions,
                markets,
                bookmakers,
                ..
            }
            | FeedRequest::EventOdds {
                regions,
                markets,
                bookmakers,
                ..
            } => {
                query.push(("regions", regions.clone()));
                query.push(("markets", markets.clone()));
                query.push(("oddsFormat", "decimal".to_string()));
                query.push(("dateFormat", "iso".to_string()));
                if let Some(bookmakers) = bookmakers {
                    query.push(("bookmakers", bookmakers.clone()));
                }
            }
            FeedRequest::Scores { days_from, .. } => {
                query.push(("dateFormat", "iso".to_string()));
                if let Some(days) = days_from {
                    query.push(("daysFrom", days.to_string()));
                }
            }
        }
        query
    }
}

/// The provider rejects fractional seconds in time filters.
fn iso_seconds(t: OffsetDateTime) -> Option<String> {
    t.replace_nanosecond(0).ok()?.format(&Rfc3339).ok()
}

/// Outcome of one provider request.
///
/// Transport and HTTP failures are encoded here rather than returned as
/// errors, so the caller can classify them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedResponse {
    /// 200 with a JSON body.
    pub success: bool,
    /// Decoded JSON body on success.
    pub payload: Option<Value>,
    /// Response body or transport message on failure.
    pub error: Option<String>,
    /// HTTP status, 0 for transport failures.
    pub status_code: u16,
    /// Remaining quota reported by the provider (0 when absent).
    pub quota_remaining: u32,
    /// Used quota reported by the provider (0 when absent).
    pub quota_used: u32,
}

impl FeedResponse {
    /// Successful response.
    pub fn ok(payload: Value, quota_remaining: u32, quota_used: u32) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            status_code: 200,
            quota_remaining,
            quota_used,
        }
    }

    /// Failed response.
    pub fn failed(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
            status_code,
            quota_remaining: 0,
            quota_used: 0,
        }
    }

    /// Attach quota counters.
    pub fn with_quota(mut self, remaining: u32, used: u32) -> Self {
        self.quota_remaining = remaining;
        self.quota_used = used;
        self
    }

    /// Error text, empty on success.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// Decode the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FeedError> {
        let payload = self.payload.clone().ok_or_else(|| FeedError::Request {
            endpoint: endpoint.to_string(),
            status: self.status_code,
            message: self.error_text().to_string(),
        })?;
        serde_json::from_value(payload).map_err(|e| FeedError::Payload {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// Payload as events (odds/events endpoints).
    pub fn events(&self) -> Result<Vec<Event>, FeedError> {
        self.decode("events")
    }

    /// Payload as a single event (per-event odds endpoint).
    pub fn event(&self) -> Result<Event, FeedError> {
        self.decode("event_odds")
    }
}

/// Source of provider data. Implemented by [`OddsClient`] and by the
/// scripted mock used in tests.
#[async_trait]
pub trait OddsFeed: Send + Sync {
    /// Issue `request` with `api_key` attached.
    async fn fetch(&self, api_key: &str, request: &FeedRequest) -> FeedResponse;
}

/// HTTP client for the odds provider.
///
/// At most one request is in flight at a time, and each request starts at
/// least `request_delay` after the previous one finished.
#[derive(Debug)]
pub struct OddsClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL, without trailing slash.
    base_url: String,
    /// Minimum spacing between requests.
    request_delay: Duration,
    /// Start of the previous request. Held for the whole request.
    last_request: Mutex<Option<Instant>>,
}

impl OddsClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, FeedError> {
        Self::with_settings(&config.odds_api_url, config.request_delay(), config.http_timeout())
    }

    /// Create a client with explicit settings.
    pub fn with_settings(
        base_url: &str,
        request_delay: Duration,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        Url::parse(base_url).map_err(|e| FeedError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_delay,
            last_request: Mutex::new(None),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List sports.
    pub async fn get_sports(&self, api_key: &str, all: bool) -> Result<Vec<Sport>, FeedError> {
        let request = FeedRequest::Sports { all };
        self.fetch(api_key, &request).await.decode(request.endpoint())
    }

    /// List upcoming events for a sport, without odds.
    pub async fn get_events(&self, api_key: &str, sport: &str) -> Result<Vec<Event>, FeedError> {
        let request = FeedRequest::Events {
            sport: sport.to_string(),
            commence_from: None,
            commence_to: None,
        };
        self.fetch(api_key, &request).await.events()
    }

    /// Scores for a sport.
    pub async fn get_scores(
        &self,
        api_key: &str,
        sport: &str,
        days_from: Option<u8>,
    ) -> Result<Vec<ScoreEvent>, FeedError> {
        let request = FeedRequest::Scores {
            sport: sport.to_string(),
            days_from,
        };
        self.fetch(api_key, &request).await.decode(request.endpoint())
    }

    async fn send(&self, api_key: &str, request: &FeedRequest) -> FeedResponse {
        let url = format!("{}/{}", self.base_url, request.path());
        let mut query = request.query();
        query.insert(0, ("apiKey", api_key.to_string()));

        let response = match self.http.get(&url).query(&query).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Odds request failed");
                return FeedResponse::failed(0, e.to_string());
            }
        };

        let status = response.status();
        let (remaining, used) = quota_headers(response.headers());

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            warn!(status = status.as_u16(), body = %body, "Odds request rejected");
            return FeedResponse::failed(status.as_u16(), body).with_quota(remaining, used);
        }

        match response.json::<Value>().await {
            Ok(payload) => FeedResponse::ok(payload, remaining, used),
            Err(e) => FeedResponse::failed(status.as_u16(), format!("invalid JSON body: {e}"))
                .with_quota(remaining, used),
        }
    }
}

#[async_trait]
impl OddsFeed for OddsClient {
    #[instrument(skip(self, api_key), fields(endpoint = request.endpoint()))]
    async fn fetch(&self, api_key: &str, request: &FeedRequest) -> FeedResponse {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let wait = (last + self.request_delay).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "Rate limit wait");
                tokio::time::sleep(wait).await;
            }
        }

        let start = StdInstant::now();
        let response = self.send(api_key, request).await;
        *last_request = Some(Instant::now());
        metrics::record_feed_request(start, request.endpoint(), response.status_code);

        debug!(
            status = response.status_code,
            remaining = response.quota_remaining,
            used = response.quota_used,
            "Odds request complete"
        );
        response
    }
}

/// Parse quota counters, tolerating absent or fractional values.
fn quota_headers(headers: &HeaderMap) -> (u32, u32) {
    let read = |name: &str| -> u32 {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                let v = v.trim();
                v.parse::<u32>()
                    .ok()
                    .or_else(|| v.parse::<f64>().ok().map(|f| f.max(0.0) as u32))
            })
            .unwrap_or(0)
    };
    (read(HEADER_REQUESTS_REMAINING), read(HEADER_REQUESTS_USED))
}
