//! Opportunity and usage records.
//!
//! Storage engines live outside this crate; writes are best effort.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumString};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::arbitrage::Opportunity;
use crate::error::OutboundError;
use crate::market::{Event, Quote};

/// Severity of a logged error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorLevel {
    /// Informational.
    Info,
    /// Recoverable problem.
    Warning,
    /// Failure.
    Error,
}

/// One quote as captured from the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawQuote {
    /// Provider event identifier.
    pub event_id: String,
    /// "Home vs Away".
    pub match_label: String,
    /// Market dedup key ("h2h", "totals_2.5").
    pub market: String,
    /// Outcome label.
    pub outcome: String,
    /// Bookmaker.
    pub provider: String,
    /// Decimal odds.
    pub odds: Decimal,
}

impl RawQuote {
    /// Capture `quote` for `event`.
    pub fn new(event: &Event, quote: &Quote) -> Self {
        Self {
            event_id: event.id.clone(),
            match_label: event.match_label(),
            market: quote.kind.dedup_key(),
            outcome: quote.label.clone(),
            provider: quote.provider.clone(),
            odds: quote.odds,
        }
    }
}

/// All quotes of one sport fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawOddsBatch {
    /// Sport key.
    pub sport: String,
    /// Fetch instant.
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Quotes.
    pub quotes: Vec<RawQuote>,
}

/// Receives records worth keeping.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// An emitted opportunity.
    async fn save_opportunity(&self, opportunity: &Opportunity) -> Result<(), OutboundError>;

    /// Quota counters after a request.
    async fn log_api_usage(&self, credential: &str, used: u32, remaining: u32) -> Result<(), OutboundError>;

    /// An error or notable event.
    async fn log_error(&self, level: ErrorLevel, message: &str) -> Result<(), OutboundError>;

    /// Every quote of one sport fetch.
    async fn save_raw_odds(&self, batch: &RawOddsBatch) -> Result<(), OutboundError>;
}

/// Writes records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStore;

#[async_trait]
impl OpportunityStore for LogStore {
    async fn save_opportunity(&self, opp: &Opportunity) -> Result<(), OutboundError> {
        let record = serde_json::to_string(opp).map_err(|e| OutboundError::Persistence(e.to_string()))?;
        info!(record = %record, "Opportunity record");
        Ok(())
    }

    async fn log_api_usage(&self, credential: &str, used: u32, remaining: u32) -> Result<(), OutboundError> {
        debug!(credential, used, remaining, "API usage");
        Ok(())
    }

    async fn log_error(&self, level: ErrorLevel, message: &str) -> Result<(), OutboundError> {
        match level {
            ErrorLevel::Info => info!(message, "Error record"),
            ErrorLevel::Warning => warn!(message, "Error record"),
            ErrorLevel::Error => error!(message, "Error record"),
        }
        Ok(())
    }

    async fn save_raw_odds(&self, batch: &RawOddsBatch) -> Result<(), OutboundError> {
        debug!(sport = %batch.sport, quotes = batch.quotes.len(), "Raw odds captured");
        Ok(())
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl OpportunityStore for NullStore {
    async fn save_opportunity(&self, _opportunity: &Opportunity) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn log_api_usage(&self, _credential: &str, _used: u32, _remaining: u32) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn log_error(&self, _level: ErrorLevel, _message: &str) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn save_raw_odds(&self, _batch: &RawOddsBatch) -> Result<(), OutboundError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    opportunities: Vec<Opportunity>,
    usage: Vec<(String, u32, u32)>,
    errors: Vec<(ErrorLevel, String)>,
    raw_batches: Vec<RawOddsBatch>,
}

/// Keeps every record in memory; optionally fails every write.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    recorded: Arc<Mutex<Recorded>>,
    failing: bool,
}

impl RecordingStore {
    /// Store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that records, then reports a write failure.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Saved opportunities.
    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.recorded.lock().opportunities.clone()
    }

    /// `(credential, used, remaining)` records.
    pub fn usage(&self) -> Vec<(String, u32, u32)> {
        self.recorded.lock().usage.clone()
    }

    /// Error records.
    pub fn errors(&self) -> Vec<(ErrorLevel, String)> {
        self.recorded.lock().errors.clone()
    }

    /// Raw odds batches.
    pub fn raw_batches(&self) -> Vec<RawOddsBatch> {
        self.recorded.lock().raw_batches.clone()
    }

    fn result(&self) -> Result<(), OutboundError> {
        if self.failing {
            Err(OutboundError::Persistence("recording store set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OpportunityStore for RecordingStore {
    async fn save_opportunity(&self, opportunity: &Opportunity) -> Result<(), OutboundError> {
        self.recorded.lock().opportunities.push(opportunity.clone());
        self.result()
    }

    async fn log_api_usage(&self, credential: &str, used: u32, remaining: u32) -> Result<(), OutboundError> {
        self.recorded
            .lock()
            .usage
            .push((credential.to_string(), used, remaining));
        self.result()
    }

    async fn log_error(&self, level: ErrorLevel, message: &str) -> Result<(), OutboundError> {
        self.recorded.lock().errors.push((level, message.to_string()));
        self.result()
    }

    async fn save_raw_odds(&self, batch: &RawOddsBatch) -> Result<(), OutboundError> {
        self.recorded.lock().raw_batches.push(batch.clone());
        self.result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_level_names() {
        assert_eq!(ErrorLevel::Warning.to_string(), "WARNING");
        assert_eq!("ERROR".parse::<ErrorLevel>().unwrap(), ErrorLevel::Error);
    }

    #[tokio::test]
    async fn recording_store_keeps_records() {
        let store = RecordingStore::new();
        store.log_api_usage("bob", 10, 490).await.unwrap();
        store.log_error(ErrorLevel::Warning, "slow").await.unwrap();

        assert_eq!(store.usage(), vec![("bob".to_string(), 10, 490)]);
        assert_eq!(store.errors(), vec![(ErrorLevel::Warning, "slow".to_string())]);
        assert!(RecordingStore::failing().log_error(ErrorLevel::Info, "x").await.is_err());
    }

    #[tokio::test]
    async fn log_store_accepts_batches() {
        let batch = RawOddsBatch {
            sport: "soccer_epl".to_string(),
            captured_at: time::macros::datetime!(2026-02-23 19:00 UTC),
            quotes: vec![],
        };
        assert!(LogStore.save_raw_odds(&batch).await.is_ok());
        assert!(NullStore.save_raw_odds(&batch).await.is_ok());
    }
}
