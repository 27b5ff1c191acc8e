//! Alert delivery.
//!
//! Message formatting and transport (chat bots, email, ...) live outside
//! this crate. The scanner only needs somewhere to send events; failures are
//! logged by the caller and never stop a scan.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::arbitrage::Opportunity;
use crate::error::OutboundError;

/// Receives scanner events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A surebet passed the cooldown filter.
    async fn send_opportunity(&self, opportunity: &Opportunity) -> Result<(), OutboundError>;

    /// A feed or pool error the operator should know about.
    async fn send_error(&self, message: &str) -> Result<(), OutboundError>;

    /// Remaining quota on the active credential is low.
    async fn send_quota_warning(&self, remaining: u32, credential: &str) -> Result<(), OutboundError>;

    /// The active credential changed.
    async fn send_failover_notice(&self, old: Option<&str>, new: &str) -> Result<(), OutboundError>;

    /// Any other state change (slot change, backoff, imminent events, stop).
    async fn send_notice(&self, message: &str) -> Result<(), OutboundError>;
}

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_opportunity(&self, opp: &Opportunity) -> Result<(), OutboundError> {
        let legs: Vec<String> = opp
            .outcomes
            .iter()
            .zip(&opp.result.stakes)
            .map(|(leg, stake)| format!("{} @ {} on {} (stake {})", leg.outcome, leg.odds, leg.provider, stake))
            .collect();
        info!(
            league = %opp.league,
            match_label = %opp.match_label,
            market = %opp.market_label,
            profit_pct = %opp.result.profit_pct,
            legs = %legs.join(" | "),
            "SUREBET"
        );
        Ok(())
    }

    async fn send_error(&self, message: &str) -> Result<(), OutboundError> {
        error!(message, "Scanner error");
        Ok(())
    }

    async fn send_quota_warning(&self, remaining: u32, credential: &str) -> Result<(), OutboundError> {
        warn!(remaining, credential, "Low quota");
        Ok(())
    }

    async fn send_failover_notice(&self, old: Option<&str>, new: &str) -> Result<(), OutboundError> {
        warn!(old = old.unwrap_or("none"), new, "Credential failover");
        Ok(())
    }

    async fn send_notice(&self, message: &str) -> Result<(), OutboundError> {
        info!(message, "Notice");
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_opportunity(&self, _opportunity: &Opportunity) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn send_error(&self, _message: &str) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn send_quota_warning(&self, _remaining: u32, _credential: &str) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn send_failover_notice(&self, _old: Option<&str>, _new: &str) -> Result<(), OutboundError> {
        Ok(())
    }

    async fn send_notice(&self, _message: &str) -> Result<(), OutboundError> {
        Ok(())
    }
}

/// Event captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `send_opportunity`.
    Opportunity(Box<Opportunity>),
    /// `send_error`.
    Error(String),
    /// `send_quota_warning`.
    QuotaWarning {
        /// Remaining requests.
        remaining: u32,
        /// Credential label.
        credential: String,
    },
    /// `send_failover_notice`.
    Failover {
        /// Previous credential label.
        old: Option<String>,
        /// New credential label.
        new: String,
    },
    /// `send_notice`.
    Notice(String),
}

/// Keeps every event in memory; optionally fails every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl RecordingNotifier {
    /// Recorder that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that records, then reports a delivery failure.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Events so far.
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    /// Opportunities so far.
    pub fn opportunities(&self) -> Vec<Opportunity> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Notification::Opportunity(o) => Some((**o).clone()),
                _ => None,
            })
            .collect()
    }

    /// Notices so far.
    pub fn notices(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Notification::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Notification) -> Result<(), OutboundError> {
        self.events.lock().push(event);
        if self.failing {
            Err(OutboundError::Delivery("recording notifier set to fail".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_opportunity(&self, opportunity: &Opportunity) -> Result<(), OutboundError> {
        self.record(Notification::Opportunity(Box::new(opportunity.clone())))
    }

    async fn send_error(&self, message: &str) -> Result<(), OutboundError> {
        self.record(Notification::Error(message.to_string()))
    }

    async fn send_quota_warning(&self, remaining: u32, credential: &str) -> Result<(), OutboundError> {
        self.record(Notification::QuotaWarning {
            remaining,
            credential: credential.to_string(),
        })
    }

    async fn send_failover_notice(&self, old: Option<&str>, new: &str) -> Result<(), OutboundError> {
        self.record(Notification::Failover {
            old: old.map(str::to_string),
            new: new.to_string(),
        })
    }

    async fn send_notice(&self, message: &str) -> Result<(), OutboundError> {
        self.record(Notification::Notice(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorder_keeps_order_and_can_fail() {
        let ok = RecordingNotifier::new();
        ok.send_notice("started").await.unwrap();
        ok.send_quota_warning(12, "bob (abcd1234...)").await.unwrap();

        assert_eq!(ok.notices(), vec!["started"]);
        assert_eq!(
            ok.events()[1],
            Notification::QuotaWarning { remaining: 12, credential: "bob (abcd1234...)".to_string() }
        );

        let failing = RecordingNotifier::failing();
        assert!(failing.send_error("boom").await.is_err());
        assert_eq!(failing.events().len(), 1);
    }

    #[tokio::test]
    async fn log_and_null_notifiers_accept_everything() {
        for notifier in [&LogNotifier as &dyn Notifier, &NullNotifier] {
            assert!(notifier.send_error("boom").await.is_ok());
            assert!(notifier.send_failover_notice(None, "b").await.is_ok());
        }
    }
}
