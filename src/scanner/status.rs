//! Scanner state and status snapshot.

use serde::Serialize;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::credentials::PoolStatus;
use crate::scheduler::SchedulerStats;

/// Scanner lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScannerState {
    /// Cycling through sports.
    Scanning,
    /// Pool exhausted; backing off until a credential is available.
    AwaitingCredential,
    /// Stopped on request. Terminal.
    Stopped,
}

/// Counters maintained by the scan loop.
#[derive(Debug, Clone, Serialize)]
pub struct ScannerStatus {
    /// When the scanner was created.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Current state.
    pub state: ScannerState,
    /// Completed scan cycles.
    pub scan_count: u64,
    /// Opportunities emitted.
    pub opportunities_found: u64,
    /// Opportunities held back by the cooldown.
    pub suppressed: u64,
    /// Errors reported.
    pub errors: u64,
    /// Most recent error.
    pub last_error: Option<String>,
    /// Remaining quota from the last successful response.
    pub requests_remaining: Option<u32>,
    /// Used quota from the last successful response.
    pub requests_used: Option<u32>,
    /// Backoff attempt while awaiting a credential.
    pub retry_attempt: u32,
    /// Sports in the scan list.
    pub sports: usize,
    /// Scheduler figures as of the last cycle.
    pub schedule: Option<SchedulerStats>,
}

impl ScannerStatus {
    /// Fresh status.
    pub fn new(started_at: OffsetDateTime, state: ScannerState) -> Self {
        Self {
            started_at,
            state,
            scan_count: 0,
            opportunities_found: 0,
            suppressed: 0,
            errors: 0,
            last_error: None,
            requests_remaining: None,
            requests_used: None,
            retry_attempt: 0,
            sports: 0,
            schedule: None,
        }
    }
}

/// Status plus credential pool figures, as served to operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Scan loop counters.
    #[serde(flatten)]
    pub scanner: ScannerStatus,
    /// Seconds since `started_at`.
    pub uptime_secs: i64,
    /// Credential pool.
    pub credentials: PoolStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(ScannerState::AwaitingCredential.to_string(), "awaiting_credential");
        assert_eq!("stopped".parse::<ScannerState>().unwrap(), ScannerState::Stopped);

        let status = ScannerStatus::new(datetime!(2026-03-07 15:00 UTC), ScannerState::Scanning);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "scanning");
        assert_eq!(json["started_at"], "2026-03-07T15:00:00Z");
    }
}
