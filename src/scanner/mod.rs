//! Surebet scan loop.
//!
//! This module handles:
//! - The scan cycle and credential backoff ([`Scanner`])
//! - Alert dedup ([`CooldownCache`])
//! - Status and stop requests from outside the loop ([`ScannerHandle`])

pub mod cooldown;
pub mod engine;
pub mod status;

pub use cooldown::CooldownCache;
pub use engine::{CycleReport, Scanner, ScannerHandle, ScannerSettings};
pub use status::{ScannerState, ScannerStatus, StatusSnapshot};
