//! Multi-bookmaker surebet scanner.
//!
//! Polls an odds aggregator for many sports and bookmakers, finds sets of
//! mutually exclusive bets whose implied probabilities sum below one, and
//! reports them. A surebet pays the same amount whichever outcome wins:
//!
//! ```text
//! Home @ 2.10 (Betclic)   stake 50.00  returns 105.00
//! Away @ 2.10 (Unibet)    stake 50.00  returns 105.00
//! ─────────────────────────────────────────────────
//! Σ 1/odds = 0.9524 < 1   profit 4.76% guaranteed
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`arbitrage`]: Calculator and market-level surebet search
//! - [`market`]: Provider wire types, client and sport catalogue
//! - [`credentials`]: Credential store, generation and failover pool
//! - [`scheduler`]: Time slots driving scan cadence and sport priority
//! - [`scanner`]: The scan loop, cooldown and status
//! - [`outbound`]: Notifier and record-keeping collaborators
//! - [`api`]: HTTP API for health/status/stop/metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod credentials;
pub mod error;
pub mod market;
pub mod metrics;
pub mod outbound;
pub mod scanner;
pub mod scheduler;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
