//! Unified error types for the surebet scanner.

use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the surebet scanner.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Arbitrage calculation error.
    #[error("calculator error: {0}")]
    Calculator(#[from] CalculatorError),

    /// Odds feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Credential pool error.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Scheduler construction error.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment could not be deserialized.
    #[error("environment: {0}")]
    Env(#[from] envy::Error),

    /// A field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field (env var name).
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Arbitrage calculator input errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculatorError {
    /// Odds list or stake cannot be evaluated.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CalculatorError {
    pub(crate) fn too_few_odds(count: usize) -> Self {
        Self::InvalidInput(format!("at least 2 odds are required, got {count}"))
    }

    pub(crate) fn odds_not_above_one(odds: &[Decimal]) -> Self {
        let invalid: Vec<String> = odds
            .iter()
            .filter(|o| **o <= Decimal::ONE)
            .map(|o| o.to_string())
            .collect();
        Self::InvalidInput(format!(
            "odds must be greater than 1.0, got [{}]",
            invalid.join(", ")
        ))
    }

    pub(crate) fn stake_not_positive(stake: Decimal) -> Self {
        Self::InvalidInput(format!("total stake must be positive, got {stake}"))
    }

    pub(crate) fn stake_out_of_range(stake: Decimal) -> Self {
        Self::InvalidInput(format!("total stake is too large to split, got {stake}"))
    }
}

/// Odds feed errors that are not encoded in a `FeedResponse`.
#[derive(Error, Debug)]
pub enum FeedError {
    /// HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    /// Base URL is unusable.
    #[error("invalid base url {url}: {reason}")]
    InvalidBaseUrl {
        /// Configured URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// Response payload did not have the expected shape.
    #[error("unexpected payload for {endpoint}: {reason}")]
    Payload {
        /// Endpoint path.
        endpoint: String,
        /// Decoder message.
        reason: String,
    },

    /// Request failed (non-200 or transport error).
    #[error("request to {endpoint} failed with status {status}: {message}")]
    Request {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status (0 for transport errors).
        status: u16,
        /// Body or transport message.
        message: String,
    },
}

/// Credential pool errors.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Every credential in the pool is marked invalid.
    #[error("all {total} credentials are exhausted")]
    Exhausted {
        /// Pool size.
        total: usize,
    },

    /// Pool is exhausted and generation is turned off.
    #[error("credential generation is disabled")]
    GenerationDisabled,

    /// Generation job ran but produced nothing usable.
    #[error("credential generation failed: {0}")]
    GenerationFailed(String),

    /// Generation job exceeded its ceiling.
    #[error("credential generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// Backing store could not be read or written.
    #[error("credential store error: {0}")]
    Store(#[from] std::io::Error),
}

/// Scheduler construction errors.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The slot table has no final catch-all slot.
    #[error("slot table must end with a catch-all slot covering every day and hour")]
    MissingCatchAll,

    /// A slot is malformed.
    #[error("slot {slot}: {reason}")]
    InvalidSlot {
        /// Slot name.
        slot: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A sport priority glob could not be compiled.
    #[error("invalid sport pattern {pattern:?}: {source}")]
    Pattern {
        /// Glob as configured.
        pattern: String,
        /// Regex compiler error.
        #[source]
        source: regex::Error,
    },
}

/// Notifier or persistence collaborator failure. Logged, never propagated
/// out of the scan loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutboundError {
    /// Message could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Record could not be written.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
