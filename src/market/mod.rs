//! Odds provider access.
//!
//! This module handles:
//! - Provider wire types and quote parsing
//! - Sport catalogue and active-sport discovery
//! - Rate-limited provider client
//! - Scripted feed for testing

pub mod client;
pub mod discovery;
pub mod mock;
pub mod types;

pub use client::{FeedRequest, FeedResponse, OddsClient, OddsFeed};
pub use discovery::{discover_active_sports, markets_for_sport, SportEntry};
pub use mock::MockOddsFeed;
pub use types::{Event, MarketKind, OutcomeSide, Quote, QuoteError};
