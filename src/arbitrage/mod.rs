//! Surebet detection.
//!
//! This module handles:
//! - Implied probability and stake split for a set of odds
//! - Market extraction from provider events and best-price search

pub mod calculator;
pub mod detector;

pub use calculator::{
    calculate_arbitrage, calculate_arbitrage_with_stake, implied_probability, ArbitrageResult,
    DEFAULT_TOTAL_STAKE,
};
pub use detector::{
    cooldown_key, extract_markets, find_arbitrage, scan_event, ExtractedMarkets, MarketArbitrage,
    Opportunity, OpportunityLeg,
};
