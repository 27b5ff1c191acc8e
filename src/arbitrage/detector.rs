//! Market extraction and per-market arbitrage search.
//!
//! Each event's bookmaker quotes are parsed into [`Quote`]s, grouped by
//! [`MarketKind`] (lines included), and reduced to the best price per side.
//! Every market with a complete set of sides is then run through the
//! calculator.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::calculator::{calculate_arbitrage, ArbitrageResult};
use crate::market::{Event, MarketKind, OutcomeSide, Quote};

/// Best quote per side for one market.
#[derive(Debug, Clone, Default)]
pub struct MarketBook {
    best: Vec<Quote>,
}

impl MarketBook {
    /// Keep `quote` if it is the first or strictly best price for its side.
    /// Ties keep the provider seen first.
    pub fn offer(&mut self, quote: Quote) {
        match self.best.iter_mut().find(|q| q.side == quote.side) {
            Some(current) if quote.odds > current.odds => *current = quote,
            Some(_) => {}
            None => self.best.push(quote),
        }
    }

    /// Best quote for `side`.
    pub fn best(&self, side: &OutcomeSide) -> Option<&Quote> {
        self.best.iter().find(|q| &q.side == side)
    }

    /// Number of distinct sides quoted.
    pub fn side_count(&self) -> usize {
        self.best.len()
    }

    /// Legs to bet for this market kind, in display order.
    ///
    /// `None` when a side is missing (e.g. an Over without any Under).
    pub fn legs(&self, kind: &MarketKind) -> Option<Vec<&Quote>> {
        match kind {
            MarketKind::HeadToHead => {
                (self.best.len() >= 2).then(|| self.best.iter().collect())
            }
            MarketKind::Totals { .. } | MarketKind::PlayerProp { .. } => {
                Some(vec![self.best(&OutcomeSide::Over)?, self.best(&OutcomeSide::Under)?])
            }
            MarketKind::Spreads { .. } => {
                Some(vec![self.best(&OutcomeSide::Home)?, self.best(&OutcomeSide::Away)?])
            }
        }
    }
}

/// Everything extracted from one event.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMarkets {
    /// Best prices per market, ordered by kind.
    pub books: BTreeMap<MarketKind, MarketBook>,
    /// Every accepted quote, for raw capture.
    pub quotes: Vec<Quote>,
    /// Outcomes dropped for malformed labels.
    pub rejected: usize,
}

/// Parse and group all bookmaker quotes of `event`.
pub fn extract_markets(event: &Event) -> ExtractedMarkets {
    let mut extracted = ExtractedMarkets::default();

    for bookmaker in &event.bookmakers {
        for market in &bookmaker.markets {
            for outcome in &market.outcomes {
                match Quote::parse(event, &market.key, outcome, bookmaker.display_name()) {
                    Ok(Some(quote)) => {
                        extracted.quotes.push(quote.clone());
                        extracted.books.entry(quote.kind.clone()).or_default().offer(quote);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(
                            event = %event.id,
                            bookmaker = %bookmaker.key,
                            market = %market.key,
                            error = %e,
                            "Rejected outcome"
                        );
                        extracted.rejected += 1;
                    }
                }
            }
        }
    }

    extracted
}

/// One bet of an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityLeg {
    /// Bookmaker offering the price.
    pub provider: String,
    /// Outcome label.
    pub outcome: String,
    /// Decimal odds.
    pub odds: rust_decimal::Decimal,
}

impl From<&Quote> for OpportunityLeg {
    fn from(quote: &Quote) -> Self {
        Self {
            provider: quote.provider.clone(),
            outcome: quote.label.clone(),
            odds: quote.odds,
        }
    }
}

/// A market whose best prices form a surebet.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketArbitrage {
    /// Market kind, line included.
    pub kind: MarketKind,
    /// Human label ("1X2", "Totals 2.5").
    pub market_label: String,
    /// Legs in calculator order.
    pub legs: Vec<OpportunityLeg>,
    /// Calculator output.
    pub result: ArbitrageResult,
}

/// Run the calculator over every complete market.
pub fn find_arbitrage(extracted: &ExtractedMarkets) -> Vec<MarketArbitrage> {
    let mut found = Vec::new();

    for (kind, book) in &extracted.books {
        let Some(legs) = book.legs(kind) else {
            continue;
        };
        let odds: Vec<_> = legs.iter().map(|q| q.odds).collect();

        let result = match calculate_arbitrage(&odds) {
            Ok(result) => result,
            Err(e) => {
                debug!(market = ?kind, error = %e, "Skipping market");
                continue;
            }
        };

        if result.is_arbitrage {
            found.push(MarketArbitrage {
                market_label: kind.label(book.side_count()),
                kind: kind.clone(),
                legs: legs.into_iter().map(OpportunityLeg::from).collect(),
                result,
            });
        }
    }

    found
}

/// Extract and search one event.
#[instrument(skip(event), fields(event = %event.id))]
pub fn scan_event(event: &Event) -> (Vec<MarketArbitrage>, ExtractedMarkets) {
    let extracted = extract_markets(event);
    let found = find_arbitrage(&extracted);

    for arb in &found {
        info!(
            match_label = %event.match_label(),
            market = %arb.market_label,
            profit_pct = %arb.result.profit_pct,
            "Surebet detected"
        );
    }

    (found, extracted)
}

/// Alert dedup identifier: event, market type and line.
pub fn cooldown_key(event_id: &str, kind: &MarketKind) -> String {
    format!("{event_id}_{}", kind.dedup_key())
}

/// A surebet ready to be emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opportunity {
    /// Sport key.
    pub sport: String,
    /// League / competition title.
    pub league: String,
    /// Provider event identifier.
    pub event_id: String,
    /// "Home vs Away".
    pub match_label: String,
    /// Market label.
    pub market_label: String,
    /// Market kind, line included.
    pub market: MarketKind,
    /// Legs in stake order.
    pub outcomes: Vec<OpportunityLeg>,
    /// Calculator output.
    pub result: ArbitrageResult,
    /// Detection instant.
    #[serde(with = "time::serde::rfc3339")]
    pub detected_at: OffsetDateTime,
}

impl Opportunity {
    /// Attach event context to a market-level finding.
    pub fn new(event: &Event, arb: MarketArbitrage, detected_at: OffsetDateTime) -> Self {
        Self {
            sport: event.sport_key.clone(),
            league: event
                .sport_title
                .clone()
                .unwrap_or_else(|| event.sport_key.clone()),
            event_id: event.id.clone(),
            match_label: event.match_label(),
            market_label: arb.market_label,
            market: arb.kind,
            outcomes: arb.legs,
            result: arb.result,
            detected_at,
        }
    }

    /// Identifier used by the cooldown cache.
    pub fn cooldown_key(&self) -> String {
        cooldown_key(&self.event_id, &self.market)
    }
}
