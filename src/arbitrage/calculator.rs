//! Surebet math: implied probability and optimal stake split.
//!
//! For decimal odds `o_1..o_n` covering mutually exclusive outcomes, the
//! implied probability sum is `L = Σ 1/o_i`. When `L < 1`, staking
//! `S * (1/o_i) / L` on each outcome returns the same amount `S / L`
//! whatever happens:
//!
//! ```text
//! Odds:    2.10 | 2.10
//! L:       0.4762 + 0.4762 = 0.9524 < 1 ✅
//! Stakes:  50.00 | 50.00
//! Return:  105.00 on 100 staked (+4.76%)
//! ```

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::CalculatorError;

/// Default total stake used for alerts and display.
pub const DEFAULT_TOTAL_STAKE: Decimal = dec!(100);

/// Outcome of evaluating one set of odds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrageResult {
    /// Whether the implied probability sum is below one.
    pub is_arbitrage: bool,
    /// `(1 - L) * 100`, 2 decimals. Negative when there is no arbitrage.
    pub profit_pct: Decimal,
    /// Guaranteed return minus total stake, 2 decimals. Zero without arbitrage.
    pub profit_per_100: Decimal,
    /// Stake per outcome, same order as the input odds, 2 decimals.
    pub stakes: Vec<Decimal>,
    /// `Σ 1/odds`, 4 decimals.
    pub implied_probability_sum: Decimal,
    /// Total stake the split was computed for.
    pub total_stake: Decimal,
}

impl ArbitrageResult {
    /// Amount paid back whichever outcome wins.
    pub fn guaranteed_return(&self) -> Decimal {
        if self.is_arbitrage {
            self.total_stake + self.profit_per_100
        } else {
            Decimal::ZERO
        }
    }
}

/// Sum of implied probabilities, unrounded.
pub fn implied_probability(odds: &[Decimal]) -> Decimal {
    odds.iter().map(|o| Decimal::ONE / *o).sum()
}

/// Evaluate a market with the default 100-unit stake.
pub fn calculate_arbitrage(odds: &[Decimal]) -> Result<ArbitrageResult, CalculatorError> {
    calculate_arbitrage_with_stake(odds, DEFAULT_TOTAL_STAKE)
}

/// Evaluate a market and split `total_stake` across its outcomes.
///
/// Two-way and N-way markets go through the same formula.
pub fn calculate_arbitrage_with_stake(
    odds: &[Decimal],
    total_stake: Decimal,
) -> Result<ArbitrageResult, CalculatorError> {
    if odds.len() < 2 {
        return Err(CalculatorError::too_few_odds(odds.len()));
    }
    if odds.iter().any(|o| *o <= Decimal::ONE) {
        return Err(CalculatorError::odds_not_above_one(odds));
    }
    if total_stake <= Decimal::ZERO {
        return Err(CalculatorError::stake_not_positive(total_stake));
    }

    let implied = implied_probability(odds);
    let is_arbitrage = implied < Decimal::ONE;
    let profit_pct = (Decimal::ONE - implied) * Decimal::ONE_HUNDRED;

    let (stakes, profit_per_100) = if is_arbitrage {
        let raw = odds
            .iter()
            .map(|o| {
                total_stake
                    .checked_mul(Decimal::ONE / *o)
                    .and_then(|s| s.checked_div(implied))
            })
            .collect::<Option<Vec<Decimal>>>()
            .ok_or_else(|| CalculatorError::stake_out_of_range(total_stake))?;
        // Every outcome returns raw_i * odds_i == total_stake / implied.
        let guaranteed_return = raw[0]
            .checked_mul(odds[0])
            .ok_or_else(|| CalculatorError::stake_out_of_range(total_stake))?;
        let stakes = raw.iter().map(|s| s.round_dp(2)).collect();
        (stakes, guaranteed_return - total_stake)
    } else {
        let count = Decimal::from(odds.len());
        (vec![(total_stake / count).round_dp(2); odds.len()], Decimal::ZERO)
    };

    Ok(ArbitrageResult {
        is_arbitrage,
        profit_pct: profit_pct.round_dp(2),
        profit_per_100: profit_per_100.round_dp(2),
        stakes,
        implied_probability_sum: implied.round_dp(4),
        total_stake,
    })
}

/// Shortcut for Over/Under, Home/Away markets.
pub fn calculate_two_way(first: Decimal, second: Decimal) -> Result<ArbitrageResult, CalculatorError> {
    calculate_arbitrage(&[first, second])
}

/// Shortcut for 1X2 markets.
pub fn calculate_three_way(
    home: Decimal,
    draw: Decimal,
    away: Decimal,
) -> Result<ArbitrageResult, CalculatorError> {
    calculate_arbitrage(&[home, draw, away])
}
