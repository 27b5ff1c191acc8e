//! Odds provider wire types and parsed quotes.

use std::fmt;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Sport listing returned by `GET /sports`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sport {
    /// Sport key (e.g., "soccer_epl").
    pub key: String,
    /// Sport group (e.g., "Soccer").
    #[serde(default)]
    pub group: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Whether the provider currently has events for it.
    #[serde(default)]
    pub active: bool,
    /// Whether the sport only has outright markets.
    #[serde(default)]
    pub has_outrights: bool,
}

/// Event with its bookmaker quotes.
///
/// Also the shape of `GET /sports/{sport}/events` entries, which simply
/// carry no bookmakers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    /// Provider event identifier.
    pub id: String,
    /// Sport key.
    #[serde(default)]
    pub sport_key: String,
    /// Sport title.
    #[serde(default)]
    pub sport_title: Option<String>,
    /// Start time (ISO 8601). Kept raw; parsed defensively by consumers.
    #[serde(default)]
    pub commence_time: Option<String>,
    /// Home team name.
    #[serde(default)]
    pub home_team: String,
    /// Away team name.
    #[serde(default)]
    pub away_team: String,
    /// Quotes per bookmaker.
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

impl Event {
    /// Human label, "Home vs Away".
    pub fn match_label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }
}

/// One bookmaker's markets for an event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bookmaker {
    /// Bookmaker key (e.g., "pinnacle").
    #[serde(default)]
    pub key: String,
    /// Display title (e.g., "Pinnacle").
    #[serde(default)]
    pub title: String,
    /// Markets quoted.
    #[serde(default)]
    pub markets: Vec<MarketQuote>,
}

impl Bookmaker {
    /// Name used on alerts, falling back to the key.
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.key
        } else {
            &self.title
        }
    }
}

/// A bookmaker's quote for one market.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketQuote {
    /// Market key (h2h, totals, spreads, player_points, ...).
    pub key: String,
    /// Outcomes with prices.
    #[serde(default)]
    pub outcomes: Vec<OutcomeQuote>,
}

/// Single priced outcome.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutcomeQuote {
    /// Outcome name ("Arsenal", "Draw", "Over", ...).
    pub name: String,
    /// Decimal odds.
    #[serde(default)]
    pub price: f64,
    /// Line for totals/spreads/props.
    #[serde(default)]
    pub point: Option<f64>,
    /// Player name for props.
    #[serde(default)]
    pub description: Option<String>,
}

/// Score line from `GET /sports/{sport}/scores`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreEvent {
    /// Provider event identifier.
    pub id: String,
    /// Start time (ISO 8601).
    #[serde(default)]
    pub commence_time: Option<String>,
    /// Whether the event is finished.
    #[serde(default)]
    pub completed: bool,
    /// Home team name.
    #[serde(default)]
    pub home_team: String,
    /// Away team name.
    #[serde(default)]
    pub away_team: String,
    /// Per-team scores, absent before kickoff.
    #[serde(default)]
    pub scores: Option<Vec<TeamScore>>,
}

/// One team's score.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamScore {
    /// Team name.
    pub name: String,
    /// Score as reported.
    pub score: String,
}

/// Base market families requested from the odds endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum MarketFamily {
    /// Moneyline / 1X2.
    H2h,
    /// Handicap.
    Spreads,
    /// Over/Under.
    Totals,
}

/// Market a quote belongs to. Lines are part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketKind {
    /// Winner market, 2 or 3 outcomes.
    HeadToHead,
    /// Over/Under at a line.
    Totals {
        /// Threshold (e.g., 2.5 goals).
        line: Decimal,
    },
    /// Handicap, keyed by the home team's signed handicap.
    Spreads {
        /// Home team handicap (e.g., -1.5).
        line: Decimal,
    },
    /// Two-way player prop (Over/Under) at a line.
    PlayerProp {
        /// Provider market key (e.g., "player_points").
        market: String,
        /// Player name.
        player: String,
        /// Threshold.
        line: Decimal,
    },
}

impl MarketKind {
    /// Human label for alerts.
    pub fn label(&self, outcome_count: usize) -> String {
        match self {
            MarketKind::HeadToHead if outcome_count == 3 => "1X2".to_string(),
            MarketKind::HeadToHead => "Moneyline".to_string(),
            MarketKind::Totals { line } => format!("Totals {line}"),
            MarketKind::Spreads { line } => format!("Spread {}", signed(*line)),
            MarketKind::PlayerProp { market, player, line } => {
                format!("{market} {player} {line}")
            }
        }
    }

    /// Stable key used for alert deduplication: market type plus line if any.
    pub fn dedup_key(&self) -> String {
        match self {
            MarketKind::HeadToHead => "h2h".to_string(),
            MarketKind::Totals { line } => format!("totals_{line}"),
            MarketKind::Spreads { line } => format!("spreads_{}", signed(*line)),
            MarketKind::PlayerProp { market, player, line } => {
                format!("{market}_{player}_{line}")
            }
        }
    }
}

fn signed(line: Decimal) -> String {
    if line > Decimal::ZERO {
        format!("+{line}")
    } else {
        line.to_string()
    }
}

/// Which side of a market a quote prices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OutcomeSide {
    /// Named h2h outcome (team or "Draw").
    Named(String),
    /// Totals/props over.
    Over,
    /// Totals/props under.
    Under,
    /// Home team handicap.
    Home,
    /// Away team handicap.
    Away,
}

/// Quote labels that cannot be placed in a market.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// Totals/props side is neither Over nor Under.
    #[error("unknown over/under side {0:?}")]
    UnknownSide(String),
    /// Spread team is neither the home nor the away team.
    #[error("spread team {0:?} is not playing in this event")]
    UnknownTeam(String),
    /// Line missing or not numeric.
    #[error("missing or malformed line in {0:?}")]
    MalformedLine(String),
    /// Player prop without a player name.
    #[error("player prop without player name")]
    MissingPlayer,
    /// Market key this scanner does not search.
    #[error("unsupported market {0:?}")]
    UnsupportedMarket(String),
}

/// A parsed, priced position.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Market this quote belongs to.
    pub kind: MarketKind,
    /// Side it prices.
    pub side: OutcomeSide,
    /// Outcome label for alerts ("Over 2.5", "Arsenal -1.5").
    pub label: String,
    /// Bookmaker display name.
    pub provider: String,
    /// Decimal odds (> 1).
    pub odds: Decimal,
}

impl Quote {
    /// Parse one provider outcome.
    ///
    /// Returns `Ok(None)` for prices that cannot be bet (not above 1).
    /// Totals and spreads accept the line either in `point` or as the last
    /// word of the name ("Over 2.5"); anything else is rejected rather than
    /// grouped under a guessed line.
    pub fn parse(
        event: &Event,
        market_key: &str,
        outcome: &OutcomeQuote,
        provider: &str,
    ) -> Result<Option<Self>, QuoteError> {
        let Some(odds) = Decimal::from_f64(outcome.price).map(|d| d.normalize()) else {
            return Ok(None);
        };
        if odds <= Decimal::ONE {
            return Ok(None);
        }

        let (kind, side, label) = match market_key {
            "h2h" => {
                let name = outcome.name.trim();
                if name.is_empty() {
                    return Err(QuoteError::UnknownSide(outcome.name.clone()));
                }
                (
                    MarketKind::HeadToHead,
                    OutcomeSide::Named(name.to_string()),
                    name.to_string(),
                )
            }
            "totals" => {
                let (side_text, line) = split_line(&outcome.name, outcome.point)?;
                let side = over_under(&side_text)?;
                let label = format!("{} {line}", side_name(&side));
                (MarketKind::Totals { line }, side, label)
            }
            "spreads" => {
                let (team, handicap) = split_line(&outcome.name, outcome.point)?;
                let (side, home_line) = if team == event.home_team {
                    (OutcomeSide::Home, handicap)
                } else if team == event.away_team {
                    (OutcomeSide::Away, -handicap)
                } else {
                    return Err(QuoteError::UnknownTeam(team));
                };
                let label = format!("{team} {}", signed(handicap));
                (MarketKind::Spreads { line: home_line.normalize() }, side, label)
            }
            key if key.starts_with("player_") => {
                let (side_text, line) = split_line(&outcome.name, outcome.point)?;
                let side = over_under(&side_text)?;
                let player = outcome
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or(QuoteError::MissingPlayer)?
                    .to_string();
                let label = format!("{player} {} {line}", side_name(&side));
                (
                    MarketKind::PlayerProp {
                        market: key.to_string(),
                        player,
                        line,
                    },
                    side,
                    label,
                )
            }
            other => return Err(QuoteError::UnsupportedMarket(other.to_string())),
        };

        Ok(Some(Quote {
            kind,
            side,
            label,
            provider: provider.to_string(),
            odds,
        }))
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.label, self.odds, self.provider)
    }
}

/// Split "Side 2.5" or ("Side", point) into the side text and the line.
fn split_line(name: &str, point: Option<f64>) -> Result<(String, Decimal), QuoteError> {
    let name = name.trim();
    match point {
        Some(point) => {
            let line = Decimal::from_f64(point)
                .map(|d| d.normalize())
                .ok_or_else(|| QuoteError::MalformedLine(name.to_string()))?;
            if name.is_empty() {
                return Err(QuoteError::MalformedLine(name.to_string()));
            }
            Ok((name.to_string(), line))
        }
        None => {
            let (side, line) = name
                .rsplit_once(' ')
                .ok_or_else(|| QuoteError::MalformedLine(name.to_string()))?;
            let line: Decimal = line
                .parse()
                .map_err(|_| QuoteError::MalformedLine(name.to_string()))?;
            let side = side.trim();
            if side.is_empty() {
                return Err(QuoteError::MalformedLine(name.to_string()));
            }
            Ok((side.to_string(), line.normalize()))
        }
    }
}

fn over_under(side: &str) -> Result<OutcomeSide, QuoteError> {
    if side.eq_ignore_ascii_case("over") {
        Ok(OutcomeSide::Over)
    } else if side.eq_ignore_ascii_case("under") {
        Ok(OutcomeSide::Under)
    } else {
        Err(QuoteError::UnknownSide(side.to_string()))
    }
}

fn side_name(side: &OutcomeSide) -> &str {
    match side {
        OutcomeSide::Over => "Over",
        OutcomeSide::Under => "Under",
        OutcomeSide::Home => "Home",
        OutcomeSide::Away => "Away",
        OutcomeSide::Named(name) => name,
    }
}
