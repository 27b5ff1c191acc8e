//! Sport catalogue, per-sport market selection and active-sport discovery.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::client::{FeedRequest, OddsFeed};
use super::types::Sport;
use crate::error::FeedError;

/// Bookmakers queried when none are configured.
pub const DEFAULT_BOOKMAKERS: &[&str] = &[
    "betclic",
    "unibet_fr",
    "winamax_fr",
    "pmu",
    "parionssport",
    "netbet_fr",
    "pinnacle",
    "betway",
    "bet365",
    "1xbet",
];

/// Football competitions, key and display name.
pub const FOOTBALL_LEAGUES: &[(&str, &str)] = &[
    ("soccer_france_ligue_one", "Ligue 1"),
    ("soccer_epl", "Premier League"),
    ("soccer_spain_la_liga", "La Liga"),
    ("soccer_italy_serie_a", "Serie A"),
    ("soccer_germany_bundesliga", "Bundesliga"),
    ("soccer_brazil_campeonato", "Brasileirão"),
    ("soccer_turkey_super_league", "Superlig"),
    ("soccer_portugal_primeira_liga", "Liga Portugal"),
    ("soccer_uefa_champs_league", "Champions League"),
    ("soccer_uefa_europa_league", "Europa League"),
    ("soccer_uefa_europa_conference_league", "Conference League"),
    ("soccer_fa_cup", "FA Cup"),
    ("soccer_england_efl_cup", "Carabao Cup"),
    ("soccer_spain_copa_del_rey", "Copa del Rey"),
    ("soccer_france_coupe_de_france", "Coupe de France"),
    ("soccer_italy_coppa_italia", "Coppa Italia"),
    ("soccer_germany_dfb_pokal", "DFB Pokal"),
    ("soccer_usa_mls", "MLS"),
];

/// Other known competitions.
pub const OTHER_LEAGUES: &[(&str, &str)] = &[
    ("basketball_nba", "NBA"),
    ("americanfootball_nfl", "NFL"),
    ("tennis_atp_us_open", "US Open"),
    ("tennis_atp_wimbledon", "Wimbledon"),
    ("tennis_atp_french_open", "Roland Garros"),
    ("tennis_atp_aus_open_singles", "Australian Open"),
];

/// Football leagues with player props.
const FOOTBALL_PROP_LEAGUES: &[&str] = &[
    "soccer_epl",
    "soccer_france_ligue_one",
    "soccer_germany_bundesliga",
    "soccer_italy_serie_a",
    "soccer_spain_la_liga",
    "soccer_usa_mls",
];

/// Over/Under football player props.
pub const FOOTBALL_PLAYER_PROPS: &[&str] = &["player_shots", "player_shots_on_target"];

/// Over/Under basketball player props.
pub const BASKETBALL_PLAYER_PROPS: &[&str] = &[
    "player_points",
    "player_rebounds",
    "player_assists",
    "player_threes",
    "player_points_rebounds_assists",
];

/// Over/Under American football player props.
pub const NFL_PLAYER_PROPS: &[&str] = &[
    "player_pass_tds",
    "player_pass_yds",
    "player_rush_yds",
    "player_reception_yds",
];

/// A sport to scan, in scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SportEntry {
    /// Provider sport key.
    pub key: String,
    /// Display name.
    pub name: String,
}

impl SportEntry {
    /// Entry for `key`, named from the catalogue when known.
    pub fn new(key: &str) -> Self {
        let name = FOOTBALL_LEAGUES
            .iter()
            .chain(OTHER_LEAGUES)
            .find(|(k, _)| *k == key)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| key.to_string());
        Self {
            key: key.to_string(),
            name,
        }
    }
}

/// Football leagues plus NBA.
pub fn default_sports() -> Vec<String> {
    FOOTBALL_LEAGUES
        .iter()
        .map(|(key, _)| key.to_string())
        .chain(std::iter::once("basketball_nba".to_string()))
        .collect()
}

/// Build scan entries for `keys`.
pub fn sport_entries(keys: &[String]) -> Vec<SportEntry> {
    keys.iter().map(|k| SportEntry::new(k)).collect()
}

/// Base markets requested for a sport.
pub fn markets_for_sport(sport_key: &str) -> &'static str {
    if sport_key.starts_with("soccer_") {
        "h2h,totals"
    } else if sport_key.starts_with("basketball_") || sport_key.starts_with("americanfootball_") {
        "h2h,spreads,totals"
    } else {
        "h2h"
    }
}

/// Player-prop markets available through the per-event endpoint.
pub fn player_props_for_sport(sport_key: &str) -> &'static [&'static str] {
    if FOOTBALL_PROP_LEAGUES.contains(&sport_key) {
        FOOTBALL_PLAYER_PROPS
    } else if sport_key == "basketball_nba" {
        BASKETBALL_PLAYER_PROPS
    } else if sport_key == "americanfootball_nfl" {
        NFL_PLAYER_PROPS
    } else {
        &[]
    }
}

/// Keep the configured sports the provider reports as active, in order.
#[instrument(skip(feed, api_key, configured))]
pub async fn discover_active_sports(
    feed: &dyn OddsFeed,
    api_key: &str,
    configured: &[String],
) -> Result<Vec<String>, FeedError> {
    let request = FeedRequest::Sports { all: false };
    let sports: Vec<Sport> = feed.fetch(api_key, &request).await.decode(request.endpoint())?;

    let active: HashSet<&str> = sports
        .iter()
        .filter(|s| s.active)
        .map(|s| s.key.as_str())
        .collect();

    let (kept, dropped): (Vec<String>, Vec<String>) = configured
        .iter()
        .cloned()
        .partition(|key| active.contains(key.as_str()));

    if !dropped.is_empty() {
        warn!(?dropped, "Skipping inactive sports");
    }
    info!(active = kept.len(), "Sport discovery complete");

    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::client::FeedResponse;
    use crate::market::mock::MockOddsFeed;
    use serde_json::json;

    #[test]
    fn market_selection_by_sport_family() {
        assert_eq!(markets_for_sport("soccer_epl"), "h2h,totals");
        assert_eq!(markets_for_sport("basketball_nba"), "h2h,spreads,totals");
        assert_eq!(markets_for_sport("americanfootball_nfl"), "h2h,spreads,totals");
        assert_eq!(markets_for_sport("tennis_atp_wimbledon"), "h2h");
    }

    #[test]
    fn player_props_only_for_covered_leagues() {
        assert_eq!(player_props_for_sport("soccer_epl"), FOOTBALL_PLAYER_PROPS);
        assert!(player_props_for_sport("soccer_fa_cup").is_empty());
        assert_eq!(player_props_for_sport("basketball_nba").len(), 5);
    }

    #[test]
    fn catalogue_names() {
        assert_eq!(SportEntry::new("soccer_epl").name, "Premier League");
        assert_eq!(SportEntry::new("cricket_ipl").name, "cricket_ipl");
        assert_eq!(default_sports().len(), FOOTBALL_LEAGUES.len() + 1);
        assert_eq!(default_sports().last().map(String::as_str), Some("basketball_nba"));
    }

    #[tokio::test]
    async fn discovery_keeps_active_sports_in_order() {
        let feed = MockOddsFeed::new();
        feed.push_response(FeedResponse::ok(
            json!([
                {"key": "basketball_nba", "active": true},
                {"key": "soccer_epl", "active": true},
                {"key": "soccer_fa_cup", "active": false}
            ]),
            100,
            1,
        ));
        let configured = vec![
            "soccer_epl".to_string(),
            "soccer_fa_cup".to_string(),
            "basketball_nba".to_string(),
        ];

        let kept = discover_active_sports(&feed, "k", &configured).await.unwrap();

        assert_eq!(kept, vec!["soccer_epl", "basketball_nba"]);
    }

    #[tokio::test]
    async fn discovery_failure_is_an_error() {
        let feed = MockOddsFeed::new();
        feed.push_response(FeedResponse::failed(500, "boom"));

        let result = discover_active_sports(&feed, "k", &["soccer_epl".to_string()]).await;

        assert!(matches!(result, Err(FeedError::Request { status: 500, .. })));
    }
}
