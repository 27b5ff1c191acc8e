//! Time slots and the built-in slot table.

use std::ops::Range;
use std::time::Duration;

use serde::Serialize;
use time::Weekday;

/// Every day of the week.
pub const ALL_DAYS: [Weekday; 7] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
    Weekday::Saturday,
    Weekday::Sunday,
];

/// Monday to Friday.
pub const WEEKDAYS: [Weekday; 5] = [
    Weekday::Monday,
    Weekday::Tuesday,
    Weekday::Wednesday,
    Weekday::Thursday,
    Weekday::Friday,
];

/// Saturday and Sunday.
pub const WEEKEND: [Weekday; 2] = [Weekday::Saturday, Weekday::Sunday];

/// A named time window with its own cadence and sport priorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    /// Stable name ("live_weekend").
    pub name: String,
    /// Human label.
    pub label: String,
    /// What the slot is for.
    pub description: String,
    /// Days the slot applies to.
    #[serde(skip)]
    pub weekdays: Vec<Weekday>,
    /// Hours covered, `[start, end)` in the schedule's wall clock.
    pub hours: Range<u8>,
    /// Seconds between scan cycles.
    pub scan_interval_secs: u64,
    /// Sport key globs scanned first, in order.
    pub sport_patterns: Vec<String>,
}

impl ScheduleSlot {
    /// Whether the slot covers `weekday` at `hour`.
    pub fn matches(&self, weekday: Weekday, hour: u8) -> bool {
        self.weekdays.contains(&weekday) && self.hours.contains(&hour)
    }

    /// Covers every day and hour.
    pub fn is_catch_all(&self) -> bool {
        ALL_DAYS.iter().all(|d| self.weekdays.contains(d)) && self.hours == (0..24)
    }

    /// Pause between cycles.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

fn slot(
    name: &str,
    label: &str,
    description: &str,
    weekdays: &[Weekday],
    hours: Range<u8>,
    scan_interval_secs: u64,
    sport_patterns: &[&str],
) -> ScheduleSlot {
    ScheduleSlot {
        name: name.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        weekdays: weekdays.to_vec(),
        hours,
        scan_interval_secs,
        sport_patterns: sport_patterns.iter().map(|p| p.to_string()).collect(),
    }
}

/// Built-in slots, highest priority first, catch-all last.
pub fn default_slots() -> Vec<ScheduleSlot> {
    vec![
        slot(
            "live_weekend",
            "Weekend live",
            "Weekend afternoon and evening fixtures, odds move fast",
            &WEEKEND,
            14..23,
            5,
            &["soccer_*", "basketball_*"],
        ),
        slot(
            "evening_weekday",
            "Weekday evening",
            "Midweek evening fixtures",
            &WEEKDAYS,
            19..23,
            5,
            &["soccer_*", "basketball_*"],
        ),
        slot(
            "boosted_odds",
            "Boosted odds",
            "Bookmakers publish boosted prices ahead of the evening",
            &ALL_DAYS,
            17..20,
            7,
            &["soccer_*"],
        ),
        slot(
            "morning_realignment",
            "Morning realignment",
            "Lines realign after overnight US results",
            &ALL_DAYS,
            9..10,
            8,
            &["basketball_*", "americanfootball_*", "soccer_*"],
        ),
        slot(
            "default",
            "Default",
            "Regular scanning",
            &ALL_DAYS,
            0..24,
            15,
            &["*"],
        ),
    ]
}
