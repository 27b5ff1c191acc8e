//! Adaptive scheduler.
//!
//! Maps wall-clock time to a [`ScheduleSlot`] (first match in table order),
//! which sets the scan cadence and the order sports are scanned in. It also
//! tracks slot transitions and flags events that are about to start.
//!
//! All methods take `now` explicitly; the caller owns the clock.

pub mod clock;
pub mod slots;

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{debug, info};

pub use clock::{Clock, ManualClock, SystemClock};
pub use slots::{default_slots, ScheduleSlot};

use crate::error::ScheduleError;
use crate::market::{Event, SportEntry};

/// Result of [`Scheduler::has_slot_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTransition {
    /// The resolved slot differs from the last recorded one.
    pub changed: bool,
    /// Last recorded slot, `None` on the first call.
    pub previous: Option<String>,
    /// Slot resolved now.
    pub current: String,
}

/// Scheduler figures for the status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Current slot name.
    pub current_slot: String,
    /// Current slot label.
    pub slot_label: String,
    /// Current scan interval, seconds.
    pub scan_interval_secs: u64,
    /// Transitions seen since start (the first resolution is not one).
    pub slot_changes: u64,
    /// Events already flagged as imminent.
    pub notified_matches: usize,
}

#[derive(Debug)]
struct CompiledSlot {
    slot: ScheduleSlot,
    patterns: Vec<Regex>,
}

/// Slot resolution plus transition and imminent-event tracking.
#[derive(Debug)]
pub struct Scheduler {
    slots: Vec<CompiledSlot>,
    offset: UtcOffset,
    current: Option<String>,
    slot_changes: u64,
    notified: HashSet<String>,
}

impl Scheduler {
    /// Build a scheduler over `slots`, evaluated in `offset` local time.
    ///
    /// The last slot must cover every day and hour.
    pub fn new(slots: Vec<ScheduleSlot>, offset: UtcOffset) -> Result<Self, ScheduleError> {
        if !slots.last().is_some_and(ScheduleSlot::is_catch_all) {
            return Err(ScheduleError::MissingCatchAll);
        }

        let mut compiled = Vec::with_capacity(slots.len());
        for slot in slots {
            validate(&slot)?;
            let patterns = slot
                .sport_patterns
                .iter()
                .map(|p| glob_to_regex(p))
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push(CompiledSlot { slot, patterns });
        }

        Ok(Self {
            slots: compiled,
            offset,
            current: None,
            slot_changes: 0,
            notified: HashSet::new(),
        })
    }

    /// Built-in slot table.
    pub fn with_default_slots(offset: UtcOffset) -> Result<Self, ScheduleError> {
        Self::new(default_slots(), offset)
    }

    fn resolve(&self, now: OffsetDateTime) -> &CompiledSlot {
        let local = now.to_offset(self.offset);
        let (weekday, hour) = (local.weekday(), local.hour());
        self.slots
            .iter()
            .find(|c| c.slot.matches(weekday, hour))
            // The catch-all checked in `new` always matches.
            .unwrap_or_else(|| &self.slots[self.slots.len() - 1])
    }

    /// Slot active at `now`.
    pub fn current_slot(&self, now: OffsetDateTime) -> &ScheduleSlot {
        &self.resolve(now).slot
    }

    /// Slot by name.
    pub fn slot(&self, name: &str) -> Option<&ScheduleSlot> {
        self.slots.iter().map(|c| &c.slot).find(|s| s.name == name)
    }

    /// Pause between cycles at `now`.
    pub fn scan_interval(&self, now: OffsetDateTime) -> Duration {
        self.current_slot(now).scan_interval()
    }

    /// Reorder `sports` so entries matching the current slot's patterns come
    /// first, in pattern order, followed by the rest in original order.
    pub fn prioritize_sports(&self, sports: &[SportEntry], now: OffsetDateTime) -> Vec<SportEntry> {
        let compiled = self.resolve(now);
        let mut taken = vec![false; sports.len()];
        let mut ordered = Vec::with_capacity(sports.len());

        for pattern in &compiled.patterns {
            for (i, sport) in sports.iter().enumerate() {
                if !taken[i] && pattern.is_match(&sport.key) {
                    taken[i] = true;
                    ordered.push(sport.clone());
                }
            }
        }
        for (i, sport) in sports.iter().enumerate() {
            if !taken[i] {
                ordered.push(sport.clone());
            }
        }

        ordered
    }

    /// Compare the slot at `now` with the last recorded one and record it.
    pub fn has_slot_changed(&mut self, now: OffsetDateTime) -> SlotTransition {
        let current = self.current_slot(now).name.clone();

        match self.current.replace(current.clone()) {
            None => SlotTransition {
                changed: true,
                previous: None,
                current,
            },
            Some(previous) if previous != current => {
                self.slot_changes += 1;
                info!(from = %previous, to = %current, "Schedule slot changed");
                SlotTransition {
                    changed: true,
                    previous: Some(previous),
                    current,
                }
            }
            Some(previous) => SlotTransition {
                changed: false,
                previous: Some(previous),
                current,
            },
        }
    }

    /// Events starting within `[now, now + window_minutes]` not returned before.
    ///
    /// Missing or malformed start times are skipped.
    pub fn upcoming_matches(
        &mut self,
        events: &[Event],
        now: OffsetDateTime,
        window_minutes: u32,
    ) -> Vec<Event> {
        let until = now + time::Duration::minutes(window_minutes as i64);
        let mut upcoming = Vec::new();

        for event in events {
            let Some(start) = event.commence_time.as_deref().and_then(parse_start_time) else {
                debug!(event = %event.id, "Skipping event without usable start time");
                continue;
            };
            if start < now || start > until {
                continue;
            }
            if self.notified.insert(event.id.clone()) {
                upcoming.push(event.clone());
            }
        }

        upcoming
    }

    /// Forget which events were already flagged.
    pub fn clear_notified(&mut self) {
        self.notified.clear();
    }

    /// Figures for the status snapshot.
    pub fn stats(&self, now: OffsetDateTime) -> SchedulerStats {
        let slot = self.current_slot(now);
        SchedulerStats {
            current_slot: slot.name.clone(),
            slot_label: slot.label.clone(),
            scan_interval_secs: slot.scan_interval_secs,
            slot_changes: self.slot_changes,
            notified_matches: self.notified.len(),
        }
    }
}

fn validate(slot: &ScheduleSlot) -> Result<(), ScheduleError> {
    let invalid = |reason: &str| ScheduleError::InvalidSlot {
        slot: slot.name.clone(),
        reason: reason.to_string(),
    };
    if slot.weekdays.is_empty() {
        return Err(invalid("no weekdays"));
    }
    if slot.hours.start >= slot.hours.end || slot.hours.end > 24 {
        return Err(invalid("hour range must satisfy start < end <= 24"));
    }
    if slot.scan_interval_secs == 0 {
        return Err(invalid("scan interval must be positive"));
    }
    Ok(())
}

/// Compile a shell-style glob (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, ScheduleError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|source| ScheduleError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_start_time(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(raw, naive)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
