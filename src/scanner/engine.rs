//! Scan loop.
//!
//! One worker drives the loop. Each cycle resolves the schedule slot, walks
//! the sports in slot priority order, fetches odds with the active
//! credential, runs the detector and emits what survives the cooldown.
//! Quota errors fail the pool over; when the pool is exhausted the loop
//! backs off until a credential is available again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::arbitrage::{scan_event, Opportunity};
use crate::config::Config;
use crate::credentials::{Credential, CredentialPool, Switch};
use crate::market::discovery::{player_props_for_sport, sport_entries};
use crate::market::{
    discover_active_sports, markets_for_sport, Event, FeedRequest, FeedResponse, OddsFeed,
    SportEntry,
};
use crate::metrics;
use crate::outbound::{
    ErrorLevel, LogNotifier, LogStore, Notifier, OpportunityStore, RawOddsBatch, RawQuote,
};
use crate::scheduler::{Clock, Scheduler, SystemClock};

use super::cooldown::CooldownCache;
use super::status::{ScannerState, ScannerStatus, StatusSnapshot};

/// Events listed in one imminent-event notice.
const MAX_LISTED_EVENTS: usize = 10;

/// Scan loop settings.
#[derive(Debug, Clone)]
pub struct ScannerSettings {
    /// Sport keys to scan.
    pub sports: Vec<String>,
    /// Provider region filter.
    pub regions: String,
    /// Provider bookmaker filter.
    pub bookmakers: Option<String>,
    /// Alert dedup window.
    pub cooldown: time::Duration,
    /// Opportunities kept for the API.
    pub history_limit: usize,
    /// Remaining quota below which a warning is sent.
    pub low_quota_threshold: u32,
    /// Backoff cap, minutes.
    pub max_backoff_minutes: u64,
    /// Imminent-event window, minutes.
    pub lineup_alert_minutes: u32,
    /// Also query player-prop markets per event.
    pub scan_event_props: bool,
    /// Drop sports the provider reports inactive at startup.
    pub discover_sports: bool,
}

impl ScannerSettings {
    /// Settings from config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            sports: config.sport_keys(),
            regions: config.regions.clone(),
            bookmakers: config.bookmakers_param(),
            cooldown: config.cooldown(),
            history_limit: config.history_limit,
            low_quota_threshold: config.low_quota_threshold,
            max_backoff_minutes: config.max_backoff_minutes,
            lineup_alert_minutes: config.lineup_alert_minutes,
            scan_event_props: config.scan_event_props,
            discover_sports: config.discover_sports,
        }
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Sports whose odds were fetched and searched.
    pub sports_scanned: usize,
    /// Events searched.
    pub events_scanned: usize,
    /// Opportunities emitted.
    pub emitted: Vec<Opportunity>,
    /// Opportunities held back by the cooldown.
    pub suppressed: usize,
    /// Errors reported.
    pub errors: usize,
    /// Remaining quota after the last successful request.
    pub quota_remaining: Option<u32>,
    /// Credential label of the last successful request.
    pub quota_credential: Option<String>,
    /// The pool ran dry during the cycle.
    pub exhausted: bool,
}

#[derive(Debug)]
struct Shared {
    status: RwLock<ScannerStatus>,
    history: RwLock<VecDeque<Opportunity>>,
}

/// Cloneable view of a running scanner: status, history and stop.
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    shared: Arc<Shared>,
    pool: Arc<CredentialPool>,
    clock: Arc<dyn Clock>,
    stop: Arc<watch::Sender<bool>>,
}

impl ScannerHandle {
    /// Ask the loop to stop at its next boundary.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Current state.
    pub async fn state(&self) -> ScannerState {
        self.shared.status.read().await.state
    }

    /// Status with pool figures.
    pub async fn status(&self) -> StatusSnapshot {
        let scanner = self.shared.status.read().await.clone();
        let uptime_secs = (self.clock.now() - scanner.started_at).whole_seconds().max(0);
        StatusSnapshot {
            scanner,
            uptime_secs,
            credentials: self.pool.status(),
        }
    }

    /// Up to `limit` most recent opportunities, newest first.
    pub async fn recent_opportunities(&self, limit: usize) -> Vec<Opportunity> {
        self.shared
            .history
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

enum Fetch {
    Ok(FeedResponse),
    Skipped,
    Exhausted,
}

/// The surebet scanner.
pub struct Scanner {
    feed: Arc<dyn OddsFeed>,
    pool: Arc<CredentialPool>,
    scheduler: Scheduler,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn OpportunityStore>,
    clock: Arc<dyn Clock>,
    settings: ScannerSettings,
    sports: Vec<SportEntry>,
    cooldown: CooldownCache,
    state: ScannerState,
    retry_attempt: u32,
    shared: Arc<Shared>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl Scanner {
    /// Scanner reporting to the log, on system time.
    pub fn new(
        feed: Arc<dyn OddsFeed>,
        pool: Arc<CredentialPool>,
        scheduler: Scheduler,
        settings: ScannerSettings,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sports = sport_entries(&settings.sports);
        let mut status = ScannerStatus::new(clock.now(), ScannerState::Scanning);
        status.sports = sports.len();
        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            feed,
            pool,
            scheduler,
            notifier: Arc::new(LogNotifier),
            store: Arc::new(LogStore),
            clock,
            cooldown: CooldownCache::new(settings.cooldown),
            settings,
            sports,
            state: ScannerState::Scanning,
            retry_attempt: 0,
            shared: Arc::new(Shared {
                status: RwLock::new(status),
                history: RwLock::new(VecDeque::new()),
            }),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Send alerts to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Send records to `store`.
    pub fn with_store(mut self, store: Arc<dyn OpportunityStore>) -> Self {
        self.store = store;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.status.get_mut().started_at = clock.now();
        }
        self.clock = clock;
        self
    }

    /// Handle for status queries and stop requests.
    pub fn handle(&self) -> ScannerHandle {
        ScannerHandle {
            shared: Arc::clone(&self.shared),
            pool: Arc::clone(&self.pool),
            clock: Arc::clone(&self.clock),
            stop: Arc::clone(&self.stop_tx),
        }
    }

    /// Current state.
    pub fn state(&self) -> ScannerState {
        self.state
    }

    /// Sports in scan list order (before slot prioritisation).
    pub fn sports(&self) -> &[SportEntry] {
        &self.sports
    }

    /// Prepare for scanning: make sure a credential is available and
    /// optionally narrow the sport list to active sports.
    pub async fn start(&mut self) {
        let now = self.clock.now();
        self.shared.status.write().await.started_at = now;

        if self.pool.usable_credential().is_none() {
            if self.pool.can_generate() {
                info!("No usable credential at startup, generating one");
                match self.pool.regenerate().await {
                    Ok(switch) => self.announce_switch(&switch).await,
                    Err(e) => {
                        warn!(error = %e, "Startup credential generation failed");
                        self.enter_awaiting().await;
                    }
                }
            } else {
                self.enter_awaiting().await;
            }
        }

        if self.settings.discover_sports && self.state == ScannerState::Scanning {
            self.discover_sports().await;
        }
        self.shared.status.write().await.sports = self.sports.len();
        info!(sports = self.sports.len(), state = %self.state, "Scanner ready");
    }

    /// Run until stopped.
    pub async fn run(mut self) {
        self.start().await;

        loop {
            if self.stop_requested() {
                break;
            }
            match self.state {
                ScannerState::Scanning => {
                    self.scan_once().await;
                    if self.state != ScannerState::Scanning {
                        continue;
                    }
                    let interval = self.scheduler.scan_interval(self.clock.now());
                    debug!(interval_secs = interval.as_secs(), "Waiting for next cycle");
                    if self.sleep_or_stop(interval).await {
                        break;
                    }
                }
                ScannerState::AwaitingCredential => self.await_credential().await,
                ScannerState::Stopped => break,
            }
        }

        self.set_state(ScannerState::Stopped).await;
        info!("Scanner stopped");
        self.notice("Scanner stopped").await;
    }

    /// One pass over every sport.
    #[instrument(skip(self))]
    pub async fn scan_once(&mut self) -> CycleReport {
        let now = self.clock.now();
        self.check_slot(now).await;
        let ordered = self.scheduler.prioritize_sports(&self.sports, now);
        let mut report = CycleReport::default();
        let _timer = metrics::timer_scan_cycle();
        metrics::inc_scan_cycles();

        for sport in &ordered {
            if self.stop_requested() {
                break;
            }
            if !self.scan_sport(sport, &mut report).await {
                report.exhausted = true;
                break;
            }
        }

        if report.exhausted {
            self.enter_awaiting().await;
        }

        let end = self.clock.now();
        let purged = self.cooldown.purge(end);
        if purged > 0 {
            debug!(purged, "Expired cooldowns dropped");
        }
        self.warn_low_quota(&report).await;

        {
            let mut status = self.shared.status.write().await;
            status.scan_count += 1;
            status.state = self.state;
            status.schedule = Some(self.scheduler.stats(end));
        }

        info!(
            sports = report.sports_scanned,
            events = report.events_scanned,
            emitted = report.emitted.len(),
            suppressed = report.suppressed,
            errors = report.errors,
            "Scan cycle complete"
        );
        report
    }

    /// Returns `false` when the pool ran dry.
    #[instrument(skip(self, sport, report), fields(sport = %sport.key))]
    async fn scan_sport(&mut self, sport: &SportEntry, report: &mut CycleReport) -> bool {
        let request = FeedRequest::Odds {
            sport: sport.key.clone(),
            regions: self.settings.regions.clone(),
            markets: markets_for_sport(&sport.key).to_string(),
            bookmakers: self.settings.bookmakers.clone(),
        };
        let response = match self.fetch_with_failover(&request, report).await {
            Fetch::Ok(response) => response,
            Fetch::Skipped => return true,
            Fetch::Exhausted => return false,
        };
        let events = match response.events() {
            Ok(events) => events,
            Err(e) => {
                self.report_error(e.to_string(), report).await;
                return true;
            }
        };

        report.sports_scanned += 1;
        report.events_scanned += events.len();
        let now = self.clock.now();
        let mut raw = Vec::new();

        for event in &events {
            let (found, extracted) = scan_event(event);
            if extracted.rejected > 0 {
                debug!(event = %event.id, rejected = extracted.rejected, "Quotes rejected");
            }
            raw.extend(extracted.quotes.iter().map(|q| RawQuote::new(event, q)));
            for arb in found {
                self.emit(Opportunity::new(event, arb, now), report).await;
            }
        }

        if !raw.is_empty() {
            let batch = RawOddsBatch {
                sport: sport.key.clone(),
                captured_at: now,
                quotes: raw,
            };
            if let Err(e) = self.store.save_raw_odds(&batch).await {
                warn!(error = %e, "Failed to store raw odds");
            }
        }

        self.alert_imminent(&events, now).await;

        if self.settings.scan_event_props && !self.scan_event_props(sport, &events, report).await {
            return false;
        }

        debug!(events = events.len(), "Sport scanned");
        true
    }

    /// Player-prop markets through the per-event endpoint.
    async fn scan_event_props(
        &mut self,
        sport: &SportEntry,
        events: &[Event],
        report: &mut CycleReport,
    ) -> bool {
        let props = player_props_for_sport(&sport.key);
        if props.is_empty() {
            return true;
        }
        let markets = props.join(",");

        for event in events {
            if self.stop_requested() {
                break;
            }
            let request = FeedRequest::EventOdds {
                sport: sport.key.clone(),
                event_id: event.id.clone(),
                regions: self.settings.regions.clone(),
                markets: markets.clone(),
                bookmakers: self.settings.bookmakers.clone(),
            };
            let response = match self.fetch_with_failover(&request, report).await {
                Fetch::Ok(response) => response,
                Fetch::Skipped => continue,
                Fetch::Exhausted => return false,
            };
            let detailed = match response.event() {
                Ok(event) => event,
                Err(e) => {
                    debug!(event = %event.id, error = %e, "Unreadable event odds");
                    continue;
                }
            };

            let now = self.clock.now();
            let (found, _) = scan_event(&detailed);
            for arb in found {
                self.emit(Opportunity::new(&detailed, arb, now), report).await;
            }
        }
        true
    }

    /// Fetch with the active credential; on a quota error fail over and
    /// retry once.
    async fn fetch_with_failover(&mut self, request: &FeedRequest, report: &mut CycleReport) -> Fetch {
        let mut retried = false;
        loop {
            let Some(credential) = self.pool.usable_credential() else {
                return Fetch::Exhausted;
            };
            let response = self.feed.fetch(&credential.secret, request).await;
            if response.success {
                self.record_quota(&credential, &response, report).await;
                return Fetch::Ok(response);
            }

            let outcome = self
                .pool
                .handle_error(&credential.secret, response.status_code, response.error_text())
                .await;
            match outcome {
                Ok(None) => {
                    let message = format!(
                        "{} request failed (HTTP {}): {}",
                        request.endpoint(),
                        response.status_code,
                        response.error_text()
                    );
                    self.report_error(message, report).await;
                    return Fetch::Skipped;
                }
                Ok(Some(switch)) => {
                    self.announce_switch(&switch).await;
                    if retried {
                        return Fetch::Skipped;
                    }
                    retried = true;
                }
                Err(e) => {
                    self.report_error(format!("Credential pool exhausted: {e}"), report).await;
                    return Fetch::Exhausted;
                }
            }
        }
    }

    async fn emit(&mut self, opportunity: Opportunity, report: &mut CycleReport) {
        let key = opportunity.cooldown_key();
        if !self.cooldown.try_register(&key, opportunity.detected_at) {
            debug!(key = %key, "Opportunity in cooldown");
            report.suppressed += 1;
            metrics::inc_opportunities_suppressed();
            self.shared.status.write().await.suppressed += 1;
            return;
        }

        info!(
            match_label = %opportunity.match_label,
            market = %opportunity.market_label,
            profit_pct = %opportunity.result.profit_pct,
            "Surebet found"
        );
        metrics::inc_opportunities_detected(&opportunity.sport);

        {
            let mut history = self.shared.history.write().await;
            while history.len() >= self.settings.history_limit.max(1) {
                history.pop_front();
            }
            history.push_back(opportunity.clone());
        }
        self.shared.status.write().await.opportunities_found += 1;

        if let Err(e) = self.notifier.send_opportunity(&opportunity).await {
            warn!(error = %e, "Failed to deliver opportunity");
        }
        if let Err(e) = self.store.save_opportunity(&opportunity).await {
            warn!(error = %e, "Failed to store opportunity");
        }
        report.emitted.push(opportunity);
    }

    async fn record_quota(&self, credential: &Credential, response: &FeedResponse, report: &mut CycleReport) {
        report.quota_remaining = Some(response.quota_remaining);
        report.quota_credential = Some(credential.label());
        metrics::set_quota_remaining(response.quota_remaining);
        {
            let mut status = self.shared.status.write().await;
            status.requests_remaining = Some(response.quota_remaining);
            status.requests_used = Some(response.quota_used);
        }
        if let Err(e) = self
            .store
            .log_api_usage(&credential.identifier, response.quota_used, response.quota_remaining)
            .await
        {
            warn!(error = %e, "Failed to log API usage");
        }
    }

    async fn warn_low_quota(&self, report: &CycleReport) {
        let Some(remaining) = report.quota_remaining else {
            return;
        };
        let credential = report.quota_credential.as_deref().unwrap_or("unknown");
        if remaining == 0 || remaining >= self.settings.low_quota_threshold {
            return;
        }
        warn!(remaining, credential, "Quota running low");
        if let Err(e) = self.notifier.send_quota_warning(remaining, credential).await {
            warn!(error = %e, "Failed to deliver quota warning");
        }
    }

    async fn report_error(&self, message: String, report: &mut CycleReport) {
        warn!(error = %message, "Scan error");
        report.errors += 1;
        metrics::inc_scan_errors();
        {
            let mut status = self.shared.status.write().await;
            status.errors += 1;
            status.last_error = Some(message.clone());
        }
        if let Err(e) = self.notifier.send_error(&message).await {
            warn!(error = %e, "Failed to deliver error");
        }
        if let Err(e) = self.store.log_error(ErrorLevel::Error, &message).await {
            warn!(error = %e, "Failed to log error");
        }
    }

    async fn announce_switch(&self, switch: &Switch) {
        // Another request already moved the pool on.
        if switch.from.is_none() && !switch.generated {
            return;
        }
        if let Err(e) = self
            .notifier
            .send_failover_notice(switch.from.as_deref(), &switch.to)
            .await
        {
            warn!(error = %e, "Failed to deliver failover notice");
        }
        let message = format!(
            "Credential switched: {} -> {}{}",
            switch.from.as_deref().unwrap_or("none"),
            switch.to,
            if switch.generated { " (generated)" } else { "" }
        );
        if let Err(e) = self.store.log_error(ErrorLevel::Warning, &message).await {
            warn!(error = %e, "Failed to log failover");
        }
    }

    async fn notice(&self, message: &str) {
        if let Err(e) = self.notifier.send_notice(message).await {
            warn!(error = %e, "Failed to deliver notice");
        }
    }

    /// Announce the first slot and every later transition.
    async fn check_slot(&mut self, now: OffsetDateTime) {
        let transition = self.scheduler.has_slot_changed(now);
        if !transition.changed {
            return;
        }

        let current = self.scheduler.current_slot(now);
        let previous = transition.previous.as_deref().and_then(|p| self.scheduler.slot(p));
        let message = match previous {
            None => format!(
                "Scanner started in slot {} (every {}s)",
                current.label, current.scan_interval_secs
            ),
            Some(previous) => format!(
                "Slot changed: {} ({}s) -> {} ({}s)",
                previous.label, previous.scan_interval_secs, current.label, current.scan_interval_secs
            ),
        };

        if transition.previous.is_some() {
            self.scheduler.clear_notified();
        }
        self.notice(&message).await;
    }

    async fn alert_imminent(&mut self, events: &[Event], now: OffsetDateTime) {
        let window = self.settings.lineup_alert_minutes;
        let upcoming = self.scheduler.upcoming_matches(events, now, window);
        if upcoming.is_empty() {
            return;
        }

        let listed: Vec<String> = upcoming
            .iter()
            .take(MAX_LISTED_EVENTS)
            .map(|e| format!("{} ({})", e.match_label(), e.commence_time.as_deref().unwrap_or("?")))
            .collect();
        let mut message = format!(
            "{} event(s) starting within {} minutes: {}",
            upcoming.len(),
            window,
            listed.join("; ")
        );
        if upcoming.len() > MAX_LISTED_EVENTS {
            message.push_str(&format!(" (+{} more)", upcoming.len() - MAX_LISTED_EVENTS));
        }
        self.notice(&message).await;
    }

    async fn discover_sports(&mut self) {
        let Some(credential) = self.pool.usable_credential() else {
            return;
        };
        let configured: Vec<String> = self.sports.iter().map(|s| s.key.clone()).collect();
        match discover_active_sports(self.feed.as_ref(), &credential.secret, &configured).await {
            Ok(active) if !active.is_empty() => self.sports = sport_entries(&active),
            Ok(_) => warn!("No configured sport is active, keeping the configured list"),
            Err(e) => warn!(error = %e, "Sport discovery failed, keeping the configured list"),
        }
    }

    async fn enter_awaiting(&mut self) {
        if self.state == ScannerState::AwaitingCredential {
            return;
        }
        self.retry_attempt = 0;
        self.set_state(ScannerState::AwaitingCredential).await;
        warn!("No usable credential, scanning paused");
        self.notice("All credentials exhausted, scanning paused until one is available")
            .await;
    }

    /// One backoff step: wait, then try to get a credential back.
    async fn await_credential(&mut self) {
        self.retry_attempt += 1;
        let attempt = self.retry_attempt;
        let minutes = u64::from(attempt).min(self.settings.max_backoff_minutes);
        self.shared.status.write().await.retry_attempt = attempt;

        self.notice(&format!(
            "No usable credential, retrying in {minutes} min (attempt {attempt})"
        ))
        .await;
        if self.sleep_or_stop(Duration::from_secs(minutes * 60)).await {
            return;
        }

        match self.pool.regenerate().await {
            Ok(switch) => {
                info!(credential = %switch.to, attempt, "Credential available again");
                self.retry_attempt = 0;
                self.shared.status.write().await.retry_attempt = 0;
                self.set_state(ScannerState::Scanning).await;
                self.notice(&format!("Scanning resumed with {}", switch.to)).await;
            }
            Err(e) => {
                warn!(error = %e, attempt, "Credential recovery failed");
                self.shared.status.write().await.last_error = Some(e.to_string());
            }
        }
    }

    async fn set_state(&mut self, state: ScannerState) {
        self.state = state;
        self.shared.status.write().await.state = state;
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Sleep for `duration`. Returns `true` if a stop arrived first.
    async fn sleep_or_stop(&self, duration: Duration) -> bool {
        let mut stop = self.stop_rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = stop.wait_for(|stopped| *stopped) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialGenerator, MemoryCredentialStore};
    use crate::error::CredentialError;
    use crate::market::MockOddsFeed;
    use crate::outbound::{Notification, NullNotifier, RecordingNotifier, RecordingStore};
    use crate::scheduler::ManualClock;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::datetime;
    use time::UtcOffset;

    // Tuesday 03:00 UTC resolves to the catch-all slot.
    const NOW: OffsetDateTime = datetime!(2026-03-03 03:00 UTC);

    struct Harness {
        feed: MockOddsFeed,
        notifier: RecordingNotifier,
        store: RecordingStore,
        clock: Arc<ManualClock>,
        pool: Arc<CredentialPool>,
    }

    impl Harness {
        async fn new(keys: usize) -> Self {
            let pool = CredentialPool::new(Arc::new(MemoryCredentialStore::with_keys(keys)), None);
            Self::with_pool(pool).await
        }

        async fn with_pool(pool: CredentialPool) -> Self {
            pool.load().await.unwrap();
            Self {
                feed: MockOddsFeed::new(),
                notifier: RecordingNotifier::new(),
                store: RecordingStore::new(),
                clock: Arc::new(ManualClock::new(NOW)),
                pool: Arc::new(pool),
            }
        }

        fn scanner(&self, sports: &[&str]) -> Scanner {
            self.scanner_with(ScannerSettings {
                sports: sports.iter().map(|s| s.to_string()).collect(),
                ..ScannerSettings::default()
            })
        }

        fn scanner_with(&self, settings: ScannerSettings) -> Scanner {
            let scheduler = Scheduler::with_default_slots(UtcOffset::UTC).unwrap();
            Scanner::new(Arc::new(self.feed.clone()), Arc::clone(&self.pool), scheduler, settings)
                .with_notifier(Arc::new(self.notifier.clone()))
                .with_store(Arc::new(self.store.clone()))
                .with_clock(self.clock.clone())
        }
    }

    fn surebet_event(id: &str, commence: &str) -> serde_json::Value {
        let book = |title: &str, prices: [(&str, f64); 3]| {
            let outcomes: Vec<_> = prices
                .iter()
                .map(|(name, price)| json!({"name": name, "price": price}))
                .collect();
            json!({"key": title.to_lowercase(), "title": title, "markets": [{"key": "h2h", "outcomes": outcomes}]})
        };
        json!({
            "id": id,
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": commence,
            "home_team": "Arsenal",
            "away_team": "Chelsea",
            "bookmakers": [
                book("Betclic", [("Arsenal", 2.10), ("Chelsea", 3.0), ("Draw", 3.2)]),
                book("Unibet", [("Arsenal", 1.90), ("Chelsea", 4.2), ("Draw", 4.0)]),
            ],
        })
    }

    #[tokio::test]
    async fn emits_surebet_and_reports_to_collaborators() {
        let h = Harness::new(1).await;
        h.feed.push_events(json!([surebet_event("evt-1", "2026-03-03T19:30:00Z")]), 480);
        let mut scanner = h.scanner(&["soccer_epl"]);

        let report = scanner.scan_once().await;

        assert_eq!(report.sports_scanned, 1);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(report.emitted[0].market_label, "1X2");
        assert_eq!(h.notifier.opportunities().len(), 1);
        assert_eq!(h.store.opportunities().len(), 1);
        assert_eq!(h.store.usage(), vec![("user0".to_string(), 1, 480)]);
        assert_eq!(h.store.raw_batches()[0].quotes.len(), 6);

        match &h.feed.calls()[0].1 {
            FeedRequest::Odds { sport, markets, .. } => {
                assert_eq!(sport, "soccer_epl");
                assert_eq!(markets, "h2h,totals");
            }
            other => panic!("unexpected request {other:?}"),
        }

        let handle = scanner.handle();
        assert_eq!(handle.recent_opportunities(10).await.len(), 1);
        let status = handle.status().await;
        assert_eq!(status.scanner.scan_count, 1);
        assert_eq!(status.scanner.requests_remaining, Some(480));
        assert_eq!(status.credentials.total, 1);
    }

    #[tokio::test]
    async fn repeat_within_cooldown_is_suppressed_until_window_expires() {
        let h = Harness::new(1).await;
        let events = json!([surebet_event("evt-1", "2026-03-03T19:30:00Z")]);
        h.feed.set_fallback(FeedResponse::ok(events, 400, 1));
        let mut scanner = h.scanner(&["soccer_epl"]);

        assert_eq!(scanner.scan_once().await.emitted.len(), 1);

        h.clock.advance(time::Duration::minutes(2));
        let second = scanner.scan_once().await;
        assert_eq!(second.emitted.len(), 0);
        assert_eq!(second.suppressed, 1);

        h.clock.advance(time::Duration::minutes(3));
        assert_eq!(scanner.scan_once().await.emitted.len(), 1);
        assert_eq!(h.notifier.opportunities().len(), 2);
    }

    #[tokio::test]
    async fn quota_error_fails_over_and_retries_sport() {
        let h = Harness::new(2).await;
        h.feed
            .respond_for_key("key-0", FeedResponse::failed(429, "Usage quota has been reached"));
        h.feed.set_fallback(FeedResponse::ok(
            json!([surebet_event("evt-1", "2026-03-03T19:30:00Z")]),
            300,
            200,
        ));
        let mut scanner = h.scanner(&["soccer_epl"]);

        let report = scanner.scan_once().await;

        assert_eq!(h.feed.keys_used(), vec!["key-0", "key-1"]);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(report.errors, 0);
        assert!(h
            .notifier
            .events()
            .iter()
            .any(|e| matches!(e, Notification::Failover { new, .. } if new.starts_with("user1"))));
        assert_eq!(scanner.state(), ScannerState::Scanning);
    }

    #[tokio::test]
    async fn exhausted_pool_pauses_scanning() {
        let h = Harness::new(1).await;
        h.feed.set_fallback(FeedResponse::failed(401, "Invalid API key"));
        let mut scanner = h.scanner(&["soccer_epl", "soccer_spain_la_liga"]);

        let report = scanner.scan_once().await;

        assert!(report.exhausted);
        assert_eq!(h.feed.call_count(), 1);
        assert_eq!(scanner.state(), ScannerState::AwaitingCredential);
        assert_eq!(scanner.handle().state().await, ScannerState::AwaitingCredential);
        assert!(h.notifier.notices().iter().any(|n| n.contains("scanning paused")));
    }

    #[tokio::test]
    async fn non_quota_error_is_reported_and_next_sport_scanned() {
        let h = Harness::new(1).await;
        h.feed.push_response(FeedResponse::failed(500, "internal error"));
        h.feed.push_events(json!([surebet_event("evt-2", "2026-03-03T19:30:00Z")]), 450);
        let mut scanner = h.scanner(&["soccer_epl", "soccer_spain_la_liga"]);

        let report = scanner.scan_once().await;

        assert_eq!(report.errors, 1);
        assert_eq!(report.sports_scanned, 1);
        assert_eq!(report.emitted.len(), 1);
        assert_eq!(h.store.errors().len(), 1);
        assert!(h
            .notifier
            .events()
            .iter()
            .any(|e| matches!(e, Notification::Error(m) if m.contains("HTTP 500"))));
        assert_eq!(h.pool.status().valid, 1);
    }

    #[tokio::test]
    async fn low_quota_warns_once_per_cycle() {
        let h = Harness::new(1).await;
        h.feed.set_fallback(FeedResponse::ok(json!([]), 12, 488));
        let mut scanner = h.scanner(&["soccer_epl", "soccer_spain_la_liga"]);

        scanner.scan_once().await;

        let warnings: Vec<_> = h
            .notifier
            .events()
            .into_iter()
            .filter(|e| matches!(e, Notification::QuotaWarning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(h.store.usage().len(), 2);
    }

    #[tokio::test]
    async fn imminent_events_are_flagged_once() {
        let h = Harness::new(1).await;
        h.feed.set_fallback(FeedResponse::ok(
            json!([
                surebet_event("soon", "2026-03-03T03:40:00Z"),
                surebet_event("later", "2026-03-03T09:00:00Z"),
            ]),
            400,
            1,
        ));
        let mut scanner = h.scanner(&["soccer_epl"]);

        scanner.scan_once().await;
        scanner.scan_once().await;

        let notices = h.notifier.notices();
        assert_eq!(notices[0], "Scanner started in slot Default (every 15s)");
        let imminent: Vec<_> = notices.iter().filter(|n| n.contains("starting within")).collect();
        assert_eq!(imminent.len(), 1);
        assert!(imminent[0].starts_with("1 event(s) starting within 60 minutes"));
    }

    #[tokio::test]
    async fn slot_change_is_announced_with_both_intervals() {
        let h = Harness::new(1).await;
        let mut scanner = h.scanner(&["soccer_epl"]);

        scanner.scan_once().await;
        h.clock.set(datetime!(2026-03-03 19:30 UTC));
        scanner.scan_once().await;

        assert_eq!(
            h.notifier.notices(),
            vec![
                "Scanner started in slot Default (every 15s)".to_string(),
                "Slot changed: Default (15s) -> Weekday evening (5s)".to_string(),
            ]
        );
        let status = scanner.handle().status().await;
        assert_eq!(status.scanner.schedule.unwrap().slot_changes, 1);
    }

    #[tokio::test]
    async fn failing_collaborators_do_not_stop_the_scan() {
        let h = Harness::new(1).await;
        h.feed.push_events(json!([surebet_event("evt-1", "2026-03-03T19:30:00Z")]), 480);
        let mut scanner = h
            .scanner(&["soccer_epl"])
            .with_notifier(Arc::new(RecordingNotifier::failing()))
            .with_store(Arc::new(RecordingStore::failing()));

        let report = scanner.scan_once().await;

        assert_eq!(report.emitted.len(), 1);
        assert_eq!(scanner.state(), ScannerState::Scanning);
    }

    #[tokio::test]
    async fn history_keeps_most_recent_within_limit() {
        let h = Harness::new(1).await;
        h.feed.push_events(
            json!([
                surebet_event("a", "2026-03-03T19:30:00Z"),
                surebet_event("b", "2026-03-03T19:30:00Z"),
                surebet_event("c", "2026-03-03T19:30:00Z"),
            ]),
            480,
        );
        let settings = ScannerSettings {
            sports: vec!["soccer_epl".to_string()],
            history_limit: 2,
            ..ScannerSettings::default()
        };
        let mut scanner = Scanner::new(
            Arc::new(h.feed.clone()),
            Arc::clone(&h.pool),
            Scheduler::with_default_slots(UtcOffset::UTC).unwrap(),
            settings,
        )
        .with_notifier(Arc::new(NullNotifier))
        .with_clock(h.clock.clone());

        scanner.scan_once().await;

        let ids: Vec<_> = scanner
            .handle()
            .recent_opportunities(10)
            .await
            .into_iter()
            .map(|o| o.event_id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_backs_off_when_pool_is_empty_and_stops_on_request() {
        let h = Harness::new(0).await;
        let scanner = h.scanner(&["soccer_epl"]);
        let handle = scanner.handle();

        let task = tokio::spawn(scanner.run());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.state().await, ScannerState::AwaitingCredential);
        handle.stop();
        task.await.unwrap();

        assert_eq!(handle.state().await, ScannerState::Stopped);
        assert_eq!(h.feed.call_count(), 0);
        let notices = h.notifier.notices();
        assert!(notices.iter().any(|n| n == "No usable credential, retrying in 1 min (attempt 1)"));
        assert_eq!(notices.last().map(String::as_str), Some("Scanner stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_resumes_when_a_credential_appears() {
        let store = MemoryCredentialStore::new(vec![]);
        let pool = CredentialPool::new(Arc::new(store.clone()), None);
        let h = Harness::with_pool(pool).await;
        h.feed.set_fallback(FeedResponse::ok(json!([]), 500, 0));
        let scanner = h.scanner(&["soccer_epl"]);
        let handle = scanner.handle();

        let task = tokio::spawn(scanner.run());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.state().await, ScannerState::AwaitingCredential);
        assert_eq!(handle.status().await.scanner.retry_attempt, 1);

        store.push(Credential::new("late", "key-late"));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(handle.state().await, ScannerState::Scanning);
        assert_eq!(handle.status().await.scanner.retry_attempt, 0);
        assert_eq!(h.feed.keys_used()[0], "key-late");
        assert!(h
            .notifier
            .notices()
            .iter()
            .any(|n| n.starts_with("Scanning resumed with late")));

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_per_attempt_up_to_the_cap() {
        let h = Harness::new(0).await;
        let scanner = h.scanner_with(ScannerSettings {
            sports: vec!["soccer_epl".to_string()],
            max_backoff_minutes: 2,
            ..ScannerSettings::default()
        });
        let handle = scanner.handle();

        let task = tokio::spawn(scanner.run());
        // Attempts start at 0s, 60s and 180s.
        tokio::time::sleep(Duration::from_secs(200)).await;
        handle.stop();
        task.await.unwrap();

        let retries: Vec<String> = h
            .notifier
            .notices()
            .into_iter()
            .filter(|n| n.starts_with("No usable credential, retrying"))
            .collect();
        assert_eq!(
            retries,
            vec![
                "No usable credential, retrying in 1 min (attempt 1)",
                "No usable credential, retrying in 2 min (attempt 2)",
                "No usable credential, retrying in 2 min (attempt 3)",
            ]
        );
        assert_eq!(handle.status().await.scanner.retry_attempt, 3);
    }

    struct FixedGenerator;

    #[async_trait]
    impl CredentialGenerator for FixedGenerator {
        async fn generate(&self, _display_name: &str) -> Result<Credential, CredentialError> {
            Ok(Credential::new("fresh", "fresh-secret-000000000000000000000"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_generates_credential_at_startup_and_scans() {
        let pool = CredentialPool::new(
            Arc::new(MemoryCredentialStore::new(vec![])),
            Some(Arc::new(FixedGenerator)),
        );
        let h = Harness::with_pool(pool).await;
        h.feed.set_fallback(FeedResponse::ok(json!([]), 500, 0));
        let scanner = h.scanner(&["soccer_epl"]);
        let handle = scanner.handle();

        let task = tokio::spawn(scanner.run());
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.stop();
        task.await.unwrap();

        assert_eq!(h.feed.keys_used()[0], "fresh-secret-000000000000000000000");
        assert!(h.feed.call_count() >= 2);
        assert!(h
            .notifier
            .events()
            .iter()
            .any(|e| matches!(e, Notification::Failover { old: None, new } if new.starts_with("fresh"))));
    }
}
