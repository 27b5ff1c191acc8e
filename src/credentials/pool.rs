//! Credential pool with failover.
//!
//! The pool keeps every credential it ever loaded and an active index.
//! Quota/auth failures mark the active credential invalid and move the
//! index forward (circularly) to the next valid one. When none is left the
//! pool can run a generation job and activate its result.
//!
//! "Mark invalid + advance" runs under a single async gate, so concurrent
//! failure reports for the same credential only fail it over once.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::generator::CredentialGenerator;
use super::store::{Credential, CredentialStore, CredentialSummary};
use crate::error::CredentialError;
use crate::metrics;

/// Status codes that signal an exhausted or revoked credential.
pub const QUOTA_STATUS_CODES: &[u16] = &[401, 402, 429];

/// Longest error body kept in `last_error`.
const MAX_ERROR_EXCERPT: usize = 100;

/// Whether a failed response means the credential is spent.
pub fn is_quota_error(status: u16, body: &str) -> bool {
    if QUOTA_STATUS_CODES.contains(&status) || body.contains("OUT_OF_USAGE_CREDITS") {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("quota") || lower.contains("usage")
}

/// Result of a successful failover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    /// Previously active credential label, if any.
    pub from: Option<String>,
    /// Newly active credential label.
    pub to: String,
    /// The new credential came from a generation job.
    pub generated: bool,
}

/// Status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    /// Credentials loaded.
    pub total: usize,
    /// Credentials still valid.
    pub valid: usize,
    /// Active account identifier.
    pub active_identifier: Option<String>,
    /// Active secret, masked.
    pub active_key: Option<String>,
    /// Generation job configured.
    pub auto_generate: bool,
    /// Failovers performed.
    pub failover_count: u64,
    /// Generation jobs that produced a credential.
    pub generated_count: u64,
    /// Last reported error.
    pub last_error: Option<String>,
    /// Per-credential health.
    pub credentials: Vec<CredentialSummary>,
}

#[derive(Debug, Default)]
struct PoolState {
    credentials: Vec<Credential>,
    active: usize,
    failover_count: u64,
    generated_count: u64,
    last_error: Option<String>,
}

impl PoolState {
    fn active(&self) -> Option<&Credential> {
        self.credentials.get(self.active)
    }

    fn valid_count(&self) -> usize {
        self.credentials.iter().filter(|c| c.is_valid).count()
    }

    /// Replace the list, keeping health of secrets already known.
    fn merge(&mut self, loaded: Vec<Credential>) {
        let active_secret = self.active().map(|c| c.secret.clone());

        let merged: Vec<Credential> = loaded
            .into_iter()
            .map(|mut fresh| {
                if let Some(known) = self.credentials.iter().find(|c| c.secret == fresh.secret) {
                    fresh.is_valid = known.is_valid;
                    fresh.error_count = known.error_count;
                }
                fresh
            })
            .collect();
        self.credentials = merged;

        self.active = active_secret
            .and_then(|s| self.credentials.iter().position(|c| c.secret == s && c.is_valid))
            .or_else(|| self.credentials.iter().position(|c| c.is_valid))
            .unwrap_or(0);
    }

    /// Mark the active credential failed and move to the next valid one.
    fn advance(&mut self) -> Option<Switch> {
        self.failover_count += 1;
        let len = self.credentials.len();
        if len == 0 {
            return None;
        }

        let from = {
            let current = &mut self.credentials[self.active];
            current.is_valid = false;
            current.error_count += 1;
            warn!(credential = %current.label(), "Credential marked invalid");
            current.label()
        };
        self.next_valid(from)
    }

    /// Activate the next valid credential after the active one, circularly.
    fn next_valid(&mut self, from: String) -> Option<Switch> {
        let len = self.credentials.len();
        for step in 1..len {
            let candidate = (self.active + step) % len;
            if self.credentials[candidate].is_valid {
                self.active = candidate;
                return Some(Switch {
                    from: Some(from),
                    to: self.credentials[candidate].label(),
                    generated: false,
                });
            }
        }
        None
    }
}

/// Credential pool shared by the scanner and the API.
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    generator: Option<Arc<dyn CredentialGenerator>>,
    display_name: String,
    state: Mutex<PoolState>,
    failover_gate: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPool")
            .field("state", &*self.state.lock())
            .field("auto_generate", &self.generator.is_some())
            .finish()
    }
}

impl CredentialPool {
    /// Empty pool over `store`. Call [`load`](Self::load) before use.
    pub fn new(store: Arc<dyn CredentialStore>, generator: Option<Arc<dyn CredentialGenerator>>) -> Self {
        Self {
            store,
            generator,
            display_name: "AutoBot".to_string(),
            state: Mutex::new(PoolState::default()),
            failover_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Display name passed to generation jobs.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Whether a generation job is configured.
    pub fn can_generate(&self) -> bool {
        self.generator.is_some()
    }

    /// (Re)read the backing list. Returns the number of credentials loaded.
    pub async fn load(&self) -> Result<usize, CredentialError> {
        let loaded = self.store.load().await?;
        let mut state = self.state.lock();
        state.merge(loaded);
        metrics::set_valid_credentials(state.valid_count());
        Ok(state.credentials.len())
    }

    /// Active credential, `None` when the pool is empty.
    pub fn active_credential(&self) -> Option<Credential> {
        self.state.lock().active().cloned()
    }

    /// Active account identifier.
    pub fn active_identifier(&self) -> Option<String> {
        self.state.lock().active().map(|c| c.identifier.clone())
    }

    /// Active credential if it is still valid.
    pub fn usable_credential(&self) -> Option<Credential> {
        self.active_credential().filter(|c| c.is_valid)
    }

    /// Classify a failed request made with `used_secret`.
    ///
    /// Returns `Ok(None)` for errors that are not quota related (the caller
    /// handles those), `Ok(Some(switch))` once another credential is active,
    /// and an error when the pool could not recover.
    #[instrument(skip(self, used_secret, body))]
    pub async fn handle_error(
        &self,
        used_secret: &str,
        status: u16,
        body: &str,
    ) -> Result<Option<Switch>, CredentialError> {
        let excerpt: String = body.chars().take(MAX_ERROR_EXCERPT).collect();
        self.state.lock().last_error = Some(format!("HTTP {status}: {excerpt}"));

        if !is_quota_error(status, body) {
            return Ok(None);
        }
        warn!(status, "Quota error reported");
        self.failover_from(Some(used_secret)).await.map(Some)
    }

    /// Fail over from the active credential.
    pub async fn failover(&self) -> Result<Switch, CredentialError> {
        self.failover_from(None).await
    }

    async fn failover_from(&self, failed_secret: Option<&str>) -> Result<Switch, CredentialError> {
        let _gate = self.failover_gate.lock().await;

        let advanced = {
            let mut state = self.state.lock();
            let (active_label, active_valid, reported_active) = match state.active() {
                Some(active) => (
                    Some(active.label()),
                    active.is_valid,
                    failed_secret.map_or(true, |failed| failed == active.secret),
                ),
                None => (None, false, true),
            };

            if active_valid && !reported_active {
                // Another caller already moved past the failed credential.
                return Ok(Switch {
                    from: None,
                    to: active_label.unwrap_or_default(),
                    generated: false,
                });
            }

            if active_valid {
                let advanced = state.advance();
                metrics::set_valid_credentials(state.valid_count());
                metrics::inc_failovers();
                advanced
            } else {
                // Already marked by an earlier report: no second failure.
                active_label.and_then(|from| state.next_valid(from))
            }
        };

        if let Some(switch) = advanced {
            info!(from = ?switch.from, to = %switch.to, "Failed over to next credential");
            return Ok(switch);
        }

        let total = self.state.lock().credentials.len();
        warn!(total, "No valid credential left");
        if self.generator.is_none() {
            return Err(CredentialError::Exhausted { total });
        }
        self.generate_locked().await
    }

    /// Try to get a usable credential back: reload the backing list, then
    /// run a generation job if it holds nothing valid.
    #[instrument(skip(self))]
    pub async fn regenerate(&self) -> Result<Switch, CredentialError> {
        let _gate = self.failover_gate.lock().await;

        self.load().await?;
        if let Some(active) = self.usable_credential() {
            info!(credential = %active.label(), "Valid credential found on reload");
            return Ok(Switch {
                from: None,
                to: active.label(),
                generated: false,
            });
        }

        if self.generator.is_none() {
            return Err(CredentialError::GenerationDisabled);
        }
        self.generate_locked().await
    }

    /// Run the generation job and activate its credential. Caller holds the gate.
    async fn generate_locked(&self) -> Result<Switch, CredentialError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(CredentialError::GenerationDisabled)?;

        let from = self.active_credential().map(|c| c.label());
        let generated = match generator.generate(&self.display_name).await {
            Ok(credential) => credential,
            Err(e) => {
                self.state.lock().last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut loaded = self.store.load().await?;
        if !loaded.iter().any(|c| c.secret == generated.secret) {
            self.store.append(&generated).await?;
            loaded.push(generated.clone());
        }

        let mut state = self.state.lock();
        state.merge(loaded);
        let index = state
            .credentials
            .iter()
            .position(|c| c.secret == generated.secret)
            .ok_or_else(|| {
                CredentialError::GenerationFailed("generated credential missing after reload".to_string())
            })?;
        let credential = &mut state.credentials[index];
        credential.is_valid = true;
        let to = credential.label();
        state.active = index;
        state.generated_count += 1;
        metrics::set_valid_credentials(state.valid_count());

        info!(credential = %to, "Activated generated credential");
        Ok(Switch {
            from,
            to,
            generated: true,
        })
    }

    /// Status snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        let active = state.active();
        PoolStatus {
            total: state.credentials.len(),
            valid: state.valid_count(),
            active_identifier: active.map(|c| c.identifier.clone()),
            active_key: active.map(|c| c.masked_secret()),
            auto_generate: self.generator.is_some(),
            failover_count: state.failover_count,
            generated_count: state.generated_count,
            last_error: state.last_error.clone(),
            credentials: state.credentials.iter().map(CredentialSummary::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::store::MemoryCredentialStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGenerator {
        store: Option<MemoryCredentialStore>,
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CredentialGenerator for FakeGenerator {
        async fn generate(&self, display_name: &str) -> Result<Credential, CredentialError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CredentialError::GenerationFailed("captcha".to_string()));
            }
            let credential = Credential::new(format!("{display_name}{run}"), format!("job-{run}"));
            // Jobs may write to the backing list themselves.
            if let Some(store) = &self.store {
                store.push(credential.clone());
            }
            Ok(credential)
        }
    }

    fn generator(store: Option<MemoryCredentialStore>, fail: bool) -> Arc<FakeGenerator> {
        Arc::new(FakeGenerator {
            store,
            runs: AtomicUsize::new(0),
            fail,
        })
    }

    async fn pool(keys: usize, job: Option<Arc<FakeGenerator>>) -> (CredentialPool, MemoryCredentialStore) {
        let store = MemoryCredentialStore::with_keys(keys);
        let job = job.map(|g| g as Arc<dyn CredentialGenerator>);
        let pool = CredentialPool::new(Arc::new(store.clone()), job);
        pool.load().await.unwrap();
        (pool, store)
    }

    fn active_secret(pool: &CredentialPool) -> String {
        pool.active_credential().unwrap().secret
    }

    #[test]
    fn quota_classification() {
        assert!(is_quota_error(401, ""));
        assert!(is_quota_error(402, ""));
        assert!(is_quota_error(429, ""));
        assert!(is_quota_error(400, r#"{"error_code":"OUT_OF_USAGE_CREDITS"}"#));
        assert!(is_quota_error(403, "Monthly Quota reached"));
        assert!(is_quota_error(403, "usage limit"));
        assert!(!is_quota_error(500, "internal error"));
        assert!(!is_quota_error(404, "unknown sport"));
    }

    #[tokio::test]
    async fn failover_visits_credentials_in_circular_order() {
        let (pool, _) = pool(4, None).await;
        assert_eq!(active_secret(&pool), "key-0");

        let mut visited = vec![active_secret(&pool)];
        for _ in 0..3 {
            let switch = pool.failover().await.unwrap();
            assert!(!switch.generated);
            visited.push(active_secret(&pool));
        }

        assert_eq!(visited, vec!["key-0", "key-1", "key-2", "key-3"]);
        assert!(matches!(
            pool.failover().await,
            Err(CredentialError::Exhausted { total: 4 })
        ));
        let status = pool.status();
        assert_eq!(status.valid, 0);
        assert_eq!(status.failover_count, 4);
    }

    #[tokio::test]
    async fn failover_wraps_around_from_the_middle() {
        let store = MemoryCredentialStore::with_keys(3);
        let pool = CredentialPool::new(Arc::new(store), None);
        pool.load().await.unwrap();
        pool.state.lock().active = 2;
        pool.state.lock().credentials[1].is_valid = false;

        pool.failover().await.unwrap();

        assert_eq!(active_secret(&pool), "key-0");
    }

    #[tokio::test]
    async fn non_quota_errors_do_not_fail_over() {
        let (pool, _) = pool(2, None).await;

        let outcome = pool.handle_error("key-0", 500, "internal").await.unwrap();

        assert_eq!(outcome, None);
        assert_eq!(active_secret(&pool), "key-0");
        assert_eq!(pool.status().last_error.as_deref(), Some("HTTP 500: internal"));
    }

    #[tokio::test]
    async fn concurrent_reports_fail_over_once() {
        let (pool, _) = pool(3, None).await;

        let (a, b) = tokio::join!(
            pool.handle_error("key-0", 429, ""),
            pool.handle_error("key-0", 429, "")
        );

        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert_eq!(active_secret(&pool), "key-1");
        let status = pool.status();
        assert_eq!(status.valid, 2);
        assert_eq!(status.failover_count, 1);
        assert_eq!(status.credentials[0].error_count, 1);
    }

    #[tokio::test]
    async fn concurrent_reports_on_last_credential_mark_it_once() {
        let (pool, _) = pool(1, None).await;

        let (a, b) = tokio::join!(
            pool.handle_error("key-0", 429, ""),
            pool.handle_error("key-0", 429, "")
        );

        assert!(matches!(a, Err(CredentialError::Exhausted { total: 1 })));
        assert!(matches!(b, Err(CredentialError::Exhausted { total: 1 })));
        let status = pool.status();
        assert_eq!(status.valid, 0);
        assert_eq!(status.failover_count, 1);
        assert_eq!(status.credentials[0].error_count, 1);
    }

    #[tokio::test]
    async fn failover_on_spent_pool_does_not_recount() {
        let (pool, _) = pool(2, None).await;
        pool.failover().await.unwrap();
        assert!(pool.failover().await.is_err());

        assert!(pool.failover().await.is_err());

        let status = pool.status();
        assert_eq!(status.failover_count, 2);
        assert!(status.credentials.iter().all(|c| c.error_count == 1));
    }

    #[tokio::test]
    async fn exhausted_pool_generates_and_activates() {
        let job = generator(None, false);
        let (pool, store) = pool(1, Some(job.clone())).await;

        let switch = pool.handle_error("key-0", 401, "").await.unwrap().unwrap();

        assert!(switch.generated);
        assert_eq!(active_secret(&pool), "job-0");
        assert_eq!(store.load().await.unwrap().len(), 2);
        assert_eq!(pool.status().generated_count, 1);
    }

    #[tokio::test]
    async fn generated_credential_already_in_store_is_not_duplicated() {
        let store = MemoryCredentialStore::with_keys(1);
        let job = generator(Some(store.clone()), false);
        let pool = CredentialPool::new(Arc::new(store.clone()), Some(job as Arc<dyn CredentialGenerator>));
        pool.load().await.unwrap();

        pool.failover().await.unwrap();

        assert_eq!(store.load().await.unwrap().len(), 2);
        assert_eq!(active_secret(&pool), "job-0");
    }

    #[tokio::test]
    async fn failed_generation_is_reported() {
        let (pool, _) = pool(1, Some(generator(None, true))).await;

        assert!(matches!(
            pool.failover().await,
            Err(CredentialError::GenerationFailed(_))
        ));
        assert!(pool.usable_credential().is_none());
    }

    #[tokio::test]
    async fn reload_keeps_health_of_known_credentials() {
        let (pool, store) = pool(2, None).await;
        pool.failover().await.unwrap();
        store.push(Credential::new("late", "key-late"));

        assert_eq!(pool.load().await.unwrap(), 3);

        let status = pool.status();
        assert_eq!(status.valid, 2);
        assert!(!status.credentials[0].is_valid);
        assert_eq!(active_secret(&pool), "key-1");
    }

    #[tokio::test]
    async fn regenerate_prefers_reloaded_credentials() {
        let job = generator(None, false);
        let (pool, store) = pool(1, Some(job.clone())).await;
        pool.state.lock().credentials[0].is_valid = false;
        store.push(Credential::new("manual", "key-manual"));

        let switch = pool.regenerate().await.unwrap();

        assert!(!switch.generated);
        assert_eq!(active_secret(&pool), "key-manual");
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn regenerate_without_generator_is_disabled() {
        let (pool, _) = pool(0, None).await;

        assert!(pool.active_credential().is_none());
        assert!(matches!(
            pool.regenerate().await,
            Err(CredentialError::GenerationDisabled)
        ));
    }
}
