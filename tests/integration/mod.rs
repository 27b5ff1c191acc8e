//! End-to-end tests for the surebet scanner.
//!
//! The real odds client, file-backed credential pool and scanner run against
//! a local mock of the provider API.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use time::UtcOffset;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use surebet_scanner::credentials::{
    CredentialGenerator, CredentialPool, CredentialStore, FileCredentialStore,
    ProcessCredentialGenerator,
};
use surebet_scanner::market::{OddsClient, OddsFeed};
use surebet_scanner::outbound::{Notification, RecordingNotifier, RecordingStore};
use surebet_scanner::scanner::{Scanner, ScannerSettings, ScannerState};
use surebet_scanner::scheduler::Scheduler;

fn odds_payload() -> Value {
    json!([{
        "id": "e912304de2b2ce35b473ce2ecd3d1502",
        "sport_key": "soccer_epl",
        "sport_title": "EPL",
        "commence_time": "2099-01-01T15:00:00Z",
        "home_team": "Arsenal",
        "away_team": "Chelsea",
        "bookmakers": [
            {
                "key": "betclic",
                "title": "Betclic",
                "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "Arsenal", "price": 2.10},
                        {"name": "Chelsea", "price": 3.0},
                        {"name": "Draw", "price": 3.2}
                    ]},
                    {"key": "totals", "outcomes": [
                        {"name": "Over", "price": 2.15, "point": 2.5},
                        {"name": "Under", "price": 1.70, "point": 2.5}
                    ]}
                ]
            },
            {
                "key": "unibet_eu",
                "title": "Unibet",
                "markets": [
                    {"key": "h2h", "outcomes": [
                        {"name": "Arsenal", "price": 1.90},
                        {"name": "Chelsea", "price": 4.2},
                        {"name": "Draw", "price": 4.0}
                    ]},
                    {"key": "totals", "outcomes": [
                        {"name": "Over", "price": 1.80, "point": 2.5},
                        {"name": "Under", "price": 2.05, "point": 2.5}
                    ]}
                ]
            }
        ]
    }])
}

async fn mount_odds(server: &MockServer, api_key: &str, remaining: &str) {
    Mock::given(method("GET"))
        .and(path("/sports/soccer_epl/odds"))
        .and(query_param("apiKey", api_key))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-requests-remaining", remaining)
                .insert_header("x-requests-used", "20")
                .set_body_json(odds_payload()),
        )
        .mount(server)
        .await;
}

async fn mount_quota_error(server: &MockServer, api_key: &str) {
    Mock::given(method("GET"))
        .and(path("/sports/soccer_epl/odds"))
        .and(query_param("apiKey", api_key))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "message": "Usage quota has been reached",
            "error_code": "OUT_OF_USAGE_CREDITS"
        })))
        .mount(server)
        .await;
}

fn key_file(contents: &str) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), contents).unwrap();
    file
}

fn scanner(
    server: &MockServer,
    pool: Arc<CredentialPool>,
    notifier: &RecordingNotifier,
    store: &RecordingStore,
) -> Scanner {
    let client = OddsClient::with_settings(&server.uri(), Duration::ZERO, Duration::from_secs(5))
        .unwrap();
    let settings = ScannerSettings {
        sports: vec!["soccer_epl".to_string()],
        bookmakers: None,
        ..ScannerSettings::default()
    };
    Scanner::new(
        Arc::new(client) as Arc<dyn OddsFeed>,
        pool,
        Scheduler::with_default_slots(UtcOffset::UTC).unwrap(),
        settings,
    )
    .with_notifier(Arc::new(notifier.clone()))
    .with_store(Arc::new(store.clone()))
}

#[tokio::test]
async fn scan_finds_surebets_and_fails_over_on_quota() {
    let server = MockServer::start().await;
    mount_quota_error(&server, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").await;
    mount_odds(&server, "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "480").await;

    let keys = key_file(
        "alice:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\nbob:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n",
    );
    let pool = CredentialPool::new(Arc::new(FileCredentialStore::new(keys.path())), None);
    assert_eq!(pool.load().await.unwrap(), 2);
    let pool = Arc::new(pool);

    let notifier = RecordingNotifier::new();
    let store = RecordingStore::new();
    let mut scanner = scanner(&server, Arc::clone(&pool), &notifier, &store);

    let report = scanner.scan_once().await;

    let mut markets: Vec<_> = report.emitted.iter().map(|o| o.market_label.clone()).collect();
    markets.sort();
    assert_eq!(markets, vec!["1X2", "Totals 2.5"]);
    assert_eq!(report.errors, 0);
    assert_eq!(report.quota_remaining, Some(480));

    let status = pool.status();
    assert_eq!(status.active_identifier.as_deref(), Some("bob"));
    assert_eq!(status.valid, 1);
    assert!(notifier
        .events()
        .iter()
        .any(|e| matches!(e, Notification::Failover { new, .. } if new.starts_with("bob"))));
    assert_eq!(store.usage(), vec![("bob".to_string(), 20, 480)]);

    // Same prices again inside the cooldown window: nothing new.
    let again = scanner.scan_once().await;
    assert!(again.emitted.is_empty());
    assert_eq!(again.suppressed, 2);
    assert_eq!(scanner.handle().recent_opportunities(10).await.len(), 2);
}

#[tokio::test]
async fn exhausted_pool_without_generator_pauses() {
    let server = MockServer::start().await;
    mount_quota_error(&server, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").await;

    let keys = key_file("alice:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n");
    let pool = CredentialPool::new(Arc::new(FileCredentialStore::new(keys.path())), None);
    pool.load().await.unwrap();

    let notifier = RecordingNotifier::new();
    let store = RecordingStore::new();
    let mut scanner = scanner(&server, Arc::new(pool), &notifier, &store);

    let report = scanner.scan_once().await;

    assert!(report.exhausted);
    assert_eq!(scanner.state(), ScannerState::AwaitingCredential);
    let status = scanner.handle().status().await;
    assert_eq!(status.scanner.errors, 1);
    assert_eq!(status.credentials.valid, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn exhausted_pool_generates_and_persists_new_credential() {
    let server = MockServer::start().await;
    mount_quota_error(&server, "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").await;
    mount_odds(&server, "cccccccccccccccccccccccccccccccc", "500").await;

    let keys = key_file("alice:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\n");
    let generator = ProcessCredentialGenerator::new(
        vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo carol:cccccccccccccccccccccccccccccccc".to_string(),
        ],
        Duration::from_secs(10),
    )
    .unwrap();
    let store_backend = Arc::new(FileCredentialStore::new(keys.path()));
    let pool = CredentialPool::new(
        store_backend.clone(),
        Some(Arc::new(generator) as Arc<dyn CredentialGenerator>),
    );
    pool.load().await.unwrap();
    let pool = Arc::new(pool);

    let notifier = RecordingNotifier::new();
    let store = RecordingStore::new();
    let mut scanner = scanner(&server, Arc::clone(&pool), &notifier, &store);

    let report = scanner.scan_once().await;

    assert!(!report.exhausted);
    assert_eq!(report.emitted.len(), 2);
    assert_eq!(pool.active_identifier().as_deref(), Some("carol"));
    assert_eq!(pool.status().generated_count, 1);

    let persisted = store_backend.load().await.unwrap();
    let ids: Vec<_> = persisted.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(ids, vec!["alice", "carol"]);
}
