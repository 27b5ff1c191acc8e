//! Surebet scanner entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use surebet_scanner::api::{create_router, AppState};
use surebet_scanner::arbitrage::{calculate_arbitrage_with_stake, DEFAULT_TOTAL_STAKE};
use surebet_scanner::config::Config;
use surebet_scanner::credentials::{
    CredentialGenerator, CredentialPool, CredentialStore, FileCredentialStore,
    ProcessCredentialGenerator,
};
use surebet_scanner::market::{OddsClient, OddsFeed};
use surebet_scanner::metrics;
use surebet_scanner::scanner::{Scanner, ScannerSettings};
use surebet_scanner::scheduler::Scheduler;
use surebet_scanner::utils::shutdown_signal;

const RULE: &str = "======================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------------";

/// Multi-bookmaker surebet scanner.
#[derive(Parser, Debug)]
#[command(name = "surebet-scanner")]
#[command(about = "Scans bookmaker odds for guaranteed-profit bet combinations")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port for health/status/metrics (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scanner with the HTTP API (default).
    Run {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// List the credentials in the key file.
    CheckKeys,

    /// List sports the provider reports as active.
    Sports,

    /// Evaluate a set of decimal odds.
    Calc {
        /// Decimal odds, one per outcome.
        #[arg(required = true, num_args = 2..)]
        odds: Vec<Decimal>,

        /// Total stake to split.
        #[arg(long, default_value_t = DEFAULT_TOTAL_STAKE)]
        stake: Decimal,
    },

    /// Run a single scan cycle and print what it found.
    ScanOnce,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging. Config errors are reported later by the command.
    let log_config = Config::load().unwrap_or_default();
    let filter = EnvFilter::try_new(log_config.log_directive(args.verbose))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if args.json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::CheckKeys) => cmd_check_keys().await,
        Some(Command::Sports) => cmd_sports().await,
        Some(Command::Calc { odds, stake }) => cmd_calc(&odds, stake),
        Some(Command::ScanOnce) => cmd_scan_once().await,
        Some(Command::Run { port }) => cmd_run(port.or(args.port)).await,
        None => cmd_run(args.port).await,
    }
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }
    Ok(config)
}

/// Build the credential pool and load the key file.
async fn build_pool(config: &Config) -> anyhow::Result<Arc<CredentialPool>> {
    let store = Arc::new(FileCredentialStore::new(config.api_keys_file.clone()));
    let generator = config
        .key_generator_argv()
        .and_then(|argv| ProcessCredentialGenerator::new(argv, config.generation_timeout()))
        .map(|g| Arc::new(g) as Arc<dyn CredentialGenerator>);

    let pool = CredentialPool::new(store, generator)
        .with_display_name(config.key_generator_display_name.clone());
    let loaded = pool.load().await?;
    info!(
        credentials = loaded,
        auto_generate = pool.can_generate(),
        "Credential pool loaded"
    );
    Ok(Arc::new(pool))
}

/// Wire feed, pool and scheduler into a scanner.
async fn build_scanner(config: &Config) -> anyhow::Result<Scanner> {
    let feed: Arc<dyn OddsFeed> = Arc::new(OddsClient::new(config)?);
    let pool = build_pool(config).await?;
    let scheduler = Scheduler::with_default_slots(config.schedule_offset())?;
    Ok(Scanner::new(
        feed,
        pool,
        scheduler,
        ScannerSettings::from_config(config),
    ))
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("SUREBET SCANNER - CONFIGURATION CHECK");
    println!("{RULE}");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Check the slot table
    print!("Building schedule... ");
    match Scheduler::with_default_slots(config.schedule_offset()) {
        Ok(_) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Schedule invalid"));
        }
    }

    // Show configuration summary
    let sports = config.sport_keys();
    println!("{THIN_RULE}");
    println!("Configuration Summary:");
    println!("  Provider: {}", config.odds_api_url);
    println!("  Regions: {}", config.regions);
    println!(
        "  Bookmakers: {}",
        config.bookmakers_param().unwrap_or_else(|| "all".to_string())
    );
    println!("  Sports: {} ({})", sports.len(), sports.join(", "));
    println!("  Key file: {}", config.api_keys_file.display());
    println!(
        "  Key generation: {}",
        match config.key_generator_argv() {
            Some(argv) => format!("Enabled ({})", argv.join(" ")),
            None => "Disabled".to_string(),
        }
    );
    println!("  Request delay: {}ms", config.request_delay_ms);
    println!("  Cooldown: {} min", config.cooldown_minutes);
    println!("  Low quota threshold: {}", config.low_quota_threshold);
    println!("  Schedule offset: UTC{:+}", config.schedule_utc_offset_hours);
    println!(
        "  Player props: {}",
        if config.scan_event_props { "Enabled" } else { "Disabled" }
    );
    println!("{RULE}");
    println!("CONFIGURATION CHECK PASSED");
    println!("{RULE}");

    Ok(())
}

/// List the credentials in the key file.
async fn cmd_check_keys() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("SUREBET SCANNER - CREDENTIAL CHECK");
    println!("{RULE}");

    let config = load_config()?;
    let store = FileCredentialStore::new(config.api_keys_file.clone());
    println!("Key file: {}", store.path().display());

    let credentials = store.load().await?;
    if credentials.is_empty() {
        println!("\nNo credentials found.");
    } else {
        println!("\nCredentials ({}):", credentials.len());
        for (i, credential) in credentials.iter().enumerate() {
            println!("  {}. {}", i + 1, credential.label());
        }
    }

    println!(
        "\nKey generation: {}",
        if config.key_generator_argv().is_some() { "Enabled" } else { "Disabled" }
    );
    println!("{RULE}");

    Ok(())
}

/// List sports the provider reports as active.
async fn cmd_sports() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("SUREBET SCANNER - ACTIVE SPORTS");
    println!("{RULE}");

    let config = load_config()?;
    let pool = build_pool(&config).await?;
    let credential = pool
        .usable_credential()
        .ok_or_else(|| anyhow::anyhow!("No credential in {}", config.api_keys_file.display()))?;
    let client = OddsClient::new(&config)?;

    let configured = config.sport_keys();
    let sports = client.get_sports(&credential.secret, false).await?;
    println!("\n{} active sports ({} configured):\n", sports.len(), configured.len());
    for sport in &sports {
        let marker = if configured.contains(&sport.key) { "*" } else { " " };
        println!("  {} {:<40} {}", marker, sport.key, sport.title);
    }

    let active: Vec<&str> = sports.iter().map(|s| s.key.as_str()).collect();
    let inactive: Vec<&String> = configured
        .iter()
        .filter(|k| !active.contains(&k.as_str()))
        .collect();
    if !inactive.is_empty() {
        println!("\nConfigured but inactive:");
        for key in inactive {
            println!("    {}", key);
        }
    }
    println!("{RULE}");

    Ok(())
}

/// Evaluate a set of decimal odds.
fn cmd_calc(odds: &[Decimal], stake: Decimal) -> anyhow::Result<()> {
    let result = calculate_arbitrage_with_stake(odds, stake)?;

    println!("{RULE}");
    println!("SUREBET SCANNER - CALCULATOR");
    println!("{RULE}");
    println!("  Implied probability sum: {}", result.implied_probability_sum);
    println!(
        "  Arbitrage: {}",
        if result.is_arbitrage { "YES" } else { "NO" }
    );
    println!("  Profit: {}%", result.profit_pct);
    if result.is_arbitrage {
        println!("{THIN_RULE}");
        for (i, (o, s)) in odds.iter().zip(&result.stakes).enumerate() {
            println!("  Outcome {}: odds {} stake {} returns {}", i + 1, o, s, (o * s).round_dp(2));
        }
        println!("{THIN_RULE}");
        println!("  Total stake: {}", result.total_stake);
        println!("  Guaranteed return: {}", result.guaranteed_return());
        println!("  Profit: {}", result.profit_per_100);
    }
    println!("{RULE}");

    Ok(())
}

/// Run a single scan cycle.
async fn cmd_scan_once() -> anyhow::Result<()> {
    let config = load_config()?;
    let mut scanner = build_scanner(&config).await?;
    scanner.start().await;
    let report = scanner.scan_once().await;

    println!("{RULE}");
    println!("SUREBET SCANNER - SINGLE SCAN");
    println!("{RULE}");
    println!("  Sports scanned: {}", report.sports_scanned);
    println!("  Events scanned: {}", report.events_scanned);
    println!("  Errors: {}", report.errors);
    if let Some(remaining) = report.quota_remaining {
        println!("  Quota remaining: {}", remaining);
    }
    if report.exhausted {
        println!("  WARNING: credential pool exhausted");
    }
    println!("{THIN_RULE}");
    println!("Opportunities: {}", report.emitted.len());
    for opp in &report.emitted {
        println!(
            "  [{}] {} - {} : {}% ",
            opp.league, opp.match_label, opp.market_label, opp.result.profit_pct
        );
        for (leg, stake) in opp.outcomes.iter().zip(&opp.result.stakes) {
            println!("      {} @ {} on {} (stake {})", leg.outcome, leg.odds, leg.provider, stake);
        }
    }
    println!("{RULE}");

    Ok(())
}

/// Run the scanner with the HTTP API.
async fn cmd_run(port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let config = load_config()?;
    let port = port_override.unwrap_or(config.port);

    // Initialize metrics
    let prometheus = match metrics::install_prometheus() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {}", e);
            None
        }
    };

    info!("Configuration loaded successfully");
    info!("Provider: {}", config.odds_api_url);
    info!("Sports: {}", config.sport_keys().len());
    info!("Cooldown: {} min", config.cooldown_minutes);

    let scanner = build_scanner(&config).await?;
    let handle = scanner.handle();

    // Create app state
    let mut app_state = AppState::new(handle.clone());
    if let Some(prometheus) = prometheus {
        app_state = app_state.with_prometheus(prometheus);
    }

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // Stop the scan loop on shutdown signals too
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_handle.stop();
    });

    info!("{}", RULE);
    info!("SUREBET SCANNER STARTED");
    info!("{}", RULE);

    app_state.set_ready(true);
    scanner.run().await;
    app_state.set_ready(false);

    let status = handle.status().await;
    info!("{}", RULE);
    info!("SCANNER STOPPED - SUMMARY");
    info!("{}", RULE);
    info!("Scan cycles: {}", status.scanner.scan_count);
    info!("Opportunities: {}", status.scanner.opportunities_found);
    info!("Suppressed: {}", status.scanner.suppressed);
    info!("Errors: {}", status.scanner.errors);
    info!("Failovers: {}", status.credentials.failover_count);
    info!("{}", RULE);

    // Stop requests over HTTP leave the server running; shut it down here.
    server_handle.abort();
    Ok(())
}
