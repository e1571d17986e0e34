//! DXLink Options Binary
//!
//! Streams underlying trades and option quotes/Greeks from DXLink into the
//! subscription store and keeps the session alive until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dxlink-options
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DXLINK_URL`: DXLink WebSocket endpoint
//! - `DXLINK_TOKEN`: Quote streamer token
//!
//! ## Optional
//! - `DXLINK_UNDERLYINGS`: Comma separated underlyings to stream (e.g. `SPY,QQQ`)
//! - `DXLINK_OPTION_CHAIN_FILE`: JSON option chains; enables filtered option subscriptions
//! - `DXLINK_STRIKE_RANGE_PCT`: Strike window around the price (default: 10)
//! - `DXLINK_MAX_EXPIRATION_DAYS`: Latest expiration in trading days (default: 45)
//! - `MARKET_HOLIDAYS`: Comma separated `YYYY-MM-DD` dates
//! - `METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)
//!
//! Session, query and resolver tuning variables are listed on `EngineConfig`;
//! the resolver bounds only apply to `EngineConfig::strike_resolver`.

use std::sync::Arc;

use dxlink_options::application::ports::{FeedSubscriber, InstrumentSource, QuoteSource};
use dxlink_options::application::services::load_calendar;
use dxlink_options::infrastructure::config::{ChainFile, StaticHolidays};
use dxlink_options::infrastructure::telemetry;
use dxlink_options::{
    ConnectionState, DxLinkSession, EngineConfig, ExpirationFilter, RetryConfig, SessionConfig,
    SnapshotQuery, SubscriptionService, SubscriptionStore, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        span_export = telemetry_guard.is_exporting(),
        "Starting DXLink options engine"
    );

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let _metrics_handle = init_metrics(config.metrics_port)?;

    let shutdown_token = CancellationToken::new();
    let store = Arc::new(SubscriptionStore::new());

    for underlying in &config.underlyings {
        store.subscribe_underlying(underlying);
    }

    let session = DxLinkSession::new(
        SessionConfig::from_settings(&config.url, config.token.clone(), &config.session),
        Arc::clone(&store),
        shutdown_token.clone(),
    );

    if let Err(e) = session.connect().await {
        tracing::warn!(error = %e, "Initial DXLink connect failed");
        session.reconnect().await?;
    }

    let query = Arc::new(SnapshotQuery::new(
        Arc::clone(&store),
        RetryConfig::from(&config.query),
    ));

    if let Some(path) = &config.filter.option_chain_file {
        subscribe_option_chains(&config, path, &store, &session, query).await;
    }

    let supervisor = tokio::spawn(supervise(session.clone(), shutdown_token.clone()));

    tracing::info!("DXLink options engine ready");

    await_shutdown(shutdown_token.clone()).await;

    session.close().await;
    let _ = supervisor.await;

    tracing::info!("DXLink options engine stopped");
    drop(telemetry_guard);
    Ok(())
}

/// Subscribe each underlying's filtered option chain.
async fn subscribe_option_chains(
    config: &EngineConfig,
    chain_file: &str,
    store: &Arc<SubscriptionStore>,
    session: &DxLinkSession,
    query: Arc<SnapshotQuery>,
) {
    let calendar = match load_calendar(&StaticHolidays::new(config.holidays.clone())).await {
        Ok(calendar) => calendar,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load market holidays");
            return;
        }
    };
    let today = chrono::Local::now().date_naive();
    let cutoff = calendar.add_trading_days(today, config.filter.max_expiration_days);

    let service = SubscriptionService::new(
        Arc::clone(store),
        Arc::new(ChainFile::new(chain_file)) as Arc<dyn InstrumentSource>,
        query as Arc<dyn QuoteSource>,
        Arc::new(session.clone()) as Arc<dyn FeedSubscriber>,
    );

    for underlying in &config.underlyings {
        match service
            .add_filtered_subscriptions(
                underlying,
                config.filter.strike_range_pct,
                ExpirationFilter::Until(cutoff),
            )
            .await
        {
            Ok(update) => tracing::info!(
                underlying = %underlying,
                added = update.added.len(),
                rejected = update.rejected.len(),
                cutoff = %cutoff,
                "Option chain subscribed"
            ),
            Err(e) => tracing::error!(
                underlying = %underlying,
                error = %e,
                "Failed to subscribe option chain"
            ),
        }
    }
}

/// Reconnect whenever the session drops; a failed reconnect shuts down.
async fn supervise(session: DxLinkSession, shutdown_token: CancellationToken) {
    let mut status = session.status();

    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => return,
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let state = *status.borrow_and_update();
        if state != ConnectionState::Disconnected || shutdown_token.is_cancelled() {
            continue;
        }

        tracing::warn!("DXLink session disconnected");
        if let Err(e) = session.reconnect().await {
            tracing::error!(error = %e, "DXLink reconnect failed, shutting down");
            shutdown_token.cancel();
            return;
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        url = %config.url,
        underlyings = ?config.underlyings,
        holidays = config.holidays.len(),
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        keepalive_interval_secs = config.session.keepalive_interval.as_secs(),
        batch_size = config.session.subscription_batch_size,
        max_reconnect_attempts = config.session.max_reconnect_attempts,
        query_max_retries = config.query.max_retries,
        resolver_max_attempts = config.resolver.max_attempts,
        "Session settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM, SIGINT, or an internal shutdown request.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::info!("Internal shutdown requested");
        }
    }

    shutdown_token.cancel();
}
