//! spigot-faucet: rate-limited test-network faucet.
//!
//! Serves a web UI at `/` and a REST API at `/api/faucet`, paying out from
//! an external wallet over JSON-RPC. Payouts are capped at 1% of the
//! wallet's spendable balance and limited to one per client per cooldown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use spigot_core::{
    BalanceTracker, Bech32mValidator, Clock, PayoutCoordinator, SystemClock, WalletSender,
};
use spigot_rpc::WalletRpcClient;

mod config;
mod identity;
mod routes;

use config::Config;
use identity::IdentityResolver;

/// Spigot test-network faucet. Configured through `FAUCET_*` environment
/// variables.
#[derive(Parser, Debug)]
#[command(name = "spigot-faucet", version, about = "Rate-limited test-network faucet")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

/// Shared application state passed to every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Serializes payouts and owns the rate limiter, ledger and balance.
    pub coordinator: Arc<PayoutCoordinator>,
    /// Maps a connection to the identity payouts are rate limited by.
    pub identity: Arc<IdentityResolver>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, &args.log_format);

    let config = Config::from_env().context("Failed to load faucet configuration")?;

    info!(
        bind = %config.bind_addr,
        network = %config.network,
        wallet = %config.wallet.url,
        account = %config.wallet_account,
        amount = %config.amount,
        cooldown_secs = config.cooldown.as_secs(),
        override_token = config.override_token.is_some(),
        "Starting spigot-faucet"
    );

    let wallet: Arc<dyn WalletSender> = Arc::new(
        WalletRpcClient::new(&config.wallet).context("Failed to create wallet RPC client")?,
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // No payouts without a known transaction limit.
    let balance = BalanceTracker::initialize(
        wallet.clone(),
        clock.clone(),
        config.wallet_account.clone(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to read balance of wallet account {:?} at {}",
            config.wallet_account, config.wallet.url
        )
    })?;
    let balance = Arc::new(balance);
    let refresher = balance.clone().spawn_refresher(config.balance_refresh);

    let coordinator = PayoutCoordinator::new(
        config.payout_policy(),
        wallet,
        Arc::new(Bech32mValidator),
        clock,
        balance,
    );

    let state = AppState {
        coordinator: Arc::new(coordinator),
        identity: Arc::new(IdentityResolver::new(
            config.real_ip_header.clone(),
            config.trusted_proxies.clone(),
        )),
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("Listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    refresher.abort();
    info!("Shut down");
    Ok(())
}

/// Initialise the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level_str`. Pass `format = "json"` for
/// structured JSON output; any other value gives human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
