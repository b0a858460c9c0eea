//! Trade API Client Demo Binary
//!
//! Connects to the broker, resolves an instrument from the directory,
//! prints account state and streams order book updates until the watch
//! period elapses or a shutdown signal arrives.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-api-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINAM_ACCESS_TOKEN`: API access token
//!
//! ## Optional
//! - `FINAM_ENDPOINT`: gRPC endpoint (default: <https://trade-api.finam.ru>)
//! - `FINAM_CLIENT_ID`: Trading account; enables portfolio, order and stop queries
//! - `FINAM_SHUTDOWN_POLICY`: DRAIN | IMMEDIATE (default: DRAIN)
//! - `FINAM_CALLBACK_PANIC_POLICY`: ISOLATE | PROPAGATE (default: ISOLATE)
//! - `DEMO_BOARD`: Board of the watched instrument (default: TQBR)
//! - `DEMO_CODE`: Code of the watched instrument (default: SBER)
//! - `DEMO_WATCH_SECS`: How long to stream before exiting (default: 30)
//! - `TRADE_API_METRICS_PORT`: Serve Prometheus metrics on this port
//! - `FINAM_LOG_LEVEL`, `FINAM_TRANSPORT_LOG_LEVEL`: Log levels (default: info, warn)
//! - `FINAM_OTLP_ENDPOINT`: Export spans to this OTLP collector
//! - `RUST_LOG`: Full filter override

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use trade_api_client::{
    ClientConfig, InstrumentDirectory, InstrumentSource, OrderFilter, PortfolioContent, StopFilter,
    TelemetryConfig, TradeApiClient, init_telemetry, install_exporter, new_request_id,
};

/// Default watch period.
const DEFAULT_WATCH: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    let config = ClientConfig::from_env()?;
    let _telemetry_guard = init_telemetry(&TelemetryConfig::from_env().for_client(&config));

    tracing::info!("Starting Trade API client");

    if let Some(port) = env_parse::<u16>("TRADE_API_METRICS_PORT") {
        install_exporter(port).context("Failed to start metrics exporter")?;
    }

    log_config(&config);

    let client = Arc::new(TradeApiClient::new(config)?);
    install_handlers(&client);

    let board = std::env::var("DEMO_BOARD").unwrap_or_else(|_| "TQBR".to_string());
    let code = std::env::var("DEMO_CODE").unwrap_or_else(|_| "SBER".to_string());

    let source: Arc<dyn InstrumentSource> = Arc::clone(&client) as _;
    let directory = InstrumentDirectory::new(source);
    match directory.load().await {
        Ok(count) => match directory.find(&board, &code) {
            Ok(instrument) => tracing::info!(
                instruments = count,
                short_name = %instrument.short_name,
                price_step = %instrument.price_step(),
                lot_size = instrument.lot_size,
                "Instrument resolved"
            ),
            Err(e) => tracing::warn!(error = %e, "Instrument not in directory"),
        },
        Err(e) => tracing::warn!(error = %e, "Instrument directory unavailable"),
    }

    if let Ok(client_id) = std::env::var("FINAM_CLIENT_ID") {
        show_account(&client, &client_id).await;
        client.subscribe_order_trade(&new_request_id(), vec![client_id], true, true)?;
    }

    client.subscribe_order_book(&new_request_id(), &code, &board)?;

    let watch = env_parse::<u64>("DEMO_WATCH_SECS").map_or(DEFAULT_WATCH, Duration::from_secs);
    tokio::select! {
        () = tokio::time::sleep(watch) => {
            tracing::info!(secs = watch.as_secs(), "Watch period elapsed");
        }
        () = await_shutdown() => {}
    }

    client.shutdown().await;

    let stats = client.stream_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    tracing::info!("Trade API client stopped");
    Ok(())
}

/// Log every inbound event kind and the final stream status.
fn install_handlers(client: &TradeApiClient) {
    client.set_order_book_handler(|book| {
        let best_ask = book.asks.first().map(|row| row.price);
        let best_bid = book.bids.first().map(|row| row.price);
        tracing::info!(
            code = %book.security_code,
            board = %book.security_board,
            ?best_ask,
            ?best_bid,
            "Order book"
        );
    });
    client.set_portfolio_handler(|portfolio| {
        tracing::info!(
            client_id = %portfolio.client_id,
            equity = portfolio.equity,
            balance = portfolio.balance,
            "Portfolio update"
        );
    });
    client.set_order_handler(|event| {
        if let Some(order) = &event.order {
            tracing::info!(
                transaction_id = order.transaction_id,
                code = %order.security_code,
                status = order.status,
                "Order update"
            );
        }
    });
    client.set_trade_handler(|trade| {
        tracing::info!(
            trade_no = trade.trade_no,
            code = %trade.security_code,
            quantity = trade.quantity,
            price = trade.price,
            "Trade"
        );
    });
    client.set_response_handler(|response| {
        if response.success {
            tracing::debug!(request_id = %response.request_id, "Command accepted");
        } else {
            tracing::warn!(
                request_id = %response.request_id,
                errors = ?response.errors,
                "Command rejected"
            );
        }
    });
    client.set_status_handler(|status| {
        tracing::info!(?status, "Event stream ended");
    });
}

/// Print portfolio, active orders and stops for an account.
async fn show_account(client: &TradeApiClient, client_id: &str) {
    match client
        .get_portfolio(client_id, PortfolioContent::default())
        .await
    {
        Ok(portfolio) => tracing::info!(
            equity = portfolio.equity,
            balance = portfolio.balance,
            positions = portfolio.positions.len(),
            "Portfolio"
        ),
        Err(e) => tracing::warn!(error = %e, "Portfolio request failed"),
    }

    match client.get_orders(client_id, OrderFilter::active_only()).await {
        Ok(result) => tracing::info!(active = result.orders.len(), "Orders"),
        Err(e) => tracing::warn!(error = %e, "Orders request failed"),
    }

    match client.get_stop_orders(client_id, StopFilter::default()).await {
        Ok(result) => tracing::info!(stops = result.stops.len(), "Stop orders"),
        Err(e) => tracing::warn!(error = %e, "Stop orders request failed"),
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        endpoint = %config.endpoint,
        tls = config.uses_tls(),
        shutdown_policy = config.stream.shutdown_policy.as_str(),
        callback_panic_policy = config.stream.callback_panic_policy.as_str(),
        "Configuration loaded"
    );
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

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

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
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
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
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
    }
}
