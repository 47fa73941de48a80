//! Quote Stream Client Binary
//!
//! Connects to the quote service, subscribes to the configured symbols and
//! logs every update until shutdown or the first fatal error.
//!
//! # Usage
//!
//! ```bash
//! QUOTE_STREAM_SYMBOLS=OANDA:EURUSD,BINANCE:BTCUSDT cargo run --bin quote-stream-client
//! ```
//!
//! # Environment Variables
//!
//! - `QUOTE_STREAM_URL`: WebSocket endpoint (default: `wss://data.tradingview.com/socket.io/websocket`)
//! - `QUOTE_STREAM_ORIGIN`: `Origin` header (default: `https://www.tradingview.com`)
//! - `QUOTE_STREAM_USER_AGENT`: `User-Agent` header (default: desktop browser)
//! - `QUOTE_STREAM_AUTH_TOKEN`: Session token (default: `unauthorized_user_token`)
//! - `QUOTE_STREAM_SYMBOLS`: Comma separated symbols to subscribe (default: none)
//! - `QUOTE_STREAM_EVENT_CAPACITY`: Event channel capacity (default: 1024)
//! - `QUOTE_STREAM_METRICS_PORT`: Prometheus metrics port (default: 0 = disabled)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: quote-stream-client)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::{Context, anyhow};
use quote_stream_client::infrastructure::telemetry;
use quote_stream_client::{
    ChannelHandler, ClientConfig, QuoteClient, QuoteEvent, WsConnector, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("a rustls crypto provider is already installed"))?;

    load_dotenv();

    let telemetry_guard = telemetry::init();

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting quote stream client"
    );

    let config = ClientConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port).context("failed to start metrics exporter")?;
        tracing::info!(port = config.metrics_port, "Metrics endpoint listening");
    }

    let (handler, events) = ChannelHandler::channel(config.event_capacity);
    let handler = Arc::new(handler);

    let client = QuoteClient::connect(&config, &WsConnector::new(), Arc::clone(&handler) as _)
        .await
        .context("failed to start quote stream")?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let outcome = handle_events(events, shutdown_token).await;

    client.close().await?;
    tracing::info!(
        dropped_events = handler.dropped(),
        "Quote stream client stopped"
    );

    outcome
}

/// Log quote events until shutdown or a fatal error.
async fn handle_events(
    mut rx: mpsc::Receiver<QuoteEvent>,
    shutdown_token: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            () = shutdown_token.cancelled() => return Ok(()),
            event = rx.recv() => match event {
                Some(QuoteEvent::Quote(update)) => {
                    tracing::info!(
                        symbol = %update.symbol,
                        price = ?update.data.price,
                        volume = ?update.data.volume,
                        bid = ?update.data.bid,
                        ask = ?update.data.ask,
                        "Quote"
                    );
                }
                Some(QuoteEvent::Error { message, context }) => {
                    return Err(anyhow!("quote stream failed during {context}: {message}"));
                }
                None => return Ok(()),
            },
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        url = %config.endpoint.url,
        symbols = ?config.symbols,
        anonymous = config.auth_token.is_anonymous(),
        event_capacity = config.event_capacity,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
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
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    shutdown_token.cancel();
}
