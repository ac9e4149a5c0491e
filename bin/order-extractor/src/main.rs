use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::{Config, ExchangeClient, ExchangeMode};
use extractor::{BitgetClient, Worker};
use paper::PaperExchange;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(
        exchange = %cfg.exchange_mode,
        default_mode = %cfg.default_mode,
        max_concurrency = cfg.extraction.max_concurrency,
        deadline_ms = cfg.extraction.deadline_ms,
        "Order extractor starting"
    );

    // ── Exchange client (injected based on EXCHANGE_MODE) ─────────────────────
    let exchange: Arc<dyn ExchangeClient> = match cfg.exchange_mode {
        ExchangeMode::Live => {
            info!(base_url = %cfg.base_url, "Live mode, using BitgetClient");
            let client = BitgetClient::new(
                cfg.credentials.clone(),
                &cfg.base_url,
                cfg.extraction.request_timeout(),
            )
            .unwrap_or_else(|e| panic!("Failed to build Bitget client: {e}"));
            Arc::new(client)
        }
        ExchangeMode::Paper => {
            info!("Paper mode, using PaperExchange");
            Arc::new(PaperExchange::demo().await)
        }
    };
    let exchange_name = exchange.name();

    // ── Worker + coordinators ─────────────────────────────────────────────────
    let worker = Worker::from_settings(exchange, &cfg.extraction);
    let state = api::AppState::new(
        worker,
        cfg.extraction.clone(),
        cfg.default_mode,
        cfg.remote_worker_url.as_deref(),
        exchange_name,
    )
    .unwrap_or_else(|e| panic!("Failed to initialize extraction service: {e}"));

    // ── HTTP API ──────────────────────────────────────────────────────────────
    tokio::select! {
        res = api::serve(state, cfg.port) => {
            if let Err(e) = res {
                error!(error = %e, "API server stopped");
                std::process::exit(1);
            }
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received. Exiting.");
        }
    }
}
