//! HTTP server for the LN-Sui invoice settlement bridge.
//!
//! # Endpoints
//!
//! - `POST /api/lightning/invoices`                - Create an invoice
//! - `GET  /api/lightning/invoices/{payment_hash}` - Invoice status
//! - `POST /api/lightning/listen`                  - Start the settlement listener
//! - `GET  /health`  - Health check
//! - `GET  /metrics` - Prometheus-format metrics
//!
//! # Configuration
//!
//! Set the following environment variables:
//!
//! - `PORT`              - Server port (default: 3000)
//! - `HOST`              - Bind address (default: 0.0.0.0)
//! - `BIND_ADDR`         - Full bind address, takes precedence over HOST:PORT
//! - `LND_REST_URL`      - LND REST gateway URL (default: https://127.0.0.1:8080)
//! - `LND_MACAROON_HEX`  - Hex-encoded admin macaroon (required)
//! - `SUI_MINT_ENDPOINT` - Mint signing/execution endpoint (required)
//! - `SUI_PACKAGE_ID`    - Published token package id (required)
//! - `SUI_MODULE`        - Token module name (default: btc_token)
//! - `SUI_TREASURY_CAP`  - TreasuryCap object id (required)
//! - `SUI_RECIPIENT`     - Recipient address for minted tokens (required)
//! - `SUI_GAS_BUDGET`    - Gas budget in MIST (default: 3000000)
//! - `LOG_LEVEL`         - Log filter if RUST_LOG is unset (default: info)

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ln_sui_bridge::ledger::DEFAULT_GAS_BUDGET;
use ln_sui_bridge::{
    Bridge, BridgeConfig, BridgeError, LndRestClient, SuiAddress, SuiLedgerConfig, SuiMintProvider,
};

/// Request counters for the metrics endpoint; invoice-level counters come
/// from the registry.
struct Metrics {
    invoice_requests_total: AtomicU64,
    status_requests_total: AtomicU64,
}

struct AppState {
    bridge: Bridge,
    metrics: Metrics,
}

fn required_env(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    env::var(name).map_err(|_| format!("{name} environment variable is not set").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing: LOG_LEVEL is used if RUST_LOG is not set
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    // Payment node connection
    let lnd_url =
        env::var("LND_REST_URL").unwrap_or_else(|_| "https://127.0.0.1:8080".to_string());
    let macaroon_hex = required_env("LND_MACAROON_HEX")?;
    let node = Arc::new(LndRestClient::new(lnd_url.clone(), macaroon_hex));

    // Destination ledger
    let ledger_config = SuiLedgerConfig {
        mint_endpoint: required_env("SUI_MINT_ENDPOINT")?,
        package_id: required_env("SUI_PACKAGE_ID")?,
        module: env::var("SUI_MODULE").unwrap_or_else(|_| "btc_token".to_string()),
        treasury_cap: required_env("SUI_TREASURY_CAP")?,
        gas_budget: env::var("SUI_GAS_BUDGET")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GAS_BUDGET),
    };
    let recipient: SuiAddress = required_env("SUI_RECIPIENT")?
        .parse()
        .map_err(|e| format!("invalid SUI_RECIPIENT: {e}"))?;
    let minter = Arc::new(SuiMintProvider::new(ledger_config.clone()));

    tracing::info!(
        lnd_url = %lnd_url,
        mint_target = %ledger_config.mint_target(),
        recipient = %recipient,
        "bridge starting"
    );

    let bridge = Bridge::new(node, minter, BridgeConfig::new(recipient));
    bridge.start_listening();

    let state = Arc::new(AppState {
        bridge,
        metrics: Metrics {
            invoice_requests_total: AtomicU64::new(0),
            status_requests_total: AtomicU64::new(0),
        },
    });

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/lightning/invoices", post(create_invoice_handler))
        .route(
            "/api/lightning/invoices/{payment_hash}",
            get(invoice_status_handler),
        )
        .route("/api/lightning/listen", post(listen_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    // BIND_ADDR takes precedence; fall back to HOST:PORT
    let bind_address = env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        format!("{host}:{port}")
    });
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Listening on {bind_address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the settlement listener and let in-flight mints finish.
    state.bridge.shutdown().await;

    Ok(())
}

/// Waits for a Ctrl-C signal to initiate graceful shutdown.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl-C handler");
    tracing::info!("Shutdown signal received, draining connections...");
}

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "ln-sui-bridge-server",
        "version": env!("CARGO_PKG_VERSION"),
        "source": "lightning",
        "destination": "sui",
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts = state.bridge.registry().counts();
    Json(serde_json::json!({
        "status": "ok",
        "listening": state.bridge.is_listening(),
        "invoices": counts.total,
        "settled": counts.settled,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateInvoiceRequest {
    amount: u64,
    memo: Option<String>,
}

async fn create_invoice_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateInvoiceRequest>,
) -> impl IntoResponse {
    state
        .metrics
        .invoice_requests_total
        .fetch_add(1, Ordering::Relaxed);

    match state.bridge.create_invoice(body.amount, body.memo).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn invoice_status_handler(
    State(state): State<Arc<AppState>>,
    Path(payment_hash): Path<String>,
) -> impl IntoResponse {
    state
        .metrics
        .status_requests_total
        .fetch_add(1, Ordering::Relaxed);

    match state.bridge.check_invoice(&payment_hash).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn listen_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = state.bridge.start_listening();
    Json(serde_json::json!({
        "started": started,
        "listening": state.bridge.is_listening(),
    }))
}

fn error_response(error: BridgeError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &error {
        BridgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        BridgeError::UnknownInvoice(_) => StatusCode::NOT_FOUND,
        BridgeError::Node(_) => StatusCode::BAD_GATEWAY,
        BridgeError::Registry(_) => StatusCode::CONFLICT,
    };
    tracing::warn!(error = %error, "request failed");
    (
        status,
        Json(serde_json::json!({
            "error": error.to_string(),
        })),
    )
}

/// Returns Prometheus-format metrics as plain text.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts = state.bridge.registry().counts();
    let invoice_requests = state.metrics.invoice_requests_total.load(Ordering::Relaxed);
    let status_requests = state.metrics.status_requests_total.load(Ordering::Relaxed);

    let body = format!(
        "# HELP invoice_requests_total Total number of invoice creation requests.\n\
         # TYPE invoice_requests_total counter\n\
         invoice_requests_total {invoice_requests}\n\
         # HELP status_requests_total Total number of invoice status requests.\n\
         # TYPE status_requests_total counter\n\
         status_requests_total {status_requests}\n\
         # HELP invoices_total Invoices tracked by the registry.\n\
         # TYPE invoices_total gauge\n\
         invoices_total {}\n\
         # HELP invoices_settled_total Invoices observed settled.\n\
         # TYPE invoices_settled_total gauge\n\
         invoices_settled_total {}\n\
         # HELP mints_confirmed_total Mints confirmed on the destination ledger.\n\
         # TYPE mints_confirmed_total gauge\n\
         mints_confirmed_total {}\n\
         # HELP mints_failed_total Mint submissions that failed.\n\
         # TYPE mints_failed_total gauge\n\
         mints_failed_total {}\n",
        counts.total, counts.settled, counts.mint_confirmed, counts.mint_failed,
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
