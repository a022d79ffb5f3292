//! x402 demo server
//!
//! Serves a free route, a payment-guarded route and a remote-signing route
//! backed by the WebSocket signing coordinator.
//!
//! ## Environment
//!
//! - `X402_MERCHANT_ADDRESS` - merchant address (required)
//! - `X402_CHAIN_ID`, `X402_CURRENCY` - challenge defaults
//! - `X402_WS_HOST`, `X402_WS_PORT`, `X402_WS_PATH`, `X402_SIGN_TIMEOUT_SECS`,
//!   `X402_WS_POLICY` - signing coordinator
//! - `BIND_ADDRESS` - HTTP bind address (default: 0.0.0.0:3000)
//! - `RUST_LOG` - log filter (default: info)

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use x402_challenge::{
    coordinator::SigningCoordinator,
    issuer::ChallengeIssuer,
    middleware::{payment_middleware, PaymentGuard, VerifiedPayment},
    storage::InMemoryStorage,
    types::{PaymentProof, VerificationResult},
    verifier::verify_payment,
    Result,
};

/// Shared state of the remote-signing route
#[derive(Debug, Clone)]
struct AppState {
    issuer: Arc<ChallengeIssuer>,
    coordinator: SigningCoordinator,
}

/// Body of `POST /remote-sign`
#[derive(Debug, Deserialize)]
struct RemoteSignRequest {
    price: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct RemoteSignResponse {
    proof: PaymentProof,
    verification: VerificationResult,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let issuer = Arc::new(ChallengeIssuer::from_env()?);
    let coordinator = SigningCoordinator::from_env()?;
    let ws_addr = coordinator.start().await?;

    let guard = PaymentGuard::new(issuer.clone(), "0.01")
        .with_description("Premium content")
        .with_nonce_storage(Arc::new(InMemoryStorage::new()));

    let paid = Router::new()
        .route("/paid", get(paid_handler))
        .layer(axum::middleware::from_fn_with_state(guard, payment_middleware));

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/free", get(free_handler))
        .route("/remote-sign", post(remote_sign_handler))
        .with_state(AppState {
            issuer,
            coordinator: coordinator.clone(),
        })
        .merge(paid)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("x402 server running on http://{}", bind_address);
    tracing::info!(
        "Signers connect to ws://{}{}",
        ws_addr,
        coordinator.config().path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    coordinator.stop().await;
    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": x402_challenge::VERSION,
        "coordinator": {
            "running": state.coordinator.is_running(),
            "clients": state.coordinator.client_count(),
            "pending": state.coordinator.pending_count(),
        }
    }))
}

async fn free_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "This route is free" }))
}

async fn paid_handler(
    axum::Extension(payment): axum::Extension<VerifiedPayment>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Payment accepted",
        "signer": payment.signer,
        "price": payment.challenge.price,
        "currency": payment.challenge.currency,
    }))
}

/// Issue a challenge and have a connected signer sign it
async fn remote_sign_handler(
    State(state): State<AppState>,
    Json(request): Json<RemoteSignRequest>,
) -> Result<Json<RemoteSignResponse>> {
    let challenge = state.issuer.issue(
        &request.price,
        request.currency.as_deref(),
        request.chain_id,
        request.description.as_deref(),
    )?;

    let proof = state.coordinator.request_signature(&challenge).await?;
    let verification = verify_payment(&proof);
    if !verification.valid {
        tracing::warn!(
            signer = %proof.signer,
            error = ?verification.error,
            "Remote signer returned an invalid proof"
        );
    }

    Ok(Json(RemoteSignResponse {
        proof,
        verification,
    }))
}
