//! JSON-over-HTTP boundary for the rookery orchestrator.
//!
//! One `POST /api` endpoint carries every signed RPC envelope; dispatch is a
//! flat payload-type table. `GET /pubsub` upgrades to a websocket for
//! process-state subscriptions. The boundary validates and authorizes, builds
//! engine calls, and shapes replies; all scheduling semantics live in
//! `rookery-engine`.

pub mod auth;
pub mod colonies;
pub mod config;
pub mod crons;
pub mod error;
pub mod executors;
pub mod functions;
pub mod generators;
pub mod graphs;
pub mod processes;
pub mod rpc;
pub mod stats;
pub mod subscribe;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use rookery_engine::Controller;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{ApiKeyIdentity, IdentityRecoverer, Validator};
pub use config::ServerConfig;
pub use error::ApiError;

/// App state shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub validator: Arc<Validator>,
    pub recovery: Arc<dyn IdentityRecoverer>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the server router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", post(rpc::handle))
        .route("/pubsub", get(subscribe::handle))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
