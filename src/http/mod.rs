//! The HTTP service surface.
//!
//! One versioned contract for every agency: 2xx bodies are typed success
//! envelopes, everything else carries the structured error envelope from
//! [`error::ApiError`].

pub mod error;
pub mod handlers;

use crate::agencies::AdapterRegistry;
use crate::store::Backend;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub backend: Arc<dyn Backend>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<AdapterRegistry>, backend: Arc<dyn Backend>) -> Self {
        Self {
            registry,
            backend,
            started_at: Utc::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz_handler))
        .route("/v1/agencies", get(handlers::agencies_handler))
        .route("/v1/arrivals/:agency", get(handlers::arrivals_handler))
        .route(
            "/v1/incidents",
            get(handlers::incidents_handler).post(handlers::create_incident_handler),
        )
        .route(
            "/v1/incidents/:id/resolve",
            post(handlers::resolve_incident_handler),
        )
        .route(
            "/v1/rides",
            get(handlers::rides_handler).post(handlers::create_ride_handler),
        )
        .route("/v1/rides/:id/join", post(handlers::join_ride_handler))
        .route("/v1/rides/:id/leave", post(handlers::leave_ride_handler))
        .route("/v1/rides/:id/members", get(handlers::ride_members_handler))
        .route(
            "/v1/rides/:id/messages",
            get(handlers::messages_handler).post(handlers::send_message_handler),
        )
        .route(
            "/v1/profiles/:user_id",
            get(handlers::get_profile_handler).put(handlers::put_profile_handler),
        )
        .with_state(state)
}

/// Binds and serves until ctrl-c.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "HTTP service listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
