//! Web server: axum JSON API over the latest tracking snapshot.
//!
//! Handlers only read the snapshot published by the tracking runner; they
//! never touch the session itself.

use std::sync::Arc;

use axum::Router;
use http::{header, HeaderValue};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use linetrack_core::render::TrackingSnapshot;

use crate::error::ClientError;

pub mod routes;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub snapshots: watch::Receiver<TrackingSnapshot>,
}

impl AppState {
    pub fn new(snapshots: watch::Receiver<TrackingSnapshot>) -> Self {
        AppState { snapshots }
    }

    /// Owned copy of the latest snapshot.
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshots.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/snapshot", axum::routing::get(routes::api_snapshot))
        .route("/api/status", axum::routing::get(routes::api_status))
        .route("/api/stations", axum::routing::get(routes::api_stations))
        .route("/api/vehicles", axum::routing::get(routes::api_vehicles))
        .route(
            "/api/vehicles/:id",
            axum::routing::get(routes::api_vehicle_detail),
        )
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), ClientError> {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("linetrack dashboard listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
