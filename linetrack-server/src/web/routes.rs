//! REST API route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use linetrack_core::format;
use linetrack_core::render::VehicleView;

use crate::web::AppState;

fn vehicle_json(vehicle: &VehicleView) -> Value {
    let mut value = serde_json::to_value(vehicle).unwrap_or(json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("label".into(), json!(vehicle.label()));
        map.insert(
            "eta_seconds".into(),
            json!(format::eta_seconds(vehicle.distance_to_goal_m).round()),
        );
    }
    value
}

/// GET /api/snapshot: the whole render-ready snapshot.
pub async fn api_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshot())
}

/// GET /api/status: connection status and counters.
pub async fn api_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    let goal = snapshot.goal().map(|g| json!({"id": g.id, "name": g.name}));
    let next = snapshot.next_vehicle().map(|v| v.id.clone());

    Json(json!({
        "line": snapshot.line.line_id,
        "direction": snapshot.line.direction,
        "status": snapshot.status,
        "connected": snapshot.status == linetrack_core::ConnectionStatus::Connected,
        "revision": snapshot.revision,
        "goal": goal,
        "vehicles": snapshot.vehicles.len(),
        "next_vehicle": next,
    }))
}

/// GET /api/stations: visible stations in route order.
pub async fn api_stations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshot().stations)
}

/// GET /api/vehicles: vehicles nearest the goal first, with labels.
pub async fn api_vehicles(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let vehicles: Vec<Value> = state.snapshot().vehicles.iter().map(vehicle_json).collect();
    Json(json!(vehicles))
}

/// GET /api/vehicles/:id
pub async fn api_vehicle_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.snapshot();
    match snapshot.vehicles.iter().find(|v| v.id == id) {
        Some(vehicle) => (StatusCode::OK, Json(vehicle_json(vehicle))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Vehicle not found"})),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
