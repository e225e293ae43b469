//! Shared types, error enum, and value types for linetrack-core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo;

/// All errors produced by linetrack-core.
#[derive(Debug, Error)]
pub enum LineTrackError {
    #[error("route has no stations")]
    EmptyRoute,
    #[error("unknown station id: {0}")]
    UnknownStation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LineTrackError>;

// ---------------------------------------------------------------------------
// Geographic point
// ---------------------------------------------------------------------------

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }

    /// True when the two points are within `eps_m` meters of each other.
    pub fn approx_eq(&self, other: &GeoPoint, eps_m: f64) -> bool {
        geo::great_circle_distance_m(*self, *other) <= eps_m
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

// ---------------------------------------------------------------------------
// Line reference
// ---------------------------------------------------------------------------

/// A tracked line and travel direction, as the transit API names them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineRef {
    pub line_id: String,
    pub direction: String,
}

impl LineRef {
    pub fn new(line_id: impl Into<String>, direction: impl Into<String>) -> Self {
        LineRef {
            line_id: line_id.into(),
            direction: direction.into(),
        }
    }

    /// Channel name used by the live feed join frame.
    pub fn channel(&self) -> String {
        format!("#lineId:{}:{}", self.line_id, self.direction)
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// One stop record from the station list, in route order.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
}

impl StopRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: GeoPoint) -> Self {
        StopRecord {
            id: id.into(),
            name: name.into(),
            location,
        }
    }
}

/// A single reported vehicle position.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleFix {
    pub vehicle_id: String,
    pub location: GeoPoint,
    /// Time the position was recorded by the vehicle, when the feed sends it.
    pub observed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Connection status
// ---------------------------------------------------------------------------

/// Connection state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    AwaitingConnection,
    Disconnected,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::AwaitingConnection => write!(f, "connecting"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
