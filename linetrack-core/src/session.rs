//! Line tracking session: owns the route, every tracked vehicle and the
//! connection status of one tracked line.
//!
//! Single writer. Callers feed it route loads, fixes and feed lifecycle
//! changes one at a time; every mutating call reports whether the rendered
//! picture changed so the caller knows when to redraw.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::feed::FeedState;
use crate::render::{RouteWindow, StationView, TrackingSnapshot, VehicleView};
use crate::route::{RouteModel, Station};
use crate::tracker::{TrackerSettings, Vehicle};
use crate::types::*;

/// Default number of stations shown before the goal.
pub const DEFAULT_WINDOW_STATIONS: usize = 5;

/// Per-session options.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingOptions {
    pub goal_station_id: String,
    /// Stations drawn before the goal.
    pub window_stations: usize,
    pub tracker: TrackerSettings,
}

impl TrackingOptions {
    pub fn new(goal_station_id: impl Into<String>) -> Self {
        TrackingOptions {
            goal_station_id: goal_station_id.into(),
            window_stations: DEFAULT_WINDOW_STATIONS,
            tracker: TrackerSettings::default(),
        }
    }
}

/// State of one tracked line.
pub struct LineTrackingSession {
    line: LineRef,
    options: TrackingOptions,
    route: Option<RouteModel>,
    window: Option<(usize, usize)>,
    vehicles: HashMap<String, Vehicle>,
    status: ConnectionStatus,
    revision: u64,

    // Counters
    pub fixes_received: u64,
    pub fixes_applied: u64,
}

impl LineTrackingSession {
    pub fn new(line: LineRef, options: TrackingOptions) -> Self {
        LineTrackingSession {
            line,
            options,
            route: None,
            window: None,
            vehicles: HashMap::new(),
            status: ConnectionStatus::AwaitingConnection,
            revision: 0,
            fixes_received: 0,
            fixes_applied: 0,
        }
    }

    pub fn line(&self) -> &LineRef {
        &self.line
    }

    pub fn options(&self) -> &TrackingOptions {
        &self.options
    }

    /// Build the route, select the goal and derive the visible window.
    ///
    /// On error the previously loaded route stays in place.
    pub fn load_route(&mut self, stops: &[StopRecord]) -> Result<&[Station]> {
        let mut route = RouteModel::build(stops)?;
        route.set_goal(&self.options.goal_station_id)?;

        let goal = route.goal_index().unwrap_or(0);
        let start = goal.saturating_sub(self.options.window_stations);
        info!(
            line = %self.line.line_id,
            stations = route.len(),
            goal = %self.options.goal_station_id,
            "route loaded"
        );

        self.window = Some((start, goal));
        self.route = Some(route);
        self.revision += 1;
        Ok(self.window())
    }

    pub fn route(&self) -> Option<&RouteModel> {
        self.route.as_ref()
    }

    /// Stations currently shown, in route order.
    pub fn window(&self) -> &[Station] {
        match (&self.route, self.window) {
            (Some(route), Some((from, to))) => route.truncate(from, to),
            _ => &[],
        }
    }

    /// Route distance and distance to goal for a position. Both are 0 until
    /// a route is loaded.
    pub fn resolve(&self, point: GeoPoint) -> (f64, f64) {
        match &self.route {
            Some(route) => {
                let x = route.locate(point);
                (x, route.distance_to_goal(x))
            }
            None => (0.0, 0.0),
        }
    }

    /// Apply a live fix. Returns `true` when a redraw is needed.
    pub fn on_fix(&mut self, fix: &VehicleFix) -> bool {
        self.on_fix_at(fix, Utc::now())
    }

    pub fn on_fix_at(&mut self, fix: &VehicleFix, received_at: DateTime<Utc>) -> bool {
        self.fixes_received += 1;
        let (route_distance, to_goal) = self.resolve(fix.location);
        let settings = self.options.tracker;
        let vehicle = self
            .vehicles
            .entry(fix.vehicle_id.clone())
            .or_insert_with(|| {
                debug!(vehicle = %fix.vehicle_id, "new vehicle");
                Vehicle::new(fix.vehicle_id.clone(), settings)
            });

        let changed = vehicle.apply_fix_at(fix, route_distance, to_goal, received_at);
        if changed {
            self.fixes_applied += 1;
            self.revision += 1;
        }
        changed
    }

    /// Mirror a feed lifecycle change. Returns `true` when the status changed.
    pub fn on_feed_state(&mut self, state: FeedState) -> bool {
        let status = state.status();
        if status == self.status {
            return false;
        }
        info!(line = %self.line.line_id, %status, "connection status");
        self.status = status;
        self.revision += 1;
        true
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Increments on every change that affects the rendered picture.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Owned, render-ready copy of the current state.
    ///
    /// Vehicles are ordered by distance to goal, nearest first.
    pub fn snapshot(&self) -> TrackingSnapshot {
        let goal_id = self.route.as_ref().and_then(|r| r.goal()).map(|g| g.id.as_str());
        let stations: Vec<StationView> = self
            .window()
            .iter()
            .map(|s| StationView {
                id: s.id.clone(),
                name: s.name.clone(),
                location: s.location,
                route_distance_m: s.route_distance_m,
                is_goal: Some(s.id.as_str()) == goal_id,
            })
            .collect();

        let mut vehicles: Vec<VehicleView> = self
            .vehicles
            .values()
            .map(|v| VehicleView {
                id: v.id.clone(),
                location: v.location,
                route_distance_m: v.route_distance_m,
                distance_to_goal_m: v.distance_to_goal_m,
                smoothed_distance_m: v.smoothed_distance_m,
                last_update: v.last_update,
                history: v.history().copied().collect(),
                is_next: false,
            })
            .collect();
        vehicles.sort_by(|a, b| {
            a.distance_to_goal_m
                .total_cmp(&b.distance_to_goal_m)
                .then_with(|| a.id.cmp(&b.id))
        });
        if goal_id.is_some() {
            if let Some(next) = vehicles.iter_mut().find(|v| v.distance_to_goal_m >= 0.0) {
                next.is_next = true;
            }
        }

        TrackingSnapshot {
            line: self.line.clone(),
            status: self.status,
            revision: self.revision,
            window: RouteWindow::from_stations(&stations),
            stations,
            vehicles,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
