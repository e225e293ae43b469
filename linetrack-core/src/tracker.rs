//! Per-vehicle state: epsilon-gated position updates, bounded history and
//! route-distance smoothing.
//!
//! Pure logic, no I/O. The session resolves route distances and hands them
//! in; a vehicle only decides whether the fix is a real move.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::*;

/// Default number of past snapshots kept per vehicle.
pub const DEFAULT_HISTORY_CAPACITY: usize = 12;

/// Allowed history capacities.
pub const HISTORY_CAPACITY_RANGE: std::ops::RangeInclusive<usize> = 10..=12;

/// Moves shorter than this (meters) are treated as a repeated fix.
pub const DEFAULT_MOVE_EPSILON_M: f64 = 0.5;

/// Time constant of the route-distance smoothing filter (seconds).
pub const DEFAULT_SMOOTHING_TAU_SECS: f64 = 4.0;

/// Knobs shared by every vehicle of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub history_capacity: usize,
    pub move_epsilon_m: f64,
    pub smoothing_tau_secs: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            move_epsilon_m: DEFAULT_MOVE_EPSILON_M,
            smoothing_tau_secs: DEFAULT_SMOOTHING_TAU_SECS,
        }
    }
}

/// A past position of a vehicle, reduced to what gets drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub route_distance_m: f64,
    pub distance_to_goal_m: f64,
    pub timestamp: DateTime<Utc>,
}

/// Live state of one tracked vehicle.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: String,
    pub location: Option<GeoPoint>,
    pub route_distance_m: f64,
    pub distance_to_goal_m: f64,
    pub smoothed_distance_m: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub update_count: u64,
    history: VecDeque<VehicleSnapshot>,
    settings: TrackerSettings,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, settings: TrackerSettings) -> Self {
        Vehicle {
            id: id.into(),
            location: None,
            route_distance_m: 0.0,
            distance_to_goal_m: 0.0,
            smoothed_distance_m: None,
            last_update: None,
            update_count: 0,
            history: VecDeque::with_capacity(settings.history_capacity),
            settings,
        }
    }

    /// Apply a fix, stamping it with the wall clock when the feed gave no time.
    pub fn apply_fix(
        &mut self,
        fix: &VehicleFix,
        route_distance_m: f64,
        distance_to_goal_m: f64,
    ) -> bool {
        self.apply_fix_at(fix, route_distance_m, distance_to_goal_m, Utc::now())
    }

    /// Apply a fix received at `received_at`. Returns `true` when the vehicle
    /// moved and its state changed.
    pub fn apply_fix_at(
        &mut self,
        fix: &VehicleFix,
        route_distance_m: f64,
        distance_to_goal_m: f64,
        received_at: DateTime<Utc>,
    ) -> bool {
        if let Some(current) = self.location {
            if current.approx_eq(&fix.location, self.settings.move_epsilon_m) {
                return false;
            }
        }

        if let Some(previous) = self.snapshot() {
            self.history.push_back(previous);
            while self.history.len() > self.settings.history_capacity {
                self.history.pop_front();
            }
        }

        let timestamp = fix.observed_at.unwrap_or(received_at);
        self.smoothed_distance_m = Some(self.smooth(route_distance_m, timestamp));
        self.location = Some(fix.location);
        self.last_update = Some(timestamp);
        self.route_distance_m = route_distance_m;
        self.distance_to_goal_m = distance_to_goal_m;
        self.update_count += 1;
        true
    }

    /// Current state as a history entry, once the vehicle has a position.
    pub fn snapshot(&self) -> Option<VehicleSnapshot> {
        self.last_update.map(|timestamp| VehicleSnapshot {
            route_distance_m: self.route_distance_m,
            distance_to_goal_m: self.distance_to_goal_m,
            timestamp,
        })
    }

    /// Past snapshots, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &VehicleSnapshot> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn smooth(&self, x: f64, at: DateTime<Utc>) -> f64 {
        let (Some(prev), Some(prev_at)) = (self.smoothed_distance_m, self.last_update) else {
            return x;
        };
        let dt = ((at - prev_at).num_milliseconds() as f64 / 1000.0).max(0.0);
        let alpha = 1.0 - (-dt / self.settings.smoothing_tau_secs.max(0.001)).exp();
        prev + alpha * (x - prev)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
