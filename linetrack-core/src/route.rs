//! Route model: ordered stations, cumulative route distance and the
//! projected segments used to place a GPS fix on the line.
//!
//! Route distance is great-circle distance summed station to station. Fixes
//! are located by nearest-point-on-segment in the local plane, then mapped
//! back onto route distance with the segment's great-circle length.

use serde::Serialize;

use crate::geo::{self, LocalProjection, Xy};
use crate::types::*;

/// Floor for a segment's squared planar length, so coincident stations
/// never divide by zero.
pub const MIN_SEGMENT_LENGTH_SQ: f64 = 1e-6;

/// A stop placed on the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub route_distance_m: f64,
}

/// Straight span between two consecutive stations in the local plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start_index: usize,
    pub end_index: usize,
    pub start_xy: Xy,
    pub end_xy: Xy,
    pub local_length_sq: f64,
    pub length_m: f64,
    pub cumulative_start_m: f64,
}

impl Segment {
    /// Clamped parameter and squared planar distance of the nearest point
    /// on this segment to `p`.
    pub fn nearest(&self, p: Xy) -> (f64, f64) {
        let ab = self.end_xy.sub(self.start_xy);
        let ap = p.sub(self.start_xy);
        let t = (ap.dot(ab) / self.local_length_sq).clamp(0.0, 1.0);
        let closest = Xy {
            x: self.start_xy.x + t * ab.x,
            y: self.start_xy.y + t * ab.y,
        };
        (t, p.sub(closest).norm_sq())
    }
}

/// Stations in physical route order plus derived segments and goal.
#[derive(Debug, Clone)]
pub struct RouteModel {
    stations: Vec<Station>,
    segments: Vec<Segment>,
    projection: LocalProjection,
    goal_index: Option<usize>,
}

impl RouteModel {
    /// Build a route from stop records in route order.
    pub fn build(stops: &[StopRecord]) -> Result<Self> {
        let first = stops.first().ok_or(LineTrackError::EmptyRoute)?;
        let projection = LocalProjection::new(first.location);

        let mut stations = Vec::with_capacity(stops.len());
        let mut distance = 0.0;
        for (i, stop) in stops.iter().enumerate() {
            if i > 0 {
                distance += geo::great_circle_distance_m(stops[i - 1].location, stop.location);
            }
            stations.push(Station {
                id: stop.id.clone(),
                name: stop.name.clone(),
                location: stop.location,
                route_distance_m: distance,
            });
        }

        let segments = stations
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (a, b) = (&pair[0], &pair[1]);
                let start_xy = projection.project(a.location);
                let end_xy = projection.project(b.location);
                Segment {
                    start_index: i,
                    end_index: i + 1,
                    start_xy,
                    end_xy,
                    local_length_sq: end_xy.sub(start_xy).norm_sq().max(MIN_SEGMENT_LENGTH_SQ),
                    length_m: geo::great_circle_distance_m(a.location, b.location),
                    cumulative_start_m: a.route_distance_m,
                }
            })
            .collect();

        Ok(RouteModel {
            stations,
            segments,
            projection,
            goal_index: None,
        })
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Select the station distance-to-goal is measured against.
    pub fn set_goal(&mut self, station_id: &str) -> Result<()> {
        let index = self
            .stations
            .iter()
            .position(|s| s.id == station_id)
            .ok_or_else(|| LineTrackError::UnknownStation(station_id.to_string()))?;
        self.goal_index = Some(index);
        Ok(())
    }

    pub fn goal_index(&self) -> Option<usize> {
        self.goal_index
    }

    pub fn goal(&self) -> Option<&Station> {
        self.goal_index.map(|i| &self.stations[i])
    }

    /// Inclusive station range between two indices. Indices are clamped into
    /// bounds and may be given in either order.
    pub fn truncate(&self, from: usize, to: usize) -> &[Station] {
        let last = self.stations.len().saturating_sub(1);
        let (a, b) = (from.min(last), to.min(last));
        &self.stations[a.min(b)..=a.max(b)]
    }

    /// Route distance of the point on the line nearest to `point`.
    ///
    /// Linear scan over segments; on equal distances the earliest segment in
    /// route order wins. A single-station route always resolves to 0.
    pub fn locate(&self, point: GeoPoint) -> f64 {
        let p = self.projection.project(point);
        let mut best: Option<(f64, f64)> = None; // (d2, route distance)
        for seg in &self.segments {
            let (t, d2) = seg.nearest(p);
            if best.is_none_or(|(best_d2, _)| d2 < best_d2) {
                best = Some((d2, seg.cumulative_start_m + t * seg.length_m));
            }
        }
        best.map(|(_, x)| x).unwrap_or(0.0)
    }

    /// Remaining route distance to the goal. Negative once the goal has been
    /// passed; 0 when no goal is set.
    pub fn distance_to_goal(&self, route_distance_m: f64) -> f64 {
        self.goal()
            .map(|g| g.route_distance_m - route_distance_m)
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
