//! Render-ready snapshot of a tracking session.
//!
//! A snapshot is an owned copy of everything a renderer draws: the visible
//! station window, the connection status and every vehicle with its trail.
//! Renderers receive a closed set of [`Renderable`] items through a single
//! [`RenderSink::draw`] dispatch.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::format;
use crate::tracker::VehicleSnapshot;
use crate::types::*;

/// Station as drawn on the line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationView {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
    pub route_distance_m: f64,
    pub is_goal: bool,
}

/// Vehicle marker plus its trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleView {
    pub id: String,
    pub location: Option<GeoPoint>,
    pub route_distance_m: f64,
    pub distance_to_goal_m: f64,
    pub smoothed_distance_m: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
    pub history: Vec<VehicleSnapshot>,
    /// Closest vehicle still heading to the goal.
    pub is_next: bool,
}

impl VehicleView {
    pub fn label(&self) -> String {
        format::vehicle_label(self.last_update, self.distance_to_goal_m)
    }
}

/// Route-distance span covered by the visible stations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RouteWindow {
    pub origin_m: f64,
    pub last_m: f64,
}

impl RouteWindow {
    pub fn from_stations(stations: &[StationView]) -> Self {
        match (stations.first(), stations.last()) {
            (Some(first), Some(last)) => RouteWindow {
                origin_m: first.route_distance_m,
                last_m: last.route_distance_m,
            },
            _ => RouteWindow::default(),
        }
    }

    /// Window length; an empty window counts as 1 m so scaling stays finite.
    pub fn span(&self) -> f64 {
        let span = self.last_m - self.origin_m;
        if span > 0.0 {
            span
        } else {
            1.0
        }
    }

    /// Position of `route_distance_m` across the window, 0 at the first
    /// visible station and 1 at the last. Unclamped.
    pub fn fraction(&self, route_distance_m: f64) -> f64 {
        (route_distance_m - self.origin_m) / self.span()
    }

    pub fn contains(&self, route_distance_m: f64) -> bool {
        (0.0..=1.0).contains(&self.fraction(route_distance_m))
    }
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub line: LineRef,
    pub status: ConnectionStatus,
    pub revision: u64,
    pub window: RouteWindow,
    pub stations: Vec<StationView>,
    pub vehicles: Vec<VehicleView>,
}

impl TrackingSnapshot {
    pub fn goal(&self) -> Option<&StationView> {
        self.stations.iter().find(|s| s.is_goal)
    }

    pub fn next_vehicle(&self) -> Option<&VehicleView> {
        self.vehicles.iter().find(|v| v.is_next)
    }

    /// Items in draw order: stations, then each vehicle followed by its trail.
    pub fn renderables(&self) -> Vec<Renderable<'_>> {
        let mut items: Vec<Renderable<'_>> =
            self.stations.iter().map(Renderable::Station).collect();
        for vehicle in &self.vehicles {
            items.push(Renderable::Vehicle(vehicle));
            items.extend(
                vehicle
                    .history
                    .iter()
                    .map(|point| Renderable::VehicleTrail { vehicle, point }),
            );
        }
        items
    }

    /// Feed every item to `sink`.
    pub fn render<S: RenderSink + ?Sized>(&self, sink: &mut S) {
        sink.begin(self);
        for item in self.renderables() {
            sink.draw(item, &self.window);
        }
        sink.finish();
    }
}

/// One drawable entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Renderable<'a> {
    Station(&'a StationView),
    Vehicle(&'a VehicleView),
    VehicleTrail {
        vehicle: &'a VehicleView,
        point: &'a VehicleSnapshot,
    },
}

impl Renderable<'_> {
    /// Route distance the item is drawn at.
    pub fn route_distance_m(&self) -> f64 {
        match self {
            Renderable::Station(s) => s.route_distance_m,
            Renderable::Vehicle(v) => v.route_distance_m,
            Renderable::VehicleTrail { point, .. } => point.route_distance_m,
        }
    }
}

/// A rendering backend.
pub trait RenderSink {
    fn begin(&mut self, _snapshot: &TrackingSnapshot) {}

    fn draw(&mut self, item: Renderable<'_>, window: &RouteWindow);

    fn finish(&mut self) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn station(id: &str, x: f64, is_goal: bool) -> StationView {
        StationView {
            id: id.into(),
            name: id.into(),
            location: GeoPoint::new(0.0, 0.0),
            route_distance_m: x,
            is_goal,
        }
    }

    fn vehicle(id: &str, x: f64, trail: &[f64]) -> VehicleView {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        VehicleView {
            id: id.into(),
            location: None,
            route_distance_m: x,
            distance_to_goal_m: 1000.0 - x,
            smoothed_distance_m: None,
            last_update: Some(ts),
            history: trail
                .iter()
                .map(|&x| VehicleSnapshot {
                    route_distance_m: x,
                    distance_to_goal_m: 1000.0 - x,
                    timestamp: ts,
                })
                .collect(),
            is_next: false,
        }
    }

    fn snapshot() -> TrackingSnapshot {
        let stations = vec![station("a", 200.0, false), station("b", 1000.0, true)];
        TrackingSnapshot {
            line: LineRef::new("1", "1"),
            status: ConnectionStatus::Connected,
            revision: 3,
            window: RouteWindow::from_stations(&stations),
            stations,
            vehicles: vec![vehicle("v1", 600.0, &[500.0, 550.0])],
        }
    }

    #[derive(Default)]
    struct Recorder {
        began: bool,
        finished: bool,
        kinds: Vec<&'static str>,
    }

    impl RenderSink for Recorder {
        fn begin(&mut self, _snapshot: &TrackingSnapshot) {
            self.began = true;
        }

        fn draw(&mut self, item: Renderable<'_>, _window: &RouteWindow) {
            self.kinds.push(match item {
                Renderable::Station(_) => "station",
                Renderable::Vehicle(_) => "vehicle",
                Renderable::VehicleTrail { .. } => "trail",
            });
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn test_window_fraction() {
        let w = RouteWindow {
            origin_m: 200.0,
            last_m: 1000.0,
        };
        assert_eq!(w.fraction(200.0), 0.0);
        assert_eq!(w.fraction(600.0), 0.5);
        assert!(w.fraction(100.0) < 0.0);
        assert!(w.contains(1000.0));
        assert!(!w.contains(1001.0));
    }

    #[test]
    fn test_empty_window_span() {
        let w = RouteWindow::default();
        assert_eq!(w.span(), 1.0);
        assert_eq!(w.fraction(0.0), 0.0);
    }

    #[test]
    fn test_render_order() {
        let mut rec = Recorder::default();
        snapshot().render(&mut rec);
        assert!(rec.began && rec.finished);
        assert_eq!(rec.kinds, ["station", "station", "vehicle", "trail", "trail"]);
    }

    #[test]
    fn test_renderable_distance() {
        let snap = snapshot();
        let xs: Vec<f64> = snap.renderables().iter().map(|r| r.route_distance_m()).collect();
        assert_eq!(xs, [200.0, 1000.0, 600.0, 500.0, 550.0]);
    }

    #[test]
    fn test_goal_lookup() {
        assert_eq!(snapshot().goal().unwrap().id, "b");
        let mut snap = snapshot();
        snap.stations.retain(|s| !s.is_goal);
        assert!(snap.goal().is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["status"], "connected");
        assert_eq!(json["vehicles"][0]["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["window"]["origin_m"], 200.0);
    }
}
