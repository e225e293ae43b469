//! Text renderer drawing a tracking snapshot as a one-line strip.
//!
//! ```text
//! Line 1234 (direction 1) · connected · goal Gare SNCF
//! o-------o-----..B----o-------@
//!   B 12  08:15:30 • 913 m • ~2 min  [next]
//! ```

use linetrack_core::render::{RenderSink, Renderable, RouteWindow, TrackingSnapshot};

pub const DEFAULT_STRIP_WIDTH: usize = 60;

const RAIL: char = '-';
const STATION: char = 'o';
const GOAL: char = '@';
const VEHICLE: char = 'B';
const TRAIL: char = '.';

pub struct TextStrip {
    width: usize,
    header: String,
    cells: Vec<char>,
    labels: Vec<String>,
    frame: String,
}

impl TextStrip {
    pub fn new(width: usize) -> Self {
        let width = width.max(2);
        TextStrip {
            width,
            header: String::new(),
            cells: vec![RAIL; width],
            labels: Vec::new(),
            frame: String::new(),
        }
    }

    /// Last finished frame.
    pub fn frame(&self) -> &str {
        &self.frame
    }

    /// Column for a route distance. Markers outside the window stick to the
    /// nearest edge.
    fn column(&self, window: &RouteWindow, route_distance_m: f64) -> usize {
        let fraction = window.fraction(route_distance_m).clamp(0.0, 1.0);
        (fraction * (self.width - 1) as f64).round() as usize
    }
}

impl RenderSink for TextStrip {
    fn begin(&mut self, snapshot: &TrackingSnapshot) {
        self.cells = vec![RAIL; self.width];
        self.labels.clear();
        self.header = format!(
            "Line {} (direction {}) · {}",
            snapshot.line.line_id, snapshot.line.direction, snapshot.status
        );
        if let Some(goal) = snapshot.goal() {
            self.header.push_str(&format!(" · goal {}", goal.name));
        }
    }

    fn draw(&mut self, item: Renderable<'_>, window: &RouteWindow) {
        let col = self.column(window, item.route_distance_m());
        match item {
            Renderable::Station(station) => {
                self.cells[col] = if station.is_goal { GOAL } else { STATION };
            }
            Renderable::Vehicle(vehicle) => {
                self.cells[col] = VEHICLE;
                // Clamped to an edge: the marker stays, the label does not.
                if !window.contains(vehicle.route_distance_m) {
                    return;
                }
                let mut label = format!("  {VEHICLE} {}  {}", vehicle.id, vehicle.label());
                if vehicle.is_next {
                    label.push_str("  [next]");
                }
                self.labels.push(label);
            }
            Renderable::VehicleTrail { .. } => {
                if self.cells[col] == RAIL {
                    self.cells[col] = TRAIL;
                }
            }
        }
    }

    fn finish(&mut self) {
        let mut frame = String::with_capacity(self.header.len() + self.width * 2);
        frame.push_str(&self.header);
        frame.push('\n');
        frame.extend(self.cells.iter());
        for label in &self.labels {
            frame.push('\n');
            frame.push_str(label);
        }
        self.frame = frame;
    }
}

/// Render `snapshot` into a fresh strip of `width` columns.
pub fn render_frame(snapshot: &TrackingSnapshot, width: usize) -> String {
    let mut strip = TextStrip::new(width);
    snapshot.render(&mut strip);
    strip.frame
}
