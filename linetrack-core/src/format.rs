//! Label formatting for vehicle markers.

use chrono::{DateTime, Local, Utc};

/// Average commercial speed used for arrival estimates (km/h).
pub const AVERAGE_BUS_SPEED_KMH: f64 = 25.0;

/// Human distance: `1.2 km`, `12 km`, `456 m`, never below `1 m`.
pub fn format_distance(meters: f64) -> String {
    let m = meters.abs();
    if m >= 1000.0 {
        if m < 10_000.0 {
            format!("{:.1} km", m / 1000.0)
        } else {
            format!("{:.0} km", m / 1000.0)
        }
    } else if m >= 100.0 {
        format!("{} m", m.round())
    } else {
        format!("{} m", m.round().max(1.0))
    }
}

/// `42 s` under a minute, whole minutes above.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{} s", seconds.round())
    } else {
        format!("{} min", (seconds / 60.0).floor())
    }
}

/// Seconds to cover `distance_m` at the average bus speed. Vehicles past the
/// goal get 0.
pub fn eta_seconds(distance_m: f64) -> f64 {
    distance_m.max(0.0) / (AVERAGE_BUS_SPEED_KMH / 3.6)
}

/// Wall-clock `HH:MM:SS` in local time.
pub fn format_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Marker label: `08:15:30 • 1.2 km • ~2 min`.
pub fn vehicle_label(last_update: Option<DateTime<Utc>>, distance_to_goal_m: f64) -> String {
    let clock = last_update
        .map(format_clock)
        .unwrap_or_else(|| "--:--:--".into());
    format!(
        "{clock} • {} • ~{}",
        format_distance(distance_to_goal_m),
        format_duration(eta_seconds(distance_to_goal_m))
    )
}
