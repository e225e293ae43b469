//! Great-circle distance and a local planar projection.
//!
//! The projection is an equirectangular approximation centered on a route
//! origin. It is accurate over the few kilometers a bus line spans, which is
//! all nearest-point-on-segment needs; it is not meant for global use.

use crate::types::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn great_circle_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Planar coordinates in meters relative to a projection origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub fn sub(self, other: Xy) -> Xy {
        Xy {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn dot(self, other: Xy) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn norm_sq(self) -> f64 {
        self.dot(self)
    }
}

/// Equirectangular projection around a fixed origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: GeoPoint,
    cos_lat0: f64,
}

impl LocalProjection {
    pub fn new(origin: GeoPoint) -> Self {
        LocalProjection {
            origin,
            cos_lat0: origin.lat.to_radians().cos(),
        }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn project(&self, p: GeoPoint) -> Xy {
        Xy {
            x: EARTH_RADIUS_M * (p.lon - self.origin.lon).to_radians() * self.cos_lat0,
            y: EARTH_RADIUS_M * (p.lat - self.origin.lat).to_radians(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
