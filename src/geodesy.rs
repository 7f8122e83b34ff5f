//! Great-circle distance and point-to-segment projection.
//!
//! Leaf utility for every other module. Coordinates follow the geo crate
//! convention: `Coord { x: longitude, y: latitude }` in degrees, distances
//! in meters.

use geo::Coord;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two lat/lng points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Result of projecting a point onto a line segment.
#[derive(Clone, Copy, Debug)]
pub struct SegmentProjection {
    /// Closest point on the segment (x = lng, y = lat).
    pub point: Coord<f64>,
    /// Clamped projection parameter, 0 at `start`, 1 at `end`.
    pub t: f64,
    /// Distance from the query point to `point` in meters.
    pub distance_m: f64,
}

/// Project a lat/lng point onto the segment `start`..`end` using a local
/// cartesian approximation (exact enough at building scale), clamping the
/// parametric position to [0, 1].
pub fn project_onto_segment(
    lat: f64,
    lng: f64,
    start: Coord<f64>,
    end: Coord<f64>,
) -> SegmentProjection {
    let lat_to_m = 111_000.0;
    let lon_to_m = 111_000.0 * lat.to_radians().cos();

    let x0 = (lng - start.x) * lon_to_m;
    let y0 = (lat - start.y) * lat_to_m;
    let x1 = (end.x - start.x) * lon_to_m;
    let y1 = (end.y - start.y) * lat_to_m;

    let length_sq = x1 * x1 + y1 * y1;
    if length_sq < 1e-9 {
        // Degenerate segment, both endpoints coincide.
        let point = start;
        return SegmentProjection {
            point,
            t: 0.0,
            distance_m: haversine_distance(lat, lng, point.y, point.x),
        };
    }

    let t = ((x0 * x1 + y0 * y1) / length_sq).clamp(0.0, 1.0);
    let point = Coord {
        x: start.x + (end.x - start.x) * t,
        y: start.y + (end.y - start.y) * t,
    };

    SegmentProjection {
        point,
        t,
        distance_m: haversine_distance(lat, lng, point.y, point.x),
    }
}
