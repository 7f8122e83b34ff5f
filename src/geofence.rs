use geo::{Coord, LineString, Polygon, Rect};

use crate::geodesy::haversine_distance;

/// Spatial boundary used to accept or reject candidate positions.
///
/// Coordinates follow the geo convention (x = lng, y = lat). A fence is
/// configured once per deployment but may be replaced at runtime when the
/// operator redraws the area; the pipeline invalidates its last-good
/// location when it falls outside the replacement.
#[derive(Clone, Debug)]
pub enum Geofence {
    /// Axis-aligned bounding box.
    Rect(Rect<f64>),
    /// Great-circle disc around a center point.
    Circle { center: Coord<f64>, radius_m: f64 },
    /// Arbitrary simple polygon, ray-casting containment.
    Polygon(Polygon<f64>),
}

impl Geofence {
    pub fn rect(min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Self {
        Geofence::Rect(Rect::new(
            Coord {
                x: min_lng,
                y: min_lat,
            },
            Coord {
                x: max_lng,
                y: max_lat,
            },
        ))
    }

    pub fn circle(center_lat: f64, center_lng: f64, radius_m: f64) -> Self {
        Geofence::Circle {
            center: Coord {
                x: center_lng,
                y: center_lat,
            },
            radius_m,
        }
    }

    /// Build a polygon fence from `(lat, lng)` vertices. Returns `None`
    /// for fewer than 3 vertices (not a polygon).
    pub fn polygon(vertices: &[(f64, f64)]) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let ring: Vec<Coord<f64>> = vertices
            .iter()
            .map(|(lat, lng)| Coord { x: *lng, y: *lat })
            .collect();
        Some(Geofence::Polygon(Polygon::new(LineString::new(ring), vec![])))
    }

    /// Whether the point lies inside the fence (boundary counts as inside
    /// for rect and circle; polygon edges follow ray-casting parity).
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        match self {
            Geofence::Rect(rect) => {
                let min = rect.min();
                let max = rect.max();
                lat >= min.y && lat <= max.y && lng >= min.x && lng <= max.x
            }
            Geofence::Circle { center, radius_m } => {
                haversine_distance(lat, lng, center.y, center.x) <= *radius_m
            }
            Geofence::Polygon(polygon) => ray_cast(polygon, lat, lng),
        }
    }
}

/// Odd-crossing-count point-in-polygon test over the exterior ring.
fn ray_cast(polygon: &Polygon<f64>, lat: f64, lng: f64) -> bool {
    let ring = &polygon.exterior().0;
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);
        let crosses = (yi > lat) != (yj > lat)
            && lng < (xj - xi) * (lat - yi) / (yj - yi) + xi;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_containment() {
        let fence = Geofence::rect(37.4250453, 31.8511658, 37.4268453, 31.8533658);
        assert!(fence.contains(37.4259, 31.8522));
        // Boundary is inside.
        assert!(fence.contains(37.4250453, 31.8511658));
        // Each side of the box excludes.
        assert!(!fence.contains(37.4249, 31.8522));
        assert!(!fence.contains(37.4270, 31.8522));
        assert!(!fence.contains(37.4259, 31.8510));
        assert!(!fence.contains(37.4259, 31.8535));
    }

    #[test]
    fn test_circle_containment() {
        let fence = Geofence::circle(37.0, 31.0, 100.0);
        assert!(fence.contains(37.0, 31.0));
        // ~55m north: inside. ~550m north: outside.
        assert!(fence.contains(37.0005, 31.0));
        assert!(!fence.contains(37.005, 31.0));
    }

    #[test]
    fn test_polygon_containment() {
        // Unit-ish square.
        let fence = Geofence::polygon(&[
            (37.000, 31.000),
            (37.000, 31.002),
            (37.002, 31.002),
            (37.002, 31.000),
        ])
        .unwrap();
        assert!(fence.contains(37.001, 31.001));
        assert!(!fence.contains(37.005, 31.001));
        assert!(!fence.contains(36.999, 31.001));
    }

    #[test]
    fn test_concave_polygon() {
        // L-shape; the notch is outside.
        let fence = Geofence::polygon(&[
            (0.0, 0.0),
            (0.0, 4.0),
            (2.0, 4.0),
            (2.0, 2.0),
            (4.0, 2.0),
            (4.0, 0.0),
        ])
        .unwrap();
        assert!(fence.contains(1.0, 1.0));
        assert!(fence.contains(3.0, 1.0));
        assert!(!fence.contains(3.0, 3.0), "notch must be outside");
    }

    #[test]
    fn test_polygon_requires_three_vertices() {
        assert!(Geofence::polygon(&[(0.0, 0.0), (1.0, 1.0)]).is_none());
    }
}
