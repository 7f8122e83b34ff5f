// route.rs — Projection of a live position onto a planned route.
//
// The pipeline emits free positions; when the subject is following a known
// corridor or path, the UI wants the marker snapped onto the polyline and
// the route split into a traveled part and a remaining part.

use geo::{Coord, LineString};

use crate::geodesy::{haversine_distance, project_onto_segment};

/// Result of projecting a position onto a route.
#[derive(Clone, Debug)]
pub struct RouteProgress {
    /// Snapped point on the polyline (x = lng, y = lat).
    pub projection: Coord<f64>,
    /// Index of the segment the projection landed on.
    pub segment_index: usize,
    /// Distance from the query position to the snapped point, in meters.
    pub distance_m: f64,
    /// Waypoints already passed, ending at the snapped point.
    pub traveled: LineString<f64>,
    /// Snapped point followed by the waypoints still ahead.
    pub remaining: LineString<f64>,
}

/// A planned route as an ordered polyline of (lat, lng) waypoints.
#[derive(Clone, Debug)]
pub struct RoutePolyline {
    line: LineString<f64>,
}

impl RoutePolyline {
    /// Build from at least two waypoints; fewer is not a route.
    pub fn new(waypoints: &[(f64, f64)]) -> Option<Self> {
        if waypoints.len() < 2 {
            return None;
        }
        let coords: Vec<Coord<f64>> = waypoints
            .iter()
            .map(|&(lat, lng)| Coord { x: lng, y: lat })
            .collect();
        Some(RoutePolyline {
            line: LineString::from(coords),
        })
    }

    pub fn waypoints(&self) -> &LineString<f64> {
        &self.line
    }

    /// Length of the full route in meters.
    pub fn length_m(&self) -> f64 {
        self.line
            .0
            .windows(2)
            .map(|pair| haversine_distance(pair[0].y, pair[0].x, pair[1].y, pair[1].x))
            .sum()
    }

    /// Snap a position onto the route: the globally closest point across
    /// all segments, plus the traveled/remaining split at that point.
    pub fn project(&self, latitude: f64, longitude: f64) -> Option<RouteProgress> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }

        let coords = &self.line.0;
        let mut best: Option<(usize, crate::geodesy::SegmentProjection)> = None;
        for (index, pair) in coords.windows(2).enumerate() {
            let projection = project_onto_segment(latitude, longitude, pair[0], pair[1]);
            let better = best
                .as_ref()
                .map_or(true, |(_, b)| projection.distance_m < b.distance_m);
            if better {
                best = Some((index, projection));
            }
        }
        let (segment_index, projection) = best?;

        let mut traveled: Vec<Coord<f64>> = coords[..=segment_index].to_vec();
        traveled.push(projection.point);

        let mut remaining: Vec<Coord<f64>> = vec![projection.point];
        remaining.extend_from_slice(&coords[segment_index + 1..]);

        Some(RouteProgress {
            projection: projection.point,
            segment_index,
            distance_m: projection.distance_m,
            traveled: LineString::from(traveled),
            remaining: LineString::from(remaining),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn l_shaped_route() -> RoutePolyline {
        // East along lat 37.0, then north along lng 31.002.
        RoutePolyline::new(&[(37.0, 31.0), (37.0, 31.002), (37.002, 31.002)])
            .expect("valid route")
    }

    #[test]
    fn test_too_few_waypoints_is_not_a_route() {
        assert!(RoutePolyline::new(&[]).is_none());
        assert!(RoutePolyline::new(&[(37.0, 31.0)]).is_none());
        assert!(RoutePolyline::new(&[(37.0, 31.0), (37.0, 31.001)]).is_some());
    }

    #[test]
    fn test_projection_snaps_to_first_segment() {
        let route = l_shaped_route();
        // Slightly north of the middle of the first leg.
        let progress = route.project(37.0001, 31.001).unwrap();
        assert_eq!(progress.segment_index, 0);
        assert_relative_eq!(progress.projection.y, 37.0, epsilon = 1e-9);
        assert_relative_eq!(progress.projection.x, 31.001, epsilon = 1e-6);
        assert!(progress.distance_m < 15.0);
    }

    #[test]
    fn test_projection_clamps_to_segment_start() {
        let route = l_shaped_route();
        // Behind the route start: snaps to the first waypoint.
        let progress = route.project(37.0, 30.99).unwrap();
        assert_eq!(progress.segment_index, 0);
        assert_relative_eq!(progress.projection.x, 31.0, epsilon = 1e-9);
        assert_relative_eq!(progress.projection.y, 37.0, epsilon = 1e-9);
    }

    #[test]
    fn test_traveled_and_remaining_split_at_projection() {
        let route = l_shaped_route();
        // Beside the second leg.
        let progress = route.project(37.001, 31.0021).unwrap();
        assert_eq!(progress.segment_index, 1);

        // Traveled: start, corner, snapped point.
        assert_eq!(progress.traveled.0.len(), 3);
        assert_relative_eq!(progress.traveled.0[0].x, 31.0);
        assert_relative_eq!(progress.traveled.0[2].x, progress.projection.x);
        assert_relative_eq!(progress.traveled.0[2].y, progress.projection.y);

        // Remaining: snapped point, route end.
        assert_eq!(progress.remaining.0.len(), 2);
        assert_relative_eq!(progress.remaining.0[0].y, progress.projection.y);
        assert_relative_eq!(progress.remaining.0[1].y, 37.002);

        // The two halves together cover the route length.
        let traveled_m: f64 = progress
            .traveled
            .0
            .windows(2)
            .map(|p| haversine_distance(p[0].y, p[0].x, p[1].y, p[1].x))
            .sum();
        let remaining_m: f64 = progress
            .remaining
            .0
            .windows(2)
            .map(|p| haversine_distance(p[0].y, p[0].x, p[1].y, p[1].x))
            .sum();
        assert_relative_eq!(
            traveled_m + remaining_m,
            route.length_m(),
            max_relative = 0.01
        );
    }

    #[test]
    fn test_point_on_route_projects_to_itself() {
        let route = l_shaped_route();
        let progress = route.project(37.0, 31.001).unwrap();
        assert!(progress.distance_m < 0.01);
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let route = l_shaped_route();
        assert!(route.project(f64::NAN, 31.0).is_none());
    }
}
