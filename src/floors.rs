// floors.rs — Altitude-keyed floor resolution and door snapping.
//
// Venues register each floor with a reference altitude (meters, same datum
// as the samples) and optionally the door segments drawn on its plan. The
// locator maps a barometric/GNSS altitude to the nearest floor and a
// position to the nearest door on that floor.

use geo::{Coord, Line};

/// One floor of a venue.
#[derive(Clone, Debug)]
pub struct Floor {
    /// Venue-level identifier, e.g. "0", "1", "B1".
    pub key: String,
    /// Reference altitude of the walking surface, in meters.
    pub altitude: f64,
    /// Door segments on this floor's plan, if surveyed.
    pub doors: Option<Vec<DoorSegment>>,
}

/// A doorway as a line segment in lng/lat coordinates (x = lng, y = lat).
#[derive(Clone, Debug)]
pub struct DoorSegment {
    pub id: String,
    pub line: Line<f64>,
}

impl DoorSegment {
    pub fn new(
        id: impl Into<String>,
        start_lat: f64,
        start_lng: f64,
        end_lat: f64,
        end_lng: f64,
    ) -> Self {
        DoorSegment {
            id: id.into(),
            line: Line::new(
                Coord { x: start_lng, y: start_lat },
                Coord { x: end_lng, y: end_lat },
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoorMatch {
    pub door_id: String,
    pub distance_m: f64,
}

/// Resolves altitudes to floors and positions to doors.
#[derive(Clone, Debug, Default)]
pub struct FloorLocator {
    floors: Vec<Floor>,
}

impl FloorLocator {
    pub fn new(floors: Vec<Floor>) -> Self {
        FloorLocator { floors }
    }

    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    /// The floor whose reference altitude is closest to `altitude`.
    /// Ties go to the floor registered first. `None` when no floors are
    /// registered or the altitude is not a number.
    pub fn closest_floor(&self, altitude: f64) -> Option<&Floor> {
        if !altitude.is_finite() {
            return None;
        }
        let mut best: Option<(&Floor, f64)> = None;
        for floor in &self.floors {
            let delta = (floor.altitude - altitude).abs();
            match best {
                Some((_, best_delta)) if delta >= best_delta => {}
                _ => best = Some((floor, delta)),
            }
        }
        best.map(|(floor, _)| floor)
    }

    /// Replace the door set of a floor. Unknown keys are ignored.
    pub fn set_doors(&mut self, key: &str, doors: Vec<DoorSegment>) {
        if let Some(floor) = self.floors.iter_mut().find(|f| f.key == key) {
            floor.doors = Some(doors);
        } else {
            log::warn!("set_doors: no floor with key {key:?}");
        }
    }

    /// Nearest door to `(latitude, longitude)` on the floor matching the
    /// altitude, measured point-to-segment. `None` while the floor has no
    /// surveyed doors, so callers can distinguish "away from any door"
    /// (a far match) from "doors unknown".
    pub fn closest_door(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
    ) -> Option<DoorMatch> {
        let floor = self.closest_floor(altitude)?;
        let doors = floor.doors.as_ref()?;

        let mut best: Option<DoorMatch> = None;
        for door in doors {
            let projection = crate::geodesy::project_onto_segment(
                latitude,
                longitude,
                door.line.start,
                door.line.end,
            );
            let better = best
                .as_ref()
                .map_or(true, |b| projection.distance_m < b.distance_m);
            if better {
                best = Some(DoorMatch {
                    door_id: door.id.clone(),
                    distance_m: projection.distance_m,
                });
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_floor_venue() -> FloorLocator {
        FloorLocator::new(vec![
            Floor {
                key: "0".into(),
                altitude: 1150.0,
                doors: None,
            },
            Floor {
                key: "1".into(),
                altitude: 1160.0,
                doors: None,
            },
        ])
    }

    #[test]
    fn test_closest_floor_by_altitude() {
        let locator = two_floor_venue();
        assert_eq!(locator.closest_floor(1152.0).unwrap().key, "0");
        assert_eq!(locator.closest_floor(1159.0).unwrap().key, "1");
    }

    #[test]
    fn test_floor_tie_prefers_first_registered() {
        let locator = two_floor_venue();
        // 1155 is equidistant from both reference altitudes.
        assert_eq!(locator.closest_floor(1155.0).unwrap().key, "0");
    }

    #[test]
    fn test_no_floors_or_bad_altitude() {
        assert!(FloorLocator::default().closest_floor(1150.0).is_none());
        assert!(two_floor_venue().closest_floor(f64::NAN).is_none());
    }

    #[test]
    fn test_closest_door_none_without_survey() {
        let locator = two_floor_venue();
        assert!(locator.closest_door(37.0, 31.0, 1152.0).is_none());
    }

    #[test]
    fn test_closest_door_picks_nearest_segment() {
        let mut locator = two_floor_venue();
        locator.set_doors(
            "0",
            vec![
                // ~11m east of the query point, running north-south.
                DoorSegment::new("east", 36.9999, 31.0001, 37.0001, 31.0001),
                // ~55m east.
                DoorSegment::new("far-east", 36.9999, 31.0005, 37.0001, 31.0005),
            ],
        );

        let hit = locator.closest_door(37.0, 31.0, 1151.0).unwrap();
        assert_eq!(hit.door_id, "east");
        assert!(
            hit.distance_m > 5.0 && hit.distance_m < 15.0,
            "distance {:.1}m",
            hit.distance_m
        );
    }

    #[test]
    fn test_closest_door_uses_segment_not_endpoints() {
        let mut locator = two_floor_venue();
        // Long segment passing ~11m north of the query; both endpoints are
        // hundreds of meters away.
        locator.set_doors(
            "0",
            vec![DoorSegment::new("corridor", 37.0001, 30.995, 37.0001, 31.005)],
        );
        let hit = locator.closest_door(37.0, 31.0, 1150.0).unwrap();
        assert!(
            hit.distance_m < 15.0,
            "interior projection expected, got {:.1}m",
            hit.distance_m
        );
    }

    #[test]
    fn test_doors_resolve_on_matching_floor_only() {
        let mut locator = two_floor_venue();
        locator.set_doors(
            "1",
            vec![DoorSegment::new("up", 37.0, 31.0, 37.0001, 31.0)],
        );
        // Altitude resolves to floor "0", which has no doors.
        assert!(locator.closest_door(37.0, 31.0, 1151.0).is_none());
        assert!(locator.closest_door(37.0, 31.0, 1159.0).is_some());
    }
}
