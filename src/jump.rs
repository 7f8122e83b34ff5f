use crate::geodesy::haversine_distance;
use crate::types::DeviceClass;

/// Outcome of one jump check.
#[derive(Clone, Copy, Debug)]
pub struct JumpCheck {
    pub is_jump: bool,
    /// Great-circle distance between reference and candidate in meters.
    pub distance_m: f64,
}

/// Flags physically implausible sample-to-sample displacement by comparing
/// the low-pass output (reference) against the median output (candidate).
///
/// Two tests are OR'd: the coordinate-delta test is a cheap degree-space
/// pre-filter (latitude-dependent in meters), the distance test is
/// latitude-correct. Either firing flags a jump; downstream input selection
/// decides how to react.
#[derive(Clone, Debug)]
pub struct JumpDetector {
    min_distance_m: f64,
    accuracy_divisor: f64,
    coord_threshold_deg: f64,
}

impl JumpDetector {
    pub fn new(device_class: DeviceClass, coord_threshold_deg: f64) -> Self {
        // Degraded platforms report worse accuracy and need more tolerance
        // before a displacement counts as a jump.
        let (min_distance_m, accuracy_divisor) = match device_class {
            DeviceClass::Standard => (5.0, 3.0),
            DeviceClass::DegradedAccuracy => (8.0, 2.5),
        };
        JumpDetector {
            min_distance_m,
            accuracy_divisor,
            coord_threshold_deg,
        }
    }

    pub fn detect(
        &self,
        reference: (f64, f64),
        candidate: (f64, f64),
        accuracy: f64,
    ) -> JumpCheck {
        let distance_m =
            haversine_distance(reference.0, reference.1, candidate.0, candidate.1);
        let distance_threshold = self.min_distance_m.max(accuracy / self.accuracy_divisor);

        let lat_delta = (reference.0 - candidate.0).abs();
        let lng_delta = (reference.1 - candidate.1).abs();

        let is_jump = distance_m > distance_threshold
            || lat_delta > self.coord_threshold_deg
            || lng_delta > self.coord_threshold_deg;

        JumpCheck { is_jump, distance_m }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_positions_are_not_a_jump() {
        let detector = JumpDetector::new(DeviceClass::Standard, 0.0001);
        let check = detector.detect((37.0, 31.0), (37.0, 31.0), 5.0);
        assert!(!check.is_jump);
        assert_eq!(check.distance_m, 0.0);
    }

    #[test]
    fn test_large_displacement_is_a_jump() {
        let detector = JumpDetector::new(DeviceClass::Standard, 0.0001);
        // ~110m of latitude, accuracy 5m -> threshold max(5, 5/3) = 5m.
        let check = detector.detect((37.0, 31.0), (37.001, 31.0), 5.0);
        assert!(check.is_jump);
        assert!(check.distance_m > 100.0);
    }

    #[test]
    fn test_poor_accuracy_raises_distance_threshold() {
        let detector = JumpDetector::new(DeviceClass::Standard, 0.01);
        // ~8m displacement; accuracy 60m -> threshold max(5, 20) = 20m.
        let check = detector.detect((37.0, 31.0), (37.00007, 31.0), 60.0);
        assert!(!check.is_jump);
        // Same displacement with tight accuracy trips the 5m floor.
        let check = detector.detect((37.0, 31.0), (37.00007, 31.0), 3.0);
        assert!(check.is_jump);
    }

    #[test]
    fn test_coordinate_delta_alone_flags() {
        let detector = JumpDetector::new(DeviceClass::Standard, 0.0001);
        // Wide accuracy keeps the distance test silent (threshold ~167m),
        // but the longitude delta exceeds the degree threshold: OR fires.
        let check = detector.detect((37.0, 31.0), (37.0, 31.0005), 500.0);
        assert!(check.is_jump);
    }

    #[test]
    fn test_degraded_class_is_more_tolerant() {
        let standard = JumpDetector::new(DeviceClass::Standard, 0.01);
        let degraded = JumpDetector::new(DeviceClass::DegradedAccuracy, 0.01);
        // ~6.7m displacement, accuracy 5m: above the 5m standard floor,
        // below the 8m degraded floor.
        let reference = (37.0, 31.0);
        let candidate = (37.00006, 31.0);
        assert!(standard.detect(reference, candidate, 5.0).is_jump);
        assert!(!degraded.detect(reference, candidate, 5.0).is_jump);
    }
}
