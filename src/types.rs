use serde::{Deserialize, Serialize};

/// A raw geolocation fix as delivered by the platform location source.
///
/// `altitude` is `None` when the platform does not report one. `timestamp`
/// is milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    pub timestamp: i64,
}

impl RawSample {
    /// Samples with non-finite coordinates or negative accuracy are dropped
    /// at the pipeline boundary without touching filter state.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
            && self.altitude.map_or(true, |a| a.is_finite())
    }
}

/// One filtered pipeline emission. Recomputed per input sample and never
/// mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilteredPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub timestamp: i64,
    pub is_jump: bool,
    pub is_fallback: bool,
    pub is_rejected: bool,
    /// Trustworthiness of this emission, 0..=100.
    pub confidence: f64,
}

/// Coarse accuracy class of the reporting platform.
///
/// Degraded platforms (poor chipset accuracy, jittery timestamps) get wider
/// median windows, higher jump thresholds and a higher Kalman R band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    #[default]
    Standard,
    DegradedAccuracy,
}

/// Per-pipeline diagnostic counters, reset together with the filters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub total_updates: u64,
    pub jumps_detected: u64,
    pub max_jump_distance_m: f64,
    pub geofence_rejections: u64,
    pub speed_rejections: u64,
    pub accuracy_rejections: u64,
    pub fallback_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_validity() {
        let good = RawSample {
            latitude: 37.0,
            longitude: 31.0,
            accuracy: 5.0,
            altitude: Some(1150.0),
            timestamp: 0,
        };
        assert!(good.is_valid());

        let nan_lat = RawSample {
            latitude: f64::NAN,
            ..good
        };
        assert!(!nan_lat.is_valid());

        let negative_accuracy = RawSample {
            accuracy: -1.0,
            ..good
        };
        assert!(!negative_accuracy.is_valid());

        let no_altitude = RawSample {
            altitude: None,
            ..good
        };
        assert!(no_altitude.is_valid());
    }

    #[test]
    fn test_sample_deserializes_without_altitude() {
        let sample: RawSample = serde_json::from_str(
            r#"{"latitude":37.0,"longitude":31.0,"accuracy":5.0,"timestamp":1000}"#,
        )
        .unwrap();
        assert!(sample.altitude.is_none());
        assert_eq!(sample.timestamp, 1000);
    }
}
