use std::collections::VecDeque;

use crate::geodesy::haversine_distance;

/// Maximum entries kept for motion inference.
const HISTORY_LEN: usize = 5;

/// Plausible time span for a speed estimate. Outside this range the history
/// is too bursty or too stale to classify, and we fail open toward "moving"
/// (more responsive filtering beats over-smoothing a walking user).
const MIN_SPAN_MS: i64 = 100;
const MAX_SPAN_MS: i64 = 60_000;

/// Classifies the subject as moving or stationary from a short history of
/// post-low-pass positions. Used to retune low-pass tau and Kalman process
/// noise per tick.
#[derive(Clone, Debug)]
pub struct MotionClassifier {
    history: VecDeque<(f64, f64, i64)>,
    speed_threshold_mps: f64,
}

impl MotionClassifier {
    pub fn new(speed_threshold_mps: f64) -> Self {
        MotionClassifier {
            history: VecDeque::with_capacity(HISTORY_LEN),
            speed_threshold_mps,
        }
    }

    /// Record one filtered position (timestamp in ms epoch).
    pub fn push(&mut self, latitude: f64, longitude: f64, timestamp: i64) {
        self.history.push_back((latitude, longitude, timestamp));
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
    }

    /// Average speed across the history window against the threshold.
    /// Defaults to "moving" whenever the window is too small or its time
    /// span implausible.
    pub fn is_moving(&self) -> bool {
        if self.history.len() < 3 {
            return true;
        }

        let mut total_distance = 0.0;
        let mut span_ms: i64 = 0;
        for pair in self.history.iter().zip(self.history.iter().skip(1)) {
            let ((lat_a, lng_a, ts_a), (lat_b, lng_b, ts_b)) = pair;
            total_distance += haversine_distance(*lat_a, *lng_a, *lat_b, *lng_b);
            span_ms += (ts_b - ts_a).abs();
        }

        if !(MIN_SPAN_MS..MAX_SPAN_MS).contains(&span_ms) {
            return true;
        }

        let avg_speed = total_distance / (span_ms as f64 / 1000.0);
        avg_speed > self.speed_threshold_mps
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
