// pipeline.rs — Pure computation core of the positioning overlay.
//
// Everything in this module is independent of the platform geolocation
// source and the map UI. Raw samples go in one at a time, filtered
// positions come out, so the whole cascade can be unit-tested and replayed
// from recorded logs without a device.

use crate::filters::{LowPassFilter, MedianFilter, ScalarKalman, MAX_WINDOW};
use crate::geodesy::haversine_distance;
use crate::geofence::Geofence;
use crate::jump::JumpDetector;
use crate::motion::MotionClassifier;
use crate::reliability::{Evaluation, ReliabilityManager};
use crate::types::{DeviceClass, FilteredPosition, FilterStats, RawSample};

/// Gap after which a large displacement is a new session, not an outlier:
/// the Kalman state is reseeded instead of dragging a stale estimate.
const SESSION_GAP_SECS: f64 = 30.0;
const SESSION_GAP_DISTANCE_M: f64 = 50.0;

/// Reported accuracy above this is "poor": wider median window, heavier
/// low-pass smoothing.
const POOR_ACCURACY_M: f64 = 20.0;

/// Tuning for one deployment. Buildings and device fleets differ only by
/// the values here, never by code forks.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    // ── Platform ──
    pub device_class: DeviceClass,

    // ── Low-pass filter ──
    pub enable_low_pass: bool,
    pub low_pass_tau_secs: f64,

    // ── Median filter ──
    pub median_window_size: usize,

    // ── Kalman filter ──
    pub kalman_process_noise: f64,
    /// Base measurement noise; the adaptive policy scales around it
    /// ([base/2, base*5] standard, [base, base*8] degraded).
    pub kalman_measurement_noise: f64,

    // ── Jump detection ──
    pub jump_coord_threshold_deg: f64,

    // ── Rejection gates ──
    pub max_accuracy_m: f64,
    pub max_speed_mps: f64,
    pub max_consecutive_rejections: u32,
    pub last_good_timeout_secs: f64,
    /// Strict mode disables fallback: rejections emit nothing.
    pub strict_mode: bool,

    // ── Motion classification ──
    pub moving_speed_threshold_mps: f64,
    pub stationary_jitter_radius_m: f64,

    // ── Geofence ──
    pub geofence: Option<Geofence>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::Standard,
            enable_low_pass: true,
            low_pass_tau_secs: 1.0,
            median_window_size: 5,
            kalman_process_noise: 0.01,
            kalman_measurement_noise: 0.1,
            jump_coord_threshold_deg: 0.0001,
            max_accuracy_m: 100.0,
            max_speed_mps: 10.0,
            max_consecutive_rejections: 5,
            last_good_timeout_secs: 30.0,
            strict_mode: false,
            moving_speed_threshold_mps: 0.5,
            stationary_jitter_radius_m: 2.0,
            geofence: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults tuned for a device class. Degraded platforms jitter around
    /// 0.3-2 m/s even when stationary, so the motion threshold rises.
    pub fn for_device(device_class: DeviceClass) -> Self {
        let moving_speed_threshold_mps = match device_class {
            DeviceClass::Standard => 0.5,
            DeviceClass::DegradedAccuracy => 0.8,
        };
        Self {
            device_class,
            moving_speed_threshold_mps,
            ..Self::default()
        }
    }
}

/// The position filtering pipeline: geofence/accuracy/speed gates, then
/// low-pass → median → jump detection → Kalman, with last-good fallback.
///
/// One instance owns the complete mutable state for one tracked subject and
/// processes each sample to completion before the next; tracking multiple
/// subjects means one pipeline each.
pub struct PositionPipeline {
    config: PipelineConfig,

    low_pass_lat: LowPassFilter,
    low_pass_lng: LowPassFilter,
    last_low_pass_ts: Option<i64>,

    median: MedianFilter,
    kalman_lat: ScalarKalman,
    kalman_lng: ScalarKalman,
    motion: MotionClassifier,
    jump_detector: JumpDetector,
    reliability: ReliabilityManager,

    stats: FilterStats,
    last_emitted: Option<FilteredPosition>,
}

impl PositionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let reliability = ReliabilityManager::new(
            config.max_accuracy_m,
            config.max_speed_mps,
            config.max_consecutive_rejections,
            config.last_good_timeout_secs,
            config.strict_mode,
        );
        let jump_detector =
            JumpDetector::new(config.device_class, config.jump_coord_threshold_deg);
        let motion = MotionClassifier::new(config.moving_speed_threshold_mps);

        PositionPipeline {
            low_pass_lat: LowPassFilter::new(1.0, config.low_pass_tau_secs),
            low_pass_lng: LowPassFilter::new(1.0, config.low_pass_tau_secs),
            last_low_pass_ts: None,
            median: MedianFilter::new(),
            kalman_lat: ScalarKalman::new(),
            kalman_lng: ScalarKalman::new(),
            motion,
            jump_detector,
            reliability,
            stats: FilterStats::default(),
            last_emitted: None,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Most recently held position: the last accepted or fallback emission.
    /// Rejected ticks re-emit these coordinates to the caller but do not
    /// replace the held position, whose timestamp keeps marking the last
    /// time the pipeline actually placed the subject (session-gap detection
    /// and stationary suppression measure against it).
    pub fn last_position(&self) -> Option<&FilteredPosition> {
        self.last_emitted.as_ref()
    }

    /// Replace the geofence at runtime (the operator redrew the area). A
    /// held last-good location outside the new fence is invalidated so an
    /// impossible position is never carried forward.
    pub fn set_geofence(&mut self, geofence: Option<Geofence>) {
        if let Some(fence) = &geofence {
            self.reliability.invalidate_if_outside(fence);
        }
        self.config.geofence = geofence;
    }

    /// Process one raw sample, returning the emission for this tick.
    ///
    /// `None` means nothing should reach the UI: the sample was malformed,
    /// or it was rejected in strict mode, or it was rejected before any
    /// position had ever been emitted.
    pub fn process(&mut self, sample: &RawSample) -> Option<FilteredPosition> {
        if !sample.is_valid() {
            log::warn!("dropping malformed sample: {sample:?}");
            return None;
        }

        self.stats.total_updates += 1;

        match self
            .reliability
            .evaluate(sample, self.config.geofence.as_ref(), &mut self.stats)
        {
            Evaluation::Accept => {
                let emitted = self.run_filters(sample);
                self.last_emitted = Some(emitted.clone());
                Some(emitted)
            }
            Evaluation::Fallback { position } => {
                let confidence = self
                    .reliability
                    .fallback_confidence(&position, sample.timestamp);
                let emitted = FilteredPosition {
                    latitude: position.latitude,
                    longitude: position.longitude,
                    accuracy: position.accuracy,
                    altitude: self.last_emitted.as_ref().and_then(|p| p.altitude),
                    timestamp: sample.timestamp,
                    is_jump: false,
                    is_fallback: true,
                    is_rejected: false,
                    confidence,
                };
                self.last_emitted = Some(emitted.clone());
                Some(emitted)
            }
            Evaluation::Reject { signal_lost, .. } => {
                if self.config.strict_mode {
                    return None;
                }
                // Surface the rejection without moving the marker: repeat
                // the previous coordinates flagged as rejected.
                let prev = self.last_emitted.as_ref()?;
                let confidence = if signal_lost {
                    0.0
                } else {
                    self.reliability.confidence_score(sample.accuracy, false)
                };
                Some(FilteredPosition {
                    latitude: prev.latitude,
                    longitude: prev.longitude,
                    accuracy: prev.accuracy,
                    altitude: prev.altitude,
                    timestamp: sample.timestamp,
                    is_jump: false,
                    is_fallback: false,
                    is_rejected: true,
                    confidence,
                })
            }
        }
    }

    /// Stop tracking: deterministically clear every piece of filter state
    /// so a restarted session sees a cold pipeline.
    pub fn reset(&mut self) {
        self.low_pass_lat.reset();
        self.low_pass_lng.reset();
        self.last_low_pass_ts = None;
        self.median.clear();
        self.kalman_lat.reset();
        self.kalman_lng.reset();
        self.motion.clear();
        self.reliability.reset();
        self.stats = FilterStats::default();
        self.last_emitted = None;
        log::debug!("pipeline reset");
    }

    fn run_filters(&mut self, sample: &RawSample) -> FilteredPosition {
        let (lp_lat, lp_lng) = if self.config.enable_low_pass {
            self.apply_low_pass(sample)
        } else {
            (sample.latitude, sample.longitude)
        };

        // Motion history tracks low-pass output, not raw jitter.
        self.motion.push(lp_lat, lp_lng, sample.timestamp);
        let moving = self.motion.is_moving();

        let window = self.adaptive_window_size(sample.accuracy);
        let median = self.median.apply(
            lp_lat,
            lp_lng,
            sample.accuracy,
            sample.timestamp,
            window,
        );

        let check = self.jump_detector.detect(
            (lp_lat, lp_lng),
            (median.latitude, median.longitude),
            sample.accuracy,
        );
        if check.is_jump {
            self.stats.jumps_detected += 1;
            log::debug!("jump detected: {:.1}m", check.distance_m);
        }
        if check.distance_m > self.stats.max_jump_distance_m {
            self.stats.max_jump_distance_m = check.distance_m;
        }

        let (k_lat, k_lng) = self.apply_kalman(
            sample,
            (lp_lat, lp_lng),
            (median.latitude, median.longitude),
            check.is_jump,
            moving,
        );

        // Stationary jitter suppression: while standing still, sub-radius
        // movement of the estimate is noise and the marker holds.
        let (out_lat, out_lng) = match (&self.last_emitted, moving) {
            (Some(prev), false)
                if haversine_distance(prev.latitude, prev.longitude, k_lat, k_lng)
                    < self.config.stationary_jitter_radius_m =>
            {
                (prev.latitude, prev.longitude)
            }
            _ => (k_lat, k_lng),
        };

        FilteredPosition {
            latitude: out_lat,
            longitude: out_lng,
            accuracy: sample.accuracy,
            altitude: sample.altitude,
            timestamp: sample.timestamp,
            is_jump: check.is_jump,
            is_fallback: false,
            is_rejected: false,
            confidence: self.reliability.confidence_score(sample.accuracy, false),
        }
    }

    fn apply_low_pass(&mut self, sample: &RawSample) -> (f64, f64) {
        if !self.low_pass_lat.is_initialized() {
            self.low_pass_lat.add_sample(sample.latitude);
            self.low_pass_lng.add_sample(sample.longitude);
            self.last_low_pass_ts = Some(sample.timestamp);
            return (sample.latitude, sample.longitude);
        }

        // Recompute the sample rate from the timestamp delta; implausible
        // deltas (paused stream, clock skips) fall back to 1 Hz.
        let dt_secs = self
            .last_low_pass_ts
            .map(|prev_ts| (sample.timestamp - prev_ts).abs() as f64 / 1000.0)
            .unwrap_or(1.0);
        let frequency = if dt_secs > 0.1 && dt_secs < 60.0 {
            1.0 / dt_secs
        } else {
            1.0
        };
        self.low_pass_lat.set_sample_frequency(frequency);
        self.low_pass_lng.set_sample_frequency(frequency);
        self.last_low_pass_ts = Some(sample.timestamp);

        let tau = self.adaptive_tau(sample.accuracy, dt_secs);
        self.low_pass_lat.set_tau(tau);
        self.low_pass_lng.set_tau(tau);

        let filtered_lat = self.low_pass_lat.add_sample(sample.latitude);
        let filtered_lng = self.low_pass_lng.add_sample(sample.longitude);

        // Divergence guard: a filter anchored far from the live fix gets
        // blended back toward it. Output only, state keeps its smoothing.
        let divergence = haversine_distance(
            sample.latitude,
            sample.longitude,
            filtered_lat,
            filtered_lng,
        );
        let limit = (sample.accuracy * 1.5).max(15.0);
        if divergence > limit {
            let normalized = (divergence / (limit * 2.0)).min(1.0);
            let blend = (0.3 + normalized * 0.5).clamp(0.3, 0.8);
            log::debug!("low-pass divergence {divergence:.0}m, blending at {blend:.2}");
            return (
                blend * sample.latitude + (1.0 - blend) * filtered_lat,
                blend * sample.longitude + (1.0 - blend) * filtered_lng,
            );
        }

        (filtered_lat, filtered_lng)
    }

    /// Low-pass time constant for this tick: respond fast while moving or
    /// after a long stream pause, smooth hard while parked or when accuracy
    /// degrades.
    fn adaptive_tau(&self, accuracy: f64, dt_secs: f64) -> f64 {
        let mut tau = self.config.low_pass_tau_secs;
        if self.motion.is_moving() {
            tau = (tau / 2.0).max(0.3);
        } else {
            tau = (tau * 1.5).min(2.0);
        }
        if accuracy > POOR_ACCURACY_M {
            tau = (tau * 1.5).min(3.0);
        }
        if dt_secs > 10.0 {
            tau = (tau / 2.0).max(0.2);
        }
        tau
    }

    /// Median window width for this tick: widen when accuracy is poor, and
    /// again on degraded platforms; narrow when fixes are tight.
    fn adaptive_window_size(&self, accuracy: f64) -> usize {
        let base = self.config.median_window_size.max(1);
        let poor = accuracy > POOR_ACCURACY_M;
        match (self.config.device_class, poor) {
            (DeviceClass::DegradedAccuracy, true) => (base * 3 / 2).min(MAX_WINDOW),
            (DeviceClass::DegradedAccuracy, false) => (base + 2).min(7),
            (DeviceClass::Standard, true) => base,
            (DeviceClass::Standard, false) => (base * 3 / 5).max(3),
        }
    }

    fn apply_kalman(
        &mut self,
        sample: &RawSample,
        low_pass: (f64, f64),
        median: (f64, f64),
        is_jump: bool,
        moving: bool,
    ) -> (f64, f64) {
        // A long silence plus a large displacement is a new session; reseed
        // rather than filtering a teleport as if it were noise.
        if self.kalman_lat.is_initialized() {
            if let Some(prev) = &self.last_emitted {
                let gap_secs = (sample.timestamp - prev.timestamp).abs() as f64 / 1000.0;
                if gap_secs > SESSION_GAP_SECS {
                    let displacement = haversine_distance(
                        prev.latitude,
                        prev.longitude,
                        sample.latitude,
                        sample.longitude,
                    );
                    if displacement > SESSION_GAP_DISTANCE_M {
                        log::debug!(
                            "kalman reseed after {gap_secs:.0}s gap, {displacement:.0}m away"
                        );
                        self.kalman_lat.reset_to(sample.latitude);
                        self.kalman_lng.reset_to(sample.longitude);
                        return (sample.latitude, sample.longitude);
                    }
                }
            }
        }

        let q = if moving {
            self.config.kalman_process_noise * 2.0
        } else {
            self.config.kalman_process_noise / 2.0
        };

        // Jump ticks feed the noise-suppressed median and distrust the
        // measurement; clean ticks feed the low-pass output with R scaled
        // from reported accuracy.
        let base_r = self.config.kalman_measurement_noise;
        let ((input_lat, input_lng), r) = if is_jump {
            let r = match self.config.device_class {
                DeviceClass::Standard => 1.0,
                DeviceClass::DegradedAccuracy => 1.5,
            };
            (median, r)
        } else {
            let r = match self.config.device_class {
                DeviceClass::Standard => {
                    (sample.accuracy / 20.0).clamp(base_r * 0.5, base_r * 5.0)
                }
                DeviceClass::DegradedAccuracy => {
                    (sample.accuracy / 15.0).clamp(base_r, base_r * 8.0)
                }
            };
            (low_pass, r)
        };

        let mut estimate_lat = self.kalman_lat.update(input_lat, q, r);
        let mut estimate_lng = self.kalman_lng.update(input_lng, q, r);

        // Divergence guard, written back into the state so the filter does
        // not stay anchored away from its input. Never runs on jump ticks:
        // the input is then a still-outlier-contaminated median with R
        // already widened, and blending toward it would pull the estimate
        // straight back to the displacement the jump path is suppressing.
        if !is_jump {
            let divergence =
                haversine_distance(input_lat, input_lng, estimate_lat, estimate_lng);
            let limit = (sample.accuracy * 2.0).max(20.0);
            if divergence > limit {
                let normalized = (divergence / (limit * 2.0)).min(1.0);
                let blend = (0.5 + normalized * 0.35).clamp(0.5, 0.85);
                log::debug!("kalman divergence {divergence:.0}m, blending at {blend:.2}");
                estimate_lat = blend * input_lat + (1.0 - blend) * estimate_lat;
                estimate_lng = blend * input_lng + (1.0 - blend) * estimate_lng;
                self.kalman_lat.set_estimate(estimate_lat);
                self.kalman_lng.set_estimate(estimate_lng);
            }
        }

        (estimate_lat, estimate_lng)
    }
}
