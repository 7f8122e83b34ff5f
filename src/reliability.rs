use crate::geodesy::haversine_distance;
use crate::geofence::Geofence;
use crate::types::{FilterStats, RawSample};

/// Displacement floor for the speed gate: below this the implied speed is
/// dominated by jitter over tiny time deltas and is not trustworthy.
const MIN_SPEED_DISPLACEMENT_M: f64 = 5.0;

/// The most recent sample that passed every validation gate.
#[derive(Clone, Copy, Debug)]
pub struct LastGoodLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: i64,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectionCause {
    Accuracy,
    Geofence,
    Speed,
}

/// Verdict for one raw sample.
#[derive(Clone, Debug)]
pub enum Evaluation {
    /// Passed all gates; the sample proceeds into the filter cascade.
    Accept,
    /// Rejected. `signal_lost` marks the persistent case (rejection streak
    /// over the limit or an expired last-good) where no trustworthy
    /// estimate remains.
    Reject {
        cause: RejectionCause,
        signal_lost: bool,
    },
    /// Rejected, but liveness forces an emission from the last-good
    /// location instead of withholding updates indefinitely.
    Fallback { position: LastGoodLocation },
}

/// Accuracy/speed/geofence gating with last-known-good fallback.
///
/// Gates short-circuit in a fixed order: accuracy, geofence, speed. Each
/// rejection bumps a per-cause counter and the consecutive-bad streak; once
/// the streak exceeds its limit (or the last-good location has expired) the
/// manager stops withholding and either forces a fallback emission (lenient
/// mode) or surfaces the loss as-is (strict mode). Expiry is checked lazily
/// against the incoming sample's timestamp; there is no background timer.
#[derive(Clone, Debug)]
pub struct ReliabilityManager {
    max_accuracy_m: f64,
    max_speed_mps: f64,
    max_consecutive_rejections: u32,
    last_good_timeout_secs: f64,
    strict_mode: bool,

    last_good: Option<LastGoodLocation>,
    consecutive_bad: u32,
}

impl ReliabilityManager {
    pub fn new(
        max_accuracy_m: f64,
        max_speed_mps: f64,
        max_consecutive_rejections: u32,
        last_good_timeout_secs: f64,
        strict_mode: bool,
    ) -> Self {
        ReliabilityManager {
            max_accuracy_m,
            max_speed_mps,
            max_consecutive_rejections,
            last_good_timeout_secs,
            strict_mode,
            last_good: None,
            consecutive_bad: 0,
        }
    }

    pub fn last_good(&self) -> Option<&LastGoodLocation> {
        self.last_good.as_ref()
    }

    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    /// Run the gates for one sample. On acceptance the sample becomes the
    /// new last-good location and the bad streak resets.
    pub fn evaluate(
        &mut self,
        sample: &RawSample,
        geofence: Option<&Geofence>,
        stats: &mut FilterStats,
    ) -> Evaluation {
        if sample.accuracy > self.max_accuracy_m {
            stats.accuracy_rejections += 1;
            log::debug!(
                "accuracy rejection: {:.1}m > {:.1}m",
                sample.accuracy,
                self.max_accuracy_m
            );
            return self.rejected(RejectionCause::Accuracy, sample.timestamp, stats);
        }

        if let Some(fence) = geofence {
            if !fence.contains(sample.latitude, sample.longitude) {
                stats.geofence_rejections += 1;
                log::debug!(
                    "geofence rejection at ({:.6}, {:.6})",
                    sample.latitude,
                    sample.longitude
                );
                return self.rejected(RejectionCause::Geofence, sample.timestamp, stats);
            }
        }

        if let Some(last) = self.last_good {
            let displacement = haversine_distance(
                last.latitude,
                last.longitude,
                sample.latitude,
                sample.longitude,
            );
            let elapsed_secs = (sample.timestamp - last.timestamp) as f64 / 1000.0;
            if elapsed_secs > 0.0 && displacement > MIN_SPEED_DISPLACEMENT_M {
                let speed = displacement / elapsed_secs;
                if speed > self.max_speed_mps {
                    stats.speed_rejections += 1;
                    log::debug!(
                        "speed rejection: {speed:.1} m/s > {:.1} m/s",
                        self.max_speed_mps
                    );
                    return self.rejected(RejectionCause::Speed, sample.timestamp, stats);
                }
            }
        }

        self.consecutive_bad = 0;
        self.last_good = Some(LastGoodLocation {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            timestamp: sample.timestamp,
            confidence: self.confidence_score(sample.accuracy, false),
        });
        Evaluation::Accept
    }

    fn rejected(
        &mut self,
        cause: RejectionCause,
        now_ms: i64,
        stats: &mut FilterStats,
    ) -> Evaluation {
        self.consecutive_bad += 1;

        let expired = self
            .last_good
            .map(|last| self.age_secs(&last, now_ms) > self.last_good_timeout_secs)
            .unwrap_or(true);
        let forced = self.consecutive_bad > self.max_consecutive_rejections || expired;

        if forced && !self.strict_mode {
            if let (Some(last), false) = (self.last_good, expired) {
                stats.fallback_used += 1;
                log::debug!(
                    "forcing fallback after {} consecutive rejections",
                    self.consecutive_bad
                );
                return Evaluation::Fallback { position: last };
            }
            // Nothing trustworthy left to fall back on: area/signal lost.
            return Evaluation::Reject {
                cause,
                signal_lost: true,
            };
        }

        Evaluation::Reject {
            cause,
            signal_lost: forced,
        }
    }

    fn age_secs(&self, last: &LastGoodLocation, now_ms: i64) -> f64 {
        (now_ms - last.timestamp).max(0) as f64 / 1000.0
    }

    /// Trustworthiness in [0, 100]: decreasing in reported accuracy, the
    /// consecutive-bad streak and fallback use.
    pub fn confidence_score(&self, accuracy: f64, is_fallback: bool) -> f64 {
        let max_accuracy = self.max_accuracy_m.max(1.0);
        let accuracy_term = 100.0 * (1.0 - (accuracy / max_accuracy).clamp(0.0, 1.0));
        let streak_term = 1.0 / (1.0 + 0.5 * self.consecutive_bad as f64);
        let fallback_term = if is_fallback { 0.5 } else { 1.0 };
        (accuracy_term * streak_term * fallback_term).clamp(0.0, 100.0)
    }

    /// Confidence for a forced fallback emission, decayed toward zero as
    /// the last-good location ages toward its timeout.
    pub fn fallback_confidence(&self, position: &LastGoodLocation, now_ms: i64) -> f64 {
        let timeout = self.last_good_timeout_secs.max(1e-9);
        let age_factor = (1.0 - self.age_secs(position, now_ms) / timeout).clamp(0.0, 1.0);
        self.confidence_score(position.accuracy, true) * age_factor
    }

    /// Applied when the operator redraws the geofence: a held position that
    /// is now outside the area must not be carried forward.
    pub fn invalidate_if_outside(&mut self, fence: &Geofence) {
        if let Some(last) = self.last_good {
            if !fence.contains(last.latitude, last.longitude) {
                log::debug!("last-good location outside redrawn geofence, invalidated");
                self.last_good = None;
                self.consecutive_bad = 0;
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_good = None;
        self.consecutive_bad = 0;
    }
}
