/// Scalar Kalman filter for one coordinate axis.
///
/// Constant-position model: predict leaves the estimate unchanged and grows
/// the error covariance by Q, update blends the measurement in proportion to
/// the relative uncertainties. The first measurement initializes the state
/// directly (no filtering on sample one). Q and R are supplied per update so
/// the orchestrator can retune them from motion and accuracy state.
#[derive(Clone, Debug)]
pub struct ScalarKalman {
    estimate: Option<f64>,
    error_covariance: f64,
}

/// Initial covariance after (re)initialization: deliberately high so early
/// measurements dominate the stale prior.
const INITIAL_COVARIANCE: f64 = 1.0;

impl ScalarKalman {
    pub fn new() -> Self {
        ScalarKalman {
            estimate: None,
            error_covariance: INITIAL_COVARIANCE,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.estimate.is_some()
    }

    /// Current estimate, `None` until the first measurement.
    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    /// Run one predict + update cycle and return the new estimate.
    pub fn update(&mut self, measurement: f64, q: f64, r: f64) -> f64 {
        let Some(prior) = self.estimate else {
            self.estimate = Some(measurement);
            self.error_covariance = INITIAL_COVARIANCE;
            return measurement;
        };

        // Predict: estimate unchanged, uncertainty grows.
        let predicted_covariance = self.error_covariance + q.max(0.0);

        // Update: gain weighs prediction uncertainty against measurement
        // noise. r is floored to keep the division meaningful.
        let r = r.max(1e-9);
        let gain = predicted_covariance / (predicted_covariance + r);
        let estimate = prior + gain * (measurement - prior);

        self.estimate = Some(estimate);
        self.error_covariance = (1.0 - gain) * predicted_covariance;
        estimate
    }

    /// Re-seed the filter at `value`, treating what follows as a new
    /// session rather than a correctable outlier.
    pub fn reset_to(&mut self, value: f64) {
        self.estimate = Some(value);
        self.error_covariance = INITIAL_COVARIANCE;
    }

    /// Overwrite the estimate in place (divergence-guard blending) without
    /// touching the covariance.
    pub fn set_estimate(&mut self, value: f64) {
        if self.estimate.is_some() {
            self.estimate = Some(value);
        }
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.error_covariance = INITIAL_COVARIANCE;
    }
}

impl Default for ScalarKalman {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_measurement_initializes_directly() {
        let mut kf = ScalarKalman::new();
        assert!(!kf.is_initialized());
        assert_relative_eq!(kf.update(37.42, 0.01, 0.1), 37.42);
        assert_eq!(kf.estimate(), Some(37.42));
    }

    #[test]
    fn test_monotone_convergence_to_constant_measurement() {
        let mut kf = ScalarKalman::new();
        kf.update(0.0, 0.01, 0.1);

        let target = 1.0;
        let mut prev_error = f64::INFINITY;
        for _ in 0..20 {
            let estimate = kf.update(target, 0.01, 0.1);
            let error = (estimate - target).abs();
            assert!(
                error <= prev_error,
                "error must shrink every step: {error} > {prev_error}"
            );
            prev_error = error;
        }
        assert!(prev_error < 0.01);
    }

    #[test]
    fn test_larger_r_trusts_measurement_less() {
        let mut trusting = ScalarKalman::new();
        let mut wary = ScalarKalman::new();
        trusting.update(0.0, 0.01, 0.1);
        wary.update(0.0, 0.01, 0.1);

        let a = trusting.update(10.0, 0.01, 0.05);
        let b = wary.update(10.0, 0.01, 1.5);
        assert!(a > b, "low R should move further toward the measurement");
    }

    #[test]
    fn test_reset_to_reseeds_state() {
        let mut kf = ScalarKalman::new();
        kf.update(0.0, 0.01, 0.1);
        kf.update(0.0, 0.01, 0.1);
        kf.reset_to(50.0);
        assert_eq!(kf.estimate(), Some(50.0));
        // High covariance after reseed: next measurement dominates.
        let next = kf.update(51.0, 0.01, 0.1);
        assert!(next > 50.8);
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let mut kf = ScalarKalman::new();
        kf.update(5.0, 0.01, 0.1);
        kf.reset();
        assert!(!kf.is_initialized());
        assert_relative_eq!(kf.update(7.0, 0.01, 0.1), 7.0);
    }
}
