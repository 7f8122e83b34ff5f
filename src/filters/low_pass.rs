/// Single-pole exponential smoother for one coordinate axis.
///
/// `y[n] = y[n-1] + alpha * (x[n] - y[n-1])` with
/// `alpha = 1 - exp(-1 / (tau * sample_frequency))`. The first sample passes
/// through unchanged (cold start). Non-positive tau or frequency degrade to
/// passthrough instead of dividing by zero.
#[derive(Clone, Debug)]
pub struct LowPassFilter {
    tau: f64,
    sample_frequency: f64,
    output: Option<f64>,
}

impl LowPassFilter {
    pub fn new(sample_frequency: f64, tau: f64) -> Self {
        LowPassFilter {
            tau,
            sample_frequency,
            output: None,
        }
    }

    /// Time constant in seconds. Larger tau = heavier smoothing.
    pub fn set_tau(&mut self, tau: f64) {
        self.tau = tau;
    }

    pub fn set_sample_frequency(&mut self, hz: f64) {
        self.sample_frequency = hz;
    }

    fn alpha(&self) -> f64 {
        if self.tau <= 0.0 || self.sample_frequency <= 0.0 {
            return 1.0;
        }
        1.0 - (-1.0 / (self.tau * self.sample_frequency)).exp()
    }

    /// Feed one sample, returning the new filtered output.
    pub fn add_sample(&mut self, value: f64) -> f64 {
        let next = match self.output {
            None => value,
            Some(prev) => prev + self.alpha() * (value - prev),
        };
        self.output = Some(next);
        next
    }

    /// Last filtered output, `None` until the first sample arrives.
    pub fn last_output(&self) -> Option<f64> {
        self.output
    }

    pub fn is_initialized(&self) -> bool {
        self.output.is_some()
    }

    pub fn reset(&mut self) {
        self.output = None;
    }
}
