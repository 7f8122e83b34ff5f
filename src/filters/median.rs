use std::collections::VecDeque;

use crate::geodesy::haversine_distance;

/// Hard upper bound on the sliding window, regardless of configuration.
pub const MAX_WINDOW: usize = 9;

/// Samples required before a true median is produced; below this the input
/// passes through unchanged.
const MIN_SAMPLES: usize = 3;

#[derive(Clone, Copy, Debug)]
struct WindowEntry {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    timestamp: i64,
}

/// Fixed-capacity sliding-window median over latitude, longitude and
/// accuracy independently (not a single "most central" sample).
///
/// The effective window width is supplied per call by the orchestrator,
/// which widens it when reported accuracy degrades. A long silence followed
/// by a large displacement purges the window so a stale cluster cannot
/// outvote a genuinely new position.
#[derive(Clone, Debug)]
pub struct MedianFilter {
    window: VecDeque<WindowEntry>,
    stale_gap_secs: f64,
    stale_gap_distance_m: f64,
}

/// One median output. `blended` is set when the divergence guard pulled the
/// result back toward the raw input.
#[derive(Clone, Copy, Debug)]
pub struct MedianOutput {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub blended: bool,
}

impl MedianFilter {
    pub fn new() -> Self {
        MedianFilter {
            window: VecDeque::with_capacity(MAX_WINDOW),
            stale_gap_secs: 30.0,
            stale_gap_distance_m: 50.0,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Insert a sample and return the windowed median position.
    ///
    /// `window_size` is the effective width for this tick, clamped to
    /// `1..=MAX_WINDOW`; shrinking evicts the oldest entries (FIFO).
    pub fn apply(
        &mut self,
        latitude: f64,
        longitude: f64,
        accuracy: f64,
        timestamp: i64,
        window_size: usize,
    ) -> MedianOutput {
        let window_size = window_size.clamp(1, MAX_WINDOW);

        // Long gap plus large displacement means the window describes a
        // previous session, not noise around the current position.
        if let Some(last) = self.window.back() {
            let gap_secs = (timestamp - last.timestamp).abs() as f64 / 1000.0;
            if gap_secs > self.stale_gap_secs {
                let displacement =
                    haversine_distance(last.latitude, last.longitude, latitude, longitude);
                if displacement > self.stale_gap_distance_m {
                    log::debug!(
                        "median window purged: {gap_secs:.0}s gap, {displacement:.0}m displacement"
                    );
                    self.window.clear();
                }
            }
        }

        self.window.push_back(WindowEntry {
            latitude,
            longitude,
            accuracy,
            timestamp,
        });
        while self.window.len() > window_size {
            self.window.pop_front();
        }

        if self.window.len() < MIN_SAMPLES {
            return MedianOutput {
                latitude,
                longitude,
                accuracy,
                blended: false,
            };
        }

        let median_lat = Self::median_of(self.window.iter().map(|e| e.latitude));
        let median_lng = Self::median_of(self.window.iter().map(|e| e.longitude));
        let median_acc = Self::median_of(self.window.iter().map(|e| e.accuracy));

        // Divergence guard: a median far from the live input means the
        // window is anchored somewhere stale, so blend toward the input
        // instead of trusting the median outright.
        let divergence = haversine_distance(latitude, longitude, median_lat, median_lng);
        let limit = (accuracy * 1.5).max(15.0);
        if divergence > limit {
            let normalized = (divergence / (limit * 2.0)).min(1.0);
            let blend = (0.3 + normalized * 0.4).clamp(0.3, 0.7);
            return MedianOutput {
                latitude: blend * latitude + (1.0 - blend) * median_lat,
                longitude: blend * longitude + (1.0 - blend) * median_lng,
                accuracy: median_acc,
                blended: true,
            };
        }

        MedianOutput {
            latitude: median_lat,
            longitude: median_lng,
            accuracy: median_acc,
            blended: false,
        }
    }

    /// Upper median: for even windows this picks the higher of the two
    /// middle values, matching `sorted[len / 2]`.
    fn median_of(values: impl Iterator<Item = f64>) -> f64 {
        let mut sorted: Vec<f64> = values.collect();
        sorted.sort_by(f64::total_cmp);
        sorted[sorted.len() / 2]
    }
}

impl Default for MedianFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn apply_simple(filter: &mut MedianFilter, lat: f64, lng: f64, ts: i64) -> MedianOutput {
        filter.apply(lat, lng, 5.0, ts, 5)
    }

    #[test]
    fn test_passthrough_below_three_samples() {
        let mut filter = MedianFilter::new();
        let out = apply_simple(&mut filter, 37.1, 31.1, 0);
        assert_relative_eq!(out.latitude, 37.1);
        let out = apply_simple(&mut filter, 37.2, 31.2, 1000);
        assert_relative_eq!(out.latitude, 37.2);
        assert_relative_eq!(out.longitude, 31.2);
    }

    #[test]
    fn test_median_suppresses_single_outlier() {
        let mut filter = MedianFilter::new();
        apply_simple(&mut filter, 37.0000, 31.0000, 0);
        apply_simple(&mut filter, 37.0001, 31.0000, 1000);
        // Outlier ~110m north; the median of three picks the middle value.
        let out = apply_simple(&mut filter, 37.0010, 31.0000, 2000);
        assert_relative_eq!(out.latitude, 37.0001, epsilon = 1e-9);
    }

    #[test]
    fn test_output_within_window_bounds_per_axis() {
        let mut filter = MedianFilter::new();
        let samples = [
            (37.0003, 31.0001),
            (37.0001, 31.0004),
            (37.0004, 31.0002),
            (37.0002, 31.0003),
            (37.0005, 31.0000),
        ];
        for (i, (lat, lng)) in samples.iter().enumerate() {
            let out = apply_simple(&mut filter, *lat, *lng, i as i64 * 1000);
            let lats: Vec<f64> = samples[..=i].iter().map(|s| s.0).collect();
            let lngs: Vec<f64> = samples[..=i].iter().map(|s| s.1).collect();
            let fold_min = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
            let fold_max = |v: &[f64]| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(out.latitude >= fold_min(&lats) && out.latitude <= fold_max(&lats));
            assert!(out.longitude >= fold_min(&lngs) && out.longitude <= fold_max(&lngs));
        }
    }

    #[test]
    fn test_window_is_fifo_bounded() {
        let mut filter = MedianFilter::new();
        for i in 0..20 {
            filter.apply(37.0 + i as f64 * 1e-5, 31.0, 5.0, i * 1000, 3);
        }
        assert_eq!(filter.len(), 3);
    }

    #[test]
    fn test_stale_gap_purges_window() {
        let mut filter = MedianFilter::new();
        apply_simple(&mut filter, 37.0000, 31.0000, 0);
        apply_simple(&mut filter, 37.0000, 31.0000, 1000);
        apply_simple(&mut filter, 37.0000, 31.0000, 2000);
        assert_eq!(filter.len(), 3);

        // 60s later and ~550m away: history is from another session.
        let out = apply_simple(&mut filter, 37.0050, 31.0000, 62_000);
        assert_eq!(filter.len(), 1);
        assert_relative_eq!(out.latitude, 37.0050);
    }

    #[test]
    fn test_divergence_guard_blends_toward_input() {
        let mut filter = MedianFilter::new();
        apply_simple(&mut filter, 37.0000, 31.0000, 0);
        apply_simple(&mut filter, 37.0000, 31.0000, 1000);
        apply_simple(&mut filter, 37.0000, 31.0000, 2000);
        // ~550m away within the gap limit: median stays at the cluster,
        // which is far beyond max(acc*1.5, 15m), so the guard blends.
        let out = apply_simple(&mut filter, 37.0050, 31.0000, 3000);
        assert!(out.blended);
        assert!(out.latitude > 37.0000 && out.latitude < 37.0050);
    }

    #[test]
    fn test_zero_window_size_degrades_to_passthrough() {
        let mut filter = MedianFilter::new();
        // Clamped to 1: never enough samples for a median, always passthrough.
        for i in 0..5 {
            let out = filter.apply(37.0 + i as f64 * 1e-4, 31.0, 5.0, i * 1000, 0);
            assert_relative_eq!(out.latitude, 37.0 + i as f64 * 1e-4);
        }
    }
}
