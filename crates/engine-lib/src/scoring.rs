//! Score calculation
//!
//! Turns a node's sample window into a [`ScoreVector`]. Each dimension is the
//! remaining headroom against a configured baseline, averaged over the
//! window; the overall score is the fixed weighted sum of the dimensions.

use crate::config::{ScoreWeights, ScoringSettings};
use crate::ingest::SampleWindow;
use crate::models::{ResourceUsage, Sample, ScoreVector};

/// Upper bound reported for usage percentages. Finite loads far beyond
/// capacity would otherwise overflow to infinity, which JSON cannot carry.
pub const USAGE_PERCENT_CEILING: f64 = 1_000_000.0;

/// Pure, deterministic scorer: the same window always yields the same vector
#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    settings: ScoringSettings,
}

impl ScoreCalculator {
    pub fn new(settings: ScoringSettings) -> Self {
        Self { settings }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.settings.weights
    }

    /// Compute the score vector for a window. An empty window scores as a
    /// node with full headroom.
    pub fn compute(&self, window: &SampleWindow) -> ScoreVector {
        if window.is_empty() {
            return self.combine(1.0, 1.0, 1.0, 1.0);
        }

        let s = &self.settings;
        let mean = |f: fn(&Sample) -> f64| window.mean_of(f).unwrap_or(0.0);

        let cpu_score = headroom(mean(|x| x.cpu_load) / s.cpu_capacity);
        let memory_score = headroom(mean(Sample::memory_ratio));
        let latency_score = headroom(mean(|x| x.network_latency_ms) / s.network_latency_ceiling_ms);
        let throughput_score =
            headroom(mean(|x| x.network_throughput) / s.network_throughput_capacity);
        let network_score = clamp_unit(
            s.latency_share * latency_score + (1.0 - s.latency_share) * throughput_score,
        );
        let availability_score = clamp_unit(mean(|x| x.heartbeat_success_rate));

        self.combine(cpu_score, memory_score, network_score, availability_score)
    }

    /// Weighted overall score of the four dimensions, clamped to [0, 1]
    pub fn overall(&self, dimensions: [f64; 4]) -> f64 {
        let weighted: f64 = self
            .settings
            .weights
            .as_array()
            .iter()
            .zip(dimensions.iter())
            .map(|(w, d)| w * d)
            .sum();
        clamp_unit(weighted)
    }

    fn combine(&self, cpu: f64, memory: f64, network: f64, availability: f64) -> ScoreVector {
        ScoreVector {
            cpu_score: cpu,
            memory_score: memory,
            network_score: network,
            availability_score: availability,
            overall_score: self.overall([cpu, memory, network, availability]),
        }
    }

    /// Unnormalized usage of a single sample, for container-oriented views
    pub fn usage(&self, sample: &Sample) -> ResourceUsage {
        ResourceUsage {
            cpu_percent: saturate_percent(sample.cpu_load / self.settings.cpu_capacity * 100.0),
            memory_percent: saturate_percent(sample.memory_ratio() * 100.0),
        }
    }
}

/// `1 - clamp(ratio, 0, 1)`; NaN counts as fully used
fn headroom(ratio: f64) -> f64 {
    if ratio.is_nan() {
        return 0.0;
    }
    1.0 - ratio.clamp(0.0, 1.0)
}

fn saturate_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, USAGE_PERCENT_CEILING)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowSettings;
    use proptest::prelude::*;

    fn window_of(samples: &[Sample]) -> SampleWindow {
        let mut window = SampleWindow::new(&WindowSettings {
            max_samples: 100,
            max_age_secs: 3_600,
        });
        for s in samples {
            window.push(*s);
        }
        window
    }

    fn sample(ts: i64, cpu: f64, mem_used: f64, latency: f64, throughput: f64, hb: f64) -> Sample {
        Sample {
            timestamp: ts,
            cpu_load: cpu,
            memory_used: mem_used,
            memory_total: 100.0,
            network_latency_ms: latency,
            network_throughput: throughput,
            heartbeat_success_rate: hb,
        }
    }

    fn calculator() -> ScoreCalculator {
        ScoreCalculator::new(ScoringSettings {
            cpu_capacity: 4.0,
            network_latency_ceiling_ms: 100.0,
            network_throughput_capacity: 1_000.0,
            latency_share: 0.5,
            weights: ScoreWeights::default(),
        })
    }

    #[test]
    fn test_dimension_scores() {
        let calc = calculator();
        let scores = calc.compute(&window_of(&[sample(0, 1.0, 25.0, 50.0, 500.0, 0.9)]));

        assert!((scores.cpu_score - 0.75).abs() < 1e-9);
        assert!((scores.memory_score - 0.75).abs() < 1e-9);
        assert!((scores.network_score - 0.5).abs() < 1e-9);
        assert!((scores.availability_score - 0.9).abs() < 1e-9);

        let expected = 0.3 * 0.75 + 0.3 * 0.75 + 0.2 * 0.5 + 0.2 * 0.9;
        assert!((scores.overall_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_window_mean_is_used() {
        let calc = calculator();
        let scores = calc.compute(&window_of(&[
            sample(0, 0.0, 0.0, 0.0, 0.0, 1.0),
            sample(1, 4.0, 0.0, 0.0, 0.0, 0.0),
        ]));
        assert!((scores.cpu_score - 0.5).abs() < 1e-9);
        assert!((scores.availability_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overload_clamps_to_zero() {
        let calc = calculator();
        let scores = calc.compute(&window_of(&[sample(0, 16.0, 100.0, 10_000.0, 1e9, 0.0)]));
        assert_eq!(scores.cpu_score, 0.0);
        assert_eq!(scores.memory_score, 0.0);
        assert_eq!(scores.network_score, 0.0);
        assert_eq!(scores.overall_score, 0.0);
    }

    #[test]
    fn test_empty_window_has_full_headroom() {
        let calc = calculator();
        let scores = calc.compute(&window_of(&[]));
        assert_eq!(scores.dimensions(), ScoreVector::initial().dimensions());
        assert!((scores.overall_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_percentages() {
        let calc = calculator();
        let usage = calc.usage(&sample(0, 2.0, 40.0, 0.0, 0.0, 1.0));
        assert!((usage.cpu_percent - 50.0).abs() < 1e-9);
        assert!((usage.memory_percent - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_usage_saturates_for_huge_loads() {
        let calc = calculator();
        let usage = calc.usage(&sample(0, 1e307, 40.0, 0.0, 0.0, 1.0));
        assert_eq!(usage.cpu_percent, USAGE_PERCENT_CEILING);
        assert!((usage.memory_percent - 40.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_scores_stay_in_unit_interval(
            cpu in 0.0f64..1e6,
            mem_frac in 0.0f64..=1.0,
            latency in 0.0f64..1e7,
            throughput in 0.0f64..1e12,
            hb in 0.0f64..=1.0,
        ) {
            let calc = calculator();
            let scores = calc.compute(&window_of(&[sample(0, cpu, mem_frac * 100.0, latency, throughput, hb)]));
            for value in scores.dimensions().iter().chain(std::iter::once(&scores.overall_score)) {
                prop_assert!((0.0..=1.0).contains(value));
            }
            prop_assert!((scores.overall_score - calc.overall(scores.dimensions())).abs() < 1e-12);
        }

        #[test]
        fn prop_compute_is_deterministic(cpu in 0.0f64..8.0, hb in 0.0f64..=1.0) {
            let calc = calculator();
            let window = window_of(&[sample(0, cpu, 10.0, 5.0, 5.0, hb), sample(1, cpu / 2.0, 20.0, 1.0, 1.0, hb)]);
            prop_assert_eq!(calc.compute(&window), calc.compute(&window));
        }
    }
}
