//! Bounded per-node sample history

use crate::clock::duration_ms;
use crate::config::WindowSettings;
use crate::models::Sample;
use std::collections::VecDeque;

/// Samples of one node, bounded by count and by age relative to the newest
/// sample. Timestamps are non-decreasing; the caller rejects older samples.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    max_samples: usize,
    max_age_ms: i64,
}

impl SampleWindow {
    pub fn new(settings: &WindowSettings) -> Self {
        Self {
            samples: VecDeque::with_capacity(settings.max_samples.min(1_024)),
            max_samples: settings.max_samples.max(1),
            max_age_ms: duration_ms(settings.max_age()),
        }
    }

    /// Append a sample, evicting the oldest entries on overflow and any that
    /// fell out of the age window
    pub fn push(&mut self, sample: Sample) {
        while self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.expire_old_samples(sample.timestamp);
    }

    fn expire_old_samples(&mut self, newest: i64) {
        let cutoff = newest.saturating_sub(self.max_age_ms);
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of a derived value over the window; None when empty
    pub fn mean_of(&self, f: impl Fn(&Sample) -> f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(f).sum();
        Some(sum / self.samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(timestamp: i64, cpu_load: f64) -> Sample {
        Sample {
            timestamp,
            cpu_load,
            memory_used: 1.0,
            memory_total: 2.0,
            network_latency_ms: 0.0,
            network_throughput: 0.0,
            heartbeat_success_rate: 1.0,
        }
    }

    fn settings(max_samples: usize, max_age_secs: u64) -> WindowSettings {
        WindowSettings {
            max_samples,
            max_age_secs,
        }
    }

    #[test]
    fn test_count_bound_evicts_oldest() {
        let mut window = SampleWindow::new(&settings(3, 3_600));
        for i in 0..5 {
            window.push(sample_at(i * 1_000, i as f64));
        }
        assert_eq!(window.len(), 3);
        let loads: Vec<f64> = window.iter().map(|s| s.cpu_load).collect();
        assert_eq!(loads, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_age_bound_expires_old_samples() {
        let mut window = SampleWindow::new(&settings(100, 60));
        window.push(sample_at(0, 1.0));
        window.push(sample_at(30_000, 1.0));
        window.push(sample_at(90_000, 1.0));
        // cutoff = 30s; the sample at 0 is gone, 30s is kept
        assert_eq!(window.len(), 2);
        assert_eq!(window.iter().next().map(|s| s.timestamp), Some(30_000));
    }

    #[test]
    fn test_mean_of() {
        let mut window = SampleWindow::new(&settings(10, 3_600));
        assert!(window.mean_of(|s| s.cpu_load).is_none());
        window.push(sample_at(0, 1.0));
        window.push(sample_at(1, 3.0));
        assert_eq!(window.mean_of(|s| s.cpu_load), Some(2.0));
        assert_eq!(window.latest().map(|s| s.cpu_load), Some(3.0));
    }
}
