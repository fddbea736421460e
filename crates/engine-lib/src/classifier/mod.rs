//! Utilization classification
//!
//! A per-node state machine over {INIT, LU, MU, HU, SUNDOWN}:
//! - INIT classifies the first score directly and is never re-entered
//! - LU, MU and HU move with the overall score, using separate enter and
//!   exit thresholds around each boundary so a score hovering near a
//!   threshold does not flap between neighbours
//! - SUNDOWN is entered only through [`Classifier::decommission`] and has no
//!   outgoing transitions
//!
//! Scores measure headroom, so an idle node (score 1.0) classifies as HU.

mod audit;

pub use audit::TransitionLog;

use crate::config::ClassifierSettings;
use crate::models::{NodeId, Transition, UtilizationCategory};

/// Hysteresis classifier shared by all nodes; holds no per-node state
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Next category for a node currently in `current` with the given score
    pub fn next(&self, current: UtilizationCategory, score: f64) -> UtilizationCategory {
        use UtilizationCategory::*;

        let ClassifierSettings {
            low_threshold: low,
            high_threshold: high,
            low_margin,
            high_margin,
        } = self.settings;

        match current {
            Sundown => Sundown,
            Init => self.band(score),
            Lu => {
                if score >= low + low_margin {
                    if score >= high {
                        Hu
                    } else {
                        Mu
                    }
                } else {
                    Lu
                }
            }
            Mu => {
                if score >= high {
                    Hu
                } else if score < low {
                    Lu
                } else {
                    Mu
                }
            }
            Hu => {
                if score < high - high_margin {
                    if score < low {
                        Lu
                    } else {
                        Mu
                    }
                } else {
                    Hu
                }
            }
        }
    }

    /// Plain band of a score, without hysteresis
    pub fn band(&self, score: f64) -> UtilizationCategory {
        if score < self.settings.low_threshold {
            UtilizationCategory::Lu
        } else if score < self.settings.high_threshold {
            UtilizationCategory::Mu
        } else {
            UtilizationCategory::Hu
        }
    }

    /// Apply a score to a node, returning the transition if the category
    /// changed
    pub fn classify(
        &self,
        node_id: &NodeId,
        current: UtilizationCategory,
        score: f64,
        timestamp: i64,
    ) -> Option<Transition> {
        let next = self.next(current, score);
        (next != current).then(|| Transition {
            node_id: node_id.clone(),
            from: current,
            to: next,
            triggering_score: Some(score),
            timestamp,
        })
    }

    /// External decommission signal. Returns None when already SUNDOWN.
    pub fn decommission(
        &self,
        node_id: &NodeId,
        current: UtilizationCategory,
        timestamp: i64,
    ) -> Option<Transition> {
        (!current.is_terminal()).then(|| Transition {
            node_id: node_id.clone(),
            from: current,
            to: UtilizationCategory::Sundown,
            triggering_score: None,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use UtilizationCategory::*;

    fn classifier() -> Classifier {
        Classifier::new(ClassifierSettings {
            low_threshold: 0.4,
            high_threshold: 0.8,
            low_margin: 0.05,
            high_margin: 0.05,
        })
    }

    #[test]
    fn test_init_classifies_immediately() {
        let c = classifier();
        assert_eq!(c.next(Init, 0.1), Lu);
        assert_eq!(c.next(Init, 0.4), Mu);
        assert_eq!(c.next(Init, 0.79), Mu);
        assert_eq!(c.next(Init, 0.8), Hu);
    }

    #[test]
    fn test_hu_holds_until_below_exit_threshold() {
        let c = classifier();
        assert_eq!(c.next(Hu, 0.79), Hu);
        assert_eq!(c.next(Hu, 0.76), Hu);
        assert_eq!(c.next(Hu, 0.75), Hu);
        assert_eq!(c.next(Hu, 0.749), Mu);
        assert_eq!(c.next(Hu, 0.2), Lu);
    }

    #[test]
    fn test_lu_holds_until_above_exit_threshold() {
        let c = classifier();
        assert_eq!(c.next(Lu, 0.41), Lu);
        assert_eq!(c.next(Lu, 0.449), Lu);
        assert_eq!(c.next(Lu, 0.45), Mu);
        assert_eq!(c.next(Lu, 0.95), Hu);
    }

    #[test]
    fn test_mu_uses_plain_thresholds() {
        let c = classifier();
        assert_eq!(c.next(Mu, 0.8), Hu);
        assert_eq!(c.next(Mu, 0.39), Lu);
        assert_eq!(c.next(Mu, 0.6), Mu);
    }

    #[test]
    fn test_no_flapping_around_high_threshold() {
        let c = classifier();
        let mut category = Init;
        let mut changes = 0;
        for score in [0.81, 0.79, 0.8, 0.78, 0.81, 0.77, 0.8] {
            let next = c.next(category, score);
            if next != category {
                changes += 1;
            }
            category = next;
        }
        assert_eq!(category, Hu);
        assert_eq!(changes, 1);
    }

    #[test]
    fn test_sundown_is_terminal() {
        let c = classifier();
        for score in [0.0, 0.5, 1.0] {
            assert_eq!(c.next(Sundown, score), Sundown);
            assert!(c.classify(&"n".to_string(), Sundown, score, 0).is_none());
        }
        assert!(c.decommission(&"n".to_string(), Sundown, 0).is_none());
    }

    #[test]
    fn test_score_never_reaches_sundown_or_init() {
        let c = classifier();
        for from in [Init, Lu, Mu, Hu] {
            for i in 0..=100 {
                let next = c.next(from, i as f64 / 100.0);
                assert!(next != Sundown && next != Init);
            }
        }
    }

    #[test]
    fn test_classify_reports_transition() {
        let c = classifier();
        let t = c.classify(&"n1".to_string(), Init, 0.9, 42).unwrap();
        assert_eq!(t.from, Init);
        assert_eq!(t.to, Hu);
        assert_eq!(t.triggering_score, Some(0.9));
        assert_eq!(t.timestamp, 42);
        assert!(c.classify(&"n1".to_string(), Hu, 0.9, 43).is_none());
    }

    #[test]
    fn test_decommission_from_any_live_state() {
        let c = classifier();
        for from in [Init, Lu, Mu, Hu] {
            let t = c.decommission(&"n".to_string(), from, 7).unwrap();
            assert_eq!(t.to, Sundown);
            assert!(t.triggering_score.is_none());
        }
    }
}
