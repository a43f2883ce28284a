//! Threshold classifier — maps raw metric values to severity tiers
//!
//! Pure and deterministic: the same value against the same thresholds always
//! yields the same severity. Boundary values classify into the higher tier
//! (>= comparison in the declared "worse" direction).

use serde::{Deserialize, Serialize};

use crate::types::{MetricKind, Severity};

/// Which direction of a metric is bad.
///
/// Declared per threshold set, never inferred from the metric kind: disk usage
/// rises toward trouble, peer count falls toward it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    HigherIsWorse,
    LowerIsWorse,
}

/// Configured breakpoints for one metric kind.
///
/// Ordering invariant (in the worse direction): warning < critical < emergency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub metric_kind: MetricKind,
    pub direction: Direction,
    pub warning: f64,
    pub critical: f64,
    pub emergency: Option<f64>,
}

impl ThresholdSet {
    /// Check the warning < critical < emergency ordering in the declared
    /// direction. Called once at config load; never re-checked per sample.
    pub fn validate(&self) -> Result<(), String> {
        let ordered = match self.direction {
            Direction::HigherIsWorse => {
                self.warning < self.critical
                    && self.emergency.map_or(true, |e| self.critical < e)
            }
            Direction::LowerIsWorse => {
                self.warning > self.critical
                    && self.emergency.map_or(true, |e| self.critical > e)
            }
        };
        if ordered {
            Ok(())
        } else {
            Err(format!(
                "threshold ordering violated for {}: warning={}, critical={}, emergency={:?} ({})",
                self.metric_kind,
                self.warning,
                self.critical,
                self.emergency,
                match self.direction {
                    Direction::HigherIsWorse => "higher-is-worse",
                    Direction::LowerIsWorse => "lower-is-worse",
                }
            ))
        }
    }
}

/// Classify a raw metric value against a threshold set.
///
/// Total over all f64 inputs; a value exactly at a breakpoint lands in the
/// higher tier.
pub fn classify(value: f64, thresholds: &ThresholdSet) -> Severity {
    let breached = |level: f64| match thresholds.direction {
        Direction::HigherIsWorse => value >= level,
        Direction::LowerIsWorse => value <= level,
    };

    if thresholds.emergency.map_or(false, breached) {
        Severity::Emergency
    } else if breached(thresholds.critical) {
        Severity::Critical
    } else if breached(thresholds.warning) {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk_thresholds() -> ThresholdSet {
        ThresholdSet {
            metric_kind: MetricKind::Disk,
            direction: Direction::HigherIsWorse,
            warning: 80.0,
            critical: 90.0,
            emergency: Some(95.0),
        }
    }

    fn peer_thresholds() -> ThresholdSet {
        ThresholdSet {
            metric_kind: MetricKind::PeerCount,
            direction: Direction::LowerIsWorse,
            warning: 10.0,
            critical: 3.0,
            emergency: Some(0.0),
        }
    }

    #[test]
    fn disk_tiers() {
        let t = disk_thresholds();
        assert_eq!(classify(75.0, &t), Severity::Normal);
        assert_eq!(classify(82.0, &t), Severity::Warning);
        assert_eq!(classify(91.5, &t), Severity::Critical);
        assert_eq!(classify(99.0, &t), Severity::Emergency);
    }

    #[test]
    fn boundary_values_land_in_higher_tier() {
        let t = disk_thresholds();
        assert_eq!(classify(80.0, &t), Severity::Warning);
        assert_eq!(classify(90.0, &t), Severity::Critical);
        assert_eq!(classify(95.0, &t), Severity::Emergency);
    }

    #[test]
    fn boundary_classification_is_stable() {
        let t = disk_thresholds();
        let first = classify(90.0, &t);
        for _ in 0..100 {
            assert_eq!(classify(90.0, &t), first);
        }
    }

    #[test]
    fn inverted_direction_for_peer_count() {
        let t = peer_thresholds();
        assert_eq!(classify(25.0, &t), Severity::Normal);
        assert_eq!(classify(10.0, &t), Severity::Warning);
        assert_eq!(classify(2.0, &t), Severity::Critical);
        assert_eq!(classify(0.0, &t), Severity::Emergency);
    }

    #[test]
    fn validate_accepts_ordered_sets() {
        assert!(disk_thresholds().validate().is_ok());
        assert!(peer_thresholds().validate().is_ok());
    }

    #[test]
    fn validate_rejects_misordered_sets() {
        let mut t = disk_thresholds();
        t.critical = 70.0;
        assert!(t.validate().is_err());

        let mut p = peer_thresholds();
        p.critical = 50.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn emergency_is_optional() {
        let mut t = disk_thresholds();
        t.emergency = None;
        assert!(t.validate().is_ok());
        assert_eq!(classify(99.9, &t), Severity::Critical);
    }
}
