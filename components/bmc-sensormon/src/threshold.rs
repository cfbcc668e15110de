//! Hysteresis-guarded threshold evaluation (spec.md §4.6): escalating to a
//! more severe status is immediate, but recovering to a less severe one
//! requires crossing back past the tripped threshold by a margin (default
//! 1% of the warning-critical range, minimum `hysteresis-min` units) to
//! avoid flapping at the boundary.

use crate::config::ThresholdPair;
use crate::reading::ReadingStatus;

fn margin(pair: &ThresholdPair, hysteresis_min: f64) -> f64 {
    match (pair.warning, pair.critical) {
        (Some(w), Some(c)) => (0.01 * (c - w).abs()).max(hysteresis_min),
        _ => hysteresis_min,
    }
}

fn raw_status(value: f64, upper: &ThresholdPair, lower: &ThresholdPair) -> ReadingStatus {
    if upper.critical.map_or(false, |c| value >= c) || lower.critical.map_or(false, |c| value <= c) {
        return ReadingStatus::Critical;
    }
    if upper.warning.map_or(false, |w| value >= w) || lower.warning.map_or(false, |w| value <= w) {
        return ReadingStatus::Warning;
    }
    ReadingStatus::Ok
}

fn recovered_past_margin(
    value: f64,
    upper: &ThresholdPair,
    lower: &ThresholdPair,
    previous: ReadingStatus,
    hysteresis_min: f64,
) -> bool {
    match previous {
        ReadingStatus::Critical => {
            let up_ok = upper.critical.map_or(true, |c| value <= c - margin(upper, hysteresis_min));
            let low_ok = lower.critical.map_or(true, |c| value >= c + margin(lower, hysteresis_min));
            up_ok && low_ok
        }
        ReadingStatus::Warning => {
            let up_ok = upper.warning.map_or(true, |w| value <= w - margin(upper, hysteresis_min));
            let low_ok = lower.warning.map_or(true, |w| value >= w + margin(lower, hysteresis_min));
            up_ok && low_ok
        }
        _ => true,
    }
}

/// Evaluate `value` against `upper`/`lower` thresholds, given the
/// previously-reported status, applying hysteresis only on recovery.
pub fn evaluate(
    value: f64,
    upper: &ThresholdPair,
    lower: &ThresholdPair,
    previous: ReadingStatus,
    hysteresis_min: f64,
) -> ReadingStatus {
    let raw = raw_status(value, upper, lower);
    if raw.severity() >= previous.severity() {
        return raw;
    }
    if recovered_past_margin(value, upper, lower, previous, hysteresis_min) {
        raw
    } else {
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(warning: f64, critical: f64) -> ThresholdPair {
        ThresholdPair { warning: Some(warning), critical: Some(critical) }
    }

    #[test]
    fn escalates_immediately_on_crossing() {
        let up = upper(70.0, 85.0);
        let low = ThresholdPair::default();
        assert_eq!(evaluate(90.0, &up, &low, ReadingStatus::Ok, 0.5), ReadingStatus::Critical);
        assert_eq!(evaluate(75.0, &up, &low, ReadingStatus::Ok, 0.5), ReadingStatus::Warning);
    }

    #[test]
    fn does_not_flap_just_below_the_boundary() {
        let up = upper(70.0, 85.0);
        let low = ThresholdPair::default();
        // margin = max(0.5, 0.01*15) = 0.5; crossing back to 84.8 should not recover yet.
        assert_eq!(evaluate(84.8, &up, &low, ReadingStatus::Critical, 0.5), ReadingStatus::Critical);
        assert_eq!(evaluate(84.4, &up, &low, ReadingStatus::Critical, 0.5), ReadingStatus::Warning);
    }

    #[test]
    fn recovers_fully_once_past_margin() {
        let up = upper(70.0, 85.0);
        let low = ThresholdPair::default();
        assert_eq!(evaluate(69.0, &up, &low, ReadingStatus::Warning, 0.5), ReadingStatus::Ok);
    }
}
