//! Per-zone severity ladder (spec.md §4.7): `disabled → normal → warning →
//! critical → emergency`, with the same hysteresis discipline as the
//! sensor monitor: escalating is immediate, recovering to a less severe
//! state requires crossing back past the tripped threshold by a margin.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneState {
    Disabled,
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl ZoneState {
    pub fn as_str(self) -> &'static str {
        match self {
            ZoneState::Disabled => "disabled",
            ZoneState::Normal => "normal",
            ZoneState::Warning => "warning",
            ZoneState::Critical => "critical",
            ZoneState::Emergency => "emergency",
        }
    }

    fn severity(self) -> u8 {
        match self {
            ZoneState::Disabled => 0,
            ZoneState::Normal => 0,
            ZoneState::Warning => 1,
            ZoneState::Critical => 2,
            ZoneState::Emergency => 3,
        }
    }
}

fn margin(warning: f64, emergency: f64, hysteresis_min: f64) -> f64 {
    (0.01 * (emergency - warning).abs()).max(hysteresis_min)
}

fn raw_state(temperature: f64, warning: f64, critical: f64, emergency: f64) -> ZoneState {
    if temperature >= emergency {
        ZoneState::Emergency
    } else if temperature >= critical {
        ZoneState::Critical
    } else if temperature >= warning {
        ZoneState::Warning
    } else {
        ZoneState::Normal
    }
}

/// Evaluate the zone's severity state for `temperature`, given the
/// previously-reported state. A `disabled` zone never transitions.
pub fn evaluate(
    temperature: f64,
    warning: f64,
    critical: f64,
    emergency: f64,
    previous: ZoneState,
    hysteresis_min: f64,
) -> ZoneState {
    if previous == ZoneState::Disabled {
        return ZoneState::Disabled;
    }
    let raw = raw_state(temperature, warning, critical, emergency);
    if raw.severity() >= previous.severity() {
        return raw;
    }
    let m = margin(warning, emergency, hysteresis_min);
    let recovered = match previous {
        ZoneState::Emergency => temperature <= emergency - m,
        ZoneState::Critical => temperature <= critical - m,
        ZoneState::Warning => temperature <= warning - m,
        ZoneState::Normal | ZoneState::Disabled => true,
    };
    if recovered {
        raw
    } else {
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_immediately_through_the_ladder() {
        assert_eq!(evaluate(96.0, 70.0, 85.0, 95.0, ZoneState::Normal, 0.5), ZoneState::Emergency);
        assert_eq!(evaluate(86.0, 70.0, 85.0, 95.0, ZoneState::Normal, 0.5), ZoneState::Critical);
        assert_eq!(evaluate(71.0, 70.0, 85.0, 95.0, ZoneState::Normal, 0.5), ZoneState::Warning);
    }

    #[test]
    fn recovery_requires_crossing_the_margin() {
        // margin = max(0.5, 0.01*(95-70)) = 0.5
        assert_eq!(evaluate(84.6, 70.0, 85.0, 95.0, ZoneState::Critical, 0.5), ZoneState::Critical);
        assert_eq!(evaluate(84.0, 70.0, 85.0, 95.0, ZoneState::Critical, 0.5), ZoneState::Warning);
    }

    #[test]
    fn disabled_zone_never_transitions() {
        assert_eq!(evaluate(999.0, 70.0, 85.0, 95.0, ZoneState::Disabled, 0.5), ZoneState::Disabled);
    }
}
