//! Lifecycle entities owned by the state manager: `Host`, `Chassis`, `BMC`.
//!
//! Transitions are modeled as a total function of `(current, action)`,
//! either producing the next state or an explicit rejection — there is no
//! silent no-op path (spec.md §4.4).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum EntityKind {
    Host,
    Chassis,
    Bmc,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Host => "host",
            EntityKind::Chassis => "chassis",
            EntityKind::Bmc => "bmc",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum HostStatus {
    Off,
    Starting,
    On,
    Stopping,
    Resetting,
    Diagnostic,
    Quiesced,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum ChassisStatus {
    Off,
    Starting,
    On,
    Stopping,
    Identify,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum BmcStatus {
    Ready,
    Starting,
    Resetting,
    Updating,
    Degraded,
    Unknown,
}

/// Action verbs accepted on `statemgr.{entity}.{name}.control`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Action {
    On,
    Off,
    Cycle,
    Reset,
    ForceOff,
    Identify,
    Diagnostic,
    Quiesce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnyStatus {
    Host(HostStatus),
    Chassis(ChassisStatus),
    Bmc(BmcStatus),
}

/// Raised when `(current, action)` has no valid next state. This is never a
/// silent no-op: every rejection is surfaced as `InvalidArgument` to the
/// caller (spec.md §4.4, "must never silently succeed").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("action {action:?} is not valid from state {current}")]
pub struct RejectedTransition {
    pub current: String,
    pub action: Action,
}

/// Total transition function for `Host`.
pub fn host_transition(current: HostStatus, action: Action) -> Result<HostStatus, RejectedTransition> {
    use Action::*;
    use HostStatus::*;
    let next = match (current, action) {
        (Off, On) => Starting,
        (Starting, On) => Starting,
        (On, Off) => Stopping,
        (On, Cycle) => Resetting,
        (On, Reset) => Resetting,
        (On, Quiesce) => Quiesced,
        (On, Diagnostic) => Diagnostic,
        (_, ForceOff) => Stopping,
        (Stopping, Off) => Off,
        (Resetting, On) => Starting,
        (Quiesced, On) => Starting,
        (Quiesced, Off) => Stopping,
        (Diagnostic, Off) => Stopping,
        (Unknown, On) => Starting,
        (Unknown, Off) => Stopping,
        _ => {
            return Err(RejectedTransition { current: format!("{current:?}"), action });
        }
    };
    Ok(next)
}

/// Total transition function for `Chassis`.
pub fn chassis_transition(
    current: ChassisStatus,
    action: Action,
) -> Result<ChassisStatus, RejectedTransition> {
    use Action::*;
    use ChassisStatus::*;
    let next = match (current, action) {
        (Off, On) => Starting,
        (Starting, On) => Starting,
        (On, Off) => Stopping,
        (On, Identify) => Identify,
        (Identify, Off) => Stopping,
        (Identify, On) => On,
        (_, ForceOff) => Stopping,
        (Stopping, Off) => Off,
        (Unknown, On) => Starting,
        (Unknown, Off) => Stopping,
        _ => {
            return Err(RejectedTransition { current: format!("{current:?}"), action });
        }
    };
    Ok(next)
}

/// Total transition function for `BMC`.
pub fn bmc_transition(current: BmcStatus, action: Action) -> Result<BmcStatus, RejectedTransition> {
    use Action::*;
    use BmcStatus::*;
    let next = match (current, action) {
        (Ready, Reset) => Resetting,
        (Ready, Cycle) => Resetting,
        (Resetting, On) => Ready,
        (Degraded, Reset) => Resetting,
        (Unknown, Reset) => Resetting,
        _ => {
            return Err(RejectedTransition { current: format!("{current:?}"), action });
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_on_on_is_rejected() {
        assert!(host_transition(HostStatus::On, Action::On).is_err());
    }

    #[test]
    fn host_off_to_on_starts() {
        assert_eq!(host_transition(HostStatus::Off, Action::On), Ok(HostStatus::Starting));
    }

    #[test]
    fn every_state_action_pair_is_total() {
        // Every (state, action) combination must either produce a state or
        // an explicit rejection -- it must never panic.
        let states = [
            HostStatus::Off,
            HostStatus::Starting,
            HostStatus::On,
            HostStatus::Stopping,
            HostStatus::Resetting,
            HostStatus::Diagnostic,
            HostStatus::Quiesced,
            HostStatus::Unknown,
        ];
        let actions = [
            Action::On,
            Action::Off,
            Action::Cycle,
            Action::Reset,
            Action::ForceOff,
            Action::Identify,
            Action::Diagnostic,
            Action::Quiesce,
        ];
        for s in states {
            for a in actions {
                let _ = host_transition(s, a);
            }
        }
    }
}
