//! JSON payloads the power manager exchanges over the bus. Duplicated
//! rather than shared via a crate dependency, matching bmc-statemgr's
//! wire.rs convention: services only ever talk to each other through the
//! bus, never through each other's crate.

use serde::{Deserialize, Serialize};

use bmc_core::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<CoreError> for WireError {
    fn from(err: CoreError) -> Self {
        WireError { code: format!("{:?}", err.rpc_code()), message: err.to_string() }
    }
}

pub type WireResult<T> = Result<T, WireError>;

pub fn encode<T: Serialize>(result: &WireResult<T>) -> Vec<u8> {
    serde_json::to_vec(result)
        .unwrap_or_else(|_| b"{\"Err\":{\"code\":\"Internal\",\"message\":\"encode failure\"}}".to_vec())
}

/// Reply for `powermgr.{kind}.{name}.{action}` (spec.md §4.5). `status` is
/// the `PowerState` the backend settled on after the operation completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerActionReply {
    pub status: String,
}

/// Body published on `powermgr.emergency.thermal` by the thermal manager
/// (spec.md §4.7's escalation) and consumed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyThermalEvent {
    pub zone: String,
    pub temperature: f64,
    pub action: String,
}

/// Reply shape for `thermalmgr.zone.{id}.state`, duplicated from
/// bmc-thermalmgr's own wire contract, used by the emergency responder to
/// re-check the zone before force-off (spec.md §4.5 "Emergency response").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStateReply {
    pub id: String,
    pub state: String,
    pub temperature: Option<f64>,
}

/// Body of `statemgr.{kind}.{name}.update`: the power manager reporting
/// the observed terminal state back to the state manager (spec.md §4.4's
/// single-writer handoff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedUpdate {
    pub status: String,
}
