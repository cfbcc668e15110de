//! JSON payloads carried over the bus for `statemgr.*` requests and
//! replies. The gateway (spec.md §4.8) unmarshals `WireError` back into an
//! RPC status code via `CoreError::rpc_code`; nothing here is a grpc/http
//! type, it is just bytes on the bus.

use bmc_core::lifecycle::Action;
use bmc_core::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateReply {
    pub name: String,
    pub kind: String,
    pub status: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub status: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListReply {
    pub entities: Vec<ListEntry>,
}

/// Body of `statemgr.host.{name}.update` / `statemgr.chassis.{name}.update`:
/// the power manager reporting the observed terminal state after acting on
/// a component directly (spec.md §4.4's single-writer handoff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedUpdate<S> {
    pub status: S,
}

pub fn encode<T: Serialize>(result: &WireResult<T>) -> Vec<u8> {
    serde_json::to_vec(result).unwrap_or_else(|_| b"{\"Err\":{\"code\":\"Internal\",\"message\":\"encode failure\"}}".to_vec())
}

/// Reply shape for `powermgr.{kind}.{name}.{action}` (bmc-powermgr's wire
/// contract, duplicated here rather than depended on: the two services only
/// ever talk through the bus, never through each other's crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerActionReply {
    pub status: String,
}

/// The `powermgr.{kind}.{name}.{action}` token for an action that the power
/// manager actuates physically. `Identify`/`Diagnostic`/`Quiesce` are
/// state-manager-only verbs with no physical counterpart.
pub fn power_action_token(action: Action) -> Option<&'static str> {
    match action {
        Action::On => Some("on"),
        Action::Off => Some("off"),
        Action::Cycle => Some("cycle"),
        Action::Reset => Some("reset"),
        Action::ForceOff => Some("force-off"),
        Action::Identify | Action::Diagnostic | Action::Quiesce => None,
    }
}

pub fn host_status_from_power(status: &str) -> Option<bmc_core::lifecycle::HostStatus> {
    use bmc_core::lifecycle::HostStatus::*;
    match status {
        "on" => Some(On),
        "off" => Some(Off),
        _ => None,
    }
}

pub fn chassis_status_from_power(status: &str) -> Option<bmc_core::lifecycle::ChassisStatus> {
    use bmc_core::lifecycle::ChassisStatus::*;
    match status {
        "on" => Some(On),
        "off" => Some(Off),
        _ => None,
    }
}
