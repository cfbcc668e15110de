//! JSON payloads the thermal manager exchanges over the bus. Duplicated
//! rather than shared via a crate dependency, matching bmc-statemgr's
//! wire.rs convention.

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

/// Reply for `thermalmgr.zone.{id}.state`, duplicated in bmc-powermgr's
/// wire contract for the emergency responder's zone re-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneStateReply {
    pub id: String,
    pub state: String,
    pub temperature: Option<f64>,
}

/// Body of `thermalmgr.zone.{id}.set`: new PID gains and/or target
/// temperature (spec.md §4.7 "Reconfiguration").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneSetRequest {
    pub kp: Option<f64>,
    pub ki: Option<f64>,
    pub kd: Option<f64>,
    pub target_temp: Option<f64>,
}

/// Body published on `thermalmgr.zone.{id}.output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneOutputEvent {
    pub id: String,
    pub output: f64,
    pub temperature: f64,
}

/// Body consumed from `thermalmgr.sensor.{id}.temperature`, published by
/// the sensor monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureUpdate {
    pub sensor_id: String,
    pub value: f64,
}

/// Body published on `powermgr.emergency.thermal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyThermalEvent {
    pub zone: String,
    pub temperature: f64,
    pub action: String,
}
