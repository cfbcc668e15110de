//! JSON payloads the sensor monitor exchanges over the bus. Duplicated
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

/// Reply for `sensormon.sensor.{name}.state` (spec.md §4.8 RPC table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorStateReply {
    pub id: String,
    pub context: String,
    pub unit: String,
    pub value: Option<f64>,
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Reply for `sensormon.sensors.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorListReply {
    pub sensors: Vec<SensorStateReply>,
}

/// Body published on `sensormon.{id}.reading`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingEvent {
    pub sensor_id: String,
    pub value: Option<f64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: String,
}

/// Body published on `sensormon.{id}.{warning,critical,error,ok}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub sensor_id: String,
    pub value: Option<f64>,
    pub previous_status: String,
    pub status: String,
}

/// Body of `thermalmgr.sensor.{id}.temperature`: forwarded temperature
/// reading (spec.md §4.6 "forwards temperature readings to the thermal
/// manager").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureUpdate {
    pub sensor_id: String,
    pub value: f64,
}
