use bmc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorMonError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown sensor {0:?}")]
    UnknownSensor(String),

    #[error("sensor read timed out")]
    Timeout,

    #[error("backend failure: {0}")]
    BackendFailure(String),
}

impl From<SensorMonError> for CoreError {
    fn from(err: SensorMonError) -> Self {
        match err {
            SensorMonError::InvalidConfiguration(s) => CoreError::InvalidConfiguration(s),
            SensorMonError::UnknownSensor(name) => CoreError::NotFound(format!("sensor {name:?}")),
            SensorMonError::Timeout => CoreError::Timeout,
            SensorMonError::BackendFailure(s) => CoreError::BackendFailure(s),
        }
    }
}
