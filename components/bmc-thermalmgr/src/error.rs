use bmc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThermalMgrError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown zone {0:?}")]
    UnknownZone(String),

    #[error("unknown cooling device {0:?}")]
    UnknownDevice(String),

    #[error("backend failure: {0}")]
    BackendFailure(String),
}

impl From<ThermalMgrError> for CoreError {
    fn from(err: ThermalMgrError) -> Self {
        match err {
            ThermalMgrError::InvalidConfiguration(s) => CoreError::InvalidConfiguration(s),
            ThermalMgrError::UnknownZone(name) => CoreError::NotFound(format!("zone {name:?}")),
            ThermalMgrError::UnknownDevice(name) => CoreError::NotFound(format!("cooling device {name:?}")),
            ThermalMgrError::BackendFailure(s) => CoreError::BackendFailure(s),
        }
    }
}
