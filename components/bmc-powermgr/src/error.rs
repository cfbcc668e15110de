use bmc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowerMgrError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown component {0:?}")]
    UnknownComponent(String),

    #[error("component {0:?} has an operation in flight")]
    Busy(String),

    #[error("operation timed out")]
    Timeout,

    #[error("backend failure: {0}")]
    BackendFailure(String),
}

impl From<PowerMgrError> for CoreError {
    fn from(err: PowerMgrError) -> Self {
        match err {
            PowerMgrError::InvalidConfiguration(s) => CoreError::InvalidConfiguration(s),
            PowerMgrError::UnknownComponent(name) => CoreError::NotFound(format!("component {name:?}")),
            PowerMgrError::Busy(_) => CoreError::Busy,
            PowerMgrError::Timeout => CoreError::Timeout,
            PowerMgrError::BackendFailure(s) => CoreError::BackendFailure(s),
        }
    }
}
