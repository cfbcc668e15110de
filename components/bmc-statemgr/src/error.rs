use bmc_core::lifecycle::RejectedTransition;
use bmc_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateMgrError {
    #[error(transparent)]
    Rejected(#[from] RejectedTransition),

    #[error("unknown {kind} {name:?}")]
    UnknownEntity { kind: &'static str, name: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<StateMgrError> for CoreError {
    fn from(err: StateMgrError) -> Self {
        match err {
            StateMgrError::Rejected(r) => CoreError::InvalidArgument(r.to_string()),
            StateMgrError::UnknownEntity { kind, name } => {
                CoreError::NotFound(format!("{kind} {name:?}"))
            }
            StateMgrError::Core(e) => e,
        }
    }
}
