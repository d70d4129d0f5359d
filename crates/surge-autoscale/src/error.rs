use thiserror::Error;

use surge_policy::PolicyError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a scaling operation is already in progress")]
    Busy,

    #[error("metrics unavailable: {0}")]
    Metrics(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}
