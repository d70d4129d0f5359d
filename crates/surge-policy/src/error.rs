use thiserror::Error;

use surge_state::StateError;

pub type PolicyResult<T> = Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid policy {id:?}: {reason}")]
    Invalid { id: String, reason: String },

    #[error("policy {0:?} already registered")]
    Duplicate(String),

    #[error("policy {0:?} not found")]
    NotFound(String),

    #[error(transparent)]
    State(#[from] StateError),
}
