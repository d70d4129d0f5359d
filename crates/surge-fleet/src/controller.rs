//! Fleet controller seam.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub type FleetResult<T> = Result<T, FleetError>;

/// Boxed future alias for fleet operations.
pub type FleetFuture<'a, T> = Pin<Box<dyn Future<Output = FleetResult<T>> + Send + 'a>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("resize timed out after {0:?}")]
    Timeout(Duration),
}

/// The pool of interchangeable worker instances being scaled.
///
/// Implementations talk to a cloud provider or orchestrator. The scaling
/// engine is the only caller of `resize`.
pub trait FleetController: Send + Sync {
    /// Current number of instances in the fleet.
    fn fleet_size(&self) -> FleetFuture<'_, u32>;

    /// Resize the fleet to exactly `target` instances.
    fn resize(&self, target: u32) -> FleetFuture<'_, ()>;
}
