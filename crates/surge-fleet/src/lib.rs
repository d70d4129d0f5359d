//! surge-fleet — the fleet inventory the control loop resizes.
//!
//! The load balancer that owns the real worker pool is an external
//! collaborator. This crate defines the seam it is consumed through and a
//! simulated implementation used by the daemon until a provider backend is
//! wired in.
//!
//! # Architecture
//!
//! ```text
//! FleetController (trait)
//!   ├── fleet_size() → current instance count
//!   └── resize(target) → async completion
//!
//! SimulatedFleet
//!   └── fixed launch delay on scale-up, drain delay on scale-down
//!
//! resize_with_retry()
//!   └── per-attempt timeout + exponential backoff (1s → 30s by default)
//! ```

pub mod controller;
pub mod retry;
pub mod simulated;

pub use controller::{FleetController, FleetError, FleetFuture, FleetResult};
pub use retry::{RetryPolicy, resize_with_retry};
pub use simulated::SimulatedFleet;
