//! surge-policy — the scaling policy registry.
//!
//! Holds the ordered set of policies the evaluator sweeps. Policies are
//! validated at registration time, so a malformed policy never reaches
//! evaluation. When backed by a `StateStore` the registry is durable and
//! the default set is seeded on first open.

pub mod defaults;
pub mod error;
pub mod registry;
pub mod validate;

pub use defaults::default_policies;
pub use error::{PolicyError, PolicyResult};
pub use registry::PolicyRegistry;
pub use validate::validate_policy;
