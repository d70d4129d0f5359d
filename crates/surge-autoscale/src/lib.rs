//! surge-autoscale — the policy-driven scaling engine.
//!
//! Sweeps the policy registry on a fixed interval, evaluates each enabled
//! policy against the current metrics (or a forecast, for predictive
//! policies), and resizes the fleet when one fires.
//!
//! # Sweep
//!
//! ```text
//! if a resize is in flight:            evaluate nothing
//! metrics = source.current_metrics()   (failure: evaluate nothing)
//! for policy in registry (enabled, in order):
//!     skip if now - last_action < policy.cooldown     // global cooldown
//!     reactive:   left-to-right and/or over triggers
//!     predictive: forecast first trigger's metric over the look-ahead,
//!                 fire iff should_scale and confidence > 0.7
//!     scheduled:  fire iff the UTC hour is a trigger hour
//!     fired: apply actions by priority, clamp to [min, max], resize,
//!            journal a success or failed event
//! ```
//!
//! Only one resize runs at a time. Manual overrides share the same
//! exclusivity flag and audit trail but ignore cooldowns and bounds.

pub mod coordinator;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod journal;

pub use coordinator::{ScalingCoordinator, ScalingLease};
pub use engine::{EngineStats, EvaluationReport, Recommendation, ScalingEngine};
pub use error::{EngineError, EngineResult};
pub use journal::{EventJournal, JOURNAL_CAPACITY};
