//! surge-state — domain types and embedded state store for Surge.
//!
//! Backed by [redb](https://docs.rs/redb), provides the time-series store the
//! forecasting engine reads from, a TTL cache for generated forecasts, and
//! durable storage for the scaling policy registry.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Metric samples are keyed `{metric}:{timestamp_ms:020}` so a lexicographic
//! range scan over one metric returns samples in timestamp order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
