//! surge-metrics — telemetry intake for the Surge control loop.
//!
//! The APM/telemetry system is an external collaborator. This crate defines
//! the `MetricsSource` seam the scaling engine reads through, and records
//! every observed snapshot into the time-series store so the forecasting
//! engine has history to work from.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (trait)
//!   ├── FileMetricsSource   ← JSON snapshot written by an external agent
//!   ├── StaticMetricsSource ← settable snapshot (tests, dry runs)
//!   └── RecordingSource     ← decorator: fetch from an inner source, then record
//!
//! MetricsRecorder
//!   ├── record() → one sample per metric into StateStore
//!   └── run()    → periodic retention prune + cache purge
//! ```

pub mod recorder;
pub mod source;

pub use recorder::{MetricsRecorder, RecordingSource};
pub use source::{FileMetricsSource, MetricsFuture, MetricsSource, StaticMetricsSource};
