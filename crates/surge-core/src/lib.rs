pub mod config;
pub mod duration;

pub use config::{ConfigError, ConfigResult, SurgeConfig};
pub use duration::parse_duration;
