//! Process configuration for GSM BlueStation
//!
//! The configuration store is initialised at startup and immutable
//! afterwards; every component receives it as an explicit context.

pub mod stack_config;
pub mod toml_config;

pub use stack_config::{Bsic, SharedConfig, StackConfig};
pub use toml_config::ConfigError;
