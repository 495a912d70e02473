//! Core utilities for GSM BlueStation
//!
//! This crate provides the fundamental types used across the L1 stack:
//! bit containers, TDMA time and the BTS clock, bursts, channel mappings
//! and the MS power-command tables.

/// Git version string, set at compile time
pub const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");
/// Stack version followed by git version string, e.g., "0.1.0-aabbccdd"
pub const STACK_VERSION: &str = const_format::formatcp!("{}-{}", env!("CARGO_PKG_VERSION"), GIT_VERSION);

pub mod bits;
pub mod burst;
pub mod chan_types;
pub mod clock;
pub mod debug;
pub mod gsm_time;
pub mod power;
pub mod tdma;
pub mod timer;

// Re-export commonly used items
pub use bits::{BitVector, SoftVector};
pub use burst::{RxBurst, TxBurst};
pub use chan_types::ChannelType;
pub use clock::BtsClock;
pub use gsm_time::Time;
pub use power::Band;
pub use tdma::TdmaMapping;
pub use timer::CountdownTimer;
