use core::fmt;
use std::fs;

use gsm_core::Band;
use serde::Deserialize;

use crate::stack_config::{Bsic, CfgMsControl, CfgTimers, SharedConfig, StackConfig};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "cannot parse config file: {}", e),
            ConfigError::Invalid(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Raw TOML shape; every optional field falls back to the stack default.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    gsm: TomlGsm,
    #[serde(default)]
    ms: TomlMs,
    #[serde(default)]
    timer: TomlTimers,
    debug_log: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlGsm {
    band: Band,
    ncc: u8,
    bcc: u8,
    c0_arfcn: u16,
    max_speech_latency: Option<usize>,
    rssi_target: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlMs {
    power_max: Option<f32>,
    power_min: Option<f32>,
    power_damping: Option<u8>,
    ta_max: Option<f32>,
    ta_damping: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlTimers {
    t3101_ms: Option<u64>,
    t3109_ms: Option<u64>,
    t3111_ms: Option<u64>,
}

/// Load a SharedConfig from a TOML file.
pub fn from_file(path: &str) -> Result<SharedConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    from_str(&text)
}

/// Load a SharedConfig from TOML text.
pub fn from_str(text: &str) -> Result<SharedConfig, ConfigError> {
    let raw: TomlConfig = toml::from_str(text)?;

    let defaults_ms = CfgMsControl::default();
    let defaults_timers = CfgTimers::default();

    let cfg = StackConfig {
        band: raw.gsm.band,
        bsic: Bsic { ncc: raw.gsm.ncc, bcc: raw.gsm.bcc },
        c0_arfcn: raw.gsm.c0_arfcn,
        max_speech_latency: raw.gsm.max_speech_latency.unwrap_or(2),
        ms_control: CfgMsControl {
            rssi_target: raw.gsm.rssi_target.unwrap_or(defaults_ms.rssi_target),
            power_max: raw.ms.power_max.unwrap_or(defaults_ms.power_max),
            power_min: raw.ms.power_min.unwrap_or(defaults_ms.power_min),
            power_damping: raw.ms.power_damping.unwrap_or(defaults_ms.power_damping),
            ta_max: raw.ms.ta_max.unwrap_or(defaults_ms.ta_max),
            ta_damping: raw.ms.ta_damping.unwrap_or(defaults_ms.ta_damping),
        },
        timers: CfgTimers {
            t3101_ms: raw.timer.t3101_ms.unwrap_or(defaults_timers.t3101_ms),
            t3109_ms: raw.timer.t3109_ms.unwrap_or(defaults_timers.t3109_ms),
            t3111_ms: raw.timer.t3111_ms.unwrap_or(defaults_timers.t3111_ms),
        },
        debug_log: raw.debug_log,
    };

    cfg.validate().map_err(ConfigError::Invalid)?;
    tracing::info!(
        "loaded configuration: band {:?} bsic {}/{} c0 {}",
        cfg.band,
        cfg.bsic.ncc,
        cfg.bsic.bcc,
        cfg.c0_arfcn
    );
    Ok(SharedConfig::from_config(cfg))
}
