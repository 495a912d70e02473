use std::sync::Arc;

use gsm_core::Band;

/// Base-station identity code: NCC (3 bits) + BCC (3 bits).
/// The BCC doubles as the training sequence code of all dedicated channels.
#[derive(Debug, Clone, Copy)]
pub struct Bsic {
    pub ncc: u8,
    pub bcc: u8,
}

impl Bsic {
    /// The 6-bit BSIC value as carried on the RACH parity (GSM 03.03 4.3.2).
    pub fn value(&self) -> u8 {
        (self.ncc << 3) | self.bcc
    }
}

/// Closed-loop MS power and timing-advance control parameters
/// (GSM 05.08 4, GSM 05.10 5 and 6).
#[derive(Debug, Clone, Copy)]
pub struct CfgMsControl {
    /// Target uplink RSSI in dB relative to full scale
    pub rssi_target: f32,
    /// Clamp for ordered MS power, dBm
    pub power_max: f32,
    pub power_min: f32,
    /// Power loop damping factor, percent
    pub power_damping: u8,
    /// Clamp for ordered timing advance, symbol periods
    pub ta_max: f32,
    /// TA loop damping factor, percent
    pub ta_damping: u8,
}

impl Default for CfgMsControl {
    fn default() -> Self {
        Self {
            rssi_target: -50.0,
            power_max: 33.0,
            power_min: 5.0,
            power_damping: 75,
            ta_max: 62.0,
            ta_damping: 50,
        }
    }
}

/// Channel supervision timer durations (GSM 04.08 11.1), milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct CfgTimers {
    /// Access reply timeout
    pub t3101_ms: u64,
    /// Uplink lost timeout
    pub t3109_ms: u64,
    /// Release complete delay
    pub t3111_ms: u64,
}

impl Default for CfgTimers {
    fn default() -> Self {
        Self {
            t3101_ms: 4_000,
            t3109_ms: 30_000,
            t3111_ms: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub band: Band,
    pub bsic: Bsic,
    /// ARFCN of the C0 beacon carrier
    pub c0_arfcn: u16,

    /// Maximum speech frames buffered before head-drop
    pub max_speech_latency: usize,

    pub ms_control: CfgMsControl,
    pub timers: CfgTimers,

    pub debug_log: Option<String>,
}

impl StackConfig {
    pub fn new(band: Band, ncc: u8, bcc: u8, c0_arfcn: u16) -> Self {
        StackConfig {
            band,
            bsic: Bsic { ncc, bcc },
            c0_arfcn,
            max_speech_latency: 2,
            ms_control: CfgMsControl::default(),
            timers: CfgTimers::default(),
            debug_log: None,
        }
    }

    /// Validate that all fields are within their encodable ranges.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bsic.ncc > 7 || self.bsic.bcc > 7 {
            return Err("BSIC components must fit 3 bits each");
        }
        if self.ms_control.power_damping > 99 || self.ms_control.ta_damping > 99 {
            return Err("damping factors must be below 100 percent");
        }
        if self.ms_control.power_min > self.ms_control.power_max {
            return Err("MS power minimum exceeds maximum");
        }
        if !(0.0..=63.0).contains(&self.ms_control.ta_max) {
            return Err("TA maximum must be within 0..63 symbol periods");
        }
        Ok(())
    }
}

/// Global shared configuration, immutable after construction.
#[derive(Clone)]
pub struct SharedConfig {
    cfg: Arc<StackConfig>,
}

impl SharedConfig {
    pub fn from_config(cfg: StackConfig) -> Self {
        // Check config for validity before returning the SharedConfig object
        match cfg.validate() {
            Ok(_) => {}
            Err(e) => panic!("Invalid stack configuration: {}", e),
        }
        Self { cfg: Arc::new(cfg) }
    }

    /// Access the configuration.
    pub fn config(&self) -> &StackConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bsic_value() {
        let bsic = Bsic { ncc: 5, bcc: 2 };
        assert_eq!(bsic.value(), 0b101_010);
    }

    #[test]
    fn test_default_config_validates() {
        let cfg = StackConfig::new(Band::Egsm900, 0, 2, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "Invalid stack configuration")]
    fn test_invalid_bsic_rejected() {
        let cfg = StackConfig::new(Band::Egsm900, 9, 2, 50);
        let _ = SharedConfig::from_config(cfg);
    }
}
