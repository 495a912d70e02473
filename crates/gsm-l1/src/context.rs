use std::sync::Arc;

use gsm_config::SharedConfig;
use gsm_core::BtsClock;
use gsm_saps::PacketTap;

/// Process-wide context handed to every L1 component: the configuration
/// store, the BTS master clock and the optional packet-capture tap.
/// All three are initialised at startup and immutable afterwards.
#[derive(Clone)]
pub struct L1Context {
    pub config: SharedConfig,
    pub clock: Arc<BtsClock>,
    pub tap: Option<Arc<dyn PacketTap>>,
}

impl L1Context {
    pub fn new(config: SharedConfig, clock: Arc<BtsClock>) -> Self {
        L1Context { config, clock, tap: None }
    }

    pub fn with_tap(config: SharedConfig, clock: Arc<BtsClock>, tap: Arc<dyn PacketTap>) -> Self {
        L1Context { config, clock, tap: Some(tap) }
    }

    /// The training sequence code; hardwired to the BCC.
    pub fn tsc(&self) -> u8 {
        self.config.config().bsic.bcc
    }

    /// The 6-bit base-station identity code.
    pub fn bsic(&self) -> u8 {
        self.config.config().bsic.value()
    }
}
