use std::sync::Arc;

use gsm_core::{ChannelType, RxBurst, TxBurst};

/// Receive-path target installed in the radio's demultiplex table.
///
/// The radio calls `write_low_side` on its receive thread; implementations
/// must not block upward (the RACH decoder decouples through its own FIFO
/// for exactly this reason).
pub trait BurstSink: Send + Sync {
    fn timeslot(&self) -> u8;
    fn channel_type(&self) -> ChannelType;
    fn write_low_side(&self, burst: &RxBurst);
}

/// The transmit side of the radio manager, one per ARFCN.
///
/// Encoders hand finished bursts down with `write_high_side`; the radio
/// schedules them at the burst's TDMA time. `install_decoder` registers a
/// decoder in the per-(timeslot, channel type) dispatch table.
pub trait RadioDownstream: Send + Sync {
    fn arfcn(&self) -> u16;
    /// True when this carrier is C0 and must never go dark.
    fn is_c0(&self) -> bool;
    fn write_high_side(&self, burst: TxBurst);
    fn install_decoder(&self, decoder: Arc<dyn BurstSink>);
}
