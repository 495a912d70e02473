use gsm_core::Time;

use crate::l2frame::L2Frame;

/// The upward-facing contract of every decoder and encoder: the data-link
/// multiplexer on top of L1.
///
/// All calls must be non-blocking; the decoders invoke them from the radio
/// receive path. Default implementations log and drop so that channel types
/// only override the calls they can produce.
pub trait L2Upstream: Send + Sync {
    /// Control-channel frame with its receive time and physical measurements.
    fn write_low_side(&self, frame: L2Frame, time: Time, rssi: f32, ta: i32, fer: f32) {
        let _ = (frame, time, rssi, ta, fer);
        tracing::warn!("unhandled write_low_side");
    }

    /// SACCH frame, additionally carrying the decoded physical header.
    fn write_low_side_sacch(
        &self,
        frame: L2Frame,
        time: Time,
        rssi: f32,
        ta: i32,
        fer: f32,
        ms_power: i32,
        ms_timing: i32,
    ) {
        let _ = (frame, time, rssi, ta, fer, ms_power, ms_timing);
        tracing::warn!("unhandled write_low_side_sacch");
    }

    /// A 33-byte full-rate speech frame.
    fn write_low_side_tch(&self, frame: [u8; 33], time: Time, rssi: f32, ta: i32, fer: f32) {
        let _ = (frame, time, rssi, ta, fer);
        tracing::warn!("unhandled write_low_side_tch");
    }

    /// Encoders push their next scheduled burst time up so L2 can pace.
    fn signal_next_write_time(&self, time: Time) {
        let _ = time;
    }
}
