use gsm_core::{BitVector, ChannelType, Time};

/// Sub-type tag of a capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapTag {
    /// Plain frame or burst payload
    Frame,
    /// RACH access burst
    Access,
    /// Synchronisation burst
    Sch,
    /// Frequency correction burst
    Fcch,
}

/// One captured L1 event: a frame or burst copy with its radio context.
#[derive(Debug, Clone)]
pub struct TapRecord {
    pub arfcn: u16,
    pub time: Time,
    pub channel_type: ChannelType,
    pub uplink: bool,
    /// True when the payload is raw burst bits rather than a decoded frame.
    pub burst_like: bool,
    pub payload: BitVector,
    pub tag: TapTag,
}

/// Pluggable packet-capture sink. The core emits a copy of every
/// significant burst (good uplink, outgoing downlink, RACH hit, SCH, FCCH)
/// to whatever tap is installed; exporting is not L1's concern.
pub trait PacketTap: Send + Sync {
    fn write(&self, record: TapRecord);
}
