//! Channel types that are used across multiple layers
//!
//! These identify a logical channel in the radio's demultiplex table and in
//! packet-capture records, so they live in gsm-core to avoid circular
//! dependencies.

/// Logical channel type of an L1 FEC instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    /// Frequency correction channel, downlink tone bursts
    Fcch,
    /// Synchronisation channel
    Sch,
    /// Broadcast control channel (the canonical 4-burst XCCH)
    Bcch,
    /// Stand-alone dedicated control channel
    Sdcch,
    /// Slow associated control channel
    Sacch,
    /// Full-rate traffic channel with FACCH stealing
    TchF,
    /// Random access channel, uplink access bursts
    Rach,
}

impl ChannelType {
    /// True for channel types whose decoder processes single access bursts
    /// rather than interleaved blocks of normal bursts.
    pub fn is_burst_wise(self) -> bool {
        matches!(self, ChannelType::Rach)
    }
}
