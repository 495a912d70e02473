use core::fmt;
use std::ops::Range;

use crate::bits::{BitVector, SoftVector};
use crate::gsm_time::Time;

/// Bits in one burst period (GSM 05.02 5.2).
pub const BURST_BITS: usize = 148;

/// Normal burst layout (GSM 05.02 5.2.3).
pub const DATA1: Range<usize> = 3..60;
pub const HL_POS: usize = 60;
pub const TSC_RANGE: Range<usize> = 61..87;
pub const HU_POS: usize = 87;
pub const DATA2: Range<usize> = 88..145;

/// Synchronisation burst layout (GSM 05.02 5.2.5).
pub const SCH_E1: Range<usize> = 3..42;
pub const SCH_SYNC_RANGE: Range<usize> = 42..106;
pub const SCH_E2: Range<usize> = 106..145;

#[allow(non_upper_case_globals)]
pub mod bitseq {
    /// Training sequences for normal bursts, 26 bits, indexed by TSC (GSM 05.02 5.2.3).
    pub const training: [[u8; 26]; 8] = [
        [0,0,1,0,0,1,0,1,1,1,0,0,0,0,1,0,0,0,1,0,0,1,0,1,1,1],
        [0,0,1,0,1,1,0,1,1,1,0,1,1,1,1,0,0,0,1,0,1,1,0,1,1,1],
        [0,1,0,0,0,0,1,1,1,0,1,1,1,0,1,0,0,1,0,0,0,0,1,1,1,0],
        [0,1,0,0,0,1,1,1,1,0,1,1,0,1,0,0,0,1,0,0,0,1,1,1,1,0],
        [0,0,0,1,1,0,1,0,1,1,1,0,0,1,0,0,0,0,0,1,1,0,1,0,1,1],
        [0,1,0,0,1,1,1,0,1,0,1,1,0,0,0,0,0,1,0,0,1,1,1,0,1,0],
        [1,0,1,0,0,1,1,1,1,1,0,1,1,0,0,0,1,0,1,0,0,1,1,1,1,1],
        [1,1,1,0,1,1,1,1,0,0,0,1,0,0,1,0,1,1,1,0,1,1,1,1,0,0],
    ];

    /// Extended training sequence of the synchronisation burst, 64 bits (GSM 05.02 5.2.5).
    pub const sch_sync: [u8; 64] = [
        1,0,1,1,1,0,0,1,0,1,1,0,0,0,1,0,0,0,0,0,1,0,0,0,0,0,0,1,1,1,1,0,
        0,0,1,0,1,1,0,1,0,1,0,0,0,1,0,1,0,1,1,1,0,1,1,0,0,0,0,1,1,0,1,1,
    ];

    /// The dummy burst bit pattern (GSM 05.02 5.2.6), used as C0 filler.
    pub const dummy: [u8; 148] = [
        0,0,0,
        1,1,1,1,1,0,1,1,0,1,1,1,0,1,1,0,0,0,0,0,1,0,1,0,0,1,0,0,1,1,1,0,
        0,0,0,0,1,0,0,1,0,0,0,1,0,0,0,0,0,0,0,1,1,1,1,1,0,0,0,1,1,1,0,0,
        0,1,0,1,1,1,0,0,0,1,0,1,1,1,0,0,0,1,0,1,0,1,1,1,0,1,0,0,1,0,1,0,
        0,0,1,1,0,0,1,1,0,0,1,1,1,0,0,1,1,1,1,0,1,0,0,1,1,1,1,1,0,0,0,1,
        0,0,1,0,1,1,1,1,1,0,1,0,1,0,
        0,0,0,
    ];
}

/// A burst on its way to the radio: 148 hard bits at a TDMA position.
#[derive(Clone)]
pub struct TxBurst {
    bits: BitVector,
    pub time: Time,
}

impl Default for TxBurst {
    fn default() -> Self {
        TxBurst {
            bits: BitVector::new(BURST_BITS),
            time: Time::default(),
        }
    }
}

impl TxBurst {
    pub fn new() -> Self {
        TxBurst::default()
    }

    /// The C0 filler burst (GSM 05.02 5.2.6).
    pub fn dummy() -> Self {
        TxBurst {
            bits: BitVector::from_bits(&bitseq::dummy),
            time: Time::default(),
        }
    }

    pub fn bits(&self) -> &BitVector {
        &self.bits
    }

    pub fn bits_mut(&mut self) -> &mut BitVector {
        &mut self.bits
    }

    pub fn zero(&mut self) {
        self.bits.zero();
    }

    /// Write the training sequence for the given TSC.
    pub fn set_training_sequence(&mut self, tsc: u8) {
        let seq = &bitseq::training[tsc as usize];
        self.bits.as_mut_slice()[TSC_RANGE].copy_from_slice(seq);
    }

    pub fn set_hl(&mut self, value: bool) {
        self.bits.set_bit(HL_POS, value as u8);
    }

    pub fn set_hu(&mut self, value: bool) {
        self.bits.set_bit(HU_POS, value as u8);
    }

    pub fn data1_mut(&mut self) -> &mut [u8] {
        &mut self.bits.as_mut_slice()[DATA1]
    }

    pub fn data2_mut(&mut self) -> &mut [u8] {
        &mut self.bits.as_mut_slice()[DATA2]
    }
}

impl fmt::Debug for TxBurst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxBurst {{ {} {} }}", self.time, self.bits.to_bitstr())
    }
}

/// A burst delivered by the radio: 148 soft bits plus the measured
/// physical parameters.
#[derive(Clone)]
pub struct RxBurst {
    bits: SoftVector,
    pub time: Time,
    /// RSSI in dB relative to full scale.
    pub rssi: f32,
    /// Timing error in symbol intervals.
    pub timing_error: f32,
}

impl RxBurst {
    pub fn new(bits: SoftVector, time: Time, rssi: f32, timing_error: f32) -> Self {
        assert!(bits.len() == BURST_BITS, "RxBurst must be {} bits", BURST_BITS);
        RxBurst { bits, time, rssi, timing_error }
    }

    /// Promote a transmitted burst to a full-confidence received burst.
    pub fn from_tx(tx: &TxBurst, rssi: f32, timing_error: f32) -> Self {
        RxBurst {
            bits: SoftVector::from_bits(tx.bits()),
            time: tx.time,
            rssi,
            timing_error,
        }
    }

    pub fn bits(&self) -> &SoftVector {
        &self.bits
    }

    pub fn data1(&self) -> &[f32] {
        &self.bits.as_slice()[DATA1]
    }

    pub fn data2(&self) -> &[f32] {
        &self.bits.as_slice()[DATA2]
    }

    /// Lower stealing flag, hardened.
    pub fn hl(&self) -> bool {
        self.bits.get(HL_POS) > 0.5
    }

    /// Upper stealing flag, hardened.
    pub fn hu(&self) -> bool {
        self.bits.get(HU_POS) > 0.5
    }

    /// Soft bits of an arbitrary burst segment.
    pub fn segment(&self, start: usize, len: usize) -> &[f32] {
        self.bits.segment(start, len)
    }
}

impl fmt::Debug for RxBurst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RxBurst {{ {} rssi={:.1} terr={:.2} {} }}",
            self.time,
            self.rssi,
            self.timing_error,
            self.bits.sliced().to_bitstr()
        )
    }
}
