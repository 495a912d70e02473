//! SCH encoder (GSM 05.03 4.7): 25 information bits, 10-bit parity, 4
//! tail bits, convolved to 78 e-bits split around the extended
//! synchronisation training sequence of the sync burst.

use std::sync::{Arc, Mutex, Weak};

use gsm_core::burst::{bitseq, SCH_E1, SCH_E2, SCH_SYNC_RANGE};
use gsm_core::{tdma, BitVector, ChannelType, TxBurst};
use gsm_saps::{L2Frame, L2Upstream, Primitive, RadioDownstream, TapRecord, TapTag};

use crate::components::block_coder::{sch_coder, CyclicBlockCoder};
use crate::components::convcoder::ConvEncState;
use crate::context::L1Context;
use crate::decoder::ChannelDecoder;
use crate::encoder::{ChannelEncoder, EncoderBase};

struct SchProc {
    u: BitVector,
    e: BitVector,
    burst: TxBurst,
}

/// Synchronisation-channel encoder. Request-driven: the beacon loop above
/// pushes one 4-byte payload per scheduled SCH frame.
pub struct SchEncoder {
    base: EncoderBase,
    coder: CyclicBlockCoder,
    proc: Mutex<SchProc>,
}

impl SchEncoder {
    pub fn new(ctx: L1Context) -> Self {
        let base = EncoderBase::new(ctx, ChannelType::Sch, 0, tdma::sch());

        // Static burst template: the 64-bit extended synchronisation
        // sequence sits between the two e-bit fields (GSM 05.02 5.2.5).
        let mut burst = TxBurst::new();
        burst.bits_mut().as_mut_slice()[SCH_SYNC_RANGE].copy_from_slice(&bitseq::sch_sync);

        SchEncoder {
            base,
            coder: sch_coder(),
            proc: Mutex::new(SchProc {
                u: BitVector::new(39),
                e: BitVector::new(78),
                burst,
            }),
        }
    }

    pub fn base(&self) -> &EncoderBase {
        &self.base
    }

    fn send_frame(&self, frame: &L2Frame) {
        let Some(down) = self.base.downstream_or_warn() else {
            return;
        };
        assert!(frame.len() >= 32, "SCH payload must be 4 bytes");

        self.base.resync();
        self.base.wait_to_send();

        let mut p = self.proc.lock().expect("proc lock");
        let p = &mut *p;

        // Only the first 25 bits of the 4-byte payload are information;
        // octets arrive LSB-first like every d field.
        let mut payload = BitVector::from_bits(frame.bits().segment(0, 32));
        payload.lsb8msb();
        p.u.as_mut_slice()[..25].copy_from_slice(payload.segment(0, 25));

        // Parity and tail (GSM 05.03 4.7).
        {
            let (d, rest) = p.u.as_mut_slice().split_at_mut(25);
            self.coder.write_parity_word(d, &mut rest[..10]);
        }

        // Convolutional code to the 78 e-bits.
        let mut coder = ConvEncState::new();
        coder.encode(p.u.as_slice(), p.e.as_mut_slice());

        p.burst.bits_mut().as_mut_slice()[SCH_E1].copy_from_slice(p.e.segment(0, 39));
        p.burst.bits_mut().as_mut_slice()[SCH_E2].copy_from_slice(p.e.segment(39, 39));
        p.burst.time = self.base.next_write_time();

        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: p.burst.time,
            channel_type: ChannelType::Sch,
            uplink: false,
            burst_like: false,
            payload: p.u.clone(),
            tag: TapTag::Sch,
        });

        down.write_high_side(p.burst.clone());
        self.base.roll_forward();
    }
}

impl ChannelEncoder for SchEncoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sch
    }

    fn timeslot(&self) -> u8 {
        self.base.timeslot()
    }

    fn open(&self) {
        self.base.open_base();
    }

    fn close(&self) {
        self.base.close_base();
    }

    fn active(&self) -> bool {
        self.base.active()
    }

    fn write_high_side(&self, frame: L2Frame) {
        match frame.primitive() {
            Primitive::Data => self.send_frame(&frame),
            other => tracing::warn!("SCH: unexpected {:?} from L2", other),
        }
    }

    fn set_downstream(&self, radio: Arc<dyn RadioDownstream>) {
        self.base.set_downstream(radio);
    }

    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        self.base.set_upstream(upstream);
    }

    fn set_sibling(&self, sibling: Weak<dyn ChannelDecoder>) {
        self.base.set_sibling(sibling);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsm_core::bits::invert;

    /// The e-bits of a sync burst must decode back to the payload through
    /// the inverse pipeline.
    #[test]
    fn test_sch_block_roundtrip() {
        use crate::components::viterbi::GsmViterbiDecoder;

        let coder = sch_coder();
        let mut u = BitVector::new(39);
        for k in 0..25 {
            u.set_bit(k, ((k * 5 + 2) % 3 % 2) as u8);
        }
        {
            let (d, rest) = u.as_mut_slice().split_at_mut(25);
            coder.write_parity_word(d, &mut rest[..10]);
        }
        let mut e = BitVector::new(78);
        let mut enc = ConvEncState::new();
        enc.encode(u.as_slice(), e.as_mut_slice());

        let soft: Vec<f32> = e.as_slice().iter().map(|&b| b as f32).collect();
        let decoded = GsmViterbiDecoder::new().decode(&soft);
        let mut u2 = BitVector::from_bits(&decoded[..39]);
        assert_eq!(u2.segment(0, 25), u.segment(0, 25));

        invert(u2.segment_mut(25, 10));
        assert_eq!(coder.syndrome(u2.segment(0, 35)), 0);
    }
}
