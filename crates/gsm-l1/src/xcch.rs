//! The 4-burst control-channel FEC of GSM 05.03 4.1: 184 payload bits,
//! 40-bit FIRE parity, rate-1/2 convolution to 456 coded bits, 4x114
//! block interleave onto normal bursts with both stealing flags set.
//!
//! BCCH, SDCCH and (with a physical header prepended) SACCH all run this
//! pipeline; FACCH borrows its encode and decode stages.

use std::sync::{Arc, Mutex, Weak};

use gsm_core::bits::{invert, lsb8msb};
use gsm_core::{BitVector, ChannelType, RxBurst, SoftVector, TdmaMapping, Time, TxBurst};
use gsm_saps::{BurstSink, L2Frame, L2Upstream, Primitive, RadioDownstream, TapRecord, TapTag};

use crate::components::block_coder::{fire_coder, CyclicBlockCoder};
use crate::components::convcoder::ConvEncState;
use crate::components::interleave;
use crate::components::viterbi::GsmViterbiDecoder;
use crate::context::L1Context;
use crate::decoder::{ChannelDecoder, DecoderBase};
use crate::encoder::{ChannelEncoder, EncoderBase};

/// GSM 05.03 4.1.2 and 4.1.3: write the FIRE parity of d into u and
/// convolutionally encode the 228-bit u into 456 coded bits.
pub(crate) fn encode_u_to_c(fire: &CyclicBlockCoder, u: &mut BitVector, c: &mut BitVector) {
    let (d, rest) = u.as_mut_slice().split_at_mut(184);
    fire.write_parity_word(d, &mut rest[..40]);
    let mut coder = ConvEncState::new();
    coder.encode(u.as_slice(), c.as_mut_slice());
}

/// The receive inverse: Viterbi c into u, re-invert the parity, check the
/// syndrome. True iff u holds a consistent frame.
pub(crate) fn decode_c_to_u(
    vcoder: &GsmViterbiDecoder,
    fire: &CyclicBlockCoder,
    c: &SoftVector,
    u: &mut BitVector,
) -> bool {
    let bits = vcoder.decode(c.as_slice());
    u.as_mut_slice().copy_from_slice(&bits[..228]);
    // Parity is transmitted inverted.
    invert(u.segment_mut(184, 40));
    fire.syndrome(u.segment(0, 224)) == 0
}

struct XcchEncProc {
    u: BitVector,
    c: BitVector,
    i: [BitVector; 4],
    burst: TxBurst,
}

/// Control-channel encoder. `header_bits` is 0 except on SACCH, where the
/// two-byte physical header precedes the L2 payload in d.
pub struct XcchEncoder {
    base: EncoderBase,
    header_bits: usize,
    coder: CyclicBlockCoder,
    proc: Mutex<XcchEncProc>,
}

impl XcchEncoder {
    pub fn new(ctx: L1Context, chan: ChannelType, tn: u8, mapping: TdmaMapping, header_bits: usize) -> Self {
        let base = EncoderBase::new(ctx, chan, tn, mapping);

        // The training sequence and stealing bits are the same for every
        // burst of the channel: both flags mark control (GSM 05.03 4.2.5).
        let mut burst = TxBurst::new();
        burst.set_hl(true);
        burst.set_hu(true);
        burst.set_training_sequence(base.tsc());

        XcchEncoder {
            base,
            header_bits,
            coder: fire_coder(),
            proc: Mutex::new(XcchEncProc {
                u: BitVector::new(228),
                c: BitVector::new(456),
                i: std::array::from_fn(|_| BitVector::new(114)),
                burst,
            }),
        }
    }

    pub fn base(&self) -> &EncoderBase {
        &self.base
    }

    /// Encode and transmit one frame; the header (if any) was already
    /// written into u[0..header_bits] by the caller.
    pub(crate) fn send_frame(&self, frame: &L2Frame) {
        let Some(down) = self.base.downstream_or_warn() else {
            return;
        };
        assert!(
            frame.len() == 184 - self.header_bits,
            "{:?}: frame is {} bits, expected {}",
            self.base.channel_type(),
            frame.len(),
            184 - self.header_bits
        );

        let mut p = self.proc.lock().expect("proc lock");
        let p = &mut *p;

        // Copy the L2 frame into u behind the physical header (GSM 05.03 4.1.1).
        frame.bits().copy_to_segment(p.u.as_mut_slice(), self.header_bits);

        // Capture before the octet reversal so the tap sees real bits.
        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: self.base.next_write_time(),
            channel_type: self.base.channel_type(),
            uplink: false,
            burst_like: false,
            payload: BitVector::from_bits(p.u.segment(0, 184)),
            tag: TapTag::Frame,
        });

        // d is octet-wise LSB-first on the air (GSM 05.03 2.2).
        lsb8msb(p.u.segment_mut(0, 184));
        encode_u_to_c(&self.coder, &mut p.u, &mut p.c);
        interleave::interleave(&p.c, &mut p.i, 0);
        tracing::trace!("{:?} TN{}: c[]={:?}", self.base.channel_type(), self.base.timeslot(), p.c);

        // Map the interleaved bits onto four bursts (GSM 05.03 4.1.5).
        self.base.wait_to_send();
        for b in 0..4 {
            p.burst.time = self.base.next_write_time();
            p.burst.data1_mut().copy_from_slice(p.i[b].segment(0, 57));
            p.burst.data2_mut().copy_from_slice(p.i[b].segment(57, 57));
            down.write_high_side(p.burst.clone());
            self.base.roll_forward();
        }
    }

    /// Write a SACCH physical header into u ahead of the payload.
    pub(crate) fn set_header(&self, value: u64) {
        assert!(self.header_bits > 0);
        let mut p = self.proc.lock().expect("proc lock");
        p.u.fill_field(0, value, self.header_bits);
    }

    pub(crate) fn dispatch_primitive(&self, frame: L2Frame, send: impl FnOnce(&L2Frame)) {
        match frame.primitive() {
            Primitive::Data => {
                if !self.base.active() {
                    tracing::info!("{:?} TN{}: sending on non-active channel", self.base.channel_type(), self.base.timeslot());
                }
                self.base.resync();
                send(&frame);
            }
            Primitive::Establish => {
                // Open both sides of the link; the phone is waiting to see
                // the idle pattern.
                self.base.open_base();
                if let Some(sib) = self.base.sibling() {
                    sib.open();
                }
            }
            Primitive::Release => {
                // Normally we get here after a DISC-DM handshake in L2.
                // Close both sides, knowing that the phone does the same.
                self.base.close_base();
                if let Some(sib) = self.base.sibling() {
                    sib.close();
                }
            }
            Primitive::Error => {
                // The link failed in L2 after several ack timeouts. Close
                // the tx side and let the receiver L1 time out on its own;
                // otherwise we risk recycling the channel while the
                // phone's still active.
                self.base.close_base();
            }
        }
    }
}

impl ChannelEncoder for XcchEncoder {
    fn channel_type(&self) -> ChannelType {
        self.base.channel_type()
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
        tracing::debug!("{:?} TN{}: write_high_side {:?}", self.channel_type(), self.timeslot(), frame);
        self.dispatch_primitive(frame, |f| self.send_frame(f));
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

pub(crate) struct XcchDecProc {
    pub i: [SoftVector; 4],
    pub c: SoftVector,
    pub u: BitVector,
    pub read_time: Time,
}

/// Control-channel decoder, the symmetric inverse of [`XcchEncoder`].
pub struct XcchDecoder {
    base: DecoderBase,
    header_bits: usize,
    coder: CyclicBlockCoder,
    vcoder: GsmViterbiDecoder,
    pub(crate) proc: Mutex<XcchDecProc>,
}

impl XcchDecoder {
    pub fn new(ctx: L1Context, chan: ChannelType, tn: u8, mapping: TdmaMapping, header_bits: usize) -> Self {
        XcchDecoder {
            base: DecoderBase::new(ctx, chan, tn, mapping),
            header_bits,
            coder: fire_coder(),
            vcoder: GsmViterbiDecoder::new(),
            proc: Mutex::new(XcchDecProc {
                i: std::array::from_fn(|_| SoftVector::new(114)),
                c: SoftVector::new(456),
                u: BitVector::new(228),
                read_time: Time::default(),
            }),
        }
    }

    pub fn base(&self) -> &DecoderBase {
        &self.base
    }

    /// Accept a burst into the deinterleaving buffer; true when the B=3
    /// burst has arrived and the frame is ready to deinterleave.
    pub(crate) fn process_burst(&self, p: &mut XcchDecProc, burst: &RxBurst) -> bool {
        self.base.record_phy(burst.rssi, burst.timing_error);

        // The reverse index runs 0..3 as the bursts arrive; a negative
        // value means the demux is misconfigured, which is fatal.
        let b = self.base.mapping().reverse_mapping(burst.time.f);
        assert!(
            b >= 0,
            "{:?} TN{}: demux misconfigured, FN {} does not belong to this channel",
            self.base.channel_type(),
            self.base.timeslot(),
            burst.time.f
        );
        let b = (b % 4) as usize;

        // Pull the e-bits out of the burst into i[B] (GSM 05.03 4.1.5).
        p.i[b].segment_mut(0, 57).copy_from_slice(burst.data1());
        p.i[b].segment_mut(57, 57).copy_from_slice(burst.data2());

        // The B=0 burst's time is the frame's canonical receive time.
        if b == 0 {
            p.read_time = burst.time;
        }
        b == 3
    }

    pub(crate) fn deinterleave(&self, p: &mut XcchDecProc) {
        interleave::deinterleave(&mut p.i, &mut p.c, 0);
    }

    pub(crate) fn decode(&self, p: &mut XcchDecProc) -> bool {
        decode_c_to_u(&self.vcoder, &self.coder, &p.c, &mut p.u)
    }

    /// Deliver a good frame upstream. `sacch_phy` carries the decoded
    /// physical header values on SACCH.
    pub(crate) fn handle_good_frame(&self, p: &mut XcchDecProc, sacch_phy: Option<(i32, i32)>) {
        self.base.good_frame_timers();

        let Some(up) = self.base.upstream() else {
            tracing::error!("{:?} TN{}: no upstream connected", self.base.channel_type(), self.base.timeslot());
            return;
        };

        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: p.read_time,
            channel_type: self.base.channel_type(),
            uplink: true,
            burst_like: false,
            payload: BitVector::from_bits(p.u.segment(0, 184)),
            tag: TapTag::Frame,
        });

        let l2 = BitVector::from_bits(p.u.segment(self.header_bits, 184 - self.header_bits));
        let frame = L2Frame::new(l2, Primitive::Data);
        let rssi = self.base.rssi();
        let ta = self.base.ta();
        let fer = self.base.fer();
        match sacch_phy {
            Some((power, timing)) => up.write_low_side_sacch(frame, p.read_time, rssi, ta, fer, power, timing),
            None => up.write_low_side(frame, p.read_time, rssi, ta, fer),
        }
    }

    pub(crate) fn run_pipeline(&self, burst: &RxBurst, sacch_phy: impl FnOnce(&BitVector) -> Option<(i32, i32)>) {
        let mut p = self.proc.lock().expect("proc lock");
        let p = &mut *p;
        if !self.process_burst(p, burst) {
            return;
        }
        self.deinterleave(p);
        if self.decode(p) {
            self.base.count_good_frame();
            // Undo GSM's LSB-first octet encoding of the payload.
            lsb8msb(p.u.segment_mut(0, 184));
            let phy = sacch_phy(&p.u);
            self.handle_good_frame(p, phy);
        } else {
            self.base.count_bad_frame();
        }
    }
}

impl ChannelDecoder for XcchDecoder {
    fn channel_type(&self) -> ChannelType {
        self.base.channel_type()
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

    fn recyclable(&self) -> bool {
        self.base.recyclable()
    }

    fn write_low_side(&self, burst: &RxBurst) {
        tracing::trace!("{:?} TN{}: {:?}", BurstSink::channel_type(self), BurstSink::timeslot(self), burst);
        if !self.active() {
            tracing::debug!("{:?} TN{}: not active, ignoring input", BurstSink::channel_type(self), BurstSink::timeslot(self));
            return;
        }
        self.run_pipeline(burst, |_| None);
    }

    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        self.base.set_upstream(upstream);
    }

    fn set_sibling(&self, sibling: Weak<dyn ChannelEncoder>) {
        self.base.set_sibling(sibling);
    }

    fn fer(&self) -> f32 {
        self.base.fer()
    }

    fn rssi(&self) -> f32 {
        self.base.rssi()
    }

    fn timing_error(&self) -> f32 {
        self.base.timing_error()
    }
}

impl BurstSink for XcchDecoder {
    fn timeslot(&self) -> u8 {
        self.base.timeslot()
    }

    fn channel_type(&self) -> ChannelType {
        self.base.channel_type()
    }

    fn write_low_side(&self, burst: &RxBurst) {
        ChannelDecoder::write_low_side(self, burst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode u->c and decode back through the soft pipeline stages.
    #[test]
    fn test_u_c_roundtrip() {
        let fire = fire_coder();
        let vcoder = GsmViterbiDecoder::new();

        let mut u = BitVector::new(228);
        for k in 0..184 {
            u.set_bit(k, ((k * 29 + 11) % 7 % 2) as u8);
        }
        let mut c = BitVector::new(456);
        encode_u_to_c(&fire, &mut u, &mut c);

        let soft = SoftVector::from_bits(&c);
        let mut u2 = BitVector::new(228);
        assert!(decode_c_to_u(&vcoder, &fire, &soft, &mut u2));
        // The parity segment was re-inverted on decode; compare d and tail.
        assert_eq!(u2.segment(0, 184), u.segment(0, 184));
        assert_eq!(u2.segment(224, 4), &[0u8; 4]);
    }

    #[test]
    fn test_corrupt_frame_fails_syndrome() {
        let fire = fire_coder();
        let vcoder = GsmViterbiDecoder::new();

        let mut u = BitVector::new(228);
        for k in 0..184 {
            u.set_bit(k, ((k * 3 + 1) % 5 % 2) as u8);
        }
        let mut c = BitVector::new(456);
        encode_u_to_c(&fire, &mut u, &mut c);

        // Hard-corrupt enough coded bits that Viterbi converges on a
        // different u; the FIRE syndrome must catch it.
        let mut soft = SoftVector::from_bits(&c);
        for k in (100..200).step_by(2) {
            let v = soft.get(k);
            soft.set(k, 1.0 - v);
        }
        let mut u2 = BitVector::new(228);
        assert!(!decode_c_to_u(&vcoder, &fire, &soft, &mut u2));
    }
}
