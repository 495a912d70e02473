//! TCH/FS with FACCH stealing (GSM 05.03 3.1 and 4.2).
//!
//! Speech frames get unequal error protection: the 50 class-1a bits carry
//! a CRC-3, the 182 class-1 bits are convolutionally coded, the 78
//! class-2 bits ride uncoded. Blocks interleave diagonally over eight
//! bursts with an alternating phase, and a FACCH frame may steal a block
//! from the speech stream, flagged through the stealing bits.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use crossbeam_channel::{unbounded, Receiver, Sender};
use gsm_core::bits::lsb8msb;
use gsm_core::{BitVector, ChannelType, RxBurst, SoftVector, TdmaMapping, Time, TxBurst};
use gsm_saps::{BurstSink, L2Frame, L2Upstream, Primitive, RadioDownstream, TapRecord, TapTag};

use crate::components::block_coder::{fire_coder, tch_coder, CyclicBlockCoder};
use crate::components::convcoder::ConvEncState;
use crate::components::g610::{VocoderFrame, G610_BIT_ORDER};
use crate::components::interleave;
use crate::components::viterbi::GsmViterbiDecoder;
use crate::context::L1Context;
use crate::decoder::{ChannelDecoder, DecoderBase};
use crate::encoder::{ChannelEncoder, EncoderBase};
use crate::xcch::{decode_c_to_u, encode_u_to_c};

/// Idle filler c[] pattern, captured from a reference handset.
const FILLER_C: &str = "110100001000111100000000111001111101011100111101001111000000000000110111101111111110100110101010101010101010101010101010101010101010010000110000000000000000000000000000000000000000001101001111000000000000000000000000000000000000000000000000111010011010101010101010101010101010101010101010101001000011000000000000000000110100111100000000111001111101101000001100001101001111000000000000000000011001100000000000000000000000000000000000000000000000000000000001";

struct TchEncProc {
    u: BitVector,
    c: BitVector,
    tchu: BitVector,
    tchd: BitVector,
    i: [BitVector; 8],
    burst: TxBurst,
    /// Diagonal interleaver phase, alternating 0 and 4.
    offset: usize,
    previous_facch: bool,
}

/// TCH/F downlink with FACCH stealing. A dispatch thread drives the burst
/// schedule, choosing per block between a queued FACCH frame, the oldest
/// speech frame and the canned filler.
pub struct TchFacchEncoder {
    base: EncoderBase,
    fire: CyclicBlockCoder,
    tch_parity: CyclicBlockCoder,
    filler_c: BitVector,
    speech_q: (Sender<VocoderFrame>, Receiver<VocoderFrame>),
    facch_q: (Sender<L2Frame>, Receiver<L2Frame>),
    proc: Mutex<TchEncProc>,
    self_ref: OnceLock<Weak<TchFacchEncoder>>,
}

impl TchFacchEncoder {
    pub fn new(ctx: L1Context, tn: u8, mapping: TdmaMapping) -> Arc<Self> {
        let base = EncoderBase::new(ctx, ChannelType::TchF, tn, mapping);

        let mut burst = TxBurst::new();
        burst.set_training_sequence(base.tsc());

        let enc = Arc::new(TchFacchEncoder {
            base,
            fire: fire_coder(),
            tch_parity: tch_coder(),
            filler_c: BitVector::from_bitstr(FILLER_C),
            speech_q: unbounded(),
            facch_q: unbounded(),
            proc: Mutex::new(TchEncProc {
                u: BitVector::new(228),
                c: BitVector::new(456),
                tchu: BitVector::new(189),
                tchd: BitVector::new(260),
                i: std::array::from_fn(|_| BitVector::new(114)),
                burst,
                offset: 0,
                previous_facch: false,
            }),
            self_ref: OnceLock::new(),
        });
        let _ = enc.self_ref.set(Arc::downgrade(&enc));
        enc
    }

    pub fn base(&self) -> &EncoderBase {
        &self.base
    }

    /// Number of speech frames waiting in the queue.
    pub fn speech_backlog(&self) -> usize {
        self.speech_q.1.len()
    }

    /// Encode a speech frame into c[] (GSM 05.03 3.1.2).
    fn encode_tch(&self, p: &mut TchEncProc, vframe: &VocoderFrame) {
        let TchEncProc { c, tchu, tchd, .. } = p;

        // Reorder bits by importance (GSM 05.03 3.1 and Table 2).
        vframe.payload().map(&G610_BIT_ORDER, tchd);

        // 3.1.1.1 -- CRC-3 over class 1a into u[91..94]
        self.tch_parity
            .write_parity_word(tchd.segment(0, 50), tchu.segment_mut(91, 3));

        // 3.1.2.1 -- class 1 reordering d[] to u[]
        for k in 0..=90 {
            tchu.set_bit(k, tchd.bit(2 * k));
            tchu.set_bit(184 - k, tchd.bit(2 * k + 1));
        }

        // 3.1.2.1 -- tail bits
        for k in 185..189 {
            tchu.set_bit(k, 0);
        }

        // 3.1.2.2 -- convolutional code over class 1
        let mut coder = ConvEncState::new();
        coder.encode(tchu.as_slice(), c.segment_mut(0, 378));

        // 3.1.2.2 -- class 2 rides uncoded
        c.segment_mut(378, 78).copy_from_slice(tchd.segment(182, 78));
    }

    /// One 4-burst block: pick FACCH, speech or filler, interleave with
    /// the current phase and emit with the stealing flags.
    fn dispatch(&self) {
        let Some(down) = self.base.downstream_or_warn() else {
            self.base.sleep_multiframe();
            return;
        };

        // Get right with the system clock.
        self.base.resync();

        // TCH/FACCH must feed the interleaver on time even when nothing is
        // flowing; an inactive channel just burns a multiframe.
        if !self.base.active() {
            self.base.idle_wait_multiframe();
            return;
        }

        self.base.resync();
        self.base.wait_to_send();

        // Speech latency control.
        let max_q = self.base.ctx().config.config().max_speech_latency;
        while self.speech_q.1.len() > max_q {
            let _ = self.speech_q.1.try_recv();
        }

        let mut current_facch = false;
        let mut p = self.proc.lock().expect("proc lock");
        let p = &mut *p;

        // Send, by priority: (1) FACCH, (2) TCH, (3) filler.
        if let Ok(frame) = self.facch_q.1.try_recv() {
            current_facch = true;
            tracing::debug!("TCH TN{}: stealing block for FACCH", self.base.timeslot());
            assert!(frame.len() == 184, "FACCH frame must be 184 bits");
            frame.bits().copy_to_segment(p.u.as_mut_slice(), 0);
            lsb8msb(p.u.segment_mut(0, 184));
            encode_u_to_c(&self.fire, &mut p.u, &mut p.c);
            // Flush the vocoder FIFO to limit latency.
            while self.speech_q.1.try_recv().is_ok() {}
        } else if let Ok(vframe) = self.speech_q.1.try_recv() {
            self.encode_tch(p, &vframe);
        } else {
            // No ready data, but the interleaver must be fed something.
            p.c = self.filler_c.clone();
        }

        interleave::interleave(&p.c, &mut p.i, p.offset);

        // Map onto four bursts, marking the stealing flags (GSM 05.03 4.2.5).
        let TchEncProc { i, burst, offset, previous_facch, .. } = p;
        for b in 0..4 {
            burst.time = self.base.next_write_time();
            let blk = &i[b + *offset];
            burst.data1_mut().copy_from_slice(blk.segment(0, 57));
            burst.data2_mut().copy_from_slice(blk.segment(57, 57));
            burst.set_hu(current_facch);
            burst.set_hl(*previous_facch);

            self.base.write_tap(TapRecord {
                arfcn: self.base.arfcn(),
                time: burst.time,
                channel_type: ChannelType::TchF,
                uplink: false,
                burst_like: true,
                payload: burst.bits().clone(),
                tag: TapTag::Frame,
            });

            down.write_high_side(burst.clone());
            self.base.roll_forward();
        }

        // Flip the diagonal phase and remember the stealing flag.
        *offset = if *offset == 0 { 4 } else { 0 };
        *previous_facch = current_facch;
    }
}

impl ChannelEncoder for TchFacchEncoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::TchF
    }

    fn timeslot(&self) -> u8 {
        self.base.timeslot()
    }

    fn open(&self) {
        let needs_start = self.base.open_base();
        if needs_start {
            let me = self
                .self_ref
                .get()
                .and_then(|w| w.upgrade())
                .expect("encoder constructed without Arc");
            let tn = self.base.timeslot();
            std::thread::Builder::new()
                .name(format!("tch-dispatch-{}", tn))
                .spawn(move || {
                    tracing::debug!("TCH TN{}: dispatch thread running", tn);
                    while me.base.running() {
                        me.dispatch();
                    }
                    tracing::debug!("TCH TN{}: dispatch thread exit", tn);
                })
                .expect("cannot spawn dispatch thread");
        }
    }

    fn close(&self) {
        self.base.close_base();
    }

    fn active(&self) -> bool {
        self.base.active()
    }

    fn write_high_side(&self, frame: L2Frame) {
        match frame.primitive() {
            Primitive::Data => {
                // FACCH frames queue for the dispatcher to steal a block.
                self.base.resync();
                let _ = self.facch_q.0.send(frame);
            }
            Primitive::Establish => {
                self.open();
                if let Some(sib) = self.base.sibling() {
                    sib.open();
                }
            }
            Primitive::Release => {
                self.close();
                if let Some(sib) = self.base.sibling() {
                    sib.close();
                }
            }
            Primitive::Error => {
                self.close();
            }
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

    fn write_speech_frame(&self, frame: [u8; 33]) {
        let _ = self.speech_q.0.send(VocoderFrame::from_bytes(frame));
    }

    fn stop(&self) {
        self.base.stop();
    }
}

struct TchDecProc {
    i: [SoftVector; 8],
    c: SoftVector,
    u: BitVector,
    tchu: BitVector,
    tchd: BitVector,
    read_time: Time,
    prev_good_frame: [u8; 33],
}

/// TCH/F uplink: diagonal deinterleave, speech decode with GSM 06.11
/// bad-frame substitution, FACCH extraction on stolen blocks.
pub struct TchFacchDecoder {
    base: DecoderBase,
    fire: CyclicBlockCoder,
    tch_parity: CyclicBlockCoder,
    vcoder: GsmViterbiDecoder,
    proc: Mutex<TchDecProc>,
}

impl TchFacchDecoder {
    pub fn new(ctx: L1Context, tn: u8, mapping: TdmaMapping) -> Self {
        TchFacchDecoder {
            base: DecoderBase::new(ctx, ChannelType::TchF, tn, mapping),
            fire: fire_coder(),
            tch_parity: tch_coder(),
            vcoder: GsmViterbiDecoder::new(),
            proc: Mutex::new(TchDecProc {
                i: std::array::from_fn(|_| SoftVector::new(114)),
                c: SoftVector::new(456),
                u: BitVector::new(228),
                tchu: BitVector::new(189),
                tchd: BitVector::new(260),
                read_time: Time::default(),
                prev_good_frame: VocoderFrame::default().to_bytes(),
            }),
        }
    }

    pub fn base(&self) -> &DecoderBase {
        &self.base
    }

    fn process_burst(&self, p: &mut TchDecProc, burst: &RxBurst) {
        self.base.record_phy(burst.rssi, burst.timing_error);

        // The reverse index runs 0..7 as the bursts arrive (the "B" index
        // of GSM 05.03 3.1.3); a negative value means the demux is
        // misconfigured, which is fatal.
        let b = self.base.mapping().reverse_mapping(burst.time.f);
        assert!(
            b >= 0,
            "TCH TN{}: demux misconfigured, FN {} does not belong to this channel",
            self.base.timeslot(),
            burst.time.f
        );
        let b = (b % 8) as usize;

        p.i[b].segment_mut(0, 57).copy_from_slice(burst.data1());
        p.i[b].segment_mut(57, 57).copy_from_slice(burst.data2());

        // Stamp each 4-burst block with the time of its first burst.
        if b % 4 == 0 {
            p.read_time = burst.time;
        }

        // Every 4th burst completes a block.
        if b % 4 != 3 {
            return;
        }

        // Deinterleave according to the diagonal phase of B
        // (GSM 05.03 3.1.3).
        let block_offset = if b == 3 { 4 } else { 0 };
        interleave::deinterleave(&mut p.i, &mut p.c, block_offset);

        // Was this the end of a stolen frame? (GSM 05.03 4.2.5)
        let stolen = burst.hl();
        if stolen {
            if decode_c_to_u(&self.vcoder, &self.fire, &p.c, &mut p.u) {
                tracing::debug!("TCH TN{}: good FACCH frame", self.base.timeslot());
                self.base.count_good_frame();
                lsb8msb(p.u.segment_mut(0, 184));
                self.handle_good_facch(p);
            } else {
                tracing::debug!("TCH TN{}: bad FACCH frame", self.base.timeslot());
                self.base.count_bad_frame();
            }
        }

        // Always feed the traffic channel, even on a stolen frame;
        // decode_tch supplies the GSM 06.11 substitute as needed.
        if self.decode_tch(p, stolen) {
            self.base.count_good_frame();
            self.base.keep_alive();
        } else {
            self.base.count_bad_frame();
        }
    }

    fn handle_good_facch(&self, p: &mut TchDecProc) {
        self.base.good_frame_timers();
        let Some(up) = self.base.upstream() else {
            tracing::error!("TCH TN{}: no upstream connected", self.base.timeslot());
            return;
        };
        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: p.read_time,
            channel_type: ChannelType::TchF,
            uplink: true,
            burst_like: false,
            payload: BitVector::from_bits(p.u.segment(0, 184)),
            tag: TapTag::Frame,
        });
        let frame = L2Frame::new(BitVector::from_bits(p.u.segment(0, 184)), Primitive::Data);
        up.write_low_side(frame, p.read_time, self.base.rssi(), self.base.ta(), self.base.fer());
    }

    /// Decode the traffic block (GSM 05.03 3.1.2, backwards). Returns true
    /// on a parity-clean speech frame. The upstream always receives a
    /// frame: the decoded one, or the previous good frame attenuated and
    /// grid-randomised per GSM 06.11.
    fn decode_tch(&self, p: &mut TchDecProc, stolen: bool) -> bool {
        let mut good = !stolen;
        let mut new_frame = p.prev_good_frame;

        if !stolen {
            let TchDecProc { c, tchu, tchd, .. } = &mut *p;

            // 3.1.2.2 -- class 1 from c[0..378]
            let bits = self.vcoder.decode(c.segment(0, 378));
            tchu.as_mut_slice().copy_from_slice(&bits[..189]);

            // 3.1.2.2 -- class 2 hard-sliced from c[378..456]
            for k in 0..78 {
                tchd.set_bit(182 + k, if c.get(378 + k) > 0.5 { 1 } else { 0 });
            }

            // 3.1.2.1 -- class 1 u[] back to d[]
            for k in 0..=90 {
                tchd.set_bit(2 * k, tchu.bit(k));
                tchd.set_bit(2 * k + 1, tchu.bit(184 - k));
            }

            // 3.1.2.1 -- class 1a parity, 3.1.2.2 -- tail check
            let sent_parity = !tchu.peek_field(91, 3) & 0x07;
            let calc_parity = self.tch_parity.parity_word(tchd.segment(0, 50)) & 0x07;
            let tail = tchu.peek_field(185, 4);
            good = sent_parity == calc_parity && tail == 0;

            if good {
                // Undo the importance-sorted bit ordering (GSM 05.03 Table 2).
                let mut payload = BitVector::new(260);
                tchd.unmap(&G610_BIT_ORDER, &mut payload);
                new_frame = VocoderFrame::from_payload(&payload).to_bytes();
                p.prev_good_frame = new_frame;
            }
        }

        if !good {
            // Bad frame processing, GSM 06.11: attenuate the block
            // amplitudes and randomise the grid positions.
            let raw = p.prev_good_frame[27];
            let mut xmaxc = raw & 0x1f;
            xmaxc = if xmaxc > 2 { xmaxc - 2 } else { 0 };
            for i in 0..4 {
                let pos: u8 = rand::random_range(0..4);
                p.prev_good_frame[6 + 7 * i] = (raw & 0x80) | pos | xmaxc;
                p.prev_good_frame[7 + 7 * i] &= 0x7f;
            }
            new_frame = p.prev_good_frame;
        }

        if let Some(up) = self.base.upstream() {
            if good {
                self.base.write_tap(TapRecord {
                    arfcn: self.base.arfcn(),
                    time: p.read_time,
                    channel_type: ChannelType::TchF,
                    uplink: true,
                    burst_like: false,
                    payload: BitVector::from_bytes(&new_frame),
                    tag: TapTag::Frame,
                });
            }
            up.write_low_side_tch(new_frame, p.read_time, self.base.rssi(), self.base.ta(), self.base.fer());
        }

        good
    }
}

impl ChannelDecoder for TchFacchDecoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::TchF
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
        if !self.active() {
            tracing::trace!("TCH TN{}: not active, ignoring input", BurstSink::timeslot(self));
            return;
        }
        let mut p = self.proc.lock().expect("proc lock");
        self.process_burst(&mut p, burst);
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

    fn uplink_lost(&self) -> bool {
        self.base.uplink_lost()
    }
}

impl BurstSink for TchFacchDecoder {
    fn timeslot(&self) -> u8 {
        self.base.timeslot()
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::TchF
    }

    fn write_low_side(&self, burst: &RxBurst) {
        ChannelDecoder::write_low_side(self, burst);
    }
}
