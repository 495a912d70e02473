//! RACH detector (GSM 05.03 4.6): single access bursts carrying an 8-bit
//! payload whose 6-bit parity is XOR-masked with the BSIC.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use gsm_core::bits::lsb8msb;
use gsm_core::{BitVector, ChannelType, RxBurst, TdmaMapping};
use gsm_saps::{BurstSink, L2Frame, L2Upstream, Primitive, TapRecord, TapTag};

use crate::components::block_coder::{rach_coder, CyclicBlockCoder};
use crate::components::viterbi::GsmViterbiDecoder;
use crate::context::L1Context;
use crate::decoder::{ChannelDecoder, DecoderBase};
use crate::encoder::ChannelEncoder;

/// Bound on bursts parked between the radio thread and the service loop.
const RACH_QUEUE_DEPTH: usize = 64;

/// Access-burst decoder. The radio's receive thread only enqueues; a
/// service thread runs the actual detection so a blocking channel
/// allocator upstream can never stall the receive path.
pub struct RachDecoder {
    base: DecoderBase,
    coder: CyclicBlockCoder,
    vcoder: GsmViterbiDecoder,
    queue: (Sender<RxBurst>, Receiver<RxBurst>),
    self_ref: OnceLock<Weak<RachDecoder>>,
}

impl RachDecoder {
    pub fn new(ctx: L1Context, mapping: TdmaMapping) -> Arc<Self> {
        let dec = Arc::new(RachDecoder {
            base: DecoderBase::new(ctx, ChannelType::Rach, 0, mapping),
            coder: rach_coder(),
            vcoder: GsmViterbiDecoder::new(),
            queue: bounded(RACH_QUEUE_DEPTH),
            self_ref: OnceLock::new(),
        });
        let _ = dec.self_ref.set(Arc::downgrade(&dec));
        dec
    }

    pub fn base(&self) -> &DecoderBase {
        &self.base
    }

    /// The service loop pulls bursts from the FIFO and runs detection.
    fn service_loop(&self) {
        while self.base.running() {
            let Ok(burst) = self.queue.1.recv_timeout(Duration::from_millis(100)) else {
                continue;
            };
            if self.base.active_flag() {
                self.detect(&burst);
            }
        }
        tracing::debug!("RACH: service thread exit");
    }

    fn detect(&self, burst: &RxBurst) {
        // Decode the 36 coded bits of the access burst into the 18-bit u:
        // 8 data, 6 parity, 4 tail.
        let e = burst.segment(49, 36);
        let bits = self.vcoder.decode(e);
        let mut u = BitVector::from_bits(&bits[..18]);

        // Tail bits must be zero; with the parity this puts the false
        // alarm rate for random noise at 1/1024.
        if u.peek_field(14, 4) != 0 {
            self.base.count_bad_frame();
            return;
        }

        // The parity word travels inverted and XOR'd with the BSIC
        // (GSM 05.03 4.6).
        let sent_parity = !u.peek_field(8, 6) & 0x3f;
        let check_parity = self.coder.parity_word(u.segment(0, 8)) & 0x3f;
        let encoded_bsic = (sent_parity ^ check_parity) & 0x3f;
        if encoded_bsic as u8 != self.base.ctx().bsic() {
            self.base.count_bad_frame();
            return;
        }

        // A valid access burst. The payload is the 8-bit RA field of
        // GSM 04.08 9.1.8; the RACH L2 is so thin that the RA, receive
        // time and physical measurements go straight to the upper layer.
        self.base.count_good_frame();
        lsb8msb(u.segment_mut(0, 8));
        let ra = u.peek_field(0, 8);

        let initial_ta = ((burst.timing_error + 0.5).floor() as i32).clamp(0, 63);

        tracing::info!(
            "RACH rx: RA={} time={} RSSI={:.1} timingError={:.2} TA={}",
            ra,
            burst.time,
            burst.rssi,
            burst.timing_error,
            initial_ta
        );

        let d = BitVector::from_bits(u.segment(0, 8));
        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: burst.time,
            channel_type: ChannelType::Rach,
            uplink: true,
            burst_like: true,
            payload: d.clone(),
            tag: TapTag::Access,
        });

        let Some(up) = self.base.upstream() else {
            tracing::error!("RACH with no upstream connected");
            return;
        };
        up.write_low_side(
            L2Frame::new(d, Primitive::Data),
            burst.time,
            burst.rssi,
            initial_ta,
            self.base.fer(),
        );
    }
}

impl ChannelDecoder for RachDecoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Rach
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
                .expect("decoder constructed without Arc");
            std::thread::Builder::new()
                .name("rach-service".into())
                .spawn(move || me.service_loop())
                .expect("cannot spawn RACH service thread");
        }
    }

    fn close(&self) {
        self.base.close_base();
    }

    fn active(&self) -> bool {
        self.base.active_flag()
    }

    /// A common channel is never recycled.
    fn recyclable(&self) -> bool {
        false
    }

    /// Called on the radio receive thread: enqueue only. A full queue
    /// drops the burst; RACH retries are the mobile's problem.
    fn write_low_side(&self, burst: &RxBurst) {
        if self.queue.0.try_send(burst.clone()).is_err() {
            tracing::debug!("RACH: queue full, dropping burst at {}", burst.time);
        }
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

    fn stop(&self) {
        self.base.stop();
    }
}

impl BurstSink for RachDecoder {
    fn timeslot(&self) -> u8 {
        self.base.timeslot()
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Rach
    }

    fn write_low_side(&self, burst: &RxBurst) {
        ChannelDecoder::write_low_side(self, burst);
    }
}
