//! FCCH generator: the frequency-correction bursts are all-zero e-bits,
//! from which the modulator produces the pure tone (GSM 05.02 5.2.4).

use std::sync::{Arc, OnceLock, Weak};

use gsm_core::{tdma, ChannelType, TxBurst};
use gsm_saps::{L2Frame, L2Upstream, RadioDownstream, TapRecord, TapTag};

use crate::context::L1Context;
use crate::decoder::ChannelDecoder;
use crate::encoder::{ChannelEncoder, EncoderBase};

/// Free-running FCCH encoder: a generator thread emits the zeroed burst
/// at every scheduled frame while the channel is active.
pub struct FcchEncoder {
    base: EncoderBase,
    burst: TxBurst,
    self_ref: OnceLock<Weak<FcchEncoder>>,
}

impl FcchEncoder {
    pub fn new(ctx: L1Context) -> Arc<Self> {
        let mut base = EncoderBase::new(ctx, ChannelType::Fcch, 0, tdma::fcch());
        // The idle pattern of the FCCH is the tone itself.
        let mut filler = TxBurst::new();
        filler.zero();
        base.set_filler(filler);

        let mut burst = TxBurst::new();
        burst.zero();

        let enc = Arc::new(FcchEncoder {
            base,
            burst,
            self_ref: OnceLock::new(),
        });
        let _ = enc.self_ref.set(Arc::downgrade(&enc));
        enc
    }

    pub fn base(&self) -> &EncoderBase {
        &self.base
    }

    fn service_loop(&self) {
        while self.base.running() {
            if self.base.active() {
                self.base.resync();
                self.base.wait_to_send();
                self.generate();
            } else {
                self.base.sleep_multiframe();
            }
        }
        tracing::debug!("FCCH: generator thread exit");
    }

    fn generate(&self) {
        let Some(down) = self.base.downstream_or_warn() else {
            self.base.sleep_multiframe();
            return;
        };
        let mut burst = self.burst.clone();
        burst.time = self.base.next_write_time();
        tracing::trace!("FCCH: burst at {}", burst.time);

        self.base.write_tap(TapRecord {
            arfcn: self.base.arfcn(),
            time: burst.time,
            channel_type: ChannelType::Fcch,
            uplink: false,
            burst_like: true,
            payload: burst.bits().clone(),
            tag: TapTag::Fcch,
        });

        down.write_high_side(burst);
        self.base.roll_forward();
    }
}

impl ChannelEncoder for FcchEncoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Fcch
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
            std::thread::Builder::new()
                .name("fcch-generator".into())
                .spawn(move || me.service_loop())
                .expect("cannot spawn FCCH generator thread");
        }
    }

    fn close(&self) {
        self.base.close_base();
    }

    fn active(&self) -> bool {
        self.base.active()
    }

    /// The FCCH is a pure generator; it accepts no frames from above.
    fn write_high_side(&self, frame: L2Frame) {
        tracing::warn!("FCCH: unexpected {:?} from L2", frame.primitive());
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

    fn stop(&self) {
        self.base.stop();
    }
}
