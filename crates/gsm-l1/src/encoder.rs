use std::sync::{Arc, Mutex, OnceLock, Weak};

use gsm_core::gsm_time::frames_to_duration;
use gsm_core::{ChannelType, TdmaMapping, Time, TxBurst};
use gsm_saps::{L2Frame, L2Upstream, PacketTap, RadioDownstream, TapRecord};

use crate::context::L1Context;
use crate::decoder::ChannelDecoder;

/// Drift bound for the encoder clock: one 51x26 traffic multiframe.
const MAX_CLOCK_DRIFT_FRAMES: i32 = 51 * 26;

/// The downlink side of a logical channel.
pub trait ChannelEncoder: Send + Sync {
    fn channel_type(&self) -> ChannelType;
    fn timeslot(&self) -> u8;

    /// Start service: zero the burst counter, mark active, resync the clock.
    fn open(&self);
    /// Stop service and emit one idle-fill multiframe.
    fn close(&self);
    /// Open and the sibling decoder (if any) not recyclable.
    fn active(&self) -> bool;

    /// Frame entry point from L2, switched by primitive.
    fn write_high_side(&self, frame: L2Frame);

    fn set_downstream(&self, radio: Arc<dyn RadioDownstream>);
    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>);
    fn set_sibling(&self, sibling: Weak<dyn ChannelDecoder>);

    /// Traffic channels accept 33-byte vocoder frames; everything else drops.
    fn write_speech_frame(&self, frame: [u8; 33]) {
        let _ = frame;
        tracing::warn!("write_speech_frame on a non-traffic channel");
    }

    /// Shut down any service thread for process exit; a no-op elsewhere.
    fn stop(&self) {}
}

struct EncoderFlags {
    running: bool,
    active: bool,
}

struct EncoderTiming {
    total_bursts: u64,
    prev_write_time: Time,
    next_write_time: Time,
    warned_no_downstream: bool,
}

/// State and operations common to every encoder: the transmit schedule
/// derived from the channel's TDMA mapping, the lifecycle flags and the
/// links to radio, L2 and the sibling decoder.
///
/// The flags mutex guards only `running`/`active`; the timing state is
/// driven by the single thread that owns the channel's data path.
pub struct EncoderBase {
    ctx: L1Context,
    chan: ChannelType,
    mapping: TdmaMapping,
    tn: u8,
    tsc: u8,
    filler: TxBurst,
    flags: Mutex<EncoderFlags>,
    timing: Mutex<EncoderTiming>,
    downstream: OnceLock<Arc<dyn RadioDownstream>>,
    upstream: OnceLock<Arc<dyn L2Upstream>>,
    sibling: OnceLock<Weak<dyn ChannelDecoder>>,
}

impl EncoderBase {
    pub fn new(ctx: L1Context, chan: ChannelType, tn: u8, mapping: TdmaMapping) -> Self {
        assert!(mapping.allowed_slot(tn), "timeslot {} not allowed for {:?}", tn, chan);
        assert!(mapping.downlink(), "encoder needs a downlink mapping");

        let now = ctx.clock.fn_now();
        let mut write_time = Time::new(now, tn);
        write_time.roll_forward(mapping.frame_mapping(0), mapping.repeat_length());
        let tsc = ctx.tsc();

        EncoderBase {
            ctx,
            chan,
            mapping,
            tn,
            tsc,
            filler: TxBurst::dummy(),
            flags: Mutex::new(EncoderFlags { running: false, active: false }),
            timing: Mutex::new(EncoderTiming {
                total_bursts: 0,
                prev_write_time: write_time,
                next_write_time: write_time,
                warned_no_downstream: false,
            }),
            downstream: OnceLock::new(),
            upstream: OnceLock::new(),
            sibling: OnceLock::new(),
        }
    }

    /// Replace the idle filler; the FCCH uses an all-zero burst.
    pub fn set_filler(&mut self, filler: TxBurst) {
        self.filler = filler;
    }

    pub fn ctx(&self) -> &L1Context {
        &self.ctx
    }

    pub fn channel_type(&self) -> ChannelType {
        self.chan
    }

    pub fn timeslot(&self) -> u8 {
        self.tn
    }

    pub fn tsc(&self) -> u8 {
        self.tsc
    }

    pub fn mapping(&self) -> &TdmaMapping {
        &self.mapping
    }

    pub fn set_downstream(&self, radio: Arc<dyn RadioDownstream>) {
        if self.downstream.set(radio).is_err() {
            tracing::warn!("{:?} TN{}: downstream already bound", self.chan, self.tn);
        }
    }

    pub fn downstream(&self) -> Option<&Arc<dyn RadioDownstream>> {
        self.downstream.get()
    }

    /// Check for a bound radio; the first miss is logged, later ones are
    /// silent (a test/configuration condition, not fatal).
    pub fn downstream_or_warn(&self) -> Option<&Arc<dyn RadioDownstream>> {
        let down = self.downstream.get();
        if down.is_none() {
            let mut t = self.timing.lock().expect("timing lock");
            if !t.warned_no_downstream {
                t.warned_no_downstream = true;
                tracing::warn!("{:?} TN{}: no downstream radio, dumping frames", self.chan, self.tn);
            }
        }
        down
    }

    pub fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        let _ = self.upstream.set(upstream);
    }

    pub fn upstream(&self) -> Option<&Arc<dyn L2Upstream>> {
        self.upstream.get()
    }

    pub fn set_sibling(&self, sibling: Weak<dyn ChannelDecoder>) {
        let _ = self.sibling.set(sibling);
    }

    pub fn sibling(&self) -> Option<Arc<dyn ChannelDecoder>> {
        self.sibling.get().and_then(|w| w.upgrade())
    }

    pub fn running(&self) -> bool {
        self.flags.lock().expect("flags lock").running
    }

    /// Clear `running`; service threads exit on their next loop iteration.
    pub fn stop(&self) {
        self.flags.lock().expect("flags lock").running = false;
    }

    /// True iff open and the sibling decoder (if any) is not recyclable.
    pub fn active(&self) -> bool {
        let active = self.flags.lock().expect("flags lock").active;
        match self.sibling() {
            Some(sib) => active && !sib.recyclable(),
            None => active,
        }
    }

    /// Common open: returns true when the service thread must be started.
    pub fn open_base(&self) -> bool {
        tracing::debug!("{:?} TN{}: open", self.chan, self.tn);
        let needs_start = {
            let mut f = self.flags.lock().expect("flags lock");
            let needs_start = !f.running;
            f.running = true;
            f.active = true;
            needs_start
        };
        self.timing.lock().expect("timing lock").total_bursts = 0;
        self.resync();
        needs_start
    }

    /// Common close: mark inactive and emit the idle fill.
    pub fn close_base(&self) {
        tracing::debug!("{:?} TN{}: close", self.chan, self.tn);
        self.flags.lock().expect("flags lock").active = false;
        self.send_idle_fill();
    }

    /// If the encoder's clock is far from the current BTS clock,
    /// get it caught up to something reasonable.
    pub fn resync(&self) {
        let now = self.ctx.clock.time();
        let mut t = self.timing.lock().expect("timing lock");
        let delta = t.next_write_time.delta_frames(now);
        if delta < 0 || delta > MAX_CLOCK_DRIFT_FRAMES {
            let mut next = Time::new(now.f, self.tn);
            next.roll_forward(
                self.mapping.frame_mapping(t.total_bursts),
                self.mapping.repeat_length(),
            );
            t.next_write_time = next;
            tracing::trace!("{:?} TN{}: resync next={} now={}", self.chan, self.tn, next, now);
        }
    }

    /// Advance to the next scheduled burst (GSM 05.02 Clause 7, transmit side).
    pub fn roll_forward(&self) {
        let next = {
            let mut t = self.timing.lock().expect("timing lock");
            t.prev_write_time = t.next_write_time;
            t.total_bursts += 1;
            let target = self.mapping.frame_mapping(t.total_bursts);
            t.next_write_time.roll_forward(target, self.mapping.repeat_length());
            t.next_write_time
        };
        if let Some(up) = self.upstream.get() {
            up.signal_next_write_time(next);
        }
    }

    pub fn next_write_time(&self) -> Time {
        self.timing.lock().expect("timing lock").next_write_time
    }

    pub fn prev_write_time(&self) -> Time {
        self.timing.lock().expect("timing lock").prev_write_time
    }

    /// Block until the BTS clock catches up with the most recently
    /// transmitted burst; this throttles the encoder to the radio's rate.
    pub fn wait_to_send(&self) {
        let prev = self.prev_write_time();
        self.ctx.clock.wait(prev);
    }

    /// Park an inactive dispatch thread for one traffic multiframe.
    pub fn idle_wait_multiframe(&self) {
        let target = {
            let mut t = self.timing.lock().expect("timing lock");
            t.next_write_time = t.next_write_time.add_frames(26);
            t.next_write_time
        };
        self.ctx.clock.wait(target);
    }

    /// Park a thread without touching the schedule (no downstream bound).
    pub fn sleep_multiframe(&self) {
        std::thread::sleep(frames_to_duration(26));
    }

    /// Emit the L1 idle filling pattern: the dummy burst on C0, nothing
    /// elsewhere (a non-C0 carrier may simply go dark).
    pub fn send_idle_fill(&self) {
        self.resync();
        let Some(down) = self.downstream.get() else {
            return;
        };
        if !down.is_c0() {
            return;
        }
        for _ in 0..self.mapping.num_frames() {
            let mut burst = self.filler.clone();
            burst.time = self.next_write_time();
            down.write_high_side(burst);
            self.roll_forward();
        }
    }

    pub fn tap(&self) -> Option<&Arc<dyn PacketTap>> {
        self.ctx.tap.as_ref()
    }

    /// Emit a downlink capture record if a tap is installed.
    pub fn write_tap(&self, record: TapRecord) {
        if let Some(tap) = &self.ctx.tap {
            tap.write(record);
        }
    }

    pub fn arfcn(&self) -> u16 {
        self.downstream
            .get()
            .map(|d| d.arfcn())
            .unwrap_or(self.ctx.config.config().c0_arfcn)
    }
}
