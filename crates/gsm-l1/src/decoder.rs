use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use gsm_core::{ChannelType, CountdownTimer, RxBurst, TdmaMapping};
use gsm_saps::{L2Upstream, PacketTap, TapRecord};

use crate::context::L1Context;
use crate::encoder::ChannelEncoder;

/// Averaging memory of the frame-error-rate estimate: one SACCH
/// multiframe worth of bursts.
const FER_MEMORY: f32 = 208.0;

/// The uplink side of a logical channel.
pub trait ChannelDecoder: Send + Sync {
    fn channel_type(&self) -> ChannelType;
    fn timeslot(&self) -> u8;

    /// Reset FER, arm T3101, mark active.
    fn open(&self);
    /// Clear T3101/T3109, arm T3111, mark inactive.
    fn close(&self);
    /// Open and not recyclable.
    fn active(&self) -> bool;
    /// Any of the three supervision timers has expired.
    fn recyclable(&self) -> bool;

    /// Burst entry point from the radio receive path. Must never block
    /// upward.
    fn write_low_side(&self, burst: &RxBurst);

    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>);
    fn set_sibling(&self, sibling: Weak<dyn ChannelEncoder>);

    fn fer(&self) -> f32;
    fn rssi(&self) -> f32;
    fn timing_error(&self) -> f32;

    /// T3109 has expired: the uplink went silent.
    fn uplink_lost(&self) -> bool {
        false
    }

    /// Shut down any service thread for process exit; a no-op elsewhere.
    fn stop(&self) {}
}

struct DecoderState {
    active: bool,
    running: bool,
    fer: f32,
    t3101: CountdownTimer,
    t3109: CountdownTimer,
    t3111: CountdownTimer,
    /// Physical measurements of the last four bursts; the phone's settings
    /// change every four bursts, so inspectors average over all of them.
    rssi: [f32; 4],
    timing_error: [f32; 4],
    rssi_counter: usize,
}

/// State and operations common to every decoder: lifecycle, supervision
/// timers, FER tracking and the averaged physical measurements. One mutex
/// guards all of it; public inspectors hold it for the duration of a read.
pub struct DecoderBase {
    ctx: L1Context,
    chan: ChannelType,
    mapping: TdmaMapping,
    tn: u8,
    state: Mutex<DecoderState>,
    /// Set on every burst, cleared the first time a measurement is read.
    phy_new: AtomicBool,
    upstream: OnceLock<Arc<dyn L2Upstream>>,
    sibling: OnceLock<Weak<dyn ChannelEncoder>>,
}

impl DecoderBase {
    pub fn new(ctx: L1Context, chan: ChannelType, tn: u8, mapping: TdmaMapping) -> Self {
        assert!(mapping.allowed_slot(tn), "timeslot {} not allowed for {:?}", tn, chan);
        assert!(!mapping.downlink(), "decoder needs an uplink mapping");
        let timers = ctx.config.config().timers;
        DecoderBase {
            ctx,
            chan,
            mapping,
            tn,
            state: Mutex::new(DecoderState {
                active: false,
                running: false,
                fer: 0.0,
                t3101: CountdownTimer::new(timers.t3101_ms),
                t3109: CountdownTimer::new(timers.t3109_ms),
                t3111: CountdownTimer::new(timers.t3111_ms),
                rssi: [0.0; 4],
                timing_error: [0.0; 4],
                rssi_counter: 0,
            }),
            phy_new: AtomicBool::new(false),
            upstream: OnceLock::new(),
            sibling: OnceLock::new(),
        }
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

    pub fn mapping(&self) -> &TdmaMapping {
        &self.mapping
    }

    pub fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        let _ = self.upstream.set(upstream);
    }

    pub fn upstream(&self) -> Option<&Arc<dyn L2Upstream>> {
        self.upstream.get()
    }

    pub fn set_sibling(&self, sibling: Weak<dyn ChannelEncoder>) {
        let _ = self.sibling.set(sibling);
    }

    pub fn sibling(&self) -> Option<Arc<dyn ChannelEncoder>> {
        self.sibling.get().and_then(|w| w.upgrade())
    }

    /// Common open: returns true when the service thread must be started.
    pub fn open_base(&self) -> bool {
        tracing::debug!("{:?} TN{}: open", self.chan, self.tn);
        let mut s = self.state.lock().expect("state lock");
        let needs_start = !s.running;
        s.running = true;
        s.fer = 0.0;
        s.t3111.reset();
        s.t3109.reset();
        s.t3101.set();
        s.active = true;
        needs_start
    }

    pub fn close_base(&self) {
        tracing::debug!("{:?} TN{}: close", self.chan, self.tn);
        let mut s = self.state.lock().expect("state lock");
        s.t3101.reset();
        s.t3109.reset();
        s.t3111.set();
        s.active = false;
    }

    pub fn running(&self) -> bool {
        self.state.lock().expect("state lock").running
    }

    /// Clear `running`; service threads exit on their next loop iteration.
    pub fn stop(&self) {
        self.state.lock().expect("state lock").running = false;
    }

    pub fn active(&self) -> bool {
        let s = self.state.lock().expect("state lock");
        s.active && !Self::timers_expired(&s)
    }

    /// The raw open/closed flag, without the recyclability check. The
    /// common channels (RACH) are not supervised by the dedicated-channel
    /// timers.
    pub fn active_flag(&self) -> bool {
        self.state.lock().expect("state lock").active
    }

    pub fn recyclable(&self) -> bool {
        let s = self.state.lock().expect("state lock");
        Self::timers_expired(&s)
    }

    fn timers_expired(s: &DecoderState) -> bool {
        s.t3101.expired() || s.t3109.expired() || s.t3111.expired()
    }

    pub fn uplink_lost(&self) -> bool {
        self.state.lock().expect("state lock").t3109.expired()
    }

    /// Keep the channel alive after a good frame: refresh T3109 and stop
    /// the access-reply timer on the first one.
    pub fn good_frame_timers(&self) {
        let mut s = self.state.lock().expect("state lock");
        s.t3109.set();
        if s.t3101.active() {
            s.t3101.reset();
        }
    }

    /// Refresh T3109 only; good traffic keeps the uplink alive.
    pub fn keep_alive(&self) {
        self.state.lock().expect("state lock").t3109.set();
    }

    pub fn count_good_frame(&self) {
        let mut s = self.state.lock().expect("state lock");
        let a = 1.0 / FER_MEMORY;
        s.fer *= 1.0 - a;
        tracing::trace!("{:?} TN{}: FER={}", self.chan, self.tn, s.fer);
    }

    pub fn count_bad_frame(&self) {
        let mut s = self.state.lock().expect("state lock");
        let a = 1.0 / FER_MEMORY;
        s.fer = (1.0 - a) * s.fer + a;
        tracing::trace!("{:?} TN{}: FER={}", self.chan, self.tn, s.fer);
    }

    pub fn fer(&self) -> f32 {
        self.state.lock().expect("state lock").fer
    }

    /// Record the physical parameters of one burst and flag them fresh.
    pub fn record_phy(&self, rssi: f32, timing_error: f32) {
        let mut s = self.state.lock().expect("state lock");
        let i = s.rssi_counter;
        s.rssi[i] = rssi;
        s.timing_error[i] = timing_error;
        s.rssi_counter = (i + 1) % 4;
        self.phy_new.store(true, Ordering::Release);
    }

    /// Seed the measurement history, e.g. from the access burst.
    pub fn seed_phy(&self, rssi: f32, timing_error: f32) {
        let mut s = self.state.lock().expect("state lock");
        s.rssi = [rssi; 4];
        s.timing_error = [timing_error; 4];
        self.phy_new.store(true, Ordering::Release);
    }

    /// Fresh measurements since the sibling encoder last consumed them?
    pub fn phy_new(&self) -> bool {
        self.phy_new.load(Ordering::Acquire)
    }

    /// Consume the freshness flag; true if measurements arrived since the
    /// last consume. Only the sibling encoder's control loop calls this.
    pub fn take_phy_new(&self) -> bool {
        self.phy_new.swap(false, Ordering::AcqRel)
    }

    /// Mean RSSI over the last block.
    pub fn rssi(&self) -> f32 {
        let s = self.state.lock().expect("state lock");
        s.rssi.iter().sum::<f32>() * 0.25
    }

    /// Mean timing error over the last block.
    pub fn timing_error(&self) -> f32 {
        let s = self.state.lock().expect("state lock");
        s.timing_error.iter().sum::<f32>() * 0.25
    }

    /// Timing advance from the averaged timing error, clamped to 0..63.
    pub fn ta(&self) -> i32 {
        let ta = (self.timing_error() + 0.5).floor() as i32;
        ta.clamp(0, 63)
    }

    pub fn tap(&self) -> Option<&Arc<dyn PacketTap>> {
        self.ctx.tap.as_ref()
    }

    /// Emit an uplink capture record if a tap is installed.
    pub fn write_tap(&self, record: TapRecord) {
        if let Some(tap) = &self.ctx.tap {
            tap.write(record);
        }
    }

    pub fn arfcn(&self) -> u16 {
        self.ctx.config.config().c0_arfcn
    }
}
