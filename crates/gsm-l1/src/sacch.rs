//! SACCH: the XCCH pipeline with a two-byte physical header and the
//! closed-loop MS power / timing-advance controller (GSM 04.04 6 and 7,
//! GSM 05.08 4, GSM 05.10 5 and 6).

use std::sync::{Arc, Mutex, OnceLock, Weak};

use gsm_core::power::{decode_power, encode_power};
use gsm_core::{ChannelType, RxBurst, TdmaMapping};
use gsm_saps::{BurstSink, L2Frame, L2Upstream, Primitive, RadioDownstream};

use crate::context::L1Context;
use crate::decoder::{ChannelDecoder, DecoderBase};
use crate::encoder::ChannelEncoder;
use crate::xcch::{XcchDecoder, XcchEncoder};

/// Bits of the SACCH physical header ahead of the L2 payload.
const SACCH_HEADER_BITS: usize = 16;

/// The MS transmits the access burst at maximum power with zero timing
/// advance; these seed the loop until the first measurement report.
const INITIAL_MS_POWER_DBM: f32 = 33.0;
const INITIAL_MS_TIMING: f32 = 0.0;

struct SacchOrders {
    ordered_ms_power: f32,
    ordered_ms_timing: f32,
}

/// SACCH downlink: writes the ordered power and timing advance into the
/// physical header of every frame, updating them from the sibling
/// decoder's measurements once per received SACCH block.
pub struct SacchEncoder {
    xcch: XcchEncoder,
    orders: Mutex<SacchOrders>,
    sacch_sibling: OnceLock<Weak<SacchDecoder>>,
}

impl SacchEncoder {
    pub fn new(ctx: L1Context, tn: u8, mapping: TdmaMapping) -> Self {
        SacchEncoder {
            xcch: XcchEncoder::new(ctx, ChannelType::Sacch, tn, mapping, SACCH_HEADER_BITS),
            orders: Mutex::new(SacchOrders {
                ordered_ms_power: INITIAL_MS_POWER_DBM,
                ordered_ms_timing: INITIAL_MS_TIMING,
            }),
            sacch_sibling: OnceLock::new(),
        }
    }

    pub(crate) fn set_sacch_sibling(&self, sibling: Weak<SacchDecoder>) {
        let _ = self.sacch_sibling.set(sibling);
    }

    fn sacch_sibling(&self) -> Option<Arc<SacchDecoder>> {
        self.sacch_sibling.get().and_then(|w| w.upgrade())
    }

    pub fn ordered_ms_power(&self) -> f32 {
        self.orders.lock().expect("orders lock").ordered_ms_power
    }

    pub fn ordered_ms_timing(&self) -> f32 {
        self.orders.lock().expect("orders lock").ordered_ms_timing
    }

    /// Initialise the orders from measured values, without damping.
    /// Used right after channel assignment.
    pub fn set_phy(&self, rssi: f32, timing_error: f32) {
        let Some(sib) = self.sacch_sibling() else {
            return;
        };
        let cfg = self.xcch.base().ctx().config.config().ms_control;
        let mut o = self.orders.lock().expect("orders lock");

        let delta_p = rssi - cfg.rssi_target;
        o.ordered_ms_power = (sib.actual_ms_power() as f32 - delta_p).clamp(cfg.power_min, cfg.power_max);
        o.ordered_ms_timing = (sib.actual_ms_timing() as f32 + timing_error).clamp(0.0, cfg.ta_max);
        tracing::info!(
            "SACCH TN{}: set_phy order pow={:.1} TA={:.1}",
            self.timeslot(),
            o.ordered_ms_power,
            o.ordered_ms_timing
        );
    }

    /// Carry the orders over from a pre-existing established channel.
    pub fn set_phy_from(&self, other: &SacchEncoder) {
        let theirs = other.orders.lock().expect("orders lock");
        let mut o = self.orders.lock().expect("orders lock");
        o.ordered_ms_power = theirs.ordered_ms_power;
        o.ordered_ms_timing = theirs.ordered_ms_timing;
    }

    /// One closed-loop iteration, gated on fresh sibling measurements.
    fn update_orders(&self) {
        let Some(sib) = self.sacch_sibling() else {
            return;
        };
        if !sib.take_phy_new() {
            return;
        }
        let cfg = self.xcch.base().ctx().config.config().ms_control;
        let mut o = self.orders.lock().expect("orders lock");

        // Power (GSM 05.08 4): dBm ordered against RSSI in dB wrt full scale.
        let rssi = sib.rssi();
        let delta_p = rssi - cfg.rssi_target;
        let actual_power = sib.actual_ms_power() as f32;
        let target_power = actual_power - delta_p;
        let damping = cfg.power_damping as f32 * 0.01;
        o.ordered_ms_power =
            (damping * o.ordered_ms_power + (1.0 - damping) * target_power).clamp(cfg.power_min, cfg.power_max);
        tracing::info!(
            "SACCH TN{}: RSSI={:.1} target={:.1} deltaP={:.1} actual={:.1} order={:.1}",
            self.timeslot(),
            rssi,
            cfg.rssi_target,
            delta_p,
            actual_power,
            o.ordered_ms_power
        );

        // Timing (GSM 05.10 5, 6): symbol periods.
        let timing_error = sib.timing_error();
        let actual_timing = sib.actual_ms_timing() as f32;
        let target_timing = actual_timing + timing_error;
        let ta_damping = cfg.ta_damping as f32 * 0.01;
        o.ordered_ms_timing =
            (ta_damping * o.ordered_ms_timing + (1.0 - ta_damping) * target_timing).clamp(0.0, cfg.ta_max);
        tracing::info!(
            "SACCH TN{}: timingError={:.2} actual={:.1} target={:.1} ordered={:.1}",
            self.timeslot(),
            timing_error,
            actual_timing,
            target_timing,
            o.ordered_ms_timing
        );
    }

    fn send_frame(&self, frame: &L2Frame) {
        self.update_orders();

        // SACCH physical header (GSM 04.04 6.1, 7.1): ordered MS power
        // command and ordered timing advance, one byte each.
        let (power, timing) = {
            let o = self.orders.lock().expect("orders lock");
            (o.ordered_ms_power, o.ordered_ms_timing)
        };
        let band = self.xcch.base().ctx().config.config().band;
        let power_code = encode_power(band, power as i32) as u64;
        let timing_field = (timing + 0.5) as u64 & 0xFF;
        tracing::debug!("SACCH TN{}: orders pow={:.1} TA={:.1}", self.timeslot(), power, timing);
        self.xcch.set_header((power_code << 8) | timing_field);

        self.xcch.send_frame(frame);
    }
}

impl ChannelEncoder for SacchEncoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sacch
    }

    fn timeslot(&self) -> u8 {
        self.xcch.base().timeslot()
    }

    fn open(&self) {
        self.xcch.base().open_base();
        let mut o = self.orders.lock().expect("orders lock");
        o.ordered_ms_power = INITIAL_MS_POWER_DBM;
        o.ordered_ms_timing = INITIAL_MS_TIMING;
    }

    fn close(&self) {
        self.xcch.base().close_base();
    }

    fn active(&self) -> bool {
        self.xcch.base().active()
    }

    fn write_high_side(&self, frame: L2Frame) {
        match frame.primitive() {
            Primitive::Data => {
                if !self.active() {
                    tracing::info!("SACCH TN{}: sending on non-active channel", self.timeslot());
                }
                self.xcch.base().resync();
                self.send_frame(&frame);
            }
            Primitive::Establish => {
                self.open();
                if let Some(sib) = self.xcch.base().sibling() {
                    sib.open();
                }
            }
            Primitive::Release => {
                self.close();
                if let Some(sib) = self.xcch.base().sibling() {
                    sib.close();
                }
            }
            Primitive::Error => {
                self.close();
            }
        }
    }

    fn set_downstream(&self, radio: Arc<dyn RadioDownstream>) {
        self.xcch.base().set_downstream(radio);
    }

    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        self.xcch.base().set_upstream(upstream);
    }

    fn set_sibling(&self, sibling: Weak<dyn ChannelDecoder>) {
        self.xcch.base().set_sibling(sibling);
    }
}

struct SacchActuals {
    actual_ms_power: i32,
    actual_ms_timing: i32,
}

/// SACCH uplink: the XCCH decoder plus extraction of the reported MS
/// power and timing advance from the physical header.
pub struct SacchDecoder {
    xcch: XcchDecoder,
    actuals: Mutex<SacchActuals>,
}

impl SacchDecoder {
    pub fn new(ctx: L1Context, tn: u8, mapping: TdmaMapping) -> Self {
        SacchDecoder {
            xcch: XcchDecoder::new(ctx, ChannelType::Sacch, tn, mapping, SACCH_HEADER_BITS),
            actuals: Mutex::new(SacchActuals {
                actual_ms_power: INITIAL_MS_POWER_DBM as i32,
                actual_ms_timing: INITIAL_MS_TIMING as i32,
            }),
        }
    }

    pub fn base(&self) -> &DecoderBase {
        self.xcch.base()
    }

    pub fn phy_new(&self) -> bool {
        self.xcch.base().phy_new()
    }

    pub fn take_phy_new(&self) -> bool {
        self.xcch.base().take_phy_new()
    }

    pub fn rssi(&self) -> f32 {
        self.xcch.base().rssi()
    }

    pub fn timing_error(&self) -> f32 {
        self.xcch.base().timing_error()
    }

    pub fn actual_ms_power(&self) -> i32 {
        self.actuals.lock().expect("actuals lock").actual_ms_power
    }

    pub fn actual_ms_timing(&self) -> i32 {
        self.actuals.lock().expect("actuals lock").actual_ms_timing
    }

    /// Initialise the measurement history, e.g. from the access burst.
    pub fn set_phy(&self, rssi: f32, timing_error: f32) {
        self.xcch.base().seed_phy(rssi, timing_error);
        tracing::info!("SACCH TN{}: set_phy RSSI={:.1} timingError={:.2}", self.base().timeslot(), rssi, timing_error);
    }

    /// Carry measurements and actuals over from an established channel.
    pub fn set_phy_from(&self, other: &SacchDecoder) {
        {
            let theirs = other.actuals.lock().expect("actuals lock");
            let mut a = self.actuals.lock().expect("actuals lock");
            a.actual_ms_power = theirs.actual_ms_power;
            a.actual_ms_timing = theirs.actual_ms_timing;
        }
        self.xcch.base().seed_phy(other.rssi(), other.timing_error());
    }
}

impl ChannelDecoder for SacchDecoder {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sacch
    }

    fn timeslot(&self) -> u8 {
        self.xcch.base().timeslot()
    }

    fn open(&self) {
        self.xcch.base().open_base();
        // Defaults until the first header decodes: the handset sent the
        // RACH burst at max power and zero timing advance.
        let mut a = self.actuals.lock().expect("actuals lock");
        a.actual_ms_power = INITIAL_MS_POWER_DBM as i32;
        a.actual_ms_timing = INITIAL_MS_TIMING as i32;
    }

    fn close(&self) {
        self.xcch.base().close_base();
    }

    fn active(&self) -> bool {
        self.xcch.base().active()
    }

    fn recyclable(&self) -> bool {
        self.xcch.base().recyclable()
    }

    fn write_low_side(&self, burst: &RxBurst) {
        if !self.active() {
            tracing::debug!("SACCH TN{}: not active, ignoring input", BurstSink::timeslot(self));
            return;
        }
        let band = self.xcch.base().ctx().config.config().band;
        self.xcch.run_pipeline(burst, |u| {
            // Physical header (GSM 04.04 7): 5-bit power code, 7-bit
            // timing advance; TA values of 64 and up are spare.
            let power = decode_power(band, u.peek_field(3, 5) as u8);
            let ta_field = u.peek_field(9, 7) as i32;
            let mut a = self.actuals.lock().expect("actuals lock");
            a.actual_ms_power = power;
            if ta_field < 64 {
                a.actual_ms_timing = ta_field;
            }
            tracing::info!("SACCH TN{}: actuals pow={} TA={}", self.xcch.base().timeslot(), a.actual_ms_power, a.actual_ms_timing);
            Some((a.actual_ms_power, a.actual_ms_timing))
        });
    }

    fn set_upstream(&self, upstream: Arc<dyn L2Upstream>) {
        self.xcch.base().set_upstream(upstream);
    }

    fn set_sibling(&self, sibling: Weak<dyn ChannelEncoder>) {
        self.xcch.base().set_sibling(sibling);
    }

    fn fer(&self) -> f32 {
        self.xcch.base().fer()
    }

    fn rssi(&self) -> f32 {
        self.xcch.base().rssi()
    }

    fn timing_error(&self) -> f32 {
        self.xcch.base().timing_error()
    }
}

impl BurstSink for SacchDecoder {
    fn timeslot(&self) -> u8 {
        self.xcch.base().timeslot()
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Sacch
    }

    fn write_low_side(&self, burst: &RxBurst) {
        ChannelDecoder::write_low_side(self, burst);
    }
}
