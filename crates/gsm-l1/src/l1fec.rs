//! The per-channel façade pairing one encoder and one decoder, plus the
//! concrete channel constructors.

use std::sync::{Arc, Weak};

use gsm_core::{tdma, ChannelType};
use gsm_saps::{BurstSink, L2Frame, L2Upstream, RadioDownstream};

use crate::context::L1Context;
use crate::decoder::ChannelDecoder;
use crate::encoder::ChannelEncoder;
use crate::fcch::FcchEncoder;
use crate::rach::RachDecoder;
use crate::sacch::{SacchDecoder, SacchEncoder};
use crate::sch::SchEncoder;
use crate::tch::{TchFacchDecoder, TchFacchEncoder};
use crate::xcch::{XcchDecoder, XcchEncoder};

/// One logical channel's FEC: an encoder, a decoder, or both, owned
/// together so the sibling back-links never dangle.
pub struct L1Fec {
    encoder: Option<Arc<dyn ChannelEncoder>>,
    decoder: Option<Arc<dyn ChannelDecoder>>,
    sink: Option<Arc<dyn BurstSink>>,
}

impl L1Fec {
    /// The C0 frequency-correction beacon.
    pub fn fcch(ctx: L1Context) -> L1Fec {
        let enc = FcchEncoder::new(ctx);
        L1Fec {
            encoder: Some(enc),
            decoder: None,
            sink: None,
        }
    }

    /// The C0 synchronisation channel.
    pub fn sch(ctx: L1Context) -> L1Fec {
        let enc: Arc<SchEncoder> = Arc::new(SchEncoder::new(ctx));
        L1Fec {
            encoder: Some(enc),
            decoder: None,
            sink: None,
        }
    }

    /// The broadcast control channel, downlink only.
    pub fn bcch(ctx: L1Context) -> L1Fec {
        let enc: Arc<XcchEncoder> = Arc::new(XcchEncoder::new(ctx, ChannelType::Bcch, 0, tdma::bcch(), 0));
        L1Fec {
            encoder: Some(enc),
            decoder: None,
            sink: None,
        }
    }

    /// The random-access detector, uplink only.
    pub fn rach(ctx: L1Context) -> L1Fec {
        let dec = RachDecoder::new(ctx, tdma::rach());
        L1Fec {
            encoder: None,
            decoder: Some(dec.clone()),
            sink: Some(dec),
        }
    }

    /// A bidirectional dedicated control channel on `tn`.
    pub fn sdcch(ctx: L1Context, tn: u8) -> L1Fec {
        let enc = Arc::new(XcchEncoder::new(
            ctx.clone(),
            ChannelType::Sdcch,
            tn,
            tdma::xcch(tn, true),
            0,
        ));
        let dec = Arc::new(XcchDecoder::new(ctx, ChannelType::Sdcch, tn, tdma::xcch(tn, false), 0));
        Self::link(&enc, &dec);
        L1Fec {
            encoder: Some(enc),
            decoder: Some(dec.clone()),
            sink: Some(dec),
        }
    }

    fn link<E, D>(enc: &Arc<E>, dec: &Arc<D>)
    where
        E: ChannelEncoder + 'static,
        D: ChannelDecoder + 'static,
    {
        let dec_ref: Weak<dyn ChannelDecoder> = Arc::downgrade(&(dec.clone() as Arc<dyn ChannelDecoder>));
        let enc_ref: Weak<dyn ChannelEncoder> = Arc::downgrade(&(enc.clone() as Arc<dyn ChannelEncoder>));
        enc.set_sibling(dec_ref);
        dec.set_sibling(enc_ref);
    }

    pub fn encoder(&self) -> Option<&Arc<dyn ChannelEncoder>> {
        self.encoder.as_ref()
    }

    pub fn decoder(&self) -> Option<&Arc<dyn ChannelDecoder>> {
        self.decoder.as_ref()
    }

    /// Bind the encoder's transmit sink and register the decoder in the
    /// radio's demultiplex table.
    pub fn downstream(&self, radio: &Arc<dyn RadioDownstream>) {
        if let Some(enc) = &self.encoder {
            enc.set_downstream(radio.clone());
        }
        if let Some(sink) = &self.sink {
            radio.install_decoder(sink.clone());
        }
    }

    /// Connect both directions to the data-link multiplexer.
    pub fn upstream(&self, up: &Arc<dyn L2Upstream>) {
        if let Some(enc) = &self.encoder {
            enc.set_upstream(up.clone());
        }
        if let Some(dec) = &self.decoder {
            dec.set_upstream(up.clone());
        }
    }

    pub fn open(&self) {
        if let Some(enc) = &self.encoder {
            enc.open();
        }
        if let Some(dec) = &self.decoder {
            dec.open();
        }
    }

    pub fn close(&self) {
        if let Some(enc) = &self.encoder {
            enc.close();
        }
        if let Some(dec) = &self.decoder {
            dec.close();
        }
    }

    /// Stop any service threads for process shutdown.
    pub fn stop(&self) {
        if let Some(enc) = &self.encoder {
            enc.stop();
        }
        if let Some(dec) = &self.decoder {
            dec.stop();
        }
    }

    /// Encode-only channels are always active; otherwise the decoder is
    /// the better indicator.
    pub fn active(&self) -> bool {
        match &self.decoder {
            Some(dec) => dec.active(),
            None => self.encoder.is_some(),
        }
    }

    pub fn write_high_side(&self, frame: L2Frame) {
        if let Some(enc) = &self.encoder {
            enc.write_high_side(frame);
        } else {
            tracing::warn!("write_high_side on a decode-only channel");
        }
    }
}

/// A full-rate traffic channel with its FACCH, keeping the concrete types
/// reachable for the speech path.
pub struct TchL1Fec {
    fec: L1Fec,
    encoder: Arc<TchFacchEncoder>,
    decoder: Arc<TchFacchDecoder>,
}

impl TchL1Fec {
    pub fn new(ctx: L1Context, tn: u8) -> TchL1Fec {
        let enc = TchFacchEncoder::new(ctx.clone(), tn, tdma::tch_f(tn, true));
        let dec = Arc::new(TchFacchDecoder::new(ctx, tn, tdma::tch_f(tn, false)));
        L1Fec::link(&enc, &dec);
        TchL1Fec {
            fec: L1Fec {
                encoder: Some(enc.clone()),
                decoder: Some(dec.clone()),
                sink: Some(dec.clone()),
            },
            encoder: enc,
            decoder: dec,
        }
    }

    pub fn fec(&self) -> &L1Fec {
        &self.fec
    }

    pub fn encoder(&self) -> &Arc<TchFacchEncoder> {
        &self.encoder
    }

    pub fn decoder(&self) -> &Arc<TchFacchDecoder> {
        &self.decoder
    }

    /// Queue a 33-byte vocoder frame for transmission.
    pub fn send_speech_frame(&self, frame: [u8; 33]) {
        self.encoder.write_speech_frame(frame);
    }

    pub fn uplink_lost(&self) -> bool {
        ChannelDecoder::uplink_lost(&*self.decoder)
    }

    pub fn downstream(&self, radio: &Arc<dyn RadioDownstream>) {
        self.fec.downstream(radio);
    }

    pub fn upstream(&self, up: &Arc<dyn L2Upstream>) {
        self.fec.upstream(up);
    }

    pub fn open(&self) {
        self.fec.open();
    }

    pub fn close(&self) {
        self.fec.close();
    }

    pub fn stop(&self) {
        self.fec.stop();
    }

    pub fn active(&self) -> bool {
        self.fec.active()
    }
}

/// A slow associated control channel, keeping the concrete types
/// reachable for the physical-layer control loop.
pub struct SacchL1Fec {
    fec: L1Fec,
    encoder: Arc<SacchEncoder>,
    decoder: Arc<SacchDecoder>,
}

impl SacchL1Fec {
    pub fn new(ctx: L1Context, tn: u8) -> SacchL1Fec {
        let enc = Arc::new(SacchEncoder::new(ctx.clone(), tn, tdma::sacch_tf(tn, true)));
        let dec = Arc::new(SacchDecoder::new(ctx, tn, tdma::sacch_tf(tn, false)));
        L1Fec::link(&enc, &dec);
        enc.set_sacch_sibling(Arc::downgrade(&dec));
        SacchL1Fec {
            fec: L1Fec {
                encoder: Some(enc.clone()),
                decoder: Some(dec.clone()),
                sink: Some(dec.clone()),
            },
            encoder: enc,
            decoder: dec,
        }
    }

    pub fn fec(&self) -> &L1Fec {
        &self.fec
    }

    pub fn encoder(&self) -> &Arc<SacchEncoder> {
        &self.encoder
    }

    pub fn decoder(&self) -> &Arc<SacchDecoder> {
        &self.decoder
    }

    /// Initialise the physical-layer loop from measured values, e.g. the
    /// access burst's.
    pub fn set_phy(&self, rssi: f32, timing_error: f32) {
        self.decoder.set_phy(rssi, timing_error);
        self.encoder.set_phy(rssi, timing_error);
    }

    /// Carry physical-layer state over from another SACCH on reassignment.
    pub fn set_phy_from(&self, other: &SacchL1Fec) {
        self.decoder.set_phy_from(&other.decoder);
        self.encoder.set_phy_from(&other.encoder);
    }

    pub fn downstream(&self, radio: &Arc<dyn RadioDownstream>) {
        self.fec.downstream(radio);
    }

    pub fn upstream(&self, up: &Arc<dyn L2Upstream>) {
        self.fec.upstream(up);
    }

    pub fn open(&self) {
        self.fec.open();
    }

    pub fn close(&self) {
        self.fec.close();
    }

    pub fn active(&self) -> bool {
        self.fec.active()
    }

    pub fn write_high_side(&self, frame: L2Frame) {
        self.fec.write_high_side(frame);
    }
}
