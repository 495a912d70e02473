mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{make_ctx, test_config, TestRadio, TestUpstream};
use gsm_core::bits::lsb8msb;
use gsm_core::{BitVector, RxBurst, SoftVector, Time};
use gsm_l1::components::block_coder::rach_coder;
use gsm_l1::components::convcoder::ConvEncState;
use gsm_l1::L1Fec;
use gsm_saps::{L2Upstream, RadioDownstream};

/// Build the 36 coded bits of an access burst for a given RA and the
/// 6-bit parity mask actually transmitted.
fn build_access_burst(ra: u8, parity_mask: u64, timing_error: f32) -> RxBurst {
    let mut u = BitVector::new(18);
    // The RA octet rides LSB-first like every d field.
    u.fill_field(0, ra as u64, 8);
    lsb8msb(u.segment_mut(0, 8));
    u.fill_field(8, parity_mask & 0x3f, 6);
    // tail bits u[14..18] stay zero

    let mut e = BitVector::new(36);
    ConvEncState::new().encode(u.as_slice(), e.as_mut_slice());

    let mut soft = SoftVector::new(148);
    for k in 0..36 {
        soft.set(49 + k, e.bit(k) as f32);
    }
    RxBurst::new(soft, Time::new(8, 0), -48.0, timing_error)
}

/// The inverted parity over the (already bit-reversed) RA, XOR'd with the
/// BSIC, as the mobile computes it (GSM 05.03 4.6).
fn good_parity(ra: u8, bsic: u8) -> u64 {
    let mut d = BitVector::new(8);
    d.fill_field(0, ra as u64, 8);
    lsb8msb(d.segment_mut(0, 8));
    let crc = rach_coder().parity_word(d.as_slice());
    !(crc ^ bsic as u64) & 0x3f
}

#[test]
fn test_rach_accept() {
    let ctx = make_ctx(test_config()); // BSIC 42
    let fec = L1Fec::rach(ctx);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));
    fec.open();

    let burst = build_access_burst(0x5A, good_parity(0x5A, 42), 1.8);
    fec.decoder().unwrap().write_low_side(&burst);

    assert!(upstream.wait_for_control(1, Duration::from_secs(1)), "no RACH detection");
    let frames = upstream.control_frames();
    assert_eq!(frames[0].payload, vec![0x5A]);
    assert_eq!(frames[0].ta, 2);
    assert!((frames[0].rssi + 48.0).abs() < 0.01);

    fec.stop();
}

#[test]
fn test_rach_reject_wrong_parity() {
    let ctx = make_ctx(test_config());
    let fec = L1Fec::rach(ctx);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));
    fec.open();

    // One flipped parity bit shifts the recovered BSIC: common noise, not
    // an error, just no detection.
    let burst = build_access_burst(0x5A, good_parity(0x5A, 42) ^ 0x01, 0.0);
    fec.decoder().unwrap().write_low_side(&burst);

    // And a burst aimed at a different cell's BSIC.
    let foreign = build_access_burst(0x5A, good_parity(0x5A, 17), 0.0);
    fec.decoder().unwrap().write_low_side(&foreign);

    std::thread::sleep(Duration::from_millis(300));
    assert!(upstream.control_frames().is_empty());
    assert!(fec.decoder().unwrap().fer() > 0.0);

    fec.stop();
}

#[test]
fn test_rach_ta_clipping() {
    let ctx = make_ctx(test_config());
    let fec = L1Fec::rach(ctx);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));
    fec.open();

    // Far beyond the 63-symbol limit and slightly negative.
    let far = build_access_burst(0x11, good_parity(0x11, 42), 90.0);
    fec.decoder().unwrap().write_low_side(&far);
    let early = build_access_burst(0x22, good_parity(0x22, 42), -0.4);
    fec.decoder().unwrap().write_low_side(&early);

    assert!(upstream.wait_for_control(2, Duration::from_secs(1)), "missing detections");
    let frames = upstream.control_frames();
    assert_eq!(frames[0].ta, 63);
    assert_eq!(frames[1].ta, 0);

    fec.stop();
}
