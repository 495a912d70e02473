mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{make_ctx, test_config, TestRadio, TestUpstream};
use gsm_l1::L1Fec;
use gsm_saps::{L2Frame, L2Upstream, Primitive, RadioDownstream};

/// A channel that never hears its mobile becomes recyclable when the
/// access-reply timer runs out.
#[test]
fn test_t3101_expiry_recycles_channel() {
    let mut cfg = test_config();
    cfg.timers.t3101_ms = 30;
    let ctx = make_ctx(cfg);
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, false);
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(TestUpstream::new() as Arc<dyn L2Upstream>));

    fec.open();
    assert!(fec.active());
    let dec = fec.decoder().unwrap();
    assert!(!dec.recyclable());

    std::thread::sleep(Duration::from_millis(60));
    assert!(dec.recyclable());
    assert!(!fec.active());
    // The encoder side follows its sibling.
    assert!(!fec.encoder().unwrap().active());
}

/// T3111 arms on close and eventually releases the channel for reuse.
#[test]
fn test_t3111_after_close() {
    let mut cfg = test_config();
    cfg.timers.t3111_ms = 20;
    let ctx = make_ctx(cfg);
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, false);
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(TestUpstream::new() as Arc<dyn L2Upstream>));

    fec.open();
    fec.close();
    let dec = fec.decoder().unwrap();
    assert!(!fec.active());
    assert!(!dec.recyclable());
    std::thread::sleep(Duration::from_millis(40));
    assert!(dec.recyclable());
}

/// ESTABLISH opens both siblings; RELEASE closes both; ERROR closes only
/// the transmit side and leaves the receiver to time out.
#[test]
fn test_primitive_lifecycle() {
    let mut cfg = test_config();
    cfg.timers.t3101_ms = 10_000;
    let ctx = make_ctx(cfg);
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, false);
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(TestUpstream::new() as Arc<dyn L2Upstream>));

    fec.write_high_side(L2Frame::control(Primitive::Establish));
    assert!(fec.encoder().unwrap().active());
    assert!(fec.decoder().unwrap().active());

    fec.write_high_side(L2Frame::control(Primitive::Release));
    assert!(!fec.encoder().unwrap().active());
    assert!(!fec.decoder().unwrap().active());

    fec.write_high_side(L2Frame::control(Primitive::Establish));
    assert!(fec.active());
    fec.write_high_side(L2Frame::control(Primitive::Error));
    // ERROR only closes the encoder; the decoder stays open until its
    // timers expire.
    assert!(!fec.encoder().unwrap().active());
    assert!(fec.decoder().unwrap().active());
}

/// Bursts arriving on a closed decoder are silently dropped.
#[test]
fn test_closed_decoder_ignores_bursts() {
    let ctx = make_ctx(test_config());
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));

    fec.open();
    fec.write_high_side(L2Frame::from_bytes(&[0x2B; 23]));
    let bursts = radio.take_bursts();
    fec.close();

    for b in &bursts {
        radio.deliver(b, -60.0, 0.0);
    }
    assert!(upstream.control_frames().is_empty());
}
