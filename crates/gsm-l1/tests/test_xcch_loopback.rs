mod common;

use std::sync::Arc;

use common::{make_ctx, test_config, TestRadio, TestUpstream};
use gsm_core::burst::{HL_POS, HU_POS};
use gsm_l1::L1Fec;
use gsm_saps::{L2Frame, L2Upstream, RadioDownstream};

const PAYLOAD: [u8; 23] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
];

fn setup() -> (L1Fec, Arc<TestRadio>, Arc<TestUpstream>) {
    let ctx = make_ctx(test_config());
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));
    (fec, radio, upstream)
}

/// A 23-byte payload through encode, four bursts, and decode is the
/// identity, with FER staying at zero.
#[test]
fn test_xcch_loopback() {
    let (fec, radio, upstream) = setup();
    fec.open();

    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));
    let bursts = radio.take_bursts();
    assert_eq!(bursts.len(), 4);

    // Every burst carries the channel's timeslot, a frame number from the
    // channel's mapping, both stealing flags and strictly increasing times.
    for (n, b) in bursts.iter().enumerate() {
        assert_eq!(b.time.t, 1);
        assert_eq!(b.time.f % 51, n as u32);
        assert_eq!(b.bits().bit(HL_POS), 1);
        assert_eq!(b.bits().bit(HU_POS), 1);
        if n > 0 {
            assert!(b.time.diff(bursts[n - 1].time) > 0);
        }
    }

    for b in &bursts {
        radio.deliver(b, -55.0, 0.25);
    }

    let frames = upstream.control_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, PAYLOAD);
    assert_eq!(frames[0].time, bursts[0].time);
    assert!((frames[0].rssi + 55.0).abs() < 0.01);
    assert_eq!(frames[0].ta, 0);
    assert!(frames[0].fer.abs() < 1e-6);
}

/// A missing burst in the block is bridged by the soft decoder: neutral
/// confidence where nothing was received.
#[test]
fn test_xcch_burst_loss() {
    let (fec, radio, upstream) = setup();
    fec.open();

    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));
    let bursts = radio.take_bursts();
    assert_eq!(bursts.len(), 4);

    for (n, b) in bursts.iter().enumerate() {
        if n == 2 {
            continue; // burst B=2 lost on the air
        }
        radio.deliver(b, -60.0, 0.0);
    }

    let frames = upstream.control_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, PAYLOAD);
}

/// A lost frame must not contaminate the decode of the following one.
#[test]
fn test_xcch_lost_final_burst_isolated() {
    let (fec, radio, upstream) = setup();
    fec.open();

    // First frame loses its B=3 burst: no delivery.
    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));
    let first = radio.take_bursts();
    for b in &first[0..3] {
        radio.deliver(b, -60.0, 0.0);
    }
    assert!(upstream.control_frames().is_empty());

    // The next frame decodes cleanly on its own four bursts.
    let other: [u8; 23] = [0x5A; 23];
    fec.write_high_side(L2Frame::from_bytes(&other));
    let second = radio.take_bursts();
    assert_eq!(second.len(), 4);
    for b in &second {
        radio.deliver(b, -60.0, 0.0);
    }

    let frames = upstream.control_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, other);
}

/// Garbage bursts fail the FIRE syndrome silently and push the FER up;
/// good frames pull it back down.
#[test]
fn test_xcch_fer_tracking() {
    let (fec, radio, upstream) = setup();
    fec.open();

    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));
    let bursts = radio.take_bursts();

    // Corrupt all four bursts beyond repair.
    for b in &bursts {
        let mut bad = b.clone();
        for k in 3..60 {
            let v = bad.bits().bit(k);
            bad.bits_mut().set_bit(k, 1 - v);
        }
        for k in 88..145 {
            let v = bad.bits().bit(k);
            bad.bits_mut().set_bit(k, 1 - v);
        }
        radio.deliver(&bad, -60.0, 0.0);
    }
    assert!(upstream.control_frames().is_empty());
    let dec = fec.decoder().unwrap();
    let fer_after_bad = dec.fer();
    assert!(fer_after_bad > 0.0);

    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));
    for b in &radio.take_bursts() {
        radio.deliver(b, -60.0, 0.0);
    }
    assert_eq!(upstream.control_frames().len(), 1);
    assert!(dec.fer() < fer_after_bad);
}

/// Closing a channel on C0 fills its multiframe with dummy bursts.
#[test]
fn test_close_emits_idle_fill_on_c0() {
    let ctx = make_ctx(test_config());
    let fec = L1Fec::sdcch(ctx, 1);
    let radio = TestRadio::new(50, true);
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(TestUpstream::new() as Arc<dyn L2Upstream>));

    fec.open();
    assert!(fec.active());
    fec.close();

    let bursts = radio.take_bursts();
    assert_eq!(bursts.len(), 4);
    let dummy = gsm_core::TxBurst::dummy();
    for b in &bursts {
        assert_eq!(b.bits(), dummy.bits());
    }
    assert!(!fec.active());
}

/// Encoders publish each next write time so L2 can pace itself.
#[test]
fn test_next_write_time_signalled() {
    let (fec, radio, upstream) = setup();
    fec.open();
    fec.write_high_side(L2Frame::from_bytes(&PAYLOAD));

    let times = upstream.next_times();
    assert_eq!(times.len(), 4);
    let bursts = radio.take_bursts();
    // Each signalled time lies after the burst that triggered it.
    for (t, b) in times.iter().zip(&bursts) {
        assert!(t.diff(b.time) > 0);
    }
}
