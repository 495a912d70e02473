mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{make_ctx, test_config, TestRadio, TestUpstream};
use gsm_l1::l1fec::TchL1Fec;
use gsm_saps::{L2Frame, L2Upstream, RadioDownstream};

/// A canned 33-byte full-rate frame: 0xD signature nibble plus a
/// recognisable payload pattern.
fn speech_frame() -> [u8; 33] {
    let mut frame = [0u8; 33];
    frame[0] = 0xD3;
    for (i, b) in frame.iter_mut().enumerate().skip(1) {
        *b = (i * 7 + 1) as u8;
    }
    frame
}

fn setup() -> (TchL1Fec, Arc<TestRadio>, Arc<TestUpstream>) {
    let ctx = make_ctx(test_config());
    let fec = TchL1Fec::new(ctx, 2);
    let radio = TestRadio::new(50, false);
    let upstream = TestUpstream::new();
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(upstream.clone() as Arc<dyn L2Upstream>));
    (fec, radio, upstream)
}

/// A speech frame through two diagonal blocks and back is the identity.
#[test]
fn test_tch_loopback() {
    let (fec, radio, upstream) = setup();
    let input = speech_frame();

    // Queue ahead of open so the first dispatched block carries it.
    fec.send_speech_frame(input);
    fec.open();

    assert!(radio.wait_for_bursts(8, Duration::from_secs(2)), "dispatcher stalled");
    let bursts = radio.take_bursts();

    for b in &bursts[0..8] {
        // Traffic bursts of an unstolen stream never raise stealing flags.
        assert_eq!(b.bits().bit(gsm_core::burst::HU_POS), 0);
        assert_eq!(b.bits().bit(gsm_core::burst::HL_POS), 0);
        assert_eq!(b.time.t, 2);
        radio.deliver(b, -65.0, 1.0);
    }

    // The first block alone yields a substituted frame; the frame itself
    // completes with the second block.
    let frames = upstream.tch_frames();
    assert!(!frames.is_empty());
    assert!(
        frames.contains(&input),
        "decoded speech does not match input: {:?}",
        frames
    );

    fec.close();
    fec.stop();
}

/// FACCH steals the next block: its four bursts flag Hu, the following
/// four flag Hl, the control frame is recovered exactly, and the stolen
/// 20 ms surface as substituted speech.
#[test]
fn test_facch_steal() {
    let (fec, radio, upstream) = setup();
    let facch: [u8; 23] = [
        0x03, 0x42, 0x15, 0x01, 0x2B, 0x00, 0xFF, 0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80, 0x90,
        0xA0, 0xB0, 0xC0, 0xD0, 0xE0, 0xF0, 0x2B,
    ];

    fec.fec().write_high_side(L2Frame::from_bytes(&facch));
    fec.open();

    assert!(radio.wait_for_bursts(8, Duration::from_secs(2)), "dispatcher stalled");
    let bursts = radio.take_bursts();

    // Stolen block: Hu on its own bursts, Hl on the next block's.
    for b in &bursts[0..4] {
        assert_eq!(b.bits().bit(gsm_core::burst::HU_POS), 1);
        assert_eq!(b.bits().bit(gsm_core::burst::HL_POS), 0);
    }
    for b in &bursts[4..8] {
        assert_eq!(b.bits().bit(gsm_core::burst::HU_POS), 0);
        assert_eq!(b.bits().bit(gsm_core::burst::HL_POS), 1);
    }

    for b in &bursts[0..8] {
        radio.deliver(b, -65.0, 0.0);
    }

    let control = upstream.control_frames();
    assert_eq!(control.len(), 1, "FACCH frame not recovered");
    assert_eq!(control[0].payload, facch);

    // The stolen block still produced (muted) speech output.
    assert!(!upstream.tch_frames().is_empty());

    fec.close();
    fec.stop();
}

/// With nothing queued the dispatcher keeps the interleaver fed with the
/// canned filler and the TDMA schedule intact.
#[test]
fn test_tch_filler_keeps_schedule() {
    let (fec, radio, _upstream) = setup();
    fec.open();

    assert!(radio.wait_for_bursts(8, Duration::from_secs(2)), "dispatcher stalled");
    let bursts = radio.take_bursts();

    for (n, b) in bursts.iter().enumerate().take(8) {
        // Every burst lands on a mapped traffic frame, in order.
        let fnum = b.time.f % 26;
        assert!(fnum != 12 && fnum != 25, "burst on a non-traffic frame {}", fnum);
        if n > 0 {
            assert!(b.time.diff(bursts[n - 1].time) > 0);
        }
    }

    fec.close();
    fec.stop();
}

/// Speech frames beyond the latency bound are head-dropped.
#[test]
fn test_speech_latency_bound() {
    let mut cfg = test_config();
    cfg.max_speech_latency = 2;
    let ctx = make_ctx(cfg);
    let fec = TchL1Fec::new(ctx, 3);
    let radio = TestRadio::new(50, false);
    fec.downstream(&(radio.clone() as Arc<dyn RadioDownstream>));
    fec.upstream(&(TestUpstream::new() as Arc<dyn L2Upstream>));

    for n in 0..10 {
        let mut frame = speech_frame();
        frame[1] = n;
        fec.send_speech_frame(frame);
    }
    assert_eq!(fec.encoder().speech_backlog(), 10);

    fec.open();
    assert!(radio.wait_for_bursts(4, Duration::from_secs(2)), "dispatcher stalled");

    // The dispatcher trimmed the queue to the bound before sending.
    assert!(fec.encoder().speech_backlog() <= 3);

    fec.close();
    fec.stop();
}
