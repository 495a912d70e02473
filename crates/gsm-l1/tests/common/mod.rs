//! Shared harness for the loopback scenario tests: a recording radio and
//! a recording L2.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gsm_config::{SharedConfig, StackConfig};
use gsm_core::{Band, BitVector, BtsClock, RxBurst, Time, TxBurst};
use gsm_l1::L1Context;
use gsm_saps::{BurstSink, L2Frame, L2Upstream, RadioDownstream};

/// Base configuration of the test cell: EGSM900, BSIC 42 (NCC 5, BCC 2).
pub fn test_config() -> StackConfig {
    StackConfig::new(Band::Egsm900, 5, 2, 50)
}

pub fn make_ctx(cfg: StackConfig) -> L1Context {
    let clock = Arc::new(BtsClock::new());
    clock.set(0);
    L1Context::new(SharedConfig::from_config(cfg), clock)
}

/// Radio stand-in: collects transmitted bursts and dispatches received
/// bursts to the installed decoders by timeslot.
pub struct TestRadio {
    arfcn: u16,
    c0: bool,
    bursts: Mutex<Vec<TxBurst>>,
    sinks: Mutex<Vec<Arc<dyn BurstSink>>>,
}

impl TestRadio {
    pub fn new(arfcn: u16, c0: bool) -> Arc<Self> {
        Arc::new(TestRadio {
            arfcn,
            c0,
            bursts: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        })
    }

    pub fn burst_count(&self) -> usize {
        self.bursts.lock().unwrap().len()
    }

    pub fn take_bursts(&self) -> Vec<TxBurst> {
        std::mem::take(&mut *self.bursts.lock().unwrap())
    }

    /// Poll until at least `n` bursts were transmitted.
    pub fn wait_for_bursts(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.burst_count() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.burst_count() >= n
    }

    /// Feed one transmitted burst back into the matching decoder.
    pub fn deliver(&self, tx: &TxBurst, rssi: f32, timing_error: f32) {
        let rx = RxBurst::from_tx(tx, rssi, timing_error);
        for sink in self.sinks.lock().unwrap().iter() {
            if sink.timeslot() == rx.time.t {
                sink.write_low_side(&rx);
            }
        }
    }
}

impl RadioDownstream for TestRadio {
    fn arfcn(&self) -> u16 {
        self.arfcn
    }

    fn is_c0(&self) -> bool {
        self.c0
    }

    fn write_high_side(&self, burst: TxBurst) {
        self.bursts.lock().unwrap().push(burst);
    }

    fn install_decoder(&self, decoder: Arc<dyn BurstSink>) {
        self.sinks.lock().unwrap().push(decoder);
    }
}

#[derive(Debug, Clone)]
pub struct ControlRec {
    pub payload: Vec<u8>,
    pub time: Time,
    pub rssi: f32,
    pub ta: i32,
    pub fer: f32,
}

#[derive(Debug, Clone)]
pub struct SacchRec {
    pub payload: Vec<u8>,
    pub ms_power: i32,
    pub ms_timing: i32,
}

#[derive(Default)]
struct UpstreamInner {
    control: Vec<ControlRec>,
    sacch: Vec<SacchRec>,
    tch: Vec<[u8; 33]>,
    next_times: Vec<Time>,
}

/// L2 stand-in recording everything the decoders deliver.
#[derive(Default)]
pub struct TestUpstream {
    inner: Mutex<UpstreamInner>,
}

impl TestUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(TestUpstream::default())
    }

    pub fn control_frames(&self) -> Vec<ControlRec> {
        self.inner.lock().unwrap().control.clone()
    }

    pub fn sacch_frames(&self) -> Vec<SacchRec> {
        self.inner.lock().unwrap().sacch.clone()
    }

    pub fn tch_frames(&self) -> Vec<[u8; 33]> {
        self.inner.lock().unwrap().tch.clone()
    }

    pub fn next_times(&self) -> Vec<Time> {
        self.inner.lock().unwrap().next_times.clone()
    }

    /// Poll until at least `n` control frames arrived.
    pub fn wait_for_control(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.inner.lock().unwrap().control.len() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.inner.lock().unwrap().control.len() >= n
    }
}

fn frame_bytes(frame: &L2Frame) -> Vec<u8> {
    let bits = frame.bits();
    if bits.len() % 8 == 0 {
        bits.to_bytes()
    } else {
        BitVector::from_bits(bits.as_slice()).to_bitstr().into_bytes()
    }
}

impl L2Upstream for TestUpstream {
    fn write_low_side(&self, frame: L2Frame, time: Time, rssi: f32, ta: i32, fer: f32) {
        self.inner.lock().unwrap().control.push(ControlRec {
            payload: frame_bytes(&frame),
            time,
            rssi,
            ta,
            fer,
        });
    }

    fn write_low_side_sacch(
        &self,
        frame: L2Frame,
        _time: Time,
        _rssi: f32,
        _ta: i32,
        _fer: f32,
        ms_power: i32,
        ms_timing: i32,
    ) {
        self.inner.lock().unwrap().sacch.push(SacchRec {
            payload: frame_bytes(&frame),
            ms_power,
            ms_timing,
        });
    }

    fn write_low_side_tch(&self, frame: [u8; 33], _time: Time, _rssi: f32, _ta: i32, _fer: f32) {
        self.inner.lock().unwrap().tch.push(frame);
    }

    fn signal_next_write_time(&self, time: Time) {
        self.inner.lock().unwrap().next_times.push(time);
    }
}
