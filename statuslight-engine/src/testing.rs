//! Test doubles for the hardware capabilities

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::color::{ColorSample, OFF};
use crate::error::EngineError;
use crate::led::{FadeEndCallback, PwmChannel};
use crate::lock;
use crate::sink::{check_index, PixelSink};
use crate::state::{DeviceState, DeviceStatus};
use crate::timer::{PeriodicTimer, TickCallback, TimerFactory};

/// Shared view of a [`ManualTimer`] kept by the test after the engine took the timer
#[derive(Default)]
pub struct TimerHandle {
    callback: Mutex<Option<TickCallback>>,
    running: AtomicBool,
    interval: Mutex<Option<Duration>>,
    generation: AtomicU64,
    starts: AtomicUsize,
    stops: AtomicUsize,
    dropped: AtomicBool,
}

impl TimerHandle {
    /// Invoke the callback if the timer is running, like a real tick would.
    pub fn tick(&self) {
        if self.is_running() {
            self.fire();
        }
    }

    /// Generation handed out by the most recent start
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Invoke the callback regardless of state, simulating a tick of the
    /// current schedule that was already dispatched when the timer was stopped.
    pub fn fire(&self) {
        self.fire_with(self.generation());
    }

    /// Deliver a tick scheduled under `generation`, e.g. one left over from a
    /// schedule that has since been restarted.
    pub fn fire_with(&self, generation: u64) {
        if let Some(callback) = lock(&self.callback).as_mut() {
            callback(generation);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> Option<Duration> {
        *lock(&self.interval)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub struct ManualTimer {
    handle: Arc<TimerHandle>,
}

impl PeriodicTimer for ManualTimer {
    fn start(&self, interval: Duration) -> Result<u64, EngineError> {
        if interval.is_zero() {
            return Err(EngineError::InvalidInterval(interval));
        }
        *lock(&self.handle.interval) = Some(interval);
        self.handle.running.store(true, Ordering::SeqCst);
        self.handle.starts.fetch_add(1, Ordering::SeqCst);
        Ok(self.handle.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.handle.running.store(false, Ordering::SeqCst);
        self.handle.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ManualTimer {
    fn drop(&mut self) {
        self.handle.running.store(false, Ordering::SeqCst);
        self.handle.dropped.store(true, Ordering::SeqCst);
    }
}

/// Timer factory whose single timer is stepped by hand through its handle
#[derive(Clone, Default)]
pub struct ManualClock {
    pub handle: Arc<TimerHandle>,
}

impl TimerFactory for ManualClock {
    type Timer = ManualTimer;

    fn create(&self, _name: &'static str, callback: TickCallback) -> Result<ManualTimer, EngineError> {
        *lock(&self.handle.callback) = Some(callback);
        Ok(ManualTimer {
            handle: Arc::clone(&self.handle),
        })
    }
}

/// Timer factory that always fails
pub struct BrokenClock;

impl TimerFactory for BrokenClock {
    type Timer = ManualTimer;

    fn create(&self, name: &'static str, _callback: TickCallback) -> Result<ManualTimer, EngineError> {
        Err(EngineError::ResourceUnavailable(name.to_string()))
    }
}

/// Sink that records every committed frame
pub struct RecordingSink {
    staged: Vec<ColorSample>,
    commits: Arc<Mutex<Vec<Vec<ColorSample>>>>,
    fail_commits: Arc<AtomicBool>,
}

/// Handle for inspecting a [`RecordingSink`] after it moved into an engine
#[derive(Clone)]
pub struct SinkLog {
    commits: Arc<Mutex<Vec<Vec<ColorSample>>>>,
    fail_commits: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new(pixel_count: usize) -> (Self, SinkLog) {
        let commits = Arc::new(Mutex::new(Vec::new()));
        let fail_commits = Arc::new(AtomicBool::new(false));
        let sink = Self {
            staged: vec![OFF; pixel_count],
            commits: Arc::clone(&commits),
            fail_commits: Arc::clone(&fail_commits),
        };
        (
            sink,
            SinkLog {
                commits,
                fail_commits,
            },
        )
    }
}

impl PixelSink for RecordingSink {
    fn pixel_count(&self) -> usize {
        self.staged.len()
    }

    fn set_pixel(&mut self, index: usize, color: ColorSample) -> Result<(), EngineError> {
        check_index(index, self.staged.len())?;
        self.staged[index] = color;
        Ok(())
    }

    fn clear(&mut self) {
        self.staged.fill(OFF);
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(EngineError::Sink("injected failure".to_string()));
        }
        lock(&self.commits).push(self.staged.clone());
        Ok(())
    }
}

impl SinkLog {
    pub fn commit_count(&self) -> usize {
        lock(&self.commits).len()
    }

    /// Last frame that reached the hardware
    pub fn last(&self) -> Option<Vec<ColorSample>> {
        lock(&self.commits).last().cloned()
    }

    pub fn frames(&self) -> Vec<Vec<ColorSample>> {
        lock(&self.commits).clone()
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

/// Hardware operations observed by [`FakePwm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmOp {
    Duty(u32),
    Fade { target: u32, ramp: Duration },
    StopFade,
}

/// PWM channel whose fade completes only when the test says so
#[derive(Clone)]
pub struct FakePwm {
    max_duty: u32,
    ops: Arc<Mutex<Vec<PwmOp>>>,
    fade_end: Arc<Mutex<Option<FadeEndCallback>>>,
    last_fade: Arc<AtomicU32>,
}

impl FakePwm {
    pub fn new(max_duty: u32) -> Self {
        Self {
            max_duty,
            ops: Arc::new(Mutex::new(Vec::new())),
            fade_end: Arc::new(Mutex::new(None)),
            last_fade: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Id of the most recently started fade
    pub fn last_fade_id(&self) -> u32 {
        self.last_fade.load(Ordering::SeqCst)
    }

    pub fn ops(&self) -> Vec<PwmOp> {
        lock(&self.ops).clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }

    /// Report the most recent fade as complete, as the interrupt dispatcher would.
    pub fn complete_fade(&self) {
        self.complete_fade_id(self.last_fade_id());
    }

    /// Report completion of a specific fade, possibly one already superseded.
    pub fn complete_fade_id(&self, fade: u32) {
        if let Some(callback) = lock(&self.fade_end).as_mut() {
            callback(fade);
        }
    }
}

impl PwmChannel for FakePwm {
    fn max_duty(&self) -> u32 {
        self.max_duty
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), EngineError> {
        lock(&self.ops).push(PwmOp::Duty(duty));
        Ok(())
    }

    fn start_fade(&mut self, target: u32, ramp: Duration) -> Result<u32, EngineError> {
        lock(&self.ops).push(PwmOp::Fade { target, ramp });
        Ok(self.last_fade.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn stop_fade(&mut self) -> Result<(), EngineError> {
        lock(&self.ops).push(PwmOp::StopFade);
        Ok(())
    }

    fn subscribe_fade_end(&mut self, callback: FadeEndCallback) -> Result<(), EngineError> {
        *lock(&self.fade_end) = Some(callback);
        Ok(())
    }
}

/// Device status source with settable values
#[derive(Default)]
pub struct FixedStatus {
    state: Mutex<DeviceState>,
    voice: AtomicBool,
}

impl FixedStatus {
    pub fn new(state: DeviceState, voice: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            voice: AtomicBool::new(voice),
        })
    }

    pub fn set(&self, state: DeviceState, voice: bool) {
        *lock(&self.state) = state;
        self.voice.store(voice, Ordering::SeqCst);
    }
}

impl DeviceStatus for FixedStatus {
    fn device_state(&self) -> DeviceState {
        *lock(&self.state)
    }

    fn is_voice_detected(&self) -> bool {
        self.voice.load(Ordering::SeqCst)
    }
}
