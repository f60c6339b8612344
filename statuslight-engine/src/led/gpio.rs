//! PWM-driven LED
//!
//! A plain LED on a PWM channel. Brightness is a duty cycle, blinking uses the
//! periodic timer, and breathing is handed to the PWM peripheral's hardware
//! fade: every fade-complete event schedules a ramp in the other direction.
//!
//! Fade-complete events are queued by the channel and may be handled after the
//! fade they belong to was replaced, so every fade carries an id and only the
//! event for the current one is acted on. Blink ticks are matched against the
//! timer generation the same way.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info, warn};

use crate::binding::{BrightnessConfig, GpioBinding, StateBinding};
use crate::effect::EffectRequest;
use crate::error::EngineError;
use crate::led::Led;
use crate::lock;
use crate::state::DeviceStatus;
use crate::timer::{PeriodicTimer, TimerFactory};

/// Callback run with the id of a fade that completed
pub type FadeEndCallback = Box<dyn FnMut(u32) + Send + 'static>;

/// A PWM output with hardware fading
pub trait PwmChannel: Send + 'static {
    /// Duty value for a fully lit LED
    fn max_duty(&self) -> u32;

    /// # Errors
    /// Returns an error when the peripheral rejects the duty.
    fn set_duty(&mut self, duty: u32) -> Result<(), EngineError>;

    /// Ramp linearly from the current duty to `target` over `ramp`, without
    /// waiting. Returns an id for this fade; completion is reported through the
    /// fade-end subscription with the same id.
    ///
    /// # Errors
    /// Returns an error when the fade cannot be started.
    fn start_fade(&mut self, target: u32, ramp: Duration) -> Result<u32, EngineError>;

    /// # Errors
    /// Returns an error when the peripheral refuses to stop the fade.
    fn stop_fade(&mut self) -> Result<(), EngineError>;

    /// Register the callback run when a fade completes. It runs on the
    /// channel's dispatch context, never inside an interrupt.
    ///
    /// # Errors
    /// Returns an error when the callback cannot be installed.
    fn subscribe_fade_end(&mut self, callback: FadeEndCallback) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy)]
struct BlinkState {
    on: bool,
    /// Ticks left for a counted blink, `None` blinks until superseded
    remaining: Option<u32>,
    /// Timer generation driving this blink
    generation: u64,
}

struct PwmState {
    channel: Box<dyn PwmChannel>,
    /// Duty applied by `turn_on` and the blink on-phase
    duty: u32,
    blink: Option<BlinkState>,
    /// Id of the running breathing ramp; fade-end events for any other id are ignored
    fade: Option<u32>,
    fade_up: bool,
    closed: bool,
}

impl PwmState {
    fn set_duty(&mut self, duty: u32) {
        if let Err(e) = self.channel.set_duty(duty) {
            warn!("Failed to set LED duty {duty}: {e}");
        }
    }

    /// Start a breathing ramp toward `target`, remembering its id.
    fn start_fade(&mut self, target: u32) {
        self.fade = match self.channel.start_fade(target, GpioBinding::FADE_RAMP) {
            Ok(fade) => Some(fade),
            Err(e) => {
                warn!("Failed to start LED fade: {e}");
                None
            }
        };
    }
}

struct Inner {
    state: Mutex<PwmState>,
    timer: Mutex<Option<Box<dyn PeriodicTimer>>>,
}

impl Inner {
    fn stop_timer(&self) {
        if let Some(timer) = lock(&self.timer).as_ref() {
            if let Err(e) = timer.stop() {
                warn!("Failed to stop blink timer: {e}");
            }
        }
    }

    fn on_blink_tick(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.closed {
            return;
        }
        let Some(mut blink) = state.blink.filter(|blink| blink.generation == generation) else {
            return;
        };

        blink.on = !blink.on;
        let duty = if blink.on { state.duty } else { 0 };
        state.set_duty(duty);

        match blink.remaining.map(|ticks| ticks.saturating_sub(1)) {
            Some(0) => {
                state.blink = None;
                self.stop_timer();
            }
            remaining => {
                blink.remaining = remaining;
                state.blink = Some(blink);
            }
        }
    }

    fn on_fade_end(&self, fade: u32) {
        let mut state = lock(&self.state);
        // The fade may have been cancelled or replaced after the hardware finished it
        if state.closed || state.fade != Some(fade) {
            return;
        }
        state.fade_up = !state.fade_up;
        let target = if state.fade_up { state.channel.max_duty() } else { 0 };
        state.start_fade(target);
    }
}

/// LED on a PWM channel
pub struct GpioLed {
    inner: Arc<Inner>,
    status: Arc<dyn DeviceStatus>,
}

impl GpioLed {
    /// Take over `channel`, starting dark with the target duty at zero.
    ///
    /// # Errors
    /// Timer creation or fade subscription failures.
    pub fn new<P, F>(channel: P, clock: &F, status: Arc<dyn DeviceStatus>) -> Result<Self, EngineError>
    where
        P: PwmChannel,
        F: TimerFactory,
    {
        let inner = Arc::new(Inner {
            state: Mutex::new(PwmState {
                channel: Box::new(channel),
                duty: 0,
                blink: None,
                fade: None,
                fade_up: true,
                closed: false,
            }),
            timer: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = clock.create(
            "led_blink",
            Box::new(move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_blink_tick(generation);
                }
            }),
        )?;
        *lock(&inner.timer) = Some(Box::new(timer));

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        lock(&inner.state).channel.subscribe_fade_end(Box::new(move |fade| {
            if let Some(inner) = weak.upgrade() {
                inner.on_fade_end(fade);
            }
        }))?;
        info!("PWM LED ready");

        Ok(Self { inner, status })
    }

    /// Stop blinking and any hardware fade, returning the locked state.
    fn halt(&self) -> MutexGuard<'_, PwmState> {
        let mut state = lock(&self.inner.state);
        self.inner.stop_timer();
        state.blink = None;
        state.fade = None;
        if let Err(e) = state.channel.stop_fade() {
            warn!("Failed to stop LED fade: {e}");
        }
        state
    }

    /// Set the brightness used by the next `turn_on` or blink. Values above
    /// 100 are clamped. Nothing changes on the output yet.
    pub fn set_brightness(&self, percent: u8) {
        let mut state = lock(&self.inner.state);
        let max = state.channel.max_duty();
        state.duty = match percent.min(100) {
            100 => max,
            // Below 100% the result is smaller than `max`, so it fits back into u32
            p => u32::try_from(u64::from(p) * u64::from(max) / 100).unwrap_or(max),
        };
    }

    /// Target duty computed by the last `set_brightness`
    #[must_use]
    pub fn duty(&self) -> u32 {
        lock(&self.inner.state).duty
    }

    pub fn turn_on(&self) {
        let mut state = self.halt();
        let duty = state.duty;
        state.set_duty(duty);
    }

    pub fn turn_off(&self) {
        self.halt().set_duty(0);
    }

    pub fn start_continuous_blink(&self, interval: Duration) {
        self.start_blink(None, interval);
    }

    /// Blink `times` times, ending dark
    pub fn blink(&self, times: u32, interval: Duration) {
        if times == 0 {
            return;
        }
        self.start_blink(Some(times.saturating_mul(2)), interval);
    }

    pub fn blink_once(&self) {
        self.blink(1, Duration::from_millis(100));
    }

    fn start_blink(&self, remaining: Option<u32>, interval: Duration) {
        if interval.is_zero() {
            warn!("Ignoring LED blink with zero interval");
            return;
        }
        let mut state = self.halt();
        if state.closed {
            return;
        }
        let started = match lock(&self.inner.timer).as_ref() {
            Some(timer) => timer.start(interval),
            None => Err(EngineError::Timer("blink timer released".to_string())),
        };
        match started {
            Ok(generation) => {
                state.blink = Some(BlinkState {
                    on: false,
                    remaining,
                    generation,
                });
            }
            Err(e) => warn!("Failed to start blink timer: {e}"),
        }
    }

    /// Breathe using hardware fades between full and zero duty
    pub fn start_fade_task(&self) {
        let mut state = self.halt();
        if state.closed {
            return;
        }
        state.fade_up = true;
        let max = state.channel.max_duty();
        state.start_fade(max);
    }

    #[must_use]
    pub fn is_fading(&self) -> bool {
        lock(&self.inner.state).fade.is_some()
    }
}

impl Led for GpioLed {
    fn on_state_changed(&self) {
        let state = self.status.device_state();
        let voice = self.status.is_voice_detected();
        let Some(request) = GpioBinding::evaluate(state, voice, BrightnessConfig::default()) else {
            warn!("No PWM LED effect for device state {state}");
            return;
        };
        debug!("PWM LED showing {state}: {request:?}");

        match request {
            EffectRequest::SolidColor(percent) => {
                self.set_brightness(percent);
                self.turn_on();
            }
            EffectRequest::Blink { color, interval } => {
                self.set_brightness(color);
                self.start_continuous_blink(interval);
            }
            EffectRequest::Breathe { high, .. } => {
                self.set_brightness(high);
                self.start_fade_task();
            }
            EffectRequest::TurnOff => self.turn_off(),
            EffectRequest::Scroll { .. } | EffectRequest::FadeOut { .. } => {
                warn!("PWM LED cannot show {request:?}");
            }
        }
    }
}

impl Drop for GpioLed {
    fn drop(&mut self) {
        {
            let mut state = self.halt();
            state.closed = true;
        }
        let timer = lock(&self.inner.timer).take();
        drop(timer);
    }
}
