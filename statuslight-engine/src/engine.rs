//! Animation engine
//!
//! The engine owns a pixel buffer, a pixel sink and a periodic timer, and runs
//! at most one animation step at a time. Effect calls come from application
//! threads while the timer callback runs on its own context; both sides take
//! the same state lock, so a tick never observes a half-installed effect.
//!
//! Lock order is always state, then timer slot. The timer callback holds only a
//! weak handle to the engine internals. Each installed step remembers the timer
//! generation it was started under, and ticks from any other generation are
//! dropped, so a tick that raced with a reinstall never advances the new step. Dropping the engine stops the timer
//! under the state lock and then drops the timer itself, which waits for an
//! in-flight callback to return.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use smallvec::SmallVec;

use crate::color::{ColorSample, OFF};
use crate::effect::{self, Animation, Blink, EffectKind, EffectRequest, StepOutcome};
use crate::error::EngineError;
use crate::lock;
use crate::sink::{check_index, PixelSink};
use crate::timer::{PeriodicTimer, TimerFactory};

/// Pixels stored inline before the buffer spills to the heap
const INLINE_PIXELS: usize = 16;

type PixelBuffer = SmallVec<[ColorSample; INLINE_PIXELS]>;

/// The running animation and the timer generation driving it
struct Installed {
    animation: Animation,
    generation: u64,
}

struct EngineState {
    sink: Box<dyn PixelSink>,
    pixels: PixelBuffer,
    step: Option<Installed>,
    /// Set on teardown; late ticks bail out without touching the sink
    closed: bool,
}

impl EngineState {
    /// Stage the whole buffer into the sink and push it out.
    fn render(&mut self) {
        for (index, color) in self.pixels.iter().enumerate() {
            if let Err(e) = self.sink.set_pixel(index, *color) {
                warn!("Failed to stage pixel {index}: {e}");
            }
        }
        self.commit();
    }

    fn commit(&mut self) {
        if let Err(e) = self.sink.commit() {
            warn!("Failed to commit pixels: {e}");
        }
    }
}

struct Inner {
    state: Mutex<EngineState>,
    timer: Mutex<Option<Box<dyn PeriodicTimer>>>,
}

impl Inner {
    fn stop_timer(&self) {
        if let Some(timer) = lock(&self.timer).as_ref() {
            if let Err(e) = timer.stop() {
                warn!("Failed to stop animation timer: {e}");
            }
        }
    }

    fn start_timer(&self, interval: Duration) -> Result<u64, EngineError> {
        match lock(&self.timer).as_ref() {
            Some(timer) => timer.start(interval),
            None => Err(EngineError::Timer("animation timer released".to_string())),
        }
    }

    /// Timer callback body
    fn tick(&self, generation: u64) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.closed {
            return;
        }
        // A tick dispatched just before the step was removed or replaced
        let Some(step) = state.step.as_mut().filter(|step| step.generation == generation) else {
            return;
        };

        match step.animation.advance(&mut state.pixels) {
            StepOutcome::Render => state.render(),
            StepOutcome::Finished => {
                debug!("{:?} finished", step.animation.kind());
                state.pixels.fill(OFF);
                state.sink.clear();
                state.commit();
                state.step = None;
                self.stop_timer();
            }
        }
    }
}

/// Drives one pixel sink with solid colors and timer-based effects.
///
/// All operations are fire-and-forget: hardware failures are logged and the
/// next call or tick simply tries again.
pub struct AnimationEngine {
    inner: Arc<Inner>,
    pixel_count: usize,
}

impl AnimationEngine {
    /// Create an engine over `sink`, with a timer from `clock` bound to the
    /// engine's tick. The buffer starts dark and nothing is committed.
    ///
    /// # Errors
    /// Whatever the factory reports when the timer cannot be created.
    pub fn new<S, F>(sink: S, clock: &F) -> Result<Self, EngineError>
    where
        S: PixelSink,
        F: TimerFactory,
    {
        let pixel_count = sink.pixel_count();
        let inner = Arc::new(Inner {
            state: Mutex::new(EngineState {
                sink: Box::new(sink),
                pixels: smallvec::smallvec![OFF; pixel_count],
                step: None,
                closed: false,
            }),
            timer: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let timer = clock.create(
            "led_animation",
            Box::new(move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.tick(generation);
                }
            }),
        )?;
        *lock(&inner.timer) = Some(Box::new(timer));
        info!("Animation engine ready with {pixel_count} pixels");

        Ok(Self { inner, pixel_count })
    }

    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Take the state lock, stop the timer and drop any installed step.
    fn halt(&self) -> MutexGuard<'_, EngineState> {
        let mut state = lock(&self.inner.state);
        self.inner.stop_timer();
        state.step = None;
        state
    }

    /// Stop any effect and show `color` on every pixel.
    pub fn set_all_color(&self, color: ColorSample) {
        let mut state = self.halt();
        state.pixels.fill(color);
        state.render();
    }

    /// Stop any effect and change one pixel, leaving the others as they are.
    ///
    /// # Errors
    /// [`EngineError::InvalidArgument`] when `index` is outside the strip. The
    /// running effect is left alone in that case.
    pub fn set_single_color(&self, index: usize, color: ColorSample) -> Result<(), EngineError> {
        if let Err(e) = check_index(index, self.pixel_count) {
            warn!("Ignoring single pixel write: {e}");
            return Err(e);
        }
        let mut state = self.halt();
        state.pixels[index] = color;
        state.render();
        Ok(())
    }

    /// Stop any effect, blank the buffer and the sink, and commit.
    pub fn turn_off(&self) {
        let mut state = self.halt();
        state.pixels.fill(OFF);
        state.sink.clear();
        state.commit();
    }

    pub fn blink(&self, color: ColorSample, interval: Duration) {
        self.apply(&EffectRequest::Blink { color, interval });
    }

    /// Blink `times` times starting lit, then go dark and stop the timer.
    pub fn blink_times(&self, color: ColorSample, times: u32, interval: Duration) {
        if times == 0 {
            return;
        }
        self.install(Animation::Blink(Blink::counted(color, times)), interval);
    }

    pub fn breathe(&self, low: ColorSample, high: ColorSample, interval: Duration) {
        self.apply(&EffectRequest::Breathe { low, high, interval });
    }

    pub fn scroll(&self, low: ColorSample, high: ColorSample, length: usize, interval: Duration) {
        self.apply(&EffectRequest::Scroll {
            low,
            high,
            length,
            interval,
        });
    }

    /// Halve the current frame every tick until it is dark, then stop.
    pub fn fade_out(&self, interval: Duration) {
        self.apply(&EffectRequest::FadeOut { interval });
    }

    /// Execute an effect request.
    pub fn apply(&self, request: &EffectRequest<ColorSample>) {
        match *request {
            EffectRequest::SolidColor(color) => self.set_all_color(color),
            EffectRequest::TurnOff => self.turn_off(),
            _ => {
                if let Some((animation, interval)) = effect::animation_for(request) {
                    self.install(animation, interval);
                }
            }
        }
    }

    fn install(&self, mut animation: Animation, interval: Duration) {
        if interval.is_zero() {
            warn!("Ignoring {:?} with zero interval", animation.kind());
            return;
        }

        let mut state = self.halt();
        if state.closed {
            return;
        }
        if animation.first_frame(&mut state.pixels) {
            state.render();
        }

        match self.inner.start_timer(interval) {
            Ok(generation) => {
                debug!("Installing {:?} every {interval:?}", animation.kind());
                state.step = Some(Installed { animation, generation });
            }
            Err(e) => warn!("Failed to start animation timer: {e}"),
        }
    }

    /// Snapshot of the engine's pixel buffer
    #[must_use]
    pub fn pixels(&self) -> Vec<ColorSample> {
        lock(&self.inner.state).pixels.to_vec()
    }

    /// Kind of the effect currently installed, if any
    #[must_use]
    pub fn active_effect(&self) -> Option<EffectKind> {
        lock(&self.inner.state).step.as_ref().map(|step| step.animation.kind())
    }
}

impl Drop for AnimationEngine {
    fn drop(&mut self) {
        {
            let mut state = self.halt();
            state.closed = true;
        }
        // Dropping the timer waits for a callback that is still running
        let timer = lock(&self.inner.timer).take();
        drop(timer);
        debug!("Animation engine released");
    }
}
