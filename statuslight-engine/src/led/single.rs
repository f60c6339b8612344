use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::binding::{BrightnessConfig, SingleBinding, StateBinding};
use crate::color::{ColorSample, OFF};
use crate::effect::EffectRequest;
use crate::engine::AnimationEngine;
use crate::error::EngineError;
use crate::led::Led;
use crate::lock;
use crate::sink::PixelSink;
use crate::state::DeviceStatus;
use crate::timer::TimerFactory;

/// One addressable pixel.
///
/// The color is configured first and shown by [`SingleLed::turn_on`] or
/// [`SingleLed::start_continuous_blink`].
pub struct SingleLed {
    engine: AnimationEngine,
    color: Mutex<ColorSample>,
    status: Arc<dyn DeviceStatus>,
}

impl SingleLed {
    /// # Errors
    /// [`EngineError::InvalidArgument`] for a sink without pixels, or the timer
    /// creation error.
    pub fn new<S, F>(sink: S, clock: &F, status: Arc<dyn DeviceStatus>) -> Result<Self, EngineError>
    where
        S: PixelSink,
        F: TimerFactory,
    {
        if sink.pixel_count() == 0 {
            return Err(EngineError::InvalidArgument { index: 0, len: 0 });
        }
        Ok(Self {
            engine: AnimationEngine::new(sink, clock)?,
            color: Mutex::new(OFF),
            status,
        })
    }

    /// Set the color used by the next `turn_on` or blink. Nothing is shown yet.
    pub fn set_color(&self, color: ColorSample) {
        *lock(&self.color) = color;
    }

    pub fn turn_on(&self) {
        self.engine.set_all_color(self.color());
    }

    pub fn turn_off(&self) {
        self.engine.turn_off();
    }

    pub fn start_continuous_blink(&self, interval: Duration) {
        self.engine.blink(self.color(), interval);
    }

    /// Blink the configured color `times` times, ending dark
    pub fn blink(&self, times: u32, interval: Duration) {
        self.engine.blink_times(self.color(), times, interval);
    }

    pub fn blink_once(&self) {
        self.blink(1, Duration::from_millis(100));
    }

    #[must_use]
    pub fn color(&self) -> ColorSample {
        *lock(&self.color)
    }

    #[must_use]
    pub const fn engine(&self) -> &AnimationEngine {
        &self.engine
    }
}

impl Led for SingleLed {
    fn on_state_changed(&self) {
        let state = self.status.device_state();
        let voice = self.status.is_voice_detected();
        let Some(request) = SingleBinding::evaluate(state, voice, BrightnessConfig::default()) else {
            warn!("No single LED effect for device state {state}");
            return;
        };
        debug!("Single LED showing {state}: {request:?}");

        match request {
            EffectRequest::SolidColor(color) => {
                self.set_color(color);
                self.turn_on();
            }
            EffectRequest::Blink { color, interval } => {
                self.set_color(color);
                self.start_continuous_blink(interval);
            }
            EffectRequest::TurnOff => self.turn_off(),
            other => self.engine.apply(&other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::rgb;
    use crate::effect::EffectKind;
    use crate::state::DeviceState;
    use crate::testing::{FixedStatus, ManualClock, RecordingSink};

    #[test]
    fn test_set_color_is_deferred() {
        let (sink, log) = RecordingSink::new(1);
        let led = SingleLed::new(sink, &ManualClock::default(), FixedStatus::new(DeviceState::Idle, false)).unwrap();

        led.set_color(rgb(1, 2, 3));
        assert_eq!(log.commit_count(), 0);
        led.turn_on();
        assert_eq!(log.last(), Some(vec![rgb(1, 2, 3)]));
        led.turn_off();
        assert_eq!(log.last(), Some(vec![OFF]));
        assert_eq!(led.color(), rgb(1, 2, 3));
    }

    #[test]
    fn test_counted_blink_ends_dark() {
        let (sink, log) = RecordingSink::new(1);
        let clock = ManualClock::default();
        let led = SingleLed::new(sink, &clock, FixedStatus::new(DeviceState::Idle, false)).unwrap();
        let green = rgb(0, 4, 0);
        led.set_color(green);

        led.blink(3, Duration::from_millis(200));
        assert_eq!(clock.handle.interval(), Some(Duration::from_millis(200)));
        clock.handle.tick_n(20);
        let frames: Vec<_> = log.frames().into_iter().map(|frame| frame[0]).collect();
        assert_eq!(frames, vec![green, OFF, green, OFF, green, OFF]);
        assert!(!clock.handle.is_running());
        assert_eq!(led.engine().active_effect(), None);
    }

    #[test]
    fn test_blink_once_flashes_for_one_tick() {
        let (sink, log) = RecordingSink::new(1);
        let clock = ManualClock::default();
        let led = SingleLed::new(sink, &clock, FixedStatus::new(DeviceState::Idle, false)).unwrap();
        led.set_color(rgb(9, 9, 9));

        led.blink_once();
        assert_eq!(clock.handle.interval(), Some(Duration::from_millis(100)));
        assert_eq!(log.last(), Some(vec![rgb(9, 9, 9)]));
        clock.handle.tick();
        assert_eq!(log.last(), Some(vec![OFF]));
        assert!(!clock.handle.is_running());
    }

    #[test]
    fn test_state_changes_drive_the_pixel() {
        let (sink, log) = RecordingSink::new(1);
        let clock = ManualClock::default();
        let status = FixedStatus::new(DeviceState::Starting, false);
        let led = SingleLed::new(sink, &clock, status.clone()).unwrap();

        led.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(0, 0, 4)]));
        assert_eq!(led.engine().active_effect(), Some(EffectKind::Blink));
        assert_eq!(clock.handle.interval(), Some(Duration::from_millis(100)));
        clock.handle.tick();
        assert_eq!(log.last(), Some(vec![OFF]));

        status.set(DeviceState::Listening, true);
        led.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(16, 0, 0)]));
        assert!(!clock.handle.is_running());

        status.set(DeviceState::Idle, false);
        led.on_state_changed();
        assert_eq!(log.last(), Some(vec![OFF]));

        status.set(DeviceState::Unknown, false);
        let commits = log.commit_count();
        led.on_state_changed();
        assert_eq!(log.commit_count(), commits);
    }
}
