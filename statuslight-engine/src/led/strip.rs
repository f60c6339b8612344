use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::binding::{BrightnessConfig, StateBinding, StripBinding};
use crate::engine::AnimationEngine;
use crate::error::EngineError;
use crate::led::Led;
use crate::lock;
use crate::sink::PixelSink;
use crate::state::DeviceStatus;
use crate::timer::TimerFactory;

/// Ring of addressable pixels with adjustable brightness levels
pub struct CircularStrip {
    engine: AnimationEngine,
    brightness: Mutex<BrightnessConfig>,
    status: Arc<dyn DeviceStatus>,
}

impl CircularStrip {
    /// # Errors
    /// [`EngineError::InvalidArgument`] for a sink without pixels, or the timer
    /// creation error.
    pub fn new<S, F>(
        sink: S,
        clock: &F,
        status: Arc<dyn DeviceStatus>,
        brightness: BrightnessConfig,
    ) -> Result<Self, EngineError>
    where
        S: PixelSink,
        F: TimerFactory,
    {
        if sink.pixel_count() == 0 {
            return Err(EngineError::InvalidArgument { index: 0, len: 0 });
        }
        Ok(Self {
            engine: AnimationEngine::new(sink, clock)?,
            brightness: Mutex::new(brightness),
            status,
        })
    }

    /// Store new levels and re-evaluate the current state with them.
    pub fn set_brightness(&self, default_level: u8, low_level: u8) {
        *lock(&self.brightness) = BrightnessConfig {
            default_level,
            low_level,
        };
        self.on_state_changed();
    }

    #[must_use]
    pub fn brightness(&self) -> BrightnessConfig {
        *lock(&self.brightness)
    }

    /// Direct access for callers that drive effects themselves
    #[must_use]
    pub const fn engine(&self) -> &AnimationEngine {
        &self.engine
    }
}

impl Led for CircularStrip {
    fn on_state_changed(&self) {
        let state = self.status.device_state();
        let voice = self.status.is_voice_detected();
        match StripBinding::evaluate(state, voice, self.brightness()) {
            Some(request) => {
                debug!("Strip showing {state}: {request:?}");
                self.engine.apply(&request);
            }
            None => warn!("No strip effect for device state {state}"),
        }
    }

    fn apply_brightness(&self, levels: BrightnessConfig) {
        self.set_brightness(levels.default_level, levels.low_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{rgb, OFF};
    use crate::effect::EffectKind;
    use crate::state::DeviceState;
    use crate::testing::{FixedStatus, ManualClock, RecordingSink, SinkLog};
    use std::time::Duration;

    fn strip(state: DeviceState) -> (CircularStrip, Arc<FixedStatus>, ManualClock, SinkLog) {
        let (sink, log) = RecordingSink::new(8);
        let clock = ManualClock::default();
        let status = FixedStatus::new(state, false);
        let strip = CircularStrip::new(sink, &clock, status.clone(), BrightnessConfig::default()).unwrap();
        (strip, status, clock, log)
    }

    #[test]
    fn test_empty_sink_rejected() {
        let (sink, _log) = RecordingSink::new(0);
        let result = CircularStrip::new(
            sink,
            &ManualClock::default(),
            FixedStatus::new(DeviceState::Idle, false),
            BrightnessConfig::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidArgument { .. })));
    }

    #[test]
    fn test_starting_scrolls_three_pixels() {
        let (strip, _status, clock, log) = strip(DeviceState::Starting);
        strip.on_state_changed();

        let blue = rgb(4, 4, 32);
        let mut expected = vec![OFF; 8];
        expected[..3].fill(blue);
        assert_eq!(log.last(), Some(expected));
        assert_eq!(clock.handle.interval(), Some(Duration::from_millis(100)));
        assert_eq!(strip.engine().active_effect(), Some(EffectKind::Scroll));
    }

    #[test]
    fn test_idle_fades_out_from_current_frame() {
        let (strip, status, clock, log) = strip(DeviceState::Connecting);
        strip.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(4, 4, 32); 8]));

        status.set(DeviceState::Idle, false);
        strip.on_state_changed();
        clock.handle.tick();
        assert_eq!(log.last(), Some(vec![rgb(2, 2, 16); 8]));

        clock.handle.tick_n(10);
        assert_eq!(log.last(), Some(vec![OFF; 8]));
        assert!(!clock.handle.is_running());
    }

    #[test]
    fn test_brightness_change_reevaluates() {
        let (strip, _status, _clock, log) = strip(DeviceState::Speaking);
        strip.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(4, 32, 4); 8]));

        strip.set_brightness(64, 8);
        assert_eq!(strip.brightness().default_level, 64);
        assert_eq!(log.last(), Some(vec![rgb(8, 64, 8); 8]));

        strip.apply_brightness(BrightnessConfig {
            default_level: 10,
            low_level: 1,
        });
        assert_eq!(log.last(), Some(vec![rgb(1, 10, 1); 8]));
    }

    #[test]
    fn test_voice_detection_changes_listening_color() {
        let (strip, status, _clock, log) = strip(DeviceState::Listening);
        strip.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(4, 0, 0); 8]));

        status.set(DeviceState::Listening, true);
        strip.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(32, 4, 4); 8]));
    }

    #[test]
    fn test_unknown_state_keeps_running_effect() {
        let (strip, status, clock, log) = strip(DeviceState::Upgrading);
        strip.on_state_changed();
        let commits = log.commit_count();

        status.set(DeviceState::Unknown, false);
        strip.on_state_changed();
        assert_eq!(log.commit_count(), commits);
        assert_eq!(strip.engine().active_effect(), Some(EffectKind::Blink));
        assert!(clock.handle.is_running());
    }

    #[test]
    fn test_repeated_notification_restarts_effect() {
        let (strip, _status, clock, log) = strip(DeviceState::Activating);
        strip.on_state_changed();
        clock.handle.tick();
        assert_eq!(log.last(), Some(vec![OFF; 8]));

        strip.on_state_changed();
        assert_eq!(log.last(), Some(vec![rgb(4, 32, 4); 8]));
        assert_eq!(clock.handle.starts(), 2);
    }
}
