//! Device state to effect tables, one per LED variant

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::{rgb, ColorSample, OFF};
use crate::effect::EffectRequest;
use crate::state::DeviceState;

const FAST: Duration = Duration::from_millis(100);
const SLOW: Duration = Duration::from_millis(500);

/// Brightness levels the strip colors are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrightnessConfig {
    #[serde(default = "default_level")]
    pub default_level: u8,
    #[serde(default = "default_low_level")]
    pub low_level: u8,
}

const fn default_level() -> u8 {
    32
}

const fn default_low_level() -> u8 {
    4
}

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            low_level: default_low_level(),
        }
    }
}

/// Maps a device state to the effect an LED variant shows for it.
///
/// Returns `None` for states the variant has nothing for; the caller warns and
/// leaves the current effect running.
pub trait StateBinding {
    /// Color for addressable LEDs, brightness percentage for PWM
    type Sample: Copy;

    fn evaluate(
        state: DeviceState,
        voice_detected: bool,
        brightness: BrightnessConfig,
    ) -> Option<EffectRequest<Self::Sample>>;
}

/// Multi-pixel ring, colors scaled by the configured levels
pub struct StripBinding;

impl StateBinding for StripBinding {
    type Sample = ColorSample;

    fn evaluate(
        state: DeviceState,
        voice_detected: bool,
        brightness: BrightnessConfig,
    ) -> Option<EffectRequest<ColorSample>> {
        let d = brightness.default_level;
        let l = brightness.low_level;
        let blue = rgb(l, l, d);
        let green = rgb(l, d, l);

        let request = match state {
            DeviceState::Starting => EffectRequest::Scroll {
                low: OFF,
                high: blue,
                length: 3,
                interval: FAST,
            },
            DeviceState::WifiConfiguring => EffectRequest::Blink {
                color: blue,
                interval: SLOW,
            },
            DeviceState::Idle => EffectRequest::FadeOut {
                interval: Duration::from_millis(50),
            },
            DeviceState::Connecting => EffectRequest::SolidColor(blue),
            DeviceState::Listening | DeviceState::AudioTesting => {
                if voice_detected {
                    EffectRequest::SolidColor(rgb(d, l, l))
                } else {
                    EffectRequest::SolidColor(rgb(l, 0, 0))
                }
            }
            DeviceState::Speaking => EffectRequest::SolidColor(green),
            DeviceState::Upgrading => EffectRequest::Blink {
                color: green,
                interval: FAST,
            },
            DeviceState::Activating => EffectRequest::Blink {
                color: green,
                interval: SLOW,
            },
            DeviceState::Unknown => return None,
        };
        Some(request)
    }
}

/// Single addressable pixel with fixed levels
pub struct SingleBinding;

impl SingleBinding {
    pub const DEFAULT_LEVEL: u8 = 4;
    pub const HIGH_LEVEL: u8 = 16;
    pub const LOW_LEVEL: u8 = 2;
}

impl StateBinding for SingleBinding {
    type Sample = ColorSample;

    fn evaluate(
        state: DeviceState,
        voice_detected: bool,
        _brightness: BrightnessConfig,
    ) -> Option<EffectRequest<ColorSample>> {
        let blue = rgb(0, 0, Self::DEFAULT_LEVEL);
        let green = rgb(0, Self::DEFAULT_LEVEL, 0);

        let request = match state {
            DeviceState::Starting => EffectRequest::Blink {
                color: blue,
                interval: FAST,
            },
            DeviceState::WifiConfiguring => EffectRequest::Blink {
                color: blue,
                interval: SLOW,
            },
            DeviceState::Idle => EffectRequest::TurnOff,
            DeviceState::Connecting => EffectRequest::SolidColor(blue),
            DeviceState::Listening | DeviceState::AudioTesting => {
                let level = if voice_detected {
                    Self::HIGH_LEVEL
                } else {
                    Self::LOW_LEVEL
                };
                EffectRequest::SolidColor(rgb(level, 0, 0))
            }
            DeviceState::Speaking => EffectRequest::SolidColor(green),
            DeviceState::Upgrading => EffectRequest::Blink {
                color: green,
                interval: FAST,
            },
            DeviceState::Activating => EffectRequest::Blink {
                color: green,
                interval: SLOW,
            },
            DeviceState::Unknown => return None,
        };
        Some(request)
    }
}

/// PWM LED, samples are brightness percentages
pub struct GpioBinding;

impl GpioBinding {
    pub const DEFAULT_PERCENT: u8 = 50;
    pub const HIGH_PERCENT: u8 = 100;
    pub const LOW_PERCENT: u8 = 10;
    pub const IDLE_PERCENT: u8 = 5;
    pub const SPEAKING_PERCENT: u8 = 75;
    pub const UPGRADING_PERCENT: u8 = 25;
    pub const ACTIVATING_PERCENT: u8 = 35;
    /// Duration of one hardware fade ramp
    pub const FADE_RAMP: Duration = Duration::from_millis(1000);
}

impl StateBinding for GpioBinding {
    type Sample = u8;

    fn evaluate(
        state: DeviceState,
        voice_detected: bool,
        _brightness: BrightnessConfig,
    ) -> Option<EffectRequest<u8>> {
        let request = match state {
            DeviceState::Starting => EffectRequest::Blink {
                color: Self::DEFAULT_PERCENT,
                interval: FAST,
            },
            DeviceState::WifiConfiguring => EffectRequest::Blink {
                color: Self::DEFAULT_PERCENT,
                interval: SLOW,
            },
            DeviceState::Idle => EffectRequest::SolidColor(Self::IDLE_PERCENT),
            DeviceState::Connecting => EffectRequest::SolidColor(Self::DEFAULT_PERCENT),
            DeviceState::Listening | DeviceState::AudioTesting => EffectRequest::Breathe {
                low: 0,
                high: if voice_detected {
                    Self::HIGH_PERCENT
                } else {
                    Self::LOW_PERCENT
                },
                interval: Self::FADE_RAMP,
            },
            DeviceState::Speaking => EffectRequest::SolidColor(Self::SPEAKING_PERCENT),
            DeviceState::Upgrading => EffectRequest::Blink {
                color: Self::UPGRADING_PERCENT,
                interval: FAST,
            },
            DeviceState::Activating => EffectRequest::Blink {
                color: Self::ACTIVATING_PERCENT,
                interval: SLOW,
            },
            DeviceState::Unknown => return None,
        };
        Some(request)
    }
}
