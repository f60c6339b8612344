//! LED variants driven by device state

use crate::binding::BrightnessConfig;

mod gpio;
mod single;
mod strip;

pub use gpio::{FadeEndCallback, GpioLed, PwmChannel};
pub use single::SingleLed;
pub use strip::CircularStrip;

/// An LED that shows the device state.
///
/// The application calls [`Led::on_state_changed`] after changing the state;
/// the LED pulls the state and voice flag itself and switches effect.
pub trait Led: Send + Sync {
    fn on_state_changed(&self);

    /// Apply new brightness levels. Only the strip has adjustable levels.
    fn apply_brightness(&self, _levels: BrightnessConfig) {}
}

/// Stand-in for boards without a status LED
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLed;

impl Led for NoLed {
    fn on_state_changed(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_led_accepts_everything() {
        let led: Box<dyn Led> = Box::new(NoLed);
        led.on_state_changed();
        led.apply_brightness(BrightnessConfig::default());
    }
}
