//! Physical controls task
//!
//! Handles:
//! - Push button for stepping through device states (GPIO interrupt)
//! - Rotary encoder for LED brightness (PCNT hardware)
//!
//! ## Hardware wiring
//!
//! Internal pull-ups (~45kΩ) are enabled automatically. For extra debounce in
//! noisy environments add an RC filter:
//!
//! ```text
//! Encoder/Button Pin ──── 10kΩ ──┬── GPIO (with internal pull-up)
//!                                │
//!                              104 (100nF)
//!                                │
//!                               GND
//! ```
//!
//! The button should connect the GPIO pin to GND when pressed.

use core::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyIOPin, AnyInputPin, Input, InputPin, InterruptType, PinDriver, Pull};
use esp_idf_hal::pcnt::{Pcnt, PcntChannel, PcntChannelConfig, PcntControlMode, PcntCountMode, PcntDriver, PinIndex};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::task::notification::Notification;
use log::{debug, info, warn};
use statuslight_engine::BrightnessConfig;

use crate::State;

/// Brightness step per encoder detent
const BRIGHTNESS_STEP: i16 = 4;

/// How long to wait after last encoder movement before saving to NVS
const NVS_SAVE_DELAY: Duration = Duration::from_millis(1500);

/// Encoder polling interval
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Minimum time between button presses (debounce)
const BUTTON_DEBOUNCE: Duration = Duration::from_millis(200);

/// PCNT glitch filter in APB cycles (12.5µs at 80MHz)
const ENCODER_FILTER_CYCLES: u16 = 1000;

/// Brightness knob: a quadrature encoder decoded by a PCNT unit
pub struct Encoder<'d> {
    driver: PcntDriver<'d>,
    last_count: i16,
}

impl<'d> Encoder<'d> {
    /// Count on A edges with B as direction control, one count per detent.
    /// Clockwise turns count up.
    pub fn new<PCNT: Pcnt>(
        pcnt: impl Peripheral<P = PCNT> + 'd,
        pin_a: impl Peripheral<P = impl InputPin> + 'd,
        pin_b: impl Peripheral<P = impl InputPin> + 'd,
    ) -> Result<Self> {
        let mut driver = PcntDriver::new(pcnt, Some(pin_a), Some(pin_b), None::<AnyInputPin>, None::<AnyInputPin>)
            .context("creating PCNT driver")?;

        let quadrature = PcntChannelConfig {
            lctrl_mode: PcntControlMode::Reverse,
            hctrl_mode: PcntControlMode::Keep,
            pos_mode: PcntCountMode::Decrement,
            neg_mode: PcntCountMode::Increment,
            counter_h_lim: i16::MAX,
            counter_l_lim: i16::MIN,
        };
        driver
            .channel_config(PcntChannel::Channel0, PinIndex::Pin0, PinIndex::Pin1, &quadrature)
            .context("configuring encoder channel")?;
        driver.set_filter_value(ENCODER_FILTER_CYCLES)?;
        driver.filter_enable()?;
        driver.counter_clear()?;
        driver.counter_resume()?;

        Ok(Self { driver, last_count: 0 })
    }

    /// Detents turned since the previous call. Read errors count as no movement.
    pub fn take_detents(&mut self) -> i16 {
        let count = self.driver.get_counter_value().unwrap_or(self.last_count);
        let delta = count.wrapping_sub(self.last_count);
        self.last_count = count;
        delta
    }
}

/// Button that advances the device state, with interrupt wake-up and debounce
struct StateButton {
    pin: PinDriver<'static, AnyIOPin, Input>,
    notification: Notification,
    last_press: Option<Instant>,
}

impl StateButton {
    /// Pull-up input interrupting on the falling edge (press).
    fn new(button_pin: u8) -> Result<Self> {
        // SAFETY: We trust the user-configured GPIO pin number is valid
        let pin = unsafe { AnyIOPin::new(i32::from(button_pin)) };
        let mut pin = PinDriver::input(pin).with_context(|| format!("button on GPIO {button_pin}"))?;
        pin.set_pull(Pull::Up).context("button pull-up")?;
        pin.set_interrupt_type(InterruptType::NegEdge)
            .context("button interrupt type")?;

        Ok(Self {
            pin,
            notification: Notification::new(),
            last_press: None,
        })
    }

    /// Wait up to `timeout` for a press. Presses inside the debounce window are
    /// swallowed.
    fn wait_for_press(&mut self, timeout: Duration) -> bool {
        // Interrupts are disabled after each trigger, so re-arm every round
        let waker = self.notification.notifier();
        // SAFETY: The callback only notifies, no unsafe operations
        let subscribed = unsafe {
            self.pin.subscribe_nonstatic(move || {
                waker.notify(NonZeroU32::MIN);
            })
        }
        .is_ok();
        if subscribed {
            if let Err(e) = self.pin.enable_interrupt() {
                warn!("Failed to enable button interrupt: {e:?}");
            }
        }

        if self.notification.wait(TickType::from(timeout).ticks()).is_none() {
            return false;
        }
        let now = Instant::now();
        if self.last_press.is_some_and(|at| now.duration_since(at) < BUTTON_DEBOUNCE) {
            return false;
        }
        self.last_press = Some(now);
        true
    }
}

/// Run the controls task. Never returns.
///
/// Polls the encoder, reacts to button interrupts, and saves brightness to
/// NVS once the encoder has been left alone for a while.
#[allow(clippy::needless_pass_by_value)] // encoder is moved into this task
pub fn controls_task(state: &Arc<State>, mut encoder: Option<Encoder<'static>>) {
    info!("Controls task started");

    let (mut levels, button_pin) = {
        let cfg = state.config.lock().unwrap();
        (cfg.led.brightness, cfg.button_pin)
    };
    if let Some(encoder) = encoder.as_mut() {
        // Whatever was counted before the task started is not a user turn
        encoder.take_detents();
    }
    let mut last_change: Option<Instant> = None;

    let mut button = if button_pin == 0 {
        debug!("State button disabled (pin not configured)");
        None
    } else {
        info!("Initializing state button on GPIO {button_pin}...");
        StateButton::new(button_pin)
            .inspect_err(|e| warn!("State button unavailable: {e:#}"))
            .ok()
    };

    loop {
        let pressed = match button.as_mut() {
            Some(button) => button.wait_for_press(POLL_INTERVAL),
            None => {
                std::thread::sleep(POLL_INTERVAL);
                false
            }
        };
        if pressed {
            let next = state.status.advance();
            info!("Button: device state -> {next}");
            state.led.on_state_changed();
        }

        let detents = encoder.as_mut().map_or(0, Encoder::take_detents);
        if detents != 0 {
            let adjusted = adjust_levels(levels, detents);
            if adjusted != levels {
                levels = adjusted;
                debug!("Encoder: brightness -> {}/{}", levels.default_level, levels.low_level);
                state.led.apply_brightness(levels);
                last_change = Some(Instant::now());
            }
        }

        if last_change.is_some_and(|changed_at| changed_at.elapsed() >= NVS_SAVE_DELAY) {
            let mut cfg = state.config.lock().unwrap();
            debug!("Controls: saving brightness {} to NVS", levels.default_level);
            cfg.led.brightness = levels;
            if let Err(e) = cfg.save() {
                warn!("Failed to save config to NVS: {e}");
            }
            last_change = None;
        }
    }
}

/// Move the default level by `delta` detents, keeping the low level at or
/// below it.
fn adjust_levels(levels: BrightnessConfig, delta: i16) -> BrightnessConfig {
    let default_level = i16::from(levels.default_level)
        .saturating_add(delta.saturating_mul(BRIGHTNESS_STEP))
        .clamp(0, i16::from(u8::MAX));
    // Safe cast: clamped to 0..=255
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let default_level = default_level as u8;
    BrightnessConfig {
        default_level,
        low_level: levels.low_level.min(default_level),
    }
}
