//! Status light engine
//!
//! This library renders a device's operating state as light patterns. It owns
//! the animation engine (a pixel buffer plus at most one running effect driven
//! by a periodic timer), the table mapping device states to effects, and the
//! LED variants built on top of them. It is hardware-agnostic: the pixel sink,
//! timer and PWM channel are traits implemented by the firmware, the simulator
//! and the tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod binding;
pub mod color;
pub mod effect;
pub mod engine;
pub mod error;
pub mod led;
pub mod sink;
pub mod state;
pub mod timer;

#[cfg(test)]
mod testing;

pub use binding::{BrightnessConfig, GpioBinding, SingleBinding, StateBinding, StripBinding};
pub use color::{ColorSample, OFF, RGB8};
pub use effect::{EffectKind, EffectRequest};
pub use engine::AnimationEngine;
pub use error::EngineError;
pub use led::{CircularStrip, FadeEndCallback, GpioLed, Led, NoLed, PwmChannel, SingleLed};
pub use sink::PixelSink;
pub use state::{AppStatus, AtomicDeviceState, DeviceState, DeviceStatus};
pub use timer::{PeriodicTimer, ThreadTimer, ThreadTimerFactory, TickCallback, TimerFactory};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Timer callbacks and interrupt dispatch run on contexts where a panic must
/// not take the LED down with it, so poisoning is ignored everywhere.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
