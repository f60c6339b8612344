use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyInputPin;
use esp_idf_hal::prelude::*;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};
use statuslight_engine::{AppStatus, DeviceState, Led};
use std::sync::{Arc, Mutex};

mod config;
mod controls;
mod leds;
mod pwm;
mod thread_util;
mod tick_timer;

use config::Config;

/// How long the boot animation stays up before the device reports idle
const BOOT_DISPLAY_MS: u32 = 3000;

const CONTROLS_STACK_SIZE: usize = 4096;

/// Shared between the main task and the controls task
pub struct State {
    pub config: Mutex<Config>,
    pub status: Arc<AppStatus>,
    pub led: Arc<dyn Led>,
}

fn main() -> Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting statuslight firmware {}...", env!("GIT_VERSION"));

    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    config::init_nvs(nvs)?;
    let config = Config::load_or_default();

    // Set for all targets (use "*" for global)
    let level = config.log_level.as_level_filter();
    if let Err(e) = esp_idf_svc::log::set_target_level("*", level) {
        warn!("Failed to set log level: {e}");
    } else {
        info!("Log level set to {:?}", config.log_level);
    }

    let status = Arc::new(AppStatus::new(DeviceState::Starting));
    let led = leds::create_led(&config.led, status.clone(), peripherals.rmt.channel0)?;
    led.on_state_changed();

    let encoder = if config.encoder_pin_a != 0 && config.encoder_pin_b != 0 {
        info!(
            "Initializing rotary encoder on GPIO {}/{}...",
            config.encoder_pin_a, config.encoder_pin_b
        );
        // SAFETY: We trust the user-configured GPIO pin numbers are valid for this board
        let (pin_a, pin_b) = unsafe {
            (
                AnyInputPin::new(i32::from(config.encoder_pin_a)),
                AnyInputPin::new(i32::from(config.encoder_pin_b)),
            )
        };
        match controls::Encoder::new(peripherals.pcnt0, pin_a, pin_b) {
            Ok(encoder) => Some(encoder),
            Err(e) => {
                warn!("Failed to initialize rotary encoder: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let state = Arc::new(State {
        config: Mutex::new(config),
        status,
        led,
    });

    {
        let state = state.clone();
        thread_util::spawn_named(c"controls", CONTROLS_STACK_SIZE, move || {
            controls::controls_task(&state, encoder);
        })?;
    }

    FreeRtos::delay_ms(BOOT_DISPLAY_MS);
    state.status.set_state(DeviceState::Idle);
    state.led.on_state_changed();
    info!("All systems running!");

    // Main loop - keep alive
    loop {
        FreeRtos::delay_ms(1000);
    }
}
