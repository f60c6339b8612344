//! WS2812 pixel sink and the board's LED factory

use std::sync::Arc;

use anyhow::{Context, Result};
use esp_idf_hal::gpio::AnyOutputPin;
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::rmt::config::TransmitConfig;
use esp_idf_hal::rmt::{RmtChannel, TxRmtDriver};
use log::{debug, info};
use smart_leds::SmartLedsWrite;
use statuslight_engine::sink::check_index;
use statuslight_engine::{
    CircularStrip, ColorSample, DeviceStatus, EngineError, GpioLed, Led, NoLed, PixelSink, SingleLed, OFF,
};
use ws2812_esp32_rmt_driver::Ws2812Esp32Rmt;

use crate::config::{LedConfig, LedKind};
use crate::pwm::LedcChannel;
use crate::tick_timer::EspTickTimers;

/// Staged pixels for a WS2812 chain on an RMT channel
pub struct StripSink {
    driver: Ws2812Esp32Rmt<'static>,
    staged: Vec<ColorSample>,
}

impl StripSink {
    pub fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'static,
        pin: AnyOutputPin,
        pixel_count: usize,
    ) -> Result<Self> {
        debug!("Creating WS2812 sink with {pixel_count} pixels");
        // Extra memory blocks keep the RMT fed while WiFi interrupts are busy
        let config = TransmitConfig::new().clock_divider(1).mem_block_num(4);
        let tx_driver = TxRmtDriver::new(channel, pin, &config)?;
        let driver = Ws2812Esp32Rmt::new_with_rmt_driver(tx_driver)?;

        Ok(Self {
            driver,
            staged: vec![OFF; pixel_count],
        })
    }
}

impl PixelSink for StripSink {
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
        self.driver
            .write(self.staged.iter().copied())
            .map_err(|e| EngineError::Sink(e.to_string()))
    }
}

/// Build the status LED the configuration asks for.
///
/// The RMT channel is only claimed by the WS2812 variants.
pub fn create_led<C: RmtChannel>(
    config: &LedConfig,
    status: Arc<dyn DeviceStatus>,
    rmt_channel: impl Peripheral<P = C> + 'static,
) -> Result<Arc<dyn Led>> {
    if config.kind == LedKind::None {
        info!("No status LED configured");
        return Ok(Arc::new(NoLed));
    }

    let gpio = config.gpio;
    // SAFETY: We trust the user-configured GPIO pin number is valid for this board
    let pin = unsafe { AnyOutputPin::new(i32::from(gpio)) };
    let timers = EspTickTimers::new()?;

    let led: Arc<dyn Led> = match config.kind {
        LedKind::Strip => {
            info!("Initializing {}-pixel ring on GPIO {gpio}", config.total_leds);
            let sink = StripSink::new(rmt_channel, pin, config.total_leds)?;
            Arc::new(
                CircularStrip::new(sink, &timers, status, config.brightness).context("creating LED ring")?,
            )
        }
        LedKind::Single => {
            info!("Initializing single pixel on GPIO {gpio}");
            let sink = StripSink::new(rmt_channel, pin, 1)?;
            Arc::new(SingleLed::new(sink, &timers, status).context("creating single LED")?)
        }
        LedKind::Gpio => {
            info!("Initializing PWM LED on GPIO {gpio}");
            let channel = LedcChannel::new(
                i32::from(gpio),
                config.output_invert,
                config.pwm_frequency_hz,
                config.pwm_resolution_bits,
            )
            .context("configuring LEDC")?;
            Arc::new(GpioLed::new(channel, &timers, status).context("creating PWM LED")?)
        }
        LedKind::None => Arc::new(NoLed),
    };
    Ok(led)
}
