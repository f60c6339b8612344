use anyhow::{anyhow, Result};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use log::{debug, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

pub use statuslight_engine::BrightnessConfig;

/// Configurable log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
        }
    }
}

const NVS_NAMESPACE: &str = "statuslight";
const NVS_CONFIG_KEY: &str = "config";

// Global NVS handle - initialized once in main
static NVS: Mutex<Option<EspNvs<NvsDefault>>> = Mutex::new(None);

pub fn init_nvs(nvs_partition: EspNvsPartition<NvsDefault>) -> Result<()> {
    debug!("Initializing NVS namespace: {NVS_NAMESPACE}");
    let nvs = EspNvs::new(nvs_partition, NVS_NAMESPACE, true)?;
    *NVS.lock().map_err(|_| anyhow!("NVS lock poisoned"))? = Some(nvs);
    info!("NVS initialized");
    Ok(())
}

/// Which kind of status LED the board carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedKind {
    /// No status LED fitted
    None,
    /// Plain LED driven by LEDC PWM
    Gpio,
    /// One WS2812 pixel
    Single,
    /// WS2812 ring
    #[default]
    Strip,
}

pub const MAX_LEDS: usize = 256;
pub const MAX_PWM_RESOLUTION_BITS: u8 = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedConfig {
    #[serde(default)]
    pub kind: LedKind,
    /// Data pin for WS2812 LEDs, PWM output for the GPIO LED
    #[serde(default = "default_led_gpio")]
    pub gpio: u8,
    /// Pixels on the ring (ignored for single and GPIO LEDs)
    #[serde(default = "default_total_leds")]
    pub total_leds: usize,
    #[serde(default)]
    pub brightness: BrightnessConfig,
    #[serde(default = "default_pwm_frequency_hz")]
    pub pwm_frequency_hz: u32,
    /// LEDC duty resolution; 13 bits gives a maximum duty of 8191
    #[serde(default = "default_pwm_resolution_bits")]
    pub pwm_resolution_bits: u8,
    /// Drive the PWM output active-low
    #[serde(default)]
    pub output_invert: bool,
}

const fn default_led_gpio() -> u8 {
    48
}

const fn default_total_leds() -> usize {
    12
}

const fn default_pwm_frequency_hz() -> u32 {
    4000
}

const fn default_pwm_resolution_bits() -> u8 {
    13
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            kind: LedKind::default(),
            gpio: default_led_gpio(),
            total_leds: default_total_leds(),
            brightness: BrightnessConfig::default(),
            pwm_frequency_hz: default_pwm_frequency_hz(),
            pwm_resolution_bits: default_pwm_resolution_bits(),
            output_invert: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub led: LedConfig,
    /// Button that cycles the device state - set to 0 to disable
    #[serde(default)]
    pub button_pin: u8,
    /// Rotary encoder pin A (CLK) - set to 0 to disable encoder
    #[serde(default)]
    pub encoder_pin_a: u8,
    /// Rotary encoder pin B (DT) - set to 0 to disable encoder
    #[serde(default)]
    pub encoder_pin_b: u8,
}

impl Config {
    /// Clamp values to valid ranges and fix invalid values
    pub fn validate(&mut self) {
        let led = &mut self.led;
        if led.total_leds == 0 || led.total_leds > MAX_LEDS {
            let clamped = led.total_leds.clamp(1, MAX_LEDS);
            warn!("Clamping total_leds from {} to {clamped}", led.total_leds);
            led.total_leds = clamped;
        }
        if led.pwm_resolution_bits == 0 || led.pwm_resolution_bits > MAX_PWM_RESOLUTION_BITS {
            let clamped = led.pwm_resolution_bits.clamp(1, MAX_PWM_RESOLUTION_BITS);
            warn!("Clamping pwm_resolution_bits from {} to {clamped}", led.pwm_resolution_bits);
            led.pwm_resolution_bits = clamped;
        }
        if led.pwm_frequency_hz == 0 {
            warn!("PWM frequency is zero, resetting to default");
            led.pwm_frequency_hz = default_pwm_frequency_hz();
        }
        let levels = &mut led.brightness;
        if levels.low_level > levels.default_level {
            warn!(
                "Low brightness {} above default {}, lowering it",
                levels.low_level, levels.default_level
            );
            levels.low_level = levels.default_level;
        }
    }

    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(mut config) => {
                info!("Loaded config from NVS");
                config.validate();
                config
            }
            Err(e) => {
                warn!("Failed to load config from NVS: {e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn load() -> Result<Self> {
        debug!("Loading config from NVS");
        let nvs_guard = NVS.lock().map_err(|_| anyhow!("NVS lock poisoned"))?;
        let nvs = nvs_guard.as_ref().ok_or_else(|| anyhow!("NVS not initialized"))?;

        let Some(len) = nvs.blob_len(NVS_CONFIG_KEY)? else {
            return Err(anyhow!("No config found in NVS"));
        };
        debug!("Config blob size: {len} bytes");
        let mut buf = vec![0u8; len];
        nvs.get_blob(NVS_CONFIG_KEY, &mut buf)?;
        let config: Self = serde_json::from_slice(&buf)?;
        debug!(
            "Config parsed: led.kind={:?}, led.gpio={}, log_level={:?}",
            config.led.kind, config.led.gpio, config.log_level
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        debug!("Saving config to NVS");
        let mut nvs_guard = NVS.lock().map_err(|_| anyhow!("NVS lock poisoned"))?;
        let nvs = nvs_guard.as_mut().ok_or_else(|| anyhow!("NVS not initialized"))?;

        let json = serde_json::to_vec(self)?;
        debug!("Config JSON size: {} bytes", json.len());
        nvs.set_blob(NVS_CONFIG_KEY, &json)?;
        info!("Config saved to NVS");
        Ok(())
    }
}
