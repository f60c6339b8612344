//! Terminal simulator for the status light engine
//!
//! Usage: cargo run -p statuslight-sim -- --variant strip --pixels 12
//! Steps through device states and draws the LED on the current line.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use log::info;
use statuslight_engine::{
    AppStatus, BrightnessConfig, CircularStrip, DeviceState, DeviceStatus, GpioLed, Led, NoLed, SingleLed,
    ThreadTimerFactory,
};

mod terminal;

use terminal::{SimPwm, TerminalSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Variant {
    /// Addressable ring
    Strip,
    /// One addressable pixel
    Single,
    /// PWM-driven LED
    Gpio,
    /// No LED at all
    None,
}

#[derive(Parser, Debug)]
#[command(name = "statuslight-sim")]
#[command(about = "Show device-state light patterns in the terminal")]
struct Args {
    /// LED hardware to simulate
    #[arg(short = 'V', long, value_enum, default_value = "strip")]
    variant: Variant,

    /// Pixels on the ring
    #[arg(short, long, default_value = "12")]
    pixels: usize,

    /// Default brightness level of the ring
    #[arg(long, default_value = "32")]
    default_level: u8,

    /// Low brightness level of the ring
    #[arg(long, default_value = "4")]
    low_level: u8,

    /// Display gain applied to pixel colors
    #[arg(short, long, default_value = "6")]
    gain: u8,

    /// PWM duty resolution in bits
    #[arg(long, default_value = "13", value_parser = clap::value_parser!(u8).range(1..=14))]
    resolution_bits: u8,

    /// How long to show each state (ms)
    #[arg(short, long, default_value = "3000")]
    dwell: u64,

    /// Report voice as detected while listening
    #[arg(long)]
    voice: bool,

    /// States to show, in order (defaults to every state)
    #[arg(short, long = "state", value_parser = parse_state)]
    states: Vec<DeviceState>,

    /// Repeat the script until interrupted
    #[arg(short, long)]
    repeat: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_state(name: &str) -> Result<DeviceState, String> {
    let wanted = name.replace('-', "_").to_lowercase();
    DeviceState::ALL
        .into_iter()
        .find(|state| state.name() == wanted)
        .ok_or_else(|| {
            let names: Vec<_> = DeviceState::ALL.iter().map(|s| s.name()).collect();
            format!("unknown state '{name}', expected one of: {}", names.join(", "))
        })
}

fn build_led(args: &Args, status: Arc<dyn DeviceStatus>) -> Result<Arc<dyn Led>> {
    let brightness = BrightnessConfig {
        default_level: args.default_level,
        low_level: args.low_level.min(args.default_level),
    };
    let led: Arc<dyn Led> = match args.variant {
        Variant::Strip => {
            if args.pixels == 0 {
                return Err(anyhow!("a ring needs at least one pixel"));
            }
            let sink = TerminalSink::new(args.pixels, args.gain);
            Arc::new(CircularStrip::new(sink, &ThreadTimerFactory, status, brightness)?)
        }
        Variant::Single => {
            let sink = TerminalSink::new(1, args.gain);
            Arc::new(SingleLed::new(sink, &ThreadTimerFactory, status)?)
        }
        Variant::Gpio => Arc::new(GpioLed::new(
            SimPwm::new(args.resolution_bits),
            &ThreadTimerFactory,
            status,
        )?),
        Variant::None => Arc::new(NoLed),
    };
    Ok(led)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let script: Vec<DeviceState> = if args.states.is_empty() {
        DeviceState::ALL.to_vec()
    } else {
        args.states.clone()
    };

    let status = Arc::new(AppStatus::new(DeviceState::Starting));
    status.set_voice_detected(args.voice);
    let led = build_led(&args, status.clone())?;
    let dwell = Duration::from_millis(args.dwell);

    info!("Simulating {:?} LED through {} states", args.variant, script.len());
    loop {
        for state in &script {
            println!();
            info!("Device state: {state}");
            status.set_state(*state);
            led.on_state_changed();
            thread::sleep(dwell);
        }
        if !args.repeat {
            break;
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_accepts_dashes_and_case() {
        assert_eq!(parse_state("wifi-configuring"), Ok(DeviceState::WifiConfiguring));
        assert_eq!(parse_state("Listening"), Ok(DeviceState::Listening));
        assert!(parse_state("sleeping").is_err());
    }

    #[test]
    fn test_args_parse_state_script() {
        let args = Args::parse_from(["statuslight-sim", "-V", "gpio", "-s", "idle", "--state", "speaking"]);
        assert_eq!(args.variant, Variant::Gpio);
        assert_eq!(args.states, vec![DeviceState::Idle, DeviceState::Speaking]);
        assert_eq!(args.pixels, 12);
    }
}
