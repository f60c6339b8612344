//! Terminal stand-ins for the LED hardware
//!
//! Frames are drawn as truecolor blocks on a single line that is rewritten on
//! every commit.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use statuslight_engine::sink::check_index;
use statuslight_engine::{ColorSample, EngineError, FadeEndCallback, PixelSink, PwmChannel, OFF};

/// Steps used to animate one emulated hardware fade
const FADE_STEPS: u32 = 25;

fn draw(cells: &[(u8, u8, u8)]) -> io::Result<()> {
    let mut line = String::from("\r");
    for (r, g, b) in cells {
        line.push_str(&format!("\x1b[38;2;{r};{g};{b}m\u{25cf} "));
    }
    line.push_str("\x1b[0m");
    let mut stdout = io::stdout().lock();
    stdout.write_all(line.as_bytes())?;
    stdout.flush()
}

fn amplify(channel: u8, gain: u8) -> u8 {
    channel.saturating_mul(gain)
}

/// Pixel sink rendering to stdout
pub struct TerminalSink {
    staged: Vec<ColorSample>,
    /// Status levels are dim on a screen, so scale them up for display
    gain: u8,
}

impl TerminalSink {
    pub fn new(pixel_count: usize, gain: u8) -> Self {
        Self {
            staged: vec![OFF; pixel_count],
            gain,
        }
    }
}

impl PixelSink for TerminalSink {
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
        let cells: Vec<_> = self
            .staged
            .iter()
            .map(|c| (amplify(c.r, self.gain), amplify(c.g, self.gain), amplify(c.b, self.gain)))
            .collect();
        draw(&cells).map_err(|e| EngineError::Sink(e.to_string()))
    }
}

struct PwmShared {
    max_duty: u32,
    duty: Mutex<u32>,
    /// Bumped by every fade start and stop; a fade thread quits once it changes.
    /// Doubles as the fade id.
    generation: AtomicU32,
    fade_end: Mutex<Option<FadeEndCallback>>,
}

impl PwmShared {
    fn show(&self, duty: u32) {
        *self.duty.lock().unwrap_or_else(PoisonError::into_inner) = duty;
        let level = u8::try_from(duty * 255 / self.max_duty.max(1)).unwrap_or(u8::MAX);
        let _ = draw(&[(level, level, level)]);
    }
}

/// PWM channel emulating hardware fades with a thread per ramp
pub struct SimPwm {
    shared: Arc<PwmShared>,
}

impl SimPwm {
    pub fn new(resolution_bits: u8) -> Self {
        Self {
            shared: Arc::new(PwmShared {
                max_duty: (1u32 << resolution_bits) - 1,
                duty: Mutex::new(0),
                generation: AtomicU32::new(0),
                fade_end: Mutex::new(None),
            }),
        }
    }
}

impl PwmChannel for SimPwm {
    fn max_duty(&self) -> u32 {
        self.shared.max_duty
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), EngineError> {
        self.shared.show(duty.min(self.shared.max_duty));
        Ok(())
    }

    fn start_fade(&mut self, target: u32, ramp: Duration) -> Result<u32, EngineError> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let shared = Arc::clone(&self.shared);
        let from = *shared.duty.lock().unwrap_or_else(PoisonError::into_inner);
        let step = ramp / FADE_STEPS;

        thread::Builder::new()
            .name("sim_fade".to_string())
            .spawn(move || {
                for i in 1..=FADE_STEPS {
                    thread::sleep(step);
                    if shared.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    let duty = if target >= from {
                        from + (target - from) * i / FADE_STEPS
                    } else {
                        from - (from - target) * i / FADE_STEPS
                    };
                    shared.show(duty);
                }
                if let Some(callback) = shared.fade_end.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
                    callback(generation);
                }
            })
            .map(|_| generation)
            .map_err(|e| EngineError::ResourceUnavailable(e.to_string()))
    }

    fn stop_fade(&mut self) -> Result<(), EngineError> {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_fade_end(&mut self, callback: FadeEndCallback) -> Result<(), EngineError> {
        *self.shared.fade_end.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        Ok(())
    }
}
