//! Animation timers on the `esp_timer` task
//!
//! Callbacks are dispatched from the `esp_timer` task, not from an interrupt,
//! so they are free to take locks and drive the RMT.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};
use log::{debug, warn};
use statuslight_engine::{EngineError, PeriodicTimer, TickCallback, TimerFactory};

#[derive(Clone)]
pub struct EspTickTimers {
    service: EspTaskTimerService,
}

impl EspTickTimers {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            service: EspTaskTimerService::new()?,
        })
    }
}

impl TimerFactory for EspTickTimers {
    type Timer = EspTickTimer;

    fn create(&self, name: &'static str, mut callback: TickCallback) -> Result<EspTickTimer, EngineError> {
        // Held for the duration of every callback so that dropping the timer
        // can wait out one that is already running
        let in_flight = Arc::new(Mutex::new(()));
        let gate = Arc::clone(&in_flight);
        // 32 bits: the Xtensa cores have no 64-bit atomics
        let generation = Arc::new(AtomicU32::new(0));
        let current = Arc::clone(&generation);

        let timer = self
            .service
            .timer(move || {
                let _running = gate.lock().unwrap_or_else(PoisonError::into_inner);
                // Read before the callback blocks on the LED lock, so a restart
                // that happens meanwhile marks this tick as stale
                callback(u64::from(current.load(Ordering::SeqCst)));
            })
            .map_err(|e| EngineError::ResourceUnavailable(format!("esp_timer '{name}': {e}")))?;
        debug!("Timer '{name}' created");

        Ok(EspTickTimer {
            name,
            timer: Mutex::new(timer),
            in_flight,
            generation,
        })
    }
}

/// Periodic `esp_timer`. Must not be dropped from its own callback.
pub struct EspTickTimer {
    name: &'static str,
    timer: Mutex<EspTimer<'static>>,
    in_flight: Arc<Mutex<()>>,
    generation: Arc<AtomicU32>,
}

impl EspTickTimer {
    fn timer(&self) -> std::sync::MutexGuard<'_, EspTimer<'static>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PeriodicTimer for EspTickTimer {
    fn start(&self, interval: Duration) -> Result<u64, EngineError> {
        if interval.is_zero() {
            return Err(EngineError::InvalidInterval(interval));
        }
        let timer = self.timer();
        // `every` on a scheduled timer fails, so restart explicitly
        timer
            .cancel()
            .map_err(|e| EngineError::Timer(format!("{}: {e}", self.name)))?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        timer
            .every(interval)
            .map(|()| u64::from(generation))
            .map_err(|e| EngineError::Timer(format!("{}: {e}", self.name)))
    }

    fn stop(&self) -> Result<(), EngineError> {
        let cancelled = self.timer().cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cancelled
            .map(|_| ())
            .map_err(|e| EngineError::Timer(format!("{}: {e}", self.name)))
    }
}

impl Drop for EspTickTimer {
    fn drop(&mut self) {
        if let Err(e) = self.timer().cancel() {
            warn!("Failed to cancel timer '{}': {e}", self.name);
        }
        drop(self.in_flight.lock().unwrap_or_else(PoisonError::into_inner));
        debug!("Timer '{}' released", self.name);
    }
}
