//! Periodic timer capability and a std-thread implementation
//!
//! A timer invokes the callback it was created with once per interval, on its
//! own execution context. The engine creates its timer through a
//! [`TimerFactory`] so that the callback can be bound before the timer exists.
//!
//! Every `start` opens a new schedule generation, and each tick carries the
//! generation it was scheduled under. A tick that was already dispatched when
//! the timer was restarted therefore identifies itself as stale.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::EngineError;
use crate::lock;

/// Callback invoked on every tick with the generation of the schedule that fired it
pub type TickCallback = Box<dyn FnMut(u64) + Send + 'static>;

pub trait PeriodicTimer: Send + Sync + 'static {
    /// Start invoking the callback every `interval`. A running timer restarts
    /// with the new interval. Returns the generation passed to the ticks of
    /// this schedule.
    ///
    /// # Errors
    /// [`EngineError::InvalidInterval`] for a zero interval, or
    /// [`EngineError::Timer`] when the underlying timer refuses to start.
    fn start(&self, interval: Duration) -> Result<u64, EngineError>;

    /// Stop the timer. Idempotent. Once this returns no new invocation begins,
    /// though one already executing may still be completing.
    ///
    /// # Errors
    /// [`EngineError::Timer`] when the underlying timer refuses to stop.
    fn stop(&self) -> Result<(), EngineError>;
}

/// Creates timers bound to a callback.
///
/// Dropping a created timer must block until an in-flight callback has
/// returned, unless the drop happens on the timer's own execution context.
pub trait TimerFactory {
    type Timer: PeriodicTimer;

    /// # Errors
    /// [`EngineError::ResourceUnavailable`] when no timer can be created.
    fn create(&self, name: &'static str, callback: TickCallback) -> Result<Self::Timer, EngineError>;
}

/// Creates [`ThreadTimer`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTimerFactory;

impl TimerFactory for ThreadTimerFactory {
    type Timer = ThreadTimer;

    fn create(&self, name: &'static str, callback: TickCallback) -> Result<ThreadTimer, EngineError> {
        ThreadTimer::spawn(name, callback)
    }
}

#[derive(Debug, Default)]
struct Schedule {
    interval: Option<Duration>,
    /// Bumped on every start/stop so a sleeping worker notices reconfiguration
    generation: u64,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Control {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

/// Periodic timer backed by a dedicated worker thread.
///
/// The worker keeps an absolute deadline so the period does not drift with
/// callback duration. If a callback overruns a whole period, the missed tick
/// is delivered immediately rather than skipped.
pub struct ThreadTimer {
    control: Arc<Control>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    /// Spawn the worker thread. The timer starts stopped.
    ///
    /// # Errors
    /// [`EngineError::ResourceUnavailable`] if the thread cannot be spawned.
    pub fn spawn(name: &str, callback: TickCallback) -> Result<Self, EngineError> {
        let control = Arc::new(Control::default());
        let worker_control = Arc::clone(&control);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&worker_control, callback))
            .map_err(|e| EngineError::ResourceUnavailable(format!("timer thread '{name}': {e}")))?;
        debug!("Timer '{name}' created");

        Ok(Self {
            control,
            worker: Some(worker),
        })
    }

    fn reschedule(&self, interval: Option<Duration>) -> u64 {
        let mut schedule = lock(&self.control.schedule);
        schedule.interval = interval;
        schedule.generation = schedule.generation.wrapping_add(1);
        let generation = schedule.generation;
        drop(schedule);
        self.control.wake.notify_all();
        generation
    }
}

impl PeriodicTimer for ThreadTimer {
    fn start(&self, interval: Duration) -> Result<u64, EngineError> {
        if interval.is_zero() {
            return Err(EngineError::InvalidInterval(interval));
        }
        Ok(self.reschedule(Some(interval)))
    }

    fn stop(&self) -> Result<(), EngineError> {
        self.reschedule(None);
        Ok(())
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        lock(&self.control.schedule).shutdown = true;
        self.control.wake.notify_all();

        let Some(worker) = self.worker.take() else {
            return;
        };
        // Joining our own thread would deadlock; the worker exits on its own
        if worker.thread().id() == thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            warn!("Timer worker panicked");
        }
    }
}

fn run_worker(control: &Control, mut callback: TickCallback) {
    let mut schedule = lock(&control.schedule);
    // (generation, next deadline) of the schedule currently being served
    let mut armed: Option<(u64, Instant)> = None;

    loop {
        if schedule.shutdown {
            return;
        }
        let Some(interval) = schedule.interval else {
            armed = None;
            schedule = control
                .wake
                .wait(schedule)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            continue;
        };

        let deadline = match armed {
            Some((generation, deadline)) if generation == schedule.generation => deadline,
            _ => {
                let deadline = Instant::now() + interval;
                armed = Some((schedule.generation, deadline));
                deadline
            }
        };

        let now = Instant::now();
        if now < deadline {
            schedule = control
                .wake
                .wait_timeout(schedule, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
            // Re-check shutdown, stop and restart before firing
            continue;
        }

        let generation = schedule.generation;
        armed = Some((generation, deadline + interval));
        drop(schedule);
        callback(generation);
        schedule = lock(&control.schedule);
    }
}
