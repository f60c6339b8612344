//! LEDC PWM channel with hardware fading
//!
//! The fade-end interrupt only notifies a dispatch task; the subscribed
//! callback runs there, where it may take the LED's lock. The interrupt also
//! records which fade ended, so the callback can tell a queued event of a
//! cancelled fade from the one currently running.

use core::ffi::c_void;
use core::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use esp_idf_hal::delay::BLOCK;
use esp_idf_hal::task::notification::{Notification, Notifier};
use esp_idf_svc::sys::{
    esp, ledc_cb_event_t_LEDC_FADE_END_EVT, ledc_cb_param_t, ledc_cb_register, ledc_cbs_t,
    ledc_channel_config, ledc_channel_config_t, ledc_channel_t, ledc_channel_t_LEDC_CHANNEL_0,
    ledc_fade_func_install, ledc_fade_func_uninstall, ledc_fade_mode_t_LEDC_FADE_NO_WAIT, ledc_fade_start,
    ledc_fade_stop, ledc_intr_type_t_LEDC_INTR_DISABLE, ledc_mode_t, ledc_mode_t_LEDC_LOW_SPEED_MODE,
    ledc_set_duty, ledc_set_fade_with_time, ledc_timer_config, ledc_timer_config_t,
    ledc_timer_t_LEDC_TIMER_1, ledc_update_duty, soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK, EspError,
};
use log::{debug, warn};
use statuslight_engine::{EngineError, FadeEndCallback, PwmChannel};

use crate::thread_util::spawn_named;

const SPEED_MODE: ledc_mode_t = ledc_mode_t_LEDC_LOW_SPEED_MODE;
const CHANNEL: ledc_channel_t = ledc_channel_t_LEDC_CHANNEL_0;

/// Notification bits sent to the dispatch task
const FADE_END: NonZeroU32 = NonZeroU32::MIN;
const SHUTDOWN: NonZeroU32 = NonZeroU32::MIN.saturating_add(1);

const DISPATCH_STACK_SIZE: usize = 4096;

#[derive(Default)]
struct FadeIds {
    /// Id of the last fade handed to the hardware
    started: AtomicU32,
    /// Id of the fade that was running when the last fade-end interrupt fired
    ended: AtomicU32,
}

/// User argument of the fade-end interrupt
struct IsrContext {
    notifier: Arc<Notifier>,
    ids: Arc<FadeIds>,
}

fn ledc_error(op: &'static str) -> impl Fn(EspError) -> EngineError {
    move |e| EngineError::Sink(format!("{op}: {e}"))
}

/// Fade-end interrupt handler. Runs in ISR context.
unsafe extern "C" fn fade_end_isr(param: *const ledc_cb_param_t, user_arg: *mut c_void) -> bool {
    if !param.is_null() && (*param).event == ledc_cb_event_t_LEDC_FADE_END_EVT {
        let context = &*user_arg.cast::<IsrContext>();
        let ids = &context.ids;
        ids.ended.store(ids.started.load(Ordering::SeqCst), Ordering::SeqCst);
        return context.notifier.notify(FADE_END);
    }
    false
}

pub struct LedcChannel {
    max_duty: u32,
    callback: Arc<Mutex<Option<FadeEndCallback>>>,
    ids: Arc<FadeIds>,
    /// Owned through `Box::into_raw`; the ISR borrows it as its user argument
    isr_context: *mut IsrContext,
    dispatcher: Option<JoinHandle<()>>,
}

// The raw context pointer is only dereferenced by the ISR and in `drop`
unsafe impl Send for LedcChannel {}

impl LedcChannel {
    /// Configure LEDC timer 1 / channel 0 on `gpio` and install the fade service.
    pub fn new(gpio: i32, output_invert: bool, frequency_hz: u32, resolution_bits: u8) -> Result<Self, EngineError> {
        let timer_config = ledc_timer_config_t {
            speed_mode: SPEED_MODE,
            duty_resolution: u32::from(resolution_bits),
            timer_num: ledc_timer_t_LEDC_TIMER_1,
            freq_hz: frequency_hz,
            clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        };
        // SAFETY: the config outlives the call
        esp!(unsafe { ledc_timer_config(&timer_config) }).map_err(ledc_error("ledc_timer_config"))?;

        let mut channel_config = ledc_channel_config_t {
            gpio_num: gpio,
            speed_mode: SPEED_MODE,
            channel: CHANNEL,
            intr_type: ledc_intr_type_t_LEDC_INTR_DISABLE,
            timer_sel: ledc_timer_t_LEDC_TIMER_1,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        channel_config.flags.set_output_invert(u32::from(output_invert));
        // SAFETY: as above
        esp!(unsafe { ledc_channel_config(&channel_config) }).map_err(ledc_error("ledc_channel_config"))?;
        // SAFETY: plain service install, no pointers
        esp!(unsafe { ledc_fade_func_install(0) }).map_err(ledc_error("ledc_fade_func_install"))?;

        let callback: Arc<Mutex<Option<FadeEndCallback>>> = Arc::new(Mutex::new(None));
        let ids = Arc::new(FadeIds::default());
        let (dispatcher, notifier) = match spawn_dispatcher(Arc::clone(&callback), Arc::clone(&ids)) {
            Ok(spawned) => spawned,
            Err(e) => {
                // SAFETY: installed above, nothing registered yet
                unsafe { ledc_fade_func_uninstall() };
                return Err(e);
            }
        };
        let isr_context = Box::into_raw(Box::new(IsrContext {
            notifier,
            ids: Arc::clone(&ids),
        }));

        let mut callbacks = ledc_cbs_t {
            fade_cb: Some(fade_end_isr),
        };
        // SAFETY: `isr_context` stays alive until `drop` has unregistered the callback
        let registered = esp!(unsafe { ledc_cb_register(SPEED_MODE, CHANNEL, &mut callbacks, isr_context.cast()) });

        let channel = Self {
            max_duty: (1u32 << resolution_bits) - 1,
            callback,
            ids,
            isr_context,
            dispatcher: Some(dispatcher),
        };
        registered.map_err(ledc_error("ledc_cb_register"))?;
        debug!("LEDC channel ready on GPIO {gpio}, {frequency_hz} Hz, max duty {}", channel.max_duty);
        Ok(channel)
    }
}

/// Start the task that runs the fade-end callback, returning the notifier the
/// ISR wakes it with.
fn spawn_dispatcher(
    callback: Arc<Mutex<Option<FadeEndCallback>>>,
    ids: Arc<FadeIds>,
) -> Result<(JoinHandle<()>, Arc<Notifier>), EngineError> {
    let (tx, rx) = mpsc::sync_channel(1);
    let handle = spawn_named(c"led_fade", DISPATCH_STACK_SIZE, move || {
        // The notification belongs to the task that waits on it
        let notification = Notification::new();
        if tx.send(notification.notifier()).is_err() {
            return;
        }
        loop {
            let Some(bits) = notification.wait(BLOCK) else {
                continue;
            };
            if bits.get() & SHUTDOWN.get() != 0 {
                break;
            }
            if bits.get() & FADE_END.get() != 0 {
                let fade = ids.ended.load(Ordering::SeqCst);
                if let Some(callback) = callback.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
                    callback(fade);
                }
            }
        }
        debug!("LED fade dispatcher stopped");
    })
    .map_err(|e| EngineError::ResourceUnavailable(format!("{e:#}")))?;

    let notifier = rx
        .recv()
        .map_err(|_| EngineError::ResourceUnavailable("LED fade dispatcher exited".to_string()))?;
    Ok((handle, notifier))
}

impl PwmChannel for LedcChannel {
    fn max_duty(&self) -> u32 {
        self.max_duty
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), EngineError> {
        // SAFETY: channel configured in `new`
        esp!(unsafe { ledc_set_duty(SPEED_MODE, CHANNEL, duty) }).map_err(ledc_error("ledc_set_duty"))?;
        esp!(unsafe { ledc_update_duty(SPEED_MODE, CHANNEL) }).map_err(ledc_error("ledc_update_duty"))
    }

    fn start_fade(&mut self, target: u32, ramp: Duration) -> Result<u32, EngineError> {
        let ramp_ms = i32::try_from(ramp.as_millis()).unwrap_or(i32::MAX);
        // Published before the hardware starts so its interrupt reports this id
        let fade = self.ids.started.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        // SAFETY: channel configured and fade service installed in `new`
        esp!(unsafe { ledc_set_fade_with_time(SPEED_MODE, CHANNEL, target, ramp_ms) })
            .map_err(ledc_error("ledc_set_fade_with_time"))?;
        esp!(unsafe { ledc_fade_start(SPEED_MODE, CHANNEL, ledc_fade_mode_t_LEDC_FADE_NO_WAIT) })
            .map_err(ledc_error("ledc_fade_start"))?;
        Ok(fade)
    }

    fn stop_fade(&mut self) -> Result<(), EngineError> {
        // SAFETY: as above
        esp!(unsafe { ledc_fade_stop(SPEED_MODE, CHANNEL) }).map_err(ledc_error("ledc_fade_stop"))
    }

    fn subscribe_fade_end(&mut self, callback: FadeEndCallback) -> Result<(), EngineError> {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
        Ok(())
    }
}

impl Drop for LedcChannel {
    fn drop(&mut self) {
        let mut callbacks = ledc_cbs_t { fade_cb: None };
        // SAFETY: after unregistering and stopping the fade the ISR no longer
        // touches the context
        unsafe {
            ledc_cb_register(SPEED_MODE, CHANNEL, &mut callbacks, core::ptr::null_mut());
            ledc_fade_stop(SPEED_MODE, CHANNEL);
            (*self.isr_context).notifier.notify(SHUTDOWN);
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            // Dropped from the fade callback itself: the task exits on its own
            if dispatcher.thread().id() != thread::current().id() && dispatcher.join().is_err() {
                warn!("LED fade dispatcher panicked");
            }
        }

        // SAFETY: uninstalled last, after the dispatcher stopped using the channel
        unsafe {
            ledc_fade_func_uninstall();
            drop(Box::from_raw(self.isr_context));
        }
    }
}
