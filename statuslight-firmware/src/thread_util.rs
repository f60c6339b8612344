//! Helper for spawning threads with FreeRTOS task names
//!
//! ESP-IDF creates the FreeRTOS task when the pthread is created, so a name set
//! through `std::thread::Builder::name()` arrives too late. The name has to go
//! in through `ThreadSpawnConfiguration` before spawning.

use std::ffi::CStr;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use esp_idf_hal::task::thread::ThreadSpawnConfiguration;

/// Spawn a thread with a FreeRTOS task name (at most 15 characters).
///
/// The previous spawn configuration is restored afterwards, also when the
/// spawn itself fails.
pub fn spawn_named<F, T>(name: &'static CStr, stack_size: usize, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let prev_conf = ThreadSpawnConfiguration::get();

    ThreadSpawnConfiguration {
        name: Some(name.to_bytes_with_nul()),
        stack_size,
        ..Default::default()
    }
    .set()
    .with_context(|| format!("spawn configuration for {name:?}"))?;

    let spawned = std::thread::Builder::new().stack_size(stack_size).spawn(f);

    if let Some(prev) = prev_conf {
        prev.set().context("restoring spawn configuration")?;
    }

    spawned.with_context(|| format!("spawning {name:?}"))
}
