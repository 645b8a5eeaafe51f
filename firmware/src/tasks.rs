//! Worker threads
//!
//! Each worker future gets its own FreeRTOS-backed std thread and runs
//! there under `block_on`.

use core::future::Future;

use bsp_core::BspError;
use esp_idf_svc::hal::task::block_on;
use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;

use crate::board::threads;
use crate::{BoardKeys, BoardPlayer};

/// Start the debounce worker of `keys`
pub fn spawn_key_worker(keys: &'static BoardKeys) -> Result<(), BspError> {
    let worker = keys.worker()?;
    spawn(
        b"key_debounce\0",
        threads::KEY_STACK_SIZE,
        threads::KEY_PRIORITY,
        async move { worker.run().await },
    )
}

/// Start the deferred-stop timer of `player`
pub fn spawn_tone_timer(player: &'static BoardPlayer) -> Result<(), BspError> {
    let timer = player.stop_timer()?;
    spawn(
        b"tone_stop\0",
        threads::TONE_STACK_SIZE,
        threads::TONE_PRIORITY,
        async move { timer.run().await },
    )
}

fn spawn<F>(name: &'static [u8], stack_size: usize, priority: u8, worker: F) -> Result<(), BspError>
where
    F: Future + Send + 'static,
{
    let task_name = core::str::from_utf8(&name[..name.len().saturating_sub(1)]).unwrap_or("worker");

    ThreadSpawnConfiguration {
        name: Some(name),
        stack_size,
        priority,
        ..Default::default()
    }
    .set()
    .map_err(|e| {
        log::error!("Thread config for {} rejected: {}", task_name, e);
        BspError::NoResource
    })?;

    let spawned = std::thread::Builder::new()
        .stack_size(stack_size)
        .spawn(move || {
            block_on(worker);
        });

    // Later threads get the defaults again
    if let Err(e) = ThreadSpawnConfiguration::default().set() {
        log::warn!("Failed to restore thread config: {}", e);
    }

    match spawned {
        Ok(_) => {
            log::info!("Started {} (stack {}B, priority {})", task_name, stack_size, priority);
            Ok(())
        }
        Err(e) => {
            log::error!("Failed to start {}: {}", task_name, e);
            Err(BspError::NoResource)
        }
    }
}
