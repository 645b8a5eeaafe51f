//! Debounced key manager
//!
//! GPIO edges are pushed by [`KeyManager::on_interrupt`] onto a bounded
//! queue. A single [`DebounceWorker`] drains the queue, waits out the
//! debounce window, re-samples the pin and reports clean press/release
//! transitions to the key's [`KeyHandler`].

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::Timer;
use embedded_hal::digital::PinState;
use heapless::Vec;

use crate::hal::{GpioController, GpioNum, HalError, InterruptTrigger};
use crate::types::{BspError, KeyConfig, KeyEvent, KEY_QUEUE_DEPTH, MAX_KEYS};

/// Receiver of debounced key events.
///
/// Called from the debounce worker, never from interrupt context. Handlers
/// may do moderate work but must not block indefinitely: every other key
/// waits behind them.
pub trait KeyHandler: Sync {
    fn on_key(&self, gpio: GpioNum, event: KeyEvent);
}

impl<F> KeyHandler for F
where
    F: Fn(GpioNum, KeyEvent) + Sync,
{
    fn on_key(&self, gpio: GpioNum, event: KeyEvent) {
        self(gpio, event)
    }
}

/// One monitored button
#[derive(Clone, Copy)]
struct KeyEntry<'a> {
    gpio: GpioNum,
    active_level: PinState,
    pressed: bool,
    handler: Option<&'a dyn KeyHandler>,
}

impl<'a> KeyEntry<'a> {
    /// Seed the debounced state from the level sampled at registration
    fn new(gpio: GpioNum, active_level: PinState, level: PinState) -> Self {
        Self {
            gpio,
            active_level,
            pressed: level == active_level,
            handler: None,
        }
    }

    /// Fold a settled level into the debounced state
    fn settle(&mut self, level: PinState) -> Option<KeyEvent> {
        let pressed = level == self.active_level;
        if pressed == self.pressed {
            return None;
        }
        self.pressed = pressed;
        Some(KeyEvent::from_pressed(pressed))
    }
}

type KeyTable<'a, const KEYS: usize> = Mutex<CriticalSectionRawMutex, RefCell<Vec<KeyEntry<'a>, KEYS>>>;

/// Interrupt-fed key manager
///
/// `KEYS` bounds the key table and `QUEUE` the number of undebounced edges
/// that can be pending at once; edges beyond that are dropped and counted.
pub struct KeyManager<'a, G: GpioController, const KEYS: usize = MAX_KEYS, const QUEUE: usize = KEY_QUEUE_DEPTH> {
    gpio: G,
    config: KeyConfig,
    keys: KeyTable<'a, KEYS>,
    events: Channel<CriticalSectionRawMutex, GpioNum, QUEUE>,
    dropped: AtomicU32,
    worker_claimed: AtomicBool,
}

impl<'a, G: GpioController, const KEYS: usize, const QUEUE: usize> KeyManager<'a, G, KEYS, QUEUE> {
    /// Install the GPIO interrupt service and create an empty key table.
    ///
    /// An interrupt service installed by another driver is reused.
    pub fn new(gpio: G, config: KeyConfig) -> Result<Self, BspError> {
        match gpio.install_isr_service() {
            Ok(()) => {}
            Err(HalError::AlreadyInstalled) => debug!("GPIO ISR service already installed"),
            Err(e) => {
                error!("GPIO ISR service install failed: {:?}", e);
                return Err(e.into());
            }
        }

        Ok(Self {
            gpio,
            config,
            keys: Mutex::new(RefCell::new(Vec::new())),
            events: Channel::new(),
            dropped: AtomicU32::new(0),
            worker_claimed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &KeyConfig {
        &self.config
    }

    /// Start monitoring `gpio`; `active_level` is the level that means pressed.
    ///
    /// A key already held at registration starts out pressed, so it reports
    /// nothing until it is released.
    pub fn add_key(&self, gpio: GpioNum, active_level: PinState) -> Result<(), BspError> {
        let (exists, full) = self.keys.lock(|keys| {
            let keys = keys.borrow();
            (keys.iter().any(|k| k.gpio == gpio), keys.is_full())
        });
        if exists {
            warn!("Key GPIO{} already registered", gpio);
            return Err(BspError::AlreadyRegistered);
        }
        if full {
            error!("No space to add key GPIO{}", gpio);
            return Err(BspError::TableFull);
        }

        let level = self.gpio.level(gpio)?;
        self.gpio.set_interrupt_trigger(gpio, InterruptTrigger::AnyEdge)?;
        self.gpio.attach_isr(gpio)?;

        self.keys.lock(|keys| {
            let mut keys = keys.borrow_mut();
            if keys.iter().any(|k| k.gpio == gpio) {
                return Err(BspError::AlreadyRegistered);
            }
            keys.push(KeyEntry::new(gpio, active_level, level))
                .map_err(|_| BspError::TableFull)
        })?;

        info!("Added key GPIO{} active_high={}", gpio, active_level == PinState::High);
        Ok(())
    }

    /// Attach, replace or (with `None`) detach the handler of a registered key
    pub fn register_callback(&self, gpio: GpioNum, handler: Option<&'a dyn KeyHandler>) -> Result<(), BspError> {
        let result = self.keys.lock(|keys| {
            let mut keys = keys.borrow_mut();
            let entry = keys.iter_mut().find(|k| k.gpio == gpio).ok_or(BspError::NotFound)?;
            entry.handler = handler;
            Ok(())
        });
        if result.is_err() {
            warn!("Key GPIO{} not found when registering callback", gpio);
        }
        result
    }

    /// Interrupt entry point: queue `gpio` for debouncing.
    ///
    /// Never blocks and never logs. A full queue drops the edge.
    #[inline]
    pub fn on_interrupt(&self, gpio: GpioNum) {
        if self.events.try_send(gpio).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Edges discarded because the queue was full
    pub fn dropped_events(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Debounced state of a registered key
    pub fn is_pressed(&self, gpio: GpioNum) -> Result<bool, BspError> {
        self.keys.lock(|keys| {
            keys.borrow()
                .iter()
                .find(|k| k.gpio == gpio)
                .map(|k| k.pressed)
                .ok_or(BspError::NotFound)
        })
    }

    pub fn key_count(&self) -> usize {
        self.keys.lock(|keys| keys.borrow().len())
    }

    /// Claim the debounce worker. Only one may exist at a time.
    pub fn worker(&self) -> Result<DebounceWorker<'_, 'a, G, KEYS, QUEUE>, BspError> {
        if self.worker_claimed.swap(true, Ordering::AcqRel) {
            return Err(BspError::InvalidState);
        }
        Ok(DebounceWorker { manager: self })
    }

    /// Sample a settled pin and dispatch the resulting transition, if any
    fn settle(&self, gpio: GpioNum) {
        let level = match self.gpio.level(gpio) {
            Ok(level) => level,
            Err(e) => {
                warn!("Failed to sample key GPIO{}: {:?}", gpio, e);
                return;
            }
        };

        // Handler runs outside the table lock
        let outcome = self.keys.lock(|keys| {
            let mut keys = keys.borrow_mut();
            let entry = keys.iter_mut().find(|k| k.gpio == gpio)?;
            entry.settle(level).map(|event| (event, entry.handler))
        });

        match outcome {
            Some((event, Some(handler))) => {
                debug!("Key GPIO{} pressed={}", gpio, event.is_press());
                handler.on_key(gpio, event);
            }
            Some((event, None)) => {
                trace!("Key GPIO{} pressed={} (no handler)", gpio, event.is_press());
            }
            None => {}
        }
    }
}

/// Exclusive handle on the debounce loop of a [`KeyManager`]
pub struct DebounceWorker<'m, 'a, G: GpioController, const KEYS: usize, const QUEUE: usize> {
    manager: &'m KeyManager<'a, G, KEYS, QUEUE>,
}

impl<'m, 'a, G: GpioController, const KEYS: usize, const QUEUE: usize> DebounceWorker<'m, 'a, G, KEYS, QUEUE> {
    /// Process queued edges one at a time, forever.
    ///
    /// Each edge costs one full debounce window, so a burst on one key
    /// delays every other key queued behind it.
    pub async fn run(self) -> ! {
        let debounce = self.manager.config.debounce();
        info!("Key debounce worker started ({}ms)", self.manager.config.debounce_ms);

        loop {
            let gpio = self.manager.events.receive().await;
            Timer::after(debounce).await;
            self.manager.settle(gpio);
        }
    }
}

impl<'m, 'a, G: GpioController, const KEYS: usize, const QUEUE: usize> Drop for DebounceWorker<'m, 'a, G, KEYS, QUEUE> {
    fn drop(&mut self) {
        self.manager.worker_claimed.store(false, Ordering::Release);
    }
}
