//! Buzzer tone player
//!
//! One PWM channel at 50% duty drives the buzzer. Every peripheral access
//! goes through a mutex with a bounded wait. Timed notes either sleep on
//! the caller ([`TonePlayer::play_note`]) or hand their stop deadline to
//! the [`StopTimer`] ([`TonePlayer::play_note_async`]).
//!
//! Each started tone gets a new generation number. A deferred stop only
//! fires if no newer tone was started since it was scheduled, and a newer
//! `play_note_async` replaces the pending stop outright.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Instant, Timer};

use crate::hal::{HalError, PwmPeripheral};
use crate::types::{BspError, ToneConfig};

/// Deferred stop handed to the stop timer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct StopRequest {
    deadline: Instant,
    generation: u32,
}

pub struct TonePlayer<P: PwmPeripheral> {
    config: ToneConfig,
    pwm: Mutex<CriticalSectionRawMutex, P>,
    initialized: AtomicBool,
    generation: AtomicU32,
    stop_requests: Signal<CriticalSectionRawMutex, StopRequest>,
    timer_claimed: AtomicBool,
    timer_running: AtomicBool,
}

type PwmGuard<'p, P> = MutexGuard<'p, CriticalSectionRawMutex, P>;

impl<P: PwmPeripheral> TonePlayer<P> {
    /// Wrap the buzzer channel. Nothing touches the hardware until [`init`](Self::init).
    pub const fn new(pwm: P, config: ToneConfig) -> Self {
        Self {
            config,
            pwm: Mutex::new(pwm),
            initialized: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            stop_requests: Signal::new(),
            timer_claimed: AtomicBool::new(false),
            timer_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Configure timer and channel, leaving the buzzer silent.
    ///
    /// Calling it again while initialized does nothing. On failure the
    /// player stays uninitialized and `init` may be retried.
    pub async fn init(&self) -> Result<(), BspError> {
        if self.is_initialized() {
            warn!("Tone player already initialized");
            return Ok(());
        }
        let mut pwm = self.lock_pwm().await?;
        if self.is_initialized() {
            return Ok(());
        }

        pwm.configure_timer(&self.config.timer_config()).map_err(|e| {
            error!("PWM timer config failed: {:?}", e);
            e
        })?;
        pwm.configure_channel(&self.config.channel_config()).map_err(|e| {
            error!("PWM channel config failed: {:?}", e);
            e
        })?;
        Self::silence(&mut pwm).map_err(|e| {
            error!("Failed to silence buzzer: {:?}", e);
            e
        })?;

        self.initialized.store(true, Ordering::Release);
        info!("Tone player initialized on GPIO{}", self.config.gpio);
        Ok(())
    }

    /// Retune to `hz` and sound the buzzer until stopped.
    ///
    /// Also invalidates any pending deferred stop.
    pub async fn set_frequency(&self, hz: u32) -> Result<(), BspError> {
        self.start_tone(hz).await.map(|_| ())
    }

    /// Silence the buzzer, keeping the current frequency
    pub async fn stop(&self) -> Result<(), BspError> {
        let mut pwm = self.lock_initialized().await?;
        Self::silence(&mut pwm).map_err(|e| {
            error!("Failed to stop tone: {:?}", e);
            e.into()
        })
    }

    /// Sound `hz` for `duration_ms`, sleeping on the caller.
    ///
    /// The peripheral lock is released while sleeping, so other callers
    /// may retune or stop the buzzer in the meantime. A failure to stop
    /// afterwards is returned.
    pub async fn play_note(&self, hz: u32, duration_ms: u32) -> Result<(), BspError> {
        self.start_tone(hz).await?;
        Timer::after_millis(u64::from(duration_ms)).await;
        self.stop().await
    }

    /// Sound `hz` and return at once; the stop timer silences it after
    /// `duration_ms`.
    ///
    /// Without a running [`StopTimer`] the tone is silenced immediately and
    /// `NoResource` is returned.
    pub async fn play_note_async(&self, hz: u32, duration_ms: u32) -> Result<(), BspError> {
        let generation = self.start_tone(hz).await?;

        if !self.timer_running.load(Ordering::Acquire) {
            error!("No stop timer running for async note");
            if let Err(e) = self.stop().await {
                error!("Failed to silence unscheduled note: {:?}", e);
            }
            return Err(BspError::NoResource);
        }

        self.stop_requests.signal(StopRequest {
            deadline: Instant::now() + Duration::from_millis(u64::from(duration_ms)),
            generation,
        });
        Ok(())
    }

    /// Silence the buzzer and return to the uninitialized state.
    ///
    /// Does nothing when not initialized. A failure to silence is logged,
    /// not returned.
    pub async fn deinit(&self) -> Result<(), BspError> {
        if !self.is_initialized() {
            return Ok(());
        }
        let mut pwm = self.lock_pwm().await?;
        if !self.is_initialized() {
            return Ok(());
        }

        if let Err(e) = Self::silence(&mut pwm) {
            warn!("Failed to silence buzzer on deinit: {:?}", e);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.stop_requests.reset();
        self.initialized.store(false, Ordering::Release);
        info!("Tone player deinitialized");
        Ok(())
    }

    /// Claim the deferred-stop worker. Only one may exist at a time.
    pub fn stop_timer(&self) -> Result<StopTimer<'_, P>, BspError> {
        if self.timer_claimed.swap(true, Ordering::AcqRel) {
            return Err(BspError::InvalidState);
        }
        Ok(StopTimer { player: self })
    }

    /// Retune and raise duty; returns the new tone generation
    async fn start_tone(&self, hz: u32) -> Result<u32, BspError> {
        if !self.is_initialized() {
            return Err(BspError::InvalidState);
        }
        if !self.config.accepts(hz) {
            error!(
                "Invalid frequency: {} Hz (range: {}-{} Hz)",
                hz,
                self.config.min_hz,
                self.config.max_hz
            );
            return Err(BspError::InvalidArgument);
        }

        let mut pwm = self.lock_initialized().await?;
        pwm.set_frequency(hz).map_err(|e| {
            error!("PWM set frequency failed: {:?}", e);
            e
        })?;
        pwm.set_duty(self.config.duty_on())?;
        pwm.update_duty()?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        trace!("Tone {} Hz (generation {})", hz, generation);
        Ok(generation)
    }

    /// Silence the buzzer for `request` unless a newer tone has started
    async fn expire(&self, request: StopRequest) {
        if self.generation.load(Ordering::Acquire) != request.generation {
            debug!("Skipping stale stop (generation {})", request.generation);
            return;
        }

        let mut pwm = match self.lock_initialized().await {
            Ok(pwm) => pwm,
            Err(e) => {
                warn!("Deferred stop could not take the buzzer: {:?}", e);
                return;
            }
        };
        // A tone may have started while we waited for the lock
        if self.generation.load(Ordering::Acquire) != request.generation {
            return;
        }
        if let Err(e) = Self::silence(&mut pwm) {
            error!("Deferred stop failed: {:?}", e);
        }
    }

    async fn lock_pwm(&self) -> Result<PwmGuard<'_, P>, BspError> {
        with_timeout(self.config.lock_timeout(), self.pwm.lock())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for buzzer lock");
                BspError::Timeout
            })
    }

    async fn lock_initialized(&self) -> Result<PwmGuard<'_, P>, BspError> {
        if !self.is_initialized() {
            return Err(BspError::InvalidState);
        }
        let pwm = self.lock_pwm().await?;
        // deinit may have won the lock
        if !self.is_initialized() {
            return Err(BspError::InvalidState);
        }
        Ok(pwm)
    }

    fn silence(pwm: &mut P) -> Result<(), HalError> {
        pwm.set_duty(0)?;
        pwm.update_duty()
    }
}

/// Exclusive handle on the deferred-stop loop of a [`TonePlayer`]
pub struct StopTimer<'p, P: PwmPeripheral> {
    player: &'p TonePlayer<P>,
}

impl<'p, P: PwmPeripheral> StopTimer<'p, P> {
    /// Wait for stop requests and carry them out at their deadlines, forever.
    ///
    /// A request arriving before the pending deadline replaces it.
    pub async fn run(self) -> ! {
        let player = self.player;
        player.timer_running.store(true, Ordering::Release);
        info!("Tone stop timer started");

        let mut pending: Option<StopRequest> = None;
        loop {
            let request = match pending.take() {
                Some(request) => request,
                None => player.stop_requests.wait().await,
            };

            match select(Timer::at(request.deadline), player.stop_requests.wait()).await {
                Either::First(()) => player.expire(request).await,
                Either::Second(newer) => {
                    trace!("Stop for generation {} superseded", request.generation);
                    pending = Some(newer);
                }
            }
        }
    }
}

impl<'p, P: PwmPeripheral> Drop for StopTimer<'p, P> {
    fn drop(&mut self) {
        self.player.timer_running.store(false, Ordering::Release);
        self.player.timer_claimed.store(false, Ordering::Release);
    }
}
