use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::block_on;

use s3_bsp_firmware::board::{pins, tones};
use s3_bsp_firmware::*;

// Static resources
static KEYS: StaticCell<BoardKeys> = StaticCell::new();
static PLAYER: StaticCell<BoardPlayer> = StaticCell::new();
static KEY_PRESSES: Channel<CriticalSectionRawMutex, GpioNum, 4> = Channel::new();
static BEEP_ON_PRESS: BeepOnPress = BeepOnPress;

/// Forwards presses to the main loop; runs on the debounce thread
struct BeepOnPress;

impl KeyHandler for BeepOnPress {
    fn on_key(&self, gpio: GpioNum, event: KeyEvent) {
        log::info!("Key GPIO{} {:?}", gpio, event);
        if event == KeyEvent::Press && KEY_PRESSES.try_send(gpio).is_err() {
            log::warn!("Key press backlog full, GPIO{} dropped", gpio);
        }
    }
}

fn main() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("S3 BSP v{} starting", VERSION);

    if let Err(e) = block_on(run()) {
        log::error!("Board bring-up failed: {}", e);
    }
}

async fn run() -> Result<(), BspError> {
    let peripherals = Peripherals::take().map_err(platform)?;

    // Keep ourselves powered before anything else
    let hold_pin = PinDriver::output(peripherals.pins.gpio40).map_err(platform)?;
    let mut power = PowerLatch::new(hold_pin, true);
    power.hold()?;
    log::info!("Power latch on GPIO{}", pins::POWER_HOLD);

    let player: &'static BoardPlayer = PLAYER.init(TonePlayer::new(EspLedc::new(), board_tone_config()));
    player.init().await?;
    spawn_tone_timer(player)?;
    log::info!("Buzzer on GPIO{}", player.config().gpio);

    let gpio = EspGpio;
    for (pin, active) in pins::KEYS {
        let pull = PinConfig::input();
        let config = if active == PinState::Low { pull.with_pull_up() } else { pull.with_pull_down() };
        gpio.configure(pin, &config)?;
    }

    let keys: &'static BoardKeys = KEYS.init(KeyManager::new(gpio, default_key_config())?);
    route_key_interrupts(keys)?;
    log::info!("Key debounce {}ms", keys.config().debounce_ms);
    spawn_key_worker(keys)?;

    for (pin, active) in pins::KEYS {
        keys.add_key(pin, active)?;
        keys.register_callback(pin, Some(&BEEP_ON_PRESS))?;
    }

    // Chime failures are not fatal
    for (hz, ms) in tones::BOOT_CHIME {
        if let Err(e) = player.play_note(hz, ms).await {
            log::warn!("Boot chime note {} Hz failed: {}", hz, e);
        }
    }
    log::info!("Board ready, {} keys", keys.key_count());

    loop {
        let gpio = KEY_PRESSES.receive().await;
        match player.play_note_async(tones::KEY_BEEP_HZ, tones::KEY_BEEP_MS).await {
            Ok(()) => {}
            Err(BspError::Timeout) => log::debug!("Buzzer busy, skipped beep for GPIO{}", gpio),
            Err(e) => log::warn!("Key beep failed: {}", e),
        }

        let dropped = keys.dropped_events();
        if dropped > 0 {
            log::debug!("{} key edges dropped so far", dropped);
        }
    }
}
