//! Key manager tests: interrupt → queue → debounce worker → handler

use bsp_core::hal::mock::MockGpio;
use bsp_core::{BspError, GpioNum, KeyConfig, KeyEvent, KeyManager, PinState, MAX_KEYS};
use embassy_time::{Duration, Instant, Timer};
use proptest::prelude::*;
use rstest::rstest;

use crate::support::{settle, with_worker, EventLog};

const DEBOUNCE_MS: u64 = 35;

fn manager<'a>(gpio: &MockGpio) -> KeyManager<'a, MockGpio> {
    KeyManager::new(gpio.clone(), KeyConfig::default()).unwrap()
}

#[tokio::test]
async fn test_press_then_release() {
    println!("🔘 Testing press/release on GPIO5...");

    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(5, PinState::High).unwrap();
    keys.register_callback(5, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        gpio.drive(5, PinState::High);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;
        assert_eq!(log.events(), [(5, KeyEvent::Press)]);
        assert_eq!(keys.is_pressed(5), Ok(true));

        gpio.drive(5, PinState::Low);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;
        assert_eq!(log.events(), [(5, KeyEvent::Press), (5, KeyEvent::Release)]);
        assert_eq!(keys.is_pressed(5), Ok(false));
    })
    .await;

    println!("  ✅ One PRESS and one RELEASE delivered");
}

#[tokio::test]
async fn test_event_waits_for_debounce_window() {
    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(5, PinState::High).unwrap();
    keys.register_callback(5, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        let start = Instant::now();
        gpio.drive(5, PinState::High);
        keys.on_interrupt(5);

        Timer::after_millis(10).await;
        assert!(log.events().is_empty());

        settle(DEBOUNCE_MS).await;
        let deliveries = log.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].at.duration_since(start) >= Duration::from_millis(DEBOUNCE_MS));
    })
    .await;
}

#[tokio::test]
async fn test_bounce_coalesces_into_one_press() {
    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(5, PinState::High).unwrap();
    keys.register_callback(5, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        // Contact chatter: three edges before the first sample
        for level in [PinState::High, PinState::Low, PinState::High] {
            gpio.drive(5, level);
            keys.on_interrupt(5);
        }

        settle(3 * DEBOUNCE_MS).await;
        assert_eq!(log.events(), [(5, KeyEvent::Press)]);
        assert_eq!(log.count(KeyEvent::Release), 0);
    })
    .await;
}

#[tokio::test]
async fn test_held_at_boot_is_not_a_press() {
    let gpio = MockGpio::new();
    gpio.drive(5, PinState::High);
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(5, PinState::High).unwrap();
    keys.register_callback(5, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        // Spurious edge while still held
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;
        assert!(log.events().is_empty());

        gpio.drive(5, PinState::Low);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;
        assert_eq!(log.events(), [(5, KeyEvent::Release)]);
    })
    .await;
}

#[tokio::test]
async fn test_keys_share_one_worker() {
    println!("🔘 Testing debounce serialization across keys...");

    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    for pin in [5, 6] {
        keys.add_key(pin, PinState::High).unwrap();
        keys.register_callback(pin, Some(&log)).unwrap();
    }
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        let start = Instant::now();
        gpio.drive(5, PinState::High);
        gpio.drive(6, PinState::High);
        keys.on_interrupt(5);
        keys.on_interrupt(6);

        settle(2 * DEBOUNCE_MS).await;
        let deliveries = log.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].gpio, 5);
        assert_eq!(deliveries[1].gpio, 6);
        // Second key waits out the first key's window too
        assert!(deliveries[1].at.duration_since(start) >= Duration::from_millis(2 * DEBOUNCE_MS));
    })
    .await;

    println!("  ✅ GPIO6 delivered after GPIO5's window");
}

#[tokio::test]
async fn test_handler_replacement_and_removal() {
    let gpio = MockGpio::new();
    let first = EventLog::new();
    let second = EventLog::new();
    gpio.drive(5, PinState::High);
    let keys = manager(&gpio);

    keys.add_key(5, PinState::Low).unwrap();
    keys.register_callback(5, Some(&first)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        gpio.drive(5, PinState::Low);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;

        keys.register_callback(5, Some(&second)).unwrap();
        gpio.drive(5, PinState::High);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;

        keys.register_callback(5, None).unwrap();
        gpio.drive(5, PinState::Low);
        keys.on_interrupt(5);
        settle(DEBOUNCE_MS).await;
    })
    .await;

    assert_eq!(first.events(), [(5, KeyEvent::Press)]);
    assert_eq!(second.events(), [(5, KeyEvent::Release)]);
    assert_eq!(keys.is_pressed(5), Ok(true));
}

#[tokio::test]
async fn test_unregistered_interrupt_is_ignored() {
    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(5, PinState::High).unwrap();
    keys.register_callback(5, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        gpio.drive(9, PinState::High);
        keys.on_interrupt(9);
        settle(DEBOUNCE_MS).await;
        assert!(log.events().is_empty());
    })
    .await;
}

#[test]
fn test_full_queue_drops_edges() {
    let gpio = MockGpio::new();
    let keys = manager(&gpio);
    keys.add_key(5, PinState::High).unwrap();

    for _ in 0..25 {
        keys.on_interrupt(5);
    }
    assert_eq!(keys.dropped_events(), 15);
}

#[test]
fn test_table_capacity() {
    let gpio = MockGpio::new();
    let log = EventLog::new();
    let keys = manager(&gpio);

    for pin in 0..MAX_KEYS as GpioNum {
        keys.add_key(pin, PinState::Low).unwrap();
    }
    assert_eq!(keys.add_key(MAX_KEYS as GpioNum, PinState::Low), Err(BspError::TableFull));
    assert_eq!(keys.register_callback(MAX_KEYS as GpioNum, Some(&log)), Err(BspError::NotFound));

    // Existing entries unaffected
    assert_eq!(keys.key_count(), MAX_KEYS);
    assert!(keys.register_callback(0, Some(&log)).is_ok());
}

#[test]
fn test_custom_capacity() {
    let gpio = MockGpio::new();
    let keys: KeyManager<'_, MockGpio, 2, 4> = KeyManager::new(gpio.clone(), KeyConfig::default()).unwrap();

    keys.add_key(1, PinState::Low).unwrap();
    keys.add_key(2, PinState::Low).unwrap();
    assert_eq!(keys.add_key(3, PinState::Low), Err(BspError::TableFull));

    for _ in 0..6 {
        keys.on_interrupt(1);
    }
    assert_eq!(keys.dropped_events(), 2);
}

#[rstest]
#[case(PinState::High, PinState::Low, PinState::High)]
#[case(PinState::Low, PinState::High, PinState::Low)]
#[tokio::test]
async fn test_active_level(#[case] active: PinState, #[case] idle: PinState, #[case] pressed: PinState) {
    let gpio = MockGpio::new();
    gpio.drive(4, idle);
    let log = EventLog::new();
    let keys = manager(&gpio);

    keys.add_key(4, active).unwrap();
    keys.register_callback(4, Some(&log)).unwrap();
    let worker = keys.worker().unwrap();

    with_worker(worker.run(), async {
        gpio.drive(4, pressed);
        keys.on_interrupt(4);
        settle(DEBOUNCE_MS).await;
    })
    .await;

    assert_eq!(log.events(), [(4, KeyEvent::Press)]);
}

#[rstest]
#[case(0, true)]
#[case(35, true)]
#[case(1000, true)]
#[case(1001, false)]
fn test_key_config_bounds(#[case] debounce_ms: u64, #[case] valid: bool) {
    assert_eq!(KeyConfig::new(debounce_ms).is_ok(), valid);
}

const PROP_DEBOUNCE_MS: u64 = 2;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Delivered events alternate and track each settled level change
    #[test]
    fn prop_events_alternate(
        initial_high in any::<bool>(),
        active_high in any::<bool>(),
        levels in prop::collection::vec(any::<bool>(), 1..12),
    ) {
        let level = |high: bool| if high { PinState::High } else { PinState::Low };

        let mut pressed = initial_high == active_high;
        let mut expected = Vec::new();
        for &high in &levels {
            let now = high == active_high;
            if now != pressed {
                pressed = now;
                expected.push((7, KeyEvent::from_pressed(now)));
            }
        }

        let gpio = MockGpio::new();
        gpio.drive(7, level(initial_high));
        let log = EventLog::new();
        let keys: KeyManager<'_, MockGpio> =
            KeyManager::new(gpio.clone(), KeyConfig::new(PROP_DEBOUNCE_MS).unwrap()).unwrap();
        keys.add_key(7, level(active_high)).unwrap();
        keys.register_callback(7, Some(&log)).unwrap();
        let worker = keys.worker().unwrap();

        tokio_test::block_on(with_worker(worker.run(), async {
            for &high in &levels {
                gpio.drive(7, level(high));
                keys.on_interrupt(7);
                Timer::after_millis(PROP_DEBOUNCE_MS + 10).await;
            }
        }));

        let events = log.events();
        prop_assert_eq!(&events, &expected);
        for pair in events.windows(2) {
            prop_assert_ne!(pair[0].1, pair[1].1);
        }
        prop_assert_eq!(keys.is_pressed(7), Ok(pressed));
    }
}
