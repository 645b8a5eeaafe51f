//! Tone player tests: band limits, blocking and deferred playback, teardown

use bsp_core::hal::mock::{MockPwm, PwmOp};
use bsp_core::{BspError, HalError, ToneConfig, TonePlayer};
use embassy_time::{Duration, Instant, Timer};
use rstest::rstest;

use crate::support::with_worker;

const SOUNDING: u32 = 2048;

async fn ready_player() -> (TonePlayer<MockPwm>, MockPwm) {
    let pwm = MockPwm::new();
    let player = TonePlayer::new(pwm.clone(), ToneConfig::default());
    player.init().await.unwrap();
    (player, pwm)
}

#[rstest]
#[case(199, Err(BspError::InvalidArgument))]
#[case(200, Ok(()))]
#[case(1000, Ok(()))]
#[case(2700, Ok(()))]
#[case(2701, Err(BspError::InvalidArgument))]
#[tokio::test]
async fn test_frequency_band(#[case] hz: u32, #[case] expected: Result<(), BspError>) {
    let (player, pwm) = ready_player().await;

    assert_eq!(player.set_frequency(hz).await, expected);
    if expected.is_ok() {
        assert_eq!(pwm.frequency(), hz);
        assert_eq!(pwm.duty(), SOUNDING);
    } else {
        assert_eq!(pwm.duty(), 0);
    }
}

#[rstest]
#[case(199)]
#[case(1000)]
#[tokio::test]
async fn test_state_error_before_init(#[case] hz: u32) {
    let player = TonePlayer::new(MockPwm::new(), ToneConfig::default());

    // State is checked before the band
    assert_eq!(player.set_frequency(hz).await, Err(BspError::InvalidState));
    assert_eq!(player.stop().await, Err(BspError::InvalidState));
}

#[tokio::test]
async fn test_double_init_configures_once() {
    let (player, pwm) = ready_player().await;
    player.init().await.unwrap();

    let configures = pwm
        .ops()
        .into_iter()
        .filter(|op| matches!(op, PwmOp::ConfigureTimer | PwmOp::ConfigureChannel))
        .count();
    assert_eq!(configures, 2);
}

#[tokio::test]
async fn test_blocking_note() {
    println!("🔊 Testing blocking note 1000 Hz / 50 ms...");

    let (player, pwm) = ready_player().await;

    let start = Instant::now();
    player.play_note(1000, 50).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(50));
    assert_eq!(pwm.duty(), 0);

    println!("  ✅ Returned after {}ms, buzzer silent", elapsed.as_millis());
}

#[tokio::test]
async fn test_stop_during_blocking_note() {
    let (player, pwm) = ready_player().await;

    let note = player.play_note(1000, 60);
    let interrupt = async {
        Timer::after_millis(20).await;
        // Lock is free while the note sleeps
        player.stop().await.unwrap();
        assert_eq!(pwm.duty(), 0);
        player.set_frequency(500).await.unwrap();
    };
    let (result, ()) = embassy_futures::join::join(note, interrupt).await;

    result.unwrap();
    assert_eq!(pwm.frequency(), 500);
    assert_eq!(pwm.duty(), 0);
}

#[tokio::test]
async fn test_async_note() {
    println!("🔊 Testing async note 1000 Hz / 50 ms...");

    let (player, pwm) = ready_player().await;
    let timer = player.stop_timer().unwrap();

    with_worker(timer.run(), async {
        let start = Instant::now();
        player.play_note_async(1000, 50).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(20));
        assert_eq!(pwm.duty(), SOUNDING);

        Timer::after_millis(30).await;
        assert_eq!(pwm.duty(), SOUNDING);

        Timer::after_millis(40).await;
        assert_eq!(pwm.duty(), 0);
        assert_eq!(pwm.frequency(), 1000);
    })
    .await;

    println!("  ✅ Returned immediately, silenced on schedule");
}

#[tokio::test]
async fn test_newer_async_note_replaces_pending_stop() {
    let (player, pwm) = ready_player().await;
    let timer = player.stop_timer().unwrap();

    with_worker(timer.run(), async {
        player.play_note_async(1000, 50).await.unwrap();
        Timer::after_millis(30).await;
        player.play_note_async(1500, 100).await.unwrap();

        // Past the first note's deadline
        Timer::after_millis(50).await;
        assert_eq!(pwm.frequency(), 1500);
        assert_eq!(pwm.duty(), SOUNDING);

        Timer::after_millis(70).await;
        assert_eq!(pwm.duty(), 0);
    })
    .await;

    let stops = pwm.ops().into_iter().filter(|op| *op == PwmOp::SetDuty(0)).count();
    // init + one deferred stop
    assert_eq!(stops, 2);
}

#[tokio::test]
async fn test_set_frequency_outlives_pending_stop() {
    let (player, pwm) = ready_player().await;
    let timer = player.stop_timer().unwrap();

    with_worker(timer.run(), async {
        player.play_note_async(1000, 30).await.unwrap();
        Timer::after_millis(10).await;
        player.set_frequency(800).await.unwrap();

        Timer::after_millis(50).await;
        assert_eq!(pwm.frequency(), 800);
        assert_eq!(pwm.duty(), SOUNDING);
    })
    .await;
}

#[tokio::test]
async fn test_async_note_needs_stop_timer() {
    let (player, pwm) = ready_player().await;

    assert_eq!(player.play_note_async(1000, 50).await, Err(BspError::NoResource));
    assert_eq!(pwm.duty(), 0);

    // A claimed but idle timer is not running either
    let _timer = player.stop_timer().unwrap();
    assert_eq!(player.play_note_async(1000, 50).await, Err(BspError::NoResource));
}

#[tokio::test]
async fn test_deinit_cancels_pending_stop() {
    let (player, pwm) = ready_player().await;
    let timer = player.stop_timer().unwrap();

    with_worker(timer.run(), async {
        player.play_note_async(1000, 40).await.unwrap();
        player.deinit().await.unwrap();
        assert!(!player.is_initialized());
        assert_eq!(pwm.duty(), 0);

        pwm.clear_ops();
        Timer::after_millis(60).await;
        assert!(pwm.ops().is_empty());

        assert_eq!(player.play_note_async(1000, 40).await, Err(BspError::InvalidState));
    })
    .await;
}

#[tokio::test]
async fn test_failed_deferred_stop_keeps_timer_alive() {
    let (player, pwm) = ready_player().await;
    let timer = player.stop_timer().unwrap();

    with_worker(timer.run(), async {
        player.play_note_async(1000, 20).await.unwrap();
        pwm.fail_next(PwmOp::SetDuty(0), HalError::PwmError);
        Timer::after_millis(40).await;
        assert_eq!(pwm.duty(), SOUNDING);

        // Timer still serves the next request
        player.play_note_async(1200, 20).await.unwrap();
        Timer::after_millis(40).await;
        assert_eq!(pwm.duty(), 0);
    })
    .await;
}

#[test]
fn test_blocking_runtime_entry() {
    // Firmware drives the player from plain threads
    tokio_test::block_on(async {
        let (player, pwm) = ready_player().await;
        player.play_note(2000, 10).await.unwrap();
        assert_eq!(pwm.frequency(), 2000);
        assert_eq!(pwm.duty(), 0);
    });
}
