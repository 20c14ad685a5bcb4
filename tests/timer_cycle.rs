use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use set_viewer::error::WakeLockError;
use set_viewer::timer::{PauseReason, TimerConfig, TimerController, TimerPhase, TimerSignal};
use set_viewer::wake::{NoopWakeLock, WakeLock, WakeManager};

/// Counts acquisitions so tests can check the lock is not re-taken needlessly.
struct CountingLock {
    acquired: Arc<AtomicUsize>,
    held: bool,
}

impl WakeLock for CountingLock {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn acquire(&mut self) -> Result<(), WakeLockError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.held = true;
        Ok(())
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_held(&self) -> bool {
        self.held
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn timer() -> TimerController {
    TimerController::new(TimerConfig::default(), WakeManager::new(Box::new(NoopWakeLock::default()), None))
}

fn advances(signals: &[TimerSignal]) -> usize {
    signals.iter().filter(|s| **s == TimerSignal::Advance).count()
}

#[test]
fn ten_second_timer_fires_once_per_cycle() {
    let mut t = timer();
    t.start(ms(10_000));

    let mut fired = 0;
    for _ in 0..3 {
        fired += advances(&t.tick(ms(3_333)));
    }
    assert_eq!(fired, 0);
    assert_eq!(t.elapsed(), ms(9_999));

    assert_eq!(advances(&t.tick(ms(1))), 1);
    assert_eq!(t.elapsed(), Duration::ZERO);

    // The next cycle starts from zero.
    let mut fired = 0;
    for _ in 0..100 {
        fired += advances(&t.tick(ms(100)));
    }
    assert_eq!(fired, 1);
    assert_eq!(t.elapsed(), Duration::ZERO);
}

#[test]
fn paused_time_does_not_count() {
    let mut t = timer();
    t.start(ms(1_000));
    t.tick(ms(400));
    t.pause(PauseReason::Hidden);
    assert!(t.tick(ms(5_000)).is_empty());
    assert_eq!(t.elapsed(), ms(400));
    t.resume(PauseReason::Hidden);
    assert_eq!(advances(&t.tick(ms(600))), 1);
}

#[test]
fn progress_tracks_elapsed_fraction() {
    let mut t = timer();
    assert_eq!(t.progress(), 0.0);
    t.start(ms(4_000));
    t.tick(ms(1_000));
    assert!((t.progress() - 0.25).abs() < 1e-6);
}

#[test]
fn hidden_viewer_does_not_trip_the_manual_ceiling() {
    let mut t = timer();
    t.start(ms(2_000));
    t.pause(PauseReason::Hidden);
    t.tick(ms(120_000));
    assert_eq!(t.phase(), TimerPhase::Paused);
}

#[test]
fn manual_pause_ceiling_counts_only_manual_time() {
    let mut t = timer();
    t.start(ms(2_000));
    t.pause(PauseReason::Manual);
    t.tick(ms(30_000));
    t.resume(PauseReason::Manual);
    t.pause(PauseReason::Manual);
    assert!(t.tick(ms(59_000)).is_empty());
    assert_eq!(t.tick(ms(1_000)).as_slice(), &[TimerSignal::AutoStopped]);
    assert_eq!(t.phase(), TimerPhase::AutoStopped);

    // Starting again clears the auto-stopped state.
    t.start(ms(2_000));
    assert_eq!(t.phase(), TimerPhase::Running);
}

#[test]
fn wake_lock_is_held_only_while_the_timer_runs() {
    let acquired = Arc::new(AtomicUsize::new(0));
    let lock = CountingLock {
        acquired: Arc::clone(&acquired),
        held: false,
    };
    let mut t = TimerController::new(TimerConfig::default(), WakeManager::new(Box::new(lock), None));

    t.start(ms(1_000));
    assert!(t.wake_held());
    t.start(ms(2_000));
    assert_eq!(acquired.load(Ordering::SeqCst), 1);

    t.teardown();
    assert!(!t.wake_held());
    assert_eq!(t.phase(), TimerPhase::Idle);
}
