//! Auto-advance timer.
//!
//! Time is fed in explicitly through [`TimerController::tick`], so the
//! controller never spawns work of its own and is trivially testable.

use std::time::Duration;

use smallvec::{smallvec, SmallVec};
use tracing::{debug, info};

use crate::wake::WakeManager;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MANUAL_PAUSE_CEILING: Duration = Duration::from_secs(60);
pub const DEFAULT_FADE_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PauseReason {
    /// The user paused explicitly.
    Manual,
    /// Pan, zoom or swipe in progress.
    Interaction,
    MenuOpen,
    /// The viewer is not visible.
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    /// Stopped because a manual pause outlived the ceiling.
    AutoStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    Advance,
    /// Less than the fade threshold left in this cycle.
    Fade,
    AutoStopped,
    /// A new duration was started; persist it as last used.
    DurationChanged(Duration),
    Stopped,
}

pub type Signals = SmallVec<[TimerSignal; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub settle_delay: Duration,
    pub manual_pause_ceiling: Duration,
    pub fade_threshold: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            manual_pause_ceiling: DEFAULT_MANUAL_PAUSE_CEILING,
            fade_threshold: DEFAULT_FADE_THRESHOLD,
        }
    }
}

pub struct TimerController {
    config: TimerConfig,
    duration: Duration,
    elapsed: Duration,
    last_used: Duration,
    pauses: SmallVec<[PauseReason; 4]>,
    settle_remaining: Option<Duration>,
    manual_paused_for: Duration,
    fade_active: bool,
    auto_stopped: bool,
    wake: WakeManager,
}

impl TimerController {
    pub fn new(config: TimerConfig, wake: WakeManager) -> Self {
        Self {
            config,
            duration: Duration::ZERO,
            elapsed: Duration::ZERO,
            last_used: Duration::ZERO,
            pauses: SmallVec::new(),
            settle_remaining: None,
            manual_paused_for: Duration::ZERO,
            fade_active: false,
            auto_stopped: false,
            wake,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        if self.duration.is_zero() {
            if self.auto_stopped {
                TimerPhase::AutoStopped
            } else {
                TimerPhase::Idle
            }
        } else if self.pauses.is_empty() {
            TimerPhase::Running
        } else {
            TimerPhase::Paused
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == TimerPhase::Running
    }

    pub fn is_paused_by(&self, reason: PauseReason) -> bool {
        self.pauses.contains(&reason)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn last_used(&self) -> Duration {
        self.last_used
    }

    /// Seed the last-used duration (from saved settings).
    pub fn set_last_used(&mut self, duration: Duration) {
        self.last_used = duration;
    }

    pub fn is_fading(&self) -> bool {
        self.fade_active
    }

    /// Fraction of the current cycle that has elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 0.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn wake_held(&self) -> bool {
        self.wake.is_held()
    }

    pub fn start(&mut self, duration: Duration) -> Signals {
        if duration.is_zero() {
            return self.stop();
        }
        self.duration = duration;
        self.elapsed = Duration::ZERO;
        self.last_used = duration;
        self.pauses.clear();
        self.settle_remaining = None;
        self.manual_paused_for = Duration::ZERO;
        self.fade_active = false;
        self.auto_stopped = false;
        self.wake.hold();
        info!("Timer started ({:?})", duration);
        smallvec![TimerSignal::DurationChanged(duration)]
    }

    pub fn stop(&mut self) -> Signals {
        let was_active = !self.duration.is_zero();
        self.reset();
        self.auto_stopped = false;
        if was_active {
            debug!("Timer stopped");
            smallvec![TimerSignal::Stopped]
        } else {
            SmallVec::new()
        }
    }

    fn reset(&mut self) {
        self.duration = Duration::ZERO;
        self.elapsed = Duration::ZERO;
        self.pauses.clear();
        self.settle_remaining = None;
        self.manual_paused_for = Duration::ZERO;
        self.fade_active = false;
        self.wake.release();
    }

    /// Pause if running, resume a manual pause, or start the last-used
    /// duration when the timer is off.
    pub fn toggle(&mut self) -> Signals {
        if self.duration.is_zero() {
            if self.last_used.is_zero() {
                return SmallVec::new();
            }
            return self.start(self.last_used);
        }
        if self.is_paused_by(PauseReason::Manual) {
            self.resume(PauseReason::Manual);
        } else {
            self.pause(PauseReason::Manual);
        }
        SmallVec::new()
    }

    pub fn pause(&mut self, reason: PauseReason) {
        if self.duration.is_zero() {
            return;
        }
        if reason == PauseReason::Interaction {
            self.settle_remaining = None;
        }
        if reason == PauseReason::Manual && !self.is_paused_by(PauseReason::Manual) {
            self.manual_paused_for = Duration::ZERO;
        }
        if !self.pauses.contains(&reason) {
            self.pauses.push(reason);
            debug!("Timer paused ({:?})", reason);
        }
    }

    pub fn resume(&mut self, reason: PauseReason) {
        self.pauses.retain(|r| *r != reason);
        match reason {
            PauseReason::Manual => self.manual_paused_for = Duration::ZERO,
            PauseReason::Interaction => self.settle_remaining = None,
            _ => {}
        }
    }

    pub fn interaction_started(&mut self) {
        self.pause(PauseReason::Interaction);
    }

    /// Resume after the settle delay. Other pause reasons keep the timer
    /// paused once the interaction pause is lifted.
    pub fn interaction_ended(&mut self) {
        if self.is_paused_by(PauseReason::Interaction) {
            self.settle_remaining = Some(self.config.settle_delay);
        }
    }

    pub fn tick(&mut self, delta: Duration) -> Signals {
        let mut signals = Signals::new();
        if self.duration.is_zero() {
            return signals;
        }

        if !self.pauses.is_empty() {
            if let Some(remaining) = self.settle_remaining {
                if delta >= remaining {
                    self.resume(PauseReason::Interaction);
                } else {
                    self.settle_remaining = Some(remaining - delta);
                }
            }
            if self.is_paused_by(PauseReason::Manual) {
                self.manual_paused_for += delta;
                if self.manual_paused_for >= self.config.manual_pause_ceiling {
                    info!("Manual pause exceeded {:?}, stopping timer", self.config.manual_pause_ceiling);
                    self.reset();
                    self.auto_stopped = true;
                    signals.push(TimerSignal::AutoStopped);
                }
            }
            return signals;
        }

        self.elapsed += delta;
        let remaining = self.duration.saturating_sub(self.elapsed);
        if !self.fade_active && remaining < self.config.fade_threshold {
            self.fade_active = true;
            signals.push(TimerSignal::Fade);
        }
        if self.elapsed >= self.duration {
            self.elapsed = Duration::ZERO;
            self.fade_active = false;
            signals.push(TimerSignal::Advance);
        }
        signals
    }

    /// Stop and release the wake lock.
    pub fn teardown(&mut self) {
        self.reset();
        self.auto_stopped = false;
    }
}
