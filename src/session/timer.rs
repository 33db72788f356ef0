//! Soft and hard session countdowns
//!
//! [`DualTimer`] runs both countdowns from a single tokio task so their
//! relative order is deterministic: on every tick both are decremented, the
//! hard cutoff is checked first, then the soft one. The expiry callback fires
//! at most once. Cancellation goes through a [`CancellationToken`], and
//! dropping the timer cancels it too.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::session::{Entitlements, TerminationReason};

/// Soft duration for the base tier
pub const BASE_SOFT_DURATION: Duration = Duration::from_secs(2 * 60);

/// Soft duration for the top tier
pub const TOP_SOFT_DURATION: Duration = Duration::from_secs(5 * 60);

/// Absolute cutoff regardless of tier
pub const HARD_DURATION: Duration = Duration::from_secs(8 * 60);

/// Countdown resolution
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Configured lengths of both countdowns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDurations {
    pub soft: Duration,
    pub hard: Duration,
    pub tick: Duration,
}

impl TimerDurations {
    /// Standard durations for the given entitlements
    ///
    /// # Examples
    ///
    /// ```
    /// use aihuman::session::timer::TimerDurations;
    /// use aihuman::session::Entitlements;
    /// use std::time::Duration;
    ///
    /// let top = Entitlements { top_tier: true, front_end: true };
    /// assert_eq!(TimerDurations::standard(&top).soft, Duration::from_secs(300));
    /// assert_eq!(TimerDurations::standard(&Entitlements::default()).soft, Duration::from_secs(120));
    /// ```
    pub fn standard(entitlements: &Entitlements) -> Self {
        Self {
            soft: if entitlements.top_tier {
                TOP_SOFT_DURATION
            } else {
                BASE_SOFT_DURATION
            },
            hard: HARD_DURATION,
            tick: DEFAULT_TICK,
        }
    }

    /// The reason that fires first
    ///
    /// Ties go to the soft timeout.
    pub fn first_expiry(&self) -> TerminationReason {
        if self.hard < self.soft {
            TerminationReason::HardTimeout
        } else {
            TerminationReason::SoftTimeout
        }
    }
}

/// Remaining whole seconds on each countdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerState {
    pub soft_remaining: u64,
    pub hard_remaining: u64,
}

impl TimerState {
    fn from_remaining(soft: Duration, hard: Duration) -> Self {
        Self {
            soft_remaining: ceil_secs(soft),
            hard_remaining: ceil_secs(hard),
        }
    }

    /// The visible countdown, `m:ss`
    pub fn countdown(&self) -> String {
        format_countdown(self.soft_remaining)
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Formats seconds as `m:ss`
///
/// # Examples
///
/// ```
/// use aihuman::session::timer::format_countdown;
///
/// assert_eq!(format_countdown(125), "2:05");
/// assert_eq!(format_countdown(0), "0:00");
/// ```
pub fn format_countdown(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Called once with the reason of whichever countdown expired first
pub type ExpiryCallback = Box<dyn FnOnce(TerminationReason) + Send + 'static>;

/// Running pair of countdowns bound to one session
#[derive(Debug)]
pub struct DualTimer {
    cancel: CancellationToken,
    state: watch::Receiver<TimerState>,
    task: JoinHandle<()>,
}

impl DualTimer {
    /// Starts both countdowns
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(durations: TimerDurations, on_expire: ExpiryCallback) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(TimerState::from_remaining(durations.soft, durations.hard));

        let task = tokio::spawn(run_countdowns(durations, tx, cancel.clone(), on_expire));

        tracing::debug!(
            soft_secs = durations.soft.as_secs(),
            hard_secs = durations.hard.as_secs(),
            "Session timers started"
        );

        Self {
            cancel,
            state: rx,
            task,
        }
    }

    /// Stops both countdowns; the callback will not fire afterwards
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current remaining values
    pub fn state(&self) -> TimerState {
        *self.state.borrow()
    }

    /// Receiver that observes every tick
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state.clone()
    }

    /// `true` once the countdown task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for DualTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_countdowns(
    durations: TimerDurations,
    tx: watch::Sender<TimerState>,
    cancel: CancellationToken,
    on_expire: ExpiryCallback,
) {
    let tick = durations.tick.max(Duration::from_millis(1));
    let mut soft = durations.soft;
    let mut hard = durations.hard;

    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Session timers cancelled");
                return;
            }
            _ = interval.tick() => {
                soft = soft.saturating_sub(tick);
                hard = hard.saturating_sub(tick);
                let _ = tx.send(TimerState::from_remaining(soft, hard));

                match (soft.is_zero(), hard.is_zero()) {
                    (true, true) => break durations.first_expiry(),
                    (false, true) => break TerminationReason::HardTimeout,
                    (true, false) => break TerminationReason::SoftTimeout,
                    (false, false) => {}
                }
            }
        }
    };

    if cancel.is_cancelled() {
        return;
    }

    tracing::info!(reason = %reason, "Session timer expired");
    on_expire(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<TerminationReason>>>, ExpiryCallback) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let callback: ExpiryCallback = Box::new(move |reason| sink.lock().unwrap().push(reason));
        (fired, callback)
    }

    #[test]
    fn test_standard_durations_by_tier() {
        let top = TimerDurations::standard(&Entitlements {
            top_tier: true,
            front_end: false,
        });
        assert_eq!(top.soft, Duration::from_secs(300));
        assert_eq!(top.hard, Duration::from_secs(480));

        let base = TimerDurations::standard(&Entitlements {
            top_tier: false,
            front_end: true,
        });
        assert_eq!(base.soft, Duration::from_secs(120));
        assert_eq!(base.hard, Duration::from_secs(480));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(300), "5:00");
        assert_eq!(format_countdown(61), "1:01");
        assert_eq!(format_countdown(9), "0:09");
    }

    #[test]
    fn test_first_expiry_tie_goes_to_soft() {
        let durations = TimerDurations {
            soft: Duration::from_secs(480),
            hard: Duration::from_secs(480),
            tick: DEFAULT_TICK,
        };
        assert_eq!(durations.first_expiry(), TerminationReason::SoftTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_timer_fires_first_for_base_tier() {
        let (fired, callback) = recorder();
        let timer = DualTimer::start(TimerDurations::standard(&Entitlements::default()), callback);

        tokio::time::sleep(Duration::from_millis(119_500)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert_eq!(timer.state().soft_remaining, 1);
        assert_eq!(timer.state().hard_remaining, 361);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*fired.lock().unwrap(), vec![TerminationReason::SoftTimeout]);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_timer_fires_when_shorter() {
        let (fired, callback) = recorder();
        let durations = TimerDurations {
            soft: Duration::from_secs(600),
            hard: HARD_DURATION,
            tick: DEFAULT_TICK,
        };
        let _timer = DualTimer::start(durations, callback);

        tokio::time::sleep(Duration::from_secs(481)).await;
        assert_eq!(*fired.lock().unwrap(), vec![TerminationReason::HardTimeout]);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_expiry_records_one_reason() {
        let (fired, callback) = recorder();
        let durations = TimerDurations {
            soft: Duration::from_secs(5),
            hard: Duration::from_secs(5),
            tick: DEFAULT_TICK,
        };
        let _timer = DualTimer::start(durations, callback);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![TerminationReason::SoftTimeout]);
    }

    #[test]
    fn test_first_expiry_prefers_shorter_duration() {
        let hard_first = TimerDurations {
            soft: Duration::from_secs(5),
            hard: Duration::from_millis(4_500),
            tick: DEFAULT_TICK,
        };
        assert_eq!(hard_first.first_expiry(), TerminationReason::HardTimeout);

        let soft_first = TimerDurations {
            soft: Duration::from_millis(4_500),
            hard: Duration::from_secs(5),
            tick: DEFAULT_TICK,
        };
        assert_eq!(soft_first.first_expiry(), TerminationReason::SoftTimeout);
    }

    // 4.5 s and 5 s both run out on the fifth 1 s tick
    #[tokio::test(start_paused = true)]
    async fn test_same_tick_expiry_reports_shorter_hard_timer() {
        let (fired, callback) = recorder();
        let durations = TimerDurations {
            soft: Duration::from_secs(5),
            hard: Duration::from_millis(4_500),
            tick: DEFAULT_TICK,
        };
        let timer = DualTimer::start(durations, callback);

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![TerminationReason::HardTimeout]);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_tick_expiry_reports_shorter_soft_timer() {
        let (fired, callback) = recorder();
        let durations = TimerDurations {
            soft: Duration::from_millis(4_500),
            hard: Duration::from_secs(5),
            tick: DEFAULT_TICK,
        };
        let timer = DualTimer::start(durations, callback);

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*fired.lock().unwrap(), vec![TerminationReason::SoftTimeout]);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_expiry() {
        let (fired, callback) = recorder();
        let timer = DualTimer::start(TimerDurations::standard(&Entitlements::default()), callback);

        tokio::time::sleep(Duration::from_secs(30)).await;
        timer.cancel();
        assert!(timer.is_cancelled());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (fired, callback) = recorder();
        let timer = DualTimer::start(TimerDurations::standard(&Entitlements::default()), callback);
        drop(timer);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_is_published() {
        let (_fired, callback) = recorder();
        let timer = DualTimer::start(
            TimerDurations::standard(&Entitlements {
                top_tier: true,
                front_end: true,
            }),
            callback,
        );
        let rx = timer.subscribe();
        assert_eq!(rx.borrow().countdown(), "5:00");

        tokio::time::sleep(Duration::from_millis(65_500)).await;
        assert_eq!(rx.borrow().countdown(), "3:55");
    }
}
