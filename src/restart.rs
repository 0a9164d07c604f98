//! # Restart policy and outcome tracking.
//!
//! [`RestartTracker`] records what happened to the most recent task attempt
//! (a start error, a terminal wait result, or an explicit restart trigger)
//! and turns it into a [`RestartState`] decision plus an optional delay.
//!
//! Decisions are deterministic given the recorded inputs:
//! - a non-recoverable start error refuses to restart;
//! - a clean exit refuses to restart, with the exit message as reason;
//! - a failure consumes one attempt from the budget window and either
//!   schedules a delayed restart or gives up;
//! - a triggered restart bypasses both the budget and the delay.
//!
//! [`Jitter`] optionally randomizes the delay. The default is
//! [`Jitter::None`] so decisions stay reproducible.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{driver::WaitResult, error::DriverError};

/// Decision produced by [`RestartTracker::get_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    /// The task will not be restarted; it failed terminally.
    NotRestarting,
    /// The task finished and there is nothing left to decide on.
    Terminated,
    /// The task will be restarted after the returned delay.
    Restarting,
}

/// Randomization applied to restart delays.
///
/// `Equal` keeps at least half of the configured delay and randomizes the
/// rest, which is enough to de-synchronize sibling allocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Jitter {
    /// Use the exact configured delay (default).
    #[default]
    None,
    /// delay/2 + random[0, delay/2].
    Equal,
}

impl Jitter {
    fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Equal => {
                let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
                if ms == 0 {
                    return Duration::ZERO;
                }
                let half = ms / 2;
                let jitter = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

/// Bounded-attempt restart policy.
///
/// Up to `attempts` failures are tolerated inside a rolling `interval`
/// window; the window restarts whenever a failure lands outside it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Failures tolerated inside one interval window.
    pub attempts: u32,
    /// Length of the budget window.
    pub interval: Duration,
    /// Delay before each scheduled restart.
    pub delay: Duration,
    /// Randomization of the delay.
    pub jitter: Jitter,
}

impl Default for RestartPolicy {
    /// Returns a policy with:
    /// - `attempts = 2`
    /// - `interval = 5m`
    /// - `delay = 15s`
    /// - `jitter = Jitter::None`
    fn default() -> Self {
        Self {
            attempts: 2,
            interval: Duration::from_secs(300),
            delay: Duration::from_secs(15),
            jitter: Jitter::None,
        }
    }
}

/// Tracks attempt outcomes and yields restart decisions.
///
/// Owned by the supervisor's run loop; not shared across tasks.
pub struct RestartTracker {
    policy: RestartPolicy,
    count: u32,
    window_start: Option<Instant>,
    start_error: Option<DriverError>,
    wait_result: Option<WaitResult>,
    restart_triggered: bool,
    reason: String,
}

impl RestartTracker {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            count: 0,
            window_start: None,
            start_error: None,
            wait_result: None,
            restart_triggered: false,
            reason: String::new(),
        }
    }

    /// Records that the most recent attempt failed before producing a handle.
    pub fn set_start_error(&mut self, err: DriverError) -> &mut Self {
        self.start_error = Some(err);
        self
    }

    /// Records the terminal result of a live handle.
    pub fn set_wait_result(&mut self, res: WaitResult) -> &mut Self {
        self.wait_result = Some(res);
        self
    }

    /// Marks the next decision as a forced restart.
    ///
    /// Forced restarts bypass the budget window and carry no delay.
    pub fn set_restart_triggered(&mut self) -> &mut Self {
        self.restart_triggered = true;
        self
    }

    /// Returns the human-readable cause of the last decision.
    pub fn get_reason(&self) -> &str {
        &self.reason
    }

    /// Consumes the recorded inputs and returns the decision and, for
    /// [`RestartState::Restarting`], the delay to sleep before retrying.
    pub fn get_state(&mut self) -> (RestartState, Duration) {
        if self.restart_triggered {
            self.restart_triggered = false;
            self.start_error = None;
            self.wait_result = None;
            self.reason = "restart triggered".to_string();
            return (RestartState::Restarting, Duration::ZERO);
        }

        if let Some(err) = self.start_error.take() {
            self.wait_result = None;
            if !err.recoverable {
                self.reason = format!("error was unrecoverable: {err}");
                return (RestartState::NotRestarting, Duration::ZERO);
            }
            return self.budget_check();
        }

        if let Some(res) = self.wait_result.take() {
            if res.successful {
                self.reason = res.message;
                return (RestartState::NotRestarting, Duration::ZERO);
            }
            return self.budget_check();
        }

        self.reason.clear();
        (RestartState::Terminated, Duration::ZERO)
    }

    fn budget_check(&mut self) -> (RestartState, Duration) {
        let now = Instant::now();
        match self.window_start {
            Some(start) if now.duration_since(start) > self.policy.interval => {
                self.window_start = Some(now);
                self.count = 0;
            }
            None => self.window_start = Some(now),
            _ => {}
        }
        self.count += 1;

        if self.count > self.policy.attempts {
            self.reason = format!(
                "exceeded {} restart attempts within {:?}",
                self.policy.attempts, self.policy.interval
            );
            return (RestartState::NotRestarting, Duration::ZERO);
        }

        self.reason = format!(
            "restarting within policy ({}/{} attempts)",
            self.count, self.policy.attempts
        );
        (RestartState::Restarting, self.policy.jitter.apply(self.policy.delay))
    }
}
