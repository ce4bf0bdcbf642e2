//! Bounded exponential backoff and cooperative cancellation
//!
//! Probes and convergence polls share the same backoff shape: the delay
//! doubles from `initial_backoff` up to `max_backoff`, and a sequence stops
//! after `max_attempts` or once the overall deadline is spent.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Backoff limits for one retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Wall-clock budget for the whole sequence
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_attempts: 5,
            deadline: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Start a fresh backoff sequence
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
            current: self.initial_backoff,
            started: Instant::now(),
        }
    }
}

/// State of one backoff sequence
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Record a failed attempt and return how long to wait before the next one
    ///
    /// Returns `None` once attempts or the deadline are exhausted. The
    /// returned delay never runs past the deadline.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        let remaining = self.remaining()?;
        let delay = self.current.min(remaining);
        self.current = std::cmp::min(self.current * 2, self.policy.max_backoff);
        Some(delay)
    }

    /// Attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, `None` if it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.policy
            .deadline
            .checked_sub(self.started.elapsed())
            .filter(|d| !d.is_zero())
    }
}

/// Trips a [`Cancellation`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed at every blocking wait
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Create a linked cancel handle and signal
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, signal) = cancellation();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled; pend forever if the handle is gone uncancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `delay` unless cancelled first; returns false on cancellation
    pub async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancelled() => false,
        }
    }
}
