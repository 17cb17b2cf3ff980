//! Client-side sliding window rate limiting.
//!
//! The free tier allows 45 single requests and 15 batch requests per minute.
//! Each class keeps the timestamps of the requests it accepted in the trailing
//! window; a request is admitted only while fewer than `limit` remain.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::{Error, RateLimitError, Result};

pub const SINGLE_RATE_LIMIT: usize = 45;
pub const BATCH_RATE_LIMIT: usize = 15;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Operation classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateClass {
    /// Single IP and DNS lookups
    Single,
    /// Batch IP and batch DNS lookups
    Batch,
}

impl RateClass {
    pub fn limit(self) -> usize {
        match self {
            RateClass::Single => SINGLE_RATE_LIMIT,
            RateClass::Batch => BATCH_RATE_LIMIT,
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateClass::Single => write!(f, "single"),
            RateClass::Batch => write!(f, "batch"),
        }
    }
}

/// Timestamps of accepted requests within the trailing window.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: VecDeque::with_capacity(limit),
        }
    }

    /// Drop timestamps that have left the window.
    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) < self.window {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    /// Record a request at `now` if the window has room. Rejected attempts
    /// leave the window untouched.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.prune(now);

        if self.timestamps.len() >= self.limit {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    pub fn status(&mut self, now: Instant) -> RateLimitStatus {
        self.prune(now);

        let used = self.timestamps.len();
        let reset_in = self
            .timestamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)));

        RateLimitStatus {
            limit: self.limit,
            used,
            remaining: self.limit.saturating_sub(used),
            reset_in,
        }
    }

    pub fn reset(&mut self) {
        self.timestamps.clear();
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Snapshot of a local window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: usize,
    pub used: usize,
    pub remaining: usize,
    /// Time until the oldest recorded request leaves the window.
    pub reset_in: Option<Duration>,
}

/// Both free tier windows plus the clock they are measured against.
pub struct RateLimiter {
    single: Mutex<SlidingWindow>,
    batch: Mutex<SlidingWindow>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            single: Mutex::new(SlidingWindow::new(SINGLE_RATE_LIMIT, RATE_WINDOW)),
            batch: Mutex::new(SlidingWindow::new(BATCH_RATE_LIMIT, RATE_WINDOW)),
            clock,
        }
    }

    fn window(&self, class: RateClass) -> &Mutex<SlidingWindow> {
        match class {
            RateClass::Single => &self.single,
            RateClass::Batch => &self.batch,
        }
    }

    fn with_window<T>(&self, class: RateClass, f: impl FnOnce(&mut SlidingWindow) -> T) -> Result<T> {
        let mut window = self.window(class).lock().map_err(|_| {
            Error::Internal(format!("Failed to acquire lock on {} rate window", class))
        })?;
        Ok(f(&mut window))
    }

    /// Admit one request of `class` or fail with a local rate limit error.
    pub fn check(&self, class: RateClass) -> Result<()> {
        let now = self.clock.now();
        let (admitted, limit, window) =
            self.with_window(class, |w| (w.try_acquire(now), w.limit(), w.window()))?;

        if !admitted {
            tracing::warn!(%class, limit, "local rate limit exceeded");
            return Err(RateLimitError::Local { class, limit, window }.into());
        }
        Ok(())
    }

    pub fn status(&self, class: RateClass) -> Result<RateLimitStatus> {
        let now = self.clock.now();
        self.with_window(class, |w| w.status(now))
    }

    pub fn reset(&self, class: RateClass) -> Result<()> {
        self.with_window(class, SlidingWindow::reset)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("single", &self.single)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
