use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::LimitError;
use super::Reason;
use super::Strategy;

/// A Sliding Window Log implementation.
///
/// Keeps the instant of every admission that is still inside the trailing
/// window, oldest first. A request is admitted while fewer than `capacity`
/// instants remain after expired ones are evicted. Unlike a fixed window,
/// the window origin moves continuously, so no burst of `2 * capacity` can
/// straddle a boundary.
///
/// Instants come from `tokio::time`, so a paused test clock drives the
/// window deterministically.
#[derive(Debug)]
pub struct SlidingLog {
    capacity: usize,
    window: Duration,
    /// Admission instants, non-decreasing, at most `capacity` long
    log: Mutex<VecDeque<Instant>>,
}

impl SlidingLog {
    /// Creates a new `SlidingLog` strategy.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of admissions within any trailing window.
    /// * `window` - The length of the trailing window.
    pub fn new(capacity: NonZeroUsize, window: Duration) -> Self {
        Self {
            capacity: capacity.get(),
            window,
            log: Mutex::new(VecDeque::with_capacity(capacity.get().min(1024))),
        }
    }

    /// Creates a `SlidingLog` from unchecked configuration values.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidCapacity` for a zero capacity and `InvalidWindow`
    /// for a zero-length window.
    pub fn try_new(capacity: usize, window: Duration) -> Result<Self, LimitError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(LimitError::InvalidCapacity)?;
        if window.is_zero() {
            return Err(LimitError::InvalidWindow);
        }
        Ok(Self::new(capacity, window))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of admissions still inside the window.
    pub fn len(&self) -> usize {
        let mut log = self.log.lock();
        self.evict(&mut log, Instant::now());
        log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of requests that would be admitted immediately.
    pub fn available(&self) -> usize {
        self.capacity - self.len()
    }

    fn evict(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Strategy for SlidingLog {
    fn process(&self) -> ControlFlow<Reason> {
        let mut log = self.log.lock();
        let now = Instant::now();

        // 1. Age out everything that has left the window
        self.evict(&mut log, now);

        // 2. Admit while a slot is free
        if log.len() < self.capacity {
            log.push_back(now);
            return ControlFlow::Continue(());
        }

        // 3. Full: the oldest entry is the next one to expire
        let retry_after = match log.front() {
            Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
            None => Duration::ZERO,
        };
        ControlFlow::Break(Reason::Overloaded { retry_after })
    }
}
