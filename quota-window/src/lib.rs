//! # quota-window
//!
//! `quota-window` caps how often a process may call out to a quota-limited
//! API. It admits callers one at a time against a sliding window log of
//! admission instants and suspends them while the quota is exhausted.
//!
//! ## Key Concepts
//!
//! * **Strategy**: A non-blocking admission decision. [`SlidingLog`] is the
//!   only strategy shipped; it keeps every admission instant that is still
//!   inside the trailing window.
//! * **RateLimiter**: Turns a strategy into an async, cancellable
//!   `acquire`/`release` pair shared across tasks.
//! * **Window accounting, not in-flight accounting**: An admission consumes
//!   its quota slot for the full window, however long the guarded call takes.
//!   `release` only wakes waiters so they re-check early.
//!
//! ## Example
//!
//! ```rust
//! use quota_window::RateLimiter;
//! use quota_window::TimeUnit;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), quota_window::LimitError> {
//! let limiter = RateLimiter::per_unit(TimeUnit::Minutes, 100)?;
//!
//! limiter.acquire().await;
//! // ... call the API ...
//! limiter.release();
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod error;
mod limiter;
mod sliding_log;
mod time_unit;

pub use error::LimitError;
pub use limiter::Permit;
pub use limiter::RateLimiter;
pub use sliding_log::SlidingLog;
pub use time_unit::ParseTimeUnitError;
pub use time_unit::TimeUnit;

/// Reasons why a request might be held back by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The admission decision behind a [`RateLimiter`].
///
/// Strategies must be `Send` and `Sync` so one instance can be shared by
/// every caller through an `Arc`.
pub trait Strategy: Debug + Send + Sync {
    /// Attempts to admit a single request.
    ///
    /// This method never blocks on time. An admitted request is recorded
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the quota is exhausted, with a hint of how long
    /// until a slot could free up.
    fn process(&self) -> ControlFlow<Reason>;
}
