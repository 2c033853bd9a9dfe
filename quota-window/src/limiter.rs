use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::pin::pin;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Meter;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::LimitError;
use crate::Reason;
use crate::SlidingLog;
use crate::Strategy;
use crate::TimeUnit;

#[derive(Clone, Debug)]
struct RateLimiterMetrics {
    admitted: Counter<u64>,
    throttled: Counter<u64>,
    early_wake: Counter<u64>,
}

/// Admits callers against a [`Strategy`], suspending them while the quota
/// is exhausted.
///
/// A throttled caller sleeps until the strategy's `retry_after` hint
/// elapses or until any caller calls [`release`](Self::release), whichever
/// comes first, then re-checks. The capacity invariant is enforced by the
/// strategy's re-check, not by the precision of the wake-up, so several
/// waiters may race after a wake and admission order is not FIFO.
///
/// Share one limiter between callers with an `Arc`.
#[derive(Debug)]
pub struct RateLimiter<S = SlidingLog> {
    strategy: S,
    wake: Notify,
    instruments: RateLimiterMetrics,
}

impl RateLimiter<SlidingLog> {
    /// Create a limiter admitting `capacity` requests in any trailing `window`.
    pub fn sliding_window(capacity: NonZeroUsize, window: Duration) -> Self {
        Self::new(SlidingLog::new(capacity, window))
    }

    /// Create a limiter admitting `limit` requests per one `unit`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` if `limit` is zero.
    pub fn per_unit(unit: TimeUnit, limit: u32) -> Result<Self, LimitError> {
        let limit = usize::try_from(limit).map_err(|_| LimitError::InvalidCapacity)?;
        SlidingLog::try_new(limit, unit.as_duration()).map(Self::new)
    }
}

impl<S> RateLimiter<S>
where
    S: Strategy,
{
    pub fn new(strategy: S) -> Self {
        Self::with_meter(strategy, &global::meter("rate_limiter"))
    }

    /// Create a limiter that records its counters on `meter`.
    ///
    /// `throttled` counts callers that had to wait at least once, not
    /// re-checks. `early_wake` counts waits cut short by a release.
    pub fn with_meter(strategy: S, meter: &Meter) -> Self {
        let instruments = RateLimiterMetrics {
            admitted: meter.u64_counter("admitted").build(),
            throttled: meter.u64_counter("throttled").build(),
            early_wake: meter.u64_counter("early_wake").build(),
        };

        Self {
            strategy,
            wake: Notify::new(),
            instruments,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Wait until the strategy admits this caller.
    ///
    /// Dropping the returned future before it completes abandons the wait
    /// without consuming a quota slot.
    pub async fn acquire(&self) {
        // Without a token the wait can only end in admission
        let _ = self.wait_for_slot(None).await;
    }

    /// Wait until the strategy admits this caller or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the token is (or becomes) cancelled before
    /// admission. The strategy records nothing in that case.
    pub async fn acquire_cancellable(&self, cancel: &CancellationToken) -> Result<(), LimitError> {
        self.wait_for_slot(Some(cancel)).await
    }

    /// Acquire and wrap the admission in a [`Permit`] that releases on drop.
    pub async fn admit(&self, cancel: Option<&CancellationToken>) -> Result<Permit<'_, S>, LimitError> {
        self.wait_for_slot(cancel).await?;
        Ok(Permit { limiter: self })
    }

    /// Wake every caller currently waiting so it re-checks the strategy.
    ///
    /// This never frees a quota slot: an admission stays on record for the
    /// full window. Calling it without a matching `acquire` is harmless.
    pub fn release(&self) {
        self.wake.notify_waiters();
    }

    async fn wait_for_slot(&self, cancel: Option<&CancellationToken>) -> Result<(), LimitError> {
        let mut throttled = false;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(LimitError::Cancelled);
            }

            // Register for wake-ups before checking, so a release that lands
            // between the check and the wait is not lost.
            let mut notified = pin!(self.wake.notified());
            notified.as_mut().enable();

            let retry_after = match self.strategy.process() {
                ControlFlow::Continue(()) => {
                    self.instruments.admitted.add(1, &[]);
                    debug!("admitted");
                    return Ok(());
                }
                ControlFlow::Break(Reason::Overloaded { retry_after }) => retry_after,
            };

            if !throttled {
                self.instruments.throttled.add(1, &[]);
                throttled = true;
            }
            trace!(?retry_after, "quota exhausted, waiting");

            tokio::select! {
                _ = sleep(retry_after) => {}
                _ = &mut notified => {
                    self.instruments.early_wake.add(1, &[]);
                }
                _ = cancelled(cancel) => {
                    debug!("cancelled while waiting for admission");
                    return Err(LimitError::Cancelled);
                }
            }
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// An admission that calls [`RateLimiter::release`] when dropped.
///
/// Holding the permit across the guarded call guarantees release on every
/// exit path, including early returns and panics.
#[derive(Debug)]
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit<'a, S>
where
    S: Strategy,
{
    limiter: &'a RateLimiter<S>,
}

impl<S> Drop for Permit<'_, S>
where
    S: Strategy,
{
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use more_asserts::assert_ge;
    use opentelemetry::KeyValue;
    use opentelemetry::metrics::InstrumentBuilder;
    use opentelemetry::metrics::InstrumentProvider;
    use opentelemetry::metrics::SyncInstrument;
    use parking_lot::Mutex;
    use more_asserts::assert_lt;
    use tokio::time::Instant;
    use tokio::time::advance;

    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    // A mock strategy that stays closed, hinting a very long wait, until opened
    #[derive(Debug, Default)]
    struct GateStrategy {
        open: AtomicBool,
    }

    impl Strategy for GateStrategy {
        fn process(&self) -> ControlFlow<Reason> {
            if self.open.load(Ordering::SeqCst) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(Reason::Overloaded {
                    retry_after: Duration::from_secs(3600),
                })
            }
        }
    }

    // Sums every u64 counter built from it, keyed by instrument name
    #[derive(Clone, Debug, Default)]
    struct CountingMeter {
        totals: Arc<Mutex<HashMap<String, u64>>>,
    }

    struct NamedCounter {
        name: String,
        totals: Arc<Mutex<HashMap<String, u64>>>,
    }

    impl SyncInstrument<u64> for NamedCounter {
        fn measure(&self, value: u64, _attributes: &[KeyValue]) {
            *self.totals.lock().entry(self.name.clone()).or_default() += value;
        }
    }

    impl InstrumentProvider for CountingMeter {
        fn u64_counter(&self, builder: InstrumentBuilder<'_, Counter<u64>>) -> Counter<u64> {
            Counter::new(Arc::new(NamedCounter {
                name: builder.name.to_string(),
                totals: self.totals.clone(),
            }))
        }
    }

    impl CountingMeter {
        fn meter(&self) -> Meter {
            Meter::new(Arc::new(self.clone()))
        }

        fn total(&self, name: &str) -> u64 {
            self.totals.lock().get(name).copied().unwrap_or_default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn it_blocks_third_caller_until_first_expires() {
        let limiter = RateLimiter::sliding_window(nz(2), Duration::from_millis(100));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        advance(Duration::from_millis(10)).await;
        limiter.acquire().await;

        let elapsed = start.elapsed();
        assert_ge!(elapsed, Duration::from_millis(100));
        assert_lt!(elapsed, Duration::from_millis(110));
        // Both t=0 admissions aged out when the third was logged
        assert_eq!(limiter.strategy().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn release_wakes_but_never_frees_a_window_slot() {
        let limiter = Arc::new(RateLimiter::sliding_window(
            nz(1),
            Duration::from_millis(100),
        ));
        limiter.acquire().await;
        let start = Instant::now();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        };

        advance(Duration::from_millis(10)).await;
        // The call "finished", but the admission stays on record for the window
        limiter.release();
        advance(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished(), "release must not admit before expiry");

        let admitted_at = waiter.await.unwrap();
        assert_ge!(admitted_at.duration_since(start), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_counts_callers_not_rechecks() {
        let counts = CountingMeter::default();
        let limiter = Arc::new(RateLimiter::with_meter(
            SlidingLog::new(nz(1), Duration::from_millis(100)),
            &counts.meter(),
        ));
        limiter.acquire().await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        // Two early wakes force two extra re-checks of a still full window
        for _ in 0..2 {
            advance(Duration::from_millis(10)).await;
            limiter.release();
        }
        advance(Duration::from_millis(100)).await;
        waiter.await.unwrap();

        assert_eq!(counts.total("admitted"), 2);
        assert_eq!(counts.total("throttled"), 1);
        assert_eq!(counts.total("early_wake"), 2);
    }

    #[tokio::test]
    async fn release_wakes_waiters_before_their_hint_elapses() {
        let limiter = Arc::new(RateLimiter::new(GateStrategy::default()));

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };

        // Let the waiter park on its hour-long sleep
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        limiter.strategy().open.store(true, Ordering::SeqCst);
        limiter.release();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("release should wake the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn permit_releases_on_drop() {
        let limiter = Arc::new(RateLimiter::new(GateStrategy::default()));
        limiter.strategy().open.store(true, Ordering::SeqCst);
        let permit = limiter.admit(None).await.unwrap();
        limiter.strategy().open.store(false, Ordering::SeqCst);

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        limiter.strategy().open.store(true, Ordering::SeqCst);
        drop(permit);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dropping the permit should wake the waiter")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_leaves_log_untouched() {
        let limiter = Arc::new(RateLimiter::sliding_window(nz(1), Duration::from_secs(60)));
        limiter.acquire().await;

        let token = CancellationToken::new();
        let waiter = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.acquire_cancellable(&token).await })
        };

        advance(Duration::from_millis(10)).await;
        token.cancel();

        assert_eq!(waiter.await.unwrap(), Err(LimitError::Cancelled));
        assert_eq!(limiter.strategy().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_wait_leaves_log_untouched() {
        let limiter = RateLimiter::sliding_window(nz(1), Duration::from_secs(60));
        limiter.acquire().await;

        let outcome = tokio::time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(outcome.is_err());
        assert_eq!(limiter.strategy().len(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_is_not_admitted() {
        let limiter = RateLimiter::sliding_window(nz(5), Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(
            limiter.acquire_cancellable(&token).await,
            Err(LimitError::Cancelled)
        );
        assert!(limiter.strategy().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_respect_window() {
        let capacity = 5;
        let window = Duration::from_millis(100);
        let limiter = Arc::new(RateLimiter::sliding_window(nz(capacity), window));

        let mut handles = vec![];
        for _ in 0..40 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                let admitted_at = Instant::now();
                limiter.release();
                admitted_at
            }));
        }

        let mut admitted: Vec<Instant> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        admitted.sort();

        // No trailing window may contain more than `capacity` admissions
        for pair in admitted.windows(capacity + 1) {
            assert_ge!(pair[capacity].duration_since(pair[0]), window);
        }
        more_asserts::assert_le!(limiter.strategy().len(), capacity);
    }

    #[test]
    fn per_unit_rejects_zero_limit() {
        assert_eq!(
            RateLimiter::per_unit(TimeUnit::Seconds, 0).unwrap_err(),
            LimitError::InvalidCapacity
        );
        let limiter = RateLimiter::per_unit(TimeUnit::Minutes, 100).unwrap();
        assert_eq!(limiter.strategy().capacity(), 100);
        assert_eq!(limiter.strategy().window(), Duration::from_secs(60));
    }

    #[test]
    fn release_without_acquire_is_harmless() {
        let limiter = RateLimiter::sliding_window(nz(1), Duration::from_secs(1));
        for _ in 0..3 {
            limiter.release();
        }
        assert!(limiter.strategy().is_empty());
        assert!(limiter.strategy().process().is_continue());
    }
}
