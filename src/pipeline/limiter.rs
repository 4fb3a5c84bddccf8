//! Dispatch spacing and in-flight bounds for annotation calls.
//!
//! Both collaborators are plain values injected into the
//! [`crate::pipeline::client::AnnotationClient`]; a run shares one instance of
//! each across every document and window.
//!
//! [`RateLimiter`] is a minimum-interval gate, not a token bucket: there is no
//! burst credit, so even after an idle period two grants are always at least
//! one interval apart. Waiters queue on a `tokio::sync::Mutex`, which is fair,
//! so grants are issued in arrival order.

use crate::error::Pdf2RecError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::trace;

/// Minimum interval for `rate` calls per second.
///
/// `0.0` maps to no spacing. Negative, NaN and rates whose reciprocal does
/// not fit a [`Duration`] (tiny or subnormal values) yield `None`.
pub fn interval_for_rate(rate: f64) -> Option<Duration> {
    if rate == 0.0 {
        return Some(Duration::ZERO);
    }
    if rate.is_nan() || rate < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rate).ok()
}

/// Spaces dispatched calls at least `interval` apart, FIFO.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    /// `rate` calls per second; `0.0` means no spacing.
    ///
    /// `None` when no interval exists for `rate` (see [`interval_for_rate`]).
    pub fn per_second(rate: f64) -> Option<Self> {
        interval_for_rate(rate).map(Self::new)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspend until at least one interval has passed since the previous grant.
    ///
    /// The lock is held while sleeping so later arrivals queue behind.
    pub async fn wait(&self) {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.interval;
            if ready_at > Instant::now() {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "rate limiter holding call");
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Counting gate bounding in-flight annotation calls across the run.
///
/// Also records the current and peak number of held slots so tests and the
/// run summary can observe the bound.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGate {
    /// A gate with `capacity` slots (0 is treated as 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot. The slot is returned when the permit drops,
    /// whichever way the holder exits (success, error, or cancellation).
    pub async fn acquire(&self) -> Result<GatePermit, Pdf2RecError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| Pdf2RecError::Internal(format!("concurrency gate closed: {e}")))?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(GatePermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots held right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// A held gate slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
