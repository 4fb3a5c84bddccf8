//! Annotation client: one window in, one partial record (or a window error) out.
//!
//! Every annotation call in a run goes through a single [`AnnotationClient`],
//! which owns the shared [`ConcurrencyGate`] and [`RateLimiter`]. The flow for
//! one window:
//!
//! ```text
//! acquire gate slot ──▶ ┌─ limiter.wait() ─▶ service.submit() ─▶ classify ─┐
//!                       │                                                 │
//!                       └──── sleep(backoff) ◀── Retryable ◀──────────────┘
//!                                                Success   ─▶ WindowOutput
//!                                                Permanent ─▶ WindowError
//! ```
//!
//! The gate slot is held across retries so a throttled window does not let
//! other windows jump the bound; every attempt (first or retry) passes the
//! limiter, so retries never exceed the configured rate either.

use crate::error::{CallOutcome, ServiceError, WindowError};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::limiter::{ConcurrencyGate, RateLimiter};
use crate::pipeline::postprocess::parse_partial_record;
use crate::pipeline::service::AnnotationService;
use crate::pipeline::window::PageWindow;
use crate::record::PartialRecord;
use crate::schema::ResponseSchema;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per window, first call included.
    pub max_attempts: u32,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    /// Also retry timeouts and upstream 5xx, not just throttling.
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_floor: Duration::from_millis(1000),
            backoff_ceiling: Duration::from_millis(30_000),
            retry_transient: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    ///
    /// `min(ceiling, floor * 2^(retry-1))`, never below the floor.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let delay = self
            .backoff_floor
            .checked_mul(1u32 << exp)
            .unwrap_or(self.backoff_ceiling);
        delay.min(self.backoff_ceiling).max(self.backoff_floor)
    }

    /// Like [`Self::delay_for`], but honour a longer server-specified delay
    /// up to the ceiling.
    pub fn delay_with_hint(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let base = self.delay_for(retry);
        match retry_after {
            Some(hint) if hint > base => hint.min(self.backoff_ceiling),
            _ => base,
        }
    }
}

/// A successful window call.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutput {
    pub window: PageWindow,
    pub record: PartialRecord,
    /// Attempts spent, first call included.
    pub attempts: u32,
}

/// Shared, cloneable front end to an [`AnnotationService`].
#[derive(Clone)]
pub struct AnnotationClient {
    service: Arc<dyn AnnotationService>,
    schema: Arc<ResponseSchema>,
    gate: ConcurrencyGate,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AnnotationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationClient")
            .field("service", &self.service.name())
            .field("schema", &self.schema.name)
            .field("gate", &self.gate)
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .finish()
    }
}

impl AnnotationClient {
    pub fn new(
        service: Arc<dyn AnnotationService>,
        schema: Arc<ResponseSchema>,
        gate: ConcurrencyGate,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service,
            schema,
            gate,
            limiter,
            retry,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn service_name(&self) -> String {
        self.service.name()
    }

    /// Annotate one window, retrying throttled attempts within the budget.
    pub async fn call(
        &self,
        document: &SourceDocument,
        window: &PageWindow,
    ) -> Result<WindowOutput, WindowError> {
        let _slot = self.gate.acquire().await.map_err(|e| WindowError::Rejected {
            start: window.start,
            end: window.end,
            detail: e.to_string(),
        })?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.wait().await;

            let raw = self.service.submit(document, window, &self.schema).await;
            let err = match self.classify(window, raw) {
                CallOutcome::Success(record) => {
                    debug!(
                        doc = %document.name,
                        window = %window,
                        attempt,
                        fields = record.len(),
                        "window annotated"
                    );
                    return Ok(WindowOutput {
                        window: window.clone(),
                        record,
                        attempts: attempt,
                    });
                }
                CallOutcome::Permanent(e) => {
                    warn!(doc = %document.name, window = %window, attempt, "{e}");
                    return Err(e);
                }
                CallOutcome::Retryable(e) => e,
            };

            if attempt >= max_attempts {
                warn!(
                    doc = %document.name,
                    window = %window,
                    attempts = attempt,
                    "retry budget exhausted: {err}"
                );
                return Err(WindowError::RetriesExhausted {
                    start: window.start,
                    end: window.end,
                    attempts: attempt,
                    detail: err.to_string(),
                });
            }

            let retry_after = match &err {
                ServiceError::RateLimited { retry_after, .. } => *retry_after,
                _ => None,
            };
            let delay = self.retry.delay_with_hint(attempt, retry_after);
            debug!(
                doc = %document.name,
                window = %window,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying after {err}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn classify(&self, window: &PageWindow, raw: Result<String, ServiceError>) -> CallOutcome {
        match raw {
            Ok(text) => match parse_partial_record(&text) {
                Ok(record) => CallOutcome::Success(record),
                Err(detail) => CallOutcome::Permanent(WindowError::MalformedResponse {
                    start: window.start,
                    end: window.end,
                    detail,
                }),
            },
            Err(e @ ServiceError::RateLimited { .. }) => CallOutcome::Retryable(e),
            Err(ServiceError::Transient(detail)) if self.retry.retry_transient => {
                CallOutcome::Retryable(ServiceError::Transient(detail))
            }
            Err(e) => CallOutcome::Permanent(WindowError::Rejected {
                start: window.start,
                end: window.end,
                detail: e.to_string(),
            }),
        }
    }
}
