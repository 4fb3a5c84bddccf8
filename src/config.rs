//! Configuration for a corpus annotation run.
//!
//! All orchestration behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. Service-specific settings (API keys,
//! model names) live with each service in [`crate::pipeline::service`].

use crate::error::Pdf2RecError;
use crate::pipeline::client::RetryPolicy;
use crate::pipeline::limiter::interval_for_rate;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for an annotation run over a directory of PDFs.
///
/// # Example
/// ```rust
/// use edgequake_pdf2rec::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_window_pages(8)
///     .concurrency(4)
///     .requests_per_second(2.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_window_pages, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum pages submitted in one annotation call. Default: 8.
    ///
    /// Documents no longer than this go out as a single call.
    pub max_window_pages: usize,

    /// Maximum in-flight annotation calls across the whole run. Default: 4.
    pub concurrency: usize,

    /// Maximum documents being worked on at once. Default: 4.
    ///
    /// Bounds memory (each open document holds its bytes); the call budget is
    /// still `concurrency`, shared by every open document.
    pub document_concurrency: usize,

    /// Minimum spacing between dispatched calls, as calls per second.
    /// `0.0` disables spacing. Default: 2.0.
    pub requests_per_second: f64,

    /// Attempts per window, including the first. Default: 5.
    pub max_attempts: u32,

    /// First backoff delay after a throttled attempt, in ms. Default: 1000.
    pub backoff_floor_ms: u64,

    /// Upper bound on any backoff delay, in ms. Default: 30000.
    pub backoff_ceiling_ms: u64,

    /// Also retry transient errors (timeouts, 5xx) besides throttling. Default: false.
    pub retry_transient: bool,

    /// Skip documents whose identity is already in the row sink. Default: true.
    pub resume: bool,

    /// Row-oriented sink (CSV). Default: `output/annotations.csv`.
    pub row_sink_path: PathBuf,

    /// Columnar sink (Parquet). Default: `output/annotations.parquet`.
    pub columnar_sink_path: PathBuf,

    /// Stop counting pages at a "References"/"Bibliography" heading. Default: true.
    pub stop_at_references: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Per-call timeout in seconds, enforced by the services. Default: 120.
    pub api_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_window_pages: 8,
            concurrency: 4,
            document_concurrency: 4,
            requests_per_second: 2.0,
            max_attempts: 5,
            backoff_floor_ms: 1_000,
            backoff_ceiling_ms: 30_000,
            retry_transient: false,
            resume: true,
            row_sink_path: PathBuf::from("output/annotations.csv"),
            columnar_sink_path: PathBuf::from("output/annotations.parquet"),
            stop_at_references: true,
            password: None,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_window_pages", &self.max_window_pages)
            .field("concurrency", &self.concurrency)
            .field("document_concurrency", &self.document_concurrency)
            .field("requests_per_second", &self.requests_per_second)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_floor_ms", &self.backoff_floor_ms)
            .field("backoff_ceiling_ms", &self.backoff_ceiling_ms)
            .field("retry_transient", &self.retry_transient)
            .field("resume", &self.resume)
            .field("row_sink_path", &self.row_sink_path)
            .field("columnar_sink_path", &self.columnar_sink_path)
            .field("stop_at_references", &self.stop_at_references)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Minimum interval between dispatched calls.
    pub fn dispatch_interval(&self) -> Duration {
        // `build()` rejects rates without an interval.
        interval_for_rate(self.requests_per_second).unwrap_or(Duration::ZERO)
    }

    /// The retry policy the annotation client applies per window.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_floor: Duration::from_millis(self.backoff_floor_ms),
            backoff_ceiling: Duration::from_millis(self.backoff_ceiling_ms),
            retry_transient: self.retry_transient,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_window_pages(mut self, n: usize) -> Self {
        self.config.max_window_pages = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn document_concurrency(mut self, n: usize) -> Self {
        self.config.document_concurrency = n;
        self
    }

    pub fn requests_per_second(mut self, rate: f64) -> Self {
        self.config.requests_per_second = rate;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn backoff_floor_ms(mut self, ms: u64) -> Self {
        self.config.backoff_floor_ms = ms;
        self
    }

    pub fn backoff_ceiling_ms(mut self, ms: u64) -> Self {
        self.config.backoff_ceiling_ms = ms;
        self
    }

    pub fn retry_transient(mut self, v: bool) -> Self {
        self.config.retry_transient = v;
        self
    }

    pub fn resume(mut self, v: bool) -> Self {
        self.config.resume = v;
        self
    }

    pub fn row_sink_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.row_sink_path = path.into();
        self
    }

    pub fn columnar_sink_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.columnar_sink_path = path.into();
        self
    }

    pub fn stop_at_references(mut self, v: bool) -> Self {
        self.config.stop_at_references = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2RecError> {
        let c = &self.config;
        if c.max_window_pages == 0 {
            return Err(Pdf2RecError::InvalidConfig(
                "Window size must be ≥ 1 page".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Pdf2RecError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.document_concurrency == 0 {
            return Err(Pdf2RecError::InvalidConfig(
                "Document concurrency must be ≥ 1".into(),
            ));
        }
        if !c.requests_per_second.is_finite() || interval_for_rate(c.requests_per_second).is_none() {
            return Err(Pdf2RecError::InvalidConfig(format!(
                "Call rate must be 0 or a finite positive number with a representable interval, got {}",
                c.requests_per_second
            )));
        }
        if c.max_attempts == 0 {
            return Err(Pdf2RecError::InvalidConfig(
                "Max attempts must be ≥ 1".into(),
            ));
        }
        if c.backoff_floor_ms > c.backoff_ceiling_ms {
            return Err(Pdf2RecError::InvalidConfig(format!(
                "Backoff floor ({}ms) exceeds ceiling ({}ms)",
                c.backoff_floor_ms, c.backoff_ceiling_ms
            )));
        }
        if c.row_sink_path == c.columnar_sink_path {
            return Err(Pdf2RecError::InvalidConfig(
                "Row and columnar sinks must be different files".into(),
            ));
        }
        Ok(self.config)
    }
}
