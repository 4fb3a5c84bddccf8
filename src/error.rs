//! Error types for the edgequake-pdf2rec library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2RecError`]: a **document** (or the whole run) cannot proceed:
//!   unreadable PDF, missing schema, a sink that failed to take the row.
//!   Only [`Pdf2RecError::is_fatal`] errors abort the run; everything else is
//!   logged, counted, and the run moves on to the next document.
//!
//! * [`WindowError`]: **non-fatal**: one page window contributed nothing
//!   (retries exhausted, service rejected the request, unparseable response).
//!   The document is still merged from its remaining windows.
//!
//! * [`ServiceError`]: what an [`crate::pipeline::service::AnnotationService`]
//!   reports at its boundary. The client classifies it into retry or give-up
//!   via [`CallOutcome`].

use crate::record::PartialRecord;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Document- and run-level errors.
#[derive(Debug, Error)]
pub enum Pdf2RecError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist or is not a directory.
    #[error("Input directory not found: '{path}'")]
    InputDirNotFound { path: PathBuf },

    /// A source document could not be read or identified.
    #[error("Failed to read '{name}': {detail}")]
    SourceRead { name: String, detail: String },

    /// The file was read but is not a PDF.
    #[error("'{name}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: [u8; 4] },

    /// pdfium could not open the document.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none (or the wrong one) was provided.
    #[error("PDF '{name}' is encrypted.\nProvide the password with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Schema / service errors ───────────────────────────────────────────
    /// The response schema could not be loaded.
    #[error("Failed to load response schema '{path}': {detail}")]
    SchemaLoad { path: PathBuf, detail: String },

    /// The configured annotation provider is not initialised (missing API key etc.).
    #[error("Annotation provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every window of a document failed; nothing to merge.
    #[error("All {total} windows of '{name}' failed.\nFirst error: {first_error}")]
    AllWindowsFailed {
        name: String,
        total: usize,
        first_error: String,
    },

    // ── Persistence errors ────────────────────────────────────────────────
    /// A sink rejected one document's row. The document stays reprocessable.
    #[error("Failed to persist '{name}' to '{path}': {detail}")]
    PersistFailed {
        name: String,
        path: PathBuf,
        detail: String,
    },

    /// A sink is unreadable or inconsistent; continuing would corrupt it further.
    #[error("Sink '{path}' is corrupt: {detail}")]
    SinkCorrupt { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2RecError {
    /// Whether this error must stop the whole run instead of one document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Pdf2RecError::SinkCorrupt { .. } | Pdf2RecError::PdfiumBindingFailed(_)
        )
    }
}

/// A non-fatal error for a single page window.
///
/// Windows are half-open page ranges `[start, end)`, 0-indexed.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum WindowError {
    /// The service kept throttling until the attempt budget ran out.
    #[error("Pages [{start}, {end}): gave up after {attempts} attempts: {detail}")]
    RetriesExhausted {
        start: usize,
        end: usize,
        attempts: u32,
        detail: String,
    },

    /// The service returned a non-retryable error.
    #[error("Pages [{start}, {end}): service rejected the request: {detail}")]
    Rejected {
        start: usize,
        end: usize,
        detail: String,
    },

    /// The service answered, but not with a JSON object.
    #[error("Pages [{start}, {end}): malformed response: {detail}")]
    MalformedResponse {
        start: usize,
        end: usize,
        detail: String,
    },
}

/// Failure reported by an annotation service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Throttled. `retry_after` carries a server-specified delay if any.
    #[error("rate limited: {detail}")]
    RateLimited {
        retry_after: Option<Duration>,
        detail: String,
    },

    /// Timeout, connection reset, upstream 5xx.
    #[error("transient error: {0}")]
    Transient(String),

    /// Anything else: bad request, auth failure, content refused.
    #[error("permanent error: {0}")]
    Permanent(String),
}

/// Classified result of a single annotation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Parsed partial record.
    Success(PartialRecord),
    /// Worth another attempt after backing off.
    Retryable(ServiceError),
    /// Give up on this window immediately.
    Permanent(WindowError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_windows_failed_display() {
        let e = Pdf2RecError::AllWindowsFailed {
            name: "paper.pdf".into(),
            total: 3,
            first_error: "boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 3 windows"), "got: {msg}");
        assert!(msg.contains("paper.pdf"));
    }

    #[test]
    fn only_sink_corruption_and_binding_are_fatal() {
        let corrupt = Pdf2RecError::SinkCorrupt {
            path: "out.parquet".into(),
            detail: "bad footer".into(),
        };
        assert!(corrupt.is_fatal());
        assert!(Pdf2RecError::PdfiumBindingFailed("missing".into()).is_fatal());

        let persist = Pdf2RecError::PersistFailed {
            name: "a.pdf".into(),
            path: "out.csv".into(),
            detail: "disk full".into(),
        };
        assert!(!persist.is_fatal());
        assert!(!Pdf2RecError::SourceRead {
            name: "a.pdf".into(),
            detail: "gone".into()
        }
        .is_fatal());
    }

    #[test]
    fn window_error_display_has_range() {
        let e = WindowError::RetriesExhausted {
            start: 8,
            end: 16,
            attempts: 5,
            detail: "429".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("[8, 16)"), "got: {msg}");
        assert!(msg.contains("5 attempts"));
    }

    #[test]
    fn rate_limited_display() {
        let e = ServiceError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            detail: "slow down".into(),
        };
        assert!(e.to_string().contains("slow down"));
    }
}
