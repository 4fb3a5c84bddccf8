//! Progress-callback trait for per-document and per-window run events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through the corpus.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2rec::{PipelineConfig, RunProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     persisted: AtomicUsize,
//! }
//!
//! impl RunProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, name: &str, windows_ok: usize, windows_total: usize) {
//!         let done = self.persisted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {name} ({windows_ok}/{windows_total} windows)");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { persisted: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .progress_callback(cb as Arc<dyn RunProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::orchestrator::RunSummary;
use crate::pipeline::window::PageWindow;
use std::sync::Arc;

/// Called by the orchestrator as it processes the corpus.
///
/// Window events for different documents interleave; document events arrive
/// in completion order, not discovery order. All methods default to no-ops.
pub trait RunProgressCallback: Send + Sync {
    /// Called once after discovery and the resume check.
    ///
    /// * `to_process`: documents that will be attempted
    /// * `skipped`   : documents already present in the sinks
    fn on_run_start(&self, to_process: usize, skipped: usize) {
        let _ = (to_process, skipped);
    }

    /// Called for each document skipped by the resume check.
    fn on_document_skipped(&self, name: &str) {
        let _ = name;
    }

    /// Called once a document's windows are planned.
    fn on_document_start(&self, name: &str, windows: usize) {
        let _ = (name, windows);
    }

    /// Called when a window yields a partial record.
    fn on_window_complete(&self, name: &str, window: &PageWindow, attempts: u32) {
        let _ = (name, window, attempts);
    }

    /// Called when a window contributes nothing.
    fn on_window_error(&self, name: &str, window: &PageWindow, error: &str) {
        let _ = (name, window, error);
    }

    /// Called after a document's merged record is durably persisted.
    fn on_document_complete(&self, name: &str, windows_ok: usize, windows_total: usize) {
        let _ = (name, windows_ok, windows_total);
    }

    /// Called when a document fails (read error, all windows failed, persist error).
    fn on_document_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once at the end of the run.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;
