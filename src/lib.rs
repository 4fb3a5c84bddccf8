//! # edgequake-pdf2rec
//!
//! Turn a directory of long PDFs into one structured record per document.
//!
//! Each document is cut into page windows of bounded size, every window is
//! sent to an annotation service (Mistral OCR document annotation, or any
//! `edgequake-llm` vision model) together with a JSON Schema, and the partial
//! records that come back are merged in page order. Results are appended to a
//! CSV file and a Parquet file; documents already present in the CSV are
//! skipped, so an interrupted run can simply be started again.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  *.pdf, fingerprint = sha256(file name)
//!  ├─ 2. Resume    skip fingerprints already in the row sink
//!  ├─ 3. Load      bytes + page count (stops at a References heading)
//!  ├─ 4. Plan      [0,8) [8,16) [16,20) …
//!  ├─ 5. Annotate  gate ─▶ rate limiter ─▶ service, with bounded backoff
//!  ├─ 6. Merge     earliest value wins, lists union, maps recurse
//!  └─ 7. Persist   Parquet (schema-stable) then CSV (marks done)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2rec::{
//!     MistralOcrConfig, MistralOcrService, Orchestrator, PipelineConfig, ResponseSchema,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = ResponseSchema::from_file("schema.json").await?;
//!     let service = MistralOcrService::new(MistralOcrConfig::from_env()?)?;
//!     let config = PipelineConfig::builder()
//!         .max_window_pages(8)
//!         .requests_per_second(1.0)
//!         .build()?;
//!
//!     let summary = Orchestrator::new(config, Arc::new(service), schema)
//!         .run(std::path::Path::new("papers"))
//!         .await?;
//!     eprintln!("{} processed, {} skipped", summary.processed, summary.skipped);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2rec` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod orchestrator;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{CallOutcome, Pdf2RecError, ServiceError, WindowError};
pub use fingerprint::Fingerprint;
pub use orchestrator::{DocumentOutcome, Orchestrator, RunSummary, ShutdownHandle};
pub use persist::{ColumnarSink, IncrementalPersister, ResumableIndex, RowSink};
pub use pipeline::client::{AnnotationClient, RetryPolicy, WindowOutput};
pub use pipeline::input::{discover_documents, DocumentLoader, DocumentRef, PdfDocumentLoader, SourceDocument};
pub use pipeline::limiter::{ConcurrencyGate, RateLimiter};
pub use pipeline::merge::merge_records;
pub use pipeline::service::{
    AnnotationService, MistralOcrConfig, MistralOcrService, VisionAnnotationService, VisionConfig,
};
pub use pipeline::window::{plan_windows, PageWindow, WindowPlan};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use record::{MergedRecord, PartialRecord};
pub use schema::ResponseSchema;
