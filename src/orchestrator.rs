//! Corpus orchestration: discover → resume check → annotate → merge → persist.
//!
//! ```text
//! discover_documents ─▶ ResumableIndex ─▶ stream of DocumentRefs
//!                                            │ buffer_unordered(document_concurrency)
//!                                            ▼
//!                       load ─▶ plan_windows ─▶ join_all(client.call per window)
//!                                            │ sort by window start, merge
//!                                            ▼
//!                       single consumer loop ─▶ IncrementalPersister::append
//! ```
//!
//! Every document future is polled from the one task that runs [`Orchestrator::run`],
//! so the only cross-document state is the client's gate and limiter, and sink
//! appends never overlap. Documents complete in whatever order their windows
//! finish; within a document, records are always merged in page order.

use crate::config::PipelineConfig;
use crate::error::{Pdf2RecError, WindowError};
use crate::pipeline::client::{AnnotationClient, WindowOutput};
use crate::pipeline::input::{discover_documents, DocumentLoader, DocumentRef, PdfDocumentLoader, SourceDocument};
use crate::pipeline::limiter::{ConcurrencyGate, RateLimiter};
use crate::pipeline::merge::merge_records;
use crate::pipeline::service::AnnotationService;
use crate::pipeline::window::{plan_windows, PageWindow, WindowPlan};
use crate::persist::{IncrementalPersister, ResumableIndex};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::record::MergedRecord;
use crate::schema::ResponseSchema;
use chrono::Utc;
use futures::future::{join_all, ready};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// PDFs found in the input directory.
    pub discovered: usize,
    /// Documents merged and persisted this run.
    pub processed: usize,
    /// Documents skipped because the sinks already hold them.
    pub skipped: usize,
    /// Documents that failed (read error, every window failed, persist error).
    pub failed: usize,
    /// Documents with no annotatable pages.
    pub empty: usize,
    pub windows_total: usize,
    pub windows_failed: usize,
    pub duration_ms: u64,
    /// The run stopped admitting documents because shutdown was requested.
    pub interrupted: bool,
}

/// Stops admission of new documents; in-flight documents still finish.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What became of one admitted document, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    Merged(MergedRecord),
    /// Zero pages: nothing annotated, nothing persisted.
    Empty,
}

pub struct Orchestrator {
    config: PipelineConfig,
    client: AnnotationClient,
    loader: Arc<dyn DocumentLoader>,
    schema: Arc<ResponseSchema>,
    progress: ProgressCallback,
    shutdown: ShutdownHandle,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        service: Arc<dyn AnnotationService>,
        schema: ResponseSchema,
    ) -> Self {
        let schema = Arc::new(schema);
        let client = AnnotationClient::new(
            service,
            Arc::clone(&schema),
            ConcurrencyGate::new(config.concurrency),
            Arc::new(RateLimiter::new(config.dispatch_interval())),
            config.retry_policy(),
        );
        let loader: Arc<dyn DocumentLoader> = Arc::new(PdfDocumentLoader::new(
            config.password.clone(),
            config.stop_at_references,
        ));
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            client,
            loader,
            schema,
            progress,
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Replace the PDF loader (tests, non-file sources).
    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn client(&self) -> &AnnotationClient {
        &self.client
    }

    /// Process every PDF in `input_dir` not already present in the sinks.
    ///
    /// Returns `Err` only for run-level failures: a missing input directory, a
    /// corrupt sink, or a fatal loader error. Per-document failures are counted
    /// in the summary.
    pub async fn run(&self, input_dir: &Path) -> Result<RunSummary, Pdf2RecError> {
        let started = Instant::now();
        info!(
            "Starting run over {} with {}",
            input_dir.display(),
            self.client.service_name()
        );

        let docs = discover_documents(input_dir).await?;
        // Opening the sinks repairs a torn final row, so it precedes the index read.
        let persister = IncrementalPersister::open(
            self.config.row_sink_path.clone(),
            self.config.columnar_sink_path.clone(),
            self.schema.columns(),
        )
        .await?;
        let index = self.load_index().await?;

        let mut summary = RunSummary {
            discovered: docs.len(),
            ..Default::default()
        };

        let (skipped, pending): (Vec<DocumentRef>, Vec<DocumentRef>) = docs
            .into_iter()
            .partition(|doc| index.should_skip(&doc.identity));
        for doc in &skipped {
            debug!(doc = %doc.name, identity = %doc.identity.short(), "already persisted, skipping");
            self.progress.on_document_skipped(&doc.name);
        }
        summary.skipped = skipped.len();
        info!(
            "{} documents to process, {} already persisted",
            pending.len(),
            summary.skipped
        );
        self.progress.on_run_start(pending.len(), summary.skipped);

        let shutdown = self.shutdown.clone();
        let mut results = stream::iter(pending)
            .take_while(move |_| ready(!shutdown.is_triggered()))
            .map(|doc| async move {
                let result = self.process_document(&doc).await;
                (doc, result)
            })
            .buffer_unordered(self.config.document_concurrency.max(1));

        while let Some((doc, result)) = results.next().await {
            match result {
                Ok(DocumentOutcome::Merged(record)) => {
                    summary.windows_total += record.windows_total;
                    summary.windows_failed += record.windows_failed;
                    match persister.append(&record).await {
                        Ok(()) => {
                            summary.processed += 1;
                            info!(
                                doc = %doc.name,
                                windows = record.windows_total,
                                failed_windows = record.windows_failed,
                                "document persisted"
                            );
                            self.progress.on_document_complete(
                                &doc.name,
                                record.windows_total - record.windows_failed,
                                record.windows_total,
                            );
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            summary.failed += 1;
                            error!(doc = %doc.name, "{e}");
                            self.progress.on_document_error(&doc.name, &e.to_string());
                        }
                    }
                }
                Ok(DocumentOutcome::Empty) => {
                    summary.empty += 1;
                    info!(doc = %doc.name, "no annotatable pages, nothing to persist");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if let Pdf2RecError::AllWindowsFailed { total, .. } = &e {
                        summary.windows_total += total;
                        summary.windows_failed += total;
                    }
                    summary.failed += 1;
                    error!(doc = %doc.name, "{e}");
                    self.progress.on_document_error(&doc.name, &e.to_string());
                }
            }
        }

        summary.interrupted = self.shutdown.is_triggered();
        summary.duration_ms = started.elapsed().as_millis() as u64;
        if summary.interrupted {
            warn!("Run interrupted; unstarted documents will be picked up by the next run");
        }
        info!(
            "Run complete: {} processed, {} skipped, {} failed, {} empty in {}ms",
            summary.processed, summary.skipped, summary.failed, summary.empty, summary.duration_ms
        );
        self.progress.on_run_complete(&summary);
        Ok(summary)
    }

    /// Load, annotate and merge one document. Does not persist.
    pub async fn process_document(&self, doc: &DocumentRef) -> Result<DocumentOutcome, Pdf2RecError> {
        let source = self.loader.load(doc).await?;
        let plan = plan_windows(&source.identity, source.page_count, self.config.max_window_pages);
        let windows_total = plan.len();
        self.progress.on_document_start(&source.name, windows_total);
        debug!(doc = %source.name, pages = source.page_count, windows = windows_total, "planned");

        let (fields, windows_failed) = match plan {
            WindowPlan::Empty => return Ok(DocumentOutcome::Empty),
            WindowPlan::Single(window) => {
                let result = self.client.call(&source, &window).await;
                let (outputs, failed) = self.collect(&source, vec![(window, result)])?;
                // Folding one record still normalizes it.
                (merge_records(outputs.into_iter().map(|o| o.record)), failed)
            }
            WindowPlan::Chunked(windows) => {
                let calls = windows.into_iter().map(|window| {
                    let source = &source;
                    async move {
                        let result = self.client.call(source, &window).await;
                        (window, result)
                    }
                });
                let (mut outputs, failed) = self.collect(&source, join_all(calls).await)?;
                outputs.sort_by_key(|o| o.window.start);
                (merge_records(outputs.into_iter().map(|o| o.record)), failed)
            }
        };

        Ok(DocumentOutcome::Merged(MergedRecord {
            source_identity: source.identity.clone(),
            source_name: source.name.clone(),
            processed_at: Utc::now(),
            windows_total,
            windows_failed,
            fields,
        }))
    }

    async fn load_index(&self) -> Result<ResumableIndex, Pdf2RecError> {
        if !self.config.resume {
            return Ok(ResumableIndex::empty());
        }
        let path = self.config.row_sink_path.clone();
        let index = tokio::task::spawn_blocking(move || ResumableIndex::load(&path))
            .await
            .map_err(|e| Pdf2RecError::Internal(format!("Index load task panicked: {e}")))??;
        debug!(identities = index.len(), "resume index ready");
        Ok(index)
    }

    /// Report each window, keep the successes, count the failures.
    ///
    /// Every window failing is a document error.
    fn collect(
        &self,
        source: &SourceDocument,
        results: Vec<(PageWindow, Result<WindowOutput, WindowError>)>,
    ) -> Result<(Vec<WindowOutput>, usize), Pdf2RecError> {
        let total = results.len();
        let mut outputs = Vec::with_capacity(total);
        let mut first_error: Option<WindowError> = None;
        for (window, result) in results {
            match result {
                Ok(output) => {
                    self.progress
                        .on_window_complete(&source.name, &window, output.attempts);
                    outputs.push(output);
                }
                Err(e) => {
                    self.progress
                        .on_window_error(&source.name, &window, &e.to_string());
                    first_error.get_or_insert(e);
                }
            }
        }
        if outputs.is_empty() {
            return Err(Pdf2RecError::AllWindowsFailed {
                name: source.name.clone(),
                total,
                first_error: first_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no windows".to_string()),
            });
        }
        let failed = total - outputs.len();
        Ok((outputs, failed))
    }
}
