//! CLI binary for edgequake-pdf2rec.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, picks an annotation service, and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2rec::{
    AnnotationService, MistralOcrConfig, MistralOcrService, Orchestrator, PageWindow,
    PipelineConfig, ProgressCallback, ResponseSchema, RunProgressCallback, RunSummary,
    VisionAnnotationService, VisionConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over documents; window failures are printed above it as they
/// happen, since documents complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    window_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input directory…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            window_errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Annotating");
        self.bar.set_message("");
        self.bar.reset_eta();
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, to_process: usize, skipped: usize) {
        self.activate_bar(to_process);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("{to_process} documents to annotate")),
            dim(&format!("({skipped} already done)"))
        ));
    }

    fn on_document_start(&self, name: &str, windows: usize) {
        self.bar
            .set_message(dim(&format!("{} ({windows} windows)", truncate(name, 40))));
    }

    fn on_window_error(&self, name: &str, window: &PageWindow, error: &str) {
        self.window_errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {} pages {}  {}",
            red("✗"),
            truncate(name, 40),
            window,
            red(&truncate(error, 80))
        ));
    }

    fn on_document_complete(&self, name: &str, windows_ok: usize, windows_total: usize) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            truncate(name, 40),
            dim(&format!("{windows_ok}/{windows_total} windows"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            red("✘"),
            truncate(name, 40),
            red(&truncate(error.lines().next().unwrap_or(error), 80))
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Annotate every PDF in papers/ with Mistral OCR
  pdf2rec papers/ --schema schema.json

  # Use a vision model instead, smaller windows, slower rate
  pdf2rec papers/ --schema schema.json --service vision --model gpt-4.1-mini \
      --window-pages 4 --rate 0.5

  # Custom output files; JSON summary on stdout
  pdf2rec papers/ --schema schema.json --rows out/meta.csv --columns out/meta.parquet --json

RESUMING:
  Documents whose fingerprint (sha256 of the file name) already appears in the
  CSV sink are skipped. Re-run the same command after an interruption to pick
  up where it stopped. --overwrite annotates everything again (rows are
  appended, nothing is deleted).

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Mistral API key (--service mistral)
  MISTRAL_BASE_URL        Override the Mistral API base URL
  OPENAI_API_KEY          OpenAI API key (--service vision)
  ANTHROPIC_API_KEY       Anthropic API key (--service vision)
  GEMINI_API_KEY          Google Gemini API key (--service vision)
  EDGEQUAKE_LLM_PROVIDER  Override vision provider
  EDGEQUAKE_MODEL         Override vision model ID
  PDFIUM_LIB_PATH         Path to libpdfium
"#;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceArg {
    /// Mistral OCR with document annotation
    Mistral,
    /// Rendered pages sent to an edgequake-llm vision model
    Vision,
}

/// Extract one structured record per PDF using windowed annotation calls.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2rec",
    version,
    about = "Extract one structured record per PDF using windowed annotation calls",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the PDF corpus.
    input: PathBuf,

    /// JSON Schema file describing the record to extract.
    #[arg(short, long, env = "PDF2REC_SCHEMA")]
    schema: PathBuf,

    /// Annotation service.
    #[arg(long, env = "PDF2REC_SERVICE", value_enum, default_value = "mistral")]
    service: ServiceArg,

    /// Row sink (CSV). Also the resume index.
    #[arg(long, env = "PDF2REC_ROWS", default_value = "output/annotations.csv")]
    rows: PathBuf,

    /// Columnar sink (Parquet).
    #[arg(long, env = "PDF2REC_COLUMNS", default_value = "output/annotations.parquet")]
    columns: PathBuf,

    /// Maximum pages per annotation call.
    #[arg(long, env = "PDF2REC_WINDOW_PAGES", default_value_t = 8)]
    window_pages: usize,

    /// Maximum annotation calls in flight across the run.
    #[arg(short, long, env = "PDF2REC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Documents processed at the same time.
    #[arg(long, env = "PDF2REC_DOCUMENTS", default_value_t = 4)]
    documents: usize,

    /// Calls per second (0 disables spacing).
    #[arg(long, env = "PDF2REC_RATE", default_value_t = 2.0)]
    rate: f64,

    /// Attempts per window, first call included.
    #[arg(long, env = "PDF2REC_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// First backoff delay in milliseconds.
    #[arg(long, env = "PDF2REC_BACKOFF_FLOOR_MS", default_value_t = 1000)]
    backoff_floor_ms: u64,

    /// Longest backoff delay in milliseconds.
    #[arg(long, env = "PDF2REC_BACKOFF_CEILING_MS", default_value_t = 30_000)]
    backoff_ceiling_ms: u64,

    /// Also retry timeouts and upstream 5xx errors.
    #[arg(long, env = "PDF2REC_RETRY_TRANSIENT")]
    retry_transient: bool,

    /// Annotate documents even if they are already in the sinks.
    #[arg(long, env = "PDF2REC_OVERWRITE")]
    overwrite: bool,

    /// Send reference/bibliography pages too.
    #[arg(long, env = "PDF2REC_KEEP_REFERENCES")]
    keep_references: bool,

    /// Model ID (OCR model for mistral, vision model for vision).
    #[arg(long, env = "PDF2REC_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2REC_PROVIDER")]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2REC_PASSWORD")]
    password: Option<String>,

    /// Per-call HTTP timeout in seconds.
    #[arg(long, env = "PDF2REC_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "PDF2REC_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2REC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2REC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2REC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let schema = ResponseSchema::from_file(&cli.schema)
        .await
        .context("Failed to load response schema")?;
    if schema.columns().is_empty() {
        warn!("schema declares no top-level properties; CSV columns follow the first record");
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let service = build_service(&cli)?;

    let orchestrator = Orchestrator::new(config, service, schema);

    let shutdown = orchestrator.shutdown_handle();
    let quiet = cli.quiet;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !quiet {
                eprintln!(
                    "{} interrupt received; finishing documents in flight…",
                    cyan("◆")
                );
            }
            shutdown.trigger();
        }
    });

    let summary = orchestrator
        .run(&cli.input)
        .await
        .context("Annotation run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary, &cli);
    }

    if summary.processed == 0 && summary.failed > 0 {
        anyhow::bail!("every attempted document failed");
    }
    Ok(())
}

fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_window_pages(cli.window_pages)
        .concurrency(cli.concurrency)
        .document_concurrency(cli.documents)
        .requests_per_second(cli.rate)
        .max_attempts(cli.max_attempts)
        .backoff_floor_ms(cli.backoff_floor_ms)
        .backoff_ceiling_ms(cli.backoff_ceiling_ms)
        .retry_transient(cli.retry_transient)
        .resume(!cli.overwrite)
        .stop_at_references(!cli.keep_references)
        .row_sink_path(&cli.rows)
        .columnar_sink_path(&cli.columns)
        .api_timeout_secs(cli.api_timeout);
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn build_service(cli: &Cli) -> Result<Arc<dyn AnnotationService>> {
    match cli.service {
        ServiceArg::Mistral => {
            let mut config = MistralOcrConfig::from_env()
                .context("Mistral OCR is not configured")?
                .with_timeout(Duration::from_secs(cli.api_timeout));
            if let Some(ref model) = cli.model {
                config = config.with_model(model.clone());
            }
            Ok(Arc::new(MistralOcrService::new(config)?))
        }
        ServiceArg::Vision => {
            let config = VisionConfig {
                provider_name: cli.provider.clone(),
                model: cli.model.clone(),
                password: cli.password.clone(),
                ..Default::default()
            };
            Ok(Arc::new(
                VisionAnnotationService::new(config).context("Vision provider is not configured")?,
            ))
        }
    }
}

fn print_summary(summary: &RunSummary, cli: &Cli) {
    let mark = if summary.failed == 0 {
        green("✔")
    } else if summary.processed == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {} processed, {} skipped, {} failed, {} empty  {}",
        mark,
        bold(&summary.processed.to_string()),
        summary.skipped,
        if summary.failed > 0 {
            red(&summary.failed.to_string())
        } else {
            summary.failed.to_string()
        },
        summary.empty,
        dim(&format!("{:.1}s", summary.duration_ms as f64 / 1000.0)),
    );
    if summary.windows_failed > 0 {
        eprintln!(
            "  {} of {} windows contributed nothing",
            summary.windows_failed, summary.windows_total
        );
    }
    if summary.interrupted {
        eprintln!("  interrupted; re-run the same command to continue");
    }
    eprintln!(
        "  {} {}\n  {} {}",
        dim("rows:   "),
        cli.rows.display(),
        dim("columns:"),
        cli.columns.display()
    );
}
