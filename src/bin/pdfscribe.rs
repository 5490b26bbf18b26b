//! CLI binary for pdfscribe.
//!
//! `pdfscribe serve` runs the HTTP backend; `pdfscribe ocr` runs the same
//! pipeline once against a local file or URL and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfscribe::pipeline::input::is_url;
use pdfscribe::{
    Backend, DispatchProgressCallback, OcrConfig, OcrService, PdfiumPageSource, ProgressCallback,
    UploadInput, UploadedFile,
};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Live progress bar with one log line per finished batch. Batches finish
/// out of order, so start times are kept per batch.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, batch: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&batch))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl DispatchProgressCallback for CliProgressCallback {
    fn on_dispatch_start(&self, total_batches: usize, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_batches as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Sending {total_pages} pages in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(batch, Instant::now());
        }
        self.bar.set_message(format!("batch {batch}"));
    }

    fn on_batch_complete(&self, batch: usize, total: usize, text_len: usize) {
        let secs = self.elapsed_secs(batch);
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            batch,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(batch);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_dispatch_complete(&self, total_batches: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if success_count == total_batches {
            eprintln!(
                "{} {} batches extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} batches extracted before the run was abandoned",
                red("✘"),
                bold(&success_count.to_string()),
                total_batches,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP backend
  pdfscribe serve --port 8080

  # OCR a local invoice to stdout
  pdfscribe ocr invoice.pdf

  # OCR a URL and extract a JSON record
  pdfscribe ocr https://example.com/bill.pdf --structured --json

  # Two pages per request, at most four requests in flight
  pdfscribe ocr scan.pdf --batch-size 2 --dispatch-concurrency 4

  # Local Tesseract instead of a vision model
  pdfscribe ocr scan.pdf --backend tesseract --tesseract-lang deu

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  RUST_LOG                Log filter (default: info)
"#;

/// OCR backend for PDF invoices and documents.
#[derive(Parser, Debug)]
#[command(
    name = "pdfscribe",
    version,
    about = "Rasterise PDFs and OCR them in concurrent batches with a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSCRIBE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeArgs),
    /// OCR one PDF (local path or URL) and print the result.
    Ocr(OcrArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "PDFSCRIBE_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PDFSCRIBE_PORT", default_value_t = 8080)]
    port: u16,

    /// Abort a request (and all of its batch calls) after this many seconds.
    #[arg(long, env = "PDFSCRIBE_REQUEST_TIMEOUT", default_value_t = 600)]
    request_timeout: u64,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Also summarise the text into a JSON record.
    #[arg(long)]
    structured: bool,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Owner recorded for usage accounting.
    #[arg(long, default_value = "anonymous")]
    owner: String,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Vision,
    Tesseract,
}

impl From<BackendArg> for Backend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Vision => Backend::Vision,
            BackendArg::Tesseract => Backend::Tesseract,
        }
    }
}

/// Pipeline settings shared by both subcommands.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Extraction backend.
    #[arg(long, env = "PDFSCRIBE_BACKEND", value_enum, default_value = "vision")]
    backend: BackendArg,

    /// Vision model ID.
    #[arg(long, env = "PDFSCRIBE_MODEL", default_value = "gpt-4o")]
    model: String,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDFSCRIBE_PROVIDER")]
    provider: Option<String>,

    /// Model used for structured summaries.
    #[arg(long, env = "PDFSCRIBE_SUMMARY_MODEL", default_value = "gpt-4o-mini")]
    summary_model: String,

    /// Character budget given to the summary prompt.
    #[arg(long, env = "PDFSCRIBE_SUMMARY_CHAR_LIMIT", default_value_t = 500)]
    summary_char_limit: usize,

    /// Page rasterisation scale factor (0.5–8.0).
    #[arg(long, env = "PDFSCRIBE_ZOOM", default_value_t = 2.0)]
    zoom: f32,

    /// Pages rendered in parallel.
    #[arg(long, env = "PDFSCRIBE_RENDER_WORKERS", default_value_t = 4)]
    render_workers: usize,

    /// Pages per extraction request.
    #[arg(long, env = "PDFSCRIBE_BATCH_SIZE", default_value_t = 1)]
    batch_size: usize,

    /// Maximum extraction calls in flight (default: all batches at once).
    #[arg(long, env = "PDFSCRIBE_DISPATCH_CONCURRENCY")]
    dispatch_concurrency: Option<usize>,

    /// Total attempts per batch.
    #[arg(long, env = "PDFSCRIBE_MAX_RETRIES", default_value_t = 10)]
    max_retries: u32,

    /// Backoff base delay in milliseconds.
    #[arg(long, env = "PDFSCRIBE_BASE_DELAY_MS", default_value_t = 1000)]
    base_delay_ms: u64,

    /// Backoff delay cap in milliseconds.
    #[arg(long, env = "PDFSCRIBE_MAX_DELAY_MS", default_value_t = 120_000)]
    max_delay_ms: u64,

    /// Per extraction call timeout in seconds.
    #[arg(long, env = "PDFSCRIBE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFSCRIBE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per request.
    #[arg(long, env = "PDFSCRIBE_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDFSCRIBE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Tesseract language pack.
    #[arg(long, env = "PDFSCRIBE_TESSERACT_LANG", default_value = "eng")]
    tesseract_lang: String,

    /// URL download timeout in seconds.
    #[arg(long, env = "PDFSCRIBE_DOWNLOAD_TIMEOUT", default_value_t = 15)]
    download_timeout: u64,

    /// Largest accepted PDF in MiB.
    #[arg(long, env = "PDFSCRIBE_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Successful extractions allowed per owner (default: unlimited).
    #[arg(long, env = "PDFSCRIBE_MAX_EXTRACTIONS")]
    max_extractions: Option<u64>,

    /// Explicit libpdfium path; otherwise it is located or downloaded.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

impl PipelineArgs {
    fn to_config(&self, pdfium_lib: PathBuf, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
        let mut builder = OcrConfig::builder()
            .backend(self.backend.into())
            .model(&self.model)
            .summary_model(&self.summary_model)
            .summary_char_limit(self.summary_char_limit)
            .zoom(self.zoom)
            .render_workers(self.render_workers)
            .batch_size(self.batch_size)
            .max_retries(self.max_retries)
            .base_delay_ms(self.base_delay_ms)
            .max_delay_ms(self.max_delay_ms)
            .api_timeout_secs(self.api_timeout)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .tesseract_lang(&self.tesseract_lang)
            .download_timeout_secs(self.download_timeout)
            .max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024))
            .pdfium_library(pdfium_lib);

        if let Some(ref provider) = self.provider {
            builder = builder.provider_name(provider);
        }
        if let Some(n) = self.dispatch_concurrency {
            builder = builder.dispatch_concurrency(n);
        }
        if let Some(n) = self.max_extractions {
            builder = builder.max_extractions_per_owner(n);
        }
        if let Some(ref path) = self.system_prompt {
            let prompt = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
            builder = builder.system_prompt(prompt);
        }
        if let Some(cb) = progress {
            builder = builder.progress_callback(cb);
        }

        builder.build().context("Invalid configuration")
    }
}

/// Locate libpdfium, downloading it on first use, and check that it binds.
fn ensure_pdfium(explicit: Option<&Path>, show_progress: bool) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None if show_progress && !pdfium_auto::is_pdfium_cached() => {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.set_message("Connecting…");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            let path = tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;
            dl_bar.finish_with_message("ready ✓");
            path
        }
        None => tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to locate PDFium engine")?,
    };

    PdfiumPageSource::new(Some(path.clone()), 100)
        .ensure_available()
        .context("PDFium engine is not usable")?;
    Ok(path)
}

async fn run_serve(args: ServeArgs, quiet: bool) -> Result<()> {
    let pdfium = ensure_pdfium(args.pipeline.pdfium_lib.as_deref(), !quiet)?;
    let config = args.pipeline.to_config(pdfium, None)?;
    let service = Arc::new(OcrService::from_config(config).context("Failed to start OCR service")?);

    let addr = SocketAddr::new(args.host, args.port);
    pdfscribe::server::serve(service, addr, Duration::from_secs(args.request_timeout))
        .await
        .with_context(|| format!("Server on {addr} failed"))
}

async fn run_ocr(args: OcrArgs, quiet: bool) -> Result<()> {
    let show_progress = !quiet && !args.no_progress && !args.json;
    let pdfium = ensure_pdfium(args.pipeline.pdfium_lib.as_deref(), show_progress)?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = args.pipeline.to_config(pdfium, progress)?;
    let service = OcrService::from_config(config).context("Failed to start OCR service")?;

    let input = if is_url(&args.input) {
        UploadInput::Url(args.input.clone())
    } else {
        let file = UploadedFile::from_path(Path::new(&args.input))
            .await
            .with_context(|| format!("Failed to read {}", args.input))?;
        UploadInput::File(file)
    };

    if args.structured {
        let output = service
            .extract_structured(input, &args.owner)
            .await
            .context("Extraction failed")?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("Failed to serialize output")?
            );
        } else {
            println!("{}", output.text);
            println!("\n---\n");
            match (&output.data, &output.message) {
                (Some(data), _) => println!(
                    "{}",
                    serde_json::to_string_pretty(data).context("Failed to serialize record")?
                ),
                (None, Some(message)) => eprintln!("{}", message),
                (None, None) => {}
            }
        }
    } else {
        let document = service
            .ocr(input, &args.owner)
            .await
            .context("OCR failed")?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&document).context("Failed to serialize output")?
            );
        } else {
            println!("{}", document.text);
        }
        if !quiet {
            eprintln!(
                "{} {} pages, {} batches from {}",
                dim("·"),
                document.page_count,
                document.batch_count,
                document.filename
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs for interactive `ocr` runs.
    let interactive_ocr = matches!(&cli.command, Command::Ocr(a) if !a.no_progress && !a.json);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || interactive_ocr {
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

    match cli.command {
        Command::Serve(args) => run_serve(args, cli.quiet).await,
        Command::Ocr(args) => run_ocr(args, cli.quiet).await,
    }
}
