//! CLI binary for paperpress.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, runs one generation and writes the artifact.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paperpress::{
    load_document, validate, Document, GenerationMode, GenerationObserver, GenerationPipeline,
    ObserverHandle, OutputFormat, Outline, PipelineConfig, Session, Stage,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI stage observer using indicatif ───────────────────────────────────────

/// Spinner that follows the pipeline stages and logs retries above itself.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl GenerationObserver for CliObserver {
    fn on_stage(&self, document_id: &str, stage: Stage) {
        self.bar.set_prefix(match stage {
            Stage::Validating => "Validating",
            Stage::Generating => "Generating",
            Stage::ConvertingFormat => "Converting",
            Stage::Recording => "Recording",
            Stage::Emailing => "Emailing",
            Stage::Fetching => "Downloading",
            Stage::Done => "Done",
        });
        self.bar.set_message(document_id.to_string());
    }

    fn on_retry(&self, url: &str, retry: u32, delay_ms: u64) {
        self.bar.println(format!(
            "  {} retry {} for {} in {}",
            yellow("↻"),
            retry,
            dim(url),
            dim(&format!("{:.1}s", delay_ms as f64 / 1000.0)),
        ));
    }

    fn on_complete(&self, _document_id: &str, _file_size: u64) {
        self.bar.finish_and_clear();
    }

    fn on_failed(&self, _document_id: &str, _stage: Stage, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a Word document next to the input
  paperpress paper.json --endpoint https://backend.example.com/api/document-generator

  # PDF with a fallback backend, written to a chosen path
  paperpress paper.json --format pdf -o out/paper.pdf \
      --endpoint https://primary.example.com/api/generate \
      --endpoint https://backup.example.com/api/generate

  # Check the document without contacting the backend
  paperpress paper.json --validate-only
  paperpress paper.json --outline

  # Probe backend health
  paperpress --health --health-endpoint https://backend.example.com/api/health

  # Email the PDF instead of saving it
  paperpress paper.json --format pdf --email ada@example.org \
      --email-endpoint https://backend.example.com/api/email

ENVIRONMENT VARIABLES:
  PAPERPRESS_ENDPOINTS          Comma-separated generator endpoints
  PAPERPRESS_CONVERT_ENDPOINTS  Comma-separated docx-to-pdf endpoints
  PAPERPRESS_EMAIL_ENDPOINTS    Comma-separated email endpoints
  PAPERPRESS_HEALTH_ENDPOINTS   Comma-separated health URLs
  PAPERPRESS_RECORD_ENDPOINT    Download history endpoint
  PAPERPRESS_TOKEN              Bearer token for authenticated calls
  RUST_LOG                      Override log filtering
"#;

/// Generate research-paper documents (DOCX/PDF) through a remote backend.
#[derive(Parser, Debug)]
#[command(
    name = "paperpress",
    version,
    about = "Generate DOCX/PDF research papers through a remote generation backend",
    long_about = "Validate, repair and submit a research-paper document (JSON) to a \
document-generation backend, with retry, endpoint fail-over and DOCX-to-PDF conversion.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document JSON file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "health")]
    input: Option<String>,

    /// Write the artifact to this file (default: derived from the title).
    #[arg(short, long, env = "PAPERPRESS_OUTPUT")]
    output: Option<PathBuf>,

    /// Artifact format.
    #[arg(long, env = "PAPERPRESS_FORMAT", value_enum, default_value = "docx")]
    format: FormatArg,

    /// Request a preview (not recorded as a download).
    #[arg(long)]
    preview: bool,

    /// Validate (and show sanitize repairs) without contacting the backend.
    #[arg(long)]
    validate_only: bool,

    /// Print the numbered subsection outline and exit.
    #[arg(long)]
    outline: bool,

    /// Probe the health endpoints and exit.
    #[arg(long)]
    health: bool,

    /// Email the artifact to this address instead of saving it.
    #[arg(long, value_name = "ADDR")]
    email: Option<String>,

    /// Output machine-readable JSON.
    #[arg(long, env = "PAPERPRESS_JSON")]
    json: bool,

    /// Generator endpoint; repeat for fallbacks (first is primary).
    #[arg(long = "endpoint", env = "PAPERPRESS_ENDPOINTS", value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Conversion endpoint; defaults to the generator endpoints.
    #[arg(long = "convert-endpoint", env = "PAPERPRESS_CONVERT_ENDPOINTS", value_delimiter = ',')]
    convert_endpoints: Vec<String>,

    /// Email endpoint; repeat for fallbacks.
    #[arg(long = "email-endpoint", env = "PAPERPRESS_EMAIL_ENDPOINTS", value_delimiter = ',')]
    email_endpoints: Vec<String>,

    /// Health URL; repeat to probe several.
    #[arg(long = "health-endpoint", env = "PAPERPRESS_HEALTH_ENDPOINTS", value_delimiter = ',')]
    health_endpoints: Vec<String>,

    /// Download history endpoint.
    #[arg(long, env = "PAPERPRESS_RECORD_ENDPOINT")]
    record_endpoint: Option<String>,

    /// Bearer token for authenticated calls.
    #[arg(long, env = "PAPERPRESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Retries per request on transient failure (0-10).
    #[arg(long, env = "PAPERPRESS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-attempt timeout in milliseconds.
    #[arg(long, env = "PAPERPRESS_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,

    /// Timeout for downloading the input document, in seconds.
    #[arg(long, env = "PAPERPRESS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the spinner.
    #[arg(long, env = "PAPERPRESS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPERPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPERPRESS_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Docx,
    Pdf,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Docx => OutputFormat::Docx,
            FormatArg::Pdf => OutputFormat::Pdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs out
    // of its way unless verbose.
    let offline = cli.validate_only || cli.outline;
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !offline && !cli.health;
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

    // ── Health mode ──────────────────────────────────────────────────────
    if cli.health {
        return run_health(&cli).await;
    }

    let input = cli.input.as_deref().context("An input document is required")?;
    let document = load_document(input, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to load document from {input}"))?;

    // ── Offline modes ────────────────────────────────────────────────────
    if cli.validate_only {
        return run_validate(&cli, &document);
    }
    if cli.outline {
        return run_outline(&cli, &document);
    }

    // ── Build pipeline ───────────────────────────────────────────────────
    let observer: Option<ObserverHandle> = if show_progress {
        Some(CliObserver::new() as ObserverHandle)
    } else {
        None
    };
    let pipeline = build_pipeline(&cli, observer)?;
    let format: OutputFormat = cli.format.into();

    // ── Email delivery ───────────────────────────────────────────────────
    if let Some(ref recipient) = cli.email {
        let message = pipeline
            .send_email(&document, recipient, format)
            .await
            .context("Email delivery failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::json!({ "email": recipient, "format": format, "message": message })
            );
        } else if !cli.quiet {
            eprintln!("{} {}", green("✔"), message);
        }
        return Ok(());
    }

    // ── Generate ─────────────────────────────────────────────────────────
    let mode = if cli.preview {
        GenerationMode::Preview
    } else {
        GenerationMode::Download
    };
    let mut output = pipeline
        .generate(&document, format, mode)
        .await
        .context("Generation failed")?;

    let path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(output.artifact.suggested_file_name(&document.title)));
    let written = pipeline
        .save_artifact(&output.artifact, &path)
        .await
        .context("Failed to save artifact")?;

    // The runtime ends with main; let the history call finish first.
    let recorded = match output.recording.take() {
        Some(handle) => Some(handle.wait().await),
        None => None,
    };

    if cli.json {
        let summary = serde_json::json!({
            "path": path,
            "format": output.artifact.format,
            "mime_type": output.artifact.mime_type,
            "bytes": written,
            "recorded": recorded,
            "stats": output.stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {} bytes  {}ms  →  {}",
            green("✔"),
            output.artifact.format,
            written,
            output.stats.duration_ms,
            bold(&path.display().to_string()),
        );
        if output.stats.sanitized {
            eprintln!("   {}", dim("document was repaired before sending"));
        }
        for w in &output.stats.warnings {
            eprintln!("   {} {}", yellow("⚠"), w);
        }
        if recorded == Some(false) {
            eprintln!("   {}", dim("download not recorded"));
        }
    }

    Ok(())
}

/// Map CLI args to a `GenerationPipeline`.
fn build_pipeline(cli: &Cli, observer: Option<ObserverHandle>) -> Result<GenerationPipeline> {
    let mut builder = PipelineConfig::builder()
        .generator_endpoints(cli.endpoints.iter().cloned())
        .max_retries(cli.max_retries)
        .timeout_ms(cli.timeout_ms);
    for url in &cli.convert_endpoints {
        builder = builder.conversion_endpoint(url.clone());
    }
    for url in &cli.email_endpoints {
        builder = builder.email_endpoint(url.clone());
    }
    for url in &cli.health_endpoints {
        builder = builder.health_endpoint(url.clone());
    }
    if let Some(ref url) = cli.record_endpoint {
        builder = builder.record_endpoint(url.clone());
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }
    let config = builder.build().context("Invalid configuration")?;

    let session = match cli.token.as_deref() {
        Some(token) => Session::with_token(token),
        None => Session::anonymous(),
    };
    GenerationPipeline::from_config(config, Arc::new(session)).context("Failed to build pipeline")
}

async fn run_health(cli: &Cli) -> Result<()> {
    if cli.health_endpoints.is_empty() {
        anyhow::bail!("--health needs at least one --health-endpoint");
    }
    // Health probing has no generator; use the first health URL as a stand-in.
    let mut builder = PipelineConfig::builder()
        .generator_endpoint(cli.health_endpoints[0].clone())
        .timeout_ms(cli.timeout_ms);
    for url in &cli.health_endpoints {
        builder = builder.health_endpoint(url.clone());
    }
    let config = builder.build().context("Invalid configuration")?;
    let pipeline = GenerationPipeline::from_config(config, Arc::new(Session::anonymous()))?;

    let reports = pipeline.check_health().await;
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise output")?
        );
    } else {
        for r in &reports {
            let mark = if r.healthy { green("✔") } else { red("✘") };
            let status = r.status.map(|s| s.to_string()).unwrap_or_else(|| "---".into());
            println!(
                "{} {:<4} {:>6}  {}  {}",
                mark,
                status,
                format!("{}ms", r.latency_ms),
                r.url,
                dim(r.error.as_deref().unwrap_or("")),
            );
        }
    }
    if reports.iter().any(|r| !r.healthy) {
        anyhow::bail!("one or more endpoints are unhealthy");
    }
    Ok(())
}

fn run_validate(cli: &Cli, document: &Document) -> Result<()> {
    let report = validate(document);
    let repaired = (!report.is_valid).then(|| validate(&paperpress::sanitize(document)));

    if cli.json {
        let summary = serde_json::json!({
            "report": report,
            "after_sanitize": repaired,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise output")?
        );
    } else {
        for e in &report.errors {
            println!("{} {}", red("✘"), e);
        }
        for w in &report.warnings {
            println!("{} {}", yellow("⚠"), w);
        }
        match &repaired {
            None => println!("{} document is valid", green("✔")),
            Some(r) if r.is_valid => println!(
                "{} sanitize repairs all {} error(s)",
                yellow("◆"),
                report.errors.len()
            ),
            Some(r) => println!(
                "{} {} error(s) remain after sanitize",
                red("✘"),
                r.errors.len()
            ),
        }
    }

    match repaired {
        Some(r) if !r.is_valid => anyhow::bail!("document is invalid"),
        _ => Ok(()),
    }
}

fn run_outline(cli: &Cli, document: &Document) -> Result<()> {
    let mut rows = Vec::new();
    for (si, section) in document.sections.iter().enumerate() {
        let outline = Outline::build(section)
            .with_context(|| format!("Section '{}' has an invalid outline", section.title))?;
        rows.push((format!("{}", si + 1), section.title.clone()));
        for (id, number) in outline.numbering(si) {
            let title = outline.get(&id).map(|s| s.title.clone()).unwrap_or_default();
            rows.push((number, title));
        }
    }

    if cli.json {
        let json: Vec<_> = rows
            .iter()
            .map(|(n, t)| serde_json::json!({ "number": n, "title": t }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else {
        for (number, title) in rows {
            let depth = number.matches('.').count();
            println!("{}{} {}", "  ".repeat(depth), bold(&number), title);
        }
    }
    Ok(())
}
