//! CLI binary for clinicscan.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints the resulting table.

use anyhow::{Context, Result};
use clap::Parser;
use clinicscan::{
    extract, CorrectionPass, ExtractionConfig, ExtractionProgressCallback, ProgressCallback,
    RecordTable,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
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

/// Terminal progress: one bar over all units plus a log line per unit.
/// Units may finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    passes: Mutex<HashMap<usize, usize>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us how many units there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            passes: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, position: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&position))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_units: usize) {
        self.activate_bar(total_units);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting records from {total_units} unit(s)…"))
        ));
    }

    fn on_unit_start(&self, position: usize, _total: usize, label: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(position, Instant::now());
        }
        self.bar.set_message(format!("{label} (extracting)"));
    }

    fn on_pass_complete(&self, position: usize, pass: CorrectionPass) {
        let done = self
            .passes
            .lock()
            .map(|mut m| {
                let n = m.entry(position).or_insert(0);
                *n += 1;
                *n
            })
            .unwrap_or(0);
        self.bar
            .set_message(format!("unit {position}: {pass} ({done}/{})", CorrectionPass::ORDER.len()));
    }

    fn on_unit_complete(&self, position: usize, total: usize, records: usize) {
        let secs = self.elapsed_secs(position);
        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            position,
            total,
            dim(&format!("{records:>3} records")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, position: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(position);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Unit {:>3}/{:<3}  {}  {}",
            red("✗"),
            position,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_units: usize, succeeded: usize) {
        let failed = total_units.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} units extracted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} units extracted  ({} failed or skipped)",
                if failed == total_units {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_units,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Photographed register pages, table to stdout as CSV
  clinicscan IMG_0041.jpg IMG_0042.jpg

  # Scanned PDF to an Excel workbook (sheet DataPasien)
  clinicscan register.pdf -o pasien.xlsx

  # ... or to a CSV file
  clinicscan register.pdf -o pasien.csv

  # Custom address reference and default year
  clinicscan --reference data/alamat.json --default-year 2024 register.pdf

  # Another provider/model
  clinicscan --provider openai --model gpt-4.1 register.pdf

  # Full run report as JSON (records, per-unit errors, token usage)
  clinicscan --json register.pdf > run.json

PIPELINE (per image or PDF page):
  1. extraction   prompt + alamat.json + image
  2. corrections  address → name/visit date → birth date/age → diagnosis
  3. merge        corrections applied as patches keyed on "No"
  Records from all units are concatenated and renumbered 1..N.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium (PDF inputs only)
"#;

/// Extract patient records from clinic register photos and scans.
#[derive(Parser, Debug)]
#[command(
    name = "clinicscan",
    version,
    about = "Extract patient records from clinic register photos and scans",
    long_about = "Extract patient records from photographed or scanned clinic registers \
(PDF, PNG, JPEG) with a multimodal LLM. Each page is extracted once and refined by four \
correction passes before the records are aggregated into one table.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local files or HTTP/HTTPS URLs (PDF, PNG, JPEG).
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write the table to this file instead of stdout (.xlsx or CSV).
    #[arg(short, long, env = "CLINICSCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// Address reference dataset (JSON).
    #[arg(long, env = "CLINICSCAN_REFERENCE", default_value = "alamat.json")]
    reference: PathBuf,

    /// LLM model ID. Default: gemini-2.5-flash.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "CLINICSCAN_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of units processed concurrently.
    #[arg(short, long, env = "CLINICSCAN_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "CLINICSCAN_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "CLINICSCAN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per call on LLM failure (capped at 10).
    #[arg(long, env = "CLINICSCAN_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds (no timeout when unset).
    #[arg(long, env = "CLINICSCAN_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Year assumed for dates written without one.
    #[arg(long, env = "CLINICSCAN_DEFAULT_YEAR", default_value_t = 2025)]
    default_year: i32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "CLINICSCAN_PASSWORD")]
    password: Option<String>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "CLINICSCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output the full run report (ExtractionOutput) as JSON instead of CSV.
    #[arg(long, env = "CLINICSCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CLINICSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CLINICSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CLINICSCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "CLINICSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.inputs, &config)
        .await
        .context("Extraction failed")?;
    let stats = output.stats.clone();

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let table = RecordTable::from_records(output.records);
        match cli.output {
            Some(ref path) => table.export(path).context("Export failed")?,
            None => table
                .write_csv(io::stdout().lock())
                .context("Failed to write to stdout")?,
        }
    }

    if !cli.quiet {
        let destination = cli
            .output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{}  {} records from {}/{} units  {}ms{}",
            if stats.failed_units + stats.skipped_units == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.total_records,
            stats.succeeded_units,
            stats.total_units,
            stats.total_duration_ms,
            destination,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .default_year(cli.default_year)
        .reference_path(&cli.reference)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(dir);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
