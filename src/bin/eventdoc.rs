//! CLI binary for eventdoc-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives one request and prints the result.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use eventdoc_extract::pipeline::input;
use eventdoc_extract::{
    extract_stream, ConnectionRegistry, ExtractionConfig, ExtractionRequest, ExtractionResult, Extractor,
    GenerationRequest, ProgressEvent, ProgressSink, ProgressStatus, RunMode, RunOutcome, TemplateProfile,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, IsTerminal};
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
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── Progress sink using indicatif ────────────────────────────────────────────

/// Renders progress events on a spinner; warnings are printed above it.
struct SpinnerSink {
    bar: Option<ProgressBar>,
}

impl SpinnerSink {
    fn new(enabled: bool) -> Self {
        if !enabled {
            return Self { bar: None };
        }
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Working");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar: Some(bar) }
    }
}

impl ProgressSink for SpinnerSink {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        let Some(ref bar) = self.bar else {
            return true;
        };
        match event.status {
            ProgressStatus::Processing => bar.set_message(event.message),
            ProgressStatus::Warning => bar.println(format!("  {} {}", yellow("⚠"), event.message)),
            ProgressStatus::Complete => bar.finish_and_clear(),
            ProgressStatus::Error => {
                bar.finish_and_clear();
            }
            ProgressStatus::Pong => {}
        }
        true
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract fields from a poster (needs the `tesseract` feature)
  eventdoc poster poster.jpg

  # Extract fields from a PDF or text export
  eventdoc text event.pdf --json

  # Generate a report
  eventdoc generate --type GuestLecture \
      --field "Guest Name=Dr. A. Kumar" --field "Topic=Robotics" ...

  # Same, fields from a JSON object, streaming progress as JSON lines
  eventdoc generate --fields-json fields.json --stream

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter
"#;

/// Extract event fields from posters and documents, and generate reports.
#[derive(Parser, Debug)]
#[command(
    name = "eventdoc",
    version,
    about = "Extract event fields from posters and documents, and generate reports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract fields from a poster image (path or URL).
    Poster { input: String },
    /// Extract fields from a PDF or UTF-8 text document (path or URL).
    Text { input: String },
    /// Generate a report from field values.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Document type, as named in the template profile.
    #[arg(long = "type", default_value = "GuestLecture")]
    document_type: String,

    /// A field value, `Key=Value`. Repeatable.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,

    /// JSON object of field values; `--field` entries override it.
    #[arg(long, value_name = "FILE")]
    fields_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Print the result as JSON.
    #[arg(long, global = true, env = "EVENTDOC_JSON")]
    json: bool,

    /// Print every progress event as a JSON line.
    #[arg(long, global = true)]
    stream: bool,

    /// Template profile JSON overriding the built-in one.
    #[arg(long, global = true, env = "EVENTDOC_PROFILE")]
    profile: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Generation timeout in seconds (both modes).
    #[arg(long, global = true, env = "EVENTDOC_TIMEOUT")]
    timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "EVENTDOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// OCR language tag.
    #[arg(long, global = true, env = "EVENTDOC_LANGUAGE", default_value = "eng")]
    language: String,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EVENTDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, global = true, env = "EVENTDOC_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "EVENTDOC_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !opts.quiet && !opts.no_progress && !opts.stream && io::stderr().is_terminal();
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Build request ────────────────────────────────────────────────────
    let config = build_config(opts)?;
    let extractor = build_extractor(config);
    let request = build_request(&cli.command, opts).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = if opts.stream {
        run_streaming(&extractor, request).await?
    } else {
        let mut sink = SpinnerSink::new(show_progress);
        match extractor.run(request, &mut sink, RunMode::OneShot).await {
            Ok(RunOutcome::Finished(result)) => result,
            Ok(RunOutcome::Abandoned) => bail!("request abandoned"),
            Err(e) => {
                eprintln!("{} {}", red("✘"), e);
                std::process::exit(1);
            }
        }
    };

    // ── Print ────────────────────────────────────────────────────────────
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else if !opts.stream {
        print_result(&result, opts.quiet);
    }
    Ok(())
}

fn build_config(opts: &GlobalOpts) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .language(opts.language.clone())
        .download_timeout_secs(opts.download_timeout);
    if let Some(secs) = opts.timeout {
        builder = builder
            .generation_timeout_secs(secs)
            .stream_generation_timeout_secs(secs);
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = opts.profile {
        let profile = TemplateProfile::from_path(path)
            .with_context(|| format!("Failed to load profile from {:?}", path))?;
        builder = builder.profile(profile);
    }
    builder.build().context("Invalid configuration")
}

#[cfg(feature = "tesseract")]
fn build_extractor(config: ExtractionConfig) -> Extractor {
    use eventdoc_extract::pipeline::tesseract::TesseractRecognizer;
    let recognizer = TesseractRecognizer::new();
    if let Err(e) = recognizer.probe(&config.language) {
        tracing::warn!("tesseract unavailable: {}", e);
        return Extractor::new(config);
    }
    Extractor::new(config).with_recognizer(Arc::new(recognizer))
}

#[cfg(not(feature = "tesseract"))]
fn build_extractor(config: ExtractionConfig) -> Extractor {
    Extractor::new(config)
}

async fn build_request(command: &Command, opts: &GlobalOpts) -> Result<ExtractionRequest> {
    Ok(match command {
        Command::Poster { input } => ExtractionRequest::Poster(
            input::resolve_input(input, opts.download_timeout)
                .await
                .with_context(|| format!("Failed to read {input}"))?,
        ),
        Command::Text { input } => ExtractionRequest::Document(
            input::resolve_input(input, opts.download_timeout)
                .await
                .with_context(|| format!("Failed to read {input}"))?,
        ),
        Command::Generate(args) => ExtractionRequest::Generate(generation_request(args).await?),
    })
}

async fn generation_request(args: &GenerateArgs) -> Result<GenerationRequest> {
    let mut fields: BTreeMap<String, String> = match args.fields_json {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read fields from {:?}", path))?;
            serde_json::from_str(&json).with_context(|| format!("{:?} is not a JSON object of strings", path))?
        }
        None => BTreeMap::new(),
    };
    for pair in &args.fields {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--field expects KEY=VALUE, got {pair:?}");
        };
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(GenerationRequest {
        document_type: args.document_type.clone(),
        fields,
    })
}

/// Print events as JSON lines; return the payload of the `complete` event.
async fn run_streaming(extractor: &Extractor, request: ExtractionRequest) -> Result<ExtractionResult> {
    let registry = Arc::new(ConnectionRegistry::new());
    let mut stream = extract_stream(extractor, request, &registry);
    let mut last = None;
    while let Some(event) = stream.events.next().await {
        println!("{}", serde_json::to_string(&event).context("Failed to serialise event")?);
        last = Some(event);
    }
    stream.task.await.context("extraction task failed")?;

    match last {
        Some(event) if event.status == ProgressStatus::Complete => {
            let data = event.data.context("complete event carried no result")?;
            result_from_json(data)
        }
        Some(event) => {
            eprintln!("{} {}", red("✘"), event.message);
            std::process::exit(1);
        }
        None => bail!("stream ended without a terminal event"),
    }
}

fn result_from_json(data: serde_json::Value) -> Result<ExtractionResult> {
    serde_json::from_value(data).context("malformed result payload")
}

fn print_result(result: &ExtractionResult, quiet: bool) {
    match result {
        ExtractionResult::Fields(record) => {
            for (key, value) in record.entries() {
                let shown = if value.is_empty() { dim("-") } else { value.to_string() };
                println!("{:<24} {}", bold(&format!("{key}:")), shown);
            }
            if !quiet {
                eprintln!("{} {}/8 fields extracted", green("✔"), record.filled());
            }
        }
        ExtractionResult::Document(doc) => {
            for (title, body) in doc.sections.iter() {
                println!("{}\n{}\n", bold(title), body);
            }
            if !quiet {
                let stage = doc.metadata.get("repair_stage").map(String::as_str).unwrap_or("?");
                eprintln!(
                    "{} {} sections, {} words  {}",
                    green("✔"),
                    doc.sections.len(),
                    doc.word_count,
                    dim(&format!("(parsed: {stage})"))
                );
            }
        }
    }
}
