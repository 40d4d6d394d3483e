//! Redact CLI - replace Python function bodies with generated explanations

// Global invariants enforced:
// - stdout carries only transformed source or listings; diagnostics go to stderr
// - A file is written only after its transformation succeeded
// - Files that cannot be read or parsed are reported and left untouched

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use redact_core::config::{self, RedactConfig, ResolvedConfig};
use redact_core::report::{self, FunctionEntry};
use redact_core::{
    Cancellation, ExtractScope, FunctionRecord, OpenAiService, Pipeline, PipelineObserver,
    RequestOutcome, RunSummary,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "redact")]
#[command(about = "Replace Python function bodies with generated natural-language explanations")]
#[command(version = env!("REDACT_VERSION"))]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a Python file or every Python file under a directory
    Run(RunArgs),
    /// List extracted functions without contacting the generation service
    Functions {
        /// Path to a Python file or directory
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Only list module-scope definitions
        #[arg(long)]
        top_level_only: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to a Python file or directory
    path: PathBuf,

    /// Write the result of a single-file input here instead of stdout
    #[arg(long, conflicts_with_all = ["out_dir", "in_place"])]
    output: Option<PathBuf>,

    /// Write results under this directory, mirroring input paths
    #[arg(long, conflicts_with = "in_place")]
    out_dir: Option<PathBuf>,

    /// Overwrite input files
    #[arg(long)]
    in_place: bool,

    /// Model identifier (overrides config file)
    #[arg(long)]
    model: Option<String>,

    /// Chat-completions endpoint (overrides config file)
    #[arg(long)]
    endpoint: Option<String>,

    /// Retries after the first failed attempt (overrides config file)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Delay between attempts in seconds (overrides config file)
    #[arg(long)]
    delay_seconds: Option<f64>,

    /// Upper bound on generated output length (overrides config file)
    #[arg(long)]
    max_output_length: Option<u32>,

    /// Concurrent requests (overrides config file)
    #[arg(long)]
    jobs: Option<usize>,

    /// Stop requesting after this many seconds; remaining bodies stay unchanged
    #[arg(long)]
    deadline_seconds: Option<f64>,

    /// Only explain module-scope definitions
    #[arg(long)]
    top_level_only: bool,

    /// Path to config file (default: auto-discover)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print a run summary to stderr
    #[arg(long)]
    summary: Option<OutputFormat>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running anything
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet, cli.log_json);

    match cli.command {
        Commands::Run(args) => {
            let show_progress = !args.no_progress && !cli.quiet;
            run(args, show_progress)
        }
        Commands::Functions {
            path,
            format,
            top_level_only,
            config: config_path,
        } => {
            let project_root = std::env::current_dir()?;
            let resolved = config::load_and_resolve(&project_root, config_path.as_deref())
                .context("failed to load configuration")?;
            let scope = if top_level_only {
                ExtractScope::TopLevel
            } else {
                resolved.scope
            };
            let entries: Vec<FunctionEntry> =
                redact_core::list_functions(&path, Some(&resolved), scope)?;
            match format {
                OutputFormat::Text => print!("{}", report::render_functions_text(&entries)),
                OutputFormat::Json => println!("{}", report::render_functions_json(&entries)),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                match config::load_and_resolve(&project_root, path.as_deref()) {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                        Ok(ExitCode::SUCCESS)
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        Ok(ExitCode::FAILURE)
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

/// Install the stderr subscriber; `RUST_LOG` wins over the verbosity flags
fn init_tracing(verbose: u8, quiet: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: RunArgs, show_progress: bool) -> anyhow::Result<ExitCode> {
    if !args.path.exists() {
        anyhow::bail!("Path does not exist: {}", args.path.display());
    }
    let single_file = args.path.is_file();
    if !single_file && args.out_dir.is_none() && !args.in_place {
        anyhow::bail!("directory input needs --out-dir or --in-place");
    }
    if !single_file && args.output.is_some() {
        anyhow::bail!("--output only applies to a single input file");
    }

    let project_root = std::env::current_dir()?;
    let (mut raw_config, config_path) =
        config::load_config(&project_root, args.config.as_deref())
            .context("failed to load configuration")?;
    apply_overrides(&mut raw_config, &args);
    let mut resolved = raw_config.resolve().context("invalid configuration")?;
    resolved.config_path = config_path;

    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let api_key = std::env::var(&resolved.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty());
    if api_key.is_none() {
        warn!(
            variable = %resolved.api_key_env,
            "API key not set, requests are sent without authorization"
        );
    }

    let service = OpenAiService::new(resolved.endpoint.clone(), api_key, resolved.request_timeout)
        .context("failed to create HTTP client")?;
    let cancellation = match resolved.deadline {
        Some(deadline) => Cancellation::with_deadline(Instant::now() + deadline),
        None => Cancellation::new(),
    };
    let pipeline = Pipeline::new(&service)
        .with_settings(resolved.settings.clone())
        .with_scope(resolved.scope)
        .with_jobs(resolved.jobs)
        .with_cancellation(cancellation);

    // An explicitly named file is processed even when filters would skip it
    let (files, root) = if single_file {
        let root = args.path.parent().map(Path::to_path_buf).unwrap_or_default();
        (vec![args.path.clone()], root)
    } else {
        let files = redact_core::input_files(&args.path, Some(&resolved))?;
        (files, args.path.clone())
    };
    if files.is_empty() {
        warn!(path = %args.path.display(), "no Python files found");
    }
    info!(files = files.len(), model = %resolved.settings.model, "starting run");

    let progress = ProgressObserver::new(show_progress);
    let mut summary = RunSummary::new();

    for file in &files {
        let file_name = display_path(file, &root, single_file, &args.path);
        let source = match redact_core::read_source(file) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file_name, error = %format!("{:#}", e), "skipping file");
                summary.add_skipped(&file_name, format!("{:#}", e));
                continue;
            }
        };

        match pipeline.run_observed(&source, &progress) {
            Ok(transformation) => {
                let destination = destination(&args, file, &root)?;
                progress.suspend(|| {
                    write_output(
                        destination.as_deref(),
                        args.in_place,
                        &source,
                        &transformation.output,
                    )
                })?;
                summary.add_file(&file_name, &transformation);
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "skipping file");
                summary.add_skipped(&file_name, e.to_string());
            }
        }
    }
    progress.finish();

    let skipped = summary.totals().skipped_files;
    if skipped > 0 {
        warn!(skipped_files = skipped, "some files could not be read or parsed");
    }

    match args.summary {
        Some(OutputFormat::Text) => eprint!("{}", report::render_text(&summary)),
        Some(OutputFormat::Json) => eprintln!("{}", report::render_json(&summary)),
        None => {}
    }

    if (single_file && skipped > 0) || summary.all_files_failed() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Fold CLI flags into the loaded config so they are validated together
fn apply_overrides(config: &mut RedactConfig, args: &RunArgs) {
    if let Some(ref model) = args.model {
        config.model = Some(model.clone());
    }
    if let Some(ref endpoint) = args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = Some(max_retries);
    }
    if let Some(delay) = args.delay_seconds {
        config.delay_seconds = Some(delay);
    }
    if let Some(max_output_length) = args.max_output_length {
        config.max_output_length = Some(max_output_length);
    }
    if let Some(jobs) = args.jobs {
        config.jobs = Some(jobs);
    }
    if let Some(deadline) = args.deadline_seconds {
        config.deadline_seconds = Some(deadline);
    }
    if args.top_level_only {
        config.top_level_only = Some(true);
    }
}

/// Where a transformed file goes; `None` means stdout
fn destination(args: &RunArgs, file: &Path, root: &Path) -> anyhow::Result<Option<PathBuf>> {
    if args.in_place {
        return Ok(Some(file.to_path_buf()));
    }
    if let Some(ref output) = args.output {
        return Ok(Some(output.clone()));
    }
    if let Some(ref out_dir) = args.out_dir {
        let relative = file
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", file.display(), root.display()))?;
        return Ok(Some(out_dir.join(relative)));
    }
    Ok(None)
}

fn write_output(
    destination: Option<&Path>,
    in_place: bool,
    source: &str,
    output: &str,
) -> anyhow::Result<()> {
    let Some(path) = destination else {
        print!("{}", output);
        return Ok(());
    };

    // Nothing was explained; leave the file's mtime alone
    if in_place && output == source {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, output).with_context(|| format!("failed to write {}", path.display()))
}

fn display_path(file: &Path, root: &Path, single_file: bool, input: &Path) -> String {
    if single_file {
        return input.display().to_string();
    }
    file.strip_prefix(root)
        .unwrap_or(file)
        .display()
        .to_string()
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Generation:");
    println!("  model: {}", resolved.settings.model);
    println!("  endpoint: {}", resolved.endpoint);
    println!("  api_key_env: {}", resolved.api_key_env);
    println!(
        "  max_output_length: {}",
        resolved.settings.generation.max_output_length
    );
    println!(
        "  request_timeout_seconds: {}",
        resolved.request_timeout.as_secs()
    );
    println!();
    println!("Retry:");
    println!("  max_retries: {}", resolved.settings.retry.max_retries);
    println!(
        "  delay_seconds: {}",
        resolved.settings.retry.delay.as_secs_f64()
    );
    println!(
        "  deadline_seconds: {}",
        resolved
            .deadline
            .map(|d| d.as_secs_f64().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!();
    println!("Run:");
    println!("  jobs: {}", resolved.jobs);
    println!(
        "  scope: {}",
        match resolved.scope {
            ExtractScope::AllDefinitions => "all definitions",
            ExtractScope::TopLevel => "top-level only",
        }
    );
    println!(
        "  include: {}",
        if resolved.include.is_some() {
            "custom patterns"
        } else {
            "all Python files"
        }
    );
    println!("  exclude: active");
}

/// Progress bar advanced once per finished function
struct ProgressObserver {
    bar: Option<ProgressBar>,
}

impl ProgressObserver {
    fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        ProgressObserver { bar }
    }

    /// Run `f` with the bar hidden so stdout writes stay clean
    fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl PipelineObserver for ProgressObserver {
    fn extracted(&self, records: &[FunctionRecord]) {
        if let Some(bar) = &self.bar {
            bar.inc_length(records.len() as u64);
        }
    }

    fn explained(&self, record: &FunctionRecord, outcome: &RequestOutcome) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{} ({})", record.name, outcome.status.as_str()));
            bar.inc(1);
        }
    }
}
