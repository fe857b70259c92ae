use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use studio_export::{
    Checkpoint, DeliveryTarget, DetectionResult, DirectoryDelivery, ExportConfiguration,
    ExportFormat, ExportReport, MemoryDelivery, Notification, NumberLocale, ProgressSink,
    ScanOptions, Snapshot, TargetRegistry, detect, export_selected,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "studio-export",
    version,
    about = "Detect tables in a page snapshot and export them"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan a snapshot and summarize what was found.
    Scan(ScanArgs),
    /// Scan a snapshot and export selected tables.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct SnapshotArgs {
    /// Snapshot JSON path.
    #[arg(short, long)]
    input: PathBuf,

    /// Registry of known targets (JSON).
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Number locale: en, eu, ch or fr.
    #[arg(long)]
    locale: Option<String>,

    /// Also scan nodes that are hidden or zero-sized.
    #[arg(long)]
    include_hidden: bool,

    /// Print every scan warning.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[command(flatten)]
    snapshot: SnapshotArgs,

    /// Print the full detection result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(flatten)]
    snapshot: SnapshotArgs,

    /// Output directory. Not needed for clipboard output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// xlsx, csv, json, pdf, zip or clipboard.
    #[arg(short, long)]
    format: Option<ExportFormat>,

    /// Table ids to export, comma separated, in order.
    #[arg(long, value_delimiter = ',', conflicts_with = "all")]
    tables: Vec<String>,

    /// Export every detected table (the default without --tables).
    #[arg(long)]
    all: bool,

    /// Export configuration JSON; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    include_metadata: bool,

    #[arg(long)]
    no_headers: bool,

    #[arg(long)]
    compress: bool,

    /// Split tables longer than --max-rows into numbered parts.
    #[arg(long)]
    split: bool,

    #[arg(long)]
    max_rows: Option<usize>,

    /// Combine all selected tables into one sheet.
    #[arg(long)]
    bundle: bool,

    /// Base name for the output file.
    #[arg(long)]
    file_name: Option<String>,
}

/// Notifications on stderr, checkpoints in the debug log.
struct CliProgress;

impl ProgressSink for CliProgress {
    fn checkpoint(&mut self, checkpoint: Checkpoint) {
        debug!(
            phase = ?checkpoint.phase,
            step = checkpoint.step,
            percent = checkpoint.percent,
            "progress"
        );
    }

    fn notify(&mut self, notification: &Notification) {
        eprintln!("{}", notification.message);
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} '{}'", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {what} '{}'", path.display()))
}

fn parse_locale(value: Option<&str>) -> Result<Option<NumberLocale>> {
    value
        .map(|value| value.parse::<NumberLocale>())
        .transpose()
        .map_err(|error| anyhow!("invalid --locale: {error}"))
}

fn scan_snapshot(args: &SnapshotArgs) -> Result<DetectionResult> {
    let snapshot = Snapshot::from_path(&args.input)
        .with_context(|| format!("failed to load snapshot '{}'", args.input.display()))?;
    let registry = args
        .registry
        .as_deref()
        .map(|path| read_json::<TargetRegistry>(path, "registry"))
        .transpose()?;

    let mut options = ScanOptions {
        require_visible: !args.include_hidden,
        ..ScanOptions::default()
    };
    if let Some(locale) = parse_locale(args.locale.as_deref())? {
        options.locale = locale;
    }

    let result = detect(&snapshot, &options, registry.as_ref(), &mut CliProgress);
    log_warnings(&result, args.verbose);
    Ok(result)
}

fn log_warnings(result: &DetectionResult, verbose: bool) {
    if result.warnings.is_empty() {
        return;
    }
    eprintln!("warning: {} issue(s) during scan", result.warnings.len());
    if verbose {
        for warning in &result.warnings {
            eprintln!(
                "  - {:?} stage={:?} location={:?}: {}",
                warning.code, warning.stage, warning.location, warning.message
            );
        }
    }
}

fn run_scan(args: &ScanArgs) -> Result<DetectionResult> {
    let result = scan_snapshot(&args.snapshot)?;
    if args.json {
        let json = serde_json::to_string_pretty(&result).context("failed to encode result")?;
        println!("{json}");
    } else {
        println!("{}", result.summary());
        for table in &result.tables {
            println!(
                "  {}  {} ({} rows x {} columns, {}, confidence {:.2})",
                table.id,
                table.name,
                table.row_count,
                table.column_count,
                table.category.label(),
                table.confidence
            );
        }
    }
    Ok(result)
}

fn export_configuration(args: &ExportArgs) -> Result<ExportConfiguration> {
    let mut config = match &args.config {
        Some(path) => read_json::<ExportConfiguration>(path, "configuration")?,
        None => ExportConfiguration::default(),
    };
    if let Some(format) = args.format {
        config.format = format;
    }
    config.include_metadata |= args.include_metadata;
    config.include_headers &= !args.no_headers;
    config.compression |= args.compress;
    config.split_large_files |= args.split;
    config.bundle |= args.bundle;
    if let Some(max_rows) = args.max_rows {
        config.max_rows_per_sheet = max_rows;
    }
    if let Some(name) = &args.file_name {
        config.custom_file_name = Some(name.clone());
    }
    if let Some(locale) = parse_locale(args.snapshot.locale.as_deref())? {
        config.locale = locale;
    }
    if config.source.is_none() {
        config.source = Some(args.snapshot.input.display().to_string());
    }
    Ok(config)
}

/// `None` when the snapshot holds no tables.
fn run_export(args: &ExportArgs) -> Result<Option<ExportReport>> {
    let config = export_configuration(args)?;
    let result = scan_snapshot(&args.snapshot)?;
    if result.tables.is_empty() {
        eprintln!("{}", result.summary());
        return Ok(None);
    }

    let ids: Vec<String> = if args.all || args.tables.is_empty() {
        result.tables.iter().map(|table| table.id.clone()).collect()
    } else {
        args.tables.clone()
    };

    if config.format == ExportFormat::Clipboard {
        let mut delivery = MemoryDelivery::new(DeliveryTarget::Clipboard);
        let report = export_selected(&result, &ids, &config, &mut delivery, &mut CliProgress)?;
        if let Some(artifact) = delivery.into_artifact() {
            std::io::stdout()
                .write_all(&artifact.bytes)
                .context("failed to write clipboard text")?;
        }
        return Ok(Some(report));
    }

    let output = args
        .output
        .as_deref()
        .ok_or_else(|| anyhow!("--output is required for {} exports", config.format))?;
    let mut delivery = DirectoryDelivery::new(output);
    let report = export_selected(&result, &ids, &config, &mut delivery, &mut CliProgress)
        .with_context(|| format!("failed to export into '{}'", output.display()))?;
    println!("{}", output.join(&report.file_name).display());
    Ok(Some(report))
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("studio_export=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    let outcome = match &cli.command {
        Commands::Scan(args) => run_scan(args).map(|result| !result.is_empty()),
        Commands::Export(args) => run_export(args).map(|report| report.is_some()),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(1)
        }
    }
}
