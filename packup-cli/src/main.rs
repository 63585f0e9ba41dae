use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use packup_core::archive::{self, BackupOptions};
use packup_core::filter::PathFilter;
use packup_core::human::format_bytes;
use packup_core::progress::{ProgressSink, ProgressSnapshot, ProgressState, ProgressTicker};
use packup_core::rate::format_eta;
use packup_core::scan::{self, ScanTotals};

#[derive(Parser)]
#[command(
    name = "packup",
    version,
    about = "Backup a directory into a tar archive with live progress and glob excludes"
)]
struct Cli {
    /// Source directory to archive
    #[arg(long, value_name = "DIR")]
    from: PathBuf,

    /// Destination archive path; must contain an extension
    #[arg(long, value_name = "PATH")]
    to: PathBuf,

    /// Glob pattern excluded from both scan and stream (repeatable)
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Compress the archive with gzip
    #[arg(long)]
    gzip: bool,

    /// Print size and ratio details after the run
    #[arg(long, conflicts_with = "silent")]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(long)]
    silent: bool,

    /// Display sizes as raw byte counts instead of human-readable units
    #[arg(long = "rawBytes")]
    raw_bytes: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.silent {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    // Fail fast, before any archive file exists: patterns, destination
    // policy, source readability.
    let filter = PathFilter::new(&cli.exclude)?;
    archive::check_destination(&cli.to)?;
    if !cli.from.is_dir() {
        bail!("--from '{}' is not a readable directory", cli.from.display());
    }

    if !cli.silent {
        let archive_name = cli
            .to
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("Creating \"{archive_name}\"");
        println!("from \"{}\"", cli.from.display());
        println!("to \"{}\"", cli.to.display());
    }

    let totals = scan::scan(&cli.from, &filter)?;

    let state = ProgressState::new();
    let sink: Arc<dyn ProgressSink> = if cli.silent {
        Arc::new(SilentSink)
    } else if std::io::stdout().is_terminal() {
        Arc::new(BarSink::new(&totals, cli.raw_bytes))
    } else {
        Arc::new(LineSink { raw_bytes: cli.raw_bytes })
    };

    let ticker = ProgressTicker::start(state.clone(), totals, sink.clone());
    let result = archive::run(
        &cli.from,
        &cli.to,
        &filter,
        &state,
        sink.as_ref(),
        &BackupOptions { gzip: cli.gzip, ..Default::default() },
    );
    // stopped on success and on failure alike; the sampler must not outlive
    // the pipeline
    ticker.stop();
    sink.finished();
    let summary = result?;
    tracing::debug!(
        files = summary.files,
        duration = summary.duration_seconds,
        "backup finished"
    );

    if !cli.silent {
        println!(
            "Archived {} entries, {}",
            summary.files,
            fmt_size(summary.uncompressed_bytes, cli.raw_bytes)
        );
        if cli.verbose {
            if let Some(compressed) = summary.compressed_bytes {
                println!("Compressed size: {}", fmt_size(compressed, cli.raw_bytes));
                if let Some(ratio) = summary.ratio() {
                    println!("Compression ratio: {ratio}%");
                }
            }
            println!("Elapsed: {:.2}s", summary.duration_seconds);
        }
    }
    Ok(())
}

fn fmt_size(bytes: u64, raw: bool) -> String {
    if raw {
        format!("{bytes} b")
    } else {
        format_bytes(bytes, 2, None)
    }
}

/// All non-error output suppressed.
struct SilentSink;

impl ProgressSink for SilentSink {}

/// Non-interactive mode: one line per archived entry, so progress can be
/// inspected offline.
struct LineSink {
    raw_bytes: bool,
}

impl ProgressSink for LineSink {
    fn entry(&self, rel: &Path, size: u64) {
        println!("{} ({})", rel.display(), fmt_size(size, self.raw_bytes));
    }
}

/// Interactive mode: single live bar fed by the sampling thread.
struct BarSink {
    bar: ProgressBar,
    total_bytes: u64,
    raw_bytes: bool,
}

impl BarSink {
    fn new(totals: &ScanTotals, raw_bytes: bool) -> Self {
        let total_bytes = totals.bytes.max(1);
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {percent}% | {msg}")
                .unwrap()
                .progress_chars("█░░"),
        );
        Self { bar, total_bytes, raw_bytes }
    }
}

impl ProgressSink for BarSink {
    fn tick(&self, snap: &ProgressSnapshot, totals: &ScanTotals, eta: Option<u64>) {
        // tar framing makes the tap overshoot the scanned content total
        self.bar.set_position(snap.bytes_written.min(self.total_bytes));
        let eta = eta.map(format_eta).unwrap_or_else(|| "N/A".to_string());
        self.bar.set_message(format!(
            "{}/{} | Files: {}/{} | ETA: {} | File: {}",
            fmt_size(snap.bytes_written, self.raw_bytes),
            fmt_size(totals.bytes, self.raw_bytes),
            snap.files_processed,
            totals.files,
            eta,
            snap.current_file,
        ));
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}
