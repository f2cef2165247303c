//! mailmove - copy, move or mirror mail between two mail stores

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{debug, error, info};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mailsync::config::CONFIG_FILE;
use mailsync::{
    Counts, Endpoint, FolderSelector, MoveConfig, RunMode, RunReport, Side, StopReason,
    SyncOptions, SyncProgress, open_store, reconcile,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source store URI (imap-ssl://, imap-tls://, file://, memory:)
    #[arg(short, long)]
    source: Option<String>,

    /// Target store URI
    #[arg(short, long)]
    target: Option<String>,

    /// JSON config file (defaults to ~/.config/mailmove/mailmove.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Index and classify only, change nothing
    #[arg(long)]
    fake: bool,

    /// Remove messages from the source once they are on the target
    #[arg(long)]
    wipe: bool,

    /// Stop after the first copied message
    #[arg(long)]
    once: bool,

    /// Remove target messages that are not on the source
    #[arg(long)]
    sync: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    match run(args) {
        Ok(report) => {
            print_summary(&report);
            if report.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<RunReport> {
    let file_config = match &args.config {
        Some(path) => MoveConfig::load(Some(path))?,
        None => {
            if let Some(path) = config::config_path(CONFIG_FILE) {
                debug!("Looking for config at {}", path.display());
            }
            MoveConfig::load(None)?
        }
    };

    // Command line wins over the file; flags are OR-ed
    let source = args
        .source
        .or(file_config.source)
        .ok_or_else(|| anyhow!("No source given (use --source or the config file)"))?;
    let target = args
        .target
        .or(file_config.target)
        .ok_or_else(|| anyhow!("No target given (use --target or the config file)"))?;

    let mode = RunMode::builder()
        .fake(args.fake || file_config.fake)
        .wipe(args.wipe || file_config.wipe)
        .once(args.once || file_config.once)
        .sync(args.sync || file_config.sync)
        .build()?;

    let source = Endpoint::parse(&source)?;
    let target = Endpoint::parse(&target)?;
    info!(
        "{} -> {} (fake: {}, wipe: {}, once: {}, sync: {})",
        source.redacted(),
        target.redacted(),
        mode.fake(),
        mode.wipe(),
        mode.once(),
        mode.sync()
    );

    let interrupt = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&interrupt))
            .with_context(|| format!("Failed to install handler for signal {}", signal))?;
    }

    let options = SyncOptions::new(mode)
        .with_selector(FolderSelector::new().with_skipped(&file_config.skip_folders))
        .with_interrupt(interrupt);

    // The source is only written to when wiping
    let mut source_store = open_store(&source, Side::Source, !mode.wipe())?;
    let mut target_store = match open_store(&target, Side::Target, false) {
        Ok(store) => store,
        Err(e) => {
            if let Err(close_err) = source_store.close() {
                debug!("Error closing source: {:#}", close_err);
            }
            return Err(e.into());
        }
    };

    let mut progress = ProgressLine::default();
    let report = reconcile(
        source_store.as_mut(),
        target_store.as_mut(),
        &options,
        |event| progress.update(event),
    )?;
    Ok(report)
}

/// Single status line on stderr, redrawn with a carriage return
#[derive(Default)]
struct ProgressLine {
    dirty: bool,
}

impl ProgressLine {
    fn update(&mut self, event: SyncProgress<'_>) {
        match event {
            SyncProgress::FolderStarted {
                source,
                target,
                source_count,
                target_count,
            } => {
                self.end_line();
                eprintln!(
                    "S: {} ({} messages) -> T: {} ({} messages)",
                    source, source_count, target, target_count
                );
            }
            SyncProgress::Indexing { done, total } => {
                self.draw(&format!("T: Indexing: {}/{}", done, total));
            }
            SyncProgress::Message { counts } => {
                self.draw(&format!(
                    "Copied: {} Skipped: {}",
                    counts.copied, counts.skipped
                ));
            }
            SyncProgress::FolderFinished { report } => {
                self.end_line();
                match &report.error {
                    Some(error) => eprintln!("{}: FAILED: {}", report.source_folder, error),
                    None => eprintln!(
                        "{}: {}",
                        report.target_folder,
                        describe_counts(&report.counts)
                    ),
                }
            }
        }
    }

    fn draw(&mut self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        // Progress output is best effort
        let _ = write!(stderr, "\r{}\x1b[K", line);
        let _ = stderr.flush();
        self.dirty = true;
    }

    fn end_line(&mut self) {
        if self.dirty {
            eprintln!();
            self.dirty = false;
        }
    }
}

fn describe_counts(counts: &Counts) -> String {
    let mut text = format!(
        "copied {}, skipped {}, deleted {}",
        counts.copied, counts.skipped, counts.deleted
    );
    if counts.wiped > 0 {
        text.push_str(&format!(", wiped {}", counts.wiped));
    }
    if counts.failed > 0 || counts.unreadable > 0 {
        text.push_str(&format!(
            ", failed {}, unreadable {}",
            counts.failed, counts.unreadable
        ));
    }
    text
}

fn summary_line(report: &RunReport) -> String {
    let failed = report.failed_folders().count();
    let reason = match report.stopped {
        StopReason::Completed if failed > 0 => "finished with failed folders",
        StopReason::Completed => "done",
        StopReason::Once => "stopped after first copy (--once)",
        StopReason::Interrupted => "interrupted",
    };
    let mut line = format!(
        "{} folders, {}: {}",
        report.folders.len(),
        describe_counts(&report.totals()),
        reason
    );
    if failed > 0 {
        let names: Vec<&str> = report
            .failed_folders()
            .map(|f| f.source_folder.as_str())
            .collect();
        line.push_str(&format!(" ({} failed: {})", failed, names.join(", ")));
    }
    line
}

fn print_summary(report: &RunReport) {
    for folder in report.failed_folders() {
        if let Some(error) = &folder.error {
            error!("{}: {}", folder.source_folder, error);
        }
    }
    println!("{}", summary_line(report));
}
