use crate::core::{
    config::Config,
    download::HttpTransport,
    extract::ExtractSummary,
    installer::Installer,
    progress::{CancelToken, TransferError},
    state::{InstallState, ProgressTracker},
};
use crate::error::{InstallError, Result};
use crate::utils::fs;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long a cancelled worker may keep running before the command gives up on it.
const CANCEL_GRACE: Duration = Duration::from_secs(1);
const BAR_SCALE: f64 = 1000.0;

pub struct InstallOptions {
    pub url: Option<String>,
    pub destination: Option<PathBuf>,
    pub yes: bool,
    pub staged: bool,
    pub keep_modes: bool,
}

pub fn install(options: InstallOptions) -> Result<()> {
    let config = Config::load()?;

    let url = options
        .url
        .or_else(|| config.source_url.clone())
        .ok_or(InstallError::MissingSource)?;
    let destination = options
        .destination
        .or_else(|| config.destination.clone())
        .ok_or_else(|| {
            InstallError::config_error(
                "No destination given (use --dest or `zipinstall config set-dest`)",
            )
        })?;

    println!("Source:      {url}");
    println!("Destination: {}", destination.display());

    let staged = options.staged || config.staged_extraction;
    if destination.exists() && !fs::is_empty_dir(&destination) {
        if staged {
            println!("⚠️  Destination is not empty and will be replaced; files not in the archive will be removed.");
        } else {
            println!("⚠️  Destination is not empty; files with the same names will be overwritten.");
        }
    }

    if !options.yes
        && !Confirm::new()
            .with_prompt("Install now?")
            .default(true)
            .interact()?
    {
        println!("Installation cancelled");
        return Ok(());
    }

    let transport = HttpTransport::new(&config.user_agent, config.timeout())?;
    let tracker = ProgressTracker::new();
    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    let installer = Installer::new(transport, tracker.clone())
        .staged(staged)
        .clamp_permissions(config.clamp_permissions && !options.keep_modes)
        .cancel_token(cancel.clone());

    let target = destination.clone();
    let worker = thread::spawn(move || installer.download_and_install(&url, &target));

    let bar = overall_bar();
    let mut watch = CancelWatch::new(cancel.clone(), CANCEL_GRACE);
    while !worker.is_finished() {
        draw(&bar, &tracker, &cancel);
        if watch.expired() {
            // the worker may be blocked in a connect; it dies with the process
            bar.abandon_with_message("Installation cancelled");
            warn!("Installer did not stop after cancellation, exiting without it");
            return Err(TransferError::Cancelled {
                transferred: tracker.snapshot().bytes,
            }
            .into());
        }
        thread::sleep(POLL_INTERVAL);
    }
    draw(&bar, &tracker, &cancel);

    let result = worker
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

    match (&result, tracker.state()) {
        (Ok(summary), InstallState::Succeeded) => {
            bar.finish_with_message("Installation complete");
            print_summary(summary, &destination);
        }
        _ => bar.abandon_with_message("Installation failed"),
    }

    result.map(|_| ())
}

fn overall_bar() -> ProgressBar {
    let bar = ProgressBar::new(BAR_SCALE as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

fn draw(bar: &ProgressBar, tracker: &ProgressTracker, cancel: &CancelToken) {
    let snap = tracker.snapshot();
    bar.set_position((snap.overall.clamp(0.0, 1.0) * BAR_SCALE) as u64);
    if cancel.is_cancelled() && !snap.state.is_terminal() {
        bar.set_message("Cancelling...");
    } else {
        bar.set_message(snap.status);
    }
}

/// First Ctrl-C cancels the run, a second one exits immediately.
fn install_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    let handler = move || {
        if token.is_cancelled() {
            eprintln!("Interrupted");
            std::process::exit(130);
        }
        token.cancel();
    };
    if let Err(e) = ctrlc::set_handler(handler) {
        warn!("Cannot install Ctrl-C handler: {e}");
    }
}

/// Tracks how long a cancellation has been pending.
struct CancelWatch {
    token: CancelToken,
    grace: Duration,
    since: Option<Instant>,
}

impl CancelWatch {
    fn new(token: CancelToken, grace: Duration) -> Self {
        Self {
            token,
            grace,
            since: None,
        }
    }

    /// True once the token has been set for at least the grace period.
    fn expired(&mut self) -> bool {
        if !self.token.is_cancelled() {
            return false;
        }
        let since = *self.since.get_or_insert_with(Instant::now);
        since.elapsed() >= self.grace
    }
}

fn print_summary(summary: &ExtractSummary, destination: &std::path::Path) {
    println!(
        "✅ Installed {} files and {} directories ({} bytes)",
        summary.files, summary.directories, summary.bytes
    );
    println!("   Location: {}", destination.display());

    match fs::count_tree(destination) {
        Ok((files, directories)) => {
            println!("   Destination now holds {files} files in {directories} directories")
        }
        Err(e) => warn!("Cannot inspect {}: {e}", destination.display()),
    }
}
