//! Command-line interface

use clap::{Parser, Subcommand};
use rand::Rng;
use std::cell::RefCell;
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::auth::{CredentialProvider, InstalledAppAuthenticator};
use crate::config::Config;
use crate::error::Result;
use crate::models::CycleReport;
use crate::responder::CycleRunner;
use crate::scheduler::{Scheduler, Sleeper, StopHandle, StopReason, TokioSleeper};

#[derive(Parser, Debug)]
#[command(name = "gmail-autoresponder")]
#[command(version = "0.1.0")]
#[command(about = "Vacation auto-responder for a Gmail inbox", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-autoresponder/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Poll the inbox and answer unread mail
    Run {
        /// Log the replies that would be sent without sending or labelling
        #[arg(long)]
        dry_run: bool,

        /// Run a single cycle and exit
        #[arg(long, conflicts_with = "max_cycles")]
        once: bool,

        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Create the marker label if missing and print its id
    EnsureLabel,
}

/// Overrides from the `run` subcommand
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub once: bool,
    pub max_cycles: Option<u64>,
}

impl RunOptions {
    /// Fold the command-line overrides into a loaded config
    pub fn apply(&self, config: &mut Config) {
        if self.dry_run {
            config.execution.dry_run = true;
        }
        if self.once {
            config.schedule.max_cycles = Some(1);
        } else if let Some(max) = self.max_cycles {
            config.schedule.max_cycles = Some(max);
        }
    }
}

/// Totals across every cycle of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub messages_scanned: usize,
    pub replies_sent: usize,
    pub already_marked: usize,
    pub would_reply: usize,
    pub message_failures: usize,
    pub interrupted: bool,
}

impl RunTotals {
    pub fn record(&mut self, report: &CycleReport) {
        self.messages_scanned += report.scanned();
        self.replies_sent += report.replied();
        self.already_marked += report.already_marked();
        self.would_reply += report.would_reply();
        self.message_failures += report.failed();
    }

    pub fn print_summary(&self, dry_run: bool) {
        println!("\n========================================");
        if dry_run {
            println!("Auto-responder Summary (DRY RUN)");
        } else {
            println!("Auto-responder Summary");
        }
        println!("========================================");
        println!("Cycles run: {}", self.cycles_run);
        println!("Cycles failed: {}", self.cycles_failed);
        println!("Messages scanned: {}", self.messages_scanned);
        println!("Replies sent: {}", self.replies_sent);
        println!("Already answered: {}", self.already_marked);
        if dry_run {
            println!("Would reply: {}", self.would_reply);
        }
        println!("Message failures: {}", self.message_failures);
        if self.interrupted {
            println!("Stopped by interrupt");
        }
        println!("========================================");
    }
}

/// Drive cycles through `scheduler` until it stops
///
/// Cycle failures are handled by the scheduler's policy; the totals only
/// count cycles that produced a report.
pub async fn run_cycles<S: Sleeper, R: Rng>(
    provider: &dyn CredentialProvider,
    config: &Config,
    scheduler: &mut Scheduler<S, R>,
) -> Result<RunTotals> {
    let runner = CycleRunner::new(provider, &config.responder, config.execution.dry_run);
    let totals = RefCell::new(RunTotals::default());

    let runner = &runner;
    let totals_ref = &totals;
    let summary = scheduler
        .run(move |cycle| async move {
            let report = runner.run_cycle(cycle).await?;
            totals_ref.borrow_mut().record(&report);
            Ok(report)
        })
        .await?;

    let mut totals = totals.into_inner();
    totals.cycles_run = summary.cycles_run;
    totals.cycles_failed = summary.cycles_failed;
    totals.interrupted = summary.stop_reason == StopReason::Requested;
    Ok(totals)
}

/// Turn interrupts into stop requests
///
/// The first interrupt stops the loop once the current cycle finishes.
/// Returns true when a second interrupt arrives and the process should exit
/// without waiting.
pub async fn handle_interrupts<F, Fut>(mut next_interrupt: F, stop: StopHandle) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        warn!("Unable to listen for interrupt: {}", e);
        return false;
    }
    info!("Interrupt received, finishing current cycle (press Ctrl-C again to exit now)");
    stop.request_stop();

    match next_interrupt().await {
        Ok(()) => {
            warn!("Second interrupt received, exiting immediately");
            true
        }
        Err(e) => {
            warn!("Unable to listen for interrupt: {}", e);
            false
        }
    }
}

/// Load config, authorize against Gmail and poll until stopped
///
/// Ctrl-C ends the loop after the cycle in progress; a second Ctrl-C exits
/// with status 130.
pub async fn run_responder(cli: &Cli, options: RunOptions) -> Result<RunTotals> {
    let mut config = Config::load(&cli.config).await?;
    options.apply(&mut config);
    config.validate()?;

    if config.execution.dry_run {
        info!("Dry run: replies will be logged, not sent");
    }

    let authenticator = InstalledAppAuthenticator::new(&cli.credentials, &cli.token_cache)
        .with_call_timeout(config.execution.call_timeout());
    let mut scheduler = Scheduler::from_config(&config.schedule, TokioSleeper)?;

    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        if handle_interrupts(tokio::signal::ctrl_c, stop).await {
            std::process::exit(130);
        }
    });

    info!(
        "Polling every {}-{} seconds for unread inbox mail",
        config.schedule.min_delay_secs, config.schedule.max_delay_secs
    );
    let totals = run_cycles(&authenticator, &config, &mut scheduler).await?;
    totals.print_summary(config.execution.dry_run);
    Ok(totals)
}
