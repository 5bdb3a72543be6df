//! Secure Wipe - securely delete files and fill free disk space.
//!
//! Thin command-line host around the `secure_wipe` operations.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use secure_wipe::mount::{filter_to_one_per_mount, SystemMounts};
use secure_wipe::operation::OperationHandle;
use secure_wipe::{
    DeleteOperation, DeleteOptions, FillOperation, Finished, Handlers, OverwriteEngine,
    PassPolicy, WipeMode, WipeTarget,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "secure-wipe")]
#[command(author, version, long_about = None)]
#[command(
    about = "Securely delete files and wipe free disk space",
    long_about = "Overwrites files several times before unlinking them, or fills the free space of each mount with filler data that is overwritten and removed."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Securely delete files and directories
    Delete {
        /// Files or directories to delete
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Remove parent directories left empty
        #[arg(long)]
        prune_empty: bool,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Wipe the free space of the mounts holding the given paths
    Fill {
        /// Paths on the mounts to fill
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show which directory would be filled for each mount
    Mounts {
        /// Paths to resolve
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct PolicyArgs {
    /// Wipe mode preset
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Explicit number of passes (overrides --mode)
    #[arg(long)]
    passes: Option<u32>,

    /// Use a faster random source and skip per-pass syncing
    #[arg(long)]
    fast: bool,

    /// Do not add a final zero pass
    #[arg(long)]
    no_zero: bool,

    /// JSON pass policy file (flags take precedence)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Normal,
    Insecure,
    VeryInsecure,
}

impl From<ModeArg> for WipeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => WipeMode::Normal,
            ModeArg::Insecure => WipeMode::Insecure,
            ModeArg::VeryInsecure => WipeMode::VeryInsecure,
        }
    }
}

impl PolicyArgs {
    fn resolve(&self) -> Result<PassPolicy> {
        let mut policy = match &self.config {
            Some(path) => PassPolicy::load(path)
                .with_context(|| format!("Failed to load policy from {}", path.display()))?,
            None => PassPolicy::default(),
        };

        if let Some(mode) = self.mode {
            policy.pass_count = WipeMode::from(mode).pass_count();
        }
        if let Some(passes) = self.passes {
            policy.pass_count = passes;
        }
        if self.fast {
            policy.fast_mode = true;
        }
        if self.no_zero {
            policy.final_zero_pass = false;
        }

        policy.validate().context("Invalid pass policy")?;
        Ok(policy)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Delete {
            paths,
            policy,
            prune_empty,
            yes,
        } => cmd_delete(&paths, &policy, prune_empty, yes).await,

        Commands::Fill { paths, policy, yes } => cmd_fill(&paths, &policy, yes).await,

        Commands::Mounts { paths } => cmd_mounts(&paths),
    }
}

/// Make relative command-line paths absolute.
fn absolute_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    Ok(paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { cwd.join(p) })
        .collect())
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn describe(policy: &PassPolicy) -> String {
    let mode = WipeMode::from_pass_count(policy.pass_count)
        .map(|mode| format!(" ({})", mode.description()))
        .unwrap_or_default();
    format!(
        "{} passes{}{}{}",
        policy.pass_count,
        mode,
        if policy.final_zero_pass { " + zero pass" } else { "" },
        if policy.fast_mode { ", fast" } else { "" }
    )
}

async fn cmd_delete(paths: &[PathBuf], policy: &PolicyArgs, prune_empty: bool, yes: bool) -> Result<()> {
    let policy = policy.resolve()?;
    let targets = WipeTarget::from_paths(absolute_paths(paths)?).context("Invalid target")?;

    if !yes {
        let question = format!(
            "Permanently delete {} item(s) using {}? This cannot be undone.",
            targets.len(),
            describe(&policy)
        );
        if !confirm(&question)? {
            println!("Aborted");
            return Ok(());
        }
    }

    let engine = Arc::new(OverwriteEngine::default());
    let operation = DeleteOperation::new(engine, policy).with_options(DeleteOptions {
        prune_empty_parents: prune_empty,
    });

    let (handlers, progress, finished) = console_handlers();
    let handle = operation.launch(targets, handlers)?;
    let finished = drive(handle, progress, finished).await?;
    report(finished, "Files securely deleted")
}

async fn cmd_fill(paths: &[PathBuf], policy: &PolicyArgs, yes: bool) -> Result<()> {
    let policy = policy.resolve()?;
    let paths = absolute_paths(paths)?;

    if !yes {
        let question = format!(
            "Fill the free space of {} location(s) using {}? This may take a long time.",
            paths.len(),
            describe(&policy)
        );
        if !confirm(&question)? {
            println!("Aborted");
            return Ok(());
        }
    }

    let engine = Arc::new(OverwriteEngine::default());
    let operation = FillOperation::new(engine, policy);

    let (handlers, progress, finished) = console_handlers();
    let handle = operation
        .launch(&paths, handlers)
        .context("Cannot prepare free space wipe")?;
    let finished = drive(handle, progress, finished).await?;
    report(finished, "Free space securely wiped")
}

fn cmd_mounts(paths: &[PathBuf]) -> Result<()> {
    let paths = absolute_paths(paths)?;
    let mounts = SystemMounts::load();
    let filtered = filter_to_one_per_mount(&paths, &mounts)?;

    println!("{:<40} {}", "MOUNT", "WORK DIRECTORY");
    for (dir, mount) in filtered.iter() {
        println!("{:<40} {}", mount.to_string(), dir.display());
    }
    Ok(())
}

type SharedFraction = Arc<Mutex<f64>>;

/// Callbacks that record progress and hand the outcome back to `drive`.
fn console_handlers() -> (Handlers, SharedFraction, oneshot::Receiver<Finished>) {
    let fraction = Arc::new(Mutex::new(0.0));
    let (tx, rx) = oneshot::channel();

    let sink = Arc::clone(&fraction);
    let handlers = Handlers::new(
        move |value| {
            if let Ok(mut current) = sink.lock() {
                *current = value;
            }
        },
        move |finished| {
            let _ = tx.send(finished);
        },
    );
    (handlers, fraction, rx)
}

/// Draw progress until the operation finishes, cancelling on Ctrl-C.
async fn drive(
    handle: OperationHandle,
    fraction: SharedFraction,
    mut finished: oneshot::Receiver<Finished>,
) -> Result<Finished> {
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            result = &mut finished => break result.context("Operation ended without a result")?,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                match signal {
                    Ok(()) => {
                        eprintln!();
                        info!("Canceling, finishing the current pass first");
                        handle.cancel();
                    }
                    Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
                }
            }
            _ = ticker.tick() => draw(&handle, &fraction),
        }
    };

    draw(&handle, &fraction);
    eprintln!();
    Ok(outcome)
}

fn draw(handle: &OperationHandle, fraction: &SharedFraction) {
    let value = fraction.lock().map(|v| *v).unwrap_or(0.0);
    let step = handle.step();
    if step.target == 0 {
        return;
    }
    eprint!("\r{:>5.1}%  {}\x1b[K", value * 100.0, step);
    let _ = io::stderr().flush();
}

fn report(finished: Finished, success: &str) -> Result<()> {
    if finished.success {
        println!("{}", success);
        return Ok(());
    }
    match finished.message {
        Some(message) => bail!(message),
        None => bail!("Operation failed"),
    }
}
