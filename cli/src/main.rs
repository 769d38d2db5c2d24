//! obsctl: drive the observability convergence loop from the command line.
//!
//! # Usage
//!
//! ```text
//! obsctl reconcile --spec stack.yaml --objects cluster.yaml --ticks 3
//! obsctl cleanup --spec stack.yaml --objects cluster.yaml
//! obsctl status
//! ```
//!
//! The object store is an in-memory store seeded from a YAML list of objects,
//! so runs are repeatable. Status persists to the configured `status_path`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use obsconv_core::scheduler::{
    instance_key, FileStatusStore, Requeue, Scheduler, StatusStore, TickReport,
};
use obsconv_core::settings;
use obsconv_core::store::memory::MemoryStore;
use obsconv_core::types::config::Settings;
use obsconv_core::types::object::ManagedObject;
use obsconv_core::types::spec::Observability;
use obsconv_core::types::status::StageOutcome;

#[derive(Debug, Parser)]
#[command(name = "obsctl", about = "Observability stack convergence")]
struct Cli {
    /// Settings file (YAML). Defaults apply when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run reconcile ticks until converged or out of ticks
    Reconcile(ReconcileArgs),
    /// Run one teardown tick
    Cleanup(TargetArgs),
    /// Print the persisted status
    Status,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Desired specification (YAML)
    #[arg(long)]
    spec: PathBuf,
    /// Live objects to seed the store with (YAML list)
    #[arg(long)]
    objects: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, default_value_t = 1)]
    ticks: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = settings::load_or_default(cli.settings.as_deref())
        .context("failed to load settings")?;
    init_tracing(&settings);

    match cli.command {
        Command::Reconcile(args) => reconcile(&settings, &args),
        Command::Cleanup(args) => cleanup(&settings, &args),
        Command::Status => status(&settings),
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.log_filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn reconcile(settings: &Settings, args: &ReconcileArgs) -> anyhow::Result<()> {
    let (cr, store) = load_target(&args.target)?;
    let mut scheduler = Scheduler::standard(FileStatusStore::new(&settings.status_path), settings);

    let mut last = None;
    for tick in 1..=args.ticks.max(1) {
        let report = scheduler.tick(&store, &cr)?;
        println!("tick {}: {}", tick, report);
        let done = report.requeue == Requeue::AwaitChange;
        last = Some(report);
        if done {
            break;
        }
    }

    print_status(scheduler.statuses(), &cr)?;
    finish(last)
}

fn cleanup(settings: &Settings, args: &TargetArgs) -> anyhow::Result<()> {
    let (cr, store) = load_target(args)?;
    let mut scheduler = Scheduler::standard(FileStatusStore::new(&settings.status_path), settings);
    let report = scheduler.cleanup(&store, &cr)?;
    println!("cleanup: {}", report);
    for obj in store.objects() {
        debug!(object = %obj.identity, "left in store");
    }
    finish(Some(report))
}

fn status(settings: &Settings) -> anyhow::Result<()> {
    let statuses = FileStatusStore::new(&settings.status_path).load_all()?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    Ok(())
}

fn finish(report: Option<TickReport>) -> anyhow::Result<()> {
    match report {
        Some(r) if r.outcome == StageOutcome::Failed => bail!("{}", r),
        _ => Ok(()),
    }
}

fn print_status(statuses: &FileStatusStore, cr: &Observability) -> anyhow::Result<()> {
    let status = statuses.load(&instance_key(cr))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn load_target(args: &TargetArgs) -> anyhow::Result<(Observability, MemoryStore)> {
    let cr = Observability::from_yaml(&read(&args.spec)?)
        .with_context(|| format!("invalid specification in {}", args.spec.display()))?;
    let objects = match &args.objects {
        Some(path) => {
            let content = read(path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str::<Vec<ManagedObject>>(&content)
                    .with_context(|| format!("malformed object list in {}", path.display()))?
            }
        }
        None => Vec::new(),
    };
    debug!(count = objects.len(), "seeding object store");
    Ok((cr, MemoryStore::with_objects(objects)))
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
