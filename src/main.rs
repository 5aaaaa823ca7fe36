use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use govlink::actors::ActorMode;
use govlink::{interface_fingerprint, run_bounded, task, Config, Outcome, ResourceKey, Task};

/// Developer tool for the governance dashboard's client-coordination layer.
#[derive(Parser, Debug)]
#[command(name = "govlink")]
#[command(about = "Fingerprint interfaces, derive client cache keys, simulate bounded runs", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Authenticated,
    Anonymous,
}

impl From<ModeArg> for ActorMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Authenticated => ActorMode::Authenticated,
            ModeArg::Anonymous => ActorMode::Anonymous,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the fingerprint of an interface description file
    Fingerprint {
        /// Path to the interface description (e.g. a .did file)
        path: PathBuf,
    },

    /// Print the cache key for a canister client
    Key {
        /// Canister id the client talks to
        #[arg(long)]
        canister: String,

        /// Path to the interface description the client is built from
        #[arg(long)]
        interface: PathBuf,

        /// Client mode tag appended to the key
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Run simulated tasks through the bounded executor and report outcomes
    Simulate {
        /// Number of simulated tasks
        #[arg(long, default_value_t = 8)]
        tasks: usize,

        /// Concurrency limit (defaults to `max_parallel` from config)
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Make every K-th task (1-based) fail
        #[arg(long)]
        fail_every: Option<usize>,

        /// Simulated work per task, in milliseconds
        #[arg(long, default_value_t = 20)]
        delay_ms: u64,

        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn print_error_chain(err: &anyhow::Error) {
    eprintln!("Error: {err}");

    let mut n = 0;
    let mut cur = err.source();
    while let Some(cause) = cur {
        eprintln!("  {n}: {cause}");
        n += 1;
        cur = cause.source();
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = real_main(cli.command) {
        print_error_chain(&err);
        std::process::exit(1);
    }
}

fn real_main(command: Command) -> Result<()> {
    match command {
        Command::Fingerprint { path } => {
            let raw = fs::read(&path)
                .with_context(|| format!("failed to read interface '{}'", path.display()))?;
            println!("{}", interface_fingerprint(raw));
            Ok(())
        }
        Command::Key {
            canister,
            interface,
            mode,
        } => {
            let raw = fs::read(&interface)
                .with_context(|| format!("failed to read interface '{}'", interface.display()))?;
            let mut key = ResourceKey::new(canister, raw);
            if let Some(mode) = mode {
                key = key.with_mode(ActorMode::from(mode).as_str());
            }
            println!("{key}");
            Ok(())
        }
        Command::Simulate {
            tasks,
            limit,
            fail_every,
            delay_ms,
            config,
        } => {
            let cfg = match config {
                Some(path) => Config::load(&path)
                    .with_context(|| format!("failed to load config: {}", path.display()))?,
                None => Config::default(),
            };
            let cfg = cfg.apply_env().context("invalid environment override")?;
            let limit = limit.unwrap_or_else(|| i64::try_from(cfg.max_parallel).unwrap_or(i64::MAX));
            simulate(tasks, limit, fail_every, Duration::from_millis(delay_ms))
        }
    }
}

fn simulate(count: usize, limit: i64, fail_every: Option<usize>, delay: Duration) -> Result<()> {
    let active = Arc::new(AtomicUsize::new(0));
    let observed_max = Arc::new(AtomicUsize::new(0));

    let jobs: Vec<Task<usize, String>> = (0..count)
        .map(|i| {
            let active = Arc::clone(&active);
            let observed_max = Arc::clone(&observed_max);
            let fails = fail_every.is_some_and(|k| k > 0 && (i + 1) % k == 0);
            task(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                observed_max.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(delay);
                active.fetch_sub(1, Ordering::SeqCst);
                if fails {
                    Err(format!("simulated failure at task {i}"))
                } else {
                    Ok(i)
                }
            })
        })
        .collect();

    info!(tasks = count, limit, "starting simulated run");
    let outcomes = run_bounded(limit, jobs).context("bounded run failed")?;

    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Outcome::Fulfilled { value } => println!("task={i} fulfilled value={value}"),
            Outcome::Rejected { reason } => println!("task={i} rejected reason={reason}"),
        }
    }
    let rejected = outcomes.iter().filter(|o| o.is_rejected()).count();
    println!(
        "summary tasks={} fulfilled={} rejected={rejected}",
        outcomes.len(),
        outcomes.len() - rejected
    );
    println!("max_in_flight={}", observed_max.load(Ordering::SeqCst));
    Ok(())
}
