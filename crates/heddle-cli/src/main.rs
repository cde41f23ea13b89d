use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};

use heddle_core::app::ReaperLoop;
use heddle_core::config::{self, HeddleConfig};
use heddle_core::domain::{Capabilities, HandlerError, Outcome, Task, TaskId, TaskSpec};
use heddle_core::impls::{BroadcastEventSink, FileResultBackend};
use heddle_core::logging::{self, LogLevel};
use heddle_core::runtime::{HandlerRegistry, TaskHandler};
use heddle_core::scheduler::Scheduler;
use heddle_core::spawner::Spawner;

#[derive(Debug, Parser)]
#[command(
    name = "heddle",
    version,
    about = "Dependency-aware task scheduler with warm worker pools.",
    long_about = None
)]
struct Cli {
    /// Path to the config file (TOML). Built-in defaults when omitted.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Logging level. If omitted, `HEDDLE_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    log_level: Option<CliLogLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate the config, then print the pools.
    Validate,
    /// Boot the scheduler and worker pools, run a small DAG, print the records.
    Demo {
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// Also write finished task snapshots as JSON files here.
        #[arg(long, value_name = "DIR")]
        results_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

/// Returns the payload unchanged.
struct EchoHandler {
    provides: Capabilities,
}

#[async_trait]
impl TaskHandler for EchoHandler {
    fn name(&self) -> &str {
        "echo"
    }

    fn provides(&self) -> &Capabilities {
        &self.provides
    }

    async fn handle(&self, task: &Task) -> Result<Outcome, HandlerError> {
        Ok(Outcome::success(json!({ "echo": task.payload })))
    }
}

#[derive(Debug, Deserialize)]
struct SumPayload {
    values: Vec<i64>,
}

/// Sums `values`; only takes payloads with `"op": "sum"`.
struct SumHandler {
    provides: Capabilities,
}

#[async_trait]
impl TaskHandler for SumHandler {
    fn name(&self) -> &str {
        "sum"
    }

    fn provides(&self) -> &Capabilities {
        &self.provides
    }

    fn dispatch(&self, task: &Task) -> bool {
        task.payload.get("op").and_then(|op| op.as_str()) == Some("sum")
    }

    async fn handle(&self, task: &Task) -> Result<Outcome, HandlerError> {
        let p: SumPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| HandlerError::fatal(format!("json decode: {e}")))?;
        Ok(Outcome::success(json!({ "v": p.values.iter().sum::<i64>() })))
    }
}

fn handlers() -> Result<Arc<HandlerRegistry>> {
    let mut reg = HandlerRegistry::new();
    reg.register(Arc::new(SumHandler {
        provides: Capabilities::new(),
    }))?;
    reg.register(Arc::new(EchoHandler {
        provides: Capabilities::new(),
    }))?;
    Ok(Arc::new(reg))
}

fn load_config(path: Option<&PathBuf>) -> Result<HeddleConfig> {
    match path {
        Some(path) => config::load_and_validate(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(HeddleConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.map(LogLevel::from))?;
    let config = load_config(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Demo {
        timeout_secs: 10,
        results_dir: None,
    }) {
        Command::Validate => {
            for pool in &config.pool {
                println!(
                    "pool {}: warm_pool={} poll_ms={} idle_ms={} capabilities={}",
                    pool.name,
                    pool.warm_pool,
                    pool.poll_ms,
                    pool.idle_ms,
                    pool.capabilities()
                );
            }
            Ok(())
        }
        Command::Demo {
            timeout_secs,
            results_dir,
        } => demo(config, Duration::from_secs(timeout_secs), results_dir).await,
    }
}

async fn demo(config: HeddleConfig, timeout: Duration, results_dir: Option<PathBuf>) -> Result<()> {
    let events = Arc::new(BroadcastEventSink::new(256));
    let mut builder = Scheduler::builder()
        .events(events.clone())
        .options(config.scheduler.options());
    if let Some(dir) = results_dir {
        builder = builder.results(Arc::new(FileResultBackend::open(dir).await?));
    }
    let scheduler = Arc::new(builder.build()?);

    let mut event_rx = events.subscribe();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            debug!(kind = ?event.kind, task_id = %event.task.id, status = %event.task.status, "event");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut joins: Vec<JoinHandle<()>> = Vec::new();

    let reaper = ReaperLoop::new(scheduler.clone());
    let rx = shutdown_rx.clone();
    joins.push(tokio::spawn(async move { reaper.run(rx).await }));

    let handlers = handlers()?;
    for pool in &config.pool {
        let mut spawner = Spawner::new(
            pool.spawner_config(),
            scheduler.clone(),
            handlers.clone(),
            scheduler.clock().clone(),
        );
        let rx = shutdown_rx.clone();
        joins.push(tokio::spawn(async move {
            if let Err(e) = spawner.run(rx).await {
                warn!(error = %e, "spawner stopped with error");
            }
        }));
    }

    let pool = config
        .pool
        .first()
        .map(|p| p.name.clone())
        .context("no pool configured")?;
    let ids = submit_dag(&scheduler, &pool).await?;

    let outcome = tokio::select! {
        done = wait_terminal(&scheduler, &ids, timeout) => done,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            Ok(false)
        }
    };

    for id in &ids {
        let task = scheduler.get(id).await?;
        println!("{}", serde_json::to_string_pretty(&task)?);
    }

    // ignore send error: receivers may already be gone
    let _ = shutdown_tx.send(true);
    for join in joins {
        let _ = join.await;
    }
    event_log.abort();

    if !outcome? {
        bail!("demo DAG did not finish within {}s", timeout.as_secs());
    }
    Ok(())
}

/// A -> B (only if A's sum is 1) -> C (after A and B).
async fn submit_dag(scheduler: &Scheduler, pool: &str) -> Result<Vec<TaskId>> {
    let a = scheduler
        .submit(
            TaskSpec::new(pool, json!({ "op": "sum", "values": [0, 1] })).with_label("demo"),
        )
        .await?;
    let b = scheduler
        .submit(
            TaskSpec::new(pool, json!({ "step": "b" }))
                .depends_on(a.clone())
                .with_edge_pred(format!("results['{a}']['v'] == 1"))
                .with_label("demo"),
        )
        .await?;
    let c = scheduler
        .submit(
            TaskSpec::new(pool, json!({ "step": "c" }))
                .depends_on(a.clone())
                .depends_on(b.clone())
                .with_label("demo"),
        )
        .await?;
    info!(a = %a, b = %b, c = %c, pool, "demo DAG submitted");
    Ok(vec![a, b, c])
}

async fn wait_terminal(scheduler: &Scheduler, ids: &[TaskId], timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut done = true;
        for id in ids {
            done &= scheduler.get(id).await?.is_terminal();
        }
        if done {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(Duration::from_millis(50)).await;
    }
}
