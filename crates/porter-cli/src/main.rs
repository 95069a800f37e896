//! porter: run a worker or publish jobs against a task-queue broker.
//!
//! Settings come from `PORTER_*` environment variables; flags override them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use porter_core::{Argument, Config, Server, Signature, Tasks, TypeTag, WorkerExit};

#[derive(Parser)]
#[command(name = "porter")]
#[command(about = "Task-queue client: consume or publish jobs", long_about = None)]
#[command(version)]
struct Cli {
    /// Broker host (overrides PORTER_BROKER_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Broker port (overrides PORTER_BROKER_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Queue name (overrides PORTER_QUEUE)
    #[arg(long, short, global = true)]
    queue: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Declare a queue on the broker
    Declare {
        /// Queue capacity
        #[arg(long, default_value = "100")]
        cap: usize,

        #[arg(long)]
        durable: bool,
    },

    /// Register the built-in demo tasks and consume jobs until Ctrl-C
    ///
    /// Demo tasks: add(int64, int64), concat(string, string),
    /// divide(float64, float64), negate(int32).
    Worker {
        /// Subscriber name reported to the broker
        #[arg(long, default_value = "porter")]
        name: String,

        /// Number of pollers (overrides PORTER_CONCURRENCY)
        #[arg(long, short)]
        concurrency: Option<usize>,
    },

    /// Publish one job
    Publish {
        /// Task name
        task: String,

        /// Typed argument as `tag:json`, e.g. `int:2` or `string:"hi"`.
        /// Repeat for each argument, in order.
        #[arg(long = "arg", value_parser = parse_arg)]
        args: Vec<Argument>,
    },
}

/// `tag:json`. A value that is not valid JSON is taken as a string.
fn parse_arg(raw: &str) -> Result<Argument, String> {
    let (tag, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `tag:value`, got `{raw}`"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok(Argument::new(value, TypeTag::from(tag)))
}

fn demo_tasks() -> Tasks {
    Tasks::new()
        .add("add", |a: i64, b: i64| a + b)
        .add("concat", |a: String, b: String| format!("{a}{b}"))
        .add("divide", |a: f64, b: f64| {
            if b == 0.0 {
                Err("division by zero")
            } else {
                Ok(a / b)
            }
        })
        .add("negate", |a: i32| -a)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("reading PORTER_* environment")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(queue) = cli.queue {
        config.queue_name = queue;
    }

    match cli.command {
        Commands::Declare { cap, durable } => {
            let name = config.queue_name.clone();
            anyhow::ensure!(!name.is_empty(), "--queue or PORTER_QUEUE is required");
            let mut server = Server::new(config)?;
            server.declare_queue(name, cap, durable).await?;
        }

        Commands::Worker { name, concurrency } => {
            let concurrency = concurrency.unwrap_or(config.concurrency);
            let server = Server::new(config)?;
            server.register_tasks(demo_tasks()).await?;

            let exits = server
                .new_worker(name, concurrency)
                .fetch(shutdown_signal())
                .await?;

            let failed = exits
                .iter()
                .filter(|exit| !matches!(exit, WorkerExit::Shutdown))
                .count();
            anyhow::ensure!(failed == 0, "{failed} poller(s) stopped abnormally");
        }

        Commands::Publish { task, args } => {
            let server = Server::new(config)?;
            let signature = args
                .into_iter()
                .fold(Signature::new(task), |sig, arg| sig.arg(arg));
            server.publish(&signature).await?;
            println!("published {}", signature.name);
        }
    }

    Ok(())
}
