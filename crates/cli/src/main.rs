//! `opgraph` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: execute the demonstration operation against a simulated screen.
//! - `graph`: print the demonstration operation's nodes and edges.

mod demo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{DirectorySink, OperationConfig, SignalContext};

use crate::demo::SimulatedScreen;

#[derive(Parser)]
#[command(
    name = "opgraph",
    about = "Retryable node-graph operation runner",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the demonstration operation.
    Run(RunArgs),
    /// Print the demonstration graph.
    Graph,
}

#[derive(Args)]
struct RunArgs {
    /// Consecutive RETRY rounds allowed per node.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    /// Whole-operation budget in milliseconds, pauses excluded.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Budget of the claim node in milliseconds.
    #[arg(long)]
    node_timeout_ms: Option<u64>,
    /// How many times the claim button is missed before it shows up.
    #[arg(long, default_value_t = 2)]
    claim_misses: u32,
    /// Pause the run after this many milliseconds.
    #[arg(long)]
    pause_at_ms: Option<u64>,
    /// Resume this many milliseconds after pausing.
    #[arg(long, default_value_t = 1000)]
    pause_for_ms: u64,
    /// Request a stop after this many milliseconds.
    #[arg(long)]
    stop_after_ms: Option<u64>,
    /// Directory for diagnostic screenshots.
    #[arg(long)]
    diagnostics: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> OperationConfig {
        OperationConfig {
            max_retries: self.max_retries,
            timeout: self.timeout_ms.map(Duration::from_millis),
            ..OperationConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Graph => {
            let operation = demo::daily_reward(OperationConfig::default(), None)?;
            print!("{}", operation.graph());
        }
        Command::Run(args) => {
            let operation = demo::daily_reward(args.config(), args.node_timeout_ms.map(Duration::from_millis))?;

            let screen = Arc::new(SimulatedScreen::new(args.claim_misses));
            let capture_from = Arc::clone(&screen);
            let mut ctx = SignalContext::new()
                .with_capture(move || capture_from.capture())
                .with_area_locator(screen);
            if let Some(dir) = &args.diagnostics {
                ctx = ctx.with_diagnostics(Arc::new(DirectorySink::new(dir)));
            }
            let ctx = Arc::new(ctx);

            if let Some(at) = args.pause_at_ms {
                let driver = Arc::clone(&ctx);
                let length = Duration::from_millis(args.pause_for_ms);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(at)).await;
                    driver.pause();
                    tokio::time::sleep(length).await;
                    driver.resume();
                });
            }
            if let Some(after) = args.stop_after_ms {
                let driver = Arc::clone(&ctx);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(after)).await;
                    driver.stop();
                });
            }

            info!("running '{}'", operation.name());
            let result = operation.execute(ctx).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
