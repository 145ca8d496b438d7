use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use iamsim::choreography::{Choreography, ChoreographyGraph};
use iamsim::core::config::{Config, LogFormat};
use iamsim::core::traits::{CheckpointStore, EventStore};
use iamsim::store::{FileCheckpoints, MemoryCheckpoints, MemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "iamsim")]
#[command(about = "IAM event choreography simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Runs the generator and every cursor loop until Ctrl-C.
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        max_seconds: Option<u64>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Prints the routing graph.
    Graph,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            config,
            seed,
            max_seconds,
            dry_run,
        } => {
            let mut loaded = match &config {
                Some(path) => Config::from_path(path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => Config::default(),
            };
            if seed.is_some() {
                loaded.seed = seed;
            }

            if dry_run {
                println!("{}", toml::to_string_pretty(&loaded)?);
                return Ok(());
            }

            init_logging(loaded.log.format);

            let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
            let checkpoints: Arc<dyn CheckpointStore> = match &loaded.checkpoint.path {
                Some(path) => {
                    let file = FileCheckpoints::open(path)
                        .with_context(|| format!("opening checkpoint file {path}"))?;
                    tracing::info!(path = %file.path().display(), "using file checkpoints");
                    Arc::new(file)
                }
                None => Arc::new(MemoryCheckpoints::new()),
            };

            let choreography = Choreography::spawn(
                &loaded,
                store,
                checkpoints,
                ChoreographyGraph::default(),
                Utc::now(),
            )
            .await
            .context("starting choreography")?;

            let waited = wait_for_stop(max_seconds).await;
            tracing::info!("shutting down");
            choreography.shutdown().await;
            waited?;
        }
        Commands::Graph => {
            print!("{}", ChoreographyGraph::default());
        }
    }

    Ok(())
}

/// Returns on Ctrl-C or after `max_seconds`. Without a Ctrl-C handler the
/// run needs a deadline.
async fn wait_for_stop(max_seconds: Option<u64>) -> anyhow::Result<()> {
    let deadline = async {
        match max_seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                if max_seconds.is_none() {
                    return Err(anyhow::Error::new(err)
                        .context("listening for ctrl-c; pass --max-seconds to run without it"));
                }
                tracing::warn!(error = %err, "failed to listen for ctrl-c, running until the deadline");
                deadline.await;
            }
        }
        _ = &mut deadline => {}
    }
    Ok(())
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
