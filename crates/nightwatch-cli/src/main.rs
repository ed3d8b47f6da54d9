use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nightwatch_pipeline::{
    FileKnowledgeStore, NightwatchConfig, Orchestrator, TerminalHitlResponder,
};
use nightwatch_runtime::{observe_container, DockerDriver, RuntimeDriver};
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

const OBSERVATION_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "nightwatch",
    about = "Nightwatch — an autonomous SRE incident-resolution agent"
)]
struct Cli {
    /// Path to the process configuration file
    #[arg(long, default_value = "nightwatch.toml")]
    config: PathBuf,

    /// Containers to watch. Defaults to every container named in the topology file.
    #[arg(long)]
    container: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_env("NIGHTWATCH_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "nightwatch failed to start");
        return Err(err);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = NightwatchConfig::from_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    let topology = nightwatch_pipeline::ContainerTopology::from_file(std::path::Path::new(
        &config.topology_path,
    ))
    .with_context(|| format!("loading container topology from {}", config.topology_path))?;

    tracing::info!(
        mode = ?config.mode,
        containers = topology.known_containers.len(),
        "nightwatch starting"
    );

    let reasoner = config
        .build_reasoner()
        .context("constructing reasoner client")?;
    let runtime: Arc<dyn RuntimeDriver> =
        Arc::new(DockerDriver::connect().context("connecting to container runtime")?);
    let responder = Arc::new(TerminalHitlResponder::new());
    let knowledge = Arc::new(FileKnowledgeStore::new(config.knowledge_path.clone()));

    let orchestrator = Arc::new(
        Orchestrator::new(
            reasoner,
            runtime.clone(),
            responder,
            knowledge,
            topology.known_containers.clone(),
        )
        .with_mode(config.mode)
        .with_max_attempts(config.constraints.max_actions_per_incident),
    );

    let containers = if cli.container.is_empty() {
        topology.known_containers.clone()
    } else {
        cli.container.clone()
    };

    let shutdown = Arc::new(Mutex::new(false));
    let mut observer_handles = Vec::new();

    for container in containers {
        let driver = runtime.clone();
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        let container_name = container.clone();

        let handle = tokio::spawn(async move {
            let result = observe_container(driver, container, OBSERVATION_WINDOW, move |batch| {
                let orchestrator = orchestrator.clone();
                let shutdown = shutdown.clone();
                async move {
                    if *shutdown.lock().await {
                        return;
                    }
                    tracing::info!(
                        containers = ?batch.containers,
                        lines = batch.logs.len(),
                        "batch received"
                    );
                    let (state, _ctx) = orchestrator.resolve(batch.logs).await;
                    tracing::info!(resolution = ?state.resolution, "incident loop finished");
                }
            })
            .await;

            if let Err(err) = result {
                tracing::warn!(container = %container_name, error = %err, "log observer stopped");
            }
        });

        observer_handles.push(handle);
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping new observation");
            *shutdown.lock().await = true;
        }
    }

    for handle in observer_handles {
        let _ = handle.await;
    }

    tracing::info!("nightwatch shutting down");
    Ok(())
}
