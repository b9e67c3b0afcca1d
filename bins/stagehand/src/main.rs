use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use stagehand_process::HostLifecycle;
use stagehand_supervisor::{Fleet, FleetConfig, GroupConfig, StageGroupSpec};

mod checkin;

/// Stagehand - supervises stage group processes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Control plane port (overrides config)
    #[arg(short = 'p', long)]
    control_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug);

    info!("Starting stagehand {}", stagehand_supervisor::VERSION);
    info!("Config file: {}", args.config);

    let mut config = FleetConfig::load_from_file(&args.config)?;

    if let Some(port) = args.control_port {
        config.supervisor.control_plane_port = port;
        config.validate()?;
    }

    info!("Loaded configuration for {} stage group(s)", config.groups.len());

    let host = Arc::new(HostLifecycle::new());
    let fleet = Arc::new(Fleet::new(config.supervisor.clone(), Arc::clone(&host)));

    let address = (
        config.supervisor.control_plane_host.as_str(),
        config.supervisor.control_plane_port,
    );
    let listener = TcpListener::bind(address).await.with_context(|| {
        format!(
            "Failed to bind check-in listener on {}:{}",
            address.0, address.1
        )
    })?;
    info!("Accepting check-ins on {}", listener.local_addr()?);

    let listener_task = tokio::spawn(checkin::serve(
        listener,
        Arc::clone(&fleet),
        host.shutdown_signal().clone(),
    ));

    launch_groups(&fleet, &config.groups).await;

    wait_for_shutdown_signal().await?;

    info!("Shutting down stagehand...");
    if let Err(e) = fleet.shutdown().await {
        error!("Fleet shutdown left orphaned processes: {}", e);
    }
    if !host.host_exiting() {
        warn!("Some child processes could not be killed on exit");
    }

    if let Err(e) = listener_task.await {
        warn!("Check-in listener ended abnormally: {}", e);
    }

    info!("Stagehand shut down");
    Ok(())
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

/// Launch every configured group. A group that fails to load or prepare is
/// logged and skipped; the others still start.
async fn launch_groups(fleet: &Fleet, groups: &[GroupConfig]) {
    for group in groups {
        let spec = match StageGroupSpec::from_config(group).await {
            Ok(spec) => spec,
            Err(e) => {
                error!(group = %group.name, "Failed to load artifacts: {}", e);
                continue;
            }
        };

        if let Err(e) = fleet.launch(spec).await {
            error!(group = %group.name, "Failed to launch stage group: {}", e);
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C signal");
    }

    Ok(())
}
