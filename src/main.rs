use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use raftlet::{run_simulation, NodeConfig, RaftDaemon};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "raftlet")]
#[command(about = "Raft-style consensus node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run {
        #[arg(short, long, default_value = "raftlet.toml")]
        config: PathBuf,

        /// Listen port, overrides bind_port
        #[arg(long)]
        port: Option<u16>,

        /// Comma-separated cluster addresses; entry k gets node id k+1
        #[arg(long)]
        cluster: Option<String>,

        #[arg(long)]
        id: Option<u64>,
    },
    Init {
        #[arg(short, long, default_value = "raftlet.toml")]
        config: PathBuf,
    },
    /// Run an in-process cluster and print the final state of each node
    Simulate {
        #[arg(short, long, default_value = "3")]
        nodes: usize,

        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raftlet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            port,
            cluster,
            id,
        } => {
            run_node(config, port, cluster, id).await?;
        }
        Commands::Init { config } => {
            init_config(config)?;
        }
        Commands::Simulate { nodes, seconds } => {
            let statuses = run_simulation(nodes, Duration::from_secs(seconds)).await?;
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        }
    }

    Ok(())
}

async fn run_node(
    config_path: PathBuf,
    port: Option<u16>,
    cluster: Option<String>,
    id: Option<u64>,
) -> Result<()> {
    let mut config = if config_path.exists() {
        info!("Loading config from {:?}", config_path);
        NodeConfig::load(&config_path)?
    } else {
        info!("Config file not found, using defaults");
        NodeConfig::default()
    };

    if let Some(port) = port {
        config.bind_port = port;
    }
    if let Some(cluster) = cluster {
        config.set_cluster(&cluster);
    }
    if let Some(id) = id {
        config.node_id = id;
    }

    let daemon = Arc::new(RaftDaemon::new(config.clone())?);
    let router = daemon.router();

    let listener = TcpListener::bind(&config.listen_addr())
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", config.listen_addr()))?;
    info!("RPC server listening on {}", config.listen_addr());

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("RPC server error: {}", e);
        }
    });

    let daemon_clone = daemon.clone();
    let daemon_handle = tokio::spawn(async move {
        if let Err(e) = daemon_clone.run().await {
            error!("Daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    daemon.shutdown();

    let _ = tokio::time::timeout(Duration::from_secs(5), daemon_handle).await;
    server_handle.abort();

    Ok(())
}

fn init_config(config_path: PathBuf) -> Result<()> {
    if config_path.exists() {
        bail!("Config file already exists: {:?}", config_path);
    }

    let config = NodeConfig::default();
    config.save(&config_path)?;
    println!("Created config file: {:?}", config_path);
    println!("\nEdit the config file to:");
    println!("  - Set a unique node_id");
    println!("  - List every cluster member under [[peers]]");
    println!("  - Adjust election and heartbeat timing");

    Ok(())
}
