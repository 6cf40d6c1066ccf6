use anyhow::Result;
use clap::{Parser, Subcommand};
use raftlet::{LogEntry, NodeStatus};

#[derive(Parser)]
#[command(name = "raftctl")]
#[command(about = "Inspect a running raftlet node")]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:9091")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Role, term and log cursors of the node
    Status,
    /// Entries currently in the node's log
    Log {
        #[arg(short, long)]
        tail: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base_url = cli.addr.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let status: NodeStatus = client
                .get(format!("{}/status", base_url))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Log { tail } => {
            let entries: Vec<LogEntry> = client
                .get(format!("{}/log", base_url))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let skip = tail.map(|n| entries.len().saturating_sub(n)).unwrap_or(0);
            for entry in entries.iter().skip(skip) {
                println!(
                    "{:>6}  term={:<4} {}",
                    entry.index, entry.term, entry.command.payload
                );
            }
        }
    }

    Ok(())
}
