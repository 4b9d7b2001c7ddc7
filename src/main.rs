use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use seqstore::config::{
    DEFAULT_ATTEMPTS, DEFAULT_ATTEMPT_INTERVAL, DEFAULT_DEADLINE, DEFAULT_MAX_REDIRECTS,
};
use seqstore::{join_cluster, JoinConfig, JoinRequest, Joined};

#[derive(Parser, Debug)]
#[command(name = "seqstore")]
#[command(version)]
#[command(about = "Sequence store node tooling")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Join this node to an existing cluster through its seed nodes
    Join(JoinArgs),
}

// =============================================================================
// Join Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct JoinArgs {
    /// Seed node addresses, tried in order (comma-separated, format: "host:port")
    /// Example: "10.0.0.1:50051,10.0.0.2:50051"
    #[arg(long, value_delimiter = ',', required = true)]
    join_addr: Vec<String>,

    /// Raft address this node advertises to the cluster
    #[arg(long)]
    raft_addr: String,

    /// Node ID (defaults to a random UUID)
    #[arg(long)]
    node_id: Option<String>,

    /// Node metadata as key=value, may be repeated
    #[arg(long = "meta", value_parser = parse_key_val)]
    metadata: Vec<(String, String)>,

    /// Passes over the seed list before giving up
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS)]
    attempts: u32,

    /// Pause between passes, in milliseconds
    #[arg(long, default_value_t = DEFAULT_ATTEMPT_INTERVAL.as_millis() as u64)]
    attempt_interval_ms: u64,

    /// Time budget for the whole join, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DEADLINE.as_millis() as u64)]
    deadline_ms: u64,

    /// Leader redirects followed from a single seed
    #[arg(long, default_value_t = DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JoinOutput {
    node_id: String,
    raft_addr: String,
    seed: String,
    leader: String,
    round: u32,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("invalid metadata {:?}, expected key=value", s)),
    }
}

fn print_joined(
    request: &JoinRequest,
    joined: Joined,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output_format {
        OutputFormat::Json => {
            let output = JoinOutput {
                node_id: request.node_id().to_string(),
                raft_addr: request.raft_addr().to_string(),
                seed: joined.seed,
                leader: joined.leader,
                round: joined.round,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Joined cluster successfully!");
            println!("Node ID: {}", request.node_id());
            println!("Leader:  {}", joined.leader);
            if joined.seed != joined.leader {
                println!("Via:     {}", joined.seed);
            }
        }
    }
    Ok(())
}

// =============================================================================
// Join Implementation
// =============================================================================

async fn run_join(args: JoinArgs) -> Result<(), Box<dyn std::error::Error>> {
    let node_id = args
        .node_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = args
        .metadata
        .into_iter()
        .fold(JoinRequest::new(args.raft_addr, node_id), |req, (k, v)| {
            req.with_metadata(k, v)
        });

    let config = JoinConfig::new(args.join_addr)
        .with_attempts(args.attempts)
        .with_attempt_interval(Duration::from_millis(args.attempt_interval_ms))
        .with_deadline(Duration::from_millis(args.deadline_ms))
        .with_max_redirects(args.max_redirects);

    tracing::info!(
        node_id = request.node_id(),
        raft_addr = request.raft_addr(),
        join_addrs = ?config.join_addrs,
        attempts = config.attempts,
        "Joining cluster"
    );

    // Exits the process if no seed leads to the leader
    let joined = join_cluster(&config, request.clone()).await;
    print_joined(&request, joined, &args.output)
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Join(join_args) => {
            run_join(join_args).await?;
        }
    }

    Ok(())
}
