use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use raft_lite::config::{ClusterDirectory, NodeConfig};
use raft_lite::node::Node;
use raft_lite::proto::raft_node_client::RaftNodeClient;
use raft_lite::proto::{
    AddValueRequest, GetLeaderRequest, GetStatusRequest, GetValueRequest, ResumeRequest, Role,
    SuspendRequest,
};
use raft_lite::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "raft-lite")]
#[command(version)]
#[command(about = "A replicated counter with leader election and quorum commits")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a raft-lite server node
    Server(ServerArgs),

    /// Add an amount to the value (forwarded to the leader if needed)
    AddValue {
        #[command(flatten)]
        client: ClientArgs,

        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },

    /// Get the committed value
    GetValue {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Show which node this node believes is leader
    GetLeader {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Make the node unresponsive (fault injection)
    Suspend {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Bring a suspended node back as a follower
    Resume {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Show this node's term, role and values
    Status {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Node ID (must appear in the cluster file)
    #[arg(long)]
    node_id: u64,

    /// Cluster file, one `<id> <host:port>` per line
    #[arg(long, default_value = "config.conf")]
    cluster: PathBuf,

    /// Listen address (defaults to this node's address in the cluster file)
    #[arg(long)]
    listen: Option<SocketAddr>,

    #[arg(long, default_value = "2000")]
    election_timeout_min_ms: u64,

    #[arg(long, default_value = "4000")]
    election_timeout_max_ms: u64,

    #[arg(long, default_value = "400")]
    heartbeat_interval_ms: u64,

    /// Timeout for every call to a peer
    #[arg(long, default_value = "300")]
    rpc_timeout_ms: u64,
}

// =============================================================================
// Client Arguments (shared by every client command)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Node address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

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
struct AddedOutput {
    added: i64,
}

#[derive(Serialize)]
struct ValueOutput {
    value: i64,
}

#[derive(Serialize)]
struct NodeStateOutput {
    suspended: bool,
}

#[derive(Serialize)]
struct LeaderOutput {
    leader_id: Option<u64>,
}

#[derive(Serialize)]
struct StatusOutput {
    node_id: u64,
    term: u64,
    role: String,
    leader_id: Option<u64>,
    committed_value: i64,
    uncommitted_value: i64,
    voted: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn role_to_string(role: i32) -> String {
    match Role::try_from(role) {
        Ok(Role::Follower) => "FOLLOWER".to_string(),
        Ok(Role::Candidate) => "CANDIDATE".to_string(),
        Ok(Role::Leader) => "LEADER".to_string(),
        _ => "UNKNOWN".to_string(),
    }
}

fn leader_to_string(leader_id: Option<u64>) -> String {
    leader_id
        .map(|id| format!("Node {}", id))
        .unwrap_or_else(|| "unknown".to_string())
}

async fn connect(args: &ClientArgs) -> Result<RaftNodeClient<Channel>, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(args.addr.clone())?.connect().await?;
    Ok(RaftNodeClient::new(channel))
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cluster = ClusterDirectory::load(&args.cluster)?;
    let mut config = NodeConfig::from_cluster(args.node_id, cluster)?
        .with_election_timeout(args.election_timeout_min_ms, args.election_timeout_max_ms)
        .with_heartbeat_interval(args.heartbeat_interval_ms)
        .with_rpc_timeout(args.rpc_timeout_ms);
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    tracing::info!(
        node_id = config.node_id,
        listen_addr = %config.listen_addr,
        cluster_size = config.cluster_size(),
        peers = ?config.peers().map(|(id, addr)| format!("{}:{}", id, addr)).collect::<Vec<_>>(),
        "Starting raft-lite node"
    );

    let shutdown = install_shutdown_handler();
    let (node, raft_rx) = Node::new(config)?;
    node.run(raft_rx, shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn add_value(
    client: &mut RaftNodeClient<Channel>,
    amount: i64,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    client
        .add_value(AddValueRequest {
            amount,
            forwarded: false,
        })
        .await?;
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&AddedOutput { added: amount })?);
        }
        OutputFormat::Table => println!("Added {}", amount),
    }
    Ok(())
}

async fn get_value(
    client: &mut RaftNodeClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let value = client
        .get_value(GetValueRequest {})
        .await?
        .into_inner()
        .value;
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&ValueOutput { value })?);
        }
        OutputFormat::Table => println!("Value: {}", value),
    }
    Ok(())
}

async fn get_leader(
    client: &mut RaftNodeClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let leader_id = client
        .get_leader(GetLeaderRequest {})
        .await?
        .into_inner()
        .leader_id;
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&LeaderOutput { leader_id })?);
        }
        OutputFormat::Table => println!("Leader: {}", leader_to_string(leader_id)),
    }
    Ok(())
}

async fn set_suspended(
    client: &mut RaftNodeClient<Channel>,
    suspended: bool,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if suspended {
        client.suspend(SuspendRequest {}).await?;
    } else {
        client.resume(ResumeRequest {}).await?;
    }
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&NodeStateOutput { suspended })?);
        }
        OutputFormat::Table if suspended => println!("Node suspended"),
        OutputFormat::Table => println!("Node resumed"),
    }
    Ok(())
}

async fn status(
    client: &mut RaftNodeClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = client.get_status(GetStatusRequest {}).await?.into_inner();
    match output_format {
        OutputFormat::Json => {
            let output = StatusOutput {
                node_id: resp.node_id,
                term: resp.term,
                role: role_to_string(resp.role),
                leader_id: resp.leader_id,
                committed_value: resp.committed_value,
                uncommitted_value: resp.uncommitted_value,
                voted: resp.voted,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Node {}", resp.node_id);
            println!("{}", "=".repeat(30));
            println!("Term:        {}", resp.term);
            println!("Role:        {}", role_to_string(resp.role));
            println!("Leader:      {}", leader_to_string(resp.leader_id));
            println!("Committed:   {}", resp.committed_value);
            println!("Uncommitted: {}", resp.uncommitted_value);
            println!("Voted:       {}", resp.voted);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::AddValue { client, amount } => {
            add_value(&mut connect(&client).await?, amount, &client.output).await?;
        }
        Commands::GetValue { client } => {
            get_value(&mut connect(&client).await?, &client.output).await?;
        }
        Commands::GetLeader { client } => {
            get_leader(&mut connect(&client).await?, &client.output).await?;
        }
        Commands::Suspend { client } => {
            set_suspended(&mut connect(&client).await?, true, &client.output).await?;
        }
        Commands::Resume { client } => {
            set_suspended(&mut connect(&client).await?, false, &client.output).await?;
        }
        Commands::Status { client } => {
            status(&mut connect(&client).await?, &client.output).await?;
        }
    }

    Ok(())
}
