use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::raft::{RaftMessage, RaftNode};

/// A cluster member: the consensus core plus the gRPC server in front of it
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
}

impl Node {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(config: NodeConfig) -> Result<(Self, mpsc::Receiver<RaftMessage>)> {
        let (raft_node, raft_rx) = RaftNode::new(config.clone())?;

        let node = Self {
            config,
            raft_node: Arc::new(raft_node),
        };

        Ok((node, raft_rx))
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// Spawns the Raft event loop (election timeouts, heartbeats) and then
    /// serves gRPC on the configured address. If the server stops on its own,
    /// the event loop is stopped with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to bind or serve.
    pub async fn run(
        self,
        raft_rx: mpsc::Receiver<RaftMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let raft_node = self.raft_node.clone();
        let raft_shutdown = shutdown.clone();
        let raft_handle = tokio::spawn(async move {
            raft_node.run(raft_rx, raft_shutdown).await;
        });

        let server = GrpcServer::new(self.config.listen_addr, self.raft_node.clone());
        let result = server.run(shutdown.clone()).await;

        shutdown.cancel();
        if let Err(e) = raft_handle.await {
            tracing::warn!(error = %e, "Raft loop ended abnormally");
        }

        result.map_err(Into::into)
    }
}
