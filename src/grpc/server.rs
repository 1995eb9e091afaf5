use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::cluster_service::ClusterService;
use crate::proto::raft_node_server::RaftNodeServer;
use crate::raft::RaftNode;

pub struct GrpcServer {
    addr: SocketAddr,
    raft_node: Arc<RaftNode>,
    max_concurrent_rpcs: usize,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, raft_node: Arc<RaftNode>) -> Self {
        let max_concurrent_rpcs = raft_node.config().max_concurrent_rpcs;
        Self {
            addr,
            raft_node,
            max_concurrent_rpcs,
        }
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let cluster_service = ClusterService::new(self.raft_node.clone());

        tracing::info!(
            addr = %self.addr,
            max_concurrent_rpcs = self.max_concurrent_rpcs,
            "Starting gRPC server"
        );

        Server::builder()
            .concurrency_limit_per_connection(self.max_concurrent_rpcs)
            .add_service(RaftNodeServer::new(cluster_service))
            .serve_with_shutdown(self.addr, async move { shutdown.cancelled().await })
            .await
    }
}
