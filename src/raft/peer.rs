use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use crate::config::NodeConfig;
use crate::error::{RaftError, Result};
use crate::proto::raft_node_client::RaftNodeClient;
use crate::proto::{
    AddValueRequest, AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest,
    RequestVoteResponse,
};

/// Outbound RPCs to the other cluster members.
///
/// Channels are created lazily and cached, so a peer that is down at startup
/// costs nothing until it is called. Every call is bounded by the RPC timeout;
/// connection failures and timeouts come back as `RaftError::Unreachable`.
pub struct PeerClients {
    addrs: HashMap<u64, String>,
    clients: Mutex<HashMap<u64, RaftNodeClient<Channel>>>,
    rpc_timeout: Duration,
}

impl PeerClients {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            addrs: config
                .peers()
                .map(|(id, addr)| (id, addr.to_string()))
                .collect(),
            clients: Mutex::new(HashMap::new()),
            rpc_timeout: config.rpc_timeout(),
        }
    }

    pub fn peer_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.addrs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn request_vote(
        &self,
        peer_id: u64,
        req: RequestVoteRequest,
    ) -> Result<RequestVoteResponse> {
        let mut client = self.client(peer_id).await?;
        self.call(peer_id, async move { client.request_vote(req).await })
            .await
    }

    pub async fn append_entries(
        &self,
        peer_id: u64,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let mut client = self.client(peer_id).await?;
        self.call(peer_id, async move { client.append_entries(req).await })
            .await
    }

    pub async fn add_value(&self, peer_id: u64, req: AddValueRequest) -> Result<()> {
        let mut client = self.client(peer_id).await?;
        self.call(peer_id, async move { client.add_value(req).await })
            .await
            .map(|_| ())
    }

    /// Get or create a cached client for a peer
    async fn client(&self, peer_id: u64) -> Result<RaftNodeClient<Channel>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&peer_id) {
            return Ok(client.clone());
        }

        let addr = self
            .addrs
            .get(&peer_id)
            .ok_or(RaftError::UnknownPeer(peer_id))?;
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|e| RaftError::Unreachable {
                peer: peer_id,
                reason: format!("invalid endpoint {}: {}", addr, e),
            })?
            .connect_timeout(self.rpc_timeout);

        let client = RaftNodeClient::new(endpoint.connect_lazy());
        clients.insert(peer_id, client.clone());
        Ok(client)
    }

    async fn call<T, F>(&self, peer_id: u64, rpc: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        match timeout(self.rpc_timeout, rpc).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(classify_status(peer_id, status)),
            Err(_) => Err(RaftError::Unreachable {
                peer: peer_id,
                reason: format!("timed out after {}ms", self.rpc_timeout.as_millis()),
            }),
        }
    }
}

/// Connection-level failures (and a suspended peer) are unreachability;
/// anything else is the peer's own answer and is passed through.
fn classify_status(peer_id: u64, status: tonic::Status) -> RaftError {
    match status.code() {
        Code::Unavailable | Code::Unknown | Code::DeadlineExceeded | Code::Cancelled => {
            RaftError::Unreachable {
                peer: peer_id,
                reason: status.message().to_string(),
            }
        }
        _ => RaftError::Grpc(status),
    }
}
