use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::proto::raft_node_server::RaftNode as RaftNodeService;
use crate::proto::{
    AddValueRequest, AddValueResponse, AppendEntriesRequest, AppendEntriesResponse,
    GetLeaderRequest, GetLeaderResponse, GetStatusRequest, GetStatusResponse, GetValueRequest,
    GetValueResponse, RequestVoteRequest, RequestVoteResponse, ResumeRequest, ResumeResponse,
    SuspendRequest, SuspendResponse,
};
use crate::raft::rpc::role_to_proto;
use crate::raft::RaftNode;

/// gRPC service exposing a node to its peers and to clients
pub struct ClusterService {
    raft_node: Arc<RaftNode>,
}

impl ClusterService {
    pub fn new(raft_node: Arc<RaftNode>) -> Self {
        Self { raft_node }
    }
}

#[tonic::async_trait]
impl RaftNodeService for ClusterService {
    async fn request_vote(
        &self,
        request: Request<RequestVoteRequest>,
    ) -> Result<Response<RequestVoteResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(
            candidate = req.candidate_id,
            term = req.candidate_term,
            "Received RequestVote"
        );

        let response = self.raft_node.handle_vote_request(req).await?;
        Ok(Response::new(response))
    }

    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req = request.into_inner();
        tracing::trace!(
            leader = req.leader_id,
            term = req.leader_term,
            committed = req.committed_value,
            uncommitted = req.uncommitted_value,
            "Received AppendEntries"
        );

        let response = self.raft_node.handle_append_entries(req).await?;
        Ok(Response::new(response))
    }

    async fn add_value(
        &self,
        request: Request<AddValueRequest>,
    ) -> Result<Response<AddValueResponse>, Status> {
        let req = request.into_inner();
        tracing::debug!(amount = req.amount, forwarded = req.forwarded, "Received AddValue");

        self.raft_node.add_value(req).await?;
        Ok(Response::new(AddValueResponse {}))
    }

    async fn get_value(
        &self,
        _request: Request<GetValueRequest>,
    ) -> Result<Response<GetValueResponse>, Status> {
        let value = self.raft_node.get_value().await?;
        Ok(Response::new(GetValueResponse { value }))
    }

    async fn get_leader(
        &self,
        _request: Request<GetLeaderRequest>,
    ) -> Result<Response<GetLeaderResponse>, Status> {
        let leader_id = self.raft_node.get_leader().await?;
        Ok(Response::new(GetLeaderResponse { leader_id }))
    }

    async fn get_status(
        &self,
        _request: Request<GetStatusRequest>,
    ) -> Result<Response<GetStatusResponse>, Status> {
        let status = self.raft_node.get_status().await?;
        Ok(Response::new(GetStatusResponse {
            node_id: status.node_id,
            term: status.term,
            role: role_to_proto(status.role) as i32,
            leader_id: status.leader_id,
            committed_value: status.committed_value,
            uncommitted_value: status.uncommitted_value,
            voted: status.voted,
        }))
    }

    async fn suspend(
        &self,
        _request: Request<SuspendRequest>,
    ) -> Result<Response<SuspendResponse>, Status> {
        self.raft_node.suspend().await;
        Ok(Response::new(SuspendResponse {}))
    }

    async fn resume(
        &self,
        _request: Request<ResumeRequest>,
    ) -> Result<Response<ResumeResponse>, Status> {
        self.raft_node.resume().await;
        Ok(Response::new(ResumeResponse {}))
    }
}
