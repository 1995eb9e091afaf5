use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::error::{RaftError, Result};
use crate::proto::{
    AddValueRequest, AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::raft::peer::PeerClients;
use crate::raft::rpc::{handle_append_entries, handle_request_vote, route_add_value, AddValueRoute};
use crate::raft::state::{is_quorum, RaftRole, RaftState};
use crate::raft::timer::{ElectionTimeout, Timer};

/// Message types for the Raft node event loop
#[derive(Debug)]
pub enum RaftMessage {
    /// Election timer fired
    ElectionTimeout { generation: u64 },
    /// Heartbeat timer fired (leader only)
    HeartbeatTick { generation: u64 },
    /// Start an election now, without waiting for the timer
    TriggerElection,
}

/// Point-in-time copy of a node's state record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: u64,
    pub term: u64,
    pub role: RaftRole,
    pub leader_id: Option<u64>,
    pub committed_value: i64,
    pub uncommitted_value: i64,
    pub voted: bool,
    pub suspended: bool,
}

/// The main Raft node that coordinates consensus.
///
/// Inbound RPCs lock the state directly. Timers post events into the loop
/// driven by [`RaftNode::run`], which handles them one at a time. No lock is
/// held while waiting on a peer.
pub struct RaftNode {
    pub id: u64,
    state: Mutex<RaftState>,
    config: NodeConfig,
    peers: Arc<PeerClients>,
    election_timeout: ElectionTimeout,
    election_timer: Timer<RaftMessage>,
    heartbeat_timer: Timer<RaftMessage>,
    message_tx: mpsc::Sender<RaftMessage>,
}

impl RaftNode {
    /// Build a node from `config`, which is validated first.
    ///
    /// # Errors
    ///
    /// Returns `RaftError::Config` if the node is not in its own cluster or
    /// the timing is unusable (empty or inverted election range, zero
    /// heartbeat interval).
    pub fn new(config: NodeConfig) -> Result<(Self, mpsc::Receiver<RaftMessage>)> {
        config.validate()?;
        let (message_tx, message_rx) = mpsc::channel(100);

        let node = Self {
            id: config.node_id,
            state: Mutex::new(RaftState::new()),
            peers: Arc::new(PeerClients::new(&config)),
            election_timeout: ElectionTimeout::new(
                config.node_id,
                config.election_timeout_min_ms,
                config.election_timeout_max_ms,
            ),
            election_timer: Timer::new("election", message_tx.clone()),
            heartbeat_timer: Timer::new("heartbeat", message_tx.clone()),
            config,
            message_tx,
        };

        Ok((node, message_rx))
    }

    /// Get the message sender for external communication
    pub fn message_sender(&self) -> mpsc::Sender<RaftMessage> {
        self.message_tx.clone()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The election timeout this node drew at startup
    pub fn election_timeout(&self) -> Duration {
        self.election_timeout.next()
    }

    /// Run the Raft node main loop until `shutdown` is cancelled
    pub async fn run(&self, mut message_rx: mpsc::Receiver<RaftMessage>, shutdown: CancellationToken) {
        tracing::info!(
            node_id = self.id,
            election_timeout_ms = self.election_timeout().as_millis() as u64,
            "Raft loop started"
        );
        {
            let state = self.state.lock().await;
            if !state.suspended && !state.is_leader() {
                self.arm_election_timer();
            }
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = self.id, "Raft loop shutting down");
                    break;
                }
                msg = message_rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        RaftMessage::ElectionTimeout { generation } => {
                            self.start_election(Some(generation)).await;
                        }
                        RaftMessage::HeartbeatTick { generation } => {
                            self.send_heartbeats(generation).await;
                        }
                        RaftMessage::TriggerElection => {
                            self.start_election(None).await;
                        }
                    }
                }
            }
        }

        self.election_timer.cancel();
        self.heartbeat_timer.cancel();
    }

    /// Start a new election.
    ///
    /// `generation` identifies the timer event that triggered it; a stale
    /// event (the timer was reset after it fired) is ignored.
    async fn start_election(&self, generation: Option<u64>) {
        let mut state = self.state.lock().await;
        if state.suspended || state.is_leader() {
            return;
        }
        if let Some(generation) = generation {
            if !self.election_timer.is_current(generation) {
                tracing::trace!(node_id = self.id, generation, "Ignoring stale election timeout");
                return;
            }
        }

        self.election_timer.cancel();
        state.become_candidate();
        let term = state.current_term;
        drop(state);

        tracing::info!(node_id = self.id, term, "Starting election");

        let req = RequestVoteRequest {
            candidate_id: self.id,
            candidate_term: term,
        };
        let responses = self
            .broadcast(move |peers, peer_id| {
                let req = req.clone();
                async move { peers.request_vote(peer_id, req).await }
            })
            .await;

        let mut vote_count = 1usize; // Vote for self
        let mut highest_term = term;
        for (peer_id, result) in responses {
            match result {
                Ok(resp) => {
                    highest_term = highest_term.max(resp.term);
                    if resp.vote_granted {
                        vote_count += 1;
                        tracing::debug!(
                            node_id = self.id,
                            peer_id,
                            votes = vote_count,
                            "Received vote"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(peer_id, error = %e, "Vote request failed, counting as abstention");
                }
            }
        }

        // Check if we won
        let mut state = self.state.lock().await;
        if state.suspended {
            return;
        }
        if highest_term > state.current_term {
            tracing::info!(node_id = self.id, term = highest_term, "Higher term seen, stepping down");
            state.become_follower(highest_term);
            self.arm_election_timer();
            return;
        }
        if state.role != RaftRole::Candidate || state.current_term != term {
            tracing::debug!(node_id = self.id, term, role = %state.role, "Election superseded");
            if !state.is_leader() {
                self.arm_election_timer();
            }
            return;
        }

        let cluster_size = self.config.cluster_size();
        if is_quorum(vote_count, cluster_size) {
            state.become_leader(self.id);
            tracing::info!(node_id = self.id, term, votes = vote_count, "Became leader");
            self.heartbeat_timer
                .arm_repeating(self.config.heartbeat_interval(), |generation| {
                    RaftMessage::HeartbeatTick { generation }
                });
        } else {
            state.role = RaftRole::Follower;
            tracing::debug!(
                node_id = self.id,
                term,
                votes = vote_count,
                cluster_size,
                "Election failed, not enough votes"
            );
            self.arm_election_timer();
        }
    }

    /// Send heartbeats to all followers (leader only) and commit on quorum
    async fn send_heartbeats(&self, generation: u64) {
        let state = self.state.lock().await;
        if state.suspended || !state.is_leader() || !self.heartbeat_timer.is_current(generation) {
            return;
        }

        let term = state.current_term;
        let req = AppendEntriesRequest {
            leader_id: self.id,
            leader_term: term,
            committed_value: state.committed_value,
            uncommitted_value: state.uncommitted_value,
        };
        drop(state);

        let round_value = req.uncommitted_value;
        let responses = self
            .broadcast(move |peers, peer_id| {
                let req = req.clone();
                async move { peers.append_entries(peer_id, req).await }
            })
            .await;

        let mut acks = 1usize; // Leader counts itself
        let mut highest_term = term;
        for (peer_id, result) in responses {
            match result {
                Ok(resp) => {
                    highest_term = highest_term.max(resp.term);
                    if resp.success {
                        acks += 1;
                    }
                }
                Err(e) => {
                    tracing::trace!(peer_id, error = %e, "AppendEntries failed");
                }
            }
        }

        let mut state = self.state.lock().await;
        if state.suspended {
            return;
        }
        if highest_term > state.current_term {
            tracing::info!(node_id = self.id, term = highest_term, "Higher term seen, stepping down");
            state.become_follower(highest_term);
            self.heartbeat_timer.cancel();
            self.arm_election_timer();
            return;
        }
        if !state.is_leader() || state.current_term != term {
            return;
        }

        if is_quorum(acks, self.config.cluster_size()) {
            if state.committed_value != round_value {
                tracing::debug!(
                    node_id = self.id,
                    term,
                    acks,
                    value = round_value,
                    "Committed value"
                );
            }
            state.commit(round_value);
        } else {
            tracing::trace!(node_id = self.id, term, acks, "Heartbeat round without quorum");
        }
    }

    /// Call every peer concurrently and collect the results.
    async fn broadcast<T, F, Fut>(&self, call: F) -> Vec<(u64, Result<T>)>
    where
        F: Fn(Arc<PeerClients>, u64) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut calls = JoinSet::new();
        for peer_id in self.peers.peer_ids() {
            let rpc = call(self.peers.clone(), peer_id);
            calls.spawn(async move { (peer_id, rpc.await) });
        }

        let mut results = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(error = %e, "Peer call task failed"),
            }
        }
        results
    }

    fn arm_election_timer(&self) {
        let timeout = self.election_timeout.next();
        self.election_timer
            .arm_once(timeout, |generation| RaftMessage::ElectionTimeout { generation });
    }

    /// Handle incoming RequestVote RPC
    pub async fn handle_vote_request(&self, req: RequestVoteRequest) -> Result<RequestVoteResponse> {
        let mut state = self.state.lock().await;
        handle_request_vote(&mut state, &req, self.id)
    }

    /// Handle incoming AppendEntries RPC
    pub async fn handle_append_entries(
        &self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        let mut state = self.state.lock().await;
        let response = handle_append_entries(&mut state, &req, self.id)?;

        // Valid leader: we are a follower now, whatever we were before
        if response.success {
            self.heartbeat_timer.cancel();
            self.arm_election_timer();
        }

        Ok(response)
    }

    /// Add `amount` to the replicated value, forwarding to the leader once if
    /// this node is not leading.
    pub async fn add_value(&self, req: AddValueRequest) -> Result<()> {
        let route = {
            let mut state = self.state.lock().await;
            route_add_value(&mut state, &req, self.id)?
        };

        match route {
            AddValueRoute::Applied => Ok(()),
            AddValueRoute::Forward(leader_id) => {
                tracing::debug!(node_id = self.id, leader_id, amount = req.amount, "Forwarding AddValue");
                let forwarded = AddValueRequest {
                    amount: req.amount,
                    forwarded: true,
                };
                self.peers
                    .add_value(leader_id, forwarded)
                    .await
                    .map_err(|e| {
                        tracing::warn!(node_id = self.id, leader_id, error = %e, "Forwarding AddValue failed");
                        e
                    })
            }
        }
    }

    /// Last quorum-confirmed value
    pub async fn get_value(&self) -> Result<i64> {
        let state = self.state.lock().await;
        if state.suspended {
            return Err(RaftError::Unavailable);
        }
        Ok(state.committed_value)
    }

    /// Get the current leader ID as this node knows it
    pub async fn get_leader(&self) -> Result<Option<u64>> {
        let state = self.state.lock().await;
        if state.suspended {
            return Err(RaftError::Unavailable);
        }
        Ok(state.leader_id)
    }

    pub async fn get_status(&self) -> Result<NodeStatus> {
        let status = self.status().await;
        if status.suspended {
            return Err(RaftError::Unavailable);
        }
        Ok(status)
    }

    /// Stop answering RPCs and freeze all timers until `resume`.
    pub async fn suspend(&self) {
        let mut state = self.state.lock().await;
        state.suspended = true;
        self.election_timer.cancel();
        self.heartbeat_timer.cancel();
        tracing::info!(node_id = self.id, term = state.current_term, role = %state.role, "Suspended");
    }

    /// Rejoin as a follower with a fresh election timer.
    pub async fn resume(&self) {
        let mut state = self.state.lock().await;
        state.suspended = false;
        state.role = RaftRole::Follower;
        self.heartbeat_timer.cancel();
        self.arm_election_timer();
        tracing::info!(node_id = self.id, term = state.current_term, "Resumed");
    }

    /// Snapshot of the state record, suspended or not
    pub async fn status(&self) -> NodeStatus {
        let state = self.state.lock().await;
        NodeStatus {
            node_id: self.id,
            term: state.current_term,
            role: state.role,
            leader_id: state.leader_id,
            committed_value: state.committed_value,
            uncommitted_value: state.uncommitted_value,
            voted: state.voted,
            suspended: state.suspended,
        }
    }

    /// Check if this node is the leader
    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.role == RaftRole::Leader
    }
}
