use crate::error::{RaftError, Result};
use crate::proto::{
    AddValueRequest, AppendEntriesRequest, AppendEntriesResponse, RequestVoteRequest,
    RequestVoteResponse, Role as ProtoRole,
};
use crate::raft::state::{RaftRole, RaftState};

/// Where an AddValue request ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddValueRoute {
    /// Added to this leader's uncommitted value
    Applied,
    /// Relay once to this leader
    Forward(u64),
}

/// Handle RequestVote RPC
///
/// Grants iff we are not leading, have not voted in the candidate's term, and
/// the candidate's term is newer than ours (or the candidate is ourselves in
/// our current term). A grant does not touch the election timer.
pub fn handle_request_vote(
    state: &mut RaftState,
    req: &RequestVoteRequest,
    my_id: u64,
) -> Result<RequestVoteResponse> {
    if state.suspended {
        return Err(RaftError::Unavailable);
    }

    let newer_term = req.candidate_term > state.current_term;
    // Our vote flag only covers our current term
    let voted_in_candidate_term = state.voted && !newer_term;
    let is_self = req.candidate_id == my_id && req.candidate_term == state.current_term;

    let vote_granted =
        state.role != RaftRole::Leader && !voted_in_candidate_term && (newer_term || is_self);

    if vote_granted {
        state.observe_term(req.candidate_term);
        state.voted = true;
        if req.candidate_id != my_id && state.role == RaftRole::Candidate {
            state.role = RaftRole::Follower;
        }
    } else if req.candidate_term < state.current_term {
        let err = RaftError::StaleTerm {
            request: req.candidate_term,
            current: state.current_term,
        };
        tracing::debug!(node_id = my_id, candidate = req.candidate_id, error = %err, "Rejecting vote");
    }

    tracing::debug!(
        node_id = my_id,
        candidate = req.candidate_id,
        term = req.candidate_term,
        granted = vote_granted,
        "RequestVote response"
    );

    Ok(RequestVoteResponse {
        term: state.current_term,
        vote_granted,
    })
}

/// Handle AppendEntries RPC
///
/// A heartbeat from a leader whose term is at least ours always wins: we
/// become follower whatever our role, adopt its term and leader id, and
/// overwrite both values. The caller resets the election timer on success.
pub fn handle_append_entries(
    state: &mut RaftState,
    req: &AppendEntriesRequest,
    my_id: u64,
) -> Result<AppendEntriesResponse> {
    if state.suspended {
        return Err(RaftError::Unavailable);
    }

    if req.leader_term < state.current_term {
        let err = RaftError::StaleTerm {
            request: req.leader_term,
            current: state.current_term,
        };
        tracing::debug!(node_id = my_id, leader = req.leader_id, error = %err, "Rejecting AppendEntries");
        return Ok(AppendEntriesResponse {
            term: state.current_term,
            success: false,
        });
    }

    if state.role != RaftRole::Follower {
        tracing::info!(
            node_id = my_id,
            role = %state.role,
            leader = req.leader_id,
            term = req.leader_term,
            "Stepping down, found active leader"
        );
    }
    state.become_follower(req.leader_term);
    state.leader_id = Some(req.leader_id);
    state.committed_value = req.committed_value;
    state.uncommitted_value = req.uncommitted_value;

    Ok(AppendEntriesResponse {
        term: state.current_term,
        success: true,
    })
}

/// Decide what to do with an AddValue request.
///
/// A leader applies it at once. A follower forwards it to its known leader,
/// but only if it has not already been forwarded.
pub fn route_add_value(
    state: &mut RaftState,
    req: &AddValueRequest,
    my_id: u64,
) -> Result<AddValueRoute> {
    if state.suspended {
        return Err(RaftError::Unavailable);
    }

    if state.is_leader() {
        state.uncommitted_value = state
            .uncommitted_value
            .checked_add(req.amount)
            .ok_or(RaftError::ValueOverflow {
                current: state.uncommitted_value,
                amount: req.amount,
            })?;
        tracing::debug!(
            node_id = my_id,
            amount = req.amount,
            uncommitted = state.uncommitted_value,
            "Added value"
        );
        return Ok(AddValueRoute::Applied);
    }

    if req.forwarded {
        return Err(RaftError::NotLeader(state.leader_id));
    }

    match state.leader_id {
        Some(leader_id) if leader_id != my_id => Ok(AddValueRoute::Forward(leader_id)),
        _ => Err(RaftError::UnknownLeader),
    }
}

pub fn role_to_proto(role: RaftRole) -> ProtoRole {
    match role {
        RaftRole::Follower => ProtoRole::Follower,
        RaftRole::Candidate => ProtoRole::Candidate,
        RaftRole::Leader => ProtoRole::Leader,
    }
}
