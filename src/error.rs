use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("Node is suspended")]
    Unavailable,

    #[error("Stale term {request}, current term is {current}")]
    StaleTerm { request: u64, current: u64 },

    #[error("Peer {peer} unreachable: {reason}")]
    Unreachable { peer: u64, reason: String },

    #[error("No known leader to forward to")]
    UnknownLeader,

    #[error("Not the leader, current leader is node {0:?}")]
    NotLeader(Option<u64>),

    #[error("Unknown peer: {0}")]
    UnknownPeer(u64),

    #[error("Adding {amount} to {current} overflows the value")]
    ValueOverflow { current: i64, amount: i64 },

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl From<RaftError> for tonic::Status {
    fn from(err: RaftError) -> Self {
        match err {
            RaftError::Unavailable | RaftError::Unreachable { .. } => {
                tonic::Status::unavailable(err.to_string())
            }
            RaftError::UnknownLeader | RaftError::NotLeader(_) => {
                tonic::Status::failed_precondition(err.to_string())
            }
            RaftError::StaleTerm { .. } => tonic::Status::aborted(err.to_string()),
            RaftError::Grpc(status) => status,
            RaftError::UnknownPeer(_) => tonic::Status::not_found(err.to_string()),
            RaftError::ValueOverflow { .. } => tonic::Status::invalid_argument(err.to_string()),
            RaftError::Config(_) | RaftError::Transport(_) => {
                tonic::Status::internal(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RaftError>;
