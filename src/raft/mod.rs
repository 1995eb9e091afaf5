pub mod node;
pub mod peer;
pub mod rpc;
pub mod state;
pub mod timer;

pub use node::{NodeStatus, RaftMessage, RaftNode};
pub use state::{RaftRole, RaftState};
