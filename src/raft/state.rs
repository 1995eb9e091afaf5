/// Raft node role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Candidate => write!(f, "candidate"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

/// The node's entire consensus state. Never persisted.
///
/// # Safety Invariants
///
/// ## Election Safety
/// At most one leader per term. Enforced by:
/// - `voted` is set for at most one candidate per term and cleared only when
///   the term advances
/// - A candidate needs a strict majority of the full cluster
/// - Any AppendEntries with a term at least ours demotes us to follower,
///   whatever our role
///
/// ## Commit Safety
/// `committed_value` is only ever assigned from an `uncommitted_value` the
/// leader held, after a strict majority acknowledged a heartbeat carrying it.
/// Followers copy both values verbatim from the leader.
#[derive(Debug)]
pub struct RaftState {
    pub current_term: u64,
    /// Whether this node has voted in `current_term`
    pub voted: bool,
    pub role: RaftRole,

    // Known leader (if any)
    pub leader_id: Option<u64>,

    pub committed_value: i64,
    pub uncommitted_value: i64,

    /// Fault injection: while set, the node answers every RPC with Unavailable
    pub suspended: bool,
}

impl RaftState {
    pub fn new() -> Self {
        Self {
            current_term: 0,
            voted: false,
            role: RaftRole::Follower,
            leader_id: None,
            committed_value: 0,
            uncommitted_value: 0,
            suspended: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == RaftRole::Leader
    }

    /// Move to `term` if it is newer; the vote flag belongs to the old term.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term > self.current_term {
            self.current_term = term;
            self.voted = false;
            true
        } else {
            false
        }
    }

    /// Transition to follower state
    pub fn become_follower(&mut self, term: u64) {
        self.role = RaftRole::Follower;
        self.observe_term(term);
    }

    /// Transition to candidate state, voting for ourselves
    pub fn become_candidate(&mut self) {
        self.role = RaftRole::Candidate;
        self.current_term += 1;
        self.leader_id = None;

        // The new term's only vote goes to ourselves. It is counted locally
        // by the election, never over RPC.
        self.voted = true;
    }

    /// Transition to leader state
    pub fn become_leader(&mut self, my_id: u64) {
        self.role = RaftRole::Leader;
        self.leader_id = Some(my_id);
    }

    /// Commit the value a majority acknowledged.
    pub fn commit(&mut self, value: i64) {
        self.committed_value = value;
    }
}

impl Default for RaftState {
    fn default() -> Self {
        Self::new()
    }
}

/// Strict majority of the full cluster.
pub fn is_quorum(acks: usize, cluster_size: usize) -> bool {
    acks * 2 > cluster_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_follower() {
        let state = RaftState::new();
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 0);
        assert!(!state.voted);
        assert_eq!(state.leader_id, None);
        assert_eq!(state.committed_value, 0);
        assert_eq!(state.uncommitted_value, 0);
        assert!(!state.suspended);
    }

    #[test]
    fn test_become_candidate() {
        let mut state = RaftState::new();
        state.leader_id = Some(2);
        state.become_candidate();

        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, 1);
        assert!(state.voted); // Self-vote
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_become_leader() {
        let mut state = RaftState::new();
        state.become_candidate();
        state.become_leader(1);

        assert_eq!(state.role, RaftRole::Leader);
        assert_eq!(state.leader_id, Some(1));
        assert!(state.is_leader());
    }

    #[test]
    fn test_become_follower() {
        let mut state = RaftState::new();
        state.become_candidate();
        state.become_follower(5);

        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 5);
        assert!(!state.voted);
    }

    #[test]
    fn test_become_follower_same_term_keeps_vote() {
        let mut state = RaftState::new();
        state.become_candidate();
        state.become_follower(1);

        assert_eq!(state.current_term, 1);
        assert!(state.voted);
    }

    #[test]
    fn test_observe_term_never_goes_backwards() {
        let mut state = RaftState::new();
        assert!(state.observe_term(3));
        state.voted = true;
        assert!(!state.observe_term(2));
        assert!(!state.observe_term(3));
        assert_eq!(state.current_term, 3);
        assert!(state.voted);
    }

    #[test]
    fn test_quorum_arithmetic() {
        assert!(is_quorum(1, 1));
        assert!(!is_quorum(1, 2));
        assert!(is_quorum(2, 2));
        assert!(!is_quorum(1, 3));
        assert!(is_quorum(2, 3));
        assert!(!is_quorum(2, 4));
        assert!(is_quorum(3, 4));
        assert!(is_quorum(3, 5));
    }

    #[test]
    fn test_state_transitions() {
        let mut state = RaftState::new();

        // Start as follower
        assert_eq!(state.role, RaftRole::Follower);

        // Become candidate (simulating election timeout)
        state.become_candidate();
        assert_eq!(state.role, RaftRole::Candidate);
        assert_eq!(state.current_term, 1);

        // Win election
        state.become_leader(1);
        assert_eq!(state.role, RaftRole::Leader);

        // Discover higher term
        state.become_follower(5);
        assert_eq!(state.role, RaftRole::Follower);
        assert_eq!(state.current_term, 5);
    }
}
