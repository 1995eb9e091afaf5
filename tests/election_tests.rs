//! Leader election tests.
//!
//! Cover the basic three-node election, term and vote bookkeeping, and
//! election safety under free-running timers.


use std::time::Duration;
use test_harness::{assert_eventually, test_node_config, wait_for, TestCluster, Timing};

use raft_lite::proto::RequestVoteRequest;
use raft_lite::raft::RaftRole;

/// Node 1 times out first in a fresh cluster and wins term 1
#[tokio::test]
async fn test_first_timeout_wins_term_one() {
    let mut cluster = TestCluster::with_timing(3, 51100, Timing::manual_elections()).await;

    for node in cluster.nodes.values() {
        let status = node.status().await;
        assert_eq!(status.role, RaftRole::Follower);
        assert_eq!(status.term, 0);
    }

    cluster.trigger_election(1).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(2))
        .await
        .expect("Node 1 should win the election");
    assert_eq!(leader, 1);

    let status = cluster.get_node(1).unwrap().status().await;
    assert_eq!(status.term, 1);
    assert_eq!(status.leader_id, Some(1));

    // Followers learn about the leader from its first heartbeat
    assert_eventually(
        || async {
            for id in [2, 3] {
                let status = cluster.get_node(id).unwrap().status().await;
                if status.leader_id != Some(1) || status.term != 1 {
                    return false;
                }
            }
            true
        },
        Duration::from_secs(2),
        "Followers should adopt leader 1 in term 1",
    )
    .await;

    for id in [2, 3] {
        let status = cluster.get_node(id).unwrap().status().await;
        assert_eq!(status.role, RaftRole::Follower);
        assert!(status.voted, "Node {} granted its vote in term 1", id);
    }

    cluster.shutdown().await;
}

/// A node that cannot reach a majority never becomes leader
#[tokio::test]
async fn test_no_leader_without_majority() {
    let mut cluster = TestCluster::with_timing(3, 51110, Timing::manual_elections()).await;

    // Take both peers away from node 1
    cluster.shutdown_node(2);
    cluster.shutdown_node(3);

    cluster.trigger_election(1).await;

    let node = cluster.get_node(1).unwrap();
    assert_eventually(
        || async { node.status().await.term == 1 && node.status().await.role == RaftRole::Follower },
        Duration::from_secs(2),
        "Lost election should fall back to follower in term 1",
    )
    .await;

    assert!(!node.is_leader().await);
    assert_eq!(node.status().await.leader_id, None);

    cluster.shutdown().await;
}

/// Two candidates in the same term cannot both win
#[tokio::test]
async fn test_competing_candidates_same_term() {
    let mut cluster = TestCluster::with_timing(3, 51120, Timing::manual_elections()).await;

    cluster.trigger_election(1).await;
    cluster.trigger_election(2).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(2))
        .await;

    // A split vote is allowed, two leaders in one term are not
    let leaders = cluster.leaders_by_term().await;
    for (term, ids) in &leaders {
        assert!(ids.len() <= 1, "Term {} has leaders {:?}", term, ids);
    }
    if let Some(leader) = leader {
        assert!(leader == 1 || leader == 2);
    }

    cluster.shutdown().await;
}

/// With free-running timers a leader emerges and stays unique
#[tokio::test]
async fn test_single_leader_with_random_timeouts() {
    let mut cluster = TestCluster::new(5, 51130).await;

    cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("A leader should be elected");

    // Sample repeatedly while heartbeats flow
    for _ in 0..20 {
        let leaders = cluster.leaders_by_term().await;
        for (term, ids) in &leaders {
            assert_eq!(ids.len(), 1, "Term {} has leaders {:?}", term, ids);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    cluster.shutdown().await;
}

/// A stable leader keeps its term while heartbeats flow
#[tokio::test]
async fn test_heartbeats_suppress_elections() {
    let mut cluster = TestCluster::new(3, 51140).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("A leader should be elected");
    let term = cluster.get_node(leader).unwrap().current_term().await;

    // Several election timeouts' worth of time
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(cluster.wait_for_leader(Duration::from_secs(1)).await, Some(leader));
    for node in cluster.nodes.values() {
        assert_eq!(node.current_term().await, term);
    }

    cluster.shutdown().await;
}

/// A single-node cluster is its own majority
#[tokio::test]
async fn test_single_node_cluster_elects_itself() {
    let mut cluster = TestCluster::new(1, 51150).await;

    let leader = cluster
        .wait_for_leader(Duration::from_secs(2))
        .await
        .expect("Lone node should elect itself");
    assert_eq!(leader, 1);

    cluster.shutdown().await;
}

/// A suspended follower never times out, however long nobody leads
#[tokio::test]
async fn test_suspended_follower_timer_frozen() {
    let ports = [(1, 51160), (2, 51161), (3, 51162)];
    let node = TestCluster::start_node(test_node_config(1, &ports, Timing::fast()));

    node.raft_node.suspend().await;

    // Several election timeouts with no leader anywhere
    tokio::time::sleep(Duration::from_millis(1000)).await;

    let status = node.status().await;
    assert!(status.suspended);
    assert_eq!(status.term, 0);
    assert_eq!(status.role, RaftRole::Follower);

    // The timer runs again after resume
    node.raft_node.resume().await;
    assert_eventually(
        || async { node.current_term().await >= 1 },
        Duration::from_secs(2),
        "Resumed follower should time out and start an election",
    )
    .await;
}

/// Granting a vote leaves the election timer on its original schedule
#[tokio::test]
async fn test_vote_grant_does_not_reset_election_timer() {
    let ports = [(1, 51170), (2, 51171), (3, 51172)];
    let node = TestCluster::start_node(test_node_config(1, &ports, Timing::fast()));
    let start = tokio::time::Instant::now();
    let timeout = node.raft_node.election_timeout();

    tokio::time::sleep_until(start + timeout * 2 / 3).await;
    let resp = node
        .raft_node
        .handle_vote_request(RequestVoteRequest {
            candidate_id: 2,
            candidate_term: 5,
        })
        .await
        .unwrap();
    assert!(resp.vote_granted);
    assert_eq!(node.current_term().await, 5);

    // A reset timer would fire no earlier than start + timeout * 5/3
    let deadline = start + timeout + Duration::from_millis(50);
    let fired = wait_for(
        || async { node.current_term().await == 6 },
        deadline.saturating_duration_since(tokio::time::Instant::now()),
        Duration::from_millis(5),
    )
    .await;
    assert!(fired, "Election should start at the original timeout ({:?})", timeout);
}
