use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading the cluster file or validating a node config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read cluster file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line_no}: expected `<id> <host:port>`, got {line:?}")]
    InvalidLine { line_no: usize, line: String },

    #[error("Line {line_no}: invalid node id {value:?}")]
    InvalidNodeId { line_no: usize, value: String },

    #[error("Node {0} is listed more than once")]
    DuplicateNode(u64),

    #[error("Node {0} is not a member of the cluster")]
    NodeNotInCluster(u64),

    #[error("Invalid listen address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error(
        "Invalid timing: election timeout {min_ms}..={max_ms}ms, heartbeat {heartbeat_ms}ms"
    )]
    InvalidTiming {
        min_ms: u64,
        max_ms: u64,
        heartbeat_ms: u64,
    },
}

/// Static cluster membership: node id to `host:port`.
///
/// Loaded once before the node starts serving and never mutated afterwards.
/// The local node is a member like any other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDirectory {
    members: BTreeMap<u64, String>,
}

impl ClusterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the cluster file format: one `<id> <host:port>` pair per line.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut members = BTreeMap::new();

        for (idx, raw) in contents.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (id, addr) = match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(addr), None) => (id, addr),
                _ => {
                    return Err(ConfigError::InvalidLine {
                        line_no,
                        line: line.to_string(),
                    })
                }
            };

            let node_id: u64 = id.parse().map_err(|_| ConfigError::InvalidNodeId {
                line_no,
                value: id.to_string(),
            })?;

            if members.insert(node_id, addr.to_string()).is_some() {
                return Err(ConfigError::DuplicateNode(node_id));
            }
        }

        Ok(Self { members })
    }

    /// Read and parse a cluster file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn with_member(mut self, node_id: u64, addr: impl Into<String>) -> Self {
        self.members.insert(node_id, addr.into());
        self
    }

    pub fn addr(&self, node_id: u64) -> Option<&str> {
        self.members.get(&node_id).map(String::as_str)
    }

    pub fn contains(&self, node_id: u64) -> bool {
        self.members.contains_key(&node_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.members.iter().map(|(id, addr)| (*id, addr.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u64,
    pub listen_addr: SocketAddr,
    pub cluster: ClusterDirectory,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound on every outbound RPC
    pub rpc_timeout_ms: u64,
    /// Inbound RPCs handled concurrently per connection
    pub max_concurrent_rpcs: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        // SAFETY: This is a hardcoded valid address that will always parse
        let listen_addr: SocketAddr = "127.0.0.1:50051"
            .parse()
            .expect("default listen address is valid");
        Self {
            node_id: 1,
            listen_addr,
            cluster: ClusterDirectory::new().with_member(1, listen_addr.to_string()),
            election_timeout_min_ms: 2000,
            election_timeout_max_ms: 4000,
            heartbeat_interval_ms: 400,
            rpc_timeout_ms: 300,
            max_concurrent_rpcs: 10,
        }
    }
}

impl NodeConfig {
    /// Single-member config; add the rest of the cluster with `with_peer`.
    pub fn new(node_id: u64, listen_addr: SocketAddr) -> Self {
        Self {
            node_id,
            listen_addr,
            cluster: ClusterDirectory::new().with_member(node_id, listen_addr.to_string()),
            ..Default::default()
        }
    }

    /// Build a config for `node_id` from a loaded directory, listening on
    /// the node's own directory address.
    pub fn from_cluster(node_id: u64, cluster: ClusterDirectory) -> Result<Self, ConfigError> {
        let addr = cluster
            .addr(node_id)
            .ok_or(ConfigError::NodeNotInCluster(node_id))?;
        let listen_addr = addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            node_id,
            listen_addr,
            cluster,
            ..Default::default()
        })
    }

    pub fn with_peer(mut self, node_id: u64, addr: String) -> Self {
        self.cluster = self.cluster.with_member(node_id, addr);
        self
    }

    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min_ms = min_ms;
        self.election_timeout_max_ms = max_ms;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout_ms: u64) -> Self {
        self.rpc_timeout_ms = timeout_ms;
        self
    }

    /// Check membership and that heartbeats are faster than elections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cluster.contains(self.node_id) {
            return Err(ConfigError::NodeNotInCluster(self.node_id));
        }
        if self.election_timeout_min_ms > self.election_timeout_max_ms
            || self.heartbeat_interval_ms == 0
            || self.heartbeat_interval_ms >= self.election_timeout_min_ms
        {
            return Err(ConfigError::InvalidTiming {
                min_ms: self.election_timeout_min_ms,
                max_ms: self.election_timeout_max_ms,
                heartbeat_ms: self.heartbeat_interval_ms,
            });
        }
        Ok(())
    }

    /// Every member except this node.
    pub fn peers(&self) -> impl Iterator<Item = (u64, &str)> {
        let me = self.node_id;
        self.cluster.iter().filter(move |(id, _)| *id != me)
    }

    /// Size of the full cluster, this node included.
    pub fn cluster_size(&self) -> usize {
        self.cluster.len()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_cluster_file() {
        let dir = ClusterDirectory::parse(
            "1 127.0.0.1:5000\n2 127.0.0.1:5001\n\n# spare\n3   10.0.0.3:5002\n",
        )
        .unwrap();
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.addr(1), Some("127.0.0.1:5000"));
        assert_eq!(dir.addr(3), Some("10.0.0.3:5002"));
        assert_eq!(dir.addr(4), None);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(matches!(
            ClusterDirectory::parse("1"),
            Err(ConfigError::InvalidLine { line_no: 1, .. })
        ));
        assert!(matches!(
            ClusterDirectory::parse("1 a:1\n2 b:2 extra"),
            Err(ConfigError::InvalidLine { line_no: 2, .. })
        ));
        assert!(matches!(
            ClusterDirectory::parse("one 127.0.0.1:5000"),
            Err(ConfigError::InvalidNodeId { line_no: 1, .. })
        ));
    }

    #[test]
    fn parse_rejects_duplicate_ids() {
        let err = ClusterDirectory::parse("1 a:1\n1 b:2").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateNode(1)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1 127.0.0.1:5000").unwrap();
        writeln!(file, "2 127.0.0.1:5001").unwrap();

        let dir = ClusterDirectory::load(file.path()).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.addr(2), Some("127.0.0.1:5001"));
    }

    #[test]
    fn load_missing_file() {
        let err = ClusterDirectory::load("/definitely/not/here.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.node_id, 1);
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:50051");
        assert_eq!(cfg.cluster_size(), 1);
        assert_eq!(cfg.election_timeout_min_ms, 2000);
        assert_eq!(cfg.election_timeout_max_ms, 4000);
        assert_eq!(cfg.heartbeat_interval_ms, 400);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn node_config_with_peer() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        let cfg = NodeConfig::new(1, addr)
            .with_peer(2, "127.0.0.1:50052".to_string())
            .with_peer(3, "127.0.0.1:50053".to_string());
        assert_eq!(cfg.cluster_size(), 3);
        assert_eq!(
            cfg.peers().collect::<Vec<_>>(),
            vec![(2, "127.0.0.1:50052"), (3, "127.0.0.1:50053")]
        );
    }

    #[test]
    fn from_cluster_uses_own_address() {
        let dir = ClusterDirectory::parse("1 127.0.0.1:5000\n2 127.0.0.1:5001").unwrap();
        let cfg = NodeConfig::from_cluster(2, dir.clone()).unwrap();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:5001");
        assert_eq!(cfg.peers().collect::<Vec<_>>(), vec![(1, "127.0.0.1:5000")]);

        assert!(matches!(
            NodeConfig::from_cluster(7, dir),
            Err(ConfigError::NodeNotInCluster(7))
        ));
    }

    #[test]
    fn from_cluster_rejects_hostnames_for_listen_addr() {
        let dir = ClusterDirectory::parse("1 node-one:5000").unwrap();
        assert!(matches!(
            NodeConfig::from_cluster(1, dir),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn validate_rejects_slow_heartbeat() {
        let cfg = NodeConfig::default()
            .with_election_timeout(100, 200)
            .with_heartbeat_interval(150);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTiming { .. })
        ));

        let cfg = NodeConfig::default().with_election_timeout(300, 200);
        assert!(cfg.validate().is_err());
    }
}
