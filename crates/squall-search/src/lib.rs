//! # Squall Search
//!
//! Federated shard search orchestration:
//! - Shard map builder grouping candidate shards by owning node
//! - Result sink with monotonic completion and per-node errors
//! - Per-node executors: local in-process and remote via the
//!   start/poll/destroy protocol
//! - Shard search worker pool with a shared pull queue
//! - Task registry with a cluster-wide termination cascade

pub mod coordinator;
pub mod local;
pub mod registry;
pub mod remote;
pub mod shard_map;
pub mod sink;
pub mod task;
pub mod workers;

use std::collections::{HashMap, HashSet};

use squall_common::prelude::*;

// Re-exports from coordinator
pub use coordinator::{NodeExecution, SearchCoordinator};

// Re-exports from local
pub use local::LocalNodeExecutor;

// Re-exports from registry
pub use registry::{TaskHandle, TaskRegistry, TerminationBroadcaster};

// Re-exports from remote
pub use remote::{
    HttpRemoteTransport, InProcessTransport, RemoteNodeSearch, RemoteSearchHandle,
    RemoteSearchManager, RemoteSearchTransport,
};

// Re-exports from shard_map
pub use shard_map::{build_shard_assignment, ShardAssignment};

// Re-exports from sink
pub use sink::{Payload, PayloadMap, PollSnapshot, ResultSink};

// Re-exports from task
pub use task::{ClusterSearchTask, SearchTask};

// Re-exports from workers
pub use workers::ShardWorkerPool;

/// Node enablement registry consumed by the coordinator.
pub trait NodeRegistry: Send + Sync {
    /// This node's identity; shard slices for it run locally.
    fn source_node(&self) -> NodeName;

    /// Nodes currently enabled and reachable as search targets.
    fn enabled_nodes(&self) -> HashSet<NodeName>;

    /// Base URL of a node's remote search endpoint.
    fn endpoint(&self, node: &NodeName) -> Option<String>;
}

/// Node registry backed by static configuration.
pub struct StaticNodeRegistry {
    source: NodeName,
    peers: HashMap<NodeName, String>,
    disabled: HashSet<NodeName>,
}

impl StaticNodeRegistry {
    pub fn new(source: NodeName) -> Self {
        StaticNodeRegistry {
            source,
            peers: HashMap::new(),
            disabled: HashSet::new(),
        }
    }

    pub fn with_peer(mut self, node: NodeName, endpoint: impl Into<String>) -> Self {
        self.peers.insert(node, endpoint.into());
        self
    }

    /// Mark a node disabled without removing its endpoint registration.
    pub fn with_disabled(mut self, node: NodeName) -> Self {
        self.disabled.insert(node);
        self
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let mut registry = StaticNodeRegistry::new(NodeName::new(config.node_name.clone()));
        for (name, endpoint) in &config.peers {
            registry = registry.with_peer(NodeName::new(name.clone()), endpoint.clone());
        }
        registry
    }
}

impl NodeRegistry for StaticNodeRegistry {
    fn source_node(&self) -> NodeName {
        self.source.clone()
    }

    fn enabled_nodes(&self) -> HashSet<NodeName> {
        let mut nodes: HashSet<NodeName> = self.peers.keys().cloned().collect();
        nodes.insert(self.source.clone());
        nodes.retain(|n| !self.disabled.contains(n));
        nodes
    }

    fn endpoint(&self, node: &NodeName) -> Option<String> {
        self.peers.get(node).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_registry_enabled_set() {
        let registry = StaticNodeRegistry::new(NodeName::new("node1"))
            .with_peer(NodeName::new("node2"), "http://node2:8080")
            .with_peer(NodeName::new("node3"), "http://node3:8080")
            .with_disabled(NodeName::new("node3"));

        let enabled = registry.enabled_nodes();
        assert!(enabled.contains(&NodeName::new("node1")));
        assert!(enabled.contains(&NodeName::new("node2")));
        assert!(!enabled.contains(&NodeName::new("node3")));
        assert_eq!(
            registry.endpoint(&NodeName::new("node2")).as_deref(),
            Some("http://node2:8080")
        );
    }

    #[test]
    fn test_static_registry_from_config() {
        let mut config = ServerConfig::default();
        config.node_name = "node1".to_string();
        config
            .peers
            .insert("node2".to_string(), "http://node2:8080".to_string());

        let registry = StaticNodeRegistry::from_config(&config);
        assert_eq!(registry.source_node(), NodeName::new("node1"));
        assert_eq!(registry.enabled_nodes().len(), 2);
    }
}
