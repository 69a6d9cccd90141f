//! Federated search coordinator
//!
//! Top-level orchestrator for one search: builds the shard map,
//! dispatches one node executor per target node concurrently (local for
//! this node, remote otherwise), joins them all, completes the sink,
//! and runs the termination cascade unconditionally so no remote task
//! is left running. A background watcher cancels everything the moment
//! the sink completes early, which is what lets a "first N matches"
//! search stop scanning remaining shards.

use std::sync::Arc;

use squall_common::prelude::*;
use squall_index::ShardMetaStore;
use tokio_util::sync::CancellationToken;

use crate::local::LocalNodeExecutor;
use crate::registry::{TaskHandle, TaskRegistry};
use crate::remote::RemoteNodeSearch;
use crate::shard_map::build_shard_assignment;
use crate::sink::ResultSink;
use crate::task::{ClusterSearchTask, SearchTask};
use crate::NodeRegistry;

/// How one node's slice of the search runs, resolved once at dispatch
/// by comparing the target node against this node's identity.
pub enum NodeExecution {
    Local,
    Remote { endpoint: String },
}

/// Coordinates federated searches.
pub struct SearchCoordinator {
    nodes: Arc<dyn NodeRegistry>,
    registry: Arc<TaskRegistry>,
    meta: Arc<dyn ShardMetaStore>,
    local: Arc<LocalNodeExecutor>,
    remote: Arc<RemoteNodeSearch>,
}

impl SearchCoordinator {
    pub fn new(
        nodes: Arc<dyn NodeRegistry>,
        registry: Arc<TaskRegistry>,
        meta: Arc<dyn ShardMetaStore>,
        local: Arc<LocalNodeExecutor>,
        remote: Arc<RemoteNodeSearch>,
    ) -> Self {
        SearchCoordinator {
            nodes,
            registry,
            meta,
            local,
            remote,
        }
    }

    /// Issue the dispatch for a search and return its root task handle.
    /// Does not block on the search itself; the caller observes progress
    /// and outcome through the sink.
    pub fn dispatch(&self, task: SearchTask, sink: Arc<ResultSink>) -> TaskHandle {
        let root = self.registry.register_root(task.key.clone());

        self.spawn_completion_watcher(&sink, &root);

        let nodes = self.nodes.clone();
        let registry = self.registry.clone();
        let meta = self.meta.clone();
        let local = self.local.clone();
        let remote = self.remote.clone();
        let handle = root.clone();
        tokio::spawn(async move {
            run_search(nodes, registry, meta, local, remote, handle, task, sink).await;
        });

        root
    }

    /// Cancel a dispatched search and everything it started.
    pub fn cancel(&self, id: TaskId) {
        self.registry.terminate(id);
    }

    pub fn task_registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    // The watcher awaits the sink's one-shot completion signal and
    // immediately runs the cancellation cascade, so early completion
    // (result ceilings) stops in-flight node searches instead of
    // letting them run to exhaustion.
    fn spawn_completion_watcher(&self, sink: &Arc<ResultSink>, root: &TaskHandle) {
        let registry = self.registry.clone();
        let completion = sink.completion_token();
        let root_token = root.token.clone();
        let root_id = root.id;
        tokio::spawn(async move {
            tokio::select! {
                _ = completion.cancelled() => {
                    debug!(task = %root_id, "sink complete, cancelling in-flight node searches");
                    registry.terminate(root_id);
                }
                _ = root_token.cancelled() => {}
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    nodes: Arc<dyn NodeRegistry>,
    registry: Arc<TaskRegistry>,
    meta: Arc<dyn ShardMetaStore>,
    local: Arc<LocalNodeExecutor>,
    remote: Arc<RemoteNodeSearch>,
    root: TaskHandle,
    task: SearchTask,
    sink: Arc<ResultSink>,
) {
    // Failures before any node dispatch are recorded against the
    // synthetic coordinator identity; callers observe them in the
    // sink's error list rather than a thrown error.
    let assignment = match build_shard_assignment(&*meta, &task.query, &sink) {
        Ok(assignment) => assignment,
        Err(e) => {
            sink.record_error(&NodeName::coordinator(), e.to_string());
            sink.signal_complete();
            registry.terminate(root.id);
            registry.complete(root.id);
            return;
        }
    };

    let enabled = nodes.enabled_nodes();
    let source = nodes.source_node();

    let mut dispatches = Vec::new();
    for (node, shards) in assignment.iter() {
        if !enabled.contains(node) {
            sink.record_error(node, "node not enabled or active - results may be missing");
            continue;
        }

        let execution = if *node == source {
            NodeExecution::Local
        } else {
            match nodes.endpoint(node) {
                Some(endpoint) => NodeExecution::Remote { endpoint },
                None => {
                    sink.record_error(node, "no endpoint registered for node");
                    continue;
                }
            }
        };

        let child = match registry.register_child(root.id) {
            Ok(child) => child,
            Err(e) => {
                sink.record_error(node, e.to_string());
                continue;
            }
        };

        let wire = ClusterSearchTask::for_node(&task, root.id, shards.clone());
        let node = node.clone();
        let sink = sink.clone();
        let local = local.clone();
        let remote = remote.clone();
        let token: CancellationToken = child.token;
        dispatches.push(async move {
            match execution {
                NodeExecution::Local => {
                    local.execute(&node, &wire, &token, &sink).await;
                }
                NodeExecution::Remote { endpoint } => {
                    remote.search(&endpoint, &node, &wire, &sink, &token).await;
                }
            }
        });
    }

    info!(
        query_key = %task.key,
        task_name = %task.name,
        nodes = dispatches.len(),
        shards = assignment.total_shards(),
        "dispatching federated search"
    );

    futures::future::join_all(dispatches).await;

    // Completion never waits on anything beyond the join above.
    sink.signal_complete();

    // Unconditional cascade, the finally of this orchestration: even on
    // a clean finish it guarantees no remote task is left running.
    registry.terminate(root.id);
    registry.complete(root.id);
}
