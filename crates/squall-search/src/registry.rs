//! Task registry and termination controller
//!
//! Tracks the task identity tree (parent search task -> per-node child
//! tasks) so that terminating the root reliably cancels every in-flight
//! descendant, local or remote. Cancellation is cooperative: each task
//! carries a `CancellationToken` derived from its parent's, so
//! cancelling the root token reaches the whole subtree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use squall_common::prelude::*;
use tokio_util::sync::CancellationToken;

/// Broadcasts a termination for a search key across the cluster so the
/// remote destroy path runs even when no poll loop is active.
/// Fire-and-forget: the registry never awaits acknowledgement.
#[async_trait]
pub trait TerminationBroadcaster: Send + Sync {
    async fn broadcast_termination(&self, key: &QueryKey);
}

/// A registered task: its id plus the token its workers must observe.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub token: CancellationToken,
}

struct TaskEntry {
    token: CancellationToken,
    parent: Option<TaskId>,
    children: Vec<TaskId>,
    /// Set on root tasks only; keys the cluster-wide termination
    query_key: Option<QueryKey>,
}

/// Registry of in-flight search tasks.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, TaskEntry>,
    next_id: AtomicU64,
    broadcaster: RwLock<Option<Arc<dyn TerminationBroadcaster>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the cluster-wide termination broadcaster. Without one,
    /// termination is local-only.
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn TerminationBroadcaster>) {
        *self.broadcaster.write() = Some(broadcaster);
    }

    /// Register the root task for a search.
    pub fn register_root(&self, key: QueryKey) -> TaskHandle {
        let id = self.allocate();
        let token = CancellationToken::new();
        self.tasks.insert(
            id,
            TaskEntry {
                token: token.clone(),
                parent: None,
                children: Vec::new(),
                query_key: Some(key),
            },
        );
        TaskHandle { id, token }
    }

    /// Register a child task under a parent. The child's token is
    /// derived from the parent's, so cancelling the parent cancels it.
    pub fn register_child(&self, parent: TaskId) -> Result<TaskHandle> {
        let id = self.allocate();
        let token = {
            let mut entry = self
                .tasks
                .get_mut(&parent)
                .ok_or_else(|| Error::not_found("task", parent.to_string()))?;
            entry.children.push(id);
            entry.token.child_token()
        };
        self.tasks.insert(
            id,
            TaskEntry {
                token: token.clone(),
                parent: Some(parent),
                children: Vec::new(),
                query_key: None,
            },
        );
        Ok(TaskHandle { id, token })
    }

    /// Terminate a task and every descendant. Safe to call repeatedly;
    /// unknown ids are a no-op. For root tasks, also fires the
    /// cluster-wide termination broadcast.
    pub fn terminate(&self, id: TaskId) {
        let Some(entry) = self.tasks.get(&id) else {
            return;
        };
        // Child tokens are derived from this one; a single cancel
        // reaches the whole subtree.
        entry.token.cancel();
        let key = entry.query_key.clone();
        drop(entry);

        if let Some(key) = key {
            let broadcaster = self.broadcaster.read().clone();
            if let Some(broadcaster) = broadcaster {
                debug!(query_key = %key, "broadcasting search termination");
                tokio::spawn(async move {
                    broadcaster.broadcast_termination(&key).await;
                });
            }
        }
    }

    /// Drop a finished task and its descendants from the registry.
    pub fn complete(&self, id: TaskId) {
        let children = match self.tasks.remove(&id) {
            Some((_, entry)) => entry.children,
            None => return,
        };
        for child in children {
            self.complete(child);
        }
    }

    pub fn is_cancelled(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .map(|e| e.token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Parent of a task, if registered.
    pub fn parent_of(&self, id: TaskId) -> Option<TaskId> {
        self.tasks.get(&id).and_then(|e| e.parent)
    }

    fn allocate(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
