//! Remote search protocol, server side
//!
//! Owns the cache of in-flight remote searches on a worker node. A
//! handle is created in `start` before any async work begins, so a
//! `destroy` for the same key can never outrun registration; destroy
//! tolerates a missing handle as a no-op and is idempotent. Idle
//! handles are evicted by a background sweep, which runs the same
//! cleanup as an explicit destroy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use squall_common::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::local::LocalNodeExecutor;
use crate::registry::{TaskHandle, TaskRegistry};
use crate::remote::codec::encode_snapshot;
use crate::sink::{PollSnapshot, ResultSink};
use crate::task::ClusterSearchTask;

#[derive(Default)]
struct HandleState {
    started: bool,
    destroyed: bool,
    init_error: Option<String>,
    task: Option<TaskHandle>,
}

/// Server-side state for one in-flight remote search.
pub struct RemoteSearchHandle {
    key: QueryKey,
    sink: Arc<ResultSink>,
    state: Mutex<HandleState>,
    last_access: Mutex<Instant>,
}

impl RemoteSearchHandle {
    fn new(key: QueryKey, sink: Arc<ResultSink>) -> Self {
        RemoteSearchHandle {
            key,
            sink,
            state: Mutex::new(HandleState::default()),
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn sink(&self) -> &Arc<ResultSink> {
        &self.sink
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    fn idle(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    /// Run destroy cleanup exactly once. Returns false when the handle
    /// was already destroyed.
    fn destroy(&self, registry: &TaskRegistry) -> bool {
        let task = {
            let mut state = self.state.lock();
            if state.destroyed {
                return false;
            }
            state.destroyed = true;
            state.task.take()
        };
        if let Some(task) = task {
            task.token.cancel();
            registry.complete(task.id);
        }
        self.sink.clear_data();
        self.sink.signal_complete();
        true
    }
}

/// Cache and lifecycle manager for remote search handles on one node.
pub struct RemoteSearchManager {
    node: NodeName,
    executor: Arc<LocalNodeExecutor>,
    registry: Arc<TaskRegistry>,
    config: RemoteProtocolConfig,
    handles: DashMap<QueryKey, Arc<RemoteSearchHandle>>,
}

impl RemoteSearchManager {
    pub fn new(
        node: NodeName,
        executor: Arc<LocalNodeExecutor>,
        registry: Arc<TaskRegistry>,
        config: RemoteProtocolConfig,
    ) -> Self {
        RemoteSearchManager {
            node,
            executor,
            registry,
            config,
            handles: DashMap::new(),
        }
    }

    /// Allocate a handle for the task's key and begin the node search
    /// asynchronously. A stale handle for the same key is destroyed and
    /// replaced. Pre-start failures land in the handle's init error and
    /// surface through poll instead of failing this request.
    pub fn start(&self, task: ClusterSearchTask) -> Result<bool> {
        let key = task.query_key.clone();
        if let Some((_, stale)) = self.handles.remove(&key) {
            warn!(query_key = %key, "replacing stale remote search handle");
            stale.destroy(&self.registry);
        }
        self.enforce_capacity();

        let sink = Arc::new(ResultSink::for_query(task.settings.clone(), &task.query));
        let handle = Arc::new(RemoteSearchHandle::new(key.clone(), sink.clone()));
        self.handles.insert(key.clone(), handle.clone());

        if let Err(e) = task.validate() {
            handle.state.lock().init_error = Some(e.to_string());
            return Ok(true);
        }

        let task_handle = self.registry.register_root(key.clone());
        let token = task_handle.token.clone();
        let task_id = task_handle.id;
        {
            let mut state = handle.state.lock();
            state.task = Some(task_handle);
            // Aggregation settings are in place; polls may now report data
            state.started = true;
            if state.destroyed {
                // destroy won the race against task assignment
                token.cancel();
                self.registry.complete(task_id);
                return Ok(true);
            }
        }

        info!(
            query_key = %key,
            parent_task = %task.parent_task_id,
            shards = task.shard_ids.len(),
            "starting remote search"
        );

        let executor = self.executor.clone();
        let registry = self.registry.clone();
        let node = self.node.clone();
        tokio::spawn(async move {
            executor.execute(&node, &task, &token, &sink).await;
            sink.signal_complete();
            registry.complete(task_id);
        });
        Ok(true)
    }

    /// Serialize the current state for the caller. Polling an unknown
    /// key is an operator error (the caller outlived eviction).
    pub async fn poll(&self, key: &QueryKey) -> Result<Bytes> {
        let handle = self
            .handles
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found("remote search handle", key.to_string()))?;
        handle.touch();

        let (init_error, started, destroyed, cancelled) = {
            let state = handle.state.lock();
            (
                state.init_error.clone(),
                state.started,
                state.destroyed,
                state
                    .task
                    .as_ref()
                    .map(|t| t.token.is_cancelled())
                    .unwrap_or(false),
            )
        };

        let snapshot = if let Some(message) = init_error {
            PollSnapshot {
                complete: true,
                errors: vec![message],
                ..Default::default()
            }
        } else if !started {
            PollSnapshot::default()
        } else if destroyed || cancelled {
            PollSnapshot {
                complete: true,
                ..Default::default()
            }
        } else {
            if !handle.sink.is_complete() {
                // Bounded wait for fresh completion; avoids busy-spinning
                // callers without holding the request open indefinitely.
                let _ = tokio::time::timeout(self.config.poll_wait, handle.sink.await_complete())
                    .await;
            }
            handle.sink.drain_snapshot()
        };

        encode_snapshot(&snapshot)
    }

    /// Tear down the handle for a key. Safe to call repeatedly and
    /// before `start` has assigned a task id.
    pub fn destroy(&self, key: &QueryKey) -> bool {
        match self.handles.remove(key) {
            Some((_, handle)) => {
                let first = handle.destroy(&self.registry);
                debug!(query_key = %key, first = first, "destroyed remote search handle");
            }
            None => {
                debug!(query_key = %key, "destroy for unknown handle, ignoring");
            }
        }
        true
    }

    /// Spawn the idle-handle eviction sweep.
    pub fn start_eviction_loop(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            info!(
                ttl = ?manager.config.handle_ttl,
                "remote handle eviction loop started"
            );
            let mut interval = tokio::time::interval(manager.config.evict_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        manager.evict_idle();
                    }
                    _ = shutdown.cancelled() => {
                        info!("remote handle eviction loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    fn evict_idle(&self) {
        let ttl = self.config.handle_ttl;
        let expired: Vec<QueryKey> = self
            .handles
            .iter()
            .filter(|e| e.value().idle() > ttl)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            warn!(query_key = %key, "evicting idle remote search handle");
            self.destroy(&key);
        }
    }

    fn enforce_capacity(&self) {
        while self.handles.len() >= self.config.handle_capacity {
            let oldest = self
                .handles
                .iter()
                .max_by_key(|e| e.value().idle())
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    warn!(query_key = %key, "handle cache full, evicting oldest");
                    self.destroy(&key);
                }
                None => break,
            }
        }
    }
}
