//! Shard search worker pool
//!
//! A bounded set of workers pulls shard ids from a shared queue and
//! performs one shard's search each, streaming matched records into the
//! bounded handoff queue for downstream extraction. Shard sizes and disk
//! locality vary, so the shared pull queue lets fast workers absorb more
//! shards than slow ones instead of binding completion to a straggler.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use squall_common::metrics::Counter;
use squall_common::prelude::*;
use squall_index::{ShardMetaStore, ShardSearcher, ShardSearcherFactory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::task::ClusterSearchTask;

/// Runs one node task's shard searches.
pub struct ShardWorkerPool {
    meta: Arc<dyn ShardMetaStore>,
    factory: Arc<dyn ShardSearcherFactory>,
    max_workers: usize,
}

impl ShardWorkerPool {
    pub fn new(
        meta: Arc<dyn ShardMetaStore>,
        factory: Arc<dyn ShardSearcherFactory>,
        max_workers: usize,
    ) -> Self {
        ShardWorkerPool {
            meta,
            factory,
            max_workers: max_workers.max(1),
        }
    }

    /// Search every shard in the task, pushing matched records into
    /// `out` and counting hits. Returns once all workers have finished,
    /// normally or through cancellation; dropping `out` here is the
    /// continuation that signals "no more data" downstream.
    ///
    /// A missing shard aborts the whole node search: it usually means
    /// index corruption or metadata inconsistency.
    pub async fn search_shards(
        &self,
        task: &ClusterSearchTask,
        token: &CancellationToken,
        out: mpsc::Sender<StoredRecord>,
        hits: Arc<Counter>,
    ) -> Result<()> {
        if task.shard_ids.is_empty() {
            return Ok(());
        }

        let queue: Arc<Mutex<VecDeque<ShardId>>> =
            Arc::new(Mutex::new(task.shard_ids.iter().copied().collect()));
        let searchers: Arc<DashMap<FormatVersion, Arc<dyn ShardSearcher>>> =
            Arc::new(DashMap::new());
        let stored_fields = Arc::new(task.stored_fields());
        let query = Arc::new(task.query.clone());
        let date_time = Arc::new(task.date_time.clone());

        // One shared token so the first fatal error stops the pool
        let pool_token = token.child_token();
        let worker_count = self.max_workers.min(task.shard_ids.len());
        debug!(
            workers = worker_count,
            shards = task.shard_ids.len(),
            "starting shard search workers"
        );

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let meta = self.meta.clone();
            let factory = self.factory.clone();
            let queue = queue.clone();
            let searchers = searchers.clone();
            let stored_fields = stored_fields.clone();
            let query = query.clone();
            let date_time = date_time.clone();
            let pool_token = pool_token.clone();
            let out = out.clone();
            let hits = hits.clone();

            handles.push(tokio::spawn(async move {
                let result = shard_worker(
                    &*meta,
                    &*factory,
                    &queue,
                    &searchers,
                    &stored_fields,
                    &query,
                    &date_time,
                    &pool_token,
                    &out,
                    &hits,
                )
                .await;
                if let Err(e) = &result {
                    if !e.is_cancelled() {
                        pool_token.cancel();
                    }
                }
                result
            }));
        }
        drop(out);

        let mut first_error: Option<Error> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if !e.is_cancelled() && first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(Error::internal(format!("shard worker panicked: {}", e)));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn shard_worker(
    meta: &dyn ShardMetaStore,
    factory: &dyn ShardSearcherFactory,
    queue: &Mutex<VecDeque<ShardId>>,
    searchers: &DashMap<FormatVersion, Arc<dyn ShardSearcher>>,
    stored_fields: &[String],
    query: &SearchQuery,
    date_time: &DateTimeSettings,
    token: &CancellationToken,
    out: &mpsc::Sender<StoredRecord>,
    hits: &Counter,
) -> Result<()> {
    loop {
        if token.is_cancelled() {
            return Ok(());
        }
        let shard_id = match queue.lock().pop_front() {
            Some(id) => id,
            None => return Ok(()),
        };

        let shard = meta
            .get_shard(shard_id)
            .ok_or(SearchError::ShardMissing(shard_id))?;

        let searcher = match searchers.get(&shard.format_version) {
            Some(existing) => existing.clone(),
            None => {
                let created = factory.create(shard.format_version, query, date_time)?;
                searchers.insert(shard.format_version, created.clone());
                created
            }
        };

        trace!(shard = %shard_id, format = shard.format_version.0, "searching shard");
        searcher
            .search_shard(&shard, stored_fields, hits, out, token)
            .await?;
    }
}
