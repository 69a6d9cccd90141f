//! Local node search executor
//!
//! Runs one node's shard subset in the current process, wiring the shard
//! worker pool to the extraction pipeline and the shared result sink.
//! Errors are caught and recorded into the sink keyed by this node's
//! name; cancellation unwinds cleanly without touching the error list.

use std::sync::Arc;

use squall_common::metrics::Counter;
use squall_common::prelude::*;
use squall_index::{ExtractionPipeline, ShardMetaStore, ShardSearcherFactory};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::sink::ResultSink;
use crate::task::ClusterSearchTask;
use crate::workers::ShardWorkerPool;

/// Executes node tasks in-process against a result sink.
pub struct LocalNodeExecutor {
    pool: ShardWorkerPool,
    extractor: Arc<dyn ExtractionPipeline>,
    handoff_capacity: usize,
}

impl LocalNodeExecutor {
    pub fn new(
        meta: Arc<dyn ShardMetaStore>,
        factory: Arc<dyn ShardSearcherFactory>,
        extractor: Arc<dyn ExtractionPipeline>,
        config: &SearchConfig,
    ) -> Self {
        LocalNodeExecutor {
            pool: ShardWorkerPool::new(meta, factory, config.max_threads_per_task),
            extractor,
            handoff_capacity: config.handoff_capacity.max(1),
        }
    }

    /// Run the task's shard searches, streaming results into `sink`.
    /// Never returns an error: failures are recorded against `node`,
    /// cancellation simply stops the work.
    pub async fn execute(
        &self,
        node: &NodeName,
        task: &ClusterSearchTask,
        token: &CancellationToken,
        sink: &Arc<ResultSink>,
    ) {
        if let Err(e) = self.run(node, task, token, sink).await {
            if e.is_cancelled() {
                debug!(node = %node, query_key = %task.query_key, "node search cancelled");
            } else {
                sink.record_error(node, e.to_string());
            }
        }
    }

    async fn run(
        &self,
        node: &NodeName,
        task: &ClusterSearchTask,
        token: &CancellationToken,
        sink: &Arc<ResultSink>,
    ) -> Result<()> {
        task.validate()?;

        let (tx, mut rx) = mpsc::channel::<StoredRecord>(self.handoff_capacity);
        let hits = Arc::new(Counter::new());

        // Extraction drains the handoff queue until the worker pool's
        // continuation closes it.
        let extractor = self.extractor.clone();
        let extract_sink = sink.clone();
        let extract_node = node.clone();
        let extraction = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                match extractor.extract(record).await {
                    Ok(rows) => extract_sink.add_records(&rows),
                    Err(e) => {
                        extract_sink.record_error(&extract_node, format!("extraction failed: {}", e));
                    }
                }
            }
        });

        let search_result = self.pool.search_shards(task, token, tx, hits.clone()).await;

        // The pool dropped every sender; extraction drains what's left.
        if let Err(e) = extraction.await {
            sink.record_error(node, format!("extraction task failed: {}", e));
        }

        info!(
            node = %node,
            query_key = %task.query_key,
            shards = task.shard_ids.len(),
            hits = hits.get(),
            "node search finished"
        );

        search_result
    }
}
