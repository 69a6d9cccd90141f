//! Remote search protocol, client side
//!
//! Drives one node's remote search through its three phases: start the
//! search, poll snapshots into the local sink until the remote reports
//! completion, and destroy the remote handle. Destroy always runs, no
//! matter how the first two phases ended, and its failures never mask
//! the primary outcome.

use std::sync::Arc;
use std::time::Duration;

use squall_common::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::remote::codec::decode_snapshot;
use crate::remote::transport::RemoteSearchTransport;
use crate::sink::ResultSink;
use crate::task::ClusterSearchTask;

/// Executes node tasks on a remote node via the poll protocol.
pub struct RemoteNodeSearch {
    transport: Arc<dyn RemoteSearchTransport>,
    poll_interval: Duration,
}

impl RemoteNodeSearch {
    pub fn new(transport: Arc<dyn RemoteSearchTransport>, config: &RemoteProtocolConfig) -> Self {
        RemoteNodeSearch {
            transport,
            poll_interval: config.poll_interval,
        }
    }

    /// Run the full start/poll/destroy exchange for one node task.
    /// Failures are recorded against `node` in the sink; transport
    /// problems never abort other nodes' searches.
    pub async fn search(
        &self,
        endpoint: &str,
        node: &NodeName,
        task: &ClusterSearchTask,
        sink: &Arc<ResultSink>,
        token: &CancellationToken,
    ) {
        let key = task.query_key.clone();

        let started = match self.transport.start(endpoint, task).await {
            Ok(true) => true,
            Ok(false) => {
                sink.record_error(node, "remote search start refused");
                false
            }
            Err(e) => {
                sink.record_error(node, format!("remote search start failed: {}", e));
                false
            }
        };

        if started {
            self.poll_loop(endpoint, node, &key, sink, token).await;
        }

        // Cleanup runs regardless of how start and poll ended.
        match self.transport.destroy(endpoint, &key).await {
            Ok(true) => {
                debug!(node = %node, query_key = %key, "remote search destroyed");
            }
            Ok(false) => {
                sink.record_error(node, "remote search destroy refused");
            }
            Err(e) => {
                sink.record_error(node, format!("remote search destroy failed: {}", e));
            }
        }
    }

    async fn poll_loop(
        &self,
        endpoint: &str,
        node: &NodeName,
        key: &QueryKey,
        sink: &Arc<ResultSink>,
        token: &CancellationToken,
    ) {
        loop {
            if token.is_cancelled() {
                debug!(node = %node, query_key = %key, "remote poll loop cancelled");
                return;
            }

            let frame = match self.transport.poll(endpoint, key).await {
                Ok(frame) => frame,
                Err(e) => {
                    sink.record_error(node, format!("remote search poll failed: {}", e));
                    return;
                }
            };

            let snapshot = match decode_snapshot(&frame) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    sink.record_error(node, format!("invalid remote poll payload: {}", e));
                    return;
                }
            };

            // Completion in a snapshot is monotonic on the server, so
            // the first complete=true ends the loop for good.
            if sink.merge_poll_snapshot(node, snapshot) {
                return;
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
