//! Cluster-wide termination broadcast
//!
//! Fans a destroy out to every peer's remote search endpoint so that a
//! cancelled search is torn down even on nodes whose poll loop is no
//! longer running. Fire-and-forget: failures are logged, never
//! propagated, and nothing waits for acknowledgement.

use std::sync::Arc;

use squall_common::prelude::*;
use squall_search::{RemoteSearchTransport, TerminationBroadcaster};

/// Broadcasts terminations over the remote search transport.
pub struct HttpTerminationBroadcaster {
    transport: Arc<dyn RemoteSearchTransport>,
    endpoints: Vec<(NodeName, String)>,
}

impl HttpTerminationBroadcaster {
    pub fn new(
        transport: Arc<dyn RemoteSearchTransport>,
        endpoints: Vec<(NodeName, String)>,
    ) -> Self {
        HttpTerminationBroadcaster {
            transport,
            endpoints,
        }
    }
}

#[async_trait]
impl TerminationBroadcaster for HttpTerminationBroadcaster {
    async fn broadcast_termination(&self, key: &QueryKey) {
        let calls = self.endpoints.iter().map(|(node, endpoint)| {
            let transport = self.transport.clone();
            let key = key.clone();
            async move {
                match transport.destroy(endpoint, &key).await {
                    Ok(_) => {
                        debug!(node = %node, query_key = %key, "termination delivered");
                    }
                    Err(e) => {
                        warn!(
                            node = %node,
                            query_key = %key,
                            error = %e,
                            "termination broadcast failed"
                        );
                    }
                }
            }
        });
        futures::future::join_all(calls).await;
    }
}
