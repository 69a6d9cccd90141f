//! Remote search transport
//!
//! Carries the three protocol verbs to a target node. `HttpRemoteTransport`
//! is the production implementation; `InProcessTransport` wires managers
//! directly for testing multi-node behavior in one process.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use squall_common::prelude::*;

use crate::remote::server::RemoteSearchManager;
use crate::task::ClusterSearchTask;

/// Transport for the start/poll/destroy verbs against one endpoint.
#[async_trait]
pub trait RemoteSearchTransport: Send + Sync {
    async fn start(&self, endpoint: &str, task: &ClusterSearchTask) -> Result<bool>;

    /// Returns the raw length-prefixed poll frame.
    async fn poll(&self, endpoint: &str, key: &QueryKey) -> Result<Bytes>;

    async fn destroy(&self, endpoint: &str, key: &QueryKey) -> Result<bool>;
}

/// HTTP transport for production use
pub struct HttpRemoteTransport {
    client: reqwest::Client,
}

impl HttpRemoteTransport {
    pub fn new(config: &RemoteProtocolConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::internal(format!("building http client: {}", e)))?;
        Ok(HttpRemoteTransport { client })
    }

    fn url(endpoint: &str, verb: &str) -> String {
        format!("{}/remoteSearch/v1/{}", endpoint.trim_end_matches('/'), verb)
    }
}

#[async_trait]
impl RemoteSearchTransport for HttpRemoteTransport {
    async fn start(&self, endpoint: &str, task: &ClusterSearchTask) -> Result<bool> {
        let response = self
            .client
            .post(Self::url(endpoint, "start"))
            .json(task)
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::transport(e.to_string()))?;
        response
            .json::<bool>()
            .await
            .map_err(|e| Error::transport(format!("invalid start response: {}", e)))
    }

    async fn poll(&self, endpoint: &str, key: &QueryKey) -> Result<Bytes> {
        let response = self
            .client
            .get(Self::url(endpoint, "poll"))
            .query(&[("queryKey", key.as_str())])
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::transport(e.to_string()))?;
        response
            .bytes()
            .await
            .map_err(|e| Error::transport(format!("reading poll frame: {}", e)))
    }

    async fn destroy(&self, endpoint: &str, key: &QueryKey) -> Result<bool> {
        let response = self
            .client
            .get(Self::url(endpoint, "destroy"))
            .query(&[("queryKey", key.as_str())])
            .send()
            .await
            .map_err(|e| Error::transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::transport(e.to_string()))?;
        response
            .json::<bool>()
            .await
            .map_err(|e| Error::transport(format!("invalid destroy response: {}", e)))
    }
}

/// In-process transport for testing
///
/// Endpoints are registered names resolving straight to a manager; the
/// protocol semantics (including the binary poll frame) stay identical
/// to the HTTP path.
#[derive(Default)]
pub struct InProcessTransport {
    managers: DashMap<String, Arc<RemoteSearchManager>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: impl Into<String>, manager: Arc<RemoteSearchManager>) {
        self.managers.insert(endpoint.into(), manager);
    }

    fn manager(&self, endpoint: &str) -> Result<Arc<RemoteSearchManager>> {
        self.managers
            .get(endpoint)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::transport(format!("unknown endpoint: {}", endpoint)))
    }
}

#[async_trait]
impl RemoteSearchTransport for InProcessTransport {
    async fn start(&self, endpoint: &str, task: &ClusterSearchTask) -> Result<bool> {
        self.manager(endpoint)?.start(task.clone())
    }

    async fn poll(&self, endpoint: &str, key: &QueryKey) -> Result<Bytes> {
        self.manager(endpoint)?.poll(key).await
    }

    async fn destroy(&self, endpoint: &str, key: &QueryKey) -> Result<bool> {
        Ok(self.manager(endpoint)?.destroy(key))
    }
}
