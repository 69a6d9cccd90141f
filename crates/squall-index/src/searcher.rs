//! Shard searcher factory
//!
//! A searcher executes one compiled query against one shard, streaming
//! matched records into the handoff queue. Searchers are created per
//! index format version so that old and new shard formats can coexist
//! within one search; the worker pool caches them by version.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use squall_common::metrics::Counter;
use squall_common::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Executes a compiled query against individual shards.
#[async_trait]
pub trait ShardSearcher: Send + Sync {
    /// Search one shard, pushing each matching record's requested stored
    /// fields into `out` and incrementing `hits` per match. Must observe
    /// `token` between records and unwind with `Error::Cancelled`.
    async fn search_shard(
        &self,
        shard: &ShardRef,
        stored_fields: &[String],
        hits: &Counter,
        out: &mpsc::Sender<StoredRecord>,
        token: &CancellationToken,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn ShardSearcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ShardSearcher")
    }
}

/// Creates searchers compatible with a given shard format version.
pub trait ShardSearcherFactory: Send + Sync {
    fn create(
        &self,
        format_version: FormatVersion,
        query: &SearchQuery,
        date_time: &DateTimeSettings,
    ) -> Result<Arc<dyn ShardSearcher>>;
}

/// Highest shard format version the in-memory searcher understands.
const MAX_MEM_FORMAT: u32 = 2;

/// In-memory searcher factory over a shared document corpus.
///
/// Documents are (field, value) pair lists keyed by shard id. Matching
/// is substring containment per term, combined through the boolean
/// expression tree.
#[derive(Default)]
pub struct MemSearcherFactory {
    corpus: Arc<DashMap<ShardId, Vec<Vec<(String, String)>>>>,
    /// Artificial delay per inspected document, for tests that need a
    /// slow searcher.
    per_doc_delay: Option<Duration>,
}

impl MemSearcherFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_per_doc_delay(mut self, delay: Duration) -> Self {
        self.per_doc_delay = Some(delay);
        self
    }

    pub fn add_document(&self, shard: ShardId, fields: Vec<(String, String)>) {
        self.corpus.entry(shard).or_default().push(fields);
    }
}

impl ShardSearcherFactory for MemSearcherFactory {
    fn create(
        &self,
        format_version: FormatVersion,
        query: &SearchQuery,
        _date_time: &DateTimeSettings,
    ) -> Result<Arc<dyn ShardSearcher>> {
        if format_version.0 == 0 || format_version.0 > MAX_MEM_FORMAT {
            return Err(SearchError::UnsupportedFormat(format_version.0).into());
        }
        Ok(Arc::new(MemShardSearcher {
            corpus: self.corpus.clone(),
            expression: query.expression.clone(),
            per_doc_delay: self.per_doc_delay,
        }))
    }
}

struct MemShardSearcher {
    corpus: Arc<DashMap<ShardId, Vec<Vec<(String, String)>>>>,
    expression: Expression,
    per_doc_delay: Option<Duration>,
}

impl MemShardSearcher {
    fn matches(expr: &Expression, doc: &[(String, String)]) -> bool {
        match expr {
            Expression::Term { field, value } => doc
                .iter()
                .any(|(f, v)| f == field && v.contains(value.as_str())),
            Expression::And(children) => children.iter().all(|c| Self::matches(c, doc)),
            Expression::Or(children) => children.iter().any(|c| Self::matches(c, doc)),
            Expression::Not(child) => !Self::matches(child, doc),
        }
    }

    fn project(doc: &[(String, String)], stored_fields: &[String]) -> Vec<(String, String)> {
        stored_fields
            .iter()
            .map(|name| {
                let value = doc
                    .iter()
                    .find(|(f, _)| f == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }
}

#[async_trait]
impl ShardSearcher for MemShardSearcher {
    async fn search_shard(
        &self,
        shard: &ShardRef,
        stored_fields: &[String],
        hits: &Counter,
        out: &mpsc::Sender<StoredRecord>,
        token: &CancellationToken,
    ) -> Result<()> {
        let docs = match self.corpus.get(&shard.id) {
            Some(entry) => entry.clone(),
            None => return Ok(()),
        };

        for doc in &docs {
            if token.is_cancelled() {
                return Err(Error::cancelled(format!("shard {} search stopped", shard.id)));
            }
            if let Some(delay) = self.per_doc_delay {
                tokio::time::sleep(delay).await;
            }
            if Self::matches(&self.expression, doc) {
                let record = StoredRecord {
                    shard: shard.id,
                    fields: Self::project(doc, stored_fields),
                };
                hits.inc();
                if out.send(record).await.is_err() {
                    // Receiver gone means the downstream was torn down.
                    return Err(Error::cancelled("handoff queue closed".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard_ref(id: u64) -> ShardRef {
        ShardRef {
            id: ShardId(id),
            node: NodeName::new("node1"),
            partition: "all".to_string(),
            status: ShardStatus::Closed,
            format_version: FormatVersion(1),
        }
    }

    fn query(field: &str, value: &str) -> SearchQuery {
        SearchQuery {
            index: IndexUuid(uuid::Uuid::new_v4()),
            expression: Expression::Term {
                field: field.to_string(),
                value: value.to_string(),
            },
            time_range: TimeRange::all(),
        }
    }

    #[tokio::test]
    async fn test_mem_searcher_matches_and_projects() {
        let factory = MemSearcherFactory::new();
        factory.add_document(
            ShardId(1),
            vec![
                ("message".to_string(), "disk error on sda".to_string()),
                ("host".to_string(), "web-1".to_string()),
            ],
        );
        factory.add_document(
            ShardId(1),
            vec![("message".to_string(), "all quiet".to_string())],
        );

        let searcher = factory
            .create(FormatVersion(1), &query("message", "error"), &DateTimeSettings::default())
            .unwrap();

        let hits = Counter::new();
        let (tx, mut rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        searcher
            .search_shard(
                &shard_ref(1),
                &["host".to_string()],
                &hits,
                &tx,
                &token,
            )
            .await
            .unwrap();
        drop(tx);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.fields, vec![("host".to_string(), "web-1".to_string())]);
        assert!(rx.recv().await.is_none());
        assert_eq!(hits.get(), 1);
    }

    #[tokio::test]
    async fn test_unknown_format_version_rejected() {
        let factory = MemSearcherFactory::new();
        let err = factory
            .create(FormatVersion(99), &query("message", "x"), &DateTimeSettings::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Search(SearchError::UnsupportedFormat(99))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_searcher_unwinds() {
        let factory = MemSearcherFactory::new();
        factory.add_document(ShardId(1), vec![("message".to_string(), "x".to_string())]);

        let searcher = factory
            .create(FormatVersion(1), &query("message", "x"), &DateTimeSettings::default())
            .unwrap();

        let hits = Counter::new();
        let (tx, _rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        token.cancel();
        let err = searcher
            .search_shard(&shard_ref(1), &[], &hits, &tx, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
