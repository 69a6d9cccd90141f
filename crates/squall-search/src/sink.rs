//! Result sink
//!
//! The shared aggregation target for one search across all nodes. Every
//! node's executor merges into it concurrently; the completion flag is
//! monotonic (false -> true only) and once set, late-arriving partial
//! results are discarded silently. A result-count ceiling lets the sink
//! stop the whole search early once it has gathered enough data.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squall_common::prelude::*;
use tokio_util::sync::CancellationToken;

/// Accumulated data for one coprocessor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub hits: u64,
    pub rows: Vec<ResultRow>,
}

/// Aggregated data keyed by coprocessor.
pub type PayloadMap = HashMap<CoprocessorId, Payload>;

/// One poll response from a worker node: completion state, errors drained
/// since the last poll, and the aggregated-data delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub complete: bool,
    pub errors: Vec<String>,
    pub payloads: PayloadMap,
}

struct SinkInner {
    /// Cumulative data, what the caller finally consumes
    payloads: PayloadMap,
    /// Delta since the last `drain_snapshot`, what poll transfers
    pending: PayloadMap,
    errors: BTreeMap<NodeName, Vec<String>>,
    pending_errors: Vec<String>,
}

/// Shared, thread-safe aggregation target for one search task.
pub struct ResultSink {
    settings: Vec<CoprocessorSettings>,
    highlights: BTreeSet<String>,
    complete: CancellationToken,
    inner: Mutex<SinkInner>,
}

impl ResultSink {
    pub fn new(settings: Vec<CoprocessorSettings>) -> Self {
        ResultSink {
            settings,
            highlights: BTreeSet::new(),
            complete: CancellationToken::new(),
            inner: Mutex::new(SinkInner {
                payloads: PayloadMap::new(),
                pending: PayloadMap::new(),
                errors: BTreeMap::new(),
                pending_errors: Vec::new(),
            }),
        }
    }

    /// Sink seeded with highlight terms from the query expression.
    pub fn for_query(settings: Vec<CoprocessorSettings>, query: &SearchQuery) -> Self {
        let mut sink = Self::new(settings);
        sink.highlights = query
            .expression
            .terms()
            .into_iter()
            .map(str::to_string)
            .collect();
        sink
    }

    pub fn highlights(&self) -> &BTreeSet<String> {
        &self.highlights
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Mark the sink complete. Monotonic; calling again is a no-op.
    pub fn signal_complete(&self) {
        self.complete.cancel();
    }

    pub fn is_complete(&self) -> bool {
        self.complete.is_cancelled()
    }

    /// One-shot completion signal; any number of routines can await it
    /// independently.
    pub fn completion_token(&self) -> CancellationToken {
        self.complete.clone()
    }

    pub async fn await_complete(&self) {
        self.complete.cancelled().await;
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Merge decorated rows from one matched record into every
    /// coprocessor. Dropped silently once the sink is complete.
    pub fn add_records(&self, rows: &[ResultRow]) {
        if rows.is_empty() || self.is_complete() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            let inner = &mut *inner;
            for settings in &self.settings {
                match settings.kind {
                    CoprocessorKind::Table { .. } => {
                        for bucket in [&mut inner.payloads, &mut inner.pending] {
                            let payload = bucket.entry(settings.id).or_default();
                            payload.hits += rows.len() as u64;
                            payload.rows.extend_from_slice(rows);
                        }
                    }
                    CoprocessorKind::Count => {
                        for bucket in [&mut inner.payloads, &mut inner.pending] {
                            bucket.entry(settings.id).or_default().hits += rows.len() as u64;
                        }
                    }
                }
            }
        }
        self.check_ceilings();
    }

    /// Record an error against a node. Errors accumulate even after
    /// completion; only aggregated data is frozen.
    pub fn record_error(&self, node: &NodeName, message: impl Into<String>) {
        let message = message.into();
        warn!(node = %node, error = %message, "recording node search error");
        let mut inner = self.inner.lock();
        inner.errors.entry(node.clone()).or_default().push(message.clone());
        inner.pending_errors.push(message);
    }

    /// Merge a poll snapshot received from a worker node. Returns the
    /// snapshot's completion flag, which ends the caller's poll loop.
    pub fn merge_poll_snapshot(&self, node: &NodeName, snapshot: PollSnapshot) -> bool {
        for message in snapshot.errors {
            self.record_error(node, message);
        }
        if !self.is_complete() {
            {
                let mut inner = self.inner.lock();
                let inner = &mut *inner;
                for (id, delta) in snapshot.payloads {
                    for bucket in [&mut inner.payloads, &mut inner.pending] {
                        let payload = bucket.entry(id).or_default();
                        payload.hits += delta.hits;
                        payload.rows.extend_from_slice(&delta.rows);
                    }
                }
            }
            self.check_ceilings();
        }
        snapshot.complete
    }

    /// Drain the delta accumulated since the last call, for one poll
    /// response.
    pub fn drain_snapshot(&self) -> PollSnapshot {
        let mut inner = self.inner.lock();
        PollSnapshot {
            complete: self.is_complete(),
            errors: std::mem::take(&mut inner.pending_errors),
            payloads: std::mem::take(&mut inner.pending),
        }
    }

    /// Discard all aggregated data; part of handle destruction.
    pub fn clear_data(&self) {
        let mut inner = self.inner.lock();
        inner.payloads.clear();
        inner.pending.clear();
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn payloads(&self) -> PayloadMap {
        self.inner.lock().payloads.clone()
    }

    pub fn errors(&self) -> BTreeMap<NodeName, Vec<String>> {
        self.inner.lock().errors.clone()
    }

    pub fn error_count(&self) -> usize {
        self.inner.lock().errors.values().map(Vec::len).sum()
    }

    /// Rows gathered for one coprocessor so far.
    pub fn row_count(&self, id: CoprocessorId) -> usize {
        self.inner
            .lock()
            .payloads
            .get(&id)
            .map(|p| p.rows.len())
            .unwrap_or(0)
    }

    // A search with ceilinged table coprocessors completes early once
    // every ceiling is reached.
    fn check_ceilings(&self) {
        let mut saw_ceiling = false;
        let satisfied = {
            let inner = self.inner.lock();
            self.settings.iter().all(|settings| match settings.kind {
                CoprocessorKind::Table {
                    max_results: Some(max),
                } => {
                    saw_ceiling = true;
                    inner
                        .payloads
                        .get(&settings.id)
                        .map(|p| p.rows.len() as u64 >= max)
                        .unwrap_or(false)
                }
                _ => true,
            })
        };
        if saw_ceiling && satisfied {
            debug!("result ceiling reached, completing sink early");
            self.signal_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(shard: u64, value: &str) -> ResultRow {
        ResultRow {
            shard: ShardId(shard),
            values: vec![value.to_string()],
        }
    }

    fn table_sink(max: Option<u64>) -> ResultSink {
        ResultSink::new(vec![CoprocessorSettings::table(
            1,
            max,
            vec!["message".into()],
        )])
    }

    #[test]
    fn test_add_records_accumulates() {
        let sink = table_sink(None);
        sink.add_records(&[row(1, "a"), row(1, "b")]);
        sink.add_records(&[row(2, "c")]);
        assert_eq!(sink.row_count(CoprocessorId(1)), 3);
        assert!(!sink.is_complete());
    }

    #[test]
    fn test_completion_is_monotonic_and_freezes_data() {
        let sink = table_sink(None);
        sink.add_records(&[row(1, "a")]);
        sink.signal_complete();
        assert!(sink.is_complete());

        // Late merges must not change aggregated data
        sink.add_records(&[row(2, "late")]);
        let snapshot = PollSnapshot {
            complete: false,
            errors: vec![],
            payloads: HashMap::from([(CoprocessorId(1), Payload { hits: 5, rows: vec![row(3, "x")] })]),
        };
        sink.merge_poll_snapshot(&NodeName::new("node2"), snapshot);

        assert_eq!(sink.row_count(CoprocessorId(1)), 1);
        assert!(sink.is_complete());
    }

    #[test]
    fn test_ceiling_completes_early() {
        let sink = table_sink(Some(2));
        sink.add_records(&[row(1, "a")]);
        assert!(!sink.is_complete());
        sink.add_records(&[row(1, "b")]);
        assert!(sink.is_complete());
    }

    #[test]
    fn test_no_ceiling_never_self_completes() {
        let sink = table_sink(None);
        for i in 0..100 {
            sink.add_records(&[row(i, "v")]);
        }
        assert!(!sink.is_complete());
    }

    #[test]
    fn test_errors_recorded_per_node() {
        let sink = table_sink(None);
        sink.record_error(&NodeName::new("node2"), "boom");
        sink.record_error(&NodeName::new("node2"), "again");
        sink.record_error(&NodeName::new("node3"), "other");

        let errors = sink.errors();
        assert_eq!(errors[&NodeName::new("node2")].len(), 2);
        assert_eq!(errors[&NodeName::new("node3")].len(), 1);
        assert_eq!(sink.error_count(), 3);
    }

    #[test]
    fn test_drain_snapshot_takes_delta_once() {
        let sink = table_sink(None);
        sink.add_records(&[row(1, "a")]);
        sink.record_error(&NodeName::new("node1"), "warn");

        let first = sink.drain_snapshot();
        assert_eq!(first.errors, vec!["warn".to_string()]);
        assert_eq!(first.payloads[&CoprocessorId(1)].rows.len(), 1);

        let second = sink.drain_snapshot();
        assert!(second.errors.is_empty());
        assert!(second.payloads.is_empty());

        // Cumulative view is untouched by draining
        assert_eq!(sink.row_count(CoprocessorId(1)), 1);
    }

    #[test]
    fn test_merge_poll_snapshot_returns_remote_completion() {
        let sink = table_sink(None);
        let done = sink.merge_poll_snapshot(
            &NodeName::new("node2"),
            PollSnapshot {
                complete: true,
                errors: vec![],
                payloads: PayloadMap::new(),
            },
        );
        assert!(done);
        // Remote completion does not complete the local sink by itself
        assert!(!sink.is_complete());
    }

    #[test]
    fn test_highlights_from_query() {
        let query = SearchQuery {
            index: IndexUuid(uuid::Uuid::new_v4()),
            expression: Expression::And(vec![
                Expression::Term {
                    field: "message".into(),
                    value: "error".into(),
                },
                Expression::Term {
                    field: "message".into(),
                    value: "disk".into(),
                },
            ]),
            time_range: TimeRange::all(),
        };
        let sink = ResultSink::for_query(vec![CoprocessorSettings::count(1)], &query);
        assert!(sink.highlights().contains("error"));
        assert!(sink.highlights().contains("disk"));
    }

    #[tokio::test]
    async fn test_multiple_waiters_observe_completion() {
        let sink = std::sync::Arc::new(table_sink(None));
        let a = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.await_complete().await })
        };
        let b = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.await_complete().await })
        };
        sink.signal_complete();
        a.await.unwrap();
        b.await.unwrap();
    }
}
