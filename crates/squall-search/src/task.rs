//! Search task model
//!
//! A `SearchTask` identifies one logical search for its whole lifetime.
//! `ClusterSearchTask` is the per-node wire form carrying that identity
//! plus the node's shard slice; distinct node tasks for the same search
//! never share a shard id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squall_common::prelude::*;

/// One logical search: identity, query, and aggregation settings.
/// Immutable once created.
#[derive(Debug, Clone)]
pub struct SearchTask {
    pub key: QueryKey,
    pub name: String,
    pub query: SearchQuery,
    pub settings: Vec<CoprocessorSettings>,
    pub date_time: DateTimeSettings,
    pub created_at: DateTime<Utc>,
}

impl SearchTask {
    pub fn new(name: impl Into<String>, query: SearchQuery, settings: Vec<CoprocessorSettings>) -> Self {
        SearchTask {
            key: QueryKey::generate(),
            name: name.into(),
            query,
            settings,
            date_time: DateTimeSettings::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_date_time(mut self, date_time: DateTimeSettings) -> Self {
        self.date_time = date_time;
        self
    }
}

/// The unit sent to (or run locally for) one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSearchTask {
    /// Root task id on the coordinating node, for diagnostics; the
    /// worker node registers its own task under its own registry
    pub parent_task_id: TaskId,
    pub task_name: String,
    pub query_key: QueryKey,
    pub query: SearchQuery,
    /// Shards this node must search; a partition of the search's shard
    /// set, never a multiset across nodes
    pub shard_ids: Vec<ShardId>,
    pub settings: Vec<CoprocessorSettings>,
    pub date_time: DateTimeSettings,
    /// Coordinator wall clock at dispatch, for relative-time resolution
    pub now_ms: i64,
}

impl ClusterSearchTask {
    /// Build the wire task for one node's shard slice.
    pub fn for_node(task: &SearchTask, parent_task_id: TaskId, shard_ids: Vec<ShardId>) -> Self {
        ClusterSearchTask {
            parent_task_id,
            task_name: task.name.clone(),
            query_key: task.key.clone(),
            query: task.query.clone(),
            shard_ids,
            settings: task.settings.clone(),
            date_time: task.date_time.clone(),
            now_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Union of the stored fields every coprocessor needs, in first-seen
    /// order.
    pub fn stored_fields(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for settings in &self.settings {
            for field in &settings.stored_fields {
                if !out.iter().any(|f| f == field) {
                    out.push(field.clone());
                }
            }
        }
        out
    }

    /// Reject tasks that could never produce output.
    pub fn validate(&self) -> Result<()> {
        if self.settings.is_empty() {
            return Err(Error::internal("no coprocessor settings supplied"));
        }
        let needs_fields = self
            .settings
            .iter()
            .any(|s| matches!(s.kind, CoprocessorKind::Table { .. }));
        if needs_fields && self.stored_fields().is_empty() {
            return Err(SearchError::NoStoredFields.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squall_common::testing::fixtures;

    fn task() -> SearchTask {
        SearchTask::new(
            "test search",
            fixtures::term_query(IndexUuid(uuid::Uuid::new_v4()), "message", "error"),
            vec![CoprocessorSettings::table(1, Some(10), vec!["message".into()])],
        )
    }

    #[test]
    fn test_stored_fields_deduplicated() {
        let mut t = task();
        t.settings.push(CoprocessorSettings::table(
            2,
            None,
            vec!["message".into(), "host".into()],
        ));
        let wire = ClusterSearchTask::for_node(&t, TaskId(0), vec![ShardId(1)]);
        assert_eq!(wire.stored_fields(), vec!["message".to_string(), "host".to_string()]);
    }

    #[test]
    fn test_validate_rejects_missing_stored_fields() {
        let mut t = task();
        t.settings = vec![CoprocessorSettings::table(1, None, vec![])];
        let wire = ClusterSearchTask::for_node(&t, TaskId(0), vec![ShardId(1)]);
        assert!(matches!(
            wire.validate(),
            Err(Error::Search(SearchError::NoStoredFields))
        ));
    }

    #[test]
    fn test_count_only_task_needs_no_fields() {
        let mut t = task();
        t.settings = vec![CoprocessorSettings::count(1)];
        let wire = ClusterSearchTask::for_node(&t, TaskId(0), vec![ShardId(1)]);
        assert!(wire.validate().is_ok());
    }

    #[test]
    fn test_wire_task_round_trip() {
        let wire = ClusterSearchTask::for_node(&task(), TaskId(0), vec![ShardId(1), ShardId(2)]);
        let json = serde_json::to_string(&wire).unwrap();
        let back: ClusterSearchTask = serde_json::from_str(&json).unwrap();
        assert_eq!(wire, back);
    }
}
