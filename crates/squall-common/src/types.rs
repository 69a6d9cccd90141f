//! Core types for Squall

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a physical index shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u64);

/// Name of a node in the cluster; shard ownership is keyed by node name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(pub String);

/// Unique identifier for a searchable index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexUuid(pub uuid::Uuid);

/// Unique key identifying one logical search across the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(pub String);

/// Unique identifier for a task in the task registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

/// On-disk format version of a shard; searchers are created per version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatVersion(pub u32);

/// Identifier for one result-aggregation coprocessor within a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoprocessorId(pub u32);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        NodeName(name.into())
    }

    /// Synthetic node identity used for errors raised before any node
    /// dispatch has happened.
    pub fn coordinator() -> Self {
        NodeName("coordinator".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl QueryKey {
    /// Generate a fresh random key for a new search task.
    pub fn generate() -> Self {
        QueryKey(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

impl fmt::Display for IndexUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Shards and partitioning
// ============================================================================

/// Lifecycle status of a shard in the metadata store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShardStatus {
    /// Open for writes and searchable
    Open,
    /// Sealed, searchable
    Closed,
    /// Failed integrity checks; must be excluded from searches
    Corrupt,
    /// Logically deleted; excluded by the metadata query itself
    Deleted,
}

impl ShardStatus {
    /// Statuses a search is allowed to consider at all.
    pub fn searchable() -> &'static [ShardStatus] {
        &[ShardStatus::Open, ShardStatus::Closed, ShardStatus::Corrupt]
    }
}

/// Reference to one shard as returned by the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRef {
    pub id: ShardId,
    /// Node that currently owns this shard
    pub node: NodeName,
    /// Partition label, e.g. "2026-08-07" for a by-day partitioned index.
    /// Labels within one scheme order lexicographically by time.
    pub partition: String,
    pub status: ShardStatus,
    pub format_version: FormatVersion,
}

/// How an index maps event time onto partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionScheme {
    /// Single partition for all time
    All,
    ByDay,
    ByWeek,
    ByMonth,
    ByYear,
}

/// Resolved index definition from the metadata store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub uuid: IndexUuid,
    pub name: String,
    pub partition_scheme: PartitionScheme,
}

/// Half-open time filter applied to shard selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Unbounded range matching every partition.
    pub fn all() -> Self {
        TimeRange::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TimeRange {
            from: Some(from),
            to: Some(to),
        }
    }
}

// ============================================================================
// Queries
// ============================================================================

/// A compiled boolean search expression.
///
/// Compilation from the query language and field matching are external
/// collaborators; this type only carries the structure across the wire
/// and into the shard-searcher factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    Term { field: String, value: String },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Expression {
    /// Collect every term value in the expression tree, used to seed the
    /// result sink's highlight set.
    pub fn terms(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Term { value, .. } => out.push(value.as_str()),
            Expression::And(children) | Expression::Or(children) => {
                for child in children {
                    child.collect_terms(out);
                }
            }
            Expression::Not(child) => child.collect_terms(out),
        }
    }
}

/// The query portion of a search task: which index, which records, when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub index: IndexUuid,
    pub expression: Expression,
    pub time_range: TimeRange,
}

/// Date/time settings carried with the query so that every node resolves
/// partition boundaries identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeSettings {
    pub time_zone: String,
}

impl Default for DateTimeSettings {
    fn default() -> Self {
        DateTimeSettings {
            time_zone: "UTC".to_string(),
        }
    }
}

// ============================================================================
// Result aggregation
// ============================================================================

/// What a coprocessor does with matched records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoprocessorKind {
    /// Accumulate decorated rows, optionally stopping the whole search
    /// early once `max_results` rows have been gathered.
    Table { max_results: Option<u64> },
    /// Count matches only
    Count,
}

/// Settings for one result-aggregation coprocessor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoprocessorSettings {
    pub id: CoprocessorId,
    pub kind: CoprocessorKind,
    /// Stored fields this coprocessor needs from each matched record
    pub stored_fields: Vec<String>,
}

impl CoprocessorSettings {
    pub fn table(id: u32, max_results: Option<u64>, stored_fields: Vec<String>) -> Self {
        CoprocessorSettings {
            id: CoprocessorId(id),
            kind: CoprocessorKind::Table { max_results },
            stored_fields,
        }
    }

    pub fn count(id: u32) -> Self {
        CoprocessorSettings {
            id: CoprocessorId(id),
            kind: CoprocessorKind::Count,
            stored_fields: Vec::new(),
        }
    }
}

/// Raw stored fields of one matched record, as produced by a shard search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub shard: ShardId,
    /// (field name, stored value) pairs in projection order
    pub fields: Vec<(String, String)>,
}

/// One decorated result row produced by the extraction pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub shard: ShardId,
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_impls() {
        assert_eq!(ShardId(7).to_string(), "7");
        assert_eq!(NodeName::new("node1").to_string(), "node1");
        assert_eq!(TaskId(3).to_string(), "task:3");
        assert_eq!(NodeName::coordinator().as_str(), "coordinator");
    }

    #[test]
    fn test_query_key_generate_unique() {
        assert_ne!(QueryKey::generate(), QueryKey::generate());
    }

    #[test]
    fn test_expression_terms() {
        let expr = Expression::And(vec![
            Expression::Term {
                field: "message".into(),
                value: "error".into(),
            },
            Expression::Not(Box::new(Expression::Or(vec![Expression::Term {
                field: "level".into(),
                value: "debug".into(),
            }]))),
        ]);
        assert_eq!(expr.terms(), vec!["error", "debug"]);
    }

    #[test]
    fn test_expression_serde_round_trip() {
        let expr = Expression::Or(vec![Expression::Term {
            field: "host".into(),
            value: "web-1".into(),
        }]);
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
