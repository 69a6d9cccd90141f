//! Shard map builder
//!
//! Resolves a query's target index and time filter into the set of
//! candidate shards, excludes corrupt shards (reporting the corruption
//! as a per-node error), and groups the remainder by owning node. The
//! resulting assignment is a partition: shard sets for distinct nodes
//! are pairwise disjoint.

use std::collections::BTreeMap;

use squall_common::prelude::*;
use squall_index::{partition_bounds, ShardMetaStore};

use crate::sink::ResultSink;

/// Mapping from node name to the shard ids that node must search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardAssignment {
    by_node: BTreeMap<NodeName, Vec<ShardId>>,
}

impl ShardAssignment {
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeName> {
        self.by_node.keys()
    }

    pub fn shards_for(&self, node: &NodeName) -> Option<&[ShardId]> {
        self.by_node.get(node).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeName, &Vec<ShardId>)> {
        self.by_node.iter()
    }

    pub fn total_shards(&self) -> usize {
        self.by_node.values().map(Vec::len).sum()
    }

    fn push(&mut self, node: NodeName, shard: ShardId) {
        self.by_node.entry(node).or_default().push(shard);
    }
}

/// Build the shard assignment for a query.
///
/// Fails fast with a search error when the index cannot be resolved; no
/// partial dispatch may happen after that. Corrupt shards are excluded
/// and recorded against their owning node. Deleted shards never come
/// back from the metadata query.
pub fn build_shard_assignment(
    meta: &dyn ShardMetaStore,
    query: &SearchQuery,
    sink: &ResultSink,
) -> Result<ShardAssignment> {
    let index = meta
        .resolve_index(query.index)
        .ok_or_else(|| SearchError::IndexNotFound(query.index.to_string()))?;

    let bounds = partition_bounds(index.partition_scheme, &query.time_range);
    let shards = meta.find_shards(query.index, ShardStatus::searchable(), &bounds)?;

    debug!(
        index = %index.name,
        candidates = shards.len(),
        "building shard assignment"
    );

    let mut assignment = ShardAssignment::default();
    for shard in shards {
        if shard.status == ShardStatus::Corrupt {
            sink.record_error(&shard.node, SearchError::ShardCorrupt(shard.id).to_string());
            continue;
        }
        assignment.push(shard.node, shard.id);
    }
    Ok(assignment)
}
