//! Shard metadata store
//!
//! The metadata service owns index definitions and shard placement. The
//! search core only consumes this contract; `MemShardMetaStore` is the
//! concurrent in-memory implementation used by tests and single-node
//! deployments.

use dashmap::DashMap;
use squall_common::prelude::*;

use crate::partition::PartitionBounds;

/// Index metadata service consumed by the shard map builder and the
/// shard search workers.
pub trait ShardMetaStore: Send + Sync {
    /// Resolve an index definition; `None` when the index does not exist.
    fn resolve_index(&self, uuid: IndexUuid) -> Option<IndexDef>;

    /// Fetch shard metadata for an index, restricted to the given
    /// statuses and partition bounds, ordered by partition then shard id.
    fn find_shards(
        &self,
        index: IndexUuid,
        statuses: &[ShardStatus],
        bounds: &PartitionBounds,
    ) -> Result<Vec<ShardRef>>;

    /// Look up a single shard by id.
    fn get_shard(&self, id: ShardId) -> Option<ShardRef>;
}

/// In-memory shard metadata store
#[derive(Default)]
pub struct MemShardMetaStore {
    indexes: DashMap<IndexUuid, IndexDef>,
    shards: DashMap<ShardId, (IndexUuid, ShardRef)>,
}

impl MemShardMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_index(&self, def: IndexDef) {
        self.indexes.insert(def.uuid, def);
    }

    pub fn add_shard(&self, index: IndexUuid, shard: ShardRef) {
        self.shards.insert(shard.id, (index, shard));
    }

    /// Drop a shard from the store entirely (simulates a lost shard).
    pub fn remove_shard(&self, id: ShardId) {
        self.shards.remove(&id);
    }

    pub fn set_status(&self, id: ShardId, status: ShardStatus) {
        if let Some(mut entry) = self.shards.get_mut(&id) {
            entry.1.status = status;
        }
    }
}

impl ShardMetaStore for MemShardMetaStore {
    fn resolve_index(&self, uuid: IndexUuid) -> Option<IndexDef> {
        self.indexes.get(&uuid).map(|e| e.clone())
    }

    fn find_shards(
        &self,
        index: IndexUuid,
        statuses: &[ShardStatus],
        bounds: &PartitionBounds,
    ) -> Result<Vec<ShardRef>> {
        let mut out: Vec<ShardRef> = self
            .shards
            .iter()
            .filter(|e| e.value().0 == index)
            .map(|e| e.value().1.clone())
            .filter(|s| statuses.contains(&s.status))
            .filter(|s| bounds.contains(&s.partition))
            .collect();
        out.sort_by(|a, b| a.partition.cmp(&b.partition).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn get_shard(&self, id: ShardId) -> Option<ShardRef> {
        self.shards.get(&id).map(|e| e.1.clone())
    }
}
