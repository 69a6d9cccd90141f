//! # Squall Index
//!
//! Contracts between the search core and the index layer:
//! - Shard metadata store (`find_shards`) with time-partition resolution
//! - Shard searcher factory, pluggable per index format version
//! - Extraction pipeline consuming the raw record handoff queue
//!
//! The physical index storage format is out of scope; the in-memory
//! implementations here back tests and single-node deployments.

pub mod extract;
pub mod meta;
pub mod partition;
pub mod searcher;

pub use extract::{ExtractionPipeline, PassThroughExtractor};
pub use meta::{MemShardMetaStore, ShardMetaStore};
pub use partition::{partition_bounds, partition_label, PartitionBounds};
pub use searcher::{MemSearcherFactory, ShardSearcher, ShardSearcherFactory};
