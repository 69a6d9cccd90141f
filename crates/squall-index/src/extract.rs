//! Extraction pipeline contract
//!
//! Turns raw stored-field records drained from the handoff queue into
//! decorated result rows for the result sink. The real decoration
//! pipeline is an external collaborator; `PassThroughExtractor` maps
//! stored values straight into a row.

use squall_common::prelude::*;

/// Consumes raw records and produces decorated rows.
#[async_trait]
pub trait ExtractionPipeline: Send + Sync {
    async fn extract(&self, record: StoredRecord) -> Result<Vec<ResultRow>>;
}

/// Extraction that copies stored values into the row unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughExtractor;

#[async_trait]
impl ExtractionPipeline for PassThroughExtractor {
    async fn extract(&self, record: StoredRecord) -> Result<Vec<ResultRow>> {
        Ok(vec![ResultRow {
            shard: record.shard,
            values: record.fields.into_iter().map(|(_, v)| v).collect(),
        }])
    }
}
