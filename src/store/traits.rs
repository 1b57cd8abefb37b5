//! `OutcomeStore` trait: append-only persistence for outcome records.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::OutcomeRecord;

/// Append-only store of outcome records.
///
/// There is deliberately no update or delete operation. Each `record` is a
/// single atomic append; implementations serialize concurrent writers.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Append one record.
    async fn record(&self, outcome: &OutcomeRecord) -> Result<(), DatabaseError>;

    /// Most recent records first, up to `limit`.
    async fn list_outcomes(&self, limit: usize) -> Result<Vec<OutcomeRecord>, DatabaseError>;

    /// All records for one email, oldest first.
    async fn outcomes_for_email(&self, email_id: &str)
    -> Result<Vec<OutcomeRecord>, DatabaseError>;

    /// Total number of records.
    async fn count_outcomes(&self) -> Result<usize, DatabaseError>;
}
