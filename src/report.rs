//! Aggregate metrics derived from stored outcome records.
//!
//! Nothing here is updated by the pipeline; a summary is computed from
//! whatever the outcome log returns at read time.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::DatabaseError;
use crate::pipeline::types::{Category, OutcomeRecord, OutcomeStatus};
use crate::store::OutcomeStore;

/// Read-time summary over a set of outcome records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutcomeSummary {
    pub total: usize,
    pub sent: usize,
    pub escalated: usize,
    pub errored: usize,
    /// Records whose category fell back to `other` on unusable model output.
    pub defaulted_classifications: usize,
    pub by_category: BTreeMap<Category, usize>,
    /// Fraction of records with status `error`, 0.0 when empty.
    pub error_rate: f64,
}

impl OutcomeSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OutcomeRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.total += 1;
            match record.status {
                OutcomeStatus::Sent => summary.sent += 1,
                OutcomeStatus::Escalated => summary.escalated += 1,
                OutcomeStatus::Error => summary.errored += 1,
            }
            if record.category_defaulted {
                summary.defaulted_classifications += 1;
            }
            *summary.by_category.entry(record.category).or_insert(0) += 1;
        }
        if summary.total > 0 {
            summary.error_rate = summary.errored as f64 / summary.total as f64;
        }
        summary
    }

    /// Summarize the most recent `limit` records in a store.
    pub async fn from_store(store: &dyn OutcomeStore, limit: usize) -> Result<Self, DatabaseError> {
        let records = store.list_outcomes(limit).await?;
        Ok(Self::from_records(&records))
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processed: {}", self.total)?;
        writeln!(f, "  sent:      {}", self.sent)?;
        writeln!(f, "  escalated: {}", self.escalated)?;
        writeln!(f, "  error:     {}", self.errored)?;
        writeln!(f, "Error rate: {:.1}%", self.error_rate * 100.0)?;
        writeln!(f, "Defaulted classifications: {}", self.defaulted_classifications)?;
        writeln!(f, "By category:")?;
        for category in Category::ALL {
            let count = self.by_category.get(&category).copied().unwrap_or(0);
            writeln!(f, "  {:<16} {count}", category.label())?;
        }
        Ok(())
    }
}
