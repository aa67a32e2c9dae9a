use crate::TallyError;
use crate::table::AggregationTable;
use std::sync::Mutex;

/// Owns the run-wide table and folds private tables into it one at a time.
///
/// `merge` holds the lock for the whole fold, so concurrent callers are
/// serialized. Private tables are moved in and consumed; counts add up.
pub struct Merger {
    table: Mutex<AggregationTable>,
}

impl Merger {
    pub fn new(table: AggregationTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    pub fn merge(&self, local: AggregationTable) -> Result<(), TallyError> {
        let distinct = local.len();
        let mut table = self.table.lock()?;
        for entry in local.into_entries() {
            table.insert(entry.token, entry.count);
        }
        tracing::debug!(distinct, total_distinct = table.len(), "merged private table");
        Ok(())
    }

    pub fn into_inner(self) -> Result<AggregationTable, TallyError> {
        Ok(self.table.into_inner()?)
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(AggregationTable::new())
    }
}
