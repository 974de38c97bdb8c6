//! Page-at-a-time writes to the backend

use crate::error::StoreError;
use crate::models::price_record::PriceRecord;
use crate::services::supabase::PriceStore;

/// Writes each fetched page with a single insert call
///
/// No deduplication happens here: overlapping pages across runs produce
/// duplicate rows unless the table has a unique constraint.
pub struct Persister<'a, P: PriceStore> {
    store: &'a P,
}

impl<'a, P: PriceStore> Persister<'a, P> {
    pub fn new(store: &'a P) -> Self {
        Self { store }
    }

    /// Persist one page; returns the number of rows written
    pub async fn persist(&self, records: &[PriceRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.store.insert_batch(records).await?;
        Ok(records.len())
    }
}
