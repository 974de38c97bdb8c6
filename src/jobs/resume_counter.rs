//! Resume offset from rows already stored downstream

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::services::supabase::PriceStore;

/// Rows already persisted for `target_date`, i.e. the offset to resume from
///
/// Read once per run. Backend failures are returned as-is; the store client
/// has already applied its own read retries.
pub async fn count_existing<P: PriceStore>(
    store: &P,
    target_date: NaiveDate,
) -> Result<u64, StoreError> {
    let offset = store.count_for_date(target_date).await?;
    tracing::info!("{} rows already stored for {}", offset, target_date);
    Ok(offset)
}
