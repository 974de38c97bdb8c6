//! Table size cap
//!
//! Once the table reaches the cap, the oldest stored day is dropped before
//! new rows come in.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::services::supabase::PriceStore;

/// Delete the earliest stored day when the table holds `max_total_rows` or
/// more. Returns the number of rows removed. `max_total_rows == 0` disables
/// the check; the target date and later days are never pruned.
pub async fn prune_if_needed<P: PriceStore>(
    store: &P,
    max_total_rows: u64,
    target_date: NaiveDate,
) -> Result<u64, StoreError> {
    if max_total_rows == 0 {
        return Ok(0);
    }

    let total = store.count_all().await?;
    if total < max_total_rows {
        return Ok(0);
    }

    let Some(earliest) = store.earliest_date().await? else {
        return Ok(0);
    };
    if earliest >= target_date {
        warn!(
            "Table holds {} rows (cap {}) but the earliest date {} is not before {}; not pruning",
            total, max_total_rows, earliest, target_date
        );
        return Ok(0);
    }

    let day_count = store.count_for_date(earliest).await?;
    store.delete_for_date(earliest).await?;
    warn!(
        "Pruned {} rows for earliest date {} (total >= {})",
        day_count, earliest, max_total_rows
    );
    info!("{} rows remain after pruning", total.saturating_sub(day_count));
    Ok(day_count)
}
