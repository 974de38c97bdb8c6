//! Mandi prices sync job
//!
//! One invocation: pick the target date, find where the previous run left
//! off, then fetch and persist pages until upstream runs dry. Nothing is
//! checkpointed locally; the next run re-derives its offset from the table.

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::Instant;
use tracing::{error, info};

use crate::RunContext;
use crate::error::RunError;
use crate::jobs::paged_fetcher::PagedFetcher;
use crate::jobs::persister::Persister;
use crate::jobs::resume_counter::count_existing;
use crate::jobs::retention::prune_if_needed;
use crate::services::data_gov::PriceSource;
use crate::services::supabase::PriceStore;
use crate::services::target_date::{DateSelector, to_api_date};

/// What a completed run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub target_date: NaiveDate,
    pub start_offset: u64,
    pub final_offset: u64,
    pub pages_persisted: usize,
    pub rows_persisted: usize,
    pub rows_pruned: u64,
    pub stopped_by_deadline: bool,
}

/// Run the sync once, as of `now`
pub async fn run<S, P>(ctx: &RunContext<S, P>, now: DateTime<Utc>) -> Result<RunSummary, RunError>
where
    S: PriceSource,
    P: PriceStore,
{
    let settings = &ctx.settings;
    let started = Instant::now();
    let deadline = started + settings.max_runtime;

    let target_date = DateSelector::new(settings.rollover_hour, settings.timezone).select(now);

    let rows_pruned = prune_if_needed(&ctx.store, settings.max_total_rows, target_date).await?;
    let start_offset = count_existing(&ctx.store, target_date).await?;

    info!(
        date = %target_date,
        api_date = %to_api_date(target_date),
        offset = start_offset,
        limit = settings.page_size,
        max_runtime_s = settings.max_runtime.as_secs(),
        "Starting mandi fetch"
    );

    let mut fetcher = PagedFetcher::new(
        &ctx.source,
        target_date,
        start_offset,
        settings.page_size,
        settings.backoff.clone(),
    )
    .with_deadline(deadline);
    let persister = Persister::new(&ctx.store);

    let mut pages_persisted = 0;
    let mut rows_persisted = 0;

    while let Some(page) = fetcher.next_page().await {
        let page = page?;
        if page.is_empty() {
            info!("Nothing new for {} beyond offset={}", target_date, page.offset);
            continue;
        }

        let written = persister.persist(&page.records).await.map_err(|e| {
            error!("Insert failed at offset={}: {}", page.offset, e);
            e
        })?;
        pages_persisted += 1;
        rows_persisted += written;

        info!(
            "Inserted {} records | offset now {}",
            written,
            page.offset + written as u64
        );
    }

    let summary = RunSummary {
        target_date,
        start_offset,
        final_offset: fetcher.cursor(),
        pages_persisted,
        rows_persisted,
        rows_pruned,
        stopped_by_deadline: fetcher.stopped_by_deadline(),
    };

    info!(
        "Run complete for {}: {} rows in {} pages (offset {} -> {}) in {}s",
        summary.target_date,
        summary.rows_persisted,
        summary.pages_persisted,
        summary.start_offset,
        summary.final_offset,
        started.elapsed().as_secs()
    );

    Ok(summary)
}
