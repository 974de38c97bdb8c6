//! Offset-paginated fetch of one day of mandi prices
//!
//! [`PagedFetcher`] is a pull-based, non-restartable sequence of pages. Each
//! page is retried in place on transient failures with capped exponential
//! backoff; anything else ends the sequence with an error.

use chrono::NaiveDate;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::error::FetchError;
use crate::logging::redact;
use crate::models::price_record::{PageResult, UpstreamPage, non_numeric_prices, unexpected_dates};
use crate::services::backoff::BackoffPolicy;
use crate::services::data_gov::{FetchFailure, FetchOutcome, PriceSource};

pub struct PagedFetcher<'a, S: PriceSource> {
    source: &'a S,
    target_date: NaiveDate,
    cursor: u64,
    page_size: u32,
    backoff: BackoffPolicy,
    deadline: Option<Instant>,
    pages_yielded: usize,
    finished: bool,
    deadline_hit: bool,
}

impl<'a, S: PriceSource> PagedFetcher<'a, S> {
    pub fn new(
        source: &'a S,
        target_date: NaiveDate,
        start_offset: u64,
        page_size: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            source,
            target_date,
            cursor: start_offset,
            page_size,
            backoff,
            deadline: None,
            pages_yielded: 0,
            finished: false,
            deadline_hit: false,
        }
    }

    /// Stop cleanly once `deadline` passes
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Offset of the next record to request
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// True when the sequence ended because the deadline passed
    pub fn stopped_by_deadline(&self) -> bool {
        self.deadline_hit
    }

    /// Next page, `None` once the sequence is over
    pub async fn next_page(&mut self) -> Option<Result<PageResult, FetchError>> {
        if self.finished {
            return None;
        }

        let page = match self.fetch_with_retry().await {
            Ok(Some(page)) => page,
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        let offset = self.cursor;
        let count = page.records.len() as u64;

        if count == 0 {
            self.finished = true;
            info!("No more records at offset={}", offset);
            if self.pages_yielded > 0 {
                return None;
            }
            self.pages_yielded += 1;
            return Some(Ok(PageResult {
                offset,
                records: Vec::new(),
                has_more: false,
            }));
        }

        let unexpected = unexpected_dates(&page.records, self.target_date);
        if !unexpected.is_empty() {
            self.finished = true;
            let message = format!(
                "unexpected arrival_date(s) {:?} while fetching {}",
                unexpected, self.target_date
            );
            error!("Error at offset={}: {}", offset, message);
            return Some(Err(FetchError::NonRetryable {
                offset,
                status: None,
                message,
            }));
        }

        let odd_prices = non_numeric_prices(&page.records);
        if odd_prices > 0 {
            warn!(
                "{} records at offset={} carry non-numeric prices; storing them as published",
                odd_prices, offset
            );
        }

        self.cursor += count;
        let full_page = count == u64::from(self.page_size);
        let has_more = full_page && page.total.is_none_or(|total| self.cursor < total);
        if !has_more {
            self.finished = true;
        }
        self.pages_yielded += 1;

        debug!(
            "Page {} at offset={} returned {} records (has_more={})",
            self.pages_yielded, offset, count, has_more
        );

        Some(Ok(PageResult {
            offset,
            records: page.records,
            has_more,
        }))
    }

    /// Request the page at the cursor until it succeeds, fails for good,
    /// or the deadline passes (`Ok(None)`)
    async fn fetch_with_retry(&mut self) -> Result<Option<UpstreamPage>, FetchError> {
        let mut attempts: u32 = 0;

        loop {
            if self.deadline_passed() {
                warn!("Stopping due to max runtime at offset={}", self.cursor);
                self.deadline_hit = true;
                return Ok(None);
            }

            attempts += 1;
            let outcome = self
                .source
                .fetch_page(self.target_date, self.cursor, self.page_size)
                .await;

            match outcome {
                FetchOutcome::Success(page) => {
                    if attempts > 1 {
                        info!(
                            "Offset={} succeeded on attempt {}/{}",
                            self.cursor, attempts, self.backoff.max_attempts
                        );
                    }
                    return Ok(Some(page));
                }
                FetchOutcome::NonRetryable(failure) => {
                    log_failure(self.cursor, &failure);
                    error!("Non-retryable error at offset={}; aborting", self.cursor);
                    return Err(FetchError::NonRetryable {
                        offset: self.cursor,
                        status: failure.status,
                        message: redact(&failure.message),
                    });
                }
                FetchOutcome::Retryable(failure) => {
                    log_failure(self.cursor, &failure);

                    if !self.backoff.allows_retry(attempts) {
                        error!(
                            "Giving up on offset={} after {} attempts",
                            self.cursor, attempts
                        );
                        return Err(FetchError::RetriesExhausted {
                            offset: self.cursor,
                            attempts,
                            last_error: redact(&failure.message),
                        });
                    }

                    let mut delay = self.backoff.delay_for(attempts - 1);
                    if let Some(deadline) = self.deadline {
                        delay = delay.min(deadline.saturating_duration_since(Instant::now()));
                    }
                    warn!(
                        "Attempt {}/{} at offset={} failed; retrying in {:?}",
                        attempts, self.backoff.max_attempts, self.cursor, delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

fn log_failure(offset: u64, failure: &FetchFailure) {
    error!("Error at offset={}: {}", offset, redact(&failure.message));
    if let Some(preview) = &failure.preview {
        error!("   preview: {}", preview);
    }
}
