//! In-memory stand-ins for the upstream API and the backend

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Map;
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::models::price_record::{PriceRecord, UpstreamPage};
use crate::services::data_gov::{FetchFailure, FetchOutcome, PriceSource};
use crate::services::supabase::PriceStore;

pub fn record(date: NaiveDate, n: usize) -> PriceRecord {
    PriceRecord {
        state: Some("Maharashtra".to_string()),
        district: Some("Nashik".to_string()),
        market: Some(format!("Market {}", n)),
        commodity: Some("Onion".to_string()),
        variety: Some("Red".to_string()),
        grade: Some("FAQ".to_string()),
        arrival_date: date,
        min_price: None,
        max_price: None,
        modal_price: None,
        extra: Map::new(),
    }
}

pub fn records(date: NaiveDate, count: usize) -> Vec<PriceRecord> {
    (0..count).map(|n| record(date, n)).collect()
}

/// Scripted failure for the next request
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer normally
    Serve,
    Retryable(u16),
    NonRetryable(u16),
}

/// Upstream serving `records` by offset, with optional scripted failures
pub struct ScriptedSource {
    pub records: Vec<PriceRecord>,
    pub report_total: bool,
    pub script: Mutex<VecDeque<Scripted>>,
    /// (offset, time) of every request
    pub requests: Mutex<Vec<(u64, Instant)>>,
}

impl ScriptedSource {
    pub fn new(records: Vec<PriceRecord>) -> Self {
        Self {
            records,
            report_total: false,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, script: Vec<Scripted>) -> Self {
        *self.script.lock() = script.into();
        self
    }

    pub fn reporting_total(mut self) -> Self {
        self.report_total = true;
        self
    }

    pub fn request_offsets(&self) -> Vec<u64> {
        self.requests.lock().iter().map(|(offset, _)| *offset).collect()
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_page(&self, _date: NaiveDate, offset: u64, limit: u32) -> FetchOutcome {
        self.requests.lock().push((offset, Instant::now()));

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(Scripted::Retryable(status)) => {
                FetchOutcome::Retryable(FetchFailure::new(Some(status), format!("HTTP {}", status)))
            }
            Some(Scripted::NonRetryable(status)) => FetchOutcome::NonRetryable(FetchFailure::new(
                Some(status),
                format!("HTTP {}", status),
            )),
            Some(Scripted::Serve) | None => {
                let start = (offset as usize).min(self.records.len());
                let end = (start + limit as usize).min(self.records.len());
                FetchOutcome::Success(UpstreamPage {
                    records: self.records[start..end].to_vec(),
                    total: self.report_total.then_some(self.records.len() as u64),
                })
            }
        }
    }
}

/// Backend holding rows in memory
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<PriceRecord>>,
    /// Size of every insert call, in order
    pub inserts: Mutex<Vec<usize>>,
    pub unavailable: bool,
    pub reject_inserts: bool,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<PriceRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn insert_sizes(&self) -> Vec<usize> {
        self.inserts.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn count_for_date(&self, date: NaiveDate) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.rows.lock().iter().filter(|r| r.arrival_date == date).count() as u64)
    }

    async fn count_all(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.rows.lock().len() as u64)
    }

    async fn earliest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        self.check()?;
        Ok(self.rows.lock().iter().map(|r| r.arrival_date).min())
    }

    async fn delete_for_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        self.check()?;
        self.rows.lock().retain(|r| r.arrival_date != date);
        Ok(())
    }

    async fn insert_batch(&self, records: &[PriceRecord]) -> Result<(), StoreError> {
        self.check()?;
        if self.reject_inserts {
            return Err(StoreError::WriteRejected {
                status: 409,
                body: "duplicate key value violates unique constraint".into(),
            });
        }
        self.inserts.lock().push(records.len());
        self.rows.lock().extend_from_slice(records);
        Ok(())
    }
}
