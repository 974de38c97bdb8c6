//! Supabase (PostgREST) persistence for mandi prices

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

use crate::config::SupabaseConfig;
use crate::error::StoreError;
use crate::logging::redact;
use crate::models::price_record::{PriceRecord, parse_arrival_date};

/// Attempts for idempotent reads before giving up
const READ_ATTEMPTS: u32 = 3;

/// Delay between read attempts
const READ_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Backend that stores mandi prices partitioned by arrival date
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Rows stored for `date`
    async fn count_for_date(&self, date: NaiveDate) -> Result<u64, StoreError>;

    /// Rows stored overall
    async fn count_all(&self) -> Result<u64, StoreError>;

    /// Oldest arrival date in the table, if any
    async fn earliest_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Delete every row of `date`
    async fn delete_for_date(&self, date: NaiveDate) -> Result<(), StoreError>;

    /// Insert a batch in a single request
    async fn insert_batch(&self, records: &[PriceRecord]) -> Result<(), StoreError>;
}

#[derive(Debug, Deserialize)]
struct ArrivalDateRow {
    arrival_date: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseService {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseService {
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| StoreError::Unavailable("API key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| StoreError::Unavailable("API key is not a valid header value".into()))?;
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.table)
    }

    /// Send an idempotent request, retrying connection failures and 5xx
    async fn send_read<F>(&self, build: F) -> Result<Response, StoreError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = String::new();

        for attempt in 1..=READ_ATTEMPTS {
            match build().send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    last_error = format!("HTTP {}", resp.status());
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    last_error = redact(&e.without_url().to_string());
                }
            }

            if attempt < READ_ATTEMPTS {
                tracing::warn!(
                    "Supabase read attempt {}/{} failed: {}",
                    attempt,
                    READ_ATTEMPTS,
                    last_error
                );
                tokio::time::sleep(READ_RETRY_DELAY * attempt).await;
            }
        }

        Err(StoreError::Unavailable(last_error))
    }

    async fn count(&self, date: Option<NaiveDate>) -> Result<u64, StoreError> {
        let url = self.table_url();
        let mut query = vec![("select", "id".to_string())];
        if let Some(date) = date {
            query.push(("arrival_date", format!("eq.{}", date)));
        }

        let response = self
            .send_read(|| {
                self.client
                    .head(&url)
                    .query(&query)
                    .header("Prefer", "count=exact")
            })
            .await?;
        let response = ensure_read(response).await?;

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::UnexpectedResponse("missing Content-Range header".into()))?;

        parse_content_range_total(range).ok_or_else(|| {
            StoreError::UnexpectedResponse(format!("cannot read row count from {:?}", range))
        })
    }
}

#[async_trait]
impl PriceStore for SupabaseService {
    async fn count_for_date(&self, date: NaiveDate) -> Result<u64, StoreError> {
        self.count(Some(date)).await
    }

    async fn count_all(&self) -> Result<u64, StoreError> {
        self.count(None).await
    }

    async fn earliest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let url = self.table_url();
        let response = self
            .send_read(|| {
                self.client.get(&url).query(&[
                    ("select", "arrival_date"),
                    ("order", "arrival_date.asc"),
                    ("limit", "1"),
                ])
            })
            .await?;
        let response = ensure_read(response).await?;

        let rows: Vec<ArrivalDateRow> = response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))?;

        match rows.into_iter().next().and_then(|row| row.arrival_date) {
            Some(raw) => parse_arrival_date(&raw).map(Some).ok_or_else(|| {
                StoreError::UnexpectedResponse(format!("unparsable arrival_date {:?}", raw))
            }),
            None => Ok(None),
        }
    }

    async fn delete_for_date(&self, date: NaiveDate) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.table_url())
            .query(&[("arrival_date", format!("eq.{}", date))])
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(redact(&e.without_url().to_string())))?;

        ensure_written(response).await
    }

    async fn insert_batch(&self, records: &[PriceRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(redact(&e.without_url().to_string())))?;

        ensure_written(response).await
    }
}

async fn ensure_read(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(StoreError::UnexpectedResponse(format!(
        "HTTP {} on read: {}",
        status.as_u16(),
        error_body(response).await
    )))
}

async fn ensure_written(response: Response) -> Result<(), StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    Err(StoreError::WriteRejected {
        status: status.as_u16(),
        body: error_body(response).await,
    })
}

async fn error_body(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    redact(body.trim())
}

/// Total from a PostgREST `Content-Range` such as `0-24/3573` or `*/0`
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}
