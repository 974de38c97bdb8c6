//! data.gov.in resource client
//!
//! One call is one HTTP request. Retrying is the caller's job; this module
//! only says whether a failure is worth retrying.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};

use crate::config::DataGovConfig;
use crate::logging::{body_preview, redact};
use crate::models::price_record::UpstreamPage;
use crate::services::target_date::to_api_date;

pub const CLIENT_USER_AGENT: &str = "mandi-fetcher/1.0";

/// Why a request did not produce a page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub status: Option<u16>,
    pub message: String,
    /// Redacted excerpt of the response body, if worth logging
    pub preview: Option<String>,
}

impl FetchFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Option<String>) -> Self {
        self.preview = preview;
        self
    }
}

/// Result of a single upstream request
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(UpstreamPage),
    /// Network trouble, timeouts, 5xx, 429
    Retryable(FetchFailure),
    /// Other 4xx, malformed body
    NonRetryable(FetchFailure),
}

/// Source of mandi price pages
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_page(&self, date: NaiveDate, offset: u64, limit: u32) -> FetchOutcome;
}

/// Whether an HTTP status is transient
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Clone)]
pub struct DataGovService {
    client: Client,
    config: DataGovConfig,
}

impl DataGovService {
    /// Build the service with one pooled client for the whole run
    pub fn new(config: DataGovConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DataGovConfig {
        &self.config
    }

    fn query(&self, date: NaiveDate, offset: u64, limit: u32) -> Vec<(&'static str, String)> {
        vec![
            ("api-key", self.config.api_key.clone()),
            ("format", "json".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
            ("filters[arrival_date]", to_api_date(date)),
        ]
    }
}

#[async_trait]
impl PriceSource for DataGovService {
    async fn fetch_page(&self, date: NaiveDate, offset: u64, limit: u32) -> FetchOutcome {
        tracing::debug!("GET data.gov.in offset={} limit={} date={}", offset, limit, date);

        let response = match self
            .client
            .get(self.config.resource_url())
            .query(&self.query(date, offset, limit))
            .send()
            .await
        {
            Ok(resp) => resp,
            // The URL carries the api key
            Err(e) => {
                return FetchOutcome::Retryable(FetchFailure::new(
                    None,
                    redact(&e.without_url().to_string()),
                ));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return FetchOutcome::Retryable(FetchFailure::new(
                    Some(status.as_u16()),
                    format!("failed to read body: {}", redact(&e.without_url().to_string())),
                ));
            }
        };

        if is_retryable_status(status) {
            return FetchOutcome::Retryable(
                FetchFailure::new(Some(status.as_u16()), format!("HTTP {} from data.gov.in", status))
                    .with_preview(body_preview(&body)),
            );
        }

        if !status.is_success() {
            return FetchOutcome::NonRetryable(
                FetchFailure::new(Some(status.as_u16()), format!("HTTP {} from data.gov.in", status))
                    .with_preview(body_preview(&body)),
            );
        }

        match serde_json::from_str::<UpstreamPage>(&body) {
            Ok(page) => FetchOutcome::Success(page),
            Err(e) => FetchOutcome::NonRetryable(
                FetchFailure::new(
                    Some(status.as_u16()),
                    format!("unexpected response from data.gov.in: {}", e),
                )
                .with_preview(body_preview(&body)),
            ),
        }
    }
}
