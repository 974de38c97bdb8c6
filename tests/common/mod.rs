//! Fake data.gov.in and Supabase servers for integration tests
#![allow(dead_code)]

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header::CONTENT_RANGE},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use mandi_fetcher::RunContext;
use mandi_fetcher::config::{DataGovConfig, RunSettings, SupabaseConfig};
use mandi_fetcher::services::backoff::BackoffPolicy;
use mandi_fetcher::services::data_gov::DataGovService;
use mandi_fetcher::services::supabase::SupabaseService;

pub const TEST_API_KEY: &str = "test-data-gov-key";
pub const TEST_SERVICE_KEY: &str = "test-service-key";
pub const TEST_TABLE: &str = "mandi_prices";

/// Ordered log of upstream fetches and backend inserts, shared by both fakes
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn target_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 18).unwrap()
}

/// 10:00 IST on `target_day()`
pub fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 18, 4, 30, 0).unwrap()
}

/// A row as data.gov.in publishes it
pub fn upstream_record(n: usize) -> Value {
    json!({
        "state": "Maharashtra",
        "district": "Nashik",
        "market": format!("Market {}", n),
        "commodity": "Onion",
        "variety": "Red",
        "grade": "FAQ",
        "arrival_date": "18/10/2024",
        "min_price": "2000",
        "max_price": "3000",
        "modal_price": "2500"
    })
}

/// A row as the backend stores it
pub fn stored_row(date: &str, n: usize) -> Value {
    json!({
        "market": format!("Market {}", n),
        "commodity": "Onion",
        "arrival_date": date,
        "modal_price": 2500.0
    })
}

pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ---------------------------------------------------------------------------
// data.gov.in

/// Scripted answer to the next upstream request
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    /// 200 with this body
    Body(&'static str),
}

pub struct FakeDataGov {
    pub records: Vec<Value>,
    /// Answers given before serving normally again
    pub script: Mutex<VecDeque<Reply>>,
    /// Query parameters of every request
    pub requests: Mutex<Vec<HashMap<String, String>>>,
    pub events: Events,
}

impl FakeDataGov {
    pub fn new(count: usize, events: Events) -> Arc<Self> {
        Self::scripted(count, Vec::new(), events)
    }

    pub fn scripted(count: usize, script: Vec<Reply>, events: Events) -> Arc<Self> {
        Self::with_records((0..count).map(upstream_record).collect(), script, events)
    }

    pub fn with_records(records: Vec<Value>, script: Vec<Reply>, events: Events) -> Arc<Self> {
        Arc::new(Self {
            records,
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            events,
        })
    }

    pub fn request_offsets(&self) -> Vec<u64> {
        self.requests
            .lock()
            .iter()
            .filter_map(|params| params.get("offset")?.parse().ok())
            .collect()
    }

    pub async fn start(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route("/resource/{id}", get(resource))
            .with_state(self.clone());
        serve(app).await
    }
}

async fn resource(
    State(fake): State<Arc<FakeDataGov>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
    fake.requests.lock().push(params);
    fake.events.lock().push(format!("fetch {}", offset));

    let scripted = fake.script.lock().pop_front();
    match scripted {
        Some(Reply::Status(status)) => {
            let status = StatusCode::from_u16(status).unwrap();
            return (status, "<html><body>Service Unavailable</body></html>").into_response();
        }
        Some(Reply::Body(body)) => return (StatusCode::OK, body).into_response(),
        None => {}
    }

    let start = offset.min(fake.records.len());
    let end = (start + limit).min(fake.records.len());
    Json(json!({
        "status": "ok",
        "total": fake.records.len(),
        "count": end - start,
        "offset": offset.to_string(),
        "limit": limit.to_string(),
        "records": fake.records[start..end],
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Supabase (PostgREST)

#[derive(Default)]
pub struct FakePostgrest {
    pub rows: Mutex<Vec<Value>>,
    /// Statuses answered to reads (GET/HEAD) before serving normally again
    pub read_failures: Mutex<VecDeque<u16>>,
    /// Headers of every request
    pub headers: Mutex<Vec<HeaderMap>>,
    pub reject_inserts: bool,
    pub events: Events,
}

impl FakePostgrest {
    pub fn new(rows: Vec<Value>, events: Events) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            events,
            ..Default::default()
        })
    }

    pub fn rejecting(events: Events) -> Arc<Self> {
        Arc::new(Self {
            reject_inserts: true,
            events,
            ..Default::default()
        })
    }

    pub fn failing_reads(rows: Vec<Value>, statuses: Vec<u16>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            read_failures: Mutex::new(statuses.into()),
            ..Default::default()
        })
    }

    pub fn rows_for(&self, date: &str) -> usize {
        self.rows
            .lock()
            .iter()
            .filter(|row| row["arrival_date"] == date)
            .count()
    }

    pub async fn start(self: &Arc<Self>) -> String {
        let app = Router::new()
            .route(
                &format!("/rest/v1/{}", TEST_TABLE),
                get(select_rows).post(insert_rows).delete(delete_rows),
            )
            .with_state(self.clone());
        serve(app).await
    }
}

fn date_filter(params: &HashMap<String, String>) -> Option<String> {
    params
        .get("arrival_date")
        .and_then(|v| v.strip_prefix("eq."))
        .map(str::to_string)
}

// GET and HEAD: either the earliest-date lookup or an exact count
async fn select_rows(
    State(fake): State<Arc<FakePostgrest>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    fake.headers.lock().push(headers);

    let failure = fake.read_failures.lock().pop_front();
    if let Some(status) = failure {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({ "message": "JWT expired" }))).into_response();
    }

    if params.contains_key("order") {
        let earliest = fake
            .rows
            .lock()
            .iter()
            .filter_map(|row| row["arrival_date"].as_str().map(str::to_string))
            .min();
        let body = match earliest {
            Some(date) => json!([{ "arrival_date": date }]),
            None => json!([]),
        };
        return Json(body).into_response();
    }

    let count = match date_filter(&params) {
        Some(date) => fake.rows_for(&date),
        None => fake.rows.lock().len(),
    };
    let range = if count == 0 {
        "*/0".to_string()
    } else {
        format!("0-{}/{}", count - 1, count)
    };
    (StatusCode::OK, [(CONTENT_RANGE, range)], "").into_response()
}

async fn insert_rows(
    State(fake): State<Arc<FakePostgrest>>,
    headers: HeaderMap,
    Json(rows): Json<Vec<Value>>,
) -> Response {
    fake.headers.lock().push(headers);

    if fake.reject_inserts {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })),
        )
            .into_response();
    }

    fake.events.lock().push(format!("insert {}", rows.len()));
    fake.rows.lock().extend(rows);
    StatusCode::CREATED.into_response()
}

async fn delete_rows(
    State(fake): State<Arc<FakePostgrest>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(date) = date_filter(&params) else {
        return (StatusCode::BAD_REQUEST, "DELETE requires a filter").into_response();
    };
    fake.rows.lock().retain(|row| row["arrival_date"] != date.as_str());
    StatusCode::NO_CONTENT.into_response()
}

// ---------------------------------------------------------------------------
// Wiring

pub fn data_gov_config(base: &str) -> DataGovConfig {
    DataGovConfig {
        base_url: format!("{}/resource", base),
        resource_id: "test-resource".to_string(),
        api_key: TEST_API_KEY.to_string(),
        connect_timeout: Duration::from_secs(2),
        timeout: Duration::from_secs(5),
    }
}

pub fn supabase_config(base: &str) -> SupabaseConfig {
    SupabaseConfig {
        url: base.to_string(),
        api_key: TEST_SERVICE_KEY.to_string(),
        table: TEST_TABLE.to_string(),
    }
}

/// Small real delays; the fakes do real I/O so the clock cannot be paused
pub fn fast_settings(page_size: u32) -> RunSettings {
    RunSettings {
        page_size,
        backoff: BackoffPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            jitter_ratio: 0.0,
            max_attempts: 4,
        },
        max_total_rows: 0,
        ..RunSettings::default()
    }
}

pub async fn context(
    upstream: &Arc<FakeDataGov>,
    backend: &Arc<FakePostgrest>,
    settings: RunSettings,
) -> RunContext<DataGovService, SupabaseService> {
    let upstream_url = upstream.start().await;
    let backend_url = backend.start().await;
    RunContext::new(
        settings,
        DataGovService::new(data_gov_config(&upstream_url)).unwrap(),
        SupabaseService::new(supabase_config(&backend_url)).unwrap(),
    )
}
