use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// One mandi price row as published by data.gov.in
///
/// Only strings are trimmed and `arrival_date` becomes ISO; prices and
/// unknown fields go to the backend as published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(default, deserialize_with = "trimmed")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub district: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub market: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub commodity: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub variety: Option<String>,
    #[serde(default, deserialize_with = "trimmed")]
    pub grade: Option<String>,
    #[serde(deserialize_with = "arrival_date")]
    pub arrival_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<RawPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<RawPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_price: Option<RawPrice>,
    #[serde(flatten, deserialize_with = "trimmed_map")]
    pub extra: Map<String, Value>,
}

/// A price exactly as upstream sent it (string trimmed)
///
/// data.gov.in mixes numbers, numeric strings and placeholders such as
/// `"NR"` or `"N/A"`; none of them may fail a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawPrice(pub Value);

impl RawPrice {
    /// Numeric value, if the price is one
    pub fn as_decimal(&self) -> Option<Decimal> {
        match &self.0 {
            Value::Number(n) => parse_decimal(&n.to_string()),
            Value::String(s) => parse_decimal(s),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RawPrice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(RawPrice(trim_value(Value::deserialize(deserializer)?)))
    }
}

impl From<&str> for RawPrice {
    fn from(raw: &str) -> Self {
        RawPrice(Value::String(raw.to_string()))
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// One page of the upstream resource
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamPage {
    pub records: Vec<PriceRecord>,
    /// Total matching rows, when upstream reports it
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: Option<u64>,
}

/// A page handed from the fetcher to the persister
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    /// Cursor the page was requested at
    pub offset: u64,
    pub records: Vec<PriceRecord>,
    pub has_more: bool,
}

impl PageResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse `DD/MM/YYYY` (upstream) or `YYYY-MM-DD` (already normalized)
pub fn parse_arrival_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Records with a price present but not numeric
pub fn non_numeric_prices(records: &[PriceRecord]) -> usize {
    records
        .iter()
        .filter(|r| {
            [&r.min_price, &r.max_price, &r.modal_price]
                .into_iter()
                .flatten()
                .any(|p| p.as_decimal().is_none())
        })
        .count()
}

/// Distinct arrival dates in `records` that differ from `expected`
pub fn unexpected_dates(records: &[PriceRecord], expected: NaiveDate) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = records
        .iter()
        .map(|r| r.arrival_date)
        .filter(|d| *d != expected)
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

fn trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn arrival_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_arrival_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized arrival_date {:?}", raw)))
}

fn trim_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other,
    }
}

fn trimmed_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Map::<String, Value>::deserialize(deserializer)?;
    Ok(map.into_iter().map(|(k, v)| (k, trim_value(v))).collect())
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
