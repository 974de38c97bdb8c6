//! Target date selection
//!
//! data.gov.in publishes a day's mandi prices with a lag, so before the
//! rollover hour (publisher local time) the run targets yesterday.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::DateError;

/// Target date for a run started at `now`, using the hour in `now`'s zone
pub fn select_target_date<Z: TimeZone>(now: &DateTime<Z>, rollover_hour: u32) -> NaiveDate {
    let today = now.date_naive();
    if now.hour() < rollover_hour {
        today.pred_opt().unwrap_or(today)
    } else {
        today
    }
}

/// Upstream filter format, `DD/MM/YYYY`
pub fn to_api_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Rollover policy bound to the publisher's timezone
#[derive(Debug, Clone, Copy)]
pub struct DateSelector {
    pub rollover_hour: u32,
    pub timezone: Tz,
}

impl DateSelector {
    pub fn new(rollover_hour: u32, timezone: Tz) -> Self {
        Self {
            rollover_hour,
            timezone,
        }
    }

    pub fn select(&self, now: DateTime<Utc>) -> NaiveDate {
        select_target_date(&now.with_timezone(&self.timezone), self.rollover_hour)
    }

    /// Same as [`DateSelector::select`] for an RFC 3339 timestamp
    pub fn select_from_str(&self, raw: &str) -> Result<NaiveDate, DateError> {
        let now = DateTime::parse_from_rfc3339(raw.trim())
            .map_err(|e| DateError::InvalidInput(format!("{:?}: {}", raw, e)))?;
        Ok(self.select(now.with_timezone(&Utc)))
    }
}
