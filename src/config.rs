//! Run configuration
//!
//! Everything comes from the process environment (after `.env` is loaded by
//! `main`). Only the Supabase URL and key are required; the rest have
//! defaults matching the production cron setup.

use chrono_tz::Tz;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::services::backoff::BackoffPolicy;

pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_API_KEY: &str = "SUPABASE_API_KEY";
pub const ENV_SUPABASE_TABLE: &str = "SUPABASE_TABLE";
pub const ENV_DATA_GOV_API_KEY: &str = "DATA_GOV_API_KEY";
pub const ENV_DATA_GOV_BASE_URL: &str = "DATA_GOV_BASE_URL";
pub const ENV_DATA_GOV_RESOURCE_ID: &str = "DATA_GOV_RESOURCE_ID";
pub const ENV_PAGE_LIMIT: &str = "MANDI_PAGE_LIMIT";
pub const ENV_ROLLOVER_HOUR: &str = "MANDI_ROLLOVER_HOUR";
pub const ENV_TIMEZONE: &str = "MANDI_TIMEZONE";
pub const ENV_MAX_ATTEMPTS: &str = "MANDI_MAX_ATTEMPTS";
pub const ENV_BACKOFF_BASE_SECS: &str = "MANDI_BACKOFF_BASE_SECS";
pub const ENV_BACKOFF_MAX_SECS: &str = "MANDI_BACKOFF_MAX_SECS";
pub const ENV_JITTER_RATIO: &str = "MANDI_JITTER_RATIO";
pub const ENV_MAX_RUNTIME_SECS: &str = "MANDI_MAX_RUNTIME_SECS";
pub const ENV_MAX_TOTAL_ROWS: &str = "MANDI_MAX_TOTAL_ROWS";
pub const ENV_LOG_DIR: &str = "MANDI_LOG_DIR";

pub const DEFAULT_SUPABASE_TABLE: &str = "mandi_prices";
/// Public sample key published by data.gov.in
pub const DEFAULT_DATA_GOV_API_KEY: &str = "579b464db66ec23bdd000001cdc3b564546246a772a26393094f5645";
pub const DEFAULT_DATA_GOV_BASE_URL: &str = "https://api.data.gov.in/resource";
/// "Current Daily Price of Various Commodities from Various Markets (Mandi)"
pub const DEFAULT_DATA_GOV_RESOURCE_ID: &str = "9ef84268-d588-465a-a308-a864a43d0070";
pub const DEFAULT_PAGE_LIMIT: u32 = 200;
pub const DEFAULT_ROLLOVER_HOUR: u32 = 9;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Kolkata;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 120;
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;
pub const DEFAULT_MAX_RUNTIME_SECS: u64 = 4 * 60 * 60;
pub const DEFAULT_MAX_TOTAL_ROWS: u64 = 300_000;
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Upstream (data.gov.in) connection settings
#[derive(Debug, Clone)]
pub struct DataGovConfig {
    pub base_url: String,
    pub resource_id: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl DataGovConfig {
    pub fn resource_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.resource_id
        )
    }
}

/// Supabase (PostgREST) connection settings
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
}

/// Knobs of the fetch/resume loop
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub page_size: u32,
    pub rollover_hour: u32,
    pub timezone: Tz,
    pub backoff: BackoffPolicy,
    pub max_runtime: Duration,
    /// 0 disables retention
    pub max_total_rows: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
            rollover_hour: DEFAULT_ROLLOVER_HOUR,
            timezone: DEFAULT_TIMEZONE,
            backoff: BackoffPolicy::default(),
            max_runtime: Duration::from_secs(DEFAULT_MAX_RUNTIME_SECS),
            max_total_rows: DEFAULT_MAX_TOTAL_ROWS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_gov: DataGovConfig,
    pub supabase: SupabaseConfig,
    pub run: RunSettings,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let supabase_url = get(ENV_SUPABASE_URL).ok_or(ConfigError::Missing(ENV_SUPABASE_URL))?;
        let supabase_key =
            get(ENV_SUPABASE_API_KEY).ok_or(ConfigError::Missing(ENV_SUPABASE_API_KEY))?;

        let supabase = SupabaseConfig {
            url: supabase_url.trim_end_matches('/').to_string(),
            api_key: supabase_key,
            table: get(ENV_SUPABASE_TABLE).unwrap_or_else(|| DEFAULT_SUPABASE_TABLE.to_string()),
        };

        let data_gov = DataGovConfig {
            base_url: get(ENV_DATA_GOV_BASE_URL)
                .unwrap_or_else(|| DEFAULT_DATA_GOV_BASE_URL.to_string()),
            resource_id: get(ENV_DATA_GOV_RESOURCE_ID)
                .unwrap_or_else(|| DEFAULT_DATA_GOV_RESOURCE_ID.to_string()),
            api_key: get(ENV_DATA_GOV_API_KEY)
                .unwrap_or_else(|| DEFAULT_DATA_GOV_API_KEY.to_string()),
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(120),
        };

        let page_size: u32 = parse_or(&get, ENV_PAGE_LIMIT, DEFAULT_PAGE_LIMIT)?;
        if page_size == 0 {
            return Err(invalid(ENV_PAGE_LIMIT, "0", "page size must be positive"));
        }

        let rollover_hour: u32 = parse_or(&get, ENV_ROLLOVER_HOUR, DEFAULT_ROLLOVER_HOUR)?;
        if rollover_hour > 23 {
            return Err(invalid(
                ENV_ROLLOVER_HOUR,
                &rollover_hour.to_string(),
                "hour must be in 0..=23",
            ));
        }

        let timezone = match get(ENV_TIMEZONE) {
            Some(name) => Tz::from_str(&name)
                .map_err(|e| invalid(ENV_TIMEZONE, &name, &e.to_string()))?,
            None => DEFAULT_TIMEZONE,
        };

        let max_attempts: u32 = parse_or(&get, ENV_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(invalid(ENV_MAX_ATTEMPTS, "0", "at least one attempt is required"));
        }
        let base_secs: u64 = parse_or(&get, ENV_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_BASE_SECS)?;
        let max_secs: u64 = parse_or(&get, ENV_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MAX_SECS)?;
        if max_secs < base_secs {
            return Err(invalid(
                ENV_BACKOFF_MAX_SECS,
                &max_secs.to_string(),
                "maximum delay is below the base delay",
            ));
        }
        let jitter_ratio: f64 = parse_or(&get, ENV_JITTER_RATIO, DEFAULT_JITTER_RATIO)?;
        if !(0.0..1.0).contains(&jitter_ratio) {
            return Err(invalid(
                ENV_JITTER_RATIO,
                &jitter_ratio.to_string(),
                "ratio must be in [0, 1)",
            ));
        }

        let run = RunSettings {
            page_size,
            rollover_hour,
            timezone,
            backoff: BackoffPolicy {
                base_delay: Duration::from_secs(base_secs),
                max_delay: Duration::from_secs(max_secs),
                jitter_ratio,
                max_attempts,
            },
            max_runtime: Duration::from_secs(parse_or(
                &get,
                ENV_MAX_RUNTIME_SECS,
                DEFAULT_MAX_RUNTIME_SECS,
            )?),
            max_total_rows: parse_or(&get, ENV_MAX_TOTAL_ROWS, DEFAULT_MAX_TOTAL_ROWS)?,
        };

        Ok(Self {
            data_gov,
            supabase,
            run,
        })
    }

    /// Same as [`Config::from_lookup`] over a fixed map, handy in tests
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }
}

/// Directory holding `cron.log`; read separately so logging is up before
/// the rest of the configuration is validated
pub fn log_dir() -> PathBuf {
    env::var(ENV_LOG_DIR)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
