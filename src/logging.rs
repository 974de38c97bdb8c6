//! Tracing setup and log hygiene
//!
//! Logs go to stdout and to an append-only `cron.log`. Anything that may
//! carry a URL or credential is passed through [`redact`] before logging.

use lazy_static::lazy_static;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_FILE_NAME: &str = "cron.log";
pub const MAX_LOG_BYTES: u64 = 5_000_000;
pub const LOG_BACKUPS: u32 = 5;
/// Longest response body excerpt written to the log
pub const PREVIEW_CHARS: usize = 800;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(r"https?://\S+").unwrap();
    static ref TOKEN_RE: Regex =
        Regex::new(r#"(?i)(api[_-]?key|authorization|token)\s*[:=]\s*['"]?\S+"#).unwrap();
}

/// Strip URLs and credential-looking `key=value` pairs
pub fn redact(text: &str) -> String {
    let text = URL_RE.replace_all(text, "<REDACTED_URL>");
    TOKEN_RE.replace_all(&text, "<REDACTED_TOKEN>").into_owned()
}

/// Loggable excerpt of a response body; HTML error pages are skipped
pub fn body_preview(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() || body.to_lowercase().contains("<html") {
        return None;
    }
    Some(redact(body).chars().take(PREVIEW_CHARS).collect())
}

/// Rotate `path` to `path.1` .. `path.{backups}` once it exceeds `max_bytes`
pub fn rotate_if_needed(path: &Path, max_bytes: u64, backups: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes || backups == 0 {
        return Ok(false);
    }

    let backup = |n: u32| PathBuf::from(format!("{}.{}", path.display(), n));
    let oldest = backup(backups);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            fs::rename(&from, backup(n + 1))?;
        }
    }
    fs::rename(path, backup(1))?;
    Ok(true)
}

/// Install the global subscriber: stdout plus `{log_dir}/cron.log`
///
/// If the log file cannot be opened the job still logs to stdout.
pub fn init_tracing(log_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,reqwest=warn".into());
    let log_path = log_dir.join(LOG_FILE_NAME);

    let file = fs::create_dir_all(log_dir)
        .and_then(|_| rotate_if_needed(&log_path, MAX_LOG_BYTES, LOG_BACKUPS))
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_path));

    let (file_layer, file_error) = match file {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("Could not open log file {}: {}; logging to stdout only", log_path.display(), e);
    }
}
