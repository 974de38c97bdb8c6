// src/lib.rs

use config::RunSettings;

/// Everything one sync run needs
pub struct RunContext<S, P> {
    pub settings: RunSettings,
    pub source: S,
    pub store: P,
}

impl<S, P> RunContext<S, P> {
    pub fn new(settings: RunSettings, source: S, store: P) -> Self {
        Self {
            settings,
            source,
            store,
        }
    }
}

pub mod config;
pub mod error;
pub mod logging;

pub mod models {
    pub mod price_record;
}

pub mod services {
    pub mod backoff;
    pub mod data_gov;
    pub mod supabase;
    pub mod target_date;
}

pub mod jobs {
    pub mod mandi_prices_sync;
    pub mod paged_fetcher;
    pub mod persister;
    pub mod resume_counter;
    pub mod retention;
}

#[cfg(test)]
mod test_support;
