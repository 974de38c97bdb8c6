use chrono::Utc;
use std::process::ExitCode;

use mandi_fetcher::RunContext;
use mandi_fetcher::config::{self, Config};
use mandi_fetcher::jobs::mandi_prices_sync;
use mandi_fetcher::logging;
use mandi_fetcher::services::{data_gov::DataGovService, supabase::SupabaseService};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    logging::init_tracing(&config::log_dir());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    let source = match DataGovService::new(config.data_gov) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to build data.gov.in client: {}", e);
            return ExitCode::from(2);
        }
    };
    let store = match SupabaseService::new(config.supabase) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to build Supabase client: {}", e);
            return ExitCode::from(2);
        }
    };

    tracing::info!("Syncing mandi prices into table {}", store.table());
    let ctx = RunContext::new(config.run, source, store);

    match mandi_prices_sync::run(&ctx, Utc::now()).await {
        Ok(summary) => {
            if summary.stopped_by_deadline {
                tracing::warn!(
                    "Stopped at max runtime; next run resumes from offset {}",
                    summary.final_offset
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Mandi fetch failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
