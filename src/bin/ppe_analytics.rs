//! ppe_analytics - Query persisted PPE detection records.
//!
//! Rollups are recomputed from the record store on every invocation; nothing
//! is cached between runs.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use ppe_compliance::{
    analytics::{self, AnalyticsWindow},
    config::AppConfig,
    BackendRegistry, RecordStore, SqliteRecordStore,
};

#[derive(Parser, Debug)]
#[command(name = "ppe_analytics", about = "Analytics over stored PPE detection records")]
struct Args {
    /// SQLite record store path, overrides config
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Roll detection records of the last N days up into a report
    Rollup {
        /// Window length in days (1-365), overrides config
        #[arg(long)]
        days: Option<u32>,
        /// Only records from this endpoint (predict, predict-batch, check-compliance)
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Most recent detection records, newest first
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Most recent video processing records, newest first
    Videos {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Registered detector backends and the classes they emit
    Backends,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = AppConfig::load()?;
    let db_path = args.db_path.clone().unwrap_or_else(|| cfg.db_path.clone());

    match args.command {
        Command::Rollup { days, endpoint } => {
            let store = SqliteRecordStore::open(&db_path)?;
            let window = match days {
                Some(days) => AnalyticsWindow::new(days, endpoint)?,
                None => cfg.analytics_window(endpoint)?,
            };
            let report = analytics::compute(&store, &window)?;
            log::info!(
                "rolled up {} requests over {} days",
                report.total_requests,
                window.days
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Recent { limit, endpoint } => {
            if limit == 0 {
                return Err(anyhow!("--limit must be at least 1"));
            }
            let store = SqliteRecordStore::open(&db_path)?;
            let records = store.recent_detections(limit, endpoint.as_deref())?;
            let body = serde_json::json!({
                "count": records.len(),
                "records": records,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Videos { limit } => {
            if limit == 0 {
                return Err(anyhow!("--limit must be at least 1"));
            }
            let store = SqliteRecordStore::open(&db_path)?;
            let records = store.recent_videos(limit)?;
            let body = serde_json::json!({
                "count": records.len(),
                "records": records,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Backends => {
            let registry = BackendRegistry::with_builtin();
            println!("{}", serde_json::to_string_pretty(&registry.describe()?)?);
        }
    }
    Ok(())
}
