pub mod backlog;
pub mod config;
pub mod log;
pub mod tags;
pub mod timer;
pub mod tree;
pub mod workitem;

use chrono::Utc;
use pomolog_core::{Config, Sequencer, SqliteLog, Strategy, StrategyRecord};
use tracing::debug;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// The configured log, replayed, with the local user in place.
pub fn open_session() -> Result<Sequencer<SqliteLog>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let path = config.log_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut seq = Sequencer::from_config(SqliteLog::open(&path)?, &config);
    let applied = seq.load()?;
    debug!(applied, path = %path.display(), "log loaded");
    seq.ensure_actor(&config.identity.display_name, Utc::now())?;
    Ok(seq)
}

/// Submits one strategy and prints the stored record.
pub fn submit(strategy: Strategy) -> CliResult {
    let mut seq = open_session()?;
    let record = seq.submit(strategy)?;
    print_record(&record)
}

pub fn print_record(record: &StrategyRecord) -> CliResult {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

/// A fresh identifier for entities created from the command line.
pub fn new_uid(uid: Option<String>) -> String {
    uid.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string())
}
