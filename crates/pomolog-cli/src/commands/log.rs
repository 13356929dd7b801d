use clap::Subcommand;
use pomolog_core::history::{codec, compact};
use pomolog_core::{LogStore, Strategy, StrategyRecord};
use std::path::PathBuf;
use tracing::info;

use super::{open_session, print_record, CliResult};

#[derive(Subcommand)]
pub enum LogAction {
    /// Print stored records
    Show {
        /// Only records after this sequence number
        #[arg(long, default_value = "0")]
        after: u64,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit any strategy by name, e.g. `RenameBacklog B1 Tomorrow`
    Submit {
        name: String,
        params: Vec<String>,
    },
    /// Write the log in plaintext form
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Replay a plaintext log on top of the stored one
    Import {
        file: PathBuf,
        /// Ignore records already in the stored log
        #[arg(long)]
        skip_existing: bool,
    },
    /// Drop records that do not contribute to the current model
    Compact {
        /// Report what would be saved without rewriting the log
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(action: LogAction) -> CliResult {
    let mut seq = open_session()?;

    match action {
        LogAction::Show { after, json } => {
            let records = seq.store().records_after(after)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!("{}", codec::encode_record(record));
                }
            }
        }
        LogAction::Submit { name, params } => {
            let strategy = Strategy::from_parts(&name, &params)?;
            let record = seq.submit(strategy)?;
            print_record(&record)?;
        }
        LogAction::Export { output } => {
            let text = codec::encode_log(&seq.store().all_records()?);
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    eprintln!("exported to {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        LogAction::Import {
            file,
            skip_existing,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let mut records = codec::decode_log(&text)?;
            if skip_existing {
                let last = seq.last_seq();
                records.retain(|r: &StrategyRecord| r.seq > last);
            }
            let applied = seq.replay(&records)?;
            info!(applied, file = %file.display(), "log imported");
            println!("imported {applied} records, last sequence {}", seq.last_seq());
        }
        LogAction::Compact { dry_run } => {
            let report = if dry_run {
                let records = seq.store().all_records()?;
                compact(&records, seq.settings())?.1
            } else {
                seq.compact()?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
