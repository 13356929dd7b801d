use clap::Subcommand;
use pomolog_core::Strategy;

use super::{new_uid, submit, CliResult};

#[derive(Subcommand)]
pub enum WorkitemAction {
    /// Create a workitem in a backlog
    Create {
        /// Backlog identifier
        backlog: String,
        /// Display name
        name: String,
        /// Identifier (random when omitted)
        #[arg(long)]
        uid: Option<String>,
    },
    /// Rename a workitem
    Rename { uid: String, name: String },
    /// Seal a workitem as finished or canceled
    Complete {
        uid: String,
        #[arg(long, default_value = "finished")]
        target: String,
    },
    /// Delete a workitem
    Delete { uid: String },
    /// Plan more pomodoros
    Add {
        uid: String,
        #[arg(default_value = "1")]
        count: i64,
    },
    /// Drop planned pomodoros that have not started
    Remove {
        uid: String,
        #[arg(default_value = "1")]
        count: i64,
    },
}

pub fn run(action: WorkitemAction) -> CliResult {
    let strategy = match action {
        WorkitemAction::Create { backlog, name, uid } => Strategy::CreateWorkitem {
            uid: new_uid(uid),
            backlog_uid: backlog,
            name,
        },
        WorkitemAction::Rename { uid, name } => Strategy::RenameWorkitem {
            uid,
            new_name: name,
        },
        WorkitemAction::Complete { uid, target } => Strategy::CompleteWorkitem { uid, target },
        WorkitemAction::Delete { uid } => Strategy::DeleteWorkitem { uid },
        WorkitemAction::Add { uid, count } => Strategy::AddPomodoro {
            workitem_uid: uid,
            count,
        },
        WorkitemAction::Remove { uid, count } => Strategy::RemovePomodoro {
            workitem_uid: uid,
            count,
        },
    };
    submit(strategy)
}
