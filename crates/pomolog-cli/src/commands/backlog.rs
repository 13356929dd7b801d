use clap::Subcommand;
use pomolog_core::Strategy;

use super::{new_uid, open_session, submit, CliResult};

#[derive(Subcommand)]
pub enum BacklogAction {
    /// Create a backlog
    Create {
        /// Display name
        name: String,
        /// Identifier (random when omitted)
        #[arg(long)]
        uid: Option<String>,
    },
    /// Rename a backlog
    Rename { uid: String, name: String },
    /// Delete a backlog and all of its workitems
    Delete { uid: String },
    /// Move a backlog to a zero-based position
    Reorder {
        uid: String,
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// List backlogs of the local user
    List,
}

pub fn run(action: BacklogAction) -> CliResult {
    match action {
        BacklogAction::Create { name, uid } => submit(Strategy::CreateBacklog {
            uid: new_uid(uid),
            name,
        }),
        BacklogAction::Rename { uid, name } => submit(Strategy::RenameBacklog {
            uid,
            new_name: name,
        }),
        BacklogAction::Delete { uid } => submit(Strategy::DeleteBacklog { uid }),
        BacklogAction::Reorder { uid, index } => submit(Strategy::ReorderBacklog {
            uid,
            new_index: index,
        }),
        BacklogAction::List => {
            let seq = open_session()?;
            if let Some(user) = seq.tenant().user(seq.actor()) {
                for backlog in user.backlogs() {
                    println!("{}\t{}\t{} workitems", backlog.uid(), backlog.name(), backlog.len());
                }
            }
            Ok(())
        }
    }
}
