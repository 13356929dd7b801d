//! Strategies: the typed commands that are the only way to mutate the model.
//!
//! A [`Strategy`] carries just its business parameters. Sequence number,
//! timestamp and actor are added by [`StrategyRecord`] when the sequencer
//! stamps it (or when it is read back from a log).

mod backlogs;
mod control;
pub(crate) mod engine;
mod pomodoros;
mod record;
mod users;
mod workitems;

pub use control::ControlMessage;
pub use engine::EngineSettings;
pub use pomodoros::MAX_POMODORO_COUNT;
pub use record::{Message, StrategyRecord};

use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params")]
pub enum Strategy {
    CreateUser {
        email: String,
        name: String,
    },
    DeleteUser {
        email: String,
    },
    RenameUser {
        email: String,
        new_name: String,
    },
    CreateBacklog {
        uid: String,
        name: String,
    },
    DeleteBacklog {
        uid: String,
    },
    RenameBacklog {
        uid: String,
        new_name: String,
    },
    /// Moves a backlog to a zero-based position among its owner's backlogs.
    ReorderBacklog {
        uid: String,
        new_index: i64,
    },
    CreateWorkitem {
        uid: String,
        backlog_uid: String,
        name: String,
    },
    DeleteWorkitem {
        uid: String,
    },
    RenameWorkitem {
        uid: String,
        new_name: String,
    },
    /// `target` is kept as written so that an invalid value replays as the
    /// same validation failure.
    CompleteWorkitem {
        uid: String,
        target: String,
    },
    AddPomodoro {
        workitem_uid: String,
        count: i64,
    },
    RemovePomodoro {
        workitem_uid: String,
        count: i64,
    },
    VoidPomodoro {
        workitem_uid: String,
    },
    /// Durations in seconds; 0 means the value recorded on the pomodoro.
    StartWork {
        workitem_uid: String,
        work_duration: f64,
        rest_duration: f64,
    },
    StartRest {
        workitem_uid: String,
        rest_duration: f64,
    },
    /// Legacy alias kept for old logs: `canceled` voids, anything else is
    /// ignored.
    CompletePomodoro {
        workitem_uid: String,
        target: String,
    },
}

pub const STRATEGY_NAMES: &[&str] = &[
    "CreateUser",
    "DeleteUser",
    "RenameUser",
    "CreateBacklog",
    "DeleteBacklog",
    "RenameBacklog",
    "ReorderBacklog",
    "CreateWorkitem",
    "DeleteWorkitem",
    "RenameWorkitem",
    "CompleteWorkitem",
    "AddPomodoro",
    "RemovePomodoro",
    "VoidPomodoro",
    "StartWork",
    "StartRest",
    "CompletePomodoro",
];

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::CreateUser { .. } => "CreateUser",
            Strategy::DeleteUser { .. } => "DeleteUser",
            Strategy::RenameUser { .. } => "RenameUser",
            Strategy::CreateBacklog { .. } => "CreateBacklog",
            Strategy::DeleteBacklog { .. } => "DeleteBacklog",
            Strategy::RenameBacklog { .. } => "RenameBacklog",
            Strategy::ReorderBacklog { .. } => "ReorderBacklog",
            Strategy::CreateWorkitem { .. } => "CreateWorkitem",
            Strategy::DeleteWorkitem { .. } => "DeleteWorkitem",
            Strategy::RenameWorkitem { .. } => "RenameWorkitem",
            Strategy::CompleteWorkitem { .. } => "CompleteWorkitem",
            Strategy::AddPomodoro { .. } => "AddPomodoro",
            Strategy::RemovePomodoro { .. } => "RemovePomodoro",
            Strategy::VoidPomodoro { .. } => "VoidPomodoro",
            Strategy::StartWork { .. } => "StartWork",
            Strategy::StartRest { .. } => "StartRest",
            Strategy::CompletePomodoro { .. } => "CompletePomodoro",
        }
    }

    /// Business parameters in their logged order.
    pub fn params(&self) -> Vec<String> {
        match self {
            Strategy::CreateUser { email, name } => vec![email.clone(), name.clone()],
            Strategy::DeleteUser { email } => vec![email.clone()],
            Strategy::RenameUser { email, new_name } => vec![email.clone(), new_name.clone()],
            Strategy::CreateBacklog { uid, name } => vec![uid.clone(), name.clone()],
            Strategy::DeleteBacklog { uid } => vec![uid.clone()],
            Strategy::RenameBacklog { uid, new_name } => vec![uid.clone(), new_name.clone()],
            Strategy::ReorderBacklog { uid, new_index } => vec![uid.clone(), new_index.to_string()],
            Strategy::CreateWorkitem {
                uid,
                backlog_uid,
                name,
            } => vec![uid.clone(), backlog_uid.clone(), name.clone()],
            Strategy::DeleteWorkitem { uid } => vec![uid.clone()],
            Strategy::RenameWorkitem { uid, new_name } => vec![uid.clone(), new_name.clone()],
            Strategy::CompleteWorkitem { uid, target } => vec![uid.clone(), target.clone()],
            Strategy::AddPomodoro {
                workitem_uid,
                count,
            }
            | Strategy::RemovePomodoro {
                workitem_uid,
                count,
            } => vec![workitem_uid.clone(), count.to_string()],
            Strategy::VoidPomodoro { workitem_uid } => vec![workitem_uid.clone()],
            Strategy::StartWork {
                workitem_uid,
                work_duration,
                rest_duration,
            } => {
                let mut params = vec![workitem_uid.clone(), work_duration.to_string()];
                if *rest_duration != 0.0 {
                    params.push(rest_duration.to_string());
                }
                params
            }
            Strategy::StartRest {
                workitem_uid,
                rest_duration,
            } => vec![workitem_uid.clone(), rest_duration.to_string()],
            Strategy::CompletePomodoro {
                workitem_uid,
                target,
            } => vec![workitem_uid.clone(), target.clone()],
        }
    }

    /// Builds a typed strategy from a logged name and parameter list.
    ///
    /// Missing trailing parameters are an error, extra ones are ignored.
    pub fn from_parts(name: &str, params: &[String]) -> Result<Self, StrategyError> {
        let p = Params { name, params };
        let strategy = match name {
            "CreateUser" => Strategy::CreateUser {
                email: p.text(0)?,
                name: p.text(1)?,
            },
            "DeleteUser" => Strategy::DeleteUser { email: p.text(0)? },
            "RenameUser" => Strategy::RenameUser {
                email: p.text(0)?,
                new_name: p.text(1)?,
            },
            "CreateBacklog" => Strategy::CreateBacklog {
                uid: p.text(0)?,
                name: p.text(1)?,
            },
            "DeleteBacklog" => Strategy::DeleteBacklog { uid: p.text(0)? },
            "RenameBacklog" => Strategy::RenameBacklog {
                uid: p.text(0)?,
                new_name: p.text(1)?,
            },
            "ReorderBacklog" => Strategy::ReorderBacklog {
                uid: p.text(0)?,
                new_index: p.integer(1)?,
            },
            "CreateWorkitem" => Strategy::CreateWorkitem {
                uid: p.text(0)?,
                backlog_uid: p.text(1)?,
                name: p.text(2)?,
            },
            "DeleteWorkitem" => Strategy::DeleteWorkitem { uid: p.text(0)? },
            "RenameWorkitem" => Strategy::RenameWorkitem {
                uid: p.text(0)?,
                new_name: p.text(1)?,
            },
            "CompleteWorkitem" => Strategy::CompleteWorkitem {
                uid: p.text(0)?,
                target: p.text(1)?,
            },
            "AddPomodoro" => Strategy::AddPomodoro {
                workitem_uid: p.text(0)?,
                count: p.integer(1)?,
            },
            "RemovePomodoro" => Strategy::RemovePomodoro {
                workitem_uid: p.text(0)?,
                count: p.integer(1)?,
            },
            "VoidPomodoro" => Strategy::VoidPomodoro {
                workitem_uid: p.text(0)?,
            },
            "StartWork" => Strategy::StartWork {
                workitem_uid: p.text(0)?,
                work_duration: p.number(1)?,
                rest_duration: p.optional_number(2)?.unwrap_or(0.0),
            },
            "StartRest" => Strategy::StartRest {
                workitem_uid: p.text(0)?,
                rest_duration: p.optional_number(1)?.unwrap_or(0.0),
            },
            "CompletePomodoro" => Strategy::CompletePomodoro {
                workitem_uid: p.text(0)?,
                target: p.text(1)?,
            },
            other => return Err(StrategyError::UnknownStrategy(other.to_string())),
        };
        Ok(strategy)
    }

    /// Whether overdue timer transitions must be applied before this one.
    pub fn requires_catch_up(&self) -> bool {
        matches!(
            self,
            Strategy::StartWork { .. }
                | Strategy::VoidPomodoro { .. }
                | Strategy::CompletePomodoro { .. }
                | Strategy::CompleteWorkitem { .. }
                | Strategy::DeleteWorkitem { .. }
                | Strategy::DeleteBacklog { .. }
                | Strategy::DeleteUser { .. }
        )
    }
}

struct Params<'a> {
    name: &'a str,
    params: &'a [String],
}

impl Params<'_> {
    fn raw(&self, index: usize) -> Result<&str, StrategyError> {
        self.params
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| StrategyError::MissingParameter {
                strategy: self.name.to_string(),
                index,
            })
    }

    fn text(&self, index: usize) -> Result<String, StrategyError> {
        self.raw(index).map(str::to_string)
    }

    fn integer(&self, index: usize) -> Result<i64, StrategyError> {
        let raw = self.raw(index)?;
        raw.trim().parse().map_err(|_| self.bad(raw, "an integer"))
    }

    fn number(&self, index: usize) -> Result<f64, StrategyError> {
        let raw = self.raw(index)?;
        raw.trim().parse().map_err(|_| self.bad(raw, "a number"))
    }

    /// Absent or empty counts as `None`.
    fn optional_number(&self, index: usize) -> Result<Option<f64>, StrategyError> {
        match self.params.get(index).map(|s| s.trim()) {
            None | Some("") => Ok(None),
            Some(_) => self.number(index).map(Some),
        }
    }

    fn bad(&self, value: &str, expected: &'static str) -> StrategyError {
        StrategyError::BadParameter {
            strategy: self.name.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}
