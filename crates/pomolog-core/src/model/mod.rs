//! The hierarchical data model: tenant, user, backlog, workitem, pomodoro.
//!
//! Parents own their children by value. Back-references are plain
//! identifiers (owner email, backlog uid). Everything outside the crate reads
//! the tree; only strategies mutate it.

mod backlog;
mod pomodoro;
mod tag;
mod tenant;
mod user;
mod workitem;

pub use backlog::Backlog;
pub use pomodoro::{after_secs, PhaseEnd, Pomodoro, PomodoroState};
pub use tag::{tag_index, tags_in, TagIndex};
pub use tenant::{Tenant, SYSTEM_USER, SYSTEM_USER_NAME};
pub use user::User;
pub use workitem::{Workitem, WorkitemState};
