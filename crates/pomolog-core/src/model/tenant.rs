use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::backlog::Backlog;
use super::user::User;
use super::workitem::Workitem;

/// Identity of the protected System user.
pub const SYSTEM_USER: &str = "admin@local.host";
pub const SYSTEM_USER_NAME: &str = "System";

/// Root of the data model: all users keyed by email.
///
/// A fresh tenant already contains the System user, created at the Unix
/// epoch so that independent instances start out identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    users: IndexMap<String, User>,
}

impl Default for Tenant {
    fn default() -> Self {
        Self::new()
    }
}

impl Tenant {
    pub fn new() -> Self {
        let mut users = IndexMap::new();
        users.insert(
            SYSTEM_USER.to_string(),
            User::new(SYSTEM_USER, SYSTEM_USER_NAME, true, DateTime::<Utc>::UNIX_EPOCH),
        );
        Self { users }
    }

    pub fn user(&self, email: &str) -> Option<&User> {
        self.users.get(email)
    }

    pub fn contains_user(&self, email: &str) -> bool {
        self.users.contains_key(email)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn system_user(&self) -> Option<&User> {
        self.users.get(SYSTEM_USER)
    }

    pub fn backlog(&self, owner: &str, uid: &str) -> Option<&Backlog> {
        self.user(owner)?.backlog(uid)
    }

    /// Looks a workitem up across all backlogs of `owner`.
    pub fn find_workitem(&self, owner: &str, uid: &str) -> Option<&Workitem> {
        self.user(owner)?.backlogs().find_map(|b| b.workitem(uid))
    }

    /// Every workitem of `owner`, in display order.
    pub fn workitems_of<'a>(&'a self, owner: &str) -> impl Iterator<Item = &'a Workitem> + 'a {
        self.user(owner)
            .into_iter()
            .flat_map(|u| u.backlogs())
            .flat_map(|b| b.workitems())
    }

    pub(crate) fn user_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.get_mut(email)
    }

    pub(crate) fn backlog_mut(&mut self, owner: &str, uid: &str) -> Option<&mut Backlog> {
        self.user_mut(owner)?.backlog_mut(uid)
    }

    pub(crate) fn find_workitem_mut(&mut self, owner: &str, uid: &str) -> Option<&mut Workitem> {
        self.user_mut(owner)?
            .backlogs_mut()
            .find_map(|b| b.workitem_mut(uid))
    }

    pub(crate) fn insert_user(&mut self, user: User) {
        self.users.insert(user.email().to_string(), user);
    }

    pub(crate) fn remove_user(&mut self, email: &str) -> Option<User> {
        self.users.shift_remove(email)
    }
}
