use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::backlog::Backlog;
use super::tag::{tag_index, TagIndex};

/// A user, keyed by email. Owns backlogs, whose order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    email: String,
    name: String,
    system: bool,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    backlogs: IndexMap<String, Backlog>,
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
            && self.name == other.name
            && self.system == other.system
            && self.created_at == other.created_at
            && self.last_modified == other.last_modified
            && self.backlogs.iter().eq(other.backlogs.iter())
    }
}

impl User {
    pub(crate) fn new(email: &str, name: &str, system: bool, when: DateTime<Utc>) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            system,
            created_at: when,
            last_modified: when,
            backlogs: IndexMap::new(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn backlog(&self, uid: &str) -> Option<&Backlog> {
        self.backlogs.get(uid)
    }

    pub fn contains_backlog(&self, uid: &str) -> bool {
        self.backlogs.contains_key(uid)
    }

    pub fn backlogs(&self) -> impl Iterator<Item = &Backlog> {
        self.backlogs.values()
    }

    /// Position of a backlog in display order.
    pub fn backlog_index(&self, uid: &str) -> Option<usize> {
        self.backlogs.get_index_of(uid)
    }

    pub fn backlog_count(&self) -> usize {
        self.backlogs.len()
    }

    /// Tags found in the names of this user's workitems.
    pub fn tags(&self) -> TagIndex {
        tag_index(self)
    }

    pub(crate) fn backlog_mut(&mut self, uid: &str) -> Option<&mut Backlog> {
        self.backlogs.get_mut(uid)
    }

    pub(crate) fn backlogs_mut(&mut self) -> impl Iterator<Item = &mut Backlog> {
        self.backlogs.values_mut()
    }

    pub(crate) fn insert_backlog(&mut self, backlog: Backlog) {
        self.backlogs.insert(backlog.uid().to_string(), backlog);
    }

    pub(crate) fn remove_backlog(&mut self, uid: &str) -> Option<Backlog> {
        self.backlogs.shift_remove(uid)
    }

    /// Moves a backlog to `to`, shifting the ones in between.
    pub(crate) fn move_backlog(&mut self, from: usize, to: usize) {
        self.backlogs.move_index(from, to);
    }

    pub(crate) fn set_name(&mut self, name: &str, when: DateTime<Utc>) {
        self.name = name.to_string();
        self.last_modified = when;
    }
}
