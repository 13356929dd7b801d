use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::workitem::Workitem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    uid: String,
    name: String,
    /// Owning user's email (non-owning back-reference).
    owner: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    workitems: IndexMap<String, Workitem>,
}

impl Backlog {
    pub(crate) fn new(uid: &str, name: &str, owner: &str, when: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: when,
            last_modified: when,
            workitems: IndexMap::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn workitem(&self, uid: &str) -> Option<&Workitem> {
        self.workitems.get(uid)
    }

    pub fn contains_workitem(&self, uid: &str) -> bool {
        self.workitems.contains_key(uid)
    }

    /// Workitems in insertion order.
    pub fn workitems(&self) -> impl Iterator<Item = &Workitem> {
        self.workitems.values()
    }

    pub fn len(&self) -> usize {
        self.workitems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workitems.is_empty()
    }

    pub(crate) fn workitem_mut(&mut self, uid: &str) -> Option<&mut Workitem> {
        self.workitems.get_mut(uid)
    }

    pub(crate) fn insert_workitem(&mut self, workitem: Workitem) {
        self.workitems.insert(workitem.uid().to_string(), workitem);
    }

    pub(crate) fn remove_workitem(&mut self, uid: &str) -> Option<Workitem> {
        self.workitems.shift_remove(uid)
    }

    pub(crate) fn set_name(&mut self, name: &str, when: DateTime<Utc>) {
        self.name = name.to_string();
        self.last_modified = when;
    }

    pub(crate) fn touch(&mut self, when: DateTime<Utc>) {
        self.last_modified = when;
    }
}
