//! Log compaction.
//!
//! Produces a shorter log that replays to the same model. The log is
//! simulated record by record while tracking which entity lineage (one
//! create-to-delete life of a user, backlog or workitem) each record belongs
//! to. Then these are dropped:
//!
//! - every record of a lineage that was later deleted
//! - records that changed nothing (no-op renames, legacy `CompletePomodoro`
//!   with a target other than `canceled`)
//! - renames overwritten by a later rename of the same entity
//!
//! A record whose catch-up advanced a workitem outside its own lineage pins
//! that lineage and its ancestors, since dropping it would move the catch-up.
//! A backlog reorder pins every other backlog alive at that point, since its
//! target index counts them.
//! Survivors are renumbered backwards from the last original sequence number,
//! and the result is verified by replaying it from an empty model.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bus::EventBus;
use crate::error::HistoryError;
use crate::events::{Change, Event, Phase};
use crate::model::Tenant;
use crate::strategy::engine::{self, EngineSettings, Exec};
use crate::strategy::{Strategy, StrategyRecord};

/// What compaction did, or would do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub before: usize,
    pub after: usize,
    /// Records of deleted users, backlogs and workitems.
    pub deleted: usize,
    pub no_ops: usize,
    pub superseded: usize,
}

impl CompactionReport {
    pub fn saved(&self) -> usize {
        self.before - self.after
    }

    pub fn percent_saved(&self) -> f64 {
        if self.before == 0 {
            return 0.0;
        }
        self.saved() as f64 * 100.0 / self.before as f64
    }

    pub fn changed(&self) -> bool {
        self.after < self.before
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    User(String),
    Backlog(String, String),
    Workitem(String, String, String),
}

enum Target {
    New { key: Key, parent: Option<Key> },
    Existing(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Keep,
    NoOp,
    Superseded,
}

struct Lineage {
    parent: Option<usize>,
    dead: bool,
    pinned: bool,
}

#[derive(Default)]
struct Lineages {
    all: Vec<Lineage>,
    live: HashMap<Key, usize>,
}

impl Lineages {
    fn create(&mut self, key: Key, parent: Option<&Key>) -> usize {
        let id = self.all.len();
        self.all.push(Lineage {
            parent: parent.and_then(|p| self.live.get(p).copied()),
            dead: false,
            pinned: false,
        });
        self.live.insert(key, id);
        id
    }

    fn kill(&mut self, key: &Key) {
        if let Some(id) = self.live.remove(key) {
            self.all[id].dead = true;
        }
    }

    fn pin(&mut self, id: usize) {
        let mut next = Some(id);
        while let Some(id) = next {
            self.all[id].pinned = true;
            next = self.all[id].parent;
        }
    }

    /// Whether `id` is `ancestor` or lies below it.
    fn descends_from(&self, id: usize, ancestor: usize) -> bool {
        let mut next = Some(id);
        while let Some(id) = next {
            if id == ancestor {
                return true;
            }
            next = self.all[id].parent;
        }
        false
    }

    fn dropped(&self, id: usize) -> bool {
        let lineage = &self.all[id];
        lineage.dead && !lineage.pinned
    }
}

fn workitem_key(r: &crate::events::WorkitemRef) -> Key {
    Key::Workitem(r.owner.clone(), r.backlog_uid.clone(), r.uid.clone())
}

/// The entity `record` acts on, resolved against the model before it applies.
fn target(tenant: &Tenant, record: &StrategyRecord) -> Option<Target> {
    let actor = record.actor.as_str();
    let workitem = |uid: &str| {
        tenant
            .user(actor)?
            .backlogs()
            .find(|b| b.contains_workitem(uid))
            .map(|b| Target::Existing(Key::Workitem(actor.into(), b.uid().into(), uid.into())))
    };
    match &record.strategy {
        Strategy::CreateUser { email, .. } => Some(Target::New {
            key: Key::User(email.clone()),
            parent: None,
        }),
        Strategy::DeleteUser { email } | Strategy::RenameUser { email, .. } => {
            Some(Target::Existing(Key::User(email.clone())))
        }
        Strategy::CreateBacklog { uid, .. } => Some(Target::New {
            key: Key::Backlog(actor.into(), uid.clone()),
            parent: Some(Key::User(actor.into())),
        }),
        Strategy::DeleteBacklog { uid }
        | Strategy::RenameBacklog { uid, .. }
        | Strategy::ReorderBacklog { uid, .. } => {
            Some(Target::Existing(Key::Backlog(actor.into(), uid.clone())))
        }
        Strategy::CreateWorkitem {
            uid, backlog_uid, ..
        } => Some(Target::New {
            key: Key::Workitem(actor.into(), backlog_uid.clone(), uid.clone()),
            parent: Some(Key::Backlog(actor.into(), backlog_uid.clone())),
        }),
        Strategy::DeleteWorkitem { uid }
        | Strategy::RenameWorkitem { uid, .. }
        | Strategy::CompleteWorkitem { uid, .. } => workitem(uid),
        Strategy::AddPomodoro { workitem_uid, .. }
        | Strategy::RemovePomodoro { workitem_uid, .. }
        | Strategy::VoidPomodoro { workitem_uid }
        | Strategy::StartWork { workitem_uid, .. }
        | Strategy::StartRest { workitem_uid, .. }
        | Strategy::CompletePomodoro { workitem_uid, .. } => workitem(workitem_uid),
    }
}

/// Old and new name of a rename change.
fn rename_of(change: &Change) -> Option<(&str, &str)> {
    match change {
        Change::UserRename {
            old_name, new_name, ..
        }
        | Change::BacklogRename {
            old_name, new_name, ..
        }
        | Change::WorkitemRename {
            old_name, new_name, ..
        } => Some((old_name.as_str(), new_name.as_str())),
        _ => None,
    }
}

/// Owner and uid of a reordered backlog.
fn reordered(change: &Change) -> Option<(&str, &str)> {
    match change {
        Change::BacklogReorder { backlog, .. } => Some((backlog.owner.as_str(), backlog.uid.as_str())),
        _ => None,
    }
}

/// Applies `record` on top of `tenant` the way replay does.
fn apply(
    tenant: &mut Tenant,
    bus: &mut EventBus,
    settings: &EngineSettings,
    record: &StrategyRecord,
) -> Result<(), HistoryError> {
    let mut cx = Exec::new(tenant, bus, settings, record.seq, record.when, &record.actor);
    engine::apply(&mut cx, &record.strategy, true).map_err(|source| HistoryError::Inconsistent {
        seq: record.seq,
        name: record.name().to_string(),
        source,
    })
}

fn check_sequence(last: Option<u64>, found: u64) -> Result<(), HistoryError> {
    match last {
        None if found > 0 => Ok(()),
        None => Err(HistoryError::DuplicateSequence { last: 0, found }),
        Some(last) if found <= last => Err(HistoryError::DuplicateSequence { last, found }),
        Some(last) if found != last + 1 => Err(HistoryError::SequenceGap { last, found }),
        Some(_) => Ok(()),
    }
}

/// Replays `records` from an empty model.
pub fn replay_from_empty(
    records: &[StrategyRecord],
    settings: &EngineSettings,
) -> Result<Tenant, HistoryError> {
    let mut tenant = Tenant::new();
    let mut bus = EventBus::new();
    let mut last = None;
    for record in records {
        check_sequence(last, record.seq)?;
        apply(&mut tenant, &mut bus, settings, record)?;
        last = Some(record.seq);
    }
    Ok(tenant)
}

/// Compacts `records`, a complete log starting from an empty model.
///
/// Returns the compacted log and the report. When nothing can be saved the
/// returned log is `records` unchanged.
pub fn compact(
    records: &[StrategyRecord],
    settings: &EngineSettings,
) -> Result<(Vec<StrategyRecord>, CompactionReport), HistoryError> {
    let mut tenant = Tenant::new();
    let mut bus = EventBus::new();
    let changes: Rc<RefCell<Vec<Change>>> = Rc::default();
    let sink = changes.clone();
    bus.subscribe_all(move |event, _| {
        if let Event::Entity {
            phase: Phase::After,
            change,
            ..
        } = event
        {
            sink.borrow_mut().push(change.clone());
        }
    });

    let mut lineages = Lineages::default();
    let mut fates = vec![Fate::Keep; records.len()];
    let mut owners: Vec<Option<usize>> = vec![None; records.len()];
    // Lineage -> latest kept rename and the name before its chain started.
    let mut last_rename: HashMap<usize, (usize, String)> = HashMap::new();
    let mut last = None;

    for (i, record) in records.iter().enumerate() {
        check_sequence(last, record.seq)?;
        last = Some(record.seq);

        let target = target(&tenant, record);
        apply(&mut tenant, &mut bus, settings, record)?;
        let applied = std::mem::take(&mut *changes.borrow_mut());

        let lineage = match target {
            Some(Target::New { key, parent }) => Some(lineages.create(key, parent.as_ref())),
            Some(Target::Existing(key)) => lineages.live.get(&key).copied(),
            None => None,
        };
        owners[i] = lineage;

        if applied.is_empty() {
            fates[i] = Fate::NoOp;
            continue;
        }

        if let Some(id) = lineage {
            let foreign = applied
                .iter()
                .filter_map(Change::workitem)
                .filter_map(|r| lineages.live.get(&workitem_key(r)).copied())
                .any(|touched| !lineages.descends_from(touched, id));
            if foreign {
                lineages.pin(id);
            }

            if let Some((owner, moved)) = applied.iter().find_map(reordered) {
                let siblings: Vec<usize> = lineages
                    .live
                    .iter()
                    .filter_map(|(key, id)| match key {
                        Key::Backlog(o, uid) if o == owner && uid != moved => Some(*id),
                        _ => None,
                    })
                    .collect();
                for sibling in siblings {
                    lineages.pin(sibling);
                }
            }

            if let Some((old_name, new_name)) = applied.iter().find_map(rename_of) {
                // A rename is only superseded if dropping it leaves the next
                // one a real change.
                let base = match last_rename.get(&id) {
                    Some((previous, base)) if base != new_name => {
                        fates[*previous] = Fate::Superseded;
                        base.clone()
                    }
                    _ => old_name.to_string(),
                };
                last_rename.insert(id, (i, base));
            }
        }

        for change in &applied {
            match change {
                Change::UserDelete { email } => lineages.kill(&Key::User(email.clone())),
                Change::BacklogDelete { backlog } => {
                    lineages.kill(&Key::Backlog(backlog.owner.clone(), backlog.uid.clone()))
                }
                Change::WorkitemDelete { workitem } => lineages.kill(&workitem_key(workitem)),
                _ => {}
            }
        }
    }

    let mut report = CompactionReport {
        before: records.len(),
        ..CompactionReport::default()
    };
    let mut kept = Vec::new();
    for (i, record) in records.iter().enumerate() {
        match fates[i] {
            Fate::NoOp => report.no_ops += 1,
            Fate::Superseded => report.superseded += 1,
            Fate::Keep if owners[i].is_some_and(|id| lineages.dropped(id)) => report.deleted += 1,
            Fate::Keep => kept.push(record),
        }
    }

    let (Some(last_seq), false) = (last, kept.is_empty() || kept.len() == records.len()) else {
        // Nothing to save, or nothing left to carry the sequence number.
        return Ok((
            records.to_vec(),
            CompactionReport {
                before: records.len(),
                after: records.len(),
                ..CompactionReport::default()
            },
        ));
    };

    let first_seq = last_seq + 1 - kept.len() as u64;
    let compacted: Vec<StrategyRecord> = kept
        .iter()
        .enumerate()
        .map(|(n, record)| record.renumbered(first_seq + n as u64))
        .collect();
    report.after = compacted.len();

    let replayed = replay_from_empty(&compacted, settings)
        .map_err(|e| HistoryError::CompactionMismatch(format!("compacted log does not replay: {e}")))?;
    if replayed != tenant {
        return Err(HistoryError::CompactionMismatch(format!(
            "{} compacted records do not rebuild the model of the {} original ones",
            compacted.len(),
            records.len()
        )));
    }
    Ok((compacted, report))
}
