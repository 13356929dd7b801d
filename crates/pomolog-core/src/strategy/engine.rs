//! Applies strategies to a [`Tenant`].
//!
//! Every application runs inside an [`Exec`] context: the tenant, the bus,
//! the settings, and the stamp (sequence number, timestamp, actor) of the
//! record being applied. Cascades and timer catch-up run as nested
//! applications in the same context, each bracketed by MessageProcessed
//! events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{backlogs, pomodoros, users, workitems, Strategy};
use crate::bus::EventBus;
use crate::error::StrategyError;
use crate::events::{Change, Event, Intent, Phase, WorkitemRef};
use crate::model::{Backlog, PhaseEnd, TagIndex, Tenant, User, Workitem, SYSTEM_USER};

/// Values captured into new entities at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Seconds.
    pub default_work_duration: f64,
    /// Seconds.
    pub default_rest_duration: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_work_duration: 1500.0,
            default_rest_duration: 300.0,
        }
    }
}

pub(crate) struct Exec<'a> {
    pub(crate) tenant: &'a mut Tenant,
    pub(crate) bus: &'a mut EventBus,
    pub(crate) settings: &'a EngineSettings,
    pub(crate) seq: u64,
    pub(crate) when: DateTime<Utc>,
    pub(crate) actor: String,
    pub(crate) intent: Option<Intent>,
}

impl<'a> Exec<'a> {
    pub(crate) fn new(
        tenant: &'a mut Tenant,
        bus: &'a mut EventBus,
        settings: &'a EngineSettings,
        seq: u64,
        when: DateTime<Utc>,
        actor: &str,
    ) -> Self {
        Self {
            tenant,
            bus,
            settings,
            seq,
            when,
            actor: actor.to_string(),
            intent: None,
        }
    }

    pub(crate) fn with_intent(mut self, intent: Option<Intent>) -> Self {
        self.intent = intent;
        self
    }

    // ── Events ───────────────────────────────────────────────────────

    pub(crate) fn before(&mut self, change: &Change) {
        self.bus.emit(Event::Entity {
            phase: Phase::Before,
            change: change.clone(),
            at: self.when,
        });
    }

    pub(crate) fn after(&mut self, change: Change) {
        self.bus.emit(Event::Entity {
            phase: Phase::After,
            change,
            at: self.when,
        });
    }

    fn bracket(&mut self, phase: Phase, name: &str, auto: bool, persist: bool) {
        self.bus.emit(Event::MessageProcessed {
            phase,
            seq: self.seq,
            name: name.to_string(),
            auto,
            persist,
            at: self.when,
        });
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub(crate) fn tags_of(&self, owner: &str) -> TagIndex {
        self.tenant.user(owner).map(User::tags).unwrap_or_default()
    }

    /// Announces how `owner`'s tags differ from `before`.
    pub(crate) fn retagged(&mut self, owner: &str, before: &TagIndex) {
        let after = self.tags_of(owner);
        let at = self.when;
        for tag in before.keys().filter(|tag| !after.contains_key(*tag)) {
            self.bus.emit(Event::TagDeleted {
                owner: owner.to_string(),
                tag: tag.clone(),
                at,
            });
        }
        for (tag, workitems) in &after {
            match before.get(tag) {
                None => self.bus.emit(Event::TagCreated {
                    owner: owner.to_string(),
                    tag: tag.clone(),
                    at,
                }),
                Some(previous) if previous != workitems => {
                    self.bus.emit(Event::TagContentChanged {
                        owner: owner.to_string(),
                        tag: tag.clone(),
                        workitems: workitems.clone(),
                        at,
                    })
                }
                Some(_) => {}
            }
        }
    }

    // ── Nesting ──────────────────────────────────────────────────────

    /// Runs `f` as a non-persisted, engine-issued application named `name`,
    /// optionally on behalf of another user and at another instant.
    pub(crate) fn nested<F>(
        &mut self,
        name: &'static str,
        actor: Option<&str>,
        when: Option<DateTime<Utc>>,
        f: F,
    ) -> Result<(), StrategyError>
    where
        F: FnOnce(&mut Self) -> Result<(), StrategyError>,
    {
        let saved_actor = actor.map(|a| std::mem::replace(&mut self.actor, a.to_string()));
        let saved_when = when.map(|w| std::mem::replace(&mut self.when, w));
        let saved_intent = self.intent.take();

        self.bracket(Phase::Before, name, true, false);
        let result = f(self);
        self.bracket(Phase::After, name, true, false);

        if let Some(actor) = saved_actor {
            self.actor = actor;
        }
        if let Some(when) = saved_when {
            self.when = when;
        }
        self.intent = saved_intent;
        result
    }

    /// Executes a child strategy as part of a cascade.
    pub(crate) fn cascade(
        &mut self,
        strategy: &Strategy,
        actor: Option<&str>,
    ) -> Result<(), StrategyError> {
        self.nested(strategy.name(), actor, None, |cx| execute(cx, strategy))
    }

    // ── Lookups ──────────────────────────────────────────────────────

    /// The acting user, who must exist.
    pub(crate) fn require_actor(&self) -> Result<&User, StrategyError> {
        self.tenant
            .user(&self.actor)
            .ok_or_else(|| StrategyError::not_found("User", self.actor.as_str()))
    }

    pub(crate) fn require_system_actor(&self, what: &str) -> Result<(), StrategyError> {
        if self.actor != SYSTEM_USER {
            return Err(StrategyError::PermissionDenied(format!(
                "only the System user can {what}, not {}",
                self.actor
            )));
        }
        Ok(())
    }

    /// Finds a workitem by uid among the actor's backlogs.
    pub(crate) fn resolve_workitem(&self, uid: &str) -> Result<WorkitemRef, StrategyError> {
        let user = self.require_actor()?;
        user.backlogs()
            .find(|b| b.contains_workitem(uid))
            .map(|b| WorkitemRef {
                owner: user.email().to_string(),
                backlog_uid: b.uid().to_string(),
                uid: uid.to_string(),
            })
            .ok_or_else(|| StrategyError::not_found("Workitem", uid))
    }

    pub(crate) fn workitem(&self, r: &WorkitemRef) -> Result<&Workitem, StrategyError> {
        self.tenant
            .backlog(&r.owner, &r.backlog_uid)
            .and_then(|b| b.workitem(&r.uid))
            .ok_or_else(|| StrategyError::not_found("Workitem", r.uid.as_str()))
    }

    pub(crate) fn workitem_mut(&mut self, r: &WorkitemRef) -> Result<&mut Workitem, StrategyError> {
        self.tenant
            .backlog_mut(&r.owner, &r.backlog_uid)
            .and_then(|b| b.workitem_mut(&r.uid))
            .ok_or_else(|| StrategyError::not_found("Workitem", r.uid.as_str()))
    }
}

/// Dispatches a strategy to its handler. No bracketing, no catch-up.
pub(crate) fn execute(cx: &mut Exec<'_>, strategy: &Strategy) -> Result<(), StrategyError> {
    match strategy {
        Strategy::CreateUser { email, name } => users::create(cx, email, name),
        Strategy::DeleteUser { email } => users::delete(cx, email),
        Strategy::RenameUser { email, new_name } => users::rename(cx, email, new_name),
        Strategy::CreateBacklog { uid, name } => backlogs::create(cx, uid, name),
        Strategy::DeleteBacklog { uid } => backlogs::delete(cx, uid),
        Strategy::RenameBacklog { uid, new_name } => backlogs::rename(cx, uid, new_name),
        Strategy::ReorderBacklog { uid, new_index } => backlogs::reorder(cx, uid, *new_index),
        Strategy::CreateWorkitem {
            uid,
            backlog_uid,
            name,
        } => workitems::create(cx, uid, backlog_uid, name),
        Strategy::DeleteWorkitem { uid } => workitems::delete(cx, uid),
        Strategy::RenameWorkitem { uid, new_name } => workitems::rename(cx, uid, new_name),
        Strategy::CompleteWorkitem { uid, target } => workitems::complete(cx, uid, target),
        Strategy::AddPomodoro {
            workitem_uid,
            count,
        } => pomodoros::add(cx, workitem_uid, *count),
        Strategy::RemovePomodoro {
            workitem_uid,
            count,
        } => pomodoros::remove(cx, workitem_uid, *count),
        Strategy::VoidPomodoro { workitem_uid } => pomodoros::void(cx, workitem_uid),
        Strategy::StartWork {
            workitem_uid,
            work_duration,
            rest_duration,
        } => pomodoros::start_work(cx, workitem_uid, *work_duration, *rest_duration),
        Strategy::StartRest {
            workitem_uid,
            rest_duration,
        } => pomodoros::start_rest(cx, workitem_uid, *rest_duration),
        Strategy::CompletePomodoro {
            workitem_uid,
            target,
        } => pomodoros::complete_legacy(cx, workitem_uid, target),
    }
}

/// Applies a top-level strategy: overdue timer transitions in its scope
/// first, then the strategy itself.
///
/// Either everything is applied or the tenant is left exactly as it was and
/// no events are delivered for the catch-up part.
pub(crate) fn apply(
    cx: &mut Exec<'_>,
    strategy: &Strategy,
    persist: bool,
) -> Result<(), StrategyError> {
    let due = if strategy.requires_catch_up() {
        due_in_scope(cx.tenant, &cx.actor, strategy, cx.when)
    } else {
        Vec::new()
    };

    if due.is_empty() {
        return apply_bracketed(cx, strategy, persist);
    }

    debug!(
        seq = cx.seq,
        strategy = strategy.name(),
        workitems = due.len(),
        "catching up overdue pomodoros"
    );
    let snapshot = cx.tenant.clone();
    cx.bus.hold();
    match catch_up_then_apply(cx, &due, strategy, persist) {
        Ok(()) => {
            cx.bus.release();
            Ok(())
        }
        Err(e) => {
            *cx.tenant = snapshot;
            cx.bus.discard();
            Err(e)
        }
    }
}

/// Applies the end of a timer phase as an engine-issued, non-persisted
/// transition (`StartRest` after work, `FinishPomodoro` after rest).
pub(crate) fn apply_phase_end(
    cx: &mut Exec<'_>,
    workitem_uid: &str,
    phase: PhaseEnd,
) -> Result<(), StrategyError> {
    cx.nested(phase.transition_name(), None, None, |cx| {
        pomodoros::end_phase(cx, workitem_uid, phase)
    })
}

fn apply_bracketed(
    cx: &mut Exec<'_>,
    strategy: &Strategy,
    persist: bool,
) -> Result<(), StrategyError> {
    cx.bracket(Phase::Before, strategy.name(), false, persist);
    let result = execute(cx, strategy);
    // Closed on failure too: every Before is paired with an After.
    cx.bracket(Phase::After, strategy.name(), false, persist);
    result
}

fn catch_up_then_apply(
    cx: &mut Exec<'_>,
    due: &[WorkitemRef],
    strategy: &Strategy,
    persist: bool,
) -> Result<(), StrategyError> {
    for workitem in due {
        pomodoros::catch_up(cx, workitem)?;
    }
    apply_bracketed(cx, strategy, persist)
}

/// Workitems touched by `strategy` whose running pomodoro has a phase end
/// due at `at`.
fn due_in_scope(
    tenant: &Tenant,
    actor: &str,
    strategy: &Strategy,
    at: DateTime<Utc>,
) -> Vec<WorkitemRef> {
    let Some(owner) = tenant.user(match strategy {
        Strategy::DeleteUser { email } => email.as_str(),
        _ => actor,
    }) else {
        return Vec::new();
    };

    let is_due = |w: &Workitem| w.due_phase_end(at).is_some();
    let to_ref = |b: &Backlog, w: &Workitem| WorkitemRef {
        owner: owner.email().to_string(),
        backlog_uid: b.uid().to_string(),
        uid: w.uid().to_string(),
    };
    // Workitem strategies act on the first backlog holding the uid.
    let single = |uid: &str| -> Vec<WorkitemRef> {
        owner
            .backlogs()
            .find_map(|b| b.workitem(uid).map(|w| (b, w)))
            .filter(|(_, w)| is_due(*w))
            .map(|(b, w)| to_ref(b, w))
            .into_iter()
            .collect()
    };
    let all_in = |backlog: Option<&str>| -> Vec<WorkitemRef> {
        owner
            .backlogs()
            .filter(|b| backlog.map_or(true, |uid| b.uid() == uid))
            .flat_map(|b| b.workitems().filter(|w| is_due(*w)).map(move |w| to_ref(b, w)))
            .collect()
    };

    match strategy {
        Strategy::StartWork { .. } | Strategy::DeleteUser { .. } => all_in(None),
        Strategy::DeleteBacklog { uid } => all_in(Some(uid)),
        Strategy::VoidPomodoro { workitem_uid }
        | Strategy::CompletePomodoro { workitem_uid, .. } => single(workitem_uid),
        Strategy::CompleteWorkitem { uid, .. } | Strategy::DeleteWorkitem { uid } => single(uid),
        _ => Vec::new(),
    }
}
