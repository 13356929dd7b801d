use super::engine::Exec;
use super::pomodoros;
use crate::error::StrategyError;
use crate::events::{Change, WorkitemRef};
use crate::model::{Workitem, WorkitemState};

pub(super) fn create(
    cx: &mut Exec<'_>,
    uid: &str,
    backlog_uid: &str,
    name: &str,
) -> Result<(), StrategyError> {
    let user = cx.require_actor()?;
    let backlog = user
        .backlog(backlog_uid)
        .ok_or_else(|| StrategyError::not_found("Backlog", backlog_uid))?;
    if backlog.contains_workitem(uid) {
        return Err(StrategyError::already_exists("Workitem", uid));
    }

    let workitem_ref = WorkitemRef {
        owner: cx.actor.clone(),
        backlog_uid: backlog_uid.to_string(),
        uid: uid.to_string(),
    };
    let change = Change::WorkitemCreate {
        workitem: workitem_ref,
        name: name.to_string(),
        intent: cx.intent,
    };
    let tags = cx.tags_of(&cx.actor);
    cx.before(&change);
    let workitem = Workitem::new(
        uid,
        backlog_uid,
        name,
        cx.settings.default_work_duration,
        cx.settings.default_rest_duration,
        cx.when,
    );
    if let Some(backlog) = cx.tenant.backlog_mut(&cx.actor, backlog_uid) {
        backlog.insert_workitem(workitem);
    }
    cx.after(change);
    let owner = cx.actor.clone();
    cx.retagged(&owner, &tags);
    Ok(())
}

pub(super) fn delete(cx: &mut Exec<'_>, uid: &str) -> Result<(), StrategyError> {
    let workitem = cx.resolve_workitem(uid)?;
    delete_resolved(cx, &workitem)
}

/// Voids the running pomodoro, if any, then removes the workitem.
pub(super) fn delete_resolved(cx: &mut Exec<'_>, r: &WorkitemRef) -> Result<(), StrategyError> {
    let running = cx.workitem(r)?.running_pomodoro().is_some();
    let tags = cx.tags_of(&r.owner);

    let change = Change::WorkitemDelete {
        workitem: r.clone(),
    };
    cx.before(&change);
    if running {
        cx.nested("VoidPomodoro", None, None, |cx| pomodoros::void_resolved(cx, r))?;
    }
    if let Some(backlog) = cx.tenant.backlog_mut(&r.owner, &r.backlog_uid) {
        backlog.remove_workitem(&r.uid);
    }
    cx.after(change);
    cx.retagged(&r.owner, &tags);
    Ok(())
}

/// A rename to the current name is a silent no-op, even on a sealed workitem.
pub(super) fn rename(cx: &mut Exec<'_>, uid: &str, new_name: &str) -> Result<(), StrategyError> {
    let r = cx.resolve_workitem(uid)?;
    let workitem = cx.workitem(&r)?;
    if workitem.name() == new_name {
        return Ok(());
    }
    if workitem.is_sealed() {
        return Err(StrategyError::InvalidState(format!(
            "cannot rename workitem '{uid}' because it is {}",
            workitem.state()
        )));
    }

    let change = Change::WorkitemRename {
        workitem: r.clone(),
        old_name: workitem.name().to_string(),
        new_name: new_name.to_string(),
    };
    let tags = cx.tags_of(&r.owner);
    cx.before(&change);
    let when = cx.when;
    cx.workitem_mut(&r)?.set_name(new_name, when);
    cx.after(change);
    cx.retagged(&r.owner, &tags);
    Ok(())
}

/// Voids the running pomodoro, if any, then seals the workitem.
pub(super) fn complete(cx: &mut Exec<'_>, uid: &str, target: &str) -> Result<(), StrategyError> {
    let r = cx.resolve_workitem(uid)?;
    let target = WorkitemState::parse_seal_target(target).ok_or_else(|| {
        StrategyError::InvalidArgument(format!(
            "workitem can only be completed as finished or canceled, not '{target}'"
        ))
    })?;
    let workitem = cx.workitem(&r)?;
    if workitem.is_sealed() {
        return Err(StrategyError::InvalidState(format!(
            "workitem '{uid}' is already {}",
            workitem.state()
        )));
    }
    let running = workitem.running_pomodoro().is_some();

    let change = Change::WorkitemComplete {
        workitem: r.clone(),
        target,
    };
    cx.before(&change);
    if running {
        cx.nested("VoidPomodoro", None, None, |cx| pomodoros::void_resolved(cx, &r))?;
    }
    let when = cx.when;
    cx.workitem_mut(&r)?.seal(target, when);
    cx.after(change);
    Ok(())
}
