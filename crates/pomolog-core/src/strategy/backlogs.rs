use super::engine::Exec;
use super::workitems;
use crate::error::StrategyError;
use crate::events::{BacklogRef, Change, WorkitemRef};
use crate::model::Backlog;

fn backlog_ref(cx: &Exec<'_>, uid: &str) -> BacklogRef {
    BacklogRef {
        owner: cx.actor.clone(),
        uid: uid.to_string(),
    }
}

pub(super) fn create(cx: &mut Exec<'_>, uid: &str, name: &str) -> Result<(), StrategyError> {
    let user = cx.require_actor()?;
    if user.contains_backlog(uid) {
        return Err(StrategyError::already_exists("Backlog", uid));
    }

    let change = Change::BacklogCreate {
        backlog: backlog_ref(cx, uid),
        name: name.to_string(),
        intent: cx.intent,
    };
    cx.before(&change);
    let backlog = Backlog::new(uid, name, &cx.actor, cx.when);
    if let Some(user) = cx.tenant.user_mut(&cx.actor) {
        user.insert_backlog(backlog);
    }
    cx.after(change);
    Ok(())
}

/// Deletes every workitem of the backlog, then the backlog itself.
pub(super) fn delete(cx: &mut Exec<'_>, uid: &str) -> Result<(), StrategyError> {
    let user = cx.require_actor()?;
    let backlog = user
        .backlog(uid)
        .ok_or_else(|| StrategyError::not_found("Backlog", uid))?;
    let children: Vec<WorkitemRef> = backlog
        .workitems()
        .map(|w| WorkitemRef {
            owner: user.email().to_string(),
            backlog_uid: uid.to_string(),
            uid: w.uid().to_string(),
        })
        .collect();

    let change = Change::BacklogDelete {
        backlog: backlog_ref(cx, uid),
    };
    cx.before(&change);
    for workitem in &children {
        cx.nested("DeleteWorkitem", None, None, |cx| {
            workitems::delete_resolved(cx, workitem)
        })?;
    }
    if let Some(user) = cx.tenant.user_mut(&cx.actor) {
        user.remove_backlog(uid);
    }
    cx.after(change);
    Ok(())
}

pub(super) fn rename(cx: &mut Exec<'_>, uid: &str, new_name: &str) -> Result<(), StrategyError> {
    let user = cx.require_actor()?;
    let backlog = user
        .backlog(uid)
        .ok_or_else(|| StrategyError::not_found("Backlog", uid))?;
    if backlog.name() == new_name {
        return Ok(());
    }

    let change = Change::BacklogRename {
        backlog: backlog_ref(cx, uid),
        old_name: backlog.name().to_string(),
        new_name: new_name.to_string(),
    };
    cx.before(&change);
    let when = cx.when;
    let actor = cx.actor.clone();
    if let Some(backlog) = cx.tenant.backlog_mut(&actor, uid) {
        backlog.set_name(new_name, when);
    }
    cx.after(change);
    Ok(())
}

/// Moving a backlog to where it already is is a silent no-op.
pub(super) fn reorder(cx: &mut Exec<'_>, uid: &str, new_index: i64) -> Result<(), StrategyError> {
    let user = cx.require_actor()?;
    let old_index = user
        .backlog_index(uid)
        .ok_or_else(|| StrategyError::not_found("Backlog", uid))?;
    let count = user.backlog_count();
    let new_index = usize::try_from(new_index)
        .ok()
        .filter(|i| *i < count)
        .ok_or_else(|| {
            StrategyError::InvalidArgument(format!(
                "backlog index must be between 0 and {}, got {new_index}",
                count - 1
            ))
        })?;
    if new_index == old_index {
        return Ok(());
    }

    let change = Change::BacklogReorder {
        backlog: backlog_ref(cx, uid),
        old_index,
        new_index,
    };
    cx.before(&change);
    let when = cx.when;
    let actor = cx.actor.clone();
    if let Some(user) = cx.tenant.user_mut(&actor) {
        user.move_backlog(old_index, new_index);
    }
    if let Some(backlog) = cx.tenant.backlog_mut(&actor, uid) {
        backlog.touch(when);
    }
    cx.after(change);
    Ok(())
}
