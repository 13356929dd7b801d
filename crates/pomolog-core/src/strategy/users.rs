//! User strategies. Only the System user may run them.

use super::engine::Exec;
use super::Strategy;
use crate::error::StrategyError;
use crate::events::Change;
use crate::model::User;

pub(super) fn create(cx: &mut Exec<'_>, email: &str, name: &str) -> Result<(), StrategyError> {
    cx.require_system_actor("create users")?;
    if cx.tenant.contains_user(email) {
        return Err(StrategyError::already_exists("User", email));
    }

    let change = Change::UserCreate {
        email: email.to_string(),
        name: name.to_string(),
    };
    cx.before(&change);
    cx.tenant.insert_user(User::new(email, name, false, cx.when));
    cx.after(change);
    Ok(())
}

/// Deletes the user after deleting each of its backlogs on its behalf.
pub(super) fn delete(cx: &mut Exec<'_>, email: &str) -> Result<(), StrategyError> {
    cx.require_system_actor("delete users")?;
    let user = cx
        .tenant
        .user(email)
        .ok_or_else(|| StrategyError::not_found("User", email))?;
    if user.is_system() {
        return Err(StrategyError::PermissionDenied(
            "the System user cannot be deleted".into(),
        ));
    }
    let backlogs: Vec<String> = user.backlogs().map(|b| b.uid().to_string()).collect();

    let change = Change::UserDelete {
        email: email.to_string(),
    };
    cx.before(&change);
    for uid in backlogs {
        cx.cascade(&Strategy::DeleteBacklog { uid }, Some(email))?;
    }
    cx.tenant.remove_user(email);
    cx.after(change);
    Ok(())
}

pub(super) fn rename(cx: &mut Exec<'_>, email: &str, new_name: &str) -> Result<(), StrategyError> {
    cx.require_system_actor("rename users")?;
    let user = cx
        .tenant
        .user(email)
        .ok_or_else(|| StrategyError::not_found("User", email))?;
    if user.is_system() {
        return Err(StrategyError::PermissionDenied(
            "the System user cannot be renamed".into(),
        ));
    }
    if user.name() == new_name {
        return Ok(());
    }

    let change = Change::UserRename {
        email: email.to_string(),
        old_name: user.name().to_string(),
        new_name: new_name.to_string(),
    };
    cx.before(&change);
    if let Some(user) = cx.tenant.user_mut(email) {
        user.set_name(new_name, cx.when);
    }
    cx.after(change);
    Ok(())
}
