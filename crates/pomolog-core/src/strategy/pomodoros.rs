//! Pomodoro strategies, plus the two implicit timer transitions (rest start
//! at the end of work, finish at the end of rest).

use tracing::debug;

use super::engine::Exec;
use crate::error::StrategyError;
use crate::events::{Change, PomodoroRef, WorkitemRef};
use crate::model::{after_secs, PhaseEnd, PomodoroState, Workitem};

/// Upper bound on the count of a single Add/RemovePomodoro. Fixed rather
/// than configured so every peer replays the same log to the same model.
pub const MAX_POMODORO_COUNT: i64 = 1000;

fn check_count(count: i64) -> Result<usize, StrategyError> {
    if !(1..=MAX_POMODORO_COUNT).contains(&count) {
        return Err(StrategyError::InvalidArgument(format!(
            "pomodoro count must be between 1 and {MAX_POMODORO_COUNT}, got {count}"
        )));
    }
    usize::try_from(count)
        .map_err(|_| StrategyError::InvalidArgument(format!("pomodoro count {count} is too large")))
}

fn check_duration(what: &str, value: f64) -> Result<f64, StrategyError> {
    if !value.is_finite() || value < 0.0 {
        return Err(StrategyError::InvalidArgument(format!(
            "{what} duration must be a non-negative number of seconds, got {value}"
        )));
    }
    Ok(value)
}

fn ensure_unsealed(workitem: &Workitem, action: &str) -> Result<(), StrategyError> {
    if workitem.is_sealed() {
        return Err(StrategyError::InvalidState(format!(
            "cannot {action} on workitem '{}' because it is {}",
            workitem.uid(),
            workitem.state()
        )));
    }
    Ok(())
}

pub(super) fn add(cx: &mut Exec<'_>, workitem_uid: &str, count: i64) -> Result<(), StrategyError> {
    let count = check_count(count)?;
    let r = cx.resolve_workitem(workitem_uid)?;
    ensure_unsealed(cx.workitem(&r)?, "add pomodoros")?;

    let change = Change::PomodoroAdd {
        workitem: r.clone(),
        count,
    };
    cx.before(&change);
    let when = cx.when;
    cx.workitem_mut(&r)?.add_pomodoros(count, when);
    cx.after(change);
    Ok(())
}

/// Removes startable pomodoros from the end.
pub(super) fn remove(cx: &mut Exec<'_>, workitem_uid: &str, count: i64) -> Result<(), StrategyError> {
    let count = check_count(count)?;
    let r = cx.resolve_workitem(workitem_uid)?;
    let workitem = cx.workitem(&r)?;
    ensure_unsealed(workitem, "remove pomodoros")?;
    let available = workitem.startable_count();
    if available < count {
        return Err(StrategyError::InvalidState(format!(
            "cannot remove {count} pomodoros from workitem '{workitem_uid}', only {available} not started"
        )));
    }

    let change = Change::PomodoroRemove {
        workitem: r.clone(),
        count,
    };
    cx.before(&change);
    let when = cx.when;
    cx.workitem_mut(&r)?.remove_startable(count, when);
    cx.after(change);
    Ok(())
}

pub(super) fn void(cx: &mut Exec<'_>, workitem_uid: &str) -> Result<(), StrategyError> {
    let r = cx.resolve_workitem(workitem_uid)?;
    void_resolved(cx, &r)
}

/// Cancels the running pomodoro of `r`.
pub(super) fn void_resolved(cx: &mut Exec<'_>, r: &WorkitemRef) -> Result<(), StrategyError> {
    let workitem = cx.workitem(r)?;
    ensure_unsealed(workitem, "void a pomodoro")?;
    let (index, _) = workitem.running_pomodoro().ok_or_else(|| {
        StrategyError::InvalidState(format!("workitem '{}' has no running pomodoro", r.uid))
    })?;

    seal_pomodoro(cx, r, index, PomodoroState::Canceled)
}

/// Legacy `CompletePomodoro`: `canceled` voids, any other target does nothing.
pub(super) fn complete_legacy(
    cx: &mut Exec<'_>,
    workitem_uid: &str,
    target: &str,
) -> Result<(), StrategyError> {
    if target == "canceled" {
        void(cx, workitem_uid)
    } else {
        Ok(())
    }
}

/// Starts the next startable pomodoro, starting the workitem first if needed.
pub(super) fn start_work(
    cx: &mut Exec<'_>,
    workitem_uid: &str,
    work_duration: f64,
    rest_duration: f64,
) -> Result<(), StrategyError> {
    let work_duration = check_duration("work", work_duration)?;
    let rest_duration = check_duration("rest", rest_duration)?;
    let r = cx.resolve_workitem(workitem_uid)?;
    let workitem = cx.workitem(&r)?;
    ensure_unsealed(workitem, "start work")?;
    if workitem.running_pomodoro().is_some() {
        return Err(StrategyError::InvalidState(format!(
            "workitem '{workitem_uid}' already has a running pomodoro"
        )));
    }
    let index = workitem.next_startable().ok_or_else(|| {
        StrategyError::InvalidState(format!(
            "workitem '{workitem_uid}' has no startable pomodoro"
        ))
    })?;
    let pomodoro = &workitem.pomodoros()[index];
    let work = if work_duration == 0.0 {
        pomodoro.work_duration()
    } else {
        work_duration
    };
    let rest = if rest_duration == 0.0 {
        pomodoro.rest_duration()
    } else {
        rest_duration
    };
    let start_workitem = !workitem.is_running();
    let when = cx.when;
    if after_secs(when, work)
        .and_then(|end| after_secs(end, rest))
        .is_none()
    {
        return Err(StrategyError::InvalidArgument(format!(
            "a pomodoro of {work}s work and {rest}s rest started at {when} would end out of range"
        )));
    }

    if start_workitem {
        let change = Change::WorkitemStart {
            workitem: r.clone(),
        };
        cx.before(&change);
        cx.workitem_mut(&r)?.start(when);
        cx.after(change);
    }

    let change = Change::PomodoroWorkStart {
        pomodoro: PomodoroRef {
            workitem: r.clone(),
            index,
        },
        work_duration: work,
    };
    cx.before(&change);
    if let Some(pomodoro) = cx.workitem_mut(&r)?.pomodoro_mut(index) {
        pomodoro.start_work(work, rest, when);
    }
    cx.after(change);
    Ok(())
}

pub(super) fn start_rest(
    cx: &mut Exec<'_>,
    workitem_uid: &str,
    rest_duration: f64,
) -> Result<(), StrategyError> {
    let rest_duration = check_duration("rest", rest_duration)?;
    let r = cx.resolve_workitem(workitem_uid)?;
    start_rest_resolved(cx, &r, rest_duration)
}

fn start_rest_resolved(
    cx: &mut Exec<'_>,
    r: &WorkitemRef,
    rest_duration: f64,
) -> Result<(), StrategyError> {
    let workitem = cx.workitem(r)?;
    if !workitem.is_running() {
        return Err(StrategyError::InvalidState(format!(
            "cannot start rest on workitem '{}' because it is {}",
            r.uid,
            workitem.state()
        )));
    }
    let (index, pomodoro) = workitem
        .running_pomodoro()
        .filter(|(_, p)| p.is_working())
        .ok_or_else(|| {
            StrategyError::InvalidState(format!("workitem '{}' has no pomodoro in work", r.uid))
        })?;
    let rest = if rest_duration == 0.0 {
        pomodoro.rest_duration()
    } else {
        rest_duration
    };
    let when = cx.when;
    if after_secs(when, rest).is_none() {
        return Err(StrategyError::InvalidArgument(format!(
            "a rest of {rest}s started at {when} would end out of range"
        )));
    }

    let change = Change::PomodoroRestStart {
        pomodoro: PomodoroRef {
            workitem: r.clone(),
            index,
        },
        rest_duration: rest,
    };
    cx.before(&change);
    if let Some(pomodoro) = cx.workitem_mut(r)?.pomodoro_mut(index) {
        pomodoro.start_rest(rest, when);
    }
    cx.after(change);
    Ok(())
}

/// Implicit success path: the resting pomodoro of `r` becomes `finished`.
fn finish_resolved(cx: &mut Exec<'_>, r: &WorkitemRef) -> Result<(), StrategyError> {
    let (index, _) = cx
        .workitem(r)?
        .running_pomodoro()
        .filter(|(_, p)| p.is_resting())
        .ok_or_else(|| {
            StrategyError::InvalidState(format!("workitem '{}' has no pomodoro in rest", r.uid))
        })?;
    seal_pomodoro(cx, r, index, PomodoroState::Finished)
}

/// Applies the end of the current phase of `workitem_uid`'s running pomodoro:
/// rest starts after work, and the pomodoro finishes after rest.
pub(crate) fn end_phase(
    cx: &mut Exec<'_>,
    workitem_uid: &str,
    phase: PhaseEnd,
) -> Result<(), StrategyError> {
    let r = cx.resolve_workitem(workitem_uid)?;
    match phase {
        PhaseEnd::Work => start_rest_resolved(cx, &r, 0.0),
        PhaseEnd::Rest => finish_resolved(cx, &r),
    }
}

fn seal_pomodoro(
    cx: &mut Exec<'_>,
    r: &WorkitemRef,
    index: usize,
    target: PomodoroState,
) -> Result<(), StrategyError> {
    let change = Change::PomodoroComplete {
        pomodoro: PomodoroRef {
            workitem: r.clone(),
            index,
        },
        target,
    };
    cx.before(&change);
    let when = cx.when;
    if let Some(pomodoro) = cx.workitem_mut(r)?.pomodoro_mut(index) {
        pomodoro.seal(target, when);
    }
    cx.after(change);
    Ok(())
}

/// Applies every overdue phase end of `r`'s running pomodoro at its planned
/// time, on behalf of the workitem's owner.
pub(crate) fn catch_up(cx: &mut Exec<'_>, r: &WorkitemRef) -> Result<(), StrategyError> {
    let now = cx.when;
    while let Some((phase, at)) = cx.workitem(r)?.due_phase_end(now) {
        debug!(workitem = %r.uid, ?phase, %at, "applying overdue transition");
        cx.nested(phase.transition_name(), Some(r.owner.as_str()), Some(at), |cx| match phase {
            PhaseEnd::Work => start_rest_resolved(cx, r, 0.0),
            PhaseEnd::Rest => finish_resolved(cx, r),
        })?;
    }
    Ok(())
}
