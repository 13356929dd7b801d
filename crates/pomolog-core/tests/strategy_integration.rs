//! Integration tests for strategy application through the sequencer.
//!
//! Covers the timer scenario end to end, atomicity of rejected strategies,
//! cascade event order, rename no-ops, permissions and offline catch-up.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pomolog_core::model::SYSTEM_USER;
use pomolog_core::strategy::MAX_POMODORO_COUNT;
use pomolog_core::{
    Change, CoreError, EngineSettings, Event, HistoryError, LogStore, MemoryLog, PomodoroState,
    Sequencer, Strategy, StrategyError, StrategyRecord, TimerDriver, TimerState, WorkitemState,
};
use std::cell::RefCell;
use std::rc::Rc;

const ALICE: &str = "alice@example.com";

// ============================================================================
// Test Helpers
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
}

fn sequencer() -> Sequencer<MemoryLog> {
    let mut seq = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    seq.ensure_actor("Alice", t0()).unwrap();
    seq
}

fn backlog(uid: &str, name: &str) -> Strategy {
    Strategy::CreateBacklog {
        uid: uid.into(),
        name: name.into(),
    }
}

fn workitem(uid: &str, backlog_uid: &str, name: &str) -> Strategy {
    Strategy::CreateWorkitem {
        uid: uid.into(),
        backlog_uid: backlog_uid.into(),
        name: name.into(),
    }
}

fn add(uid: &str, count: i64) -> Strategy {
    Strategy::AddPomodoro {
        workitem_uid: uid.into(),
        count,
    }
}

fn start_work(uid: &str, work: f64) -> Strategy {
    Strategy::StartWork {
        workitem_uid: uid.into(),
        work_duration: work,
        rest_duration: 0.0,
    }
}

/// Records the names of entity events only.
fn entity_log(seq: &mut Sequencer<MemoryLog>) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    seq.bus_mut().subscribe_all(move |event, _| {
        if matches!(event, Event::Entity { .. }) {
            sink.borrow_mut().push(event.name());
        }
    });
    seen
}

fn strategy_error(err: CoreError) -> StrategyError {
    match err {
        CoreError::Strategy(e) => e,
        other => panic!("expected a strategy error, got {other:?}"),
    }
}

// ============================================================================
// Timer scenario
// ============================================================================

#[test]
fn test_pomodoro_runs_through_work_and_rest() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    seq.submit_at(add("W1", 2), t0()).unwrap();
    seq.submit_at(start_work("W1", 1500.0), t0()).unwrap();

    let mut driver = TimerDriver::new();
    let work_end = t0() + Duration::seconds(1500);
    let transitions = driver.evaluate(&mut seq, work_end).unwrap();
    assert_eq!(transitions.len(), 1);
    assert_eq!(driver.state(), TimerState::RunningRest);

    let records = seq.store().all_records().unwrap();
    let last = records.last().unwrap();
    assert_eq!(
        last.strategy,
        Strategy::StartRest {
            workitem_uid: "W1".into(),
            rest_duration: 300.0,
        }
    );
    assert_eq!(last.when, work_end);

    let rest_end = work_end + Duration::seconds(300);
    driver.evaluate(&mut seq, rest_end).unwrap();
    assert_eq!(driver.state(), TimerState::Idle);

    let w1 = seq.tenant().find_workitem(ALICE, "W1").unwrap();
    assert_eq!(w1.pomodoros()[0].state(), PomodoroState::Finished);
    assert_eq!(w1.state(), WorkitemState::Running);
    assert_eq!(w1.startable_count(), 1);
    // Rest completion is implicit and never logged.
    assert_eq!(seq.store().all_records().unwrap().len(), records.len());
}

#[test]
fn test_start_work_without_startable_pomodoro_fails() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    let before = seq.tenant().clone();

    let err = strategy_error(seq.submit_at(start_work("W1", 600.0), t0()).unwrap_err());
    assert!(matches!(err, StrategyError::InvalidState(_)));
    assert_eq!(seq.tenant(), &before);
    assert_eq!(
        seq.tenant().find_workitem(ALICE, "W1").unwrap().state(),
        WorkitemState::New
    );
}

#[test]
fn test_remove_more_pomodoros_than_startable_fails() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    seq.submit_at(add("W1", 2), t0()).unwrap();
    let before = seq.tenant().clone();

    let err = strategy_error(
        seq.submit_at(
            Strategy::RemovePomodoro {
                workitem_uid: "W1".into(),
                count: 3,
            },
            t0(),
        )
        .unwrap_err(),
    );
    assert!(matches!(err, StrategyError::InvalidState(_)));
    assert_eq!(seq.tenant(), &before);
    assert_eq!(
        seq.tenant().find_workitem(ALICE, "W1").unwrap().startable_count(),
        2
    );
}

#[test]
fn test_counts_below_one_are_invalid_arguments() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    for count in [0, -2] {
        let err = strategy_error(seq.submit_at(add("W1", count), t0()).unwrap_err());
        assert!(matches!(err, StrategyError::InvalidArgument(_)));
    }
}

#[test]
fn test_counts_above_the_limit_are_invalid_arguments() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    for count in [MAX_POMODORO_COUNT + 1, 9_000_000_000_000_000_000] {
        let err = strategy_error(seq.submit_at(add("W1", count), t0()).unwrap_err());
        assert!(matches!(err, StrategyError::InvalidArgument(_)));
        let err = strategy_error(
            seq.submit_at(
                Strategy::RemovePomodoro {
                    workitem_uid: "W1".into(),
                    count,
                },
                t0(),
            )
            .unwrap_err(),
        );
        assert!(matches!(err, StrategyError::InvalidArgument(_)));
    }

    seq.submit_at(add("W1", MAX_POMODORO_COUNT), t0()).unwrap();
    let startable = seq.tenant().find_workitem(ALICE, "W1").unwrap().startable_count();
    assert_eq!(startable as i64, MAX_POMODORO_COUNT);

    // A logged oversized count fails replay instead of allocating.
    let mut records = seq.store().all_records().unwrap();
    records.truncate(3);
    records.push(StrategyRecord::new(4, t0(), ALICE, add("W1", i64::MAX)));
    let mut other = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    match other.replay(&records) {
        Err(CoreError::History(HistoryError::Inconsistent { seq, .. })) => assert_eq!(seq, 4),
        result => panic!("expected an inconsistent history, got {result:?}"),
    }
}

#[test]
fn test_durations_ending_out_of_range_are_rejected() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    seq.submit_at(add("W1", 1), t0()).unwrap();
    let before = seq.tenant().clone();

    for strategy in [
        start_work("W1", 1e13),
        Strategy::StartWork {
            workitem_uid: "W1".into(),
            work_duration: 60.0,
            rest_duration: f64::MAX,
        },
    ] {
        let err = strategy_error(seq.submit_at(strategy, t0()).unwrap_err());
        assert!(matches!(err, StrategyError::InvalidArgument(_)));
        assert_eq!(seq.tenant(), &before);
    }

    seq.submit_at(start_work("W1", 60.0), t0()).unwrap();
    let err = strategy_error(
        seq.submit_at(
            Strategy::StartRest {
                workitem_uid: "W1".into(),
                rest_duration: 1e13,
            },
            t0() + Duration::seconds(30),
        )
        .unwrap_err(),
    );
    assert!(matches!(err, StrategyError::InvalidArgument(_)));

    // Later catch-up scopes and timer queries still work.
    let mut driver = TimerDriver::new();
    driver
        .evaluate(&mut seq, t0() + Duration::seconds(60))
        .unwrap();
    assert_eq!(driver.state(), TimerState::RunningRest);
    seq.submit_at(
        Strategy::DeleteWorkitem { uid: "W1".into() },
        t0() + Duration::hours(2),
    )
    .unwrap();
    assert!(seq.tenant().find_workitem(ALICE, "W1").is_none());
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn test_rejected_strategies_leave_the_model_byte_identical() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write docs"), t0()).unwrap();
    seq.submit_at(add("W1", 1), t0()).unwrap();
    seq.submit_at(
        Strategy::CompleteWorkitem {
            uid: "W1".into(),
            target: "finished".into(),
        },
        t0(),
    )
    .unwrap();
    let before = serde_json::to_string(seq.tenant()).unwrap();

    let rejected = vec![
        backlog("B1", "Again"),
        workitem("W1", "B1", "Again"),
        workitem("W2", "missing", "Nowhere"),
        start_work("W1", 0.0),
        Strategy::RenameWorkitem {
            uid: "W1".into(),
            new_name: "Sealed".into(),
        },
        Strategy::CompleteWorkitem {
            uid: "W1".into(),
            target: "canceled".into(),
        },
        Strategy::VoidPomodoro {
            workitem_uid: "W1".into(),
        },
        Strategy::StartRest {
            workitem_uid: "W1".into(),
            rest_duration: 0.0,
        },
        Strategy::DeleteWorkitem { uid: "nope".into() },
        Strategy::CreateUser {
            email: "bob@example.com".into(),
            name: "Bob".into(),
        },
    ];
    for strategy in rejected {
        let name = strategy.name();
        assert!(seq.submit_at(strategy, t0()).is_err(), "{name} should fail");
        assert_eq!(serde_json::to_string(seq.tenant()).unwrap(), before, "{name} mutated the model");
    }
}

#[test]
fn test_failed_strategy_rolls_back_its_catch_up() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Running"), t0()).unwrap();
    seq.submit_at(workitem("W2", "B1", "Empty"), t0()).unwrap();
    seq.submit_at(add("W1", 1), t0()).unwrap();
    seq.submit_at(start_work("W1", 60.0), t0()).unwrap();
    let before = seq.tenant().clone();
    let seen = entity_log(&mut seq);

    // W1 is overdue, but W2 has nothing to start.
    let later = t0() + Duration::hours(1);
    assert!(seq.submit_at(start_work("W2", 0.0), later).is_err());
    assert_eq!(seq.tenant(), &before);
    assert!(seen.borrow().is_empty());
}

// ============================================================================
// Cascades and events
// ============================================================================

#[test]
fn test_delete_backlog_cascades_bottom_up() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    for uid in ["W1", "W2", "W3"] {
        seq.submit_at(workitem(uid, "B1", uid), t0()).unwrap();
    }
    seq.submit_at(add("W2", 1), t0()).unwrap();
    seq.submit_at(start_work("W2", 0.0), t0()).unwrap();

    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    seq.bus_mut().subscribe_all(move |event, _| {
        if let Event::Entity {
            phase: pomolog_core::Phase::After,
            change,
            ..
        } = event
        {
            sink.borrow_mut().push(change.clone());
        }
    });

    seq.submit_at(Strategy::DeleteBacklog { uid: "B1".into() }, t0() + Duration::seconds(10))
        .unwrap();

    let changes = changes.borrow();
    let summary: Vec<String> = changes
        .iter()
        .map(|c| match c {
            Change::PomodoroComplete { pomodoro, target } => {
                format!("{}:{}", pomodoro.workitem.uid, target)
            }
            Change::WorkitemDelete { workitem } => format!("delete {}", workitem.uid),
            Change::BacklogDelete { backlog } => format!("delete {}", backlog.uid),
            other => format!("{:?}", other.kind()),
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            "delete W1",
            "W2:canceled",
            "delete W2",
            "delete W3",
            "delete B1"
        ]
    );
    assert!(seq.tenant().backlog(ALICE, "B1").is_none());
}

#[test]
fn test_delete_user_removes_everything_it_owns() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(backlog("B2", "Later"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B2", "Something"), t0()).unwrap();

    let seen = entity_log(&mut seq);
    seq.submit_as(
        SYSTEM_USER,
        Strategy::DeleteUser {
            email: ALICE.into(),
        },
        t0(),
        None,
    )
    .unwrap();

    assert!(!seq.tenant().contains_user(ALICE));
    let seen = seen.borrow();
    assert_eq!(seen.first().map(String::as_str), Some("BeforeUserDelete"));
    assert_eq!(seen.last().map(String::as_str), Some("AfterUserDelete"));
    assert_eq!(seen.iter().filter(|n| *n == "AfterBacklogDelete").count(), 2);
}

#[test]
fn test_rename_to_same_name_is_silent() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Same Name"), t0()).unwrap();
    let modified = seq
        .tenant()
        .find_workitem(ALICE, "W1")
        .unwrap()
        .last_modified();
    let seen = entity_log(&mut seq);

    seq.submit_at(
        Strategy::RenameWorkitem {
            uid: "W1".into(),
            new_name: "Same Name".into(),
        },
        t0() + Duration::minutes(5),
    )
    .unwrap();
    seq.submit_at(
        Strategy::RenameBacklog {
            uid: "B1".into(),
            new_name: "Today".into(),
        },
        t0() + Duration::minutes(5),
    )
    .unwrap();

    assert!(seen.borrow().is_empty());
    assert_eq!(
        seq.tenant()
            .find_workitem(ALICE, "W1")
            .unwrap()
            .last_modified(),
        modified
    );
}

#[test]
fn test_workitem_start_precedes_pomodoro_start() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write"), t0()).unwrap();
    seq.submit_at(add("W1", 1), t0()).unwrap();
    let seen = entity_log(&mut seq);

    seq.submit_at(start_work("W1", 0.0), t0()).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            "BeforeWorkitemStart",
            "AfterWorkitemStart",
            "BeforePomodoroWorkStart",
            "AfterPomodoroWorkStart",
        ]
    );
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn test_only_system_manages_users() {
    let mut seq = sequencer();
    let err = strategy_error(
        seq.submit_at(
            Strategy::CreateUser {
                email: ALICE.into(),
                name: "Alice again".into(),
            },
            t0(),
        )
        .unwrap_err(),
    );
    assert!(matches!(err, StrategyError::PermissionDenied(_)));

    for strategy in [
        Strategy::DeleteUser {
            email: SYSTEM_USER.into(),
        },
        Strategy::RenameUser {
            email: SYSTEM_USER.into(),
            new_name: "Root".into(),
        },
    ] {
        let err = strategy_error(seq.submit_as(SYSTEM_USER, strategy, t0(), None).unwrap_err());
        assert!(matches!(err, StrategyError::PermissionDenied(_)));
    }
}

#[test]
fn test_unknown_actor_is_not_found() {
    let mut seq = Sequencer::new(MemoryLog::new(), "ghost@example.com", EngineSettings::default());
    let err = strategy_error(seq.submit_at(backlog("B1", "Today"), t0()).unwrap_err());
    assert!(matches!(err, StrategyError::NotFound { entity: "User", .. }));
}

// ============================================================================
// Catch-up
// ============================================================================

#[test]
fn test_offline_gap_is_reconstructed_on_replay() {
    // The client never logged StartRest: it was offline when work ended.
    let mut live = sequencer();
    live.submit_at(backlog("B1", "Today"), t0()).unwrap();
    live.submit_at(workitem("W1", "B1", "Write"), t0()).unwrap();
    live.submit_at(add("W1", 2), t0()).unwrap();
    live.submit_at(start_work("W1", 0.0), t0()).unwrap();

    let later = t0() + Duration::hours(3);
    live.submit_at(start_work("W1", 0.0), later).unwrap();

    let w1 = live.tenant().find_workitem(ALICE, "W1").unwrap();
    let first = &w1.pomodoros()[0];
    assert_eq!(first.state(), PomodoroState::Finished);
    assert_eq!(first.rest_started_at(), Some(t0() + Duration::seconds(1500)));
    assert_eq!(first.completed_at(), Some(t0() + Duration::seconds(1800)));
    assert!(w1.pomodoros()[1].is_working());

    let records = live.store().all_records().unwrap();
    let mut other = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    other.replay(&records).unwrap();
    assert_eq!(other.tenant(), live.tenant());
}

#[test]
fn test_void_cancels_running_pomodoro_after_overdue_work() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Write"), t0()).unwrap();
    seq.submit_at(add("W1", 1), t0()).unwrap();
    seq.submit_at(start_work("W1", 60.0), t0()).unwrap();

    // Work is over but rest is not: the void hits the resting pomodoro.
    seq.submit_at(
        Strategy::VoidPomodoro {
            workitem_uid: "W1".into(),
        },
        t0() + Duration::seconds(120),
    )
    .unwrap();
    let pomodoro = &seq.tenant().find_workitem(ALICE, "W1").unwrap().pomodoros()[0];
    assert_eq!(pomodoro.state(), PomodoroState::Canceled);
    assert_eq!(pomodoro.rest_started_at(), Some(t0() + Duration::seconds(60)));
}

// ============================================================================
// Backlog order
// ============================================================================

fn reorder(uid: &str, new_index: i64) -> Strategy {
    Strategy::ReorderBacklog {
        uid: uid.into(),
        new_index,
    }
}

fn backlog_order(seq: &Sequencer<MemoryLog>) -> Vec<String> {
    seq.tenant()
        .user(ALICE)
        .unwrap()
        .backlogs()
        .map(|b| b.uid().to_string())
        .collect()
}

#[test]
fn test_reorder_backlog_moves_it_and_replays() {
    let mut seq = sequencer();
    for uid in ["B1", "B2", "B3"] {
        seq.submit_at(backlog(uid, uid), t0()).unwrap();
    }
    let seen = entity_log(&mut seq);

    let later = t0() + Duration::minutes(1);
    seq.submit_at(reorder("B3", 0), later).unwrap();
    assert_eq!(backlog_order(&seq), vec!["B3", "B1", "B2"]);
    assert_eq!(*seen.borrow(), vec!["BeforeBacklogReorder", "AfterBacklogReorder"]);
    let b3 = seq.tenant().backlog(ALICE, "B3").unwrap();
    assert_eq!(b3.last_modified(), later);

    // Moving to the current position changes nothing.
    seq.submit_at(reorder("B3", 0), later + Duration::minutes(1)).unwrap();
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(seq.tenant().backlog(ALICE, "B3").unwrap().last_modified(), later);

    let records = seq.store().all_records().unwrap();
    let mut other = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    other.replay(&records).unwrap();
    assert_eq!(backlog_order(&other), vec!["B3", "B1", "B2"]);
    assert_eq!(other.tenant(), seq.tenant());
}

#[test]
fn test_reorder_backlog_validates_its_target() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(backlog("B2", "Later"), t0()).unwrap();

    for index in [2, -1] {
        let err = strategy_error(seq.submit_at(reorder("B1", index), t0()).unwrap_err());
        assert!(matches!(err, StrategyError::InvalidArgument(_)), "{index}");
    }
    let err = strategy_error(seq.submit_at(reorder("B9", 0), t0()).unwrap_err());
    assert_eq!(err, StrategyError::not_found("Backlog", "B9"));
    assert_eq!(backlog_order(&seq), vec!["B1", "B2"]);
}

// ============================================================================
// Tags
// ============================================================================

/// Records tag events as `"<kind> <tag>"`.
fn tag_log(seq: &mut Sequencer<MemoryLog>) -> Rc<RefCell<Vec<String>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    seq.bus_mut().subscribe_all(move |event, _| {
        let line = match event {
            Event::TagCreated { tag, .. } => format!("created {tag}"),
            Event::TagDeleted { tag, .. } => format!("deleted {tag}"),
            Event::TagContentChanged { tag, workitems, .. } => {
                format!("changed {tag} {}", workitems.join(","))
            }
            _ => return,
        };
        sink.borrow_mut().push(line);
    });
    seen
}

#[test]
fn test_tags_follow_workitem_names() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    let seen = tag_log(&mut seq);

    seq.submit_at(workitem("W1", "B1", "There is #one tag"), t0()).unwrap();
    seq.submit_at(workitem("W2", "B1", "There is #another #One"), t0()).unwrap();
    seq.submit_at(workitem("W3", "B1", "No tags here"), t0()).unwrap();
    let tags = seq.tenant().user(ALICE).unwrap().tags();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["one"], vec!["W1", "W2"]);
    assert_eq!(tags["another"], vec!["W2"]);

    seq.submit_at(
        Strategy::RenameWorkitem {
            uid: "W1".into(),
            new_name: "#Third tag".into(),
        },
        t0(),
    )
    .unwrap();
    seq.submit_at(Strategy::DeleteWorkitem { uid: "W2".into() }, t0())
        .unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            "created one",
            "created another",
            "changed one W1,W2",
            "changed one W2",
            "created third",
            "deleted another",
            "deleted one",
        ]
    );
    let tags = seq.tenant().user(ALICE).unwrap().tags();
    assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["third"]);
}

#[test]
fn test_tag_events_are_muted_during_replay() {
    let mut seq = sequencer();
    seq.submit_at(backlog("B1", "Today"), t0()).unwrap();
    seq.submit_at(workitem("W1", "B1", "Plan #q3"), t0()).unwrap();
    let records = seq.store().all_records().unwrap();

    let mut other = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    let seen = tag_log(&mut other);
    other.replay(&records).unwrap();
    assert!(seen.borrow().is_empty());
    assert_eq!(other.tenant().user(ALICE).unwrap().tags()["q3"], vec!["W1"]);
}
