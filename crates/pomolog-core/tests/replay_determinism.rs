//! Property tests: any accepted sequence of strategies replays to the same
//! model, and compaction never changes what the log rebuilds.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pomolog_core::history::{compact, replay_from_empty};
use pomolog_core::{EngineSettings, LogStore, MemoryLog, Sequencer, Strategy};
use proptest::prelude::*;
use proptest::strategy::Strategy as _;

const ALICE: &str = "alice@example.com";
const BACKLOGS: &[&str] = &["B1", "B2"];
const WORKITEMS: &[&str] = &["W1", "W2", "W3"];
const NAMES: &[&str] = &["Alpha", "Beta #focus"];

#[derive(Debug, Clone)]
enum Op {
    CreateBacklog(usize, usize),
    RenameBacklog(usize, usize),
    DeleteBacklog(usize),
    ReorderBacklog(usize, i64),
    CreateWorkitem(usize, usize, usize),
    RenameWorkitem(usize, usize),
    CompleteWorkitem(usize),
    DeleteWorkitem(usize),
    Add(usize, i64),
    Remove(usize, i64),
    StartWork(usize, u8),
    StartRest(usize),
    Void(usize),
}

impl Op {
    fn into_strategy(self) -> Strategy {
        match self {
            Op::CreateBacklog(b, n) => Strategy::CreateBacklog {
                uid: BACKLOGS[b].into(),
                name: NAMES[n].into(),
            },
            Op::RenameBacklog(b, n) => Strategy::RenameBacklog {
                uid: BACKLOGS[b].into(),
                new_name: NAMES[n].into(),
            },
            Op::DeleteBacklog(b) => Strategy::DeleteBacklog {
                uid: BACKLOGS[b].into(),
            },
            Op::ReorderBacklog(b, index) => Strategy::ReorderBacklog {
                uid: BACKLOGS[b].into(),
                new_index: index,
            },
            Op::CreateWorkitem(w, b, n) => Strategy::CreateWorkitem {
                uid: WORKITEMS[w].into(),
                backlog_uid: BACKLOGS[b].into(),
                name: NAMES[n].into(),
            },
            Op::RenameWorkitem(w, n) => Strategy::RenameWorkitem {
                uid: WORKITEMS[w].into(),
                new_name: NAMES[n].into(),
            },
            Op::CompleteWorkitem(w) => Strategy::CompleteWorkitem {
                uid: WORKITEMS[w].into(),
                target: "finished".into(),
            },
            Op::DeleteWorkitem(w) => Strategy::DeleteWorkitem {
                uid: WORKITEMS[w].into(),
            },
            Op::Add(w, count) => Strategy::AddPomodoro {
                workitem_uid: WORKITEMS[w].into(),
                count,
            },
            Op::Remove(w, count) => Strategy::RemovePomodoro {
                workitem_uid: WORKITEMS[w].into(),
                count,
            },
            Op::StartWork(w, minutes) => Strategy::StartWork {
                workitem_uid: WORKITEMS[w].into(),
                work_duration: f64::from(minutes) * 60.0,
                rest_duration: 0.0,
            },
            Op::StartRest(w) => Strategy::StartRest {
                workitem_uid: WORKITEMS[w].into(),
                rest_duration: 0.0,
            },
            Op::Void(w) => Strategy::VoidPomodoro {
                workitem_uid: WORKITEMS[w].into(),
            },
        }
    }
}

fn op() -> impl proptest::strategy::Strategy<Value = Op> {
    let b = 0..BACKLOGS.len();
    let w = 0..WORKITEMS.len();
    let n = 0..NAMES.len();
    prop_oneof![
        (b.clone(), n.clone(), any::<bool>()).prop_map(|(b, n, create)| if create {
            Op::CreateBacklog(b, n)
        } else {
            Op::RenameBacklog(b, n)
        }),
        (b.clone(), 0i64..3, any::<bool>()).prop_map(|(b, index, delete)| if delete {
            Op::DeleteBacklog(b)
        } else {
            Op::ReorderBacklog(b, index)
        }),
        (w.clone(), b, n.clone()).prop_map(|(w, b, n)| Op::CreateWorkitem(w, b, n)),
        (w.clone(), n).prop_map(|(w, n)| Op::RenameWorkitem(w, n)),
        w.clone().prop_map(Op::CompleteWorkitem),
        w.clone().prop_map(Op::DeleteWorkitem),
        (w.clone(), -1i64..4).prop_map(|(w, c)| Op::Add(w, c)),
        (w.clone(), 1i64..3).prop_map(|(w, c)| Op::Remove(w, c)),
        (w.clone(), 0u8..3).prop_map(|(w, m)| Op::StartWork(w, m)),
        (w, any::<bool>()).prop_map(|(w, rest)| if rest {
            Op::StartRest(w)
        } else {
            Op::Void(w)
        }),
    ]
}

/// Ops paired with the seconds elapsed since the previous one.
fn session() -> impl proptest::strategy::Strategy<Value = Vec<(Op, i64)>> {
    prop::collection::vec((op(), 0i64..2400), 1..40)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
}

fn run(ops: Vec<(Op, i64)>) -> Sequencer<MemoryLog> {
    let mut seq = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
    seq.ensure_actor("Alice", t0()).unwrap();
    let mut now = t0();
    for (op, elapsed) in ops {
        now += Duration::seconds(elapsed);
        // Rejections are expected; they must simply leave no trace.
        let _ = seq.submit_at(op.into_strategy(), now);
    }
    seq
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replay_rebuilds_the_live_model(ops in session()) {
        let live = run(ops);
        let records = live.store().all_records().unwrap();
        prop_assert_eq!(records.len() as u64, live.last_seq());

        let mut other = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
        let applied = other.replay(&records).unwrap();
        prop_assert_eq!(applied, records.len());
        prop_assert_eq!(other.tenant(), live.tenant());
        prop_assert_eq!(other.last_seq(), live.last_seq());
    }

    #[test]
    fn compaction_preserves_the_model(ops in session()) {
        let live = run(ops);
        let records = live.store().all_records().unwrap();
        let settings = EngineSettings::default();

        let (compacted, report) = compact(&records, &settings).unwrap();
        prop_assert!(compacted.len() <= records.len());
        prop_assert_eq!(report.after, compacted.len());
        prop_assert_eq!(compacted.last().map(|r| r.seq), records.last().map(|r| r.seq));
        for pair in compacted.windows(2) {
            prop_assert_eq!(pair[1].seq, pair[0].seq + 1);
        }

        let rebuilt = replay_from_empty(&compacted, &settings).unwrap();
        prop_assert_eq!(&rebuilt, live.tenant());
    }

    #[test]
    fn compacting_twice_keeps_the_model(ops in session()) {
        let live = run(ops);
        let records = live.store().all_records().unwrap();
        let settings = EngineSettings::default();

        let (once, _) = compact(&records, &settings).unwrap();
        let (twice, _) = compact(&once, &settings).unwrap();
        prop_assert!(twice.len() <= once.len());
        let rebuilt = replay_from_empty(&twice, &settings).unwrap();
        prop_assert_eq!(&rebuilt, live.tenant());
    }
}
