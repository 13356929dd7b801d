//! Timer driver.
//!
//! Turns elapsed time into strategies. It has no thread of its own: the
//! caller invokes [`TimerDriver::evaluate`] at its own cadence and every phase
//! end reached by then is applied at its planned instant, never at the
//! evaluation time.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> RunningWork -> RunningRest -> Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::history::{LogStore, Sequencer};
use crate::model::{PhaseEnd, Pomodoro, Tenant};
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerState {
    #[default]
    Idle,
    RunningWork,
    RunningRest,
}

/// A phase end applied by [`TimerDriver::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub workitem_uid: String,
    pub phase: PhaseEnd,
    pub at: DateTime<Utc>,
    /// Whether a strategy was logged for it. Rest completion never is, and
    /// neither is a rest start while the connection is offline.
    pub persisted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TimerDriver {
    state: TimerState,
    workitem_uid: Option<String>,
}

/// Running pomodoros of `actor`, with their workitem uid.
fn running<'a>(tenant: &'a Tenant, actor: &str) -> impl Iterator<Item = (&'a str, &'a Pomodoro)> + 'a {
    tenant
        .workitems_of(actor)
        .filter_map(|w| w.running_pomodoro().map(|(_, p)| (w.uid(), p)))
}

impl TimerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// State as of the last [`observe`](Self::observe) or
    /// [`evaluate`](Self::evaluate).
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Workitem whose pomodoro is running, if any.
    pub fn workitem_uid(&self) -> Option<&str> {
        self.workitem_uid.as_deref()
    }

    /// Re-reads the state from the model.
    pub fn observe(&mut self, tenant: &Tenant, actor: &str) -> TimerState {
        let current = running(tenant, actor).next();
        self.state = match current {
            Some((_, p)) if p.is_working() => TimerState::RunningWork,
            Some((_, p)) if p.is_resting() => TimerState::RunningRest,
            _ => TimerState::Idle,
        };
        self.workitem_uid = current.map(|(uid, _)| uid.to_string());
        self.state
    }

    /// Seconds left in the current phase at `now`.
    pub fn remaining(&self, tenant: &Tenant, actor: &str, now: DateTime<Utc>) -> Option<f64> {
        running(tenant, actor)
            .next()
            .map(|(_, p)| p.remaining_in_current_phase(now))
    }

    /// When the next phase end is planned.
    pub fn next_due(&self, tenant: &Tenant, actor: &str) -> Option<DateTime<Utc>> {
        running(tenant, actor)
            .filter_map(|(_, p)| p.next_phase_end())
            .map(|(_, at)| at)
            .min()
    }

    /// Applies every phase end reached by `now`, earliest first.
    ///
    /// A finished work phase is submitted as a regular `StartRest` strategy
    /// stamped with the planned end of work. While the sequencer is read-only
    /// it is applied without logging instead; replay reconstructs it later.
    pub fn evaluate<S: LogStore>(
        &mut self,
        seq: &mut Sequencer<S>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transition>> {
        let mut transitions = Vec::new();
        while let Some((workitem_uid, phase, at, rest)) = earliest_due(seq.tenant(), seq.actor(), now) {
            debug!(workitem = workitem_uid.as_str(), ?phase, %at, "phase end due");
            let persisted = match phase {
                PhaseEnd::Work => {
                    let strategy = Strategy::StartRest {
                        workitem_uid: workitem_uid.clone(),
                        rest_duration: rest,
                    };
                    match seq.submit_at(strategy, at) {
                        Ok(_) => true,
                        Err(CoreError::ReadOnly) => {
                            seq.apply_phase_end(&workitem_uid, phase, at)?;
                            false
                        }
                        Err(e) => return Err(e),
                    }
                }
                PhaseEnd::Rest => {
                    seq.finish_pomodoro(&workitem_uid, at)?;
                    false
                }
            };
            info!(workitem = workitem_uid.as_str(), ?phase, %at, persisted, "timer transition");
            transitions.push(Transition {
                workitem_uid,
                phase,
                at,
                persisted,
            });
        }
        self.observe(seq.tenant(), seq.actor());
        Ok(transitions)
    }
}

/// The earliest overdue phase end among `actor`'s running pomodoros, with the
/// rest duration to start.
fn earliest_due(
    tenant: &Tenant,
    actor: &str,
    now: DateTime<Utc>,
) -> Option<(String, PhaseEnd, DateTime<Utc>, f64)> {
    running(tenant, actor)
        .filter_map(|(uid, p)| {
            p.due_phase_end(now)
                .map(|(phase, at)| (uid.to_string(), phase, at, p.rest_duration()))
        })
        .min_by_key(|(_, _, at, _)| *at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryLog;
    use crate::model::PomodoroState;
    use crate::strategy::EngineSettings;
    use chrono::{Duration, TimeZone};

    const ALICE: &str = "alice@example.com";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
    }

    fn started() -> Sequencer<MemoryLog> {
        let mut seq = Sequencer::new(MemoryLog::new(), ALICE, EngineSettings::default());
        seq.ensure_actor("Alice", t0()).unwrap();
        for strategy in [
            Strategy::CreateBacklog {
                uid: "B1".into(),
                name: "Today".into(),
            },
            Strategy::CreateWorkitem {
                uid: "W1".into(),
                backlog_uid: "B1".into(),
                name: "Write docs".into(),
            },
            Strategy::AddPomodoro {
                workitem_uid: "W1".into(),
                count: 1,
            },
            Strategy::StartWork {
                workitem_uid: "W1".into(),
                work_duration: 60.0,
                rest_duration: 30.0,
            },
        ] {
            seq.submit_at(strategy, t0()).unwrap();
        }
        seq
    }

    #[test]
    fn nothing_happens_before_the_phase_ends() {
        let mut seq = started();
        let mut driver = TimerDriver::new();
        let out = driver.evaluate(&mut seq, t0() + Duration::seconds(59)).unwrap();
        assert!(out.is_empty());
        assert_eq!(driver.state(), TimerState::RunningWork);
        assert_eq!(
            driver.remaining(seq.tenant(), ALICE, t0() + Duration::seconds(59)),
            Some(1.0)
        );
        assert_eq!(
            driver.next_due(seq.tenant(), ALICE),
            Some(t0() + Duration::seconds(60))
        );
    }

    #[test]
    fn late_evaluation_uses_planned_times() {
        let mut seq = started();
        let mut driver = TimerDriver::new();
        let out = driver.evaluate(&mut seq, t0() + Duration::hours(2)).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].phase, PhaseEnd::Work);
        assert_eq!(out[0].at, t0() + Duration::seconds(60));
        assert!(out[0].persisted);
        assert_eq!(out[1].phase, PhaseEnd::Rest);
        assert_eq!(out[1].at, t0() + Duration::seconds(90));
        assert!(!out[1].persisted);
        assert_eq!(driver.state(), TimerState::Idle);

        let workitem = seq.tenant().find_workitem(ALICE, "W1").unwrap();
        let pomodoro = &workitem.pomodoros()[0];
        assert_eq!(pomodoro.state(), PomodoroState::Finished);
        assert_eq!(pomodoro.completed_at(), Some(t0() + Duration::seconds(90)));
        assert_eq!(seq.last_seq(), 6);
    }
}
