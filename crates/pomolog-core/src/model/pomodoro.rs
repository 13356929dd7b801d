//! A single Pomodoro inside a workitem.
//!
//! Pomodoros have no persisted identity. They are addressed by their position
//! inside the owning workitem and by their state. The `runtime_id` exists only
//! for UI correlation within one process and never takes part in equality or
//! serialization.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PomodoroState {
    New,
    RunningWork,
    RunningRest,
    Finished,
    Canceled,
}

impl PomodoroState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroState::New => "new",
            PomodoroState::RunningWork => "running-work",
            PomodoroState::RunningRest => "running-rest",
            PomodoroState::Finished => "finished",
            PomodoroState::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PomodoroState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which phase of a running pomodoro is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseEnd {
    /// Work is over; rest starts.
    Work,
    /// Rest is over; the pomodoro is finished.
    Rest,
}

impl PhaseEnd {
    /// Name of the implicit transition that handles this phase end.
    pub fn transition_name(&self) -> &'static str {
        match self {
            PhaseEnd::Work => "StartRest",
            PhaseEnd::Rest => "FinishPomodoro",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pomodoro {
    #[serde(skip, default = "Uuid::new_v4")]
    runtime_id: Uuid,
    state: PomodoroState,
    /// False when the pomodoro was added while its workitem was already running.
    planned: bool,
    work_duration: f64,
    rest_duration: f64,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    work_started_at: Option<DateTime<Utc>>,
    rest_started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl PartialEq for Pomodoro {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.planned == other.planned
            && self.work_duration == other.work_duration
            && self.rest_duration == other.rest_duration
            && self.created_at == other.created_at
            && self.last_modified == other.last_modified
            && self.work_started_at == other.work_started_at
            && self.rest_started_at == other.rest_started_at
            && self.completed_at == other.completed_at
    }
}

impl Pomodoro {
    pub(crate) fn new(
        planned: bool,
        work_duration: f64,
        rest_duration: f64,
        when: DateTime<Utc>,
    ) -> Self {
        Self {
            runtime_id: Uuid::new_v4(),
            state: PomodoroState::New,
            planned,
            work_duration,
            rest_duration,
            created_at: when,
            last_modified: when,
            work_started_at: None,
            rest_started_at: None,
            completed_at: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn runtime_id(&self) -> Uuid {
        self.runtime_id
    }

    pub fn state(&self) -> PomodoroState {
        self.state
    }

    pub fn is_planned(&self) -> bool {
        self.planned
    }

    pub fn work_duration(&self) -> f64 {
        self.work_duration
    }

    pub fn rest_duration(&self) -> f64 {
        self.rest_duration
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn work_started_at(&self) -> Option<DateTime<Utc>> {
        self.work_started_at
    }

    pub fn rest_started_at(&self) -> Option<DateTime<Utc>> {
        self.rest_started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_startable(&self) -> bool {
        self.state == PomodoroState::New
    }

    pub fn is_working(&self) -> bool {
        self.state == PomodoroState::RunningWork
    }

    pub fn is_resting(&self) -> bool {
        self.state == PomodoroState::RunningRest
    }

    pub fn is_running(&self) -> bool {
        self.is_working() || self.is_resting()
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, PomodoroState::Finished | PomodoroState::Canceled)
    }

    /// When the work phase is planned to end. `None` until work starts.
    pub fn planned_end_of_work(&self) -> Option<DateTime<Utc>> {
        self.work_started_at
            .and_then(|started| after_secs(started, self.work_duration))
    }

    /// When the rest phase is planned to end.
    ///
    /// Once rest has actually started this is measured from the rest start,
    /// otherwise from the planned end of work.
    pub fn planned_end_of_rest(&self) -> Option<DateTime<Utc>> {
        match self.rest_started_at {
            Some(started) => after_secs(started, self.rest_duration),
            None => self
                .planned_end_of_work()
                .and_then(|end| after_secs(end, self.rest_duration)),
        }
    }

    /// Seconds left in the current phase at `now`. Never negative; zero when
    /// the pomodoro is not running.
    pub fn remaining_in_current_phase(&self, now: DateTime<Utc>) -> f64 {
        let end = match self.state {
            PomodoroState::RunningWork => self.planned_end_of_work(),
            PomodoroState::RunningRest => self.planned_end_of_rest(),
            _ => None,
        };
        match end {
            Some(end) => ((end - now).num_microseconds().unwrap_or(0) as f64 / 1e6).max(0.0),
            None => 0.0,
        }
    }

    /// The end of the current phase, if the pomodoro is running.
    pub fn next_phase_end(&self) -> Option<(PhaseEnd, DateTime<Utc>)> {
        match self.state {
            PomodoroState::RunningWork => self.planned_end_of_work().map(|t| (PhaseEnd::Work, t)),
            PomodoroState::RunningRest => self.planned_end_of_rest().map(|t| (PhaseEnd::Rest, t)),
            _ => None,
        }
    }

    /// The phase end that has been reached by `at` but not yet applied.
    ///
    /// The returned timestamp is never earlier than the last change of this
    /// pomodoro.
    pub fn due_phase_end(&self, at: DateTime<Utc>) -> Option<(PhaseEnd, DateTime<Utc>)> {
        let (phase, end) = self.next_phase_end()?;
        (end <= at).then(|| (phase, end.max(self.last_modified)))
    }

    // ── Transitions (driven by strategies only) ──────────────────────

    pub(crate) fn start_work(&mut self, work_duration: f64, rest_duration: f64, when: DateTime<Utc>) {
        self.work_duration = work_duration;
        self.rest_duration = rest_duration;
        self.state = PomodoroState::RunningWork;
        self.work_started_at = Some(when);
        self.last_modified = when;
    }

    pub(crate) fn start_rest(&mut self, rest_duration: f64, when: DateTime<Utc>) {
        self.rest_duration = rest_duration;
        self.state = PomodoroState::RunningRest;
        self.rest_started_at = Some(when);
        self.last_modified = when;
    }

    pub(crate) fn seal(&mut self, target: PomodoroState, when: DateTime<Utc>) {
        self.state = target;
        self.completed_at = Some(when);
        self.last_modified = when;
    }
}

/// `t` shifted by a fractional number of seconds, at microsecond precision.
///
/// `None` when the result falls outside the range `DateTime` can represent.
pub fn after_secs(t: DateTime<Utc>, secs: f64) -> Option<DateTime<Utc>> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    t.checked_add_signed(Duration::microseconds(micros as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn planned_ends_follow_durations() {
        let mut p = Pomodoro::new(true, 1500.0, 300.0, t0());
        assert_eq!(p.planned_end_of_work(), None);

        p.start_work(1500.0, 300.0, t0());
        assert_eq!(p.planned_end_of_work(), Some(t0() + Duration::seconds(1500)));
        assert_eq!(p.planned_end_of_rest(), Some(t0() + Duration::seconds(1800)));
    }

    #[test]
    fn late_rest_start_shifts_rest_end() {
        let mut p = Pomodoro::new(true, 10.0, 5.0, t0());
        p.start_work(10.0, 5.0, t0());
        p.start_rest(5.0, t0() + Duration::seconds(12));
        assert_eq!(p.planned_end_of_rest(), Some(t0() + Duration::seconds(17)));
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut p = Pomodoro::new(true, 60.0, 30.0, t0());
        p.start_work(60.0, 30.0, t0());
        assert_eq!(p.remaining_in_current_phase(t0() + Duration::seconds(15)), 45.0);
        assert_eq!(p.remaining_in_current_phase(t0() + Duration::seconds(600)), 0.0);
    }

    #[test]
    fn phase_end_becomes_due_at_its_planned_time() {
        let mut p = Pomodoro::new(true, 10.0, 5.0, t0());
        assert_eq!(p.next_phase_end(), None);

        p.start_work(10.0, 5.0, t0());
        let end = t0() + Duration::seconds(10);
        assert_eq!(p.due_phase_end(end - Duration::milliseconds(1)), None);
        assert_eq!(p.due_phase_end(end), Some((PhaseEnd::Work, end)));

        p.start_rest(5.0, end);
        let rest_end = end + Duration::seconds(5);
        assert_eq!(
            p.due_phase_end(rest_end + Duration::hours(3)),
            Some((PhaseEnd::Rest, rest_end))
        );
    }

    #[test]
    fn equality_ignores_runtime_id() {
        let a = Pomodoro::new(true, 1.5, 0.5, t0());
        let b = Pomodoro::new(true, 1.5, 0.5, t0());
        assert_ne!(a.runtime_id(), b.runtime_id());
        assert_eq!(a, b);
    }

    #[test]
    fn fractional_seconds_are_kept() {
        let end = after_secs(t0(), 0.25).unwrap();
        assert_eq!((end - t0()).num_milliseconds(), 250);
    }

    #[test]
    fn out_of_range_ends_are_none() {
        assert_eq!(after_secs(t0(), 1e13), None);
        assert_eq!(after_secs(t0(), f64::MAX), None);

        let mut p = Pomodoro::new(true, 1e13, 300.0, t0());
        p.start_work(1e13, 300.0, t0());
        assert_eq!(p.planned_end_of_work(), None);
        assert_eq!(p.next_phase_end(), None);
        assert_eq!(p.due_phase_end(t0() + Duration::days(365)), None);
        assert_eq!(p.remaining_in_current_phase(t0()), 0.0);
    }
}
