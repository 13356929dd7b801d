use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pomodoro::{PhaseEnd, Pomodoro, PomodoroState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkitemState {
    New,
    Running,
    Finished,
    Canceled,
}

impl WorkitemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkitemState::New => "new",
            WorkitemState::Running => "running",
            WorkitemState::Finished => "finished",
            WorkitemState::Canceled => "canceled",
        }
    }

    /// Parses a seal target. Only `finished` and `canceled` are accepted.
    pub fn parse_seal_target(value: &str) -> Option<Self> {
        match value {
            "finished" => Some(WorkitemState::Finished),
            "canceled" => Some(WorkitemState::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkitemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work inside a backlog, holding an ordered sequence of pomodoros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    uid: String,
    /// Owning backlog (non-owning back-reference).
    backlog_uid: String,
    name: String,
    state: WorkitemState,
    default_work_duration: f64,
    default_rest_duration: f64,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    work_started_at: Option<DateTime<Utc>>,
    work_ended_at: Option<DateTime<Utc>>,
    pomodoros: Vec<Pomodoro>,
}

impl Workitem {
    pub(crate) fn new(
        uid: &str,
        backlog_uid: &str,
        name: &str,
        default_work_duration: f64,
        default_rest_duration: f64,
        when: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.to_string(),
            backlog_uid: backlog_uid.to_string(),
            name: name.to_string(),
            state: WorkitemState::New,
            default_work_duration,
            default_rest_duration,
            created_at: when,
            last_modified: when,
            work_started_at: None,
            work_ended_at: None,
            pomodoros: Vec::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn backlog_uid(&self) -> &str {
        &self.backlog_uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkitemState {
        self.state
    }

    pub fn default_work_duration(&self) -> f64 {
        self.default_work_duration
    }

    pub fn default_rest_duration(&self) -> f64 {
        self.default_rest_duration
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

    pub fn work_ended_at(&self) -> Option<DateTime<Utc>> {
        self.work_ended_at
    }

    pub fn pomodoros(&self) -> &[Pomodoro] {
        &self.pomodoros
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkitemState::Running
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, WorkitemState::Finished | WorkitemState::Canceled)
    }

    /// Position and reference of the running pomodoro, if any.
    pub fn running_pomodoro(&self) -> Option<(usize, &Pomodoro)> {
        self.pomodoros.iter().enumerate().find(|(_, p)| p.is_running())
    }

    /// Position of the first pomodoro in `new` state.
    pub fn next_startable(&self) -> Option<usize> {
        self.pomodoros.iter().position(Pomodoro::is_startable)
    }

    pub fn startable_count(&self) -> usize {
        self.pomodoros.iter().filter(|p| p.is_startable()).count()
    }

    pub fn count_in_state(&self, state: PomodoroState) -> usize {
        self.pomodoros.iter().filter(|p| p.state() == state).count()
    }

    /// Overdue phase end of the running pomodoro at `at`, if any.
    pub fn due_phase_end(&self, at: DateTime<Utc>) -> Option<(PhaseEnd, DateTime<Utc>)> {
        self.running_pomodoro()
            .and_then(|(_, p)| p.due_phase_end(at))
    }

    // ── Mutation (strategies only) ───────────────────────────────────

    pub(crate) fn pomodoro_mut(&mut self, index: usize) -> Option<&mut Pomodoro> {
        self.pomodoros.get_mut(index)
    }

    pub(crate) fn set_name(&mut self, name: &str, when: DateTime<Utc>) {
        self.name = name.to_string();
        self.last_modified = when;
    }

    pub(crate) fn start(&mut self, when: DateTime<Utc>) {
        self.state = WorkitemState::Running;
        self.work_started_at = Some(when);
        self.last_modified = when;
    }

    pub(crate) fn seal(&mut self, target: WorkitemState, when: DateTime<Utc>) {
        self.state = target;
        self.work_ended_at = Some(when);
        self.last_modified = when;
    }

    pub(crate) fn add_pomodoros(&mut self, count: usize, when: DateTime<Utc>) {
        let planned = !self.is_running();
        for _ in 0..count {
            self.pomodoros.push(Pomodoro::new(
                planned,
                self.default_work_duration,
                self.default_rest_duration,
                when,
            ));
        }
        self.last_modified = when;
    }

    /// Removes `count` startable pomodoros, starting from the end.
    /// The caller has already checked that enough of them exist.
    pub(crate) fn remove_startable(&mut self, count: usize, when: DateTime<Utc>) {
        let mut left = count;
        let mut i = self.pomodoros.len();
        while left > 0 && i > 0 {
            i -= 1;
            if self.pomodoros[i].is_startable() {
                self.pomodoros.remove(i);
                left -= 1;
            }
        }
        self.last_modified = when;
    }
}
