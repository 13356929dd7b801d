use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{PomodoroState, WorkitemState};

/// Whether an entity event fires right before or right after its mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "Before",
            Phase::After => "After",
        }
    }
}

/// Extra meaning attached to a submission and surfaced on its create events.
/// Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// The UI should open the new entity for editing right away.
    EditAfterCreate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogRef {
    pub owner: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkitemRef {
    pub owner: String,
    pub backlog_uid: String,
    pub uid: String,
}

/// Pomodoros are positional: owning workitem plus index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroRef {
    pub workitem: WorkitemRef,
    pub index: usize,
}

/// A mutation of the data model. Payloads identify the affected entities by
/// their identifiers, which stay meaningful after a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change")]
pub enum Change {
    UserCreate {
        email: String,
        name: String,
    },
    UserDelete {
        email: String,
    },
    UserRename {
        email: String,
        old_name: String,
        new_name: String,
    },
    BacklogCreate {
        backlog: BacklogRef,
        name: String,
        intent: Option<Intent>,
    },
    BacklogDelete {
        backlog: BacklogRef,
    },
    BacklogRename {
        backlog: BacklogRef,
        old_name: String,
        new_name: String,
    },
    BacklogReorder {
        backlog: BacklogRef,
        old_index: usize,
        new_index: usize,
    },
    WorkitemCreate {
        workitem: WorkitemRef,
        name: String,
        intent: Option<Intent>,
    },
    WorkitemDelete {
        workitem: WorkitemRef,
    },
    WorkitemRename {
        workitem: WorkitemRef,
        old_name: String,
        new_name: String,
    },
    WorkitemStart {
        workitem: WorkitemRef,
    },
    WorkitemComplete {
        workitem: WorkitemRef,
        target: WorkitemState,
    },
    PomodoroAdd {
        workitem: WorkitemRef,
        count: usize,
    },
    PomodoroRemove {
        workitem: WorkitemRef,
        count: usize,
    },
    PomodoroWorkStart {
        pomodoro: PomodoroRef,
        work_duration: f64,
    },
    PomodoroRestStart {
        pomodoro: PomodoroRef,
        rest_duration: f64,
    },
    PomodoroComplete {
        pomodoro: PomodoroRef,
        target: PomodoroState,
    },
}

/// Payload-free discriminant of [`Change`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    UserCreate,
    UserDelete,
    UserRename,
    BacklogCreate,
    BacklogDelete,
    BacklogRename,
    BacklogReorder,
    WorkitemCreate,
    WorkitemDelete,
    WorkitemRename,
    WorkitemStart,
    WorkitemComplete,
    PomodoroAdd,
    PomodoroRemove,
    PomodoroWorkStart,
    PomodoroRestStart,
    PomodoroComplete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::UserCreate => "UserCreate",
            ChangeKind::UserDelete => "UserDelete",
            ChangeKind::UserRename => "UserRename",
            ChangeKind::BacklogCreate => "BacklogCreate",
            ChangeKind::BacklogDelete => "BacklogDelete",
            ChangeKind::BacklogRename => "BacklogRename",
            ChangeKind::BacklogReorder => "BacklogReorder",
            ChangeKind::WorkitemCreate => "WorkitemCreate",
            ChangeKind::WorkitemDelete => "WorkitemDelete",
            ChangeKind::WorkitemRename => "WorkitemRename",
            ChangeKind::WorkitemStart => "WorkitemStart",
            ChangeKind::WorkitemComplete => "WorkitemComplete",
            ChangeKind::PomodoroAdd => "PomodoroAdd",
            ChangeKind::PomodoroRemove => "PomodoroRemove",
            ChangeKind::PomodoroWorkStart => "PomodoroWorkStart",
            ChangeKind::PomodoroRestStart => "PomodoroRestStart",
            ChangeKind::PomodoroComplete => "PomodoroComplete",
        }
    }
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::UserCreate { .. } => ChangeKind::UserCreate,
            Change::UserDelete { .. } => ChangeKind::UserDelete,
            Change::UserRename { .. } => ChangeKind::UserRename,
            Change::BacklogCreate { .. } => ChangeKind::BacklogCreate,
            Change::BacklogDelete { .. } => ChangeKind::BacklogDelete,
            Change::BacklogRename { .. } => ChangeKind::BacklogRename,
            Change::BacklogReorder { .. } => ChangeKind::BacklogReorder,
            Change::WorkitemCreate { .. } => ChangeKind::WorkitemCreate,
            Change::WorkitemDelete { .. } => ChangeKind::WorkitemDelete,
            Change::WorkitemRename { .. } => ChangeKind::WorkitemRename,
            Change::WorkitemStart { .. } => ChangeKind::WorkitemStart,
            Change::WorkitemComplete { .. } => ChangeKind::WorkitemComplete,
            Change::PomodoroAdd { .. } => ChangeKind::PomodoroAdd,
            Change::PomodoroRemove { .. } => ChangeKind::PomodoroRemove,
            Change::PomodoroWorkStart { .. } => ChangeKind::PomodoroWorkStart,
            Change::PomodoroRestStart { .. } => ChangeKind::PomodoroRestStart,
            Change::PomodoroComplete { .. } => ChangeKind::PomodoroComplete,
        }
    }

    /// The workitem this change affects, for workitem and pomodoro changes.
    pub fn workitem(&self) -> Option<&WorkitemRef> {
        match self {
            Change::WorkitemCreate { workitem, .. }
            | Change::WorkitemDelete { workitem }
            | Change::WorkitemRename { workitem, .. }
            | Change::WorkitemStart { workitem }
            | Change::WorkitemComplete { workitem, .. }
            | Change::PomodoroAdd { workitem, .. }
            | Change::PomodoroRemove { workitem, .. } => Some(workitem),
            Change::PomodoroWorkStart { pomodoro, .. }
            | Change::PomodoroRestStart { pomodoro, .. }
            | Change::PomodoroComplete { pomodoro, .. } => Some(&pomodoro.workitem),
            _ => None,
        }
    }
}

/// Everything observers can be told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Before/After pair around every data model mutation.
    Entity {
        phase: Phase,
        change: Change,
        at: DateTime<Utc>,
    },
    /// Brackets each strategy application, including cascaded ones.
    MessageProcessed {
        phase: Phase,
        seq: u64,
        name: String,
        /// Issued by the engine itself as part of a cascade or catch-up.
        auto: bool,
        /// Part of the durable log.
        persist: bool,
        at: DateTime<Utc>,
    },
    /// A tag appeared in the first workitem name of `owner` that uses it.
    TagCreated {
        owner: String,
        tag: String,
        at: DateTime<Utc>,
    },
    /// No workitem name of `owner` uses the tag anymore.
    TagDeleted {
        owner: String,
        tag: String,
        at: DateTime<Utc>,
    },
    /// The set of workitems carrying a surviving tag changed.
    TagContentChanged {
        owner: String,
        tag: String,
        workitems: Vec<String>,
        at: DateTime<Utc>,
    },
    ReplayStarted {
        after_seq: u64,
    },
    ReplayCompleted {
        last_seq: u64,
        applied: usize,
    },
    PongReceived {
        uid: Uuid,
        latency_ms: i64,
    },
    WentOnline {
        latency_ms: i64,
    },
    WentOffline {
        after_ms: i64,
        last_received: Option<DateTime<Utc>>,
    },
}

/// Closed set of event kinds observers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Entity(Phase, ChangeKind),
    MessageProcessed(Phase),
    TagCreated,
    TagDeleted,
    TagContentChanged,
    ReplayStarted,
    ReplayCompleted,
    PongReceived,
    WentOnline,
    WentOffline,
}

impl EventKind {
    /// Display name, e.g. `BeforeWorkitemDelete` or `AfterMessageProcessed`.
    pub fn name(&self) -> String {
        match self {
            EventKind::Entity(phase, kind) => format!("{}{}", phase.as_str(), kind.as_str()),
            EventKind::MessageProcessed(phase) => format!("{}MessageProcessed", phase.as_str()),
            EventKind::TagCreated => "TagCreated".into(),
            EventKind::TagDeleted => "TagDeleted".into(),
            EventKind::TagContentChanged => "TagContentChanged".into(),
            EventKind::ReplayStarted => "HistoryReplayStarted".into(),
            EventKind::ReplayCompleted => "HistoryReplayCompleted".into(),
            EventKind::PongReceived => "PongReceived".into(),
            EventKind::WentOnline => "WentOnline".into(),
            EventKind::WentOffline => "WentOffline".into(),
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Entity { phase, change, .. } => EventKind::Entity(*phase, change.kind()),
            Event::MessageProcessed { phase, .. } => EventKind::MessageProcessed(*phase),
            Event::TagCreated { .. } => EventKind::TagCreated,
            Event::TagDeleted { .. } => EventKind::TagDeleted,
            Event::TagContentChanged { .. } => EventKind::TagContentChanged,
            Event::ReplayStarted { .. } => EventKind::ReplayStarted,
            Event::ReplayCompleted { .. } => EventKind::ReplayCompleted,
            Event::PongReceived { .. } => EventKind::PongReceived,
            Event::WentOnline { .. } => EventKind::WentOnline,
            Event::WentOffline { .. } => EventKind::WentOffline,
        }
    }

    pub fn name(&self) -> String {
        self.kind().name()
    }

    /// Entity, message and tag events may be muted during bulk replay;
    /// lifecycle and connectivity events never are.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self,
            Event::Entity { .. }
                | Event::MessageProcessed { .. }
                | Event::TagCreated { .. }
                | Event::TagDeleted { .. }
                | Event::TagContentChanged { .. }
        )
    }
}
