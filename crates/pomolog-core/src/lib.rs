//! # Pomolog Core Library
//!
//! Event-sourced pomodoro tracking. The data model (users, backlogs,
//! workitems, pomodoros) is never edited directly: every change is a typed
//! [`Strategy`] that the [`Sequencer`] numbers, applies and appends to a
//! log. Replaying the same log always rebuilds the same model.
//!
//! ## Architecture
//!
//! - **Model**: the owned tree of entities, readable by everyone
//! - **Strategy engine**: validation, cascades and timer catch-up
//! - **Event bus**: synchronous Before/After notifications in registration order
//! - **History**: sequencing, replay, compaction, plaintext codec and log stores
//! - **Timer**: the driver that turns elapsed time into strategies, and the
//!   Ping/Pong heartbeat
//! - **Storage**: SQLite log and TOML configuration
//!
//! ## Key Components
//!
//! - [`Sequencer`]: owner of the model and its log
//! - [`TimerDriver`]: applies due phase ends on demand
//! - [`EventBus`]: observer registry
//! - [`Config`]: application configuration management

pub mod bus;
pub mod error;
pub mod events;
pub mod history;
pub mod model;
pub mod storage;
pub mod strategy;
pub mod timer;

pub use bus::{EventBus, Outbox, SubscriptionId};
pub use error::{ConfigError, CoreError, HistoryError, StorageError, StrategyError};
pub use events::{Change, Event, EventKind, Intent, Phase};
pub use history::{CompactionReport, LogStore, MemoryLog, Sequencer};
pub use model::{Backlog, Pomodoro, PomodoroState, Tenant, User, Workitem, WorkitemState};
pub use storage::{Config, SqliteLog};
pub use strategy::{ControlMessage, EngineSettings, Message, Strategy, StrategyRecord};
pub use timer::{Connectivity, Heartbeat, TimerDriver, TimerState};
