//! Core error types for pomolog-core.
//!
//! Per-strategy validation failures ([`StrategyError`]) are recoverable at the
//! call boundary. History faults ([`HistoryError`]) detected during replay are
//! not: see [`CoreError::is_fatal`].

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for pomolog-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A strategy was rejected; nothing was mutated.
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    /// The log is broken or cannot be read.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Durable log store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The client lost its connection and only accepts reads.
    #[error("Read-only: the connection is offline, new strategies are not accepted")]
    ReadOnly,

    /// An Error signal received from the server.
    #[error("Server error {code}: {message}")]
    Remote { code: i64, message: String },
}

impl CoreError {
    /// True for history inconsistencies. Callers must stop and escalate
    /// instead of retrying or continuing with the current model.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::History(h) if h.is_inconsistency())
    }
}

/// Validation failures of a single strategy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("{strategy} is missing parameter #{index}")]
    MissingParameter { strategy: String, index: usize },

    #[error("{strategy}: cannot parse '{value}' as {expected}")]
    BadParameter {
        strategy: String,
        value: String,
        expected: &'static str,
    },
}

impl StrategyError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StrategyError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        StrategyError::AlreadyExists {
            entity,
            id: id.into(),
        }
    }
}

/// Problems with the ordered log itself.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History inconsistency: strategies must go in sequence, received {found} after {last}")]
    SequenceGap { last: u64, found: u64 },

    #[error("History inconsistency: sequence number {found} is not after {last}")]
    DuplicateSequence { last: u64, found: u64 },

    #[error("History inconsistency: record #{seq} ({name}) cannot be applied: {source}")]
    Inconsistent {
        seq: u64,
        name: String,
        #[source]
        source: StrategyError,
    },

    #[error("Compacted history does not reproduce the original model: {0}")]
    CompactionMismatch(String),

    #[error("Cannot parse history line {line}: {message}")]
    BadSyntax { line: usize, message: String },
}

impl HistoryError {
    /// Gap, duplicate or unreplayable record.
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            HistoryError::SequenceGap { .. }
                | HistoryError::DuplicateSequence { .. }
                | HistoryError::Inconsistent { .. }
        )
    }
}

/// Durable log store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Sequence number {0} is already stored")]
    DuplicateSequence(u64),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for pomolog-core operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
