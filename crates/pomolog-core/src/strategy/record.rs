use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::control::ControlMessage;
use super::Strategy;

/// A stamped strategy: one entry of the durable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub seq: u64,
    pub when: DateTime<Utc>,
    /// Email of the acting user.
    pub actor: String,
    pub strategy: Strategy,
}

impl StrategyRecord {
    pub fn new(seq: u64, when: DateTime<Utc>, actor: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            seq,
            when,
            actor: actor.into(),
            strategy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Same record under a different sequence number.
    pub fn renumbered(&self, seq: u64) -> Self {
        Self {
            seq,
            ..self.clone()
        }
    }
}

/// Anything that can travel in a plaintext history stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Record(StrategyRecord),
    /// Live-connection signal, never part of the durable log.
    Control {
        when: DateTime<Utc>,
        actor: String,
        control: ControlMessage,
    },
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Record(r) => r.name(),
            Message::Control { control, .. } => control.name(),
        }
    }
}
