use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StrategyError;

/// Server/client signals exchanged over a live connection. They are never
/// stored in the log and never touch the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params")]
pub enum ControlMessage {
    Authenticate { username: String, token: String },
    /// Request every record with a sequence number strictly greater than `after`.
    Replay { after: u64 },
    ReplayCompleted,
    Error { code: i64, message: String },
    Ping { uid: Uuid },
    Pong { uid: Uuid },
}

pub const CONTROL_NAMES: &[&str] = &[
    "Authenticate",
    "Replay",
    "ReplayCompleted",
    "Error",
    "Ping",
    "Pong",
];

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Authenticate { .. } => "Authenticate",
            ControlMessage::Replay { .. } => "Replay",
            ControlMessage::ReplayCompleted => "ReplayCompleted",
            ControlMessage::Error { .. } => "Error",
            ControlMessage::Ping { .. } => "Ping",
            ControlMessage::Pong { .. } => "Pong",
        }
    }

    pub fn is_control(name: &str) -> bool {
        CONTROL_NAMES.contains(&name)
    }

    pub fn params(&self) -> Vec<String> {
        match self {
            ControlMessage::Authenticate { username, token } => {
                vec![username.clone(), token.clone()]
            }
            ControlMessage::Replay { after } => vec![after.to_string()],
            ControlMessage::ReplayCompleted => Vec::new(),
            ControlMessage::Error { code, message } => vec![code.to_string(), message.clone()],
            ControlMessage::Ping { uid } | ControlMessage::Pong { uid } => vec![uid.to_string()],
        }
    }

    pub fn from_parts(name: &str, params: &[String]) -> Result<Self, StrategyError> {
        let get = move |index: usize| {
            params
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| StrategyError::MissingParameter {
                    strategy: name.to_string(),
                    index,
                })
        };
        let bad = move |value: &str, expected: &'static str| StrategyError::BadParameter {
            strategy: name.to_string(),
            value: value.to_string(),
            expected,
        };
        let uid = move |index: usize| {
            let raw = get(index)?;
            Uuid::parse_str(raw.trim()).map_err(|_| bad(raw, "a UUID"))
        };

        Ok(match name {
            "Authenticate" => ControlMessage::Authenticate {
                username: get(0)?.to_string(),
                token: get(1)?.to_string(),
            },
            "Replay" => {
                let raw = get(0)?;
                ControlMessage::Replay {
                    after: raw.trim().parse().map_err(|_| bad(raw, "a sequence number"))?,
                }
            }
            "ReplayCompleted" => ControlMessage::ReplayCompleted,
            "Error" => {
                let raw = get(0)?;
                ControlMessage::Error {
                    code: raw.trim().parse().map_err(|_| bad(raw, "an error code"))?,
                    message: get(1)?.to_string(),
                }
            }
            "Ping" => ControlMessage::Ping { uid: uid(0)? },
            "Pong" => ControlMessage::Pong { uid: uid(0)? },
            other => return Err(StrategyError::UnknownStrategy(other.to_string())),
        })
    }
}
