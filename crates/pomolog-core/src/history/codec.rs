//! Plaintext record format, one message per line:
//!
//! ```text
//! 12, 2024-05-02 08:30:00.000000+00:00, alice@example.com: StartWork("W1", "1500")
//! ```
//!
//! Parameters are double-quoted with `\"`, `\\`, `\n` and `\r` escapes, so a
//! record never spans more than one line. Blank lines and lines starting with
//! `#` are skipped. Control messages use the same shape with sequence
//! number 0.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::HistoryError;
use crate::strategy::{ControlMessage, Message, Strategy, StrategyRecord};

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^\s*(\d+)\s*,\s*([^,]+?)\s*,\s*([^\s:,]+)\s*:\s*([A-Za-z]+)\s*\((.*)\)\s*$"#,
    )
    .expect("valid record regex")
});
static ARGS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:"(?:[^"\\]|\\.)*"\s*(?:,\s*"(?:[^"\\]|\\.)*"\s*)*)?$"#)
        .expect("valid argument list regex")
});
static ARG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid argument regex"));

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(next) => out.push(next),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn encode_parts(seq: u64, when: DateTime<Utc>, actor: &str, name: &str, params: &[String]) -> String {
    let mut quoted: Vec<String> = params.iter().map(|p| format!("\"{}\"", escape(p))).collect();
    while quoted.len() < 2 {
        quoted.push("\"\"".to_string());
    }
    format!(
        "{seq}, {}, {actor}: {name}({})",
        when.format(TIMESTAMP_FORMAT),
        quoted.join(", ")
    )
}

pub fn encode_record(record: &StrategyRecord) -> String {
    encode_parts(
        record.seq,
        record.when,
        &record.actor,
        record.name(),
        &record.strategy.params(),
    )
}

pub fn encode_message(message: &Message) -> String {
    match message {
        Message::Record(record) => encode_record(record),
        Message::Control {
            when,
            actor,
            control,
        } => encode_parts(0, *when, actor, control.name(), &control.params()),
    }
}

/// A whole log, one record per line, newline-terminated.
pub fn encode_log(records: &[StrategyRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&encode_record(record));
        out.push('\n');
    }
    out
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Parses one line. `Ok(None)` for blank lines and comments.
pub fn decode_line(line: &str, line_no: usize) -> Result<Option<Message>, HistoryError> {
    let bad = |message: String| HistoryError::BadSyntax {
        line: line_no,
        message,
    };

    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let caps = LINE_RE
        .captures(trimmed)
        .ok_or_else(|| bad(format!("not a record: {trimmed}")))?;
    let seq: u64 = caps[1]
        .parse()
        .map_err(|_| bad(format!("bad sequence number '{}'", &caps[1])))?;
    let when = parse_timestamp(&caps[2])
        .ok_or_else(|| bad(format!("bad timestamp '{}'", &caps[2])))?;
    let actor = caps[3].to_string();
    let name = &caps[4];
    let args = &caps[5];
    if !ARGS_RE.is_match(args) {
        return Err(bad(format!("bad parameter list '{args}'")));
    }
    let params: Vec<String> = ARG_RE
        .captures_iter(args)
        .map(|c| unescape(&c[1]))
        .collect();

    if ControlMessage::is_control(name) {
        let control =
            ControlMessage::from_parts(name, &params).map_err(|e| bad(e.to_string()))?;
        return Ok(Some(Message::Control {
            when,
            actor,
            control,
        }));
    }

    if seq == 0 {
        return Err(bad("strategy records start at sequence number 1".into()));
    }
    let strategy = Strategy::from_parts(name, &params).map_err(|e| bad(e.to_string()))?;
    Ok(Some(Message::Record(StrategyRecord::new(
        seq, when, actor, strategy,
    ))))
}

/// Parses a stream of messages, numbering lines from 1.
pub fn decode(text: &str) -> Result<Vec<Message>, HistoryError> {
    let mut messages = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(message) = decode_line(line, i + 1)? {
            messages.push(message);
        }
    }
    Ok(messages)
}

/// Parses a durable log. Control messages are not allowed in it.
pub fn decode_log(text: &str) -> Result<Vec<StrategyRecord>, HistoryError> {
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        match decode_line(line, i + 1)? {
            Some(Message::Record(record)) => records.push(record),
            Some(Message::Control { control, .. }) => {
                return Err(HistoryError::BadSyntax {
                    line: i + 1,
                    message: format!("{} is not allowed in a log", control.name()),
                })
            }
            None => {}
        }
    }
    Ok(records)
}
