//! Ping/Pong liveness check.
//!
//! A Ping goes out every `every_ms`. A Ping left unanswered for longer than
//! `threshold_ms` flips the connection offline; a matching, timely Pong
//! flips it back online. Only the connectivity flag changes, never the model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::events::Event;
use crate::storage::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// No Pong seen yet.
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct Heartbeat {
    every_ms: i64,
    threshold_ms: i64,
    state: Connectivity,
    /// Uid and send time of the last Ping.
    last_sent: Option<(Uuid, DateTime<Utc>)>,
    /// Whether the last Ping has been answered.
    answered: bool,
    last_received: Option<DateTime<Utc>>,
    last_latency_ms: Option<i64>,
}

impl Heartbeat {
    pub fn new(every_ms: u64, threshold_ms: u64) -> Self {
        Self {
            every_ms: i64::try_from(every_ms).unwrap_or(i64::MAX),
            threshold_ms: i64::try_from(threshold_ms).unwrap_or(i64::MAX),
            state: Connectivity::Unknown,
            last_sent: None,
            answered: true,
            last_received: None,
            last_latency_ms: None,
        }
    }

    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self::new(config.every_ms, config.threshold_ms)
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    pub fn is_offline(&self) -> bool {
        self.state == Connectivity::Offline
    }

    pub fn last_latency_ms(&self) -> Option<i64> {
        self.last_latency_ms
    }

    pub fn last_received(&self) -> Option<DateTime<Utc>> {
        self.last_received
    }

    /// Whether the next Ping should go out at `now`.
    pub fn ping_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_sent {
            None => true,
            Some((_, sent)) => (now - sent).num_milliseconds() >= self.every_ms,
        }
    }

    /// Goes offline if the last Ping has gone unanswered for too long.
    pub(crate) fn check(&mut self, now: DateTime<Utc>, bus: &mut EventBus) {
        let Some((_, sent)) = self.last_sent else {
            return;
        };
        let waited = (now - sent).num_milliseconds();
        if !self.answered && waited > self.threshold_ms && self.state != Connectivity::Offline {
            warn!(waited_ms = waited, "no pong received, going offline");
            self.state = Connectivity::Offline;
            bus.emit_forced(Event::WentOffline {
                after_ms: waited,
                last_received: self.last_received,
            });
        }
    }

    /// Records an outgoing Ping and returns its uid.
    pub(crate) fn ping(&mut self, now: DateTime<Utc>) -> Uuid {
        let uid = Uuid::new_v4();
        debug!(%uid, "sending ping");
        self.last_sent = Some((uid, now));
        self.answered = false;
        uid
    }

    pub(crate) fn on_pong(&mut self, uid: Uuid, now: DateTime<Utc>, bus: &mut EventBus) {
        self.last_received = Some(now);
        let Some((expected, sent)) = self.last_sent.filter(|(expected, _)| *expected == uid) else {
            warn!(%uid, "unexpected pong");
            return;
        };
        let latency_ms = (now - sent).num_milliseconds();
        debug!(uid = %expected, latency_ms, "pong received");
        self.answered = true;
        self.last_latency_ms = Some(latency_ms);
        bus.emit_forced(Event::PongReceived { uid, latency_ms });

        if latency_ms <= self.threshold_ms && self.state != Connectivity::Online {
            info!(latency_ms, "connection is online");
            self.state = Connectivity::Online;
            bus.emit_forced(Event::WentOnline { latency_ms });
        }
    }
}
