//! The sequencer owns the data model and its log.
//!
//! It stamps new strategies with the next sequence number, applies them
//! through the engine, and appends them to the [`LogStore`]. It also replays
//! previously recorded strategies in strict sequence order and answers the
//! control messages of a live connection.
//!
//! ## Usage
//!
//! ```ignore
//! let mut seq = Sequencer::new(SqliteLog::open(&path)?, "alice@example.com", settings);
//! seq.load()?;
//! seq.submit(Strategy::StartWork { workitem_uid: "W1".into(), work_duration: 0.0, rest_duration: 0.0 })?;
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, error, info, warn};

use super::compaction::{self, CompactionReport};
use super::store::LogStore;
use crate::bus::EventBus;
use crate::error::{CoreError, HistoryError, Result};
use crate::events::{Event, Intent};
use crate::model::{PhaseEnd, Tenant, SYSTEM_USER};
use crate::storage::Config;
use crate::strategy::engine::{self, EngineSettings, Exec};
use crate::strategy::{ControlMessage, Message, Strategy, StrategyRecord};
use crate::timer::Heartbeat;

pub struct Sequencer<S: LogStore> {
    tenant: Tenant,
    bus: EventBus,
    settings: EngineSettings,
    store: S,
    /// Email of the local acting user.
    actor: String,
    last_seq: u64,
    mute_replay: bool,
    heartbeat: Option<Heartbeat>,
}

impl<S: LogStore + std::fmt::Debug> std::fmt::Debug for Sequencer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("actor", &self.actor)
            .field("last_seq", &self.last_seq)
            .field("store", &self.store)
            .field("heartbeat", &self.heartbeat.as_ref().map(Heartbeat::state))
            .finish()
    }
}

impl<S: LogStore> Sequencer<S> {
    /// A sequencer over an empty model. Call [`load`](Self::load) to replay
    /// what `store` already holds.
    pub fn new(store: S, actor: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            tenant: Tenant::new(),
            bus: EventBus::new(),
            settings,
            store,
            actor: actor.into(),
            last_seq: 0,
            mute_replay: true,
            heartbeat: None,
        }
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store, config.identity.email.clone(), config.engine_settings())
            .with_mute_replay(config.replay.mute_events)
    }

    pub fn with_mute_replay(mut self, mute: bool) -> Self {
        self.mute_replay = mute;
        self
    }

    /// Enables the connectivity check. Without one the sequencer is always
    /// writable.
    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Sequence number of the last applied record, 0 before any.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn heartbeat(&self) -> Option<&Heartbeat> {
        self.heartbeat.as_ref()
    }

    /// For subscribing observers.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// True while the heartbeat reports the connection offline.
    pub fn is_read_only(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(Heartbeat::is_offline)
    }

    // ── Append mode ──────────────────────────────────────────────────

    /// Submits `strategy` as the local actor, stamped with the current time.
    pub fn submit(&mut self, strategy: Strategy) -> Result<StrategyRecord> {
        self.submit_at(strategy, Utc::now())
    }

    pub fn submit_at(&mut self, strategy: Strategy, when: DateTime<Utc>) -> Result<StrategyRecord> {
        let actor = self.actor.clone();
        self.submit_as(&actor, strategy, when, None)
    }

    /// Submits with an intent tag, surfaced on the create events.
    pub fn submit_with(
        &mut self,
        strategy: Strategy,
        intent: Intent,
        when: DateTime<Utc>,
    ) -> Result<StrategyRecord> {
        let actor = self.actor.clone();
        self.submit_as(&actor, strategy, when, Some(intent))
    }

    /// Stamps, applies and stores one strategy on behalf of `actor`.
    ///
    /// On a validation failure nothing is stored and the model is unchanged.
    /// Strategies queued by observers are submitted afterwards.
    pub fn submit_as(
        &mut self,
        actor: &str,
        strategy: Strategy,
        when: DateTime<Utc>,
        intent: Option<Intent>,
    ) -> Result<StrategyRecord> {
        let record = self.apply_new(actor, strategy, when, intent)?;
        self.drain_outbox(when);
        Ok(record)
    }

    fn apply_new(
        &mut self,
        actor: &str,
        strategy: Strategy,
        when: DateTime<Utc>,
        intent: Option<Intent>,
    ) -> Result<StrategyRecord> {
        if self.is_read_only() {
            return Err(CoreError::ReadOnly);
        }
        // Stores and the plaintext codec keep microseconds; the live model
        // must match what replaying the stored record produces.
        let when = when.trunc_subsecs(6);
        let seq = self.last_seq + 1;
        let snapshot = self.tenant.clone();
        {
            let mut cx = Exec::new(
                &mut self.tenant,
                &mut self.bus,
                &self.settings,
                seq,
                when,
                actor,
            )
            .with_intent(intent);
            engine::apply(&mut cx, &strategy, true)?;
        }

        let record = StrategyRecord::new(seq, when, actor, strategy);
        if let Err(e) = self.store.append(&record) {
            error!(seq, error = %e, "failed to store applied strategy, rolling back");
            self.tenant = snapshot;
            return Err(e.into());
        }
        self.last_seq = seq;
        debug!(seq, strategy = record.name(), actor, "strategy applied");
        Ok(record)
    }

    fn drain_outbox(&mut self, when: DateTime<Utc>) {
        loop {
            let queued = self.bus.take_outbox();
            if queued.is_empty() {
                return;
            }
            for submission in queued {
                let actor = self.actor.clone();
                let name = submission.strategy.name();
                if let Err(e) = self.apply_new(&actor, submission.strategy, when, submission.intent) {
                    warn!(strategy = name, error = %e, "strategy queued by an observer was rejected");
                }
            }
        }
    }

    /// Creates the local user through the System user if it does not exist yet.
    pub fn ensure_actor(&mut self, display_name: &str, when: DateTime<Utc>) -> Result<Option<StrategyRecord>> {
        if self.tenant.contains_user(&self.actor) {
            return Ok(None);
        }
        let strategy = Strategy::CreateUser {
            email: self.actor.clone(),
            name: display_name.to_string(),
        };
        self.submit_as(SYSTEM_USER, strategy, when, None).map(Some)
    }

    // ── Replay mode ──────────────────────────────────────────────────

    /// Replays whatever the store holds beyond what was already applied.
    pub fn load(&mut self) -> Result<usize> {
        let records = self.store.records_after(self.last_seq)?;
        self.replay(&records)
    }

    /// Applies previously recorded strategies in order, without restamping.
    ///
    /// The first record applied to an empty model may carry any sequence
    /// number; every later one must be exactly one above its predecessor.
    /// Any violation, or any record that fails to apply, aborts the replay
    /// with a fatal [`HistoryError`] before the offending record. Records the
    /// store does not have yet are appended to it.
    pub fn replay(&mut self, records: &[StrategyRecord]) -> Result<usize> {
        let after_seq = self.last_seq;
        info!(after_seq, count = records.len(), "history replay started");
        self.bus.emit_forced(Event::ReplayStarted { after_seq });

        let was_muted = self.bus.is_muted();
        if self.mute_replay {
            self.bus.set_muted(true);
        }
        let result = self.replay_records(records);
        self.bus.set_muted(was_muted);

        match result {
            Ok(applied) => {
                info!(last_seq = self.last_seq, applied, "history replay completed");
                self.bus.emit_forced(Event::ReplayCompleted {
                    last_seq: self.last_seq,
                    applied,
                });
                if let Some(last) = records.last() {
                    self.drain_outbox(last.when);
                }
                Ok(applied)
            }
            Err(e) => {
                error!(error = %e, last_seq = self.last_seq, "history replay aborted");
                Err(e)
            }
        }
    }

    fn replay_records(&mut self, records: &[StrategyRecord]) -> Result<usize> {
        let stored = self.store.last_sequence()?;
        let mut applied = 0;
        for record in records {
            self.check_sequence(record.seq)?;
            {
                let mut cx = Exec::new(
                    &mut self.tenant,
                    &mut self.bus,
                    &self.settings,
                    record.seq,
                    record.when,
                    &record.actor,
                );
                engine::apply(&mut cx, &record.strategy, true).map_err(|source| {
                    HistoryError::Inconsistent {
                        seq: record.seq,
                        name: record.name().to_string(),
                        source,
                    }
                })?;
            }
            if record.seq > stored {
                self.store.append(record)?;
            }
            self.last_seq = record.seq;
            applied += 1;
        }
        Ok(applied)
    }

    fn check_sequence(&self, found: u64) -> Result<(), HistoryError> {
        let last = self.last_seq;
        if found == 0 || (last > 0 && found <= last) {
            return Err(HistoryError::DuplicateSequence { last, found });
        }
        if last > 0 && found != last + 1 {
            return Err(HistoryError::SequenceGap { last, found });
        }
        Ok(())
    }

    // ── Timer transitions ────────────────────────────────────────────

    /// Applies the end of a timer phase of one of the actor's workitems at
    /// `at`, without logging it.
    pub fn apply_phase_end(
        &mut self,
        workitem_uid: &str,
        phase: PhaseEnd,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut cx = Exec::new(
            &mut self.tenant,
            &mut self.bus,
            &self.settings,
            self.last_seq,
            at,
            &self.actor,
        );
        engine::apply_phase_end(&mut cx, workitem_uid, phase)?;
        debug!(workitem = workitem_uid, ?phase, %at, "timer phase ended");
        self.drain_outbox(at);
        Ok(())
    }

    /// The implicit success path: the resting pomodoro becomes `finished`.
    pub fn finish_pomodoro(&mut self, workitem_uid: &str, at: DateTime<Utc>) -> Result<()> {
        self.apply_phase_end(workitem_uid, PhaseEnd::Rest, at)
    }

    // ── Connection ───────────────────────────────────────────────────

    /// The response to a Replay request: every record after `after`, then
    /// ReplayCompleted.
    pub fn serve_replay(&self, after: u64, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .store
            .records_after(after)?
            .into_iter()
            .map(Message::Record)
            .collect();
        debug!(after, count = messages.len(), "serving replay");
        messages.push(Message::Control {
            when: now,
            actor: SYSTEM_USER.to_string(),
            control: ControlMessage::ReplayCompleted,
        });
        Ok(messages)
    }

    /// Handles one control message and returns the messages to send back.
    pub fn handle_control(
        &mut self,
        control: &ControlMessage,
        now: DateTime<Utc>,
    ) -> Result<Vec<Message>> {
        match control {
            ControlMessage::Pong { uid } => {
                match self.heartbeat.as_mut() {
                    Some(heartbeat) => heartbeat.on_pong(*uid, now, &mut self.bus),
                    None => warn!(%uid, "pong received without a heartbeat"),
                }
                Ok(Vec::new())
            }
            ControlMessage::Ping { uid } => Ok(vec![Message::Control {
                when: now,
                actor: self.actor.clone(),
                control: ControlMessage::Pong { uid: *uid },
            }]),
            ControlMessage::Replay { after } => self.serve_replay(*after, now),
            ControlMessage::ReplayCompleted => {
                debug!(last_seq = self.last_seq, "server finished replay");
                Ok(Vec::new())
            }
            ControlMessage::Error { code, message } => {
                error!(code, message = message.as_str(), "server reported an error");
                Err(CoreError::Remote {
                    code: *code,
                    message: message.clone(),
                })
            }
            ControlMessage::Authenticate { username, .. } => {
                info!(username = username.as_str(), "client authenticated");
                Ok(Vec::new())
            }
        }
    }

    /// Feeds a message stream: consecutive records are replayed as one batch,
    /// control messages are handled in between. Returns the responses.
    pub fn ingest(&mut self, messages: Vec<Message>, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut responses = Vec::new();
        let mut batch = Vec::new();
        for message in messages {
            match message {
                Message::Record(record) => batch.push(record),
                Message::Control { control, .. } => {
                    if !batch.is_empty() {
                        self.replay(&std::mem::take(&mut batch))?;
                    }
                    responses.extend(self.handle_control(&control, now)?);
                }
            }
        }
        if !batch.is_empty() {
            self.replay(&batch)?;
        }
        Ok(responses)
    }

    /// Checks liveness and returns a Ping when one is due.
    pub fn heartbeat_tick(&mut self, now: DateTime<Utc>) -> Option<Message> {
        let heartbeat = self.heartbeat.as_mut()?;
        heartbeat.check(now, &mut self.bus);
        if !heartbeat.ping_due(now) {
            return None;
        }
        let uid = heartbeat.ping(now);
        Some(Message::Control {
            when: now,
            actor: self.actor.clone(),
            control: ControlMessage::Ping { uid },
        })
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Rewrites the stored log into its compacted form. The store is left
    /// untouched when nothing can be saved.
    pub fn compact(&mut self) -> Result<CompactionReport> {
        let records = self.store.all_records()?;
        let (compacted, report) = compaction::compact(&records, &self.settings)?;
        if report.changed() {
            self.store.replace_all(&compacted)?;
            info!(
                before = report.before,
                after = report.after,
                saved = format!("{:.1}%", report.percent_saved()),
                "history compacted"
            );
        } else {
            info!(records = report.before, "history is already compact");
        }
        Ok(report)
    }
}
