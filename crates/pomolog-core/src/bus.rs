//! Synchronous, ordered fan-out of [`Event`]s to observers.
//!
//! Observers run in registration order before `emit` returns. They must not
//! call back into the engine; instead they queue strategies in the [`Outbox`]
//! they are handed, and the sequencer submits those once the current
//! top-level strategy is done.

use crate::events::{Event, EventKind, Intent};
use crate::strategy::Strategy;

pub type Observer = Box<dyn FnMut(&Event, &mut Outbox)>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A strategy queued by an observer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub strategy: Strategy,
    pub intent: Option<Intent>,
}

/// Strategies observers want submitted after the current one completes.
#[derive(Debug, Default)]
pub struct Outbox {
    queued: Vec<Submission>,
}

impl Outbox {
    pub fn submit(&mut self, strategy: Strategy) {
        self.submit_with(strategy, None);
    }

    pub fn submit_with(&mut self, strategy: Strategy, intent: Option<Intent>) {
        self.queued.push(Submission { strategy, intent });
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<Submission> {
        std::mem::take(&mut self.queued)
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: Option<EventKind>,
    observer: Observer,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
    muted: bool,
    /// While `Some`, events are buffered instead of delivered.
    held: Option<Vec<Event>>,
    outbox: Outbox,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("muted", &self.muted)
            .field("held", &self.held.as_ref().map(Vec::len))
            .field("outbox", &self.outbox.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one kind of event.
    pub fn subscribe<F>(&mut self, kind: EventKind, observer: F) -> SubscriptionId
    where
        F: FnMut(&Event, &mut Outbox) + 'static,
    {
        self.add(Some(kind), Box::new(observer))
    }

    /// Observe every event.
    pub fn subscribe_all<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&Event, &mut Outbox) + 'static,
    {
        self.add(None, Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    fn add(&mut self, filter: Option<EventKind>, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            filter,
            observer,
        });
        id
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Deliver `event`, unless it is muted.
    pub(crate) fn emit(&mut self, event: Event) {
        if self.muted && event.is_mutable() {
            return;
        }
        self.emit_forced(event);
    }

    /// Deliver `event` regardless of muting.
    pub(crate) fn emit_forced(&mut self, event: Event) {
        if let Some(held) = self.held.as_mut() {
            held.push(event);
            return;
        }
        self.dispatch(&event);
    }

    fn dispatch(&mut self, event: &Event) {
        let kind = event.kind();
        let EventBus {
            subscriptions,
            outbox,
            ..
        } = self;
        for sub in subscriptions.iter_mut() {
            if sub.filter.map_or(true, |f| f == kind) {
                (sub.observer)(event, outbox);
            }
        }
    }

    /// Start buffering events. Used around work that may still be rolled back.
    pub(crate) fn hold(&mut self) {
        if self.held.is_none() {
            self.held = Some(Vec::new());
        }
    }

    /// Deliver everything buffered since [`hold`](Self::hold).
    pub(crate) fn release(&mut self) {
        if let Some(held) = self.held.take() {
            for event in &held {
                self.dispatch(event);
            }
        }
    }

    /// Drop everything buffered since [`hold`](Self::hold).
    pub(crate) fn discard(&mut self) {
        self.held = None;
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<Submission> {
        self.outbox.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Change, Phase};
    use chrono::{DateTime, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn user_event(phase: Phase) -> Event {
        Event::Entity {
            phase,
            change: Change::UserCreate {
                email: "a@b.c".into(),
                name: "A".into(),
            },
            at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn recorder(bus: &mut EventBus) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe_all(move |e, _| sink.borrow_mut().push(e.name()));
        seen
    }

    #[test]
    fn observers_run_in_registration_order() {
        let mut bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            bus.subscribe_all(move |_, _| order.borrow_mut().push(n));
        }
        bus.emit(user_event(Phase::Before));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn filtered_subscription_sees_only_its_kind() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        bus.subscribe(
            EventKind::Entity(Phase::After, crate::events::ChangeKind::UserCreate),
            move |_, _| *counter.borrow_mut() += 1,
        );
        bus.emit(user_event(Phase::Before));
        bus.emit(user_event(Phase::After));
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn muting_spares_lifecycle_events() {
        let mut bus = EventBus::new();
        let seen = recorder(&mut bus);
        bus.set_muted(true);
        bus.emit(user_event(Phase::Before));
        bus.emit(Event::ReplayStarted { after_seq: 0 });
        assert_eq!(*seen.borrow(), vec!["HistoryReplayStarted"]);
    }

    #[test]
    fn held_events_are_released_or_discarded() {
        let mut bus = EventBus::new();
        let seen = recorder(&mut bus);

        bus.hold();
        bus.emit(user_event(Phase::Before));
        assert!(seen.borrow().is_empty());
        bus.discard();
        assert!(seen.borrow().is_empty());

        bus.hold();
        bus.emit(user_event(Phase::After));
        bus.release();
        assert_eq!(*seen.borrow(), vec!["AfterUserCreate"]);
    }

    #[test]
    fn observers_queue_into_outbox() {
        let mut bus = EventBus::new();
        bus.subscribe_all(|_, outbox| {
            outbox.submit(Strategy::RenameUser {
                email: "a@b.c".into(),
                new_name: "B".into(),
            })
        });
        bus.emit(user_event(Phase::After));
        let queued = bus.take_outbox();
        assert_eq!(queued.len(), 1);
        assert!(bus.take_outbox().is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        let id = bus.subscribe_all(move |_, _| *counter.borrow_mut() += 1);
        bus.emit(user_event(Phase::Before));
        assert!(bus.unsubscribe(id));
        bus.emit(user_event(Phase::After));
        assert_eq!(*hits.borrow(), 1);
        assert!(!bus.unsubscribe(id));
    }
}
