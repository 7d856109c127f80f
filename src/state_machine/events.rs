//! This module provides the [`StateMachine`]'s `Events`, `EventSubscriber` and `EventPublisher`
//! types.
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

use tokio::sync::watch;

use crate::{
    model::GlobalModel,
    state_machine::{coordinator::RoundRecord, phases::PhaseName},
};

/// An event emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    /// Metadata that associates this event to the round in which it is
    /// emitted.
    pub round_id: u64,
    /// The event itself
    pub event: E,
}

/// A convenience type to emit any coordinator event.
#[derive(Debug)]
pub struct EventPublisher {
    /// Round ID that is attached to all the events.
    round_id: u64,
    phase_tx: EventBroadcaster<PhaseName>,
    model_tx: EventBroadcaster<GlobalModel>,
    record_tx: EventBroadcaster<Option<RoundRecord>>,
}

/// The `EventSubscriber` hands out `EventListener`s for any
/// coordinator event.
#[derive(Debug)]
pub struct EventSubscriber {
    phase_rx: EventListener<PhaseName>,
    model_rx: EventListener<GlobalModel>,
    record_rx: EventListener<Option<RoundRecord>>,
}

impl EventPublisher {
    /// Initialize a new event publisher with the given initial events.
    pub fn init(round_id: u64, phase: PhaseName, model: GlobalModel) -> (Self, EventSubscriber) {
        let (phase_tx, phase_rx) = watch::channel::<Event<PhaseName>>(Event {
            round_id,
            event: phase,
        });

        let (model_tx, model_rx) = watch::channel::<Event<GlobalModel>>(Event {
            round_id,
            event: model,
        });

        let (record_tx, record_rx) = watch::channel::<Event<Option<RoundRecord>>>(Event {
            round_id,
            event: None,
        });

        let publisher = EventPublisher {
            round_id,
            phase_tx: phase_tx.into(),
            model_tx: model_tx.into(),
            record_tx: record_tx.into(),
        };

        let subscriber = EventSubscriber {
            phase_rx: phase_rx.into(),
            model_rx: model_rx.into(),
            record_rx: record_rx.into(),
        };

        (publisher, subscriber)
    }

    /// Set the round ID that is attached to the events the publisher broadcasts.
    pub fn set_round_id(&mut self, id: u64) {
        self.round_id = id;
    }

    fn event<T>(&self, event: T) -> Event<T> {
        Event {
            round_id: self.round_id,
            event,
        }
    }

    /// Emit a phase event
    pub fn broadcast_phase(&mut self, phase: PhaseName) {
        self.phase_tx.broadcast(self.event(phase));
    }

    /// Emit a model event
    pub fn broadcast_model(&mut self, model: GlobalModel) {
        self.model_tx.broadcast(self.event(model));
    }

    /// Emit a round record event
    pub fn broadcast_record(&mut self, record: RoundRecord) {
        self.record_tx.broadcast(self.event(Some(record)));
    }
}

impl EventSubscriber {
    /// Get a listener for new phase events
    pub fn phase_listener(&self) -> EventListener<PhaseName> {
        self.phase_rx.clone()
    }

    /// Get a listener for new model events
    pub fn model_listener(&self) -> EventListener<GlobalModel> {
        self.model_rx.clone()
    }

    /// Get a listener for completed rounds
    pub fn record_listener(&self) -> EventListener<Option<RoundRecord>> {
        self.record_rx.clone()
    }
}

/// A listener for coordinator events. It can be used to either
/// retrieve the latest `Event<E>` emitted by the coordinator (with
/// `EventListener::get_latest`) or to wait for the next event (with
/// `EventListener::changed`).
#[derive(Debug, Clone)]
pub struct EventListener<E>(watch::Receiver<Event<E>>);

impl<E> From<watch::Receiver<Event<E>>> for EventListener<E> {
    fn from(receiver: watch::Receiver<Event<E>>) -> Self {
        EventListener(receiver)
    }
}

impl<E> EventListener<E>
where
    E: Clone,
{
    pub fn get_latest(&self) -> Event<E> {
        self.0.borrow().clone()
    }

    /// Waits for the next event. Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Event<E>> {
        self.0.changed().await.ok()?;
        Some(self.0.borrow_and_update().clone())
    }
}

/// A channel to send `Event<E>` to all the `EventListener<E>`.
#[derive(Debug)]
pub struct EventBroadcaster<E>(watch::Sender<Event<E>>);

impl<E> EventBroadcaster<E> {
    /// Send `event` to all the `EventListener<E>`
    fn broadcast(&self, event: Event<E>) {
        // the value is replaced even if there is no listener
        self.0.send_replace(event);
    }
}

impl<E> From<watch::Sender<Event<E>>> for EventBroadcaster<E> {
    fn from(sender: watch::Sender<Event<E>>) -> Self {
        Self(sender)
    }
}
