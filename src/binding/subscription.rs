//! Subscription multiplexer: one connection handler per (subscriber, event).

use std::cell::Cell;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::registry::find_connection_owner;
use super::{render, EngineInner};
use crate::config::SubscriptionParsing;
use crate::connection::{HandlerId, HubConnection, MessageHandler};
use crate::dom::NodeId;

/// A handler registered on an owner's connection on behalf of a subscriber.
///
/// `active` is cleared when the subscriber is cleaned up; `unregistered`
/// guarantees the handler is removed from the connection exactly once.
pub struct Subscription {
    id: HandlerId,
    subscriber: NodeId,
    owner: NodeId,
    event: String,
    active: Cell<bool>,
    unregistered: Cell<bool>,
    connection: Weak<dyn HubConnection>,
}

impl Subscription {
    fn new(
        id: HandlerId,
        subscriber: NodeId,
        owner: NodeId,
        event: String,
        connection: &Rc<dyn HubConnection>,
    ) -> Self {
        Self {
            id,
            subscriber,
            owner,
            event,
            active: Cell::new(true),
            unregistered: Cell::new(false),
            connection: Rc::downgrade(connection),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn subscriber(&self) -> NodeId {
        self.subscriber
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn is_active(&self) -> bool {
        self.active.get() && !self.unregistered.get()
    }

    pub(crate) fn deactivate(&self) {
        self.active.set(false);
    }

    /// Whether the handler sits on `connection` rather than an earlier one.
    fn is_bound_to(&self, connection: &Rc<dyn HubConnection>) -> bool {
        self.connection
            .upgrade()
            .is_some_and(|current| Rc::ptr_eq(&current, connection))
    }

    /// Take the handler off whatever connection it was registered on.
    fn release(&self) {
        match self.connection.upgrade() {
            Some(connection) => self.unregister(connection.as_ref()),
            None => self.unregistered.set(true),
        }
    }

    fn unregister(&self, connection: &dyn HubConnection) {
        if self.unregistered.replace(true) {
            return;
        }
        self.active.set(false);
        tracing::debug!(subscriber = %self.subscriber, event = %self.event, "unregistering handler");
        connection.off(&self.event, self.id);
    }
}

/// Split a subscriber's attribute value into event names.
///
/// Hub method names compare case-insensitively, so in multi mode a repeated
/// name keeps only its first spelling.
pub fn parse_event_names(value: &str, mode: SubscriptionParsing) -> Vec<String> {
    match mode {
        SubscriptionParsing::Multi => {
            let mut names: Vec<String> = Vec::new();
            for name in value.split(',').map(str::trim) {
                if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.to_string());
                }
            }
            names
        }
        SubscriptionParsing::Single => {
            let name = value.trim();
            if name.is_empty() {
                Vec::new()
            } else {
                vec![name.to_string()]
            }
        }
    }
}

fn declared_events(inner: &EngineInner, node: NodeId) -> Vec<String> {
    inner
        .host
        .attribute_value(node, &inner.config.attributes.subscribe)
        .map(|value| parse_event_names(&value, inner.config.subscription_parsing))
        .unwrap_or_default()
}

pub(crate) fn ensure_subscription(inner: &Rc<EngineInner>, subscriber: NodeId) {
    if !inner.host.body_contains(subscriber) || !inner.require_library(subscriber) {
        return;
    }
    let Some((owner, connection)) = find_connection_owner(inner, subscriber) else {
        tracing::debug!(%subscriber, "no connection owner above subscriber");
        return;
    };

    // Handlers left on a connection the owner no longer holds (stopped,
    // replaced after reattach) would never fire again.
    let stale: Vec<Rc<Subscription>> = match inner.registry.borrow_mut().get_mut(subscriber) {
        Some(record) => {
            let (stale, kept) = std::mem::take(&mut record.subscriptions)
                .into_iter()
                .partition::<Vec<_>, _>(|s| !s.is_bound_to(&connection));
            record.subscriptions = kept;
            stale
        }
        None => Vec::new(),
    };
    for subscription in stale {
        tracing::debug!(%subscriber, event = %subscription.event, "dropping handler of a previous connection");
        subscription.release();
    }

    for event in declared_events(inner, subscriber) {
        let already_subscribed = inner.registry.borrow().record(subscriber).is_some_and(|r| {
            r.subscriptions.iter().any(|s| {
                s.is_active() && s.owner == owner && s.event.eq_ignore_ascii_case(&event)
            })
        });
        if already_subscribed {
            tracing::debug!(%subscriber, event, "already subscribed");
            continue;
        }

        let subscription = Rc::new(Subscription::new(
            inner.next_handler_id(),
            subscriber,
            owner,
            event,
            &connection,
        ));
        let engine = Rc::downgrade(inner);
        let handled = subscription.clone();
        connection.on(
            &subscription.event,
            MessageHandler::new(subscription.id, move |message| {
                if let Some(inner) = engine.upgrade() {
                    handle_message(&inner, &handled, message);
                }
            }),
        );
        tracing::debug!(%subscriber, %owner, event = %subscription.event, "subscribed");
        inner
            .registry
            .borrow_mut()
            .record_mut(subscriber)
            .subscriptions
            .push(subscription);
    }
}

fn handle_message(inner: &Rc<EngineInner>, subscription: &Subscription, message: &Value) {
    let Some(connection) = subscription.connection.upgrade() else {
        subscription.unregistered.set(true);
        return;
    };
    let host = inner.host.as_ref();

    if !host.body_contains(subscription.owner) {
        tracing::debug!(owner = %subscription.owner, "connection owner left the document");
        connection.stop();
        unregister(inner, subscription, connection.as_ref());
        return;
    }

    if !subscription.active.get()
        || !host.body_contains(subscription.subscriber)
        || !declared_events(inner, subscription.subscriber)
            .iter()
            .any(|event| event.eq_ignore_ascii_case(&subscription.event))
    {
        unregister(inner, subscription, connection.as_ref());
        return;
    }

    render::render_message(
        inner,
        subscription.subscriber,
        &subscription.event,
        message.clone(),
    );
}

fn unregister(inner: &EngineInner, subscription: &Subscription, connection: &dyn HubConnection) {
    subscription.unregister(connection);
    if let Some(record) = inner.registry.borrow_mut().get_mut(subscription.subscriber) {
        record.subscriptions.retain(|s| s.id != subscription.id);
    }
}
