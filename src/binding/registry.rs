//! Per-node side table and the connection lifecycle built on it.

use std::collections::HashMap;
use std::rc::Rc;

use super::subscription::Subscription;
use super::EngineInner;
use crate::connection::{ConnectionState, HubConnection};
use crate::dom::NodeId;
use crate::host::TriggerHandlerId;

/// What the engine remembers about one element.
#[derive(Default)]
pub struct NodeRecord {
    /// Live handle when the element is a connection owner.
    pub connection: Option<Rc<dyn HubConnection>>,
    /// Subscriptions registered by the element as a subscriber.
    pub subscriptions: Vec<Rc<Subscription>>,
    /// Whether send triggers are already attached.
    pub sending_bound: bool,
    /// Trigger handlers attached for sending, detached on teardown.
    pub trigger_handlers: Vec<TriggerHandlerId>,
}

#[derive(Default)]
pub struct NodeRegistry {
    records: HashMap<NodeId, NodeRecord>,
}

impl NodeRegistry {
    pub fn record(&self, node: NodeId) -> Option<&NodeRecord> {
        self.records.get(&node)
    }

    pub fn record_mut(&mut self, node: NodeId) -> &mut NodeRecord {
        self.records.entry(node).or_default()
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut NodeRecord> {
        self.records.get_mut(&node)
    }

    pub fn connection(&self, node: NodeId) -> Option<Rc<dyn HubConnection>> {
        self.records.get(&node).and_then(|r| r.connection.clone())
    }

    pub fn remove(&mut self, node: NodeId) -> Option<NodeRecord> {
        self.records.remove(&node)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Create and start the connection declared by `owner`.
pub(crate) fn ensure_connection(inner: &EngineInner, owner: NodeId) {
    let host = inner.host.as_ref();
    if !host.body_contains(owner) {
        return;
    }
    let factory = match inner.factory() {
        Ok(factory) => factory,
        Err(e) => {
            tracing::error!(%owner, "{}", e);
            return;
        }
    };
    if let Some(existing) = inner.registry.borrow().connection(owner) {
        if existing.state() != ConnectionState::Stopped {
            tracing::debug!(%owner, address = existing.address(), "connection already established");
            return;
        }
    }
    let Some(address) = host.attribute_value(owner, &inner.config.attributes.connect) else {
        return;
    };
    let connection = match factory.create(&address) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(%owner, address, "failed to create connection: {}", e);
            return;
        }
    };
    connection.start();
    tracing::debug!(%owner, address, "connection started");
    inner.registry.borrow_mut().record_mut(owner).connection = Some(connection);
}

/// Nearest inclusive ancestor of `node` owning a connection.
pub(crate) fn find_connection_owner(
    inner: &EngineInner,
    node: NodeId,
) -> Option<(NodeId, Rc<dyn HubConnection>)> {
    let registry = inner.registry.borrow();
    let mut current = Some(node);
    while let Some(n) = current {
        if let Some(connection) = registry.connection(n) {
            return Some((n, connection));
        }
        current = inner.host.parent(n);
    }
    None
}

/// Forget everything `node` holds: stop its connection, deactivate its
/// subscriptions and detach its send triggers.
pub(crate) fn teardown(inner: &EngineInner, node: NodeId) {
    let Some(record) = inner.registry.borrow_mut().remove(node) else {
        return;
    };
    for subscription in &record.subscriptions {
        subscription.deactivate();
    }
    for id in record.trigger_handlers {
        inner.host.remove_trigger_handler(id);
    }
    if let Some(connection) = record.connection {
        tracing::debug!(%node, address = connection.address(), "stopping connection of removed owner");
        connection.stop();
    }
}
