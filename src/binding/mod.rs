//! The binding lifecycle engine.
//!
//! The host notifies the engine when a subtree has been processed and when
//! an element is about to be removed. On processing, role-bearing elements
//! are wired up in three passes: connection owners first, then subscribers,
//! then senders. On removal, the element's connection is stopped and its
//! subscriptions are deactivated; their handlers unregister themselves the
//! next time a message reaches them.
//!
//! All engine state lives in a [`NodeRegistry`] side table keyed by
//! [`NodeId`]. No borrow of it is held while foreign code (listeners,
//! handlers, transforms, timers) runs.

mod registry;
mod render;
mod scanner;
mod send;
mod subscription;

#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config::Config;
use crate::connection::{
    ConnectionFactory, ConnectionState, DefaultConnectionFactory, HandlerId, HubConnection,
    HubNetwork,
};
use crate::dom::{Document, NodeId};
use crate::error::SignalrError;
use crate::host::Host;

pub use registry::{NodeRecord, NodeRegistry};
pub use render::{
    MessageEnvelope, ResponseTransform, AFTER_SETTLE_EVENT, BEFORE_SETTLE_EVENT, MESSAGE_EVENT,
};
pub use scanner::query_attribute_on_this_or_children;
pub use send::{AFTER_SEND_EVENT, BEFORE_SEND_EVENT, HEADERS_KEY, VALIDATION_HALTED_EVENT};
pub use subscription::{parse_event_names, Subscription};

pub const AFTER_PROCESS_NODE: &str = "htmx:afterProcessNode";
pub const BEFORE_CLEANUP_ELEMENT: &str = "htmx:beforeCleanupElement";

/// Host lifecycle notifications the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A subtree has been processed and may contain new bindings.
    AfterProcessNode,
    /// An element is about to leave the document.
    BeforeCleanupElement,
}

impl LifecycleEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            AFTER_PROCESS_NODE => Some(Self::AfterProcessNode),
            BEFORE_CLEANUP_ELEMENT => Some(Self::BeforeCleanupElement),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AfterProcessNode => AFTER_PROCESS_NODE,
            Self::BeforeCleanupElement => BEFORE_CLEANUP_ELEMENT,
        }
    }
}

pub(crate) struct EngineInner {
    host: Rc<dyn Host>,
    config: Config,
    factory: RefCell<Option<Rc<dyn ConnectionFactory>>>,
    transforms: RefCell<Vec<Rc<dyn ResponseTransform>>>,
    registry: RefCell<NodeRegistry>,
    next_handler: Cell<HandlerId>,
}

impl EngineInner {
    fn factory(&self) -> Result<Rc<dyn ConnectionFactory>, SignalrError> {
        self.factory
            .borrow()
            .clone()
            .ok_or(SignalrError::MissingConnectionLibrary)
    }

    /// Whether a connection library is installed; logs the setup error for
    /// `node` when it is not.
    fn require_library(&self, node: NodeId) -> bool {
        match self.factory() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(%node, "{}", e);
                false
            }
        }
    }

    fn next_handler_id(&self) -> HandlerId {
        let id = self.next_handler.get();
        self.next_handler.set(id + 1);
        id
    }

    fn handle_lifecycle(self: &Rc<Self>, event: LifecycleEvent, node: NodeId) {
        match event {
            LifecycleEvent::AfterProcessNode => self.process_node(node),
            LifecycleEvent::BeforeCleanupElement => self.cleanup_element(node),
        }
    }

    fn process_node(self: &Rc<Self>, root: NodeId) {
        let host = self.host.as_ref();
        let attributes = &self.config.attributes;
        for owner in query_attribute_on_this_or_children(host, root, &attributes.connect) {
            registry::ensure_connection(self, owner);
        }
        for subscriber in query_attribute_on_this_or_children(host, root, &attributes.subscribe) {
            subscription::ensure_subscription(self, subscriber);
        }
        for sender in query_attribute_on_this_or_children(host, root, &attributes.send) {
            send::ensure_sending(self, sender);
        }
    }

    fn cleanup_element(&self, node: NodeId) {
        registry::teardown(self, node);
    }
}

/// Handle to the binding engine. Cloning shares the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl Engine {
    /// Create an engine without a connection library. Processing nodes
    /// reports a setup error until a factory is installed.
    pub fn new(host: Rc<dyn Host>, config: Config) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                host,
                config,
                factory: RefCell::new(None),
                transforms: RefCell::new(Vec::new()),
                registry: RefCell::new(NodeRegistry::default()),
                next_handler: Cell::new(1),
            }),
        }
    }

    pub fn with_factory(
        host: Rc<dyn Host>,
        config: Config,
        factory: impl ConnectionFactory + 'static,
    ) -> Self {
        let engine = Self::new(host, config);
        engine.set_connection_factory(factory);
        engine
    }

    /// Engine whose connections are [`MemoryConnection`](crate::connection::MemoryConnection)s
    /// on `network`, built as configured.
    pub fn with_network(host: Rc<dyn Host>, config: Config, network: Rc<HubNetwork>) -> Self {
        let factory = DefaultConnectionFactory::from_config(network, &config);
        Self::with_factory(host, config, factory)
    }

    pub fn set_connection_factory(&self, factory: impl ConnectionFactory + 'static) {
        *self.inner.factory.borrow_mut() = Some(Rc::new(factory));
    }

    /// Append a hook to the response-transform chain. Hooks run in
    /// registration order on every inbound message.
    pub fn add_response_transform(&self, transform: impl ResponseTransform + 'static) {
        self.inner.transforms.borrow_mut().push(Rc::new(transform));
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.inner.host
    }

    /// Entry point for host notifications. Unknown names are ignored.
    pub fn on_event(&self, name: &str, node: NodeId) {
        if let Some(event) = LifecycleEvent::from_name(name) {
            self.inner.handle_lifecycle(event, node);
        }
    }

    /// Wire up every binding in the subtree rooted at `root`.
    pub fn process_node(&self, root: NodeId) {
        self.inner.process_node(root);
    }

    /// Release what `node` itself holds: its connection and its
    /// subscriptions.
    pub fn cleanup_element(&self, node: NodeId) {
        self.inner.cleanup_element(node);
    }

    /// Clean up `node` and its descendants, then detach it.
    pub fn remove_element(&self, node: NodeId) {
        let host = self.inner.host.clone();
        self.cleanup_element(node);
        for descendant in host.descendant_elements(node) {
            self.cleanup_element(descendant);
        }
        host.remove(node);
    }

    /// Route the lifecycle events of `doc` to this engine.
    ///
    /// Listeners sit on the document root, so they see every
    /// `htmx:afterProcessNode` and `htmx:beforeCleanupElement` that bubbles.
    pub fn listen(&self, doc: &Document) {
        for event in [
            LifecycleEvent::AfterProcessNode,
            LifecycleEvent::BeforeCleanupElement,
        ] {
            let engine = Rc::downgrade(&self.inner);
            doc.add_event_listener(doc.root(), event.name(), move |evt| {
                if let Some(inner) = engine.upgrade() {
                    inner.handle_lifecycle(event, evt.target());
                }
            });
        }
    }

    /// Connection owned by `owner`, if any.
    pub fn connection(&self, owner: NodeId) -> Option<Rc<dyn HubConnection>> {
        self.inner.registry.borrow().connection(owner)
    }

    pub fn connection_state(&self, owner: NodeId) -> Option<ConnectionState> {
        self.connection(owner).map(|c| c.state())
    }

    /// Event names `node` is actively subscribed to, in registration order.
    pub fn subscriptions(&self, node: NodeId) -> Vec<String> {
        self.inner
            .registry
            .borrow()
            .record(node)
            .map(|r| {
                r.subscriptions
                    .iter()
                    .filter(|s| s.is_active())
                    .map(|s| s.event().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether send triggers have been bound on `node`.
    pub fn is_sending_bound(&self, node: NodeId) -> bool {
        self.inner
            .registry
            .borrow()
            .record(node)
            .is_some_and(|r| r.sending_bound)
    }
}
