//! In-process hub network.
//!
//! Connections, hubs and the messages between them live on one thread.
//! Nothing happens synchronously across the "wire": `start`, `send` and hub
//! broadcasts enqueue operations that [`HubNetwork::run_until_idle`] drains,
//! so callers observe the same `Pending -> Active` ordering a networked
//! client would.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use serde_json::Value;
use uuid::Uuid;

use super::{ConnectionState, HandlerId, HubConnection, MessageHandler};
use crate::error::ConnectionError;

type HubMethod = Rc<dyn Fn(&HubContext<'_>, Value)>;

/// Entries kept in a connection's sent and error logs; older ones are dropped.
pub const HISTORY_LIMIT: usize = 64;

enum Op {
    Handshake(Weak<MemoryConnection>),
    Invoke {
        from: Weak<MemoryConnection>,
        method: String,
        payload: Value,
    },
    Deliver {
        to: Weak<MemoryConnection>,
        event: String,
        payload: Value,
    },
}

/// Registry of hubs by address plus the queue of in-flight operations.
pub struct HubNetwork {
    this: Weak<HubNetwork>,
    hubs: RefCell<HashMap<String, Rc<Hub>>>,
    queue: RefCell<VecDeque<Op>>,
    /// Connections waiting for their hub to (re)appear.
    waiting: RefCell<Vec<Weak<MemoryConnection>>>,
}

impl HubNetwork {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            hubs: RefCell::new(HashMap::new()),
            queue: RefCell::new(VecDeque::new()),
            waiting: RefCell::new(Vec::new()),
        })
    }

    /// Map a hub at `address`, returning the existing one if present.
    /// Connections waiting to reconnect to `address` retry their handshake.
    pub fn map_hub(&self, address: &str) -> Rc<Hub> {
        if let Some(hub) = self.hub(address) {
            return hub;
        }
        let hub = Rc::new(Hub {
            address: address.to_string(),
            network: self.this.clone(),
            methods: RefCell::new(HashMap::new()),
            clients: RefCell::new(Vec::new()),
        });
        self.hubs
            .borrow_mut()
            .insert(address.to_string(), hub.clone());

        let retrying: Vec<Weak<MemoryConnection>> = {
            let mut waiting = self.waiting.borrow_mut();
            let (matching, rest): (Vec<_>, Vec<_>) = waiting
                .drain(..)
                .filter(|w| w.strong_count() > 0)
                .partition(|w| w.upgrade().is_some_and(|c| c.address == address));
            *waiting = rest;
            matching
        };
        for connection in retrying {
            self.enqueue(Op::Handshake(connection));
        }
        hub
    }

    pub fn hub(&self, address: &str) -> Option<Rc<Hub>> {
        self.hubs.borrow().get(address).cloned()
    }

    /// Take the hub at `address` offline. Its clients lose their connection.
    pub fn unmap_hub(&self, address: &str) {
        let Some(hub) = self.hubs.borrow_mut().remove(address) else {
            return;
        };
        let clients: Vec<Rc<MemoryConnection>> = hub
            .clients
            .borrow_mut()
            .drain(..)
            .filter_map(|w| w.upgrade())
            .collect();
        for client in clients {
            client.connection_lost();
        }
    }

    /// Process queued operations until none remain. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut processed = 0;
        loop {
            let op = self.queue.borrow_mut().pop_front();
            match op {
                Some(op) => {
                    self.process(op);
                    processed += 1;
                }
                None => return processed,
            }
        }
    }

    pub fn pending_operations(&self) -> usize {
        self.queue.borrow().len()
    }

    fn enqueue(&self, op: Op) {
        self.queue.borrow_mut().push_back(op);
    }

    fn process(&self, op: Op) {
        match op {
            Op::Handshake(connection) => {
                if let Some(connection) = connection.upgrade() {
                    self.handshake(&connection);
                }
            }
            Op::Invoke {
                from,
                method,
                payload,
            } => {
                let Some(caller) = from.upgrade() else {
                    return;
                };
                let Some(hub) = self.hub(&caller.address) else {
                    tracing::debug!(address = %caller.address, method, "invocation for an unmapped hub");
                    return;
                };
                hub.invoke(&caller, &method, payload);
            }
            Op::Deliver { to, event, payload } => {
                let Some(connection) = to.upgrade() else {
                    return;
                };
                if connection.state() == ConnectionState::Active {
                    connection.dispatch(&event, &payload);
                } else {
                    tracing::debug!(connection = %connection.id, event, "dropping message for inactive connection");
                }
            }
        }
    }

    fn handshake(&self, connection: &Rc<MemoryConnection>) {
        if !matches!(
            connection.state(),
            ConnectionState::Pending | ConnectionState::Reconnecting
        ) {
            return;
        }
        match self.hub(&connection.address) {
            Some(hub) => {
                hub.attach(connection);
                connection.activate();
            }
            None if connection.automatic_reconnect => {
                tracing::debug!(address = %connection.address, "hub not mapped, waiting to reconnect");
                connection.state.set(ConnectionState::Reconnecting);
                self.waiting.borrow_mut().push(Rc::downgrade(connection));
            }
            None => {
                connection.state.set(ConnectionState::Stopped);
                connection.report(ConnectionError::NoHub(connection.address.clone()));
            }
        }
    }
}

/// Server side of one address: named methods and the attached clients.
pub struct Hub {
    address: String,
    network: Weak<HubNetwork>,
    methods: RefCell<HashMap<String, HubMethod>>,
    clients: RefCell<Vec<Weak<MemoryConnection>>>,
}

impl Hub {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Register a method clients can invoke. Method names are
    /// case-insensitive.
    pub fn on(&self, method: &str, handler: impl Fn(&HubContext<'_>, Value) + 'static) {
        self.methods
            .borrow_mut()
            .insert(method.to_lowercase(), Rc::new(handler));
    }

    /// Push `event` to every attached client.
    pub fn broadcast(&self, event: &str, payload: Value) {
        for client in self.live_clients() {
            self.deliver(&client, event, payload.clone());
        }
    }

    /// Number of attached, active clients.
    pub fn client_count(&self) -> usize {
        self.live_clients().len()
    }

    fn live_clients(&self) -> Vec<Rc<MemoryConnection>> {
        self.clients
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| c.state() == ConnectionState::Active)
            .collect()
    }

    fn attach(&self, connection: &Rc<MemoryConnection>) {
        let mut clients = self.clients.borrow_mut();
        clients.retain(|w| w.strong_count() > 0);
        if !clients.iter().any(|w| w.ptr_eq(&Rc::downgrade(connection))) {
            clients.push(Rc::downgrade(connection));
        }
    }

    fn detach(&self, connection: &MemoryConnection) {
        self.clients
            .borrow_mut()
            .retain(|w| w.upgrade().is_some_and(|c| c.id != connection.id));
    }

    fn deliver(&self, to: &Rc<MemoryConnection>, event: &str, payload: Value) {
        if let Some(network) = self.network.upgrade() {
            network.enqueue(Op::Deliver {
                to: Rc::downgrade(to),
                event: event.to_string(),
                payload,
            });
        }
    }

    fn invoke(&self, caller: &Rc<MemoryConnection>, method: &str, payload: Value) {
        let handler = self.methods.borrow().get(&method.to_lowercase()).cloned();
        match handler {
            Some(handler) => handler(&HubContext { hub: self, caller }, payload),
            None => tracing::warn!(hub = %self.address, method, "no hub method registered"),
        }
    }
}

/// What a hub method sees of the invocation.
pub struct HubContext<'a> {
    hub: &'a Hub,
    caller: &'a Rc<MemoryConnection>,
}

impl HubContext<'_> {
    pub fn caller_id(&self) -> Uuid {
        self.caller.id
    }

    /// Push `event` to the calling client only.
    pub fn reply(&self, event: &str, payload: Value) {
        self.hub.deliver(self.caller, event, payload);
    }

    pub fn broadcast(&self, event: &str, payload: Value) {
        self.hub.broadcast(event, payload);
    }
}

/// Client connection on a [`HubNetwork`].
pub struct MemoryConnection {
    id: Uuid,
    address: String,
    network: Weak<HubNetwork>,
    this: Weak<MemoryConnection>,
    state: Cell<ConnectionState>,
    automatic_reconnect: bool,
    queue_sends: bool,
    handlers: RefCell<HashMap<String, Vec<MessageHandler>>>,
    queued_sends: RefCell<VecDeque<(String, Value)>>,
    sent: RefCell<VecDeque<(String, Value)>>,
    errors: RefCell<VecDeque<ConnectionError>>,
}

fn push_bounded<T>(log: &RefCell<VecDeque<T>>, entry: T) {
    let mut log = log.borrow_mut();
    if log.len() == HISTORY_LIMIT {
        log.pop_front();
    }
    log.push_back(entry);
}

impl MemoryConnection {
    pub(super) fn new(
        network: &Rc<HubNetwork>,
        address: String,
        automatic_reconnect: bool,
        queue_sends: bool,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: Uuid::new_v4(),
            address,
            network: Rc::downgrade(network),
            this: this.clone(),
            state: Cell::new(ConnectionState::Created),
            automatic_reconnect,
            queue_sends,
            handlers: RefCell::new(HashMap::new()),
            queued_sends: RefCell::new(VecDeque::new()),
            sent: RefCell::new(VecDeque::new()),
            errors: RefCell::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The most recent failures reported by this connection, oldest first.
    pub fn errors(&self) -> Vec<ConnectionError> {
        self.errors.borrow().iter().cloned().collect()
    }

    /// The most recent invocations that left this connection, oldest first.
    pub fn sent_messages(&self) -> Vec<(String, Value)> {
        self.sent.borrow().iter().cloned().collect()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .borrow()
            .get(&event.to_lowercase())
            .map_or(0, Vec::len)
    }

    pub fn queued_sends(&self) -> usize {
        self.queued_sends.borrow().len()
    }

    fn enqueue(&self, op: Op) {
        match self.network.upgrade() {
            Some(network) => network.enqueue(op),
            None => tracing::debug!(connection = %self.id, "hub network dropped"),
        }
    }

    fn report(&self, error: ConnectionError) {
        tracing::error!(connection = %self.id, "{}", error);
        push_bounded(&self.errors, error);
    }

    fn activate(&self) {
        self.state.set(ConnectionState::Active);
        tracing::debug!(connection = %self.id, address = %self.address, "connection active");
        let queued: Vec<(String, Value)> = self.queued_sends.borrow_mut().drain(..).collect();
        for (method, payload) in queued {
            self.send(&method, payload);
        }
    }

    fn connection_lost(&self) {
        if self.state() != ConnectionState::Active {
            return;
        }
        if self.automatic_reconnect {
            self.state.set(ConnectionState::Reconnecting);
            if let Some(network) = self.network.upgrade() {
                network.waiting.borrow_mut().push(self.this.clone());
            }
        } else {
            self.state.set(ConnectionState::Stopped);
        }
    }

    /// Run every handler registered for `event` against `payload`.
    ///
    /// The handler list is snapshotted first, so handlers may call `off`
    /// on themselves while dispatch is running.
    fn dispatch(&self, event: &str, payload: &Value) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .borrow()
            .get(&event.to_lowercase())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler.call(payload);
        }
    }
}

impl HubConnection for MemoryConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn start(&self) {
        match self.state() {
            ConnectionState::Created | ConnectionState::Stopped => {
                self.state.set(ConnectionState::Pending);
                self.enqueue(Op::Handshake(self.this.clone()));
            }
            state => tracing::debug!(connection = %self.id, %state, "start ignored"),
        }
    }

    fn stop(&self) {
        if self.state() == ConnectionState::Stopped {
            return;
        }
        self.state.set(ConnectionState::Stopped);
        self.queued_sends.borrow_mut().clear();
        if let Some(network) = self.network.upgrade() {
            network
                .waiting
                .borrow_mut()
                .retain(|w| w.upgrade().is_some_and(|c| c.id != self.id));
            if let Some(hub) = network.hub(&self.address) {
                hub.detach(self);
            }
        }
        tracing::debug!(connection = %self.id, address = %self.address, "connection stopped");
    }

    fn send(&self, method: &str, payload: Value) {
        match self.state() {
            ConnectionState::Active => {
                push_bounded(&self.sent, (method.to_string(), payload.clone()));
                self.enqueue(Op::Invoke {
                    from: self.this.clone(),
                    method: method.to_string(),
                    payload,
                });
            }
            ConnectionState::Pending | ConnectionState::Reconnecting if self.queue_sends => {
                self.queued_sends
                    .borrow_mut()
                    .push_back((method.to_string(), payload));
            }
            state => self.report(ConnectionError::not_connected(&self.address, method, state)),
        }
    }

    fn on(&self, event: &str, handler: MessageHandler) {
        self.handlers
            .borrow_mut()
            .entry(event.to_lowercase())
            .or_default()
            .push(handler);
    }

    fn off(&self, event: &str, handler: HandlerId) {
        if let Some(handlers) = self.handlers.borrow_mut().get_mut(&event.to_lowercase()) {
            handlers.retain(|h| h.id() != handler);
        }
    }
}
