use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use super::*;
use crate::connection::{HandlerId, HubConnection, MessageHandler};
use crate::error::ConnectionError;

/// Connection double recording every call the engine makes.
struct MockConnection {
    address: String,
    state: Cell<ConnectionState>,
    handlers: RefCell<Vec<(String, MessageHandler)>>,
    offs: RefCell<Vec<(String, HandlerId)>>,
    stops: Cell<usize>,
    sends: RefCell<Vec<(String, Value)>>,
}

impl MockConnection {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            state: Cell::new(ConnectionState::Created),
            handlers: RefCell::new(Vec::new()),
            offs: RefCell::new(Vec::new()),
            stops: Cell::new(0),
            sends: RefCell::new(Vec::new()),
        }
    }

    fn emit(&self, event: &str, message: Value) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler.call(&message);
        }
    }

    fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|(e, _)| e == event)
            .count()
    }

    fn off_events(&self) -> Vec<String> {
        self.offs.borrow().iter().map(|(e, _)| e.clone()).collect()
    }
}

impl HubConnection for MockConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn start(&self) {
        self.state.set(ConnectionState::Active);
    }

    fn stop(&self) {
        self.stops.set(self.stops.get() + 1);
        self.state.set(ConnectionState::Stopped);
    }

    fn send(&self, method: &str, payload: Value) {
        self.sends.borrow_mut().push((method.to_string(), payload));
    }

    fn on(&self, event: &str, handler: MessageHandler) {
        self.handlers.borrow_mut().push((event.to_string(), handler));
    }

    fn off(&self, event: &str, handler: HandlerId) {
        self.offs.borrow_mut().push((event.to_string(), handler));
        self.handlers
            .borrow_mut()
            .retain(|(e, h)| !(e == event && h.id() == handler));
    }
}

struct Fixture {
    doc: Rc<Document>,
    engine: Engine,
    connections: Rc<RefCell<Vec<Rc<MockConnection>>>>,
}

impl Fixture {
    fn new(html: &str) -> Self {
        Self::with_config(
            html,
            Config {
                default_settle_delay: 0,
                ..Config::default()
            },
        )
    }

    fn with_config(html: &str, config: Config) -> Self {
        let doc = Rc::new(Document::from_html_with_config(html, config.clone()));
        let connections = Rc::new(RefCell::new(Vec::new()));
        let created = connections.clone();
        let factory = move |address: &str| -> Result<Rc<dyn HubConnection>, ConnectionError> {
            let mock = Rc::new(MockConnection::new(address));
            created.borrow_mut().push(mock.clone());
            let connection: Rc<dyn HubConnection> = mock;
            Ok(connection)
        };
        let host: Rc<dyn Host> = doc.clone();
        let engine = Engine::with_factory(host, config, factory);
        engine.process_node(doc.body());
        Self {
            doc,
            engine,
            connections,
        }
    }

    fn id(&self, id: &str) -> NodeId {
        self.doc
            .get_element_by_id(id)
            .unwrap_or_else(|| panic!("no element #{}", id))
    }

    fn connection(&self, index: usize) -> Rc<MockConnection> {
        self.connections.borrow()[index].clone()
    }

    fn connection_count(&self) -> usize {
        self.connections.borrow().len()
    }

    fn inner(&self, id: &str) -> String {
        self.doc.inner_html(self.id(id))
    }

    /// Record the detail of every `name` notification reaching the root.
    fn record(&self, name: &str) -> Rc<RefCell<Vec<Value>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        self.doc.add_event_listener(self.doc.root(), name, move |evt| {
            log.borrow_mut().push(evt.detail.clone());
        });
        seen
    }
}

const COUNTER_PAGE: &str = r#"<div id="hub" signalr-connect="/testhub">
    <div id="counter" signalr-subscribe="counter">0</div>
    <div id="multi" signalr-subscribe="a, b"></div>
</div>"#;

#[test]
fn test_owner_with_both_spellings_gets_one_connection() {
    let fx = Fixture::new(r#"<div id="hub" signalr-connect="/h" data-signalr-connect="/h"></div>"#);
    assert_eq!(fx.connection_count(), 1);
    assert_eq!(fx.connection(0).address(), "/h");
    assert_eq!(fx.engine.connection_state(fx.id("hub")), Some(ConnectionState::Active));
}

#[test]
fn test_event_list_is_trimmed() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    assert_eq!(fx.engine.subscriptions(fx.id("multi")), vec!["a", "b"]);
    assert_eq!(connection.handler_count("a"), 1);
    assert_eq!(connection.handler_count("b"), 1);
    assert_eq!(connection.handler_count(" b"), 0);
}

#[test]
fn test_message_renders_into_subscriber() {
    let fx = Fixture::new(COUNTER_PAGE);
    fx.connection(0).emit("counter", json!(r#"<span id="n">1</span>"#));
    assert_eq!(fx.inner("counter"), r#"<span id="n">1</span>"#);
}

#[test]
fn test_reprocessing_is_idempotent() {
    let fx = Fixture::new(
        r#"<div id="hub" signalr-connect="/h"><div id="s" signalr-subscribe="a"></div><button id="b" signalr-send="go"></button></div>"#,
    );
    fx.engine.process_node(fx.doc.body());
    fx.engine.process_node(fx.id("hub"));
    let connection = fx.connection(0);
    assert_eq!(fx.connection_count(), 1);
    assert_eq!(connection.handler_count("a"), 1);

    fx.doc.dispatch(fx.id("b"), "click");
    assert_eq!(connection.sends.borrow().len(), 1);
}

#[test]
fn test_subscriber_removal_unregisters_exactly_once() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let counter = fx.id("counter");
    fx.engine.remove_element(counter);
    assert!(fx.engine.subscriptions(counter).is_empty());

    connection.emit("counter", json!("<b>1</b>"));
    connection.emit("counter", json!("<b>2</b>"));

    assert_eq!(connection.off_events(), vec!["counter"]);
    assert_eq!(connection.handler_count("counter"), 0);
    assert_eq!(fx.doc.inner_html(counter), "0");
    assert_eq!(connection.stops.get(), 0);
}

#[test]
fn test_attribute_drift_unregisters_dropped_event() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let multi = fx.id("multi");
    fx.doc.set_attribute(multi, "signalr-subscribe", "b");

    connection.emit("a", json!("from a"));
    assert_eq!(connection.off_events(), vec!["a"]);
    assert_eq!(fx.doc.inner_html(multi), "");

    connection.emit("b", json!("from b"));
    assert_eq!(fx.doc.inner_html(multi), "from b");
    assert_eq!(fx.engine.subscriptions(multi), vec!["b"]);
}

#[test]
fn test_drifted_event_can_be_resubscribed() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let multi = fx.id("multi");
    fx.doc.set_attribute(multi, "signalr-subscribe", "b");
    connection.emit("a", json!("x"));
    fx.doc.set_attribute(multi, "signalr-subscribe", "a, b");
    fx.engine.process_node(multi);
    assert_eq!(connection.handler_count("a"), 1);
    assert_eq!(connection.handler_count("b"), 1);
    connection.emit("a", json!("again"));
    assert_eq!(fx.doc.inner_html(multi), "again");
}

#[test]
fn test_owner_removal_cascades() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let hub = fx.id("hub");
    fx.engine.remove_element(hub);

    assert_eq!(connection.state(), ConnectionState::Stopped);
    assert_eq!(connection.stops.get(), 1);
    assert!(fx.engine.connection(hub).is_none());

    // Orphaned handlers unregister on their next invocation.
    connection.emit("counter", json!("late"));
    connection.emit("a", json!("late"));
    connection.emit("b", json!("late"));
    let mut offs = connection.off_events();
    offs.sort();
    assert_eq!(offs, vec!["a", "b", "counter"]);
    assert!(!fx.doc.inner_html(fx.doc.body()).contains("late"));
}

#[test]
fn test_liveness_gate_stops_connection_of_detached_owner() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    // Detach without a cleanup notification.
    fx.doc.remove(fx.id("hub"));
    connection.emit("counter", json!("ignored"));
    assert_eq!(connection.stops.get(), 1);
    assert_eq!(connection.off_events(), vec!["counter"]);
}

#[test]
fn test_reattached_owner_moves_subscriptions_to_new_connection() {
    let fx = Fixture::new(COUNTER_PAGE);
    let hub = fx.id("hub");
    fx.doc.remove(hub);
    fx.connection(0).emit("a", json!("ignored"));
    assert_eq!(fx.connection(0).state(), ConnectionState::Stopped);

    fx.doc.append_child(fx.doc.body(), hub);
    fx.engine.process_node(hub);
    assert_eq!(fx.connection_count(), 2);
    let old = fx.connection(0);
    let new = fx.connection(1);
    for event in ["counter", "a", "b"] {
        assert_eq!(new.handler_count(event), 1, "{event} on the new connection");
        assert_eq!(old.handler_count(event), 0, "{event} on the old connection");
    }

    new.emit("counter", json!("7"));
    assert_eq!(fx.inner("counter"), "7");
    new.emit("b", json!("from b"));
    assert_eq!(fx.inner("multi"), "from b");
}

#[test]
fn test_owner_cleanup_then_reprocess_rebinds_subscribers() {
    let fx = Fixture::new(COUNTER_PAGE);
    let hub = fx.id("hub");
    fx.engine.cleanup_element(hub);
    fx.engine.process_node(hub);

    assert_eq!(fx.connection_count(), 2);
    let new = fx.connection(1);
    assert_eq!(new.handler_count("counter"), 1);
    assert_eq!(new.handler_count("a"), 1);
    assert_eq!(new.handler_count("b"), 1);
    let mut offs = fx.connection(0).off_events();
    offs.sort();
    assert_eq!(offs, vec!["a", "b", "counter"]);

    new.emit("counter", json!("fresh"));
    assert_eq!(fx.inner("counter"), "fresh");
    assert_eq!(fx.engine.subscriptions(fx.id("counter")), vec!["counter"]);
}

#[test]
fn test_event_names_differing_in_case_subscribe_once() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><div id="s" signalr-subscribe="a, A"></div></div>"#,
    );
    let connection = fx.connection(0);
    assert_eq!(fx.engine.subscriptions(fx.id("s")), vec!["a"]);
    assert_eq!(connection.handler_count("a"), 1);
    assert_eq!(connection.handler_count("A"), 0);

    fx.doc.set_attribute(fx.id("s"), "signalr-subscribe", "A");
    connection.emit("a", json!("still declared"));
    assert_eq!(fx.inner("s"), "still declared");
    assert!(connection.off_events().is_empty());
}

#[test]
fn test_structured_message_is_canonical_json() {
    let fx = Fixture::new(r#"<div signalr-connect="/h"><div id="json" signalr-subscribe="json"></div></div>"#);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    fx.engine.add_response_transform(move |text: String, _node: NodeId, _host: &dyn Host| {
        log.borrow_mut().push(text.clone());
        text
    });
    fx.connection(0).emit("json", json!({"name": "test", "id": 1}));
    assert_eq!(*seen.borrow(), vec![r#"{"name":"test","id":1}"#.to_string()]);
    assert_eq!(fx.doc.text_content(fx.id("json")), r#"{"name":"test","id":1}"#);
}

#[test]
fn test_transforms_run_in_registration_order() {
    let fx = Fixture::new(r#"<div signalr-connect="/h"><div id="s" signalr-subscribe="m"></div></div>"#);
    fx.engine
        .add_response_transform(|text: String, _: NodeId, _: &dyn Host| format!("{}1", text));
    fx.engine
        .add_response_transform(|text: String, _: NodeId, _: &dyn Host| format!("{}2", text));
    fx.connection(0).emit("m", json!("x"));
    assert_eq!(fx.inner("s"), "x12");
}

#[test]
fn test_message_notification_can_cancel() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let seen = fx.record(MESSAGE_EVENT);
    fx.doc
        .add_event_listener(fx.id("counter"), MESSAGE_EVENT, |evt| evt.prevent_default());
    connection.emit("counter", json!("<b>1</b>"));

    assert_eq!(fx.inner("counter"), "0");
    assert_eq!(connection.handler_count("counter"), 1);
    assert_eq!(
        *seen.borrow(),
        vec![json!({"message": "<b>1</b>", "method": "counter", "target": fx.id("counter")})]
    );
}

#[test]
fn test_message_listener_can_rewrite_envelope() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><div id="s" signalr-subscribe="m"></div></div><div id="elsewhere"></div>"#,
    );
    let elsewhere = fx.id("elsewhere");
    fx.doc.add_event_listener(fx.id("s"), MESSAGE_EVENT, move |evt| {
        evt.detail["message"] = json!("rewritten");
        evt.detail["target"] = json!(elsewhere);
    });
    fx.connection(0).emit("m", json!("original"));
    assert_eq!(fx.inner("s"), "");
    assert_eq!(fx.inner("elsewhere"), "rewritten");
}

#[test]
fn test_several_subscribers_render_in_registration_order() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><div id="one" signalr-subscribe="tick"></div><div id="two" signalr-subscribe="tick"></div></div>"#,
    );
    let order = Rc::new(RefCell::new(Vec::new()));
    let log = order.clone();
    fx.doc.add_event_listener(fx.doc.root(), AFTER_SETTLE_EVENT, move |evt| {
        log.borrow_mut().push(evt.target());
    });
    fx.connection(0).emit("tick", json!("t"));
    assert_eq!(*order.borrow(), vec![fx.id("one"), fx.id("two")]);
    assert_eq!(fx.inner("one"), "t");
    assert_eq!(fx.inner("two"), "t");
}

#[test]
fn test_hx_target_and_swap_are_honoured() {
    let fx = Fixture::new(
        r##"<div signalr-connect="/h"><div id="s" signalr-subscribe="m" hx-target="#log" hx-swap="beforeend"></div></div><ul id="log"><li>0</li></ul>"##,
    );
    let connection = fx.connection(0);
    connection.emit("m", json!("<li>1</li>"));
    connection.emit("m", json!("<li>2</li>"));
    assert_eq!(fx.inner("log"), "<li>0</li><li>1</li><li>2</li>");
}

#[test]
fn test_settle_delay_defers_after_settle() {
    let fx = Fixture::with_config(COUNTER_PAGE, Config::default());
    let before = fx.record(BEFORE_SETTLE_EVENT);
    let after = fx.record(AFTER_SETTLE_EVENT);
    let counter = fx.id("counter");

    fx.connection(0).emit("counter", json!("1"));
    assert_eq!(before.borrow().len(), 1);
    assert!(after.borrow().is_empty());
    assert!(fx.doc.has_class(counter, "htmx-settling"));

    fx.doc.advance(Duration::from_millis(19));
    assert!(after.borrow().is_empty());
    fx.doc.advance(Duration::from_millis(1));
    assert_eq!(after.borrow().len(), 1);
    assert!(!fx.doc.has_class(counter, "htmx-settling"));
}

#[test]
fn test_subscriber_settles_when_target_is_elsewhere() {
    let fx = Fixture::new(
        r##"<div signalr-connect="/h"><div id="s" signalr-subscribe="m" hx-target="#log"></div></div><div id="log"></div>"##,
    );
    let before = fx.record(BEFORE_SETTLE_EVENT);
    let after = fx.record(AFTER_SETTLE_EVENT);
    fx.connection(0).emit("m", json!("<p>1</p>"));

    assert_eq!(fx.inner("log"), "<p>1</p>");
    assert_eq!(*before.borrow(), vec![json!({ "elt": fx.id("s") })]);
    assert_eq!(*after.borrow(), vec![json!({ "elt": fx.id("s") })]);
    assert!(!fx.doc.has_class(fx.id("s"), "htmx-settling"));
    assert!(!fx.doc.has_class(fx.id("log"), "htmx-settling"));
}

#[test]
fn test_zero_settle_finishes_synchronously() {
    let fx = Fixture::new(r#"<div signalr-connect="/h"><div id="s" signalr-subscribe="m" hx-swap="innerHTML settle:0ms"></div></div>"#);
    let after = fx.record(AFTER_SETTLE_EVENT);
    fx.connection(0).emit("m", json!("x"));
    assert_eq!(after.borrow().len(), 1);
    assert_eq!(fx.doc.pending_timers(), 0);
}

#[test]
fn test_inserted_elements_get_load_and_are_processed() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    let loads = fx.record(crate::host::document::LOAD_EVENT);
    connection.emit("counter", json!(r#"<div id="nested" signalr-subscribe="inner"></div>"#));
    assert_eq!(loads.borrow().len(), 1);
    assert_eq!(connection.handler_count("inner"), 1);

    connection.emit("inner", json!("deep"));
    assert_eq!(fx.inner("nested"), "deep");
}

#[test]
fn test_swapped_out_subscriber_is_cleaned_up() {
    let fx = Fixture::new(COUNTER_PAGE);
    let connection = fx.connection(0);
    connection.emit("counter", json!(r#"<div id="nested" signalr-subscribe="inner"></div>"#));
    let nested = fx.id("nested");
    connection.emit("counter", json!("replaced"));

    assert!(fx.engine.subscriptions(nested).is_empty());
    connection.emit("inner", json!("late"));
    assert_eq!(connection.off_events(), vec!["inner"]);
}

#[test]
fn test_send_merges_parameters_and_headers() {
    let fx = Fixture::new(
        r#"<div id="hub" signalr-connect="/h">
             <form id="f" signalr-send="echo" hx-vals='{"id": 5}'>
               <input name="message" value="hi">
               <input name="id" value="1">
             </form>
           </div>"#,
    );
    let after = fx.record(AFTER_SEND_EVENT);
    let event = fx.doc.dispatch(fx.id("f"), "submit");

    let expected = json!({
        "message": "hi",
        "id": 5,
        "HEADERS": {
            "HX-Request": "true",
            "HX-Trigger": "f",
            "HX-Target": "hub",
            "HX-Current-URL": "http://localhost/"
        }
    });
    assert_eq!(
        *fx.connection(0).sends.borrow(),
        vec![("echo".to_string(), expected.clone())]
    );
    assert!(event.is_default_prevented());
    assert_eq!(*after.borrow(), vec![json!({"method": "echo", "message": expected})]);
}

#[test]
fn test_reinserted_sender_sends_once_per_trigger() {
    let fx = Fixture::new(
        r#"<div id="hub" signalr-connect="/h"><button id="b" signalr-send="go"></button></div>"#,
    );
    let (hub, button) = (fx.id("hub"), fx.id("b"));
    fx.engine.remove_element(button);
    assert!(!fx.engine.is_sending_bound(button));

    fx.doc.append_child(hub, button);
    fx.engine.process_node(button);
    fx.doc.dispatch(button, "click");
    assert_eq!(fx.connection(0).sends.borrow().len(), 1);
}

#[test]
fn test_swapped_out_sender_releases_its_listeners() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><div id="s" signalr-subscribe="m"><button signalr-send="go">0</button></div></div>"#,
    );
    let connection = fx.connection(0);
    let baseline = fx.doc.listener_count();

    connection.emit("m", json!(r#"<button id="b" signalr-send="go">1</button>"#));
    assert_eq!(fx.doc.listener_count(), baseline);
    connection.emit("m", json!(r#"<button id="b" signalr-send="go">2</button>"#));
    assert_eq!(fx.doc.listener_count(), baseline);

    fx.doc.dispatch(fx.id("b"), "click");
    assert_eq!(connection.sends.borrow().len(), 1);
}

#[test]
fn test_send_method_read_at_send_time() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><button id="b" signalr-send="first"></button></div>"#,
    );
    fx.doc.set_attribute(fx.id("b"), "signalr-send", "second");
    fx.doc.dispatch(fx.id("b"), "click");
    assert_eq!(fx.connection(0).sends.borrow()[0].0, "second");
}

#[test]
fn test_hx_params_filters_but_all_parameters_reported() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><form id="f" signalr-send="go" hx-params="a"><input name="a" value="1"><input name="b" value="2"></form></div>"#,
    );
    let before = fx.record(BEFORE_SEND_EVENT);
    fx.doc.dispatch(fx.id("f"), "submit");
    let detail = before.borrow()[0].clone();
    assert_eq!(detail["allParameters"], json!({"a": "1", "b": "2"}));
    assert_eq!(detail["filteredParameters"]["a"], json!("1"));
    assert!(detail["filteredParameters"].get("b").is_none());
    assert!(detail["filteredParameters"].get(HEADERS_KEY).is_some());
}

#[test]
fn test_before_send_cancellation_aborts() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><button id="b" signalr-send="go"></button></div>"#,
    );
    let after = fx.record(AFTER_SEND_EVENT);
    fx.doc
        .add_event_listener(fx.id("b"), BEFORE_SEND_EVENT, |evt| evt.prevent_default());
    fx.doc.dispatch(fx.id("b"), "click");
    assert!(fx.connection(0).sends.borrow().is_empty());
    assert!(after.borrow().is_empty());
}

#[test]
fn test_validation_errors_halt_send() {
    let fx = Fixture::new(
        r#"<div signalr-connect="/h"><form id="f" signalr-send="go"><input name="need" required></form></div>"#,
    );
    let halted = fx.record(VALIDATION_HALTED_EVENT);
    let event = fx.doc.dispatch(fx.id("f"), "submit");
    assert!(fx.connection(0).sends.borrow().is_empty());
    assert!(!event.is_default_prevented());
    let errors = halted.borrow()[0]["errors"].clone();
    assert_eq!(errors[0]["name"], json!("need"));
}

#[test]
fn test_sender_outside_any_owner_is_not_bound() {
    let fx = Fixture::new(r#"<button id="b" signalr-send="go"></button>"#);
    assert!(!fx.engine.is_sending_bound(fx.id("b")));
    assert_eq!(fx.connection_count(), 0);
}

#[test]
fn test_missing_library_aborts_without_retry() {
    let doc = Rc::new(Document::from_html(COUNTER_PAGE));
    let host: Rc<dyn Host> = doc.clone();
    let engine = Engine::new(host, Config::default());
    engine.process_node(doc.body());
    let hub = doc.get_element_by_id("hub").unwrap();
    assert!(engine.connection(hub).is_none());

    let network = crate::connection::HubNetwork::new();
    engine.set_connection_factory(crate::connection::DefaultConnectionFactory::new(network));
    assert!(engine.connection(hub).is_none());
    engine.process_node(doc.body());
    assert_eq!(engine.connection_state(hub), Some(ConnectionState::Pending));
}

#[test]
fn test_detached_subtree_is_ignored() {
    let fx = Fixture::new("");
    let nodes = fx
        .doc
        .parse_fragment(r#"<div signalr-connect="/h"><div signalr-subscribe="a"></div></div>"#);
    fx.engine.process_node(nodes[0]);
    assert_eq!(fx.connection_count(), 0);
}

#[test]
fn test_lifecycle_events_drive_the_engine() {
    let doc = Rc::new(Document::from_html(COUNTER_PAGE));
    let connections = Rc::new(RefCell::new(Vec::<Rc<MockConnection>>::new()));
    let created = connections.clone();
    let host: Rc<dyn Host> = doc.clone();
    let engine = Engine::with_factory(
        host,
        Config::default(),
        move |address: &str| -> Result<Rc<dyn HubConnection>, ConnectionError> {
            let mock = Rc::new(MockConnection::new(address));
            created.borrow_mut().push(mock.clone());
            let connection: Rc<dyn HubConnection> = mock;
            Ok(connection)
        },
    );
    engine.listen(&doc);

    doc.dispatch(doc.body(), AFTER_PROCESS_NODE);
    assert_eq!(connections.borrow().len(), 1);

    let hub = doc.get_element_by_id("hub").unwrap();
    doc.dispatch(hub, BEFORE_CLEANUP_ELEMENT);
    assert_eq!(connections.borrow()[0].stops.get(), 1);

    engine.on_event("htmx:somethingElse", hub);
    assert_eq!(LifecycleEvent::from_name(AFTER_PROCESS_NODE), Some(LifecycleEvent::AfterProcessNode));
}

#[test]
fn test_legacy_protocol_subscribes_single_event() {
    let mut config = Config::legacy();
    config.default_settle_delay = 0;
    let fx = Fixture::with_config(
        r#"<div id="hub" signalr-hub="/h"><div id="s" signalr-method="a, b"></div></div>"#,
        config,
    );
    let connection = fx.connection(0);
    assert_eq!(fx.engine.subscriptions(fx.id("s")), vec!["a, b"]);
    assert_eq!(connection.handler_count("a"), 0);
    connection.emit("a, b", json!("whole"));
    assert_eq!(fx.inner("s"), "whole");
}

#[test]
fn test_counter_end_to_end_on_hub_network() {
    let network = crate::connection::HubNetwork::new();
    let hub = network.map_hub("/testhub");
    let doc = Rc::new(Document::from_html(COUNTER_PAGE));
    let host: Rc<dyn Host> = doc.clone();
    let engine = Engine::with_network(host, Config::default(), network.clone());
    engine.process_node(doc.body());

    let owner = doc.get_element_by_id("hub").unwrap();
    assert_eq!(engine.connection_state(owner), Some(ConnectionState::Pending));
    network.run_until_idle();
    assert_eq!(engine.connection_state(owner), Some(ConnectionState::Active));

    hub.broadcast("counter", json!(r#"<div id="counter">1</div>"#));
    network.run_until_idle();
    doc.run_pending_timers();

    let counter = doc.get_element_by_id("counter").unwrap();
    assert_eq!(doc.inner_html(counter), r#"<div id="counter">1</div>"#);
}

#[test]
fn test_queued_send_flushes_when_connected() {
    let network = crate::connection::HubNetwork::new();
    let hub = network.map_hub("/h");
    let received = Rc::new(RefCell::new(Vec::new()));
    let log = received.clone();
    hub.on("go", move |_, payload| log.borrow_mut().push(payload));

    let config = Config {
        queue_sends_until_connected: true,
        ..Config::default()
    };
    let doc = Rc::new(Document::from_html(
        r#"<div signalr-connect="/h"><button id="b" signalr-send="go" hx-vals='{"n": 1}'></button></div>"#,
    ));
    let host: Rc<dyn Host> = doc.clone();
    let engine = Engine::with_network(host, config, network.clone());
    engine.process_node(doc.body());

    doc.dispatch(doc.get_element_by_id("b").unwrap(), "click");
    assert!(received.borrow().is_empty());
    network.run_until_idle();
    assert_eq!(received.borrow().len(), 1);
    assert_eq!(received.borrow()[0]["n"], json!(1));
}
