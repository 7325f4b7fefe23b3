//! Send binder: element triggers to hub invocations.

use std::rc::Rc;

use serde_json::{json, Value};

use super::registry::find_connection_owner;
use super::EngineInner;
use crate::dom::{Event, NodeId};
use crate::host::params::merge_parameters;
use crate::host::{InputValues, TriggerHandlerId};

pub const VALIDATION_HALTED_EVENT: &str = "htmx:validation:halted";
pub const BEFORE_SEND_EVENT: &str = "htmx:signalr:beforeSend";
pub const AFTER_SEND_EVENT: &str = "htmx:signalr:afterSend";

/// Reserved parameter key carrying the request headers.
pub const HEADERS_KEY: &str = "HEADERS";

pub(crate) fn ensure_sending(inner: &Rc<EngineInner>, sender: NodeId) {
    let host = inner.host.clone();
    if !host.body_contains(sender) || !inner.require_library(sender) {
        return;
    }
    if find_connection_owner(inner, sender).is_none() {
        tracing::debug!(%sender, "no connection owner above sender");
        return;
    }
    {
        let mut registry = inner.registry.borrow_mut();
        let record = registry.record_mut(sender);
        if record.sending_bound {
            tracing::debug!(%sender, "send triggers already bound");
            return;
        }
        record.sending_bound = true;
    }

    let handlers: Vec<TriggerHandlerId> = host
        .trigger_specs(sender)
        .iter()
        .map(|spec| {
            let engine = Rc::downgrade(inner);
            host.add_trigger_handler(
                sender,
                spec,
                Rc::new(move |node: NodeId, event: &mut Event| {
                    if let Some(inner) = engine.upgrade() {
                        send_from(&inner, node, event);
                    }
                }),
            )
        })
        .collect();
    inner
        .registry
        .borrow_mut()
        .record_mut(sender)
        .trigger_handlers
        .extend(handlers);
}

fn send_from(inner: &EngineInner, sender: NodeId, event: &mut Event) {
    let host = inner.host.as_ref();
    let Some((owner, connection)) = find_connection_owner(inner, sender) else {
        return;
    };
    let Some(method) = host.attribute_value(sender, &inner.config.attributes.send) else {
        return;
    };
    // The connection owner stands in for the request target.
    let headers = host.headers(sender, owner);

    let InputValues { values, errors } = host.input_values(sender, "post");
    let all_parameters = merge_parameters(values, host.expression_vars(sender));
    let mut filtered = host.filter_values(all_parameters.clone(), sender);
    filtered.insert(HEADERS_KEY.to_string(), Value::Object(headers.clone()));

    if !errors.is_empty() {
        tracing::debug!(%sender, errors = errors.len(), "send halted by validation");
        host.trigger_event(sender, VALIDATION_HALTED_EVENT, json!({ "errors": errors }));
        return;
    }

    let before = host.trigger_event(
        sender,
        BEFORE_SEND_EVENT,
        json!({
            "method": method,
            "headers": headers,
            "allParameters": all_parameters,
            "filteredParameters": filtered,
        }),
    );
    if before.is_default_prevented() {
        tracing::debug!(%sender, method, "send cancelled by listener");
        return;
    }
    // Listeners may rewrite the outgoing parameters.
    let payload = match before.detail.get("filteredParameters") {
        Some(Value::Object(rewritten)) => Value::Object(rewritten.clone()),
        _ => Value::Object(filtered),
    };

    connection.send(&method, payload.clone());

    if host.should_cancel(event, sender) {
        event.prevent_default();
    }
    host.trigger_event(
        sender,
        AFTER_SEND_EVENT,
        json!({ "method": method, "message": payload }),
    );
}
