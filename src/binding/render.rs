//! Render pipeline: inbound message to swapped, settled markup.

use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::EngineInner;
use crate::dom::NodeId;
use crate::host::{Host, SettleInfo};

pub const MESSAGE_EVENT: &str = "htmx:signalr:message";
pub const BEFORE_SETTLE_EVENT: &str = "htmx:beforeSettle";
pub const AFTER_SETTLE_EVENT: &str = "htmx:afterSettle";

/// Detail of the `htmx:signalr:message` notification. Listeners may
/// rewrite `message` and `target` before the swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message: Value,
    pub method: String,
    pub target: NodeId,
}

/// A hook in the response-transform chain.
pub trait ResponseTransform {
    fn transform_response(&self, text: String, node: NodeId, host: &dyn Host) -> String;
}

impl<F> ResponseTransform for F
where
    F: Fn(String, NodeId, &dyn Host) -> String,
{
    fn transform_response(&self, text: String, node: NodeId, host: &dyn Host) -> String {
        self(text, node, host)
    }
}

pub(crate) fn render_message(
    inner: &Rc<EngineInner>,
    subscriber: NodeId,
    event: &str,
    message: Value,
) {
    let host = inner.host.clone();
    let Some(target) = host.target(subscriber) else {
        tracing::warn!(%subscriber, event, "no swap target for message");
        return;
    };
    let envelope = MessageEnvelope {
        message,
        method: event.to_string(),
        target,
    };
    let detail = match serde_json::to_value(&envelope) {
        Ok(detail) => detail,
        Err(e) => {
            tracing::warn!(%subscriber, error = %e, "unserializable message envelope");
            return;
        }
    };

    let notification = host.trigger_event(subscriber, MESSAGE_EVENT, detail);
    if notification.is_default_prevented() {
        tracing::debug!(%subscriber, event, "message cancelled by listener");
        return;
    }
    let envelope = serde_json::from_value::<MessageEnvelope>(notification.detail).unwrap_or_else(|e| {
        tracing::warn!(%subscriber, error = %e, "listener left an invalid message envelope");
        envelope
    });

    let text = match envelope.message {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let transforms = inner.transforms.borrow().clone();
    let text = transforms
        .iter()
        .fold(text, |text, t| t.transform_response(text, subscriber, host.as_ref()));

    let spec = host.swap_specification(subscriber);
    // Settling is tracked on the subscriber even when the swap lands elsewhere.
    let mut settle = SettleInfo::new(subscriber);
    host.swap(&spec, envelope.target, &text, &mut settle, &mut |removed| {
        inner.cleanup_element(removed)
    });
    for inserted in settle.inserted.clone() {
        inner.process_node(inserted);
    }

    let class = inner.config.settling_class.clone();
    for &elt in &settle.elts {
        host.add_class(elt, &class);
        host.trigger_event(elt, BEFORE_SETTLE_EVENT, json!({ "elt": elt }));
    }

    if spec.settle_delay.is_zero() {
        finish_settle(host.as_ref(), settle, &class);
    } else {
        let weak: Weak<dyn Host> = Rc::downgrade(&host);
        host.set_timeout(
            spec.settle_delay,
            Box::new(move || {
                if let Some(host) = weak.upgrade() {
                    finish_settle(host.as_ref(), settle, &class);
                }
            }),
        );
    }
}

fn finish_settle(host: &dyn Host, settle: SettleInfo, class: &str) {
    for task in settle.tasks {
        task(host);
    }
    for elt in settle.elts {
        host.remove_class(elt, class);
        host.trigger_event(elt, AFTER_SETTLE_EVENT, json!({ "elt": elt }));
    }
}
