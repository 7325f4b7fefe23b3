//! The demonstration hub: a periodic broadcaster and an echo method.

use std::rc::Rc;

use serde_json::{json, Value};

use crate::connection::{Hub, HubNetwork};

pub const TEST_HUB_ADDRESS: &str = "/testhub";

/// Map the demo hub on `network`.
///
/// `echo` replies to the caller only, with the message wrapped in
/// `#echo` markup plus an out-of-band `#echo-oob-data` fragment carrying a
/// value from `next_value`.
pub fn map_test_hub(network: &HubNetwork, next_value: impl Fn() -> u32 + 'static) -> Rc<Hub> {
    let hub = network.map_hub(TEST_HUB_ADDRESS);
    hub.on("echo", move |ctx, request| {
        let message = request
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        tracing::debug!(caller = %ctx.caller_id(), message, "echo");
        ctx.reply("echo", json!(echo_markup(message, next_value())));
    });
    hub
}

pub fn echo_markup(message: &str, value: u32) -> String {
    format!(
        r#"<div id="echo">{}</div><div hx-swap-oob="true" id="echo-oob-data">{}</div>"#,
        message, value
    )
}

/// One broadcast round: a markup `counter` event and a structured `json`
/// event, both carrying `value`.
pub fn broadcast_tick(hub: &Hub, value: u32) {
    hub.broadcast("counter", json!(format!(r#"<div id="counter">{}</div>"#, value)));
    hub.broadcast("json", json!({ "name": "test", "id": value }));
}
