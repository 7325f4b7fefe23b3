//! Client-side mustache templates as a response transform.
//!
//! A subscriber (or one of its ancestors) names a `<template>` element with
//! `mustache-template="id"`; inbound JSON is rendered through that
//! template's markup. Only `{{key}}`, `{{a.b}}` and unescaped `{{{key}}}`
//! interpolation are supported.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::binding::ResponseTransform;
use crate::dom::NodeId;
use crate::host::Host;

pub const TEMPLATE_ATTRIBUTE: &str = "mustache-template";

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\{)?\s*([\w.]+)\s*\}?\}\}").expect("mustache tag regex is valid")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheTemplates;

impl ResponseTransform for MustacheTemplates {
    fn transform_response(&self, text: String, node: NodeId, host: &dyn Host) -> String {
        let Some(template_id) = closest_template(host, node) else {
            return text;
        };
        let Some(template) = host.query_selector(&format!("#{}", template_id)) else {
            tracing::warn!(template = %template_id, "mustache template not found");
            return text;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => render(&host.inner_html(template), &data),
            Err(e) => {
                tracing::warn!(%node, error = %e, "mustache data is not JSON");
                text
            }
        }
    }
}

fn closest_template(host: &dyn Host, node: NodeId) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        if let Some(id) = host.attribute_value(n, TEMPLATE_ATTRIBUTE) {
            return Some(id);
        }
        current = host.parent(n);
    }
    None
}

/// Substitute `{{path}}` tags in `template` with values from `data`.
pub fn render(template: &str, data: &Value) -> String {
    TAG_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let raw = caps.get(1).is_some();
            let value = caps[2]
                .split('.')
                .try_fold(data, |value, key| value.get(key));
            let text = match value {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            if raw {
                text
            } else {
                escape_html(&text)
            }
        })
        .into_owned()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
