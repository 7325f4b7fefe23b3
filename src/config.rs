//! Engine and host configuration.
//!
//! Mirrors the subset of htmx's global config the bindings rely on. Every
//! field has a default, so partial JSON (for example the content of a
//! `<meta name="htmx-config">` element) is accepted.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::Document;
use crate::error::SignalrError;
use crate::host::swap::SwapStyle;

/// Name of the meta element carrying JSON configuration.
pub const META_CONFIG_NAME: &str = "htmx-config";

/// Attribute names of the three binding roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Connection owner; value is the hub address.
    pub connect: String,
    /// Subscriber; value is the event-name list.
    pub subscribe: String,
    /// Sender; value is the hub method to invoke.
    pub send: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            connect: "signalr-connect".to_string(),
            subscribe: "signalr-subscribe".to_string(),
            send: "signalr-send".to_string(),
        }
    }
}

impl AttributeNames {
    /// Deprecated attribute protocol (`signalr-hub` / `signalr-method`).
    pub fn legacy() -> Self {
        Self {
            connect: "signalr-hub".to_string(),
            subscribe: "signalr-method".to_string(),
            send: "signalr-send".to_string(),
        }
    }
}

/// How a subscriber's attribute value is split into event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionParsing {
    /// Comma-separated names, each trimmed.
    #[default]
    Multi,
    /// The whole (trimmed) value is one event name.
    Single,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub default_swap_style: SwapStyle,
    /// Settle delay in milliseconds when `hx-swap` does not specify one.
    pub default_settle_delay: u64,
    pub settling_class: String,
    pub swap_oob_attribute: String,
    pub attributes: AttributeNames,
    pub subscription_parsing: SubscriptionParsing,
    pub automatic_reconnect: bool,
    pub queue_sends_until_connected: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_swap_style: SwapStyle::InnerHtml,
            default_settle_delay: 20,
            settling_class: "htmx-settling".to_string(),
            swap_oob_attribute: "hx-swap-oob".to_string(),
            attributes: AttributeNames::default(),
            subscription_parsing: SubscriptionParsing::Multi,
            automatic_reconnect: true,
            queue_sends_until_connected: false,
        }
    }
}

impl Config {
    /// Configuration for pages written against the deprecated attribute
    /// protocol, where a subscriber names exactly one event.
    pub fn legacy() -> Self {
        Self {
            attributes: AttributeNames::legacy(),
            subscription_parsing: SubscriptionParsing::Single,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SignalrError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SignalrError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SignalrError::io(path.display().to_string(), e))?;
        Self::from_json(&content)
    }

    /// Read the `<meta name="htmx-config" content="...">` element of `doc`,
    /// falling back to the defaults when the page has none.
    pub fn from_document(doc: &Document) -> Result<Self, SignalrError> {
        let selector = format!("meta[name={}]", META_CONFIG_NAME);
        match doc
            .query_selector(doc.root(), &selector)
            .and_then(|meta| doc.attribute(meta, "content"))
        {
            Some(content) => Self::from_json(&content),
            None => Ok(Self::default()),
        }
    }

    pub fn default_settle_delay(&self) -> Duration {
        Duration::from_millis(self.default_settle_delay)
    }

    pub fn is_legacy(&self) -> bool {
        self.attributes == AttributeNames::legacy()
    }
}
