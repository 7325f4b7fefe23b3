//! The DOM-extension host capability set consumed by the binding engine.
//!
//! The engine never touches a document directly; everything it needs from
//! the page goes through [`Host`]. [`Document`](crate::dom::Document)
//! implements it with htmx-compatible attribute semantics.

pub mod document;
pub mod params;
pub mod swap;
pub mod trigger;

use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::dom::{Event, NodeId};
pub use swap::{SwapSpec, SwapStyle};
pub use trigger::TriggerSpec;

/// Form-encoded parameters and expression variables.
pub type Parameters = serde_json::Map<String, Value>;

/// Callback attached to a trigger; receives the bound element and the event.
pub type TriggerHandler = Rc<dyn Fn(NodeId, &mut Event)>;

/// Identifies an attached trigger handler so it can be detached again.
pub type TriggerHandlerId = u64;

/// Deferred work run when a swap settles.
pub type SettleTask = Box<dyn FnOnce(&dyn Host)>;

/// Bookkeeping for one swap: elements to settle, deferred tasks and the
/// top-level elements the swap inserted.
pub struct SettleInfo {
    pub tasks: Vec<SettleTask>,
    pub elts: Vec<NodeId>,
    pub inserted: Vec<NodeId>,
}

impl SettleInfo {
    pub fn new(target: NodeId) -> Self {
        Self {
            tasks: Vec::new(),
            elts: vec![target],
            inserted: Vec::new(),
        }
    }
}

/// A field that failed validation during input extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub node: NodeId,
    pub name: String,
    pub message: String,
}

/// Result of extracting input values from an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputValues {
    pub values: Parameters,
    pub errors: Vec<ValidationError>,
}

pub trait Host {
    // ---- tree ----

    /// Whether `node` is attached to the document body.
    fn body_contains(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Element descendants of `node` in document order, excluding `node`.
    fn descendant_elements(&self, node: NodeId) -> Vec<NodeId>;

    /// Detach `node` from the document.
    fn remove(&self, node: NodeId);

    // ---- attributes and queries ----

    /// Value of `name`, falling back to `data-name`.
    fn attribute_value(&self, node: NodeId, name: &str) -> Option<String>;

    /// Whether `node` carries `name` or `data-name`.
    fn has_attribute(&self, node: NodeId, name: &str) -> bool;

    /// Descendants of `root` (excluding `root`) carrying `name` or `data-name`.
    fn query_attribute(&self, root: NodeId, name: &str) -> Vec<NodeId>;

    fn query_selector(&self, selector: &str) -> Option<NodeId>;

    fn inner_html(&self, node: NodeId) -> String;

    fn add_class(&self, node: NodeId, class: &str);

    fn remove_class(&self, node: NodeId, class: &str);

    // ---- swapping ----

    /// Element that content for `node` is swapped into.
    fn target(&self, node: NodeId) -> Option<NodeId>;

    fn swap_specification(&self, node: NodeId) -> SwapSpec;

    /// Parse `content` and swap it into `target`, applying out-of-band
    /// fragments. `before_remove` is called for every element about to leave
    /// the document.
    fn swap(
        &self,
        spec: &SwapSpec,
        target: NodeId,
        content: &str,
        settle: &mut SettleInfo,
        before_remove: &mut dyn FnMut(NodeId),
    );

    // ---- triggers and parameters ----

    fn trigger_specs(&self, node: NodeId) -> Vec<TriggerSpec>;

    fn add_trigger_handler(
        &self,
        node: NodeId,
        spec: &TriggerSpec,
        handler: TriggerHandler,
    ) -> TriggerHandlerId;

    /// Detach a handler; unknown or already fired one-shot ids are ignored.
    fn remove_trigger_handler(&self, id: TriggerHandlerId);

    fn input_values(&self, node: NodeId, verb: &str) -> InputValues;

    fn expression_vars(&self, node: NodeId) -> Parameters;

    fn filter_values(&self, params: Parameters, node: NodeId) -> Parameters;

    fn headers(&self, node: NodeId, target: NodeId) -> Parameters;

    /// Whether the default action of `event` should be suppressed.
    fn should_cancel(&self, event: &Event, node: NodeId) -> bool;

    // ---- notifications and timers ----

    /// Dispatch a notification and return it after listeners ran; listeners
    /// may cancel it or rewrite its detail.
    fn trigger_event(&self, node: NodeId, name: &str, detail: Value) -> Event;

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>);
}
