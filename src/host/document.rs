//! [`Host`] implementation for the in-memory [`Document`].
//!
//! Attribute semantics follow htmx: `hx-target`, `hx-swap`, `hx-params`,
//! `hx-vals` and `hx-headers` are inherited from the nearest ancestor that
//! declares them, every attribute may also be written with a `data-`
//! prefix, and pushed fragments marked with the out-of-band attribute are
//! swapped into their own targets.

use std::iter;
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};

use super::params::{add_value, merge_parameters, parse_json_object, ParamsFilter};
use super::swap::{SwapSpec, SwapStyle};
use super::trigger::{default_trigger, parse_trigger_specs, TriggerSpec};
use super::{
    Host, InputValues, Parameters, SettleInfo, TriggerHandler, TriggerHandlerId, ValidationError,
};
use crate::dom::{Document, Event, NodeId};

pub const LOAD_EVENT: &str = "htmx:load";
pub const OOB_ERROR_NO_TARGET_EVENT: &str = "htmx:oobErrorNoTarget";

const VALUE_MISSING: &str = "Please fill out this field.";
const PATTERN_MISMATCH: &str = "Please match the requested format.";

impl Document {
    fn data_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.attribute(node, name)
            .or_else(|| self.attribute(node, &format!("data-{}", name)))
    }

    /// Nearest inclusive ancestor declaring `name`, with the declared value.
    fn closest_attribute(&self, node: NodeId, name: &str) -> Option<(NodeId, String)> {
        iter::once(node)
            .chain(self.ancestors(node))
            .find_map(|n| self.data_attribute(n, name).map(|v| (n, v)))
    }

    fn resolve_selector(&self, owner: NodeId, value: &str) -> Option<NodeId> {
        let value = value.trim();
        if value == "this" {
            return Some(owner);
        }
        if let Some(selector) = value.strip_prefix("closest ") {
            return self.closest(owner, selector.trim());
        }
        if let Some(selector) = value.strip_prefix("find ") {
            return Document::query_selector(self, owner, selector.trim());
        }
        Document::query_selector(self, self.root(), value)
    }

    fn insert_nodes(
        &self,
        parent: NodeId,
        reference: Option<NodeId>,
        nodes: &[NodeId],
        settle: &mut SettleInfo,
    ) {
        for &node in nodes {
            self.insert_before(parent, node, reference);
            if self.is_element(node) {
                settle.inserted.push(node);
                settle.tasks.push(Box::new(move |host: &dyn Host| {
                    host.trigger_event(node, LOAD_EVENT, Value::Null);
                }));
            }
        }
    }

    fn remove_with_cleanup(&self, node: NodeId, before_remove: &mut dyn FnMut(NodeId)) {
        if self.is_element(node) {
            before_remove(node);
            for descendant in Document::descendant_elements(self, node) {
                before_remove(descendant);
            }
        }
        Document::remove(self, node);
    }

    fn swap_with_style(
        &self,
        style: SwapStyle,
        target: NodeId,
        nodes: &[NodeId],
        settle: &mut SettleInfo,
        before_remove: &mut dyn FnMut(NodeId),
    ) {
        match style {
            SwapStyle::InnerHtml => {
                for child in self.children(target) {
                    self.remove_with_cleanup(child, before_remove);
                }
                self.insert_nodes(target, None, nodes, settle);
            }
            SwapStyle::OuterHtml => {
                let Some(parent) = Document::parent(self, target) else {
                    tracing::warn!(%target, "outerHTML swap on a detached target");
                    return;
                };
                let next = self.next_sibling(target);
                self.remove_with_cleanup(target, before_remove);
                let first_inserted = settle.inserted.len();
                self.insert_nodes(parent, next, nodes, settle);
                settle.elts.retain(|&e| e != target);
                settle
                    .elts
                    .extend(settle.inserted[first_inserted..].iter().copied());
            }
            SwapStyle::BeforeBegin => match Document::parent(self, target) {
                Some(parent) => self.insert_nodes(parent, Some(target), nodes, settle),
                None => tracing::warn!(%target, "beforebegin swap on a detached target"),
            },
            SwapStyle::AfterBegin => {
                let first = self.children(target).first().copied();
                self.insert_nodes(target, first, nodes, settle);
            }
            SwapStyle::BeforeEnd => self.insert_nodes(target, None, nodes, settle),
            SwapStyle::AfterEnd => match Document::parent(self, target) {
                Some(parent) => {
                    let next = self.next_sibling(target);
                    self.insert_nodes(parent, next, nodes, settle);
                }
                None => tracing::warn!(%target, "afterend swap on a detached target"),
            },
            SwapStyle::Delete => self.remove_with_cleanup(target, before_remove),
            SwapStyle::None => {}
        }
    }

    fn swap_oob(
        &self,
        oob_value: &str,
        element: NodeId,
        settle: &mut SettleInfo,
        before_remove: &mut dyn FnMut(NodeId),
    ) {
        let oob_attribute = self.config().swap_oob_attribute.clone();
        let value = oob_value.trim();
        let (style, selector) = if value.is_empty() || value == "true" {
            (SwapStyle::OuterHtml, None)
        } else {
            let (style, selector) = match value.split_once(':') {
                Some((style, selector)) => (style, Some(selector.trim().to_string())),
                None => (value, None),
            };
            let style = style.parse().unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                SwapStyle::OuterHtml
            });
            (style, selector)
        };
        let selector = match selector.or_else(|| self.id(element).map(|id| format!("#{}", id))) {
            Some(selector) => selector,
            None => {
                tracing::warn!(%element, "out-of-band fragment has neither a selector nor an id");
                return;
            }
        };

        self.remove_attribute(element, &oob_attribute);
        self.remove_attribute(element, &format!("data-{}", oob_attribute));

        let targets = self.query_selector_all(self.root(), &selector);
        if targets.is_empty() {
            tracing::debug!(selector, "no target for out-of-band fragment");
            Host::trigger_event(
                self,
                self.body(),
                OOB_ERROR_NO_TARGET_EVENT,
                json!({ "selector": selector }),
            );
            return;
        }

        // Non-outerHTML styles swap the fragment's children, not the fragment.
        let content = if style == SwapStyle::OuterHtml {
            vec![element]
        } else {
            self.children(element)
        };
        let copies: Vec<Vec<NodeId>> = targets
            .iter()
            .skip(1)
            .map(|_| content.iter().map(|&n| self.clone_subtree(n)).collect())
            .collect();

        for (oob_target, nodes) in targets.into_iter().zip(iter::once(content).chain(copies)) {
            settle.elts.push(oob_target);
            self.swap_with_style(style, oob_target, &nodes, settle, before_remove);
        }
    }

    /// Submitted value of a form control, `None` when it does not submit.
    fn control_value(&self, node: NodeId) -> Option<String> {
        let tag = self.tag_name(node)?;
        match tag.as_str() {
            "input" => {
                let kind = self
                    .attribute(node, "type")
                    .unwrap_or_else(|| "text".to_string())
                    .to_ascii_lowercase();
                match kind.as_str() {
                    "checkbox" | "radio" => Document::has_attribute(self, node, "checked")
                        .then(|| self.attribute(node, "value").unwrap_or_else(|| "on".to_string())),
                    "submit" | "button" | "reset" | "image" | "file" => None,
                    _ => Some(self.attribute(node, "value").unwrap_or_default()),
                }
            }
            "textarea" => Some(self.text_content(node)),
            "select" => {
                let options = self.query_selector_all(node, "option");
                let chosen = options
                    .iter()
                    .copied()
                    .find(|&o| Document::has_attribute(self, o, "selected"))
                    .or_else(|| options.first().copied())?;
                Some(
                    self.attribute(chosen, "value")
                        .unwrap_or_else(|| self.text_content(chosen)),
                )
            }
            _ => None,
        }
    }

    fn is_form_control(&self, node: NodeId) -> bool {
        matches!(
            self.tag_name(node).as_deref(),
            Some("input" | "select" | "textarea")
        )
    }

    fn collect_control(&self, node: NodeId, values: &mut Parameters) {
        if !self.is_form_control(node) || Document::has_attribute(self, node, "disabled") {
            return;
        }
        let Some(name) = self.attribute(node, "name").filter(|n| !n.is_empty()) else {
            return;
        };
        if let Some(value) = self.control_value(node) {
            add_value(values, &name, Value::String(value));
        }
    }

    fn validate_control(&self, node: NodeId) -> Option<ValidationError> {
        if !self.is_form_control(node) || Document::has_attribute(self, node, "disabled") {
            return None;
        }
        let name = self.attribute(node, "name").unwrap_or_default();
        let value = self.control_value(node).unwrap_or_default();
        let message = if Document::has_attribute(self, node, "required") && value.is_empty() {
            VALUE_MISSING
        } else if let Some(pattern) = self.attribute(node, "pattern").filter(|_| !value.is_empty()) {
            match Regex::new(&format!("^(?:{})$", pattern)) {
                Ok(re) if re.is_match(&value) => return None,
                Ok(_) => PATTERN_MISMATCH,
                Err(e) => {
                    tracing::warn!(pattern, error = %e, "invalid pattern attribute");
                    return None;
                }
            }
        } else {
            return None;
        };
        Some(ValidationError {
            node,
            name,
            message: message.to_string(),
        })
    }

    fn collect_form(&self, form: NodeId, result: &mut InputValues, validate: bool) {
        let validate = validate && !Document::has_attribute(self, form, "novalidate");
        for control in Document::descendant_elements(self, form) {
            self.collect_control(control, &mut result.values);
            if validate {
                result.errors.extend(self.validate_control(control));
            }
        }
    }
}

impl Host for Document {
    fn body_contains(&self, node: NodeId) -> bool {
        Document::body_contains(self, node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Document::parent(self, node)
    }

    fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        Document::descendant_elements(self, node)
    }

    fn remove(&self, node: NodeId) {
        Document::remove(self, node)
    }

    fn attribute_value(&self, node: NodeId, name: &str) -> Option<String> {
        self.data_attribute(node, name)
    }

    fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        Document::has_attribute(self, node, name)
            || Document::has_attribute(self, node, &format!("data-{}", name))
    }

    fn query_attribute(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.query_selector_all(root, &format!("[{}], [data-{}]", name, name))
    }

    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        Document::query_selector(self, self.root(), selector)
    }

    fn inner_html(&self, node: NodeId) -> String {
        Document::inner_html(self, node)
    }

    fn add_class(&self, node: NodeId, class: &str) {
        Document::add_class(self, node, class)
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        Document::remove_class(self, node, class)
    }

    fn target(&self, node: NodeId) -> Option<NodeId> {
        match self.closest_attribute(node, "hx-target") {
            Some((owner, value)) => self.resolve_selector(owner, &value),
            None => Some(node),
        }
    }

    fn swap_specification(&self, node: NodeId) -> SwapSpec {
        let config = self.config();
        match self.closest_attribute(node, "hx-swap") {
            Some((_, value)) => SwapSpec::parse(
                &value,
                config.default_swap_style,
                config.default_settle_delay(),
            ),
            None => SwapSpec::new(config.default_swap_style, config.default_settle_delay()),
        }
    }

    fn swap(
        &self,
        spec: &SwapSpec,
        target: NodeId,
        content: &str,
        settle: &mut SettleInfo,
        before_remove: &mut dyn FnMut(NodeId),
    ) {
        let oob_attribute = self.config().swap_oob_attribute.clone();
        let mut main = Vec::new();
        for node in self.parse_fragment(content) {
            match self
                .data_attribute(node, &oob_attribute)
                .filter(|_| self.is_element(node))
            {
                Some(value) => self.swap_oob(&value, node, settle, before_remove),
                None => main.push(node),
            }
        }
        self.swap_with_style(spec.style, target, &main, settle, before_remove);
    }

    fn trigger_specs(&self, node: NodeId) -> Vec<TriggerSpec> {
        let specs = self
            .data_attribute(node, "hx-trigger")
            .map(|value| parse_trigger_specs(&value))
            .unwrap_or_default();
        if specs.is_empty() {
            vec![default_trigger(&self.tag_name(node).unwrap_or_default())]
        } else {
            specs
        }
    }

    fn add_trigger_handler(
        &self,
        node: NodeId,
        spec: &TriggerSpec,
        handler: TriggerHandler,
    ) -> TriggerHandlerId {
        let callback = move |event: &mut Event| handler(node, event);
        if spec.once {
            self.add_event_listener_once(node, &spec.event, callback)
        } else {
            self.add_event_listener(node, &spec.event, callback)
        }
    }

    fn remove_trigger_handler(&self, id: TriggerHandlerId) {
        self.remove_event_listener(id);
    }

    fn input_values(&self, node: NodeId, verb: &str) -> InputValues {
        let mut result = InputValues::default();
        if self.tag_name(node).as_deref() == Some("form") {
            self.collect_form(node, &mut result, true);
            return result;
        }
        // Non-GET requests from inside a form also carry the form's values.
        if !verb.eq_ignore_ascii_case("get") {
            if let Some(form) = self.closest(node, "form") {
                self.collect_form(form, &mut result, false);
            }
        }
        if !result.values.contains_key(&self.attribute(node, "name").unwrap_or_default()) {
            self.collect_control(node, &mut result.values);
        }
        result
    }

    fn expression_vars(&self, node: NodeId) -> Parameters {
        let chain: Vec<NodeId> = iter::once(node).chain(self.ancestors(node)).collect();
        chain
            .into_iter()
            .rev()
            .filter_map(|n| self.data_attribute(n, "hx-vals"))
            .filter_map(|raw| parse_json_object(&raw, "hx-vals"))
            .fold(Parameters::new(), merge_parameters)
    }

    fn filter_values(&self, params: Parameters, node: NodeId) -> Parameters {
        match self.closest_attribute(node, "hx-params") {
            Some((_, value)) => ParamsFilter::parse(&value).apply(params),
            None => params,
        }
    }

    fn headers(&self, node: NodeId, target: NodeId) -> Parameters {
        let mut headers = Parameters::new();
        headers.insert("HX-Request".to_string(), json!("true"));
        if let Some(id) = self.id(node) {
            headers.insert("HX-Trigger".to_string(), json!(id));
        }
        if let Some(name) = self.attribute(node, "name") {
            headers.insert("HX-Trigger-Name".to_string(), json!(name));
        }
        if let Some(id) = self.id(target) {
            headers.insert("HX-Target".to_string(), json!(id));
        }
        headers.insert("HX-Current-URL".to_string(), json!(self.url()));

        let chain: Vec<NodeId> = iter::once(node).chain(self.ancestors(node)).collect();
        chain
            .into_iter()
            .rev()
            .filter_map(|n| self.data_attribute(n, "hx-headers"))
            .filter_map(|raw| parse_json_object(&raw, "hx-headers"))
            .fold(headers, merge_parameters)
    }

    fn should_cancel(&self, event: &Event, node: NodeId) -> bool {
        let tag = self.tag_name(node).unwrap_or_default();
        match event.name() {
            "submit" => tag == "form",
            "click" => match tag.as_str() {
                "a" => self
                    .attribute(node, "href")
                    .is_some_and(|href| href == "#" || !href.starts_with('#')),
                "input" => {
                    self.attribute(node, "type").as_deref() == Some("submit")
                        && self.closest(node, "form").is_some()
                }
                "button" => {
                    self.attribute(node, "type").as_deref() != Some("button")
                        && self.closest(node, "form").is_some()
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn trigger_event(&self, node: NodeId, name: &str, detail: Value) -> Event {
        let mut event = Event::new(name, node, detail);
        self.dispatch_event(&mut event);
        event
    }

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        Document::set_timeout(self, delay, task)
    }
}
