//! In-memory DOM used as the default extension host.
//!
//! The document is an arena of nodes addressed by [`NodeId`]. Removed nodes
//! stay in the arena (detached) so identifiers captured by handlers remain
//! valid and can be checked for liveness. All state lives behind `RefCell`s
//! and no borrow is held while listeners or timers run, so callbacks may
//! freely mutate the document.

pub mod parse;
pub mod selector;
mod serialize;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use selector::Selector;

/// Stable identifier of a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Tag and attributes of an element node.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }
}

/// A DOM event dispatched through [`Document::dispatch_event`].
///
/// Events bubble from the target to the document root. Listeners may
/// rewrite `detail`, which is how cancellable notifications hand modified
/// payloads back to the code that raised them.
#[derive(Debug, Clone)]
pub struct Event {
    name: String,
    target: NodeId,
    current_target: NodeId,
    pub detail: Value,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    pub fn new(name: impl Into<String>, target: NodeId, detail: Value) -> Self {
        Self {
            name: name.into(),
            target,
            current_target: target,
            detail,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

pub type Listener = Rc<dyn Fn(&mut Event)>;
pub type ListenerId = u64;

struct ListenerEntry {
    id: ListenerId,
    node: NodeId,
    event: String,
    once: bool,
    callback: Listener,
}

struct Timer {
    due: Duration,
    seq: u64,
    task: Box<dyn FnOnce()>,
}

/// Single-threaded in-memory document.
pub struct Document {
    nodes: RefCell<Vec<NodeData>>,
    root: NodeId,
    body: NodeId,
    url: String,
    config: Config,
    listeners: RefCell<Vec<ListenerEntry>>,
    next_listener: Cell<ListenerId>,
    timers: RefCell<Vec<Timer>>,
    next_timer: Cell<u64>,
    now: Cell<Duration>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an empty document (`#document > html > body`).
    pub fn with_config(config: Config) -> Self {
        let doc = Self {
            nodes: RefCell::new(vec![NodeData::new(NodeKind::Document)]),
            root: NodeId(0),
            body: NodeId(0),
            url: "http://localhost/".to_string(),
            config,
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
            timers: RefCell::new(Vec::new()),
            next_timer: Cell::new(0),
            now: Cell::new(Duration::ZERO),
        };
        let html = doc.create_element("html");
        doc.append_child(doc.root, html);
        let body = doc.create_element("body");
        doc.append_child(html, body);
        Self { body, ..doc }
    }

    /// Create a document whose body holds the parsed `html`.
    pub fn from_html(html: &str) -> Self {
        Self::from_html_with_config(html, Config::default())
    }

    pub fn from_html_with_config(html: &str, config: Config) -> Self {
        let doc = Self::with_config(config);
        doc.append_html(doc.body, html);
        doc
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    // ---- tree construction ----

    fn push_node(&self, kind: NodeKind) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(NodeData::new(kind));
        NodeId(nodes.len() - 1)
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.push_node(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: IndexMap::new(),
        }))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.push_node(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.push_node(NodeKind::Comment(text.to_string()))
    }

    /// Parse `html` into detached nodes owned by this document.
    pub fn parse_fragment(&self, html: &str) -> Vec<NodeId> {
        parse::parse_fragment(self, html)
    }

    /// Parse `html` and append the resulting nodes to `parent`.
    pub fn append_html(&self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let nodes = self.parse_fragment(html);
        for &node in &nodes {
            self.append_child(parent, node);
        }
        nodes
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference` (or at the end).
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if parent == child || self.contains(child, parent) {
            tracing::warn!(%parent, %child, "refusing to insert a node into its own subtree");
            return;
        }
        self.remove(child);
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent_data) = nodes.get_mut(parent.0) else {
            return;
        };
        let index = reference
            .and_then(|r| parent_data.children.iter().position(|&c| c == r))
            .unwrap_or(parent_data.children.len());
        parent_data.children.insert(index, child);
        if let Some(child_data) = nodes.get_mut(child.0) {
            child_data.parent = Some(parent);
        }
    }

    /// Detach `node` from its parent. The node and its subtree stay usable.
    pub fn remove(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(parent) = nodes.get(node.0).and_then(|n| n.parent) else {
            return;
        };
        if let Some(parent_data) = nodes.get_mut(parent.0) {
            parent_data.children.retain(|&c| c != node);
        }
        if let Some(data) = nodes.get_mut(node.0) {
            data.parent = None;
        }
    }

    /// Deep-copy `node` into a new detached subtree.
    pub fn clone_subtree(&self, node: NodeId) -> NodeId {
        let (kind, children) = {
            let nodes = self.nodes.borrow();
            match nodes.get(node.0) {
                Some(data) => (data.kind.clone(), data.children.clone()),
                None => return node,
            }
        };
        let copy = self.push_node(kind);
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    // ---- tree reads ----

    fn read<R>(&self, node: NodeId, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.nodes.borrow().get(node.0).map(f)
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.read(node, |n| n.kind.clone())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.read(node, |n| n.parent).flatten()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.read(node, |n| n.children.clone()).unwrap_or_default()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&c| c == node)?;
        siblings.get(index + 1).copied()
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.read(node, |n| n.element().is_some()).unwrap_or(false)
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.read(node, |n| n.element().map(|e| e.tag.clone()))
            .flatten()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Whether `node` is attached under the document body.
    pub fn body_contains(&self, node: NodeId) -> bool {
        self.contains(self.body, node)
    }

    /// Ancestors of `node`, nearest first, excluding `node`.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.parent(node);
        while let Some(n) = current {
            result.push(n);
            current = self.parent(n);
        }
        result
    }

    /// Element descendants of `node` in document order, excluding `node`.
    pub fn descendant_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            if self.is_element(n) {
                result.push(n);
            }
            stack.extend(self.children(n).into_iter().rev());
        }
        result
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(text)) => out.push_str(&text),
            Some(NodeKind::Element(_)) | Some(NodeKind::Document) => {
                for child in self.children(node) {
                    self.collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            serialize::write_node(self, child, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        serialize::write_node(self, node, &mut out);
        out
    }

    // ---- attributes ----

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read(node, |n| n.element().and_then(|e| e.attributes.get(name).cloned()))
            .flatten()
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.read(node, |n| n.element().is_some_and(|e| e.attributes.contains_key(name)))
            .unwrap_or(false)
    }

    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        self.read(node, |n| {
            n.element()
                .map(|e| {
                    e.attributes
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default()
        })
        .unwrap_or_default()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(element) = self.nodes.borrow_mut().get_mut(node.0).and_then(|n| n.element_mut()) {
            element
                .attributes
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(element) = self.nodes.borrow_mut().get_mut(node.0).and_then(|n| n.element_mut()) {
            element.attributes.shift_remove(name);
        }
    }

    pub fn id(&self, node: NodeId) -> Option<String> {
        self.attribute(node, "id").filter(|id| !id.is_empty())
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.classes(node).iter().any(|c| c == class)
    }

    pub fn add_class(&self, node: NodeId, class: &str) {
        if !self.is_element(node) || self.has_class(node, class) {
            return;
        }
        let mut classes = self.classes(node);
        classes.push(class.to_string());
        self.set_attribute(node, "class", &classes.join(" "));
    }

    pub fn remove_class(&self, node: NodeId, class: &str) {
        if !self.has_class(node, class) {
            return;
        }
        let classes: Vec<String> = self
            .classes(node)
            .into_iter()
            .filter(|c| c != class)
            .collect();
        if classes.is_empty() {
            self.remove_attribute(node, "class");
        } else {
            self.set_attribute(node, "class", &classes.join(" "));
        }
    }

    // ---- queries ----

    /// Descendants of `root` matching `selector`, in document order.
    pub fn query_selector_all(&self, root: NodeId, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            tracing::warn!(selector, "invalid selector");
            return Vec::new();
        };
        self.descendant_elements(root)
            .into_iter()
            .filter(|&n| selector.matches(self, n))
            .collect()
    }

    pub fn query_selector(&self, root: NodeId, selector: &str) -> Option<NodeId> {
        self.query_selector_all(root, selector).into_iter().next()
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendant_elements(self.root)
            .into_iter()
            .find(|&n| self.attribute(n, "id").as_deref() == Some(id))
    }

    /// Nearest inclusive ancestor of `node` matching `selector`.
    pub fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            tracing::warn!(selector, "invalid selector");
            return None;
        };
        std::iter::once(node)
            .chain(self.ancestors(node))
            .find(|&n| self.is_element(n) && selector.matches(self, n))
    }

    // ---- events ----

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event: &str,
        callback: impl Fn(&mut Event) + 'static,
    ) -> ListenerId {
        self.register_listener(node, event, false, Rc::new(callback))
    }

    pub fn add_event_listener_once(
        &self,
        node: NodeId,
        event: &str,
        callback: impl Fn(&mut Event) + 'static,
    ) -> ListenerId {
        self.register_listener(node, event, true, Rc::new(callback))
    }

    fn register_listener(&self, node: NodeId, event: &str, once: bool, callback: Listener) -> ListenerId {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push(ListenerEntry {
            id,
            node,
            event: event.to_string(),
            once,
            callback,
        });
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|l| l.id != id);
    }

    /// Number of listeners currently attached anywhere in the document.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Dispatch `event` from its target up to the document root.
    ///
    /// Returns `false` if a listener called `prevent_default`.
    pub fn dispatch_event(&self, event: &mut Event) -> bool {
        let path: Vec<NodeId> = std::iter::once(event.target)
            .chain(self.ancestors(event.target))
            .collect();
        for node in path {
            let matching: Vec<(ListenerId, bool, Listener)> = self
                .listeners
                .borrow()
                .iter()
                .filter(|l| l.node == node && l.event == event.name)
                .map(|l| (l.id, l.once, l.callback.clone()))
                .collect();
            event.current_target = node;
            for (id, once, callback) in matching {
                if once {
                    self.remove_event_listener(id);
                }
                callback(event);
            }
            if event.propagation_stopped {
                break;
            }
        }
        !event.default_prevented
    }

    /// Dispatch a detail-less event named `name` at `node`.
    pub fn dispatch(&self, node: NodeId, name: &str) -> Event {
        let mut event = Event::new(name, node, Value::Null);
        self.dispatch_event(&mut event);
        event
    }

    // ---- timers ----

    /// Virtual time elapsed since the document was created.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        let seq = self.next_timer.get();
        self.next_timer.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now.get() + delay,
            seq,
            task,
        });
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Advance virtual time by `by`, running every timer that falls due.
    pub fn advance(&self, by: Duration) {
        let deadline = self.now.get() + by;
        while let Some(timer) = self.take_due_timer(deadline) {
            self.now.set(timer.due.max(self.now.get()));
            (timer.task)();
        }
        self.now.set(deadline);
    }

    /// Run timers until none are left, advancing time as needed.
    pub fn run_pending_timers(&self) {
        loop {
            let next_due = self.timers.borrow().iter().map(|t| t.due).min();
            match next_due {
                Some(due) => self.advance(due.saturating_sub(self.now.get())),
                None => break,
            }
        }
    }

    fn take_due_timer(&self, deadline: Duration) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= deadline)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(i, _)| i)?;
        Some(timers.remove(index))
    }
}
