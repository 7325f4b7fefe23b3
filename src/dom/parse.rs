//! HTML fragment parsing into document nodes.
//!
//! Parsing is delegated to `scraper` (html5ever); the resulting tree is
//! copied into the document arena as detached nodes.

use scraper::{ElementRef, Html, Node};

use super::{Document, NodeId};

/// Parse `html` in body context and return the top-level nodes, detached.
pub fn parse_fragment(doc: &Document, html: &str) -> Vec<NodeId> {
    let fragment = Html::parse_fragment(html);
    import_children(doc, fragment.root_element())
}

fn import_children(doc: &Document, element: ElementRef<'_>) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => nodes.push(doc.create_text(&text.text)),
            Node::Comment(comment) => nodes.push(doc.create_comment(&comment.comment)),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    nodes.push(import_element(doc, child_element));
                }
            }
            _ => {}
        }
    }
    nodes
}

fn import_element(doc: &Document, element: ElementRef<'_>) -> NodeId {
    let value = element.value();
    let node = doc.create_element(value.name());
    for (name, attribute) in value.attrs() {
        doc.set_attribute(node, name, attribute);
    }
    for child in import_children(doc, element) {
        doc.append_child(node, child);
    }
    node
}
