//! CSS selector matching over the document arena.
//!
//! Selectors are parsed with the same grammar `scraper` uses (its `Simple`
//! selector implementation) and matched by the `selectors` engine through
//! an [`Element`] view of a `(Document, NodeId)` pair. Combinators, attribute
//! operators and the tree-structural pseudo-classes (`:not`, `:is`,
//! `:first-child`, `:empty`) are supported; state pseudo-classes never match.

use std::fmt;

use cssparser::ParserInput;
use scraper::selector::{CssLocalName, CssString, NonTSPseudoClass, Parser, PseudoElement, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{
    self, ElementSelectorFlags, MatchingContext, MatchingForInvalidation, MatchingMode,
    NeedsSelectorFlags, QuirksMode, SelectorCaches,
};
use selectors::parser::{ParseRelative, SelectorImpl, SelectorList};
use selectors::{Element, OpaqueElement};

use super::{Document, NodeId};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A parsed selector list.
#[derive(Debug, Clone)]
pub struct Selector {
    list: SelectorList<Simple>,
}

impl Selector {
    pub fn parse(source: &str) -> Option<Self> {
        let mut input = ParserInput::new(source);
        let mut parser = cssparser::Parser::new(&mut input);
        SelectorList::parse(&Parser, &mut parser, ParseRelative::No)
            .ok()
            .map(|list| Self { list })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if !doc.is_element(node) {
            return false;
        }
        let element = ElementHandle { doc, node };
        let mut caches = SelectorCaches::default();
        let mut context = MatchingContext::new(
            MatchingMode::Normal,
            None,
            &mut caches,
            QuirksMode::NoQuirks,
            NeedsSelectorFlags::No,
            MatchingForInvalidation::No,
        );
        self.list
            .slice()
            .iter()
            .any(|selector| matching::matches_selector(selector, 0, None, &element, &mut context))
    }
}

/// An element node seen through the `selectors` matching interface.
#[derive(Clone, Copy)]
struct ElementHandle<'a> {
    doc: &'a Document,
    node: NodeId,
}

impl fmt::Debug for ElementHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementHandle({})", self.node)
    }
}

impl<'a> ElementHandle<'a> {
    fn wrap(&self, node: NodeId) -> Option<Self> {
        self.doc.is_element(node).then_some(Self { doc: self.doc, node })
    }

    /// Element siblings before and after this node, nearest first.
    fn siblings(&self) -> (Vec<NodeId>, Vec<NodeId>) {
        let Some(parent) = self.doc.parent(self.node) else {
            return (Vec::new(), Vec::new());
        };
        let siblings = self.doc.element_children(parent);
        match siblings.iter().position(|&n| n == self.node) {
            Some(index) => {
                let mut before = siblings[..index].to_vec();
                before.reverse();
                (before, siblings[index + 1..].to_vec())
            }
            None => (Vec::new(), Vec::new()),
        }
    }
}

impl Element for ElementHandle<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        let nodes = self.doc.nodes.borrow();
        match nodes.get(self.node.index()) {
            Some(data) => OpaqueElement::new(data),
            None => OpaqueElement::new(self.doc),
        }
    }

    fn parent_element(&self) -> Option<Self> {
        self.doc.parent(self.node).and_then(|p| self.wrap(p))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.siblings().0.first().and_then(|&n| self.wrap(n))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.siblings().1.first().and_then(|&n| self.wrap(n))
    }

    fn first_element_child(&self) -> Option<Self> {
        self.doc
            .element_children(self.node)
            .first()
            .and_then(|&n| self.wrap(n))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &CssLocalName) -> bool {
        let name: &str = &name.0;
        self.doc.tag_name(self.node).as_deref() == Some(name)
    }

    fn has_namespace(&self, ns: &<Simple as SelectorImpl>::BorrowedNamespaceUrl) -> bool {
        let ns: &str = ns;
        ns.is_empty() || ns == HTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.doc.tag_name(self.node) == other.doc.tag_name(other.node)
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&<Simple as SelectorImpl>::NamespaceUrl>,
        local_name: &CssLocalName,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        if let NamespaceConstraint::Specific(url) = ns {
            let url: &str = url;
            if !url.is_empty() {
                return false;
            }
        }
        let name: &str = &local_name.0;
        self.doc
            .attribute(self.node, name)
            .is_some_and(|value| operation.eval_str(&value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        match *pc {}
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<'_, Simple>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.doc.tag_name(self.node).as_deref(), Some("a" | "area"))
            && self.doc.has_attribute(self.node, "href")
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.doc
            .id(self.node)
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.doc
            .classes(self.node)
            .iter()
            .any(|class| case_sensitivity.eq(name.0.as_bytes(), class.as_bytes()))
    }

    fn has_custom_state(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssLocalName) -> Option<CssLocalName> {
        None
    }

    fn is_part(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.doc.children(self.node).into_iter().all(|child| {
            match self.doc.kind(child) {
                Some(super::NodeKind::Element(_)) => false,
                Some(super::NodeKind::Text(text)) => text.is_empty(),
                _ => true,
            }
        })
    }

    fn is_root(&self) -> bool {
        self.doc.parent(self.node) == Some(self.doc.root())
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}
