use indexmap::IndexSet;

use crate::dom::NodeId;
use crate::host::Host;

/// Elements bearing `attribute` (or `data-attribute`) in the subtree rooted
/// at `root`, `root` included, in document order and without duplicates.
pub fn query_attribute_on_this_or_children(
    host: &dyn Host,
    root: NodeId,
    attribute: &str,
) -> Vec<NodeId> {
    let mut found = IndexSet::new();
    if host.has_attribute(root, attribute) {
        found.insert(root);
    }
    found.extend(host.query_attribute(root, attribute));
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_includes_root_and_data_prefix() {
        let doc = Document::from_html(
            r#"<div id="r" signalr-connect="/hub">
                 <span id="a" signalr-subscribe="x"></span>
                 <p><b id="b" data-signalr-subscribe="y"></b></p>
               </div>"#,
        );
        let root = doc.get_element_by_id("r").unwrap();
        let a = doc.get_element_by_id("a").unwrap();
        let b = doc.get_element_by_id("b").unwrap();
        assert_eq!(
            query_attribute_on_this_or_children(&doc, root, "signalr-connect"),
            vec![root]
        );
        assert_eq!(
            query_attribute_on_this_or_children(&doc, root, "signalr-subscribe"),
            vec![a, b]
        );
    }

    #[test]
    fn test_both_spellings_on_one_element_reported_once() {
        let doc = Document::from_html(
            r#"<div id="r"><i id="i" signalr-send="echo" data-signalr-send="echo"></i></div>"#,
        );
        let root = doc.get_element_by_id("r").unwrap();
        let i = doc.get_element_by_id("i").unwrap();
        assert_eq!(
            query_attribute_on_this_or_children(&doc, root, "signalr-send"),
            vec![i]
        );
        assert!(query_attribute_on_this_or_children(&doc, root, "signalr-connect").is_empty());
    }
}
