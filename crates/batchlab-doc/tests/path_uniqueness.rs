use std::collections::BTreeSet;
use std::sync::Arc;

use batchlab_doc::{DocumentTree, NodeRef, XmlBackend};
use proptest::prelude::*;

fn render(shape: &[(u8, u8)]) -> String {
    let tags = ["a", "b", "c"];
    let mut out = String::from("<root>");
    for (idx, (tag, children)) in shape.iter().enumerate() {
        let tag = tags[*tag as usize % tags.len()];
        out.push_str(&format!("<{tag} n=\"{idx}\">"));
        for child in 0..*children {
            let inner = tags[child as usize % tags.len()];
            out.push_str(&format!("<{inner} k=\"{child}\"/>"));
        }
        out.push_str(&format!("</{tag}>"));
    }
    out.push_str("</root>");
    out
}

proptest! {
    #[test]
    fn canonical_paths_are_unique_and_resolve_to_one_node(
        shape in prop::collection::vec((0u8..3, 0u8..4), 0..8)
    ) {
        let source = render(&shape);
        let tree = DocumentTree::parse(&source, Arc::new(XmlBackend)).expect("parse");
        let nodes = tree.nodes();
        let paths: BTreeSet<_> = nodes.iter().map(|node| node.path.clone()).collect();
        prop_assert_eq!(paths.len(), nodes.len());

        for node in &nodes {
            let resolved = tree.resolve(&node.path).expect("resolve");
            prop_assert_eq!(resolved.len(), 1);
            prop_assert_eq!(&resolved[0].path, &node.path);
            match (node.node, resolved[0].node) {
                (NodeRef::Element(a), NodeRef::Element(b)) => prop_assert!(std::ptr::eq(a, b)),
                (NodeRef::Attribute { attr: a, .. }, NodeRef::Attribute { attr: b, .. }) => {
                    prop_assert!(std::ptr::eq(a, b))
                }
                _ => prop_assert!(false, "node kind changed for {}", node.path),
            }
        }
        prop_assert_eq!(tree.into_string().expect("write"), source);
    }
}
