//! Host-to-script DOM mirror.

use serde::Deserialize;
use serde::Serialize;
use sl_dom::Document;
use sl_dom::NodeData;
use sl_dom::NodeId;

/// Child entry of a mirrored node: either another element or a run of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SnapshotChild {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub key: NodeId,
    pub parent: Option<NodeId>,
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub content: Vec<SnapshotChild>,
}

/// Every connected element of a document, in tree order, plus the document node itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomSnapshot {
    pub root: NodeId,
    pub nodes: Vec<NodeSnapshot>,
}

impl DomSnapshot {
    pub fn capture(document: &Document) -> Self {
        let root = document.root();
        let mut nodes = vec![Self::node(document, root, "#document".to_owned())];
        for node in document.descendants(root) {
            if let Some(element) = document.element(node) {
                nodes.push(Self::node(document, node, element.tag.clone()));
            }
        }
        Self { root, nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(document: &Document, node: NodeId, tag: String) -> NodeSnapshot {
        let content = document
            .children(node)
            .iter()
            .filter_map(|child| match document.data(*child)? {
                NodeData::Element(_) => Some(SnapshotChild::Element(*child)),
                NodeData::Text(text) => Some(SnapshotChild::Text(text.clone())),
                NodeData::Comment(_) | NodeData::Document => None,
            })
            .collect();
        NodeSnapshot {
            key: node,
            parent: document.parent(node),
            tag,
            attrs: document.attrs(node).to_vec(),
            content,
        }
    }
}

/// Maps a script-side key for an element created during execution to the
/// arena node the host allocated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAlias(pub String, pub NodeId);
