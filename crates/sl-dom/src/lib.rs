//! DOM tree data structures.

mod serialize;

pub use serialize::escape_attribute;
pub use serialize::escape_text;
pub use serialize::is_void_element;

/// ID used to address nodes in the DOM arena.
pub type NodeId = usize;

/// Payload stored for each node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
}

/// Element tag name plus attributes in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Category of a recorded mutation, mirroring what a mutation observer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

/// Running mutation counters. `generation` moves on every mutation of any kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationLog {
    pub generation: u64,
    pub child_list: u64,
    pub attributes: u64,
    pub character_data: u64,
}

/// Arena-backed document. Node `0` is always the document node.
///
/// Removed nodes stay in the arena but lose their parent, so ids handed out
/// earlier never dangle; they simply stop being connected.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    log: MutationLog,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            log: MutationLog::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn mutation_log(&self) -> MutationLog {
        self.log
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.create_element_with_attrs(tag, Vec::new())
    }

    pub fn create_element_with_attrs(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push_node(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_owned()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Comment(text.to_owned()))
    }

    pub fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node).map(|entry| &entry.data)
    }

    pub fn element(&self, node: NodeId) -> Option<&ElementData> {
        match self.data(node) {
            Some(NodeData::Element(element)) => Some(element),
            _ => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|element| element.tag.as_str())
    }

    pub fn is_element(&self, node: NodeId, tag: &str) -> bool {
        self.tag_name(node)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|entry| entry.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|entry| entry.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    /// Appends `child` as the last child of `parent`, detaching it first if needed.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || parent == child {
            return;
        }
        if self.is_inclusive_ancestor(child, parent) {
            return;
        }

        self.detach(child);
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        self.record(MutationKind::ChildList);
    }

    /// Inserts `child` as the first child of `parent`.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || parent == child {
            return;
        }
        if self.is_inclusive_ancestor(child, parent) {
            return;
        }

        self.detach(child);
        self.nodes[parent].children.insert(0, child);
        self.nodes[child].parent = Some(parent);
        self.record(MutationKind::ChildList);
    }

    /// Inserts `child` right before `reference`. Falls back to appending when
    /// `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        if parent >= self.nodes.len() || child >= self.nodes.len() || parent == child {
            return;
        }
        if child == reference || self.is_inclusive_ancestor(child, parent) {
            return;
        }

        self.detach(child);
        let siblings = &mut self.nodes[parent].children;
        let index = siblings
            .iter()
            .position(|candidate| *candidate == reference)
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child].parent = Some(parent);
        self.record(MutationKind::ChildList);
    }

    /// Unlinks `node` from its parent. No-op for unattached nodes.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };

        self.nodes[parent].children.retain(|candidate| *candidate != node);
        self.nodes[node].parent = None;
        self.record(MutationKind::ChildList);
    }

    pub fn remove_children(&mut self, parent: NodeId) {
        let Some(entry) = self.nodes.get_mut(parent) else {
            return;
        };
        if entry.children.is_empty() {
            return;
        }

        let children = std::mem::take(&mut entry.children);
        for child in children {
            self.nodes[child].parent = None;
        }
        self.record(MutationKind::ChildList);
    }

    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        self.element(node)
            .map(|element| element.attrs.as_slice())
            .unwrap_or(&[])
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node).and_then(|element| {
            element
                .attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(Node {
            data: NodeData::Element(element),
            ..
        }) = self.nodes.get_mut(node)
        else {
            return;
        };

        let name = name.to_ascii_lowercase();
        match element.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => element.attrs.push((name, value.to_owned())),
        }
        self.record(MutationKind::Attributes);
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> bool {
        let Some(Node {
            data: NodeData::Element(element),
            ..
        }) = self.nodes.get_mut(node)
        else {
            return false;
        };

        let before = element.attrs.len();
        element
            .attrs
            .retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        let removed = element.attrs.len() != before;
        if removed {
            self.record(MutationKind::Attributes);
        }
        removed
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|value| value.split_ascii_whitespace().any(|token| token == class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.element(node).is_none() || self.has_class(node, class) {
            return;
        }

        let next = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_owned(),
        };
        self.set_attr(node, "class", &next);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attr(node, "class") else {
            return;
        };

        let next = existing
            .split_ascii_whitespace()
            .filter(|token| *token != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(node, "class", &next);
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    /// Replaces all children of `node` with one text node (or none for empty text).
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        if let Some(NodeData::Text(existing)) = self.nodes.get_mut(node).map(|entry| &mut entry.data)
        {
            *existing = text.to_owned();
            self.record(MutationKind::CharacterData);
            return;
        }

        self.remove_children(node);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node, text_node);
        }
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == self.root() {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Preorder descendants of `node`, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn elements_by_tag(&self, scope: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|node| self.is_element(*node, tag))
            .collect()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|node| self.attr(*node, "id") == Some(id))
    }

    pub fn first_by_class(&self, class: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|node| self.has_class(*node, class))
    }

    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root())
            .into_iter()
            .find(|node| self.is_element(*node, "html"))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.html_child("head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.html_child("body")
    }

    pub fn title(&self) -> Option<String> {
        let title = self
            .elements_by_tag(self.root(), "title")
            .into_iter()
            .next()?;
        let collapsed = self
            .text_content(title)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    }

    /// Deep-copies `node` from `source` into this arena. The copy is unattached.
    pub fn import_node(&mut self, source: &Document, node: NodeId) -> Option<NodeId> {
        let data = source.data(node)?.clone();
        if matches!(data, NodeData::Document) {
            return None;
        }

        let copy = self.push_node(data);
        for child in source.children(node) {
            if let Some(child_copy) = self.import_node(source, *child) {
                self.append_child(copy, child_copy);
            }
        }
        Some(copy)
    }

    fn html_child(&self, tag: &str) -> Option<NodeId> {
        let html = self.document_element()?;
        self.element_children(html)
            .into_iter()
            .find(|node| self.is_element(*node, tag))
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.data(node) {
            Some(NodeData::Text(text)) => out.push_str(text),
            Some(NodeData::Element(_)) | Some(NodeData::Document) => {
                for child in self.children(node) {
                    self.collect_text(*child, out);
                }
            }
            _ => {}
        }
    }

    fn is_inclusive_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn record(&mut self, kind: MutationKind) {
        self.log.generation = self.log.generation.saturating_add(1);
        match kind {
            MutationKind::ChildList => self.log.child_list = self.log.child_list.saturating_add(1),
            MutationKind::Attributes => self.log.attributes = self.log.attributes.saturating_add(1),
            MutationKind::CharacterData => {
                self.log.character_data = self.log.character_data.saturating_add(1)
            }
        }
    }
}
