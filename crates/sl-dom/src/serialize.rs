use crate::Document;
use crate::NodeData;
use crate::NodeId;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(tag))
}

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}

pub fn escape_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
    out
}

impl Document {
    /// Serializes the whole document, prefixed with an HTML5 doctype.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        for child in self.children(self.root()) {
            self.write_node(*child, false, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, false, &mut out);
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let raw = self
            .tag_name(node)
            .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
        let mut out = String::new();
        for child in self.children(node) {
            self.write_node(*child, raw, &mut out);
        }
        out
    }

    fn write_node(&self, node: NodeId, raw_text: bool, out: &mut String) {
        match self.data(node) {
            Some(NodeData::Element(element)) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');

                if is_void_element(&element.tag) {
                    return;
                }

                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for child in self.children(node) {
                    self.write_node(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
            Some(NodeData::Text(text)) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    out.push_str(&escape_text(text));
                }
            }
            Some(NodeData::Comment(text)) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Some(NodeData::Document) | None => {}
        }
    }
}
