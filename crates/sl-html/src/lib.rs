//! HTML tokenization and tree construction.

mod entities;
mod tokenizer;

use sl_dom::Document;
use sl_dom::NodeId;
use sl_dom::is_void_element;
use tokenizer::Token;
use tokenizer::tokenize;

pub use entities::decode_entities;

/// Parses raw HTML into a DOM document.
///
/// The resulting document always carries `html`, `head` and `body`
/// elements, whatever the input looked like.
#[derive(Debug, Default)]
pub struct HtmlParser;

impl HtmlParser {
    pub fn parse(&self, input: &str) -> Document {
        TreeBuilder::new().build(tokenize(input))
    }
}

/// Convenience wrapper around [`HtmlParser::parse`].
pub fn parse_document(input: &str) -> Document {
    HtmlParser.parse(input)
}

const HEAD_CONTENT_TAGS: &[&str] = &[
    "base", "link", "meta", "noscript", "script", "style", "template", "title",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertionMode {
    InHead,
    AfterHead,
    InBody,
}

struct TreeBuilder {
    doc: Document,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    mode: InsertionMode,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    fn new() -> Self {
        let mut doc = Document::new();
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        let root = doc.root();
        doc.append_child(root, html);
        doc.append_child(html, head);
        doc.append_child(html, body);

        Self {
            doc,
            html,
            head,
            body,
            mode: InsertionMode::InHead,
            stack: vec![head],
        }
    }

    fn build(mut self, tokens: Vec<Token>) -> Document {
        for token in tokens {
            match token {
                Token::Start {
                    name,
                    attrs,
                    self_closing,
                } => self.start_tag(name, attrs, self_closing),
                Token::End { name } => self.end_tag(&name),
                Token::Text(text) => self.text(&text),
                Token::RawText(text) => self.append_text(&text),
                Token::Comment(text) => {
                    let comment = self.doc.create_comment(&text);
                    let parent = self.current();
                    self.doc.append_child(parent, comment);
                }
            }
        }

        self.doc
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(self.body)
    }

    fn start_tag(&mut self, name: String, attrs: Vec<(String, String)>, self_closing: bool) {
        match name.as_str() {
            "html" => {
                self.merge_attrs(self.html, attrs);
                return;
            }
            "head" => {
                if self.mode != InsertionMode::InBody {
                    self.merge_attrs(self.head, attrs);
                }
                return;
            }
            "body" => {
                self.enter_body();
                self.merge_attrs(self.body, attrs);
                return;
            }
            _ => {}
        }

        let in_head_section = self.mode != InsertionMode::InBody;
        let at_head_level = self.current() == self.head;
        if in_head_section && at_head_level && !HEAD_CONTENT_TAGS.contains(&name.as_str()) {
            self.enter_body();
        } else if self.mode == InsertionMode::AfterHead && !at_head_level {
            self.stack = vec![self.head];
        }

        let element = self.doc.create_element_with_attrs(&name, attrs);
        let parent = self.current();
        self.doc.append_child(parent, element);

        if !self_closing && !is_void_element(&name) {
            self.stack.push(element);
        }
    }

    fn end_tag(&mut self, name: &str) {
        match name {
            "head" => {
                if self.mode == InsertionMode::InHead {
                    self.stack = vec![self.head];
                    self.mode = InsertionMode::AfterHead;
                }
                return;
            }
            "html" | "body" => return,
            _ => {}
        }

        let base = if self.mode == InsertionMode::InBody {
            self.body
        } else {
            self.head
        };

        let Some(position) = self
            .stack
            .iter()
            .rposition(|node| self.doc.is_element(*node, name))
        else {
            return;
        };
        if self.stack[position] == base {
            return;
        }

        self.stack.truncate(position);
        if self.stack.is_empty() {
            self.stack.push(base);
        }
    }

    fn text(&mut self, text: &str) {
        let whitespace_only = text.chars().all(char::is_whitespace);
        if self.mode != InsertionMode::InBody {
            if whitespace_only && self.current() == self.head {
                return;
            }
            if !whitespace_only && self.current() == self.head {
                self.enter_body();
            }
        }
        self.append_text(text);
    }

    fn append_text(&mut self, text: &str) {
        let parent = self.current();
        let node = self.doc.create_text(text);
        self.doc.append_child(parent, node);
    }

    fn enter_body(&mut self) {
        if self.mode != InsertionMode::InBody {
            self.mode = InsertionMode::InBody;
            self.stack = vec![self.body];
        }
    }

    fn merge_attrs(&mut self, node: NodeId, attrs: Vec<(String, String)>) {
        for (name, value) in attrs {
            if !self.doc.has_attr(node, &name) {
                self.doc.set_attr(node, &name, &value);
            }
        }
    }
}
