//! The loading overlay shown while the page is assembled.

use crate::config::LoaderConfig;
use sl_css::InlineStyle;
use sl_dom::Document;
use sl_dom::NodeId;
use std::time::Duration;
use tracing::debug;

const FALLBACK_STYLE: &str = "position:fixed;inset:0;z-index:2147483647;display:flex;\
align-items:center;justify-content:center;background:#fff;color:#333;font:16px/1.4 sans-serif";

/// The one overlay of a page. Removing it consumes the value.
#[derive(Debug, PartialEq, Eq)]
pub enum Overlay {
    /// Skeleton markup the shell shipped with.
    Reused(NodeId),
    /// Built by the loader because the shell had none.
    Fallback(NodeId),
}

impl Overlay {
    /// Shows the overlay under the document element, where replacing the
    /// body cannot reach it. `None` only for a document without `<html>`.
    pub fn show(doc: &mut Document, config: &LoaderConfig) -> Option<Self> {
        let root = doc.document_element()?;
        let class = config.overlay_class();
        let overlay = match doc.first_by_class(&class) {
            Some(node) => {
                debug!(node, "reusing skeleton overlay");
                doc.append_child(root, node);
                Self::Reused(node)
            }
            None => {
                let node = doc.create_element_with_attrs(
                    "div",
                    vec![
                        ("id".to_owned(), config.fallback_overlay_id()),
                        ("role".to_owned(), "status".to_owned()),
                        ("aria-live".to_owned(), "polite".to_owned()),
                        ("style".to_owned(), FALLBACK_STYLE.to_owned()),
                    ],
                );
                let message = doc.create_element_with_attrs(
                    "div",
                    vec![("class".to_owned(), message_class(config))],
                );
                doc.set_text_content(message, "Loading\u{2026}");
                doc.append_child(node, message);
                doc.append_child(root, node);
                debug!(node, "built fallback overlay");
                Self::Fallback(node)
            }
        };
        Some(overlay)
    }

    pub fn node(&self) -> NodeId {
        match self {
            Self::Reused(node) | Self::Fallback(node) => *node,
        }
    }

    /// Puts `message` in the overlay's message slot, creating the slot
    /// if the overlay has none, and marks the overlay as an alert.
    pub fn show_error(&self, doc: &mut Document, config: &LoaderConfig, message: &str) {
        let node = self.node();
        let class = message_class(config);
        let slot = doc
            .descendants(node)
            .into_iter()
            .find(|candidate| doc.has_class(*candidate, &class));
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let slot = doc.create_element_with_attrs("div", vec![("class".to_owned(), class)]);
                doc.append_child(node, slot);
                slot
            }
        };
        doc.set_text_content(slot, message);
        doc.set_attr(node, "role", "alert");
        doc.add_class(node, &format!("{}-overlay--error", config.namespace));
        show_style(doc, node, |style| {
            style.remove("opacity");
            style.remove("display");
        });
    }

    /// Starts the opacity transition to fully transparent.
    pub fn fade_out(&self, doc: &mut Document, duration: Duration) {
        let transition = format!("opacity {}ms ease", duration.as_millis());
        show_style(doc, self.node(), |style| {
            style.set("transition", &transition);
            style.set("opacity", "0");
            style.set("pointer-events", "none");
        });
    }

    pub fn remove(self, doc: &mut Document) {
        doc.detach(self.node());
    }
}

fn message_class(config: &LoaderConfig) -> String {
    format!("{}-overlay-message", config.namespace)
}

fn show_style(doc: &mut Document, node: NodeId, edit: impl FnOnce(&mut InlineStyle)) {
    let mut style = InlineStyle::parse(doc.attr(node, "style").unwrap_or_default());
    edit(&mut style);
    if style.is_empty() {
        doc.remove_attr(node, "style");
    } else {
        doc.set_attr(node, "style", &style.to_attribute_value());
    }
}
