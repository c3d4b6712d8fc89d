//! Staging of fetched HTML: parse, pull out scripts, route assets through the proxy,
//! then move the result into the live document.

use crate::keys::is_passthrough_reference;
use crate::keys::resolve_key;
use crate::keys::site_url;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_dom::Document;
use sl_dom::NodeId;
use sl_html::parse_document;

/// `rel` tokens whose `href` names a fetchable asset.
const ASSET_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "shortcut",
    "apple-touch-icon",
    "preload",
    "prefetch",
    "modulepreload",
    "manifest",
];

const JS_MIME_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "application/ecmascript",
    "text/ecmascript",
    "text/jscript",
    "module",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptBody {
    /// Proxy-resolved (or passthrough) `src`.
    External(String),
    Inline(String),
}

/// A `<script>` pulled out of fetched HTML, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub body: ScriptBody,
    pub script_type: Option<String>,
    pub no_module: bool,
    pub referrer_policy: Option<String>,
    pub cross_origin: Option<String>,
}

impl ScriptDescriptor {
    /// Classic and module scripts execute; data blocks such as
    /// `application/ld+json` do not.
    pub fn is_executable(&self) -> bool {
        let Some(script_type) = self.script_type.as_deref() else {
            return true;
        };
        let essence = script_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.is_empty() || JS_MIME_TYPES.contains(&essence.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        match &self.body {
            ScriptBody::External(src) => Some(src),
            ScriptBody::Inline(_) => None,
        }
    }

    /// Attributes to put on the recreated element, in a stable order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut attrs = Vec::new();
        if let ScriptBody::External(src) = &self.body {
            attrs.push(("src".to_owned(), src.clone()));
        }
        if let Some(value) = &self.script_type {
            attrs.push(("type".to_owned(), value.clone()));
        }
        if self.no_module {
            attrs.push(("nomodule".to_owned(), String::new()));
        }
        if let Some(value) = &self.referrer_policy {
            attrs.push(("referrerpolicy".to_owned(), value.clone()));
        }
        if let Some(value) = &self.cross_origin {
            attrs.push(("crossorigin".to_owned(), value.clone()));
        }
        attrs
    }
}

/// Parses fetched HTML into a detached staging document.
pub fn parse(html: &str) -> Document {
    parse_document(html)
}

/// Removes every head and body script from `doc`, returning descriptors in
/// document order (head first).
pub fn extract_scripts(doc: &mut Document, key: &str, origin: &str) -> Vec<ScriptDescriptor> {
    let scopes = [doc.head(), doc.body()];
    let nodes = scopes
        .into_iter()
        .flatten()
        .flat_map(|scope| doc.elements_by_tag(scope, "script"))
        .collect::<Vec<NodeId>>();

    let mut scripts = Vec::with_capacity(nodes.len());
    for node in nodes {
        let body = match doc.attr(node, "src") {
            Some(src) => ScriptBody::External(proxied_reference(src, key, origin)),
            None => ScriptBody::Inline(doc.text_content(node)),
        };
        scripts.push(ScriptDescriptor {
            body,
            script_type: doc.attr(node, "type").map(str::to_owned),
            no_module: doc.has_attr(node, "nomodule"),
            referrer_policy: doc.attr(node, "referrerpolicy").map(str::to_owned),
            cross_origin: doc.attr(node, "crossorigin").map(str::to_owned),
        });
        doc.detach(node);
    }
    scripts
}

/// Rewrites `src` on every element and `href` on asset links. Returns how many
/// attributes changed.
pub fn rewrite_references(doc: &mut Document, key: &str, origin: &str) -> usize {
    let mut rewritten = 0_usize;
    for node in doc.descendants(doc.root()) {
        if let Some(src) = doc.attr(node, "src").map(str::to_owned) {
            rewritten = rewritten.saturating_add(rewrite_attr(doc, node, "src", &src, key, origin));
        }
        if doc.is_element(node, "link") && is_asset_link(doc, node) {
            if let Some(href) = doc.attr(node, "href").map(str::to_owned) {
                rewritten = rewritten.saturating_add(rewrite_attr(doc, node, "href", &href, key, origin));
            }
        }
    }
    rewritten
}

/// Hrefs of `rel=stylesheet` links, in document order.
pub fn stylesheet_hrefs(doc: &Document) -> Vec<String> {
    doc.elements_by_tag(doc.root(), "link")
        .into_iter()
        .filter(|node| rel_tokens(doc, *node).any(|token| token == "stylesheet"))
        .filter_map(|node| doc.attr(node, "href").map(str::to_owned))
        .collect()
}

/// Replaces the live head and body children with copies of the staged ones
/// and carries over `lang` from the staged `<html>`.
pub fn swap_into(live: &mut Document, staged: &Document) -> LoaderResult<()> {
    let (Some(live_head), Some(live_body)) = (live.head(), live.body()) else {
        return Err(LoaderError::new(
            "loader.swap.missing_sections",
            "live document has no head or body to swap into",
        ));
    };

    for (source, target) in [(staged.head(), live_head), (staged.body(), live_body)] {
        live.remove_children(target);
        let Some(source) = source else {
            continue;
        };
        for child in staged.children(source) {
            if let Some(copy) = live.import_node(staged, *child) {
                live.append_child(target, copy);
            }
        }
    }

    if let (Some(lang), Some(html)) = (
        staged.document_element().and_then(|html| staged.attr(html, "lang")),
        live.document_element(),
    ) {
        live.set_attr(html, "lang", lang);
    }
    Ok(())
}

fn proxied_reference(reference: &str, key: &str, origin: &str) -> String {
    if is_passthrough_reference(reference) {
        reference.to_owned()
    } else {
        site_url(origin, &resolve_key(key, reference))
    }
}

fn rewrite_attr(doc: &mut Document, node: NodeId, name: &str, value: &str, key: &str, origin: &str) -> usize {
    if is_passthrough_reference(value) {
        return 0;
    }
    doc.set_attr(node, name, &proxied_reference(value, key, origin));
    1
}

fn rel_tokens(doc: &Document, node: NodeId) -> impl Iterator<Item = String> + '_ {
    doc.attr(node, "rel")
        .unwrap_or_default()
        .split_ascii_whitespace()
        .map(str::to_ascii_lowercase)
}

fn is_asset_link(doc: &Document, node: NodeId) -> bool {
    rel_tokens(doc, node).any(|token| ASSET_LINK_RELS.contains(&token.as_str()))
}

#[cfg(test)]
mod tests {
    use super::ScriptBody;
    use super::ScriptDescriptor;
    use super::extract_scripts;
    use super::parse;
    use super::rewrite_references;
    use super::stylesheet_hrefs;
    use super::swap_into;
    use sl_dom::Document;

    const ORIGIN: &str = "http://proxy.test";

    fn stage(html: &str, key: &str, origin: &str) -> (Document, Vec<ScriptDescriptor>) {
        let mut doc = parse(html);
        let scripts = extract_scripts(&mut doc, key, origin);
        rewrite_references(&mut doc, key, origin);
        (doc, scripts)
    }

    #[test]
    fn extracts_scripts_head_first_and_detaches_them() {
        let mut doc = parse(
            "<html><head><script src=\"lib/a.js\" type=\"module\" crossorigin=\"anonymous\"></script></head>\
             <body><p>x</p><script>run()</script><script nomodule referrerpolicy=\"no-referrer\" src=\"https://cdn.test/b.js\"></script></body></html>",
        );
        let scripts = extract_scripts(&mut doc, "docs/page.html", ORIGIN);
        assert_eq!(scripts.len(), 3);
        assert_eq!(
            scripts[0].body,
            ScriptBody::External("http://proxy.test/site/docs/lib/a.js".to_owned())
        );
        assert_eq!(scripts[0].script_type.as_deref(), Some("module"));
        assert_eq!(scripts[0].cross_origin.as_deref(), Some("anonymous"));
        assert_eq!(scripts[1].body, ScriptBody::Inline("run()".to_owned()));
        assert!(scripts[2].no_module);
        assert_eq!(scripts[2].src(), Some("https://cdn.test/b.js"));
        assert_eq!(scripts[2].referrer_policy.as_deref(), Some("no-referrer"));
        assert!(doc.elements_by_tag(doc.root(), "script").is_empty());
    }

    #[test]
    fn classifies_executable_types() {
        let mut descriptor = ScriptDescriptor {
            body: ScriptBody::Inline("{}".to_owned()),
            script_type: None,
            no_module: false,
            referrer_policy: None,
            cross_origin: None,
        };
        assert!(descriptor.is_executable());
        descriptor.script_type = Some("text/javascript; charset=utf-8".to_owned());
        assert!(descriptor.is_executable());
        descriptor.script_type = Some("Module".to_owned());
        assert!(descriptor.is_executable());
        descriptor.script_type = Some("application/ld+json".to_owned());
        assert!(!descriptor.is_executable());
    }

    #[test]
    fn rewrites_assets_but_not_anchors_or_passthrough() {
        let mut doc = parse(
            "<head><link rel=\"stylesheet\" href=\"css/site.css\"><link rel=\"canonical\" href=\"page.html\">\
             <link rel=\"Shortcut Icon\" href=\"/favicon.ico\"></head>\
             <body><img src=\"../img/a.png\"><img src=\"data:image/gif;base64,R0\"><a href=\"other.html\">o</a>\
             <iframe src=\"//embed.test/x\"></iframe></body>",
        );
        let changed = rewrite_references(&mut doc, "docs/page.html", ORIGIN);
        assert_eq!(changed, 3);
        let html = doc.to_html();
        assert!(html.contains("href=\"http://proxy.test/site/docs/css/site.css\""));
        assert!(html.contains("href=\"page.html\""));
        assert!(html.contains("href=\"http://proxy.test/site/favicon.ico\""));
        assert!(html.contains("src=\"http://proxy.test/site/img/a.png\""));
        assert!(html.contains("src=\"data:image/gif;base64,R0\""));
        assert!(html.contains("href=\"other.html\""));
        assert!(html.contains("src=\"//embed.test/x\""));
        assert_eq!(stylesheet_hrefs(&doc), vec!["http://proxy.test/site/docs/css/site.css"]);
    }

    #[test]
    fn staging_is_deterministic_and_idempotent() {
        let html = "<!DOCTYPE html><html lang=\"en\"><head><title>T</title><link rel=\"stylesheet\" href=\"a.css\">\
                    <script src=\"app.js\"></script></head><body><img src=\"i.png\"><p>Hi &amp; bye</p></body></html>";
        let (first, first_scripts) = stage(html, "index.html", ORIGIN);
        let (second, second_scripts) = stage(html, "index.html", ORIGIN);
        assert_eq!(first.to_html(), second.to_html());
        assert_eq!(first_scripts, second_scripts);

        let (again, again_scripts) = stage(&first.to_html(), "index.html", ORIGIN);
        assert_eq!(again.to_html(), first.to_html());
        assert!(again_scripts.is_empty());
    }

    #[test]
    fn swap_replaces_sections_and_copies_lang() {
        let mut live = parse(
            "<html><head><style>.acfh-skeleton{}</style></head><body class=\"shell\"><div class=\"acfh-skeleton\"></div></body></html>",
        );
        let staged = parse("<html lang=\"fr\"><head><title>Bonjour</title></head><body><main>contenu</main></body></html>");

        if let Err(error) = swap_into(&mut live, &staged) {
            panic!("{error}");
        }
        let (Some(head), Some(body), Some(html)) = (live.head(), live.body(), live.document_element()) else {
            panic!("live document lost its sections");
        };
        assert_eq!(live.title().as_deref(), Some("Bonjour"));
        assert!(live.elements_by_tag(head, "style").is_empty());
        assert_eq!(live.text_content(body), "contenu");
        assert_eq!(live.attr(body, "class"), Some("shell"));
        assert_eq!(live.attr(html, "lang"), Some("fr"));
    }
}
