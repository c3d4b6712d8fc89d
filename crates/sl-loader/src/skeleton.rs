//! Skeleton style carry-over and the post-swap stylesheet wait.

use crate::fetcher::ContentFetcher;
use crate::fetcher::Fetch;
use sl_css::CssParser;
use sl_dom::Document;
use sl_dom::NodeId;
use std::time::Duration;
use tracing::debug;
use tracing::warn;

/// Skeleton rules lifted from the shell's own `<style>` elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkeletonStyles {
    rules: Vec<String>,
}

impl SkeletonStyles {
    /// Collects every top-level rule mentioning one of `markers`.
    pub fn capture(doc: &Document, markers: &[String]) -> Self {
        let parser = CssParser;
        let rules = doc
            .elements_by_tag(doc.root(), "style")
            .into_iter()
            .flat_map(|node| {
                let sheet = parser.parse(&doc.text_content(node));
                sheet
                    .rules_mentioning(markers)
                    .map(|rule| rule.css_text())
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends `<style id=..>` with the captured rules to the head.
    pub fn reinject(&self, doc: &mut Document, style_id: &str) -> Option<NodeId> {
        if self.rules.is_empty() {
            return None;
        }
        let head = doc.head()?;
        let style = doc.create_element_with_attrs("style", vec![("id".to_owned(), style_id.to_owned())]);
        let text = doc.create_text(&self.rules.join("\n"));
        doc.append_child(style, text);
        doc.append_child(head, style);
        Some(style)
    }
}

/// Outcome of waiting for one rewritten stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetReport {
    pub href: String,
    /// Style rules in the sheet, or `None` when it failed to load in time.
    pub style_rules: Option<usize>,
}

/// Loads each stylesheet in turn, all together bounded by `timeout`.
/// Failures are logged and never propagate.
pub async fn wait_for_stylesheets<F: Fetch + ?Sized>(
    fetcher: &ContentFetcher<'_, F>,
    hrefs: &[String],
    timeout: Duration,
) -> Vec<StylesheetReport> {
    let mut reports = hrefs
        .iter()
        .map(|href| StylesheetReport {
            href: href.clone(),
            style_rules: None,
        })
        .collect::<Vec<_>>();
    if hrefs.is_empty() {
        return reports;
    }

    let loading = async {
        for report in reports.iter_mut() {
            match fetcher.fetch_text(&report.href, timeout).await {
                Ok(css) => {
                    let count = CssParser.parse(&css).style_rule_count();
                    debug!(href = %report.href, rules = count, "stylesheet loaded");
                    report.style_rules = Some(count);
                }
                Err(error) => warn!(href = %report.href, %error, "stylesheet failed to load"),
            }
        }
    };
    if tokio::time::timeout(timeout, loading).await.is_err() {
        warn!(timeout_ms = timeout.as_millis() as u64, "stylesheet wait timed out");
    }
    reports
}
