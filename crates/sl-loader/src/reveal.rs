//! Overlay and body visibility across the bootstrap phases.

use crate::config::LoaderConfig;
use crate::overlay::Overlay;
use crate::page::LivePage;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_css::InlineStyle;
use sl_dom::Document;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RevealPhase {
    Initial,
    Loading,
    Rendering,
    AwaitingApp,
    Settling,
    Revealed,
}

/// Keeps the body hidden behind the overlay until the page is presentable.
#[derive(Debug)]
pub struct RevealCoordinator<'a> {
    config: &'a LoaderConfig,
    overlay: Option<Overlay>,
    trace: Vec<RevealPhase>,
}

impl<'a> RevealCoordinator<'a> {
    /// Shows the overlay and hides the body.
    pub fn begin(doc: &mut Document, config: &'a LoaderConfig) -> Self {
        let overlay = Overlay::show(doc, config);
        if overlay.is_none() {
            warn!("document has no root element; continuing without an overlay");
        }
        hide_body(doc);
        Self {
            config,
            overlay,
            trace: vec![RevealPhase::Initial],
        }
    }

    pub fn phase(&self) -> RevealPhase {
        self.trace.last().copied().unwrap_or(RevealPhase::Initial)
    }

    pub fn trace(&self) -> &[RevealPhase] {
        &self.trace
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    /// Moves forward to `phase`. Phases never go back.
    pub fn enter(&mut self, phase: RevealPhase) {
        if phase <= self.phase() {
            return;
        }
        info!(?phase, "bootstrap phase");
        self.trace.push(phase);
    }

    /// Terminal fetch failure: the error stays on screen over a hidden body.
    pub fn fail_fetch(&mut self, doc: &mut Document, key: &str, error: &LoaderError) {
        warn!(%key, %error, "page could not be loaded");
        self.show_error(doc, &format!("Could not load \u{201c}{key}\u{201d}: {}", error.message));
    }

    /// Unexpected failure after loading: show the error and the page as it is.
    pub fn crash(&mut self, doc: &mut Document, error: &LoaderError) {
        warn!(%error, "bootstrap crashed; revealing page as-is");
        self.show_error(doc, &format!("Something went wrong: {}", error.message));
        show_body(doc);
    }

    fn show_error(&self, doc: &mut Document, message: &str) {
        if let Some(overlay) = &self.overlay {
            overlay.show_error(doc, self.config, message);
        }
    }

    /// Waits for paint, un-hides the body, then fades out and removes the overlay.
    pub async fn reveal(&mut self, page: &mut LivePage) -> LoaderResult<()> {
        let config = self.config;
        let timings = &config.timings;
        let frames = async {
            for _ in 0..2 {
                tokio::time::sleep(timings.frame_interval()).await;
                page.pump()?;
            }
            Ok::<(), LoaderError>(())
        };
        match tokio::time::timeout(timings.paint_timeout(), frames).await {
            Ok(result) => result?,
            Err(_) => debug!("paint frames did not arrive in time; revealing anyway"),
        }

        show_body(page.document_mut());
        if let Some(overlay) = &self.overlay {
            overlay.fade_out(page.document_mut(), timings.fade_duration());
            tokio::time::sleep(timings.fade_duration()).await;
            // Still owned here so a failed pump leaves it for `crash`.
            page.pump()?;
        }
        if let Some(overlay) = self.overlay.take() {
            overlay.remove(page.document_mut());
        }
        self.enter(RevealPhase::Revealed);
        Ok(())
    }
}

/// `visibility:hidden; pointer-events:none` plus `aria-busy` on the body.
pub fn hide_body(doc: &mut Document) {
    edit_body(doc, true);
}

pub fn show_body(doc: &mut Document) {
    edit_body(doc, false);
}

fn edit_body(doc: &mut Document, hidden: bool) {
    let Some(body) = doc.body() else {
        return;
    };
    let mut style = InlineStyle::parse(doc.attr(body, "style").unwrap_or_default());
    if hidden {
        style.set("visibility", "hidden");
        style.set("pointer-events", "none");
        doc.set_attr(body, "aria-busy", "true");
    } else {
        style.remove("visibility");
        style.remove("pointer-events");
        doc.remove_attr(body, "aria-busy");
    }
    if style.is_empty() {
        doc.remove_attr(body, "style");
    } else {
        doc.set_attr(body, "style", &style.to_attribute_value());
    }
}
