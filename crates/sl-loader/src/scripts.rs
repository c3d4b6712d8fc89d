//! In-order replay of the scripts pulled out of fetched HTML.

use crate::config::LoaderConfig;
use crate::fetcher::ContentFetcher;
use crate::fetcher::Fetch;
use crate::page::LivePage;
use crate::rewriter::ScriptBody;
use crate::rewriter::ScriptDescriptor;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_dom::NodeId;
use sl_js::ReadyState;
use sl_js::ScriptOutcome;
use sl_js::ScriptSource;
use tracing::debug;
use tracing::info;

/// What happened to the queued ad scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdsOutcome {
    #[default]
    NoneQueued,
    Disabled {
        skipped: usize,
    },
    Loaded {
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub executed: usize,
    /// Ran but threw; the exception is logged and replay continues.
    pub threw: usize,
    /// Too large for the engine and not run.
    pub oversized: usize,
    /// Re-inserted without running (data blocks, `nomodule`).
    pub inert: usize,
    pub blank_skipped: usize,
    pub ads: AdsOutcome,
}

impl ReplayReport {
    fn count(&mut self, outcome: &ScriptOutcome) {
        let slot = match outcome {
            ScriptOutcome::Completed => &mut self.executed,
            ScriptOutcome::Threw(_) => &mut self.threw,
            ScriptOutcome::Skipped { .. } => &mut self.oversized,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Replays scripts one at a time, as if every one were `async=false`.
pub struct ScriptPlayer<'p, 'a, F: Fetch + ?Sized> {
    fetcher: &'p ContentFetcher<'a, F>,
    config: &'p LoaderConfig,
    key: &'p str,
}

impl<'p, 'a, F: Fetch + ?Sized> ScriptPlayer<'p, 'a, F> {
    pub fn new(fetcher: &'p ContentFetcher<'a, F>, config: &'p LoaderConfig, key: &'p str) -> Self {
        Self {
            fetcher,
            config,
            key,
        }
    }

    /// Ordered replay, then deferred ads, then the synthetic load events.
    pub async fn play(&self, page: &mut LivePage, scripts: &[ScriptDescriptor]) -> LoaderResult<ReplayReport> {
        let (mut report, ads) = self.replay_in_order(page, scripts).await?;
        report.ads = self.load_deferred_ads(page, &ads).await?;
        dispatch_load_events(page)?;
        info!(
            executed = report.executed,
            threw = report.threw,
            inert = report.inert,
            ads = ?report.ads,
            "scripts replayed"
        );
        Ok(report)
    }

    /// Runs every non-ad script in document order. Returns the ad scripts,
    /// still in order, for [`Self::load_deferred_ads`].
    pub async fn replay_in_order(
        &self,
        page: &mut LivePage,
        scripts: &[ScriptDescriptor],
    ) -> LoaderResult<(ReplayReport, Vec<ScriptDescriptor>)> {
        let mut report = ReplayReport::default();
        let mut ads = Vec::new();
        for (index, script) in scripts.iter().enumerate() {
            if script.src().is_some_and(|src| self.config.is_ad_source(src)) {
                debug!(src = script.src(), "deferring ad script");
                ads.push(script.clone());
                continue;
            }
            if let ScriptBody::Inline(code) = &script.body {
                if code.trim().is_empty() {
                    report.blank_skipped = report.blank_skipped.saturating_add(1);
                    continue;
                }
            }

            insert_script(page, script);
            if !script.is_executable() || script.no_module {
                report.inert = report.inert.saturating_add(1);
                continue;
            }
            let source = match &script.body {
                ScriptBody::External(src) => ScriptSource::new(src.clone(), self.load(src).await?),
                ScriptBody::Inline(code) => {
                    ScriptSource::new(format!("inline:{}#{index}", self.key), code.clone())
                }
            };
            let outcome = page.execute(&source)?;
            report.count(&outcome);
        }
        Ok((report, ads))
    }

    /// Loads the ad scripts last, after one frame and a zero-delay timer,
    /// unless the runtime configuration turns ads off.
    pub async fn load_deferred_ads(
        &self,
        page: &mut LivePage,
        ads: &[ScriptDescriptor],
    ) -> LoaderResult<AdsOutcome> {
        if ads.is_empty() {
            return Ok(AdsOutcome::NoneQueued);
        }
        let runtime = self.fetcher.fetch_runtime_config().await;
        if !runtime.adsense.enabled {
            info!(skipped = ads.len(), "ads disabled by runtime configuration");
            return Ok(AdsOutcome::Disabled { skipped: ads.len() });
        }

        tokio::time::sleep(self.config.timings.frame_interval()).await;
        page.pump()?;
        tokio::task::yield_now().await;
        page.pump()?;

        for script in ads {
            insert_script(page, script);
            if let Some(src) = script.src() {
                let source = ScriptSource::new(src, self.load(src).await?);
                page.execute(&source)?;
            }
        }
        Ok(AdsOutcome::Loaded { count: ads.len() })
    }

    async fn load(&self, src: &str) -> LoaderResult<String> {
        self.fetcher
            .fetch_text(src, self.config.timings.fetch_timeout())
            .await
            .map_err(|error| {
                LoaderError::new(
                    "loader.script.load_failed",
                    format!("script `{src}` failed to load: {error}"),
                )
            })
    }
}

/// `interactive` + `DOMContentLoaded`, then `complete` + `load`.
pub fn dispatch_load_events(page: &mut LivePage) -> LoaderResult<()> {
    page.set_ready_state(ReadyState::Interactive)?;
    page.dispatch_document_event("DOMContentLoaded")?;
    page.set_ready_state(ReadyState::Complete)?;
    page.dispatch_window_event("load")
}

/// Recreates the element at the end of the body so the live document
/// carries the same script tags the fetched page had.
fn insert_script(page: &mut LivePage, script: &ScriptDescriptor) -> Option<NodeId> {
    let doc = page.document_mut();
    let parent = doc.body().or_else(|| doc.document_element())?;
    let node = doc.create_element_with_attrs("script", script.attributes());
    if let ScriptBody::Inline(code) = &script.body {
        doc.set_text_content(node, code);
    }
    doc.append_child(parent, node);
    Some(node)
}
