//! The bootstrap routine: shell in, rendered page out.

use crate::cache::SessionCache;
use crate::config::LoaderConfig;
use crate::fetcher::ContentFetcher;
use crate::fetcher::Fetch;
use crate::fetcher::HtmlSource;
use crate::keys::current_key;
use crate::origin::OriginSources;
use crate::origin::flask_origin;
use crate::origin::read_override;
use crate::page::LivePage;
use crate::ready::ReadyOutcome;
use crate::ready::wait_for_app_ready;
use crate::reveal::RevealCoordinator;
use crate::reveal::RevealPhase;
use crate::rewriter;
use crate::scripts::ReplayReport;
use crate::scripts::ScriptPlayer;
use crate::settle::SettleOutcome;
use crate::settle::wait_for_settle;
use crate::skeleton::SkeletonStyles;
use crate::skeleton::StylesheetReport;
use crate::skeleton::wait_for_stylesheets;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_dom::Document;
use sl_html::parse_document;
use sl_js::JsHostEnvironment;
use sl_js::JsRuntimeConfig;
use sl_storage::ClientStorage;
use tracing::info;
use tracing::warn;
use url::Url;

const OFFLINE_NOTICE: &str = "You appear to be offline. Showing a saved copy of this page.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapRequest {
    pub page_url: String,
    pub shell_html: String,
    /// Loader script URL. When absent the shell is searched for one.
    pub loader_src: Option<String>,
    /// Proxy origin for this run only. Takes precedence over the stored
    /// override and is never written back to storage.
    pub origin_override: Option<String>,
    pub force_refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Revealed,
    /// Nothing could be shown; the error is on the overlay and the body is hidden.
    FetchFailed(LoaderError),
    /// Rendering broke; the error is on the overlay and the page is visible.
    Crashed(LoaderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub key: String,
    pub origin: String,
    pub force_refresh: bool,
    pub source: Option<HtmlSource>,
    pub rewritten_references: usize,
    pub stylesheets: Vec<StylesheetReport>,
    pub replay: Option<ReplayReport>,
    pub ready: Option<ReadyOutcome>,
    pub settle: Option<SettleOutcome>,
    pub phases: Vec<RevealPhase>,
    pub outcome: BootstrapOutcome,
}

#[derive(Debug)]
pub struct Bootstrapped {
    pub page: LivePage,
    pub report: BootstrapReport,
}

impl Bootstrapped {
    pub fn document(&self) -> &Document {
        self.page.document()
    }
}

/// Turns empty shell pages into rendered pages through one proxy.
#[derive(Debug)]
pub struct ShellLoader<F: Fetch> {
    config: LoaderConfig,
    fetch: F,
    storage: ClientStorage,
    js_config: JsRuntimeConfig,
    user_agent: Option<String>,
}

impl<F: Fetch> ShellLoader<F> {
    pub fn new(config: LoaderConfig, fetch: F, storage: ClientStorage) -> Self {
        let js_config = JsRuntimeConfig {
            frame_interval_ms: config.timings.frame_interval_ms.max(1),
            ..JsRuntimeConfig::default()
        };
        Self {
            config,
            fetch,
            storage,
            js_config,
            user_agent: None,
        }
    }

    pub fn with_js_config(mut self, js_config: JsRuntimeConfig) -> Self {
        self.js_config = js_config;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn fetch(&self) -> &F {
        &self.fetch
    }

    pub fn storage(&self) -> &ClientStorage {
        &self.storage
    }

    /// Runs the whole bootstrap. Fetch and render failures end up in the
    /// report; only an unusable page URL or script engine is an `Err`.
    pub async fn bootstrap(&self, request: &BootstrapRequest) -> LoaderResult<Bootstrapped> {
        let config = &self.config;
        let page_url = Url::parse(&request.page_url).map_err(|error| {
            LoaderError::new(
                "loader.page_url.invalid",
                format!("`{}` is not a page URL: {error}", request.page_url),
            )
        })?;
        let key = current_key(page_url.path(), &config.shell_prefix);
        let force_refresh = request.force_refresh || refresh_requested(&page_url, &config.refresh_param);

        let shell = parse_document(&request.shell_html);
        let loader_src = request
            .loader_src
            .clone()
            .or_else(|| detect_loader_src(&shell, &config.loader_attribute()));
        let override_value = request
            .origin_override
            .clone()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| read_override(self.storage.persistent(), &config.origin_override_key()));
        let origin = flask_origin(
            &OriginSources {
                override_value: override_value.as_deref(),
                loader_src: loader_src.as_deref(),
                page_url: Some(page_url.as_str()),
            },
            &config.default_origin,
        );
        info!(%key, %origin, force_refresh, "bootstrapping page");

        let skeleton = SkeletonStyles::capture(&shell, &config.skeleton_markers());
        let mut host = JsHostEnvironment {
            page_url: page_url.to_string(),
            ..JsHostEnvironment::default()
        };
        if let Some(user_agent) = &self.user_agent {
            host.user_agent = user_agent.clone();
        }
        let mut page = LivePage::new(
            shell,
            self.js_config.clone(),
            &host,
            config.hold_flag(),
            config.app_ready_event(),
        )?;
        let mut reveal = RevealCoordinator::begin(page.document_mut(), config);

        let cache = SessionCache::select(&self.storage, config.cache_prefix());
        let fetcher = ContentFetcher::new(&self.fetch, cache, &origin, config);
        let mut report = BootstrapReport {
            key: key.clone(),
            origin: origin.clone(),
            force_refresh,
            source: None,
            rewritten_references: 0,
            stylesheets: Vec::new(),
            replay: None,
            ready: None,
            settle: None,
            phases: Vec::new(),
            outcome: BootstrapOutcome::Revealed,
        };

        reveal.enter(RevealPhase::Loading);
        match fetcher.fetch_page_html(&key, force_refresh).await {
            Err(error) => {
                reveal.fail_fetch(page.document_mut(), &key, &error);
                report.outcome = BootstrapOutcome::FetchFailed(error);
            }
            Ok(fetched) => {
                report.source = Some(fetched.source);
                let render = Render {
                    config,
                    fetcher: &fetcher,
                    key: &key,
                    origin: &origin,
                    skeleton: &skeleton,
                };
                if let Err(error) = render
                    .run(&mut page, &mut reveal, &fetched.html, fetched.source, &mut report)
                    .await
                {
                    reveal.crash(page.document_mut(), &error);
                    report.outcome = BootstrapOutcome::Crashed(error);
                }
            }
        }
        report.phases = reveal.trace().to_vec();
        Ok(Bootstrapped { page, report })
    }
}

/// Everything after the HTML is in hand.
struct Render<'r, 'a, F: Fetch + ?Sized> {
    config: &'r LoaderConfig,
    fetcher: &'r ContentFetcher<'a, F>,
    key: &'r str,
    origin: &'r str,
    skeleton: &'r SkeletonStyles,
}

impl<F: Fetch + ?Sized> Render<'_, '_, F> {
    async fn run(
        &self,
        page: &mut LivePage,
        reveal: &mut RevealCoordinator<'_>,
        html: &str,
        source: HtmlSource,
        report: &mut BootstrapReport,
    ) -> LoaderResult<()> {
        let timings = &self.config.timings;
        reveal.enter(RevealPhase::Rendering);

        let mut staged = rewriter::parse(html);
        let scripts = rewriter::extract_scripts(&mut staged, self.key, self.origin);
        report.rewritten_references = rewriter::rewrite_references(&mut staged, self.key, self.origin);
        rewriter::swap_into(page.document_mut(), &staged)?;
        if source == HtmlSource::StaleFallback {
            self.insert_offline_notice(page.document_mut());
        }
        self.skeleton
            .reinject(page.document_mut(), &self.config.carry_style_id());

        let hrefs = rewriter::stylesheet_hrefs(page.document());
        report.stylesheets = wait_for_stylesheets(self.fetcher, &hrefs, timings.stylesheet_timeout()).await;

        let player = ScriptPlayer::new(self.fetcher, self.config, self.key);
        report.replay = Some(player.play(page, &scripts).await?);

        reveal.enter(RevealPhase::AwaitingApp);
        report.ready = Some(wait_for_app_ready(page, timings).await?);
        reveal.enter(RevealPhase::Settling);
        report.settle = Some(wait_for_settle(page, timings).await?);
        reveal.reveal(page).await
    }

    fn insert_offline_notice(&self, doc: &mut Document) {
        let Some(body) = doc.body() else {
            return;
        };
        warn!(key = self.key, "showing cached copy while offline");
        let notice = doc.create_element_with_attrs(
            "div",
            vec![
                ("class".to_owned(), self.config.offline_notice_class()),
                ("role".to_owned(), "status".to_owned()),
            ],
        );
        doc.set_text_content(notice, OFFLINE_NOTICE);
        doc.prepend_child(body, notice);
    }
}

/// `?refresh=1` or `?refresh=true` on the page URL.
fn refresh_requested(page_url: &Url, param: &str) -> bool {
    page_url
        .query_pairs()
        .any(|(name, value)| name == param && matches!(value.as_ref(), "1" | "true"))
}

/// `src` of the shell's `<script data-acfh-loader>`, if it has one.
fn detect_loader_src(shell: &Document, attribute: &str) -> Option<String> {
    shell
        .elements_by_tag(shell.root(), "script")
        .into_iter()
        .find(|node| shell.has_attr(*node, attribute))
        .and_then(|node| shell.attr(node, "src"))
        .map(str::to_owned)
}
