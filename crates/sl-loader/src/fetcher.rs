//! Content retrieval: cache-first page HTML, runtime configuration and assets.

use crate::cache::SessionCache;
use crate::config::LoaderConfig;
use crate::keys::site_url;
use crate::unix_millis;
use async_trait::async_trait;
use serde::Deserialize;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use sl_net::decode_text;
use std::time::Duration;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// One outgoing `GET`. Requests never carry credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded with the declared or `<meta>`-sniffed charset.
    pub fn text(&self) -> String {
        decode_text(&self.body, &self.content_type)
    }
}

/// Transport seam between the loader and the network.
#[async_trait(?Send)]
pub trait Fetch {
    async fn get(&self, request: &FetchRequest) -> LoaderResult<FetchResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlSource {
    Cache,
    Network,
    /// Network failed; an older cached copy is shown instead.
    StaleFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHtml {
    pub html: String,
    pub source: HtmlSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdsenseConfig {
    pub enabled: bool,
}

impl Default for AdsenseConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Server-provided switches. Missing or malformed means defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub adsense: AdsenseConfig,
}

impl RuntimeConfig {
    /// Parses the document, falling back to defaults on any problem.
    pub fn parse_lenient(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(config) => config,
            Err(error) => {
                debug!(%error, "runtime configuration malformed; using defaults");
                Self::default()
            }
        }
    }
}

/// Fetches content through one proxy origin, consulting the page cache.
pub struct ContentFetcher<'a, F: Fetch + ?Sized> {
    fetch: &'a F,
    cache: SessionCache<'a>,
    origin: &'a str,
    config: &'a LoaderConfig,
}

impl<'a, F: Fetch + ?Sized> ContentFetcher<'a, F> {
    pub fn new(fetch: &'a F, cache: SessionCache<'a>, origin: &'a str, config: &'a LoaderConfig) -> Self {
        Self {
            fetch,
            cache,
            origin,
            config,
        }
    }

    pub fn origin(&self) -> &str {
        self.origin
    }

    pub fn cache(&self) -> &SessionCache<'a> {
        &self.cache
    }

    /// Cache first unless `force_refresh`; a failed network fetch falls back
    /// to any cached copy before giving up with `loader.fetch.unavailable`.
    pub async fn fetch_page_html(&self, key: &str, force_refresh: bool) -> LoaderResult<PageHtml> {
        if !force_refresh {
            if let Some(entry) = self.cache.read(key) {
                debug!(%key, cached_at = entry.timestamp, "page served from cache");
                return Ok(PageHtml {
                    html: entry.html,
                    source: HtmlSource::Cache,
                });
            }
        }

        let url = format!("{}?t={}", site_url(self.origin, key), unix_millis());
        match self.fetch_text(&url, self.config.timings.fetch_timeout()).await {
            Ok(html) => {
                self.cache.write(key, &html, unix_millis());
                info!(%key, bytes = html.len(), "page fetched");
                Ok(PageHtml {
                    html,
                    source: HtmlSource::Network,
                })
            }
            Err(error) => match self.cache.read(key) {
                Some(entry) => {
                    warn!(%key, %error, "page fetch failed; showing cached copy");
                    Ok(PageHtml {
                        html: entry.html,
                        source: HtmlSource::StaleFallback,
                    })
                }
                None => Err(LoaderError::new(
                    "loader.fetch.unavailable",
                    format!("could not load `{key}`: {error}"),
                )),
            },
        }
    }

    /// Never fails; every problem yields [`RuntimeConfig::default`].
    pub async fn fetch_runtime_config(&self) -> RuntimeConfig {
        let url = site_url(self.origin, &self.config.runtime_config_key);
        match self.fetch_text(&url, self.config.timings.fetch_timeout()).await {
            Ok(raw) => RuntimeConfig::parse_lenient(&raw),
            Err(error) => {
                debug!(%error, "runtime configuration unavailable; using defaults");
                RuntimeConfig::default()
            }
        }
    }

    /// `GET url` as text. Non-2xx answers and timeouts are errors.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> LoaderResult<String> {
        let request = FetchRequest::get(url);
        let response = match tokio::time::timeout(timeout, self.fetch.get(&request)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(LoaderError::new(
                    "loader.fetch.timeout",
                    format!("no response from `{url}` within {} ms", timeout.as_millis()),
                ));
            }
        };
        if !response.is_success() {
            return Err(LoaderError::new(
                "loader.fetch.status",
                format!("`{url}` answered with status {}", response.status),
            ));
        }
        Ok(response.text())
    }
}
