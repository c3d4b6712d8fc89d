//! Proxy origin selection.

use sl_storage::StorageArea;
use tracing::debug;
use url::Url;

/// Inputs consulted when choosing the proxy origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginSources<'a> {
    /// Value stored under the origin override key, if any.
    pub override_value: Option<&'a str>,
    /// `src` of the loader script, possibly relative to the page.
    pub loader_src: Option<&'a str>,
    pub page_url: Option<&'a str>,
}

/// Picks the proxy origin: a non-blank override, then the loader script's
/// origin, then the page origin when it is http(s), then `default_origin`.
/// The result never ends with `/`.
pub fn flask_origin(sources: &OriginSources<'_>, default_origin: &str) -> String {
    if let Some(value) = sources
        .override_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return value.trim_end_matches('/').to_owned();
    }

    let page = sources.page_url.and_then(|raw| Url::parse(raw).ok());
    if let Some(origin) = sources
        .loader_src
        .and_then(|src| resolve_against(page.as_ref(), src))
        .and_then(|url| http_origin(&url))
    {
        return origin;
    }
    if let Some(origin) = page.as_ref().and_then(http_origin) {
        return origin;
    }
    default_origin.trim_end_matches('/').to_owned()
}

/// Reads the override, treating storage failures as "no override".
pub fn read_override(area: &dyn StorageArea, key: &str) -> Option<String> {
    match area.get_item(key) {
        Ok(value) => value,
        Err(error) => {
            debug!(area = area.label(), %error, "origin override unavailable");
            None
        }
    }
}

fn resolve_against(page: Option<&Url>, src: &str) -> Option<Url> {
    match Url::parse(src.trim()) {
        Ok(url) => Some(url),
        Err(_) => page?.join(src.trim()).ok(),
    }
}

fn http_origin(url: &Url) -> Option<String> {
    matches!(url.scheme(), "http" | "https").then(|| url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::OriginSources;
    use super::flask_origin;
    use super::read_override;
    use sl_storage::MemoryStorage;
    use sl_storage::StorageArea;

    const DEFAULT: &str = "http://127.0.0.1:5000";

    #[test]
    fn override_wins_and_loses_trailing_slashes() {
        let sources = OriginSources {
            override_value: Some(" https://proxy.example.com// "),
            loader_src: Some("https://cdn.example.com/loader.js"),
            page_url: Some("https://pages.example.com/shell/index.html"),
        };
        assert_eq!(flask_origin(&sources, DEFAULT), "https://proxy.example.com");
    }

    #[test]
    fn blank_override_falls_through_to_loader_origin() {
        let sources = OriginSources {
            override_value: Some("   "),
            loader_src: Some("https://cdn.example.com:8443/static/loader.js"),
            page_url: Some("https://pages.example.com/"),
        };
        assert_eq!(flask_origin(&sources, DEFAULT), "https://cdn.example.com:8443");
    }

    #[test]
    fn relative_loader_src_uses_page_origin() {
        let sources = OriginSources {
            loader_src: Some("/static/loader.js"),
            page_url: Some("http://localhost:8080/shell/a.html"),
            ..OriginSources::default()
        };
        assert_eq!(flask_origin(&sources, DEFAULT), "http://localhost:8080");
    }

    #[test]
    fn non_http_pages_use_the_default() {
        let sources = OriginSources {
            page_url: Some("file:///srv/shell/index.html"),
            ..OriginSources::default()
        };
        assert_eq!(flask_origin(&sources, "http://127.0.0.1:5000/"), DEFAULT);
        assert_eq!(flask_origin(&OriginSources::default(), DEFAULT), DEFAULT);
    }

    #[test]
    fn reads_override_from_storage() {
        let area = MemoryStorage::new();
        assert_eq!(read_override(&area, "acfh.flaskOrigin"), None);
        assert!(area.set_item("acfh.flaskOrigin", "https://proxy.test").is_ok());
        assert_eq!(
            read_override(&area, "acfh.flaskOrigin").as_deref(),
            Some("https://proxy.test")
        );
    }
}
