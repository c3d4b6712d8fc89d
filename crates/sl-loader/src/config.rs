//! Loader configuration. Every field has a default; JSON overrides are partial.

use serde::Deserialize;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::path::Path;
use std::time::Duration;

/// Bounded waits, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub fetch_timeout_ms: u64,
    pub stylesheet_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub app_ready_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub settle_quiet_ms: u64,
    pub settle_max_ms: u64,
    pub frame_interval_ms: u64,
    pub paint_timeout_ms: u64,
    pub fade_duration_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 15_000,
            stylesheet_timeout_ms: 3_000,
            poll_interval_ms: 60,
            app_ready_timeout_ms: 8_000,
            grace_period_ms: 150,
            settle_quiet_ms: 200,
            settle_max_ms: 2_500,
            frame_interval_ms: 16,
            paint_timeout_ms: 100,
            fade_duration_ms: 250,
        }
    }
}

impl Timings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn stylesheet_timeout(&self) -> Duration {
        Duration::from_millis(self.stylesheet_timeout_ms)
    }

    /// Never zero, so polling loops always make progress.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn app_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.app_ready_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn settle_quiet(&self) -> Duration {
        Duration::from_millis(self.settle_quiet_ms)
    }

    pub fn settle_max(&self) -> Duration {
        Duration::from_millis(self.settle_max_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn paint_timeout(&self) -> Duration {
        Duration::from_millis(self.paint_timeout_ms)
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms)
    }
}

/// Names, storage keys and patterns shared by the shell and the loader.
///
/// Most identifiers derive from `namespace`, so a deployment that renames the
/// namespace moves every key, class and event name with it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub namespace: String,
    /// Leading path segment stripped from page paths when deriving the page key.
    pub shell_prefix: String,
    pub default_origin: String,
    pub runtime_config_key: String,
    /// Substrings identifying third-party ad scripts that are deferred.
    pub ad_patterns: Vec<String>,
    /// Skeleton markers beyond the namespaced `-skeleton` and `-overlay` ones.
    pub extra_skeleton_markers: Vec<String>,
    /// Query parameter that forces a network fetch when set to `1` or `true`.
    pub refresh_param: String,
    pub timings: Timings,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            namespace: "acfh".to_owned(),
            shell_prefix: "shell".to_owned(),
            default_origin: "http://127.0.0.1:5000".to_owned(),
            runtime_config_key: "runtime-config.json".to_owned(),
            ad_patterns: vec!["googlesyndication.com/pagead/js/adsbygoogle.js".to_owned()],
            extra_skeleton_markers: vec!["shimmer".to_owned()],
            refresh_param: "refresh".to_owned(),
            timings: Timings::default(),
        }
    }
}

impl LoaderConfig {
    pub fn from_json_str(input: &str) -> LoaderResult<Self> {
        serde_json::from_str(input).map_err(|error| {
            LoaderError::new(
                "loader.config.invalid",
                format!("failed to parse loader configuration: {error}"),
            )
        })
    }

    pub fn from_json_file(path: &Path) -> LoaderResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            LoaderError::new(
                "loader.config.read_failed",
                format!("failed to read `{}`: {error}", path.display()),
            )
        })?;
        Self::from_json_str(&raw)
    }

    /// Session-cache key prefix, e.g. `acfh.page:`.
    pub fn cache_prefix(&self) -> String {
        format!("{}.page:", self.namespace)
    }

    /// Persistent-storage key holding the proxy origin override.
    pub fn origin_override_key(&self) -> String {
        format!("{}.flaskOrigin", self.namespace)
    }

    pub fn app_ready_event(&self) -> String {
        format!("{}:app-ready", self.namespace)
    }

    pub fn hold_flag(&self) -> String {
        format!("{}HoldProcessing", self.namespace)
    }

    pub fn overlay_class(&self) -> String {
        format!("{}-skeleton-overlay", self.namespace)
    }

    pub fn fallback_overlay_id(&self) -> String {
        format!("{}-loading-overlay", self.namespace)
    }

    pub fn carry_style_id(&self) -> String {
        format!("{}-skeleton-carry", self.namespace)
    }

    pub fn offline_notice_class(&self) -> String {
        format!("{}-offline-notice", self.namespace)
    }

    /// Attribute marking the loader's own `<script>` in the shell.
    pub fn loader_attribute(&self) -> String {
        format!("data-{}-loader", self.namespace)
    }

    pub fn skeleton_markers(&self) -> Vec<String> {
        let mut markers = vec![
            format!("{}-skeleton", self.namespace),
            format!("{}-overlay", self.namespace),
        ];
        markers.extend(self.extra_skeleton_markers.iter().cloned());
        markers
    }

    pub fn is_ad_source(&self, src: &str) -> bool {
        self.ad_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && src.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::LoaderConfig;
    use super::Timings;

    #[test]
    fn defaults_match_the_shell_contract() {
        let config = LoaderConfig::default();
        assert_eq!(config.cache_prefix(), "acfh.page:");
        assert_eq!(config.origin_override_key(), "acfh.flaskOrigin");
        assert_eq!(config.app_ready_event(), "acfh:app-ready");
        assert_eq!(config.hold_flag(), "acfhHoldProcessing");
        assert_eq!(config.overlay_class(), "acfh-skeleton-overlay");
        assert_eq!(config.fallback_overlay_id(), "acfh-loading-overlay");
        assert_eq!(
            config.skeleton_markers(),
            vec!["acfh-skeleton", "acfh-overlay", "shimmer"]
        );
        assert_eq!(config.timings.poll_interval_ms, 60);
        assert_eq!(config.timings.settle_max_ms, 2_500);
    }

    #[test]
    fn partial_json_overrides_keep_other_defaults() {
        let config = match LoaderConfig::from_json_str(
            r#"{ "namespace": "docs", "timings": { "grace_period_ms": 40 } }"#,
        ) {
            Ok(config) => config,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(config.cache_prefix(), "docs.page:");
        assert_eq!(config.hold_flag(), "docsHoldProcessing");
        assert_eq!(config.shell_prefix, "shell");
        assert_eq!(config.timings.grace_period_ms, 40);
        assert_eq!(config.timings.app_ready_timeout_ms, Timings::default().app_ready_timeout_ms);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let error = match LoaderConfig::from_json_str("{ namespace: ") {
            Ok(_) => panic!("malformed config must not parse"),
            Err(error) => error,
        };
        assert_eq!(error.code, "loader.config.invalid");
    }

    #[test]
    fn zero_poll_interval_still_advances() {
        let timings = Timings {
            poll_interval_ms: 0,
            ..Timings::default()
        };
        assert_eq!(timings.poll_interval().as_millis(), 1);
    }

    #[test]
    fn recognizes_ad_sources() {
        let config = LoaderConfig::default();
        assert!(config.is_ad_source(
            "https://pagead2.googlesyndication.com/pagead/js/adsbygoogle.js?client=ca-pub-1"
        ));
        assert!(!config.is_ad_source("https://cdn.example.com/app.js"));
    }
}
