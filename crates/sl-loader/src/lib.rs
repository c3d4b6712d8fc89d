//! Bootstraps an empty shell page into the page it stands for: resolve the
//! page key and proxy origin, fetch (or recall) the page HTML, swap it in with
//! assets routed through the proxy, replay its scripts, and reveal it once
//! rendering has settled.

pub mod cache;
pub mod config;
pub mod fetcher;
pub mod http_fetch;
pub mod keys;
pub mod origin;
pub mod overlay;
pub mod page;
pub mod pipeline;
pub mod ready;
pub mod reveal;
pub mod rewriter;
pub mod scripts;
pub mod settle;
pub mod skeleton;

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

pub use cache::CacheBackend;
pub use cache::CacheEntry;
pub use cache::SessionCache;
pub use config::LoaderConfig;
pub use config::Timings;
pub use fetcher::ContentFetcher;
pub use fetcher::Fetch;
pub use fetcher::FetchRequest;
pub use fetcher::FetchResponse;
pub use fetcher::HtmlSource;
pub use fetcher::PageHtml;
pub use fetcher::RuntimeConfig;
pub use http_fetch::NetworkFetch;
pub use overlay::Overlay;
pub use page::LivePage;
pub use pipeline::BootstrapOutcome;
pub use pipeline::BootstrapReport;
pub use pipeline::BootstrapRequest;
pub use pipeline::Bootstrapped;
pub use pipeline::ShellLoader;
pub use ready::AppReadiness;
pub use ready::ReadyChannel;
pub use ready::ReadyHandle;
pub use ready::ReadyOutcome;
pub use reveal::RevealPhase;
pub use scripts::AdsOutcome;
pub use scripts::ReplayReport;
pub use settle::MutationSource;
pub use settle::SettleOutcome;

/// Wall-clock milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
