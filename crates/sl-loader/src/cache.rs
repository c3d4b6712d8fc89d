//! Per-session cache of page HTML.

use serde::Deserialize;
use serde::Serialize;
use sl_storage::ClientStorage;
use sl_storage::StorageArea;
use sl_storage::is_usable;
use tracing::debug;

/// Stored form of a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub html: String,
    /// Unix milliseconds of the fetch that produced the entry.
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Session,
    Persistent,
    Disabled,
}

/// Cache over the first usable storage area: session, then persistent.
///
/// Reads never fail and writes are best-effort; storage problems only make
/// the cache forgetful.
pub struct SessionCache<'a> {
    area: Option<&'a dyn StorageArea>,
    backend: CacheBackend,
    prefix: String,
}

impl std::fmt::Debug for SessionCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("backend", &self.backend)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<'a> SessionCache<'a> {
    pub fn select(storage: &'a ClientStorage, prefix: impl Into<String>) -> Self {
        let (area, backend) = if is_usable(storage.session()) {
            (Some(storage.session()), CacheBackend::Session)
        } else if is_usable(storage.persistent()) {
            (Some(storage.persistent()), CacheBackend::Persistent)
        } else {
            (None, CacheBackend::Disabled)
        };
        debug!(?backend, "page cache backend selected");

        Self {
            area,
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn backend(&self) -> CacheBackend {
        self.backend
    }

    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        let area = self.area?;
        let raw = match area.get_item(&self.entry_key(key)) {
            Ok(raw) => raw?,
            Err(error) => {
                debug!(%key, %error, "page cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(%key, %error, "ignoring corrupt page cache entry");
                None
            }
        }
    }

    pub fn write(&self, key: &str, html: &str, timestamp: u64) {
        let Some(area) = self.area else {
            return;
        };
        let entry = CacheEntry {
            html: html.to_owned(),
            timestamp,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(error) => {
                debug!(%key, %error, "page cache entry not encodable");
                return;
            }
        };
        if let Err(error) = area.set_item(&self.entry_key(key), &raw) {
            debug!(%key, %error, "page cache write skipped");
        }
    }

    fn entry_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}
