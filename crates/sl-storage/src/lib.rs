//! Session and persistent key/value storage areas.

mod file;
mod memory;

use sl_core::LoaderResult;
use std::fmt;
use std::path::PathBuf;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// A string key/value area with the shape of Web Storage.
///
/// Implementations use interior mutability; the loader is single-threaded.
pub trait StorageArea {
    /// Short name used in logs (`session`, `persistent`).
    fn label(&self) -> &'static str;
    fn get_item(&self, key: &str) -> LoaderResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> LoaderResult<()>;
    fn remove_item(&self, key: &str) -> LoaderResult<()>;
}

const PROBE_KEY: &str = "__sl_storage_probe__";

/// True when a probe write followed by a removal both succeed.
pub fn is_usable(area: &dyn StorageArea) -> bool {
    area.set_item(PROBE_KEY, "1").is_ok() && area.remove_item(PROBE_KEY).is_ok()
}

/// Durable storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub partition_by_top_level_site: bool,
    pub ephemeral_mode: bool,
    /// Byte cap for the session area. `None` means unlimited.
    pub session_quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            partition_by_top_level_site: true,
            ephemeral_mode: false,
            session_quota_bytes: Some(5 * 1024 * 1024),
        }
    }
}

/// The two storage areas a page can reach.
pub struct ClientStorage {
    session: Box<dyn StorageArea>,
    persistent: Box<dyn StorageArea>,
}

impl fmt::Debug for ClientStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientStorage")
            .field("session", &self.session.label())
            .field("persistent", &self.persistent.label())
            .finish()
    }
}

impl ClientStorage {
    pub fn new(config: StorageConfig, top_level_site: &str, persistent_root: Option<PathBuf>) -> Self {
        let session = match config.session_quota_bytes {
            Some(quota) => MemoryStorage::with_quota(quota),
            None => MemoryStorage::new(),
        };
        let mut persistent = FileStorage::new(config, top_level_site);
        if let Some(root) = persistent_root {
            persistent = persistent.with_root(root);
        }

        Self::from_areas(Box::new(session), Box::new(persistent))
    }

    /// Groups caller-supplied areas, e.g. two in-memory areas for tests.
    pub fn from_areas(session: Box<dyn StorageArea>, persistent: Box<dyn StorageArea>) -> Self {
        Self {
            session,
            persistent,
        }
    }

    /// Session area only, persistence unconfigured.
    pub fn in_memory() -> Self {
        Self::new(StorageConfig::default(), "localhost", None)
    }

    pub fn session(&self) -> &dyn StorageArea {
        self.session.as_ref()
    }

    pub fn persistent(&self) -> &dyn StorageArea {
        self.persistent.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::ClientStorage;
    use super::MemoryStorage;
    use super::StorageConfig;
    use super::is_usable;

    #[test]
    fn probe_detects_unusable_areas() {
        assert!(is_usable(&MemoryStorage::new()));
        assert!(!is_usable(&MemoryStorage::with_quota(0)));
    }

    #[test]
    fn in_memory_client_has_no_persistence() {
        let storage = ClientStorage::in_memory();
        assert!(is_usable(storage.session()));
        assert!(!is_usable(storage.persistent()));
    }

    #[test]
    fn ephemeral_config_still_allows_session_writes() {
        let config = StorageConfig {
            ephemeral_mode: true,
            ..StorageConfig::default()
        };
        let storage = ClientStorage::new(config, "example.com", Some(std::env::temp_dir()));
        assert!(is_usable(storage.session()));
        assert!(!is_usable(storage.persistent()));
    }

    #[test]
    fn caller_supplied_areas_are_used_as_given() {
        let storage = ClientStorage::from_areas(Box::new(MemoryStorage::new()), Box::new(MemoryStorage::new()));
        assert!(is_usable(storage.persistent()));
        assert!(storage.persistent().set_item("k", "v").is_ok());
        assert_eq!(storage.persistent().get_item("k"), Ok(Some("v".to_owned())));
        assert_eq!(storage.session().get_item("k"), Ok(None));
    }
}
