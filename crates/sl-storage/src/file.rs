use crate::StorageArea;
use crate::StorageConfig;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

/// Persistent key/value area backed by one partition file per top-level site.
///
/// Each partition is a JSON object of string values, replaced whole on every
/// write through a sibling temp file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    config: StorageConfig,
    root: Option<PathBuf>,
    top_level_site: String,
}

impl FileStorage {
    pub fn new(config: StorageConfig, top_level_site: impl Into<String>) -> Self {
        Self {
            config,
            root: None,
            top_level_site: top_level_site.into(),
        }
    }

    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = Some(root);
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn partition_path(&self) -> LoaderResult<PathBuf> {
        if self.config.ephemeral_mode {
            return Err(LoaderError::new(
                "storage.persistence_disabled",
                "persistent storage is disabled in ephemeral mode",
            ));
        }

        let root = self.root.as_ref().ok_or_else(|| {
            LoaderError::new(
                "storage.persistence_unconfigured",
                "persistent storage root is not configured",
            )
        })?;

        let partition = if self.config.partition_by_top_level_site {
            partition_name(&self.top_level_site)
        } else {
            "global".to_owned()
        };

        Ok(root.join("partitions").join(format!("{partition}.json")))
    }
}

impl StorageArea for FileStorage {
    fn label(&self) -> &'static str {
        "persistent"
    }

    fn get_item(&self, key: &str) -> LoaderResult<Option<String>> {
        let mut entries = load_partition(&self.partition_path()?)?;
        Ok(entries.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> LoaderResult<()> {
        let path = self.partition_path()?;
        let mut entries = load_partition(&path)?;
        if entries.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        entries.insert(key.to_owned(), value.to_owned());
        store_partition(&path, &entries)
    }

    fn remove_item(&self, key: &str) -> LoaderResult<()> {
        let path = self.partition_path()?;
        let mut entries = load_partition(&path)?;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        if !entries.is_empty() {
            return store_partition(&path, &entries);
        }

        fs::remove_file(&path).map_err(|error| {
            LoaderError::new(
                "storage.partition_remove_failed",
                format!("could not delete emptied partition `{}`: {error}", path.display()),
            )
        })
    }
}

fn partition_name(site: &str) -> String {
    let name: String = site
        .trim()
        .chars()
        .map(|ch| match ch.to_ascii_lowercase() {
            lower @ ('a'..='z' | '0'..='9' | '.' | '-' | '_') => lower,
            _ => '_',
        })
        .collect();
    if name.is_empty() { "unknown".to_owned() } else { name }
}

fn load_partition(path: &Path) -> LoaderResult<BTreeMap<String, String>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(error) => {
            return Err(LoaderError::new(
                "storage.partition_read_failed",
                format!("could not read partition `{}`: {error}", path.display()),
            ));
        }
    };
    serde_json::from_slice(&raw).map_err(|error| {
        LoaderError::new(
            "storage.partition_format_invalid",
            format!("partition `{}` is not a JSON string map: {error}", path.display()),
        )
    })
}

fn store_partition(path: &Path, entries: &BTreeMap<String, String>) -> LoaderResult<()> {
    let Some(dir) = path.parent() else {
        return Err(LoaderError::new(
            "storage.partition_path_invalid",
            format!("partition `{}` has no parent directory", path.display()),
        ));
    };
    let io_error = |action: &str, error: std::io::Error| {
        LoaderError::new(
            "storage.partition_write_failed",
            format!("could not {action} partition `{}`: {error}", path.display()),
        )
    };

    fs::create_dir_all(dir).map_err(|error| io_error("create the directory for", error))?;
    let encoded = serde_json::to_vec_pretty(entries).map_err(|error| {
        LoaderError::new("storage.partition_encode_failed", error.to_string())
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, encoded).map_err(|error| io_error("stage", error))?;
    fs::rename(&staging, path).map_err(|error| io_error("replace", error))
}
