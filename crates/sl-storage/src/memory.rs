use crate::StorageArea;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Session-scoped key/value area. Contents live as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the summed byte length of keys and values.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RefCell::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(existing, _)| existing.as_str() != key)
            .fold(0_usize, |acc, (k, v)| {
                acc.saturating_add(k.len()).saturating_add(v.len())
            })
    }
}

impl StorageArea for MemoryStorage {
    fn label(&self) -> &'static str {
        "session"
    }

    fn get_item(&self, key: &str) -> LoaderResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> LoaderResult<()> {
        if let Some(quota) = self.quota_bytes {
            let needed = self
                .used_bytes_without(key)
                .saturating_add(key.len())
                .saturating_add(value.len());
            if needed > quota {
                return Err(LoaderError::new(
                    "storage.quota_exceeded",
                    format!("writing `{key}` needs {needed} bytes, quota is {quota}"),
                ));
            }
        }

        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> LoaderResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::StorageArea;

    #[test]
    fn stores_and_removes_values() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.set_item("a", "1"), Ok(()));
        assert_eq!(storage.get_item("a"), Ok(Some("1".to_owned())));
        assert_eq!(storage.remove_item("a"), Ok(()));
        assert!(storage.is_empty());
    }

    #[test]
    fn rejects_writes_over_quota() {
        let storage = MemoryStorage::with_quota(8);
        assert_eq!(storage.set_item("key", "abc"), Ok(()));

        match storage.set_item("other", "value") {
            Ok(()) => panic!("write over quota succeeded"),
            Err(error) => assert_eq!(error.code, "storage.quota_exceeded"),
        }

        // Replacing an existing value only counts the new size.
        assert_eq!(storage.set_item("key", "abcde"), Ok(()));
        assert_eq!(storage.len(), 1);
    }
}
