use anyhow::Result;
use std::collections::HashSet;
#[cfg(test)]
use std::{cell::RefCell, collections::HashMap};
use tracing::{debug, warn};

/// Storage slot holding the JSON array of saved job ids.
pub const SAVED_JOBS_KEY: &str = "zero_battery_saved_jobs";

/// Narrow string-keyed persistence capability.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RefCell<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedJobSet(HashSet<String>);

impl SavedJobSet {
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ids in sorted order, the form written to storage.
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn toggled(&self, id: &str) -> Self {
        let mut next = self.0.clone();
        if !next.remove(id) {
            next.insert(id.to_string());
        }
        Self(next)
    }
}

impl FromIterator<String> for SavedJobSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub struct SavedJobStore<S: KeyValueStore> {
    backend: S,
    current: SavedJobSet,
}

impl<S: KeyValueStore> SavedJobStore<S> {
    /// Opens the store and loads whatever is persisted.
    pub fn open(backend: S) -> Self {
        let mut store = Self {
            backend,
            current: SavedJobSet::default(),
        };
        store.current = store.load();
        store
    }

    pub fn current(&self) -> &SavedJobSet {
        &self.current
    }

    /// Absent or unreadable storage yields an empty set.
    pub fn load(&self) -> SavedJobSet {
        let raw = match self.backend.get(SAVED_JOBS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return SavedJobSet::default(),
            Err(e) => {
                warn!(error = %e, "failed to read saved jobs, starting empty");
                return SavedJobSet::default();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "saved jobs slot is malformed, starting empty");
                SavedJobSet::default()
            }
        }
    }

    /// Flips membership of `id` and writes the whole set back.
    ///
    /// The in-memory set is updated even when the write fails; the error is
    /// returned so the caller can tell the user.
    pub fn toggle(&mut self, id: &str) -> Result<SavedJobSet> {
        self.current = self.current.toggled(id);
        debug!(id, saved = self.current.contains(id), "toggled saved job");

        let encoded = serde_json::to_string(&self.current.sorted_ids())?;
        if let Err(e) = self.backend.set(SAVED_JOBS_KEY, &encoded) {
            warn!(error = %e, "failed to persist saved jobs");
            return Err(e);
        }
        Ok(self.current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    // Lets a test keep a handle on the backend the store writes to.
    impl<S: KeyValueStore> KeyValueStore for &S {
        fn get(&self, key: &str) -> Result<Option<String>> {
            (**self).get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            (**self).set(key, value)
        }
    }

    #[test]
    fn test_load_absent_is_empty() {
        let store = SavedJobStore::open(MemoryStore::new());
        assert!(store.current().is_empty());
    }

    #[test]
    fn test_load_malformed_is_empty() {
        let backend = MemoryStore::new();
        backend.set(SAVED_JOBS_KEY, "{not json").unwrap();
        let store = SavedJobStore::open(&backend);
        assert!(store.current().is_empty());

        backend.set(SAVED_JOBS_KEY, r#"{"ids": ["a"]}"#).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_read_error_is_empty() {
        let store = SavedJobStore::open(BrokenStore);
        assert!(store.current().is_empty());
    }

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut store = SavedJobStore::open(MemoryStore::new());
        let original = store.current().clone();

        let once = store.toggle("42").unwrap();
        assert!(once.contains("42"));

        let twice = store.toggle("42").unwrap();
        assert_eq!(twice, original);
    }

    #[test]
    fn test_toggle_persists_immediately() {
        let backend = MemoryStore::new();
        {
            let mut store = SavedJobStore::open(&backend);
            store.toggle("b").unwrap();
            store.toggle("a").unwrap();
            store.toggle("c").unwrap();
            store.toggle("b").unwrap();
        }
        assert_eq!(
            backend.get(SAVED_JOBS_KEY).unwrap().as_deref(),
            Some(r#"["a","c"]"#)
        );

        let reopened = SavedJobStore::open(&backend);
        assert_eq!(reopened.current().sorted_ids(), vec!["a", "c"]);
    }

    #[test]
    fn test_toggle_reports_write_failure_but_updates_memory() {
        let mut store = SavedJobStore::open(BrokenStore);
        assert!(store.toggle("x").is_err());
        assert!(store.current().contains("x"));
    }

    #[test]
    fn test_reads_legacy_unsorted_slot() {
        let backend = MemoryStore::new();
        backend.set(SAVED_JOBS_KEY, r#"["z", "y", "z"]"#).unwrap();
        let store = SavedJobStore::open(&backend);
        assert_eq!(store.current().len(), 2);
        assert!(store.current().contains("y"));
    }
}
