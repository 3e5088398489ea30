//! The patch catalog.

use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use log::debug;

use crate::{
    catalog::{builtin, LibraryNameMap, PatchDescriptor},
    Error, Result,
};

/// Registry of patch descriptors keyed by id.
///
/// Read-mostly: built-ins are registered at startup, user patches afterwards, and launches
/// resolve their patch sets concurrently. Lookups hand out `Arc`s, so a descriptor obtained
/// before a re-registration stays valid and unchanged.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::{catalog::{PatchCatalog, PatchDescriptor}, Error};
///
/// let catalog = PatchCatalog::new();
/// catalog.register(PatchDescriptor::new("fixA", "FNA"));
///
/// match catalog.lookup(&["fixA", "missing"]) {
///     Err(Error::NotFound(ids)) => assert_eq!(ids, vec!["missing".to_string()]),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Default)]
pub struct PatchCatalog {
    entries: DashMap<String, Arc<PatchDescriptor>>,
}

impl PatchCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any descriptor with the same id.
    ///
    /// Replacement affects later lookups only. An [`crate::interception::InterceptionEngine`]
    /// that already installed the id keeps the version it installed and logs a warning when the
    /// new one is offered.
    ///
    /// Returns the replaced descriptor.
    pub fn register(&self, descriptor: PatchDescriptor) -> Option<Arc<PatchDescriptor>> {
        let id = descriptor.id().to_string();
        let previous = self.entries.insert(id.clone(), Arc::new(descriptor));
        if previous.is_some() {
            debug!("Patch '{}' re-registered, last registration wins", id);
        }
        previous
    }

    /// Registers the built-in descriptors with the default library-name map.
    pub fn register_builtin(&self) {
        self.register_builtin_with(LibraryNameMap::default());
    }

    /// Registers the built-in descriptors with a custom library-name map.
    pub fn register_builtin_with(&self, names: LibraryNameMap) {
        for descriptor in builtin::descriptors(Arc::new(names)) {
            self.register(descriptor);
        }
    }

    /// Resolves a patch set, all or nothing.
    ///
    /// The result follows the order of `ids`. A repeated id is resolved once, at its first
    /// position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] listing every id that is not registered, in request order.
    pub fn lookup<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Arc<PatchDescriptor>>> {
        let mut seen = HashSet::new();
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            match self.entries.get(id) {
                Some(entry) => found.push(entry.value().clone()),
                None => missing.push(id.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(found)
        } else {
            Err(Error::NotFound(missing))
        }
    }

    /// Returns a single descriptor.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<PatchDescriptor>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Returns every descriptor, sorted by id.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<PatchDescriptor>> {
        let mut all: Vec<Arc<PatchDescriptor>> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let catalog = PatchCatalog::new();
        assert!(catalog
            .register(PatchDescriptor::new("fixA", "FNA").describe("first"))
            .is_none());

        let before = catalog.lookup(&["fixA"]).unwrap();

        let replaced = catalog
            .register(PatchDescriptor::new("fixA", "FNA").describe("second"))
            .unwrap();
        assert_eq!(replaced.description(), "first");

        let after = catalog.lookup(&["fixA"]).unwrap();
        assert_eq!(after[0].description(), "second");
        assert_eq!(before[0].description(), "first");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_lookup_reports_every_missing_id() {
        let catalog = PatchCatalog::new();
        catalog.register(PatchDescriptor::new("fixA", "FNA"));

        match catalog.lookup(&["ghost", "fixA", "phantom"]) {
            Err(Error::NotFound(ids)) => assert_eq!(ids, vec!["ghost", "phantom"]),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_keeps_order_and_dedups() {
        let catalog = PatchCatalog::new();
        catalog.register(PatchDescriptor::new("a", "FNA"));
        catalog.register(PatchDescriptor::new("b", "FNA"));

        let resolved = catalog.lookup(&["b", "a", "b"]).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let empty: [&str; 0] = [];
        assert!(catalog.lookup(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_sorted() {
        let catalog = PatchCatalog::new();
        catalog.register_builtin();
        let ids: Vec<String> = catalog
            .list_all()
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.contains(&"symlink-noop".to_string()));
        assert!(!catalog.is_empty());
    }
}
