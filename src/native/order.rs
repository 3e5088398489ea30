//! Native library preload order.

use std::path::{Path, PathBuf};

use goblin::elf::Elf;
use log::{debug, warn};

use crate::{extraction::stage::FileBytes, Result};

/// Names of the shared objects an ELF file depends on (`DT_NEEDED`).
///
/// # Errors
///
/// Returns I/O errors from reading the file and [`crate::Error::GoblinErr`] if it is not ELF.
pub fn needed_libraries(path: &Path) -> Result<Vec<String>> {
    let bytes = FileBytes::open(path)?;
    let elf = Elf::parse(bytes.data())?;
    Ok(elf.libraries.iter().map(|name| (*name).to_string()).collect())
}

/// Finds the first library that depends on a library listed after it.
///
/// `entries` pairs each library's file name with its dependencies, in preload order. Returns
/// `(dependent, dependency)`.
#[must_use]
pub fn dependency_violation(entries: &[(String, Vec<String>)]) -> Option<(String, String)> {
    entries.iter().enumerate().find_map(|(index, (name, needed))| {
        entries[index + 1..]
            .iter()
            .find(|(later, _)| needed.iter().any(|dependency| dependency == later))
            .map(|(later, _)| (name.clone(), later.clone()))
    })
}

/// The ordered list of native libraries preloaded before the entry point.
///
/// A dependent library loaded before its dependency fails to load, so the order is a
/// contract. [`LibraryOrder::validate`] checks it against the `DT_NEEDED` entries of the
/// listed libraries themselves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LibraryOrder {
    libraries: Vec<PathBuf>,
}

impl LibraryOrder {
    /// Creates an order from paths.
    pub fn new<I, P>(libraries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            libraries: libraries.into_iter().map(Into::into).collect(),
        }
    }

    /// Libraries in preload order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.libraries.iter().map(PathBuf::as_path)
    }

    /// Number of libraries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    /// Returns `true` if nothing is preloaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Checks that every library exists and none precedes one of its dependencies.
    ///
    /// Libraries whose dependencies cannot be read are not checked as dependents. They still
    /// count as dependencies of earlier entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for a missing library or an order violation.
    pub fn validate(&self) -> Result<()> {
        let mut entries = Vec::with_capacity(self.libraries.len());
        for library in &self.libraries {
            if !library.is_file() {
                return Err(config_error!(
                    "Preload library {} does not exist",
                    library.display()
                ));
            }

            let name = library
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let needed = needed_libraries(library).unwrap_or_else(|error| {
                warn!(
                    "Cannot read dependencies of {}: {}",
                    library.display(),
                    error
                );
                Vec::new()
            });
            debug!("{} needs {:?}", name, needed);
            entries.push((name, needed));
        }

        match dependency_violation(&entries) {
            Some((dependent, dependency)) => Err(config_error!(
                "Preload order lists '{}' before its dependency '{}'",
                dependent,
                dependency
            )),
            None => Ok(()),
        }
    }
}
