//! Idempotent file staging.
//!
//! A file is staged by comparing the SHA-1 of the source with the SHA-1 of the destination.
//! Identical files are left alone. Anything else is written to a temporary sibling of the
//! destination and renamed over it, so a reader never sees a half-written artifact and an
//! interrupted run leaves at worst a stray temporary file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use sha1::{Digest, Sha1};

use crate::{Error, Result};

/// What staging did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageOutcome {
    /// The destination was created or replaced
    Written,
    /// The destination already had identical content
    Unchanged,
}

/// A read-only view of a file's bytes.
///
/// Memory-maps non-empty files. Zero-length files cannot be mapped on every platform and are
/// represented by an empty slice.
pub(crate) struct FileBytes {
    map: Option<Mmap>,
    permissions: fs::Permissions,
}

impl FileBytes {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let metadata = file.metadata()?;
        let permissions = metadata.permissions();
        if metadata.len() == 0 {
            return Ok(Self {
                map: None,
                permissions,
            });
        }

        let map = unsafe { Mmap::map(&file) }.map_err(|error| {
            Error::Error(format!("Failed to map {}: {}", path.display(), error))
        })?;
        Ok(Self {
            map: Some(map),
            permissions,
        })
    }

    pub(crate) fn data(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub(crate) fn permissions(&self) -> fs::Permissions {
        self.permissions.clone()
    }
}

/// SHA-1 digest of a file's content.
///
/// # Errors
///
/// Returns I/O errors from opening or mapping the file.
pub fn file_digest(path: &Path) -> Result<[u8; 20]> {
    let bytes = FileBytes::open(path)?;
    Ok(digest(bytes.data()))
}

fn digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);

    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn temporary_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.dotlaunch-tmp"))
}

/// Copies `source` to `dest` unless `dest` already holds identical bytes.
///
/// Parent directories of `dest` are created as needed and the source's permissions are
/// carried over. With `force` set the file is rewritten even when identical.
///
/// # Errors
///
/// Returns I/O errors from reading the source or writing the destination.
pub fn stage_file(source: &Path, dest: &Path, force: bool) -> Result<StageOutcome> {
    let bytes = FileBytes::open(source)?;
    let data = bytes.data();

    if !force && dest.is_file() && file_digest(dest)? == digest(data) {
        return Ok(StageOutcome::Unchanged);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let temporary = temporary_sibling(dest);
    let written = fs::write(&temporary, data)
        .and_then(|()| fs::set_permissions(&temporary, bytes.permissions()))
        .and_then(|()| fs::rename(&temporary, dest));
    if let Err(error) = written {
        let _ = fs::remove_file(&temporary);
        return Err(error.into());
    }

    Ok(StageOutcome::Written)
}
