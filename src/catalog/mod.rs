//! The patch catalog.
//!
//! A [`PatchDescriptor`] names a set of [`Interception`]s against one module. The
//! [`PatchCatalog`] holds descriptors by id and resolves the patch set of a launch request
//! all or nothing.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`descriptor`] | [`PatchDescriptor`] and [`Interception`] builders |
//! | [`registry`] | [`PatchCatalog`] |
//! | [`names`] | [`LibraryNameMap`] for the library renaming patch |
//! | [`builtin`] | The descriptors registered by [`PatchCatalog::register_builtin`] |

pub mod builtin;
pub mod descriptor;
pub mod names;
pub mod registry;

pub use builtin::{
    FRAME_TIMING, NATIVE_LIBRARY_NAMES, PLATFORM_CAPABILITIES, QUIET_EXIT, SYMLINK_NOOP,
};
pub use descriptor::{Interception, PatchDescriptor};
pub use names::LibraryNameMap;
pub use registry::PatchCatalog;
