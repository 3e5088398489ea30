//! The native side of a launch.
//!
//! Before the managed entry point runs, the host installs its base trace hooks into the
//! runtime, preloads native libraries in dependency order and then hands control to the
//! runtime's entry point. All of this goes through the [`NativeHost`] trait so the launch
//! sequence can be driven against a recording host in tests.
//!
//! All unsafe code of the crate lives here: the host library's C ABI in [`dynamic`] and the
//! detour callbacks that route redirected runtime calls through the installed hooks in
//! [`detour`].
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`order`] | [`LibraryOrder`] and its `DT_NEEDED` validation |
//! | [`dynamic`] | [`DynamicHost`], the `libloading` implementation |
//! | [`detour`] | Load and method table callbacks, value marshalling, call dispatch |

use std::path::Path;

use crate::Result;

pub mod detour;
pub mod dynamic;
pub mod order;

pub use dynamic::DynamicHost;
pub use order::{dependency_violation, needed_libraries, LibraryOrder};

/// Native operations the launch controller needs from the host.
pub trait NativeHost: Send + Sync {
    /// Installs the runtime's base trace hooks. Idempotent once it succeeded, a failed
    /// attempt is retried by the next call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Native`] if the host library cannot be loaded.
    fn install_base_hooks(&self) -> Result<()>;

    /// Loads one native library with global symbol visibility.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Native`] if the library fails to load.
    fn preload(&self, library: &Path) -> Result<()>;

    /// Runs the managed entry point of `module` and returns its exit code.
    ///
    /// The call blocks until the managed program returns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Native`] if the entry point cannot be reached at all. A program
    /// that runs and fails reports that through its exit code.
    fn run_entry(&self, module: &Path, args: &[String]) -> Result<i32>;

    /// The runtime's last error message, if it recorded one.
    fn last_error(&self) -> Option<String>;
}
