//! The seam between the host and the foreign managed runtime.
//!
//! Everything that depends on how the managed runtime represents modules and methods sits
//! behind two traits. The interception engine is written purely against them and never
//! touches runtime internals:
//!
//! - [`ModuleSource`] reports which modules are loaded and fans out load events
//! - [`DetourBackend`] resolves a method inside a loaded module and installs a hook on it
//!
//! [`ManagedRuntime`] is the union of both and is what the engine holds.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`signature`] | Parameter kinds and argument shapes for overload selection |
//! | [`value`] | Argument and return values seen by handlers |
//! | [`space`] | [`ModuleSpace`], the in-process implementation of the seam |
//!
//! # Load Event Ordering
//!
//! Implementations must make a module visible to [`ModuleSource::loaded_modules`] *before*
//! they take the listener snapshot for its load event. Together with the engine subscribing
//! before it scans, this guarantees that a module loaded concurrently with an install is seen
//! by the scan, by the event, or by both, and never by neither.

use std::{fmt, path::PathBuf, sync::Arc};

use crate::{interception::InstalledHook, Result};

pub mod signature;
pub mod space;
pub mod value;

pub use signature::{ArgumentShape, Param, ParamFlags, ParamKind};
pub use space::{MethodBody, ModuleImage, ModuleSpace};
pub use value::Value;

/// Identifies one load-event subscription.
pub type SubscriptionId = u64;

/// Callback invoked for every module load event.
///
/// Listeners run synchronously on the thread that loaded the module, with no runtime locks
/// held.
pub type LoadListener = Arc<dyn Fn(&ModuleInfo) + Send + Sync>;

/// Identity of a loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleInfo {
    /// Simple module name (`FNA`, `Mono.Posix`), matched exactly by the engine
    pub name: String,
    /// Path the module was loaded from, when known
    pub path: Option<PathBuf>,
}

impl ModuleInfo {
    /// Creates a module identity without a path.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// A resolved method inside a loaded module.
///
/// Produced by [`DetourBackend::resolve`] and handed back to [`DetourBackend::install`].
/// `slot` is backend-specific and only meaningful to the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Name of the declaring module
    pub module: String,
    /// Fully qualified name of the declaring type
    pub type_name: String,
    /// Method name
    pub method: String,
    /// Declared parameters of the resolved overload
    pub params: Vec<Param>,
    /// Backend-specific method slot
    pub slot: usize,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}!{}::{}{}",
            self.module,
            self.type_name,
            self.method,
            ArgumentShape::from(self.params.clone())
        )
    }
}

/// Source of module identity and load events.
pub trait ModuleSource: Send + Sync {
    /// Returns every module loaded so far, in load order.
    fn loaded_modules(&self) -> Vec<ModuleInfo>;

    /// Registers a listener for subsequent load events.
    fn subscribe(&self, listener: LoadListener) -> SubscriptionId;

    /// Removes a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Method resolution and hook installation.
pub trait DetourBackend: Send + Sync {
    /// Returns `true` once `module` is loaded with a method table that can be resolved against.
    ///
    /// A module the runtime has only named is not resolvable yet, and the engine keeps waiting
    /// for a later load event of the same module.
    fn has_method_table(&self, module: &str) -> bool;

    /// Resolves a method by declaring type and name, optionally narrowed by argument shape.
    ///
    /// Without a shape the first declared overload wins.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InterceptionResolution`] if the module, type, method or a
    /// matching overload does not exist.
    fn resolve(
        &self,
        module: &str,
        type_name: &str,
        method: &str,
        shape: Option<&ArgumentShape>,
    ) -> Result<MethodRef>;

    /// Installs a hook on a resolved method.
    ///
    /// # Errors
    ///
    /// Returns an error if the method reference no longer names a live method.
    fn install(&self, method: &MethodRef, hook: InstalledHook) -> Result<()>;
}

/// A managed runtime the interception engine can bind against.
pub trait ManagedRuntime: ModuleSource + DetourBackend {}

impl<T: ModuleSource + DetourBackend> ManagedRuntime for T {}
