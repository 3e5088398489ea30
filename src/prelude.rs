//! # dotlaunch Prelude
//!
//! The types most launchers and patch authors need, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotlaunch operations
pub use crate::Error;

/// The result type used throughout dotlaunch
pub use crate::Result;

// ================================================================================================
// Launching
// ================================================================================================

/// Host configuration
pub use crate::config::HostConfig;

/// The launch controller and its request and outcome types
pub use crate::host::{HostController, LaunchOutcome, LaunchRequest};

/// Native host seam
pub use crate::native::{DynamicHost, LibraryOrder, NativeHost};

/// Compatibility overlay
pub use crate::overlay::{DeviceIdentity, HintState, OverlayRules};

/// Environment handling
pub use crate::environment::{EnvSnapshot, EnvironmentProfile, ScopedEnv};

// ================================================================================================
// Patching
// ================================================================================================

/// Patch descriptors and the catalog
pub use crate::catalog::{Interception, LibraryNameMap, PatchCatalog, PatchDescriptor};

/// The interception engine
pub use crate::interception::{
    BindingState, CallContext, InstallReport, InterceptionEngine, InterceptionMode,
};

/// The runtime seam and its in-process model
pub use crate::runtime::{
    ArgumentShape, ManagedRuntime, ModuleImage, ModuleSpace, ParamFlags, ParamKind, Value,
};

// ================================================================================================
// Extraction
// ================================================================================================

/// The staging pipeline and built-in steps
pub use crate::extraction::{
    AssetStep, ExtractionContext, ExtractionPipeline, ExtractionStep, NativeLibraryStep,
    PatchModuleStep,
};
