// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'native/dynamic.rs' calls into the host library through raw function pointers
// - 'native/detour.rs' marshals values across the host library's detour callbacks
// - 'extraction/stage.rs' uses mmap to map a file into memory

//! # dotlaunch
//!
//! A host for running pre-built managed desktop programs inside a foreign runtime on a
//! platform they were never built for. `dotlaunch` prepares the process, rewrites a small
//! set of runtime methods the programs depend on and then hands control to the runtime's
//! entry point.
//!
//! ## Features
//!
//! - **Environment profiles** - Ordered overrides with exact, byte-identical restore
//! - **Extraction pipeline** - Ordered, idempotent staging of libraries, patch modules and assets
//! - **Patch catalog** - Named compatibility patches, resolved all or nothing
//! - **Interception engine** - Deferred, exactly-once method hooks keyed on module loads
//! - **Launch controller** - One guarded launch sequence with a device compatibility overlay
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotlaunch::prelude::*;
//!
//! let config = HostConfig::from_file("dotlaunch.toml".as_ref())?;
//! let controller = HostController::from_config(config)?;
//!
//! let outcome = controller.launch(
//!     LaunchRequest::builder("/games/Celeste/Celeste.exe")
//!         .patches(["symlink-noop", "native-library-names"])
//!         .build(),
//! )?;
//! println!("exit code {}", outcome.exit_code);
//! # Ok::<(), dotlaunch::Error>(())
//! ```
//!
//! ### Patching Without a Launch
//!
//! The interception engine works against any [`runtime::ManagedRuntime`]. The in-process
//! [`runtime::ModuleSpace`] is enough to see a patch bind once its module loads:
//!
//! ```rust
//! use std::sync::Arc;
//! use dotlaunch::prelude::*;
//!
//! let space = Arc::new(ModuleSpace::new());
//! let catalog = PatchCatalog::new();
//! catalog.register_builtin();
//!
//! let engine = InterceptionEngine::new(space.clone());
//! engine.install_all(&catalog.lookup(&["platform-capabilities"])?)?;
//! assert_eq!(engine.state("platform-capabilities"), Some(BindingState::Searching));
//!
//! space.load(ModuleImage::new("FNA").method(
//!     "Microsoft.Xna.Framework.FNAPlatform",
//!     "SupportsOrientationChanges",
//!     ArgumentShape::new(),
//!     ParamKind::Bool,
//!     |_| Ok(Value::Bool(false)),
//! ));
//! assert_eq!(engine.state("platform-capabilities"), Some(BindingState::Applied));
//! # Ok::<(), dotlaunch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`environment`] - Profiles, snapshots and the process-wide launch guard
//! - [`extraction`] - The staging pipeline and its built-in steps
//! - [`catalog`] - Patch descriptors, the registry and the built-in patches
//! - [`interception`] - The engine binding descriptors to a runtime
//! - [`runtime`] - The seam to the managed runtime and its in-process model
//! - [`native`] - Library preloading and the host library entry point
//! - [`overlay`] - The device compatibility overlay decision
//! - [`host`] - The launch sequence
//! - [`config`] - TOML configuration
//! - [`telemetry`] - Frame timing counters
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Unresolvable interception targets are
//! not errors: they are logged and listed in the install report, and the rest of the patch
//! still applies.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

pub mod catalog;
pub mod config;
pub mod environment;
pub mod extraction;
pub mod host;
pub mod interception;
pub mod native;
pub mod overlay;
pub mod runtime;
pub mod telemetry;

/// `dotlaunch` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotlaunch` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
