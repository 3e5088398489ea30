//! Deferred, exactly-once method interception.
//!
//! The engine takes [`PatchDescriptor`](crate::catalog::PatchDescriptor)s from the catalog
//! and binds them to the managed runtime as soon as their target module is loaded, whether
//! that already happened or happens later on another thread.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Modes, handler closures, installed hooks and [`dispatch`] |
//! | [`binding`] | The per-descriptor [`BindingState`] machine and [`InstallReport`] |
//! | [`engine`] | [`InterceptionEngine`], subscribe-then-scan installation |
//!
//! # Hook Execution Flow
//!
//! ```text
//! Method invoked
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  wrap-before      │───► may rewrite arguments
//! │  handlers         │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  replace handler? │───► yes ───► handler value, original skipped
//! └───────────────────┘
//!         │ no
//!         ▼
//! ┌───────────────────┐
//! │  original body    │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  wrap-after       │───► observe arguments and result
//! │  handlers         │
//! └───────────────────┘
//!         │
//!         ▼
//!    Return result
//! ```
//!
//! Handlers run synchronously on the thread that invoked the method.

pub mod binding;
pub mod engine;
pub mod types;

pub use binding::{BindingState, InstallReport};
pub use engine::InterceptionEngine;
pub use types::{
    dispatch, AfterFn, BeforeFn, CallContext, InstalledHook, InterceptionAction, InterceptionMode,
    ReplaceFn,
};
