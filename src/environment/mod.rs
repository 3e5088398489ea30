//! Process environment profiles with snapshot and restore.
//!
//! The process environment is the one resource every launch contends for. This module gives
//! it three layers of structure:
//!
//! - [`EnvironmentProfile`]: an ordered set of overrides, applied in one step
//! - [`EnvSnapshot`] / [`ScopedEnv`]: the previous values of the touched keys, restored
//!   exactly (including keys that were unset), either explicitly or on drop
//! - [`LaunchGuard`]: a process-wide single-writer flag held for the whole launch
//!
//! Values are [`OsString`](std::ffi::OsString)s so a restore is byte-identical even for
//! values that are not valid UTF-8.

pub mod guard;
pub mod profile;
pub mod snapshot;

pub use guard::{LaunchGuard, ScopedEnv};
pub use profile::EnvironmentProfile;
pub use snapshot::EnvSnapshot;
