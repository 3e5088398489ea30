//! RAII guards over the process environment.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::{environment::EnvSnapshot, Error, Result};

/// Restores an [`EnvSnapshot`] when dropped.
///
/// Covers normal returns, early `?` returns and unwinding panics alike.
#[must_use = "dropping a ScopedEnv restores the environment immediately"]
pub struct ScopedEnv {
    snapshot: Option<EnvSnapshot>,
}

impl ScopedEnv {
    /// Wraps a snapshot.
    pub fn new(snapshot: EnvSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    /// Restores now instead of at drop.
    pub fn restore(mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore();
        }
    }

    /// Keeps the current environment and discards the snapshot.
    pub fn disarm(mut self) -> EnvSnapshot {
        self.snapshot.take().unwrap_or_default()
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            debug!("Restoring {} environment variable(s)", snapshot.keys().count());
            snapshot.restore();
        }
    }
}

static LAUNCH_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

/// Exclusive ownership of the process environment for one launch.
///
/// At most one guard exists per process. The flag is released when the guard drops.
#[must_use = "the launch slot is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LaunchGuard {
    _private: (),
}

impl LaunchGuard {
    /// Claims the launch slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LaunchInProgress`] if another guard is alive.
    pub fn acquire() -> Result<Self> {
        LAUNCH_IN_PROGRESS
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| Error::LaunchInProgress)
    }

    /// Returns `true` while a launch holds the slot.
    #[must_use]
    pub fn is_held() -> bool {
        LAUNCH_IN_PROGRESS.load(Ordering::Acquire)
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        LAUNCH_IN_PROGRESS.store(false, Ordering::Release);
    }
}
