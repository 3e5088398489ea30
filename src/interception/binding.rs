//! Per-descriptor binding state.

use std::sync::{
    atomic::{AtomicU8, AtomicUsize, Ordering},
    Arc, Mutex,
};

use strum::{Display, EnumIter};

use crate::{catalog::PatchDescriptor, runtime::SubscriptionId};

/// Lifecycle of one patch descriptor inside the engine.
///
/// ```text
/// Unbound ──install──► Searching ──module seen──► Bound ──rewrites installed──► Applied
/// ```
///
/// Transitions only move forward. `Searching → Bound` is a compare-and-swap: whichever of
/// the initial scan or a load event wins it performs the application, every other
/// notification is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum BindingState {
    /// Registered, no action taken
    Unbound = 0,
    /// Subscribed to load events, waiting for the target module
    Searching = 1,
    /// Target module seen, resolving interceptions
    Bound = 2,
    /// All resolvable interceptions installed, unsubscribed
    Applied = 3,
}

impl BindingState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BindingState::Searching,
            2 => BindingState::Bound,
            3 => BindingState::Applied,
            _ => BindingState::Unbound,
        }
    }
}

/// Outcome of installing one descriptor.
///
/// A report taken while the descriptor is still [`BindingState::Searching`] has no applied
/// interceptions yet. Query the engine again after the target module loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Descriptor id
    pub id: String,
    /// Target module name
    pub module: String,
    /// State at the time the report was taken
    pub state: BindingState,
    /// Number of interceptions installed
    pub applied: usize,
    /// Interceptions that could not be resolved, as `Type::Method(shape)`
    pub skipped: Vec<String>,
}

/// Binding of one descriptor to the runtime.
pub(crate) struct Binding {
    descriptor: Arc<PatchDescriptor>,
    state: AtomicU8,
    subscription: Mutex<Option<SubscriptionId>>,
    applied: AtomicUsize,
    skipped: Mutex<Vec<String>>,
}

impl Binding {
    pub(crate) fn new(descriptor: Arc<PatchDescriptor>) -> Self {
        Self {
            descriptor,
            state: AtomicU8::new(BindingState::Unbound as u8),
            subscription: Mutex::new(None),
            applied: AtomicUsize::new(0),
            skipped: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn descriptor(&self) -> &Arc<PatchDescriptor> {
        &self.descriptor
    }

    pub(crate) fn state(&self) -> BindingState {
        BindingState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves `from → to`, returning `false` if the binding was not in `from`.
    pub(crate) fn transition(&self, from: BindingState, to: BindingState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn subscription(&self) -> &Mutex<Option<SubscriptionId>> {
        &self.subscription
    }

    pub(crate) fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_skipped(&self, target: String) {
        lock!(self.skipped).push(target);
    }

    pub(crate) fn report(&self) -> InstallReport {
        InstallReport {
            id: self.descriptor.id().to_string(),
            module: self.descriptor.target_module().to_string(),
            state: self.state(),
            applied: self.applied.load(Ordering::Acquire),
            skipped: lock!(self.skipped).clone(),
        }
    }
}
