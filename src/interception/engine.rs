//! The deferred interception engine.

use std::sync::{Arc, Weak};

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, info, warn};

use crate::{
    catalog::PatchDescriptor,
    interception::{
        binding::{Binding, BindingState, InstallReport},
        InstalledHook,
    },
    runtime::{LoadListener, ManagedRuntime, ModuleInfo},
    Result,
};

/// Binds patch descriptors to a managed runtime and applies them exactly once.
///
/// Each installed descriptor gets a [`Binding`] that walks `Unbound → Searching → Bound →
/// Applied`. A descriptor only leaves `Searching` once its target module is loaded with a
/// method table, a module the runtime has merely named does not bind it.
///
/// Bindings are keyed by descriptor id and live as long as the engine, so installing the same
/// id twice never applies it twice. A descriptor registered again under a known id is ignored
/// with a warning and the first version stays in effect.
///
/// # Race Freedom
///
/// `install` holds the binding's subscription lock while it first subscribes to load events
/// and then scans the modules already loaded. A module loaded concurrently is therefore
/// reported by the scan, by its load event, or by both. Both paths funnel into
/// [`InterceptionEngine::bind`], whose compare-and-swap lets exactly one of them apply the
/// descriptor and discards the other.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotlaunch::{
///     catalog::{Interception, PatchDescriptor},
///     interception::{BindingState, InterceptionEngine},
///     runtime::{ArgumentShape, ModuleImage, ModuleSpace, ParamKind, Value},
/// };
///
/// let space = Arc::new(ModuleSpace::new());
/// let engine = InterceptionEngine::new(space.clone());
///
/// let patch = PatchDescriptor::new("always-true", "Demo").intercept(Interception::replace(
///     "Demo.Platform",
///     "IsSupported",
///     |_| Ok(Value::Bool(true)),
/// ));
/// let report = engine.install(Arc::new(patch))?;
/// assert_eq!(report.state, BindingState::Searching);
///
/// space.load(ModuleImage::new("Demo").method(
///     "Demo.Platform",
///     "IsSupported",
///     ArgumentShape::new(),
///     ParamKind::Bool,
///     |_| Ok(Value::Bool(false)),
/// ));
/// assert_eq!(engine.state("always-true"), Some(BindingState::Applied));
/// assert_eq!(space.invoke("Demo", "Demo.Platform", "IsSupported", &mut [])?, Value::Bool(true));
/// # Ok::<(), dotlaunch::Error>(())
/// ```
pub struct InterceptionEngine {
    runtime: Arc<dyn ManagedRuntime>,
    bindings: DashMap<String, Arc<Binding>>,
}

impl InterceptionEngine {
    /// Creates an engine bound to a runtime.
    pub fn new(runtime: Arc<dyn ManagedRuntime>) -> Self {
        Self {
            runtime,
            bindings: DashMap::new(),
        }
    }

    /// Installs a descriptor.
    ///
    /// If the target module is already loaded the descriptor is applied before this returns.
    /// Otherwise it stays [`BindingState::Searching`] and is applied on the thread that later
    /// loads the module. Installing an id the engine already knows is a no-op that returns the
    /// existing binding's report.
    ///
    /// # Errors
    ///
    /// Never fails for unresolvable interceptions, those are logged and recorded in
    /// [`InstallReport::skipped`]. The `Result` is kept for backends whose subscription can
    /// fail.
    pub fn install(&self, descriptor: Arc<PatchDescriptor>) -> Result<InstallReport> {
        let binding = match self.bindings.entry(descriptor.id().to_string()) {
            Entry::Occupied(existing) => {
                let report = existing.get().report();
                if Arc::ptr_eq(existing.get().descriptor(), &descriptor) {
                    debug!(
                        "Patch '{}' already installed ({}), ignoring",
                        report.id, report.state
                    );
                } else {
                    warn!(
                        "Patch '{}' was re-registered, keeping the version already installed ({})",
                        report.id, report.state
                    );
                }
                return Ok(report);
            }
            Entry::Vacant(slot) => slot.insert(Arc::new(Binding::new(descriptor))).clone(),
        };

        if !binding.transition(BindingState::Unbound, BindingState::Searching) {
            return Ok(binding.report());
        }

        let target = binding.descriptor().target_module().to_string();
        let found = {
            let mut subscription = lock!(binding.subscription());
            *subscription = Some(self.runtime.subscribe(self.listener(&binding)));
            self.runtime
                .loaded_modules()
                .iter()
                .any(|module| module.name == target)
                && self.runtime.has_method_table(&target)
        };

        if found {
            Self::bind(self.runtime.as_ref(), &binding);
        } else {
            debug!(
                "Patch '{}' waiting for module '{}'",
                binding.descriptor().id(),
                target
            );
        }

        Ok(binding.report())
    }

    /// Installs several descriptors in order, collecting their reports.
    ///
    /// # Errors
    ///
    /// Returns the first installation error.
    pub fn install_all(&self, descriptors: &[Arc<PatchDescriptor>]) -> Result<Vec<InstallReport>> {
        descriptors
            .iter()
            .map(|descriptor| self.install(descriptor.clone()))
            .collect()
    }

    /// Returns the binding state of a descriptor, `None` if it was never installed.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<BindingState> {
        self.bindings.get(id).map(|binding| binding.state())
    }

    /// Returns the current report of a descriptor, `None` if it was never installed.
    #[must_use]
    pub fn report(&self, id: &str) -> Option<InstallReport> {
        self.bindings.get(id).map(|binding| binding.report())
    }

    /// Returns the reports of every installed descriptor, sorted by id.
    #[must_use]
    pub fn reports(&self) -> Vec<InstallReport> {
        let mut reports: Vec<InstallReport> = self
            .bindings
            .iter()
            .map(|binding| binding.report())
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        reports
    }

    fn listener(&self, binding: &Arc<Binding>) -> LoadListener {
        let runtime: Weak<dyn ManagedRuntime> = Arc::downgrade(&self.runtime);
        let binding = Arc::downgrade(binding);
        Arc::new(move |module: &ModuleInfo| {
            let (Some(runtime), Some(binding)) = (runtime.upgrade(), binding.upgrade()) else {
                return;
            };
            if module.name != binding.descriptor().target_module() {
                return;
            }
            if runtime.has_method_table(&module.name) {
                Self::bind(runtime.as_ref(), &binding);
            } else {
                debug!(
                    "Module '{}' has no method table yet, patch '{}' keeps waiting",
                    module.name,
                    binding.descriptor().id()
                );
            }
        })
    }

    fn bind(runtime: &dyn ManagedRuntime, binding: &Binding) {
        let descriptor = binding.descriptor();
        if !binding.transition(BindingState::Searching, BindingState::Bound) {
            debug!(
                "Duplicate load notification for patch '{}' discarded",
                descriptor.id()
            );
            return;
        }

        let patch: Arc<str> = Arc::from(descriptor.id());
        for interception in descriptor.interceptions() {
            let hook = InstalledHook {
                patch: patch.clone(),
                action: interception.action().clone(),
            };
            let installed = runtime
                .resolve(
                    descriptor.target_module(),
                    interception.target_type(),
                    interception.target_method(),
                    interception.shape(),
                )
                .and_then(|method| runtime.install(&method, hook));

            match installed {
                Ok(()) => binding.record_applied(),
                Err(error) => {
                    warn!("Patch '{}': {}, skipping", descriptor.id(), error);
                    binding.record_skipped(interception.target());
                }
            }
        }

        binding.transition(BindingState::Bound, BindingState::Applied);

        let subscription = lock!(binding.subscription()).take();
        if let Some(id) = subscription {
            runtime.unsubscribe(id);
        }

        let report = binding.report();
        info!(
            "Applied patch '{}' to '{}' ({} installed, {} skipped)",
            report.id,
            report.module,
            report.applied,
            report.skipped.len()
        );
    }
}
