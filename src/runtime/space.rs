//! In-process module space.
//!
//! [`ModuleSpace`] is the host's model of the foreign runtime's loaded modules. Complete
//! [`ModuleImage`]s carry a method table whose bodies are Rust-callable, either plain closures
//! or calls back into the native runtime. Every call made through [`ModuleSpace::invoke`] is
//! routed through the hooks the interception engine installed on the target method.
//!
//! A module the native layer only names, without a method table, is kept as a placeholder.
//! Nothing can be resolved on a placeholder, and a later complete image of the same name
//! replaces it and raises a fresh load event.
//!
//! # Thread Safety
//!
//! All operations take `&self`. Module names are kept in an append-only `boxcar::Vec` in load
//! order, the modules themselves are indexed by name in a `DashMap` and per-method hook
//! tables sit behind their own `RwLock`. Load listeners are invoked with no lock held, so a
//! listener may call back into the space (resolve, install, load) without deadlocking.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, trace};

use crate::{
    interception::{dispatch, InstalledHook},
    runtime::{
        ArgumentShape, DetourBackend, LoadListener, MethodRef, ModuleInfo, ModuleSource, Param,
        ParamKind, SubscriptionId, Value,
    },
    Error, Result,
};

/// Rust-callable method body.
pub type MethodBody = Arc<dyn Fn(&mut [Value]) -> Result<Value> + Send + Sync>;

/// Called before the first hook is attached to a method, to route the runtime's calls
/// through [`ModuleSpace::invoke_method`].
pub type ArmFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

struct MethodDef {
    type_name: String,
    name: String,
    params: Vec<Param>,
    returns: ParamKind,
    body: MethodBody,
    arm: Option<ArmFn>,
}

/// A loadable module: a name, an optional origin path and a list of methods.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::runtime::{ArgumentShape, ModuleImage, ModuleSpace, ParamKind, Value};
///
/// let image = ModuleImage::new("Demo").method(
///     "Demo.Math",
///     "Twice",
///     ArgumentShape::new().param(ParamKind::I32),
///     ParamKind::I32,
///     |args| Ok(Value::I32(args[0].as_i64().unwrap_or(0) as i32 * 2)),
/// );
///
/// let space = ModuleSpace::new();
/// space.load(image);
/// let result = space.invoke("Demo", "Demo.Math", "Twice", &mut [Value::I32(21)])?;
/// assert_eq!(result, Value::I32(42));
/// # Ok::<(), dotlaunch::Error>(())
/// ```
pub struct ModuleImage {
    name: String,
    path: Option<PathBuf>,
    methods: Vec<MethodDef>,
}

impl ModuleImage {
    /// Creates an empty module image.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            methods: Vec::new(),
        }
    }

    /// Sets the path the module is loaded from.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Declares a method. Overloads are kept in declaration order.
    #[must_use]
    pub fn method<F>(
        mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        params: ArgumentShape,
        returns: ParamKind,
        body: F,
    ) -> Self
    where
        F: Fn(&mut [Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(MethodDef {
            type_name: type_name.into(),
            name: name.into(),
            params: params.params().to_vec(),
            returns,
            body: Arc::new(body),
            arm: None,
        });
        self
    }

    /// Sets the arm callback of the most recently declared method.
    ///
    /// The callback runs once, when the first hook is installed on that method. If it fails
    /// the hook is not installed.
    #[must_use]
    pub fn on_first_hook<F>(mut self, arm: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        if let Some(last) = self.methods.last_mut() {
            last.arm = Some(Arc::new(arm));
        }
        self
    }

    /// Returns the module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of declared methods.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.clone(),
            path: self.path.clone(),
        }
    }
}

struct LoadedMethod {
    def: MethodDef,
    hooks: RwLock<Vec<InstalledHook>>,
}

struct LoadedModule {
    info: ModuleInfo,
    methods: Vec<LoadedMethod>,
    placeholder: bool,
}

impl LoadedModule {
    fn from_image(image: ModuleImage) -> Self {
        let info = image.info();
        let methods = image
            .methods
            .into_iter()
            .map(|def| LoadedMethod {
                def,
                hooks: RwLock::new(Vec::new()),
            })
            .collect();
        Self {
            info,
            methods,
            placeholder: false,
        }
    }

    fn placeholder(info: ModuleInfo) -> Self {
        Self {
            info,
            methods: Vec::new(),
            placeholder: true,
        }
    }

    fn method_ref(&self, slot: usize) -> Option<MethodRef> {
        self.methods.get(slot).map(|m| MethodRef {
            module: self.info.name.clone(),
            type_name: m.def.type_name.clone(),
            method: m.def.name.clone(),
            params: m.def.params.clone(),
            slot,
        })
    }
}

/// The set of modules loaded into the foreign runtime.
pub struct ModuleSpace {
    order: boxcar::Vec<String>,
    by_name: DashMap<String, Arc<LoadedModule>>,
    listeners: Mutex<Vec<(SubscriptionId, LoadListener)>>,
    next_subscription: AtomicU64,
}

impl ModuleSpace {
    /// Creates an empty module space.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: boxcar::Vec::new(),
            by_name: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Loads a module and raises its load event.
    ///
    /// A complete image replaces a placeholder of the same name. Loading a name whose method
    /// table is already present keeps the first image (and the hooks installed on it) but
    /// still raises a load event, as a runtime does when an assembly is loaded into a second
    /// context.
    pub fn load(&self, image: ModuleImage) -> ModuleInfo {
        let info = image.info();
        match self.by_name.entry(info.name.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().placeholder {
                    existing.insert(Arc::new(LoadedModule::from_image(image)));
                    debug!("Method table of module '{}' loaded", info.name);
                } else {
                    debug!("Module '{}' loaded again, keeping first image", info.name);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(LoadedModule::from_image(image)));
                self.order.push(info.name.clone());
                debug!("Loaded module '{}'", info.name);
            }
        }
        self.notify(&info);
        info
    }

    /// Records a module the native layer reports as loaded without a method table.
    ///
    /// An unknown name is kept as a placeholder. Either way a load event is raised.
    pub fn announce(&self, info: ModuleInfo) -> ModuleInfo {
        if let Entry::Vacant(slot) = self.by_name.entry(info.name.clone()) {
            slot.insert(Arc::new(LoadedModule::placeholder(info.clone())));
            self.order.push(info.name.clone());
            debug!("Module '{}' announced without a method table", info.name);
        }
        self.notify(&info);
        info
    }

    /// Returns `true` if a module with this name is loaded with its method table.
    #[must_use]
    pub fn has_methods(&self, name: &str) -> bool {
        self.by_name.get(name).is_some_and(|m| !m.placeholder)
    }

    /// Returns `true` if a module with this exact name is loaded.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the number of live load-event subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock!(self.listeners).len()
    }

    /// Returns the number of hooks installed on the first overload of a method.
    #[must_use]
    pub fn hook_count(&self, module: &str, type_name: &str, method: &str) -> usize {
        self.by_name.get(module).map_or(0, |m| {
            m.methods
                .iter()
                .filter(|lm| lm.def.type_name == type_name && lm.def.name == method)
                .map(|lm| read_lock!(lm.hooks).len())
                .next()
                .unwrap_or(0)
        })
    }

    /// Invokes a method, routing the call through its installed hooks.
    ///
    /// The overload is selected by the number and kinds of the supplied arguments. Arguments
    /// are passed by mutable reference: a wrap-before hook that rewrites one is observed by
    /// the original body and by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invocation`] if no loaded overload accepts the arguments, or the error
    /// of the method body or replacing hook.
    pub fn invoke(
        &self,
        module: &str,
        type_name: &str,
        method: &str,
        args: &mut [Value],
    ) -> Result<Value> {
        let Some(loaded) = self.module(module) else {
            return Err(Error::Invocation(format!("module '{module}' is not loaded")));
        };

        let Some(slot) = loaded.methods.iter().position(|m| {
            m.def.type_name == type_name
                && m.def.name == method
                && m.def.params.len() == args.len()
                && m.def.params.iter().zip(args.iter()).all(|(p, a)| a.fits(p.kind))
        }) else {
            return Err(Error::Invocation(format!(
                "no overload of {type_name}::{method} in '{module}' accepts {} argument(s)",
                args.len()
            )));
        };

        Self::call_slot(&loaded, slot, args)
    }

    /// Invokes a resolved method directly by its slot, routing the call through its hooks.
    ///
    /// This is the entry point for calls the native runtime redirects to the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Invocation`] if the reference no longer names a loaded method, or the
    /// error of the method body or replacing hook.
    pub fn invoke_method(&self, method: &MethodRef, args: &mut [Value]) -> Result<Value> {
        let loaded = self
            .module(&method.module)
            .filter(|loaded| {
                loaded.methods.get(method.slot).is_some_and(|m| {
                    m.def.type_name == method.type_name && m.def.name == method.method
                })
            })
            .ok_or_else(|| Error::Invocation(format!("{method} is not loaded")))?;
        Self::call_slot(&loaded, method.slot, args)
    }

    fn call_slot(loaded: &LoadedModule, slot: usize, args: &mut [Value]) -> Result<Value> {
        let Some(target) = loaded.methods.get(slot) else {
            return Err(Error::Invocation(format!("method slot {slot} vanished")));
        };
        let hooks = read_lock!(target.hooks).clone();
        let body = target.def.body.clone();

        if hooks.is_empty() {
            return body(args);
        }

        let Some(method_ref) = loaded.method_ref(slot) else {
            return Err(Error::Invocation(format!("method slot {slot} vanished")));
        };
        trace!(
            "Dispatching {} through {} hook(s), returns {}",
            method_ref,
            hooks.len(),
            target.def.returns
        );
        dispatch(&hooks, &method_ref, args, |args| body(args))
    }

    fn notify(&self, info: &ModuleInfo) {
        let listeners: Vec<LoadListener> = lock!(self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(info);
        }
    }

    fn module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.by_name.get(name).map(|m| m.value().clone())
    }
}

impl Default for ModuleSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleSource for ModuleSpace {
    fn loaded_modules(&self) -> Vec<ModuleInfo> {
        self.order
            .iter()
            .filter_map(|(_, name)| self.by_name.get(name).map(|m| m.info.clone()))
            .collect()
    }

    fn subscribe(&self, listener: LoadListener) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        lock!(self.listeners).push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock!(self.listeners).retain(|(existing, _)| *existing != id);
    }
}

impl DetourBackend for ModuleSpace {
    fn has_method_table(&self, module: &str) -> bool {
        self.has_methods(module)
    }

    fn resolve(
        &self,
        module: &str,
        type_name: &str,
        method: &str,
        shape: Option<&ArgumentShape>,
    ) -> Result<MethodRef> {
        let target = match shape {
            Some(shape) => format!("{type_name}::{method}{shape}"),
            None => format!("{type_name}::{method}"),
        };
        let unresolved = |reason: String| Error::InterceptionResolution {
            target: target.clone(),
            reason,
        };

        let Some(loaded) = self.module(module) else {
            return Err(unresolved(format!("module '{module}' is not loaded")));
        };

        if !loaded.methods.iter().any(|m| m.def.type_name == type_name) {
            return Err(unresolved(format!("type not found in '{module}'")));
        }

        let mut candidates = loaded
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.def.type_name == type_name && m.def.name == method)
            .peekable();
        if candidates.peek().is_none() {
            return Err(unresolved(format!("method not found on {type_name}")));
        }

        let slot = match shape {
            Some(shape) => candidates
                .find(|(_, m)| shape.matches(&m.def.params))
                .map(|(slot, _)| slot)
                .ok_or_else(|| unresolved("no overload matches the argument shape".into()))?,
            None => candidates
                .next()
                .map(|(slot, _)| slot)
                .ok_or_else(|| unresolved("method not found".into()))?,
        };

        loaded
            .method_ref(slot)
            .ok_or_else(|| unresolved(format!("method slot {slot} vanished")))
    }

    fn install(&self, method: &MethodRef, hook: InstalledHook) -> Result<()> {
        let Some(loaded) = self.module(&method.module) else {
            return Err(Error::Error(format!(
                "cannot install hook, module '{}' is not loaded",
                method.module
            )));
        };
        let Some(target) = loaded.methods.get(method.slot) else {
            return Err(Error::Error(format!(
                "cannot install hook, {method} has no slot {}",
                method.slot
            )));
        };
        let mut hooks = write_lock!(target.hooks);
        if hooks.is_empty() {
            if let Some(arm) = &target.def.arm {
                arm()?;
            }
        }
        hooks.push(hook);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::{CallContext, InterceptionAction};
    use std::sync::atomic::AtomicUsize;

    fn after_hook(patch: &str) -> InstalledHook {
        InstalledHook {
            patch: Arc::from(patch),
            action: InterceptionAction::After(Arc::new(|_: &CallContext<'_>, _: &Value| {})),
        }
    }

    fn overloaded() -> ModuleImage {
        ModuleImage::new("Mono.Posix")
            .method(
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                ArgumentShape::new().param(ParamKind::String),
                ParamKind::Object,
                |_| Ok(Value::Object(1)),
            )
            .method(
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                ArgumentShape::new()
                    .param(ParamKind::String)
                    .param(ParamKind::Bool),
                ParamKind::Object,
                |_| Ok(Value::Object(2)),
            )
    }

    #[test]
    fn test_resolve_first_overload_without_shape() {
        let space = ModuleSpace::new();
        space.load(overloaded());

        let method = space
            .resolve(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                None,
            )
            .unwrap();
        assert_eq!(method.slot, 0);
        assert_eq!(
            method.to_string(),
            "Mono.Posix!Mono.Unix.UnixFileSystemInfo::CreateSymbolicLink(string)"
        );
    }

    #[test]
    fn test_resolve_by_shape() {
        let space = ModuleSpace::new();
        space.load(overloaded());

        let shape = ArgumentShape::new()
            .param(ParamKind::String)
            .param(ParamKind::Bool);
        let method = space
            .resolve(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                Some(&shape),
            )
            .unwrap();
        assert_eq!(method.slot, 1);
    }

    #[test]
    fn test_resolve_failures() {
        let space = ModuleSpace::new();
        space.load(overloaded());

        let missing_module = space.resolve("FNA", "T", "M", None);
        assert!(matches!(
            missing_module,
            Err(Error::InterceptionResolution { .. })
        ));

        let missing_method =
            space.resolve("Mono.Posix", "Mono.Unix.UnixFileSystemInfo", "Delete", None);
        assert!(matches!(
            missing_method,
            Err(Error::InterceptionResolution { .. })
        ));

        let shape = ArgumentShape::new().param(ParamKind::I64);
        let missing_overload = space.resolve(
            "Mono.Posix",
            "Mono.Unix.UnixFileSystemInfo",
            "CreateSymbolicLink",
            Some(&shape),
        );
        match missing_overload {
            Err(Error::InterceptionResolution { target, .. }) => {
                assert!(target.ends_with("CreateSymbolicLink(i64)"));
            }
            other => panic!("expected resolution failure, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke_selects_overload_by_arguments() {
        let space = ModuleSpace::new();
        space.load(overloaded());

        let one = space
            .invoke(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                &mut [Value::from("/tmp/a")],
            )
            .unwrap();
        let two = space
            .invoke(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                &mut [Value::from("/tmp/a"), Value::Bool(true)],
            )
            .unwrap();
        assert_eq!(one, Value::Object(1));
        assert_eq!(two, Value::Object(2));

        let bad = space.invoke(
            "Mono.Posix",
            "Mono.Unix.UnixFileSystemInfo",
            "CreateSymbolicLink",
            &mut [Value::I32(3)],
        );
        assert!(matches!(bad, Err(Error::Invocation(_))));
    }

    #[test]
    fn test_load_notifies_after_registering() {
        let space = Arc::new(ModuleSpace::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let observer = Arc::downgrade(&space);
        let counter = seen.clone();
        space.subscribe(Arc::new(move |info: &ModuleInfo| {
            let space = observer.upgrade().unwrap();
            assert!(space.is_loaded(&info.name));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        space.load(overloaded());
        space.load(overloaded());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(space.loaded_modules().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_events() {
        let space = ModuleSpace::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let id = space.subscribe(Arc::new(move |_: &ModuleInfo| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(space.subscriber_count(), 1);

        space.unsubscribe(id);
        space.unsubscribe(id);
        space.announce(ModuleInfo::new("FNA"));

        assert_eq!(space.subscriber_count(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(space.is_loaded("FNA"));
    }

    #[test]
    fn test_announced_module_is_placeholder_until_loaded() {
        let space = Arc::new(ModuleSpace::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::downgrade(&space);
        let events = seen.clone();
        space.subscribe(Arc::new(move |info: &ModuleInfo| {
            let space = observer.upgrade().unwrap();
            events.lock().unwrap().push(space.has_methods(&info.name));
        }));

        space.announce(ModuleInfo::new("Mono.Posix"));
        assert!(space.is_loaded("Mono.Posix"));
        assert!(!space.has_method_table("Mono.Posix"));
        assert!(matches!(
            space.resolve(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                None
            ),
            Err(Error::InterceptionResolution { .. })
        ));

        space.load(overloaded().with_path("/games/Mono.Posix.dll"));
        assert!(space.has_method_table("Mono.Posix"));
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
        assert_eq!(
            space.loaded_modules(),
            vec![ModuleInfo {
                name: "Mono.Posix".to_string(),
                path: Some(PathBuf::from("/games/Mono.Posix.dll")),
            }]
        );

        // Announcing a complete module keeps its method table
        space.announce(ModuleInfo::new("Mono.Posix"));
        assert!(space.has_method_table("Mono.Posix"));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_first_hook_arms_method_once() {
        let space = ModuleSpace::new();
        let armed = Arc::new(AtomicUsize::new(0));
        let counter = armed.clone();
        space.load(
            ModuleImage::new("FNA")
                .method(
                    "Microsoft.Xna.Framework.Game",
                    "Tick",
                    ArgumentShape::new(),
                    ParamKind::Void,
                    |_| Ok(Value::Void),
                )
                .on_first_hook(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );

        let method = space
            .resolve("FNA", "Microsoft.Xna.Framework.Game", "Tick", None)
            .unwrap();
        for patch in ["a", "b"] {
            space.install(&method, after_hook(patch)).unwrap();
        }

        assert_eq!(armed.load(Ordering::SeqCst), 1);
        assert_eq!(space.hook_count("FNA", "Microsoft.Xna.Framework.Game", "Tick"), 2);
    }

    #[test]
    fn test_failed_arm_rejects_hook() {
        let space = ModuleSpace::new();
        space.load(
            ModuleImage::new("FNA")
                .method(
                    "Microsoft.Xna.Framework.Game",
                    "Tick",
                    ArgumentShape::new(),
                    ParamKind::Void,
                    |_| Ok(Value::Void),
                )
                .on_first_hook(|| Err(Error::Native("detour refused".to_string()))),
        );

        let method = space
            .resolve("FNA", "Microsoft.Xna.Framework.Game", "Tick", None)
            .unwrap();
        assert!(matches!(
            space.install(&method, after_hook("frame-timing")),
            Err(Error::Native(_))
        ));
        assert_eq!(space.hook_count("FNA", "Microsoft.Xna.Framework.Game", "Tick"), 0);
    }

    #[test]
    fn test_invoke_method_by_reference() {
        let space = ModuleSpace::new();
        space.load(overloaded());

        let shape = ArgumentShape::new()
            .param(ParamKind::String)
            .param(ParamKind::Bool);
        let method = space
            .resolve(
                "Mono.Posix",
                "Mono.Unix.UnixFileSystemInfo",
                "CreateSymbolicLink",
                Some(&shape),
            )
            .unwrap();
        let result = space
            .invoke_method(&method, &mut [Value::from("/tmp/a"), Value::Bool(false)])
            .unwrap();
        assert_eq!(result, Value::Object(2));

        let stale = MethodRef {
            slot: 9,
            ..method
        };
        assert!(matches!(
            space.invoke_method(&stale, &mut []),
            Err(Error::Invocation(_))
        ));
    }
}
