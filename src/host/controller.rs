//! The launch sequence.

use std::{env, sync::Arc};

use log::{debug, error, info, warn};

use crate::{
    catalog::PatchCatalog,
    config::HostConfig,
    environment::LaunchGuard,
    host::{LaunchOutcome, LaunchRequest},
    interception::{BindingState, InterceptionEngine},
    native::{DynamicHost, NativeHost},
    overlay::{self, DeviceIdentity, OVERLAY_FLAG},
    runtime::ModuleSpace,
    Result,
};

/// Prepares the process and runs managed programs.
///
/// The controller owns the [`InterceptionEngine`] for its [`ModuleSpace`]. Patches installed by
/// one launch stay installed for later launches in the same process, so a patch requested twice
/// is applied once. Re-registering a patch id in the catalog after it was installed has no
/// effect on this controller, the first installed version stays in place.
///
/// # Examples
///
/// ```rust,no_run
/// use dotlaunch::{config::HostConfig, host::{HostController, LaunchRequest}};
///
/// let config = HostConfig::from_file("dotlaunch.toml".as_ref())?;
/// let controller = HostController::from_config(config)?;
///
/// let request = LaunchRequest::builder("/games/Celeste/Celeste.exe")
///     .patches(["symlink-noop", "native-library-names"])
///     .compatibility_overlay(true)
///     .build();
///
/// let outcome = controller.launch(request)?;
/// if !outcome.is_success() {
///     eprintln!("exit {}: {:?}", outcome.exit_code, outcome.last_error);
/// }
/// # Ok::<(), dotlaunch::Error>(())
/// ```
pub struct HostController {
    config: HostConfig,
    catalog: Arc<PatchCatalog>,
    space: Arc<ModuleSpace>,
    native: Arc<dyn NativeHost>,
    engine: InterceptionEngine,
    identity: Option<DeviceIdentity>,
}

impl HostController {
    /// Creates a controller from its parts.
    pub fn new(
        config: HostConfig,
        catalog: Arc<PatchCatalog>,
        space: Arc<ModuleSpace>,
        native: Arc<dyn NativeHost>,
    ) -> Self {
        let engine = InterceptionEngine::new(space.clone());
        Self {
            config,
            catalog,
            space,
            native,
            engine,
            identity: None,
        }
    }

    /// Creates a controller with a [`DynamicHost`] and a catalog holding the built-in patches.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the runtime root cannot be resolved, since the
    /// host library path is relative to it.
    pub fn from_config(config: HostConfig) -> Result<Self> {
        let root = config.resolve_runtime_root()?;
        let space = Arc::new(ModuleSpace::new());
        let catalog = Arc::new(PatchCatalog::new());
        catalog.register_builtin_with(config.library_names.clone());
        let native = Arc::new(DynamicHost::new(
            config.host_library_path(&root),
            space.clone(),
        ));
        Ok(Self::new(config, catalog, space, native))
    }

    /// Uses a fixed device identity instead of reading it from the environment at launch.
    #[must_use]
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The patch catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<PatchCatalog> {
        &self.catalog
    }

    /// The module space patches bind against.
    #[must_use]
    pub fn space(&self) -> &Arc<ModuleSpace> {
        &self.space
    }

    /// The interception engine.
    #[must_use]
    pub fn engine(&self) -> &InterceptionEngine {
        &self.engine
    }

    /// The runtime's last error message.
    #[must_use]
    pub fn last_error_message(&self) -> Option<String> {
        self.native.last_error()
    }

    /// Runs one managed program and blocks until it returns.
    ///
    /// The base environment profile stays in place afterwards. The compatibility overlay is
    /// restored on every exit path including panics. Without an active overlay a stale
    /// overlay flag is cleared and stays cleared.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::LaunchInProgress`] if another launch holds the process
    /// - [`crate::Error::Configuration`] for an unresolved runtime root, an invalid base
    ///   profile or a bad preload order
    /// - [`crate::Error::NotFound`] if any requested patch is not registered. Nothing has been
    ///   changed at that point.
    /// - [`crate::Error::Native`] if a library or the entry point cannot be loaded
    pub fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome> {
        let _launch = LaunchGuard::acquire()?;
        info!("Launching {}", request.module_path.display());

        let root = self.config.resolve_runtime_root()?;
        let patches = self.catalog.lookup(request.patch_set.as_slice())?;

        let base = self.config.base_profile(&root);
        base.validate()?;
        let _ = base.apply()?;
        debug!("Base profile applied from {}", root.display());

        self.native.install_base_hooks()?;

        let identity = self.identity.clone().unwrap_or_else(DeviceIdentity::from_env);
        let hint = overlay::evaluate(
            &self.config.overlay,
            &identity,
            &request.module_path,
            request.compatibility_overlay,
        );

        let _overlay = if hint.is_active() {
            info!(
                "Compatibility overlay active for {} {}",
                identity.manufacturer, identity.brand
            );
            let profile = self.config.overlay.overlay_profile();
            profile.validate()?;
            Some(profile.apply_scoped()?)
        } else {
            if env::var_os(OVERLAY_FLAG).is_some() {
                debug!("Clearing stale {OVERLAY_FLAG}");
            }
            env::remove_var(OVERLAY_FLAG);
            None
        };

        let order = self.config.preload_order(&root);
        order.validate()?;
        for library in order.iter() {
            self.native.preload(library)?;
        }

        self.engine.install_all(&patches)?;

        let exit_code = self
            .native
            .run_entry(&request.module_path, &request.arguments)?;

        let last_error = if exit_code == 0 {
            info!("{} exited normally", request.module_path.display());
            None
        } else {
            let message = self.native.last_error();
            match &message {
                Some(message) => error!("Runtime exited with code {exit_code}: {message}"),
                None => warn!("Runtime exited with code {exit_code}"),
            }
            message
        };

        let patch_reports: Vec<_> = patches
            .iter()
            .filter_map(|descriptor| self.engine.report(descriptor.id()))
            .collect();
        for report in &patch_reports {
            if report.state == BindingState::Searching {
                warn!(
                    "Patch '{}' never applied, '{}' was not loaded with a method table",
                    report.id, report.module
                );
            }
        }

        Ok(LaunchOutcome {
            exit_code,
            last_error,
            overlay_active: hint.is_active(),
            patch_reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        environment::{EnvSnapshot, ScopedEnv},
        runtime::Value,
        test::{mono_posix, serial, FakeHost},
        Error,
    };
    use std::{ffi::OsString, fs, panic, path::Path, sync::Mutex};

    const BASE_KEYS: [&str; 4] = ["MONO_PATH", "MONO_CONFIG", "MONO_CFG_DIR", "DOTNET_ROOT"];

    struct Fixture {
        root: tempfile::TempDir,
        saved: Option<EnvSnapshot>,
    }

    impl Fixture {
        fn new() -> Self {
            let saved = EnvSnapshot::capture(
                BASE_KEYS
                    .iter()
                    .copied()
                    .chain([OVERLAY_FLAG, "MONO_GC_PARAMS", crate::config::RUNTIME_ROOT_VAR]),
            );
            for key in saved.keys() {
                env::remove_var(key);
            }
            Self {
                root: tempfile::tempdir().unwrap(),
                saved: Some(saved),
            }
        }

        fn config(&self) -> HostConfig {
            HostConfig::default().with_runtime_root(self.root.path())
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            if let Some(saved) = self.saved.take() {
                saved.restore();
            }
        }
    }

    fn controller(config: HostConfig, host: Arc<FakeHost>) -> HostController {
        let catalog = Arc::new(PatchCatalog::new());
        catalog.register_builtin();
        HostController::new(config, catalog, Arc::new(ModuleSpace::new()), host)
            .with_identity(DeviceIdentity::new("Xiaomi", "Redmi"))
    }

    #[test]
    fn test_overlay_applied_during_entry_and_restored() {
        let _serial = serial();
        let fixture = Fixture::new();
        let host = Arc::new(FakeHost::new().watch(OVERLAY_FLAG).watch("MONO_GC_PARAMS"));

        let outcome = controller(fixture.config(), host.clone())
            .launch(
                LaunchRequest::builder("/games/Celeste/Celeste.exe")
                    .compatibility_overlay(true)
                    .build(),
            )
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome.overlay_active);
        assert_eq!(host.seen(OVERLAY_FLAG), Some(Some(OsString::from("1"))));
        assert_eq!(
            host.seen("MONO_GC_PARAMS"),
            Some(Some(OsString::from("nursery-size=64m")))
        );
        assert_eq!(env::var_os(OVERLAY_FLAG), None);
        assert_eq!(env::var_os("MONO_GC_PARAMS"), None);
        assert_eq!(
            env::var_os("DOTNET_ROOT"),
            Some(fixture.root.path().as_os_str().to_owned())
        );
        assert!(!LaunchGuard::is_held());
    }

    #[test]
    fn test_inactive_overlay_clears_stale_flag() {
        let _serial = serial();
        let fixture = Fixture::new();
        env::set_var(OVERLAY_FLAG, "stale");
        let host = Arc::new(FakeHost::new().watch(OVERLAY_FLAG));

        let outcome = controller(fixture.config(), host.clone())
            .launch(
                LaunchRequest::builder("/games/Celeste/Celeste.exe")
                    .compatibility_overlay(false)
                    .build(),
            )
            .unwrap();

        assert!(!outcome.overlay_active);
        assert_eq!(host.seen(OVERLAY_FLAG), Some(None));
        assert_eq!(env::var_os(OVERLAY_FLAG), None);
    }

    #[test]
    fn test_entry_error_restores_overlay() {
        let _serial = serial();
        let fixture = Fixture::new();
        env::set_var("MONO_GC_PARAMS", "major=marksweep");
        let host = Arc::new(
            FakeHost::new()
                .watch(OVERLAY_FLAG)
                .failing_entry("dotlaunch_main missing"),
        );

        let result = controller(fixture.config(), host.clone()).launch(
            LaunchRequest::builder("/games/Celeste/Celeste.exe")
                .compatibility_overlay(true)
                .build(),
        );

        assert!(matches!(result, Err(Error::Native(_))));
        assert_eq!(host.seen(OVERLAY_FLAG), Some(Some(OsString::from("1"))));
        assert_eq!(env::var_os(OVERLAY_FLAG), None);
        assert_eq!(env::var("MONO_GC_PARAMS").as_deref(), Ok("major=marksweep"));
        assert!(!LaunchGuard::is_held());
        env::remove_var("MONO_GC_PARAMS");
    }

    #[test]
    fn test_entry_panic_restores_overlay() {
        let _serial = serial();
        let fixture = Fixture::new();
        env::remove_var("MONO_GC_PARAMS");
        let host = Arc::new(
            FakeHost::new()
                .watch("MONO_GC_PARAMS")
                .on_entry(|_: &Path| panic!("runtime aborted")),
        );
        let controller = controller(fixture.config(), host.clone());

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            controller.launch(
                LaunchRequest::builder("/games/Celeste/Celeste.exe")
                    .compatibility_overlay(true)
                    .build(),
            )
        }));

        assert!(result.is_err());
        assert_eq!(
            host.seen("MONO_GC_PARAMS"),
            Some(Some(OsString::from("nursery-size=64m")))
        );
        assert_eq!(env::var_os(OVERLAY_FLAG), None);
        assert_eq!(env::var_os("MONO_GC_PARAMS"), None);
        assert!(!LaunchGuard::is_held());
        assert_eq!(
            env::var_os("DOTNET_ROOT"),
            Some(fixture.root.path().as_os_str().to_owned())
        );
    }

    #[test]
    fn test_unknown_patch_changes_nothing() {
        let _serial = serial();
        let fixture = Fixture::new();
        let host = Arc::new(FakeHost::new());

        let result = controller(fixture.config(), host.clone()).launch(
            LaunchRequest::builder("Game.exe")
                .patches(["symlink-noop", "no-such-patch"])
                .build(),
        );

        match result {
            Err(Error::NotFound(missing)) => assert_eq!(missing, vec!["no-such-patch"]),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(host.calls().is_empty());
        assert_eq!(env::var_os("MONO_PATH"), None);
    }

    #[test]
    fn test_missing_runtime_root() {
        let _serial = serial();
        let fixture = Fixture::new();
        let config = HostConfig::default().with_runtime_root(fixture.root.path().join("gone"));
        let host = Arc::new(FakeHost::new());

        let result = controller(config, host.clone()).launch(LaunchRequest::builder("a").build());
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_launch_sequence_and_failed_exit() {
        let _serial = serial();
        let fixture = Fixture::new();
        let lib = fixture.root.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("libSDL2.so"), b"stand-in").unwrap();
        fs::write(lib.join("libFNA3D.so"), b"stand-in").unwrap();

        let config = fixture
            .config()
            .with_preload("lib/libSDL2.so")
            .with_preload("lib/libFNA3D.so");
        let host = Arc::new(FakeHost::new().exiting_with(3, Some("NullReferenceException")));

        let outcome = controller(config, host.clone())
            .launch(LaunchRequest::builder("Game.exe").arg("-windowed").build())
            .unwrap();

        assert_eq!(
            host.calls(),
            vec![
                "hooks",
                "preload:libSDL2.so",
                "preload:libFNA3D.so",
                "entry:Game.exe:-windowed"
            ]
        );
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.last_error.as_deref(), Some("NullReferenceException"));
    }

    #[test]
    fn test_preload_failure_restores_overlay() {
        let _serial = serial();
        let fixture = Fixture::new();
        fs::write(fixture.root.path().join("libbad.so"), b"stand-in").unwrap();
        let config = fixture.config().with_preload("libbad.so");
        let host = Arc::new(FakeHost::new().failing_preload("libbad.so"));

        let result = controller(config, host.clone()).launch(
            LaunchRequest::builder("/games/Celeste/Celeste.exe")
                .compatibility_overlay(true)
                .build(),
        );

        assert!(matches!(result, Err(Error::Native(_))));
        assert_eq!(env::var_os(OVERLAY_FLAG), None);
        assert!(!LaunchGuard::is_held());
    }

    #[test]
    fn test_concurrent_launch_rejected() {
        let _serial = serial();
        let fixture = Fixture::new();
        let host = Arc::new(FakeHost::new());

        let held = LaunchGuard::acquire().unwrap();
        let result =
            controller(fixture.config(), host.clone()).launch(LaunchRequest::builder("a").build());
        drop(held);

        assert!(matches!(result, Err(Error::LaunchInProgress)));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_deferred_patch_applies_during_run() {
        let _serial = serial();
        let fixture = Fixture::new();
        let space = Arc::new(ModuleSpace::new());
        let observed = Arc::new(Mutex::new(None));

        let host = {
            let space = space.clone();
            let observed = observed.clone();
            Arc::new(FakeHost::new().on_entry(move |_: &Path| {
                space.load(mono_posix());
                let result = space.invoke(
                    "Mono.Posix",
                    "Mono.Unix.UnixFileSystemInfo",
                    "CreateSymbolicLink",
                    &mut [Value::from("/sdcard/game/link")],
                );
                *observed.lock().unwrap() = Some(result.is_ok());
            }))
        };

        let catalog = Arc::new(PatchCatalog::new());
        catalog.register_builtin();
        let controller = HostController::new(fixture.config(), catalog, space, host);
        let outcome = controller
            .launch(LaunchRequest::builder("Game.exe").patch("symlink-noop").build())
            .unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(true));
        assert_eq!(outcome.patch_reports.len(), 1);
        assert_eq!(outcome.patch_reports[0].applied, 1);
        assert_eq!(
            controller.engine().state("symlink-noop"),
            Some(crate::interception::BindingState::Applied)
        );
    }

    #[test]
    fn test_base_env_from_config_persists() {
        let _serial = serial();
        let fixture = Fixture::new();
        let key = "DOTLAUNCH_TEST_CONTROLLER_HOME";
        let _restore = ScopedEnv::new(EnvSnapshot::capture([key]));
        let config = fixture.config().with_env(key, "/home/player");

        controller(config, Arc::new(FakeHost::new()))
            .launch(LaunchRequest::builder("Game.exe").build())
            .unwrap();

        assert_eq!(env::var(key).as_deref(), Ok("/home/player"));
    }
}
