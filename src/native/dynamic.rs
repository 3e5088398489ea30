//! The native host backed by a dynamically loaded host library.
//!
//! The host library embeds the foreign runtime and exports a small C ABI:
//!
//! | Symbol | Signature | Required |
//! |--------|-----------|----------|
//! | `dotlaunch_main` | `int (int argc, const char **argv)` | yes |
//! | `dotlaunch_last_error` | `const char *(void)` | no |
//! | `dotlaunch_install_hooks` | `void (void)` | no |
//! | `dotlaunch_set_module_load_callback` | `void (void (*)(const char *name, const char *path))` | no |
//! | `dotlaunch_set_module_table_callback` | `void (void (*)(const char *name, const char *path, const method *methods, size_t count))` | no |
//! | `dotlaunch_install_detour` | `int (uint64_t handle, dispatch_fn dispatch)` | with the table callback |
//! | `dotlaunch_call_original` | `int (uint64_t handle, value *args, size_t argc, value *ret)` | with the table callback |
//!
//! Modules reported through the load callback only become placeholders in the
//! [`ModuleSpace`]. Patches bind once the table callback delivers the module's methods; see
//! [`crate::native::detour`] for the method and value layouts.

use std::{
    ffi::{c_char, c_int, CStr, CString},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use libloading::{Library, Symbol};
use log::{debug, info, warn};

use crate::{
    native::{
        detour::{self, CallOriginalFn, DetourAbi, InstallDetourFn, RawMethod},
        NativeHost,
    },
    runtime::ModuleSpace,
    Error, Result,
};

type EntryFn = unsafe extern "C" fn(c_int, *const *const c_char) -> c_int;
type LastErrorFn = unsafe extern "C" fn() -> *const c_char;
type InstallHooksFn = unsafe extern "C" fn();
type LoadCallback = extern "C" fn(*const c_char, *const c_char);
type SetLoadCallbackFn = unsafe extern "C" fn(LoadCallback);
type TableCallback = extern "C" fn(*const c_char, *const c_char, *const RawMethod, usize);
type SetTableCallbackFn = unsafe extern "C" fn(TableCallback);

const ENTRY_SYMBOL: &[u8] = b"dotlaunch_main\0";
const LAST_ERROR_SYMBOL: &[u8] = b"dotlaunch_last_error\0";
const INSTALL_HOOKS_SYMBOL: &[u8] = b"dotlaunch_install_hooks\0";
const SET_LOAD_CALLBACK_SYMBOL: &[u8] = b"dotlaunch_set_module_load_callback\0";
const SET_TABLE_CALLBACK_SYMBOL: &[u8] = b"dotlaunch_set_module_table_callback\0";
const INSTALL_DETOUR_SYMBOL: &[u8] = b"dotlaunch_install_detour\0";
const CALL_ORIGINAL_SYMBOL: &[u8] = b"dotlaunch_call_original\0";

#[cfg(unix)]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

/// [`NativeHost`] implementation using `libloading`.
///
/// Preloaded libraries and the host library stay loaded for the lifetime of the host, which
/// in practice is the lifetime of the process.
pub struct DynamicHost {
    host_path: PathBuf,
    space: Arc<ModuleSpace>,
    host: Mutex<Option<Arc<Library>>>,
    preloaded: Mutex<Vec<Library>>,
    hooks_installed: Mutex<bool>,
}

impl DynamicHost {
    /// Creates a host for the given host library. Nothing is loaded until first use.
    pub fn new(host_library: impl Into<PathBuf>, space: Arc<ModuleSpace>) -> Self {
        Self {
            host_path: host_library.into(),
            space,
            host: Mutex::new(None),
            preloaded: Mutex::new(Vec::new()),
            hooks_installed: Mutex::new(false),
        }
    }

    /// Path of the host library.
    #[must_use]
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Number of libraries preloaded so far.
    #[must_use]
    pub fn preloaded_count(&self) -> usize {
        lock!(self.preloaded).len()
    }

    fn library(&self) -> Result<Arc<Library>> {
        let mut slot = lock!(self.host);
        if let Some(library) = slot.as_ref() {
            return Ok(library.clone());
        }

        let library = open_global(&self.host_path).map_err(|error| {
            Error::Native(format!(
                "Failed to load host library {}: {}",
                self.host_path.display(),
                error
            ))
        })?;
        let library = Arc::new(library);
        *slot = Some(library.clone());
        Ok(library)
    }

    fn install_hooks(&self) -> Result<()> {
        let library = self.library()?;

        unsafe {
            if let Ok(install) = library.get::<InstallHooksFn>(INSTALL_HOOKS_SYMBOL) {
                install();
                debug!("Host trace hooks installed");
            }

            let abi = match (
                library.get::<InstallDetourFn>(INSTALL_DETOUR_SYMBOL),
                library.get::<CallOriginalFn>(CALL_ORIGINAL_SYMBOL),
            ) {
                (Ok(install), Ok(call_original)) => Some(DetourAbi {
                    install: *install,
                    call_original: *call_original,
                }),
                _ => None,
            };
            detour::attach(&self.space, abi, Some(library.clone()));

            if let Ok(register) = library.get::<SetLoadCallbackFn>(SET_LOAD_CALLBACK_SYMBOL) {
                register(detour::on_module_load);
                debug!("Module load callback registered");
            }

            match library.get::<SetTableCallbackFn>(SET_TABLE_CALLBACK_SYMBOL) {
                Ok(register) if abi.is_some() => {
                    register(detour::on_module_table);
                    debug!("Method table callback registered");
                }
                Ok(_) => warn!(
                    "Host library {} reports method tables but cannot install detours, \
                     patches will not apply",
                    self.host_path.display()
                ),
                Err(_) => warn!(
                    "Host library {} reports no method tables, patches will not apply",
                    self.host_path.display()
                ),
            }
        }
        Ok(())
    }
}

impl NativeHost for DynamicHost {
    fn install_base_hooks(&self) -> Result<()> {
        let mut installed = lock!(self.hooks_installed);
        if !*installed {
            self.install_hooks()?;
            *installed = true;
        }
        Ok(())
    }

    fn preload(&self, library: &Path) -> Result<()> {
        let loaded = open_global(library).map_err(|error| {
            Error::Native(format!("Failed to preload {}: {}", library.display(), error))
        })?;
        debug!("Preloaded {}", library.display());
        lock!(self.preloaded).push(loaded);
        Ok(())
    }

    fn run_entry(&self, module: &Path, args: &[String]) -> Result<i32> {
        let library = self.library()?;

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(
            CString::new(module.to_string_lossy().into_owned())
                .map_err(|_| Error::Native("Module path contains NUL".to_string()))?,
        );
        for arg in args {
            argv.push(
                CString::new(arg.as_str())
                    .map_err(|_| Error::Native(format!("Argument '{arg}' contains NUL")))?,
            );
        }
        let mut pointers: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
        pointers.push(std::ptr::null());

        let argc = c_int::try_from(argv.len())
            .map_err(|_| Error::Native("Too many arguments".to_string()))?;

        info!("Entering runtime for {}", module.display());
        let code = unsafe {
            let entry: Symbol<EntryFn> = library.get(ENTRY_SYMBOL).map_err(|error| {
                Error::Native(format!(
                    "Host library {} has no entry point: {}",
                    self.host_path.display(),
                    error
                ))
            })?;
            entry(argc, pointers.as_ptr())
        };
        Ok(code)
    }

    fn last_error(&self) -> Option<String> {
        let library = lock!(self.host).clone()?;
        unsafe {
            let last_error = library.get::<LastErrorFn>(LAST_ERROR_SYMBOL).ok()?;
            let message = last_error();
            if message.is_null() {
                return None;
            }
            let message = CStr::from_ptr(message).to_string_lossy().into_owned();
            (!message.is_empty()).then_some(message)
        }
    }
}
