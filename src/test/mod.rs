//! Shared fixtures for unit tests.

use std::{
    env,
    ffi::OsString,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use crate::{
    native::NativeHost,
    runtime::{ArgumentShape, ModuleImage, ParamKind, Value},
    Error, Result,
};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialises tests that touch process-wide state (environment, launch flag, load sink).
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

type EntryHook = Box<dyn Fn(&Path) + Send + Sync>;

/// A [`NativeHost`] that records calls instead of loading anything.
pub struct FakeHost {
    calls: Mutex<Vec<String>>,
    watched: Vec<String>,
    seen_env: Mutex<Vec<(String, Option<OsString>)>>,
    exit_code: i32,
    last_error: Option<String>,
    fail_preload: Option<String>,
    fail_entry: Option<String>,
    on_entry: Option<EntryHook>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            watched: Vec::new(),
            seen_env: Mutex::new(Vec::new()),
            exit_code: 0,
            last_error: None,
            fail_preload: None,
            fail_entry: None,
            on_entry: None,
        }
    }

    /// Records the value of `key` when the entry point runs.
    pub fn watch(mut self, key: &str) -> Self {
        self.watched.push(key.to_string());
        self
    }

    pub fn exiting_with(mut self, code: i32, last_error: Option<&str>) -> Self {
        self.exit_code = code;
        self.last_error = last_error.map(str::to_string);
        self
    }

    pub fn failing_preload(mut self, file_name: &str) -> Self {
        self.fail_preload = Some(file_name.to_string());
        self
    }

    /// Makes `run_entry` fail after recording the environment, as an unreachable entry
    /// point does.
    pub fn failing_entry(mut self, message: &str) -> Self {
        self.fail_entry = Some(message.to_string());
        self
    }

    pub fn on_entry(mut self, hook: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_entry = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Value of a watched key at entry: `None` if the entry point never ran.
    pub fn seen(&self, key: &str) -> Option<Option<OsString>> {
        self.seen_env
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

impl NativeHost for FakeHost {
    fn install_base_hooks(&self) -> Result<()> {
        self.calls.lock().unwrap().push("hooks".to_string());
        Ok(())
    }

    fn preload(&self, library: &Path) -> Result<()> {
        let name = library
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_preload.as_deref() == Some(name.as_str()) {
            return Err(Error::Native(format!("cannot load {name}")));
        }
        self.calls.lock().unwrap().push(format!("preload:{name}"));
        Ok(())
    }

    fn run_entry(&self, module: &Path, args: &[String]) -> Result<i32> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("entry:{}:{}", module.display(), args.join(" ")));
        *self.seen_env.lock().unwrap() = self
            .watched
            .iter()
            .map(|key| (key.clone(), env::var_os(key)))
            .collect();
        if let Some(message) = &self.fail_entry {
            return Err(Error::Native(message.clone()));
        }
        if let Some(hook) = &self.on_entry {
            hook(module);
        }
        Ok(self.exit_code)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

/// `Mono.Posix` with a symbolic link method that fails on the host filesystem.
pub fn mono_posix() -> ModuleImage {
    ModuleImage::new("Mono.Posix").method(
        "Mono.Unix.UnixFileSystemInfo",
        "CreateSymbolicLink",
        ArgumentShape::new().param(ParamKind::String),
        ParamKind::Void,
        |_| Err(Error::Invocation("EPERM: symlink not permitted".to_string())),
    )
}

/// `System.Private.CoreLib` with a `NativeLibrary::Load` that echoes the requested name.
pub fn core_lib() -> ModuleImage {
    ModuleImage::new("System.Private.CoreLib").method(
        "System.Runtime.InteropServices.NativeLibrary",
        "Load",
        ArgumentShape::new().param(ParamKind::String),
        ParamKind::String,
        |args| Ok(args.first().cloned().unwrap_or(Value::Null)),
    )
}

/// `FNA` with the methods the built-in patches target.
pub fn fna() -> ModuleImage {
    ModuleImage::new("FNA")
        .method(
            "Microsoft.Xna.Framework.FNAPlatform",
            "SupportsOrientationChanges",
            ArgumentShape::new(),
            ParamKind::Bool,
            |_| Ok(Value::Bool(false)),
        )
        .method(
            "SDL2.SDL",
            "SDL_ShowSimpleMessageBox",
            ArgumentShape::new()
                .param(ParamKind::I32)
                .param(ParamKind::String)
                .param(ParamKind::String)
                .param(ParamKind::Object),
            ParamKind::I32,
            |_| Ok(Value::I32(0)),
        )
        .method(
            "Microsoft.Xna.Framework.Game",
            "Tick",
            ArgumentShape::new(),
            ParamKind::Void,
            |_| Ok(Value::Null),
        )
}
