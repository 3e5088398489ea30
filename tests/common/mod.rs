//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::{
    env,
    ffi::OsString,
    path::Path,
    sync::{Mutex, MutexGuard, OnceLock},
};

use dotlaunch::{native::NativeHost, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};

/// One captured log record.
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
}

struct CaptureLogger {
    records: Mutex<Vec<Captured>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records.lock().unwrap().push(Captured {
            level: record.level(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<&'static CaptureLogger> = OnceLock::new();

fn logger() -> &'static CaptureLogger {
    LOGGER.get_or_init(|| {
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger {
            records: Mutex::new(Vec::new()),
        }));
        log::set_logger(logger).unwrap();
        log::set_max_level(LevelFilter::Trace);
        logger
    })
}

/// Installs the capturing logger for this test binary.
pub fn capture_logs() {
    logger();
}

/// Captured records whose message contains `needle`.
pub fn logs_containing(needle: &str) -> Vec<Captured> {
    logger()
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|record| record.message.contains(needle))
        .cloned()
        .collect()
}

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialises tests that touch the process environment or the launch flag.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

type EntryHook = Box<dyn Fn() -> i32 + Send + Sync>;

/// A native host that runs a closure as the managed entry point.
pub struct ScriptedHost {
    pub calls: Mutex<Vec<String>>,
    watched: Vec<&'static str>,
    seen: Mutex<Vec<(&'static str, Option<OsString>)>>,
    entry: EntryHook,
    last_error: Option<String>,
}

impl ScriptedHost {
    pub fn new(entry: impl Fn() -> i32 + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            watched: Vec::new(),
            seen: Mutex::new(Vec::new()),
            entry: Box::new(entry),
            last_error: None,
        }
    }

    pub fn watch(mut self, key: &'static str) -> Self {
        self.watched.push(key);
        self
    }

    pub fn with_last_error(mut self, message: &str) -> Self {
        self.last_error = Some(message.to_string());
        self
    }

    /// Value of `key` when the entry point ran, `None` if it never ran.
    pub fn seen(&self, key: &str) -> Option<Option<OsString>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn entered(&self) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|call| call.starts_with("entry"))
    }
}

impl NativeHost for ScriptedHost {
    fn install_base_hooks(&self) -> Result<()> {
        self.calls.lock().unwrap().push("hooks".to_string());
        Ok(())
    }

    fn preload(&self, library: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("preload:{}", library.display()));
        Ok(())
    }

    fn run_entry(&self, module: &Path, _args: &[String]) -> Result<i32> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("entry:{}", module.display()));
        *self.seen.lock().unwrap() = self
            .watched
            .iter()
            .map(|key| (*key, env::var_os(key)))
            .collect();
        Ok((self.entry)())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
