//! Snapshots of process environment variables.

use std::{env, ffi::OsString};

use log::trace;

/// Previous values of a set of environment variables.
///
/// A snapshot remembers, for every key it covers, either the value the key had or that the
/// key was unset. [`EnvSnapshot::restore`] puts exactly that state back, whatever happened to
/// the keys in between, and consumes the snapshot so it cannot be restored twice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[must_use = "an environment snapshot does nothing unless restored"]
pub struct EnvSnapshot {
    previous: Vec<(String, Option<OsString>)>,
}

impl EnvSnapshot {
    /// Records the current values of `keys` without changing anything.
    ///
    /// Repeated keys are recorded once.
    pub fn capture<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut previous: Vec<(String, Option<OsString>)> = Vec::new();
        for key in keys {
            let key = key.as_ref();
            if previous.iter().any(|(existing, _)| existing == key) {
                continue;
            }
            previous.push((key.to_string(), env::var_os(key)));
        }
        Self { previous }
    }

    /// Keys covered by this snapshot, in capture order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.previous.iter().map(|(key, _)| key.as_str())
    }

    /// The recorded value of `key`: `None` if not covered, `Some(None)` if it was unset.
    #[must_use]
    pub fn previous(&self, key: &str) -> Option<Option<&OsString>> {
        self.previous
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_ref())
    }

    /// Returns `true` if the snapshot covers no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    /// Puts every covered key back to its recorded state, unsetting keys that were unset.
    pub fn restore(self) {
        for (key, value) in self.previous {
            match value {
                Some(value) => {
                    trace!("Restoring {key}");
                    env::set_var(&key, value);
                }
                None => {
                    trace!("Unsetting {key}");
                    env::remove_var(&key);
                }
            }
        }
    }
}
