//! Ordered environment profiles.

use std::{env, ffi::OsString};

use log::debug;

use crate::{
    environment::{EnvSnapshot, ScopedEnv},
    Result,
};

/// An ordered set of environment variable overrides.
///
/// Entries keep their insertion order. Setting a key that is already present replaces its
/// value in place.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::environment::EnvironmentProfile;
///
/// let profile = EnvironmentProfile::new()
///     .with("DOTLAUNCH_DOC_A", "1")
///     .with("DOTLAUNCH_DOC_B", "2")
///     .with("DOTLAUNCH_DOC_A", "3");
/// assert_eq!(profile.keys().collect::<Vec<_>>(), ["DOTLAUNCH_DOC_A", "DOTLAUNCH_DOC_B"]);
///
/// let snapshot = profile.apply()?;
/// assert_eq!(std::env::var("DOTLAUNCH_DOC_A").as_deref(), Ok("3"));
/// snapshot.restore();
/// assert!(std::env::var_os("DOTLAUNCH_DOC_A").is_none());
/// # Ok::<(), dotlaunch::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvironmentProfile {
    entries: Vec<(String, OsString)>,
}

impl EnvironmentProfile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`EnvironmentProfile::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a key, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OsString>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Appends every entry of `other`, in its order.
    pub fn extend(&mut self, other: &EnvironmentProfile) {
        for (key, value) in &other.entries {
            self.set(key.clone(), value.clone());
        }
    }

    /// Value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OsString> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OsString)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the profile has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks that every key can be set.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an empty key, a key containing `=` or NUL,
    /// or a value containing NUL.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.entries {
            if key.is_empty() || key.contains(['=', '\0']) {
                return Err(config_error!("Invalid environment variable name '{}'", key));
            }
            if value.to_string_lossy().contains('\0') {
                return Err(config_error!(
                    "Environment variable '{}' has a value containing NUL",
                    key
                ));
            }
        }
        Ok(())
    }

    /// Applies the profile to the process environment.
    ///
    /// Validation happens before any key is touched, so a failing apply changes nothing.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentProfile::validate`].
    pub fn apply(&self) -> Result<EnvSnapshot> {
        self.validate()?;

        let snapshot = EnvSnapshot::capture(self.keys());
        for (key, value) in &self.entries {
            env::set_var(key, value);
        }
        debug!("Applied environment profile ({} entries)", self.len());
        Ok(snapshot)
    }

    /// Applies the profile and returns a guard that restores it on drop.
    ///
    /// # Errors
    ///
    /// See [`EnvironmentProfile::validate`].
    pub fn apply_scoped(&self) -> Result<ScopedEnv> {
        self.apply().map(ScopedEnv::new)
    }
}

impl<K: Into<String>, V: Into<OsString>> FromIterator<(K, V)> for EnvironmentProfile {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut profile = Self::new();
        for (key, value) in iter {
            profile.set(key, value);
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_set_replaces_in_place() {
        let mut profile = EnvironmentProfile::new();
        profile.set("A", "1");
        profile.set("B", "2");
        profile.set("A", "3");

        let entries: Vec<(&str, &OsString)> = profile.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("A", &OsString::from("3")));
        assert_eq!(profile.get("B"), Some(&OsString::from("2")));
    }

    #[test]
    fn test_apply_restore_round_trip() {
        let present = "DOTLAUNCH_TEST_PROFILE_PRESENT";
        let absent = "DOTLAUNCH_TEST_PROFILE_ABSENT";
        env::set_var(present, "original");
        env::remove_var(absent);

        let profile: EnvironmentProfile = [(present, "override"), (absent, "new")]
            .into_iter()
            .collect();
        let snapshot = profile.apply().unwrap();
        assert_eq!(env::var(present).unwrap(), "override");
        assert_eq!(env::var(absent).unwrap(), "new");

        // Changes made after apply are rolled back too
        env::set_var(absent, "clobbered");
        snapshot.restore();

        assert_eq!(env::var(present).unwrap(), "original");
        assert!(env::var_os(absent).is_none());
        env::remove_var(present);
    }

    #[test]
    fn test_invalid_key_changes_nothing() {
        let good = "DOTLAUNCH_TEST_PROFILE_GOOD";
        env::remove_var(good);

        let profile = EnvironmentProfile::new()
            .with(good, "1")
            .with("BAD=KEY", "2");
        assert!(matches!(profile.apply(), Err(Error::Configuration(_))));
        assert!(env::var_os(good).is_none());

        assert!(EnvironmentProfile::new().with("", "x").validate().is_err());
    }

    #[test]
    fn test_extend_keeps_order() {
        let mut base = EnvironmentProfile::new().with("A", "1").with("B", "2");
        base.extend(&EnvironmentProfile::new().with("C", "3").with("A", "4"));
        assert_eq!(base.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(base.get("A"), Some(&OsString::from("4")));
    }
}
