//! Host configuration.
//!
//! A [`HostConfig`] is usually read from a TOML file:
//!
//! ```toml
//! runtime_root = "/data/local/dotlaunch/runtime"
//! host_library = "lib/libdotlaunch-host.so"
//! preload = ["lib/libSDL2.so", "lib/libFNA3D.so"]
//! patches = ["symlink-noop", "native-library-names"]
//!
//! [base_env]
//! HOME = "/data/local/dotlaunch/home"
//!
//! [overlay]
//! workload_markers = ["Celeste"]
//!
//! [library_names.aliases]
//! "SDL2.dll" = "libSDL2.so"
//! ```
//!
//! Every field is optional. Relative paths are resolved against the runtime root.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    catalog::{LibraryNameMap, NATIVE_LIBRARY_NAMES, SYMLINK_NOOP},
    environment::EnvironmentProfile,
    native::LibraryOrder,
    overlay::OverlayRules,
    Result,
};

/// Environment variable overriding [`HostConfig::runtime_root`].
pub const RUNTIME_ROOT_VAR: &str = "DOTLAUNCH_RUNTIME_ROOT";

/// Host library path used when none is configured, relative to the runtime root.
pub const DEFAULT_HOST_LIBRARY: &str = "lib/libdotlaunch-host.so";

/// Configuration of the launch controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding the runtime's libraries and configuration
    pub runtime_root: Option<PathBuf>,
    /// Extra variables for the base environment profile
    pub base_env: BTreeMap<String, String>,
    /// Native libraries preloaded before the entry point, in order
    pub preload: Vec<PathBuf>,
    /// The host library exporting the runtime entry point
    pub host_library: Option<PathBuf>,
    /// Compatibility overlay rules
    pub overlay: OverlayRules,
    /// Native library name mapping for the built-in patches
    pub library_names: LibraryNameMap,
    /// Patch set used when a launch request names none
    pub patches: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_root: None,
            base_env: BTreeMap::new(),
            preload: Vec::new(),
            host_library: None,
            overlay: OverlayRules::default(),
            library_names: LibraryNameMap::default(),
            patches: vec![SYMLINK_NOOP.to_string(), NATIVE_LIBRARY_NAMES.to_string()],
        }
    }
}

impl HostConfig {
    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns I/O errors and [`crate::Error::TomlErr`] for malformed TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TomlErr`] for malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Sets the runtime root.
    #[must_use]
    pub fn with_runtime_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.runtime_root = Some(root.into());
        self
    }

    /// Adds a base environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    /// Appends a library to the preload order.
    #[must_use]
    pub fn with_preload(mut self, library: impl Into<PathBuf>) -> Self {
        self.preload.push(library.into());
        self
    }

    /// Sets the host library.
    #[must_use]
    pub fn with_host_library(mut self, library: impl Into<PathBuf>) -> Self {
        self.host_library = Some(library.into());
        self
    }

    /// Replaces the overlay rules.
    #[must_use]
    pub fn with_overlay(mut self, rules: OverlayRules) -> Self {
        self.overlay = rules;
        self
    }

    /// Replaces the library name map.
    #[must_use]
    pub fn with_library_names(mut self, names: LibraryNameMap) -> Self {
        self.library_names = names;
        self
    }

    /// Replaces the default patch set.
    #[must_use]
    pub fn with_patches<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patches = ids.into_iter().map(Into::into).collect();
        self
    }

    /// The runtime root, with [`RUNTIME_ROOT_VAR`] taking precedence over the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if no root is set or it is not a directory.
    pub fn resolve_runtime_root(&self) -> Result<PathBuf> {
        let root = env::var_os(RUNTIME_ROOT_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.runtime_root.clone())
            .ok_or_else(|| {
                config_error!("No runtime root configured and {} is unset", RUNTIME_ROOT_VAR)
            })?;

        if !root.is_dir() {
            return Err(config_error!(
                "Runtime root {} is not a directory",
                root.display()
            ));
        }
        Ok(root)
    }

    /// The base environment profile for a runtime root.
    ///
    /// The runtime variables come first, followed by [`HostConfig::base_env`] in key order.
    /// Configured entries replace runtime variables of the same name.
    #[must_use]
    pub fn base_profile(&self, root: &Path) -> EnvironmentProfile {
        let mut profile = EnvironmentProfile::new()
            .with("MONO_PATH", root.join("lib/mono/4.5"))
            .with("MONO_CONFIG", root.join("etc/mono/config"))
            .with("MONO_CFG_DIR", root.join("etc"))
            .with("DOTNET_ROOT", root);
        for (key, value) in &self.base_env {
            profile.set(key.clone(), value.clone());
        }
        profile
    }

    /// The preload order with relative paths resolved against `root`.
    #[must_use]
    pub fn preload_order(&self, root: &Path) -> LibraryOrder {
        LibraryOrder::new(self.preload.iter().map(|library| root.join(library)))
    }

    /// The host library path resolved against `root`.
    #[must_use]
    pub fn host_library_path(&self, root: &Path) -> PathBuf {
        root.join(
            self.host_library
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_HOST_LIBRARY)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_parse_full_config() {
        let config = HostConfig::from_toml_str(
            r#"
            runtime_root = "/opt/runtime"
            preload = ["lib/libSDL2.so", "/system/lib/libGLESv2.so"]
            patches = ["quiet-exit"]

            [base_env]
            HOME = "/home/player"

            [overlay]
            device_families = ["acme"]

            [library_names]
            dll_fallback = false
            "#,
        )
        .unwrap();

        let root = Path::new("/opt/runtime");
        assert_eq!(config.runtime_root.as_deref(), Some(root));
        assert_eq!(config.patches, vec!["quiet-exit"]);
        assert_eq!(config.overlay.device_families, vec!["acme"]);
        assert_eq!(config.overlay.workload_markers, vec!["Celeste"]);
        assert!(!config.library_names.dll_fallback);

        let order: Vec<_> = config.preload_order(root).iter().map(Path::to_path_buf).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("/opt/runtime/lib/libSDL2.so"),
                PathBuf::from("/system/lib/libGLESv2.so")
            ]
        );

        let profile = config.base_profile(root);
        assert_eq!(
            profile.keys().collect::<Vec<_>>(),
            ["MONO_PATH", "MONO_CONFIG", "MONO_CFG_DIR", "DOTNET_ROOT", "HOME"]
        );
        assert_eq!(
            config.host_library_path(root),
            PathBuf::from("/opt/runtime/lib/libdotlaunch-host.so")
        );
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            HostConfig::from_toml_str("preload = 3"),
            Err(Error::TomlErr(_))
        ));
    }

    #[test]
    fn test_runtime_root_resolution() {
        let _serial = crate::test::serial();
        env::remove_var(RUNTIME_ROOT_VAR);

        assert!(matches!(
            HostConfig::default().resolve_runtime_root(),
            Err(Error::Configuration(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let missing = HostConfig::default().with_runtime_root(dir.path().join("absent"));
        assert!(matches!(
            missing.resolve_runtime_root(),
            Err(Error::Configuration(_))
        ));

        env::set_var(RUNTIME_ROOT_VAR, dir.path());
        assert_eq!(missing.resolve_runtime_root().unwrap(), dir.path());
        env::remove_var(RUNTIME_ROOT_VAR);
    }
}
