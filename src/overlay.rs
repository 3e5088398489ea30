//! The device compatibility overlay.
//!
//! Some workloads need extra runtime settings on some device families. Whether the overlay
//! applies is a pure decision over three inputs, made once per launch:
//!
//! ```text
//! DeviceIdentity ──┐
//! module path ─────┼──► evaluate(rules) ──► HintState
//! user preference ─┘
//! ```
//!
//! The overlay is active only when the user enabled it, the module path names a known
//! workload and the device belongs to a known family. Which workloads and families count is
//! configuration data in [`OverlayRules`].

use std::{collections::BTreeMap, env, path::Path};

use serde::Deserialize;

use crate::environment::EnvironmentProfile;

/// Environment variable that tells the managed side the overlay is active.
pub const OVERLAY_FLAG: &str = "DOTLAUNCH_COMPAT_OVERLAY";
/// Environment variable carrying the device manufacturer.
pub const MANUFACTURER_VAR: &str = "DOTLAUNCH_DEVICE_MANUFACTURER";
/// Environment variable carrying the device brand.
pub const BRAND_VAR: &str = "DOTLAUNCH_DEVICE_BRAND";

/// Manufacturer and brand of the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    /// Device manufacturer
    pub manufacturer: String,
    /// Device brand
    pub brand: String,
}

impl DeviceIdentity {
    /// Creates an identity.
    pub fn new(manufacturer: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            brand: brand.into(),
        }
    }

    /// Reads the identity from the environment. Unset or non-UTF-8 values read as empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            manufacturer: env::var(MANUFACTURER_VAR).unwrap_or_default(),
            brand: env::var(BRAND_VAR).unwrap_or_default(),
        }
    }
}

/// Which launches get the overlay, and what it sets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OverlayRules {
    /// Substrings of the module path that identify an affected workload
    pub workload_markers: Vec<String>,
    /// Substrings of manufacturer or brand that identify an affected device
    pub device_families: Vec<String>,
    /// Variables set while the overlay is active, in addition to [`OVERLAY_FLAG`]
    pub profile: BTreeMap<String, String>,
}

impl Default for OverlayRules {
    fn default() -> Self {
        Self {
            workload_markers: vec!["Celeste".to_string()],
            device_families: vec![
                "xiaomi".to_string(),
                "redmi".to_string(),
                "poco".to_string(),
            ],
            profile: BTreeMap::from([(
                "MONO_GC_PARAMS".to_string(),
                "nursery-size=64m".to_string(),
            )]),
        }
    }
}

impl OverlayRules {
    /// Adds a workload marker.
    #[must_use]
    pub fn with_workload(mut self, marker: impl Into<String>) -> Self {
        self.workload_markers.push(marker.into());
        self
    }

    /// Adds a device family.
    #[must_use]
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.device_families.push(family.into());
        self
    }

    /// Adds a variable to the overlay profile.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.profile.insert(key.into(), value.into());
        self
    }

    /// The environment profile applied while the overlay is active.
    ///
    /// [`OVERLAY_FLAG`] comes first and is always `1`.
    #[must_use]
    pub fn overlay_profile(&self) -> EnvironmentProfile {
        let mut overlay = EnvironmentProfile::new().with(OVERLAY_FLAG, "1");
        for (key, value) in self.profile.iter().filter(|(key, _)| *key != OVERLAY_FLAG) {
            overlay.set(key.clone(), value.clone());
        }
        overlay
    }
}

/// The overlay decision for one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintState {
    /// The user preference
    pub enabled: bool,
    /// The module path names a known workload
    pub workload_match: bool,
    /// The device belongs to a known family
    pub device_match: bool,
}

impl HintState {
    /// Returns `true` if the overlay applies.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && self.workload_match && self.device_match
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty()
        && haystack
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
}

/// Decides whether the overlay applies. Never fails.
///
/// Matching is ASCII case-insensitive substring matching. An empty marker or family never
/// matches.
///
/// # Examples
///
/// ```rust
/// use std::path::Path;
/// use dotlaunch::overlay::{evaluate, DeviceIdentity, OverlayRules};
///
/// let rules = OverlayRules::default();
/// let device = DeviceIdentity::new("Xiaomi", "Redmi");
/// let module = Path::new("/games/Celeste/Celeste.exe");
///
/// assert!(evaluate(&rules, &device, module, true).is_active());
/// assert!(!evaluate(&rules, &device, module, false).is_active());
/// ```
#[must_use]
pub fn evaluate(
    rules: &OverlayRules,
    identity: &DeviceIdentity,
    module_path: &Path,
    enabled: bool,
) -> HintState {
    let module = module_path.to_string_lossy();
    HintState {
        enabled,
        workload_match: rules
            .workload_markers
            .iter()
            .any(|marker| contains_ignore_case(&module, marker)),
        device_match: rules.device_families.iter().any(|family| {
            contains_ignore_case(&identity.manufacturer, family)
                || contains_ignore_case(&identity.brand, family)
        }),
    }
}
