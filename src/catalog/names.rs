//! Desktop-to-host native library name mapping.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Maps native library names baked into desktop builds to the names shipped on the host.
///
/// Matching is ASCII case-insensitive on the whole name. When no alias matches and
/// `dll_fallback` is set, `Foo.dll` becomes `libFoo.so`.
///
/// A configured `aliases` table replaces the default table as a whole.
///
/// # Examples
///
/// ```rust
/// use dotlaunch::catalog::LibraryNameMap;
///
/// let names = LibraryNameMap::default();
/// assert_eq!(names.rewrite("sdl2.DLL").as_deref(), Some("libSDL2.so"));
/// assert_eq!(names.rewrite("Steamworks.dll").as_deref(), Some("libSteamworks.so"));
/// assert_eq!(names.rewrite("libSDL2.so"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LibraryNameMap {
    /// Desktop name → host name
    pub aliases: BTreeMap<String, String>,
    /// Rewrite unmapped `*.dll` names to `lib*.so`
    pub dll_fallback: bool,
}

impl LibraryNameMap {
    /// Creates an empty map without fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            aliases: BTreeMap::new(),
            dll_fallback: false,
        }
    }

    /// Adds or replaces an alias.
    #[must_use]
    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    /// Returns the host name for `name`, or `None` if it should be left alone.
    #[must_use]
    pub fn rewrite(&self, name: &str) -> Option<String> {
        if let Some(host) = self
            .aliases
            .iter()
            .find(|(desktop, _)| desktop.eq_ignore_ascii_case(name))
            .map(|(_, host)| host.clone())
        {
            return (host != name).then_some(host);
        }

        if self.dll_fallback {
            let split = name.len().checked_sub(4)?;
            let (stem, extension) = (name.get(..split)?, name.get(split..)?);
            if !stem.is_empty() && extension.eq_ignore_ascii_case(".dll") {
                return Some(format!("lib{stem}.so"));
            }
        }

        None
    }
}

impl Default for LibraryNameMap {
    fn default() -> Self {
        Self::empty()
            .with_alias("SDL2.dll", "libSDL2.so")
            .with_alias("libSDL2-2.0.so.0", "libSDL2.so")
            .with_alias("FNA3D.dll", "libFNA3D.so")
            .with_alias("libFNA3D.so.0", "libFNA3D.so")
            .with_alias("FAudio.dll", "libFAudio.so")
            .with_alias("libFAudio.so.0", "libFAudio.so")
            .with_alias("libtheorafile.dll", "libtheorafile.so")
            .with_alias("soft_oal.dll", "libopenal.so")
            .with_alias("openal32.dll", "libopenal.so")
            .with_dll_fallback()
    }
}

impl LibraryNameMap {
    fn with_dll_fallback(mut self) -> Self {
        self.dll_fallback = true;
        self
    }
}
