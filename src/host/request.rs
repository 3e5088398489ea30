//! Launch requests and outcomes.

use std::path::{Path, PathBuf};

use crate::interception::InstallReport;

/// One request to run a managed program.
///
/// The patch set is used as given. An empty set installs no patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// The managed module whose entry point runs
    pub module_path: PathBuf,
    /// Arguments passed after the module path
    pub arguments: Vec<String>,
    /// Patch ids to install before the entry point runs
    pub patch_set: Vec<String>,
    /// The user's compatibility overlay preference
    pub compatibility_overlay: bool,
}

impl LaunchRequest {
    /// Starts a request for `module_path`.
    pub fn builder(module_path: impl Into<PathBuf>) -> LaunchRequestBuilder {
        LaunchRequestBuilder {
            request: LaunchRequest {
                module_path: module_path.into(),
                arguments: Vec::new(),
                patch_set: Vec::new(),
                compatibility_overlay: false,
            },
        }
    }

    /// The managed module path.
    #[must_use]
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }
}

/// Builder for [`LaunchRequest`].
#[derive(Debug, Clone)]
pub struct LaunchRequestBuilder {
    request: LaunchRequest,
}

impl LaunchRequestBuilder {
    /// Appends a program argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.request.arguments.push(arg.into());
        self
    }

    /// Appends program arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds a patch id.
    #[must_use]
    pub fn patch(mut self, id: impl Into<String>) -> Self {
        self.request.patch_set.push(id.into());
        self
    }

    /// Adds patch ids.
    #[must_use]
    pub fn patches<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.patch_set.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Sets the compatibility overlay preference.
    #[must_use]
    pub fn compatibility_overlay(mut self, enabled: bool) -> Self {
        self.request.compatibility_overlay = enabled;
        self
    }

    /// Finishes the request.
    #[must_use]
    pub fn build(self) -> LaunchRequest {
        self.request
    }
}

/// Result of a launch that reached the entry point.
///
/// A program that ran and failed is not an error: its exit code is non-zero and
/// `last_error` carries the runtime's message, when it left one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Exit code returned by the entry point
    pub exit_code: i32,
    /// The runtime's last error message, only read after a non-zero exit
    pub last_error: Option<String>,
    /// Whether the compatibility overlay was applied
    pub overlay_active: bool,
    /// Install reports of the requested patches, taken after the program returned
    pub patch_reports: Vec<InstallReport>,
}

impl LaunchOutcome {
    /// Returns `true` for exit code 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = LaunchRequest::builder("/games/Celeste/Celeste.exe")
            .arg("--windowed")
            .args(["--fps", "60"])
            .patch("symlink-noop")
            .patches(["quiet-exit"])
            .compatibility_overlay(true)
            .build();

        assert_eq!(request.module_path(), Path::new("/games/Celeste/Celeste.exe"));
        assert_eq!(request.arguments, ["--windowed", "--fps", "60"]);
        assert_eq!(request.patch_set, ["symlink-noop", "quiet-exit"]);
        assert!(request.compatibility_overlay);
    }

    #[test]
    fn test_defaults() {
        let request = LaunchRequest::builder("Game.exe").build();
        assert!(request.arguments.is_empty());
        assert!(request.patch_set.is_empty());
        assert!(!request.compatibility_overlay);
    }
}
