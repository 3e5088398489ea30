use std::path::Path;

use anyhow::Context;
use dotlaunch::{catalog::PatchCatalog, config::HostConfig};

use crate::app::GlobalOptions;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "dotlaunch.toml";

/// Load the host configuration from `--config`, `./dotlaunch.toml` or the built-in defaults.
pub fn load_config(opts: &GlobalOptions) -> anyhow::Result<HostConfig> {
    match &opts.config {
        Some(path) => HostConfig::from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            HostConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load config: {DEFAULT_CONFIG}"))
        }
        None => Ok(HostConfig::default()),
    }
}

/// A catalog holding the built-in patches with the configured library names.
pub fn builtin_catalog(config: &HostConfig) -> PatchCatalog {
    let catalog = PatchCatalog::new();
    catalog.register_builtin_with(config.library_names.clone());
    catalog
}
