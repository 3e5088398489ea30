//! Built-in extraction steps.
//!
//! | Step | Artifacts | Validation |
//! |------|-----------|------------|
//! | [`NativeLibraryStep`] | Host native libraries | ELF shared object |
//! | [`PatchModuleStep`] | Managed patch modules | PE image |
//! | [`AssetStep`] | A whole directory tree | none, staged in parallel |

use std::path::{Path, PathBuf};

use goblin::elf::{header::ET_DYN, Elf};
use log::{debug, info};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::{
    extraction::{
        stage::{stage_file, FileBytes},
        ExtractionContext, ExtractionStep,
    },
    Error, Result,
};

/// Setting that overrides the directory native libraries are staged from and into.
pub const NATIVE_DIR_SETTING: &str = "native.dir";
/// Setting published by [`NativeLibraryStep`] with the staged library directory.
pub const NATIVE_STAGED_SETTING: &str = "native.staged";
/// Setting published by [`PatchModuleStep`] with the staged module paths, `;`-separated.
pub const PATCH_MODULES_SETTING: &str = "patch.modules";

/// Checks that a file is an ELF shared object.
///
/// # Errors
///
/// Returns [`Error::GoblinErr`] for files that are not ELF at all and [`Error::Error`] for
/// ELF files of another type.
pub fn ensure_shared_object(path: &Path) -> Result<()> {
    let bytes = FileBytes::open(path)?;
    let elf = Elf::parse(bytes.data())?;
    if elf.header.e_type != ET_DYN {
        return Err(Error::Error(format!(
            "{} is not an ELF shared object (e_type {})",
            path.display(),
            elf.header.e_type
        )));
    }
    Ok(())
}

/// Checks that a file is a PE image.
///
/// # Errors
///
/// Returns [`Error::GoblinErr`] if the file does not parse as PE.
pub fn ensure_pe_image(path: &Path) -> Result<()> {
    let bytes = FileBytes::open(path)?;
    goblin::pe::PE::parse(bytes.data())?;
    Ok(())
}

/// Stages native libraries after checking each is an ELF shared object.
///
/// Libraries are read from and written to `lib/` below the roots unless the
/// [`NATIVE_DIR_SETTING`] setting names another directory. On success the step publishes the
/// staged directory as [`NATIVE_STAGED_SETTING`].
pub struct NativeLibraryStep {
    name: String,
    dir: PathBuf,
    libraries: Vec<String>,
}

impl NativeLibraryStep {
    /// Creates a step for the given library file names.
    pub fn new<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "native-libraries".to_string(),
            dir: PathBuf::from("lib"),
            libraries: libraries.into_iter().map(Into::into).collect(),
        }
    }

    /// Uses another directory below the roots.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Renames the step.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl ExtractionStep for NativeLibraryStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, ctx: &ExtractionContext) -> Result<()> {
        if let Some(dir) = ctx.setting(NATIVE_DIR_SETTING) {
            self.dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut ExtractionContext) -> Result<()> {
        for library in &self.libraries {
            let relative = self.dir.join(library);
            ensure_shared_object(&ctx.source_root().join(&relative))?;
            ctx.stage(&relative)?;
        }

        let staged = ctx.staging_root().join(&self.dir);
        ctx.set_setting(NATIVE_STAGED_SETTING, staged.to_string_lossy());
        info!(
            "Staged {} native librar{} into {}",
            self.libraries.len(),
            if self.libraries.len() == 1 { "y" } else { "ies" },
            staged.display()
        );
        Ok(())
    }
}

/// Stages managed patch modules after checking each is a PE image.
///
/// Modules are read from and written to `patches/` below the roots. On success the step
/// publishes the staged paths as [`PATCH_MODULES_SETTING`].
pub struct PatchModuleStep {
    name: String,
    dir: PathBuf,
    modules: Vec<String>,
}

impl PatchModuleStep {
    /// Creates a step for the given module file names.
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "patch-modules".to_string(),
            dir: PathBuf::from("patches"),
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    /// Uses another directory below the roots.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }
}

impl ExtractionStep for PatchModuleStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut ExtractionContext) -> Result<()> {
        let mut staged = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            let relative = self.dir.join(module);
            ensure_pe_image(&ctx.source_root().join(&relative))?;
            ctx.stage(&relative)?;
            staged.push(ctx.staging_root().join(&relative).to_string_lossy().into_owned());
        }
        ctx.set_setting(PATCH_MODULES_SETTING, staged.join(";"));
        Ok(())
    }
}

/// Stages every file below a directory, preserving the tree.
///
/// Files are staged in parallel inside the step. The step itself still runs in pipeline
/// order.
pub struct AssetStep {
    name: String,
    dir: PathBuf,
    optional: bool,
}

impl AssetStep {
    /// Creates a step for a directory below the roots.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: format!("assets:{}", dir.display()),
            dir,
            optional: false,
        }
    }

    /// Treats a missing source directory as nothing to do instead of a failure.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn collect_files(&self, source_root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(source_root.join(&self.dir)).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(source_root)
                .map_err(|e| Error::Error(e.to_string()))?;
            files.push(relative.to_path_buf());
        }
        files.sort();
        Ok(files)
    }
}

impl ExtractionStep for AssetStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut ExtractionContext) -> Result<()> {
        let source_dir = ctx.source_root().join(&self.dir);
        if self.optional && !source_dir.is_dir() {
            debug!("Optional asset directory {} absent", source_dir.display());
            return Ok(());
        }

        let files = self.collect_files(ctx.source_root())?;
        let (source_root, staging_root, force) = (
            ctx.source_root().to_path_buf(),
            ctx.staging_root().to_path_buf(),
            ctx.overwrite(),
        );

        let outcomes = files
            .into_par_iter()
            .map(|relative| {
                stage_file(
                    &source_root.join(&relative),
                    &staging_root.join(&relative),
                    force,
                )
                .map(|outcome| (relative, outcome))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Staged {} asset file(s) from {}", outcomes.len(), source_dir.display());
        for (relative, outcome) in outcomes {
            ctx.summary_mut().record(relative, outcome);
        }
        Ok(())
    }
}
