use std::path::{Path, PathBuf};

use anyhow::Context;
use dotlaunch::extraction::{
    steps::NATIVE_DIR_SETTING, AssetStep, ExtractionPipeline, NativeLibraryStep, PatchModuleStep,
};
use serde::Serialize;

use crate::{app::GlobalOptions, output::print_output};

pub struct ExtractOptions<'a> {
    pub source: &'a Path,
    pub staging: &'a Path,
    pub native: &'a [String],
    pub native_dir: Option<&'a str>,
    pub patch_modules: &'a [String],
    pub assets: &'a [PathBuf],
    pub overwrite: bool,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
pub struct ExtractReport {
    pub staging: String,
    pub written: Vec<String>,
    pub unchanged: usize,
    pub skipped_steps: Vec<String>,
}

pub fn run(opts: &ExtractOptions<'_>) -> anyhow::Result<()> {
    let mut builder = ExtractionPipeline::builder()
        .source_root(opts.source)
        .staging_root(opts.staging)
        .overwrite(opts.overwrite);

    if let Some(dir) = opts.native_dir {
        builder = builder.setting(NATIVE_DIR_SETTING, dir);
    }
    if !opts.native.is_empty() {
        builder = builder.step(NativeLibraryStep::new(opts.native.iter().cloned()));
    }
    if !opts.patch_modules.is_empty() {
        builder = builder.step(PatchModuleStep::new(opts.patch_modules.iter().cloned()));
    }
    for dir in opts.assets {
        builder = builder.step(AssetStep::new(dir.clone()));
    }

    let summary = builder
        .build()
        .spawn()
        .context("failed to start extraction")?
        .join()
        .context("extraction failed")?;

    let report = ExtractReport {
        staging: opts.staging.display().to_string(),
        written: summary
            .written
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
        unchanged: summary.unchanged.len(),
        skipped_steps: summary.skipped_steps.clone(),
    };

    print_output(&report, opts.global, |r| {
        if !r.written.is_empty() {
            println!("Written:");
            for path in &r.written {
                println!("  {path}");
            }
            println!();
        }
        println!(
            "{} written, {} unchanged in {}",
            r.written.len(),
            r.unchanged,
            r.staging
        );
        if !r.skipped_steps.is_empty() {
            println!("Skipped steps: {}", r.skipped_steps.join(", "));
        }
    })
}
