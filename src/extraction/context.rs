//! Typed shared state of one pipeline run.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

use log::debug;

use crate::extraction::stage::{stage_file, StageOutcome};
use crate::Result;

/// Counters of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Files written to the staging root, relative to it
    pub written: Vec<PathBuf>,
    /// Files already identical at the destination
    pub unchanged: Vec<PathBuf>,
    /// Steps skipped at the request of an earlier step
    pub skipped_steps: Vec<String>,
}

impl ExtractionSummary {
    pub(crate) fn record(&mut self, relative: PathBuf, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Written => self.written.push(relative),
            StageOutcome::Unchanged => self.unchanged.push(relative),
        }
    }
}

/// State shared by all steps of a pipeline run.
///
/// The builder populates the roots, the overwrite flag and the free-form settings. The
/// pipeline fills in the step list and keeps `step_index` current. Earlier steps may add
/// settings for later ones and may mark later steps as skipped.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    staging_root: PathBuf,
    source_root: PathBuf,
    overwrite: bool,
    settings: BTreeMap<String, String>,
    step_names: Vec<String>,
    step_index: usize,
    skipped: BTreeSet<String>,
    summary: ExtractionSummary,
}

impl ExtractionContext {
    pub(crate) fn new(
        staging_root: PathBuf,
        source_root: PathBuf,
        overwrite: bool,
        settings: BTreeMap<String, String>,
        step_names: Vec<String>,
    ) -> Self {
        Self {
            staging_root,
            source_root,
            overwrite,
            settings,
            step_names,
            step_index: 0,
            skipped: BTreeSet::new(),
            summary: ExtractionSummary::default(),
        }
    }

    /// Directory artifacts are staged into.
    #[must_use]
    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Directory artifacts are read from.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Whether identical destination files are rewritten anyway.
    #[must_use]
    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// A free-form setting.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Adds or replaces a setting for later steps.
    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Names of every step in the pipeline, in order.
    #[must_use]
    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    /// Index of the step currently running.
    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub(crate) fn set_step_index(&mut self, index: usize) {
        self.step_index = index;
    }

    /// Marks a peer step as skipped. Has no effect on steps that already ran.
    pub fn skip(&mut self, step: impl Into<String>) {
        let step = step.into();
        debug!("Step '{}' requested skip of '{}'", self.current_step(), step);
        self.skipped.insert(step);
    }

    /// Returns `true` if a step was marked as skipped.
    #[must_use]
    pub fn is_skipped(&self, step: &str) -> bool {
        self.skipped.contains(step)
    }

    /// Counters of the run so far.
    #[must_use]
    pub fn summary(&self) -> &ExtractionSummary {
        &self.summary
    }

    pub(crate) fn summary_mut(&mut self) -> &mut ExtractionSummary {
        &mut self.summary
    }

    pub(crate) fn into_summary(self) -> ExtractionSummary {
        self.summary
    }

    /// Stages one file from the source root into the staging root at the same relative path.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from reading the source or writing the destination.
    pub fn stage(&mut self, relative: impl AsRef<Path>) -> Result<StageOutcome> {
        let relative = relative.as_ref();
        let outcome = stage_file(
            &self.source_root.join(relative),
            &self.staging_root.join(relative),
            self.overwrite,
        )?;
        self.summary.record(relative.to_path_buf(), outcome);
        Ok(outcome)
    }

    fn current_step(&self) -> &str {
        self.step_names
            .get(self.step_index)
            .map_or("<builder>", String::as_str)
    }
}
