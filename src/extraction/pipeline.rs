//! The ordered, fail-fast extraction pipeline.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    thread::{self, JoinHandle},
};

use log::{debug, error, info};

use crate::{
    extraction::{ExtractionContext, ExtractionSummary},
    Error, Result,
};

/// One unit of artifact preparation.
///
/// Steps run strictly in pipeline order on one thread. Before any step runs, every step is
/// offered the builder-populated context through [`configure`](Self::configure). A step that
/// keeps the default implementation has not opted in to configuration.
pub trait ExtractionStep: Send {
    /// Name used in logs and for [`ExtractionContext::skip`].
    fn name(&self) -> &str;

    /// Called once for every step before the first step runs.
    ///
    /// # Errors
    ///
    /// An error aborts the pipeline before any step runs.
    fn configure(&mut self, _ctx: &ExtractionContext) -> Result<()> {
        Ok(())
    }

    /// Performs the step.
    ///
    /// Steps must be idempotent: re-running a pipeline from the start after a failure is the
    /// only recovery.
    ///
    /// # Errors
    ///
    /// An error aborts the remaining steps. Completed steps are not rolled back.
    fn run(&mut self, ctx: &mut ExtractionContext) -> Result<()>;
}

/// Builder for [`ExtractionPipeline`].
#[derive(Default)]
pub struct ExtractionPipelineBuilder {
    staging_root: Option<PathBuf>,
    source_root: Option<PathBuf>,
    overwrite: bool,
    settings: BTreeMap<String, String>,
    steps: Vec<Box<dyn ExtractionStep>>,
}

impl ExtractionPipelineBuilder {
    /// Directory artifacts are staged into. Defaults to the current directory.
    #[must_use]
    pub fn staging_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(path.into());
        self
    }

    /// Directory artifacts are read from. Defaults to the current directory.
    #[must_use]
    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = Some(path.into());
        self
    }

    /// Rewrite destination files even when they are identical.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Adds a free-form setting visible to every step.
    #[must_use]
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: impl ExtractionStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Appends an already boxed step.
    #[must_use]
    pub fn boxed_step(mut self, step: Box<dyn ExtractionStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Finishes the pipeline.
    #[must_use]
    pub fn build(self) -> ExtractionPipeline {
        ExtractionPipeline {
            staging_root: self.staging_root.unwrap_or_else(|| PathBuf::from(".")),
            source_root: self.source_root.unwrap_or_else(|| PathBuf::from(".")),
            overwrite: self.overwrite,
            settings: self.settings,
            steps: self.steps,
        }
    }
}

/// An ordered sequence of [`ExtractionStep`]s sharing one [`ExtractionContext`].
///
/// The first failing step is logged once, with its index and name, and ends the run.
/// Later steps never run and earlier steps are not rolled back. An empty pipeline succeeds
/// without doing anything.
///
/// # Examples
///
/// ```rust,no_run
/// use dotlaunch::extraction::{AssetStep, ExtractionPipeline, NativeLibraryStep};
///
/// let handle = ExtractionPipeline::builder()
///     .source_root("/sdcard/Download/game")
///     .staging_root("/data/local/game")
///     .step(NativeLibraryStep::new(["libSDL2.so", "libFNA3D.so"]))
///     .step(AssetStep::new("Content"))
///     .build()
///     .spawn()?;
///
/// let summary = handle.join()?;
/// println!("{} files written", summary.written.len());
/// # Ok::<(), dotlaunch::Error>(())
/// ```
pub struct ExtractionPipeline {
    staging_root: PathBuf,
    source_root: PathBuf,
    overwrite: bool,
    settings: BTreeMap<String, String>,
    steps: Vec<Box<dyn ExtractionStep>>,
}

impl ExtractionPipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ExtractionPipelineBuilder {
        ExtractionPipelineBuilder::default()
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExtractionStep`] naming the first step that failed to configure or run.
    pub fn run(mut self) -> Result<ExtractionSummary> {
        let names: Vec<String> = self.steps.iter().map(|s| s.name().to_string()).collect();
        let mut ctx = ExtractionContext::new(
            self.staging_root,
            self.source_root,
            self.overwrite,
            self.settings,
            names,
        );

        if self.steps.is_empty() {
            debug!("Extraction pipeline has no steps");
            return Ok(ctx.into_summary());
        }

        for (index, step) in self.steps.iter_mut().enumerate() {
            ctx.set_step_index(index);
            if let Err(cause) = step.configure(&ctx) {
                return Err(Self::failure(index, step.name(), &cause));
            }
        }

        for (index, step) in self.steps.iter_mut().enumerate() {
            ctx.set_step_index(index);
            let name = step.name().to_string();

            if ctx.is_skipped(&name) {
                debug!("Extraction step {index} ('{name}') skipped");
                ctx.summary_mut().skipped_steps.push(name);
                continue;
            }

            debug!("Running extraction step {index} ('{name}')");
            if let Err(cause) = step.run(&mut ctx) {
                return Err(Self::failure(index, &name, &cause));
            }
        }

        let summary = ctx.into_summary();
        info!(
            "Extraction finished: {} written, {} unchanged, {} step(s) skipped",
            summary.written.len(),
            summary.unchanged.len(),
            summary.skipped_steps.len()
        );
        Ok(summary)
    }

    /// Runs the pipeline on a dedicated worker thread named `dotlaunch-extract`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> Result<PipelineHandle> {
        let handle = thread::Builder::new()
            .name("dotlaunch-extract".into())
            .spawn(move || self.run())?;
        Ok(PipelineHandle { handle })
    }

    fn failure(index: usize, step: &str, cause: &Error) -> Error {
        error!("Extraction step {index} ('{step}') failed: {cause}");
        Error::ExtractionStep {
            index,
            step: step.to_string(),
            message: cause.to_string(),
        }
    }
}

/// A pipeline running on its worker thread.
///
/// There is no cancellation: a running pipeline always runs to completion or to its first
/// failure.
pub struct PipelineHandle {
    handle: JoinHandle<Result<ExtractionSummary>>,
}

impl PipelineHandle {
    /// Returns `true` once the worker has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error, or [`Error::Error`] if the worker panicked.
    pub fn join(self) -> Result<ExtractionSummary> {
        self.handle
            .join()
            .map_err(|_| Error::Error("extraction worker panicked".to_string()))?
    }
}
