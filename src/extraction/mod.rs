//! Staging of on-disk artifacts before a launch.
//!
//! An [`ExtractionPipeline`] runs an ordered list of [`ExtractionStep`]s on one worker thread.
//! Steps share a typed [`ExtractionContext`] populated by the builder, see each other's names
//! and index, may publish settings for later steps and may skip later peers.
//!
//! # Failure Model
//!
//! The first failing step is logged once and ends the run. Nothing is rolled back, so every
//! step must be idempotent. The built-in steps stage through [`stage_file`], which leaves
//! identical destination files untouched, so re-running a pipeline after a failure or on an
//! unchanged source writes nothing twice.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | [`ExtractionPipeline`], its builder and [`PipelineHandle`] |
//! | [`context`] | [`ExtractionContext`] and [`ExtractionSummary`] |
//! | [`stage`] | Digest-compared atomic file staging |
//! | [`steps`] | [`NativeLibraryStep`], [`PatchModuleStep`], [`AssetStep`] |

pub mod context;
pub mod pipeline;
pub mod stage;
pub mod steps;

pub use context::{ExtractionContext, ExtractionSummary};
pub use pipeline::{ExtractionPipeline, ExtractionPipelineBuilder, ExtractionStep, PipelineHandle};
pub use stage::{file_digest, stage_file, StageOutcome};
pub use steps::{AssetStep, NativeLibraryStep, PatchModuleStep};
