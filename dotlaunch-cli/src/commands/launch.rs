use std::path::Path;

use anyhow::Context;
use dotlaunch::{
    host::{HostController, LaunchRequest},
    interception::InstallReport,
    telemetry,
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_config,
    output::{print_output, print_listing, Column, Listing},
};

pub struct LaunchOptions<'a> {
    pub patches: &'a [String],
    pub no_patches: bool,
    pub overlay: bool,
    pub global: &'a GlobalOptions,
}

#[derive(Debug, Serialize)]
pub struct LaunchSummary {
    pub module: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub overlay_active: bool,
    pub patches: Vec<PatchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<FrameSummary>,
}

#[derive(Debug, Serialize)]
pub struct PatchStatus {
    pub id: String,
    pub module: String,
    pub state: String,
    pub applied: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct FrameSummary {
    pub frames: u64,
    pub average_fps: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl From<&InstallReport> for PatchStatus {
    fn from(report: &InstallReport) -> Self {
        Self {
            id: report.id.clone(),
            module: report.module.clone(),
            state: report.state.to_string(),
            applied: report.applied,
            skipped: report.skipped.clone(),
        }
    }
}

/// Launch a module and return the exit code the process should exit with.
impl Listing for PatchStatus {
    const COLUMNS: &'static [Column] = &[
        Column::text("PATCH"),
        Column::text("MODULE"),
        Column::text("STATE"),
        Column::count("APPLIED"),
        Column::text("SKIPPED"),
    ];

    fn rows(&self) -> Vec<Vec<String>> {
        vec![vec![
            self.id.clone(),
            self.module.clone(),
            self.state.clone(),
            self.applied.to_string(),
            self.skipped.join(", "),
        ]]
    }
}

pub fn run(module: &Path, args: &[String], opts: &LaunchOptions<'_>) -> anyhow::Result<i32> {
    let config = load_config(opts.global)?;
    let patch_set: Vec<String> = if opts.no_patches {
        Vec::new()
    } else if opts.patches.is_empty() {
        config.patches.clone()
    } else {
        opts.patches.to_vec()
    };

    let controller = HostController::from_config(config).context("failed to set up host")?;
    let request = LaunchRequest::builder(module)
        .args(args.iter().cloned())
        .patches(patch_set)
        .compatibility_overlay(opts.overlay)
        .build();

    let outcome = controller
        .launch(request)
        .with_context(|| format!("failed to launch {}", module.display()))?;

    let frames = telemetry::frame_stats().snapshot();
    let summary = LaunchSummary {
        module: module.display().to_string(),
        exit_code: outcome.exit_code,
        last_error: outcome.last_error.clone(),
        overlay_active: outcome.overlay_active,
        patches: outcome.patch_reports.iter().map(PatchStatus::from).collect(),
        frames: (frames.frames > 0).then(|| FrameSummary {
            frames: frames.frames,
            average_fps: frames.average_fps,
            min_ms: frames.min.as_secs_f64() * 1000.0,
            max_ms: frames.max.as_secs_f64() * 1000.0,
        }),
    };

    print_output(&summary, opts.global, |s| {
        println!("Module:    {}", s.module);
        println!("Exit code: {}", s.exit_code);
        if let Some(error) = &s.last_error {
            println!("Error:     {error}");
        }
        println!(
            "Overlay:   {}",
            if s.overlay_active { "active" } else { "inactive" }
        );

        if !s.patches.is_empty() {
            println!();
            print_listing(&s.patches);
        }

        if let Some(frames) = &s.frames {
            println!();
            println!(
                "Frames:    {} ({:.1} fps, {:.2}-{:.2} ms)",
                frames.frames, frames.average_fps, frames.min_ms, frames.max_ms
            );
        }
    })?;

    Ok(outcome.exit_code)
}
