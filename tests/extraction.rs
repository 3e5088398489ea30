//! Integration tests for the extraction pipeline.

mod common;

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use common::{capture_logs, logs_containing};
use dotlaunch::{
    extraction::{AssetStep, ExtractionContext, ExtractionPipeline, ExtractionStep},
    Error, Result,
};
use log::Level;
use walkdir::WalkDir;

struct RecordingStep {
    name: &'static str,
    fail: bool,
    ran: Arc<Mutex<Vec<&'static str>>>,
}

impl ExtractionStep for RecordingStep {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&mut self, _ctx: &mut ExtractionContext) -> Result<()> {
        self.ran.lock().unwrap().push(self.name);
        if self.fail {
            Err(Error::Error("checksum mismatch".to_string()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_failing_step_stops_later_steps() {
    capture_logs();
    let ran = Arc::new(Mutex::new(Vec::new()));
    let step = |name, fail| RecordingStep {
        name,
        fail,
        ran: ran.clone(),
    };

    let result = ExtractionPipeline::builder()
        .step(step("unpack-runtime", false))
        .step(step("verify-payload", true))
        .step(step("stage-assets", false))
        .build()
        .spawn()
        .unwrap()
        .join();

    match result {
        Err(Error::ExtractionStep { index, step, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(step, "verify-payload");
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(
        *ran.lock().unwrap(),
        vec!["unpack-runtime", "verify-payload"]
    );

    let failures: Vec<_> = logs_containing("('verify-payload') failed")
        .into_iter()
        .filter(|record| record.level == Level::Error)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("step 1"));
    assert!(logs_containing("('stage-assets') failed").is_empty());
}

fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (relative, fs::read(entry.path()).unwrap())
        })
        .collect()
}

fn asset_pipeline(source: &Path, staging: &Path) -> ExtractionPipeline {
    ExtractionPipeline::builder()
        .source_root(source)
        .staging_root(staging)
        .step(AssetStep::new("Content"))
        .step(AssetStep::new("Mods").optional())
        .build()
}

#[test]
fn test_rerun_is_idempotent() {
    let source = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let content = source.path().join("Content");
    fs::create_dir_all(content.join("Graphics/Atlases")).unwrap();
    fs::write(content.join("Graphics/Atlases/Gameplay.meta"), b"atlas").unwrap();
    fs::write(content.join("Dialog.txt"), b"hello").unwrap();

    let first = asset_pipeline(source.path(), staging.path()).run().unwrap();
    let after_first = tree(staging.path());

    let second = asset_pipeline(source.path(), staging.path()).run().unwrap();
    let after_second = tree(staging.path());

    assert_eq!(first.written.len(), 2);
    assert!(second.written.is_empty());
    assert_eq!(second.unchanged.len(), 2);
    assert_eq!(after_first, after_second);
    assert_eq!(
        after_second.get("Content/Dialog.txt").map(Vec::as_slice),
        Some(&b"hello"[..])
    );
}

#[test]
fn test_rerun_after_failure_completes() {
    let source = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    fs::create_dir_all(source.path().join("Content")).unwrap();
    fs::write(source.path().join("Content/a.xnb"), b"a").unwrap();

    let ran = Arc::new(Mutex::new(Vec::new()));
    let failed = ExtractionPipeline::builder()
        .source_root(source.path())
        .staging_root(staging.path())
        .step(AssetStep::new("Content"))
        .step(RecordingStep {
            name: "flaky",
            fail: true,
            ran: ran.clone(),
        })
        .build()
        .run();
    assert!(failed.is_err());
    assert!(staging.path().join("Content/a.xnb").is_file());

    let summary = asset_pipeline(source.path(), staging.path()).run().unwrap();
    assert_eq!(summary.unchanged.len(), 1);
    assert!(summary.written.is_empty());
}

#[test]
fn test_overwrite_rewrites_identical_files() {
    let source = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    fs::create_dir_all(source.path().join("Content")).unwrap();
    fs::write(source.path().join("Content/a.xnb"), b"a").unwrap();

    asset_pipeline(source.path(), staging.path()).run().unwrap();
    let forced = ExtractionPipeline::builder()
        .source_root(source.path())
        .staging_root(staging.path())
        .overwrite(true)
        .step(AssetStep::new("Content"))
        .build()
        .run()
        .unwrap();

    assert_eq!(forced.written.len(), 1);
    assert!(forced.unchanged.is_empty());
}
