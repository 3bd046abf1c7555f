//! Failure injection at every build stage against the fake toolchain.

use isoforge::build::IsoBuilder;
use isoforge::config::PayloadSpec;
use isoforge::errors::ErrorKind;
use isoforge::pipeline::{PipelineRun, PipelineState};
use isoforge::progress::channel;
use isoforge::testing::{BuildFixture, FakeToolchain};
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn run_with(fx: &BuildFixture, builder: IsoBuilder) -> PipelineRun {
    let (tx, _rx) = channel(None);
    builder.run(fx.request(), tx).await
}

fn assert_fully_unwound(fx: &BuildFixture, fake: &FakeToolchain, run: &PipelineRun) {
    assert!(run.cleanup_failures.is_empty(), "{:?}", run.cleanup_failures);
    assert!(fx.work_dir_is_empty(), "working directories left behind");
    assert!(fake.mounted().is_empty(), "image left mounted");
    assert!(fake.mount_violations().is_empty());
    assert!(!fx.output().exists(), "partial output left behind");
}

#[tokio::test]
async fn test_extract_failure() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new().failing("7z", 2, "ERROR: Data Error"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert_eq!(run.failed_stage(), Some("extract"));
    assert_eq!(run.error().unwrap().kind(), ErrorKind::ExternalTool);
    assert_fully_unwound(&fx, &fake, &run);
    assert_eq!(fake.programs(), vec!["7z"]);
}

#[tokio::test]
async fn test_mount_failure_removes_extracted_tree() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new().failing("wimmountrw", 47, "[ERROR] cannot mount"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert_eq!(run.failed_stage(), Some("mount"));
    assert_eq!(run.error().unwrap().kind(), ErrorKind::ResourceCreation);
    assert_fully_unwound(&fx, &fake, &run);
    // Nothing was mounted, so nothing is unmounted.
    assert!(fake.invocations_of("wimunmount").is_empty());
}

#[tokio::test]
async fn test_copy_failure_discards_mount_before_removing_dirs() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new());
    // The mounted image already has a directory where the file should go.
    let config = fx
        .config()
        .with_payloads(vec![PayloadSpec::file("storage_dir/Hello-World.txt", "Windows/System32")]);
    let builder = IsoBuilder::new(config)
        .with_executor(fake.clone())
        .with_host(fake.clone())
        .with_temp_root(fx.work());

    let run = run_with(&fx, builder).await;

    assert_eq!(run.failed_stage(), Some("copy-payloads"));
    assert_fully_unwound(&fx, &fake, &run);
    let unmounts = fake.invocations_of("wimunmount");
    assert_eq!(unmounts.len(), 1);
    assert!(!unmounts[0].args.iter().any(|a| a == "--commit"));
}

#[tokio::test]
async fn test_commit_failure_falls_back_to_discard() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new().failing_with_arg("wimunmount", "--commit", 1, "[ERROR] commit failed"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert_eq!(run.failed_stage(), Some("commit"));
    assert_fully_unwound(&fx, &fake, &run);
    let unmount_modes: Vec<bool> = fake
        .invocations_of("wimunmount")
        .iter()
        .map(|i| i.args.iter().any(|a| a == "--commit"))
        .collect();
    assert_eq!(unmount_modes, vec![true, false]);
}

#[tokio::test]
async fn test_answer_file_failure() {
    let fx = BuildFixture::new().unwrap();
    // A directory in the way of the answer file.
    let fake = Arc::new(FakeToolchain::new().extracting_dir("autounattend.xml"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert_eq!(run.failed_stage(), Some("answer-file"));
    assert_eq!(run.error().unwrap().kind(), ErrorKind::Unexpected);
    assert_fully_unwound(&fx, &fake, &run);
    assert!(fake.invocations_of("genisoimage").is_empty());
}

#[tokio::test]
async fn test_repackage_failure() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new().failing("genisoimage", 255, "genisoimage: No space left on device"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert_eq!(run.failed_stage(), Some("repackage"));
    assert_fully_unwound(&fx, &fake, &run);
    assert_eq!(
        run.completed,
        vec!["preflight", "extract", "mount", "copy-payloads", "commit", "answer-file"]
    );
}

#[tokio::test]
async fn test_stuck_mount_keeps_backing_directories() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new().failing("wimunmount", 1, "[ERROR] device or resource busy"));

    let run = run_with(&fx, fx.builder(&fake)).await;

    // Commit failed, then the discard in cleanup failed too.
    assert_eq!(run.failed_stage(), Some("commit"));
    let labels: Vec<&str> = run.cleanup_failures.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, vec!["install-image", "image-mountpoint", "iso-tree"]);
    assert_eq!(fake.mounted().len(), 1);
    assert!(fake.mount_violations().is_empty());
    assert!(!fx.work_dir_is_empty());
}

#[tokio::test]
async fn test_success_leaves_only_the_output() {
    let fx = BuildFixture::new().unwrap();
    let fake = Arc::new(FakeToolchain::new());

    let run = run_with(&fx, fx.builder(&fake)).await;

    assert!(matches!(run.state, PipelineState::Succeeded));
    assert!(run.cleanup_failures.is_empty());
    assert!(fx.work_dir_is_empty());
    assert!(fake.mounted().is_empty());
    assert!(fx.output().is_file());
    assert_eq!(
        fake.programs(),
        vec!["7z", "wimmountrw", "wimunmount", "genisoimage"]
    );
}
