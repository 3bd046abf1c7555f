//! The seven stages of an ISO build.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::context::{IsoBuildContext, INSTALL_IMAGE, ISO_TREE, MOUNTPOINT};
use super::copy::{copy_file, copy_tree};
use super::preflight::validate;
use crate::config::PayloadKind;
use crate::errors::{IsoforgeError, Result};
use crate::pipeline::Stage;
use crate::process::CommandSpec;
use crate::resources::UnmountMode;

/// Name of the answer file at the root of the ISO tree.
pub const ANSWER_FILE_NAME: &str = "autounattend.xml";

/// Stage 1: check inputs, privileges, tools and assets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preflight;

#[async_trait]
impl Stage<IsoBuildContext> for Preflight {
    fn name(&self) -> &str {
        "preflight"
    }

    fn description(&self) -> &str {
        "Checking Environment."
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        validate(&ctx.request, &ctx.config, ctx.host.as_ref())?;
        Ok(())
    }
}

/// Stage 2: extract the source ISO into a fresh directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractIso;

#[async_trait]
impl Stage<IsoBuildContext> for ExtractIso {
    fn name(&self) -> &str {
        "extract"
    }

    fn description(&self) -> &str {
        "\nExtracting ISO."
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        let tree = ctx.tracker.create_temp_dir(ISO_TREE).await?;
        let spec = CommandSpec::new(&ctx.config.tools.extractor)
            .args(["x", "-y"])
            .arg(format!("-o{}", tree.display()))
            .path_arg(&ctx.request.input);
        ctx.runner.run(&spec).await?;
        Ok(())
    }
}

/// Stage 3: mount the install image read-write on a second directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountImage;

#[async_trait]
impl Stage<IsoBuildContext> for MountImage {
    fn name(&self) -> &str {
        "mount"
    }

    fn description(&self) -> &str {
        "\nMounting install.wim in read write mode."
    }

    fn requires(&self) -> &[&'static str] {
        &[ISO_TREE]
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        let image = ctx.live_path(ISO_TREE)?.join(&ctx.config.image_path);
        let mountpoint = ctx.tracker.create_temp_dir(MOUNTPOINT).await?;
        ctx.tracker
            .mount_image(INSTALL_IMAGE, &image, ctx.config.image_index, &mountpoint)
            .await?;
        Ok(())
    }
}

/// Stage 4: copy the configured payloads into the mounted image.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPayloads;

#[async_trait]
impl Stage<IsoBuildContext> for CopyPayloads {
    fn name(&self) -> &str {
        "copy-payloads"
    }

    fn description(&self) -> &str {
        "\nCopying files over to the mounted install.wim."
    }

    fn requires(&self) -> &[&'static str] {
        &[INSTALL_IMAGE]
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        let image_root = ctx.live_path(INSTALL_IMAGE)?;

        for payload in &ctx.config.payloads {
            let source = ctx.config.resolve_asset(&payload.source);
            let dest = image_root.join(&payload.destination);
            ctx.progress.heading(format!("Copying {}.", display_name(&source)))?;

            let kind = payload.kind;
            let lines = tokio::task::spawn_blocking(move || match kind {
                PayloadKind::Tree => copy_tree(&source, &dest),
                PayloadKind::File => copy_file(&source, &dest).map(|line| vec![line]),
            })
            .await
            .map_err(|e| IsoforgeError::unexpected(format!("copy task failed: {e}")))??;

            debug!(entries = lines.len(), "payload copied");
            ctx.progress.running(lines.join("\n"))?;
        }
        Ok(())
    }
}

/// Stage 5: unmount the image, keeping the changes.
///
/// The tracker waits out the settling delay before this stage returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitImage;

#[async_trait]
impl Stage<IsoBuildContext> for CommitImage {
    fn name(&self) -> &str {
        "commit"
    }

    fn description(&self) -> &str {
        "\nUnmounting install.wim and keeping the changes."
    }

    fn requires(&self) -> &[&'static str] {
        &[INSTALL_IMAGE]
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        ctx.tracker.release_label(INSTALL_IMAGE, UnmountMode::Commit).await
    }
}

/// Stage 6: put the answer file for the requested boot mode at the ISO root.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteAnswerFile;

#[async_trait]
impl Stage<IsoBuildContext> for WriteAnswerFile {
    fn name(&self) -> &str {
        "answer-file"
    }

    fn description(&self) -> &str {
        "\nCopying autounattend.xml to the ISO directory."
    }

    fn requires(&self) -> &[&'static str] {
        &[ISO_TREE]
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        let source = ctx.request.boot_mode.answer_file(&ctx.config);
        let dest = ctx.live_path(ISO_TREE)?.join(ANSWER_FILE_NAME);
        let line = copy_file(&source, &dest)?;
        ctx.progress.running(line)?;
        Ok(())
    }
}

/// Stage 7: author the bootable ISO from the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct Repackage;

impl Repackage {
    fn command(ctx: &IsoBuildContext, tree: &Path) -> CommandSpec {
        let boot_image = ctx.config.boot_image.to_string_lossy().into_owned();
        CommandSpec::new(&ctx.config.tools.authoring)
            .args([
                "-no-emul-boot",
                "-boot-load-seg",
                "0x07C0",
                "-boot-load-size",
                "8",
                "-iso-level",
                "3",
                "-udf",
                "-joliet",
                "-D",
                "-N",
                "-relaxed-filenames",
                "-allow-limited-size",
                "-b",
            ])
            .arg(boot_image)
            .arg("-o")
            .path_arg(&ctx.request.output)
            .path_arg(tree)
            .filter_stderr(ctx.config.authoring_filter())
    }
}

#[async_trait]
impl Stage<IsoBuildContext> for Repackage {
    fn name(&self) -> &str {
        "repackage"
    }

    fn description(&self) -> &str {
        "\nConverting the ISO directory back to a bootable Windows ISO."
    }

    fn requires(&self) -> &[&'static str] {
        &[ISO_TREE]
    }

    async fn execute(&self, ctx: &mut IsoBuildContext) -> Result<()> {
        if ctx.tracker.is_live(INSTALL_IMAGE) {
            return Err(IsoforgeError::unexpected("the install image is still mounted"));
        }
        let tree = ctx.live_path(ISO_TREE)?;
        let output_existed = ctx.request.output.exists();

        let result = ctx.runner.run(&Self::command(ctx, &tree)).await;
        if result.is_err() && !output_existed {
            remove_partial_output(&ctx.request.output);
        }
        result.map(|_| ())
    }
}

fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial output"),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Absolute form of `path`, falling back to the current directory join.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}
