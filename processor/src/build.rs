use anyhow::Context;
use container_client::ContainerRuntime;
use grader_apis::PlatformConfig;
use std::path::Path;
use toolchain_loader::{Toolchain, ToolchainLoader, IMAGE_SPEC_FILE};

/// Classifies the workspace, renders its image spec and builds image `tag`.
#[tracing::instrument(skip(runtime, toolchains, config))]
pub(crate) async fn build_image(
    runtime: &dyn ContainerRuntime,
    toolchains: &ToolchainLoader,
    config: &PlatformConfig,
    workspace: &Path,
    tag: &str,
) -> anyhow::Result<Toolchain> {
    let language = toolchain_loader::classify(workspace)
        .await
        .context("failed to classify submission")?;
    tracing::info!(%language, "submission classified");
    let toolchain = toolchains
        .resolve(language)
        .await
        .context("failed to find toolchain")?;
    toolchain_loader::ImageSpecBuilder::new(&toolchain, config)
        .write(workspace)
        .await?;
    runtime
        .build_image(workspace, IMAGE_SPEC_FILE, tag)
        .await
        .with_context(|| format!("failed to build image {}", tag))?;
    Ok(toolchain)
}
