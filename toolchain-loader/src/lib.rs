//! This module is responsible for toolchain loading: what language a
//! submission is written in and how to build an image for it.
mod entrypoint;
mod image_spec;
mod language;

pub use entrypoint::find_entrypoint;
pub use image_spec::{substitute, ImageSpecBuilder, Placeholder, IMAGE_SPEC_FILE};
pub use language::{classify, Language};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Toolchain description
pub struct Toolchain {
    /// Manifest
    pub spec: ToolchainSpec,
    /// Image spec template with `%NAME%` placeholders
    pub template: String,
}

/// `manifest.yaml` representation
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolchainSpec {
    /// Human-readable
    pub title: String,

    /// Machine-readable
    pub name: String,

    #[serde(default)]
    pub dependencies: Option<Dependencies>,

    #[serde(default)]
    pub entrypoint: Option<EntrypointRule>,

    /// Directory inside the image where submission code lives
    #[serde(rename = "work-dir", default = "ToolchainSpec::default_work_dir")]
    pub work_dir: String,
}

impl ToolchainSpec {
    fn default_work_dir() -> String {
        String::from("/app")
    }
}

/// How to install submission dependencies, if it declares any
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dependencies {
    /// File in the repository root listing dependencies
    pub file: String,
    /// Image spec snippet used when `file` exists
    pub install: String,
}

/// How to find the file the container should run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntrypointRule {
    /// Extension of source files, without the dot
    pub extension: String,
    /// Preferred file names, checked in order
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Regex matching contents of a runnable file
    #[serde(rename = "main-pattern", default)]
    pub main_pattern: Option<String>,
}

/// Responsible for fetching toolchains
pub struct ToolchainLoader {
    /// Directory containing toolchain definitions
    toolchains_dir: PathBuf,
}

impl ToolchainLoader {
    pub async fn new(toolchains_dir: &Path) -> anyhow::Result<ToolchainLoader> {
        let meta = tokio::fs::metadata(toolchains_dir).await.with_context(|| {
            format!(
                "toolchains directory {} is not accessible",
                toolchains_dir.display()
            )
        })?;
        if !meta.is_dir() {
            anyhow::bail!("{} is not a directory", toolchains_dir.display());
        }
        Ok(ToolchainLoader {
            toolchains_dir: toolchains_dir.to_path_buf(),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, language: Language) -> anyhow::Result<Toolchain> {
        if language == Language::Unknown {
            anyhow::bail!("unable to determine submission language");
        }
        let toolchain_dir_path = self.toolchains_dir.join(language.as_ref());

        let toolchain_spec = tokio::fs::read(toolchain_dir_path.join("manifest.yaml"))
            .await
            .with_context(|| format!("no toolchain manifest for {} yet", language))?;
        let spec: ToolchainSpec =
            serde_yaml::from_slice(&toolchain_spec).context("invalid toolchain spec")?;
        let template = tokio::fs::read_to_string(toolchain_dir_path.join("Dockerfile.in"))
            .await
            .context("toolchain image template (Dockerfile.in) missing")?;
        Ok(Toolchain { spec, template })
    }
}
