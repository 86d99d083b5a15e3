use crate::{entrypoint::find_entrypoint, Toolchain};
use anyhow::Context as _;
use grader_apis::PlatformConfig;
use std::path::{Path, PathBuf};

/// Name of the rendered image spec inside the workspace
pub const IMAGE_SPEC_FILE: &str = "Dockerfile";

/// Variables that can appear in templates as `%NAME%`
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Placeholder {
    Image,
    ImageVersion,
    EntrypointArgs,
    EntrypointFile,
    InstallDependencies,
    RepoDir,
}

impl Placeholder {
    pub fn pattern(self) -> String {
        format!("%{}%", self)
    }
}

/// Replaces every occurrence of every given placeholder.
pub fn substitute(text: &str, vars: &[(Placeholder, &str)]) -> String {
    let mut out = text.to_string();
    for (placeholder, value) in vars {
        out = out.replace(&placeholder.pattern(), value);
    }
    out
}

/// Renders a toolchain template for one submission workspace.
pub struct ImageSpecBuilder<'a> {
    toolchain: &'a Toolchain,
    config: &'a PlatformConfig,
}

impl<'a> ImageSpecBuilder<'a> {
    pub fn new(toolchain: &'a Toolchain, config: &'a PlatformConfig) -> Self {
        ImageSpecBuilder { toolchain, config }
    }

    /// Produces image spec text for code in `repo`.
    pub async fn render(&self, repo: &Path) -> anyhow::Result<String> {
        let entrypoint_pattern = Placeholder::EntrypointFile.pattern();
        let needs_entrypoint = self.toolchain.template.contains(&entrypoint_pattern)
            || self
                .config
                .entrypoint_args
                .iter()
                .any(|a| a.contains(&entrypoint_pattern));
        let entrypoint_file = match (&self.toolchain.spec.entrypoint, needs_entrypoint) {
            (Some(rule), true) => find_entrypoint(repo, rule).await?,
            (None, true) => anyhow::bail!(
                "toolchain {} can not locate an entrypoint file",
                self.toolchain.spec.name
            ),
            (_, false) => String::new(),
        };

        let install = match &self.toolchain.spec.dependencies {
            Some(deps) if tokio::fs::metadata(repo.join(&deps.file)).await.is_ok() => {
                tracing::debug!(file = deps.file.as_str(), "installing declared dependencies");
                deps.install.trim_end().to_string()
            }
            _ => String::new(),
        };

        let args = self
            .config
            .entrypoint_args
            .iter()
            .map(|arg| {
                let arg = substitute(arg, &[(Placeholder::EntrypointFile, &entrypoint_file)]);
                // exec form is a JSON array
                serde_json::to_string(&arg)
            })
            .collect::<Result<Vec<_>, _>>()
            .context("failed to render entrypoint arguments")?
            .join(", ");

        let repo_dir = repo
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(substitute(
            &self.toolchain.template,
            &[
                (Placeholder::InstallDependencies, &install),
                (Placeholder::RepoDir, &repo_dir),
                (Placeholder::EntrypointFile, &entrypoint_file),
                (Placeholder::Image, &self.config.base_image),
                (Placeholder::ImageVersion, &self.config.base_image_version),
                (Placeholder::EntrypointArgs, &args),
            ],
        ))
    }

    /// Renders the spec and stores it in `repo`, returning its path.
    #[tracing::instrument(skip(self))]
    pub async fn write(&self, repo: &Path) -> anyhow::Result<PathBuf> {
        let spec = self.render(repo).await?;
        let dest = repo.join(IMAGE_SPEC_FILE);
        tokio::fs::write(&dest, spec)
            .await
            .with_context(|| format!("failed to write image spec to {}", dest.display()))?;
        Ok(dest)
    }
}
