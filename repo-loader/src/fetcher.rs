use anyhow::Context;
use std::path::{Path, PathBuf};

/// Something that can materialize submission code into a directory.
#[async_trait::async_trait]
pub(crate) trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this fetcher knows how to handle `source`.
    async fn supports(&self, source: &str) -> bool;

    /// Places the code referenced by `source` into `dest`.
    /// `dest` exists and is empty.
    async fn fetch(&self, source: &str, dest: &Path) -> anyhow::Result<()>;
}

/// Copies a directory available on this host.
pub(crate) struct FsFetcher;

impl FsFetcher {
    fn local_path(source: &str) -> Option<PathBuf> {
        if source.starts_with("file://") {
            return url::Url::parse(source).ok()?.to_file_path().ok();
        }
        Some(PathBuf::from(source))
    }
}

#[async_trait::async_trait]
impl Fetcher for FsFetcher {
    fn name(&self) -> &str {
        "fs"
    }

    async fn supports(&self, source: &str) -> bool {
        match Self::local_path(source) {
            Some(p) => tokio::fs::metadata(p)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false),
            None => false,
        }
    }

    async fn fetch(&self, source: &str, dest: &Path) -> anyhow::Result<()> {
        let src = Self::local_path(source).context("not a local path")?;
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut opts = fs_extra::dir::CopyOptions::new();
            opts.content_only = true;
            opts.overwrite = true;
            fs_extra::dir::copy(&src, &dest, &opts).with_context(|| {
                format!("failed to copy {} to {}", src.display(), dest.display())
            })
        })
        .await
        .context("copy task panicked")??;
        Ok(())
    }
}

/// Clones a repository with the `git` executable.
pub(crate) struct GitFetcher {
    pub(crate) program: PathBuf,
}

#[async_trait::async_trait]
impl Fetcher for GitFetcher {
    fn name(&self) -> &str {
        "git"
    }

    async fn supports(&self, _source: &str) -> bool {
        true
    }

    async fn fetch(&self, source: &str, dest: &Path) -> anyhow::Result<()> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--quiet")
            .arg(source)
            .arg(dest);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.kill_on_drop(true);
        let out = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            anyhow::bail!("git clone exited with {}: {}", out.status, stderr.trim());
        }
        if !stderr.trim().is_empty() {
            tracing::info!("git: {}", stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_fetcher_copies_contents() {
        let src = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(src.path().join("pkg")).await.unwrap();
        tokio::fs::write(src.path().join("pkg").join("util.py"), "x = 1")
            .await
            .unwrap();
        tokio::fs::write(src.path().join("main.py"), "print(1)")
            .await
            .unwrap();
        let dest = tempfile::tempdir().unwrap();

        let source = src.path().to_str().unwrap();
        assert!(FsFetcher.supports(source).await);
        FsFetcher.fetch(source, dest.path()).await.unwrap();
        assert!(dest.path().join("main.py").exists());
        assert!(dest.path().join("pkg").join("util.py").exists());
    }

    #[tokio::test]
    async fn fs_fetcher_ignores_remote_urls() {
        assert!(!FsFetcher.supports("https://github.com/someone/homework.git").await);
        assert!(!FsFetcher.supports("file:///definitely/not/here").await);
    }
}
