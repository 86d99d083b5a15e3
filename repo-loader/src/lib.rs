//! This library is responsible for fetching submission code into
//! per-submission workspaces.

mod fetcher;

use anyhow::Context;
use backoff::ExponentialBackoffBuilder;
use fetcher::Fetcher;
use grader_apis::{submission::sanitize, Submission};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Used in [`from_config`](Loader::from_config) constructor
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// `git` executable. None disables cloning.
    pub git: Option<PathBuf>,
    /// Allow sources that are directories on this host
    pub local: bool,
    /// Failed fetches are retried until this much time has passed
    pub retry_window: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            git: Some(PathBuf::from("git")),
            local: true,
            retry_window: Duration::from_secs(30),
        }
    }
}

pub struct Loader {
    fetchers: Vec<Box<dyn Fetcher>>,
    /// Each submission will be placed in ${workspace_root}/${sanitized_name}-${repo}
    workspace_root: PathBuf,
    retry_window: Duration,
}

/// Directory holding one submission's code
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the workspace directory.
    pub async fn remove(self) -> anyhow::Result<()> {
        remove_dir_if_exists(&self.path).await
    }
}

async fn remove_dir_if_exists(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove {}", path.display()))
        }
    }
}

async fn dir_is_empty(path: &Path) -> anyhow::Result<bool> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

impl Loader {
    pub async fn from_config(conf: &LoaderConfig, workspace_root: PathBuf) -> anyhow::Result<Loader> {
        tokio::fs::create_dir_all(&workspace_root)
            .await
            .with_context(|| {
                format!(
                    "failed to create workspace dir at {}",
                    workspace_root.display()
                )
            })?;
        let mut loader = Loader {
            fetchers: vec![],
            workspace_root,
            retry_window: conf.retry_window,
        };
        if conf.local {
            loader.fetchers.push(Box::new(fetcher::FsFetcher));
        }
        if let Some(git) = &conf.git {
            loader.fetchers.push(Box::new(fetcher::GitFetcher {
                program: git.clone(),
            }));
        }
        Ok(loader)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Removes leftovers of previous runs.
    pub async fn reset(&self) -> anyhow::Result<()> {
        remove_dir_if_exists(&self.workspace_root).await?;
        tokio::fs::create_dir_all(&self.workspace_root)
            .await
            .context("failed to recreate workspace root")?;
        Ok(())
    }

    /// Fetches code of `submission` into a fresh workspace.
    #[tracing::instrument(skip(self, submission), fields(submission = submission.name()))]
    pub async fn acquire(&self, submission: &Submission) -> anyhow::Result<Workspace> {
        let source = submission.source_url();
        let dest = self.workspace_root.join(format!(
            "{}-{}",
            submission.sanitized_name(),
            repo_dir_name(source)
        ));

        let mut chosen = None;
        for f in &self.fetchers {
            if f.supports(source).await {
                chosen = Some(f.as_ref());
                break;
            }
        }
        let fetcher = chosen.with_context(|| format!("no fetcher can handle '{}'", source))?;
        tracing::info!(fetcher = fetcher.name(), dest = %dest.display(), "fetching submission");

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_elapsed_time(Some(self.retry_window))
            .build();
        let dest_ref: &Path = &dest;
        let fetched = backoff::future::retry(policy, || async move {
            remove_dir_if_exists(dest_ref)
                .await
                .map_err(backoff::Error::permanent)?;
            tokio::fs::create_dir_all(dest_ref)
                .await
                .context("failed to create workspace")
                .map_err(backoff::Error::permanent)?;
            fetcher.fetch(source, dest_ref).await.map_err(|err| {
                tracing::warn!(err = %format_args!("{:#}", err), "fetch attempt failed");
                backoff::Error::transient(err)
            })
        })
        .await;
        if let Err(err) = fetched {
            if let Err(cleanup) = remove_dir_if_exists(&dest).await {
                tracing::warn!(err = %format_args!("{:#}", cleanup), "failed to clean up workspace");
            }
            return Err(err).with_context(|| {
                format!("was unable to fetch '{}' for {}", source, submission.name())
            });
        }

        let workspace = Workspace { path: dest };
        let empty = dir_is_empty(workspace.path()).await.unwrap_or(true);
        if empty {
            workspace.remove().await.ok();
            anyhow::bail!("fetching '{}' produced an empty workspace", source);
        }
        Ok(workspace)
    }
}

/// Last path segment of the source, without `.git`, safe for use in paths.
pub fn repo_dir_name(source: &str) -> String {
    let trimmed = source.trim_end_matches('/');
    let last = match url::Url::parse(trimmed) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
        Err(_) => Path::new(trimmed)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    };
    let last = last.unwrap_or_default();
    let last = last.strip_suffix(".git").unwrap_or(&last);
    if last.is_empty() {
        "repo".to_string()
    } else {
        sanitize(last)
    }
}
