use crate::{ContainerRuntime, OutputChunk, OutputStream, RawUsage, UsageStream};
use anyhow::Context;
use bollard::{
    container::{
        AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
        DownloadFromContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
        StatsOptions, WaitContainerOptions,
    },
    image::{BuildImageOptions, RemoveImageOptions},
    Docker,
};
use futures::{StreamExt, TryStreamExt};
use std::path::Path;

/// [`ContainerRuntime`] backed by the local Docker engine.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using `DOCKER_HOST` or the platform default socket.
    pub fn connect() -> anyhow::Result<DockerRuntime> {
        let docker =
            Docker::connect_with_local_defaults().context("failed to connect to docker daemon")?;
        Ok(DockerRuntime { docker })
    }
}

fn pack_context(dir: &Path) -> anyhow::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_dir_all(".", dir)
        .with_context(|| format!("failed to archive {}", dir.display()))?;
    builder.into_inner().context("failed to finish build context")
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    #[tracing::instrument(skip(self))]
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> anyhow::Result<()> {
        let dir = context_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_context(&dir))
            .await
            .context("archiving task panicked")??;
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };
        let mut progress = self.docker.build_image(options, None, Some(archive.into()));
        while let Some(info) = progress.next().await {
            let info = info.context("image build failed")?;
            if let Some(err) = info.error {
                anyhow::bail!("image build failed: {}", err);
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    tracing::info!("{}", line);
                }
            }
        }
        Ok(())
    }

    async fn create_container(&self, image: &str, name: &str) -> anyhow::Result<String> {
        let config = Config {
            image: Some(image.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .with_context(|| format!("failed to create container from {}", image))?;
        for warning in &created.warnings {
            tracing::warn!("docker: {}", warning);
        }
        Ok(created.id)
    }

    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };
        let AttachContainerResults { output, .. } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .context("failed to attach to container")?;
        let output = output.map(|item| {
            let chunk = match item? {
                LogOutput::StdErr { message } => OutputChunk::Stderr(message.to_vec()),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    OutputChunk::Stdout(message.to_vec())
                }
                LogOutput::StdIn { .. } => OutputChunk::Stdout(Vec::new()),
            };
            Ok(chunk)
        });
        Ok(output.boxed())
    }

    async fn start_container(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start container")
    }

    async fn stats(&self, id: &str) -> anyhow::Result<UsageStream> {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };
        let ticks = self.docker.stats(id, Some(options)).map(|item| {
            let stats = item?;
            Ok(RawUsage {
                total_cpu_usage: stats.cpu_stats.cpu_usage.total_usage,
                system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
                memory_usage: stats.memory_stats.usage.unwrap_or(0),
                memory_limit: stats.memory_stats.limit.unwrap_or(0),
            })
        });
        Ok(ticks.boxed())
    }

    async fn wait(&self, id: &str) -> anyhow::Result<i64> {
        let mut responses = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);
        match responses.next().await {
            Some(Ok(resp)) => Ok(resp.status_code),
            // non-zero exit is reported as an error by the engine
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err).context("failed to wait for container"),
            None => anyhow::bail!("container wait finished without a status"),
        }
    }

    async fn download(&self, id: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let archive = self
            .docker
            .download_from_container(id, Some(options))
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .with_context(|| format!("failed to download {} from container", path))?;
        Ok(archive)
    }

    async fn remove_container(&self, id: &str) -> anyhow::Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .with_context(|| format!("failed to remove container {}", id))
    }

    async fn remove_image(&self, tag: &str) -> anyhow::Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_image(tag, Some(options), None)
            .await
            .with_context(|| format!("failed to delete image {}", tag))?;
        Ok(())
    }
}
