//! Running a built submission image and watching it.

use anyhow::Context;
use chrono::Utc;
use container_client::{ContainerRuntime, OutputChunk, OutputStream, UsageStream};
use futures::StreamExt;
use grader_apis::{Submission, UsageStat};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

/// Container owned by one submission's run
#[derive(Debug)]
pub struct ContainerHandle {
    id: String,
    image: String,
    name: String,
    state: ContainerState,
}

impl ContainerHandle {
    pub async fn create(
        runtime: &dyn ContainerRuntime,
        image: &str,
        submission: &Submission,
    ) -> anyhow::Result<ContainerHandle> {
        let name = format!(
            "{}-{}",
            submission.sanitized_name().to_lowercase(),
            uuid::Uuid::new_v4().to_simple()
        );
        let id = runtime
            .create_container(image, &name)
            .await
            .with_context(|| format!("failed to create container from {}", image))?;
        tracing::debug!(id = id.as_str(), name = name.as_str(), "container created");
        Ok(ContainerHandle {
            id,
            image: image.to_string(),
            name,
            state: ContainerState::Created,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    /// Force-removes the container. Removing twice is a no-op.
    pub async fn remove(&mut self, runtime: &dyn ContainerRuntime) -> anyhow::Result<()> {
        if self.state == ContainerState::Removed {
            return Ok(());
        }
        runtime.remove_container(&self.id).await?;
        self.state = ContainerState::Removed;
        Ok(())
    }
}

/// What the container did
#[derive(Debug, Clone)]
pub struct Execution {
    pub stdout: String,
    pub stderr: String,
    /// None if the runtime could not report it
    pub exit_code: Option<i64>,
    pub elapsed: Duration,
}

/// Runs a created container to completion while sampling its resource
/// usage and capturing its output.
pub struct ExecutionMonitor<'a> {
    runtime: &'a dyn ContainerRuntime,
    timeout: Duration,
}

impl<'a> ExecutionMonitor<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, timeout: Duration) -> Self {
        ExecutionMonitor { runtime, timeout }
    }

    /// Usage samples are appended to `usage` as they arrive, so they
    /// survive a timeout.
    #[tracing::instrument(skip(self, handle, submission, usage), fields(container = handle.id()))]
    pub async fn run(
        &self,
        handle: &mut ContainerHandle,
        submission: &Submission,
        usage: &mut Vec<UsageStat>,
    ) -> anyhow::Result<Execution> {
        let output = self
            .runtime
            .attach(handle.id())
            .await
            .context("failed to attach to container output")?;
        let started = Instant::now();
        self.runtime.start_container(handle.id()).await?;
        handle.state = ContainerState::Running;

        let ticks = match self.runtime.stats(handle.id()).await {
            Ok(t) => Some(t),
            Err(err) => {
                tracing::debug!(err = %format_args!("{:#}", err), "usage stats unavailable");
                None
            }
        };
        let done = CancellationToken::new();
        let sampling = sample(ticks, done.clone(), submission.name(), usage);
        let waiting = async {
            let exit = self.runtime.wait(handle.id()).await;
            done.cancel();
            exit
        };
        let all = futures::future::join3(sampling, capture(output), waiting);
        let ((), (stdout, stderr), exit) = match tokio::time::timeout(self.timeout, all).await {
            Ok(finished) => finished,
            Err(_) => {
                done.cancel();
                anyhow::bail!(
                    "submission did not finish within {} seconds",
                    self.timeout.as_secs()
                );
            }
        };
        handle.state = ContainerState::Stopped;

        let exit_code = match exit {
            Ok(code) => Some(code),
            Err(err) => {
                tracing::warn!(err = %format_args!("{:#}", err), "exit status unknown");
                None
            }
        };
        let elapsed = started.elapsed();
        tracing::info!(
            exit_code = ?exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "container finished"
        );
        Ok(Execution {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code,
            elapsed,
        })
    }
}

/// Collects usage until cancelled, the stream ends, or the container goes
/// idle (a tick with zero CPU).
async fn sample(
    ticks: Option<UsageStream>,
    done: CancellationToken,
    name: &str,
    usage: &mut Vec<UsageStat>,
) {
    let mut ticks = match ticks {
        Some(t) => t,
        None => return,
    };
    loop {
        let tick = tokio::select! {
            _ = done.cancelled() => return,
            tick = ticks.next() => tick,
        };
        let raw = match tick {
            Some(Ok(raw)) => raw,
            Some(Err(err)) => {
                tracing::debug!(err = %format_args!("{:#}", err), "usage sampling stopped");
                return;
            }
            None => return,
        };
        let cpu_percent = raw.cpu_percent();
        if cpu_percent == 0.0 {
            tracing::debug!("container is idle, assuming it has finished");
            done.cancel();
            return;
        }
        usage.push(UsageStat {
            name: name.to_string(),
            cpu_percent,
            memory_percent: raw.memory_percent(),
            sampled_at: Utc::now(),
        });
    }
}

async fn capture(mut output: OutputStream) -> (Vec<u8>, Vec<u8>) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    while let Some(chunk) = output.next().await {
        match chunk {
            Ok(OutputChunk::Stdout(data)) => stdout.extend_from_slice(&data),
            Ok(OutputChunk::Stderr(data)) => stderr.extend_from_slice(&data),
            Err(err) => {
                tracing::warn!(err = %format_args!("{:#}", err), "output stream broke");
                break;
            }
        }
    }
    (stdout, stderr)
}
