//! Pure in-memory implementation that replays scripted containers.
//! Used for tests and dry runs without a container engine.

use crate::{ContainerRuntime, OutputChunk, OutputStream, RawUsage, UsageStream};
use anyhow::Context;
use futures::StreamExt;
use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;

/// What a container started from some image does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    /// Stats ticks, in order
    pub ticks: Vec<RawUsage>,
    /// Stats stream fails after the last tick
    pub stats_error: bool,
    pub fail_build: bool,
    /// Container never exits and never closes its output
    pub hang: bool,
    /// Files of the work directory, returned by `download`
    pub files: Vec<(String, Vec<u8>)>,
}

#[derive(Default)]
pub struct FakeRuntime {
    /// image tag -> script
    scripts: Mutex<HashMap<String, Script>>,
    /// image tag -> image spec text it was built from
    images: Mutex<HashMap<String, String>>,
    /// container id -> image tag
    containers: Mutex<HashMap<String, String>>,
    journal: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl FakeRuntime {
    pub fn new() -> FakeRuntime {
        FakeRuntime::default()
    }

    /// Containers created from `image` will follow `script`.
    pub async fn script(&self, image: &str, script: Script) {
        self.scripts.lock().await.insert(image.to_string(), script);
    }

    /// All calls made so far, like `start fake-1`.
    pub async fn journal(&self) -> Vec<String> {
        self.journal.lock().await.clone()
    }

    /// Image spec the image was built from, if it still exists.
    pub async fn image_spec(&self, tag: &str) -> Option<String> {
        self.images.lock().await.get(tag).cloned()
    }

    pub async fn live_images(&self) -> usize {
        self.images.lock().await.len()
    }

    pub async fn live_containers(&self) -> usize {
        self.containers.lock().await.len()
    }

    async fn record(&self, entry: String) {
        self.journal.lock().await.push(entry);
    }

    async fn script_for_image(&self, image: &str) -> Script {
        self.scripts
            .lock()
            .await
            .get(image)
            .cloned()
            .unwrap_or_default()
    }

    async fn script_for_container(&self, id: &str) -> anyhow::Result<Script> {
        let image = self
            .containers
            .lock()
            .await
            .get(id)
            .cloned()
            .with_context(|| format!("no such container: {}", id))?;
        Ok(self.script_for_image(&image).await)
    }
}

fn pack_files(files: &[(String, Vec<u8>)]) -> anyhow::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, name, data.as_slice())
            .with_context(|| format!("failed to pack {}", name))?;
    }
    Ok(builder.into_inner()?)
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &str,
        tag: &str,
    ) -> anyhow::Result<()> {
        self.record(format!("build {}", tag)).await;
        let spec = tokio::fs::read_to_string(context_dir.join(dockerfile))
            .await
            .context("image spec missing from build context")?;
        if self.script_for_image(tag).await.fail_build {
            anyhow::bail!("scripted build failure for {}", tag);
        }
        self.images.lock().await.insert(tag.to_string(), spec);
        Ok(())
    }

    async fn create_container(&self, image: &str, name: &str) -> anyhow::Result<String> {
        self.record(format!("create {}", name)).await;
        if !self.images.lock().await.contains_key(image) {
            anyhow::bail!("no such image: {}", image);
        }
        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.containers
            .lock()
            .await
            .insert(id.clone(), image.to_string());
        Ok(id)
    }

    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream> {
        self.record(format!("attach {}", id)).await;
        let script = self.script_for_container(id).await?;
        let mut chunks = Vec::new();
        if !script.stdout.is_empty() {
            chunks.push(Ok(OutputChunk::Stdout(script.stdout.into_bytes())));
        }
        if !script.stderr.is_empty() {
            chunks.push(Ok(OutputChunk::Stderr(script.stderr.into_bytes())));
        }
        let output = futures::stream::iter(chunks);
        if script.hang {
            return Ok(output.chain(futures::stream::pending()).boxed());
        }
        Ok(output.boxed())
    }

    async fn start_container(&self, id: &str) -> anyhow::Result<()> {
        self.record(format!("start {}", id)).await;
        self.script_for_container(id).await?;
        Ok(())
    }

    async fn stats(&self, id: &str) -> anyhow::Result<UsageStream> {
        self.record(format!("stats {}", id)).await;
        let script = self.script_for_container(id).await?;
        let ticks = futures::stream::iter(script.ticks.into_iter().map(Ok));
        if script.stats_error {
            let broken = futures::stream::once(async {
                Err(anyhow::anyhow!("stats connection reset"))
            });
            return Ok(ticks.chain(broken).boxed());
        }
        Ok(ticks.boxed())
    }

    async fn wait(&self, id: &str) -> anyhow::Result<i64> {
        self.record(format!("wait {}", id)).await;
        let script = self.script_for_container(id).await?;
        if script.hang {
            return futures::future::pending().await;
        }
        Ok(script.exit_code)
    }

    async fn download(&self, id: &str, path: &str) -> anyhow::Result<Vec<u8>> {
        self.record(format!("download {} {}", id, path)).await;
        let script = self.script_for_container(id).await?;
        pack_files(&script.files)
    }

    async fn remove_container(&self, id: &str) -> anyhow::Result<()> {
        self.record(format!("remove_container {}", id)).await;
        self.containers
            .lock()
            .await
            .remove(id)
            .with_context(|| format!("no such container: {}", id))?;
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> anyhow::Result<()> {
        self.record(format!("remove_image {}", tag)).await;
        self.images
            .lock()
            .await
            .remove(tag)
            .with_context(|| format!("no such image: {}", tag))?;
        Ok(())
    }
}
