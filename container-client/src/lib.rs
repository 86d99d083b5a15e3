//! Narrow interface to the container engine that builds and runs
//! submissions.

mod docker;
pub mod fake;

pub use docker::DockerRuntime;

use futures::stream::BoxStream;
use std::path::Path;

/// Raw resource counters from one stats tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawUsage {
    pub total_cpu_usage: u64,
    pub system_cpu_usage: u64,
    pub memory_usage: u64,
    pub memory_limit: u64,
}

impl RawUsage {
    pub fn cpu_percent(&self) -> f64 {
        percent(self.total_cpu_usage, self.system_cpu_usage)
    }

    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_usage, self.memory_limit)
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Piece of container output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

pub type OutputStream = BoxStream<'static, anyhow::Result<OutputChunk>>;
pub type UsageStream = BoxStream<'static, anyhow::Result<RawUsage>>;

/// Container engine operations the grader relies on.
///
/// Implementations hold no per-submission state; one instance is shared by
/// the whole run.
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds image `tag` from `context_dir` using image spec `dockerfile`
    /// (relative to the context).
    async fn build_image(&self, context_dir: &Path, dockerfile: &str, tag: &str)
        -> anyhow::Result<()>;

    /// Creates (but does not start) a container. Returns its id.
    async fn create_container(&self, image: &str, name: &str) -> anyhow::Result<String>;

    /// Combined stdout/stderr of the container, until it exits.
    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream>;

    async fn start_container(&self, id: &str) -> anyhow::Result<()>;

    /// Stream of resource counters while the container is alive.
    async fn stats(&self, id: &str) -> anyhow::Result<UsageStream>;

    /// Resolves with the exit code once the container stops.
    async fn wait(&self, id: &str) -> anyhow::Result<i64>;

    /// Tar archive of `path` inside the container.
    async fn download(&self, id: &str, path: &str) -> anyhow::Result<Vec<u8>>;

    /// Removes the container, stopping it if needed.
    async fn remove_container(&self, id: &str) -> anyhow::Result<()>;

    async fn remove_image(&self, tag: &str) -> anyhow::Result<()>;
}
