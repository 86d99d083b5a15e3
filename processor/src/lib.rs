//! Processor is part of grader that deals with the submissions of a roster:
//! it takes each one from source code to a score.

mod artifacts;
mod build;
pub mod exec;
mod pipeline;
pub mod report;
pub mod roster;

pub use pipeline::{Pipeline, RunSummary};
pub use roster::Roster;

use container_client::ContainerRuntime;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Contains container runtime, toolchain loader and repository loader
#[derive(Clone)]
pub struct Clients {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub toolchains: Arc<toolchain_loader::ToolchainLoader>,
    pub repos: Arc<repo_loader::Loader>,
}

/// Settings are global rather then come from a roster line.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Receives `report.json`, `usage.json`, `logs/` and `artifacts/`
    pub output_dir: PathBuf,
    /// JSON answer key; loaded when the first submission is scored
    pub answer_key: PathBuf,
    /// Wall-clock limit for one container run
    pub timeout: Duration,
}

impl Settings {
    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.output_dir.join("artifacts")
    }
}
