//! Aggregated results of a run and their persistence.

use anyhow::Context;
use grader_apis::{GradeResult, Submission, UsageStat};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

pub const REPORT_FILE: &str = "report.json";
pub const USAGE_FILE: &str = "usage.json";

/// One row of `report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    #[serde(flatten)]
    pub result: GradeResult,
    pub grade: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ReportAggregator {
    grades: BTreeMap<String, GradeRow>,
    usage: Vec<UsageStat>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        ReportAggregator::default()
    }

    pub fn record_grade(&mut self, submission: &Submission, result: GradeResult) {
        let grade = result.grade();
        self.grades
            .insert(submission.name().to_string(), GradeRow { result, grade });
    }

    pub fn grades(&self) -> &BTreeMap<String, GradeRow> {
        &self.grades
    }

    pub fn usage(&self) -> &[UsageStat] {
        &self.usage
    }

    /// Sink for usage samples
    pub fn usage_mut(&mut self) -> &mut Vec<UsageStat> {
        &mut self.usage
    }

    /// Writes `report.json` and `usage.json` into `dir`.
    #[tracing::instrument(skip(self))]
    pub async fn persist(&self, dir: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        write_json(&dir.join(REPORT_FILE), &self.grades).await?;
        write_json(&dir.join(USAGE_FILE), &self.usage).await?;
        tracing::info!(
            graded = self.grades.len(),
            samples = self.usage.len(),
            "reports saved"
        );
        Ok(())
    }
}

async fn write_json<T: Serialize>(dest: &Path, value: &T) -> anyhow::Result<()> {
    let data = serde_json::to_vec_pretty(value).context("failed to serialize report")?;
    tokio::fs::write(dest, data)
        .await
        .with_context(|| format!("failed to write {}", dest.display()))
}

/// Stores what each submission printed
pub struct LogWriter {
    dir: PathBuf,
}

impl LogWriter {
    pub fn new(dir: PathBuf) -> Self {
        LogWriter { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stdout_path(&self, submission: &Submission) -> PathBuf {
        self.dir
            .join(format!("{}-logs.txt", submission.sanitized_name()))
    }

    pub fn stderr_path(&self, submission: &Submission) -> PathBuf {
        self.dir
            .join(format!("{}-stderr.txt", submission.sanitized_name()))
    }

    /// Empty stderr is not written.
    pub async fn write(
        &self,
        submission: &Submission,
        stdout: &str,
        stderr: &str,
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.stdout_path(submission);
        tokio::fs::write(&dest, stdout)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        if !stderr.is_empty() {
            let dest = self.stderr_path(submission);
            tokio::fs::write(&dest, stderr)
                .await
                .with_context(|| format!("failed to write {}", dest.display()))?;
        }
        Ok(())
    }
}
