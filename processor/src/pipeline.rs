use crate::{
    artifacts,
    build::build_image,
    exec::{ContainerHandle, ExecutionMonitor},
    report::{LogWriter, ReportAggregator},
    roster::Roster,
    Clients, Settings,
};
use anyhow::Context;
use grader_apis::{EvaluationType, PlatformConfig, Submission};
use std::{path::Path, sync::Arc};
use tokio::{io::AsyncRead, sync::OnceCell};
use tracing::Instrument;
use valuer::{AnswerKey, Scorer};

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Roster entries seen
    pub processed: usize,
    /// Submissions with a recorded grade
    pub graded: usize,
    /// Submissions skipped because of an error
    pub failed: usize,
}

enum Outcome {
    Graded,
    /// Ran, but there was nothing to grade or grading failed
    Ungraded,
}

/// Drives every roster submission through acquire, build, run and score.
pub struct Pipeline {
    clients: Clients,
    settings: Settings,
    config: Arc<PlatformConfig>,
    logs: LogWriter,
    /// Loaded on first use; the error is kept as text so every submission
    /// can report it.
    answer_key: OnceCell<Result<Arc<AnswerKey>, String>>,
}

async fn recreate_dir(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to clear {}", path.display()));
        }
    }
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))
}

impl Pipeline {
    pub fn new(clients: Clients, settings: Settings, config: Arc<PlatformConfig>) -> Pipeline {
        let logs = LogWriter::new(settings.logs_dir());
        Pipeline {
            clients,
            settings,
            config,
            logs,
            answer_key: OnceCell::new(),
        }
    }

    /// Grades every submission of the roster, then writes reports.
    /// Failures of single submissions are logged and do not stop the run.
    #[tracing::instrument(skip(self, roster))]
    pub async fn run<R: AsyncRead + Unpin>(
        &self,
        roster: &mut Roster<R>,
    ) -> anyhow::Result<RunSummary> {
        if self.config.evaluation_type == EvaluationType::Functional {
            anyhow::bail!(
                "evaluation type {} is not supported yet",
                self.config.evaluation_type
            );
        }
        self.clients
            .repos
            .reset()
            .await
            .context("failed to reset workspaces")?;
        recreate_dir(self.logs.dir()).await?;
        recreate_dir(&self.settings.artifacts_dir()).await?;

        let mut report = ReportAggregator::new();
        let mut summary = RunSummary::default();
        while let Some(submission) = roster.next().await? {
            summary.processed += 1;
            let span = tracing::info_span!("submission", name = submission.name());
            match self.process(&submission, &mut report).instrument(span).await {
                Ok(Outcome::Graded) => summary.graded += 1,
                Ok(Outcome::Ungraded) => summary.failed += 1,
                Err(err) => {
                    tracing::warn!(
                        submission = submission.name(),
                        err = %format_args!("{:#}", err),
                        "submission skipped"
                    );
                    summary.failed += 1;
                }
            }
        }

        report
            .persist(&self.settings.output_dir)
            .await
            .context("failed to save reports")?;
        tracing::info!(
            processed = summary.processed,
            graded = summary.graded,
            failed = summary.failed,
            "run finished"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        submission: &Submission,
        report: &mut ReportAggregator,
    ) -> anyhow::Result<Outcome> {
        let workspace = self
            .clients
            .repos
            .acquire(submission)
            .await
            .context("failed to acquire repository")?;
        let outcome = self.evaluate(submission, workspace.path(), report).await;
        if let Err(err) = workspace.remove().await {
            tracing::warn!(err = %format_args!("{:#}", err), "failed to remove workspace");
        }
        outcome
    }

    /// Everything that needs the image; the image and container never
    /// outlive this call.
    async fn evaluate(
        &self,
        submission: &Submission,
        workspace: &Path,
        report: &mut ReportAggregator,
    ) -> anyhow::Result<Outcome> {
        let runtime = self.clients.runtime.as_ref();
        let tag = submission.image_tag();
        let mut container = None;
        let outcome = self
            .build_and_run(submission, workspace, &tag, &mut container, report)
            .await;

        if let Some(handle) = container.as_mut() {
            if let Err(err) = handle.remove(runtime).await {
                tracing::warn!(err = %format_args!("{:#}", err), "failed to remove container");
            }
        }
        if let Err(err) = runtime.remove_image(&tag).await {
            tracing::warn!(err = %format_args!("{:#}", err), "failed to delete image");
        }
        outcome
    }

    async fn build_and_run(
        &self,
        submission: &Submission,
        workspace: &Path,
        tag: &str,
        container: &mut Option<ContainerHandle>,
        report: &mut ReportAggregator,
    ) -> anyhow::Result<Outcome> {
        let runtime = self.clients.runtime.as_ref();
        let toolchain = build_image(
            runtime,
            &self.clients.toolchains,
            &self.config,
            workspace,
            tag,
        )
        .await?;

        let handle = ContainerHandle::create(runtime, tag, submission).await?;
        let handle = container.insert(handle);
        let execution = ExecutionMonitor::new(runtime, self.settings.timeout)
            .run(handle, submission, report.usage_mut())
            .await?;
        if execution.exit_code.map_or(false, |code| code != 0) {
            tracing::warn!(exit_code = ?execution.exit_code, "submission exited abnormally");
        }

        if let Err(err) = self
            .logs
            .write(submission, &execution.stdout, &execution.stderr)
            .await
        {
            tracing::warn!(err = %format_args!("{:#}", err), "failed to save submission logs");
        }

        let extensions = self.config.normalized_output_extensions();
        if !extensions.is_empty() {
            let dest = self
                .settings
                .artifacts_dir()
                .join(submission.sanitized_name());
            match artifacts::export(
                runtime,
                handle.id(),
                &toolchain.spec.work_dir,
                &extensions,
                &dest,
            )
            .await
            {
                Ok(files) => tracing::info!(count = files.len(), "output files exported"),
                Err(err) => {
                    tracing::warn!(err = %format_args!("{:#}", err), "failed to export output files")
                }
            }
        }

        if execution.stdout.trim().is_empty() {
            tracing::error!("submission produced no output, nothing to grade");
            return Ok(Outcome::Ungraded);
        }

        let mut scorer = self.scorer().await;
        let result = scorer.grade(&execution.stdout);
        if !scorer.success() {
            tracing::error!(errors = %scorer.describe_errors(), "submission could not be graded");
            return Ok(Outcome::Ungraded);
        }
        tracing::info!(
            points = result.points,
            total_points = result.total_points,
            wrong = result.wrong.len(),
            "submission graded"
        );
        report.record_grade(submission, result);
        Ok(Outcome::Graded)
    }

    async fn scorer(&self) -> Scorer {
        let path = &self.settings.answer_key;
        let key = self
            .answer_key
            .get_or_init(|| async move {
                AnswerKey::load(path)
                    .await
                    .map(Arc::new)
                    .map_err(|err| format!("{:#}", err))
            })
            .await;
        match key {
            Ok(key) => Scorer::new(key.clone()),
            Err(reason) => Scorer::without_key(reason.clone()),
        }
    }
}
