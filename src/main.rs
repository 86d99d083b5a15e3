use anyhow::Context;
use clap::Parser;
use grader_apis::PlatformConfig;
use std::{path::PathBuf, sync::Arc, time::Duration};

#[derive(Parser, Debug)]
#[clap(about = "Builds, runs and grades every submission of a roster")]
struct Args {
    /// Platform configuration (YAML)
    #[clap(long)]
    config: PathBuf,
    /// CSV file with `name,sourceUrl` lines
    #[clap(long)]
    roster: PathBuf,
    /// JSON answer key
    #[clap(long)]
    answer_key: PathBuf,
    /// Directory containing toolchain manifests
    #[clap(long)]
    toolchains: PathBuf,
    /// Directory where submissions are fetched to
    #[clap(long, default_value = "/tmp/grader-workspaces")]
    workspace_dir: PathBuf,
    /// Directory for reports, logs and exported files
    #[clap(long, default_value = "grader-output")]
    output_dir: PathBuf,
    /// Maximum run time of one submission
    #[clap(long, default_value = "300")]
    timeout_secs: u64,
    /// How long failed fetches are retried
    #[clap(long, default_value = "30")]
    retry_secs: u64,
    /// `git` executable used for cloning
    #[clap(long, default_value = "git")]
    git: PathBuf,
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<PlatformConfig> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read platform config {}", path.display()))?;
    serde_yaml::from_slice(&data).context("invalid platform config")
}

async fn create_clients(args: &Args) -> anyhow::Result<processor::Clients> {
    let runtime = container_client::DockerRuntime::connect()?;
    let toolchains = toolchain_loader::ToolchainLoader::new(&args.toolchains)
        .await
        .context("failed to initialize toolchain loader")?;
    let repo_loader_config = repo_loader::LoaderConfig {
        git: Some(args.git.clone()),
        local: true,
        retry_window: Duration::from_secs(args.retry_secs),
    };
    let repos = repo_loader::Loader::from_config(&repo_loader_config, args.workspace_dir.clone())
        .await
        .context("failed to initialize repository loader")?;

    Ok(processor::Clients {
        runtime: Arc::new(runtime),
        toolchains: Arc::new(toolchains),
        repos: Arc::new(repos),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let config = load_config(&args.config).await?;
    tracing::info!(
        evaluation_type = %config.evaluation_type,
        base_image = config.base_image.as_str(),
        "platform config loaded"
    );
    let clients = create_clients(&args)
        .await
        .context("failed to initialize dependency clients")?;
    let settings = processor::Settings {
        output_dir: args.output_dir.clone(),
        answer_key: args.answer_key.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    };
    let pipeline = processor::Pipeline::new(clients, settings, Arc::new(config));
    let mut roster = processor::Roster::open(&args.roster).await?;
    let summary = pipeline.run(&mut roster).await?;
    tracing::info!(
        "{} of {} submissions graded, reports are in {}",
        summary.graded,
        summary.processed,
        args.output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(&[
            "grader",
            "--config",
            "platform.yaml",
            "--roster",
            "roster.csv",
            "--answer-key",
            "answerkey.json",
            "--toolchains",
            "toolchains",
        ])
        .unwrap();
        assert_eq!(args.timeout_secs, 300);
        assert_eq!(args.retry_secs, 30);
        assert_eq!(args.workspace_dir, PathBuf::from("/tmp/grader-workspaces"));
        assert_eq!(args.output_dir, PathBuf::from("grader-output"));
        assert_eq!(args.git, PathBuf::from("git"));
    }

    #[test]
    fn roster_is_required() {
        assert!(Args::try_parse_from(&["grader", "--config", "p.yaml"]).is_err());
    }

    #[tokio::test]
    async fn loads_platform_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("platform.yaml");
        tokio::fs::write(&path, "type: QuestionAnswer\nbaseImage: python\n")
            .await
            .unwrap();
        let config = load_config(&path).await.unwrap();
        assert_eq!(config.base_image_version, "latest");
        assert!(load_config(&dir.path().join("absent.yaml")).await.is_err());
    }
}
