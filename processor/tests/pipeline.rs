use container_client::{
    fake::{FakeRuntime, Script},
    ContainerRuntime, RawUsage,
};
use grader_apis::{EvaluationType, PlatformConfig};
use processor::{report::REPORT_FILE, Clients, Pipeline, Roster, RunSummary, Settings};
use repo_loader::{Loader, LoaderConfig};
use std::{path::Path, sync::Arc, time::Duration};
use tempfile::TempDir;
use toolchain_loader::ToolchainLoader;

const MANIFEST: &str = r#"
title: Python 3
name: python
dependencies:
  file: requirements.txt
  install: RUN pip3 install -r requirements.txt
entrypoint:
  extension: py
  candidates: [main.py]
"#;

const TEMPLATE: &str = "FROM %IMAGE%:%IMAGE_VERSION%\n\
WORKDIR /app\n\
COPY . .\n\
%INSTALL_DEPENDENCIES%\n\
ENTRYPOINT [%ENTRYPOINT_ARGS%]\n";

const ANSWER_KEY: &str = r#"{
    "q1": {"expected": 42, "points": 2},
    "q2": {"expected": "Paris", "points": 3}
}"#;

struct Fixture {
    dir: TempDir,
    runtime: Arc<FakeRuntime>,
    roster: String,
}

async fn write(path: &Path, contents: &str) {
    tokio::fs::create_dir_all(path.parent().unwrap())
        .await
        .unwrap();
    tokio::fs::write(path, contents).await.unwrap();
}

impl Fixture {
    async fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let python = dir.path().join("toolchains").join("python");
        write(&python.join("manifest.yaml"), MANIFEST).await;
        write(&python.join("Dockerfile.in"), TEMPLATE).await;
        write(&dir.path().join("answerkey.json"), ANSWER_KEY).await;
        Fixture {
            dir,
            runtime: Arc::new(FakeRuntime::new()),
            roster: String::new(),
        }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    /// Adds a roster line for a submission with a single `main.py`.
    async fn python_submission(&mut self, name: &str, script: Script) {
        let src = self.path("sources").join(name);
        write(&src.join("main.py"), "print('answers')\n").await;
        self.roster
            .push_str(&format!("{},{}\n", name, src.display()));
        self.runtime
            .script(&format!("{}:latest", name), script)
            .await;
    }

    async fn pipeline(&self, config: PlatformConfig, timeout: Duration) -> Pipeline {
        let toolchains = ToolchainLoader::new(&self.path("toolchains"))
            .await
            .unwrap();
        // sources that are not local directories go to a git that can not run
        let loader_config = LoaderConfig {
            git: Some(self.path("no-such-git")),
            local: true,
            retry_window: Duration::from_millis(10),
        };
        let repos = Loader::from_config(&loader_config, self.path("workspaces"))
            .await
            .unwrap();
        let runtime: Arc<dyn ContainerRuntime> = self.runtime.clone();
        let clients = Clients {
            runtime,
            toolchains: Arc::new(toolchains),
            repos: Arc::new(repos),
        };
        let settings = Settings {
            output_dir: self.path("output"),
            answer_key: self.path("answerkey.json"),
            timeout,
        };
        Pipeline::new(clients, settings, Arc::new(config))
    }

    async fn run(&self, pipeline: &Pipeline) -> anyhow::Result<RunSummary> {
        let mut roster = Roster::from_reader(self.roster.as_bytes());
        pipeline.run(&mut roster).await
    }

    async fn report(&self) -> serde_json::Value {
        let text = tokio::fs::read_to_string(self.path("output").join(REPORT_FILE))
            .await
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

fn config() -> PlatformConfig {
    PlatformConfig {
        evaluation_type: EvaluationType::QuestionAnswer,
        base_image: "python".to_string(),
        base_image_version: "3.11".to_string(),
        output_extensions: vec![".csv".to_string()],
        entrypoint_args: vec!["python3".to_string(), "%ENTRYPOINT_FILE%".to_string()],
    }
}

fn busy_tick() -> RawUsage {
    RawUsage {
        total_cpu_usage: 25,
        system_cpu_usage: 100,
        memory_usage: 50,
        memory_limit: 200,
    }
}

#[tokio::test]
async fn grades_every_submission_it_can() {
    let mut fx = Fixture::new().await;
    // fetch fails on every attempt
    let mallory = fx.path("sources").join("mallory");
    fx.roster.push_str(&format!("mallory,{}\n", mallory.display()));
    fx.python_submission(
        "alice",
        Script {
            stdout: "thinking...\n{\"q1\": 42, \"q2\": \"Paris\"}\n".to_string(),
            ticks: vec![busy_tick()],
            files: vec![
                ("app/answers.csv".to_string(), b"q1,42\n".to_vec()),
                ("app/main.py".to_string(), b"print()\n".to_vec()),
            ],
            ..Default::default()
        },
    )
    .await;
    fx.python_submission(
        "bob",
        Script {
            stdout: "{\"q1\": 41}\n".to_string(),
            stderr: "Traceback (most recent call last):\n".to_string(),
            exit_code: 1,
            ..Default::default()
        },
    )
    .await;
    // empty repository
    let carol = fx.path("sources").join("carol");
    tokio::fs::create_dir_all(&carol).await.unwrap();
    fx.roster.push_str(&format!("carol,{}\n", carol.display()));
    fx.python_submission(
        "dave",
        Script {
            fail_build: true,
            ..Default::default()
        },
    )
    .await;
    fx.python_submission(
        "erin",
        Script {
            stdout: "not json at all\n".to_string(),
            ..Default::default()
        },
    )
    .await;
    fx.python_submission("frank", Script::default()).await;

    let pipeline = fx.pipeline(config(), Duration::from_secs(5)).await;
    let summary = fx.run(&pipeline).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            processed: 7,
            graded: 2,
            failed: 5,
        }
    );

    let report = fx.report().await;
    let graded: Vec<_> = report.as_object().unwrap().keys().cloned().collect();
    assert_eq!(graded, vec!["alice".to_string(), "bob".to_string()]);
    assert_eq!(report["alice"]["points"], 5.0);
    assert_eq!(report["alice"]["grade"], 1.0);
    assert_eq!(report["bob"]["points"], 0.0);
    assert_eq!(report["bob"]["totalPoints"], 5.0);
    assert_eq!(report["bob"]["wrong"]["q1"], "Submitted value was '41'");
    assert_eq!(report["bob"]["wrong"]["q2"], "Unanswered");

    let usage = tokio::fs::read_to_string(fx.path("output").join("usage.json"))
        .await
        .unwrap();
    assert!(usage.contains("\"cpuPercent\": 25.0"));

    let logs = fx.path("output").join("logs");
    assert!(logs.join("alice-logs.txt").exists());
    assert!(logs.join("bob-stderr.txt").exists());
    assert!(!logs.join("alice-stderr.txt").exists());

    let artifacts = fx.path("output").join("artifacts").join("alice");
    assert!(artifacts.join("answers.csv").exists());
    assert!(!artifacts.join("main.py").exists());

    // nothing is left behind
    assert_eq!(fx.runtime.live_containers().await, 0);
    assert_eq!(fx.runtime.live_images().await, 0);
    let mut left = tokio::fs::read_dir(fx.path("workspaces")).await.unwrap();
    assert!(left.next_entry().await.unwrap().is_none());

    let journal = fx.runtime.journal().await;
    assert!(journal.contains(&"build dave:latest".to_string()));
    assert!(!journal.iter().any(|e| e == "create carol"));
    assert!(!journal.iter().any(|e| e.contains("mallory")));
}

#[tokio::test]
async fn renders_image_spec_from_toolchain() {
    let mut fx = Fixture::new().await;
    fx.python_submission(
        "gina",
        Script {
            stdout: "{\"q1\": 42}\n".to_string(),
            ..Default::default()
        },
    )
    .await;
    let pipeline = fx.pipeline(config(), Duration::from_secs(5)).await;
    fx.run(&pipeline).await.unwrap();

    // the image is gone, but the build context was read when it was built
    let journal = fx.runtime.journal().await;
    let build = journal.iter().position(|e| e == "build gina:latest").unwrap();
    let remove = journal
        .iter()
        .position(|e| e == "remove_image gina:latest")
        .unwrap();
    assert!(build < remove);
    assert_eq!(fx.report().await["gina"]["points"], 2.0);
}

#[tokio::test]
async fn functional_evaluation_is_refused() {
    let mut fx = Fixture::new().await;
    fx.python_submission("hank", Script::default()).await;
    let mut config = config();
    config.evaluation_type = EvaluationType::Functional;
    let pipeline = fx.pipeline(config, Duration::from_secs(5)).await;
    assert!(fx.run(&pipeline).await.is_err());
    assert!(fx.runtime.journal().await.is_empty());
}

#[tokio::test]
async fn missing_answer_key_grades_nothing() {
    let mut fx = Fixture::new().await;
    fx.python_submission(
        "ivy",
        Script {
            stdout: "{\"q1\": 42}\n".to_string(),
            ..Default::default()
        },
    )
    .await;
    tokio::fs::remove_file(fx.path("answerkey.json"))
        .await
        .unwrap();
    let pipeline = fx.pipeline(config(), Duration::from_secs(5)).await;
    let summary = fx.run(&pipeline).await.unwrap();
    assert_eq!(summary.graded, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(fx.report().await, serde_json::json!({}));
    assert!(fx.path("output").join("logs").join("ivy-logs.txt").exists());
}

#[tokio::test]
async fn hanging_submission_times_out_and_is_cleaned_up() {
    let mut fx = Fixture::new().await;
    fx.python_submission(
        "jack",
        Script {
            stdout: "still going\n".to_string(),
            hang: true,
            ..Default::default()
        },
    )
    .await;
    fx.python_submission(
        "kate",
        Script {
            stdout: "{\"q2\": \"Paris\"}\n".to_string(),
            ..Default::default()
        },
    )
    .await;
    let pipeline = fx.pipeline(config(), Duration::from_millis(200)).await;
    let summary = fx.run(&pipeline).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.graded, 1);
    assert_eq!(fx.report().await["kate"]["points"], 3.0);
    assert_eq!(fx.runtime.live_containers().await, 0);
    assert_eq!(fx.runtime.live_images().await, 0);
}
