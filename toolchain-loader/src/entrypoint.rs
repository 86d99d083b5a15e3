use crate::EntrypointRule;
use anyhow::Context as _;
use std::path::Path;

/// Finds the file the container should execute.
///
/// Candidates from the rule win (compared case-insensitively); otherwise
/// the first file whose contents match `main-pattern` is used.
pub async fn find_entrypoint(repo: &Path, rule: &EntrypointRule) -> anyhow::Result<String> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(repo)
        .await
        .with_context(|| format!("failed to list {}", repo.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case(rule.extension.as_str()));
        if matches_ext && entry.file_type().await?.is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    if files.is_empty() {
        anyhow::bail!(
            "could not locate any .{} files at {}",
            rule.extension,
            repo.display()
        );
    }
    files.sort();

    for candidate in &rule.candidates {
        if let Some(found) = files.iter().find(|f| f.eq_ignore_ascii_case(candidate)) {
            return Ok(found.clone());
        }
    }

    if let Some(pattern) = &rule.main_pattern {
        let re = regex::Regex::new(pattern).context("invalid entrypoint main-pattern")?;
        for file in &files {
            let contents = tokio::fs::read_to_string(repo.join(file))
                .await
                .with_context(|| format!("failed to read {}", file))?;
            if re.is_match(&contents) {
                return Ok(file.clone());
            }
        }
    }

    anyhow::bail!("could not locate a valid entrypoint file at {}", repo.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> EntrypointRule {
        EntrypointRule {
            extension: "py".to_string(),
            candidates: vec!["main.py".to_string(), "app.py".to_string()],
            main_pattern: Some(r#"__name__\s*==\s*("|')__main__("|')"#.to_string()),
        }
    }

    #[tokio::test]
    async fn candidate_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("App.py"), "").await.unwrap();
        tokio::fs::write(dir.path().join("solver.py"), "if __name__ == '__main__': pass")
            .await
            .unwrap();
        assert_eq!(find_entrypoint(dir.path(), &rule()).await.unwrap(), "App.py");
    }

    #[tokio::test]
    async fn falls_back_to_main_guard() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("helpers.py"), "def f(): pass")
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join("solver.py"),
            "import helpers\nif __name__ == \"__main__\":\n    print(1)\n",
        )
        .await
        .unwrap();
        assert_eq!(
            find_entrypoint(dir.path(), &rule()).await.unwrap(),
            "solver.py"
        );
    }

    #[tokio::test]
    async fn fails_without_sources_or_entrypoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_entrypoint(dir.path(), &rule()).await.is_err());
        tokio::fs::write(dir.path().join("lib.py"), "x = 1").await.unwrap();
        let err = find_entrypoint(dir.path(), &rule()).await.unwrap_err();
        assert!(err.to_string().contains("valid entrypoint"));
    }
}
