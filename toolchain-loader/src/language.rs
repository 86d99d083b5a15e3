use anyhow::Context as _;
use std::path::Path;

/// Programming language of a submission. The serialized form is the name
/// of the toolchain directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    CSharp,
    Python,
    #[strum(serialize = "cpp")]
    Cplusplus,
    Java,
    NodeJs,
    Unknown,
}

/// Guesses the language of the code in `dir` by looking at its top-level
/// files.
#[tracing::instrument]
pub async fn classify(dir: &Path) -> anyhow::Result<Language> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    if names.is_empty() {
        anyhow::bail!("no files were found at {}", dir.display());
    }
    let lang = classify_names(&names);
    tracing::debug!(language = %lang, files = names.len(), "classified workspace");
    Ok(lang)
}

fn classify_names(names: &[String]) -> Language {
    let has_ext = |ext: &str| {
        names.iter().any(|n| {
            Path::new(n)
                .extension()
                .map_or(false, |e| e.eq_ignore_ascii_case(ext))
        })
    };
    if has_ext("csproj") || has_ext("sln") {
        return Language::CSharp;
    }
    if has_ext("py") {
        return Language::Python;
    }
    if has_ext("cpp") {
        return Language::Cplusplus;
    }
    if has_ext("java") {
        return Language::Java;
    }
    if names.iter().any(|n| n == "package.json") {
        return Language::NodeJs;
    }
    Language::Unknown
}
