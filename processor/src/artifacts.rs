use anyhow::Context;
use container_client::ContainerRuntime;
use std::path::{Path, PathBuf};

/// Copies files with one of `extensions` from `work_dir` of the stopped
/// container into `dest`. Returns names of the extracted files.
pub(crate) async fn export(
    runtime: &dyn ContainerRuntime,
    container: &str,
    work_dir: &str,
    extensions: &[String],
    dest: &Path,
) -> anyhow::Result<Vec<String>> {
    let archive = runtime.download(container, work_dir).await?;
    let extensions = extensions.to_vec();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || unpack_matching(&archive, &extensions, &dest))
        .await
        .context("unpacking task panicked")?
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| *e == ext)
        }
        None => false,
    }
}

fn unpack_matching(
    archive: &[u8],
    extensions: &[String],
    dest: &Path,
) -> anyhow::Result<Vec<String>> {
    let mut archive = tar::Archive::new(archive);
    let mut exported = Vec::new();
    for entry in archive.entries().context("corrupted archive")? {
        let mut entry = entry.context("corrupted archive entry")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path: PathBuf = entry.path()?.into_owned();
        if !has_extension(&path, extensions) {
            continue;
        }
        let file_name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut out = std::fs::File::create(dest.join(&file_name))
            .with_context(|| format!("failed to create {}", file_name))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", path.display()))?;
        exported.push(file_name);
    }
    Ok(exported)
}
