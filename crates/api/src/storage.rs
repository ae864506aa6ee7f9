//! Case and result storage layout under the data root.
//!
//! The orchestrator treats artifact storage as a plain directory tree:
//! `{data_root}/simulations/{configPath}` holds a case, `{data_root}/results/{id}`
//! holds that case's artifact set. Only narrow helpers live here — the
//! solvers and rendering workers do their own reading and writing.

use std::path::{Path, PathBuf};

use serde::Serialize;

use simflow_core::error::CoreError;

/// One artifact file in a result manifest.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFile {
    /// Path relative to the result directory.
    pub path: String,
    pub size: u64,
}

/// Absolute case directory for a config path.
pub fn case_dir(data_root: &Path, config_path: &str) -> PathBuf {
    data_root.join("simulations").join(config_path)
}

/// Absolute result directory for a record's `resultPath`.
pub fn result_dir(data_root: &Path, result_path: &str) -> PathBuf {
    data_root.join(result_path)
}

/// Persist an uploaded case file under the simulation's case directory.
pub async fn save_upload(
    data_root: &Path,
    config_path: &str,
    filename: &str,
    bytes: &[u8],
) -> std::io::Result<PathBuf> {
    let dir = case_dir(data_root, config_path);
    tokio::fs::create_dir_all(&dir).await?;
    let dest = dir.join(filename);
    tokio::fs::write(&dest, bytes).await?;
    Ok(dest)
}

/// Walk a completed simulation's result directory into a manifest.
///
/// Returns paths relative to the result directory, sorted for stable output.
pub async fn result_manifest(
    data_root: &Path,
    result_path: &str,
) -> std::io::Result<Vec<ResultFile>> {
    let root = result_dir(data_root, result_path);
    let mut files = Vec::new();
    let mut dirs = vec![root.clone()];

    while let Some(dir) = dirs.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                dirs.push(entry.path());
            } else {
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| entry.file_name().to_string_lossy().into_owned());
                files.push(ResultFile {
                    path: rel,
                    size: meta.len(),
                });
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Resolve a client-supplied relative path inside a result directory,
/// rejecting anything that would escape it.
pub fn resolve_result_file(
    data_root: &Path,
    result_path: &str,
    rel: &str,
) -> Result<PathBuf, CoreError> {
    if rel.is_empty()
        || rel.starts_with('/')
        || rel.split('/').any(|seg| seg == ".." || seg.is_empty())
    {
        return Err(CoreError::Validation(format!(
            "Invalid result file path: {rel}"
        )));
    }
    Ok(result_dir(data_root, result_path).join(rel))
}
