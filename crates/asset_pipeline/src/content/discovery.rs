use std::fs;
use std::path::{Path, PathBuf};

use super::types::BuildError;

/// Every regular file under `root`, sorted by normalized relative path so the
/// worklist is stable across platforms.
pub(crate) fn collect_files(root: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::<(String, PathBuf)>::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), BuildError> {
    let entries = fs::read_dir(current).map_err(|source| BuildError::ReadDir {
        path: current.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| BuildError::ReadDirEntry {
            path: current.to_path_buf(),
            source,
        })?;
        let file_type = entry.file_type().map_err(|source| BuildError::ReadDirEntry {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_recursive(root, &path, files)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            files.push((normalize_rel_path(rel), path));
        }
    }
    Ok(())
}

pub(crate) fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
