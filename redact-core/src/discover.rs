//! Python source file discovery

use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const PYTHON_EXTENSIONS: &[&str] = &["py", "pyw"];

fn is_python_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| PYTHON_EXTENSIONS.contains(&ext))
}

/// Returns true for directory names that should not be traversed
fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.')
        || name == "__pycache__"
        || name == "venv"
        || name == "node_modules"
        || name == "build"
        || name == "dist"
        || name == "target"
}

/// Collect Python source files from a path (file or directory)
///
/// A file path is returned as-is when it has a Python extension. Directory
/// results are sorted for deterministic order; symlinks are not followed.
pub fn collect_python_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_python_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        collect_recursive(path, &mut files)?;
    } else {
        anyhow::bail!("path does not exist: {}", path.display());
    }

    files.sort();
    Ok(files)
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry_result in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry_result?;
        let path = entry.path();
        let metadata = std::fs::symlink_metadata(&path)
            .with_context(|| format!("failed to read metadata: {}", path.display()))?;

        if metadata.is_symlink() {
            continue;
        }

        if metadata.is_dir() {
            let skipped = path
                .file_name()
                .and_then(OsStr::to_str)
                .is_some_and(is_skipped_dir);
            if !skipped {
                collect_recursive(&path, files)?;
            }
        } else if metadata.is_file() && is_python_file(&path) {
            files.push(path);
        }
    }

    Ok(())
}
