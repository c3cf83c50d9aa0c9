//! Workspace Path Utilities
//!
//! Resolves model-supplied paths against the run's working directory and
//! keeps them inside it.

use std::path::{Component, Path, PathBuf};

use crate::utils::error::{AgentError, AgentResult};

/// Lexically normalize a path, folding `.` and `..` components.
///
/// Does not touch the filesystem, so it works for files that do not exist yet.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Resolve `path_str` inside `working_dir`.
///
/// Relative paths are joined onto the working directory. Paths that end up
/// outside it (absolute or via `..`) are rejected.
pub fn resolve_in_workspace(path_str: &str, working_dir: &Path) -> AgentResult<PathBuf> {
    let trimmed = path_str.trim();
    if trimmed.is_empty() {
        return Err(AgentError::validation("Path must not be empty"));
    }

    let root = normalize(working_dir);
    let path = Path::new(trimmed);
    let resolved = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };

    if !resolved.starts_with(&root) {
        return Err(AgentError::validation(format!(
            "Path '{}' is outside the workspace {}",
            path_str,
            root.display()
        )));
    }
    Ok(resolved)
}

/// Display form of `path` relative to `root`, falling back to the full path.
pub fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AgentResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
