//! Edit Application
//!
//! Applies a file's adjusted edits to its content in memory, then commits
//! the reviewed result to disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::diff::FileDiff;
use super::grouping::FileEdit;
use super::{join_lines, split_lines, CodeEdit, EditError, EditResult};

/// New content of one file, ready for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPreview {
    pub path: PathBuf,
    /// Content on disk before the edits; `None` when the file does not exist
    pub original: Option<String>,
    pub new_content: String,
    pub diff: FileDiff,
}

impl EditPreview {
    pub fn creates_file(&self) -> bool {
        self.original.is_none()
    }
}

/// Apply one edit to `content`.
pub fn apply_edit(content: &str, edit: &CodeEdit) -> EditResult<String> {
    match edit {
        CodeEdit::Write { content: new, .. } => Ok(new.clone()),
        CodeEdit::Append { content: tail, .. } => {
            if content.is_empty() {
                Ok(tail.clone())
            } else if content.ends_with('\n') {
                Ok(format!("{}{}", content, tail))
            } else {
                Ok(format!("{}\n{}", content, tail))
            }
        }
        CodeEdit::Replace {
            path,
            line_range_start,
            line_range_len,
            new_lines,
        } => {
            let mut lines = split_lines(content);
            let start = *line_range_start;
            let end = match start.checked_add(*line_range_len) {
                Some(end) if end <= lines.len() => end,
                _ => {
                    return Err(EditError::InvalidRange {
                        path: path.display().to_string(),
                        start,
                        len: *line_range_len,
                        line_count: lines.len(),
                    })
                }
            };
            lines.splice(start..end, new_lines.iter().cloned());
            Ok(join_lines(&lines))
        }
        CodeEdit::FindReplace {
            path,
            find_lines,
            replace_lines,
        } => {
            let path_display = || path.display().to_string();
            if find_lines.is_empty() {
                return Err(EditError::EmptyFind {
                    path: path_display(),
                });
            }

            let mut lines = split_lines(content);
            let matches: Vec<usize> = if find_lines.len() > lines.len() {
                Vec::new()
            } else {
                lines
                    .windows(find_lines.len())
                    .enumerate()
                    .filter(|(_, window)| *window == find_lines.as_slice())
                    .map(|(index, _)| index)
                    .collect()
            };

            match matches.as_slice() {
                [] => Err(EditError::FindNotFound {
                    path: path_display(),
                }),
                [start] => {
                    let start = *start;
                    lines.splice(start..start + find_lines.len(), replace_lines.iter().cloned());
                    Ok(join_lines(&lines))
                }
                _ => Err(EditError::AmbiguousFind {
                    path: path_display(),
                    matches: matches.len(),
                }),
            }
        }
    }
}

/// Apply a file's edits in order, starting from `original`.
pub fn apply_file_edit(original: &str, file_edit: &FileEdit) -> EditResult<String> {
    file_edit
        .edits
        .iter()
        .try_fold(original.to_string(), |content, edit| apply_edit(&content, edit))
}

async fn read_optional(path: &Path) -> EditResult<Option<String>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => {
            return Err(EditError::NotAFile {
                path: path.display().to_string(),
            })
        }
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(EditError::io(path, err)),
    }
    tokio::fs::read_to_string(path)
        .await
        .map(Some)
        .map_err(|err| EditError::io(path, err))
}

/// Compute the new content and diff of one file without writing anything.
///
/// The file is read once. A missing file is treated as empty, and so is an
/// unreadable one whose batch starts with `Write`.
pub async fn preview_file_edit(file_edit: &FileEdit) -> EditResult<EditPreview> {
    let original = match read_optional(&file_edit.path).await {
        Err(EditError::Io { .. }) if !file_edit.needs_disk_context() => None,
        other => other?,
    };
    let base = original.as_deref().unwrap_or("");
    let new_content = apply_file_edit(base, file_edit)?;
    let diff = FileDiff::compute(&file_edit.path, base, &new_content);

    Ok(EditPreview {
        path: file_edit.path.clone(),
        original,
        new_content,
        diff,
    })
}

/// A batch commit that stopped part way
#[derive(Debug)]
pub struct CommitFailure {
    /// Files already moved into place before the failure
    pub committed: Vec<PathBuf>,
    pub error: EditError,
}

fn staging_path(path: &Path) -> EditResult<PathBuf> {
    let name = path.file_name().ok_or_else(|| EditError::NotAFile {
        path: path.display().to_string(),
    })?;
    Ok(path.with_file_name(format!(".{}.stepwise.tmp", name.to_string_lossy())))
}

async fn stage(preview: &EditPreview) -> EditResult<PathBuf> {
    if let Some(parent) = preview.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| EditError::io(parent, err))?;
        }
    }
    let staged = staging_path(&preview.path)?;
    tokio::fs::write(&staged, &preview.new_content)
        .await
        .map_err(|err| EditError::io(&staged, err))?;
    Ok(staged)
}

async fn discard(staged: &[(PathBuf, &Path)]) {
    for (temp, _) in staged {
        if let Err(err) = tokio::fs::remove_file(temp).await {
            tracing::warn!(path = %temp.display(), error = %err, "[CodeEdit] failed to remove staged file");
        }
    }
}

/// Write a reviewed batch to disk, creating parent directories.
///
/// Every file is first written to a staging file next to its target, then
/// the staged files are renamed into place. A failure while staging leaves
/// every target untouched; a failure while renaming reports the targets
/// already replaced.
pub async fn commit_all(previews: &[EditPreview]) -> Result<(), CommitFailure> {
    let mut staged: Vec<(PathBuf, &Path)> = Vec::with_capacity(previews.len());
    for preview in previews {
        match stage(preview).await {
            Ok(temp) => staged.push((temp, preview.path.as_path())),
            Err(error) => {
                discard(&staged).await;
                return Err(CommitFailure {
                    committed: Vec::new(),
                    error,
                });
            }
        }
    }

    let mut committed = Vec::with_capacity(staged.len());
    for (index, (temp, target)) in staged.iter().enumerate() {
        if let Err(err) = tokio::fs::rename(temp, target).await {
            discard(&staged[index..]).await;
            return Err(CommitFailure {
                committed,
                error: EditError::io(target, err),
            });
        }
        tracing::debug!(path = %target.display(), "[CodeEdit] wrote file");
        committed.push(target.to_path_buf());
    }
    Ok(())
}
