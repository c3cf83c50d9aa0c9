//! Line Diffs
//!
//! Line-level diff between the original and edited content of one file,
//! with long unchanged runs collapsible for review.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    Same,
    Insert,
    Delete,
}

impl DiffOp {
    fn prefix(self) -> char {
        match self {
            DiffOp::Same => ' ',
            DiffOp::Insert => '+',
            DiffOp::Delete => '-',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub op: DiffOp,
    pub text: String,
}

/// A display segment: visible lines or a collapsed run of unchanged lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffSegment {
    Lines { lines: Vec<DiffLine> },
    Collapsed { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub lines: Vec<DiffLine>,
}

impl FileDiff {
    /// Diff `old` against `new`, line by line.
    pub fn compute(path: impl Into<PathBuf>, old: &str, new: &str) -> Self {
        let old_lines = lines_of(old);
        let new_lines = lines_of(new);
        let diff = TextDiff::from_slices(&old_lines, &new_lines);

        let lines = diff
            .iter_all_changes()
            .map(|change| DiffLine {
                op: match change.tag() {
                    ChangeTag::Equal => DiffOp::Same,
                    ChangeTag::Insert => DiffOp::Insert,
                    ChangeTag::Delete => DiffOp::Delete,
                },
                text: change.value().to_string(),
            })
            .collect();

        Self {
            path: path.into(),
            lines,
        }
    }

    pub fn insertions(&self) -> usize {
        self.lines.iter().filter(|l| l.op == DiffOp::Insert).count()
    }

    pub fn deletions(&self) -> usize {
        self.lines.iter().filter(|l| l.op == DiffOp::Delete).count()
    }

    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.op != DiffOp::Same)
    }

    /// Segments for display, keeping `context` unchanged lines around changes.
    ///
    /// Unchanged runs longer than `2 * context` lines keep their first and
    /// last `context` lines and collapse the rest.
    pub fn segments(&self, context: usize) -> Vec<DiffSegment> {
        let mut segments = Vec::new();
        let mut visible: Vec<DiffLine> = Vec::new();
        let mut index = 0;

        while index < self.lines.len() {
            if self.lines[index].op != DiffOp::Same {
                visible.push(self.lines[index].clone());
                index += 1;
                continue;
            }

            let run_end = self.lines[index..]
                .iter()
                .position(|l| l.op != DiffOp::Same)
                .map(|offset| index + offset)
                .unwrap_or(self.lines.len());
            let run = &self.lines[index..run_end];

            if run.len() > 2 * context {
                visible.extend_from_slice(&run[..context]);
                if !visible.is_empty() {
                    segments.push(DiffSegment::Lines {
                        lines: std::mem::take(&mut visible),
                    });
                }
                segments.push(DiffSegment::Collapsed {
                    count: run.len() - 2 * context,
                });
                visible.extend_from_slice(&run[run.len() - context..]);
            } else {
                visible.extend_from_slice(run);
            }
            index = run_end;
        }

        if !visible.is_empty() {
            segments.push(DiffSegment::Lines { lines: visible });
        }
        segments
    }

    /// Prefixed text rendering with collapsed runs marked.
    pub fn to_text(&self, context: usize) -> String {
        let mut out: Vec<String> = Vec::new();
        for segment in self.segments(context) {
            match segment {
                DiffSegment::Lines { lines } => {
                    out.extend(lines.iter().map(|l| format!("{}{}", l.op.prefix(), l.text)))
                }
                DiffSegment::Collapsed { count } => {
                    out.push(format!("... {} unchanged lines ...", count))
                }
            }
        }
        out.join("\n")
    }
}

fn lines_of(content: &str) -> Vec<&str> {
    if content.is_empty() {
        Vec::new()
    } else {
        content.split('\n').collect()
    }
}
