//! Edit Grouping and Index Adjustment
//!
//! Groups parsed edits by file and rewrites `Replace` coordinates so each
//! file's edits can be applied one after another. Models address lines in the
//! original file; after an earlier edit adds or removes lines, every later
//! `Replace` further down the file must shift by that net delta.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{CodeEdit, EditError, EditResult};

/// The ordered, index-adjusted edits of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: PathBuf,
    pub edits: Vec<CodeEdit>,
}

impl FileEdit {
    /// Whether applying requires the file's current content.
    ///
    /// A batch that starts with `Write` discards whatever was on disk.
    pub fn needs_disk_context(&self) -> bool {
        !matches!(self.edits.first(), Some(CodeEdit::Write { .. }))
    }
}

/// Group edits by path, in order of first appearance.
///
/// Within a file, `Replace` edits are sorted by original start line (keeping
/// the slots they occupied among the file's other edits) and shifted by the
/// net line delta of every earlier replace that ends at or before their
/// start. An insertion sorts ahead of a replacement starting on the same
/// line, so its lines land before the replaced range. Overlapping replace
/// ranges are rejected.
pub fn group_edits(edits: Vec<CodeEdit>) -> EditResult<Vec<FileEdit>> {
    let mut groups: Vec<FileEdit> = Vec::new();
    for edit in edits {
        match groups.iter_mut().find(|group| group.path == edit.path()) {
            Some(group) => group.edits.push(edit),
            None => groups.push(FileEdit {
                path: edit.path().to_path_buf(),
                edits: vec![edit],
            }),
        }
    }

    for group in &mut groups {
        sort_replaces(group);
        check_overlaps(group)?;
        adjust_indices(group)?;
    }
    Ok(groups)
}

fn is_replace(edit: &CodeEdit) -> bool {
    matches!(edit, CodeEdit::Replace { .. })
}

fn replace_range(edit: &CodeEdit) -> Option<(usize, usize)> {
    match edit {
        CodeEdit::Replace {
            line_range_start,
            line_range_len,
            ..
        } => Some((*line_range_start, *line_range_len)),
        _ => None,
    }
}

fn sort_replaces(group: &mut FileEdit) {
    let slots: Vec<usize> = (0..group.edits.len())
        .filter(|&index| is_replace(&group.edits[index]))
        .collect();
    let mut replaces: Vec<CodeEdit> = slots.iter().map(|&index| group.edits[index].clone()).collect();
    replaces.sort_by_key(|edit| replace_range(edit).unwrap_or((0, 0)));
    for (slot, edit) in slots.into_iter().zip(replaces) {
        group.edits[slot] = edit;
    }
}

/// Whether two `(start, len)` ranges claim a common line.
///
/// An insertion only conflicts with a replacement whose interior it lands in.
fn ranges_overlap((a_start, a_len): (usize, usize), (b_start, b_len): (usize, usize)) -> bool {
    let a_end = a_start.saturating_add(a_len);
    let b_end = b_start.saturating_add(b_len);
    match (a_len, b_len) {
        (0, 0) => false,
        (0, _) => b_start < a_start && a_start < b_end,
        (_, 0) => a_start < b_start && b_start < a_end,
        _ => a_start < b_end && b_start < a_end,
    }
}

fn check_overlaps(group: &FileEdit) -> EditResult<()> {
    let ranges: Vec<(usize, usize)> = group.edits.iter().filter_map(replace_range).collect();
    for (i, first) in ranges.iter().enumerate() {
        for second in &ranges[i + 1..] {
            if ranges_overlap(*first, *second) {
                return Err(EditError::OverlappingEdits {
                    path: group.path.display().to_string(),
                    first_start: first.0,
                    second_start: second.0,
                });
            }
        }
    }
    Ok(())
}

fn adjust_indices(group: &mut FileEdit) -> EditResult<()> {
    // (original end, delta) of the replaces seen so far
    let mut earlier: Vec<(usize, isize)> = Vec::new();

    for edit in &mut group.edits {
        let delta = edit.line_delta();
        let CodeEdit::Replace {
            line_range_start,
            line_range_len,
            ..
        } = edit
        else {
            continue;
        };

        let original = *line_range_start;
        let invalid = || EditError::InvalidRange {
            path: group.path.display().to_string(),
            start: original,
            len: *line_range_len,
            line_count: 0,
        };
        let shift: isize = earlier
            .iter()
            .filter(|(end, _)| *end <= original)
            .map(|(_, delta)| delta)
            .sum();
        let adjusted = isize::try_from(original)
            .ok()
            .and_then(|start| start.checked_add(shift))
            .ok_or_else(invalid)?;
        *line_range_start = usize::try_from(adjusted).map_err(|_| invalid())?;
        earlier.push((original.saturating_add(*line_range_len), delta));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replace(path: &str, start: usize, len: usize, new_lines: &[&str]) -> CodeEdit {
        CodeEdit::Replace {
            path: PathBuf::from(path),
            line_range_start: start,
            line_range_len: len,
            new_lines: new_lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn starts(group: &FileEdit) -> Vec<usize> {
        group
            .edits
            .iter()
            .filter_map(replace_range)
            .map(|(start, _)| start)
            .collect()
    }

    #[test]
    fn test_later_edit_shifts_by_net_delta() {
        // Line 0 becomes two lines (net +1); an edit at original line 2 lands on 3
        let groups = group_edits(vec![
            replace("f.txt", 0, 1, &["a", "b"]),
            replace("f.txt", 2, 1, &["c"]),
        ])
        .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(starts(&groups[0]), vec![0, 3]);
    }

    #[test]
    fn test_edits_sorted_by_start_before_adjusting() {
        let groups = group_edits(vec![
            replace("f.txt", 5, 1, &["x"]),
            replace("f.txt", 1, 2, &[]),
        ])
        .unwrap();
        // Deleting lines 1-2 moves original line 5 to 3
        assert_eq!(starts(&groups[0]), vec![1, 3]);
    }

    #[test]
    fn test_insertions_shift_later_edits() {
        let groups = group_edits(vec![
            replace("f.txt", 0, 0, &["top 1", "top 2"]),
            replace("f.txt", 4, 0, &["mid"]),
        ])
        .unwrap();
        assert_eq!(starts(&groups[0]), vec![0, 6]);
    }

    #[test]
    fn test_groups_by_path_in_first_appearance_order() {
        let groups = group_edits(vec![
            CodeEdit::Write {
                path: PathBuf::from("b.txt"),
                content: "x".into(),
            },
            replace("a.txt", 0, 1, &["y"]),
            CodeEdit::Append {
                path: PathBuf::from("b.txt"),
                content: "z".into(),
            },
        ])
        .unwrap();
        let paths: Vec<&str> = groups.iter().map(|g| g.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["b.txt", "a.txt"]);
        assert_eq!(groups[0].edits.len(), 2);
        assert!(!groups[0].needs_disk_context());
        assert!(groups[1].needs_disk_context());
    }

    #[test]
    fn test_non_replace_edits_keep_their_slots() {
        let find = CodeEdit::FindReplace {
            path: PathBuf::from("f.txt"),
            find_lines: vec!["x".into()],
            replace_lines: vec!["y".into()],
        };
        let groups = group_edits(vec![
            replace("f.txt", 8, 1, &["late"]),
            find.clone(),
            replace("f.txt", 2, 1, &["early"]),
        ])
        .unwrap();
        assert_eq!(groups[0].edits[1], find);
        assert_eq!(starts(&groups[0]), vec![2, 8]);
    }

    #[test]
    fn test_overlapping_ranges_are_rejected() {
        let result = group_edits(vec![
            replace("f.txt", 2, 3, &["x"]),
            replace("f.txt", 4, 1, &["y"]),
        ]);
        assert!(matches!(result, Err(EditError::OverlappingEdits { .. })));

        let result = group_edits(vec![
            replace("f.txt", 2, 3, &["x"]),
            replace("f.txt", 3, 0, &["inside"]),
        ]);
        assert!(matches!(result, Err(EditError::OverlappingEdits { .. })));
    }

    #[test]
    fn test_adjacent_ranges_are_fine() {
        assert!(group_edits(vec![
            replace("f.txt", 0, 2, &["x"]),
            replace("f.txt", 2, 2, &["y"]),
            replace("f.txt", 2, 0, &["before two"]),
        ])
        .is_ok());
    }

    #[test]
    fn test_insert_sorts_before_replace_at_same_line() {
        let groups = group_edits(vec![
            replace("f.txt", 0, 2, &["x"]),
            replace("f.txt", 2, 2, &["y"]),
            replace("f.txt", 2, 0, &["before two"]),
        ])
        .unwrap();
        let ranges: Vec<(usize, usize)> = groups[0].edits.iter().filter_map(replace_range).collect();
        assert_eq!(ranges, vec![(0, 2), (1, 0), (2, 2)]);
    }

    #[test]
    fn test_huge_ranges_do_not_overflow() {
        let result = group_edits(vec![
            replace("f.txt", 1, usize::MAX, &["x"]),
            replace("f.txt", usize::MAX, 1, &["y"]),
        ]);
        assert!(matches!(result, Err(EditError::InvalidRange { .. })));
    }
}
