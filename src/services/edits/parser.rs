//! Edit Command Parser
//!
//! Splits assistant text into narrative `Part::Text` runs and `Part::Edit`
//! commands. A block is a command line plus a fenced body; the command line
//! may sit just inside the opening fence or just before it:
//!
//! ```text
//! %%%                      > Write a.txt
//! > Write a.txt            %%%
//! hello                    hello
//! %%%                      %%%
//! ```
//!
//! `parse` is strict and reports malformed or unterminated blocks.
//! `parse_partial` is used while the model is still streaming: open blocks
//! are materialized from the lines seen so far and malformed ones are left
//! as text.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use super::{CodeEdit, EditError, EditResult, Part, FENCE, FIND_REPLACE_DIVIDER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Write,
    Append,
    Replace,
    Insert,
    FindReplace,
}

impl Keyword {
    fn from_name(s: &str) -> Option<Self> {
        match s {
            "Write" => Some(Self::Write),
            "Append" => Some(Self::Append),
            "Replace" => Some(Self::Replace),
            "Insert" => Some(Self::Insert),
            "FindReplace" => Some(Self::FindReplace),
            _ => None,
        }
    }
}

fn command_start_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*>\s*(Write|Append|Replace|Insert|FindReplace)(\s|$)").ok())
        .as_ref()
}

fn command_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*>\s*(Write|Append|Replace|Insert|FindReplace)\s+(\S.*?)\s*$").ok()
    })
    .as_ref()
}

fn is_fence(line: &str) -> bool {
    line.trim() == FENCE
}

fn is_command_line(line: &str) -> bool {
    command_start_regex()
        .map(|re| re.is_match(line))
        .unwrap_or(false)
}

/// Index of the command line and first body line of a block opening at `i`.
fn block_opening(lines: &[&str], i: usize) -> Option<(usize, usize)> {
    let next = lines.get(i + 1)?;
    if is_fence(lines[i]) && is_command_line(next) {
        return Some((i + 1, i + 2));
    }
    if is_command_line(lines[i]) && is_fence(next) {
        return Some((i, i + 2));
    }
    None
}

/// Escape a body line that would otherwise close its block.
///
/// A line made of optional backslashes followed by the fence gains one
/// backslash; `unescape_block_line` removes it again.
pub fn escape_block_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.trim_start_matches('\\') != FENCE {
        return line.to_string();
    }
    let indent = line.len() - line.trim_start().len();
    format!("{}\\{}", &line[..indent], &line[indent..])
}

fn unescape_block_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.starts_with('\\') && trimmed.trim_start_matches('\\') == FENCE {
        return line.replacen('\\', "", 1);
    }
    line.to_string()
}

/// Whether `text` contains at least one edit block opening.
pub fn contains_edit_commands(text: &str) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    (0..lines.len()).any(|i| block_opening(&lines, i).is_some())
}

/// Strictly parse `text` into narrative and edits.
pub fn parse(text: &str) -> EditResult<Vec<Part>> {
    Parser { partial: false }.run(text)
}

/// Best-effort parse of text that may still be streaming.
pub fn parse_partial(text: &str) -> Vec<Part> {
    Parser { partial: true }
        .run(text)
        .unwrap_or_else(|_| vec![Part::Text(text.to_string())])
}

struct Parser {
    partial: bool,
}

impl Parser {
    fn run(&self, text: &str) -> EditResult<Vec<Part>> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut parts = Vec::new();
        let mut narrative: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let Some((command_index, body_start)) = block_opening(&lines, i) else {
                // A lone trailing fence is most likely a block being opened
                let trailing_fence = self.partial && i + 1 == lines.len() && is_fence(lines[i]);
                if !trailing_fence {
                    narrative.push(lines[i]);
                }
                i += 1;
                continue;
            };

            let command_line = lines[command_index];
            let close = (body_start..lines.len()).find(|&j| is_fence(lines[j]));
            let body_end = close.unwrap_or(lines.len());
            let next = close.map(|c| c + 1).unwrap_or(lines.len());

            if close.is_none() && !self.partial {
                return Err(EditError::UnterminatedBlock {
                    command: command_line.trim().to_string(),
                });
            }

            let body: Vec<String> = lines[body_start..body_end]
                .iter()
                .map(|line| unescape_block_line(line))
                .collect();

            match self.build_edit(command_line, body) {
                Ok(edit) => {
                    flush_narrative(&mut narrative, &mut parts);
                    parts.push(Part::Edit(edit));
                }
                Err(err) if self.partial => {
                    tracing::trace!(error = %err, "[CodeEdit] leaving malformed block as text");
                    narrative.extend_from_slice(&lines[i..next]);
                }
                Err(err) => return Err(err),
            }
            i = next;
        }

        flush_narrative(&mut narrative, &mut parts);
        Ok(parts)
    }

    fn build_edit(&self, command_line: &str, body: Vec<String>) -> EditResult<CodeEdit> {
        let (keyword, argument) = parse_command(command_line)?;

        let edit = match keyword {
            Keyword::Write => CodeEdit::Write {
                path: PathBuf::from(argument),
                content: body.join("\n"),
            },
            Keyword::Append => CodeEdit::Append {
                path: PathBuf::from(argument),
                content: body.join("\n"),
            },
            Keyword::Replace => {
                let (path, spec) = split_location(&argument)?;
                let (start, len) = parse_line_spec(spec)?;
                CodeEdit::Replace {
                    path,
                    line_range_start: start,
                    line_range_len: len,
                    new_lines: body,
                }
            }
            Keyword::Insert => {
                let (path, spec) = split_location(&argument)?;
                let index = parse_index(spec)?;
                CodeEdit::Replace {
                    path,
                    line_range_start: index,
                    line_range_len: 0,
                    new_lines: body,
                }
            }
            Keyword::FindReplace => self.find_replace(PathBuf::from(argument), body)?,
        };
        Ok(edit)
    }

    fn find_replace(&self, path: PathBuf, body: Vec<String>) -> EditResult<CodeEdit> {
        let dividers: Vec<usize> = body
            .iter()
            .enumerate()
            .filter(|(_, line)| line.trim() == FIND_REPLACE_DIVIDER)
            .map(|(index, _)| index)
            .collect();

        let (find_lines, replace_lines) = match dividers.as_slice() {
            [divider] => (body[..*divider].to_vec(), body[divider + 1..].to_vec()),
            [] if self.partial => (body, Vec::new()),
            [] => {
                return Err(EditError::MissingDivider {
                    path: path.display().to_string(),
                })
            }
            [first, ..] if self.partial => (body[..*first].to_vec(), body[first + 1..].to_vec()),
            _ => {
                return Err(EditError::MultipleDividers {
                    path: path.display().to_string(),
                    count: dividers.len(),
                })
            }
        };

        Ok(CodeEdit::FindReplace {
            path,
            find_lines,
            replace_lines,
        })
    }
}

fn flush_narrative(narrative: &mut Vec<&str>, parts: &mut Vec<Part>) {
    let text = narrative.join("\n");
    narrative.clear();
    if !text.trim().is_empty() {
        parts.push(Part::Text(text));
    }
}

fn parse_command(line: &str) -> EditResult<(Keyword, String)> {
    let malformed = || EditError::MalformedCommand {
        line: line.trim().to_string(),
    };
    let captures = command_regex()
        .and_then(|re| re.captures(line))
        .ok_or_else(malformed)?;
    let keyword = captures
        .get(1)
        .and_then(|m| Keyword::from_name(m.as_str()))
        .ok_or_else(malformed)?;
    let argument = captures.get(2).ok_or_else(malformed)?.as_str().to_string();
    Ok((keyword, argument))
}

/// Split `path:spec`, splitting at the last colon so drive letters survive.
fn split_location(argument: &str) -> EditResult<(PathBuf, &str)> {
    let (path, spec) = argument
        .rsplit_once(':')
        .ok_or_else(|| EditError::InvalidLineSpec {
            spec: argument.to_string(),
        })?;
    let path = path.trim();
    if path.is_empty() {
        return Err(EditError::MalformedCommand {
            line: argument.to_string(),
        });
    }
    Ok((PathBuf::from(path), spec.trim()))
}

fn parse_index(spec: &str) -> EditResult<usize> {
    spec.trim().parse::<usize>().map_err(|_| EditError::InvalidLineSpec {
        spec: spec.to_string(),
    })
}

/// `start` or inclusive `start-end`, returned as `(start, len)`
fn parse_line_spec(spec: &str) -> EditResult<(usize, usize)> {
    let invalid = || EditError::InvalidLineSpec {
        spec: spec.to_string(),
    };
    let (start, end) = match spec.split_once('-') {
        Some((start, end)) => (parse_index(start)?, parse_index(end)?),
        None => {
            let line = parse_index(spec)?;
            (line, line)
        }
    };
    let len = end
        .checked_sub(start)
        .and_then(|span| span.checked_add(1))
        .ok_or_else(invalid)?;
    Ok((start, len))
}
