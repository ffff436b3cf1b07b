//! Plain-text dialects: space separated, pipe separated and tab separated rows.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{row::Row, Dialect, ReadRows, RenderContext, SourceRow, TableCodec};
use crate::error::RideError;

static SPACE_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("static regex"));

const BOM: char = '\u{feff}';

/// Reader/writer for the line based dialects. Reading detects the dialect line by line (a
/// space-separated file may contain pipe rows); the file dialect used for writing is taken
/// from the first section header.
#[derive(Debug, Clone)]
pub struct TextCodec {
    tsv: bool,
}

impl TextCodec {
    pub fn new(tsv: bool) -> Self {
        TextCodec { tsv }
    }
}

impl TableCodec for TextCodec {
    fn read(&self, source: &str, _path: &Path) -> Result<ReadRows, RideError> {
        let mut rows = Vec::new();
        let mut dialect = None;
        for (idx, piece) in source.split_inclusive('\n').enumerate() {
            let content = piece.trim_end_matches('\n').trim_end_matches('\r');
            let content = if idx == 0 {
                content.trim_start_matches(BOM)
            } else {
                content
            };
            let (cells, pipe) = if self.tsv {
                (split_tsv(content), false)
            } else if is_pipe_row(content) {
                (split_pipe(content), true)
            } else {
                (split_space(content), false)
            };
            let header = cells.first().is_some_and(|c| c.starts_with('*'));
            if header && dialect.is_none() {
                dialect = Some(if self.tsv {
                    Dialect::Tsv
                } else if pipe {
                    Dialect::Pipe
                } else {
                    Dialect::Space
                });
            }
            rows.push(SourceRow {
                row: Row {
                    cells,
                    raw: Some(piece.to_string()),
                    line: idx + 1,
                },
                header,
            });
        }
        let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };
        Ok(ReadRows {
            rows,
            trailer: String::new(),
            dialect: dialect.unwrap_or(if self.tsv { Dialect::Tsv } else { Dialect::Space }),
            newline: newline.to_string(),
        })
    }

    fn render(&self, cells: &[String], _header: bool, ctx: &RenderContext) -> String {
        let end = cells
            .iter()
            .rposition(|c| !c.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        let cells = &cells[..end];
        let mut line = match ctx.dialect {
            Dialect::Pipe if !cells.is_empty() => format!("| {} |", cells.join(" | ")),
            Dialect::Tsv => cells.join("\t"),
            // Empty cells inside a space separated row cannot be represented and collapse
            // into the surrounding separator.
            _ => cells.join(&" ".repeat(ctx.separator_width.max(2))),
        };
        line.push_str(&ctx.newline);
        line
    }
}

/// A pipe row starts with `|` followed by whitespace; leading spaces are allowed.
fn is_pipe_row(line: &str) -> bool {
    let mut chars = line.trim_start_matches(' ').chars();
    chars.next() == Some('|') && chars.next().is_none_or(char::is_whitespace)
}

/// Split a space separated line: cells are separated by two or more spaces, tabs count as two
/// spaces and leading whitespace yields an empty first cell.
pub fn split_space(line: &str) -> Vec<String> {
    let expanded = line.replace('\t', "  ");
    let content = expanded.trim_end();
    if content.trim_start().is_empty() {
        return Vec::new();
    }
    let mut cells = Vec::new();
    let body = content.trim_start();
    if body.len() != content.len() {
        cells.push(String::new());
    }
    cells.extend(SPACE_SEPARATOR.split(body).map(|c| c.to_string()));
    cells
}

/// Split a pipe separated line. A `|` is a separator when it has whitespace (or the line
/// boundary) on both sides; the leading `|` and an optional trailing `|` delimit the row.
pub fn split_pipe(line: &str) -> Vec<String> {
    let content = line.trim_end();
    let bytes = content.as_bytes();
    let mut separators = Vec::new();
    for (idx, b) in bytes.iter().enumerate() {
        if *b != b'|' {
            continue;
        }
        let before = idx == 0 || bytes[idx - 1].is_ascii_whitespace();
        let after = idx + 1 == bytes.len() || bytes[idx + 1].is_ascii_whitespace();
        if before && after {
            separators.push(idx);
        }
    }
    let mut cells = Vec::new();
    for pair in separators.windows(2) {
        cells.push(content[pair[0] + 1..pair[1]].trim().to_string());
    }
    if let Some(last) = separators.last() {
        let tail = content[last + 1..].trim();
        if !tail.is_empty() {
            cells.push(tail.to_string());
        }
    }
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

pub fn split_tsv(line: &str) -> Vec<String> {
    if line.trim().is_empty() {
        return Vec::new();
    }
    let mut cells: Vec<String> = line.split('\t').map(|c| c.trim().to_string()).collect();
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_rows_split_on_runs_of_two_spaces() {
        assert_eq!(split_space("My Test    Log  hello world"), vec![
            "My Test",
            "Log",
            "hello world"
        ]);
        assert_eq!(split_space("    Log\tx  "), vec!["", "Log", "x"]);
        assert!(split_space("   ").is_empty());
    }

    #[test]
    fn pipe_rows_keep_inner_empty_cells() {
        assert_eq!(split_pipe("| My Test | Log | hello |"), vec![
            "My Test", "Log", "hello"
        ]);
        assert_eq!(split_pipe("|  | Log |  | x |"), vec!["", "Log", "", "x"]);
        assert_eq!(split_pipe("| | Log | a|b"), vec!["", "Log", "a|b"]);
        assert!(split_pipe("|").is_empty());
    }

    #[test]
    fn indented_pipe_rows_are_pipe_rows() {
        let source = "  | *** Test Cases *** |\n  | My Test | Log | hello |\n";
        let read = TextCodec::new(false)
            .read(source, Path::new("suite.robot"))
            .unwrap();
        assert_eq!(read.dialect, Dialect::Pipe);
        assert_eq!(read.rows[1].row.cells, vec!["My Test", "Log", "hello"]);
        assert!(is_pipe_row("   |  | Log |"));
        assert!(!is_pipe_row("    Log    |x"));
    }

    #[test]
    fn tsv_rows_split_on_single_tabs() {
        assert_eq!(split_tsv("\tLog\t\tx\t"), vec!["", "Log", "", "x"]);
    }

    #[test]
    fn render_drops_trailing_empties_per_dialect() {
        let codec = TextCodec::new(false);
        let cells: Vec<String> = ["", "Log", "", "hi", ""].iter().map(|s| s.to_string()).collect();
        let mut ctx = RenderContext {
            dialect: Dialect::Pipe,
            separator_width: 2,
            newline: "\n".to_string(),
        };
        assert_eq!(codec.render(&cells, false, &ctx), "|  | Log |  | hi |\n");
        ctx.dialect = Dialect::Space;
        ctx.separator_width = 4;
        assert_eq!(codec.render(&cells, false, &ctx), "    Log        hi\n");
        ctx.dialect = Dialect::Tsv;
        assert_eq!(codec.render(&cells, false, &ctx), "\tLog\t\thi\n");
    }
}
