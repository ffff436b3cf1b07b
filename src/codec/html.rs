//! HTML tables: one `<tr>` per row, one `<td>`/`<th>` per cell.
//!
//! Every row owns the markup between the previous row's `</tr>` and its own `</tr>`, so
//! untouched rows (and the table boundaries in front of them) are written back verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{row::Row, Dialect, ReadRows, RenderContext, SourceRow, TableCodec};
use crate::error::RideError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("static regex"));

#[derive(Debug, Clone, Default)]
pub struct HtmlCodec;

impl TableCodec for HtmlCodec {
    fn read(&self, source: &str, path: &Path) -> Result<ReadRows, RideError> {
        // ASCII lowercasing keeps byte offsets identical to `source`.
        let lower = source.to_ascii_lowercase();
        let mut rows = Vec::new();
        let mut consumed = 0;
        while let Some(start) = find_tag(&lower, "<tr", consumed) {
            let Some(end) = lower[start..].find("</tr>").map(|i| start + i) else {
                return Err(RideError::parse(
                    path,
                    line_of(source, start),
                    "table row is not closed with </tr>",
                ));
            };
            let inner = &source[start..end];
            let inner_lower = &lower[start..end];
            let (cells, header) = read_cells(inner, inner_lower)
                .map_err(|message| RideError::parse(path, line_of(source, start), message))?;
            let row_end = end + "</tr>".len();
            rows.push(SourceRow {
                row: Row {
                    cells,
                    raw: Some(source[consumed..row_end].to_string()),
                    line: line_of(source, start),
                },
                header,
            });
            consumed = row_end;
        }
        Ok(ReadRows {
            rows,
            trailer: source[consumed..].to_string(),
            dialect: Dialect::Html,
            newline: if source.contains("\r\n") { "\r\n" } else { "\n" }.to_string(),
        })
    }

    fn render(&self, cells: &[String], header: bool, ctx: &RenderContext) -> String {
        let end = cells
            .iter()
            .rposition(|c| !c.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        let tag = if header { "th" } else { "td" };
        let mut out = format!("{}<tr>", ctx.newline);
        for cell in &cells[..end] {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape(cell)));
        }
        out.push_str("</tr>");
        out
    }
}

/// Find `tag` followed by `>` or whitespace, so `<tr` does not match `<track`.
fn find_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let mut offset = from;
    while let Some(idx) = lower[offset..].find(tag) {
        let at = offset + idx;
        let next = lower[at + tag.len()..].chars().next();
        if next.is_some_and(|c| c == '>' || c == '/' || c.is_whitespace()) {
            return Some(at);
        }
        offset = at + tag.len();
    }
    None
}

fn read_cells(inner: &str, inner_lower: &str) -> Result<(Vec<String>, bool), String> {
    let mut cells = Vec::new();
    let mut header = false;
    let mut offset = 0;
    loop {
        let td = find_tag(inner_lower, "<td", offset);
        let th = find_tag(inner_lower, "<th", offset);
        let (start, close) = match (td, th) {
            (Some(d), Some(h)) if h < d => (h, "</th>"),
            (Some(d), _) => (d, "</td>"),
            (None, Some(h)) => (h, "</th>"),
            (None, None) => break,
        };
        header |= close == "</th>";
        let Some(open_end) = inner_lower[start..].find('>').map(|i| start + i + 1) else {
            return Err("unterminated cell tag".to_string());
        };
        let Some(close_at) = inner_lower[open_end..].find(close).map(|i| open_end + i) else {
            return Err(format!("cell is not closed with {close}"));
        };
        cells.push(decode(&inner[open_end..close_at]));
        offset = close_at + close.len();
    }
    Ok((cells, header))
}

/// Decode cell markup: source whitespace collapses, `<br>` becomes a newline, other tags are
/// dropped and entities are resolved.
pub fn decode(markup: &str) -> String {
    let collapsed = WHITESPACE.replace_all(markup, " ");
    let broken = LINE_BREAK.replace_all(&collapsed, "\n");
    let untagged = TAG.replace_all(&broken, "");
    let decoded = ENTITY.replace_all(&untagged, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        decoded
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    decoded
        .split('\n')
        .map(|part| part.trim_matches(' '))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape cell text for markup. Real newlines become `<br>`; a literal backslash followed by
/// `n` is ordinary text and stays as it is.
pub fn escape(cell: &str) -> String {
    cell.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}

fn line_of(source: &str, byte: usize) -> usize {
    source[..byte].matches('\n').count() + 1
}
