//! Rows: the unit every reader produces and every writer consumes.

use serde::{Deserialize, Serialize};

/// One physical table row.
///
/// `raw` holds the exact source text the row was read from: a text line including its
/// terminator, or for HTML the markup between the previous row and this row's `</tr>`. While
/// `raw` is set the writer reproduces it verbatim; any cell change clears it and the row is
/// rendered from `cells` instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<String>,
    pub raw: Option<String>,
    /// 1-based source line, 0 for rows created in the editor
    pub line: usize,
}

impl Row {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Row {
            cells: cells.into_iter().map(Into::into).collect(),
            raw: None,
            line: 0,
        }
    }

    pub fn blank() -> Self {
        Row::default()
    }

    /// Cells without trailing empties, which carry no meaning.
    pub fn trimmed(&self) -> &[String] {
        let end = self
            .cells
            .iter()
            .rposition(|c| !c.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.cells[..end]
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    pub fn first_non_empty(&self) -> Option<(usize, &str)> {
        self.cells
            .iter()
            .enumerate()
            .find(|(_, c)| !c.is_empty())
            .map(|(i, c)| (i, c.as_str()))
    }

    pub fn is_comment(&self) -> bool {
        self.first_non_empty()
            .is_some_and(|(_, c)| c.starts_with('#'))
    }

    /// A row whose first non-empty cell is `...` extends the previous logical row.
    pub fn is_continuation(&self) -> bool {
        self.first_non_empty().is_some_and(|(_, c)| c == "...")
    }

    /// Cells following the `...` marker of a continuation row.
    pub fn continued_cells(&self) -> &[String] {
        match self.first_non_empty() {
            Some((idx, "...")) => &self.cells[idx + 1..],
            _ => &self.cells[..],
        }
    }

    pub fn cell(&self, idx: usize) -> &str {
        self.cells.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Set a cell, padding with empty cells as needed. Returns whether anything changed; a
    /// change drops the preserved source text.
    pub fn set_cell(&mut self, idx: usize, value: &str) -> bool {
        if self.cell(idx) == value {
            return false;
        }
        if idx >= self.cells.len() {
            self.cells.resize(idx + 1, String::new());
        }
        self.cells[idx] = value.to_string();
        self.touch();
        true
    }

    /// Forget the preserved source text so the row is rendered on the next write.
    pub fn touch(&mut self) {
        self.raw = None;
    }
}
