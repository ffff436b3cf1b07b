//! Readers and writers for the textual table format.
//!
//! A data file is a sequence of sections (`*** Settings ***`, `*** Variables ***`,
//! `*** Test Cases ***`, `*** Keywords ***`), each holding rows of cells. Four dialects exist:
//!
//! - **Space**: cells separated by two or more spaces, tabs count as two spaces
//! - **Pipe**: cells separated by ` | ` with a leading `| ` and optional trailing ` |`
//! - **Tsv**: cells separated by a single tab
//! - **Html**: one `<tr>` per row, one `<td>` per cell
//!
//! Readers split source text into [`SourceRow`]s and keep the exact text of each row; the
//! [`DataFile`](crate::model::DataFile) writer re-emits that text for rows nobody touched, so a
//! read followed by a write reproduces the file byte for byte. Only rows whose cells changed
//! are rendered through [`TableCodec::render`] in the file's dialect.

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::error::RideError;

pub mod html;
pub mod row;
pub mod text;

pub use html::HtmlCodec;
pub use row::Row;
pub use text::TextCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Space,
    Pipe,
    Tsv,
    Html,
}

impl Dialect {
    /// Dialect implied by a file extension. `.robot`, `.txt` and `.resource` files start out as
    /// [`Dialect::Space`]; the reader switches to [`Dialect::Pipe`] when the headers are piped.
    pub fn from_path(path: &Path) -> Option<Dialect> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "robot" | "txt" | "resource" => Some(Dialect::Space),
            "tsv" => Some(Dialect::Tsv),
            "html" | "htm" | "xhtml" => Some(Dialect::Html),
            _ => None,
        }
    }

    pub fn is_supported(path: &Path) -> bool {
        Self::from_path(path).is_some()
    }

    pub fn codec(&self) -> Box<dyn TableCodec> {
        match self {
            Dialect::Space | Dialect::Pipe => Box::new(TextCodec::new(false)),
            Dialect::Tsv => Box::new(TextCodec::new(true)),
            Dialect::Html => Box::new(HtmlCodec),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Space | Dialect::Pipe => "robot",
            Dialect::Tsv => "tsv",
            Dialect::Html => "html",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Space => "space",
            Dialect::Pipe => "pipe",
            Dialect::Tsv => "tsv",
            Dialect::Html => "html",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Dialect {
    type Err = RideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "space" | "txt" | "robot" => Ok(Dialect::Space),
            "pipe" => Ok(Dialect::Pipe),
            "tsv" => Ok(Dialect::Tsv),
            "html" => Ok(Dialect::Html),
            other => Err(RideError::Data(format!("unknown table dialect '{other}'"))),
        }
    }
}

/// A row as produced by a reader, flagged when it introduces a section.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub row: Row,
    pub header: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadRows {
    pub rows: Vec<SourceRow>,
    /// Source text after the last row (closing markup for HTML)
    pub trailer: String,
    /// Dialect to use when rendering rows of this file
    pub dialect: Dialect,
    pub newline: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderContext {
    pub dialect: Dialect,
    pub separator_width: usize,
    pub newline: String,
}

/// Options shared by reading and writing, normally taken from the `[General]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecOptions {
    /// Dialect for files created in the editor
    pub default_dialect: Dialect,
    /// Spaces between cells when rendering the space dialect
    pub separator_width: usize,
    /// Keep unknown section headers verbatim instead of failing
    pub allow_unknown_sections: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            default_dialect: Dialect::Space,
            separator_width: 2,
            allow_unknown_sections: false,
        }
    }
}

pub trait TableCodec {
    /// Split `source` into rows, keeping the source text of each row.
    fn read(&self, source: &str, path: &Path) -> Result<ReadRows, RideError>;

    /// Render one row (including its line terminator or leading markup).
    fn render(&self, cells: &[String], header: bool, ctx: &RenderContext) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dialect_from_extension() {
        assert_eq!(
            Dialect::from_path(&PathBuf::from("a/suite.ROBOT")),
            Some(Dialect::Space)
        );
        assert_eq!(Dialect::from_path(&PathBuf::from("x.tsv")), Some(Dialect::Tsv));
        assert_eq!(Dialect::from_path(&PathBuf::from("x.htm")), Some(Dialect::Html));
        assert_eq!(Dialect::from_path(&PathBuf::from("x.py")), None);
        assert_eq!("Pipe".parse::<Dialect>().unwrap(), Dialect::Pipe);
        assert!("csv".parse::<Dialect>().is_err());
    }

    #[test]
    fn pipe_headers_switch_the_file_dialect() {
        let read = TextCodec::new(false)
            .read(
                "| *** Test Cases *** |\n| My Test | Log | hello |\n",
                &PathBuf::from("t.robot"),
            )
            .unwrap();
        assert_eq!(read.dialect, Dialect::Pipe);
        assert!(read.rows[0].header);
        assert_eq!(read.rows[1].row.cells, vec!["My Test", "Log", "hello"]);
    }
}
