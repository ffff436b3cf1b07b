//! In-memory model of one data file.
//!
//! A [`DataFile`] is an ordered list of [`Section`]s. Settings, variables and comment sections
//! hold plain [`Row`]s; test case and keyword sections hold [`Element`]s (a name row followed by
//! step rows). Imports and variables are derived views over the settings and variables rows,
//! so editing a cell is the only way their values change.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    codec::{CodecOptions, Dialect, RenderContext, Row},
    error::RideError,
};

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[$@&%]\{.+\}$").expect("static regex"));

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a test case or keyword, kept across moves and renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl ElementId {
    pub fn fresh() -> Self {
        ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFileKind {
    TestCase,
    Resource,
    Init,
}

/// The tables a controller can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableKind {
    Settings,
    Variables,
    TestCases,
    Keywords,
}

impl TableKind {
    pub fn has_elements(&self) -> bool {
        matches!(self, TableKind::TestCases | TableKind::Keywords)
    }

    fn rank(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableKind::Settings => "Settings",
            TableKind::Variables => "Variables",
            TableKind::TestCases => "Test Cases",
            TableKind::Keywords => "Keywords",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Table(TableKind),
    Comments,
    /// Unrecognised header kept verbatim (compatibility mode only)
    Unknown(String),
}

impl SectionKind {
    /// Recognise a section header cell such as `*** Test Cases ***` or the HTML `Test Case`.
    pub fn from_header(cell: &str) -> Option<SectionKind> {
        let name = cell
            .trim_matches(|c: char| c == '*' || c.is_whitespace())
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let kind = match name.as_str() {
            "setting" | "settings" | "metadata" => SectionKind::Table(TableKind::Settings),
            "variable" | "variables" => SectionKind::Table(TableKind::Variables),
            "test case" | "test cases" | "task" | "tasks" => {
                SectionKind::Table(TableKind::TestCases)
            }
            "keyword" | "keywords" | "user keyword" | "user keywords" => {
                SectionKind::Table(TableKind::Keywords)
            }
            "comment" | "comments" => SectionKind::Comments,
            _ => return None,
        };
        Some(kind)
    }

    pub fn table(&self) -> Option<TableKind> {
        match self {
            SectionKind::Table(kind) => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Empty,
    Comment,
    ForLoop,
    Continuation,
    /// `[Documentation]`, `[Arguments]`, `[Setup]` ...
    Setting,
    Call,
}

/// Cells of a step row, without the indentation cell.
pub fn step_cells(row: &Row) -> &[String] {
    match row.cells.first() {
        Some(first) if first.is_empty() => &row.cells[1..],
        _ => &row.cells[..],
    }
}

pub fn step_kind(row: &Row) -> StepKind {
    let cells = step_cells(row);
    let Some(first) = cells.iter().find(|c| !c.is_empty()) else {
        return StepKind::Empty;
    };
    if first.starts_with('#') {
        StepKind::Comment
    } else if first == "..." {
        StepKind::Continuation
    } else if is_for_header(first) {
        StepKind::ForLoop
    } else if first.starts_with('[') && first.ends_with(']') {
        StepKind::Setting
    } else {
        StepKind::Call
    }
}

fn is_for_header(cell: &str) -> bool {
    let normalized: String = cell
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    normalized.eq_ignore_ascii_case("for")
}

const CONTROL_WORDS: &[&str] = &[
    "END", "IF", "ELSE", "ELSE IF", "WHILE", "TRY", "EXCEPT", "FINALLY", "BREAK", "CONTINUE",
    "RETURN",
];

/// Block syntax markers such as `END` or `ELSE IF`; they occupy the keyword column but call
/// nothing.
pub fn is_control_word(cell: &str) -> bool {
    CONTROL_WORDS.contains(&cell) || is_for_header(cell)
}

pub fn is_variable_name(cell: &str) -> bool {
    VARIABLE_NAME.is_match(cell)
}

/// Strip the optional assignment mark: `${x} =` becomes `${x}`.
pub fn assignment_target(cell: &str) -> Option<&str> {
    let name = cell.trim_end().trim_end_matches('=').trim_end();
    is_variable_name(name).then_some(name)
}

/// Index (into [`step_cells`]) of the cell holding the keyword a step calls, if any.
pub fn keyword_cell(row: &Row) -> Option<usize> {
    let cells = step_cells(row);
    match step_kind(row) {
        StepKind::Call => cells
            .iter()
            .position(|c| !c.is_empty() && c != "\\" && assignment_target(c).is_none())
            .filter(|idx| !is_control_word(&cells[*idx])),
        StepKind::Setting => {
            let setting = cells.iter().position(|c| !c.is_empty())?;
            let name = normalize_setting(&cells[setting]);
            let takes_keyword = matches!(name.as_str(), "setup" | "teardown" | "template");
            (takes_keyword && cells.get(setting + 1).is_some_and(|c| !c.is_empty()))
                .then_some(setting + 1)
        }
        _ => None,
    }
}

/// `[Suite Setup]`, `Suite Setup:` and `suitesetup` all normalise to `suitesetup`.
pub fn normalize_setting(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '[' | ']' | ':') && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// A test case or user keyword: a name row followed by step rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub header: Row,
    pub steps: Vec<Row>,
    /// The header's source text also carries step 0
    inline_first: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Element {
            id: ElementId::fresh(),
            header: Row::new([name]),
            steps: Vec::new(),
            inline_first: false,
        }
    }

    /// Build an element from rendered cells: the name and, optionally, a first step.
    pub fn from_cells(cells: &[String]) -> Self {
        let mut element = Element::new(cells.first().map(String::as_str).unwrap_or(""));
        if cells.len() > 1 && cells[1..].iter().any(|c| !c.is_empty()) {
            let mut step = vec![String::new()];
            step.extend(cells[1..].iter().cloned());
            element.steps.push(Row::new(step));
        }
        element
    }

    pub fn name(&self) -> &str {
        self.header.cell(0)
    }

    /// True while the name row's source text also carries step 0.
    pub fn is_inline(&self) -> bool {
        self.inline_first
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        if self.name() == name {
            return false;
        }
        self.split_inline();
        self.header.set_cell(0, name)
    }

    /// Mutable step rows. The first call re-renders a header that also carried step 0.
    pub fn steps_mut(&mut self) -> &mut Vec<Row> {
        self.split_inline();
        &mut self.steps
    }

    fn split_inline(&mut self) {
        if self.inline_first {
            self.inline_first = false;
            self.header.touch();
            if let Some(first) = self.steps.first_mut() {
                first.touch();
            }
        }
    }

    /// Values of a `[Setting]` step such as `[Arguments]`, joined across continuations.
    pub fn setting(&self, name: &str) -> Option<Vec<String>> {
        let wanted = normalize_setting(name);
        let mut values: Option<Vec<String>> = None;
        for row in &self.steps {
            let cells = step_cells(row);
            match step_kind(row) {
                StepKind::Setting if values.is_none() => {
                    if normalize_setting(&cells[0]) == wanted {
                        values = Some(trimmed(&cells[1..]));
                    }
                }
                StepKind::Continuation => {
                    if let Some(values) = values.as_mut() {
                        values.extend(trimmed(row.continued_cells()));
                    }
                }
                _ if values.is_some() => break,
                _ => {}
            }
        }
        values
    }

    pub fn arguments(&self) -> Vec<String> {
        self.setting("[Arguments]").unwrap_or_default()
    }

    pub fn documentation(&self) -> String {
        self.setting("[Documentation]")
            .map(|d| d.join(" "))
            .unwrap_or_default()
    }
}

fn trimmed(cells: &[String]) -> Vec<String> {
    let end = cells
        .iter()
        .rposition(|c| !c.is_empty())
        .map(|i| i + 1)
        .unwrap_or(0);
    cells[..end].to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionBody {
    Rows(Vec<Row>),
    Elements {
        /// Blank and comment rows before the first element
        leading: Vec<Row>,
        elements: Vec<Element>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub header: Row,
    pub body: SectionBody,
    /// Closing markup for sections created in an HTML file
    pub footer: Option<String>,
}

impl Section {
    fn from_header(kind: SectionKind, header: Row) -> Self {
        let body = match kind {
            SectionKind::Table(t) if t.has_elements() => SectionBody::Elements {
                leading: Vec::new(),
                elements: Vec::new(),
            },
            _ => SectionBody::Rows(Vec::new()),
        };
        Section {
            kind,
            header,
            body,
            footer: None,
        }
    }

    /// A section created in the editor, rendered in the file's dialect.
    pub fn new_table(kind: TableKind, ctx: &RenderContext) -> Self {
        match ctx.dialect {
            Dialect::Html => {
                let title = match kind {
                    TableKind::Settings => "Setting",
                    TableKind::Variables => "Variable",
                    TableKind::TestCases => "Test Case",
                    TableKind::Keywords => "Keyword",
                };
                let mut header = Row::new([title]);
                let rendered = ctx.dialect.codec().render(&header.cells, true, ctx);
                header.raw = Some(format!("{}<table border=\"1\">{rendered}", ctx.newline));
                let mut section = Section::from_header(SectionKind::Table(kind), header);
                section.footer = Some(format!("{}</table>", ctx.newline));
                section
            }
            _ => Section::from_header(
                SectionKind::Table(kind),
                Row::new([format!("*** {kind} ***")]),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.body {
            SectionBody::Rows(rows) => rows.is_empty(),
            SectionBody::Elements { leading, elements } => {
                leading.is_empty() && elements.is_empty()
            }
        }
    }

    fn push_row(&mut self, row: Row, path: &Path) -> Result<(), RideError> {
        match &mut self.body {
            SectionBody::Rows(rows) => {
                if let SectionKind::Table(_) = self.kind {
                    let has_content = rows.iter().any(|r| !r.is_blank() && !r.is_comment());
                    if row.is_continuation() && !has_content {
                        return Err(RideError::parse(
                            path,
                            row.line,
                            "continuation row '...' without a preceding row",
                        ));
                    }
                    if !row.is_blank() && !row.is_comment() && !row.is_continuation() {
                        if row.cell(0).is_empty() {
                            return Err(RideError::parse(
                                path,
                                row.line,
                                format!(
                                    "unexpected indentation in the {} table",
                                    section_name(&self.kind)
                                ),
                            ));
                        }
                        if self.kind == SectionKind::Table(TableKind::Variables)
                            && assignment_target(row.cell(0)).is_none()
                        {
                            return Err(RideError::parse(
                                path,
                                row.line,
                                format!("invalid variable name '{}'", row.cell(0)),
                            ));
                        }
                    }
                }
                rows.push(row);
            }
            SectionBody::Elements { leading, elements } => {
                let first = row.cell(0);
                let starts_element = !first.is_empty() && !first.starts_with('#') && first != "...";
                if starts_element {
                    elements.push(element_from_row(row));
                } else if let Some(current) = elements.last_mut() {
                    current.steps.push(row);
                } else if row.is_blank() || row.is_comment() {
                    leading.push(row);
                } else {
                    return Err(RideError::parse(
                        path,
                        row.line,
                        "step outside of a test case or keyword",
                    ));
                }
            }
        }
        Ok(())
    }

}

fn section_name(kind: &SectionKind) -> String {
    match kind {
        SectionKind::Table(t) => t.to_string(),
        SectionKind::Comments => "Comments".to_string(),
        SectionKind::Unknown(name) => name.clone(),
    }
}

fn element_from_row(row: Row) -> Element {
    let Row { cells, raw, line } = row;
    let trimmed = trimmed(&cells);
    let mut element = Element {
        id: ElementId::fresh(),
        header: Row {
            cells: vec![cells[0].clone()],
            raw,
            line,
        },
        steps: Vec::new(),
        inline_first: false,
    };
    if trimmed.len() > 1 {
        let mut step = vec![String::new()];
        step.extend(trimmed[1..].iter().cloned());
        element.inline_first = true;
        element.steps.push(Row {
            cells: step,
            raw: Some(String::new()),
            line,
        });
    }
    element
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportKind {
    Library,
    Resource,
    Variables,
}

impl ImportKind {
    pub fn from_setting(name: &str) -> Option<ImportKind> {
        match normalize_setting(name).as_str() {
            "library" => Some(ImportKind::Library),
            "resource" => Some(ImportKind::Resource),
            "variables" => Some(ImportKind::Variables),
            _ => None,
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportKind::Library => "Library",
            ImportKind::Resource => "Resource",
            ImportKind::Variables => "Variables",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub kind: ImportKind,
    pub name: String,
    pub args: Vec<String>,
    pub alias: Option<String>,
    /// Row index in the settings table
    pub row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableShape {
    Scalar,
    List,
    Dict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Name including sigil and braces, e.g. `${host}`
    pub name: String,
    pub value: Vec<String>,
    /// Row index in the variables table
    pub row: usize,
}

impl Variable {
    pub fn shape(&self) -> VariableShape {
        match self.name.chars().next() {
            Some('@') => VariableShape::List,
            Some('&') => VariableShape::Dict,
            _ => VariableShape::Scalar,
        }
    }
}

/// Fold continuation rows into the logical rows they extend: `(row index, cells)`.
fn logical_rows(rows: &[Row]) -> Vec<(usize, Vec<String>)> {
    let mut logical: Vec<(usize, Vec<String>)> = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        if row.is_blank() || row.is_comment() {
            continue;
        }
        if row.is_continuation() {
            if let Some((_, cells)) = logical.last_mut() {
                cells.extend(trimmed(row.continued_cells()));
            }
            continue;
        }
        logical.push((idx, trimmed(&row.cells)));
    }
    logical
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub source: PathBuf,
    pub kind: DataFileKind,
    pub dialect: Dialect,
    /// Rows before the first section header
    pub preamble: Vec<Row>,
    pub sections: Vec<Section>,
    /// Source text after the last row
    pub trailer: String,
    pub newline: String,
}

impl DataFile {
    /// An empty data file created in the editor.
    pub fn new(source: impl Into<PathBuf>, kind: DataFileKind, dialect: Dialect) -> Self {
        DataFile {
            source: source.into(),
            kind,
            dialect,
            preamble: Vec::new(),
            sections: Vec::new(),
            trailer: String::new(),
            newline: "\n".to_string(),
        }
    }

    pub fn read(path: impl AsRef<Path>, options: &CodecOptions) -> Result<Self, RideError> {
        let path = path.as_ref();
        tracing::debug!("[DataFile] Reading {:?}", path);
        Self::from_bytes(path, std::fs::read(path)?, options)
    }

    pub fn from_bytes(
        path: &Path,
        bytes: Vec<u8>,
        options: &CodecOptions,
    ) -> Result<Self, RideError> {
        let text = String::from_utf8(bytes).map_err(|e| {
            let valid = e.utf8_error().valid_up_to();
            let line = e.as_bytes()[..valid].iter().filter(|b| **b == b'\n').count() + 1;
            RideError::parse(path, line, "file is not valid UTF-8")
        })?;
        Self::parse(path, &text, options)
    }

    pub fn parse(path: &Path, text: &str, options: &CodecOptions) -> Result<Self, RideError> {
        let hint = Dialect::from_path(path).unwrap_or(Dialect::Space);
        let read = hint.codec().read(text, path)?;
        let mut preamble = Vec::new();
        let mut sections: Vec<Section> = Vec::new();
        for source_row in read.rows {
            let row = source_row.row;
            if source_row.header {
                let title = row.cell(0).to_string();
                let kind = match SectionKind::from_header(&title) {
                    Some(kind) => kind,
                    None if options.allow_unknown_sections => SectionKind::Unknown(title),
                    None => {
                        return Err(RideError::parse(
                            path,
                            row.line,
                            format!("unrecognized section header '{title}'"),
                        ))
                    }
                };
                sections.push(Section::from_header(kind, row));
                continue;
            }
            match sections.last_mut() {
                Some(section) => section.push_row(row, path)?,
                None => preamble.push(row),
            }
        }

        let is_init = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("__init__"));
        let has_tests = sections
            .iter()
            .any(|s| s.kind == SectionKind::Table(TableKind::TestCases));
        let is_resource_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("resource"));
        let kind = match (is_init, has_tests) {
            (true, true) => {
                return Err(RideError::Data(format!(
                    "initialization file {} cannot contain test cases",
                    path.display()
                )))
            }
            (true, false) => DataFileKind::Init,
            (false, true) if is_resource_ext => {
                return Err(RideError::Data(format!(
                    "resource file {} cannot contain test cases",
                    path.display()
                )))
            }
            (false, true) => DataFileKind::TestCase,
            (false, false) => DataFileKind::Resource,
        };

        Ok(DataFile {
            source: path.to_path_buf(),
            kind,
            dialect: read.dialect,
            preamble,
            sections,
            trailer: read.trailer,
            newline: read.newline,
        })
    }

    pub fn render_context(&self, options: &CodecOptions) -> RenderContext {
        RenderContext {
            dialect: self.dialect,
            separator_width: options.separator_width,
            newline: self.newline.clone(),
        }
    }

    /// Serialise the file. Rows that still carry their source text are emitted verbatim.
    pub fn to_text(&self, options: &CodecOptions) -> String {
        let ctx = self.render_context(options);
        let codec = self.dialect.codec();
        let line_based = self.dialect != Dialect::Html;
        let mut out = String::new();
        let emit = |out: &mut String, row: &Row, header: bool| {
            // A moved last line may lack its terminator
            let rendered;
            let text = match &row.raw {
                Some(raw) => raw.as_str(),
                None => {
                    rendered = codec.render(&row.cells, header, &ctx);
                    rendered.as_str()
                }
            };
            if line_based && !text.is_empty() && !out.is_empty() && !out.ends_with('\n') {
                out.push_str(&ctx.newline);
            }
            out.push_str(text);
        };
        for row in &self.preamble {
            emit(&mut out, row, false);
        }
        for section in &self.sections {
            emit(&mut out, &section.header, true);
            match &section.body {
                SectionBody::Rows(rows) => rows.iter().for_each(|r| emit(&mut out, r, false)),
                SectionBody::Elements { leading, elements } => {
                    leading.iter().for_each(|r| emit(&mut out, r, false));
                    for element in elements {
                        emit(&mut out, &element.header, false);
                        element.steps.iter().for_each(|r| emit(&mut out, r, false));
                    }
                }
            }
            if let Some(footer) = &section.footer {
                out.push_str(footer);
            }
        }
        out.push_str(&self.trailer);
        out
    }

    pub fn name(&self) -> String {
        let stem = self
            .source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let stem = if self.kind == DataFileKind::Init {
            self.source
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|s| s.to_str())
                .unwrap_or(stem)
        } else {
            stem
        };
        stem.replace('_', " ")
    }

    pub fn section(&self, kind: TableKind) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.kind == SectionKind::Table(kind))
    }

    pub fn section_mut(&mut self, kind: TableKind) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.kind == SectionKind::Table(kind))
    }

    /// Rows of the settings or variables table.
    pub fn rows(&self, kind: TableKind) -> &[Row] {
        match self.section(kind).map(|s| &s.body) {
            Some(SectionBody::Rows(rows)) => rows,
            _ => &[],
        }
    }

    pub fn rows_mut(&mut self, kind: TableKind) -> Option<&mut Vec<Row>> {
        match self.section_mut(kind).map(|s| &mut s.body) {
            Some(SectionBody::Rows(rows)) => Some(rows),
            _ => None,
        }
    }

    /// Tests or keywords.
    pub fn elements(&self, kind: TableKind) -> &[Element] {
        match self.section(kind).map(|s| &s.body) {
            Some(SectionBody::Elements { elements, .. }) => elements,
            _ => &[],
        }
    }

    pub fn elements_mut(&mut self, kind: TableKind) -> Option<&mut Vec<Element>> {
        match self.section_mut(kind).map(|s| &mut s.body) {
            Some(SectionBody::Elements { elements, .. }) => Some(elements),
            _ => None,
        }
    }

    pub fn tests(&self) -> &[Element] {
        self.elements(TableKind::TestCases)
    }

    pub fn keywords(&self) -> &[Element] {
        self.elements(TableKind::Keywords)
    }

    /// Locate an element and the table holding it.
    pub fn element(&self, id: ElementId) -> Option<(TableKind, usize, &Element)> {
        [TableKind::TestCases, TableKind::Keywords]
            .into_iter()
            .find_map(|kind| {
                self.elements(kind)
                    .iter()
                    .enumerate()
                    .find(|(_, e)| e.id == id)
                    .map(|(idx, e)| (kind, idx, e))
            })
    }

    pub fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        let (kind, index, _) = self.element(id)?;
        self.elements_mut(kind)?.get_mut(index)
    }

    pub fn keyword_named(&self, name: &str) -> Option<&Element> {
        self.keywords().iter().find(|k| k.name() == name)
    }

    pub fn imports(&self) -> Vec<Import> {
        logical_rows(self.rows(TableKind::Settings))
            .into_iter()
            .filter_map(|(row, cells)| {
                let kind = ImportKind::from_setting(cells.first()?)?;
                let name = cells.get(1).cloned().unwrap_or_default();
                let mut args = cells.get(2..).map(<[String]>::to_vec).unwrap_or_default();
                let alias_at = args.iter().position(|a| a == "WITH NAME" || a == "AS");
                let alias = alias_at.and_then(|at| {
                    let alias = args.get(at + 1).cloned();
                    args.truncate(at);
                    alias
                });
                Some(Import {
                    kind,
                    name,
                    args,
                    alias,
                    row,
                })
            })
            .collect()
    }

    pub fn variables(&self) -> Vec<Variable> {
        logical_rows(self.rows(TableKind::Variables))
            .into_iter()
            .filter_map(|(row, cells)| {
                let name = assignment_target(cells.first()?)?.to_string();
                Some(Variable {
                    name,
                    value: cells[1..].to_vec(),
                    row,
                })
            })
            .collect()
    }

    /// Values of a non-import setting such as `Documentation` or `Suite Setup`.
    pub fn setting(&self, name: &str) -> Option<Vec<String>> {
        let wanted = normalize_setting(name);
        logical_rows(self.rows(TableKind::Settings))
            .into_iter()
            .find(|(_, cells)| cells.first().is_some_and(|c| normalize_setting(c) == wanted))
            .map(|(_, cells)| cells[1..].to_vec())
    }

    /// Insert a new empty table at its conventional position. Returns the section index.
    pub fn ensure_section(&mut self, kind: TableKind, options: &CodecOptions) -> usize {
        if let Some(idx) = self
            .sections
            .iter()
            .position(|s| s.kind == SectionKind::Table(kind))
        {
            return idx;
        }
        let ctx = self.render_context(options);
        let at = self
            .sections
            .iter()
            .position(|s| s.kind.table().is_some_and(|t| t.rank() > kind.rank()))
            .unwrap_or(self.sections.len());
        self.sections.insert(at, Section::new_table(kind, &ctx));
        if kind == TableKind::TestCases && self.kind == DataFileKind::Resource {
            self.kind = DataFileKind::TestCase;
        }
        at
    }

    /// Remove an empty table. Returns false when it is missing or still has rows.
    pub fn remove_section(&mut self, kind: TableKind) -> bool {
        let Some(idx) = self
            .sections
            .iter()
            .position(|s| s.kind == SectionKind::Table(kind))
        else {
            return false;
        };
        if !self.sections[idx].is_empty() {
            return false;
        }
        self.sections.remove(idx);
        if kind == TableKind::TestCases && self.kind == DataFileKind::TestCase {
            self.kind = DataFileKind::Resource;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = "\
*** Settings ***
Library    Collections
Resource   common.resource
...        extra    WITH NAME    Common

*** Variables ***
${HOST}    localhost
@{USERS}   alice
...        bob

*** Test Cases ***
My Test    Log    inline
    Log    hello
    # comment
    ${x} =    Get Value

*** Keywords ***
My KW
    [Arguments]    ${a}
    ...    ${b}
    [Documentation]    Does things
    Log    ${a}
";

    fn parse(text: &str) -> DataFile {
        DataFile::parse(Path::new("suite.robot"), text, &CodecOptions::default()).unwrap()
    }

    #[test]
    fn reads_tables_and_writes_back_verbatim() {
        let file = parse(SUITE);
        assert_eq!(file.kind, DataFileKind::TestCase);
        assert_eq!(file.to_text(&CodecOptions::default()), SUITE);

        let test = &file.tests()[0];
        assert_eq!(test.name(), "My Test");
        assert_eq!(step_cells(&test.steps[0]), &["Log", "inline"]);
        assert_eq!(step_kind(&test.steps[2]), StepKind::Comment);
        assert_eq!(keyword_cell(&test.steps[3]), Some(1));

        let kw = file.keyword_named("My KW").unwrap();
        assert_eq!(kw.arguments(), vec!["${a}", "${b}"]);
        assert_eq!(kw.documentation(), "Does things");
    }

    #[test]
    fn imports_and_variables_fold_continuations() {
        let file = parse(SUITE);
        let imports = file.imports();
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[1].kind, ImportKind::Resource);
        assert_eq!(imports[1].args, vec!["extra"]);
        assert_eq!(imports[1].alias.as_deref(), Some("Common"));
        let variables = file.variables();
        assert_eq!(variables[1].name, "@{USERS}");
        assert_eq!(variables[1].value, vec!["alice", "bob"]);
        assert_eq!(variables[1].shape(), VariableShape::List);
    }

    #[test]
    fn editing_inline_step_rerenders_the_name_row() {
        let mut file = parse(SUITE);
        let id = file.tests()[0].id;
        let test = file.element_mut(id).unwrap();
        test.steps_mut()[0].set_cell(2, "changed");
        let text = file.to_text(&CodecOptions::default());
        assert!(text.contains("My Test\n  Log  changed\n    Log    hello\n"), "{text}");
    }

    #[test]
    fn element_mut_reaches_tests_and_keywords() {
        let mut file = parse(SUITE);
        let keyword = file.keywords()[0].id;
        assert!(file.element_mut(keyword).unwrap().set_name("Renamed KW"));
        assert_eq!(file.keywords()[0].name(), "Renamed KW");
        let test = file.tests()[0].id;
        assert_eq!(file.element_mut(test).unwrap().name(), "My Test");
        assert!(file.element_mut(ElementId::fresh()).is_none());
    }

    #[test]
    fn malformed_rows_report_line_numbers() {
        let options = CodecOptions::default();
        let err = DataFile::parse(
            Path::new("a.robot"),
            "*** Test Cases ***\n    Log    x\n",
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, RideError::Parse { line: 2, .. }));

        let err = DataFile::parse(
            Path::new("a.robot"),
            "*** Variables ***\n...    x\n",
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, RideError::Parse { line: 2, .. }));
    }

    #[test]
    fn unknown_headers_need_the_compat_flag() {
        let text = "*** Frobnicate ***\nwhatever  here\n";
        assert!(DataFile::parse(Path::new("a.robot"), text, &CodecOptions::default()).is_err());
        let options = CodecOptions {
            allow_unknown_sections: true,
            ..Default::default()
        };
        let file = DataFile::parse(Path::new("a.robot"), text, &options).unwrap();
        assert_eq!(
            file.sections[0].kind,
            SectionKind::Unknown("*** Frobnicate ***".to_string())
        );
        assert_eq!(file.to_text(&options), text);
    }

    #[test]
    fn init_files_cannot_hold_tests() {
        let err = DataFile::parse(
            Path::new("dir/__init__.robot"),
            "*** Test Cases ***\nT\n    Log  x\n",
            &CodecOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RideError::Data(_)));
    }

    #[test]
    fn new_sections_go_to_their_conventional_place() {
        let mut file = parse("*** Keywords ***\nK\n    No Operation\n");
        let options = CodecOptions::default();
        assert_eq!(file.ensure_section(TableKind::Settings, &options), 0);
        assert_eq!(file.ensure_section(TableKind::Keywords, &options), 1);
        assert!(file.to_text(&options).starts_with("*** Settings ***\n*** Keywords ***\n"));
        assert!(file.remove_section(TableKind::Settings));
        assert!(!file.remove_section(TableKind::Keywords));
    }
}
