//! Finding and renaming keyword and variable references across a project.
//!
//! The traversal visits every settings row (imports included), every variable row, every test
//! and keyword name and every step cell of every loaded data file. Keyword symbols match cells
//! in keyword position (step calls, `[Setup]`-style settings, suite/test setup settings and the
//! keyword arguments of `Run Keyword`-like built-ins) under the name matching rules of
//! [`names`](crate::namespace::names). Variable symbols match any cell containing the exact
//! `${name}` text; several references in one cell collapse into one occurrence with a count.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{
    controller::{Command, ControllerId, FileId, Project, Targeted},
    error::RideError,
    model::{
        is_variable_name, keyword_cell, normalize_setting, step_cells, DataFile, ImportKind,
        TableKind,
    },
    namespace::{builtin, names, names::KeywordMatcher, normalize_path, KeywordSource},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbol {
    Keyword(String),
    Variable(String),
}

impl Symbol {
    /// `${x}`, `@{x}` and `&{x}` are variables, anything else a keyword name.
    pub fn parse(text: &str) -> Symbol {
        let text = text.trim();
        if is_variable_name(text) {
            Symbol::Variable(text.to_string())
        } else {
            Symbol::Keyword(text.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Symbol::Keyword(name) | Symbol::Variable(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellRole {
    /// Name cell of a user keyword
    KeywordDefinition,
    /// Name cell of a test case
    TestName,
    /// Keyword called by a step or setting
    KeywordCall,
    /// Argument of a `Run Keyword`-like call that names a keyword
    KeywordArgument,
    /// Name cell of an import setting
    Import,
    Other,
}

impl CellRole {
    fn names_keyword(&self) -> bool {
        matches!(
            self,
            CellRole::KeywordDefinition | CellRole::KeywordCall | CellRole::KeywordArgument
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub file: FileId,
    pub path: PathBuf,
    /// Test, keyword or table holding the cell
    pub item: String,
    /// Controller that owns the cell; `row`/`col` address it the way `SetCell` does
    pub target: ControllerId,
    pub row: usize,
    pub col: usize,
    pub role: CellRole,
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub file: FileId,
    pub path: PathBuf,
    /// Settings row holding the import
    pub row: usize,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Cell {
    item: String,
    target: ControllerId,
    row: usize,
    col: usize,
    role: CellRole,
    text: String,
}

const KEYWORD_SETTINGS: &[&str] = &[
    "suitesetup",
    "suiteteardown",
    "testsetup",
    "testteardown",
    "tasksetup",
    "taskteardown",
    "testtemplate",
    "tasktemplate",
];

fn file_cells(id: FileId, datafile: &DataFile) -> Vec<Cell> {
    let mut cells = Vec::new();
    let settings = TableKind::Settings;
    for (r, row) in datafile.rows(settings).iter().enumerate() {
        let setting = normalize_setting(row.cell(0));
        let is_import = ImportKind::from_setting(row.cell(0)).is_some();
        for (c, text) in row.cells.iter().enumerate() {
            let role = match c {
                1 if KEYWORD_SETTINGS.contains(&setting.as_str()) => CellRole::KeywordCall,
                1 if is_import => CellRole::Import,
                _ => CellRole::Other,
            };
            cells.push(Cell {
                item: settings.to_string(),
                target: ControllerId::Table(id, settings),
                row: r,
                col: c,
                role,
                text: text.clone(),
            });
        }
    }
    let variables = TableKind::Variables;
    for (r, row) in datafile.rows(variables).iter().enumerate() {
        for (c, text) in row.cells.iter().enumerate() {
            cells.push(Cell {
                item: variables.to_string(),
                target: ControllerId::Table(id, variables),
                row: r,
                col: c,
                role: CellRole::Other,
                text: text.clone(),
            });
        }
    }
    for kind in [TableKind::TestCases, TableKind::Keywords] {
        for (index, element) in datafile.elements(kind).iter().enumerate() {
            cells.push(Cell {
                item: element.name().to_string(),
                target: ControllerId::Table(id, kind),
                row: index,
                col: 0,
                role: if kind == TableKind::Keywords {
                    CellRole::KeywordDefinition
                } else {
                    CellRole::TestName
                },
                text: element.name().to_string(),
            });
            for (r, row) in element.steps.iter().enumerate() {
                let step = step_cells(row);
                let call = keyword_cell(row);
                let arguments_from = call.and_then(|k| {
                    builtin::keyword_argument_start(&step[k]).map(|start| k + 1 + start)
                });
                for (c, text) in step.iter().enumerate() {
                    let role = if Some(c) == call {
                        CellRole::KeywordCall
                    } else if arguments_from.is_some_and(|from| c >= from) {
                        CellRole::KeywordArgument
                    } else {
                        CellRole::Other
                    };
                    cells.push(Cell {
                        item: element.name().to_string(),
                        target: ControllerId::Element(id, element.id),
                        row: r,
                        col: c,
                        role,
                        text: text.clone(),
                    });
                }
            }
        }
    }
    cells
}

enum Matcher {
    Keyword(KeywordMatcher),
    Variable(String),
}

impl Matcher {
    fn new(symbol: &Symbol) -> Self {
        match symbol {
            Symbol::Keyword(name) => Matcher::Keyword(KeywordMatcher::new(name)),
            Symbol::Variable(name) => Matcher::Variable(name.clone()),
        }
    }

    fn count(&self, cell: &Cell) -> usize {
        match self {
            Matcher::Keyword(matcher) => {
                let hit = cell.role.names_keyword()
                    && (matcher.matches(&cell.text)
                        || names::split_qualified(&cell.text)
                            .into_iter()
                            .any(|(_, rest)| matcher.matches(rest)));
                usize::from(hit)
            }
            Matcher::Variable(name) => cell.text.matches(name.as_str()).count(),
        }
    }
}

/// Lazily enumerate the occurrences of `symbol`, file by file.
pub fn find<'a>(project: &'a Project, symbol: &Symbol) -> impl Iterator<Item = Occurrence> + 'a {
    let matcher = Matcher::new(symbol);
    project
        .controllers()
        .filter_map(|c| c.datafile().map(|d| (c.id(), d)))
        .flat_map(|(id, datafile)| {
            file_cells(id, datafile)
                .into_iter()
                .map(move |cell| (id, datafile.source.clone(), cell))
        })
        .filter_map(move |(file, path, cell)| {
            let count = matcher.count(&cell);
            (count > 0).then(|| Occurrence {
                file,
                path,
                item: cell.item,
                target: cell.target,
                row: cell.row,
                col: cell.col,
                role: cell.role,
                text: cell.text,
                count,
            })
        })
}

/// Settings rows importing the resource file `resource`.
pub fn resource_usages(project: &Project, resource: FileId) -> Vec<ResourceUsage> {
    let Some(target) = project.controller(resource).map(|c| normalize_path(c.path())) else {
        return Vec::new();
    };
    let mut usages = Vec::new();
    for controller in project.controllers() {
        let Some(datafile) = controller.datafile() else {
            continue;
        };
        for import in datafile.imports() {
            if import.kind != ImportKind::Resource {
                continue;
            }
            let resolved = project
                .namespace()
                .resolve_import_path(datafile, &import.name);
            if resolved.as_deref() == Some(target.as_path()) {
                usages.push(ResourceUsage {
                    file: controller.id(),
                    path: datafile.source.clone(),
                    row: import.row,
                    name: import.name.clone(),
                });
            }
        }
    }
    usages
}

/// Cell edits renaming the keyword defined at `(file, index)` and every call of it.
pub fn rename_keyword_commands(
    project: &Project,
    file: FileId,
    index: usize,
    new_name: &str,
) -> Result<Vec<Targeted>, RideError> {
    let datafile = project
        .datafile(file)
        .ok_or_else(|| RideError::NotFound(format!("data file {file}")))?;
    let keyword = datafile
        .keywords()
        .get(index)
        .ok_or_else(|| RideError::NotFound(format!("keyword #{index} in {file}")))?;
    let definition = ControllerId::Table(file, TableKind::Keywords);
    let matcher = KeywordMatcher::new(keyword.name());
    let mut commands = vec![Targeted::new(
        definition,
        Command::SetCell {
            row: index,
            col: 0,
            value: new_name.to_string(),
        },
    )];
    let renamed = keyword.id;
    for occurrence in find(project, &Symbol::Keyword(keyword.name().to_string())) {
        if occurrence.role == CellRole::KeywordDefinition {
            continue;
        }
        // Calls bound to another keyword of the same name (a local override, a library) stay.
        let bound_elsewhere = project
            .find_keyword(occurrence.file, &occurrence.text)
            .is_some_and(|found| match found.source {
                KeywordSource::Local { element, .. } | KeywordSource::Resource { element, .. } => {
                    element != renamed
                }
                KeywordSource::Library { .. } | KeywordSource::BuiltIn => true,
            });
        if bound_elsewhere {
            tracing::debug!(
                "[Occurrences] Keeping {} at {} row {}: bound to another keyword",
                occurrence.text,
                occurrence.target,
                occurrence.row
            );
            continue;
        }
        if let Some(value) = matcher.rename_call(&occurrence.text, new_name) {
            commands.push(Targeted::new(
                occurrence.target,
                Command::SetCell {
                    row: occurrence.row,
                    col: occurrence.col,
                    value,
                },
            ));
        }
    }
    Ok(commands)
}

/// Cell edits replacing every `old` variable reference with `new`.
pub fn rename_variable_commands(project: &Project, old: &str, new: &str) -> Vec<Targeted> {
    find(project, &Symbol::Variable(old.to_string()))
        .map(|occurrence| {
            Targeted::new(
                occurrence.target,
                Command::SetCell {
                    row: occurrence.row,
                    col: occurrence.col,
                    value: occurrence.text.replace(old, new),
                },
            )
        })
        .collect()
}
