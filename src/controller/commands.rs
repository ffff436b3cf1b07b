//! Undoable commands and the handlers that apply them to a [`Project`].
//!
//! Every handler validates its arguments before touching the model and returns the inverse of
//! what it did (`Ok(Some(inverse))`), or `Ok(None)` when the command was a no-op. A failing
//! command leaves the model untouched: composites roll back the steps they already applied.

use serde::{Deserialize, Serialize};
use std::mem;

use super::{ControllerId, Project};
use crate::{
    codec::Row,
    error::RideError,
    event::{topics, Event, EventData},
    model::{is_variable_name, step_cells, Element, ImportKind, TableKind},
    namespace::names,
    occurrences::{self, Occurrence, ResourceUsage, Symbol},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Set one cell. On test/keyword controllers `col` indexes the step cells after the
    /// indentation; on the test case and keyword tables only column 0 (the name) is editable.
    SetCell { row: usize, col: usize, value: String },
    ClearCell { row: usize, col: usize },
    AddRow { index: usize, cells: Vec<String> },
    DeleteRows { rows: Vec<usize> },
    MoveRowsUp { rows: Vec<usize> },
    MoveRowsDown { rows: Vec<usize> },
    /// Rename a keyword defined in the target file and every call of it in the project
    RenameKeyword { old: String, new: String },
    /// Rename a variable everywhere in the project
    RenameVariable { old: String, new: String },
    AddImport {
        kind: ImportKind,
        name: String,
        args: Vec<String>,
    },
    FindOccurrences { symbol: Symbol },
    FindResourceUsages,
    /// Drop cached namespace answers and library introspection results
    Refresh,
    /// Commands applied in order as one undo step
    Composite {
        name: String,
        commands: Vec<Targeted>,
    },
    // Inverses recorded by the handlers above.
    InsertRows { rows: Vec<(usize, Row)> },
    ReplaceRows { rows: Vec<(usize, Row)> },
    InsertElements { elements: Vec<(usize, Element)> },
    ReplaceElement { element: Element },
    EnsureSection { kind: TableKind },
    RemoveSection { kind: TableKind },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetCell { .. } => "SetCell",
            Command::ClearCell { .. } => "ClearCell",
            Command::AddRow { .. } => "AddRow",
            Command::DeleteRows { .. } => "DeleteRows",
            Command::MoveRowsUp { .. } => "MoveRowsUp",
            Command::MoveRowsDown { .. } => "MoveRowsDown",
            Command::RenameKeyword { .. } => "RenameKeyword",
            Command::RenameVariable { .. } => "RenameVariable",
            Command::AddImport { .. } => "AddImport",
            Command::FindOccurrences { .. } => "FindOccurrences",
            Command::FindResourceUsages => "FindResourceUsages",
            Command::Refresh => "Refresh",
            Command::Composite { .. } => "Composite",
            Command::InsertRows { .. } => "InsertRows",
            Command::ReplaceRows { .. } => "ReplaceRows",
            Command::InsertElements { .. } => "InsertElements",
            Command::ReplaceElement { .. } => "ReplaceElement",
            Command::EnsureSection { .. } => "EnsureSection",
            Command::RemoveSection { .. } => "RemoveSection",
        }
    }

    /// Queries and cache control: executed, never recorded on an undo stack.
    pub fn is_side_effect_only(&self) -> bool {
        matches!(
            self,
            Command::FindOccurrences { .. } | Command::FindResourceUsages | Command::Refresh
        )
    }
}

/// A command together with the controller it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targeted {
    pub target: ControllerId,
    pub command: Command,
}

impl Targeted {
    pub fn new(target: ControllerId, command: Command) -> Self {
        Targeted { target, command }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied,
    NoChange,
    Occurrences(Vec<Occurrence>),
    ResourceUsages(Vec<ResourceUsage>),
    Failed(RideError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn error(&self) -> Option<&RideError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        match self {
            Outcome::Occurrences(found) => found,
            _ => &[],
        }
    }
}

fn out_of_bounds(row: usize, len: usize) -> RideError {
    RideError::Command(format!("row {row} is out of bounds ({len} rows)"))
}

fn check_rows(rows: &[usize], len: usize) -> Result<(), RideError> {
    if rows.is_empty() {
        return Err(RideError::Command("no rows given".to_string()));
    }
    if rows.windows(2).any(|w| w[0] >= w[1]) {
        return Err(RideError::Command(
            "row indices must be strictly increasing".to_string(),
        ));
    }
    match rows.last() {
        Some(last) if *last >= len => Err(out_of_bounds(*last, len)),
        _ => Ok(()),
    }
}

fn check_move_up(rows: &[usize], len: usize) -> Result<(), RideError> {
    check_rows(rows, len)?;
    if rows[0] == 0 {
        return Err(RideError::Command("cannot move the first row up".to_string()));
    }
    Ok(())
}

fn check_move_down(rows: &[usize], len: usize) -> Result<(), RideError> {
    check_rows(rows, len)?;
    if rows.last().is_some_and(|last| last + 1 >= len) {
        return Err(RideError::Command("cannot move the last row down".to_string()));
    }
    Ok(())
}

/// Entries are inserted in order, so each index may point one past the rows inserted so far.
fn check_insert<T>(entries: &[(usize, T)], len: usize) -> Result<(), RideError> {
    if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(RideError::Command(
            "row indices must be strictly increasing".to_string(),
        ));
    }
    for (inserted, (index, _)) in entries.iter().enumerate() {
        if *index > len + inserted {
            return Err(out_of_bounds(*index, len + inserted));
        }
    }
    Ok(())
}

fn check_replace<T>(entries: &[(usize, T)], len: usize) -> Result<(), RideError> {
    match entries.iter().find(|(index, _)| *index >= len) {
        Some((index, _)) => Err(out_of_bounds(*index, len)),
        None => Ok(()),
    }
}

fn move_up<T>(items: &mut [T], rows: &[usize]) -> Vec<usize> {
    for &r in rows {
        items.swap(r, r - 1);
    }
    rows.iter().map(|r| r - 1).collect()
}

fn move_down<T>(items: &mut [T], rows: &[usize]) -> Vec<usize> {
    for &r in rows.iter().rev() {
        items.swap(r, r + 1);
    }
    rows.iter().map(|r| r + 1).collect()
}

fn remove<T>(items: &mut Vec<T>, rows: &[usize]) -> Vec<(usize, T)> {
    let mut removed: Vec<(usize, T)> = rows.iter().rev().map(|&r| (r, items.remove(r))).collect();
    removed.reverse();
    removed
}

fn insert<T>(items: &mut Vec<T>, entries: Vec<(usize, T)>) -> Vec<usize> {
    entries
        .into_iter()
        .map(|(index, item)| {
            items.insert(index, item);
            index
        })
        .collect()
}

fn replace<T>(items: &mut [T], entries: Vec<(usize, T)>) -> Vec<(usize, T)> {
    entries
        .into_iter()
        .map(|(index, item)| (index, mem::replace(&mut items[index], item)))
        .collect()
}

fn unsupported(command: &Command, target: &str) -> RideError {
    RideError::Command(format!("{} cannot be applied to {target}", command.name()))
}

fn check_variable_cell(value: &str) -> Result<(), RideError> {
    let value = value.trim();
    let name = value.trim_end_matches('=').trim_end();
    if value.is_empty() || value.starts_with('#') || value == "..." || is_variable_name(name) {
        return Ok(());
    }
    Err(RideError::Data(format!("invalid variable name '{value}'")))
}

/// Plain rows of the settings or variables table.
fn apply_to_rows(
    rows: &mut Vec<Row>,
    kind: TableKind,
    command: Command,
) -> Result<Option<Command>, RideError> {
    let inverse = match command {
        Command::SetCell { row, col, value } => {
            let current = rows.get(row).ok_or_else(|| out_of_bounds(row, rows.len()))?;
            if kind == TableKind::Variables && col == 0 {
                check_variable_cell(&value)?;
            }
            if current.cell(col) == value {
                return Ok(None);
            }
            let previous = current.clone();
            rows[row].set_cell(col, &value);
            Command::ReplaceRows {
                rows: vec![(row, previous)],
            }
        }
        Command::AddRow { index, cells } => {
            if index > rows.len() {
                return Err(out_of_bounds(index, rows.len()));
            }
            if kind == TableKind::Variables {
                check_variable_cell(cells.first().map(String::as_str).unwrap_or(""))?;
            }
            rows.insert(index, Row::new(cells));
            Command::DeleteRows { rows: vec![index] }
        }
        Command::DeleteRows { rows: indices } => {
            check_rows(&indices, rows.len())?;
            Command::InsertRows {
                rows: remove(rows, &indices),
            }
        }
        Command::MoveRowsUp { rows: indices } => {
            check_move_up(&indices, rows.len())?;
            Command::MoveRowsDown {
                rows: move_up(rows, &indices),
            }
        }
        Command::MoveRowsDown { rows: indices } => {
            check_move_down(&indices, rows.len())?;
            Command::MoveRowsUp {
                rows: move_down(rows, &indices),
            }
        }
        Command::InsertRows { rows: entries } => {
            check_insert(&entries, rows.len())?;
            Command::DeleteRows {
                rows: insert(rows, entries),
            }
        }
        Command::ReplaceRows { rows: entries } => {
            check_replace(&entries, rows.len())?;
            Command::ReplaceRows {
                rows: replace(rows, entries),
            }
        }
        other => return Err(unsupported(&other, &format!("the {kind} table"))),
    };
    Ok(Some(inverse))
}

/// Steps are stored with their indentation cell; commands address the cells after it.
fn set_step_cell(row: &mut Row, col: usize, value: &str) {
    if row.cells.first().is_none_or(|c| !c.is_empty()) {
        row.cells.insert(0, String::new());
        row.touch();
    }
    row.set_cell(col + 1, value);
}

fn step_row(cells: Vec<String>) -> Row {
    let mut full = Vec::with_capacity(cells.len() + 1);
    full.push(String::new());
    full.extend(cells);
    Row::new(full)
}

/// Steps of one test or keyword. Everything is validated against `element.steps` first, since
/// [`Element::steps_mut`] re-renders an inline name row.
fn apply_to_steps(element: &mut Element, command: Command) -> Result<Option<Command>, RideError> {
    let len = element.steps.len();
    match &command {
        Command::SetCell { row, col, value } => {
            let current = element.steps.get(*row).ok_or_else(|| out_of_bounds(*row, len))?;
            let existing = step_cells(current).get(*col).map(String::as_str).unwrap_or("");
            if existing == value {
                return Ok(None);
            }
        }
        Command::AddRow { index, .. } if *index > len => return Err(out_of_bounds(*index, len)),
        Command::AddRow { .. } => {}
        Command::DeleteRows { rows } => check_rows(rows, len)?,
        Command::MoveRowsUp { rows } => check_move_up(rows, len)?,
        Command::MoveRowsDown { rows } => check_move_down(rows, len)?,
        Command::InsertRows { rows } => check_insert(rows, len)?,
        Command::ReplaceRows { rows } => check_replace(rows, len)?,
        other => return Err(unsupported(other, &format!("'{}'", element.name()))),
    }
    // An inline name row cannot be restored row by row.
    let snapshot = element.is_inline().then(|| element.clone());
    let steps = element.steps_mut();
    let inverse = match command {
        Command::SetCell { row, col, value } => {
            let previous = steps[row].clone();
            set_step_cell(&mut steps[row], col, &value);
            Command::ReplaceRows {
                rows: vec![(row, previous)],
            }
        }
        Command::AddRow { index, cells } => {
            steps.insert(index, step_row(cells));
            Command::DeleteRows { rows: vec![index] }
        }
        Command::DeleteRows { rows } => Command::InsertRows {
            rows: remove(steps, &rows),
        },
        Command::MoveRowsUp { rows } => Command::MoveRowsDown {
            rows: move_up(steps, &rows),
        },
        Command::MoveRowsDown { rows } => Command::MoveRowsUp {
            rows: move_down(steps, &rows),
        },
        Command::InsertRows { rows } => Command::DeleteRows {
            rows: insert(steps, rows),
        },
        Command::ReplaceRows { rows } => Command::ReplaceRows {
            rows: replace(steps, rows),
        },
        other => return Err(RideError::Internal(format!("{} was not validated", other.name()))),
    };
    Ok(Some(match snapshot {
        Some(element) => Command::ReplaceElement { element },
        None => inverse,
    }))
}

fn check_element_name(
    elements: &[Element],
    kind: TableKind,
    name: &str,
    skip: Option<usize>,
) -> Result<(), RideError> {
    if name.trim().is_empty() {
        return Err(RideError::Data(format!("{kind} names cannot be empty")));
    }
    if kind == TableKind::Keywords {
        let taken = elements
            .iter()
            .enumerate()
            .any(|(idx, e)| Some(idx) != skip && names::eq(e.name(), name));
        if taken {
            return Err(RideError::Data(format!(
                "keyword '{name}' already exists in this file"
            )));
        }
    }
    Ok(())
}

/// The test case or keyword table: one row per element, addressed by its name.
fn apply_to_elements(
    elements: &mut Vec<Element>,
    kind: TableKind,
    command: Command,
) -> Result<Option<Command>, RideError> {
    let inverse = match command {
        Command::SetCell { row, col, value } => {
            if col != 0 {
                return Err(RideError::Command(format!(
                    "only names can be edited in the {kind} table"
                )));
            }
            let current = elements
                .get(row)
                .ok_or_else(|| out_of_bounds(row, elements.len()))?;
            if current.name() == value {
                return Ok(None);
            }
            check_element_name(elements, kind, &value, Some(row))?;
            let previous = elements[row].clone();
            elements[row].set_name(&value);
            Command::ReplaceElement { element: previous }
        }
        Command::AddRow { index, cells } => {
            if index > elements.len() {
                return Err(out_of_bounds(index, elements.len()));
            }
            check_element_name(elements, kind, cells.first().map(String::as_str).unwrap_or(""), None)?;
            elements.insert(index, Element::from_cells(&cells));
            Command::DeleteRows { rows: vec![index] }
        }
        Command::DeleteRows { rows } => {
            check_rows(&rows, elements.len())?;
            Command::InsertElements {
                elements: remove(elements, &rows),
            }
        }
        Command::MoveRowsUp { rows } => {
            check_move_up(&rows, elements.len())?;
            Command::MoveRowsDown {
                rows: move_up(elements, &rows),
            }
        }
        Command::MoveRowsDown { rows } => {
            check_move_down(&rows, elements.len())?;
            Command::MoveRowsUp {
                rows: move_down(elements, &rows),
            }
        }
        Command::InsertElements { elements: entries } => {
            check_insert(&entries, elements.len())?;
            Command::DeleteRows {
                rows: insert(elements, entries),
            }
        }
        other => return Err(unsupported(&other, &format!("the {kind} table"))),
    };
    Ok(Some(inverse))
}

impl Project {
    /// Run `command` against `target`. Modifying commands that change something push their
    /// inverse on the target's undo stack and clear its redo stack.
    pub fn execute(&mut self, target: ControllerId, command: Command) -> Outcome {
        if command.is_side_effect_only() {
            return self.query(target, command);
        }
        let name = command.name();
        match self.apply(target, command) {
            Ok(Some(inverse)) => {
                tracing::debug!("[Controller] {} applied to {}", name, target);
                self.history_mut(target).record(inverse);
                Outcome::Applied
            }
            Ok(None) => Outcome::NoChange,
            Err(e) => {
                tracing::debug!("[Controller] {} on {} failed: {}", name, target, e);
                Outcome::Failed(e)
            }
        }
    }

    /// Revert the last command executed on `target`. Returns false when there is nothing to
    /// undo.
    pub fn undo(&mut self, target: ControllerId) -> Result<bool, RideError> {
        let Some(inverse) = self.history_mut(target).pop_undo() else {
            return Ok(false);
        };
        match self.apply(target, inverse.clone()) {
            Ok(redo) => {
                if let Some(redo) = redo {
                    self.history_mut(target).push_redo(redo);
                }
                self.publish(Event::new(
                    topics::CONTROLLER_UNDONE,
                    EventData::Modified {
                        controller: target,
                        command: inverse.name().to_string(),
                    },
                ));
                Ok(true)
            }
            Err(e) => {
                self.history_mut(target).push_undo(inverse);
                Err(e)
            }
        }
    }

    pub fn redo(&mut self, target: ControllerId) -> Result<bool, RideError> {
        let Some(command) = self.history_mut(target).pop_redo() else {
            return Ok(false);
        };
        match self.apply(target, command.clone()) {
            Ok(undo) => {
                if let Some(undo) = undo {
                    self.history_mut(target).push_undo(undo);
                }
                self.publish(Event::new(
                    topics::CONTROLLER_REDONE,
                    EventData::Modified {
                        controller: target,
                        command: command.name().to_string(),
                    },
                ));
                Ok(true)
            }
            Err(e) => {
                self.history_mut(target).push_redo(command);
                Err(e)
            }
        }
    }

    fn query(&mut self, target: ControllerId, command: Command) -> Outcome {
        match command {
            Command::FindOccurrences { symbol } => {
                Outcome::Occurrences(occurrences::find(self, &symbol).collect())
            }
            Command::FindResourceUsages => {
                Outcome::ResourceUsages(occurrences::resource_usages(self, target.file()))
            }
            Command::Refresh => {
                self.namespace.flush();
                self.publish(Event::bare(topics::NAMESPACE_FLUSHED));
                Outcome::NoChange
            }
            other => Outcome::Failed(RideError::Internal(format!(
                "{} is not a query",
                other.name()
            ))),
        }
    }

    pub(crate) fn apply(
        &mut self,
        target: ControllerId,
        command: Command,
    ) -> Result<Option<Command>, RideError> {
        if self.controller(target.file()).is_none() {
            return Err(RideError::NotFound(format!("controller {target}")));
        }
        if let Command::AddRow { .. } = &command {
            if let Some(kind) = self.missing_table(target) {
                return self.apply_composite(
                    "AddRow".to_string(),
                    vec![
                        Targeted::new(target, Command::EnsureSection { kind }),
                        Targeted::new(target, command),
                    ],
                );
            }
        }
        match command {
            Command::Composite { name, commands } => self.apply_composite(name, commands),
            Command::RenameKeyword { old, new } => self.rename_keyword(target, &old, &new),
            Command::RenameVariable { old, new } => self.rename_variable(&old, &new),
            Command::AddImport { kind, name, args } => self.add_import(target, kind, name, args),
            command if command.is_side_effect_only() => Err(RideError::Internal(format!(
                "{} has no inverse",
                command.name()
            ))),
            command => {
                let name = command.name();
                let inverse = self.apply_leaf(target, command)?;
                if inverse.is_some() {
                    self.touch(target, name);
                }
                Ok(inverse)
            }
        }
    }

    fn missing_table(&self, target: ControllerId) -> Option<TableKind> {
        match target {
            ControllerId::Table(file, kind) => self
                .datafile(file)
                .is_some_and(|d| d.section(kind).is_none())
                .then_some(kind),
            _ => None,
        }
    }

    fn apply_leaf(
        &mut self,
        target: ControllerId,
        command: Command,
    ) -> Result<Option<Command>, RideError> {
        if let Command::ClearCell { row, col } = command {
            let value = String::new();
            return self.apply_leaf(target, Command::SetCell { row, col, value });
        }
        let codec = self.options.codec.clone();
        let datafile = self.datafile_mut(target.file())?;
        match (target, command) {
            (_, Command::EnsureSection { kind }) => {
                if datafile.section(kind).is_some() {
                    return Ok(None);
                }
                datafile.ensure_section(kind, &codec);
                Ok(Some(Command::RemoveSection { kind }))
            }
            (_, Command::RemoveSection { kind }) => {
                if datafile.section(kind).is_none() {
                    return Ok(None);
                }
                if !datafile.remove_section(kind) {
                    return Err(RideError::Data(format!("the {kind} table is not empty")));
                }
                Ok(Some(Command::EnsureSection { kind }))
            }
            (_, Command::ReplaceElement { element }) => {
                let slot = datafile
                    .element_mut(element.id)
                    .ok_or_else(|| RideError::NotFound(format!("test or keyword {}", element.id)))?;
                let previous = mem::replace(slot, element);
                Ok(Some(Command::ReplaceElement { element: previous }))
            }
            (ControllerId::File(_), other) => Err(unsupported(&other, "a data file")),
            (ControllerId::Table(_, kind), command) if kind.has_elements() => {
                let elements = datafile
                    .elements_mut(kind)
                    .ok_or_else(|| RideError::NotFound(format!("{kind} table")))?;
                apply_to_elements(elements, kind, command)
            }
            (ControllerId::Table(_, kind), command) => {
                let rows = datafile
                    .rows_mut(kind)
                    .ok_or_else(|| RideError::NotFound(format!("{kind} table")))?;
                apply_to_rows(rows, kind, command)
            }
            (ControllerId::Element(_, id), command) => {
                let element = datafile
                    .element_mut(id)
                    .ok_or_else(|| RideError::NotFound(format!("test or keyword {id}")))?;
                apply_to_steps(element, command)
            }
        }
    }

    /// Apply `commands` in order. On failure the steps already applied are reverted and the
    /// error is returned. The inverse replays the recorded inverses in reverse order.
    fn apply_composite(
        &mut self,
        name: String,
        commands: Vec<Targeted>,
    ) -> Result<Option<Command>, RideError> {
        let mut applied: Vec<Targeted> = Vec::new();
        for Targeted { target, command } in commands {
            match self.apply(target, command) {
                Ok(Some(inverse)) => applied.push(Targeted::new(target, inverse)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        "[Controller] {} failed, rolling back {} step(s): {}",
                        name,
                        applied.len(),
                        e
                    );
                    for step in applied.into_iter().rev() {
                        if let Err(rollback) = self.apply(step.target, step.command) {
                            tracing::error!("[Controller] Rollback of {} failed: {}", name, rollback);
                        }
                    }
                    return Err(e);
                }
            }
        }
        if applied.is_empty() {
            return Ok(None);
        }
        applied.reverse();
        Ok(Some(Command::Composite {
            name,
            commands: applied,
        }))
    }

    fn rename_keyword(
        &mut self,
        target: ControllerId,
        old: &str,
        new: &str,
    ) -> Result<Option<Command>, RideError> {
        let file = target.file();
        let datafile = self
            .datafile(file)
            .ok_or_else(|| RideError::NotFound(format!("data file {file}")))?;
        let index = datafile
            .keywords()
            .iter()
            .position(|k| names::eq(k.name(), old))
            .ok_or_else(|| {
                RideError::Resolve(format!("{old} in {}", datafile.source.display()))
            })?;
        if new.trim().is_empty() {
            return Err(RideError::Data("keyword names cannot be empty".to_string()));
        }
        let commands = occurrences::rename_keyword_commands(self, file, index, new)?;
        let inverse = self.apply_composite("RenameKeyword".to_string(), commands)?;
        if inverse.is_some() {
            self.publish(Event::new(
                topics::KEYWORD_RENAMED,
                EventData::Renamed {
                    old: old.to_string(),
                    new: new.to_string(),
                },
            ));
        }
        Ok(inverse)
    }

    fn rename_variable(&mut self, old: &str, new: &str) -> Result<Option<Command>, RideError> {
        for name in [old, new] {
            if !is_variable_name(name) {
                return Err(RideError::Data(format!("invalid variable name '{name}'")));
            }
        }
        if old == new {
            return Ok(None);
        }
        let commands = occurrences::rename_variable_commands(self, old, new);
        let inverse = self.apply_composite("RenameVariable".to_string(), commands)?;
        if inverse.is_some() {
            self.publish(Event::new(
                topics::VARIABLE_RENAMED,
                EventData::Renamed {
                    old: old.to_string(),
                    new: new.to_string(),
                },
            ));
        }
        Ok(inverse)
    }

    /// Append an import after the last existing one, or after the last settings row.
    fn add_import(
        &mut self,
        target: ControllerId,
        kind: ImportKind,
        name: String,
        args: Vec<String>,
    ) -> Result<Option<Command>, RideError> {
        let file = target.file();
        let datafile = self
            .datafile(file)
            .ok_or_else(|| RideError::NotFound(format!("data file {file}")))?;
        if name.trim().is_empty() {
            return Err(RideError::Data("import name cannot be empty".to_string()));
        }
        let rows = datafile.rows(TableKind::Settings);
        let index = match datafile.imports().last() {
            Some(last) => {
                let mut index = last.row + 1;
                while index < rows.len() && rows[index].is_continuation() {
                    index += 1;
                }
                index
            }
            None => rows
                .iter()
                .rposition(|r| !r.is_blank())
                .map(|i| i + 1)
                .unwrap_or(0),
        };
        let mut cells = vec![kind.to_string(), name.clone()];
        cells.extend(args);
        let table = ControllerId::Table(file, TableKind::Settings);
        let inverse = self.apply_composite(
            "AddImport".to_string(),
            vec![Targeted::new(table, Command::AddRow { index, cells })],
        )?;
        self.publish(Event::new(
            topics::IMPORT_ADDED,
            EventData::Import {
                kind: kind.to_string(),
                name,
            },
        ));
        Ok(inverse)
    }

    /// Record a modification: dirty flags, generation bump and a `ride.controller.modified`
    /// event.
    fn touch(&mut self, target: ControllerId, command: &str) {
        let Some(controller) = self.files.get_mut(&target.file()) else {
            return;
        };
        controller.dirty = true;
        controller.generation += 1;
        match target {
            ControllerId::Table(_, kind) => {
                controller.dirty_tables.insert(kind);
            }
            ControllerId::Element(_, id) => {
                controller.dirty_elements.insert(id);
            }
            ControllerId::File(_) => {}
        }
        self.publish(Event::new(
            topics::CONTROLLER_MODIFIED,
            EventData::Modified {
                controller: target,
                command: command.to_string(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_are_inverse_of_each_other() {
        let mut items = vec!['a', 'b', 'c', 'd'];
        check_move_down(&[1, 2], items.len()).unwrap();
        let back = move_down(&mut items, &[1, 2]);
        assert_eq!(items, vec!['a', 'd', 'b', 'c']);
        assert_eq!(back, vec![2, 3]);
        move_up(&mut items, &back);
        assert_eq!(items, vec!['a', 'b', 'c', 'd']);
        assert!(check_move_up(&[0, 1], 4).is_err());
        assert!(check_move_down(&[3], 4).is_err());
        assert!(check_rows(&[2, 1], 4).is_err());
    }

    #[test]
    fn remove_then_insert_restores_order() {
        let mut items = vec![1, 2, 3, 4, 5];
        let removed = remove(&mut items, &[0, 2, 4]);
        assert_eq!(items, vec![2, 4]);
        check_insert(&removed, items.len()).unwrap();
        insert(&mut items, removed);
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn variable_cells_are_validated() {
        let mut rows = vec![Row::new(["${A}", "1"])];
        let err = apply_to_rows(
            &mut rows,
            TableKind::Variables,
            Command::SetCell {
                row: 0,
                col: 0,
                value: "A".to_string(),
            },
        );
        assert!(matches!(err, Err(RideError::Data(_))));
        assert_eq!(rows[0].cells, vec!["${A}", "1"]);
        let inverse = apply_to_rows(
            &mut rows,
            TableKind::Variables,
            Command::SetCell {
                row: 0,
                col: 0,
                value: "${B} =".to_string(),
            },
        )
        .unwrap();
        assert!(matches!(inverse, Some(Command::ReplaceRows { .. })));
    }

    #[test]
    fn duplicate_keyword_names_are_rejected() {
        let mut elements = vec![Element::new("Open Browser"), Element::new("Close")];
        let err = apply_to_elements(
            &mut elements,
            TableKind::Keywords,
            Command::SetCell {
                row: 1,
                col: 0,
                value: "open_browser".to_string(),
            },
        );
        assert!(matches!(err, Err(RideError::Data(_))));
        let err = apply_to_elements(
            &mut elements,
            TableKind::Keywords,
            Command::SetCell {
                row: 1,
                col: 1,
                value: "x".to_string(),
            },
        );
        assert!(matches!(err, Err(RideError::Command(_))));
    }

    #[test]
    fn step_edits_keep_indentation() {
        let mut element = Element::new("Test");
        let inverse = apply_to_steps(
            &mut element,
            Command::AddRow {
                index: 0,
                cells: vec!["Log".to_string(), "hi".to_string()],
            },
        )
        .unwrap();
        assert_eq!(inverse, Some(Command::DeleteRows { rows: vec![0] }));
        assert_eq!(element.steps[0].cells, vec!["", "Log", "hi"]);
        apply_to_steps(
            &mut element,
            Command::SetCell {
                row: 0,
                col: 1,
                value: "bye".to_string(),
            },
        )
        .unwrap();
        assert_eq!(element.steps[0].cells, vec!["", "Log", "bye"]);
        let unchanged = apply_to_steps(
            &mut element,
            Command::SetCell {
                row: 0,
                col: 1,
                value: "bye".to_string(),
            },
        )
        .unwrap();
        assert_eq!(unchanged, None);
    }
}
