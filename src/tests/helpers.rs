//! Shared fixtures for the cross-module suites.

use std::path::Path;
use tempfile::TempDir;

use crate::{
    controller::{ControllerId, FileId, Project, ProjectOptions},
    library::{tests::StaticIntrospector, KeywordSpec, LibrarySpec},
    model::{ElementId, TableKind},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Write `files` (relative path, content) under a fresh temporary directory.
pub fn write_tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// A `Collections` library with a couple of keywords.
pub fn collections() -> LibrarySpec {
    LibrarySpec {
        name: "Collections".into(),
        keywords: vec![
            KeywordSpec {
                name: "Append To List".into(),
                args: vec!["list_".into(), "*values".into()],
                doc: String::new(),
            },
            KeywordSpec {
                name: "Get From Dictionary".into(),
                args: vec!["dictionary".into(), "key".into()],
                doc: String::new(),
            },
        ],
        ..Default::default()
    }
}

/// Load `root` with canned library specs instead of child processes.
pub fn open_project(root: &Path) -> Project {
    init_logging();
    let introspector = StaticIntrospector::with([collections()]);
    let mut project = Project::new(ProjectOptions::default(), Box::new(introspector));
    project.load(root).unwrap();
    project
}

pub fn file_named(project: &Project, name: &str) -> FileId {
    project
        .controllers()
        .find(|c| c.path().file_name().is_some_and(|n| n == name))
        .map(|c| c.id())
        .unwrap_or_else(|| panic!("no controller for {name}"))
}

pub fn test_id(project: &Project, file: FileId, index: usize) -> ControllerId {
    let id: ElementId = project.datafile(file).unwrap().tests()[index].id;
    ControllerId::Element(file, id)
}

pub fn keyword_id(project: &Project, file: FileId, index: usize) -> ControllerId {
    let id: ElementId = project.datafile(file).unwrap().keywords()[index].id;
    ControllerId::Element(file, id)
}

pub fn table(file: FileId, kind: TableKind) -> ControllerId {
    ControllerId::Table(file, kind)
}

/// Step cells of a test or keyword, as plain strings.
pub fn steps(project: &Project, target: ControllerId) -> Vec<Vec<String>> {
    project.rows(target).unwrap()
}

/// Serialized text of a loaded data file.
pub fn text_of(project: &Project, file: FileId) -> String {
    project
        .datafile(file)
        .unwrap()
        .to_text(&project.options().codec)
}
