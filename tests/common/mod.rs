//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use ride_core::{
    controller::{ControllerId, FileId, Project, ProjectOptions},
    library::{Introspector, KeywordSpec, LibraryRequest, LibrarySpec},
    RideError,
};
use std::{collections::HashMap, path::Path, time::Duration};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; later calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Answers library imports from a fixed table instead of a child interpreter.
#[derive(Default)]
pub struct CannedIntrospector(HashMap<String, LibrarySpec>);

impl CannedIntrospector {
    #[allow(dead_code)]
    pub fn library(mut self, name: &str, keywords: &[&str]) -> Self {
        let spec = LibrarySpec {
            name: name.to_string(),
            keywords: keywords
                .iter()
                .map(|k| KeywordSpec {
                    name: k.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        self.0.insert(name.to_string(), spec);
        self
    }
}

impl Introspector for CannedIntrospector {
    fn introspect(
        &self,
        request: &LibraryRequest,
        _timeout: Duration,
    ) -> Result<LibrarySpec, RideError> {
        self.0
            .get(&request.name)
            .cloned()
            .ok_or_else(|| RideError::NotFound(format!("library {}", request.name)))
    }
}

/// Write `files` (relative path, content) into a fresh temporary directory.
#[allow(dead_code)]
pub fn create_test_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// Load `root` with a canned `Collections` library.
#[allow(dead_code)]
pub fn open(root: &Path) -> Project {
    init_logging();
    let introspector = CannedIntrospector::default()
        .library("Collections", &["Append To List", "Get From Dictionary"]);
    let mut project = Project::new(ProjectOptions::default(), Box::new(introspector));
    project.load(root).unwrap();
    project
}

#[allow(dead_code)]
pub fn file_named(project: &Project, name: &str) -> FileId {
    project
        .controllers()
        .find(|c| c.path().file_name().is_some_and(|n| n == name))
        .map(|c| c.id())
        .unwrap_or_else(|| panic!("no controller for {name}"))
}

#[allow(dead_code)]
pub fn test_case(project: &Project, file: FileId, index: usize) -> ControllerId {
    ControllerId::Element(file, project.datafile(file).unwrap().tests()[index].id)
}

#[allow(dead_code)]
pub fn cells(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
