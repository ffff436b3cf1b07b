//! Saving, external modification, reload and namespace cache coherence.

mod common;

use common::*;
use filetime::{set_file_mtime, FileTime};
use ride_core::{
    controller::{Command, ControllerId},
    event::{topics, EventData},
    model::TableKind,
    RideError,
};
use std::{cell::RefCell, rc::Rc};
use test_log::test;

const SUITE: &str = "\
*** Settings ***
Resource    keywords.resource

*** Test Cases ***
Login
    Open Login Page
    Check Title
";

const KEYWORDS: &str = "\
*** Keywords ***
Open ${page} Page
    No Operation

Check Title
    No Operation
";

fn fixture() -> tempfile::TempDir {
    create_test_project(&[("suite.robot", SUITE), ("keywords.resource", KEYWORDS)])
}

/// Rewrite `name` behind the project's back with a clearly different mtime.
fn modify_externally(dir: &tempfile::TempDir, name: &str, content: &str) {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();
}

#[test]
fn save_refuses_to_clobber_external_changes() {
    let dir = fixture();
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let test = test_case(&project, suite, 0);
    project.execute(test, Command::ClearCell { row: 1, col: 0 });

    let external = SUITE.replace("Check Title", "Check Title Again");
    modify_externally(&dir, "suite.robot", &external);

    let err = project.save(test).unwrap_err();
    assert!(matches!(err, RideError::ConcurrentModification { .. }));
    let on_disk = std::fs::read_to_string(dir.path().join("suite.robot")).unwrap();
    assert_eq!(on_disk, external);
    assert!(project.is_dirty(ControllerId::File(suite)));

    assert!(project.save_overwrite(test).unwrap());
    let on_disk = std::fs::read_to_string(dir.path().join("suite.robot")).unwrap();
    assert!(!on_disk.contains("Check Title"));
    assert!(!project.is_dirty(ControllerId::File(suite)));
    assert!(!dir.path().join("suite.robot.bak").exists());
}

#[test]
fn save_all_only_writes_dirty_files() {
    let dir = fixture();
    let mut project = open(dir.path());
    assert_eq!(project.save_all().unwrap(), 0);

    let keywords = file_named(&project, "keywords.resource");
    let table = ControllerId::Table(keywords, TableKind::Keywords);
    project.execute(
        table,
        Command::SetCell {
            row: 1,
            col: 0,
            value: "Verify Title".into(),
        },
    );
    let saved: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&saved);
    project.subscribe(topics::DATAFILE_SAVED, move |e| {
        if let EventData::DataFile { path } = &e.data {
            sink.borrow_mut()
                .push(path.file_name().unwrap().to_string_lossy().into_owned());
        }
        Ok(())
    });
    assert_eq!(project.save_all().unwrap(), 1);
    assert_eq!(*saved.borrow(), vec!["keywords.resource".to_string()]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("suite.robot")).unwrap(),
        SUITE
    );
    let written = std::fs::read_to_string(dir.path().join("keywords.resource")).unwrap();
    assert_eq!(written, KEYWORDS.replace("Check Title", "Verify Title"));
}

#[test]
fn reload_picks_up_disk_content_and_drops_history() {
    let dir = fixture();
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let test = test_case(&project, suite, 0);
    assert!(!project.reload(ControllerId::File(suite)).unwrap());

    project.execute(test, Command::DeleteRows { rows: vec![0] });
    assert!(project.can_undo(test));
    let generation = project.controller(suite).unwrap().generation();

    modify_externally(&dir, "suite.robot", &SUITE.replace("Check Title", "Log    reloaded"));
    assert!(project.reload(ControllerId::File(suite)).unwrap());
    assert!(!project.is_dirty(ControllerId::File(suite)));
    assert!(project.controller(suite).unwrap().generation() > generation);

    let test = test_case(&project, suite, 0);
    assert!(!project.can_undo(test));
    assert_eq!(
        project.rows(test).unwrap(),
        vec![cells(&["Open Login Page"]), cells(&["Log", "reloaded"])]
    );
}

#[test]
fn namespace_answers_follow_edits() {
    let dir = fixture();
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let keywords = file_named(&project, "keywords.resource");

    let found = project.find_keyword(suite, "Open Login Page").unwrap();
    assert_eq!(found.name, "Open ${page} Page");
    assert!(project.find_keyword(suite, "Check Title").is_some());

    let table = ControllerId::Table(keywords, TableKind::Keywords);
    assert!(project
        .execute(
            table,
            Command::SetCell {
                row: 1,
                col: 0,
                value: "Verify Title".into(),
            },
        )
        .is_applied());
    assert!(project.find_keyword(suite, "Check Title").is_none());
    assert!(project.find_keyword(suite, "Verify Title").is_some());
    let unresolved = project.unresolved_keywords();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].name, "Check Title");

    project.undo(table).unwrap();
    assert!(project.find_keyword(suite, "Check Title").is_some());
    assert!(project.unresolved_keywords().is_empty());
}

#[test]
fn removing_an_import_hides_its_keywords() {
    let dir = fixture();
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let settings = ControllerId::Table(suite, TableKind::Settings);
    assert!(project.find_keyword(suite, "Check Title").is_some());

    assert!(project
        .execute(settings, Command::DeleteRows { rows: vec![0] })
        .is_applied());
    assert!(project.find_keyword(suite, "Check Title").is_none());
    assert_eq!(project.unresolved_keywords().len(), 2);
}

#[test]
fn imports_outside_the_tree_are_attached() {
    let outer = create_test_project(&[
        ("shared/external.resource", "*** Keywords ***\nFrom Outside\n    No Operation\n"),
        (
            "project/suite.robot",
            "*** Settings ***\nResource    ../shared/external.resource\n\n\
             *** Test Cases ***\nT\n    From Outside\n",
        ),
    ]);
    let project = open(&outer.path().join("project"));
    let external = file_named(&project, "external.resource");
    assert!(project.controller(external).unwrap().is_external());
    assert!(project.unresolved_keywords().is_empty());
}

#[test]
fn new_resource_is_written_on_save() {
    let dir = fixture();
    let mut project = open(dir.path());
    let id = project.new_resource(dir.path().join("extra.resource")).unwrap();
    assert!(project.is_dirty(ControllerId::File(id)));
    assert!(project.new_resource(dir.path().join("suite.robot")).is_err());

    let keywords = ControllerId::Table(id, TableKind::Keywords);
    assert!(project
        .execute(
            keywords,
            Command::AddRow {
                index: 0,
                cells: cells(&["Extra Step", "No Operation"]),
            },
        )
        .is_applied());
    assert!(project.save(keywords).unwrap());
    let written = std::fs::read_to_string(dir.path().join("extra.resource")).unwrap();
    assert!(written.starts_with("*** Keywords ***"), "{written}");
    assert!(written.contains("Extra Step"));
}
