//! End-to-end behaviour of the editor core: codecs, commands, cache, backup and runner events.

mod common;

use common::*;
use parking_lot::Mutex;
use ride_core::{
    backup::with_backup,
    cache::ExpiringCache,
    codec::{CodecOptions, Dialect},
    controller::{Command, ControllerId},
    event::{topics, EventData},
    model::{DataFile, TableKind},
    publisher::Publisher,
    runner::{stream_events, Artifacts, Stream},
    RideError,
};
use std::{cell::RefCell, io::Cursor, io::Write, path::Path, rc::Rc, thread, time::Duration};
use test_log::test;

#[test]
fn pipe_separated_file_round_trips() {
    let text = "| *** Test Cases *** |\n| My Test | Log | hello |\n";
    let options = CodecOptions::default();
    let datafile = DataFile::parse(Path::new("suite.robot"), text, &options).unwrap();
    assert_eq!(datafile.dialect, Dialect::Pipe);
    assert_eq!(datafile.tests()[0].name(), "My Test");
    assert_eq!(datafile.to_text(&options), text);
}

#[test]
fn untouched_files_are_reproduced_byte_for_byte() {
    let corpus = [
        (
            "spaces.robot",
            "*** Settings ***\nLibrary      Collections    # trailing comment\n\n\
             *** Test Cases ***\nA Test\n    [Tags]    smoke\n    Log    x    \n\t\n",
        ),
        ("crlf.robot", "*** Keywords ***\r\nMy Keyword\r\n    No Operation\r\n"),
        (
            "table.tsv",
            "*Setting*\t*Value*\nResource\tcommon.resource\n\n*Test Case*\t*Action*\nT\tLog\thi\n",
        ),
        ("no_newline.robot", "*** Variables ***\n${X}    1"),
    ];
    let options = CodecOptions::default();
    for (name, text) in corpus {
        let datafile = DataFile::parse(Path::new(name), text, &options).unwrap();
        assert_eq!(datafile.to_text(&options), text, "{name}");
    }
}

#[test]
fn rename_keyword_across_two_files() {
    let dir = create_test_project(&[
        (
            "a.resource",
            "*** Keywords ***\nMy KW\n    No Operation\n",
        ),
        (
            "b.robot",
            "*** Settings ***\nResource    a.resource\n\n*** Test Cases ***\nT\n    My KW\n",
        ),
    ]);
    let mut project = open(dir.path());
    let a = file_named(&project, "a.resource");
    let b = file_named(&project, "b.robot");
    let step = test_case(&project, b, 0);

    let outcome = project.execute(
        ControllerId::File(a),
        Command::RenameKeyword {
            old: "My KW".into(),
            new: "Renamed".into(),
        },
    );
    assert!(outcome.is_applied(), "{outcome:?}");
    assert_eq!(project.rows(step).unwrap()[0], cells(&["Renamed"]));

    assert!(project.undo(ControllerId::File(a)).unwrap());
    assert_eq!(project.rows(step).unwrap()[0], cells(&["My KW"]));
    assert_eq!(project.datafile(a).unwrap().keywords()[0].name(), "My KW");
}

#[test]
fn rename_keeps_bdd_prefixes_and_survives_save() {
    let dir = create_test_project(&[
        (
            "a.resource",
            "*** Keywords ***\nUser Logs In\n    No Operation\n",
        ),
        (
            "b.robot",
            "*** Settings ***\nResource    a.resource\n\n*** Test Cases ***\nT\n    Given user logs in\n",
        ),
    ]);
    let mut project = open(dir.path());
    let a = file_named(&project, "a.resource");
    let b = file_named(&project, "b.robot");

    assert!(project
        .execute(
            ControllerId::File(a),
            Command::RenameKeyword {
                old: "User Logs In".into(),
                new: "Sign In".into(),
            },
        )
        .is_applied());
    assert_eq!(project.save_all().unwrap(), 2);
    let written = std::fs::read_to_string(dir.path().join("b.robot")).unwrap();
    assert!(written.contains("Given Sign In"), "{written}");
    assert!(!project.is_dirty(ControllerId::File(b)));
}

#[test]
fn move_rows_down_then_undo() {
    let dir = create_test_project(&[(
        "suite.robot",
        "*** Test Cases ***\nT\n    Log    A\n    Log    B\n    Log    C\n",
    )]);
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let test = test_case(&project, suite, 0);

    assert!(project
        .execute(test, Command::MoveRowsDown { rows: vec![0, 1] })
        .is_applied());
    assert_eq!(
        project.rows(test).unwrap(),
        vec![cells(&["Log", "C"]), cells(&["Log", "A"]), cells(&["Log", "B"])]
    );
    project.undo(test).unwrap();
    assert_eq!(
        project.rows(test).unwrap(),
        vec![cells(&["Log", "A"]), cells(&["Log", "B"]), cells(&["Log", "C"])]
    );
}

#[test]
fn cache_entries_expire() {
    let cache = ExpiringCache::from_secs(0.01).unwrap();
    cache.put("k", "v");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get(&"k"), None);
    cache.put("k", "w");
    assert_eq!(cache.get(&"k"), Some("w"));
}

#[test]
fn failed_write_leaves_original_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suite.robot");
    let original = b"*** Test Cases ***\nOriginal\n    Log    kept\n";
    std::fs::write(&path, original).unwrap();

    let result: Result<(), RideError> = with_backup(&path, |target| {
        let mut file = std::fs::File::create(target)?;
        file.write_all(b"*** Test Cases ***\nHalf")?;
        Err(RideError::Io("device full".into()))
    });
    assert!(result.is_err());
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn runner_lines_become_events() {
    let mut publisher = Publisher::new();
    let seen: Rc<RefCell<Vec<(String, EventData)>>> = Rc::default();
    let sink = Rc::clone(&seen);
    publisher.subscribe(topics::RUNNER, move |e| {
        sink.borrow_mut().push((e.topic.clone(), e.data.clone()));
        Ok(())
    });

    let artifacts = Mutex::new(Artifacts::default());
    let posted = stream_events(
        Cursor::new("start_test:A\nend_test:A:PASS:ok\ngarbage line\n"),
        Stream::Stdout,
        &publisher.sender(),
        &artifacts,
    );
    assert_eq!(posted, 3);
    assert_eq!(publisher.drain(), 3);

    let seen = seen.borrow();
    assert_eq!(
        *seen,
        vec![
            (
                topics::RUNNER_TEST_START.to_string(),
                EventData::TestStart { name: "A".into() }
            ),
            (
                topics::RUNNER_TEST_END.to_string(),
                EventData::TestEnd {
                    name: "A".into(),
                    status: "PASS".into(),
                    message: "ok".into(),
                }
            ),
            (
                topics::RUNNER_LOG.to_string(),
                EventData::Log {
                    level: "INFO".into(),
                    text: "garbage line".into(),
                }
            ),
        ]
    );
}

#[test]
fn variables_table_is_created_on_first_row() {
    let dir = create_test_project(&[("suite.robot", "*** Test Cases ***\nT\n    Log    x\n")]);
    let mut project = open(dir.path());
    let suite = file_named(&project, "suite.robot");
    let variables = ControllerId::Table(suite, TableKind::Variables);

    assert!(project
        .execute(
            variables,
            Command::AddRow {
                index: 0,
                cells: cells(&["${NAME}", "value"]),
            },
        )
        .is_applied());
    project.save(variables).unwrap();
    let written = std::fs::read_to_string(dir.path().join("suite.robot")).unwrap();
    let variables_at = written.find("*** Variables ***").unwrap();
    let tests_at = written.find("*** Test Cases ***").unwrap();
    assert!(variables_at < tests_at, "{written}");
    assert!(written.contains("${NAME}"));
}
