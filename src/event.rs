use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::{controller::ControllerId, error::RideError};

/// Dotted topic names published on the [`Publisher`](crate::publisher::Publisher).
///
/// Subscriptions match by prefix, so a listener on `ride.datafile` receives every topic below
/// it. Prefix matching respects segment boundaries: `ride.data` does not match `ride.datafile`.
pub mod topics {
    pub const DATAFILE: &str = "ride.datafile";
    pub const DATAFILE_OPENED: &str = "ride.datafile.opened";
    pub const DATAFILE_SAVED: &str = "ride.datafile.saved";
    pub const DATAFILE_CLOSED: &str = "ride.datafile.closed";
    pub const DATAFILE_RELOADED: &str = "ride.datafile.reloaded";
    pub const DATAFILE_CREATED: &str = "ride.datafile.created";
    pub const CONTROLLER_MODIFIED: &str = "ride.controller.modified";
    pub const CONTROLLER_UNDONE: &str = "ride.controller.undone";
    pub const CONTROLLER_REDONE: &str = "ride.controller.redone";
    pub const KEYWORD_RENAMED: &str = "ride.keyword.renamed";
    pub const VARIABLE_RENAMED: &str = "ride.variable.renamed";
    pub const IMPORT_ADDED: &str = "ride.import.added";
    pub const NAMESPACE_FLUSHED: &str = "ride.namespace.flushed";
    pub const LIBRARY: &str = "ride.library";
    pub const LIBRARY_INTROSPECTION_STARTED: &str = "ride.library.introspection.started";
    pub const LIBRARY_INTROSPECTION_FINISHED: &str = "ride.library.introspection.finished";
    pub const LIBRARY_INTROSPECTION_TIMEOUT: &str = "ride.library.introspection.timeout";
    pub const LIBRARY_INTROSPECTION_FAILED: &str = "ride.library.introspection.failed";
    pub const RUNNER: &str = "ride.runner";
    pub const RUNNER_PROCESS_STARTED: &str = "ride.runner.process.started";
    pub const RUNNER_PROCESS_ENDED: &str = "ride.runner.process.ended";
    pub const RUNNER_SUITE_START: &str = "ride.runner.suite.start";
    pub const RUNNER_SUITE_END: &str = "ride.runner.suite.end";
    pub const RUNNER_TEST_START: &str = "ride.runner.test.start";
    pub const RUNNER_TEST_END: &str = "ride.runner.test.end";
    pub const RUNNER_LOG: &str = "ride.runner.log";
    pub const RUNNER_REPORT: &str = "ride.runner.report";
    pub const RUNNER_OUTPUT: &str = "ride.runner.output";
    pub const RUNNER_PAUSED: &str = "ride.runner.paused";
    pub const RUNNER_RESUMED: &str = "ride.runner.resumed";
    pub const CONSOLE_COMMAND: &str = "ride.console.command";
    pub const LOG_EXCEPTION: &str = "ride.log.exception";

    /// True when `topic` equals `prefix` or continues it with a `.` segment.
    pub fn matches(prefix: &str, topic: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        match topic.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

/// Payload carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventData {
    None,
    /// A data file was opened, saved, reloaded, created or closed
    DataFile { path: PathBuf },
    /// A controller was mutated by a command (or by its undo/redo)
    Modified { controller: ControllerId, command: String },
    /// Old name, new name
    Renamed { old: String, new: String },
    Import { kind: String, name: String },
    /// Library introspection progress. `detail` is empty on start, then the keyword count or
    /// the error message.
    Introspection { name: String, detail: String },
    SuiteStart { name: String },
    SuiteEnd {
        name: String,
        status: String,
        message: String,
    },
    TestStart { name: String },
    TestEnd {
        name: String,
        status: String,
        message: String,
    },
    Log { level: String, text: String },
    /// Report or output file path produced by a run
    Artifact { path: PathBuf },
    ProcessEnded { code: Option<i32> },
    Console { line: String },
    /// A listener failed while handling `topic`
    ListenerFailure { topic: String, error: RideError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    pub data: EventData,
}

impl Event {
    pub fn new(topic: impl Into<String>, data: EventData) -> Self {
        Event {
            topic: topic.into(),
            data,
        }
    }

    pub fn bare(topic: impl Into<String>) -> Self {
        Event::new(topic, EventData::None)
    }
}

impl Display for EventData {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            EventData::None => Ok(()),
            EventData::DataFile { path } => write!(f, "{}", path.display()),
            EventData::Modified { controller, command } => write!(f, "{controller}: {command}"),
            EventData::Renamed { old, new } => write!(f, "{old} -> {new}"),
            EventData::Import { kind, name } => write!(f, "{kind} {name}"),
            EventData::Introspection { name, detail } if detail.is_empty() => write!(f, "{name}"),
            EventData::Introspection { name, detail } => write!(f, "{name}: {detail}"),
            EventData::SuiteStart { name } | EventData::TestStart { name } => write!(f, "{name}"),
            EventData::SuiteEnd {
                name,
                status,
                message,
            }
            | EventData::TestEnd {
                name,
                status,
                message,
            } => write!(f, "{name}, {status}, {message}"),
            EventData::Log { level, text } => write!(f, "{level}, {text}"),
            EventData::Artifact { path } => write!(f, "{}", path.display()),
            EventData::ProcessEnded { code } => match code {
                Some(code) => write!(f, "exit code {code}"),
                None => write!(f, "terminated by signal"),
            },
            EventData::Console { line } => write!(f, "{line}"),
            EventData::ListenerFailure { topic, error } => write!(f, "{topic}: {error}"),
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}({})", self.topic, self.data)
    }
}
