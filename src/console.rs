//! Debug console.
//!
//! A dedicated thread reads command lines and posts them as `ride.console.command` events; the
//! main thread drains them and runs them against the project with [`run`]. The console never
//! touches the project from its own thread.

use std::{
    fmt::Write as _,
    io::BufRead,
    thread::{self, JoinHandle},
};

use crate::{
    controller::{Command, ControllerId, Outcome, Project},
    error::RideError,
    event::{topics, Event, EventData},
    occurrences::Symbol,
    publisher::EventSender,
};

#[derive(Debug)]
pub struct DebugConsole {
    handle: Option<JoinHandle<usize>>,
}

impl DebugConsole {
    /// Read lines from `reader` until EOF or `exit`, posting each non-blank line.
    pub fn spawn<R: BufRead + Send + 'static>(reader: R, sender: EventSender) -> Self {
        let handle = thread::spawn(move || {
            let mut posted = 0;
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("[Console] Read failed: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                let event = Event::new(
                    topics::CONSOLE_COMMAND,
                    EventData::Console {
                        line: line.to_string(),
                    },
                );
                if sender.send(event).is_err() {
                    break;
                }
                posted += 1;
            }
            tracing::debug!("[Console] Closed after {} command(s)", posted);
            posted
        });
        DebugConsole {
            handle: Some(handle),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the reader thread; returns how many commands it posted.
    pub fn join(mut self) -> Result<usize, RideError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| RideError::Internal("console thread panicked".to_string())),
            None => Ok(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Tree,
    Errors,
    Unresolved,
    Flush,
    Find(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, RideError> {
        let (word, rest) = line
            .trim()
            .split_once(char::is_whitespace)
            .unwrap_or((line.trim(), ""));
        let rest = rest.trim();
        match word {
            "help" | "?" => Ok(ConsoleCommand::Help),
            "tree" => Ok(ConsoleCommand::Tree),
            "errors" => Ok(ConsoleCommand::Errors),
            "unresolved" => Ok(ConsoleCommand::Unresolved),
            "flush" => Ok(ConsoleCommand::Flush),
            "find" if !rest.is_empty() => Ok(ConsoleCommand::Find(rest.to_string())),
            "find" => Err(RideError::Command("find needs a keyword or ${variable}".into())),
            other => Err(RideError::Command(format!("unknown console command '{other}'"))),
        }
    }
}

/// Render the project tree, one controller per line, with `*` marking unsaved files.
pub fn render_tree(project: &Project) -> String {
    let mut out = String::new();
    for (depth, id) in project.tree() {
        let Some(controller) = project.controller(id) else {
            continue;
        };
        let dirty = if project.is_dirty(ControllerId::File(id)) {
            "*"
        } else {
            ""
        };
        let external = if controller.is_external() {
            " (external)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{}{}{}{} [{}]",
            "  ".repeat(depth),
            dirty,
            controller.name(),
            external,
            id
        );
    }
    out
}

/// Run one console command against the project and return its printable result.
pub fn run(project: &mut Project, line: &str) -> String {
    let command = match ConsoleCommand::parse(line) {
        Ok(command) => command,
        Err(e) => return e.to_string(),
    };
    let mut out = String::new();
    match command {
        ConsoleCommand::Help => {
            out.push_str("help, tree, errors, unresolved, flush, find <keyword|${variable}>\n")
        }
        ConsoleCommand::Tree => out = render_tree(project),
        ConsoleCommand::Errors => {
            for error in project.errors() {
                let _ = writeln!(out, "{error}");
            }
        }
        ConsoleCommand::Unresolved => {
            for diagnostic in project.unresolved_keywords() {
                let _ = writeln!(
                    out,
                    "{} row {}: {}",
                    diagnostic.target, diagnostic.row, diagnostic.error
                );
            }
        }
        ConsoleCommand::Flush => {
            let Some(root) = project.root() else {
                return "no project loaded\n".to_string();
            };
            project.execute(ControllerId::File(root), Command::Refresh);
            out.push_str("namespace cache flushed\n");
        }
        ConsoleCommand::Find(text) => {
            let Some(root) = project.root() else {
                return "no project loaded\n".to_string();
            };
            let symbol = Symbol::parse(&text);
            match project.execute(ControllerId::File(root), Command::FindOccurrences { symbol }) {
                Outcome::Occurrences(found) => {
                    for o in found {
                        let _ = writeln!(
                            out,
                            "{}:{} {} [{:?}] {}",
                            o.path.display(),
                            o.row,
                            o.item,
                            o.role,
                            o.text
                        );
                    }
                }
                other => {
                    let _ = writeln!(out, "{other:?}");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Publisher;
    use std::{cell::RefCell, io::Cursor, rc::Rc};

    #[test]
    fn lines_are_posted_until_exit() {
        let mut publisher = Publisher::new();
        let lines: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&lines);
        publisher.subscribe(topics::CONSOLE_COMMAND, move |e| {
            if let EventData::Console { line } = &e.data {
                sink.borrow_mut().push(line.clone());
            }
            Ok(())
        });
        let console = DebugConsole::spawn(
            Cursor::new("tree\n\n  find My KW \nexit\nignored\n"),
            publisher.sender(),
        );
        assert_eq!(console.join().unwrap(), 2);
        publisher.drain();
        assert_eq!(*lines.borrow(), vec!["tree".to_string(), "find My KW".to_string()]);
    }

    #[test]
    fn command_parsing() {
        assert_eq!(ConsoleCommand::parse("tree").unwrap(), ConsoleCommand::Tree);
        assert_eq!(
            ConsoleCommand::parse("find  ${HOST}").unwrap(),
            ConsoleCommand::Find("${HOST}".to_string())
        );
        assert!(ConsoleCommand::parse("find").is_err());
        assert!(ConsoleCommand::parse("explode").is_err());
    }
}
