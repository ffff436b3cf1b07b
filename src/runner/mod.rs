//! Test runner driver.
//!
//! The runner is a child process whose stdout carries one status record per line. Records are
//! either colon separated (`end_test:A:PASS:ok`), JSON arrays
//! (`["end_test", ["A", {"status": "PASS", "message": "ok"}]]`) or JSON objects with an
//! `event` field. Anything else is shown to the user as an `INFO` log line; stderr lines are
//! `WARN` log lines.
//!
//! Each output stream has a reader thread that posts into the handle's [`Relay`]. Polling the
//! handle pumps the relay: callbacks registered with [`RunHandle::on_event`] run first, then
//! the events go on to the [`EventSender`] given at start, for the owner to deliver with
//! [`Publisher::drain`](crate::publisher::Publisher::drain). Pause and resume are control lines
//! written to the child's stdin.
//!
//! Once the child exits its readers get a short grace period to reach end of output. A
//! grandchild that inherited the pipes can keep them open indefinitely; such readers are
//! detached.

use parking_lot::Mutex;
use serde_json::Value;
use std::{
    io::{BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tempfile::TempDir;

use crate::{
    error::RideError,
    event::{topics, Event, EventData},
    publisher::{EventSender, Relay},
};

pub mod argfile;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const READER_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    StartSuite { name: String },
    EndSuite {
        name: String,
        status: String,
        message: String,
    },
    StartTest { name: String },
    EndTest {
        name: String,
        status: String,
        message: String,
    },
    Log { level: String, text: String },
    Report { path: PathBuf },
    Output { path: PathBuf },
}

impl RunnerEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            RunnerEvent::StartSuite { .. } => topics::RUNNER_SUITE_START,
            RunnerEvent::EndSuite { .. } => topics::RUNNER_SUITE_END,
            RunnerEvent::StartTest { .. } => topics::RUNNER_TEST_START,
            RunnerEvent::EndTest { .. } => topics::RUNNER_TEST_END,
            RunnerEvent::Log { .. } => topics::RUNNER_LOG,
            RunnerEvent::Report { .. } => topics::RUNNER_REPORT,
            RunnerEvent::Output { .. } => topics::RUNNER_OUTPUT,
        }
    }

    fn log(level: &str, text: &str) -> Self {
        RunnerEvent::Log {
            level: level.to_string(),
            text: text.to_string(),
        }
    }
}

impl From<RunnerEvent> for Event {
    fn from(event: RunnerEvent) -> Event {
        let topic = event.topic();
        let data = match event {
            RunnerEvent::StartSuite { name } => EventData::SuiteStart { name },
            RunnerEvent::EndSuite {
                name,
                status,
                message,
            } => EventData::SuiteEnd {
                name,
                status,
                message,
            },
            RunnerEvent::StartTest { name } => EventData::TestStart { name },
            RunnerEvent::EndTest {
                name,
                status,
                message,
            } => EventData::TestEnd {
                name,
                status,
                message,
            },
            RunnerEvent::Log { level, text } => EventData::Log { level, text },
            RunnerEvent::Report { path } | RunnerEvent::Output { path } => {
                EventData::Artifact { path }
            }
        };
        Event::new(topic, data)
    }
}

/// Parse one stdout line. Blank lines yield nothing; unrecognized lines become `INFO` logs.
pub fn parse_line(line: &str) -> Option<RunnerEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let trimmed = line.trim();
    let parsed = if trimmed.starts_with('[') || trimmed.starts_with('{') {
        serde_json::from_str::<Value>(trimmed)
            .ok()
            .and_then(|v| parse_json(&v))
    } else {
        parse_colon_record(trimmed)
    };
    Some(parsed.unwrap_or_else(|| RunnerEvent::log("INFO", line)))
}

fn parse_colon_record(line: &str) -> Option<RunnerEvent> {
    let (kind, rest) = line.split_once(':')?;
    let mut fields = rest.splitn(3, ':');
    let mut next = || fields.next().unwrap_or_default().to_string();
    let event = match kind.trim() {
        "start_suite" => RunnerEvent::StartSuite { name: next() },
        "end_suite" => RunnerEvent::EndSuite {
            name: next(),
            status: next(),
            message: next(),
        },
        "start_test" => RunnerEvent::StartTest { name: next() },
        "end_test" => RunnerEvent::EndTest {
            name: next(),
            status: next(),
            message: next(),
        },
        "log" => {
            let (level, text) = rest.split_once(':').unwrap_or(("INFO", rest));
            RunnerEvent::log(level, text)
        }
        "report" => RunnerEvent::Report {
            path: PathBuf::from(rest),
        },
        "output" => RunnerEvent::Output {
            path: PathBuf::from(rest),
        },
        _ => return None,
    };
    Some(event)
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn from_fields(kind: &str, name: String, attrs: Option<&Value>) -> Option<RunnerEvent> {
    let field = |key: &str| text(attrs.and_then(|a| a.get(key)));
    let event = match kind {
        "start_suite" => RunnerEvent::StartSuite { name },
        "end_suite" => RunnerEvent::EndSuite {
            name,
            status: field("status"),
            message: field("message"),
        },
        "start_test" => RunnerEvent::StartTest { name },
        "end_test" => RunnerEvent::EndTest {
            name,
            status: field("status"),
            message: field("message"),
        },
        "log" | "log_message" | "message" => {
            let level = field("level");
            RunnerEvent::Log {
                level: if level.is_empty() { "INFO".to_string() } else { level },
                text: field("message"),
            }
        }
        "report" | "report_file" => RunnerEvent::Report {
            path: PathBuf::from(name),
        },
        "output" | "output_file" => RunnerEvent::Output {
            path: PathBuf::from(name),
        },
        _ => return None,
    };
    Some(event)
}

fn parse_json(value: &Value) -> Option<RunnerEvent> {
    match value {
        Value::Array(items) => {
            let kind = items.first()?.as_str()?;
            match items.get(1) {
                // ["end_test", ["A", {...}]]
                Some(Value::Array(args)) => from_fields(kind, text(args.first()), args.get(1)),
                // ["log_message", {...}]
                Some(attrs @ Value::Object(_)) => from_fields(kind, text(attrs.get("name")), Some(attrs)),
                // ["report_file", "/path"]
                other => from_fields(kind, text(other), None),
            }
        }
        Value::Object(map) => {
            let kind = map.get("event")?.as_str()?;
            let name = map
                .get("name")
                .or_else(|| map.get("path"))
                .map(|v| text(Some(v)))
                .unwrap_or_default();
            from_fields(kind, name, Some(value))
        }
        _ => None,
    }
}

/// Report and output files announced by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub report: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Post one event per line of `reader` until it is exhausted. Returns the number of events.
pub fn stream_events<R: BufRead>(
    mut reader: R,
    stream: Stream,
    sender: &EventSender,
    artifacts: &Mutex<Artifacts>,
) -> usize {
    let mut count = 0;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[Runner] Reading {:?} failed: {}", stream, e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer);
        let event = match stream {
            Stream::Stdout => parse_line(&line),
            Stream::Stderr => {
                let line = line.trim_end_matches(['\r', '\n']);
                (!line.trim().is_empty()).then(|| RunnerEvent::log("WARN", line))
            }
        };
        let Some(event) = event else {
            continue;
        };
        match &event {
            RunnerEvent::Report { path } => artifacts.lock().report = Some(path.clone()),
            RunnerEvent::Output { path } => artifacts.lock().output = Some(path.clone()),
            _ => {}
        }
        if sender.send(event.into()).is_err() {
            tracing::debug!("[Runner] Publisher is gone, dropping remaining output");
            break;
        }
        count += 1;
    }
    count
}

/// What to run: the suite path plus extra runner arguments, passed through an argument file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub suite: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(suite: impl Into<PathBuf>) -> Self {
        RunRequest {
            suite: suite.into(),
            args: Vec::new(),
            cwd: None,
        }
    }
}

/// Spawns runs from a command line such as `python -m robot`.
#[derive(Debug, Clone)]
pub struct Runner {
    program: String,
    prefix_args: Vec<String>,
}

impl Runner {
    pub fn from_command(command: &str) -> Result<Self, RideError> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| RideError::Data("runner command is empty".to_string()))?;
        Ok(Runner {
            program,
            prefix_args: words.collect(),
        })
    }

    pub fn start(&self, request: &RunRequest, sender: EventSender) -> Result<RunHandle, RideError> {
        let workdir = tempfile::Builder::new().prefix("ride-run").tempdir()?;
        let argfile = workdir.path().join("argfile.txt");
        argfile::write(&argfile, &request.args)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .arg("--argumentfile")
            .arg(&argfile)
            .arg(&request.suite)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        let description = format!("{} {}", self.program, request.suite.display());
        let mut child = command.spawn().map_err(|e| RideError::ChildProcess {
            command: description.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;
        tracing::info!("[Runner] Started {} (pid {})", description, child.id());
        let mut relay = Relay::new(sender);
        relay.post(Event::new(
            topics::RUNNER_PROCESS_STARTED,
            EventData::Console {
                line: description.clone(),
            },
        ));

        let artifacts = Arc::new(Mutex::new(Artifacts::default()));
        let worker = relay.sender();
        let readers = [
            spawn_reader(child.stdout.take(), Stream::Stdout, &worker, &artifacts),
            spawn_reader(child.stderr.take(), Stream::Stderr, &worker, &artifacts),
        ]
        .into_iter()
        .flatten()
        .collect();
        Ok(RunHandle {
            stdin: child.stdin.take(),
            child,
            description,
            relay,
            artifacts,
            readers,
            exit: None,
            paused: false,
            _workdir: workdir,
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: Option<R>,
    kind: Stream,
    sender: &EventSender,
    artifacts: &Arc<Mutex<Artifacts>>,
) -> Option<JoinHandle<usize>> {
    let stream = stream?;
    let sender = sender.clone();
    let artifacts = Arc::clone(artifacts);
    Some(thread::spawn(move || {
        stream_events(BufReader::new(stream), kind, &sender, &artifacts)
    }))
}

/// A running test execution. Dropping the handle stops the child.
#[derive(Debug)]
pub struct RunHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    description: String,
    relay: Relay,
    artifacts: Arc<Mutex<Artifacts>>,
    readers: Vec<JoinHandle<usize>>,
    exit: Option<Option<i32>>,
    paused: bool,
    _workdir: TempDir,
}

impl RunHandle {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Call `callback` for every later event of this run, on the thread that polls the handle.
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.relay.on_event(callback);
    }

    pub fn artifacts(&self) -> Artifacts {
        self.artifacts.lock().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Exit code once the child finished (`Some(None)` when killed by a signal).
    pub fn exit_code(&self) -> Option<Option<i32>> {
        self.exit
    }

    fn control(&mut self, message: &str) -> Result<(), RideError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RideError::Command("runner control pipe is closed".to_string()))?;
        writeln!(stdin, "{message}")?;
        stdin.flush()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), RideError> {
        if self.paused {
            return Ok(());
        }
        self.control("pause")?;
        self.paused = true;
        self.relay.post(Event::bare(topics::RUNNER_PAUSED));
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RideError> {
        if !self.paused {
            return Ok(());
        }
        self.control("resume")?;
        self.paused = false;
        self.relay.post(Event::bare(topics::RUNNER_RESUMED));
        Ok(())
    }

    /// Ask the runner to terminate: SIGTERM on unix, process termination elsewhere.
    pub fn stop(&mut self) -> Result<(), RideError> {
        if self.exit.is_some() {
            return Ok(());
        }
        tracing::info!("[Runner] Stopping {}", self.description);
        self.terminate()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), RideError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(self.child.id())
            .map_err(|_| RideError::Internal(format!("pid {} out of range", self.child.id())))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| RideError::ChildProcess {
            command: self.description.clone(),
            status: "signal failed".to_string(),
            stderr: e.to_string(),
        })
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), RideError> {
        Ok(self.child.kill()?)
    }

    /// Non-blocking check that also pumps pending output events; publishes
    /// `ride.runner.process.ended` once the child is gone.
    pub fn poll(&mut self) -> Result<bool, RideError> {
        if self.exit.is_some() {
            return Ok(true);
        }
        self.relay.pump();
        match self.child.try_wait()? {
            Some(status) => {
                self.finish(status.code());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait for the run to end. With a timeout the child is stopped, then killed, once it
    /// elapses and [`RideError::Timeout`] is returned.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<i32>, RideError> {
        let started = Instant::now();
        loop {
            if self.poll()? {
                return Ok(self.exit.flatten());
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                let seconds = timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
                tracing::warn!("[Runner] {} exceeded {}s", self.description, seconds);
                self.kill();
                return Err(RideError::Timeout {
                    what: self.description.clone(),
                    seconds,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("[Runner] Kill of {} failed: {}", self.description, e);
        }
        match self.child.wait() {
            Ok(status) => self.finish(status.code()),
            Err(e) => tracing::debug!("[Runner] Reaping {} failed: {}", self.description, e),
        }
    }

    fn finish(&mut self, code: Option<i32>) {
        self.stdin = None;
        let deadline = Instant::now() + READER_GRACE;
        while self.readers.iter().any(|r| !r.is_finished()) && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        for reader in self.readers.drain(..) {
            if !reader.is_finished() {
                // Dropping the handle detaches the thread; it exits with the pipe.
                tracing::warn!(
                    "[Runner] Output of {} is still held open, detaching its reader",
                    self.description
                );
                continue;
            }
            if reader.join().is_err() {
                tracing::warn!("[Runner] Output reader of {} panicked", self.description);
            }
        }
        self.relay.pump();
        self.exit = Some(code);
        tracing::info!("[Runner] {} ended with {:?}", self.description, code);
        self.relay.post(Event::new(
            topics::RUNNER_PROCESS_ENDED,
            EventData::ProcessEnded { code },
        ));
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            if let Ok(None) = self.child.try_wait() {
                self.kill();
            }
        }
    }
}

/// Convenience for callers that only need the suite path.
pub fn run(
    runner: &Runner,
    suite: &Path,
    sender: EventSender,
) -> Result<RunHandle, RideError> {
    runner.start(&RunRequest::new(suite), sender)
}
