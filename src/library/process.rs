//! Out-of-process introspection.

use std::{
    ffi::OsString,
    io::Read,
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use super::{Introspector, LibraryRequest, LibrarySpec};
use crate::{
    error::RideError,
    event::{topics, Event, EventData},
    publisher::Callback,
};

const SCRIPT: &str = include_str!("introspect.py");
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const NOT_FOUND_STATUS: i32 = 2;

/// Runs `program [prefix_args..] -c <script> KIND NAME ARGS..` with `PYTHONPATH` extended by the
/// configured search roots.
#[derive(Debug, Clone)]
pub struct ProcessIntrospector {
    pub program: String,
    pub prefix_args: Vec<String>,
    pub search_roots: Vec<PathBuf>,
}

impl Default for ProcessIntrospector {
    fn default() -> Self {
        ProcessIntrospector {
            program: "python".to_string(),
            prefix_args: Vec::new(),
            search_roots: Vec::new(),
        }
    }
}

impl ProcessIntrospector {
    /// Build from a command line such as `python3 -X utf8`.
    pub fn from_command(command: &str, search_roots: Vec<PathBuf>) -> Result<Self, RideError> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| RideError::Data("introspector command is empty".to_string()))?;
        Ok(ProcessIntrospector {
            program,
            prefix_args: words.collect(),
            search_roots,
        })
    }

    fn pythonpath(&self, request: &LibraryRequest) -> Result<OsString, RideError> {
        let mut roots: Vec<PathBuf> = request.base_dir.iter().cloned().collect();
        roots.extend(self.search_roots.iter().cloned());
        if let Some(existing) = std::env::var_os("PYTHONPATH") {
            roots.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(roots)
            .map_err(|e| RideError::Data(format!("invalid search root in PYTHONPATH: {e}")))
    }

    pub fn spawn(&self, request: &LibraryRequest) -> Result<IntrospectionTask, RideError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .arg("-c")
            .arg(SCRIPT)
            .arg(request.kind.to_string())
            .arg(&request.name)
            .args(&request.args)
            .env("PYTHONPATH", self.pythonpath(request)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(base) = &request.base_dir {
            command.current_dir(base);
        }
        let description = format!("{} {} {}", self.program, request.kind, request.name);
        tracing::debug!("[Introspector] Spawning {}", description);
        let child = command.spawn().map_err(|e| RideError::ChildProcess {
            command: description.clone(),
            status: "not started".to_string(),
            stderr: e.to_string(),
        })?;
        IntrospectionTask::new(child, description, request.name.clone())
    }
}

impl Introspector for ProcessIntrospector {
    fn introspect(
        &self,
        request: &LibraryRequest,
        timeout: Duration,
    ) -> Result<LibrarySpec, RideError> {
        self.spawn(request)?.wait(timeout)
    }
}

/// A running introspection child. Dropping the task kills the child.
pub struct IntrospectionTask {
    child: Child,
    command: String,
    library: String,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    callbacks: Vec<Callback>,
}

impl std::fmt::Debug for IntrospectionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionTask")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .finish()
    }
}

fn collect<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = stream.read_to_end(&mut buffer) {
                tracing::warn!("[Introspector] Reading child output failed: {}", e);
            }
            buffer
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl IntrospectionTask {
    fn new(mut child: Child, command: String, library: String) -> Result<Self, RideError> {
        let stdout = collect(child.stdout.take());
        let stderr = collect(child.stderr.take());
        Ok(IntrospectionTask {
            child,
            command,
            library,
            stdout,
            stderr,
            callbacks: Vec::new(),
        })
    }

    /// Call `callback` with the `ride.library.introspection.*` event that ends the task.
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    fn notify(&mut self, result: &Result<LibrarySpec, RideError>) {
        if self.callbacks.is_empty() {
            return;
        }
        let (topic, detail) = match result {
            Ok(spec) => (
                topics::LIBRARY_INTROSPECTION_FINISHED,
                format!("{} keyword(s)", spec.keywords.len()),
            ),
            Err(e @ RideError::Timeout { .. }) => {
                (topics::LIBRARY_INTROSPECTION_TIMEOUT, e.to_string())
            }
            Err(e) => (topics::LIBRARY_INTROSPECTION_FAILED, e.to_string()),
        };
        let event = Event::new(
            topic,
            EventData::Introspection {
                name: self.library.clone(),
                detail,
            },
        );
        for callback in self.callbacks.iter_mut() {
            callback(&event);
        }
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Non-blocking completion check.
    pub fn is_finished(&mut self) -> Result<bool, RideError> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Wait for the child, killing it when `timeout` elapses.
    pub fn wait(mut self, timeout: Duration) -> Result<LibrarySpec, RideError> {
        let started = Instant::now();
        let status = loop {
            if let Some(status) = self.child.try_wait()? {
                break status;
            }
            if started.elapsed() >= timeout {
                tracing::warn!(
                    "[Introspector] {} exceeded {:?}, killing it",
                    self.command,
                    timeout
                );
                self.cancel();
                let timed_out = Err(RideError::Timeout {
                    what: self.command.clone(),
                    seconds: timeout.as_secs_f64(),
                });
                self.notify(&timed_out);
                return timed_out;
            }
            thread::sleep(POLL_INTERVAL);
        };
        let stdout = join(self.stdout.take());
        let stderr = String::from_utf8_lossy(&join(self.stderr.take())).into_owned();
        let result = self.finish(status, &stdout, stderr);
        self.notify(&result);
        result
    }

    pub fn cancel(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("[Introspector] Kill of {} failed: {}", self.command, e);
        }
        let _ = self.child.wait();
    }

    fn finish(
        &self,
        status: ExitStatus,
        stdout: &[u8],
        stderr: String,
    ) -> Result<LibrarySpec, RideError> {
        if status.code() == Some(NOT_FOUND_STATUS) {
            return Err(RideError::NotFound(format!(
                "library '{}': {}",
                self.library,
                stderr.trim()
            )));
        }
        if !status.success() {
            return Err(RideError::ChildProcess {
                command: self.command.clone(),
                status: status.to_string(),
                stderr,
            });
        }
        decode_payload(stdout)
    }
}

impl Drop for IntrospectionTask {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.cancel();
        }
    }
}

/// Decode `<decimal byte length>\n<json>`.
pub fn decode_payload(stdout: &[u8]) -> Result<LibrarySpec, RideError> {
    let newline = stdout
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| RideError::Serialization("introspection output has no length".into()))?;
    let length: usize = std::str::from_utf8(&stdout[..newline])
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| RideError::Serialization("introspection length is not a number".into()))?;
    let body = &stdout[newline + 1..];
    if body.len() < length {
        return Err(RideError::Serialization(format!(
            "introspection payload truncated: expected {length} bytes, got {}",
            body.len()
        )));
    }
    Ok(serde_json::from_slice(&body[..length])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_length_prefixed_json() {
        let json = r#"{"name":"Lib","keywords":[{"name":"Do It","args":["a"]}]}"#;
        let stdout = format!("{}\n{}", json.len(), json);
        let spec = decode_payload(stdout.as_bytes()).unwrap();
        assert_eq!(spec.name, "Lib");
        assert_eq!(spec.keywords[0].args, vec!["a"]);

        assert!(decode_payload(b"").is_err());
        assert!(decode_payload(b"x\n{}").is_err());
        assert!(decode_payload(b"10\n{}").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failing_child_reports_stderr() {
        let introspector = ProcessIntrospector {
            program: "sh".into(),
            prefix_args: vec!["-c".into(), "echo boom >&2; exit 3".into(), "sh".into()],
            search_roots: Vec::new(),
        };
        let err = introspector
            .introspect(&LibraryRequest::library("Lib", &[]), Duration::from_secs(5))
            .unwrap_err();
        match err {
            RideError::ChildProcess { stderr, .. } => assert!(stderr.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn not_found_and_timeout() {
        let missing = ProcessIntrospector {
            program: "sh".into(),
            prefix_args: vec!["-c".into(), "exit 2".into(), "sh".into()],
            search_roots: Vec::new(),
        };
        assert!(matches!(
            missing.introspect(&LibraryRequest::library("Nope", &[]), Duration::from_secs(5)),
            Err(RideError::NotFound(_))
        ));

        let slow = ProcessIntrospector {
            program: "sh".into(),
            prefix_args: vec!["-c".into(), "sleep 5".into(), "sh".into()],
            search_roots: Vec::new(),
        };
        let started = Instant::now();
        assert!(matches!(
            slow.introspect(&LibraryRequest::library("Slow", &[]), Duration::from_millis(100)),
            Err(RideError::Timeout { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn task_callbacks_see_how_it_ended() {
        use parking_lot::Mutex;
        use std::sync::Arc;

        let seen: Arc<Mutex<Vec<Event>>> = Arc::default();
        for (script, timeout) in [("sleep 5", 100), ("exit 2", 5000)] {
            let introspector = ProcessIntrospector {
                program: "sh".into(),
                prefix_args: vec!["-c".into(), script.into(), "sh".into()],
                search_roots: Vec::new(),
            };
            let mut task = introspector
                .spawn(&LibraryRequest::library("Slow", &[]))
                .unwrap();
            let sink = Arc::clone(&seen);
            task.on_event(move |e| sink.lock().push(e.clone()));
            assert!(task.wait(Duration::from_millis(timeout)).is_err());
        }
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].topic, topics::LIBRARY_INTROSPECTION_TIMEOUT);
        assert_eq!(seen[1].topic, topics::LIBRARY_INTROSPECTION_FAILED);
        assert!(matches!(
            &seen[1].data,
            EventData::Introspection { name, .. } if name == "Slow"
        ));
    }
}
