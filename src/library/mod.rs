//! External keyword libraries and variable files.
//!
//! Importing a library means running foreign code, so the [`LibraryLoader`] never does it
//! in-process. An [`Introspector`] produces a [`LibrarySpec`] (keywords with their argument
//! signatures and documentation, or the variables of a dynamic variable file); the default
//! [`ProcessIntrospector`] runs a child interpreter per request and reads a length-prefixed JSON
//! payload from its stdout.
//!
//! Results are cached by `(name, arguments, mtime)`. The mtime is taken from the library file
//! when the import names a path, so editing a library file invalidates its entry; imports by
//! module name keep their entry until [`LibraryLoader::clear`]. Of the failures only `NotFound`
//! is cached. Timeouts and crashed children are retried on the next request.
//!
//! Introspection runs on the calling thread, bounded by the loader timeout. With an
//! [`EventSender`] attached, each uncached request posts `ride.library.introspection.*`
//! events that the owner delivers on its next drain.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::{
    error::RideError,
    event::{topics, Event, EventData},
    publisher::EventSender,
};

pub mod process;

pub use process::{IntrospectionTask, ProcessIntrospector};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeywordSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub doc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Name including sigil and braces
    pub name: String,
    #[serde(default)]
    pub value: Vec<String>,
}

impl VariableSpec {
    pub fn scalar(name: &str, value: &str) -> Self {
        VariableSpec {
            name: format!("${{{name}}}"),
            value: vec![value.to_string()],
        }
    }
}

/// What an introspection child reports back.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibrarySpec {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub keywords: Vec<KeywordSpec>,
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Library,
    Variables,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Library => write!(f, "library"),
            RequestKind::Variables => write!(f, "variables"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryRequest {
    pub kind: RequestKind,
    /// Module name, `module.Class`, or a path to a library file
    pub name: String,
    pub args: Vec<String>,
    /// Directory of the importing data file, searched before the configured roots
    pub base_dir: Option<PathBuf>,
}

impl LibraryRequest {
    pub fn library(name: &str, args: &[String]) -> Self {
        LibraryRequest {
            kind: RequestKind::Library,
            name: name.to_string(),
            args: args.to_vec(),
            base_dir: None,
        }
    }

    pub fn is_path(&self) -> bool {
        self.name.contains('/') || self.name.contains('\\') || self.name.ends_with(".py")
    }

    /// Modification time of the library file, for imports by path.
    pub fn discovered_mtime(&self) -> Option<SystemTime> {
        if !self.is_path() {
            return None;
        }
        let path = Path::new(&self.name);
        let path = match (&self.base_dir, path.is_absolute()) {
            (Some(base), false) => base.join(path),
            _ => path.to_path_buf(),
        };
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// Produces the spec of a library or variable file.
pub trait Introspector: Send + Sync {
    fn introspect(&self, request: &LibraryRequest, timeout: Duration)
        -> Result<LibrarySpec, RideError>;
}

type CacheKey = (RequestKind, String, Vec<String>, Option<SystemTime>);

pub struct LibraryLoader {
    introspector: Box<dyn Introspector>,
    timeout: Duration,
    cache: Mutex<HashMap<CacheKey, Result<LibrarySpec, RideError>>>,
    events: Option<EventSender>,
}

impl fmt::Debug for LibraryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryLoader")
            .field("timeout", &self.timeout)
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl LibraryLoader {
    pub fn new(introspector: Box<dyn Introspector>, timeout: Duration) -> Self {
        LibraryLoader {
            introspector,
            timeout,
            cache: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Post introspection progress through `sender`.
    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    fn post(&self, topic: &str, request: &LibraryRequest, detail: String) {
        let Some(sender) = &self.events else {
            return;
        };
        let event = Event::new(
            topic,
            EventData::Introspection {
                name: request.name.clone(),
                detail,
            },
        );
        if sender.send(event).is_err() {
            tracing::debug!("[LibraryLoader] Publisher is gone, dropping introspection event");
        }
    }

    pub fn load(&self, request: &LibraryRequest) -> Result<LibrarySpec, RideError> {
        let key = (
            request.kind,
            request.name.clone(),
            request.args.clone(),
            request.discovered_mtime(),
        );
        if let Some(cached) = self.cache.lock().get(&key) {
            return cached.clone();
        }
        tracing::debug!(
            "[LibraryLoader] Introspecting {} {} {:?}",
            request.kind,
            request.name,
            request.args
        );
        self.post(topics::LIBRARY_INTROSPECTION_STARTED, request, String::new());
        let result = self.introspector.introspect(request, self.timeout);
        match &result {
            Ok(spec) => self.post(
                topics::LIBRARY_INTROSPECTION_FINISHED,
                request,
                format!("{} keyword(s)", spec.keywords.len()),
            ),
            Err(e) => {
                tracing::warn!("[LibraryLoader] Importing {} failed: {}", request.name, e);
                let topic = match e {
                    RideError::Timeout { .. } => topics::LIBRARY_INTROSPECTION_TIMEOUT,
                    _ => topics::LIBRARY_INTROSPECTION_FAILED,
                };
                self.post(topic, request, e.to_string());
            }
        }
        if matches!(result, Ok(_) | Err(RideError::NotFound(_))) {
            self.cache.lock().insert(key, result.clone());
        }
        result
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    /// Serves canned specs; unknown names are reported as not found.
    #[derive(Default, Clone)]
    pub(crate) struct StaticIntrospector {
        pub specs: Arc<Mutex<HashMap<String, LibrarySpec>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl StaticIntrospector {
        pub fn with(specs: impl IntoIterator<Item = LibrarySpec>) -> Self {
            let introspector = StaticIntrospector::default();
            for spec in specs {
                introspector.specs.lock().insert(spec.name.clone(), spec);
            }
            introspector
        }
    }

    impl Introspector for StaticIntrospector {
        fn introspect(
            &self,
            request: &LibraryRequest,
            _timeout: Duration,
        ) -> Result<LibrarySpec, RideError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.specs
                .lock()
                .get(&request.name)
                .cloned()
                .ok_or_else(|| RideError::NotFound(format!("library {}", request.name)))
        }
    }

    /// Times out on the first request, answers afterwards.
    struct Flaky {
        calls: Arc<AtomicUsize>,
    }

    impl Introspector for Flaky {
        fn introspect(
            &self,
            request: &LibraryRequest,
            timeout: Duration,
        ) -> Result<LibrarySpec, RideError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RideError::Timeout {
                    what: request.name.clone(),
                    seconds: timeout.as_secs_f64(),
                });
            }
            Ok(LibrarySpec {
                name: request.name.clone(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn timeouts_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = LibraryLoader::new(
            Box::new(Flaky {
                calls: calls.clone(),
            }),
            Duration::from_millis(10),
        );
        let request = LibraryRequest::library("SlowLib", &[]);
        assert!(matches!(loader.load(&request), Err(RideError::Timeout { .. })));
        assert_eq!(loader.cached(), 0);
        assert_eq!(loader.load(&request).unwrap().name, "SlowLib");
        assert!(loader.load(&request).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn introspection_posts_progress_events() {
        let mut publisher = crate::publisher::Publisher::new();
        let seen: std::rc::Rc<std::cell::RefCell<Vec<(String, EventData)>>> = Default::default();
        let sink = seen.clone();
        publisher.subscribe(topics::LIBRARY, move |e| {
            sink.borrow_mut().push((e.topic.clone(), e.data.clone()));
            Ok(())
        });
        let loader = LibraryLoader::new(
            Box::new(Flaky {
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Duration::from_millis(10),
        )
        .with_events(publisher.sender());
        let request = LibraryRequest::library("SlowLib", &[]);
        assert!(loader.load(&request).is_err());
        assert!(loader.load(&request).is_ok());
        // Cached, no further events
        assert!(loader.load(&request).is_ok());
        assert_eq!(publisher.drain(), 4);

        let seen = seen.borrow();
        let topics_seen: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            topics_seen,
            vec![
                topics::LIBRARY_INTROSPECTION_STARTED,
                topics::LIBRARY_INTROSPECTION_TIMEOUT,
                topics::LIBRARY_INTROSPECTION_STARTED,
                topics::LIBRARY_INTROSPECTION_FINISHED,
            ]
        );
        assert_eq!(
            seen[3].1,
            EventData::Introspection {
                name: "SlowLib".into(),
                detail: "0 keyword(s)".into(),
            }
        );
    }

    #[test]
    fn results_and_missing_libraries_are_cached() {
        let introspector = StaticIntrospector::with([LibrarySpec {
            name: "Collections".into(),
            keywords: vec![KeywordSpec {
                name: "Append To List".into(),
                args: vec!["list_".into(), "*values".into()],
                doc: String::new(),
            }],
            ..Default::default()
        }]);
        let calls = introspector.calls.clone();
        let loader = LibraryLoader::new(Box::new(introspector), Duration::from_secs(1));

        let request = LibraryRequest::library("Collections", &[]);
        assert_eq!(loader.load(&request).unwrap().keywords.len(), 1);
        assert!(loader.load(&request).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let missing = LibraryRequest::library("Missing", &[]);
        assert!(matches!(loader.load(&missing), Err(RideError::NotFound(_))));
        assert!(loader.load(&missing).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Different arguments are a different library instance
        let with_args = LibraryRequest::library("Collections", &["x".to_string()]);
        assert!(loader.load(&with_args).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        loader.clear();
        assert_eq!(loader.cached(), 0);
    }
}
