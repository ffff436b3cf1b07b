//! Keyword and variable resolution across a data file's import graph.
//!
//! A *context* is a data file together with everything it transitively imports. Keyword lookup
//! tries, in order:
//!
//! 1. keywords defined in the context file itself,
//! 2. keywords of imported resource files, depth first (each import graph node is visited once,
//!    so `A -> B -> A` cycles terminate),
//! 3. keywords of imported libraries, introspected through the [`LibraryLoader`],
//! 4. the `BuiltIn` library.
//!
//! Variables resolve analogously: local table, imported resources, variable files, command
//! line overrides, then built-in variables.
//!
//! Every answer is cached in an [`ExpiringCache`] keyed by `(context, query, name)`. A cached
//! answer remembers the generation of every data file it read; a later lookup whose files moved
//! to a new generation recomputes instead of returning the stale answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use crate::{
    cache::ExpiringCache,
    controller::FileId,
    error::RideError,
    library::{LibraryLoader, LibraryRequest, LibrarySpec, RequestKind, VariableSpec},
    model::{DataFile, ElementId, Import, ImportKind},
};

pub mod builtin;
pub mod names;
pub mod varfile;

use names::KeywordMatcher;

static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

/// Read access to the loaded data files, implemented by the project.
pub trait DataFiles {
    fn datafile(&self, id: FileId) -> Option<&DataFile>;
    /// Generation counter of a data file; bumped on every content change.
    fn generation(&self, id: FileId) -> u64;
    fn file_at(&self, path: &Path) -> Option<FileId>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceOptions {
    pub cache_ttl: Duration,
    /// Searched for imports after the importing file's directory
    pub search_roots: Vec<PathBuf>,
    /// `--variable NAME:value` style overrides
    pub variable_overrides: Vec<VariableSpec>,
}

impl Default for NamespaceOptions {
    fn default() -> Self {
        NamespaceOptions {
            cache_ttl: Duration::from_secs(2),
            search_roots: Vec::new(),
            variable_overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeywordSource {
    Local {
        file: FileId,
        path: PathBuf,
        element: ElementId,
    },
    Resource {
        file: FileId,
        path: PathBuf,
        element: ElementId,
    },
    Library {
        library: String,
    },
    BuiltIn,
}

impl KeywordSource {
    /// Position in the resolution order; equal ranks between candidates are ambiguous.
    pub fn rank(&self) -> u8 {
        match self {
            KeywordSource::Local { .. } => 0,
            KeywordSource::Resource { .. } => 1,
            KeywordSource::Library { .. } => 2,
            KeywordSource::BuiltIn => 3,
        }
    }

    /// Name usable as a qualifier: resource basename or library name.
    pub fn owner(&self) -> String {
        match self {
            KeywordSource::Local { path, .. } | KeywordSource::Resource { path, .. } => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            KeywordSource::Library { library } => library.clone(),
            KeywordSource::BuiltIn => builtin::BUILTIN_LIBRARY.to_string(),
        }
    }
}

impl fmt::Display for KeywordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordSource::Local { path, .. } => write!(f, "{}", path.display()),
            KeywordSource::Resource { path, .. } => write!(f, "resource {}", path.display()),
            KeywordSource::Library { library } => write!(f, "library {library}"),
            KeywordSource::BuiltIn => write!(f, "library {}", builtin::BUILTIN_LIBRARY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRef {
    pub name: String,
    pub source: KeywordSource,
    pub args: Vec<String>,
    pub doc: String,
    /// Later candidates hidden by this one
    pub shadowed: Vec<KeywordSource>,
}

impl KeywordRef {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.source.owner(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableSource {
    Local { file: FileId },
    Resource { file: FileId, path: PathBuf },
    VariableFile { path: PathBuf },
    CommandLine,
    BuiltIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRef {
    pub name: String,
    pub value: Vec<String>,
    pub source: VariableSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Query {
    FindKeyword,
    FindVariable,
    UserKeywords,
    Variables,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    context: FileId,
    query: Query,
    name: String,
}

#[derive(Debug, Clone)]
enum Answer {
    Keywords(Vec<KeywordRef>),
    Variables(Vec<VariableRef>),
}

#[derive(Debug, Clone)]
struct Stamped {
    stamps: Vec<(FileId, u64)>,
    answer: Answer,
}

/// Files and imports reachable from one context.
#[derive(Debug, Default)]
struct Walk {
    /// Context file first, then resources in depth-first order
    files: Vec<FileId>,
    libraries: Vec<(FileId, Import)>,
    variable_files: Vec<(FileId, Import)>,
    stamps: Vec<(FileId, u64)>,
}

#[derive(Debug)]
pub struct Namespace {
    options: NamespaceOptions,
    loader: LibraryLoader,
    cache: ExpiringCache<CacheKey, Stamped>,
}

impl Namespace {
    pub fn new(options: NamespaceOptions, loader: LibraryLoader) -> Self {
        let cache = ExpiringCache::new(options.cache_ttl);
        Namespace {
            options,
            loader,
            cache,
        }
    }

    pub fn options(&self) -> &NamespaceOptions {
        &self.options
    }

    pub fn loader(&self) -> &LibraryLoader {
        &self.loader
    }

    /// Drop every cached answer and library spec.
    pub fn flush(&self) {
        tracing::debug!("[Namespace] Flushing caches");
        self.cache.clear();
        self.loader.clear();
    }

    pub fn cached_answers(&self) -> usize {
        self.cache.len()
    }

    pub fn find_keyword(
        &self,
        files: &dyn DataFiles,
        context: FileId,
        name: &str,
    ) -> Option<KeywordRef> {
        let mut candidates = self.keyword_candidates(files, context, name).into_iter();
        let mut winner = candidates.next()?;
        winner.shadowed = candidates.map(|c| c.source).collect();
        Some(winner)
    }

    /// Resolve a call, reporting unknown and ambiguous names as errors.
    pub fn check_keyword(
        &self,
        files: &dyn DataFiles,
        context: FileId,
        name: &str,
    ) -> Result<KeywordRef, RideError> {
        let candidates = self.keyword_candidates(files, context, name);
        let Some(first) = candidates.first() else {
            return Err(RideError::Resolve(format!("No keyword with name '{name}' found")));
        };
        let tied: Vec<&KeywordRef> = candidates
            .iter()
            .filter(|c| c.source.rank() == first.source.rank())
            .collect();
        if tied.len() > 1 {
            return Err(RideError::AmbiguousRef {
                name: name.to_string(),
                candidates: tied.iter().map(|c| c.qualified_name()).collect(),
            });
        }
        let mut winner = first.clone();
        winner.shadowed = candidates[1..].iter().map(|c| c.source.clone()).collect();
        Ok(winner)
    }

    /// Every keyword matching `name`, in resolution order.
    pub fn keyword_candidates(
        &self,
        files: &dyn DataFiles,
        context: FileId,
        name: &str,
    ) -> Vec<KeywordRef> {
        match self.cached(files, context, Query::FindKeyword, name, |walk| {
            Answer::Keywords(self.compute_keywords(files, walk, Some(name)))
        }) {
            Some(Answer::Keywords(found)) => found,
            _ => Vec::new(),
        }
    }

    pub fn find_variable(
        &self,
        files: &dyn DataFiles,
        context: FileId,
        name: &str,
    ) -> Option<VariableRef> {
        let name = name.trim();
        match self.cached(files, context, Query::FindVariable, name, |walk| {
            let found = self
                .compute_variables(files, walk)
                .into_iter()
                .filter(|v| v.name == name)
                .collect();
            Answer::Variables(found)
        }) {
            Some(Answer::Variables(found)) => found.into_iter().next(),
            _ => None,
        }
    }

    /// Keywords defined in the context file and its resources.
    pub fn list_user_keywords(&self, files: &dyn DataFiles, context: FileId) -> Vec<KeywordRef> {
        match self.cached(files, context, Query::UserKeywords, "", |walk| {
            Answer::Keywords(self.compute_keywords(files, walk, None))
        }) {
            Some(Answer::Keywords(found)) => found,
            _ => Vec::new(),
        }
    }

    /// Every variable visible in the context, shadowed ones included, in resolution order.
    pub fn list_variables(&self, files: &dyn DataFiles, context: FileId) -> Vec<VariableRef> {
        match self.cached(files, context, Query::Variables, "", |walk| {
            Answer::Variables(self.compute_variables(files, walk))
        }) {
            Some(Answer::Variables(found)) => found,
            _ => Vec::new(),
        }
    }

    /// Resolve a resource or variable file import to an existing file.
    pub fn resolve_import_path(&self, importer: &DataFile, name: &str) -> Option<PathBuf> {
        let substituted = self.substitute(importer, name);
        let candidate = PathBuf::from(substituted.trim());
        let mut tries = Vec::new();
        if candidate.is_absolute() {
            tries.push(candidate);
        } else {
            if let Some(base) = importer.source.parent() {
                tries.push(base.join(&candidate));
            }
            tries.extend(self.options.search_roots.iter().map(|r| r.join(&candidate)));
        }
        tries.into_iter().map(normalize_path).find(|p| p.is_file())
    }

    fn cached(
        &self,
        files: &dyn DataFiles,
        context: FileId,
        query: Query,
        name: &str,
        compute: impl FnOnce(&Walk) -> Answer,
    ) -> Option<Answer> {
        let key = CacheKey {
            context,
            query,
            name: name.to_string(),
        };
        if let Some(hit) = self.cache.get(&key) {
            if hit
                .stamps
                .iter()
                .all(|(id, generation)| files.generation(*id) == *generation)
            {
                return Some(hit.answer);
            }
            tracing::trace!("[Namespace] Stale answer for {:?} '{}'", query, name);
        }
        let walk = self.walk(files, context)?;
        let answer = compute(&walk);
        self.cache.put(
            key,
            Stamped {
                stamps: walk.stamps,
                answer: answer.clone(),
            },
        );
        Some(answer)
    }

    fn walk(&self, files: &dyn DataFiles, context: FileId) -> Option<Walk> {
        files.datafile(context)?;
        let mut walk = Walk::default();
        let mut visited = HashSet::new();
        self.visit(files, context, &mut visited, &mut walk);
        Some(walk)
    }

    fn visit(
        &self,
        files: &dyn DataFiles,
        id: FileId,
        visited: &mut HashSet<FileId>,
        walk: &mut Walk,
    ) {
        if !visited.insert(id) {
            return;
        }
        let Some(datafile) = files.datafile(id) else {
            return;
        };
        walk.files.push(id);
        walk.stamps.push((id, files.generation(id)));
        for import in datafile.imports() {
            match import.kind {
                ImportKind::Resource => {
                    let resolved = self
                        .resolve_import_path(datafile, &import.name)
                        .and_then(|path| files.file_at(&path));
                    match resolved {
                        Some(resource) => self.visit(files, resource, visited, walk),
                        None => tracing::debug!(
                            "[Namespace] Resource '{}' imported by {} is not loaded",
                            import.name,
                            datafile.source.display()
                        ),
                    }
                }
                ImportKind::Library => walk.libraries.push((id, import)),
                ImportKind::Variables => walk.variable_files.push((id, import)),
            }
        }
    }

    fn compute_keywords(
        &self,
        files: &dyn DataFiles,
        walk: &Walk,
        name: Option<&str>,
    ) -> Vec<KeywordRef> {
        let mut found = Vec::new();
        for (position, id) in walk.files.iter().enumerate() {
            let Some(datafile) = files.datafile(*id) else {
                continue;
            };
            let owner = datafile
                .source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            for keyword in datafile.keywords() {
                if let Some(call) = name {
                    let matcher = KeywordMatcher::new(keyword.name());
                    if !matcher.matches(call)
                        && !matcher.matches_qualified(call, std::slice::from_ref(&owner))
                    {
                        continue;
                    }
                }
                let source = if position == 0 {
                    KeywordSource::Local {
                        file: *id,
                        path: datafile.source.clone(),
                        element: keyword.id,
                    }
                } else {
                    KeywordSource::Resource {
                        file: *id,
                        path: datafile.source.clone(),
                        element: keyword.id,
                    }
                };
                found.push(KeywordRef {
                    name: keyword.name().to_string(),
                    source,
                    args: keyword.arguments(),
                    doc: keyword.documentation(),
                    shadowed: Vec::new(),
                });
            }
        }
        let Some(call) = name else {
            return found;
        };

        for (importer, import) in &walk.libraries {
            let Some(datafile) = files.datafile(*importer) else {
                continue;
            };
            let request = self.library_request(datafile, import, RequestKind::Library);
            let spec = match self.loader.load(&request) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::debug!("[Namespace] Skipping library {}: {}", import.name, e);
                    continue;
                }
            };
            let public = import.alias.clone().unwrap_or_else(|| spec.name.clone());
            let owners = vec![public.clone(), import.name.clone()];
            found.extend(matching_library_keywords(&spec, call, &owners, || {
                KeywordSource::Library {
                    library: public.clone(),
                }
            }));
        }

        let builtin = builtin::library();
        let owners = vec![builtin.name.clone()];
        found.extend(matching_library_keywords(builtin, call, &owners, || {
            KeywordSource::BuiltIn
        }));
        found
    }

    fn compute_variables(&self, files: &dyn DataFiles, walk: &Walk) -> Vec<VariableRef> {
        let mut found = Vec::new();
        for (position, id) in walk.files.iter().enumerate() {
            let Some(datafile) = files.datafile(*id) else {
                continue;
            };
            for variable in datafile.variables() {
                let source = if position == 0 {
                    VariableSource::Local { file: *id }
                } else {
                    VariableSource::Resource {
                        file: *id,
                        path: datafile.source.clone(),
                    }
                };
                found.push(VariableRef {
                    name: variable.name,
                    value: variable.value,
                    source,
                });
            }
        }
        for (importer, import) in &walk.variable_files {
            let Some(datafile) = files.datafile(*importer) else {
                continue;
            };
            match self.load_variable_file(datafile, import) {
                Ok((path, variables)) => {
                    found.extend(variables.into_iter().map(|v| VariableRef {
                        name: v.name,
                        value: v.value,
                        source: VariableSource::VariableFile { path: path.clone() },
                    }));
                }
                Err(e) => {
                    tracing::debug!("[Namespace] Skipping variable file {}: {}", import.name, e)
                }
            }
        }
        found.extend(
            self.options
                .variable_overrides
                .iter()
                .map(|v| VariableRef {
                    name: v.name.clone(),
                    value: v.value.clone(),
                    source: VariableSource::CommandLine,
                }),
        );
        found.extend(builtin::library().variables.iter().map(|v| VariableRef {
            name: v.name.clone(),
            value: v.value.clone(),
            source: VariableSource::BuiltIn,
        }));
        found
    }

    fn load_variable_file(
        &self,
        importer: &DataFile,
        import: &Import,
    ) -> Result<(PathBuf, Vec<VariableSpec>), RideError> {
        let path = self
            .resolve_import_path(importer, &import.name)
            .ok_or_else(|| RideError::NotFound(format!("variable file {}", import.name)))?;
        if varfile::is_static(&path) {
            let variables = varfile::load(&path)?;
            return Ok((path, variables));
        }
        let request = self.library_request(importer, import, RequestKind::Variables);
        let spec = self.loader.load(&request)?;
        Ok((path, spec.variables))
    }

    fn library_request(&self, importer: &DataFile, import: &Import, kind: RequestKind) -> LibraryRequest {
        let mut request = LibraryRequest {
            kind,
            name: self.substitute(importer, &import.name),
            args: import
                .args
                .iter()
                .map(|a| self.substitute(importer, a))
                .collect(),
            base_dir: importer.source.parent().map(Path::to_path_buf),
        };
        if request.is_path() {
            if let Some(path) = self.resolve_import_path(importer, &import.name) {
                request.name = path.to_string_lossy().into_owned();
            }
        }
        request
    }

    /// Substitute `${CURDIR}`, `${EXECDIR}`, `${/}`, `${:}`, `${SPACE}` and the importer's own
    /// scalar variables in an import setting.
    pub fn substitute(&self, importer: &DataFile, text: &str) -> String {
        if !text.contains("${") {
            return text.to_string();
        }
        let variables = importer.variables();
        VARIABLE_REF
            .replace_all(text, |caps: &regex::Captures| {
                let inner = &caps[1];
                match inner {
                    "CURDIR" => importer
                        .source
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    "EXECDIR" => std::env::current_dir()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    "/" => std::path::MAIN_SEPARATOR_STR.to_string(),
                    ":" => if cfg!(windows) { ";" } else { ":" }.to_string(),
                    "SPACE" => " ".to_string(),
                    _ => variables
                        .iter()
                        .find(|v| v.name == caps[0])
                        .map(|v| v.value.join(" "))
                        .unwrap_or_else(|| caps[0].to_string()),
                }
            })
            .into_owned()
    }
}

fn matching_library_keywords(
    spec: &LibrarySpec,
    call: &str,
    owners: &[String],
    source: impl Fn() -> KeywordSource,
) -> Vec<KeywordRef> {
    spec.keywords
        .iter()
        .filter(|k| {
            let matcher = KeywordMatcher::new(&k.name);
            matcher.matches(call) || matcher.matches_qualified(call, owners)
        })
        .map(|k| KeywordRef {
            name: k.name.clone(),
            source: source(),
            args: k.args.clone(),
            doc: k.doc.clone(),
            shadowed: Vec::new(),
        })
        .collect()
}

/// Lexically normalise a path: drop `.` components and fold `..` into their parent.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::CodecOptions,
        library::{tests::StaticIntrospector, KeywordSpec},
    };
    use std::collections::HashMap;

    struct Files {
        files: HashMap<FileId, DataFile>,
        generations: HashMap<FileId, u64>,
    }

    impl DataFiles for Files {
        fn datafile(&self, id: FileId) -> Option<&DataFile> {
            self.files.get(&id)
        }
        fn generation(&self, id: FileId) -> u64 {
            self.generations.get(&id).copied().unwrap_or_default()
        }
        fn file_at(&self, path: &Path) -> Option<FileId> {
            self.files
                .iter()
                .find(|(_, f)| f.source == path)
                .map(|(id, _)| *id)
        }
    }

    fn fixture(dir: &Path) -> Files {
        let sources = [
            (
                "suite.robot",
                "*** Settings ***\nResource    a.resource\nLibrary    Collections\n\n*** Variables ***\n${LOCAL}    1\n\n*** Test Cases ***\nT\n    Shared\n",
            ),
            (
                "a.resource",
                "*** Settings ***\nResource    b.resource\nResource    ${CURDIR}/a.resource\n\n*** Variables ***\n${LOCAL}    shadowed\n\n*** Keywords ***\nShared\n    No Operation\nOpen ${page} Page\n    No Operation\n",
            ),
            (
                "b.resource",
                "*** Keywords ***\nShared\n    Log    b\nAppend To List\n    No Operation\n",
            ),
        ];
        let mut files = HashMap::new();
        for (idx, (name, text)) in sources.iter().enumerate() {
            let path = dir.join(name);
            std::fs::write(&path, text).unwrap();
            let datafile = DataFile::read(&path, &CodecOptions::default()).unwrap();
            files.insert(FileId(idx as u32), datafile);
        }
        Files {
            files,
            generations: HashMap::new(),
        }
    }

    fn namespace(ttl: Duration) -> Namespace {
        let introspector = StaticIntrospector::with([LibrarySpec {
            name: "Collections".into(),
            keywords: vec![KeywordSpec {
                name: "Append To List".into(),
                ..Default::default()
            }],
            ..Default::default()
        }]);
        Namespace::new(
            NamespaceOptions {
                cache_ttl: ttl,
                ..Default::default()
            },
            LibraryLoader::new(Box::new(introspector), Duration::from_secs(1)),
        )
    }

    #[test]
    fn resolution_order_and_shadowing() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let ns = namespace(Duration::from_secs(60));
        let suite = FileId(0);

        let shared = ns.find_keyword(&files, suite, "shared").unwrap();
        assert!(matches!(shared.source, KeywordSource::Resource { file: FileId(1), .. }));
        assert_eq!(shared.shadowed.len(), 1);
        // Two resources at the same depth rank tie
        assert!(matches!(
            ns.check_keyword(&files, suite, "Shared"),
            Err(RideError::AmbiguousRef { .. })
        ));
        assert!(ns.check_keyword(&files, suite, "b.Shared").is_ok());

        let open = ns.find_keyword(&files, suite, "Given Open Login Page").unwrap();
        assert_eq!(open.name, "Open ${page} Page");

        // Resource keyword beats the library one
        let append = ns.find_keyword(&files, suite, "Append To List").unwrap();
        assert!(matches!(append.source, KeywordSource::Resource { .. }));
        let qualified = ns.find_keyword(&files, suite, "Collections.Append To List").unwrap();
        assert!(matches!(qualified.source, KeywordSource::Library { .. }));

        assert_eq!(ns.find_keyword(&files, suite, "log").unwrap().source, KeywordSource::BuiltIn);
        assert!(matches!(
            ns.check_keyword(&files, suite, "Nope"),
            Err(RideError::Resolve(_))
        ));
        assert_eq!(ns.list_user_keywords(&files, suite).len(), 4);
    }

    #[test]
    fn variables_resolve_locally_first() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let ns = namespace(Duration::from_secs(60));
        let local = ns.find_variable(&files, FileId(0), "${LOCAL}").unwrap();
        assert_eq!(local.value, vec!["1"]);
        assert_eq!(local.source, VariableSource::Local { file: FileId(0) });
        assert!(ns.find_variable(&files, FileId(0), "${local}").is_none());
        assert!(ns.find_variable(&files, FileId(0), "${EMPTY}").is_some());
        let all = ns.list_variables(&files, FileId(0));
        assert_eq!(all.iter().filter(|v| v.name == "${LOCAL}").count(), 2);
    }

    #[test]
    fn generation_change_invalidates_cached_answers() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = fixture(dir.path());
        let ns = namespace(Duration::from_secs(60));
        assert!(ns.find_keyword(&files, FileId(0), "Fresh").is_none());

        let b = files.files.get_mut(&FileId(2)).unwrap();
        *b = DataFile::parse(
            &b.source.clone(),
            "*** Keywords ***\nFresh\n    No Operation\n",
            &CodecOptions::default(),
        )
        .unwrap();
        // Same generation: the cached miss is still served
        assert!(ns.find_keyword(&files, FileId(0), "Fresh").is_none());
        files.generations.insert(FileId(2), 1);
        assert!(ns.find_keyword(&files, FileId(0), "Fresh").is_some());
    }

    #[test]
    fn zero_ttl_never_caches() {
        let dir = tempfile::tempdir().unwrap();
        let files = fixture(dir.path());
        let ns = namespace(Duration::ZERO);
        assert!(ns.find_keyword(&files, FileId(0), "Shared").is_some());
        assert_eq!(ns.cached_answers(), 0);
    }

    #[test]
    fn paths_normalize_lexically() {
        assert_eq!(normalize_path("/a/b/../c/./d"), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path("../x"), PathBuf::from("../x"));
    }
}
