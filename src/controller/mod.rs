//! The project tree and its controllers.
//!
//! A [`Project`] is an arena of [`DataFileController`]s, one per loaded data file or directory,
//! addressed by [`FileId`]. Ownership flows from the project to the controllers; a controller
//! only remembers its parent's id, so the tree holds no reference cycles. Resource files that
//! are imported from outside the opened tree are attached with no parent.
//!
//! Every mutation goes through [`Project::execute`] with a [`Command`] aimed at a
//! [`ControllerId`]: a whole file, one of its tables, or a single test/keyword. Each applied
//! command records its inverse on that controller's own undo stack, marks the touched controller
//! (and therefore its ancestors) dirty, bumps the file's generation counter and publishes
//! `ride.controller.modified`.
//!
//! Saving checks the file's modification time and size against what was last read. A mismatch
//! is reported as [`RideError::ConcurrentModification`]; the caller then either reloads or
//! calls [`Project::save_overwrite`]. Writes happen inside a [`backup`](crate::backup) scope.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use walkdir::WalkDir;

use crate::{
    backup,
    codec::{CodecOptions, Dialect},
    error::RideError,
    event::{topics, Event, EventData},
    library::{Introspector, LibraryLoader, ProcessIntrospector},
    model::{
        keyword_cell, step_cells, step_kind, DataFile, DataFileKind, ElementId, ImportKind,
        StepKind, TableKind,
    },
    namespace::{normalize_path, DataFiles, KeywordRef, Namespace, NamespaceOptions, VariableRef},
    publisher::{EventSender, Publisher, SubscriptionId},
};

pub mod commands;
pub mod history;

pub use commands::{Command, Outcome, Targeted};
pub use history::History;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file:{}", self.0)
    }
}

/// Address of a controller: a data file, one of its tables, or one test/keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerId {
    File(FileId),
    Table(FileId, TableKind),
    Element(FileId, ElementId),
}

impl ControllerId {
    pub fn file(&self) -> FileId {
        match self {
            ControllerId::File(f) | ControllerId::Table(f, _) | ControllerId::Element(f, _) => *f,
        }
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerId::File(file) => write!(f, "{file}"),
            ControllerId::Table(file, kind) => write!(f, "{file}/{kind}"),
            ControllerId::Element(file, element) => write!(f, "{file}/{element}"),
        }
    }
}

/// What the file looked like on disk when it was last read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStamp {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub sha256: String,
}

impl DiskStamp {
    pub fn of(path: &Path, content: &[u8]) -> Result<Self, RideError> {
        let metadata = fs::metadata(path)?;
        Ok(DiskStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            sha256: hex::encode(Sha256::digest(content)),
        })
    }

    /// Whether the file on disk still has the recorded mtime and size.
    pub fn matches_disk(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(metadata) => metadata.len() == self.len && metadata.modified().ok() == self.modified,
            Err(_) => false,
        }
    }
}

#[derive(Debug)]
pub struct DataFileController {
    pub(crate) id: FileId,
    pub(crate) path: PathBuf,
    pub(crate) parent: Option<FileId>,
    pub(crate) children: Vec<FileId>,
    /// `None` for a directory without an initialization file
    pub(crate) datafile: Option<DataFile>,
    pub(crate) directory: bool,
    pub(crate) external: bool,
    pub(crate) dirty: bool,
    pub(crate) dirty_tables: HashSet<TableKind>,
    pub(crate) dirty_elements: HashSet<ElementId>,
    pub(crate) generation: u64,
    pub(crate) disk: Option<DiskStamp>,
}

impl DataFileController {
    fn new(id: FileId, path: PathBuf, parent: Option<FileId>, directory: bool) -> Self {
        DataFileController {
            id,
            path,
            parent,
            children: Vec::new(),
            datafile: None,
            directory,
            external: false,
            dirty: false,
            dirty_tables: HashSet::new(),
            dirty_elements: HashSet::new(),
            generation: 0,
            disk: None,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Directory path for directories, file path otherwise.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        match &self.datafile {
            Some(datafile) => datafile.name(),
            None => self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().replace('_', " "))
                .unwrap_or_default(),
        }
    }

    pub fn parent(&self) -> Option<FileId> {
        self.parent
    }

    pub fn children(&self) -> &[FileId] {
        &self.children
    }

    pub fn datafile(&self) -> Option<&DataFile> {
        self.datafile.as_ref()
    }

    pub fn kind(&self) -> Option<DataFileKind> {
        self.datafile.as_ref().map(|d| d.kind)
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// Imported from outside the opened tree.
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn disk_stamp(&self) -> Option<&DiskStamp> {
        self.disk.as_ref()
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
        self.dirty_tables.clear();
        self.dirty_elements.clear();
    }
}

#[derive(Debug, Clone)]
pub struct ProjectOptions {
    pub codec: CodecOptions,
    pub namespace: NamespaceOptions,
    /// Command line of the introspection interpreter
    pub introspector: String,
    pub introspection_timeout: Duration,
    /// Paths skipped when loading a directory tree
    pub excludes: Vec<glob::Pattern>,
    pub max_undo: usize,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        ProjectOptions {
            codec: CodecOptions::default(),
            namespace: NamespaceOptions::default(),
            introspector: "python".to_string(),
            introspection_timeout: Duration::from_secs(30),
            excludes: Vec::new(),
            max_undo: history::DEFAULT_MAX_UNDO,
        }
    }
}

impl ProjectOptions {
    fn is_excluded(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.excludes
            .iter()
            .any(|p| p.matches_path(path) || p.matches(name))
    }
}

/// A step or setting whose keyword does not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: FileId,
    pub target: ControllerId,
    pub row: usize,
    pub name: String,
    pub error: RideError,
}

#[derive(Debug)]
pub struct Project {
    pub(crate) options: ProjectOptions,
    pub(crate) files: BTreeMap<FileId, DataFileController>,
    pub(crate) root: Option<FileId>,
    next_id: u32,
    pub(crate) histories: HashMap<ControllerId, History>,
    pub(crate) namespace: Namespace,
    pub(crate) publisher: Publisher,
    errors: Vec<RideError>,
}

impl DataFiles for Project {
    fn datafile(&self, id: FileId) -> Option<&DataFile> {
        self.files.get(&id)?.datafile.as_ref()
    }

    fn generation(&self, id: FileId) -> u64 {
        self.files.get(&id).map(|c| c.generation).unwrap_or(u64::MAX)
    }

    fn file_at(&self, path: &Path) -> Option<FileId> {
        self.files
            .values()
            .find(|c| c.datafile.as_ref().is_some_and(|d| d.source == path))
            .map(|c| c.id)
    }
}

impl Project {
    /// An empty project using `introspector` for library imports.
    pub fn new(options: ProjectOptions, introspector: Box<dyn Introspector>) -> Self {
        let publisher = Publisher::new();
        let loader = LibraryLoader::new(introspector, options.introspection_timeout)
            .with_events(publisher.sender());
        let namespace = Namespace::new(options.namespace.clone(), loader);
        Project {
            options,
            files: BTreeMap::new(),
            root: None,
            next_id: 0,
            histories: HashMap::new(),
            namespace,
            publisher,
            errors: Vec::new(),
        }
    }

    /// Open a directory tree or a single data file, introspecting libraries in child processes.
    pub fn open(path: impl AsRef<Path>, options: ProjectOptions) -> Result<Self, RideError> {
        let introspector = ProcessIntrospector::from_command(
            &options.introspector,
            options.namespace.search_roots.clone(),
        )?;
        let mut project = Project::new(options, Box::new(introspector));
        project.load(path)?;
        Ok(project)
    }

    /// Load `path` as the project root, replacing any previous root.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<FileId, RideError> {
        let path = normalize_path(std::path::absolute(path.as_ref())?);
        if !path.exists() {
            return Err(RideError::NotFound(path.display().to_string()));
        }
        if self.root.is_some() {
            let tops: Vec<FileId> = self
                .files
                .values()
                .filter(|c| c.parent.is_none())
                .map(|c| c.id)
                .collect();
            for id in tops {
                self.close(ControllerId::File(id));
            }
            self.errors.clear();
        }
        tracing::info!("[Project] Loading {}", path.display());
        let root = if path.is_dir() {
            self.load_directory(&path, None)?
                .ok_or_else(|| RideError::Internal("root directory was dropped".to_string()))?
        } else {
            if !Dialect::is_supported(&path) {
                return Err(RideError::Data(format!(
                    "{} is not a supported data file",
                    path.display()
                )));
            }
            self.load_file(&path, None)?
        };
        self.root = Some(root);
        let attached = self.attach_external_resources();
        tracing::info!(
            "[Project] Loaded {} data file(s), {} external resource(s), {} error(s)",
            self.files.values().filter(|c| c.datafile.is_some()).count(),
            attached,
            self.errors.len()
        );
        self.publisher.drain();
        Ok(root)
    }

    fn allocate(&mut self, path: PathBuf, parent: Option<FileId>, directory: bool) -> FileId {
        let id = FileId(self.next_id);
        self.next_id += 1;
        self.files
            .insert(id, DataFileController::new(id, path, parent, directory));
        if let Some(parent) = parent.and_then(|p| self.files.get_mut(&p)) {
            parent.children.push(id);
        }
        id
    }

    fn read_datafile(&self, path: &Path) -> Result<(DataFile, DiskStamp), RideError> {
        let bytes = fs::read(path)?;
        let stamp = DiskStamp::of(path, &bytes)?;
        let datafile = DataFile::from_bytes(path, bytes, &self.options.codec)?;
        Ok((datafile, stamp))
    }

    fn load_file(&mut self, path: &Path, parent: Option<FileId>) -> Result<FileId, RideError> {
        let (datafile, stamp) = self.read_datafile(path)?;
        let id = self.allocate(path.to_path_buf(), parent, false);
        if let Some(controller) = self.files.get_mut(&id) {
            controller.datafile = Some(datafile);
            controller.disk = Some(stamp);
        }
        self.publish(Event::new(
            topics::DATAFILE_OPENED,
            EventData::DataFile {
                path: path.to_path_buf(),
            },
        ));
        Ok(id)
    }

    /// Load a directory node. Subdirectories without any data file are dropped; `Ok(None)`
    /// reports such a directory.
    fn load_directory(
        &mut self,
        dir: &Path,
        parent: Option<FileId>,
    ) -> Result<Option<FileId>, RideError> {
        let id = self.allocate(dir.to_path_buf(), parent, true);
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') || self.options.is_excluded(path) {
                tracing::debug!("[Project] Skipping {}", path.display());
                continue;
            }
            if entry.file_type().is_dir() {
                self.load_directory(path, Some(id))?;
                continue;
            }
            if !Dialect::is_supported(path) {
                continue;
            }
            let is_init = path
                .file_stem()
                .is_some_and(|s| s.eq_ignore_ascii_case("__init__"));
            if is_init {
                match self.read_datafile(path) {
                    Ok((datafile, stamp)) => {
                        if let Some(controller) = self.files.get_mut(&id) {
                            controller.datafile = Some(datafile);
                            controller.disk = Some(stamp);
                        }
                    }
                    Err(e) => self.record_error(e),
                }
                continue;
            }
            match self.read_datafile(path) {
                Ok((datafile, _)) if datafile.sections.is_empty() => {
                    tracing::debug!("[Project] {} holds no tables", path.display());
                }
                Ok(_) => {
                    if let Err(e) = self.load_file(path, Some(id)) {
                        self.record_error(e);
                    }
                }
                Err(e) => self.record_error(e),
            }
        }
        let keep = parent.is_none()
            || self
                .files
                .get(&id)
                .is_some_and(|c| !c.children.is_empty() || c.datafile.is_some());
        if keep {
            return Ok(Some(id));
        }
        self.files.remove(&id);
        if let Some(parent) = parent.and_then(|p| self.files.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        Ok(None)
    }

    fn record_error(&mut self, error: RideError) {
        tracing::warn!("[Project] {}", error);
        self.errors.push(error);
    }

    /// Load resource files imported from anywhere in the project that are not loaded yet.
    /// Returns how many were attached.
    pub fn attach_external_resources(&mut self) -> usize {
        let mut attached = 0;
        let mut failed: HashSet<PathBuf> = HashSet::new();
        loop {
            let mut wanted: Vec<PathBuf> = Vec::new();
            for controller in self.files.values() {
                let Some(datafile) = &controller.datafile else {
                    continue;
                };
                for import in datafile.imports() {
                    if import.kind != ImportKind::Resource {
                        continue;
                    }
                    let Some(path) = self.namespace.resolve_import_path(datafile, &import.name)
                    else {
                        continue;
                    };
                    if self.file_at(&path).is_none()
                        && !failed.contains(&path)
                        && !wanted.contains(&path)
                    {
                        wanted.push(path);
                    }
                }
            }
            if wanted.is_empty() {
                break;
            }
            for path in wanted {
                match self.load_file(&path, None) {
                    Ok(id) => {
                        if let Some(controller) = self.files.get_mut(&id) {
                            controller.external = true;
                        }
                        tracing::debug!("[Project] Attached external resource {}", path.display());
                        attached += 1;
                    }
                    Err(e) => {
                        failed.insert(path);
                        self.record_error(e);
                    }
                }
            }
        }
        if attached > 0 {
            self.namespace.flush();
        }
        attached
    }

    /// Create a new, unsaved resource file. It joins the directory node holding `path`, or
    /// becomes an external resource when no such node exists.
    pub fn new_resource(&mut self, path: impl AsRef<Path>) -> Result<FileId, RideError> {
        let path = normalize_path(std::path::absolute(path.as_ref())?);
        if path.exists() || self.file_at(&path).is_some() {
            return Err(RideError::Data(format!("{} already exists", path.display())));
        }
        let dialect = match Dialect::from_path(&path) {
            Some(Dialect::Space) if self.options.codec.default_dialect == Dialect::Pipe => {
                Dialect::Pipe
            }
            Some(dialect) => dialect,
            None => {
                return Err(RideError::Data(format!(
                    "{} has no supported extension",
                    path.display()
                )))
            }
        };
        let parent = self
            .files
            .values()
            .find(|c| c.directory && Some(c.path.as_path()) == path.parent())
            .map(|c| c.id);
        let id = self.allocate(path.clone(), parent, false);
        if let Some(controller) = self.files.get_mut(&id) {
            controller.datafile = Some(DataFile::new(&path, DataFileKind::Resource, dialect));
            controller.external = parent.is_none();
            controller.dirty = true;
        }
        self.publish(Event::new(
            topics::DATAFILE_CREATED,
            EventData::DataFile { path },
        ));
        Ok(id)
    }

    pub fn root(&self) -> Option<FileId> {
        self.root
    }

    pub fn options(&self) -> &ProjectOptions {
        &self.options
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Files that failed to load, with their parse errors.
    pub fn errors(&self) -> &[RideError] {
        &self.errors
    }

    pub fn controller(&self, id: FileId) -> Option<&DataFileController> {
        self.files.get(&id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &DataFileController> {
        self.files.values()
    }

    pub fn datafile(&self, id: FileId) -> Option<&DataFile> {
        DataFiles::datafile(self, id)
    }

    pub(crate) fn datafile_mut(&mut self, id: FileId) -> Result<&mut DataFile, RideError> {
        self.files
            .get_mut(&id)
            .and_then(|c| c.datafile.as_mut())
            .ok_or_else(|| RideError::NotFound(format!("data file {id}")))
    }

    pub fn file_at(&self, path: &Path) -> Option<FileId> {
        DataFiles::file_at(self, &normalize_path(path))
    }

    /// Depth-first `(depth, id)` listing of the tree, followed by external resources.
    pub fn tree(&self) -> Vec<(usize, FileId)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, FileId)> = self.root.map(|r| (0, r)).into_iter().collect();
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            if let Some(controller) = self.files.get(&id) {
                stack.extend(controller.children.iter().rev().map(|c| (depth + 1, *c)));
            }
        }
        out.extend(
            self.files
                .values()
                .filter(|c| c.parent.is_none() && Some(c.id) != self.root)
                .map(|c| (0, c.id)),
        );
        out
    }

    /// Cell text of the rows a controller exposes: table rows, test/keyword names, or steps.
    pub fn rows(&self, target: ControllerId) -> Result<Vec<Vec<String>>, RideError> {
        let datafile = self
            .datafile(target.file())
            .ok_or_else(|| RideError::NotFound(format!("data file {}", target.file())))?;
        let rows = match target {
            ControllerId::File(_) => {
                return Err(RideError::Command(
                    "a data file has tables, not rows".to_string(),
                ))
            }
            ControllerId::Table(_, kind) if kind.has_elements() => datafile
                .elements(kind)
                .iter()
                .map(|e| vec![e.name().to_string()])
                .collect(),
            ControllerId::Table(_, kind) => datafile
                .rows(kind)
                .iter()
                .map(|r| r.trimmed().to_vec())
                .collect(),
            ControllerId::Element(_, id) => {
                let (_, _, element) = datafile
                    .element(id)
                    .ok_or_else(|| RideError::NotFound(format!("test or keyword {id}")))?;
                element
                    .steps
                    .iter()
                    .map(|r| {
                        let cells = step_cells(r);
                        let end = cells
                            .iter()
                            .rposition(|c| !c.is_empty())
                            .map(|i| i + 1)
                            .unwrap_or(0);
                        cells[..end].to_vec()
                    })
                    .collect()
            }
        };
        Ok(rows)
    }

    pub fn is_dirty(&self, target: ControllerId) -> bool {
        let Some(controller) = self.files.get(&target.file()) else {
            return false;
        };
        match target {
            ControllerId::File(_) => {
                controller.dirty
                    || controller
                        .children
                        .iter()
                        .any(|c| self.is_dirty(ControllerId::File(*c)))
            }
            ControllerId::Table(_, kind) => {
                controller.dirty_tables.contains(&kind)
                    || controller.datafile.as_ref().is_some_and(|d| {
                        d.elements(kind)
                            .iter()
                            .any(|e| controller.dirty_elements.contains(&e.id))
                    })
            }
            ControllerId::Element(_, id) => controller.dirty_elements.contains(&id),
        }
    }

    /// Flag a controller as modified without changing it.
    pub fn mark_dirty(&mut self, target: ControllerId) {
        if let Some(controller) = self.files.get_mut(&target.file()) {
            controller.dirty = true;
            match target {
                ControllerId::Table(_, kind) => {
                    controller.dirty_tables.insert(kind);
                }
                ControllerId::Element(_, id) => {
                    controller.dirty_elements.insert(id);
                }
                ControllerId::File(_) => {}
            }
        }
    }

    /// Write the data file owning `target`. Returns false when there was nothing to write.
    pub fn save(&mut self, target: ControllerId) -> Result<bool, RideError> {
        self.save_file(target.file(), true)
    }

    /// Write even though the file changed on disk since it was read.
    pub fn save_overwrite(&mut self, target: ControllerId) -> Result<bool, RideError> {
        self.save_file(target.file(), false)
    }

    /// Save every dirty file. All files are attempted; the first failure is returned.
    pub fn save_all(&mut self) -> Result<usize, RideError> {
        let dirty: Vec<FileId> = self
            .files
            .values()
            .filter(|c| c.dirty && c.datafile.is_some())
            .map(|c| c.id)
            .collect();
        let mut saved = 0;
        let mut first_error = None;
        for id in dirty {
            match self.save_file(id, true) {
                Ok(true) => saved += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("[Project] Saving {} failed: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(saved),
        }
    }

    fn save_file(&mut self, id: FileId, check_disk: bool) -> Result<bool, RideError> {
        let codec = self.options.codec.clone();
        let controller = self
            .files
            .get_mut(&id)
            .ok_or_else(|| RideError::NotFound(format!("data file {id}")))?;
        let Some(datafile) = &controller.datafile else {
            return Ok(false);
        };
        if !controller.dirty && controller.disk.is_some() {
            return Ok(false);
        }
        let path = datafile.source.clone();
        if check_disk {
            let changed = match &controller.disk {
                Some(stamp) => !stamp.matches_disk(&path),
                None => path.exists(),
            };
            if changed {
                return Err(RideError::ConcurrentModification { path });
            }
        }
        let text = datafile.to_text(&codec);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        backup::with_backup(&path, |target| Ok(fs::write(target, text.as_bytes())?))?;
        controller.disk = Some(DiskStamp::of(&path, text.as_bytes())?);
        controller.clear_dirty();
        tracing::info!("[Project] Saved {}", path.display());
        self.publish(Event::new(
            topics::DATAFILE_SAVED,
            EventData::DataFile { path },
        ));
        Ok(true)
    }

    /// Re-read the data file owning `target` from disk, discarding unsaved changes and its
    /// undo history. Returns whether the content differed.
    pub fn reload(&mut self, target: ControllerId) -> Result<bool, RideError> {
        let id = target.file();
        let path = match self.files.get(&id) {
            Some(c) => match &c.datafile {
                Some(d) => d.source.clone(),
                None => return Ok(false),
            },
            None => return Err(RideError::NotFound(format!("data file {id}"))),
        };
        let bytes = fs::read(&path)?;
        let stamp = DiskStamp::of(&path, &bytes)?;
        let unchanged = self.files.get(&id).is_some_and(|c| {
            !c.dirty && c.disk.as_ref().is_some_and(|d| d.sha256 == stamp.sha256)
        });
        if unchanged {
            if let Some(controller) = self.files.get_mut(&id) {
                controller.disk = Some(stamp);
            }
            return Ok(false);
        }
        let datafile = DataFile::from_bytes(&path, bytes, &self.options.codec)?;
        if let Some(controller) = self.files.get_mut(&id) {
            controller.datafile = Some(datafile);
            controller.disk = Some(stamp);
            controller.clear_dirty();
            controller.generation += 1;
        }
        self.histories.retain(|k, _| k.file() != id);
        tracing::info!("[Project] Reloaded {}", path.display());
        self.publish(Event::new(
            topics::DATAFILE_RELOADED,
            EventData::DataFile { path },
        ));
        Ok(true)
    }

    /// Drop the controller owning `target` and all of its descendants.
    pub fn close(&mut self, target: ControllerId) -> usize {
        let id = target.file();
        let mut doomed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(controller) = self.files.get(&next) {
                stack.extend(controller.children.iter().copied());
                doomed.push(next);
            }
        }
        if let Some(parent) = self
            .files
            .get(&id)
            .and_then(|c| c.parent)
            .and_then(|p| self.files.get_mut(&p))
        {
            parent.children.retain(|c| *c != id);
        }
        for file in &doomed {
            if let Some(controller) = self.files.remove(file) {
                self.publish(Event::new(
                    topics::DATAFILE_CLOSED,
                    EventData::DataFile {
                        path: controller.path,
                    },
                ));
            }
        }
        self.histories.retain(|k, _| !doomed.contains(&k.file()));
        if self.root == Some(id) {
            self.root = None;
        }
        self.namespace.flush();
        doomed.len()
    }

    pub fn can_undo(&self, target: ControllerId) -> bool {
        self.histories.get(&target).is_some_and(History::can_undo)
    }

    pub fn can_redo(&self, target: ControllerId) -> bool {
        self.histories.get(&target).is_some_and(History::can_redo)
    }

    pub(crate) fn history_mut(&mut self, target: ControllerId) -> &mut History {
        let max_undo = self.options.max_undo;
        self.histories
            .entry(target)
            .or_insert_with(|| History::new(max_undo))
    }

    pub fn find_keyword(&self, context: FileId, name: &str) -> Option<KeywordRef> {
        self.namespace.find_keyword(self, context, name)
    }

    pub fn check_keyword(&self, context: FileId, name: &str) -> Result<KeywordRef, RideError> {
        self.namespace.check_keyword(self, context, name)
    }

    pub fn find_variable(&self, context: FileId, name: &str) -> Option<VariableRef> {
        self.namespace.find_variable(self, context, name)
    }

    pub fn list_user_keywords(&self, context: FileId) -> Vec<KeywordRef> {
        self.namespace.list_user_keywords(self, context)
    }

    pub fn list_variables(&self, context: FileId) -> Vec<VariableRef> {
        self.namespace.list_variables(self, context)
    }

    /// Every step and setting whose keyword cannot be resolved unambiguously.
    pub fn unresolved_keywords(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for controller in self.files.values() {
            let Some(datafile) = &controller.datafile else {
                continue;
            };
            let file = controller.id;
            let templated_suite = datafile
                .setting("Test Template")
                .or_else(|| datafile.setting("Task Template"))
                .is_some_and(|v| v.iter().any(|c| !c.is_empty()));
            let mut check = |target: ControllerId, row: usize, name: &str| {
                if name.starts_with(['$', '@', '&']) {
                    return;
                }
                if let Err(error) = self.check_keyword(file, name) {
                    diagnostics.push(Diagnostic {
                        file,
                        target,
                        row,
                        name: name.to_string(),
                        error,
                    });
                }
            };
            for kind in [TableKind::TestCases, TableKind::Keywords] {
                for element in datafile.elements(kind) {
                    let templated = element.setting("[Template]").is_some()
                        || (kind == TableKind::TestCases && templated_suite);
                    let target = ControllerId::Element(file, element.id);
                    for (row, step) in element.steps.iter().enumerate() {
                        let Some(cell) = keyword_cell(step) else {
                            continue;
                        };
                        let is_setting = step_kind(step) == StepKind::Setting;
                        if templated && !is_setting {
                            continue;
                        }
                        check(target, row, &step_cells(step)[cell]);
                    }
                }
            }
        }
        diagnostics
    }

    pub fn subscribe<F>(&mut self, prefix: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> Result<(), RideError> + 'static,
    {
        self.publisher.subscribe(prefix, listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Handle for worker threads; their events are delivered by [`Project::drain_events`].
    pub fn sender(&self) -> EventSender {
        self.publisher.sender()
    }

    pub fn drain_events(&mut self) -> usize {
        self.publisher.drain()
    }

    pub fn publish(&mut self, event: Event) {
        self.publisher.publish(event);
    }
}
