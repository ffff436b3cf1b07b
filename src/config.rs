//! User settings (`ride.cfg`).
//!
//! The file is TOML with `[General]`, `[Paths]`, `[Plugins]` and `[Variables]` tables. It is
//! edited through a [`toml_edit::DocumentMut`] so the user's comments and layout survive when
//! missing keys are back-filled from the distribution defaults; the typed view is
//! deserialised with `toml`. Recent files live in `[General] recent_files`; excluded paths are
//! glob patterns, one per line, in an `excludes` file next to the settings file.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use toml_edit::{value, Array, DocumentMut, Item, Table};

use crate::{
    codec::{CodecOptions, Dialect},
    controller::ProjectOptions,
    error::RideError,
    library::VariableSpec,
    namespace::NamespaceOptions,
};

pub const SETTINGS_FILE: &str = "ride.cfg";
pub const EXCLUDES_FILE: &str = "excludes";
pub const SETTINGS_VERSION: i64 = 2;

const DEFAULTS: &str = r#"settings_version = 2

[General]
default_dialect = "space"
space_separator_width = 2
allow_unknown_sections = false
namespace_cache_ttl_secs = 2.0
recent_files = []
recent_files_limit = 5
max_undo = 1000

[Paths]
pythonpath = []
introspector = "python"
introspection_timeout_secs = 30.0
runner = "python -m robot"

[Plugins]

[Variables]
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    pub default_dialect: Dialect,
    pub space_separator_width: usize,
    pub allow_unknown_sections: bool,
    pub namespace_cache_ttl_secs: f64,
    pub recent_files: Vec<PathBuf>,
    pub recent_files_limit: usize,
    pub max_undo: usize,
}

impl Default for General {
    fn default() -> Self {
        General {
            default_dialect: Dialect::Space,
            space_separator_width: 2,
            allow_unknown_sections: false,
            namespace_cache_ttl_secs: 2.0,
            recent_files: Vec::new(),
            recent_files_limit: 5,
            max_undo: crate::controller::history::DEFAULT_MAX_UNDO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Search roots for imports and library introspection
    pub pythonpath: Vec<PathBuf>,
    pub introspector: String,
    pub introspection_timeout_secs: f64,
    pub runner: String,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            pythonpath: Vec::new(),
            introspector: "python".to_string(),
            introspection_timeout_secs: 30.0,
            runner: "python -m robot".to_string(),
        }
    }
}

/// Typed view of the settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsView {
    pub settings_version: i64,
    #[serde(rename = "General")]
    pub general: General,
    #[serde(rename = "Paths")]
    pub paths: Paths,
    /// Preference panels owned by plugins, kept verbatim
    #[serde(rename = "Plugins")]
    pub plugins: toml::Table,
    /// Variable overrides applied to every namespace: `NAME = "value"` or `NAME = ["a", "b"]`
    #[serde(rename = "Variables")]
    pub variables: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
    document: DocumentMut,
    view: SettingsView,
}

/// `~/.ride` on POSIX, `%APPDATA%\RobotFramework\ride` on Windows.
pub fn default_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::config_dir().map(|d| d.join("RobotFramework").join("ride"))
    } else {
        dirs::home_dir().map(|d| d.join(".ride"))
    }
}

fn defaults() -> Result<DocumentMut, RideError> {
    Ok(DEFAULTS.parse::<DocumentMut>()?)
}

/// Copy keys missing from `target` out of `defaults`, descending into tables.
fn backfill(target: &mut Table, defaults: &Table) -> bool {
    let mut changed = false;
    for (key, item) in defaults.iter() {
        match (target.get_mut(key), item) {
            (None, _) => {
                target.insert(key, item.clone());
                changed = true;
            }
            (Some(Item::Table(existing)), Item::Table(default)) => {
                changed |= backfill(existing, default);
            }
            _ => {}
        }
    }
    changed
}

/// Version 1 files kept `pythonpath` (a `;` separated string) under `[General]`.
fn migrate(document: &mut DocumentMut) -> Result<bool, RideError> {
    if document.as_table().is_empty() {
        return Ok(false);
    }
    let version = document
        .get("settings_version")
        .and_then(Item::as_integer)
        .unwrap_or(1);
    if version >= SETTINGS_VERSION {
        if version > SETTINGS_VERSION {
            tracing::warn!(
                "[Settings] Settings version {} is newer than {}, leaving it untouched",
                version,
                SETTINGS_VERSION
            );
        }
        return Ok(false);
    }
    tracing::info!(
        "[Settings] Migrating settings from version {} to {}",
        version,
        SETTINGS_VERSION
    );
    let legacy = document
        .get_mut("General")
        .and_then(Item::as_table_like_mut)
        .and_then(|general| general.remove("pythonpath"));
    if let Some(item) = legacy {
        let roots: Array = match item.as_str() {
            Some(joined) => joined
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            None => item.as_array().cloned().unwrap_or_default(),
        };
        let paths = document
            .entry("Paths")
            .or_insert(toml_edit::table())
            .as_table_like_mut()
            .ok_or_else(|| RideError::Serialization("[Paths] is not a table".to_string()))?;
        if !paths.contains_key("pythonpath") {
            paths.insert("pythonpath", value(roots));
        }
    }
    document.insert("settings_version", value(SETTINGS_VERSION));
    Ok(true)
}

fn secs(what: &str, secs: f64) -> Result<Duration, RideError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| RideError::Data(format!("{what} must be a non-negative number of seconds: {e}")))
}

fn toml_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Settings {
    /// Read `path`, migrating and back-filling it. The file is rewritten only when migration
    /// or back-filling changed something.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, RideError> {
        let path = path.into();
        let text = if path.exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        let mut document = text.parse::<DocumentMut>()?;
        let migrated = migrate(&mut document)?;
        let filled = backfill(document.as_table_mut(), defaults()?.as_table());
        let view = toml::from_str(&document.to_string())?;
        let settings = Settings {
            path,
            document,
            view,
        };
        if migrated || filled {
            tracing::debug!("[Settings] Writing back-filled {}", settings.path.display());
            settings.save()?;
        }
        Ok(settings)
    }

    /// Load `ride.cfg` from the platform settings directory.
    pub fn load_default() -> Result<Self, RideError> {
        let dir = default_dir()
            .ok_or_else(|| RideError::NotFound("home directory for settings".to_string()))?;
        Self::load(dir.join(SETTINGS_FILE))
    }

    pub fn save(&self) -> Result<(), RideError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, self.document.to_string())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn view(&self) -> &SettingsView {
        &self.view
    }

    pub fn general(&self) -> &General {
        &self.view.general
    }

    pub fn paths(&self) -> &Paths {
        &self.view.paths
    }

    fn refresh(&mut self) -> Result<(), RideError> {
        self.view = toml::from_str(&self.document.to_string())?;
        Ok(())
    }

    /// Set `[table] key = value` and save. The typed view is re-read, so a value of the wrong
    /// type is rejected and the document left unchanged.
    pub fn set(
        &mut self,
        table: &str,
        key: &str,
        new_value: impl Into<toml_edit::Value>,
    ) -> Result<(), RideError> {
        let previous = self.document.clone();
        let section = self
            .document
            .entry(table)
            .or_insert(toml_edit::table())
            .as_table_like_mut()
            .ok_or_else(|| RideError::Serialization(format!("[{table}] is not a table")))?;
        section.insert(key, value(new_value));
        if let Err(e) = self.refresh() {
            self.document = previous;
            return Err(e);
        }
        self.save()
    }

    pub fn recent_files(&self) -> &[PathBuf] {
        &self.view.general.recent_files
    }

    /// Move `path` to the front of the recent files, dropping duplicates and the overflow.
    pub fn add_recent_file(&mut self, path: impl AsRef<Path>) -> Result<(), RideError> {
        let path = path.as_ref().to_path_buf();
        let mut recent = self.view.general.recent_files.clone();
        recent.retain(|p| *p != path);
        recent.insert(0, path);
        recent.truncate(self.view.general.recent_files_limit.max(1));
        let array: Array = recent
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        self.set("General", "recent_files", array)
    }

    pub fn excludes_path(&self) -> PathBuf {
        self.path.with_file_name(EXCLUDES_FILE)
    }

    /// Excluded path patterns; blank lines and `#` comments are ignored.
    pub fn excludes(&self) -> Result<Vec<glob::Pattern>, RideError> {
        let path = self.excludes_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(&path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| Ok(glob::Pattern::new(l)?))
            .collect()
    }

    pub fn add_exclude(&mut self, pattern: &str) -> Result<(), RideError> {
        let pattern = pattern.trim();
        glob::Pattern::new(pattern)?;
        let path = self.excludes_path();
        let mut text = if path.exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        if text.lines().any(|l| l.trim() == pattern) {
            return Ok(());
        }
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(pattern);
        text.push('\n');
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, text)?;
        Ok(())
    }

    pub fn variable_overrides(&self) -> Vec<VariableSpec> {
        let mut overrides = Vec::new();
        for (key, raw) in &self.view.variables {
            let bare = key
                .strip_prefix(['$', '@', '&'])
                .and_then(|k| k.strip_prefix('{'))
                .and_then(|k| k.strip_suffix('}'))
                .unwrap_or(key);
            match raw {
                toml::Value::Array(items) => {
                    let values: Vec<String> = items.iter().map(toml_text).collect();
                    overrides.push(VariableSpec {
                        name: format!("@{{{bare}}}"),
                        value: values.clone(),
                    });
                    overrides.push(VariableSpec {
                        name: format!("${{{bare}}}"),
                        value: values,
                    });
                }
                other => overrides.push(VariableSpec::scalar(bare, &toml_text(other))),
            }
        }
        overrides
    }

    pub fn project_options(&self) -> Result<ProjectOptions, RideError> {
        let general = &self.view.general;
        let paths = &self.view.paths;
        Ok(ProjectOptions {
            codec: CodecOptions {
                default_dialect: general.default_dialect,
                separator_width: general.space_separator_width.max(2),
                allow_unknown_sections: general.allow_unknown_sections,
            },
            namespace: NamespaceOptions {
                cache_ttl: secs("namespace_cache_ttl_secs", general.namespace_cache_ttl_secs)?,
                search_roots: paths.pythonpath.clone(),
                variable_overrides: self.variable_overrides(),
            },
            introspector: paths.introspector.clone(),
            introspection_timeout: secs(
                "introspection_timeout_secs",
                paths.introspection_timeout_secs,
            )?,
            excludes: self.excludes()?,
            max_undo: general.max_undo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_backfilled_and_comments_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "settings_version = 2\n\n[General]\n# my width\nspace_separator_width = 4\n",
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.general().space_separator_width, 4);
        assert_eq!(settings.general().recent_files_limit, 5);
        assert_eq!(settings.paths().runner, "python -m robot");
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# my width"));
        assert!(written.contains("[Paths]"));
    }

    #[test]
    fn version_one_pythonpath_moves_to_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "[General]\npythonpath = \"/opt/libs;/srv/kw\"\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.view().settings_version, SETTINGS_VERSION);
        assert_eq!(
            settings.paths().pythonpath,
            vec![PathBuf::from("/opt/libs"), PathBuf::from("/srv/kw")]
        );
        let reread = Settings::load(&path).unwrap();
        assert_eq!(reread.paths().pythonpath.len(), 2);
    }

    #[test]
    fn recent_files_are_ordered_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path().join(SETTINGS_FILE)).unwrap();
        settings.set("General", "recent_files_limit", 2i64).unwrap();
        settings.add_recent_file("/a.robot").unwrap();
        settings.add_recent_file("/b.robot").unwrap();
        settings.add_recent_file("/a.robot").unwrap();
        settings.add_recent_file("/c.robot").unwrap();
        assert_eq!(
            settings.recent_files(),
            &[PathBuf::from("/c.robot"), PathBuf::from("/a.robot")]
        );
        let reread = Settings::load(settings.path()).unwrap();
        assert_eq!(reread.recent_files().len(), 2);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(settings.set("General", "max_undo", "lots").is_err());
        assert_eq!(settings.general().max_undo, 1000);
    }

    #[test]
    fn excludes_and_project_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "settings_version = 2\n[General]\ndefault_dialect = \"pipe\"\n[Variables]\nHOST = \"qa\"\nUSERS = [\"a\", \"b\"]\n",
        )
        .unwrap();
        let mut settings = Settings::load(&path).unwrap();
        settings.add_exclude("*.tmp.robot").unwrap();
        settings.add_exclude("*.tmp.robot").unwrap();
        assert!(settings.add_exclude("[").is_err());
        assert_eq!(settings.excludes().unwrap().len(), 1);

        let options = settings.project_options().unwrap();
        assert_eq!(options.codec.default_dialect, Dialect::Pipe);
        assert_eq!(options.excludes.len(), 1);
        let names: Vec<&str> = options
            .namespace
            .variable_overrides
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, vec!["${HOST}", "@{USERS}", "${USERS}"]);
    }
}
