//! Backup-on-save.
//!
//! [`with_backup`] copies the target to a sibling backup path, runs the writer and deletes the
//! backup on success. When the writer fails, or panics, the backup is moved back over the target
//! so the file on disk is bit-identical to what it was before the save started.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::RideError;

/// First free backup path for `path`: `name.bak`, then `name.bak.2`, `name.bak.3`, ...
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    let first = PathBuf::from(&name);
    if !first.exists() {
        return first;
    }
    let mut n = 2;
    loop {
        let mut candidate = name.clone();
        candidate.push(format!(".{n}"));
        let candidate = PathBuf::from(candidate);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Restores the original file unless disarmed.
pub struct BackupGuard {
    target: PathBuf,
    backup: Option<PathBuf>,
    armed: bool,
}

impl BackupGuard {
    /// Snapshot `target`. A target that does not exist yet has nothing to restore; on failure
    /// the partially written file is removed instead.
    pub fn acquire(target: &Path) -> Result<Self, RideError> {
        let backup = if target.exists() {
            let backup = backup_path(target);
            fs::copy(target, &backup)?;
            tracing::debug!("[Backup] {} -> {}", target.display(), backup.display());
            Some(backup)
        } else {
            None
        };
        Ok(BackupGuard {
            target: target.to_path_buf(),
            backup,
            armed: true,
        })
    }

    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    /// The write succeeded: delete the backup.
    pub fn commit(mut self) -> Result<(), RideError> {
        self.armed = false;
        if let Some(backup) = self.backup.take() {
            fs::remove_file(backup)?;
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), RideError> {
        match self.backup.take() {
            Some(backup) => fs::rename(&backup, &self.target)?,
            None if self.target.exists() => fs::remove_file(&self.target)?,
            None => {}
        }
        Ok(())
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!("[Backup] Restoring {}", self.target.display());
        if let Err(e) = self.restore() {
            tracing::error!("[Backup] Could not restore {}: {}", self.target.display(), e);
        }
    }
}

/// Run `write` against `target` inside a backup scope.
pub fn with_backup<T>(
    target: &Path,
    write: impl FnOnce(&Path) -> Result<T, RideError>,
) -> Result<T, RideError> {
    let guard = BackupGuard::acquire(target)?;
    let value = write(target)?;
    guard.commit()?;
    Ok(value)
}
