//! Pre-edit file snapshots for destructive multi-record edits.

use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::error::{RemovalError, RemovalResult};

/// Takes timestamped copies of corpus files under a backup directory.
///
/// A file `<root>/sub/a.ts` is copied to `<backup_dir>/sub/a.ts.<stamp>.bak`,
/// so backups of same-named files in different folders never collide.
#[derive(Debug, Clone)]
pub struct BackupGuard {
    corpus_root: PathBuf,
    backup_dir: PathBuf,
}

impl BackupGuard {
    pub fn new(corpus_root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Backup location for `file`, relative to the corpus root when possible.
    fn backup_path(&self, file: &Path) -> PathBuf {
        let relative: PathBuf = file
            .strip_prefix(&self.corpus_root)
            .unwrap_or(file)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "corpus-file".into());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");

        let mut candidate = self
            .backup_dir
            .join(&relative)
            .with_file_name(format!("{name}.{stamp}.bak"));
        let mut n = 1;
        while candidate.exists() {
            candidate = candidate.with_file_name(format!("{name}.{stamp}-{n}.bak"));
            n += 1;
        }
        candidate
    }

    /// Copy `file` aside and confirm the copy is complete.
    pub fn snapshot(&self, file: &Path) -> RemovalResult<Snapshot> {
        let backup = self.backup_path(file);
        let backup_error = |source| RemovalError::Backup {
            path: file.display().to_string(),
            source,
        };

        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent).map_err(backup_error)?;
        }
        let copied = std::fs::copy(file, &backup).map_err(backup_error)?;
        let expected = std::fs::metadata(file).map_err(backup_error)?.len();
        if copied != expected {
            return Err(backup_error(std::io::Error::other(format!(
                "backup holds {copied} of {expected} bytes"
            ))));
        }

        tracing::info!(
            file = %file.display(),
            backup = %backup.display(),
            "snapshot taken"
        );
        Ok(Snapshot {
            original: file.to_path_buf(),
            backup,
        })
    }
}

/// A backup of one file, taken before it was edited.
#[derive(Debug)]
pub struct Snapshot {
    original: PathBuf,
    backup: PathBuf,
}

impl Snapshot {
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Copy the backup over the original.
    pub fn restore(&self) -> RemovalResult<()> {
        std::fs::copy(&self.backup, &self.original).map_err(|source| RemovalError::Io {
            path: self.original.display().to_string(),
            source,
        })?;
        tracing::warn!(
            file = %self.original.display(),
            backup = %self.backup.display(),
            "original restored from backup"
        );
        Ok(())
    }

    /// Delete the backup. Only call once the edited file is verified.
    pub fn discard(self) -> RemovalResult<()> {
        std::fs::remove_file(&self.backup).map_err(|source| RemovalError::Io {
            path: self.backup.display().to_string(),
            source,
        })
    }
}
