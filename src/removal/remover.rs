//! Whole-record deletion from corpus files.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::corpus::extract_records;
use crate::corpus::scan::{exported_array_starts, record_blocks, string_property};
use crate::error::{RemovalError, RemovalResult};
use crate::patch::ID_FIELD;

use super::backup::{BackupGuard, Snapshot};

/// The edit a removal would make, computed without touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    /// File text with the records cut out.
    pub edited: String,
    /// Ids removed, one entry per removed record, in file order.
    pub removed: Vec<String>,
    /// Requested ids with no record in the file.
    pub missing: Vec<String>,
    /// Records the file must still yield after the edit.
    pub remaining: usize,
}

/// What [`remove_records`] did to one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalReport {
    pub file: PathBuf,
    pub removed: Vec<String>,
    pub missing: Vec<String>,
    pub remaining: usize,
    /// Backup left on disk, if any.
    pub backup: Option<PathBuf>,
}

/// Byte range to delete for the block `[start, end)`.
///
/// A block that starts its own line takes its separator, the rest of the
/// line (whitespace or a line comment) and the line break with it. An inline
/// block takes its separator and the spaces after it.
fn removal_span(text: &str, start: usize, end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let skip_blanks = |mut i: usize| {
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
            i += 1;
        }
        i
    };

    let mut cut_end = skip_blanks(end);
    if bytes.get(cut_end) == Some(&b',') {
        cut_end = skip_blanks(cut_end + 1);
    }

    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let starts_line = text[line_start..start].trim().is_empty();
    if !starts_line {
        return (start, cut_end);
    }

    let line_end = text[cut_end..].find('\n').map_or(text.len(), |i| cut_end + i);
    let rest = text[cut_end..line_end].trim_end_matches('\r');
    if rest.is_empty() || rest.starts_with("//") {
        let after = (line_end + 1).min(text.len());
        (line_start, after)
    } else {
        (line_start, cut_end)
    }
}

/// Compute the edit removing every record whose id is in `ids`.
///
/// Fails with a message when `text` is not a readable corpus file.
pub fn plan_removal(text: &str, ids: &[String]) -> Result<RemovalPlan, String> {
    let wanted: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let before = extract_records(text, Path::new(""))
        .map_err(|e| e.to_string())?
        .records;

    let mut spans = Vec::new();
    let mut removed = Vec::new();
    for open in exported_array_starts(text) {
        for block in record_blocks(text, open) {
            let Some(id) = string_property(block.text(text), ID_FIELD) else {
                continue;
            };
            if wanted.contains(id.as_str()) {
                spans.push(removal_span(text, block.start, block.end));
                removed.push(id);
            }
        }
    }

    let found: BTreeSet<&str> = removed.iter().map(String::as_str).collect();
    let missing = ids
        .iter()
        .filter(|id| !found.contains(id.as_str()))
        .cloned()
        .collect();
    let remaining = before
        .iter()
        .filter(|r| !wanted.contains(r.id.as_str()))
        .count();

    let mut edited = text.to_string();
    for (start, end) in spans.into_iter().rev() {
        edited.replace_range(start..end, "");
    }

    Ok(RemovalPlan {
        edited,
        removed,
        missing,
        remaining,
    })
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> RemovalError + '_ {
    move |source| RemovalError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Replace `file` with `content` via a temp file in the same directory.
fn write_atomic(file: &Path, content: &str) -> RemovalResult<()> {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let permissions = std::fs::metadata(file).map_err(io_error(file))?.permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    tmp.write_all(content.as_bytes()).map_err(io_error(file))?;
    tmp.as_file().sync_all().map_err(io_error(file))?;
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(io_error(file))?;
    tmp.persist(file).map_err(|e| RemovalError::Io {
        path: file.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

/// Re-read `file` and confirm it holds exactly the planned records.
fn verify(file: &Path, plan: &RemovalPlan, snapshot: &Snapshot) -> RemovalResult<()> {
    let failure = |message: String| RemovalError::Verification {
        path: file.display().to_string(),
        backup: snapshot.backup().display().to_string(),
        message,
    };

    let written = std::fs::read_to_string(file).map_err(|e| failure(e.to_string()))?;
    if written != plan.edited {
        return Err(failure("file content differs from what was written".into()));
    }
    let records = match extract_records(&written, file) {
        Ok(extraction) => extraction.records,
        // An emptied list has no records for the loader to find.
        Err(_) if plan.remaining == 0 => Vec::new(),
        Err(e) => return Err(failure(e.to_string())),
    };
    if records.len() != plan.remaining {
        return Err(failure(format!(
            "expected {} records, found {}",
            plan.remaining,
            records.len()
        )));
    }
    if let Some(left) = records.iter().find(|r| plan.removed.contains(&r.id)) {
        return Err(failure(format!("record {} is still present", left.id)));
    }
    Ok(())
}

/// Remove every record with an id in `ids` from `file`.
///
/// The file is snapshotted before it is touched. If writing or verification
/// fails, the original is restored from the snapshot and the backup is kept.
/// With `keep_backup = false` the backup is deleted only after the edited
/// file has been verified.
pub fn remove_records(
    file: &Path,
    ids: &[String],
    guard: &BackupGuard,
    keep_backup: bool,
) -> RemovalResult<RemovalReport> {
    let text = std::fs::read_to_string(file).map_err(io_error(file))?;
    let plan = plan_removal(&text, ids).map_err(|message| RemovalError::NotACorpus {
        path: file.display().to_string(),
        message,
    })?;

    for id in &plan.missing {
        tracing::warn!(file = %file.display(), id = %id, "requested id not found");
    }
    if plan.removed.is_empty() {
        tracing::info!(file = %file.display(), "nothing to remove");
        return Ok(RemovalReport {
            file: file.to_path_buf(),
            removed: Vec::new(),
            missing: plan.missing,
            remaining: plan.remaining,
            backup: None,
        });
    }

    apply_plan(file, plan, guard, keep_backup)
}

/// Snapshot `file`, write `plan.edited` and verify it against `plan`.
pub(crate) fn apply_plan(
    file: &Path,
    plan: RemovalPlan,
    guard: &BackupGuard,
    keep_backup: bool,
) -> RemovalResult<RemovalReport> {
    let snapshot = guard.snapshot(file)?;
    if let Err(err) = write_atomic(file, &plan.edited).and_then(|()| verify(file, &plan, &snapshot))
    {
        tracing::error!(file = %file.display(), error = %err, "removal failed, restoring");
        snapshot.restore()?;
        return Err(err);
    }

    tracing::info!(
        file = %file.display(),
        removed = plan.removed.len(),
        remaining = plan.remaining,
        "records removed"
    );
    let backup = if keep_backup {
        Some(snapshot.backup().to_path_buf())
    } else {
        snapshot.discard()?;
        None
    };
    Ok(RemovalReport {
        file: file.to_path_buf(),
        removed: plan.removed,
        missing: plan.missing,
        remaining: plan.remaining,
        backup,
    })
}
