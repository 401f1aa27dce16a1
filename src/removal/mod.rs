//! Backup-guarded bulk removal of whole records.
//!
//! Unlike single-field patches, deleting records is destructive, so every
//! edited file is snapshotted first and verified after the write.

pub mod backup;
pub mod remover;

pub use backup::{BackupGuard, Snapshot};
pub use remover::{RemovalPlan, RemovalReport, plan_removal, remove_records};

/// Parse an id list: comma- or newline-separated, `#` starts a comment.
///
/// Order is kept and repeated ids are dropped.
pub fn parse_id_list(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        for id in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}
