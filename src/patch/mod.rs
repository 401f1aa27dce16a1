//! Record patching: canonical literal formatting and in-place field rewrites.

pub mod format;
pub mod patcher;

pub use format::{format_literal, parse_literal};
pub use patcher::{
    EXPECTED_FIELD, ID_FIELD, NotFoundReason, PatchOperation, PatchOutcome, RecordPatcher,
};
