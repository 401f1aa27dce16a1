//! Rich diagnostic error types for driftmend.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so the operator knows
//! exactly which file or record needs attention.

use miette::Diagnostic;
use thiserror::Error;

pub use crate::corpus::error::CorpusError;
pub use crate::oracle::OracleError;
pub use crate::report::ReportError;

/// Top-level error type for driftmend.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the CLI.
#[derive(Debug, Error, Diagnostic)]
pub enum DriftError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Removal(#[from] RemovalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Report(#[from] ReportError),
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(driftmend::config::read),
        help("Ensure the config file exists and is readable, or omit --config to use defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(driftmend::config::parse),
        help("Check the TOML syntax. Every key is optional; unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(driftmend::config::invalid), help("{message}"))]
    Invalid { message: String },
}

// ---------------------------------------------------------------------------
// Patch errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PatchError {
    #[error("failed to read {path}")]
    #[diagnostic(
        code(driftmend::patch::read),
        help("The corpus file named in the mismatch list could not be read. Was it moved or deleted?")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}")]
    #[diagnostic(
        code(driftmend::patch::write),
        help("Check that the corpus directory is writable and that the disk is not full.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Removal errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RemovalError {
    #[error("I/O error on {path}")]
    #[diagnostic(
        code(driftmend::removal::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backup of {path} could not be created")]
    #[diagnostic(
        code(driftmend::removal::backup),
        help(
            "No edit was made. Make sure the backup directory is writable \
             before retrying a bulk removal."
        )
    )]
    Backup {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a record corpus file: {message}")]
    #[diagnostic(
        code(driftmend::removal::unreadable_corpus),
        help("Bulk removal only edits files the corpus loader can parse. Fix the file by hand first.")
    )]
    NotACorpus { path: String, message: String },

    #[error("verification of {path} failed after removal: {message}")]
    #[diagnostic(
        code(driftmend::removal::verification),
        help(
            "The original file was restored from {backup}. \
             Inspect both copies before retrying."
        )
    )]
    Verification {
        path: String,
        backup: String,
        message: String,
    },
}

/// Convenience alias for functions returning driftmend results.
pub type DriftResult<T> = std::result::Result<T, DriftError>;

pub type PatchResult<T> = std::result::Result<T, PatchError>;

pub type RemovalResult<T> = std::result::Result<T, RemovalError>;
