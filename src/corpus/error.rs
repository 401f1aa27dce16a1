//! Rich diagnostic error types for corpus loading.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that abort corpus loading as a whole.
///
/// A single file that cannot be parsed is not an error: it is logged and
/// listed in [`Corpus::unrecoverable`](super::Corpus::unrecoverable).
#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("corpus root not found: {path}")]
    #[diagnostic(
        code(driftmend::corpus::root_missing),
        help("Pass --corpus or set `corpus_dir` in driftmend.toml to the directory holding the example files.")
    )]
    RootMissing { path: String },

    #[error("failed to walk {path}: {message}")]
    #[diagnostic(
        code(driftmend::corpus::walk),
        help("A directory inside the corpus could not be listed. Check permissions.")
    )]
    Walk { path: String, message: String },

    #[error("failed to read corpus file {path}")]
    #[diagnostic(
        code(driftmend::corpus::read),
        help("Check that the file is readable UTF-8 text.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for corpus results.
pub type CorpusResult<T> = std::result::Result<T, CorpusError>;
