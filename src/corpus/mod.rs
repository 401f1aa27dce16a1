//! Corpus loading: example records extracted from TypeScript/JavaScript
//! source files without a full parser for those languages.
//!
//! - [`literal`]: lexer/parser for the literal subset of JavaScript
//! - [`scan`]: string/comment-aware depth scanning shared with the patcher
//!   and the bulk remover
//! - [`loader`]: directory walk and record extraction with fallback

pub mod error;
pub mod literal;
pub mod loader;
pub mod scan;

pub use error::{CorpusError, CorpusResult};
pub use loader::{
    Corpus, DuplicateId, Extraction, ExtractionStrategy, LoadOptions, UnrecoverableFile,
    extract_records, load_corpus,
};
