//! Directory walk and record extraction.
//!
//! Each candidate file is read once. Records are taken from the exported
//! array literal when it parses cleanly; otherwise every top-level object in
//! the array is mined field by field, so one non-literal value does not cost
//! the whole file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::model::{Record, RecordKey};

use super::error::{CorpusError, CorpusResult};
use super::literal::{LiteralError, parse_array_at};
use super::scan::{exported_array_starts, record_blocks, string_property};

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist"];

/// Options for [`load_corpus`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// File extensions (without the dot) considered corpus candidates.
    pub extensions: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["ts".into(), "js".into(), "mjs".into()],
        }
    }
}

/// How a file's records were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// The exported array parsed as a literal.
    Literal,
    /// Fallback: per-record, per-field string extraction.
    FieldScan,
}

/// Records extracted from one file.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub strategy: ExtractionStrategy,
    /// Array elements that could not be turned into a record.
    pub skipped: usize,
}

/// A corpus file that declared a record list but yielded nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecoverableFile {
    pub file: PathBuf,
    pub reason: String,
}

/// An id carried by more than one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    /// One entry per occurrence; a file appears twice for an in-file duplicate.
    pub files: Vec<PathBuf>,
}

/// The loaded corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub records: Vec<Record>,
    /// Files that declared an exported record list.
    pub files_scanned: usize,
    pub unrecoverable: Vec<UnrecoverableFile>,
    pub duplicates: Vec<DuplicateId>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only records of the given category (case-insensitive).
    pub fn filter_category(&mut self, category: &str) {
        self.records
            .retain(|r| r.category.eq_ignore_ascii_case(category));
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records
            .iter()
            .find(|r| r.source_file == key.source_file && r.id == key.id)
    }
}

/// Whether `text` declares an exported list value.
pub fn declares_record_list(text: &str) -> bool {
    !exported_array_starts(text).is_empty()
}

/// Extract all records from one file's text.
///
/// Tries the literal parse first and falls back to field scanning. Fails only
/// when neither strategy yields a single record.
pub fn extract_records(text: &str, source_file: &Path) -> Result<Extraction, LiteralError> {
    let starts = exported_array_starts(text);
    if starts.is_empty() {
        return Err(LiteralError::new(0, "no exported list declaration"));
    }

    let literal_error = match extract_literal(text, &starts, source_file) {
        Ok(extraction) => return Ok(extraction),
        Err(e) => e,
    };
    tracing::debug!(
        file = %source_file.display(),
        error = %literal_error,
        "literal parse failed, falling back to field scan"
    );

    let mut records = Vec::new();
    let mut skipped = 0;
    for &open in &starts {
        for block in record_blocks(text, open) {
            match record_from_block(block.text(text), source_file) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
    }

    if records.is_empty() {
        return Err(literal_error);
    }
    Ok(Extraction {
        records,
        strategy: ExtractionStrategy::FieldScan,
        skipped,
    })
}

fn extract_literal(
    text: &str,
    starts: &[usize],
    source_file: &Path,
) -> Result<Extraction, LiteralError> {
    let mut records = Vec::new();
    let mut skipped = 0;
    for &open in starts {
        let (items, _) = parse_array_at(text, open)?;
        for item in &items {
            match record_from_value(item, source_file) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
    }
    Ok(Extraction {
        records,
        strategy: ExtractionStrategy::Literal,
        skipped,
    })
}

/// Source text of a field value as stored on a [`Record`].
fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn record_from_value(value: &Value, source_file: &Path) -> Option<Record> {
    let obj = value.as_object()?;
    let id = match obj.get("id")? {
        Value::String(s) => s.clone(),
        other => {
            // The patcher and the bulk remover address records by a quoted id.
            tracing::warn!(
                file = %source_file.display(),
                id = %other,
                "record id is not a string literal; record ignored"
            );
            return None;
        }
    };
    let expression = obj.get("expression")?.as_str()?.to_string();
    Some(Record {
        id,
        title: field_text(obj.get("title")),
        description: field_text(obj.get("description")),
        category: field_text(obj.get("category")),
        expression,
        sample_input: field_text(obj.get("sampleInput")),
        expected_output: field_text(obj.get("expectedOutput")),
        source_file: source_file.to_path_buf(),
    })
}

fn record_from_block(block: &str, source_file: &Path) -> Option<Record> {
    let id = string_property(block, "id")?;
    let expression = string_property(block, "expression")?;
    let field = |name: &str| string_property(block, name).unwrap_or_default();
    Some(Record {
        id,
        title: field("title"),
        description: field("description"),
        category: field("category"),
        expression,
        sample_input: field("sampleInput"),
        expected_output: field("expectedOutput"),
        source_file: source_file.to_path_buf(),
    })
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
}

/// Walk `root` and load every record from files that export a record list.
///
/// Never writes. Unparseable files and duplicate ids are reported on the
/// returned [`Corpus`] and logged, not treated as errors.
pub fn load_corpus(root: &Path, options: &LoadOptions) -> CorpusResult<Corpus> {
    if !root.is_dir() {
        return Err(CorpusError::RootMissing {
            path: root.display().to_string(),
        });
    }

    let mut corpus = Corpus {
        root: root.to_path_buf(),
        ..Default::default()
    };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| CorpusError::Walk {
            path: e
                .path()
                .map_or_else(|| root.display().to_string(), |p| p.display().to_string()),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, &options.extensions) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(file = %relative.display(), "skipping non-UTF-8 file");
                continue;
            }
            Err(e) => {
                return Err(CorpusError::Read {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        if !declares_record_list(&text) {
            continue;
        }
        corpus.files_scanned += 1;

        match extract_records(&text, &relative) {
            Ok(extraction) => {
                if extraction.strategy == ExtractionStrategy::FieldScan {
                    tracing::warn!(
                        file = %relative.display(),
                        records = extraction.records.len(),
                        skipped = extraction.skipped,
                        "literal parse failed; records recovered by field scan"
                    );
                } else if extraction.skipped > 0 {
                    tracing::warn!(
                        file = %relative.display(),
                        skipped = extraction.skipped,
                        "array elements without id/expression were ignored"
                    );
                }
                corpus.records.extend(extraction.records);
            }
            Err(e) => {
                tracing::warn!(file = %relative.display(), error = %e, "unrecoverable corpus file");
                corpus.unrecoverable.push(UnrecoverableFile {
                    file: relative,
                    reason: e.to_string(),
                });
            }
        }
    }

    corpus.duplicates = find_duplicates(&corpus.records);
    for dup in &corpus.duplicates {
        let files: Vec<String> = dup.files.iter().map(|f| f.display().to_string()).collect();
        tracing::warn!(
            id = %dup.id,
            files = %files.join(", "),
            "duplicate record id; records are addressed by (file, id)"
        );
    }

    tracing::info!(
        files = corpus.files_scanned,
        records = corpus.records.len(),
        unrecoverable = corpus.unrecoverable.len(),
        "corpus loaded"
    );
    Ok(corpus)
}

fn find_duplicates(records: &[Record]) -> Vec<DuplicateId> {
    let mut by_id: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for record in records {
        by_id
            .entry(record.id.as_str())
            .or_default()
            .push(record.source_file.clone());
    }
    by_id
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(id, files)| DuplicateId {
            id: id.to_string(),
            files,
        })
        .collect()
}
