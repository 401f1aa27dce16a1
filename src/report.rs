//! Run accounting and the JSON audit artifacts.
//!
//! [`ReconciliationReport`] counts every record's terminal [`Outcome`] and
//! keeps the lists a human needs afterwards: the manual-review queue, the
//! patches that were applied, and the patches that could not be placed.
//! It only records; it never decides to retry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::classify::{ClassificationResult, ConfidenceTier, DriftPattern, classify_mismatch};
use crate::config::ClassifierConfig;
use crate::model::{Mismatch, Record};
use crate::patch::{PatchOperation, format_literal};

pub const MISMATCHES_FILE: &str = "mismatches.json";
pub const SUMMARY_FILE: &str = "fix-summary.json";
pub const MANUAL_REVIEW_FILE: &str = "manual-review.json";

/// Examples shown per pattern by [`render_analysis`].
const ANALYSIS_EXAMPLES: usize = 3;

/// Longest value preview printed by [`render_analysis`].
const ANALYSIS_PREVIEW_LEN: usize = 80;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReportError {
    #[error("failed to access report artifact {path}")]
    #[diagnostic(
        code(driftmend::report::io),
        help("Check that the report directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {message}")]
    #[diagnostic(code(driftmend::report::serialize))]
    Serialize { path: String, message: String },

    #[error("{path} is not a valid mismatch list: {message}")]
    #[diagnostic(
        code(driftmend::report::parse),
        help("Regenerate it with `driftmend check`, which writes {path} in the expected shape.")
    )]
    Parse { path: String, message: String },
}

pub type ReportResult<T> = std::result::Result<T, ReportError>;

// ---------------------------------------------------------------------------
// Outcomes and entries
// ---------------------------------------------------------------------------

/// Terminal state of one record in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    MatchConfirmed,
    PatchApplied,
    PatchFailed,
    ManualReview,
    /// Patchable, but the run was a dry run.
    AutoFixable,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Self::MatchConfirmed,
        Self::PatchApplied,
        Self::PatchFailed,
        Self::ManualReview,
        Self::AutoFixable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchConfirmed => "match-confirmed",
            Self::PatchApplied => "patch-applied",
            Self::PatchFailed => "patch-failed",
            Self::ManualReview => "manual-review",
            Self::AutoFixable => "auto-fixable",
        }
    }

    /// Whether the record needs no further attention.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::MatchConfirmed | Self::PatchApplied)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record queued for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualReviewEntry {
    pub file: PathBuf,
    pub id: String,
    pub title: String,
    pub expression: String,
    /// Stored literal text, verbatim.
    pub expected_output: String,
    pub actual_result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<DriftPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<ConfidenceTier>,
    pub recommendation: String,
}

/// A patch that was warranted but could not be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchFailure {
    pub file: PathBuf,
    pub id: String,
    pub pattern: DriftPattern,
    pub tier: ConfidenceTier,
    pub reason: String,
}

/// On-disk shape of `fix-summary.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSummary {
    pub timestamp: DateTime<Utc>,
    pub total_records: usize,
    pub unresolved: usize,
    pub by_outcome: BTreeMap<Outcome, usize>,
    pub by_pattern: BTreeMap<DriftPattern, usize>,
    pub by_tier: BTreeMap<ConfidenceTier, usize>,
    pub patches: Vec<PatchOperation>,
    pub patch_failures: Vec<PatchFailure>,
}

/// Paths of the artifacts written by [`ReconciliationReport::persist`].
#[derive(Debug, Clone)]
pub struct WrittenArtifacts {
    pub summary: PathBuf,
    pub manual_review: PathBuf,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Per-run accumulator.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    by_outcome: BTreeMap<Outcome, usize>,
    by_pattern: BTreeMap<DriftPattern, usize>,
    by_tier: BTreeMap<ConfidenceTier, usize>,
    manual_review: Vec<ManualReviewEntry>,
    patches: Vec<PatchOperation>,
    patch_failures: Vec<PatchFailure>,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&mut self, outcome: Outcome) {
        *self.by_outcome.entry(outcome).or_default() += 1;
    }

    /// Count a classification, independently of the record's outcome.
    pub fn record_classification(&mut self, classification: &ClassificationResult) {
        *self.by_pattern.entry(classification.pattern).or_default() += 1;
        *self.by_tier.entry(classification.tier).or_default() += 1;
    }

    pub fn record_match(&mut self) {
        self.finish(Outcome::MatchConfirmed);
    }

    /// A patch was applied, or `None` when the literal was already current.
    pub fn record_patch(&mut self, operation: Option<PatchOperation>) {
        self.patches.extend(operation);
        self.finish(Outcome::PatchApplied);
    }

    pub fn record_patch_failure(
        &mut self,
        record: &Record,
        classification: &ClassificationResult,
        reason: impl Into<String>,
    ) {
        self.patch_failures.push(PatchFailure {
            file: record.source_file.clone(),
            id: record.id.clone(),
            pattern: classification.pattern,
            tier: classification.tier,
            reason: reason.into(),
        });
        self.finish(Outcome::PatchFailed);
    }

    pub fn record_auto_fixable(&mut self) {
        self.finish(Outcome::AutoFixable);
    }

    pub fn record_manual_review(
        &mut self,
        record: &Record,
        actual_result: &Value,
        classification: Option<&ClassificationResult>,
        recommendation: impl Into<String>,
    ) {
        self.manual_review.push(ManualReviewEntry {
            file: record.source_file.clone(),
            id: record.id.clone(),
            title: record.title.clone(),
            expression: record.expression.clone(),
            expected_output: record.expected_output.clone(),
            actual_result: actual_result.clone(),
            pattern: classification.map(|c| c.pattern),
            tier: classification.map(|c| c.tier),
            recommendation: recommendation.into(),
        });
        self.finish(Outcome::ManualReview);
    }

    pub fn total_records(&self) -> usize {
        self.by_outcome.values().sum()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.by_outcome.get(&outcome).copied().unwrap_or(0)
    }

    pub fn pattern_count(&self, pattern: DriftPattern) -> usize {
        self.by_pattern.get(&pattern).copied().unwrap_or(0)
    }

    pub fn tier_count(&self, tier: ConfidenceTier) -> usize {
        self.by_tier.get(&tier).copied().unwrap_or(0)
    }

    /// Records left needing attention: manual review, failed patches, and
    /// pending fixes from a dry run.
    pub fn unresolved(&self) -> usize {
        self.by_outcome
            .iter()
            .filter(|(outcome, _)| !outcome.is_resolved())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn manual_review(&self) -> &[ManualReviewEntry] {
        &self.manual_review
    }

    pub fn patches(&self) -> &[PatchOperation] {
        &self.patches
    }

    pub fn patch_failures(&self) -> &[PatchFailure] {
        &self.patch_failures
    }

    pub fn summary(&self, timestamp: DateTime<Utc>) -> FixSummary {
        FixSummary {
            timestamp,
            total_records: self.total_records(),
            unresolved: self.unresolved(),
            by_outcome: self.by_outcome.clone(),
            by_pattern: self.by_pattern.clone(),
            by_tier: self.by_tier.clone(),
            patches: self.patches.clone(),
            patch_failures: self.patch_failures.clone(),
        }
    }

    /// Write `fix-summary.json` and `manual-review.json` into `dir`.
    pub fn persist(&self, dir: &Path) -> ReportResult<WrittenArtifacts> {
        let summary = dir.join(SUMMARY_FILE);
        write_json(&summary, &self.summary(Utc::now()))?;
        let manual_review = dir.join(MANUAL_REVIEW_FILE);
        write_json(&manual_review, &self.manual_review)?;
        tracing::info!(
            summary = %summary.display(),
            manual_review = %manual_review.display(),
            "report artifacts written"
        );
        Ok(WrittenArtifacts {
            summary,
            manual_review,
        })
    }

    /// Human-readable end-of-run summary.
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} records: {} unresolved\n",
            self.total_records(),
            self.unresolved()
        );
        for outcome in Outcome::ALL {
            let n = self.count(outcome);
            if n > 0 {
                out.push_str(&format!("  {:<16} {n}\n", outcome.as_str()));
            }
        }
        for failure in &self.patch_failures {
            out.push_str(&format!(
                "  patch failed: {}#{} ({})\n",
                failure.file.display(),
                failure.id,
                failure.reason
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ReportResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|e| ReportError::Serialize {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, json + "\n").map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write the mismatch list consumed by `fix` and `analyze`.
pub fn write_mismatches(dir: &Path, mismatches: &[Mismatch]) -> ReportResult<PathBuf> {
    let path = dir.join(MISMATCHES_FILE);
    write_json(&path, mismatches)?;
    tracing::info!(path = %path.display(), count = mismatches.len(), "mismatch list written");
    Ok(path)
}

pub fn load_mismatches(path: &Path) -> ReportResult<Vec<Mismatch>> {
    let data = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|e| ReportError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

fn preview(value: &Value) -> String {
    let text = format_literal(value);
    match text.char_indices().nth(ANALYSIS_PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

/// Classify a stored mismatch list and describe it for a human.
pub fn render_analysis(mismatches: &[Mismatch], config: &ClassifierConfig) -> String {
    let mut by_pattern: BTreeMap<DriftPattern, Vec<(&Mismatch, ClassificationResult)>> =
        BTreeMap::new();
    let mut by_tier: BTreeMap<ConfidenceTier, usize> = BTreeMap::new();
    let mut eval_errors = 0;
    for mismatch in mismatches {
        let result = classify_mismatch(mismatch, config);
        if mismatch.is_eval_error() {
            eval_errors += 1;
        }
        *by_tier.entry(result.tier).or_default() += 1;
        by_pattern
            .entry(result.pattern)
            .or_default()
            .push((mismatch, result));
    }

    let mut out = format!("{} mismatches ({eval_errors} evaluation errors)\n", mismatches.len());

    out.push_str("\nBy confidence tier:\n");
    for tier in ConfidenceTier::ALL {
        out.push_str(&format!(
            "  {:<8} {}\n",
            tier.as_str(),
            by_tier.get(&tier).copied().unwrap_or(0)
        ));
    }

    out.push_str("\nBy drift pattern:\n");
    for (pattern, entries) in &by_pattern {
        out.push_str(&format!("  {:<18} {}\n", pattern.as_str(), entries.len()));
    }

    for (pattern, entries) in &by_pattern {
        out.push_str(&format!("\n[{pattern}]\n"));
        for (mismatch, result) in entries.iter().take(ANALYSIS_EXAMPLES) {
            out.push_str(&format!(
                "  {} ({}, {})\n    expression: {}\n    expected:   {}\n    actual:     {}\n",
                mismatch.record.key(),
                result.tier,
                result.reason,
                mismatch.record.expression,
                preview(&mismatch.expected_parsed),
                match &mismatch.error_message {
                    Some(message) => format!("error: {message}"),
                    None => preview(&mismatch.actual_result),
                },
            ));
        }
        if entries.len() > ANALYSIS_EXAMPLES {
            out.push_str(&format!("  ... and {} more\n", entries.len() - ANALYSIS_EXAMPLES));
        }
    }
    out
}
