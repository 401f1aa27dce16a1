//! The reconciliation pipeline: evaluate, classify, patch, report.
//!
//! Every record moves through the same states, one record at a time:
//!
//! ```text
//! Unverified ─► Evaluated ─┬─ match ──────────────────────────► MatchConfirmed
//!                          ├─ eval error / unparseable ─────────► ManualReview
//!                          └─ mismatch ─► Classified ─┬─ skip / below threshold ─► ManualReview
//!                                                     ├─ dry run ─────────────────► AutoFixable
//!                                                     └─ PatchAttempted ─┬─ ok ───► PatchApplied
//!                                                                        └─ miss ─► PatchFailed
//! ```
//!
//! No state is revisited within a run. Re-running starts every record again
//! from `Unverified`; patches are idempotent, so that is always safe.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::classify::{ClassificationResult, ConfidenceTier, classify_mismatch};
use crate::config::{ClassifierConfig, DriftConfig};
use crate::corpus::{Corpus, LoadOptions, load_corpus};
use crate::error::DriftResult;
use crate::model::{Mismatch, Record, values_match};
use crate::oracle::{Oracle, OracleError, OracleResult};
use crate::patch::{PatchOutcome, RecordPatcher, format_literal, parse_literal};
use crate::report::{
    Outcome, ReconciliationReport, WrittenArtifacts, load_mismatches, write_mismatches,
};

/// Records between progress log lines.
const PROGRESS_EVERY: usize = 100;

/// Knobs shared by `check` and `fix`.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    /// Write patches. When false, patchable records end as `AutoFixable`.
    pub apply: bool,
    /// Lowest tier patched automatically.
    pub min_tier: ConfidenceTier,
    /// Patcher lookahead in lines.
    pub window: usize,
    pub classifier: ClassifierConfig,
}

impl ReconcileOptions {
    pub fn from_config(config: &DriftConfig, apply: bool) -> Self {
        Self {
            apply,
            min_tier: config.patch.min_tier,
            window: config.patch.window,
            classifier: config.classifier,
        }
    }
}

/// Result of [`run_check`].
#[derive(Debug)]
pub struct CheckRun {
    pub report: ReconciliationReport,
    /// Divergent and failed evaluations, in corpus order.
    pub mismatches: Vec<Mismatch>,
    /// Set when the engine went away mid-run. Records before the failure
    /// are fully accounted for, including any patches already written.
    pub aborted: Option<OracleError>,
}

/// What the oracle said about one record.
#[derive(Debug)]
enum Evaluation {
    Match,
    Diverged(Mismatch),
    /// The stored input or expectation is not valid JSON.
    Unparseable(String),
}

fn evaluate(record: &Record, oracle: &mut dyn Oracle) -> OracleResult<Evaluation> {
    let expected = match parse_literal(&record.expected_output) {
        Ok(value) => value,
        Err(e) => {
            return Ok(Evaluation::Unparseable(format!(
                "expectedOutput is not valid JSON ({e}); fix the literal by hand"
            )));
        }
    };
    let input = if record.sample_input.trim().is_empty() {
        json!({})
    } else {
        match parse_literal(&record.sample_input) {
            Ok(value) => value,
            Err(e) => {
                return Ok(Evaluation::Unparseable(format!(
                    "sampleInput is not valid JSON ({e}); fix the input by hand"
                )));
            }
        }
    };

    match oracle.evaluate(&record.expression, &input) {
        Ok(actual) if values_match(&actual, &expected) => Ok(Evaluation::Match),
        Ok(actual) => Ok(Evaluation::Diverged(Mismatch::diverged(
            record.clone(),
            expected,
            actual,
        ))),
        Err(e) if e.is_fatal() => Err(OracleError::ConnectionLost {
            record: record.key().to_string(),
            message: e.to_string(),
        }),
        Err(e) => {
            tracing::debug!(record = %record.key(), error = %e, "evaluation failed");
            Ok(Evaluation::Diverged(Mismatch::failed(
                record.clone(),
                expected,
                e.http_status(),
                e.to_string(),
            )))
        }
    }
}

fn review_note(classification: &ClassificationResult, min_tier: ConfidenceTier) -> String {
    if classification.tier == ConfidenceTier::Skip {
        format!("{}; verify the expected output by hand", classification.reason)
    } else {
        format!(
            "{} ({} tier is below the {} patch threshold)",
            classification.reason, classification.tier, min_tier
        )
    }
}

/// Classify one mismatch and drive it to a terminal outcome.
pub fn resolve_mismatch(
    mismatch: &Mismatch,
    corpus_root: &Path,
    patcher: &RecordPatcher,
    options: &ReconcileOptions,
    report: &mut ReconciliationReport,
) -> Outcome {
    let record = &mismatch.record;
    let classification = classify_mismatch(mismatch, &options.classifier);
    report.record_classification(&classification);
    tracing::debug!(
        record = %record.key(),
        pattern = %classification.pattern,
        tier = %classification.tier,
        "mismatch classified"
    );

    if let Some(message) = &mismatch.error_message {
        report.record_manual_review(
            record,
            &mismatch.actual_result,
            Some(&classification),
            format!("engine could not evaluate the expression: {message}"),
        );
        return Outcome::ManualReview;
    }
    if !classification.tier.permits_patch(options.min_tier) {
        report.record_manual_review(
            record,
            &mismatch.actual_result,
            Some(&classification),
            review_note(&classification, options.min_tier),
        );
        return Outcome::ManualReview;
    }
    if !options.apply {
        report.record_auto_fixable();
        return Outcome::AutoFixable;
    }

    let literal = format_literal(&mismatch.actual_result);
    match patcher.patch_file(corpus_root, &record.key(), &literal) {
        Ok(PatchOutcome::Applied(operation)) => {
            tracing::info!(
                record = %record.key(),
                pattern = %classification.pattern,
                line = operation.line,
                "patched"
            );
            report.record_patch(Some(operation));
            Outcome::PatchApplied
        }
        Ok(PatchOutcome::Unchanged) => {
            report.record_patch(None);
            Outcome::PatchApplied
        }
        Ok(PatchOutcome::NotFound(reason)) => {
            report.record_patch_failure(record, &classification, reason.as_str());
            Outcome::PatchFailed
        }
        Err(e) => {
            tracing::error!(record = %record.key(), error = %e, "patch could not be written");
            report.record_patch_failure(record, &classification, e.to_string());
            Outcome::PatchFailed
        }
    }
}

/// Evaluate every record against the oracle and reconcile the mismatches.
///
/// Fails only when the health check fails, before any record is touched. A
/// connection lost mid-run stops the loop and is returned in
/// [`CheckRun::aborted`] together with everything done so far. Everything
/// else is routed into the report.
pub fn run_check(
    corpus: &Corpus,
    oracle: &mut dyn Oracle,
    options: &ReconcileOptions,
) -> OracleResult<CheckRun> {
    oracle.health()?;

    let patcher = RecordPatcher::new(options.window);
    let mut report = ReconciliationReport::new();
    let mut mismatches = Vec::new();
    let mut aborted = None;
    let total = corpus.len();

    for (i, record) in corpus.records.iter().enumerate() {
        match evaluate(record, oracle) {
            Ok(Evaluation::Match) => report.record_match(),
            Ok(Evaluation::Unparseable(reason)) => {
                tracing::warn!(record = %record.key(), %reason, "record not evaluated");
                report.record_manual_review(record, &Value::Null, None, reason);
            }
            Ok(Evaluation::Diverged(mismatch)) => {
                resolve_mismatch(&mismatch, &corpus.root, &patcher, options, &mut report);
                mismatches.push(mismatch);
            }
            Err(e) => {
                tracing::error!(
                    record = %record.key(),
                    checked = i,
                    total,
                    error = %e,
                    "evaluation engine lost, stopping"
                );
                aborted = Some(e);
                break;
            }
        }
        if (i + 1) % PROGRESS_EVERY == 0 {
            tracing::info!(checked = i + 1, total, mismatches = mismatches.len(), "progress");
        }
    }

    tracing::info!(
        records = total,
        mismatches = mismatches.len(),
        unresolved = report.unresolved(),
        "check finished"
    );
    Ok(CheckRun {
        report,
        mismatches,
        aborted,
    })
}

/// Reconcile a stored mismatch list without consulting the oracle.
pub fn run_fix(
    mismatches: &[Mismatch],
    corpus_root: &Path,
    options: &ReconcileOptions,
) -> ReconciliationReport {
    let patcher = RecordPatcher::new(options.window);
    let mut report = ReconciliationReport::new();
    for mismatch in mismatches {
        resolve_mismatch(mismatch, corpus_root, &patcher, options, &mut report);
    }
    tracing::info!(
        mismatches = mismatches.len(),
        patched = report.count(Outcome::PatchApplied),
        unresolved = report.unresolved(),
        "fix finished"
    );
    report
}

// ---------------------------------------------------------------------------
// Whole runs
// ---------------------------------------------------------------------------

/// A finished `check` with its artifacts on disk.
#[derive(Debug)]
pub struct CheckOutput {
    pub run: CheckRun,
    pub corpus: Corpus,
    pub mismatch_list: PathBuf,
    pub artifacts: WrittenArtifacts,
}

/// Load the corpus under `config`, check it and write all three artifacts.
///
/// The artifacts are written even when the run is cut short by a lost
/// connection, so patches applied before the failure are on record; the
/// connection error is returned afterwards.
pub fn check(
    config: &DriftConfig,
    category: Option<&str>,
    oracle: &mut dyn Oracle,
    apply: bool,
) -> DriftResult<CheckOutput> {
    let options = LoadOptions {
        extensions: config.extensions.clone(),
    };
    let mut corpus = load_corpus(&config.corpus_dir, &options)?;
    if let Some(category) = category {
        corpus.filter_category(category);
        tracing::info!(category, records = corpus.len(), "category filter applied");
    }

    let mut run = run_check(&corpus, oracle, &ReconcileOptions::from_config(config, apply))?;
    let mismatch_list = write_mismatches(&config.report_dir, &run.mismatches)?;
    let artifacts = run.report.persist(&config.report_dir)?;
    if let Some(err) = run.aborted.take() {
        tracing::error!(
            processed = run.report.total_records(),
            patched = run.report.patches().len(),
            summary = %artifacts.summary.display(),
            "partial run recorded"
        );
        return Err(err.into());
    }
    Ok(CheckOutput {
        run,
        corpus,
        mismatch_list,
        artifacts,
    })
}

/// Reconcile the mismatch list at `list` and write the summary artifacts.
pub fn fix(
    config: &DriftConfig,
    list: &Path,
    dry_run: bool,
) -> DriftResult<(ReconciliationReport, WrittenArtifacts)> {
    let mismatches = load_mismatches(list)?;
    let report = run_fix(
        &mismatches,
        &config.corpus_dir,
        &ReconcileOptions::from_config(config, !dry_run),
    );
    let artifacts = report.persist(&config.report_dir)?;
    Ok((report, artifacts))
}
