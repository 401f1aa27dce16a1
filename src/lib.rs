// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # driftmend
//!
//! Drift detection and reconciliation for an expression-example regression
//! corpus. Every example record pairs an expression with a sample input and
//! a stored expected output. driftmend re-runs each record against a live
//! evaluation engine, works out *why* a stale expectation no longer matches,
//! and rewrites only the records it can prove are formatting drift.
//!
//! ## Architecture
//!
//! - **Corpus** (`corpus`): record extraction from TS/JS sources with a
//!   literal parser and a field-scan fallback
//! - **Oracle** (`oracle`): throttled HTTP client for the evaluation engine
//! - **Classifier** (`classify`): ordered decision table of drift patterns
//!   and confidence tiers
//! - **Patcher** (`patch`): single-field, line-local rewrites of corpus files
//! - **Report** (`report`): outcome accounting and JSON audit artifacts
//! - **Pipeline** (`pipeline`): the per-record state machine tying it together
//! - **Removal** (`removal`): backup-guarded bulk deletion of whole records
//!
//! ## Library usage
//!
//! ```no_run
//! use driftmend::config::DriftConfig;
//! use driftmend::corpus::{LoadOptions, load_corpus};
//! use driftmend::oracle::HttpOracle;
//! use driftmend::pipeline::{ReconcileOptions, run_check};
//!
//! let config = DriftConfig::default();
//! let corpus = load_corpus(&config.corpus_dir, &LoadOptions::default()).unwrap();
//! let mut oracle = HttpOracle::new(&config.oracle);
//! let run = run_check(&corpus, &mut oracle, &ReconcileOptions::from_config(&config, false)).unwrap();
//! println!("{}", run.report.render());
//! ```

pub mod classify;
pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod oracle;
pub mod patch;
pub mod pipeline;
pub mod removal;
pub mod report;
