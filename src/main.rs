//! driftmend CLI: detect and reconcile expected-output drift in an example corpus.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use driftmend::classify::ConfidenceTier;
use driftmend::config::DriftConfig;
use driftmend::oracle::HttpOracle;
use driftmend::pipeline;
use driftmend::removal::{BackupGuard, parse_id_list, remove_records};
use driftmend::report::{MISMATCHES_FILE, ReconciliationReport, load_mismatches, render_analysis};

#[derive(Parser)]
#[command(
    name = "driftmend",
    version,
    about = "Drift detection and reconciliation for expression-example corpora"
)]
struct Cli {
    /// Config file (defaults to ./driftmend.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the evaluation engine.
    #[arg(long, global = true)]
    oracle_url: Option<String>,

    /// Directory for mismatch lists, summaries and backups.
    #[arg(long, global = true)]
    report_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every record, classify mismatches and write the reports.
    Check {
        /// Corpus root directory.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Patch auto-fixable records in the same run.
        #[arg(long)]
        apply: bool,

        /// Only check records in this category.
        #[arg(long)]
        category: Option<String>,

        /// Lowest tier patched automatically (high or medium).
        #[arg(long)]
        min_tier: Option<ConfidenceTier>,
    },

    /// Apply patches from an existing mismatch list.
    Fix {
        /// Mismatch list (defaults to <report-dir>/mismatches.json).
        #[arg(long)]
        mismatches: Option<PathBuf>,

        /// Corpus root directory.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Lowest tier patched automatically (high or medium).
        #[arg(long)]
        min_tier: Option<ConfidenceTier>,

        /// Classify and report without writing any corpus file.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a pattern and tier breakdown of an existing mismatch list.
    Analyze {
        /// Mismatch list (defaults to <report-dir>/mismatches.json).
        #[arg(long)]
        mismatches: Option<PathBuf>,
    },

    /// Remove whole records from one corpus file, with a backup.
    Remove {
        /// Corpus file to edit.
        #[arg(long)]
        file: PathBuf,

        /// Comma-separated record ids.
        #[arg(long, value_delimiter = ',', required_unless_present = "ids_file", conflicts_with = "ids_file")]
        ids: Vec<String>,

        /// File listing record ids, one per line or comma-separated.
        #[arg(long)]
        ids_file: Option<PathBuf>,

        /// Delete the backup once the edited file is verified.
        #[arg(long)]
        discard_backup: bool,
    },
}

/// Non-zero exit when anything was left for a human.
fn exit_code(report: &ReconciliationReport) -> ExitCode {
    if report.unresolved() == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn main() -> Result<ExitCode> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = DriftConfig::discover(cli.config.as_deref())?;
    if let Some(url) = cli.oracle_url {
        config.oracle.base_url = url;
    }
    if let Some(dir) = cli.report_dir {
        config.report_dir = dir;
    }

    match cli.command {
        Commands::Check {
            corpus,
            apply,
            category,
            min_tier,
        } => {
            if let Some(dir) = corpus {
                config.corpus_dir = dir;
            }
            if let Some(tier) = min_tier {
                config.patch.min_tier = tier;
            }
            config.validate()?;

            let mut oracle = HttpOracle::new(&config.oracle);
            let output = pipeline::check(&config, category.as_deref(), &mut oracle, apply)?;
            let corpus = &output.corpus;
            println!(
                "Checked {} records from {} files ({} unrecoverable, {} duplicate ids)",
                corpus.len(),
                corpus.files_scanned,
                corpus.unrecoverable.len(),
                corpus.duplicates.len()
            );
            print!("{}", output.run.report.render());
            println!("Mismatch list: {}", output.mismatch_list.display());
            println!("Summary:       {}", output.artifacts.summary.display());
            println!("Manual review: {}", output.artifacts.manual_review.display());
            Ok(exit_code(&output.run.report))
        }

        Commands::Fix {
            mismatches,
            corpus,
            min_tier,
            dry_run,
        } => {
            if let Some(dir) = corpus {
                config.corpus_dir = dir;
            }
            if let Some(tier) = min_tier {
                config.patch.min_tier = tier;
            }
            config.validate()?;

            let path = mismatches.unwrap_or_else(|| config.report_dir.join(MISMATCHES_FILE));
            let (report, written) = pipeline::fix(&config, &path, dry_run)?;
            if dry_run {
                println!("Dry run: no corpus file was modified.");
            }
            print!("{}", report.render());
            println!("Summary:       {}", written.summary.display());
            println!("Manual review: {}", written.manual_review.display());
            Ok(exit_code(&report))
        }

        Commands::Analyze { mismatches } => {
            let path = mismatches.unwrap_or_else(|| config.report_dir.join(MISMATCHES_FILE));
            let list = load_mismatches(&path)?;
            print!("{}", render_analysis(&list, &config.classifier));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Remove {
            file,
            ids,
            ids_file,
            discard_backup,
        } => {
            let ids = match ids_file {
                Some(path) => parse_id_list(&std::fs::read_to_string(path).into_diagnostic()?),
                None => ids,
            };
            if ids.is_empty() {
                miette::bail!("no record ids given; pass --ids or a non-empty --ids-file");
            }

            let guard = BackupGuard::new(&config.corpus_dir, config.backup_dir());
            let keep_backup = config.keep_backups && !discard_backup;
            let report = remove_records(&file, &ids, &guard, keep_backup)?;

            println!(
                "Removed {} records from {} ({} remain)",
                report.removed.len(),
                report.file.display(),
                report.remaining
            );
            if !report.missing.is_empty() {
                println!("Not found: {}", report.missing.join(", "));
            }
            if let Some(backup) = &report.backup {
                println!("Backup:    {}", backup.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
