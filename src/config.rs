//! Run configuration, persisted as TOML.
//!
//! Every key is optional. The CLI loads `--config FILE` or, when present,
//! `driftmend.toml` from the working directory, then applies flag overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ConfidenceTier;
use crate::error::ConfigError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "driftmend.toml";

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriftConfig {
    /// Root of the example corpus.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    /// Where mismatch lists, summaries and backups are written.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// File extensions considered by the corpus loader.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Keep bulk-removal backups after the edited file is verified.
    #[serde(default = "default_keep_backups")]
    pub keep_backups: bool,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub patch: PatchConfig,
}

/// Connection settings for the evaluation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fixed pause between consecutive evaluation calls.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

/// Thresholds for the drift classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Largest absolute difference still treated as floating-point drift.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Differences below this are rounding noise and get the `high` tier.
    #[serde(default = "default_high_precision")]
    pub high_precision: f64,
}

/// Patcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    /// Lines scanned after the id marker when looking for the expected-output field.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Lowest tier that is patched automatically.
    #[serde(default = "default_min_tier")]
    pub min_tier: ConfidenceTier,
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("corpus")
}
fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_extensions() -> Vec<String> {
    vec!["ts".into(), "js".into(), "mjs".into()]
}
fn default_keep_backups() -> bool {
    true
}
fn default_base_url() -> String {
    "http://127.0.0.1:3000".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_delay_ms() -> u64 {
    100
}
fn default_epsilon() -> f64 {
    0.001
}
fn default_high_precision() -> f64 {
    1e-9
}
fn default_window() -> usize {
    40
}
fn default_min_tier() -> ConfidenceTier {
    ConfidenceTier::Medium
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            report_dir: default_report_dir(),
            extensions: default_extensions(),
            keep_backups: default_keep_backups(),
            oracle: OracleConfig::default(),
            classifier: ClassifierConfig::default(),
            patch: PatchConfig::default(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            high_precision: default_high_precision(),
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_tier: default_min_tier(),
        }
    }
}

impl DriftConfig {
    /// Parse a config from TOML text. `origin` is only used in diagnostics.
    pub fn from_toml(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Load `path` if given, else `driftmend.toml` in the working directory if it
    /// exists, else defaults.
    pub fn discover(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    tracing::debug!(path = %fallback.display(), "using config from working directory");
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.patch.window == 0 {
            return Err(ConfigError::Invalid {
                message: "patch.window must be at least 1 line".into(),
            });
        }
        if !(self.classifier.epsilon > 0.0) {
            return Err(ConfigError::Invalid {
                message: "classifier.epsilon must be a positive number".into(),
            });
        }
        if self.classifier.high_precision < 0.0
            || self.classifier.high_precision > self.classifier.epsilon
        {
            return Err(ConfigError::Invalid {
                message: "classifier.high_precision must lie between 0 and classifier.epsilon"
                    .into(),
            });
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid {
                message: "extensions must list at least one file extension".into(),
            });
        }
        Ok(())
    }

    /// Directory holding bulk-removal snapshots.
    pub fn backup_dir(&self) -> PathBuf {
        self.report_dir.join("backups")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = DriftConfig::from_toml("", "<inline>").unwrap();
        assert_eq!(config, DriftConfig::default());
        assert_eq!(config.oracle.delay(), Duration::from_millis(100));
        assert_eq!(config.patch.min_tier, ConfidenceTier::Medium);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = DriftConfig::from_toml(
            r#"
corpus_dir = "src/examples"

[oracle]
base_url = "http://localhost:9000"

[patch]
min_tier = "high"
"#,
            "<inline>",
        )
        .unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("src/examples"));
        assert_eq!(config.oracle.base_url, "http://localhost:9000");
        assert_eq!(config.oracle.timeout_secs, 10);
        assert_eq!(config.patch.min_tier, ConfidenceTier::High);
        assert_eq!(config.patch.window, 40);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DriftConfig::from_toml("corpus = \"x\"", "<inline>").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_window_is_invalid() {
        let err = DriftConfig::from_toml("[patch]\nwindow = 0", "<inline>").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("driftmend.toml");
        std::fs::write(&path, "[classifier]\nepsilon = 0.01\n").unwrap();
        let config = DriftConfig::load(&path).unwrap();
        assert_eq!(config.classifier.epsilon, 0.01);
        assert_eq!(config.backup_dir(), PathBuf::from("reports/backups"));
    }
}
