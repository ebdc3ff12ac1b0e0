use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{SecuritySeverity, Severity};
use crate::registry::{npm::DEFAULT_REGISTRY, osv::DEFAULT_OSV_URL};
use crate::scanner::ScannerKind;

/// Root configuration structure, deserialized from `.dep-doctor/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub scanners: ScannersConfig,
    pub score: ScoreWeights,
    pub fix: FixConfig,
}

/// Endpoints and limits for the registry and advisory lookups.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub registry_url: String,
    pub advisory_url: String,
    pub timeout_secs: u64,
    /// Lookups issued concurrently per batch.
    pub concurrency: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY.to_string(),
            advisory_url: DEFAULT_OSV_URL.to_string(),
            timeout_secs: 10,
            concurrency: 32,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which scanners a run uses when none are named on the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannersConfig {
    pub enabled: Vec<ScannerKind>,
}

impl Default for ScannersConfig {
    fn default() -> Self {
        Self {
            enabled: ScannerKind::ALL.to_vec(),
        }
    }
}

/// Health-score penalty per finding. The score starts at 100.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub vuln_critical: f64,
    pub vuln_high: f64,
    pub vuln_moderate: f64,
    pub vuln_low: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            critical: 20.0,
            high: 10.0,
            medium: 5.0,
            low: 2.0,
            vuln_critical: 25.0,
            vuln_high: 15.0,
            vuln_moderate: 8.0,
            vuln_low: 3.0,
        }
    }
}

impl ScoreWeights {
    pub fn issue(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    pub fn vulnerability(&self, severity: SecuritySeverity) -> f64 {
        match severity {
            SecuritySeverity::Critical => self.vuln_critical,
            SecuritySeverity::High => self.vuln_high,
            SecuritySeverity::Moderate => self.vuln_moderate,
            SecuritySeverity::Low => self.vuln_low,
        }
    }
}

/// Settings for applying fixes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Package-manager commands are killed after this many seconds.
    pub command_timeout_secs: u64,
    /// Where manifest backups go; next to the manifest when unset.
    pub backup_dir: Option<PathBuf>,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 300,
            backup_dir: None,
        }
    }
}

impl FixConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Load the configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<project_path>/.dep-doctor/config.toml`
/// 3. `~/.config/dep-doctor/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let project_config = project_path.join(".dep-doctor").join("config.toml");
    if project_config.exists() {
        return read_config(&project_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("dep-doctor").join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}
