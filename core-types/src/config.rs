// Copyright (c) James Kassemi, SC, US. All rights reserved.
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "VAULT";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Runtime configuration, layered: optional TOML file, then `VAULT__*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub accounting: AccountingSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub read_retry: RetrySettings,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            read_retry: RetrySettings::default(),
        }
    }
}

impl LedgerSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs.max(1))
    }
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_pct")]
    pub jitter_pct: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_pct: default_jitter_pct(),
        }
    }
}

fn default_max_attempts() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter_pct() -> f64 {
    0.2
}

/// When the reconciliation tick re-reads balances from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalanceRefresh {
    /// Only accounts whose mirrored balance was never populated.
    #[default]
    Lazy,
    /// Every candidate, every tick.
    EveryTick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub run_on_start: bool,
    #[serde(default)]
    pub balance_refresh: BalanceRefresh,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            label: default_label(),
            interval_secs: default_interval_secs(),
            run_on_start: false,
            balance_refresh: BalanceRefresh::default(),
        }
    }
}

impl ReconcileSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn interval_hours(&self) -> f64 {
        self.interval().as_secs_f64() / 3_600.0
    }
}

fn default_label() -> String {
    "dev".to_string()
}

fn default_interval_secs() -> u64 {
    3 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingSettings {
    #[serde(default = "default_serialize_per_address")]
    pub serialize_per_address: bool,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        Self {
            serialize_per_address: default_serialize_per_address(),
        }
    }
}

fn default_serialize_per_address() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_recent_uploads")]
    pub recent_uploads: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            recent_uploads: default_recent_uploads(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("vault.state")
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_recent_uploads() -> usize {
    20
}

impl AppConfig {
    /// Loads `config.toml` from the working directory when present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE), false)
    }

    /// Loads the given file, then applies `VAULT__SECTION__FIELD` overrides.
    pub fn load_from(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::from(path).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.label.trim().is_empty() {
            return Err(ConfigError::Message(
                "reconcile.label must not be empty".to_string(),
            ));
        }
        if self.storage.recent_uploads == 0 {
            return Err(ConfigError::Message(
                "storage.recent_uploads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.reconcile.interval(), Duration::from_secs(10_800));
        assert_eq!(config.reconcile.interval_hours(), 3.0);
        assert_eq!(config.reconcile.balance_refresh, BalanceRefresh::Lazy);
        assert!(!config.reconcile.run_on_start);
        assert!(config.accounting.serialize_per_address);
        assert_eq!(config.storage.max_upload_bytes, 52_428_800);
        assert_eq!(config.storage.recent_uploads, 20);
        assert_eq!(config.ledger.confirmation_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn missing_optional_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml"), false).unwrap();
        assert_eq!(config.reconcile.label, "dev");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.toml");
        fs::write(
            &path,
            r#"
[reconcile]
label = "prod"
interval_secs = 60
balance_refresh = "every_tick"

[ledger]
confirmation_timeout_secs = 30

[ledger.read_retry]
max_attempts = 2
"#,
        )
        .unwrap();
        let config = AppConfig::load_from(&path, true).unwrap();
        assert_eq!(config.reconcile.label, "prod");
        assert_eq!(config.reconcile.interval(), Duration::from_secs(60));
        assert_eq!(config.reconcile.balance_refresh, BalanceRefresh::EveryTick);
        assert_eq!(config.ledger.confirmation_timeout_secs, 30);
        assert_eq!(config.ledger.read_retry.max_attempts, 2);
        assert_eq!(config.ledger.read_retry.base_delay_ms, 250);
    }

    #[test]
    fn rejects_empty_recent_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.toml");
        fs::write(&path, "[storage]\nrecent_uploads = 0\n").unwrap();
        assert!(AppConfig::load_from(&path, true).is_err());
    }
}
