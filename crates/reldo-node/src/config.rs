use anyhow::{Context, Result};
use reldo_escrow::{AccountAddress, EngineConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "reldo.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub engine: EngineSection,
    pub logging: LoggingConfig,
    /// Ledger balances and weights loaded before any scenario step runs
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// File form of [`EngineConfig`]. Weights are kept to 64 bits here since TOML
/// integers are signed 64-bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    pub approval_threshold_percent: u8,
    pub voter_reward_bps: u16,
    pub voting_period_secs: u64,
    pub min_vote_weight: u64,
    /// Hex address; set to run with an admin-tunable minimum weight
    #[serde(default)]
    pub admin: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            approval_threshold_percent: defaults.approval_threshold_percent,
            voter_reward_bps: defaults.voter_reward_bps,
            voting_period_secs: defaults.voting_period_secs,
            min_vote_weight: defaults.min_vote_weight as u64,
            admin: None,
        }
    }
}

impl TryFrom<&EngineSection> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(section: &EngineSection) -> Result<Self> {
        let admin = section
            .admin
            .as_deref()
            .map(AccountAddress::from_hex)
            .transpose()
            .context("engine.admin is not a 32-byte hex address")?;

        let config = EngineConfig {
            approval_threshold_percent: section.approval_threshold_percent,
            voter_reward_bps: section.voter_reward_bps,
            voting_period_secs: section.voting_period_secs,
            min_vote_weight: section.min_vote_weight as u128,
            admin,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty, compact or json
    pub format: String,
    #[serde(default)]
    pub file_output: Option<PathBuf>,
    #[serde(default)]
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub address: String,
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub weight: u64,
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path` if given, else `./reldo.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(threshold) = env::var("RELDO_APPROVAL_THRESHOLD") {
            if let Ok(threshold) = threshold.parse() {
                self.engine.approval_threshold_percent = threshold;
            }
        }
        if let Ok(bps) = env::var("RELDO_REWARD_BPS") {
            if let Ok(bps) = bps.parse() {
                self.engine.voter_reward_bps = bps;
            }
        }
        if let Ok(period) = env::var("RELDO_VOTING_PERIOD_SECS") {
            if let Ok(period) = period.parse() {
                self.engine.voting_period_secs = period;
            }
        }
        if let Ok(weight) = env::var("RELDO_MIN_VOTE_WEIGHT") {
            if let Ok(weight) = weight.parse() {
                self.engine.min_vote_weight = weight;
            }
        }
        if let Ok(admin) = env::var("RELDO_ADMIN") {
            self.engine.admin = if admin.is_empty() { None } else { Some(admin) };
        }

        if let Ok(level) = env::var("RELDO_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("RELDO_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::try_from(&self.engine)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine_config()?;
        for seed in &self.accounts {
            AccountAddress::from_hex(&seed.address)
                .with_context(|| format!("Invalid account address {}", seed.address))?;
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => Ok(()),
            other => anyhow::bail!("Unknown log format: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        let engine = config.engine_config().unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_section_with_admin() {
        let section = EngineSection {
            admin: Some(format!("0x{}", "ab".repeat(32))),
            ..Default::default()
        };
        let engine = EngineConfig::try_from(&section).unwrap();
        assert_eq!(engine.admin, Some(AccountAddress::from_bytes([0xab; 32])));

        let bad = EngineSection {
            admin: Some("0x1234".to_string()),
            ..Default::default()
        };
        assert!(EngineConfig::try_from(&bad).is_err());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = NodeConfig::default();
        config.engine.approval_threshold_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();
        env::set_var("RELDO_APPROVAL_THRESHOLD", "51");
        env::set_var("RELDO_MIN_VOTE_WEIGHT", "not-a-number");
        env::set_var("RELDO_LOG_LEVEL", "debug");
        config.apply_env_overrides();
        env::remove_var("RELDO_APPROVAL_THRESHOLD");
        env::remove_var("RELDO_MIN_VOTE_WEIGHT");
        env::remove_var("RELDO_LOG_LEVEL");

        assert_eq!(config.engine.approval_threshold_percent, 51);
        // Unparseable values are ignored
        assert_eq!(config.engine.min_vote_weight, 1);
        assert_eq!(config.logging.level, "debug");
    }
}
