use crate::error::{EscrowError, Result};
use crate::types::{AccountAddress, Weight};
use serde::{Deserialize, Serialize};

pub const MAX_PERCENT: u8 = 100;
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Engine parameters.
///
/// Threshold, reward share and voting period are fixed for the lifetime of an
/// engine. `min_vote_weight` may be replaced at runtime by `admin` when one is
/// configured (the V2 variant); with `admin = None` it is fixed as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum approve share, in whole percent of approve + reject weight
    pub approval_threshold_percent: u8,
    /// Share of each bounty reserved for winning voters, in basis points
    pub voter_reward_bps: u16,
    /// Length of the voting window opened by a submission
    pub voting_period_secs: u64,
    /// Minimum oracle weight needed to cast a ballot
    pub min_vote_weight: Weight,
    /// Identity allowed to update `min_vote_weight`
    #[serde(default)]
    pub admin: Option<AccountAddress>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_threshold_percent: 67,
            voter_reward_bps: 100,           // 1% of bounty
            voting_period_secs: 3 * 24 * 3600, // 3 days
            min_vote_weight: 1,
            admin: None,
        }
    }
}

impl EngineConfig {
    /// V2 configuration with an operator that can tune the minimum vote weight.
    pub fn with_admin(mut self, admin: AccountAddress) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn is_admin_managed(&self) -> bool {
        self.admin.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.approval_threshold_percent > MAX_PERCENT {
            return Err(EscrowError::InvalidConfiguration(format!(
                "approval_threshold_percent must be <= {}, got {}",
                MAX_PERCENT, self.approval_threshold_percent
            )));
        }

        if self.voter_reward_bps > BPS_DENOMINATOR {
            return Err(EscrowError::InvalidConfiguration(format!(
                "voter_reward_bps must be <= {}, got {}",
                BPS_DENOMINATOR, self.voter_reward_bps
            )));
        }

        if self.voting_period_secs == 0 {
            return Err(EscrowError::InvalidConfiguration(
                "voting_period_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
