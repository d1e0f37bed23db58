use serde::{Deserialize, Serialize};
use std::fmt;

pub type JobId = u64;
/// Seconds since the Unix epoch, as reported by the engine [`Clock`](crate::Clock).
pub type Timestamp = u64;
/// Voting weight in weight-token base units.
pub type Weight = u128;

/// Value in base units of the settlement asset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn to_base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(units: u128) -> Self {
        Self(units)
    }
}

/// 32-byte account identity. Displayed, parsed and serialized as `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short form used in log fields.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(address: &str) -> Result<Self, hex::FromHexError> {
        let stripped = address.strip_prefix("0x").unwrap_or(address);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(stripped, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for AccountAddress {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for AccountAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Open,      // Bounty escrowed, waiting for a submission
    Submitted, // Proof submitted, voting window running
    Approved,  // Resolved in favour of the worker
    Rejected,  // Resolved in favour of the poster
    Cancelled, // Withdrawn by the poster before submission
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn can_transition_to(&self, next: &Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Open, Submitted) | (Open, Cancelled) | (Submitted, Approved) | (Submitted, Rejected)
        )
    }

    /// Ballot choice that wins under this status, if the job is resolved.
    pub fn winning_choice(&self) -> Option<VoteChoice> {
        match self {
            Self::Approved => Some(VoteChoice::Approve),
            Self::Rejected => Some(VoteChoice::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Approve,
    Reject,
}

/// A posted task with its escrowed bounty and running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub poster: AccountAddress,
    pub worker: Option<AccountAddress>,
    pub bounty: Amount,
    pub description: String,
    pub submission_proof: Option<String>,
    pub status: JobStatus,
    pub voting_deadline: Option<Timestamp>,
    pub approve_weight: Weight,
    pub reject_weight: Weight,
    pub created_at: Timestamp,
    pub resolution: Option<Resolution>,
}

impl Job {
    pub fn total_weight(&self) -> Option<Weight> {
        self.approve_weight.checked_add(self.reject_weight)
    }

    /// Accumulated weight of the side that won, once resolved.
    pub fn winning_weight(&self) -> Option<Weight> {
        match self.status {
            JobStatus::Approved => Some(self.approve_weight),
            JobStatus::Rejected => Some(self.reject_weight),
            _ => None,
        }
    }

    pub fn is_voting_open(&self, now: Timestamp) -> bool {
        self.status == JobStatus::Submitted
            && self.voting_deadline.map(|d| now < d).unwrap_or(false)
    }
}

/// One voter's ballot on one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub job_id: JobId,
    pub voter: AccountAddress,
    pub choice: VoteChoice,
    /// Oracle weight captured when the ballot was cast; never updated.
    pub weight_at_vote: Weight,
    pub claimed: bool,
    pub cast_at: Timestamp,
}

/// Settlement figures fixed by `resolve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: JobStatus,
    pub approval_percent: u8,
    pub voter_reward_pool: Amount,
    pub principal_amount: Amount,
    pub principal_recipient: AccountAddress,
    pub resolved_at: Timestamp,
}
