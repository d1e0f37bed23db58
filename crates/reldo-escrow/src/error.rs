use crate::types::{JobId, Weight};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EscrowError>;

/// Errors returned by engine operations.
///
/// Every variant is a rejected precondition: when an operation returns one of
/// these, no state was changed, no event was appended and no funds moved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Voting is closed for job {0}")]
    VotingClosed(JobId),

    #[error("Voting period has not ended: deadline {deadline}, now {now}")]
    VotingNotEnded { deadline: u64, now: u64 },

    #[error("Voter already voted on job {0}")]
    AlreadyVoted(JobId),

    #[error("Reward already claimed on job {0}")]
    AlreadyClaimed(JobId),

    #[error("Insufficient weight: required {required}, actual {actual}")]
    InsufficientWeight { required: Weight, actual: Weight },

    #[error("No votes cast on job {0}")]
    NoVotes(JobId),

    #[error("Voter is not on the winning side of job {0}")]
    NotWinner(JobId),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Bounty must be greater than zero")]
    InvalidBounty,

    #[error("Submission proof must not be empty")]
    EmptyProof,

    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Weight oracle unavailable: {0}")]
    WeightUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl EscrowError {
    /// Variant name, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobNotFound(_) => "JobNotFound",
            Self::InvalidState { .. } => "InvalidState",
            Self::Unauthorized(_) => "Unauthorized",
            Self::VotingClosed(_) => "VotingClosed",
            Self::VotingNotEnded { .. } => "VotingNotEnded",
            Self::AlreadyVoted(_) => "AlreadyVoted",
            Self::AlreadyClaimed(_) => "AlreadyClaimed",
            Self::InsufficientWeight { .. } => "InsufficientWeight",
            Self::NoVotes(_) => "NoVotes",
            Self::NotWinner(_) => "NotWinner",
            Self::TransferFailed(_) => "TransferFailed",
            Self::InvalidBounty => "InvalidBounty",
            Self::EmptyProof => "EmptyProof",
            Self::ArithmeticOverflow(_) => "ArithmeticOverflow",
            Self::WeightUnavailable(_) => "WeightUnavailable",
            Self::InvalidConfiguration(_) => "InvalidConfiguration",
        }
    }

    pub(crate) fn invalid_state(expected: &str, actual: impl std::fmt::Debug) -> Self {
        EscrowError::InvalidState {
            expected: expected.to_string(),
            actual: format!("{:?}", actual),
        }
    }
}

/// Failure reported by an external collaborator (weight oracle or value transfer).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: String, available: String },

    #[error("Escrow for job {0} is not funded")]
    EscrowNotFunded(JobId),

    #[error("Account unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected by host: {0}")]
    Rejected(String),
}

/// Errors raised while rebuilding state from an event log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("Event references unknown job {0}")]
    UnknownJob(JobId),

    #[error("Duplicate job id {0}")]
    DuplicateJob(JobId),

    #[error("Illegal transition on job {job_id}: {reason}")]
    IllegalTransition { job_id: JobId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_variant() {
        assert_eq!(EscrowError::NotWinner(1).kind(), "NotWinner");
        assert_eq!(
            EscrowError::invalid_state("Open", "Cancelled").kind(),
            "InvalidState"
        );
        assert_eq!(
            EscrowError::InsufficientWeight {
                required: 20,
                actual: 10
            }
            .kind(),
            "InsufficientWeight"
        );
    }
}
