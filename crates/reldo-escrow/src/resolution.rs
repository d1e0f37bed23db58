use crate::config::{BPS_DENOMINATOR, MAX_PERCENT};
use crate::engine::JobEngine;
use crate::error::{EscrowError, Result};
use crate::events::JobEvent;
use crate::math::mul_div_floor;
use crate::types::{Amount, JobId, JobStatus, Resolution, Weight};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Figures derived from a final tally, before any value moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub outcome: JobStatus,
    pub approval_percent: u8,
    pub voter_reward_pool: Amount,
    pub principal_amount: Amount,
}

/// Decide a tally and split the bounty.
///
/// `approval_percent` is floored, and a tally landing exactly on the threshold
/// approves. The reward pool is carved out of the bounty whichever side wins.
pub fn compute_resolution(
    job_id: JobId,
    bounty: Amount,
    approve_weight: Weight,
    reject_weight: Weight,
    threshold_percent: u8,
    reward_bps: u16,
) -> Result<Settlement> {
    let total = approve_weight
        .checked_add(reject_weight)
        .ok_or(EscrowError::ArithmeticOverflow("total tally"))?;
    if total == 0 {
        return Err(EscrowError::NoVotes(job_id));
    }

    // approve <= total, so this is at most 100
    let approval_percent = mul_div_floor(approve_weight, MAX_PERCENT as u128, total)
        .and_then(|pct| u8::try_from(pct).ok())
        .ok_or(EscrowError::ArithmeticOverflow("approval percent"))?;

    let outcome = if approval_percent >= threshold_percent {
        JobStatus::Approved
    } else {
        JobStatus::Rejected
    };

    let voter_reward_pool = mul_div_floor(
        bounty.to_base_units(),
        reward_bps as u128,
        BPS_DENOMINATOR as u128,
    )
    .map(Amount::from_base_units)
    .ok_or(EscrowError::ArithmeticOverflow("voter reward pool"))?;
    let principal_amount = bounty
        .checked_sub(voter_reward_pool)
        .ok_or(EscrowError::ArithmeticOverflow("principal amount"))?;

    Ok(Settlement {
        outcome,
        approval_percent,
        voter_reward_pool,
        principal_amount,
    })
}

impl JobEngine {
    /// Close the vote on a job whose window has elapsed and pay out the principal.
    ///
    /// Approved jobs pay the worker, rejected jobs pay the poster. The voter
    /// reward pool stays in escrow for `claim_reward`.
    pub async fn resolve_job(&self, job_id: JobId) -> Result<Resolution> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let threshold = state.config.approval_threshold_percent;
        let reward_bps = state.config.voter_reward_bps;

        let job = state.job(job_id)?;
        if job.status != JobStatus::Submitted {
            return Err(EscrowError::invalid_state("Submitted", job.status));
        }
        let deadline = job
            .voting_deadline
            .ok_or_else(|| EscrowError::invalid_state("voting deadline", "none"))?;
        if now < deadline {
            return Err(EscrowError::VotingNotEnded { deadline, now });
        }

        let settlement = compute_resolution(
            job_id,
            job.bounty,
            job.approve_weight,
            job.reject_weight,
            threshold,
            reward_bps,
        )?;

        let principal_recipient = match settlement.outcome {
            JobStatus::Approved => job
                .worker
                .ok_or_else(|| EscrowError::invalid_state("worker", "none"))?,
            _ => job.poster,
        };
        let (approve_weight, reject_weight) = (job.approve_weight, job.reject_weight);

        if !settlement.principal_amount.is_zero() {
            self.transfers
                .pay(job_id, principal_recipient, settlement.principal_amount)
                .await
                .map_err(|e| {
                    warn!(job_id, error = %e, "Principal payout failed");
                    EscrowError::TransferFailed(e.to_string())
                })?;
        }

        let resolution = Resolution {
            outcome: settlement.outcome,
            approval_percent: settlement.approval_percent,
            voter_reward_pool: settlement.voter_reward_pool,
            principal_amount: settlement.principal_amount,
            principal_recipient,
            resolved_at: now,
        };
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = settlement.outcome;
            job.resolution = Some(resolution.clone());
        }

        self.emit(JobEvent::JobResolved {
            job_id,
            status: settlement.outcome,
            approve_weight,
            reject_weight,
            approval_percent: settlement.approval_percent,
            principal_recipient,
            principal_amount: settlement.principal_amount,
            voter_reward_pool: settlement.voter_reward_pool,
        })
        .await;

        info!(
            job_id,
            outcome = %settlement.outcome,
            approval_pct = settlement.approval_percent,
            threshold_pct = threshold,
            approve_weight,
            reject_weight,
            principal = %settlement.principal_amount,
            recipient = %principal_recipient.short(),
            reward_pool = %settlement.voter_reward_pool,
            "⚖️ Job resolved"
        );

        Ok(resolution)
    }
}
