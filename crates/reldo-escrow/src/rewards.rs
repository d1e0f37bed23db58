use crate::engine::{EngineState, JobEngine};
use crate::error::{EscrowError, Result};
use crate::events::JobEvent;
use crate::math::mul_div_floor;
use crate::types::{AccountAddress, Amount, JobId, Weight};
use tracing::{debug, info, warn};

/// A voter's floored share of the reward pool.
pub fn reward_share(pool: Amount, weight: Weight, winning_total: Weight) -> Result<Amount> {
    if winning_total == 0 {
        return Ok(Amount::ZERO);
    }
    mul_div_floor(pool.to_base_units(), weight, winning_total)
        .map(Amount::from_base_units)
        .ok_or(EscrowError::ArithmeticOverflow("voter reward"))
}

impl EngineState {
    /// Checks every claim precondition and returns the payable reward.
    fn claimable(&self, job_id: JobId, voter: AccountAddress) -> Result<Amount> {
        let job = self.job(job_id)?;
        let (resolution, winning_choice, winning_total) =
            match (&job.resolution, job.status.winning_choice(), job.winning_weight()) {
                (Some(r), Some(c), Some(w)) => (r, c, w),
                _ => return Err(EscrowError::invalid_state("Approved or Rejected", job.status)),
            };

        let ballot = self.ballots.get(&(job_id, voter)).ok_or_else(|| {
            EscrowError::Unauthorized(format!("{} did not vote on job {}", voter, job_id))
        })?;
        if ballot.choice != winning_choice {
            return Err(EscrowError::NotWinner(job_id));
        }
        if ballot.claimed || ballot.weight_at_vote == 0 {
            return Err(EscrowError::AlreadyClaimed(job_id));
        }

        reward_share(resolution.voter_reward_pool, ballot.weight_at_vote, winning_total)
    }
}

impl JobEngine {
    /// Pay a winning voter their share of the reward pool. Single use per ballot.
    pub async fn claim_reward(&self, job_id: JobId, voter: AccountAddress) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let reward = state.claimable(job_id, voter)?;

        if !reward.is_zero() {
            self.transfers
                .pay(job_id, voter, reward)
                .await
                .map_err(|e| {
                    warn!(job_id, voter = %voter.short(), error = %e, "Reward payout failed");
                    EscrowError::TransferFailed(e.to_string())
                })?;
        }

        if let Some(ballot) = state.ballots.get_mut(&(job_id, voter)) {
            ballot.claimed = true;
        }

        self.emit(JobEvent::RewardClaimed {
            job_id,
            voter,
            amount: reward,
        })
        .await;

        info!(
            job_id,
            voter = %voter.short(),
            reward = %reward,
            "🎁 Reward claimed"
        );

        Ok(reward)
    }

    /// What `claim_reward` would pay right now; zero when nothing is claimable.
    pub async fn pending_reward(&self, job_id: JobId, voter: AccountAddress) -> Result<Amount> {
        let state = self.state.lock().await;
        state.job(job_id)?;
        let pending = state.claimable(job_id, voter).unwrap_or(Amount::ZERO);
        debug!(job_id, voter = %voter.short(), pending = %pending, "Pending reward");
        Ok(pending)
    }
}
