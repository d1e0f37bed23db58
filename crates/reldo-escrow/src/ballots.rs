use crate::engine::JobEngine;
use crate::error::{EscrowError, Result};
use crate::events::JobEvent;
use crate::types::{AccountAddress, Ballot, JobId, VoteChoice, Weight};
use tracing::{debug, info};

impl JobEngine {
    /// Cast a weighted ballot on a submitted job.
    ///
    /// Weight is read from the oracle once, here, and frozen into the ballot.
    /// Returns the weight that was counted.
    pub async fn cast_vote(
        &self,
        job_id: JobId,
        voter: AccountAddress,
        choice: VoteChoice,
    ) -> Result<Weight> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let job = state.job(job_id)?;
        if !job.is_voting_open(now) {
            return Err(EscrowError::VotingClosed(job_id));
        }
        if state.ballots.contains_key(&(job_id, voter)) {
            return Err(EscrowError::AlreadyVoted(job_id));
        }

        let weight = self
            .weights
            .weight_of(voter)
            .await
            .map_err(|e| EscrowError::WeightUnavailable(e.to_string()))?;

        let required = state.config.min_vote_weight;
        if weight < required {
            debug!(job_id, voter = %voter.short(), weight, required, "Ballot below minimum weight");
            return Err(EscrowError::InsufficientWeight {
                required,
                actual: weight,
            });
        }

        let (approve_weight, reject_weight) = match choice {
            VoteChoice::Approve => (
                job.approve_weight
                    .checked_add(weight)
                    .ok_or(EscrowError::ArithmeticOverflow("approve tally"))?,
                job.reject_weight,
            ),
            VoteChoice::Reject => (
                job.approve_weight,
                job.reject_weight
                    .checked_add(weight)
                    .ok_or(EscrowError::ArithmeticOverflow("reject tally"))?,
            ),
        };
        approve_weight
            .checked_add(reject_weight)
            .ok_or(EscrowError::ArithmeticOverflow("total tally"))?;

        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.approve_weight = approve_weight;
            job.reject_weight = reject_weight;
        }
        state.ballots.insert(
            (job_id, voter),
            Ballot {
                job_id,
                voter,
                choice,
                weight_at_vote: weight,
                claimed: false,
                cast_at: now,
            },
        );
        state.voters.entry(job_id).or_default().push(voter);

        self.emit(JobEvent::VoteCast {
            job_id,
            voter,
            choice,
            weight,
        })
        .await;

        info!(
            job_id,
            voter = %voter.short(),
            choice = ?choice,
            weight,
            approve_weight,
            reject_weight,
            "🗳️ Vote cast"
        );

        Ok(weight)
    }

    pub async fn ballot(&self, job_id: JobId, voter: AccountAddress) -> Option<Ballot> {
        let state = self.state.lock().await;
        state.ballots.get(&(job_id, voter)).cloned()
    }

    /// All ballots on a job in the order they were cast.
    pub async fn ballots(&self, job_id: JobId) -> Result<Vec<Ballot>> {
        let state = self.state.lock().await;
        state.job(job_id)?;
        Ok(state
            .voters
            .get(&job_id)
            .map(|voters| {
                voters
                    .iter()
                    .filter_map(|v| state.ballots.get(&(job_id, *v)).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn has_voted(&self, job_id: JobId, voter: AccountAddress) -> bool {
        let state = self.state.lock().await;
        state.ballots.contains_key(&(job_id, voter))
    }

    pub async fn voting_open(&self, job_id: JobId) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.job(job_id)?.is_voting_open(self.clock.now()))
    }
}
