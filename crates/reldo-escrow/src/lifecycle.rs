use crate::engine::JobEngine;
use crate::error::{EscrowError, Result};
use crate::events::JobEvent;
use crate::types::{AccountAddress, Amount, Job, JobId, JobStatus};
use tracing::{info, warn};

impl JobEngine {
    /// Post a job and pull its bounty into escrow.
    pub async fn create_job(
        &self,
        poster: AccountAddress,
        bounty: Amount,
        description: impl Into<String>,
    ) -> Result<JobId> {
        if bounty.is_zero() {
            return Err(EscrowError::InvalidBounty);
        }

        let mut state = self.state.lock().await;
        let job_id = state.next_job_id;
        let next_job_id = job_id
            .checked_add(1)
            .ok_or(EscrowError::ArithmeticOverflow("job id"))?;

        self.transfers
            .escrow(job_id, poster, bounty)
            .await
            .map_err(|e| {
                warn!(job_id, poster = %poster.short(), error = %e, "Bounty escrow failed");
                EscrowError::TransferFailed(e.to_string())
            })?;

        let now = self.clock.now();
        state.jobs.insert(
            job_id,
            Job {
                id: job_id,
                poster,
                worker: None,
                bounty,
                description: description.into(),
                submission_proof: None,
                status: JobStatus::Open,
                voting_deadline: None,
                approve_weight: 0,
                reject_weight: 0,
                created_at: now,
                resolution: None,
            },
        );
        state.next_job_id = next_job_id;

        self.emit(JobEvent::JobCreated {
            job_id,
            poster,
            bounty,
        })
        .await;

        info!(
            job_id,
            poster = %poster.short(),
            bounty = %bounty,
            "📋 Job created"
        );

        Ok(job_id)
    }

    /// Record a worker's proof and open the voting window.
    ///
    /// The first submission wins; any identity may submit.
    pub async fn submit_work(
        &self,
        job_id: JobId,
        worker: AccountAddress,
        proof: impl Into<String>,
    ) -> Result<()> {
        let proof = proof.into();
        let mut state = self.state.lock().await;
        let voting_period = state.config.voting_period_secs;

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(EscrowError::JobNotFound(job_id))?;
        if job.status != JobStatus::Open {
            return Err(EscrowError::invalid_state("Open", job.status));
        }
        if proof.trim().is_empty() {
            return Err(EscrowError::EmptyProof);
        }

        let now = self.clock.now();
        let voting_deadline = now
            .checked_add(voting_period)
            .ok_or(EscrowError::ArithmeticOverflow("voting deadline"))?;

        job.worker = Some(worker);
        job.submission_proof = Some(proof);
        job.status = JobStatus::Submitted;
        job.voting_deadline = Some(voting_deadline);

        self.emit(JobEvent::WorkSubmitted {
            job_id,
            worker,
            voting_deadline,
        })
        .await;

        info!(
            job_id,
            worker = %worker.short(),
            voting_deadline,
            "📤 Work submitted, voting open"
        );

        Ok(())
    }

    /// Withdraw an open job and refund the full bounty to its poster.
    pub async fn cancel_job(&self, job_id: JobId, caller: AccountAddress) -> Result<Amount> {
        let mut state = self.state.lock().await;

        let job = state.job(job_id)?;
        if job.poster != caller {
            return Err(EscrowError::Unauthorized(format!(
                "only the poster may cancel job {}",
                job_id
            )));
        }
        if job.status != JobStatus::Open {
            return Err(EscrowError::invalid_state("Open", job.status));
        }
        let refund = job.bounty;

        self.transfers
            .pay(job_id, caller, refund)
            .await
            .map_err(|e| {
                warn!(job_id, error = %e, "Bounty refund failed");
                EscrowError::TransferFailed(e.to_string())
            })?;

        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Cancelled;
        }

        self.emit(JobEvent::JobCancelled {
            job_id,
            poster: caller,
            refund,
        })
        .await;

        info!(
            job_id,
            poster = %caller.short(),
            refund = %refund,
            "🚫 Job cancelled, bounty refunded"
        );

        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::engine::test_support::*;
    use crate::error::EscrowError;
    use crate::types::{Amount, JobStatus};

    #[tokio::test]
    async fn test_create_escrows_bounty() {
        let h = harness(EngineConfig::default()).await;
        let poster = addr(1);

        let id = h
            .engine
            .create_job(poster, Amount::from_base_units(1_000), "index the archive")
            .await
            .unwrap();
        assert_eq!(id, 1);

        let job = h.engine.job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.created_at, START);
        assert_eq!(h.ledger.escrowed(id).await, Amount::from_base_units(1_000));
        assert_eq!(h.ledger.balance_of(poster).await, Amount::from_base_units(999_000));

        let second = h
            .engine
            .create_job(poster, Amount::from_base_units(1), "second")
            .await
            .unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_create_rejects_zero_bounty() {
        let h = harness(EngineConfig::default()).await;
        let err = h
            .engine
            .create_job(addr(1), Amount::ZERO, "free work")
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::InvalidBounty);
        assert_eq!(h.engine.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_escrow_leaves_no_job() {
        let h = harness(EngineConfig::default()).await;
        h.transfers.set_fail_escrow(true);

        let err = h
            .engine
            .create_job(addr(1), Amount::from_base_units(10), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::TransferFailed(_)));
        assert_eq!(h.engine.job_count().await, 0);
        assert!(h.engine.events().is_empty().await);

        // Id was not consumed
        h.transfers.set_fail_escrow(false);
        let id = h
            .engine
            .create_job(addr(1), Amount::from_base_units(10), "x")
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_submit_opens_voting() {
        let h = harness(EngineConfig::default()).await;
        let id = h
            .engine
            .create_job(addr(1), Amount::from_base_units(10), "x")
            .await
            .unwrap();

        assert_eq!(
            h.engine.submit_work(id, addr(2), "   ").await.unwrap_err(),
            EscrowError::EmptyProof
        );

        h.engine.submit_work(id, addr(2), "ipfs://proof").await.unwrap();
        let job = h.engine.job(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Submitted);
        assert_eq!(job.worker, Some(addr(2)));
        assert_eq!(job.voting_deadline, Some(START + 3 * 24 * 60 * 60));

        // Second submission is refused
        let err = h.engine.submit_work(id, addr(3), "late").await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { .. }));
        assert_eq!(h.engine.job(id).await.unwrap().worker, Some(addr(2)));
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let h = harness(EngineConfig::default()).await;
        let poster = addr(1);
        let id = h
            .engine
            .create_job(poster, Amount::from_base_units(500), "x")
            .await
            .unwrap();

        let err = h.engine.cancel_job(id, addr(2)).await.unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized(_)));

        h.transfers.set_fail_pay(true);
        let err = h.engine.cancel_job(id, poster).await.unwrap_err();
        assert!(matches!(err, EscrowError::TransferFailed(_)));
        assert_eq!(h.engine.job(id).await.unwrap().status, JobStatus::Open);

        h.transfers.set_fail_pay(false);
        let refund = h.engine.cancel_job(id, poster).await.unwrap();
        assert_eq!(refund, Amount::from_base_units(500));
        assert_eq!(h.ledger.balance_of(poster).await, Amount::from_base_units(1_000_000));
        assert_eq!(h.ledger.escrowed(id).await, Amount::ZERO);

        // Cancelled jobs stay cancelled
        assert!(h.engine.cancel_job(id, poster).await.is_err());
        assert!(h.engine.submit_work(id, addr(2), "p").await.is_err());
    }

    #[tokio::test]
    async fn test_cannot_cancel_after_submission() {
        let h = harness(EngineConfig::default()).await;
        let id = h
            .engine
            .create_job(addr(1), Amount::from_base_units(500), "x")
            .await
            .unwrap();
        h.engine.submit_work(id, addr(2), "p").await.unwrap();

        let err = h.engine.cancel_job(id, addr(1)).await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidState { .. }));
    }
}
