use crate::collaborators::{Clock, ValueTransfer, WeightOracle};
use crate::config::EngineConfig;
use crate::error::{EscrowError, Result};
use crate::events::{EventLog, EventRecord, JobEvent};
use crate::types::{AccountAddress, Ballot, Job, JobId, JobStatus, Weight};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// First id handed out by `create_job`.
pub const FIRST_JOB_ID: JobId = 1;

/// Everything the engine mutates. Guarded by a single mutex so each
/// operation's precondition checks and writes form one indivisible step.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) config: EngineConfig,
    pub(crate) jobs: BTreeMap<JobId, Job>,
    pub(crate) ballots: HashMap<(JobId, AccountAddress), Ballot>,
    /// Voters per job in cast order
    pub(crate) voters: HashMap<JobId, Vec<AccountAddress>>,
    pub(crate) next_job_id: JobId,
}

impl EngineState {
    pub(crate) fn job(&self, job_id: JobId) -> Result<&Job> {
        self.jobs.get(&job_id).ok_or(EscrowError::JobNotFound(job_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_jobs: usize,
    pub open: usize,
    pub submitted: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub total_ballots: usize,
    pub claimed_ballots: usize,
}

/// Job escrow and weighted resolution engine.
///
/// Operations are split across modules by concern: lifecycle (`create_job`,
/// `submit_work`, `cancel_job`), ballots (`cast_vote`), resolution
/// (`resolve_job`) and rewards (`claim_reward`). Every mutating call holds the
/// state mutex for its full duration, collaborator calls included, so calls
/// are serialized and a failed transfer leaves no trace.
pub struct JobEngine {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) weights: Arc<dyn WeightOracle>,
    pub(crate) transfers: Arc<dyn ValueTransfer>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: EventLog,
}

impl JobEngine {
    pub fn new(
        config: EngineConfig,
        weights: Arc<dyn WeightOracle>,
        transfers: Arc<dyn ValueTransfer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            threshold_pct = config.approval_threshold_percent,
            reward_bps = config.voter_reward_bps,
            voting_period_secs = config.voting_period_secs,
            min_vote_weight = config.min_vote_weight,
            admin = ?config.admin.map(|a| a.short()),
            "✨ Job engine initialized"
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                config,
                jobs: BTreeMap::new(),
                ballots: HashMap::new(),
                voters: HashMap::new(),
                next_job_id: FIRST_JOB_ID,
            }),
            weights,
            transfers,
            clock,
            events: EventLog::new(),
        })
    }

    pub(crate) async fn emit(&self, event: JobEvent) -> EventRecord {
        self.events.append(self.clock.now(), event).await
    }

    /// Replace the minimum weight required to cast a ballot.
    ///
    /// Only the configured admin may call this; engines built without an admin
    /// keep the minimum fixed. Ballots already cast are not re-evaluated.
    pub async fn set_min_vote_weight(&self, caller: AccountAddress, new: Weight) -> Result<Weight> {
        let mut state = self.state.lock().await;
        Self::require_admin(&state.config, caller)?;

        let old = state.config.min_vote_weight;
        state.config.min_vote_weight = new;

        self.emit(JobEvent::MinVoteWeightUpdated {
            admin: caller,
            old,
            new,
        })
        .await;

        info!(
            admin = %caller.short(),
            old,
            new,
            "⚙️ Minimum vote weight updated"
        );

        Ok(old)
    }

    /// Hand the admin role to another identity.
    pub async fn transfer_admin(
        &self,
        caller: AccountAddress,
        new_admin: AccountAddress,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::require_admin(&state.config, caller)?;

        state.config.admin = Some(new_admin);

        self.emit(JobEvent::AdminTransferred {
            old: caller,
            new: new_admin,
        })
        .await;

        info!(
            old = %caller.short(),
            new = %new_admin.short(),
            "🔑 Admin transferred"
        );

        Ok(())
    }

    fn require_admin(config: &EngineConfig, caller: AccountAddress) -> Result<()> {
        match config.admin {
            Some(admin) if admin == caller => Ok(()),
            Some(_) => {
                warn!(caller = %caller.short(), "Rejected admin call from non-admin");
                Err(EscrowError::Unauthorized(format!(
                    "{} is not the engine admin",
                    caller
                )))
            }
            None => Err(EscrowError::Unauthorized(
                "engine has no admin; configuration is fixed".to_string(),
            )),
        }
    }

    pub async fn config(&self) -> EngineConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn job(&self, job_id: JobId) -> Result<Job> {
        let state = self.state.lock().await;
        state.job(job_id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn jobs_by_status(&self, status: JobStatus) -> Vec<Job> {
        let state = self.state.lock().await;
        state
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> EngineStats {
        let state = self.state.lock().await;
        let mut stats = EngineStats {
            total_jobs: state.jobs.len(),
            total_ballots: state.ballots.len(),
            claimed_ballots: state.ballots.values().filter(|b| b.claimed).count(),
            ..Default::default()
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Open => stats.open += 1,
                JobStatus::Submitted => stats.submitted += 1,
                JobStatus::Approved => stats.approved += 1,
                JobStatus::Rejected => stats.rejected += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        debug!(total_jobs = stats.total_jobs, "📊 Engine stats computed");
        stats
    }

    /// Handle to the append-only event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::collaborators::ManualClock;
    use crate::ledger::{FailingTransfer, MemoryLedger};
    use crate::types::Amount;

    pub const START: u64 = 1_700_000_000;

    pub fn addr(b: u8) -> AccountAddress {
        AccountAddress::from_bytes([b; 32])
    }

    pub struct Harness {
        pub engine: JobEngine,
        pub ledger: Arc<MemoryLedger>,
        pub transfers: Arc<FailingTransfer>,
        pub clock: Arc<ManualClock>,
    }

    pub async fn harness(config: EngineConfig) -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        let transfers = Arc::new(FailingTransfer::new(ledger.clone()));
        let clock = Arc::new(ManualClock::new(START));
        for b in 1..=9u8 {
            ledger
                .credit(addr(b), Amount::from_base_units(1_000_000))
                .await
                .unwrap();
        }
        let engine = JobEngine::new(config, ledger.clone(), transfers.clone(), clock.clone())
            .unwrap();
        Harness {
            engine,
            ledger,
            transfers,
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::{Amount, VoteChoice};

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let ledger = Arc::new(crate::ledger::MemoryLedger::new());
        let clock = Arc::new(crate::collaborators::ManualClock::new(0));
        let config = EngineConfig {
            approval_threshold_percent: 120,
            ..Default::default()
        };
        let result = JobEngine::new(config, ledger.clone(), ledger, clock);
        assert!(matches!(result, Err(EscrowError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_v1_min_weight_is_fixed() {
        let h = harness(EngineConfig::default()).await;
        let err = h.engine.set_min_vote_weight(addr(1), 50).await.unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized(_)));
        assert_eq!(h.engine.config().await.min_vote_weight, 1);
        assert!(h.engine.events().is_empty().await);
    }

    #[tokio::test]
    async fn test_admin_updates_min_weight() {
        let admin = addr(9);
        let h = harness(EngineConfig::default().with_admin(admin)).await;

        // Non-admin rejected
        assert!(h.engine.set_min_vote_weight(addr(1), 50).await.is_err());

        let old = h.engine.set_min_vote_weight(admin, 50).await.unwrap();
        assert_eq!(old, 1);
        assert_eq!(h.engine.config().await.min_vote_weight, 50);

        let events = h.engine.events().snapshot().await;
        assert_eq!(
            events[0].event,
            JobEvent::MinVoteWeightUpdated {
                admin,
                old: 1,
                new: 50
            }
        );
    }

    #[tokio::test]
    async fn test_admin_transfer() {
        let admin = addr(9);
        let successor = addr(8);
        let h = harness(EngineConfig::default().with_admin(admin)).await;

        h.engine.transfer_admin(admin, successor).await.unwrap();
        assert_eq!(h.engine.config().await.admin, Some(successor));

        // Old admin lost its rights
        assert!(h.engine.set_min_vote_weight(admin, 5).await.is_err());
        h.engine.set_min_vote_weight(successor, 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_and_status_queries() {
        let h = harness(EngineConfig::default()).await;
        let a = h
            .engine
            .create_job(addr(1), Amount::from_base_units(100), "a")
            .await
            .unwrap();
        let b = h
            .engine
            .create_job(addr(1), Amount::from_base_units(100), "b")
            .await
            .unwrap();
        h.engine.submit_work(b, addr(2), "proof").await.unwrap();
        h.ledger.set_weight(addr(3), 10).await;
        h.engine.cast_vote(b, addr(3), VoteChoice::Approve).await.unwrap();
        h.engine.cancel_job(a, addr(1)).await.unwrap();

        let stats = h.engine.stats().await;
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.total_ballots, 1);
        assert_eq!(h.engine.job_count().await, 2);
        assert_eq!(h.engine.jobs_by_status(JobStatus::Submitted).await[0].id, b);
        assert!(matches!(
            h.engine.job(99).await,
            Err(EscrowError::JobNotFound(99))
        ));
    }
}
