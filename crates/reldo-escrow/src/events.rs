//! Append-only event log and the projection that rebuilds job state from it.
//!
//! Every successful state transition appends exactly one [`EventRecord`].
//! Records carry a gap-free sequence number, so a consumer that has seen
//! record `n` knows it has the complete history up to `n`.
//! [`JobProjection::replay`] folds a log back into per-job state. The
//! integration tests use it to check that the log alone reproduces what the
//! engine holds.

use crate::error::ReplayError;
use crate::types::{AccountAddress, Amount, JobId, JobStatus, Timestamp, VoteChoice, Weight};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Maximum number of buffered records per subscriber before it lags
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    JobCreated {
        job_id: JobId,
        poster: AccountAddress,
        bounty: Amount,
    },
    WorkSubmitted {
        job_id: JobId,
        worker: AccountAddress,
        voting_deadline: Timestamp,
    },
    JobCancelled {
        job_id: JobId,
        poster: AccountAddress,
        refund: Amount,
    },
    VoteCast {
        job_id: JobId,
        voter: AccountAddress,
        choice: VoteChoice,
        weight: Weight,
    },
    JobResolved {
        job_id: JobId,
        status: JobStatus,
        approve_weight: Weight,
        reject_weight: Weight,
        approval_percent: u8,
        principal_recipient: AccountAddress,
        principal_amount: Amount,
        voter_reward_pool: Amount,
    },
    RewardClaimed {
        job_id: JobId,
        voter: AccountAddress,
        amount: Amount,
    },
    MinVoteWeightUpdated {
        admin: AccountAddress,
        old: Weight,
        new: Weight,
    },
    AdminTransferred {
        old: AccountAddress,
        new: AccountAddress,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobCreated { job_id, .. }
            | JobEvent::WorkSubmitted { job_id, .. }
            | JobEvent::JobCancelled { job_id, .. }
            | JobEvent::VoteCast { job_id, .. }
            | JobEvent::JobResolved { job_id, .. }
            | JobEvent::RewardClaimed { job_id, .. } => Some(*job_id),
            JobEvent::MinVoteWeightUpdated { .. } | JobEvent::AdminTransferred { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::JobCreated { .. } => "JobCreated",
            JobEvent::WorkSubmitted { .. } => "WorkSubmitted",
            JobEvent::JobCancelled { .. } => "JobCancelled",
            JobEvent::VoteCast { .. } => "VoteCast",
            JobEvent::JobResolved { .. } => "JobResolved",
            JobEvent::RewardClaimed { .. } => "RewardClaimed",
            JobEvent::MinVoteWeightUpdated { .. } => "MinVoteWeightUpdated",
            JobEvent::AdminTransferred { .. } => "AdminTransferred",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: JobEvent,
}

/// Append-only, sequenced event log with live subscriptions.
#[derive(Clone)]
pub struct EventLog {
    records: Arc<RwLock<Vec<EventRecord>>>,
    event_tx: broadcast::Sender<EventRecord>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            event_tx,
        }
    }

    pub(crate) async fn append(&self, timestamp: Timestamp, event: JobEvent) -> EventRecord {
        let mut records = self.records.write().await;
        let record = EventRecord {
            sequence: records.len() as u64,
            timestamp,
            event,
        };
        records.push(record.clone());

        // No subscribers is fine
        let _ = self.event_tx.send(record.clone());

        debug!(
            sequence = record.sequence,
            event = record.event.name(),
            "Event appended"
        );
        record
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.event_tx.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    pub async fn for_job(&self, job_id: JobId) -> Vec<EventRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.event.job_id() == Some(job_id))
            .cloned()
            .collect()
    }

    /// Pretty JSON array of every record, in sequence order.
    pub async fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&*self.records.read().await)
    }

    pub fn parse_json(json: &str) -> serde_json::Result<Vec<EventRecord>> {
        serde_json::from_str(json)
    }
}

/// Ballot state reconstructed from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotView {
    pub choice: VoteChoice,
    pub weight: Weight,
    pub claimed: bool,
}

/// Job state reconstructed from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub poster: AccountAddress,
    pub worker: Option<AccountAddress>,
    pub bounty: Amount,
    pub status: JobStatus,
    pub voting_deadline: Option<Timestamp>,
    pub approve_weight: Weight,
    pub reject_weight: Weight,
    pub ballots: BTreeMap<AccountAddress, BallotView>,
    /// Everything paid out of this job's escrow so far (refund, principal and rewards)
    pub paid_out: Amount,
}

impl JobView {
    /// Value still sitting in escrow for this job.
    pub fn escrow_remaining(&self) -> Amount {
        self.bounty.saturating_sub(self.paid_out)
    }
}

/// Per-job state folded from an event log.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProjection {
    pub jobs: BTreeMap<JobId, JobView>,
    pub min_vote_weight: Option<Weight>,
    pub admin: Option<AccountAddress>,
    pub last_sequence: Option<u64>,
}

impl JobProjection {
    pub fn replay(records: &[EventRecord]) -> Result<Self, ReplayError> {
        let mut projection = Self::default();
        for record in records {
            projection.apply(record)?;
        }
        Ok(projection)
    }

    pub fn job(&self, job_id: JobId) -> Option<&JobView> {
        self.jobs.get(&job_id)
    }

    pub fn count_by_status(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for job in self.jobs.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        counts
    }

    /// Fold one record into the projection.
    pub fn apply(&mut self, record: &EventRecord) -> Result<(), ReplayError> {
        let expected = self.last_sequence.map(|s| s + 1).unwrap_or(0);
        if record.sequence != expected {
            return Err(ReplayError::SequenceGap {
                expected,
                found: record.sequence,
            });
        }

        match &record.event {
            JobEvent::JobCreated {
                job_id,
                poster,
                bounty,
            } => {
                if self.jobs.contains_key(job_id) {
                    return Err(ReplayError::DuplicateJob(*job_id));
                }
                self.jobs.insert(
                    *job_id,
                    JobView {
                        id: *job_id,
                        poster: *poster,
                        worker: None,
                        bounty: *bounty,
                        status: JobStatus::Open,
                        voting_deadline: None,
                        approve_weight: 0,
                        reject_weight: 0,
                        ballots: BTreeMap::new(),
                        paid_out: Amount::ZERO,
                    },
                );
            }
            JobEvent::WorkSubmitted {
                job_id,
                worker,
                voting_deadline,
            } => {
                let job = self.job_mut(*job_id)?;
                transition(job, JobStatus::Submitted)?;
                job.worker = Some(*worker);
                job.voting_deadline = Some(*voting_deadline);
            }
            JobEvent::JobCancelled {
                job_id,
                poster,
                refund,
            } => {
                let job = self.job_mut(*job_id)?;
                if job.poster != *poster {
                    return Err(illegal(*job_id, "cancelled by non-poster"));
                }
                transition(job, JobStatus::Cancelled)?;
                job.paid_out = add_amount(*job_id, job.paid_out, *refund)?;
            }
            JobEvent::VoteCast {
                job_id,
                voter,
                choice,
                weight,
            } => {
                let job = self.job_mut(*job_id)?;
                if job.status != JobStatus::Submitted {
                    return Err(illegal(*job_id, "vote outside voting phase"));
                }
                if job.ballots.contains_key(voter) {
                    return Err(illegal(*job_id, "second ballot from same voter"));
                }
                let tally = match choice {
                    VoteChoice::Approve => &mut job.approve_weight,
                    VoteChoice::Reject => &mut job.reject_weight,
                };
                *tally = tally
                    .checked_add(*weight)
                    .ok_or_else(|| illegal(*job_id, "weight overflow"))?;
                job.ballots.insert(
                    *voter,
                    BallotView {
                        choice: *choice,
                        weight: *weight,
                        claimed: false,
                    },
                );
            }
            JobEvent::JobResolved {
                job_id,
                status,
                approve_weight,
                reject_weight,
                principal_amount,
                ..
            } => {
                let job = self.job_mut(*job_id)?;
                if job.approve_weight != *approve_weight || job.reject_weight != *reject_weight {
                    return Err(illegal(*job_id, "resolved tally differs from cast ballots"));
                }
                if !status.is_resolved() {
                    return Err(illegal(*job_id, "resolution to non-resolved status"));
                }
                transition(job, *status)?;
                job.paid_out = add_amount(*job_id, job.paid_out, *principal_amount)?;
            }
            JobEvent::RewardClaimed {
                job_id,
                voter,
                amount,
            } => {
                let job = self.job_mut(*job_id)?;
                let winning = job
                    .status
                    .winning_choice()
                    .ok_or_else(|| illegal(*job_id, "claim before resolution"))?;
                let ballot = job
                    .ballots
                    .get_mut(voter)
                    .ok_or_else(|| illegal(*job_id, "claim without ballot"))?;
                if ballot.claimed || ballot.choice != winning {
                    return Err(illegal(*job_id, "claim not allowed for ballot"));
                }
                ballot.claimed = true;
                job.paid_out = add_amount(*job_id, job.paid_out, *amount)?;
            }
            JobEvent::MinVoteWeightUpdated { admin, new, .. } => {
                self.min_vote_weight = Some(*new);
                self.admin = Some(*admin);
            }
            JobEvent::AdminTransferred { new, .. } => {
                self.admin = Some(*new);
            }
        }

        self.last_sequence = Some(record.sequence);
        Ok(())
    }

    fn job_mut(&mut self, job_id: JobId) -> Result<&mut JobView, ReplayError> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(ReplayError::UnknownJob(job_id))
    }
}

fn transition(job: &mut JobView, next: JobStatus) -> Result<(), ReplayError> {
    if !job.status.can_transition_to(&next) {
        return Err(illegal(
            job.id,
            &format!("{:?} -> {:?}", job.status, next),
        ));
    }
    job.status = next;
    Ok(())
}

fn add_amount(job_id: JobId, a: Amount, b: Amount) -> Result<Amount, ReplayError> {
    a.checked_add(b)
        .ok_or_else(|| illegal(job_id, "payout overflow"))
}

fn illegal(job_id: JobId, reason: &str) -> ReplayError {
    ReplayError::IllegalTransition {
        job_id,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> AccountAddress {
        AccountAddress::from_bytes([b; 32])
    }

    fn record(sequence: u64, event: JobEvent) -> EventRecord {
        EventRecord {
            sequence,
            timestamp: 1_000 + sequence,
            event,
        }
    }

    #[tokio::test]
    async fn test_append_assigns_sequence_and_notifies() {
        let log = EventLog::new();
        let mut rx = log.subscribe();

        log.append(
            10,
            JobEvent::JobCreated {
                job_id: 1,
                poster: addr(1),
                bounty: Amount::from_base_units(100),
            },
        )
        .await;
        let second = log
            .append(
                11,
                JobEvent::JobCancelled {
                    job_id: 1,
                    poster: addr(1),
                    refund: Amount::from_base_units(100),
                },
            )
            .await;

        assert_eq!(second.sequence, 1);
        assert_eq!(log.len().await, 2);
        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().event.name(), "JobCancelled");
        assert_eq!(log.for_job(1).await.len(), 2);
        assert!(log.for_job(2).await.is_empty());
    }

    #[test]
    fn test_replay_full_lifecycle() {
        let records = vec![
            record(
                0,
                JobEvent::JobCreated {
                    job_id: 1,
                    poster: addr(1),
                    bounty: Amount::from_base_units(1_000),
                },
            ),
            record(
                1,
                JobEvent::WorkSubmitted {
                    job_id: 1,
                    worker: addr(2),
                    voting_deadline: 5_000,
                },
            ),
            record(
                2,
                JobEvent::VoteCast {
                    job_id: 1,
                    voter: addr(3),
                    choice: VoteChoice::Approve,
                    weight: 70,
                },
            ),
            record(
                3,
                JobEvent::VoteCast {
                    job_id: 1,
                    voter: addr(4),
                    choice: VoteChoice::Reject,
                    weight: 30,
                },
            ),
            record(
                4,
                JobEvent::JobResolved {
                    job_id: 1,
                    status: JobStatus::Approved,
                    approve_weight: 70,
                    reject_weight: 30,
                    approval_percent: 70,
                    principal_recipient: addr(2),
                    principal_amount: Amount::from_base_units(990),
                    voter_reward_pool: Amount::from_base_units(10),
                },
            ),
            record(
                5,
                JobEvent::RewardClaimed {
                    job_id: 1,
                    voter: addr(3),
                    amount: Amount::from_base_units(10),
                },
            ),
        ];

        let projection = JobProjection::replay(&records).unwrap();
        let job = projection.job(1).unwrap();
        assert_eq!(job.status, JobStatus::Approved);
        assert_eq!(job.worker, Some(addr(2)));
        assert_eq!(job.approve_weight, 70);
        assert_eq!(job.reject_weight, 30);
        assert!(job.ballots[&addr(3)].claimed);
        assert!(!job.ballots[&addr(4)].claimed);
        assert_eq!(job.escrow_remaining(), Amount::ZERO);
        assert_eq!(projection.last_sequence, Some(5));
    }

    #[test]
    fn test_replay_rejects_sequence_gap() {
        let records = vec![record(
            1,
            JobEvent::JobCreated {
                job_id: 1,
                poster: addr(1),
                bounty: Amount::from_base_units(1),
            },
        )];
        assert_eq!(
            JobProjection::replay(&records),
            Err(ReplayError::SequenceGap {
                expected: 0,
                found: 1
            })
        );
    }

    #[test]
    fn test_replay_rejects_illegal_history() {
        // Vote on a job that was never created
        let records = vec![record(
            0,
            JobEvent::VoteCast {
                job_id: 9,
                voter: addr(1),
                choice: VoteChoice::Approve,
                weight: 1,
            },
        )];
        assert_eq!(
            JobProjection::replay(&records),
            Err(ReplayError::UnknownJob(9))
        );

        // Vote while still Open
        let records = vec![
            record(
                0,
                JobEvent::JobCreated {
                    job_id: 1,
                    poster: addr(1),
                    bounty: Amount::from_base_units(1),
                },
            ),
            record(
                1,
                JobEvent::VoteCast {
                    job_id: 1,
                    voter: addr(2),
                    choice: VoteChoice::Approve,
                    weight: 1,
                },
            ),
        ];
        assert!(matches!(
            JobProjection::replay(&records),
            Err(ReplayError::IllegalTransition { job_id: 1, .. })
        ));
    }

    #[test]
    fn test_event_json_shape() {
        let event = JobEvent::MinVoteWeightUpdated {
            admin: addr(1),
            old: 1,
            new: 50,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["MinVoteWeightUpdated"]["new"], 50);
        assert_eq!(
            json["MinVoteWeightUpdated"]["admin"],
            addr(1).to_string().as_str()
        );
        assert_eq!(event.job_id(), None);
    }
}
