/*!
# Reldo Job Escrow

Token-weighted job validation and escrow settlement. A poster escrows a
bounty, a worker submits proof of work, stakeholders vote with their token
weight during a fixed window, and the engine settles the bounty from the
weighted outcome.

## Design Principles

- **Escrow first**: a job exists only once its bounty is held
- **Frozen weight**: a ballot counts the oracle weight read when it was cast
- **Threshold decision**: approval at or above the threshold approves
- **Carved-out rewards**: the voter pool comes out of the bounty whichever side wins
- **No double payment**: principal pays once, each winning ballot claims once
- **Audit trail**: every transition is appended to an event log that can be replayed

## Module Structure

- **types**: Job, Ballot, Resolution, addresses and amounts
- **config**: Engine parameters and validation
- **collaborators**: Weight oracle, value transfer and clock traits
- **ledger**: In-memory ledger implementing the collaborator traits
- **engine**: Engine state, administration and queries
- **lifecycle**: create, submit, cancel
- **ballots**: Weighted vote casting
- **resolution**: Threshold decision and principal payout
- **rewards**: Proportional voter reward claims
- **math**: Overflow-free floored multiply-divide
- **events**: Event log, subscription and replay projection
- **error**: Engine errors

## Example Usage

```rust,ignore
use reldo_escrow::{AccountAddress, Amount, EngineConfig, JobEngine, ManualClock, MemoryLedger, VoteChoice};
use std::sync::Arc;

let ledger = Arc::new(MemoryLedger::new());
let clock = Arc::new(ManualClock::new(0));
let engine = JobEngine::new(EngineConfig::default(), ledger.clone(), ledger.clone(), clock.clone())?;

let job_id = engine.create_job(poster, Amount::from_base_units(1_000), "label 10k images").await?;
engine.submit_work(job_id, worker, "ipfs://Qm...").await?;
engine.cast_vote(job_id, voter, VoteChoice::Approve).await?;

clock.advance(EngineConfig::default().voting_period_secs);
let resolution = engine.resolve_job(job_id).await?;
let reward = engine.claim_reward(job_id, voter).await?;
```

## Job Lifecycle

```text
create (escrow bounty)
    ↓
Open ──── cancel (refund poster) ───→ Cancelled
    ↓ submit (open voting window)
Submitted
    ↓ votes until deadline, then resolve
Approved (principal → worker) | Rejected (principal → poster)
    ↓
winning voters claim reward shares
```

## Settlement

```text
approval_percent = floor(approve * 100 / (approve + reject))
outcome          = Approved if approval_percent >= threshold else Rejected
reward_pool      = floor(bounty * reward_bps / 10000)
principal        = bounty - reward_pool
reward(voter)    = floor(reward_pool * weight_at_vote / winning_weight)
```

Rounding dust from the reward floor stays in escrow.
*/

pub mod ballots;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod math;
pub mod resolution;
pub mod rewards;
pub mod types;

pub use collaborators::{Clock, CollaboratorResult, ManualClock, SystemClock, ValueTransfer, WeightOracle};
pub use config::{EngineConfig, BPS_DENOMINATOR, MAX_PERCENT};
pub use engine::{EngineStats, JobEngine, FIRST_JOB_ID};
pub use error::{CollaboratorError, EscrowError, ReplayError, Result};
pub use events::{
    BallotView, EventLog, EventRecord, JobEvent, JobProjection, JobView, EVENT_CHANNEL_CAPACITY,
};
pub use ledger::{FailingTransfer, MemoryLedger, TransferKind, TransferRecord};
pub use math::mul_div_floor;
pub use resolution::{compute_resolution, Settlement};
pub use rewards::reward_share;
pub use types::{
    AccountAddress, Amount, Ballot, Job, JobId, JobStatus, Resolution, Timestamp, VoteChoice,
    Weight,
};
