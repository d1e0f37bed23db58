//! Capabilities the engine consumes from its host.
//!
//! The engine never stores balances itself. It asks a [`WeightOracle`] for
//! voting power, moves value through a [`ValueTransfer`], and reads time from
//! a [`Clock`]. Hosts plug in whatever backs these (a ledger, an RPC client,
//! the in-memory [`MemoryLedger`](crate::MemoryLedger)).

use crate::error::CollaboratorError;
use crate::types::{AccountAddress, Amount, JobId, Timestamp, Weight};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Reports the voting weight an identity holds right now.
#[async_trait]
pub trait WeightOracle: Send + Sync {
    async fn weight_of(&self, who: AccountAddress) -> CollaboratorResult<Weight>;
}

/// Moves settlement value in and out of per-job escrow.
///
/// Either call must be all-or-nothing: on `Err` no value has moved.
#[async_trait]
pub trait ValueTransfer: Send + Sync {
    /// Pull `amount` from `from` into the escrow held for `job_id`.
    async fn escrow(
        &self,
        job_id: JobId,
        from: AccountAddress,
        amount: Amount,
    ) -> CollaboratorResult<()>;

    /// Pay `amount` out of the escrow held for `job_id` to `to`.
    async fn pay(&self, job_id: JobId, to: AccountAddress, amount: Amount)
        -> CollaboratorResult<()>;
}

/// Monotonically non-decreasing time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock in whole seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Clock driven by hand, for tests and scripted scenarios.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward by `secs`, saturating at `u64::MAX`.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let previous = match self.now.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
            Some(now.saturating_add(secs))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        previous.saturating_add(secs)
    }

    /// Move the clock forward to `ts`. Earlier values are ignored so time never runs backwards.
    pub fn set(&self, ts: Timestamp) -> Timestamp {
        self.now.fetch_max(ts, Ordering::SeqCst).max(ts)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
