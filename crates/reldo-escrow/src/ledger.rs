use crate::collaborators::{CollaboratorResult, ValueTransfer, WeightOracle};
use crate::error::CollaboratorError;
use crate::types::{AccountAddress, Amount, JobId, Weight};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Escrow,
    Payout,
}

/// Record of a completed ledger movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub job_id: JobId,
    pub account: AccountAddress,
    pub amount: Amount,
    pub kind: TransferKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<AccountAddress, Amount>,
    escrows: HashMap<JobId, Amount>,
}

/// In-memory settlement ledger with per-job escrow sub-accounts, plus a
/// separate weight-token table used as the voting oracle.
///
/// Balances and escrows live under one lock so every movement is atomic.
#[derive(Default)]
pub struct MemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    weights: Arc<RwLock<HashMap<AccountAddress, Weight>>>,
    history: Arc<RwLock<Vec<TransferRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn credit(&self, address: AccountAddress, amount: Amount) -> CollaboratorResult<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let mut state = self.state.write().await;
        let current = state.balances.get(&address).copied().unwrap_or(Amount::ZERO);
        let new_balance = current.checked_add(amount).ok_or_else(|| {
            CollaboratorError::Rejected(format!("balance overflow for {}", address))
        })?;
        state.balances.insert(address, new_balance);

        info!(
            address = %address.short(),
            amount = %amount,
            balance_before = %current,
            balance_after = %new_balance,
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn balance_of(&self, address: AccountAddress) -> Amount {
        let state = self.state.read().await;
        state.balances.get(&address).copied().unwrap_or(Amount::ZERO)
    }

    /// Value still held in escrow for a job (unclaimed rewards and dust once resolved).
    pub async fn escrowed(&self, job_id: JobId) -> Amount {
        let state = self.state.read().await;
        state.escrows.get(&job_id).copied().unwrap_or(Amount::ZERO)
    }

    pub async fn total_escrowed(&self) -> Amount {
        let state = self.state.read().await;
        state
            .escrows
            .values()
            .fold(Amount::ZERO, |acc, v| acc.checked_add(*v).unwrap_or(acc))
    }

    pub async fn set_weight(&self, address: AccountAddress, weight: Weight) {
        let mut weights = self.weights.write().await;
        let before = weights.insert(address, weight).unwrap_or(0);
        debug!(
            address = %address.short(),
            weight_before = before,
            weight_after = weight,
            "⚖️ Weight updated"
        );
    }

    pub async fn history(&self) -> Vec<TransferRecord> {
        self.history.read().await.clone()
    }

    async fn record(&self, job_id: JobId, account: AccountAddress, amount: Amount, kind: TransferKind) {
        self.history.write().await.push(TransferRecord {
            job_id,
            account,
            amount,
            kind,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl ValueTransfer for MemoryLedger {
    async fn escrow(
        &self,
        job_id: JobId,
        from: AccountAddress,
        amount: Amount,
    ) -> CollaboratorResult<()> {
        {
            let mut state = self.state.write().await;
            let available = state.balances.get(&from).copied().unwrap_or(Amount::ZERO);
            let remaining = available.checked_sub(amount).ok_or_else(|| {
                CollaboratorError::InsufficientBalance {
                    needed: amount.to_string(),
                    available: available.to_string(),
                }
            })?;
            let held = state.escrows.get(&job_id).copied().unwrap_or(Amount::ZERO);
            let new_held = held.checked_add(amount).ok_or_else(|| {
                CollaboratorError::Rejected(format!("escrow overflow for job {}", job_id))
            })?;

            state.balances.insert(from, remaining);
            state.escrows.insert(job_id, new_held);

            info!(
                job_id,
                from = %from.short(),
                amount = %amount,
                escrow_after = %new_held,
                "🔒 Escrow locked"
            );
        }

        self.record(job_id, from, amount, TransferKind::Escrow).await;
        Ok(())
    }

    async fn pay(
        &self,
        job_id: JobId,
        to: AccountAddress,
        amount: Amount,
    ) -> CollaboratorResult<()> {
        {
            let mut state = self.state.write().await;
            let held = state
                .escrows
                .get(&job_id)
                .copied()
                .ok_or(CollaboratorError::EscrowNotFunded(job_id))?;
            let remaining = held.checked_sub(amount).ok_or_else(|| {
                CollaboratorError::InsufficientBalance {
                    needed: amount.to_string(),
                    available: held.to_string(),
                }
            })?;
            let balance = state.balances.get(&to).copied().unwrap_or(Amount::ZERO);
            let new_balance = balance.checked_add(amount).ok_or_else(|| {
                CollaboratorError::Rejected(format!("balance overflow for {}", to))
            })?;

            state.escrows.insert(job_id, remaining);
            state.balances.insert(to, new_balance);

            info!(
                job_id,
                to = %to.short(),
                amount = %amount,
                escrow_after = %remaining,
                "💸 Escrow released"
            );
        }

        self.record(job_id, to, amount, TransferKind::Payout).await;
        Ok(())
    }
}

#[async_trait]
impl WeightOracle for MemoryLedger {
    async fn weight_of(&self, who: AccountAddress) -> CollaboratorResult<Weight> {
        let weights = self.weights.read().await;
        Ok(weights.get(&who).copied().unwrap_or(0))
    }
}

/// [`ValueTransfer`] wrapper that can be told to fail, for exercising rollback paths.
pub struct FailingTransfer {
    inner: Arc<dyn ValueTransfer>,
    fail_escrow: AtomicBool,
    fail_pay: AtomicBool,
}

impl FailingTransfer {
    pub fn new(inner: Arc<dyn ValueTransfer>) -> Self {
        Self {
            inner,
            fail_escrow: AtomicBool::new(false),
            fail_pay: AtomicBool::new(false),
        }
    }

    pub fn set_fail_escrow(&self, fail: bool) {
        self.fail_escrow.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_pay(&self, fail: bool) {
        self.fail_pay.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ValueTransfer for FailingTransfer {
    async fn escrow(
        &self,
        job_id: JobId,
        from: AccountAddress,
        amount: Amount,
    ) -> CollaboratorResult<()> {
        if self.fail_escrow.load(Ordering::SeqCst) {
            warn!(job_id, from = %from.short(), "Injected escrow failure");
            return Err(CollaboratorError::Unavailable("escrow disabled".to_string()));
        }
        self.inner.escrow(job_id, from, amount).await
    }

    async fn pay(
        &self,
        job_id: JobId,
        to: AccountAddress,
        amount: Amount,
    ) -> CollaboratorResult<()> {
        if self.fail_pay.load(Ordering::SeqCst) {
            warn!(job_id, to = %to.short(), "Injected payout failure");
            return Err(CollaboratorError::Unavailable("payouts disabled".to_string()));
        }
        self.inner.pay(job_id, to, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> AccountAddress {
        AccountAddress::from_bytes([b; 32])
    }

    #[tokio::test]
    async fn test_escrow_lifecycle() {
        let ledger = MemoryLedger::new();
        let poster = addr(1);
        let worker = addr(2);

        ledger.credit(poster, Amount::from_base_units(1_000)).await.unwrap();
        ledger.escrow(7, poster, Amount::from_base_units(600)).await.unwrap();

        assert_eq!(ledger.balance_of(poster).await, Amount::from_base_units(400));
        assert_eq!(ledger.escrowed(7).await, Amount::from_base_units(600));

        ledger.pay(7, worker, Amount::from_base_units(590)).await.unwrap();
        assert_eq!(ledger.balance_of(worker).await, Amount::from_base_units(590));
        assert_eq!(ledger.escrowed(7).await, Amount::from_base_units(10));

        let history = ledger.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransferKind::Escrow);
        assert_eq!(history[1].kind, TransferKind::Payout);
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let ledger = MemoryLedger::new();
        let poster = addr(1);
        ledger.credit(poster, Amount::from_base_units(10)).await.unwrap();

        let err = ledger
            .escrow(1, poster, Amount::from_base_units(11))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance_of(poster).await, Amount::from_base_units(10));
        assert_eq!(ledger.escrowed(1).await, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_pay_cannot_overdraw_escrow() {
        let ledger = MemoryLedger::new();
        let poster = addr(1);
        ledger.credit(poster, Amount::from_base_units(100)).await.unwrap();
        ledger.escrow(3, poster, Amount::from_base_units(100)).await.unwrap();

        assert!(ledger.pay(3, addr(9), Amount::from_base_units(101)).await.is_err());
        assert!(matches!(
            ledger.pay(4, addr(9), Amount::from_base_units(1)).await,
            Err(CollaboratorError::EscrowNotFunded(4))
        ));
        assert_eq!(ledger.escrowed(3).await, Amount::from_base_units(100));
    }

    #[tokio::test]
    async fn test_weights_default_to_zero() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.weight_of(addr(5)).await.unwrap(), 0);
        ledger.set_weight(addr(5), 42).await;
        assert_eq!(ledger.weight_of(addr(5)).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_failing_transfer_toggles() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.credit(addr(1), Amount::from_base_units(50)).await.unwrap();
        let failing = FailingTransfer::new(ledger.clone());

        failing.set_fail_escrow(true);
        assert!(failing.escrow(1, addr(1), Amount::from_base_units(20)).await.is_err());
        assert_eq!(ledger.balance_of(addr(1)).await, Amount::from_base_units(50));

        failing.set_fail_escrow(false);
        failing.escrow(1, addr(1), Amount::from_base_units(20)).await.unwrap();

        failing.set_fail_pay(true);
        assert!(failing.pay(1, addr(2), Amount::from_base_units(5)).await.is_err());
        failing.set_fail_pay(false);
        failing.pay(1, addr(2), Amount::from_base_units(5)).await.unwrap();
        assert_eq!(ledger.escrowed(1).await, Amount::from_base_units(15));
    }
}
