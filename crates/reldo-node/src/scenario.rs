//! Scripted runs of the escrow engine against an in-memory ledger.
//!
//! A scenario names its accounts, seeds their balances and weights, then
//! drives the engine through a list of steps. Time only moves through
//! explicit `advance` steps, so runs are reproducible.

use crate::config::{AccountSeed, EngineSection};
use anyhow::{anyhow, bail, Context, Result};
use reldo_escrow::{
    AccountAddress, Amount, EngineConfig, EscrowError, EventRecord, FailingTransfer, Job, JobEngine, JobId,
    ManualClock, MemoryLedger, VoteChoice,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error kind for failures outside the engine, such as unknown account names.
pub const SCRIPT_ERROR: &str = "Script";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Overrides the node's engine section when present
    #[serde(default)]
    pub engine: Option<EngineSection>,
    #[serde(default)]
    pub start_time: u64,
    #[serde(default)]
    pub accounts: Vec<ScenarioAccount>,
    pub steps: Vec<ScenarioStep>,
}

/// Named account. Without an explicit address one is derived from its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioAccount {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub weight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    #[serde(flatten)]
    pub action: Action,
    /// The step must fail with this error kind (an `EscrowError` variant
    /// name, or `Script` for problems in the scenario itself)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Create {
        poster: String,
        bounty: u64,
        #[serde(default)]
        description: String,
    },
    Submit {
        job: JobId,
        worker: String,
        proof: String,
    },
    Cancel {
        job: JobId,
        caller: String,
    },
    Vote {
        job: JobId,
        voter: String,
        choice: VoteChoice,
    },
    Advance {
        secs: u64,
    },
    Resolve {
        job: JobId,
    },
    Claim {
        job: JobId,
        voter: String,
    },
    SetWeight {
        account: String,
        weight: u64,
    },
    SetMinVoteWeight {
        caller: String,
        weight: u64,
    },
    TransferAdmin {
        caller: String,
        new_admin: String,
    },
    FailTransfers {
        #[serde(default)]
        escrow: bool,
        #[serde(default)]
        pay: bool,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Submit { .. } => "submit",
            Self::Cancel { .. } => "cancel",
            Self::Vote { .. } => "vote",
            Self::Advance { .. } => "advance",
            Self::Resolve { .. } => "resolve",
            Self::Claim { .. } => "claim",
            Self::SetWeight { .. } => "set_weight",
            Self::SetMinVoteWeight { .. } => "set_min_vote_weight",
            Self::TransferAdmin { .. } => "transfer_admin",
            Self::FailTransfers { .. } => "fail_transfers",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub op: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub steps: Vec<StepReport>,
    pub jobs: Vec<Job>,
    pub balances: BTreeMap<String, Amount>,
    pub events: Vec<EventRecord>,
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct ScenarioRunner {
    engine: JobEngine,
    ledger: Arc<MemoryLedger>,
    transfers: Arc<FailingTransfer>,
    clock: Arc<ManualClock>,
    names: BTreeMap<String, AccountAddress>,
}

impl ScenarioRunner {
    /// Build an engine and ledger for `scenario`, seeding accounts from both
    /// the node config and the scenario itself.
    pub async fn new(
        scenario: &Scenario,
        engine_section: &EngineSection,
        seeds: &[AccountSeed],
    ) -> Result<Self> {
        let section = scenario.engine.as_ref().unwrap_or(engine_section);
        let config = EngineConfig::try_from(section)?;

        let ledger = Arc::new(MemoryLedger::new());
        let transfers = Arc::new(FailingTransfer::new(ledger.clone()));
        let clock = Arc::new(ManualClock::new(scenario.start_time));

        let mut names = BTreeMap::new();
        for seed in seeds {
            let address = AccountAddress::from_hex(&seed.address)
                .with_context(|| format!("Invalid seed address {}", seed.address))?;
            seed_account(&ledger, address, seed.balance, seed.weight).await?;
            names.insert(address.to_string(), address);
        }
        for (index, account) in scenario.accounts.iter().enumerate() {
            let address = match &account.address {
                Some(hex) => AccountAddress::from_hex(hex)
                    .with_context(|| format!("Invalid address for {}", account.name))?,
                None => derived_address(index),
            };
            seed_account(&ledger, address, account.balance, account.weight).await?;
            if names.insert(account.name.clone(), address).is_some() {
                bail!("Duplicate account name {}", account.name);
            }
        }

        let engine = JobEngine::new(config, ledger.clone(), transfers.clone(), clock.clone())?;

        Ok(Self {
            engine,
            ledger,
            transfers,
            clock,
            names,
        })
    }

    pub fn engine(&self) -> &JobEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    fn resolve_name(&self, name: &str) -> Result<AccountAddress> {
        if let Some(address) = self.names.get(name) {
            return Ok(*address);
        }
        AccountAddress::from_hex(name).map_err(|_| anyhow!("Unknown account {}", name))
    }

    /// Run every step, stopping at the first one whose outcome differs from
    /// its `expect_error` kind.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        info!(
            name = %scenario.name,
            steps = scenario.steps.len(),
            accounts = self.names.len(),
            "🎬 Running scenario"
        );

        let mut reports = Vec::with_capacity(scenario.steps.len());
        for (index, step) in scenario.steps.iter().enumerate() {
            let outcome = self.apply(&step.action).await;
            let (error, detail) = match outcome {
                Ok(detail) => (None, detail),
                Err(e) => (Some(error_kind(&e)), format!("{:#}", e)),
            };
            let ok = error.is_none();

            debug!(index, op = step.action.name(), ok, error = ?error, detail = %detail, "Step applied");

            let mismatch = match (error, step.expect_error.as_deref()) {
                (None, None) => None,
                (None, Some(expected)) => {
                    Some(format!("succeeded but {} was expected", expected))
                }
                (Some(kind), None) => Some(format!("failed with {}", kind)),
                (Some(kind), Some(expected)) if kind != expected => {
                    Some(format!("failed with {} but {} was expected", kind, expected))
                }
                (Some(_), Some(_)) => None,
            };
            if let Some(mismatch) = mismatch {
                warn!(index, op = step.action.name(), detail = %detail, "Unexpected step outcome");
                bail!(
                    "Step {} ({}) {}: {}",
                    index,
                    step.action.name(),
                    mismatch,
                    detail
                );
            }

            reports.push(StepReport {
                index,
                op: step.action.name().to_string(),
                ok,
                error: error.map(str::to_string),
                detail,
            });
        }

        let mut jobs = Vec::new();
        for job_id in 1..=self.engine.job_count().await as JobId {
            jobs.push(self.engine.job(job_id).await?);
        }

        let mut balances = BTreeMap::new();
        for (name, address) in &self.names {
            balances.insert(name.clone(), self.ledger.balance_of(*address).await);
        }

        let events = self.engine.events().snapshot().await;
        info!(
            name = %scenario.name,
            jobs = jobs.len(),
            events = events.len(),
            "✅ Scenario complete"
        );

        Ok(ScenarioReport {
            name: scenario.name.clone(),
            steps: reports,
            jobs,
            balances,
            events,
        })
    }

    async fn apply(&self, action: &Action) -> Result<String> {
        let detail = match action {
            Action::Create {
                poster,
                bounty,
                description,
            } => {
                let poster = self.resolve_name(poster)?;
                let job_id = self
                    .engine
                    .create_job(poster, Amount::from_base_units(*bounty as u128), description.clone())
                    .await?;
                format!("job {}", job_id)
            }
            Action::Submit { job, worker, proof } => {
                let worker = self.resolve_name(worker)?;
                self.engine.submit_work(*job, worker, proof.clone()).await?;
                format!("job {} submitted", job)
            }
            Action::Cancel { job, caller } => {
                let caller = self.resolve_name(caller)?;
                let refund = self.engine.cancel_job(*job, caller).await?;
                format!("refunded {}", refund)
            }
            Action::Vote { job, voter, choice } => {
                let voter = self.resolve_name(voter)?;
                let weight = self.engine.cast_vote(*job, voter, *choice).await?;
                format!("{:?} with weight {}", choice, weight)
            }
            Action::Advance { secs } => {
                let now = self.clock.advance(*secs);
                format!("now {}", now)
            }
            Action::Resolve { job } => {
                let resolution = self.engine.resolve_job(*job).await?;
                format!(
                    "{} at {}%, principal {} to {}",
                    resolution.outcome,
                    resolution.approval_percent,
                    resolution.principal_amount,
                    resolution.principal_recipient
                )
            }
            Action::Claim { job, voter } => {
                let voter = self.resolve_name(voter)?;
                let reward = self.engine.claim_reward(*job, voter).await?;
                format!("claimed {}", reward)
            }
            Action::SetWeight { account, weight } => {
                let address = self.resolve_name(account)?;
                self.ledger.set_weight(address, *weight as u128).await;
                format!("weight {}", weight)
            }
            Action::SetMinVoteWeight { caller, weight } => {
                let caller = self.resolve_name(caller)?;
                let old = self
                    .engine
                    .set_min_vote_weight(caller, *weight as u128)
                    .await?;
                format!("min weight {} -> {}", old, weight)
            }
            Action::TransferAdmin { caller, new_admin } => {
                let caller = self.resolve_name(caller)?;
                let new_admin = self.resolve_name(new_admin)?;
                self.engine.transfer_admin(caller, new_admin).await?;
                format!("admin -> {}", new_admin)
            }
            Action::FailTransfers { escrow, pay } => {
                self.transfers.set_fail_escrow(*escrow);
                self.transfers.set_fail_pay(*pay);
                format!("fail escrow={} pay={}", escrow, pay)
            }
        };
        Ok(detail)
    }
}

/// Engine errors report their variant name; anything else is a script problem.
fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<EscrowError>()
        .map(EscrowError::kind)
        .unwrap_or(SCRIPT_ERROR)
}

/// Stable address for the `index`-th scenario account.
pub fn derived_address(index: usize) -> AccountAddress {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x5c;
    bytes[24..].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    AccountAddress::from_bytes(bytes)
}

async fn seed_account(
    ledger: &MemoryLedger,
    address: AccountAddress,
    balance: u64,
    weight: u64,
) -> Result<()> {
    ledger
        .credit(address, Amount::from_base_units(balance as u128))
        .await?;
    if weight > 0 {
        ledger.set_weight(address, weight as u128).await;
    }
    Ok(())
}
