// Runner - Scenario replay and snapshot inspection
// Principle: A scenario is a deterministic log; replaying it twice gives the same state
//
// Scenario layout (JSON):
// {
//   "genesis": {
//     "balances": [{ "account": "alice", "amount": 1000 }],
//     "experts":  ["carol"],
//     "policies": [{ "policy": "zero-balance", "behaviour": "manual" }]
//   },
//   "transactions": [
//     { "block": 1, "caller": "alice", "op": { "create_pool": { ... } } },
//     { "block": 2, "caller": "bob",   "op": { "stake_funds": { "pool": "p", "amount": 10 } } }
//   ]
// }
//
// Accounts are labels or 64-char hex addresses. Pools are referenced by name.

use crate::cli::config::{NodeConfig, OutputFormat};
use crate::contracts::assurance::{AssuranceConfig, AssuranceContract, AssuranceError, AssuranceEvent, ErrorKind};
use crate::contracts::collaborators::{
    InMemoryLedger, LedgerError, PolicyBehaviour, PolicyBook, WhitelistExpertRegistry,
};
use crate::storage::{Snapshot, SnapshotError};
use crate::types::{AccountError, AccountId, Balance, BlockNumber, Pool, PoolId, PoolParams, PoolState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Contract wired to the in-memory collaborators
pub type ScenarioContract = AssuranceContract<InMemoryLedger, PolicyBook, WhitelistExpertRegistry>;

// =============================================================================
// SCENARIO FORMAT
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub genesis: Genesis,
    pub transactions: Vec<ScenarioTx>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Genesis {
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub experts: Vec<String>,
    #[serde(default)]
    pub policies: Vec<GenesisPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisBalance {
    pub account: String,
    pub amount: Balance,
    /// Also allow the custodian to pull the whole amount
    #[serde(default = "default_true")]
    pub approve: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisPolicy {
    pub policy: String,
    pub behaviour: BehaviourSpec,
    /// Subjects violated from the start (manual policies)
    #[serde(default)]
    pub flagged: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviourSpec {
    Never,
    Always,
    Manual,
    Unanswerable,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioTx {
    pub block: BlockNumber,
    pub caller: String,
    pub op: Operation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Operation {
    CreatePool(PoolSpec),
    DepositFunds { pool: String, amount: Balance },
    WithdrawDeposit { pool: String },
    StakeFunds { pool: String, amount: Balance },
    WithdrawStake { pool: String },
    WithdrawInterest { pool: String },
    WithdrawClaim { pool: String },
    CheckPolicy { pool: String },
    /// Caller lets the custodian pull `amount`
    Approve { amount: Balance },
    FlagViolation { policy: String, subject: String },
    ClearViolation { policy: String, subject: String },
    AddExpert { account: String },
    RemoveExpert { account: String },
    SetGlobalMinDeposit { amount: Balance },
}

impl Operation {
    pub fn label(&self) -> String {
        match self {
            Operation::CreatePool(spec) => format!("create_pool({})", spec.name),
            Operation::DepositFunds { pool, amount } => format!("deposit_funds({}, {})", pool, amount),
            Operation::WithdrawDeposit { pool } => format!("withdraw_deposit({})", pool),
            Operation::StakeFunds { pool, amount } => format!("stake_funds({}, {})", pool, amount),
            Operation::WithdrawStake { pool } => format!("withdraw_stake({})", pool),
            Operation::WithdrawInterest { pool } => format!("withdraw_interest({})", pool),
            Operation::WithdrawClaim { pool } => format!("withdraw_claim({})", pool),
            Operation::CheckPolicy { pool } => format!("check_policy({})", pool),
            Operation::Approve { amount } => format!("approve({})", amount),
            Operation::FlagViolation { policy, subject } => format!("flag_violation({}, {})", policy, subject),
            Operation::ClearViolation { policy, subject } => format!("clear_violation({}, {})", policy, subject),
            Operation::AddExpert { account } => format!("add_expert({})", account),
            Operation::RemoveExpert { account } => format!("remove_expert({})", account),
            Operation::SetGlobalMinDeposit { amount } => format!("set_global_min_deposit({})", amount),
        }
    }
}

/// Pool parameters as written in a scenario
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSpec {
    pub name: String,
    pub candidate: String,
    pub policy: String,
    pub max_payout_per_period: Balance,
    pub min_stake_required: Balance,
    pub initial_deposit: Balance,
    pub bonus_expert_factor: u64,
    pub bonus_first_expert_factor: u64,
    pub pay_period_blocks: BlockNumber,
    pub min_stake_time_blocks: BlockNumber,
    pub timeout_blocks: BlockNumber,
    #[serde(default)]
    pub audit_report_url: String,
    #[serde(default)]
    pub max_total_stake: Balance,
}

impl PoolSpec {
    fn to_params(&self) -> Result<PoolParams, RunnerError> {
        Ok(PoolParams {
            candidate: account(&self.candidate)?,
            policy: account(&self.policy)?,
            max_payout_per_period: self.max_payout_per_period,
            min_stake_required: self.min_stake_required,
            initial_deposit: self.initial_deposit,
            bonus_expert_factor: self.bonus_expert_factor,
            bonus_first_expert_factor: self.bonus_first_expert_factor,
            pay_period_blocks: self.pay_period_blocks,
            min_stake_time_blocks: self.min_stake_time_blocks,
            timeout_blocks: self.timeout_blocks,
            audit_report_url: self.audit_report_url.clone(),
            name: self.name.clone(),
            max_total_stake: self.max_total_stake,
        })
    }
}

// =============================================================================
// REPORTS
// =============================================================================

/// Outcome of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxOutcome {
    Applied { detail: String },
    Failed { kind: ErrorKind, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TxReport {
    pub index: usize,
    pub block: BlockNumber,
    pub caller: String,
    pub op: String,
    pub outcome: TxOutcome,
}

/// Condensed view of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub id: PoolId,
    pub name: String,
    /// Full 0x-prefixed hex, parseable as an account reference
    pub owner: String,
    pub state: PoolState,
    pub state_code: u8,
    pub deposit_remaining: Balance,
    pub total_stake_raw: Balance,
    pub pool_size_bonus_adjusted: Balance,
    pub interest_paid: Balance,
    pub stakers: usize,
    pub min_stake_start_block: Option<BlockNumber>,
    pub last_payout_block: Option<BlockNumber>,
}

impl From<&Pool> for PoolSummary {
    fn from(pool: &Pool) -> Self {
        Self {
            id: pool.id,
            name: pool.name.clone(),
            owner: format!("0x{}", hex::encode(pool.owner.as_bytes())),
            state: pool.state,
            state_code: pool.state.code(),
            deposit_remaining: pool.deposit_remaining,
            total_stake_raw: pool.total_stake_raw,
            pool_size_bonus_adjusted: pool.pool_size_bonus_adjusted,
            interest_paid: pool.interest_paid,
            stakers: pool.stakes.len(),
            min_stake_start_block: pool.min_stake_start_block,
            last_payout_block: pool.last_payout_block,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub final_block: BlockNumber,
    pub applied: usize,
    pub failed: usize,
    pub transactions: Vec<TxReport>,
    pub pools: Vec<PoolSummary>,
    /// Value the protocol believes it holds
    pub custody_tracked: Balance,
    /// Value the ledger reports for the custodian
    pub custody_ledger: Balance,
    pub events: Vec<AssuranceEvent>,
}

// =============================================================================
// REPLAY
// =============================================================================

/// Replay the configured scenario, print the report and persist the state if asked
pub fn run_replay(config: NodeConfig) -> Result<ReplayReport, RunnerError> {
    info!("Replaying {}", config.scenario.display());
    let scenario = load_scenario(&config.scenario)?;

    let mut contract = build_contract(&config.assurance, &scenario.genesis)?;
    let report = replay(&mut contract, &scenario.transactions)?;

    if let Some(path) = &config.snapshot_path {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RunnerError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        Snapshot::new(report.final_block, contract.store().clone()).save(path)?;
    }

    match config.output {
        OutputFormat::Text => print!("{}", render_replay(&report)),
        OutputFormat::Json => println!("{}", to_json(&report)?),
    }
    Ok(report)
}

pub fn load_scenario(path: &Path) -> Result<Scenario, RunnerError> {
    let content = fs::read_to_string(path)
        .map_err(|e| RunnerError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> Result<Scenario, RunnerError> {
    serde_json::from_str(content).map_err(|e| RunnerError::ScenarioParse(e.to_string()))
}

/// Contract with genesis balances, experts and policies installed
pub fn build_contract(config: &AssuranceConfig, genesis: &Genesis) -> Result<ScenarioContract, RunnerError> {
    let mut ledger = InMemoryLedger::new(config.custodian);
    for entry in &genesis.balances {
        let holder = account(&entry.account)?;
        ledger.mint(holder, entry.amount).map_err(RunnerError::Genesis)?;
        if entry.approve {
            ledger.approve(holder, entry.amount);
        }
    }
    if ledger.balance(&config.custodian) != 0 {
        return Err(RunnerError::FundedCustodian);
    }

    let mut registry = WhitelistExpertRegistry::new();
    for expert in &genesis.experts {
        registry.add(account(expert)?);
    }

    let mut book = PolicyBook::new();
    for entry in &genesis.policies {
        let policy = account(&entry.policy)?;
        let behaviour = match entry.behaviour {
            BehaviourSpec::Never => PolicyBehaviour::NeverViolated,
            BehaviourSpec::Always => PolicyBehaviour::AlwaysViolated,
            BehaviourSpec::Unanswerable => PolicyBehaviour::Unanswerable,
            BehaviourSpec::Manual => {
                let flagged = entry.flagged.iter().map(|s| account(s)).collect::<Result<HashSet<_>, _>>()?;
                PolicyBehaviour::Manual(flagged)
            }
        };
        book.register(policy, behaviour);
    }

    info!(
        "Genesis: {} balances, {} experts, {} policies",
        genesis.balances.len(),
        registry.len(),
        genesis.policies.len()
    );
    Ok(AssuranceContract::new(config.clone(), ledger, book, registry))
}

/// Apply every transaction in order; failed transactions are reported, not fatal
pub fn replay(contract: &mut ScenarioContract, transactions: &[ScenarioTx]) -> Result<ReplayReport, RunnerError> {
    let mut reports = Vec::with_capacity(transactions.len());
    let mut last_block: BlockNumber = 0;

    for (index, tx) in transactions.iter().enumerate() {
        if tx.block < last_block {
            return Err(RunnerError::BlockRegression {
                index,
                block: tx.block,
                previous: last_block,
            });
        }
        last_block = tx.block;

        let caller = account(&tx.caller)?;
        let label = tx.op.label();
        let outcome = match execute(contract, caller, tx.block, &tx.op)? {
            Ok(detail) => {
                debug!("#{} @{} {} {}: {}", index, tx.block, tx.caller, label, detail);
                TxOutcome::Applied { detail }
            }
            Err(e) => {
                warn!("#{} @{} {} {} failed: {}", index, tx.block, tx.caller, label, e);
                TxOutcome::Failed {
                    kind: e.kind(),
                    error: e.to_string(),
                }
            }
        };

        reports.push(TxReport {
            index,
            block: tx.block,
            caller: tx.caller.clone(),
            op: label,
            outcome,
        });
    }

    let custody_tracked = contract.balance();
    let custody_ledger = contract.ledger().balance(&contract.config().custodian);
    if custody_tracked != custody_ledger {
        error!("Custody mismatch: tracked {}, ledger {}", custody_tracked, custody_ledger);
        return Err(RunnerError::CustodyMismatch {
            tracked: custody_tracked,
            ledger: custody_ledger,
        });
    }

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, TxOutcome::Failed { .. }))
        .count();
    info!("Replayed {} transactions ({} failed)", reports.len(), failed);

    Ok(ReplayReport {
        final_block: last_block,
        applied: reports.len() - failed,
        failed,
        transactions: reports,
        pools: contract.pools().iter().map(PoolSummary::from).collect(),
        custody_tracked,
        custody_ledger,
        events: contract.drain_events(),
    })
}

/// Run one operation. The outer error aborts the replay, the inner one is a rejected transaction.
fn execute(
    contract: &mut ScenarioContract,
    caller: AccountId,
    block: BlockNumber,
    op: &Operation,
) -> Result<Result<String, AssuranceError>, RunnerError> {
    let result = match op {
        Operation::CreatePool(spec) => {
            let params = spec.to_params()?;
            contract
                .create_pool(caller, params, block)
                .map(|id| format!("pool {}", id))
        }
        Operation::DepositFunds { pool: name, amount } => {
            let id = contract.pool_index(name);
            contract.deposit_funds(caller, id, *amount, block).map(|_| "deposited".to_string())
        }
        Operation::WithdrawDeposit { pool: name } => {
            let id = contract.pool_index(name);
            contract
                .withdraw_deposit(caller, id, block)
                .map(|amount| format!("returned {}", amount))
        }
        Operation::StakeFunds { pool: name, amount } => {
            let id = contract.pool_index(name);
            contract
                .stake_funds(caller, id, *amount, block)
                .map(|outcome| format!("{:?}", outcome))
        }
        Operation::WithdrawStake { pool: name } => {
            let id = contract.pool_index(name);
            contract
                .withdraw_stake(caller, id, block)
                .map(|outcome| format!("{:?}", outcome))
        }
        Operation::WithdrawInterest { pool: name } => {
            let id = contract.pool_index(name);
            contract
                .withdraw_interest(caller, id, block)
                .map(|payout| format!("paid {} over {} periods", payout.total, payout.periods_paid))
        }
        Operation::WithdrawClaim { pool: name } => {
            let id = contract.pool_index(name);
            contract
                .withdraw_claim(caller, id, block)
                .map(|amount| format!("claimed {}", amount))
        }
        Operation::CheckPolicy { pool: name } => {
            let id = contract.pool_index(name);
            contract.check_policy(id, block).map(|state| format!("now {}", state))
        }
        Operation::Approve { amount } => {
            contract.ledger_mut().approve(caller, *amount);
            Ok(format!("allowance {}", amount))
        }
        Operation::FlagViolation { policy, subject } => {
            let (policy, subject) = (account(policy)?, account(subject)?);
            contract.policy_oracle_mut().flag(policy, subject);
            Ok("flagged".to_string())
        }
        Operation::ClearViolation { policy, subject } => {
            let (policy, subject) = (account(policy)?, account(subject)?);
            contract.policy_oracle_mut().clear(&policy, &subject);
            Ok("cleared".to_string())
        }
        Operation::AddExpert { account: reference } => {
            let mut registry = contract.expert_registry().clone();
            registry.add(account(reference)?);
            contract
                .set_expert_registry(caller, registry)
                .map(|_| "registry updated".to_string())
        }
        Operation::RemoveExpert { account: reference } => {
            let mut registry = contract.expert_registry().clone();
            registry.remove(&account(reference)?);
            contract
                .set_expert_registry(caller, registry)
                .map(|_| "registry updated".to_string())
        }
        Operation::SetGlobalMinDeposit { amount } => contract
            .set_global_min_deposit(caller, *amount)
            .map(|_| format!("minimum deposit {}", amount)),
    };
    Ok(result)
}

fn account(reference: &str) -> Result<AccountId, RunnerError> {
    reference.parse().map_err(|source| RunnerError::InvalidAccount {
        reference: reference.to_string(),
        source,
    })
}

// =============================================================================
// INSPECT
// =============================================================================

/// Print the pools stored in a snapshot
pub fn run_inspect(path: &Path, pool: Option<PoolId>, format: OutputFormat) -> Result<Vec<PoolSummary>, RunnerError> {
    let snapshot = Snapshot::load(path)?;
    info!(
        "Snapshot at block {}: {} pools, custody {}",
        snapshot.block,
        snapshot.store.len(),
        snapshot.store.balance()
    );

    let pools: Vec<PoolSummary> = match pool {
        Some(id) => {
            let found = snapshot.store.get(id).ok_or(RunnerError::PoolNotInSnapshot(id))?;
            vec![PoolSummary::from(found)]
        }
        None => snapshot.store.pools().iter().map(PoolSummary::from).collect(),
    };

    match format {
        OutputFormat::Text => {
            println!("Snapshot block: {}", snapshot.block);
            println!("Custody:        {}", snapshot.store.balance());
            print!("{}", render_pools(&pools));
        }
        OutputFormat::Json => println!("{}", to_json(&pools)?),
    }
    Ok(pools)
}

// =============================================================================
// RENDERING
// =============================================================================

pub fn render_replay(report: &ReplayReport) -> String {
    let mut out = String::new();
    for tx in &report.transactions {
        let status = match &tx.outcome {
            TxOutcome::Applied { detail } => format!("ok: {}", detail),
            TxOutcome::Failed { kind, error } => format!("FAILED ({:?}): {}", kind, error),
        };
        let _ = writeln!(out, "#{:<3} @{:<6} {:<12} {} -> {}", tx.index, tx.block, tx.caller, tx.op, status);
    }
    let _ = writeln!(
        out,
        "\n{} applied, {} failed, final block {}, custody {}",
        report.applied, report.failed, report.final_block, report.custody_tracked
    );
    out.push_str(&render_pools(&report.pools));
    out
}

pub fn render_pools(pools: &[PoolSummary]) -> String {
    let mut out = String::new();
    for p in pools {
        let _ = writeln!(out, "\nPool {} '{}' ({})", p.id, p.name, p.state);
        let _ = writeln!(out, "  owner:        {}", p.owner);
        let _ = writeln!(out, "  deposit:      {}", p.deposit_remaining);
        let _ = writeln!(out, "  stake:        {} ({} stakers)", p.total_stake_raw, p.stakers);
        let _ = writeln!(out, "  pool size:    {}", p.pool_size_bonus_adjusted);
        let _ = writeln!(out, "  interest paid {}", p.interest_paid);
    }
    out
}

fn to_json<T: Serialize>(value: &T) -> Result<String, RunnerError> {
    serde_json::to_string_pretty(value).map_err(|e| RunnerError::Json(e.to_string()))
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid scenario: {0}")]
    ScenarioParse(String),

    #[error("Invalid account reference '{reference}': {source}")]
    InvalidAccount { reference: String, source: AccountError },

    #[error("Transaction #{index} at block {block} precedes block {previous}")]
    BlockRegression {
        index: usize,
        block: BlockNumber,
        previous: BlockNumber,
    },

    #[error("Genesis failed: {0}")]
    Genesis(LedgerError),

    #[error("Genesis must not fund the custodian")]
    FundedCustodian,

    #[error("Custody mismatch: tracked {tracked}, ledger {ledger}")]
    CustodyMismatch { tracked: Balance, ledger: Balance },

    #[error("Pool {0} not in snapshot")]
    PoolNotInSnapshot(PoolId),

    #[error("JSON encoding failed: {0}")]
    Json(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "genesis": {
            "balances": [
                { "account": "owner", "amount": 1000 },
                { "account": "staker", "amount": 1000 }
            ],
            "policies": [{ "policy": "zero-balance", "behaviour": "manual" }]
        },
        "transactions": [
            { "block": 1, "caller": "owner", "op": { "create_pool": {
                "name": "vault", "candidate": "vault-contract", "policy": "zero-balance",
                "max_payout_per_period": 10, "min_stake_required": 1, "initial_deposit": 100,
                "bonus_expert_factor": 3, "bonus_first_expert_factor": 5,
                "pay_period_blocks": 5, "min_stake_time_blocks": 10, "timeout_blocks": 5
            } } },
            { "block": 2, "caller": "staker", "op": { "stake_funds": { "pool": "vault", "amount": 1 } } },
            { "block": 3, "caller": "staker", "op": { "stake_funds": { "pool": "missing", "amount": 1 } } },
            { "block": 4, "caller": "anyone", "op": { "flag_violation": { "policy": "zero-balance", "subject": "vault-contract" } } },
            { "block": 4, "caller": "anyone", "op": { "check_policy": { "pool": "vault" } } },
            { "block": 5, "caller": "owner", "op": { "withdraw_claim": { "pool": "vault" } } }
        ]
    }"#;

    #[test]
    fn test_replay_claim_scenario() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions).unwrap();

        assert_eq!(report.transactions.len(), 6);
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.transactions[2].outcome,
            TxOutcome::Failed {
                kind: ErrorKind::PreconditionViolation,
                ..
            }
        ));
        assert_eq!(report.pools[0].state, PoolState::ViolatedFunded);
        assert_eq!(report.pools[0].deposit_remaining, 0);
        assert_eq!(report.custody_tracked, 0);
        assert_eq!(contract.ledger().balance(&AccountId::from_label("owner")), 1001);
        assert!(!report.events.is_empty());
    }

    #[test]
    fn test_pool_summary_owner_parses_back() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions).unwrap();

        let summary = &report.pools[0];
        let owner: AccountId = summary.owner.parse().unwrap();
        assert_eq!(owner, AccountId::from_label("owner"));
        assert_eq!(summary.owner.len(), 66);
        assert_eq!(summary.state_code, PoolState::ViolatedFunded.code());
        assert_eq!(summary.state_code, 5);
    }

    #[test]
    fn test_block_regression_aborts() {
        let scenario = parse_scenario(
            r#"{ "transactions": [
                { "block": 5, "caller": "a", "op": { "approve": { "amount": 1 } } },
                { "block": 4, "caller": "a", "op": { "approve": { "amount": 1 } } }
            ] }"#,
        )
        .unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        assert!(matches!(
            replay(&mut contract, &scenario.transactions),
            Err(RunnerError::BlockRegression { index: 1, block: 4, previous: 5 })
        ));
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let result = parse_scenario(
            r#"{ "transactions": [ { "block": 1, "caller": "a", "op": { "mint": { "amount": 1 } } } ] }"#,
        );
        assert!(matches!(result, Err(RunnerError::ScenarioParse(_))));
    }

    #[test]
    fn test_add_expert_requires_protocol_owner() {
        let scenario = parse_scenario(
            r#"{ "transactions": [
                { "block": 1, "caller": "mallory", "op": { "add_expert": { "account": "mallory" } } },
                { "block": 1, "caller": "assurance/owner", "op": { "add_expert": { "account": "carol" } } }
            ] }"#,
        )
        .unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions).unwrap();

        assert!(matches!(
            report.transactions[0].outcome,
            TxOutcome::Failed {
                kind: ErrorKind::AuthorizationError,
                ..
            }
        ));
        assert_eq!(report.applied, 1);
        assert!(contract.is_expert(&AccountId::from_label("carol")).unwrap());
        assert!(!contract.is_expert(&AccountId::from_label("mallory")).unwrap());
    }

    #[test]
    fn test_render_replay_lists_failures() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions).unwrap();
        let text = render_replay(&report);
        assert!(text.contains("FAILED (PreconditionViolation)"));
        assert!(text.contains("Pool 0 'vault' (ViolatedFunded)"));
    }

    #[test]
    fn test_inspect_snapshot() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pools.bin");

        let scenario = parse_scenario(SCENARIO).unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions[..2]).unwrap();
        Snapshot::new(report.final_block, contract.store().clone()).save(&path).unwrap();

        let pools = run_inspect(&path, Some(0), OutputFormat::Json).unwrap();
        assert_eq!(pools[0].state, PoolState::NotViolatedFunded);
        assert_eq!(pools[0].total_stake_raw, 1);
        assert!(matches!(
            run_inspect(&path, Some(9), OutputFormat::Text),
            Err(RunnerError::PoolNotInSnapshot(9))
        ));
    }

    #[test]
    fn test_replay_interest_demo() {
        let scenario = parse_scenario(include_str!("../../demos/interest.json")).unwrap();
        let mut contract = build_contract(&AssuranceConfig::default(), &scenario.genesis).unwrap();
        let report = replay(&mut contract, &scenario.transactions).unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(report.pools[0].state, PoolState::PolicyExpired);
        assert_eq!(report.custody_tracked, 0);

        // carol is the first expert: 50 * 1.05 * (1 + 0.03^2) = 52
        let balance = |label: &str| contract.ledger().balance(&AccountId::from_label(label));
        assert_eq!(balance("alice"), 1004);
        assert_eq!(balance("carol"), 1005);
        assert_eq!(balance("owner"), 991);
    }
}
