// Assurance - Collateralized security-policy insurance pools
// Principle: Checks, effects, interactions; a failed interaction rolls the effects back
//
// Operation shape:
//   1. load a copy of the pool and re-derive its state (oracle queried only while it matters)
//   2. validate the operation against the re-derived state
//   3. commit the updated copy with its balance delta (invariants re-checked by the store)
//   4. move value through the ledger, reverting the commit if the ledger refuses
//   5. record events

use super::bonus::{self, BonusError, BonusFactors, StakeKind};
use super::collaborators::{
    ExpertRegistry, Ledger, LedgerError, OracleError, PolicyOracle, RegistryError,
};
use super::lifecycle::{self, Transition};
use super::payout::{self, PayoutError};
use crate::storage::{PoolStore, PoolUndo, StoreError};
use crate::types::{
    AccountId, Balance, BlockNumber, Pool, PoolError, PoolId, PoolParams, PoolState,
    DEFAULT_MIN_DEPOSIT, POOL_NOT_FOUND,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Protocol-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssuranceConfig {
    /// Account allowed to administer the protocol
    pub owner: AccountId,
    /// Ledger account holding every deposit and stake
    pub custodian: AccountId,
    /// Smallest initial deposit accepted by `create_pool`
    pub global_min_deposit: Balance,
}

impl Default for AssuranceConfig {
    fn default() -> Self {
        Self {
            owner: AccountId::from_label("assurance/owner"),
            custodian: AccountId::from_label("assurance/custody"),
            global_min_deposit: DEFAULT_MIN_DEPOSIT,
        }
    }
}

// =============================================================================
// EVENTS & OUTCOMES
// =============================================================================

/// Events emitted by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssuranceEvent {
    PoolCreated {
        pool: PoolId,
        owner: AccountId,
        name: String,
        deposit: Balance,
        block: BlockNumber,
    },
    DepositAdded {
        pool: PoolId,
        from: AccountId,
        amount: Balance,
        block: BlockNumber,
    },
    DepositWithdrawn {
        pool: PoolId,
        owner: AccountId,
        amount: Balance,
        block: BlockNumber,
    },
    StakePlaced {
        pool: PoolId,
        staker: AccountId,
        amount: Balance,
        contribution: Balance,
        block: BlockNumber,
    },
    StakeWithdrawn {
        pool: PoolId,
        staker: AccountId,
        amount: Balance,
        block: BlockNumber,
    },
    /// Withdrawal refused because the stake backs the owner's claim
    StakeForfeited {
        pool: PoolId,
        staker: AccountId,
        block: BlockNumber,
    },
    InterestPaid {
        pool: PoolId,
        staker: AccountId,
        amount: Balance,
        block: BlockNumber,
    },
    ClaimPaid {
        pool: PoolId,
        owner: AccountId,
        amount: Balance,
        block: BlockNumber,
    },
    StateChanged {
        pool: PoolId,
        from: PoolState,
        to: PoolState,
        block: BlockNumber,
    },
    ExpertRegistryReplaced {
        by: AccountId,
    },
    GlobalMinDepositChanged {
        amount: Balance,
    },
}

/// Result of `stake_funds`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeOutcome {
    /// Stake recorded; `amount` may be capped below the requested amount
    Staked { amount: Balance, contribution: Balance },
    /// Pool timed out before activation; nothing was pulled
    PoolCancelled,
}

/// Result of `withdraw_stake`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawOutcome {
    Returned(Balance),
    /// Pool is violated while funded, the stake stays as collateral
    Forfeited,
}

/// Result of `withdraw_interest`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestPayout {
    pub periods_paid: u64,
    pub total: Balance,
    pub transfers: Vec<(AccountId, Balance)>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failure categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    PreconditionViolation,
    AuthorizationError,
    StateMismatch,
    OracleFailure,
    TransferFailure,
    InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssuranceError {
    #[error("Pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("Pool name is empty")]
    EmptyPoolName,

    #[error("Pool name '{0}' already registered")]
    DuplicatePoolName(String),

    #[error("Parameter {0} must be positive")]
    ZeroParameter(&'static str),

    #[error("Deposit {deposit} is below the minimum {minimum}")]
    DepositBelowMinimum { deposit: Balance, minimum: Balance },

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Pool {pool} is in state {state}")]
    InvalidState { pool: PoolId, state: PoolState },

    #[error("Policy of pool {0} is violated")]
    PolicyViolated(PoolId),

    #[error("Policy of pool {0} is not violated")]
    PolicyNotViolated(PoolId),

    #[error("Pool {0} reached its maximum total stake")]
    StakeLimitReached(PoolId),

    #[error("Caller has no stake in pool {0}")]
    NotAStaker(PoolId),

    #[error("Minimum staking time runs until block {until}")]
    MinStakeTimeNotElapsed { until: BlockNumber },

    #[error("Nothing to claim")]
    NothingToClaim,

    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    #[error("Caller is not the pool owner")]
    NotPoolOwner,

    #[error("Caller is not the protocol owner")]
    NotProtocolOwner,

    #[error("Policy oracle failed: {0}")]
    PolicyOracle(#[from] OracleError),

    #[error("Expert registry failed: {0}")]
    ExpertRegistry(#[from] RegistryError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] LedgerError),

    #[error("Bonus computation failed: {0}")]
    Bonus(#[from] BonusError),

    #[error("Interest payout failed: {0}")]
    Payout(#[from] PayoutError),

    #[error("Pool accounting failed: {0}")]
    Pool(#[from] PoolError),

    #[error("Store rejected update: {0}")]
    Store(#[from] StoreError),
}

impl AssuranceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PoolNotFound(_)
            | Self::EmptyPoolName
            | Self::DuplicatePoolName(_)
            | Self::ZeroParameter(_)
            | Self::DepositBelowMinimum { .. }
            | Self::ZeroAmount
            | Self::StakeLimitReached(_)
            | Self::NotAStaker(_)
            | Self::MinStakeTimeNotElapsed { .. }
            | Self::NothingToClaim
            | Self::NothingToWithdraw => ErrorKind::PreconditionViolation,

            Self::NotPoolOwner | Self::NotProtocolOwner => ErrorKind::AuthorizationError,

            Self::InvalidState { .. } | Self::PolicyViolated(_) | Self::PolicyNotViolated(_) => {
                ErrorKind::StateMismatch
            }

            Self::PolicyOracle(_) | Self::ExpertRegistry(_) => ErrorKind::OracleFailure,

            Self::Transfer(_) => ErrorKind::TransferFailure,

            Self::Payout(
                PayoutError::NoPeriodElapsed { .. }
                | PayoutError::NoStakers
                | PayoutError::DepositExhausted
                | PayoutError::NothingToPay,
            ) => ErrorKind::PreconditionViolation,

            Self::Payout(_) | Self::Bonus(_) | Self::Pool(_) | Self::Store(_) => {
                ErrorKind::InvariantViolation
            }
        }
    }
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Assurance protocol over injected collaborators
///
/// Single writer: every operation takes `&mut self` and the current block.
pub struct AssuranceContract<L: Ledger, P: PolicyOracle, R: ExpertRegistry> {
    config: AssuranceConfig,
    store: PoolStore,
    ledger: L,
    policy_oracle: P,
    expert_registry: R,
    events: Vec<AssuranceEvent>,
}

impl<L: Ledger, P: PolicyOracle, R: ExpertRegistry> AssuranceContract<L, P, R> {
    pub fn new(config: AssuranceConfig, ledger: L, policy_oracle: P, expert_registry: R) -> Self {
        Self::with_store(config, PoolStore::new(), ledger, policy_oracle, expert_registry)
    }

    /// Resume from a previously persisted pool store
    pub fn with_store(
        config: AssuranceConfig,
        store: PoolStore,
        ledger: L,
        policy_oracle: P,
        expert_registry: R,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            policy_oracle,
            expert_registry,
            events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Pool store
    // -------------------------------------------------------------------------

    /// Open a new pool backed by `params.initial_deposit` pulled from `caller`
    pub fn create_pool(
        &mut self,
        caller: AccountId,
        params: PoolParams,
        block: BlockNumber,
    ) -> Result<PoolId, AssuranceError> {
        if params.name.is_empty() {
            return Err(AssuranceError::EmptyPoolName);
        }
        if self.store.contains_name(&params.name) {
            return Err(AssuranceError::DuplicatePoolName(params.name));
        }
        if let Some(field) = params.first_zero_field() {
            return Err(AssuranceError::ZeroParameter(field));
        }
        if params.initial_deposit < self.config.global_min_deposit {
            return Err(AssuranceError::DepositBelowMinimum {
                deposit: params.initial_deposit,
                minimum: self.config.global_min_deposit,
            });
        }

        // The policy must be able to judge the candidate, the answer itself is irrelevant here
        let violated = self.policy_oracle.is_violated(&params.policy, &params.candidate)?;
        debug!("Policy {} answers {} for candidate {}", params.policy, violated, params.candidate);

        let id = self.store.next_id();
        let deposit = params.initial_deposit;
        let pool = Pool::new(id, caller, params, block);
        let name = pool.name.clone();

        let undo = self.store.insert(pool)?;
        let result = self.ledger.transfer_from(&caller, deposit);
        self.settle(undo, result)?;

        info!("Pool {} '{}' created by {} with deposit {}", id, name, caller, deposit);
        self.events.push(AssuranceEvent::PoolCreated {
            pool: id,
            owner: caller,
            name,
            deposit,
            block,
        });
        Ok(id)
    }

    /// Top up a pool's deposit (anyone may fund a pool)
    pub fn deposit_funds(
        &mut self,
        caller: AccountId,
        id: PoolId,
        amount: Balance,
        block: BlockNumber,
    ) -> Result<(), AssuranceError> {
        let (mut pool, mut transitions) = self.refreshed(id, block)?;
        if amount == 0 {
            return Err(AssuranceError::ZeroAmount);
        }
        if !matches!(pool.state, PoolState::Initialized) && !pool.state.is_active() {
            return Err(invalid_state(&pool));
        }

        pool.deposit_remaining = pool
            .deposit_remaining
            .checked_add(amount)
            .ok_or(PoolError::AccountingOverflow)?;
        transitions.extend(lifecycle::recompute_funding(&mut pool, block)?);

        let undo = self.store.commit(pool, amount, 0)?;
        let result = self.ledger.transfer_from(&caller, amount);
        self.settle(undo, result)?;

        info!("Pool {}: {} deposited {}", id, caller, amount);
        self.record_transitions(id, &transitions);
        self.events.push(AssuranceEvent::DepositAdded {
            pool: id,
            from: caller,
            amount,
            block,
        });
        Ok(())
    }

    /// Return the remaining deposit to the owner
    ///
    /// Allowed before activation, while underfunded, and once the pool is over.
    /// Withdrawing from a pool that could still activate or pay cancels it.
    pub fn withdraw_deposit(
        &mut self,
        caller: AccountId,
        id: PoolId,
        block: BlockNumber,
    ) -> Result<Balance, AssuranceError> {
        let (mut pool, mut transitions) = self.refreshed(id, block)?;
        if caller != pool.owner {
            return Err(AssuranceError::NotPoolOwner);
        }

        let cancels = match pool.state {
            PoolState::Initialized | PoolState::NotViolatedUnderfunded => true,
            PoolState::Cancelled | PoolState::PolicyExpired => false,
            _ => return Err(invalid_state(&pool)),
        };

        let amount = pool.deposit_remaining;
        if amount == 0 {
            return Err(AssuranceError::NothingToWithdraw);
        }
        pool.deposit_remaining = 0;
        if cancels {
            transitions.extend(lifecycle::transition(&mut pool, PoolState::Cancelled, block)?);
        }

        let undo = self.store.commit(pool, 0, amount)?;
        let result = self.ledger.transfer(&caller, amount);
        self.settle(undo, result)?;

        info!("Pool {}: owner withdrew deposit {}", id, amount);
        self.record_transitions(id, &transitions);
        self.events.push(AssuranceEvent::DepositWithdrawn {
            pool: id,
            owner: caller,
            amount,
            block,
        });
        Ok(amount)
    }

    // -------------------------------------------------------------------------
    // Staking
    // -------------------------------------------------------------------------

    /// Stake `amount` into a pool, capped by the pool's maximum total stake
    pub fn stake_funds(
        &mut self,
        caller: AccountId,
        id: PoolId,
        amount: Balance,
        block: BlockNumber,
    ) -> Result<StakeOutcome, AssuranceError> {
        let mut pool = self.load(id)?;
        if amount == 0 {
            return Err(AssuranceError::ZeroAmount);
        }

        // Timed out before activation: the pool is cancelled and the stake refused
        if pool.state == PoolState::Initialized && lifecycle::timed_out(&pool, block) {
            let transitions: Vec<Transition> =
                lifecycle::transition(&mut pool, PoolState::Cancelled, block)?.into_iter().collect();
            self.store.commit(pool, 0, 0)?;
            warn!("Pool {} timed out at block {}, stake of {} refused", id, block, caller);
            self.record_transitions(id, &transitions);
            return Ok(StakeOutcome::PoolCancelled);
        }

        if !pool.state.watches_policy() {
            return Err(invalid_state(&pool));
        }
        if self.query_violation(&pool)? {
            return Err(AssuranceError::PolicyViolated(id));
        }

        let amount = match pool.stake_capacity() {
            Some(0) => return Err(AssuranceError::StakeLimitReached(id)),
            Some(capacity) => amount.min(capacity),
            None => amount,
        };

        let expert = self.expert_registry.is_expert(&caller)?;
        let kind = match (expert, pool.first_expert_staker.is_none()) {
            (true, true) => StakeKind::FirstExpert,
            (true, false) => StakeKind::Expert,
            (false, _) => StakeKind::Regular,
        };
        let order = pool.stake_count.checked_add(1).ok_or(PoolError::AccountingOverflow)?;
        let factors = BonusFactors {
            expert: pool.bonus_expert_factor,
            first_expert: pool.bonus_first_expert_factor,
        };
        let contribution = bonus::contribution(amount, order, kind, factors)?;
        debug!(
            "Pool {}: stake #{} of {} by {} ({:?}) contributes {}",
            id, order, amount, caller, kind, contribution
        );

        pool.add_stake(caller, amount, contribution, expert, block)?;
        let transitions: Vec<Transition> = lifecycle::refresh(&mut pool, block, false)?.into_iter().collect();

        let undo = self.store.commit(pool, amount, 0)?;
        let result = self.ledger.transfer_from(&caller, amount);
        self.settle(undo, result)?;

        info!("Pool {}: {} staked {}", id, caller, amount);
        self.events.push(AssuranceEvent::StakePlaced {
            pool: id,
            staker: caller,
            amount,
            contribution,
            block,
        });
        self.record_transitions(id, &transitions);
        Ok(StakeOutcome::Staked { amount, contribution })
    }

    /// Withdraw the caller's whole stake
    pub fn withdraw_stake(
        &mut self,
        caller: AccountId,
        id: PoolId,
        block: BlockNumber,
    ) -> Result<WithdrawOutcome, AssuranceError> {
        if !self.load(id)?.is_staker(&caller) {
            return Err(AssuranceError::NotAStaker(id));
        }
        let (mut pool, mut transitions) = self.refreshed(id, block)?;

        match pool.state {
            PoolState::ViolatedFunded => {
                if !transitions.is_empty() {
                    self.store.commit(pool, 0, 0)?;
                    self.record_transitions(id, &transitions);
                }
                warn!("Pool {}: stake of {} is collateral for the owner's claim", id, caller);
                self.events.push(AssuranceEvent::StakeForfeited {
                    pool: id,
                    staker: caller,
                    block,
                });
                return Ok(WithdrawOutcome::Forfeited);
            }
            PoolState::NotViolatedFunded => {
                if !lifecycle::min_stake_time_elapsed(&pool, block) {
                    let until = pool
                        .min_stake_start_block
                        .unwrap_or(block)
                        .saturating_add(pool.min_stake_time_blocks);
                    return Err(AssuranceError::MinStakeTimeNotElapsed { until });
                }
                transitions.extend(lifecycle::transition(&mut pool, PoolState::PolicyExpired, block)?);
            }
            _ => {}
        }

        let stake = pool.remove_stake(&caller)?;
        let amount = stake.principal;

        let empties = matches!(
            pool.state,
            PoolState::Initialized | PoolState::NotViolatedUnderfunded | PoolState::ViolatedUnderfunded
        );
        if empties && pool.total_stake_raw == 0 {
            transitions.extend(lifecycle::transition(&mut pool, PoolState::Cancelled, block)?);
        }

        let undo = self.store.commit(pool, 0, amount)?;
        let result = self.ledger.transfer(&caller, amount);
        self.settle(undo, result)?;

        info!("Pool {}: {} withdrew stake {}", id, caller, amount);
        self.record_transitions(id, &transitions);
        self.events.push(AssuranceEvent::StakeWithdrawn {
            pool: id,
            staker: caller,
            amount,
            block,
        });
        Ok(WithdrawOutcome::Returned(amount))
    }

    // -------------------------------------------------------------------------
    // Payouts
    // -------------------------------------------------------------------------

    /// Pay every staker the interest accrued since the last checkpoint
    pub fn withdraw_interest(
        &mut self,
        caller: AccountId,
        id: PoolId,
        block: BlockNumber,
    ) -> Result<InterestPayout, AssuranceError> {
        if !self.load(id)?.is_staker(&caller) {
            return Err(AssuranceError::NotAStaker(id));
        }
        let (mut pool, mut transitions) = self.refreshed(id, block)?;
        if !pool.state.is_active() {
            return Err(invalid_state(&pool));
        }

        let plan = payout::plan(&pool, block)?;
        payout::apply(&mut pool, &plan)?;
        transitions.extend(lifecycle::recompute_funding(&mut pool, block)?);

        let transfers: Vec<(AccountId, Balance)> = payout::transfers(&plan).into_iter().collect();
        let undo = self.store.commit(pool, 0, plan.total)?;
        let result = self.ledger.transfer_batch(&transfers);
        self.settle(undo, result)?;

        info!(
            "Pool {}: paid {} over {} periods to {} stakers",
            id,
            plan.total,
            plan.periods_paid,
            transfers.len()
        );
        for (staker, amount) in &transfers {
            self.events.push(AssuranceEvent::InterestPaid {
                pool: id,
                staker: *staker,
                amount: *amount,
                block,
            });
        }
        self.record_transitions(id, &transitions);
        Ok(InterestPayout {
            periods_paid: plan.periods_paid,
            total: plan.total,
            transfers,
        })
    }

    /// Owner collects deposit and stakes of a pool violated while funded
    pub fn withdraw_claim(
        &mut self,
        caller: AccountId,
        id: PoolId,
        block: BlockNumber,
    ) -> Result<Balance, AssuranceError> {
        let (mut pool, transitions) = self.refreshed(id, block)?;
        if caller != pool.owner {
            return Err(AssuranceError::NotPoolOwner);
        }
        if pool.state != PoolState::ViolatedFunded {
            return Err(invalid_state(&pool));
        }

        let amount = pool.custodied();
        if amount == 0 {
            return Err(AssuranceError::NothingToClaim);
        }
        pool.deposit_remaining = 0;
        pool.clear_stakes();

        let undo = self.store.commit(pool, 0, amount)?;
        let result = self.ledger.transfer(&caller, amount);
        self.settle(undo, result)?;

        info!("Pool {}: owner {} claimed {}", id, caller, amount);
        self.record_transitions(id, &transitions);
        self.events.push(AssuranceEvent::ClaimPaid {
            pool: id,
            owner: caller,
            amount,
            block,
        });
        Ok(amount)
    }

    // -------------------------------------------------------------------------
    // Policy
    // -------------------------------------------------------------------------

    /// Record a policy violation (permissionless)
    pub fn check_policy(&mut self, id: PoolId, block: BlockNumber) -> Result<PoolState, AssuranceError> {
        let mut pool = self.load(id)?;
        if !pool.state.watches_policy() {
            return Err(invalid_state(&pool));
        }
        if !self.query_violation(&pool)? {
            return Err(AssuranceError::PolicyNotViolated(id));
        }

        let transitions: Vec<Transition> = lifecycle::refresh(&mut pool, block, true)?.into_iter().collect();
        let state = pool.state;
        self.store.commit(pool, 0, 0)?;

        warn!("Pool {}: policy violation recorded, now {}", id, state);
        self.record_transitions(id, &transitions);
        Ok(state)
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    pub fn set_expert_registry(&mut self, caller: AccountId, registry: R) -> Result<(), AssuranceError> {
        self.ensure_protocol_owner(&caller)?;
        self.expert_registry = registry;
        info!("Expert registry replaced by {}", caller);
        self.events.push(AssuranceEvent::ExpertRegistryReplaced { by: caller });
        Ok(())
    }

    pub fn set_global_min_deposit(&mut self, caller: AccountId, amount: Balance) -> Result<(), AssuranceError> {
        self.ensure_protocol_owner(&caller)?;
        self.config.global_min_deposit = amount;
        info!("Global minimum deposit set to {}", amount);
        self.events.push(AssuranceEvent::GlobalMinDepositChanged { amount });
        Ok(())
    }

    pub fn is_expert(&self, account: &AccountId) -> Result<bool, AssuranceError> {
        Ok(self.expert_registry.is_expert(account)?)
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.store.get(id)
    }

    pub fn pools(&self) -> &[Pool] {
        self.store.pools()
    }

    /// Index of the pool called `name`, `POOL_NOT_FOUND` if none
    pub fn pool_index(&self, name: &str) -> PoolId {
        self.store.index_of(name).unwrap_or(POOL_NOT_FOUND)
    }

    pub fn pool_count(&self) -> usize {
        self.store.len()
    }

    /// Value held in custody across all pools
    pub fn balance(&self) -> Balance {
        self.store.balance()
    }

    /// False for unknown pools
    pub fn is_staker(&self, id: PoolId, account: &AccountId) -> bool {
        self.store.get(id).map_or(false, |p| p.is_staker(account))
    }

    pub fn stakers(&self, id: PoolId) -> Vec<AccountId> {
        self.store
            .get(id)
            .map(|p| p.stakes.iter().map(|s| s.staker).collect())
            .unwrap_or_default()
    }

    pub fn global_min_deposit(&self) -> Balance {
        self.config.global_min_deposit
    }

    pub fn owner(&self) -> AccountId {
        self.config.owner
    }

    pub fn config(&self) -> &AssuranceConfig {
        &self.config
    }

    pub fn store(&self) -> &PoolStore {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn policy_oracle(&self) -> &P {
        &self.policy_oracle
    }

    pub fn policy_oracle_mut(&mut self) -> &mut P {
        &mut self.policy_oracle
    }

    pub fn expert_registry(&self) -> &R {
        &self.expert_registry
    }

    pub fn events(&self) -> &[AssuranceEvent] {
        &self.events
    }

    /// Take all recorded events
    pub fn drain_events(&mut self) -> Vec<AssuranceEvent> {
        std::mem::take(&mut self.events)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn load(&self, id: PoolId) -> Result<Pool, AssuranceError> {
        self.store.get(id).cloned().ok_or(AssuranceError::PoolNotFound(id))
    }

    /// Oracle answer for a pool whose state still depends on it
    fn query_violation(&self, pool: &Pool) -> Result<bool, AssuranceError> {
        if !pool.state.watches_policy() {
            return Ok(false);
        }
        Ok(self.policy_oracle.is_violated(&pool.policy, &pool.candidate)?)
    }

    /// Copy of the pool with its state re-derived at `block`
    fn refreshed(&self, id: PoolId, block: BlockNumber) -> Result<(Pool, Vec<Transition>), AssuranceError> {
        let mut pool = self.load(id)?;
        let violated = self.query_violation(&pool)?;
        let transitions = lifecycle::refresh(&mut pool, block, violated)?.into_iter().collect();
        Ok((pool, transitions))
    }

    /// Keep the commit if the ledger accepted the interaction, roll it back otherwise
    fn settle(&mut self, undo: PoolUndo, result: Result<(), LedgerError>) -> Result<(), AssuranceError> {
        if let Err(e) = result {
            warn!("Ledger refused transfer, reverting: {}", e);
            self.store.revert(undo);
            return Err(e.into());
        }
        Ok(())
    }

    fn record_transitions(&mut self, id: PoolId, transitions: &[Transition]) {
        for t in transitions {
            self.events.push(AssuranceEvent::StateChanged {
                pool: id,
                from: t.from,
                to: t.to,
                block: t.block,
            });
        }
    }

    fn ensure_protocol_owner(&self, caller: &AccountId) -> Result<(), AssuranceError> {
        if caller != &self.config.owner {
            return Err(AssuranceError::NotProtocolOwner);
        }
        Ok(())
    }
}

fn invalid_state(pool: &Pool) -> AssuranceError {
    AssuranceError::InvalidState {
        pool: pool.id,
        state: pool.state,
    }
}
