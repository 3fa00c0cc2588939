// Pool - Collateral arrangement between a pool owner and its stakers
// Principle: Every field that moves value is an unsigned integer, every state is explicit

use super::account::AccountId;
use super::primitives::{Balance, BlockNumber, PoolId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolState {
    /// Created, waiting for enough stake
    Initialized,
    /// Active, deposit does not cover one payout period
    NotViolatedUnderfunded,
    /// Policy violated while underfunded; nothing is guaranteed to the owner
    ViolatedUnderfunded,
    /// Active and able to pay a full period
    NotViolatedFunded,
    /// Policy violated while funded; collateral belongs to the owner
    ViolatedFunded,
    /// Terminal: timed out, emptied or violated before activation
    Cancelled,
    /// Terminal: minimum staking time passed without a violation
    PolicyExpired,
}

impl PoolState {
    /// Numeric code, stable across versions (0 is reserved for "no pool")
    pub fn code(&self) -> u8 {
        match self {
            PoolState::Initialized => 1,
            PoolState::NotViolatedUnderfunded => 2,
            PoolState::ViolatedUnderfunded => 3,
            PoolState::NotViolatedFunded => 4,
            PoolState::ViolatedFunded => 5,
            PoolState::Cancelled => 6,
            PoolState::PolicyExpired => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PoolState::Cancelled | PoolState::PolicyExpired)
    }

    pub fn is_violated(&self) -> bool {
        matches!(self, PoolState::ViolatedFunded | PoolState::ViolatedUnderfunded)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PoolState::NotViolatedFunded | PoolState::NotViolatedUnderfunded)
    }

    /// States whose transitions depend on the policy oracle
    pub fn watches_policy(&self) -> bool {
        matches!(self, PoolState::Initialized) || self.is_active()
    }

    pub fn not_violated(funded: bool) -> Self {
        if funded {
            PoolState::NotViolatedFunded
        } else {
            PoolState::NotViolatedUnderfunded
        }
    }

    pub fn violated(funded: bool) -> Self {
        if funded {
            PoolState::ViolatedFunded
        } else {
            PoolState::ViolatedUnderfunded
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Construction parameters of a pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    /// Monitored contract
    pub candidate: AccountId,
    /// Policy instance judging the candidate
    pub policy: AccountId,
    pub max_payout_per_period: Balance,
    pub min_stake_required: Balance,
    pub initial_deposit: Balance,
    /// Percentage-scaled (denominator 100)
    pub bonus_expert_factor: u64,
    /// Percentage-scaled (denominator 100)
    pub bonus_first_expert_factor: u64,
    pub pay_period_blocks: BlockNumber,
    pub min_stake_time_blocks: BlockNumber,
    pub timeout_blocks: BlockNumber,
    pub audit_report_url: String,
    pub name: String,
    /// 0 means unbounded
    #[serde(default)]
    pub max_total_stake: Balance,
}

impl PoolParams {
    /// First construction parameter that must be positive but is zero
    pub fn first_zero_field(&self) -> Option<&'static str> {
        if self.max_payout_per_period == 0 {
            return Some("max_payout_per_period");
        }
        if self.min_stake_required == 0 {
            return Some("min_stake_required");
        }
        if self.initial_deposit == 0 {
            return Some("initial_deposit");
        }
        if self.pay_period_blocks == 0 {
            return Some("pay_period_blocks");
        }
        if self.min_stake_time_blocks == 0 {
            return Some("min_stake_time_blocks");
        }
        if self.timeout_blocks == 0 {
            return Some("timeout_blocks");
        }
        None
    }
}

/// A staker's position in one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub staker: AccountId,
    /// Raw amount pulled from the staker
    pub principal: Balance,
    /// Bonus-adjusted amount, fixed at placement time
    pub contribution: Balance,
    /// Registry answer at the first placement
    pub expert_at_stake: bool,
    /// 1-based placement order of the first placement
    pub order: u64,
    pub staked_at: BlockNumber,
}

/// Pool record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub name: String,
    pub owner: AccountId,
    pub candidate: AccountId,
    pub policy: AccountId,
    pub audit_report_url: String,

    // Economic parameters (immutable after creation)
    pub max_payout_per_period: Balance,
    pub min_stake_required: Balance,
    pub max_total_stake: Balance,
    pub bonus_expert_factor: u64,
    pub bonus_first_expert_factor: u64,
    pub pay_period_blocks: BlockNumber,
    pub min_stake_time_blocks: BlockNumber,
    pub timeout_blocks: BlockNumber,

    // Accounting
    pub deposit_remaining: Balance,
    pub total_stake_raw: Balance,
    pub pool_size_bonus_adjusted: Balance,
    pub interest_paid: Balance,

    // Lifecycle
    pub state: PoolState,
    pub state_entered_at: BlockNumber,
    /// First block observed in NotViolatedFunded, never reset
    pub min_stake_start_block: Option<BlockNumber>,
    /// Interest checkpoint, set when the pool leaves Initialized
    pub last_payout_block: Option<BlockNumber>,

    // Stakes
    /// Placements ever made (bonus exponent source)
    pub stake_count: u64,
    pub first_expert_staker: Option<AccountId>,
    pub stakes: Vec<Stake>,
}

impl Pool {
    /// Build a freshly created pool from validated parameters
    pub fn new(id: PoolId, owner: AccountId, params: PoolParams, block: BlockNumber) -> Self {
        Self {
            id,
            name: params.name,
            owner,
            candidate: params.candidate,
            policy: params.policy,
            audit_report_url: params.audit_report_url,
            max_payout_per_period: params.max_payout_per_period,
            min_stake_required: params.min_stake_required,
            max_total_stake: params.max_total_stake,
            bonus_expert_factor: params.bonus_expert_factor,
            bonus_first_expert_factor: params.bonus_first_expert_factor,
            pay_period_blocks: params.pay_period_blocks,
            min_stake_time_blocks: params.min_stake_time_blocks,
            timeout_blocks: params.timeout_blocks,
            deposit_remaining: params.initial_deposit,
            total_stake_raw: 0,
            pool_size_bonus_adjusted: 0,
            interest_paid: 0,
            state: PoolState::Initialized,
            state_entered_at: block,
            min_stake_start_block: None,
            last_payout_block: None,
            stake_count: 0,
            first_expert_staker: None,
            stakes: Vec::new(),
        }
    }

    /// Deposit covers at least one payout period
    pub fn is_funded(&self) -> bool {
        self.deposit_remaining >= self.max_payout_per_period
    }

    /// Value custodied for this pool
    pub fn custodied(&self) -> Balance {
        self.deposit_remaining.saturating_add(self.total_stake_raw)
    }

    pub fn stake_of(&self, staker: &AccountId) -> Option<&Stake> {
        self.stakes.iter().find(|s| &s.staker == staker)
    }

    pub fn is_staker(&self, account: &AccountId) -> bool {
        self.stake_of(account).is_some()
    }

    /// Remaining room under `max_total_stake` (None when unbounded)
    pub fn stake_capacity(&self) -> Option<Balance> {
        if self.max_total_stake == 0 {
            None
        } else {
            Some(self.max_total_stake.saturating_sub(self.total_stake_raw))
        }
    }

    /// Record the first funded block; later calls keep the first value
    pub fn mark_min_stake_start(&mut self, block: BlockNumber) -> Result<bool, PoolError> {
        if block == 0 {
            return Err(PoolError::UnsetMinStakeStart);
        }
        if self.min_stake_start_block.is_some() {
            return Ok(false);
        }
        self.min_stake_start_block = Some(block);
        Ok(true)
    }

    /// Add a placement to the staker's position
    pub fn add_stake(
        &mut self,
        staker: AccountId,
        principal: Balance,
        contribution: Balance,
        expert: bool,
        block: BlockNumber,
    ) -> Result<(), PoolError> {
        let order = self.stake_count.checked_add(1).ok_or(PoolError::AccountingOverflow)?;
        let total_stake_raw = self
            .total_stake_raw
            .checked_add(principal)
            .ok_or(PoolError::AccountingOverflow)?;
        let pool_size = self
            .pool_size_bonus_adjusted
            .checked_add(contribution)
            .ok_or(PoolError::AccountingOverflow)?;

        match self.stakes.iter_mut().find(|s| s.staker == staker) {
            Some(stake) => {
                stake.principal = stake
                    .principal
                    .checked_add(principal)
                    .ok_or(PoolError::AccountingOverflow)?;
                stake.contribution = stake
                    .contribution
                    .checked_add(contribution)
                    .ok_or(PoolError::AccountingOverflow)?;
            }
            None => self.stakes.push(Stake {
                staker,
                principal,
                contribution,
                expert_at_stake: expert,
                order,
                staked_at: block,
            }),
        }

        if expert && self.first_expert_staker.is_none() {
            self.first_expert_staker = Some(staker);
        }

        self.stake_count = order;
        self.total_stake_raw = total_stake_raw;
        self.pool_size_bonus_adjusted = pool_size;
        Ok(())
    }

    /// Remove a staker's whole position, subtracting exactly what it recorded
    pub fn remove_stake(&mut self, staker: &AccountId) -> Result<Stake, PoolError> {
        let position = self
            .stakes
            .iter()
            .position(|s| &s.staker == staker)
            .ok_or(PoolError::NoStake)?;

        let stake = self.stakes.remove(position);
        self.total_stake_raw = self
            .total_stake_raw
            .checked_sub(stake.principal)
            .ok_or(PoolError::AccountingUnderflow)?;
        self.pool_size_bonus_adjusted = self
            .pool_size_bonus_adjusted
            .checked_sub(stake.contribution)
            .ok_or(PoolError::AccountingUnderflow)?;
        Ok(stake)
    }

    /// Drop every stake (collateral claimed by the owner)
    pub fn clear_stakes(&mut self) {
        self.stakes.clear();
        self.total_stake_raw = 0;
        self.pool_size_bonus_adjusted = 0;
    }

    /// Accounting invariants that must hold after every mutation
    pub fn check_invariants(&self) -> Result<(), PoolError> {
        if self.pool_size_bonus_adjusted < self.total_stake_raw {
            return Err(PoolError::PoolSizeBelowStake {
                pool_size: self.pool_size_bonus_adjusted,
                total_stake: self.total_stake_raw,
            });
        }
        let principal_sum = self
            .stakes
            .iter()
            .try_fold(0u128, |acc, s| acc.checked_add(s.principal))
            .ok_or(PoolError::AccountingOverflow)?;
        if principal_sum != self.total_stake_raw {
            return Err(PoolError::StakeSumMismatch {
                recorded: self.total_stake_raw,
                computed: principal_sum,
            });
        }
        Ok(())
    }
}

/// Pool record errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Minimum stake start block cannot be set to 0")]
    UnsetMinStakeStart,

    #[error("Account has no stake in this pool")]
    NoStake,

    #[error("Pool accounting overflow")]
    AccountingOverflow,

    #[error("Pool accounting underflow")]
    AccountingUnderflow,

    #[error("Bonus-adjusted pool size {pool_size} is below total stake {total_stake}")]
    PoolSizeBelowStake { pool_size: Balance, total_stake: Balance },

    #[error("Recorded total stake {recorded} does not match stakes {computed}")]
    StakeSumMismatch { recorded: Balance, computed: Balance },
}
