// Payout - Periodic interest split across stakers by bonus-adjusted contribution
// Principle: Floor every share, never pay more than the deposit holds

use crate::types::{AccountId, Balance, BlockNumber, Pool};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Interest owed by a pool at a given block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestPlan {
    /// Periods elapsed since the checkpoint
    pub periods_elapsed: u64,
    /// Periods actually paid (fewer when the deposit runs dry)
    pub periods_paid: u64,
    /// Checkpoint after applying the plan
    pub new_checkpoint: BlockNumber,
    /// Amount owed per staker, in stake order
    pub shares: Vec<(AccountId, Balance)>,
    pub total: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayoutError {
    #[error("Pool has no interest checkpoint")]
    NoCheckpoint,

    #[error("No payout period elapsed (next at block {next})")]
    NoPeriodElapsed { next: BlockNumber },

    #[error("Pool has no stakers")]
    NoStakers,

    #[error("Deposit exhausted")]
    DepositExhausted,

    #[error("Shares round down to zero")]
    NothingToPay,

    #[error("Payout arithmetic overflow")]
    Overflow,
}

/// Per-staker share of one period paying `amount`
fn split(pool: &Pool, amount: Balance) -> Result<Vec<Balance>, PayoutError> {
    let size = U256::from(pool.pool_size_bonus_adjusted);
    pool.stakes
        .iter()
        .map(|stake| {
            let share = U256::from(amount)
                .checked_mul(U256::from(stake.contribution))
                .ok_or(PayoutError::Overflow)?
                / size;
            // share <= amount since contribution <= pool size
            Ok(share.low_u128())
        })
        .collect()
}

/// Compute the interest owed at `block` without touching the pool
pub fn plan(pool: &Pool, block: BlockNumber) -> Result<InterestPlan, PayoutError> {
    let checkpoint = pool.last_payout_block.ok_or(PayoutError::NoCheckpoint)?;
    let elapsed = block.saturating_sub(checkpoint);
    let periods = elapsed / pool.pay_period_blocks;
    if periods == 0 {
        return Err(PayoutError::NoPeriodElapsed {
            next: checkpoint.saturating_add(pool.pay_period_blocks),
        });
    }
    if pool.stakes.is_empty() || pool.pool_size_bonus_adjusted == 0 {
        return Err(PayoutError::NoStakers);
    }
    if pool.deposit_remaining == 0 {
        return Err(PayoutError::DepositExhausted);
    }

    let mut owed = vec![0u128; pool.stakes.len()];
    let mut deposit = pool.deposit_remaining;
    let mut paid = 0u64;

    // Full periods pay the same shares every time, settle them in one step
    if deposit >= pool.max_payout_per_period {
        let full_shares = split(pool, pool.max_payout_per_period)?;
        let per_period: Balance = full_shares.iter().sum();
        if per_period > 0 {
            let affordable = (deposit - pool.max_payout_per_period) / per_period + 1;
            let full = (periods as u128).min(affordable) as u64;
            for (total, share) in owed.iter_mut().zip(&full_shares) {
                *total = share.checked_mul(full as u128).ok_or(PayoutError::Overflow)?;
            }
            deposit -= per_period * full as u128;
            paid = full;
        }
    }

    // Remaining periods drain what is left, one at a time
    while paid < periods && deposit > 0 && deposit < pool.max_payout_per_period {
        let shares = split(pool, deposit)?;
        let period_total: Balance = shares.iter().sum();
        if period_total == 0 {
            break;
        }
        for (total, share) in owed.iter_mut().zip(&shares) {
            *total = total.checked_add(*share).ok_or(PayoutError::Overflow)?;
        }
        deposit -= period_total;
        paid += 1;
    }

    if paid == 0 {
        return Err(PayoutError::NothingToPay);
    }

    let shares: Vec<(AccountId, Balance)> = pool
        .stakes
        .iter()
        .zip(owed)
        .map(|(stake, amount)| (stake.staker, amount))
        .collect();
    let total = pool.deposit_remaining - deposit;

    debug!(
        "Pool {}: {} of {} periods payable, {} total",
        pool.id, paid, periods, total
    );

    Ok(InterestPlan {
        periods_elapsed: periods,
        periods_paid: paid,
        new_checkpoint: checkpoint.saturating_add(paid.saturating_mul(pool.pay_period_blocks)),
        shares,
        total,
    })
}

/// Apply a plan produced by `plan` to the same pool record
pub fn apply(pool: &mut Pool, plan: &InterestPlan) -> Result<(), PayoutError> {
    pool.deposit_remaining = pool
        .deposit_remaining
        .checked_sub(plan.total)
        .ok_or(PayoutError::DepositExhausted)?;
    pool.interest_paid = pool.interest_paid.checked_add(plan.total).ok_or(PayoutError::Overflow)?;
    pool.last_payout_block = Some(plan.new_checkpoint);
    Ok(())
}

/// Aggregate shares by staker, dropping zero amounts
pub fn transfers(plan: &InterestPlan) -> BTreeMap<AccountId, Balance> {
    let mut out = BTreeMap::new();
    for (staker, amount) in &plan.shares {
        if *amount > 0 {
            *out.entry(*staker).or_insert(0) += amount;
        }
    }
    out
}
