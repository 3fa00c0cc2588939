// Lifecycle - Pool state machine
// Principle: State is re-derived lazily from block height, funding and the oracle answer
//
// Every state-changing operation calls `refresh` before applying its own effect.
// `refresh` is pure over the pool record: the caller queries the oracle (only when
// `PoolState::watches_policy` is true) and passes the answer in.

use crate::types::{BlockNumber, Pool, PoolError, PoolState};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A state change applied to a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PoolState,
    pub to: PoolState,
    pub block: BlockNumber,
}

/// Initialized pool waited too long for activation
pub fn timed_out(pool: &Pool, block: BlockNumber) -> bool {
    block.saturating_sub(pool.state_entered_at) >= pool.timeout_blocks
}

/// Minimum staking time elapsed since the pool was first funded
pub fn min_stake_time_elapsed(pool: &Pool, block: BlockNumber) -> bool {
    match pool.min_stake_start_block {
        Some(start) => block.saturating_sub(start) >= pool.min_stake_time_blocks,
        None => false,
    }
}

/// Enough stake to leave Initialized
pub fn activation_reached(pool: &Pool) -> bool {
    pool.total_stake_raw > 0 && pool.total_stake_raw >= pool.min_stake_required
}

/// State the pool is in at `block`, given the oracle answer
pub fn derive(pool: &Pool, block: BlockNumber, violated: bool) -> PoolState {
    let funded = pool.is_funded();
    match pool.state {
        PoolState::Initialized => {
            if violated || timed_out(pool, block) {
                PoolState::Cancelled
            } else if activation_reached(pool) {
                PoolState::not_violated(funded)
            } else {
                PoolState::Initialized
            }
        }
        PoolState::NotViolatedFunded | PoolState::NotViolatedUnderfunded => {
            if violated {
                PoolState::violated(funded)
            } else {
                PoolState::not_violated(funded)
            }
        }
        other => other,
    }
}

/// Re-derive and apply the state of `pool` at `block`
pub fn refresh(pool: &mut Pool, block: BlockNumber, violated: bool) -> Result<Option<Transition>, PoolError> {
    let next = derive(pool, block, violated);
    transition(pool, next, block)
}

/// Move `pool` to `to`, applying entry bookkeeping
///
/// - `state_entered_at` is reset on every change
/// - leaving Initialized opens the interest checkpoint
/// - entering NotViolatedFunded starts the minimum staking time (once)
pub fn transition(pool: &mut Pool, to: PoolState, block: BlockNumber) -> Result<Option<Transition>, PoolError> {
    let from = pool.state;
    if from == to {
        return Ok(None);
    }

    if to == PoolState::NotViolatedFunded {
        pool.mark_min_stake_start(block)?;
    }
    if from == PoolState::Initialized && pool.last_payout_block.is_none() {
        pool.last_payout_block = Some(block);
    }

    pool.state = to;
    pool.state_entered_at = block;

    info!("Pool {} '{}': {} -> {} at block {}", pool.id, pool.name, from, to, block);
    Ok(Some(Transition { from, to, block }))
}

/// Funded-status recomputation after a balance change (no oracle involved)
pub fn recompute_funding(pool: &mut Pool, block: BlockNumber) -> Result<Option<Transition>, PoolError> {
    let next = match pool.state {
        PoolState::NotViolatedFunded | PoolState::NotViolatedUnderfunded => {
            PoolState::not_violated(pool.is_funded())
        }
        other => other,
    };
    transition(pool, next, block)
}
