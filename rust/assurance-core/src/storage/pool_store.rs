// Pool Store - Append-only arena of pool records with the custodied balance
// Principle: Pools are never deleted, every commit re-checks the global balance
//
// Operations never mutate a stored pool in place. They work on a clone, hand it
// back through `commit` together with the balance delta, and keep the returned
// `PoolUndo` until their outbound ledger call has succeeded.

use crate::types::{Balance, Pool, PoolError, PoolId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

/// Record needed to roll back one commit
#[derive(Debug, Clone)]
pub enum PoolUndo {
    Inserted { id: PoolId, balance: Balance },
    Replaced { previous: Pool, balance: Balance },
}

/// Pool arena
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStore {
    pools: Vec<Pool>,
    /// Name -> index, names stay reserved forever
    names: HashMap<String, PoolId>,
    /// Custodied value: sum of deposit and stake over every pool
    balance: Balance,
}

impl PoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn next_id(&self) -> PoolId {
        self.pools.len() as PoolId
    }

    pub fn get(&self, id: PoolId) -> Option<&Pool> {
        usize::try_from(id).ok().and_then(|i| self.pools.get(i))
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn index_of(&self, name: &str) -> Option<PoolId> {
        self.names.get(name).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Append a new pool, crediting its initial deposit
    pub fn insert(&mut self, pool: Pool) -> Result<PoolUndo, StoreError> {
        if pool.id != self.next_id() {
            return Err(StoreError::UnexpectedId {
                expected: self.next_id(),
                got: pool.id,
            });
        }
        if self.contains_name(&pool.name) {
            return Err(StoreError::DuplicateName(pool.name.clone()));
        }
        pool.check_invariants()?;

        let previous_balance = self.balance;
        self.balance = self
            .balance
            .checked_add(pool.custodied())
            .ok_or(StoreError::BalanceOverflow)?;
        self.names.insert(pool.name.clone(), pool.id);
        let id = pool.id;
        self.pools.push(pool);

        let undo = PoolUndo::Inserted {
            id,
            balance: previous_balance,
        };
        if let Err(e) = self.verify() {
            self.revert(undo);
            return Err(e);
        }
        Ok(undo)
    }

    /// Replace a stored pool with its updated copy and apply the balance delta
    pub fn commit(&mut self, pool: Pool, credit: Balance, debit: Balance) -> Result<PoolUndo, StoreError> {
        let index = usize::try_from(pool.id)
            .ok()
            .filter(|i| *i < self.pools.len())
            .ok_or(StoreError::UnknownPool(pool.id))?;
        if self.pools[index].name != pool.name {
            return Err(StoreError::RenamedPool(pool.id));
        }
        pool.check_invariants()?;

        let balance = self
            .balance
            .checked_add(credit)
            .ok_or(StoreError::BalanceOverflow)?
            .checked_sub(debit)
            .ok_or(StoreError::BalanceUnderflow)?;

        let previous = std::mem::replace(&mut self.pools[index], pool);
        let undo = PoolUndo::Replaced {
            previous,
            balance: self.balance,
        };
        self.balance = balance;

        if let Err(e) = self.verify() {
            self.revert(undo);
            return Err(e);
        }
        Ok(undo)
    }

    /// Roll back the commit that produced `undo`
    pub fn revert(&mut self, undo: PoolUndo) {
        match undo {
            PoolUndo::Inserted { id, balance } => {
                if self.next_id() == id.saturating_add(1) {
                    if let Some(pool) = self.pools.pop() {
                        self.names.remove(&pool.name);
                    }
                }
                self.balance = balance;
            }
            PoolUndo::Replaced { previous, balance } => {
                if let Some(slot) = usize::try_from(previous.id).ok().and_then(|i| self.pools.get_mut(i)) {
                    *slot = previous;
                }
                self.balance = balance;
            }
        }
    }

    /// Tracked balance equals the value custodied by every pool
    pub fn verify(&self) -> Result<(), StoreError> {
        let computed = self
            .pools
            .iter()
            .try_fold(0u128, |acc, p| acc.checked_add(p.custodied()))
            .ok_or(StoreError::BalanceOverflow)?;
        if computed != self.balance {
            error!("Balance mismatch: tracked {}, pools hold {}", self.balance, computed);
            return Err(StoreError::BalanceMismatch {
                tracked: self.balance,
                computed,
            });
        }
        Ok(())
    }

    /// Full integrity check (used after loading a snapshot)
    pub fn verify_all(&self) -> Result<(), StoreError> {
        for (index, pool) in self.pools.iter().enumerate() {
            if pool.id != index as PoolId {
                return Err(StoreError::UnexpectedId {
                    expected: index as PoolId,
                    got: pool.id,
                });
            }
            if self.names.get(&pool.name) != Some(&pool.id) {
                return Err(StoreError::DuplicateName(pool.name.clone()));
            }
            pool.check_invariants()?;
        }
        if self.names.len() != self.pools.len() {
            return Err(StoreError::NameIndexCorrupt);
        }
        self.verify()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Pool {0} not found")]
    UnknownPool(PoolId),

    #[error("Pool name '{0}' already registered")]
    DuplicateName(String),

    #[error("Pool {0} cannot be renamed")]
    RenamedPool(PoolId),

    #[error("Expected pool id {expected}, got {got}")]
    UnexpectedId { expected: PoolId, got: PoolId },

    #[error("Name index does not match pools")]
    NameIndexCorrupt,

    #[error("Balance mismatch: tracked {tracked}, computed {computed}")]
    BalanceMismatch { tracked: Balance, computed: Balance },

    #[error("Balance overflow")]
    BalanceOverflow,

    #[error("Balance underflow")]
    BalanceUnderflow,

    #[error("Pool record invalid: {0}")]
    Pool(#[from] PoolError),
}
