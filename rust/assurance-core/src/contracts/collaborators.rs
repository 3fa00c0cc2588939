// Collaborators - Narrow interfaces to the token ledger, the policy oracle and the expert registry
// Principle: The protocol never trusts an answer it could not obtain; every query is fallible
//
// The reference implementations below are in-memory and deterministic. They back the
// replay CLI and the test suites; a deployment plugs its own implementations in.

use crate::types::{AccountId, Balance};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

// =============================================================================
// TRAITS
// =============================================================================

/// Token ledger holding the protocol's custody account
pub trait Ledger {
    /// Pay `amount` out of custody to `to`
    fn transfer(&mut self, to: &AccountId, amount: Balance) -> Result<(), LedgerError>;

    /// Pull `amount` from `from` into custody (requires prior approval)
    fn transfer_from(&mut self, from: &AccountId, amount: Balance) -> Result<(), LedgerError>;

    /// Pay several accounts out of custody, all or nothing
    fn transfer_batch(&mut self, payments: &[(AccountId, Balance)]) -> Result<(), LedgerError>;

    /// Balance of any account
    fn balance_of(&self, account: &AccountId) -> Result<Balance, LedgerError>;
}

/// Security policy judge
pub trait PolicyOracle {
    /// Whether `policy` currently reports `subject` as violated
    fn is_violated(&self, policy: &AccountId, subject: &AccountId) -> Result<bool, OracleError>;
}

/// Expert whitelist
pub trait ExpertRegistry {
    fn is_expert(&self, account: &AccountId) -> Result<bool, RegistryError>;
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: Balance, need: Balance },

    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: Balance, need: Balance },

    #[error("Account {0} is frozen")]
    Frozen(AccountId),

    #[error("Balance overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Unknown policy {0}")]
    UnknownPolicy(AccountId),

    #[error("Policy {0} cannot evaluate the subject")]
    Unanswerable(AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Expert registry unavailable")]
    Unavailable,
}

// =============================================================================
// IN-MEMORY LEDGER
// =============================================================================

/// Token balances with allowances toward a single custodian
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryLedger {
    custodian: AccountId,
    balances: HashMap<AccountId, Balance>,
    /// Amount each holder allows the custodian to pull
    allowances: HashMap<AccountId, Balance>,
    /// Accounts whose transfers fail (simulates a rejecting token)
    frozen: HashSet<AccountId>,
}

impl InMemoryLedger {
    pub fn new(custodian: AccountId) -> Self {
        Self {
            custodian,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            frozen: HashSet::new(),
        }
    }

    pub fn custodian(&self) -> AccountId {
        self.custodian
    }

    /// Credit freshly issued tokens (genesis only)
    pub fn mint(&mut self, account: AccountId, amount: Balance) -> Result<(), LedgerError> {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Set the amount the custodian may pull from `owner`
    pub fn approve(&mut self, owner: AccountId, amount: Balance) {
        self.allowances.insert(owner, amount);
    }

    pub fn allowance(&self, owner: &AccountId) -> Balance {
        self.allowances.get(owner).copied().unwrap_or(0)
    }

    pub fn freeze(&mut self, account: AccountId) {
        self.frozen.insert(account);
    }

    pub fn unfreeze(&mut self, account: &AccountId) {
        self.frozen.remove(account);
    }

    pub fn balance(&self, account: &AccountId) -> Balance {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_issuance(&self) -> Balance {
        self.balances.values().fold(0u128, |acc, b| acc.saturating_add(*b))
    }

    fn move_balance(&mut self, from: &AccountId, to: &AccountId, amount: Balance) -> Result<(), LedgerError> {
        for account in [from, to] {
            if self.frozen.contains(account) {
                return Err(LedgerError::Frozen(*account));
            }
        }

        let have = self.balance(from);
        if have < amount {
            return Err(LedgerError::InsufficientBalance { have, need: amount });
        }
        let credited = self.balance(to).checked_add(amount).ok_or(LedgerError::Overflow)?;

        self.balances.insert(*from, have - amount);
        // Self-transfers must not mint
        let credited = if from == to { have } else { credited };
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl Ledger for InMemoryLedger {
    fn transfer(&mut self, to: &AccountId, amount: Balance) -> Result<(), LedgerError> {
        let custodian = self.custodian;
        self.move_balance(&custodian, to, amount)?;
        debug!("Ledger: {} -> {} ({})", custodian, to, amount);
        Ok(())
    }

    fn transfer_from(&mut self, from: &AccountId, amount: Balance) -> Result<(), LedgerError> {
        let have = self.allowance(from);
        if have < amount {
            return Err(LedgerError::InsufficientAllowance { have, need: amount });
        }
        let custodian = self.custodian;
        self.move_balance(from, &custodian, amount)?;
        self.allowances.insert(*from, have - amount);
        debug!("Ledger: {} -> {} ({})", from, custodian, amount);
        Ok(())
    }

    fn transfer_batch(&mut self, payments: &[(AccountId, Balance)]) -> Result<(), LedgerError> {
        // Validate against a scratch copy so a failing payment leaves no trace
        let mut scratch = self.clone();
        for (to, amount) in payments {
            scratch.transfer(to, *amount)?;
        }
        *self = scratch;
        Ok(())
    }

    fn balance_of(&self, account: &AccountId) -> Result<Balance, LedgerError> {
        Ok(self.balance(account))
    }
}

// =============================================================================
// POLICY BOOK
// =============================================================================

/// How a registered policy answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyBehaviour {
    NeverViolated,
    AlwaysViolated,
    /// Violated for the listed subjects only
    Manual(HashSet<AccountId>),
    /// Every query fails
    Unanswerable,
}

/// Registry of deterministic policies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBook {
    policies: HashMap<AccountId, PolicyBehaviour>,
}

impl PolicyBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, policy: AccountId, behaviour: PolicyBehaviour) {
        self.policies.insert(policy, behaviour);
    }

    pub fn behaviour(&self, policy: &AccountId) -> Option<&PolicyBehaviour> {
        self.policies.get(policy)
    }

    /// Report `subject` as violated under a manual policy (registering it if needed)
    pub fn flag(&mut self, policy: AccountId, subject: AccountId) {
        match self.policies.get_mut(&policy) {
            Some(PolicyBehaviour::Manual(flagged)) => {
                flagged.insert(subject);
            }
            _ => {
                let mut flagged = HashSet::new();
                flagged.insert(subject);
                self.policies.insert(policy, PolicyBehaviour::Manual(flagged));
            }
        }
    }

    /// Clear a manual violation flag
    pub fn clear(&mut self, policy: &AccountId, subject: &AccountId) {
        if let Some(PolicyBehaviour::Manual(flagged)) = self.policies.get_mut(policy) {
            flagged.remove(subject);
        }
    }
}

impl PolicyOracle for PolicyBook {
    fn is_violated(&self, policy: &AccountId, subject: &AccountId) -> Result<bool, OracleError> {
        match self.policies.get(policy) {
            None => Err(OracleError::UnknownPolicy(*policy)),
            Some(PolicyBehaviour::NeverViolated) => Ok(false),
            Some(PolicyBehaviour::AlwaysViolated) => Ok(true),
            Some(PolicyBehaviour::Manual(flagged)) => Ok(flagged.contains(subject)),
            Some(PolicyBehaviour::Unanswerable) => Err(OracleError::Unanswerable(*policy)),
        }
    }
}

// =============================================================================
// EXPERT REGISTRY
// =============================================================================

/// Whitelist of expert accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistExpertRegistry {
    experts: HashSet<AccountId>,
    available: bool,
}

impl Default for WhitelistExpertRegistry {
    fn default() -> Self {
        Self {
            experts: HashSet::new(),
            available: true,
        }
    }
}

impl WhitelistExpertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experts(experts: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            experts: experts.into_iter().collect(),
            available: true,
        }
    }

    pub fn add(&mut self, account: AccountId) {
        self.experts.insert(account);
    }

    pub fn remove(&mut self, account: &AccountId) {
        self.experts.remove(account);
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }
}

impl ExpertRegistry for WhitelistExpertRegistry {
    fn is_expert(&self, account: &AccountId) -> Result<bool, RegistryError> {
        if !self.available {
            return Err(RegistryError::Unavailable);
        }
        Ok(self.experts.contains(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(seed: u8) -> AccountId {
        AccountId::from_bytes([seed; 32])
    }

    #[test]
    fn test_transfer_from_requires_allowance() {
        let custodian = account(99);
        let mut ledger = InMemoryLedger::new(custodian);
        ledger.mint(account(1), 100).unwrap();

        assert_eq!(
            ledger.transfer_from(&account(1), 10),
            Err(LedgerError::InsufficientAllowance { have: 0, need: 10 })
        );

        ledger.approve(account(1), 30);
        ledger.transfer_from(&account(1), 10).unwrap();
        assert_eq!(ledger.balance(&account(1)), 90);
        assert_eq!(ledger.balance(&custodian), 10);
        assert_eq!(ledger.allowance(&account(1)), 20);
    }

    #[test]
    fn test_new_ledger_keeps_custodian_across_encoding() {
        let custodian = account(99);
        let mut ledger = InMemoryLedger::new(custodian);
        assert_eq!(ledger.custodian(), custodian);
        assert_eq!(ledger.total_issuance(), 0);

        ledger.mint(account(1), 40).unwrap();
        let bytes = bincode::serialize(&ledger).unwrap();
        let decoded: InMemoryLedger = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.custodian(), custodian);
        assert_eq!(decoded.balance(&account(1)), 40);
    }

    #[test]
    fn test_transfer_pays_out_of_custody() {
        let custodian = account(99);
        let mut ledger = InMemoryLedger::new(custodian);
        ledger.mint(custodian, 50).unwrap();

        ledger.transfer(&account(2), 20).unwrap();
        assert_eq!(ledger.balance_of(&account(2)), Ok(20));
        assert_eq!(
            ledger.transfer(&account(2), 31),
            Err(LedgerError::InsufficientBalance { have: 30, need: 31 })
        );
        assert_eq!(ledger.total_issuance(), 50);
    }

    #[test]
    fn test_transfer_batch_is_all_or_nothing() {
        let custodian = account(99);
        let mut ledger = InMemoryLedger::new(custodian);
        ledger.mint(custodian, 50).unwrap();
        ledger.freeze(account(3));

        let payments = [(account(2), 10), (account(3), 10)];
        assert_eq!(ledger.transfer_batch(&payments), Err(LedgerError::Frozen(account(3))));
        assert_eq!(ledger.balance(&account(2)), 0);
        assert_eq!(ledger.balance(&custodian), 50);

        ledger.unfreeze(&account(3));
        ledger.transfer_batch(&payments).unwrap();
        assert_eq!(ledger.balance(&custodian), 30);
    }

    #[test]
    fn test_frozen_account_rejects_transfers() {
        let custodian = account(99);
        let mut ledger = InMemoryLedger::new(custodian);
        ledger.mint(custodian, 50).unwrap();
        ledger.freeze(account(3));

        assert_eq!(ledger.transfer(&account(3), 1), Err(LedgerError::Frozen(account(3))));
        ledger.unfreeze(&account(3));
        ledger.transfer(&account(3), 1).unwrap();
    }

    #[test]
    fn test_policy_book_behaviours() {
        let mut book = PolicyBook::new();
        let subject = account(7);
        book.register(account(1), PolicyBehaviour::NeverViolated);
        book.register(account(2), PolicyBehaviour::AlwaysViolated);
        book.register(account(3), PolicyBehaviour::Unanswerable);

        assert_eq!(book.is_violated(&account(1), &subject), Ok(false));
        assert_eq!(book.is_violated(&account(2), &subject), Ok(true));
        assert_eq!(book.is_violated(&account(3), &subject), Err(OracleError::Unanswerable(account(3))));
        assert_eq!(book.is_violated(&account(4), &subject), Err(OracleError::UnknownPolicy(account(4))));

        book.flag(account(5), subject);
        assert_eq!(book.is_violated(&account(5), &subject), Ok(true));
        assert_eq!(book.is_violated(&account(5), &account(8)), Ok(false));
        book.clear(&account(5), &subject);
        assert_eq!(book.is_violated(&account(5), &subject), Ok(false));
    }

    #[test]
    fn test_expert_registry_availability() {
        let mut registry = WhitelistExpertRegistry::with_experts([account(1)]);
        assert_eq!(registry.is_expert(&account(1)), Ok(true));
        assert_eq!(registry.is_expert(&account(2)), Ok(false));

        registry.set_available(false);
        assert_eq!(registry.is_expert(&account(1)), Err(RegistryError::Unavailable));
    }
}
