// Accounting Invariant Tests
// Randomized operation sequences against the contract and an in-memory ledger
//
// After every operation, accepted or rejected:
// 1. Tracked custody equals the custodian's ledger balance
// 2. Every pool passes its own accounting checks (bonus size never below raw stake)
// 3. No value is created or destroyed on the ledger
// 4. A rejected operation leaves the pool store untouched
// 5. Terminal states are never left, violations are never undone

use crate::contracts::assurance::AssuranceContract;
use crate::contracts::collaborators::{
    InMemoryLedger, PolicyBehaviour, PolicyBook, WhitelistExpertRegistry,
};
use crate::contracts::assurance::AssuranceConfig;
use crate::types::{AccountId, Balance, BlockNumber, PoolId, PoolParams, PoolState};
use proptest::prelude::*;

type Contract = AssuranceContract<InMemoryLedger, PolicyBook, WhitelistExpertRegistry>;

const ACTORS: u8 = 6;
const FUNDS: Balance = 10_000;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn create_account(seed: u8) -> AccountId {
    AccountId::from_bytes([seed; 32])
}

fn candidate() -> AccountId {
    create_account(50)
}

fn policy() -> AccountId {
    create_account(51)
}

fn setup_contract() -> Contract {
    let config = AssuranceConfig::default();
    let mut ledger = InMemoryLedger::new(config.custodian);
    for seed in 1..=ACTORS {
        ledger.mint(create_account(seed), FUNDS).unwrap();
        ledger.approve(create_account(seed), FUNDS);
    }
    let mut book = PolicyBook::new();
    book.register(policy(), PolicyBehaviour::Manual(Default::default()));
    // Actors 2 and 3 are experts
    let registry = WhitelistExpertRegistry::with_experts([create_account(2), create_account(3)]);
    AssuranceContract::new(config, ledger, book, registry)
}

fn params(name: String, deposit: Balance, max_total_stake: Balance) -> PoolParams {
    PoolParams {
        candidate: candidate(),
        policy: policy(),
        max_payout_per_period: 10,
        min_stake_required: 20,
        initial_deposit: deposit,
        bonus_expert_factor: 50,
        bonus_first_expert_factor: 20,
        pay_period_blocks: 3,
        min_stake_time_blocks: 8,
        timeout_blocks: 6,
        audit_report_url: String::new(),
        name,
        max_total_stake,
    }
}

/// One step of a randomized run
#[derive(Debug, Clone)]
enum Op {
    Create { owner: u8, deposit: Balance, cap: Balance },
    Deposit { actor: u8, pool: PoolId, amount: Balance },
    WithdrawDeposit { actor: u8, pool: PoolId },
    Stake { actor: u8, pool: PoolId, amount: Balance },
    WithdrawStake { actor: u8, pool: PoolId },
    Interest { actor: u8, pool: PoolId },
    Claim { actor: u8, pool: PoolId },
    CheckPolicy { pool: PoolId },
    Flag,
    Clear,
    Advance(BlockNumber),
}

fn op_strategy() -> impl Strategy<Value = Vec<Op>> {
    let actor = 1..=ACTORS;
    let pool = 0..4u64;
    proptest::collection::vec(
        prop_oneof![
            (actor.clone(), 0..40u128, prop_oneof![Just(0u128), 10..200u128])
                .prop_map(|(owner, deposit, cap)| Op::Create { owner, deposit, cap }),
            (actor.clone(), pool.clone(), 0..50u128)
                .prop_map(|(actor, pool, amount)| Op::Deposit { actor, pool, amount }),
            (actor.clone(), pool.clone()).prop_map(|(actor, pool)| Op::WithdrawDeposit { actor, pool }),
            (actor.clone(), pool.clone(), 0..120u128)
                .prop_map(|(actor, pool, amount)| Op::Stake { actor, pool, amount }),
            (actor.clone(), pool.clone()).prop_map(|(actor, pool)| Op::WithdrawStake { actor, pool }),
            (actor.clone(), pool.clone()).prop_map(|(actor, pool)| Op::Interest { actor, pool }),
            (actor.clone(), pool.clone()).prop_map(|(actor, pool)| Op::Claim { actor, pool }),
            pool.prop_map(|pool| Op::CheckPolicy { pool }),
            any::<bool>().prop_map(|flag| if flag { Op::Flag } else { Op::Clear }),
            (1..5u64).prop_map(Op::Advance),
        ],
        1..60,
    )
}

/// Apply one step, returning whether the contract accepted it
fn apply(contract: &mut Contract, op: &Op, block: &mut BlockNumber, created: &mut u32) -> bool {
    match op {
        Op::Create { owner, deposit, cap } => {
            *created += 1;
            let name = format!("pool-{}", created);
            contract
                .create_pool(create_account(*owner), params(name, *deposit, *cap), *block)
                .is_ok()
        }
        Op::Deposit { actor, pool, amount } => contract
            .deposit_funds(create_account(*actor), *pool, *amount, *block)
            .is_ok(),
        Op::WithdrawDeposit { actor, pool } => contract
            .withdraw_deposit(create_account(*actor), *pool, *block)
            .is_ok(),
        Op::Stake { actor, pool, amount } => contract
            .stake_funds(create_account(*actor), *pool, *amount, *block)
            .is_ok(),
        Op::WithdrawStake { actor, pool } => contract
            .withdraw_stake(create_account(*actor), *pool, *block)
            .is_ok(),
        Op::Interest { actor, pool } => contract
            .withdraw_interest(create_account(*actor), *pool, *block)
            .is_ok(),
        Op::Claim { actor, pool } => contract
            .withdraw_claim(create_account(*actor), *pool, *block)
            .is_ok(),
        Op::CheckPolicy { pool } => contract.check_policy(*pool, *block).is_ok(),
        Op::Flag => {
            contract.policy_oracle_mut().flag(policy(), candidate());
            true
        }
        Op::Clear => {
            contract.policy_oracle_mut().clear(&policy(), &candidate());
            true
        }
        Op::Advance(blocks) => {
            *block += blocks;
            true
        }
    }
}

fn custodian_balance(contract: &Contract) -> Balance {
    let custodian = contract.config().custodian;
    contract.ledger().balance(&custodian)
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[cfg(test)]
mod properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn property_custody_matches_ledger(ops in op_strategy()) {
            let mut contract = setup_contract();
            let issuance = contract.ledger().total_issuance();
            let mut block: BlockNumber = 1;
            let mut created = 0u32;

            for op in &ops {
                let before = contract.store().clone();
                let accepted = apply(&mut contract, op, &mut block, &mut created);

                if !accepted {
                    prop_assert_eq!(contract.store(), &before, "rejected {:?} changed the store", op);
                }
                prop_assert!(contract.store().verify_all().is_ok(), "store inconsistent after {:?}", op);
                prop_assert_eq!(custodian_balance(&contract), contract.balance());
                prop_assert_eq!(contract.ledger().total_issuance(), issuance);

                for pool in contract.pools() {
                    prop_assert!(pool.check_invariants().is_ok(), "pool {} after {:?}", pool.id, op);
                    prop_assert!(pool.pool_size_bonus_adjusted >= pool.total_stake_raw);
                    prop_assert_eq!(pool.stakes.is_empty(), pool.total_stake_raw == 0);
                }
            }
        }

        #[test]
        fn property_states_only_move_forward(ops in op_strategy()) {
            let mut contract = setup_contract();
            let mut block: BlockNumber = 1;
            let mut created = 0u32;

            for op in &ops {
                let before: Vec<PoolState> = contract.pools().iter().map(|p| p.state).collect();
                apply(&mut contract, op, &mut block, &mut created);

                for (previous, pool) in before.iter().zip(contract.pools()) {
                    if previous.is_terminal() {
                        prop_assert_eq!(pool.state, *previous, "pool {} left {} on {:?}", pool.id, previous, op);
                    }
                    if previous.is_violated() {
                        prop_assert!(
                            pool.state.is_violated() || pool.state == PoolState::Cancelled,
                            "pool {} left {} for {} on {:?}",
                            pool.id,
                            previous,
                            pool.state,
                            op
                        );
                    }
                    if *previous != PoolState::Initialized {
                        prop_assert!(pool.state != PoolState::Initialized);
                    }
                }
            }
        }

        #[test]
        fn property_stakers_get_at_most_their_principal_back(ops in op_strategy()) {
            let mut contract = setup_contract();
            let mut block: BlockNumber = 1;
            let mut created = 0u32;

            for op in &ops {
                if let Op::WithdrawStake { actor, pool } = op {
                    let principal = contract
                        .pool(*pool)
                        .and_then(|p| p.stake_of(&create_account(*actor)))
                        .map(|s| s.principal);
                    let wallet = contract.ledger().balance(&create_account(*actor));
                    apply(&mut contract, op, &mut block, &mut created);
                    let gained = contract.ledger().balance(&create_account(*actor)) - wallet;
                    prop_assert!(gained <= principal.unwrap_or(0));
                } else {
                    apply(&mut contract, op, &mut block, &mut created);
                }
            }
        }
    }
}
