// Bonus - Bonus-weighted contribution of a stake to the pool size
// Principle: Exact integer arithmetic, fail instead of wrap
//
// A stake of principal P placed k-th in a pool contributes
//   P                                  if k = 1 or the staker is not an expert
//   P * (E^k + 100^k) / 100^k          for an expert stake
//   P * (E^k + 100^k) * (F + 100) / 100^(k+1)   for the pool's first expert stake
// where E and F are the percentage-scaled expert and first-expert factors.
// E/100 is reduced to lowest terms and the ratio power is built in unbounded
// integers, so only a final result beyond a balance is an error.

use crate::types::{Balance, PERCENT_BASE};
use num_bigint::BigUint;
use tracing::debug;

/// How the registry classified a placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeKind {
    Regular,
    Expert,
    /// First placement by an expert in this pool
    FirstExpert,
}

/// Percentage-scaled bonus factors of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BonusFactors {
    pub expert: u64,
    pub first_expert: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BonusError {
    #[error("Stake order must start at 1")]
    ZeroOrder,

    #[error("Bonus-adjusted amount at order {order} does not fit a balance")]
    Unrepresentable { order: u64 },
}

/// Bonus-adjusted contribution of a placement
pub fn contribution(
    principal: Balance,
    order: u64,
    kind: StakeKind,
    factors: BonusFactors,
) -> Result<Balance, BonusError> {
    if order == 0 {
        return Err(BonusError::ZeroOrder);
    }
    if order == 1 || kind == StakeKind::Regular || principal == 0 {
        return Ok(principal);
    }

    // A = scaled principal, d = extra denominator of the first-expert factor
    let (scaled, divisor) = match kind {
        StakeKind::FirstExpert => (
            BigUint::from(principal) * (u128::from(factors.first_expert) + u128::from(PERCENT_BASE)),
            BigUint::from(PERCENT_BASE),
        ),
        _ => (BigUint::from(principal), BigUint::from(1u32)),
    };

    // floor((A + floor(A * E^k / 100^k)) / d) equals the single-division form
    let term = ratio_term(&scaled, &divisor, order, factors.expert)?;
    let total = (scaled + term) / divisor;

    u128::try_from(&total).map_err(|_| BonusError::Unrepresentable { order })
}

/// floor(A * (E/100)^k), or an error once it provably exceeds a balance times d
fn ratio_term(scaled: &BigUint, divisor: &BigUint, order: u64, expert: u64) -> Result<BigUint, BonusError> {
    let common = gcd(expert, PERCENT_BASE);
    let (num_factor, den_factor) = (expert / common, PERCENT_BASE / common);

    if num_factor == 0 {
        return Ok(BigUint::default());
    }
    if num_factor == den_factor {
        return Ok(scaled.clone());
    }

    let limit = (BigUint::from(Balance::MAX) + 1u32) * divisor;
    let mut numerator = scaled.clone();
    let mut denominator = BigUint::from(1u32);
    for step in 1..=order {
        numerator *= num_factor;
        denominator *= den_factor;

        if num_factor < den_factor {
            // Below one unit and can only shrink further
            if numerator < denominator {
                debug!("Bonus vanishes after {} of {} steps", step, order);
                return Ok(BigUint::default());
            }
        } else if numerator > &denominator * &limit {
            // Growing ratio, later steps only make it larger
            return Err(BonusError::Unrepresentable { order });
        }
    }

    Ok(numerator / denominator)
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let rest = a % b;
        a = b;
        b = rest;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TOKEN;

    const FACTORS: BonusFactors = BonusFactors {
        expert: 3,
        first_expert: 5,
    };

    #[test]
    fn test_first_stake_is_raw() {
        assert_eq!(contribution(7, 1, StakeKind::Regular, FACTORS), Ok(7));
        assert_eq!(contribution(7, 1, StakeKind::FirstExpert, FACTORS), Ok(7));
    }

    #[test]
    fn test_regular_stake_after_first_is_raw() {
        assert_eq!(contribution(7, 5, StakeKind::Regular, FACTORS), Ok(7));
    }

    #[test]
    fn test_zero_order_rejected() {
        assert_eq!(contribution(7, 0, StakeKind::Expert, FACTORS), Err(BonusError::ZeroOrder));
    }

    #[test]
    fn test_expert_closed_form_large_principal() {
        let p = 10 * TOKEN;
        assert_eq!(
            contribution(p, 3, StakeKind::Expert, FACTORS),
            Ok(p * (27 + 1_000_000) / 1_000_000)
        );
        assert_eq!(
            contribution(p, 2, StakeKind::FirstExpert, FACTORS),
            Ok(p * (9 + 10_000) * 105 / 1_000_000)
        );
    }

    #[test]
    fn test_small_principal_floors() {
        // 105 * 10009 / 10^6 = 1.05...
        assert_eq!(contribution(1, 2, StakeKind::FirstExpert, FACTORS), Ok(1));
        assert_eq!(contribution(1, 4, StakeKind::Expert, FACTORS), Ok(1));
        assert_eq!(contribution(100, 2, StakeKind::FirstExpert, FACTORS), Ok(105));
    }

    #[test]
    fn test_early_exit_matches_full_division() {
        // Orders small enough for the full formula to fit u128
        for principal in [1u128, 99, 12_345, 10 * TOKEN] {
            for order in 2..=6u32 {
                let full = principal * (3u128.pow(order) + 100u128.pow(order)) / 100u128.pow(order);
                assert_eq!(
                    contribution(principal, order as u64, StakeKind::Expert, FACTORS),
                    Ok(full),
                    "principal {} order {}",
                    principal,
                    order
                );
            }
        }
    }

    #[test]
    fn test_high_order_small_factor_does_not_overflow() {
        // 100^k alone exceeds 256 bits for k = 40, the bonus term vanishes long before
        assert_eq!(contribution(1_000, 40, StakeKind::Expert, FACTORS), Ok(1_000));
    }

    #[test]
    fn test_large_factor_fails_instead_of_wrapping() {
        let factors = BonusFactors {
            expert: 200,
            first_expert: 0,
        };
        assert_eq!(
            contribution(TOKEN, 200, StakeKind::Expert, factors),
            Err(BonusError::Unrepresentable { order: 200 })
        );
    }

    #[test]
    fn test_growing_factor_exact_while_representable() {
        let factors = BonusFactors {
            expert: 101,
            first_expert: 0,
        };
        for order in 2..=10u32 {
            let full = 1_000 * (101u128.pow(order) + 100u128.pow(order)) / 100u128.pow(order);
            assert_eq!(contribution(1_000, order as u64, StakeKind::Expert, factors), Ok(full));
        }
        // Doubling at every step, 2^127 still fits but 2^128 does not
        let doubling = BonusFactors {
            expert: 200,
            first_expert: 0,
        };
        assert_eq!(
            contribution(1, 126, StakeKind::Expert, doubling),
            Ok((1u128 << 126) + 1)
        );
        assert_eq!(
            contribution(1, 128, StakeKind::Expert, doubling),
            Err(BonusError::Unrepresentable { order: 128 })
        );
    }

    #[test]
    fn test_half_factor_exact_at_high_orders() {
        // E/100 = 1/2, so the bonus term is floor(P / 2^k)
        let factors = BonusFactors {
            expert: 50,
            first_expert: 0,
        };
        for order in 30..=60u32 {
            assert_eq!(
                contribution(TOKEN, order as u64, StakeKind::Expert, factors),
                Ok(TOKEN + (TOKEN >> order)),
                "order {}",
                order
            );
        }
    }

    #[test]
    fn test_factor_near_one_hundred_stays_exact() {
        // 99/100 has no common factor, the term stays nonzero for thousands of orders
        let factors = BonusFactors {
            expert: 99,
            first_expert: 0,
        };
        let at = |order| contribution(TOKEN, order, StakeKind::Expert, factors).unwrap();
        assert_eq!(at(2), TOKEN + TOKEN * 9_801 / 10_000);
        let mut previous = at(40);
        assert!(previous > TOKEN + TOKEN / 2);
        for order in [100, 500, 2_000, 5_000] {
            let current = at(order);
            assert!(current < previous && current >= TOKEN, "order {}", order);
            previous = current;
        }
        assert_eq!(at(10_000), TOKEN);
    }

    #[test]
    fn test_factor_of_one_hundred_doubles() {
        let factors = BonusFactors {
            expert: 100,
            first_expert: 0,
        };
        assert_eq!(contribution(50, 9, StakeKind::Expert, factors), Ok(100));
        assert_eq!(contribution(1_000, 40, StakeKind::Expert, factors), Ok(2_000));
        assert_eq!(contribution(TOKEN, 1_000, StakeKind::Expert, factors), Ok(2 * TOKEN));
    }
}
