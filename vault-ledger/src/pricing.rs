// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bytes-to-tokens conversion. Must stay bit-for-bit identical to the contract's
//! `pay` formula: one whole token (18 decimals) per mebibyte, floored.

use primitive_types::{U256, U512};

pub const TOKEN_DECIMALS: usize = 18;
pub const BYTES_PER_TOKEN: u64 = 1 << 20;

/// `10^18`, one whole token in base units.
pub fn one_token() -> U256 {
    U256::exp10(TOKEN_DECIMALS)
}

/// `floor(total_bytes * 10^18 / 2^20)`, or `None` when the result does not fit the
/// ledger's 256-bit integers (no balance can cover it).
pub fn tokens_required(total_bytes: U256) -> Option<U256> {
    let wide = total_bytes.full_mul(one_token()) / U512::from(BYTES_PER_TOKEN);
    U256::try_from(wide).ok()
}

/// Whether `balance` pays for `consumption + additional_bytes`.
pub fn covers(balance: U256, consumption: U256, additional_bytes: u64) -> bool {
    let Some(total) = consumption.checked_add(U256::from(additional_bytes)) else {
        return false;
    };
    tokens_required(total).is_some_and(|required| balance >= required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_mebibyte_costs_one_token() {
        assert_eq!(
            tokens_required(U256::from(BYTES_PER_TOKEN)),
            Some(U256::exp10(18))
        );
    }

    #[test]
    fn partial_mebibytes_floor() {
        // 1 byte = 10^18 / 2^20 = 953_674_316_406.25 -> floored.
        assert_eq!(
            tokens_required(U256::one()),
            Some(U256::from(953_674_316_406u64))
        );
        assert_eq!(tokens_required(U256::zero()), Some(U256::zero()));
    }

    #[test]
    fn zero_balance_cannot_cover_a_mebibyte() {
        assert!(!covers(U256::zero(), U256::zero(), BYTES_PER_TOKEN));
        assert!(covers(U256::zero(), U256::zero(), 0));
    }

    #[test]
    fn covers_matches_formula_at_the_boundary() {
        let balance = U256::exp10(18) * U256::from(2u64);
        assert!(covers(balance, U256::zero(), 2 * BYTES_PER_TOKEN));
        assert!(covers(balance, U256::from(BYTES_PER_TOKEN), BYTES_PER_TOKEN));
        assert!(!covers(balance, U256::from(2 * BYTES_PER_TOKEN), 1));
        assert!(!covers(balance - U256::one(), U256::zero(), 2 * BYTES_PER_TOKEN));
    }

    #[test]
    fn huge_consumption_is_never_covered() {
        assert_eq!(tokens_required(U256::MAX), None);
        assert!(!covers(U256::MAX, U256::MAX, 1));
        assert!(!covers(U256::MAX, U256::MAX - U256::one(), 0));
    }

    /// Cross-multiplied form of the admission rule:
    /// `floor(t * 10^18 / 2^20) <= b` exactly when `t * 10^18 < (b + 1) * 2^20`.
    fn reference_covers(balance: U256, consumption: U256, additional_bytes: u64) -> bool {
        let total = U512::from(consumption) + U512::from(additional_bytes);
        if total > U512::from(U256::MAX) {
            return false;
        }
        let cost = total * U512::from(one_token());
        let limit = (U512::from(balance) + U512::one()) * U512::from(BYTES_PER_TOKEN);
        cost < limit
    }

    fn boundary_balances() -> Vec<U256> {
        let per_byte = tokens_required(U256::one()).unwrap();
        let mut balances = vec![U256::zero(), U256::one(), per_byte, per_byte + U256::one()];
        for tokens in [1u64, 2, 50, 1_000_000] {
            let whole = one_token() * U256::from(tokens);
            balances.extend([whole - U256::one(), whole, whole + U256::one()]);
        }
        balances.push(U256::MAX);
        balances
    }

    fn boundary_consumptions() -> Vec<U256> {
        let mut consumptions: Vec<U256> = [0u64, 1, BYTES_PER_TOKEN - 1, BYTES_PER_TOKEN]
            .into_iter()
            .chain([BYTES_PER_TOKEN + 1, 3 * BYTES_PER_TOKEN + 7, 1_000_000 * BYTES_PER_TOKEN])
            .map(U256::from)
            .collect();
        consumptions.extend([U256::MAX - U256::from(BYTES_PER_TOKEN), U256::MAX]);
        consumptions
    }

    const BOUNDARY_BYTES: [u64; 8] = [
        0,
        1,
        BYTES_PER_TOKEN - 1,
        BYTES_PER_TOKEN,
        BYTES_PER_TOKEN + 1,
        50 * BYTES_PER_TOKEN,
        1_000_000 * BYTES_PER_TOKEN,
        u64::MAX,
    ];

    #[test]
    fn covers_agrees_with_cross_multiplied_rule_on_boundary_grid() {
        for balance in boundary_balances() {
            for consumption in boundary_consumptions() {
                for bytes in BOUNDARY_BYTES {
                    assert_eq!(
                        covers(balance, consumption, bytes),
                        reference_covers(balance, consumption, bytes),
                        "balance={balance} consumption={consumption} bytes={bytes}"
                    );
                }
            }
        }
    }

    #[test]
    fn covering_is_monotonic_in_requested_bytes() {
        for balance in boundary_balances() {
            for consumption in boundary_consumptions() {
                let granted: Vec<bool> = BOUNDARY_BYTES
                    .iter()
                    .map(|bytes| covers(balance, consumption, *bytes))
                    .collect();
                assert!(
                    granted.windows(2).all(|pair| pair[0] || !pair[1]),
                    "balance={balance} consumption={consumption} grants={granted:?}"
                );
            }
        }
    }
}
