// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::Address;
use log::debug;
use vault_ledger::pricing::covers;
use vault_ledger::LedgerSession;

use crate::error::Result;

/// Upload admission against live ledger state. The mirror is never consulted.
pub struct CapacityCheck {
    session: Arc<LedgerSession>,
}

impl CapacityCheck {
    pub fn new(session: Arc<LedgerSession>) -> Self {
        Self { session }
    }

    /// True when the balance covers `consumption + additional_bytes` at the ledger's price.
    ///
    /// Read failures are returned as errors; callers must treat them as a denial.
    pub async fn has_capacity(&self, address: &Address, additional_bytes: u64) -> Result<bool> {
        let client = self.session.client()?;
        let balance = client.balance_of(address).await?;
        let consumption = client.consumption_of(address).await?;
        let allowed = covers(balance, consumption, additional_bytes);
        debug!(
            "capacity for {}: balance={} consumption={} additional={} allowed={}",
            address, balance, consumption, additional_bytes, allowed
        );
        Ok(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::config::{LedgerSettings, RetrySettings};
    use core_types::U256;
    use vault_ledger::pricing::one_token;
    use vault_ledger::{InMemoryVault, VaultLedger};

    const MIB: u64 = 1 << 20;

    fn addr() -> Address {
        Address::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    fn settings() -> LedgerSettings {
        LedgerSettings {
            confirmation_timeout_secs: 1,
            read_retry: RetrySettings {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
                jitter_pct: 0.0,
            },
        }
    }

    fn check(vault: &Arc<InMemoryVault>) -> CapacityCheck {
        let ledger: Arc<dyn VaultLedger> = vault.clone();
        CapacityCheck::new(Arc::new(LedgerSession::shared(settings(), ledger)))
    }

    #[tokio::test]
    async fn empty_balance_denies_one_mebibyte() {
        let vault = Arc::new(InMemoryVault::new());
        assert!(!check(&vault).has_capacity(&addr(), MIB).await.unwrap());
    }

    #[tokio::test]
    async fn zero_byte_request_is_always_covered() {
        let vault = Arc::new(InMemoryVault::new());
        assert!(check(&vault).has_capacity(&addr(), 0).await.unwrap());
    }

    #[tokio::test]
    async fn existing_consumption_counts_against_balance() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(&addr(), one_token() * U256::from(2u64));
        let check = check(&vault);
        assert!(check.has_capacity(&addr(), 2 * MIB).await.unwrap());

        let pending = vault
            .set_consumption(&addr(), U256::from(MIB))
            .await
            .unwrap();
        vault.wait_for_receipt(&pending).await.unwrap();
        assert!(check.has_capacity(&addr(), MIB).await.unwrap());
        assert!(!check.has_capacity(&addr(), MIB + 1).await.unwrap());
    }

    #[tokio::test]
    async fn read_failure_is_an_error_not_a_grant() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(&addr(), one_token() * U256::from(100u64));
        vault.fail_address(&addr(), true);
        let err = check(&vault).has_capacity(&addr(), MIB).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn live_check_matches_pricing_rule_across_boundaries() {
        let vault = Arc::new(InMemoryVault::new());
        let check = check(&vault);
        let token = one_token();
        let balances = [U256::zero(), token - U256::one(), token, token * U256::from(3u64)];
        let consumptions = [U256::zero(), U256::from(MIB - 1), U256::from(MIB), U256::MAX];
        for balance in balances {
            vault.set_balance(&addr(), balance);
            for consumption in consumptions {
                let pending = vault.set_consumption(&addr(), consumption).await.unwrap();
                vault.wait_for_receipt(&pending).await.unwrap();
                for bytes in [0, 1, MIB - 1, MIB, MIB + 1, 2 * MIB] {
                    assert_eq!(
                        check.has_capacity(&addr(), bytes).await.unwrap(),
                        covers(balance, consumption, bytes),
                        "balance={balance} consumption={consumption} bytes={bytes}"
                    );
                }
            }
        }
    }
}
