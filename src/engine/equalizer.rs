//! Balance equalization across the pool.
//!
//! Runs in two phases against a per-account target share. Collection moves
//! each trading account's excess above the target into the primary account,
//! then distribution tops up each account sitting below the target from the
//! primary, which keeps a configured reserve plus any remainder. Individual
//! transfer failures are recorded and skipped rather than aborting the run.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::account::{AccountId, AccountPool};
use crate::domain::error::EngineError;
use crate::ports::ledger::LedgerClient;

/// Deltas below this are not worth a transfer fee
pub const DUST_THRESHOLD: f64 = 0.000_01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferPhase {
    Collect,
    Distribute,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub phase: TransferPhase,
    pub account: AccountId,
    pub amount: f64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EqualizationReport {
    /// Per-account share both phases aimed for
    pub target: f64,
    pub total_collected: f64,
    pub total_distributed: f64,
    pub success_count: usize,
    pub failure_count: usize,
    pub transfers: Vec<TransferRecord>,
}

pub struct BalanceEqualizer {
    pool: Arc<AccountPool>,
    ledger: Arc<dyn LedgerClient>,
}

impl BalanceEqualizer {
    pub fn new(pool: Arc<AccountPool>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self { pool, ledger }
    }

    /// Level the trading accounts, leaving `reserve` base units on the
    /// primary. Fails before any transfer when the pool total does not cover
    /// the reserve. Phase-1 failures can starve phase 2; under-funded
    /// accounts stay visible in the report.
    pub async fn equalize(&self, reserve: f64) -> Result<EqualizationReport, EngineError> {
        self.pool.refresh_balances(&self.ledger).await;

        let primary = self.pool.primary_id();
        let trading_ids = self.pool.trading_ids().await;
        if trading_ids.is_empty() {
            return Err(EngineError::Validation(
                "no trading accounts to equalize".to_string(),
            ));
        }

        let total = self.pool.total_base().await;
        if total - reserve <= 0.0 {
            return Err(EngineError::InsufficientFunds {
                have: total,
                need: reserve,
            });
        }
        let target = (total - reserve) / trading_ids.len() as f64;

        let mut transfers = Vec::new();
        let mut total_collected = 0.0;

        // Phase 1: pull each account's excess above the target
        for id in &trading_ids {
            let balance = match self.pool.get(*id).await {
                Some(a) => a.base_balance,
                None => continue,
            };
            let excess = balance - target;
            if excess <= DUST_THRESHOLD {
                continue;
            }
            match self.pool.transfer(&self.ledger, *id, primary, excess).await {
                Ok(_) => {
                    total_collected += excess;
                    transfers.push(TransferRecord {
                        phase: TransferPhase::Collect,
                        account: *id,
                        amount: excess,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("collection from account {} failed: {}", id, e);
                    transfers.push(TransferRecord {
                        phase: TransferPhase::Collect,
                        account: *id,
                        amount: excess,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // Phase 2: top up each account below the target. Balances are
        // refreshed first so shortfalls reflect the post-collection ledger
        // state, not the cached deltas of phase 1.
        self.pool.refresh_balances(&self.ledger).await;
        let mut total_distributed = 0.0;
        for id in &trading_ids {
            let balance = match self.pool.get(*id).await {
                Some(a) => a.base_balance,
                None => continue,
            };
            let shortfall = target - balance;
            if shortfall <= DUST_THRESHOLD {
                continue;
            }
            match self
                .pool
                .transfer(&self.ledger, primary, *id, shortfall)
                .await
            {
                Ok(_) => {
                    total_distributed += shortfall;
                    transfers.push(TransferRecord {
                        phase: TransferPhase::Distribute,
                        account: *id,
                        amount: shortfall,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!("distribution to account {} failed: {}", id, e);
                    transfers.push(TransferRecord {
                        phase: TransferPhase::Distribute,
                        account: *id,
                        amount: shortfall,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let success_count = transfers.iter().filter(|t| t.success).count();
        let failure_count = transfers.len() - success_count;
        tracing::info!(
            target,
            total_collected,
            total_distributed,
            success_count,
            failure_count,
            "equalization complete"
        );

        Ok(EqualizationReport {
            target,
            total_collected,
            total_distributed,
            success_count,
            failure_count,
            transfers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::sim::SimLedger;
    use approx::assert_relative_eq;

    fn pool_and_sim(balances: &[f64]) -> (Arc<AccountPool>, Arc<SimLedger>) {
        let sim = Arc::new(SimLedger::new());
        let entries = balances
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let key = format!("acct-{}", i + 1);
                sim.fund(&key, *b);
                (format!("wallet-{}", i + 1), key, 0.0)
            })
            .collect();
        (Arc::new(AccountPool::new(entries).unwrap()), sim)
    }

    #[tokio::test]
    async fn test_uneven_pool_ends_within_tolerance() {
        let (pool, sim) = pool_and_sim(&[1.0, 4.0, 0.2, 0.0, 2.8]);
        let equalizer = BalanceEqualizer::new(pool.clone(), sim.clone());

        let report = equalizer.equalize(0.5).await.unwrap();
        // total 8.0, reserve 0.5, four trading accounts
        assert_relative_eq!(report.target, 1.875, epsilon = 1e-9);
        assert_eq!(report.failure_count, 0);

        for id in 2..=5u8 {
            let balance = sim.base_balance(&format!("acct-{id}"));
            assert_relative_eq!(balance, 1.875, epsilon = 1e-9);
        }
        assert_relative_eq!(sim.base_balance("acct-1"), 0.5, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_balanced_accounts_move_nothing() {
        let (pool, sim) = pool_and_sim(&[0.5, 1.0, 1.0]);
        let equalizer = BalanceEqualizer::new(pool, sim.clone());

        let report = equalizer.equalize(0.5).await.unwrap();
        assert!(report.transfers.is_empty());
        assert!(sim
            .calls()
            .iter()
            .all(|c| !c.starts_with("transfer")));
    }

    #[tokio::test]
    async fn test_reserve_above_total_is_insufficient_funds() {
        let (pool, sim) = pool_and_sim(&[0.1, 0.0, 0.0]);
        let equalizer = BalanceEqualizer::new(pool, sim);
        let err = equalizer.equalize(1.0).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_transfer_failures_recorded_not_fatal() {
        let (pool, sim) = pool_and_sim(&[1.0, 3.0, 0.0]);
        sim.fail_transfers(true);
        let equalizer = BalanceEqualizer::new(pool, sim.clone());

        let report = equalizer.equalize(0.0).await.unwrap();
        assert_eq!(report.success_count, 0);
        assert!(report.failure_count > 0);
        assert!(report
            .transfers
            .iter()
            .all(|t| !t.success && t.error.is_some()));
        // The starved shortfall stays visible
        assert!(report
            .transfers
            .iter()
            .any(|t| t.phase == TransferPhase::Distribute && t.account == 3));
    }

    #[tokio::test]
    async fn test_distribution_sees_post_collection_ledger_state() {
        let (pool, sim) = pool_and_sim(&[0.0, 4.0, 0.0]);
        // The collection transfer lands on the ledger but reports an error
        sim.mask_next_transfer();
        let equalizer = BalanceEqualizer::new(pool, sim.clone());

        let report = equalizer.equalize(0.0).await.unwrap();
        // total 4.0, two trading accounts
        assert_relative_eq!(report.target, 2.0, epsilon = 1e-9);
        let collect_failures = report
            .transfers
            .iter()
            .filter(|t| t.phase == TransferPhase::Collect && !t.success)
            .count();
        assert_eq!(collect_failures, 1);

        // Distribution worked off refreshed balances: the primary really
        // holds the masked collection, so the shortfall transfer succeeds
        assert!(report
            .transfers
            .iter()
            .any(|t| t.phase == TransferPhase::Distribute && t.account == 3 && t.success));
        assert_relative_eq!(sim.base_balance("acct-2"), 2.0, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-3"), 2.0, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-1"), 0.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_distribution_draws_on_primary_funds() {
        let (pool, sim) = pool_and_sim(&[2.0, 0.0, 0.0]);
        let equalizer = BalanceEqualizer::new(pool, sim.clone());

        let report = equalizer.equalize(0.5).await.unwrap();
        assert_relative_eq!(report.total_collected, 0.0);
        assert_relative_eq!(report.target, 0.75, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-2"), 0.75, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-3"), 0.75, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-1"), 0.5, epsilon = 1e-9);
    }
}
