//! Multi-phase value extraction.
//!
//! The terminal maneuver: halt every trade loop, dump each trading account's
//! full token position, pull the pooled liquidity, then sweep all base
//! balances into the primary account. Each phase is best effort per account
//! and the report records exactly what was recovered where.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::account::{AccountId, AccountPool};
use crate::domain::error::EngineError;
use crate::engine::equalizer::DUST_THRESHOLD;
use crate::engine::scheduler::TradeScheduler;
use crate::ports::ledger::{LedgerClient, LiquidityWithdrawal};

#[derive(Debug, Clone, Serialize)]
pub struct AccountSale {
    pub account: AccountId,
    pub tokens_sold: f64,
    pub proceeds: f64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub token: String,
    /// Trade loops cancelled before the dump
    pub sessions_stopped: usize,
    pub sales: Vec<AccountSale>,
    pub total_tokens_sold: f64,
    pub total_proceeds: f64,
    /// Sale proceeds plus recovered pool base, successes only
    pub total_recovered: f64,
    pub liquidity: Option<LiquidityWithdrawal>,
    pub liquidity_error: Option<String>,
    /// Base units swept into the primary account at the end
    pub consolidated_base: f64,
    pub failure_count: usize,
}

pub struct ExtractionOrchestrator {
    pool: Arc<AccountPool>,
    ledger: Arc<dyn LedgerClient>,
    schedulers: Vec<Arc<TradeScheduler>>,
}

impl ExtractionOrchestrator {
    pub fn new(
        pool: Arc<AccountPool>,
        ledger: Arc<dyn LedgerClient>,
        schedulers: Vec<Arc<TradeScheduler>>,
    ) -> Self {
        Self {
            pool,
            ledger,
            schedulers,
        }
    }

    /// Run the full extraction sequence against `token`.
    ///
    /// Fails up front when no liquidity venue exists for the token; past
    /// that point every phase runs to completion and failures are recorded
    /// in the report instead of aborting it.
    pub async fn extract(&self, token: &str) -> Result<ExtractionReport, EngineError> {
        if !self.ledger.has_venue(token).await {
            return Err(EngineError::NotFound(format!("liquidity venue for {token}")));
        }

        // Phase 1: halt all trade loops
        let mut sessions_stopped = 0;
        for scheduler in &self.schedulers {
            if scheduler.stop().await.is_some() {
                sessions_stopped += 1;
            }
        }
        tracing::info!(token, sessions_stopped, "extraction started");

        // Phase 2: dump every trading account's live token position
        let mut sales = Vec::new();
        let mut total_tokens_sold = 0.0;
        let mut total_proceeds = 0.0;
        for account in self.pool.trading_ids().await {
            let pubkey = match self.pool.pubkey(account).await {
                Ok(k) => k,
                Err(_) => continue,
            };
            let balance = match self.ledger.token_balance(token, &pubkey).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(account, "token balance lookup failed: {}", e);
                    sales.push(AccountSale {
                        account,
                        tokens_sold: 0.0,
                        proceeds: 0.0,
                        success: false,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };
            if balance <= 0.0 {
                // No position, still accounted for in the report
                sales.push(AccountSale {
                    account,
                    tokens_sold: 0.0,
                    proceeds: 0.0,
                    success: true,
                    error: None,
                });
                continue;
            }
            match self.ledger.swap_sell(token, balance, &pubkey).await {
                Ok(fill) => {
                    self.pool
                        .record_sell(account, token, fill.tokens_sold, fill.proceeds)
                        .await;
                    total_tokens_sold += fill.tokens_sold;
                    total_proceeds += fill.proceeds;
                    sales.push(AccountSale {
                        account,
                        tokens_sold: fill.tokens_sold,
                        proceeds: fill.proceeds,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(account, "extraction sell failed: {}", e);
                    sales.push(AccountSale {
                        account,
                        tokens_sold: balance,
                        proceeds: 0.0,
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // Phase 3: pull the pooled liquidity
        let (liquidity, liquidity_error) = match self.ledger.withdraw_liquidity(token).await {
            Ok(w) => {
                tracing::info!(
                    recovered_base = w.recovered_base,
                    recovered_tokens = w.recovered_tokens,
                    "liquidity withdrawn"
                );
                (Some(w), None)
            }
            Err(e) => {
                tracing::error!("liquidity withdrawal failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        // Phase 4: sweep everything into the primary account
        let primary = self.pool.primary_id();
        self.pool.refresh_balances(&self.ledger).await;
        let mut consolidated_base = 0.0;
        for account in self.pool.trading_ids().await {
            let balance = match self.pool.get(account).await {
                Some(a) => a.base_balance,
                None => continue,
            };
            if balance <= DUST_THRESHOLD {
                continue;
            }
            match self
                .pool
                .transfer(&self.ledger, account, primary, balance)
                .await
            {
                Ok(_) => consolidated_base += balance,
                Err(e) => tracing::warn!(account, "consolidation transfer failed: {}", e),
            }
        }

        let failure_count =
            sales.iter().filter(|s| !s.success).count() + liquidity_error.is_some() as usize;
        let total_recovered =
            total_proceeds + liquidity.as_ref().map_or(0.0, |w| w.recovered_base);
        tracing::info!(
            token,
            total_proceeds,
            total_recovered,
            consolidated_base,
            failure_count,
            "extraction complete"
        );

        Ok(ExtractionReport {
            token: token.to_string(),
            sessions_stopped,
            sales,
            total_tokens_sold,
            total_proceeds,
            total_recovered,
            liquidity,
            liquidity_error,
            consolidated_base,
            failure_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::sim::{SimLedger, SIM_SELL_PRICE};
    use approx::assert_relative_eq;

    fn setup() -> (Arc<AccountPool>, Arc<SimLedger>) {
        let sim = Arc::new(SimLedger::new());
        let entries = (1..=3)
            .map(|i| {
                let key = format!("acct-{i}");
                sim.fund(&key, 1.0);
                (format!("wallet-{i}"), key, 1.0)
            })
            .collect();
        (Arc::new(AccountPool::new(entries).unwrap()), sim)
    }

    #[tokio::test]
    async fn test_extract_without_venue_is_not_found() {
        let (pool, sim) = setup();
        let orchestrator = ExtractionOrchestrator::new(pool, sim, vec![]);
        let err = orchestrator.extract("MEME").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_full_extraction_sums_only_successes() {
        let (pool, sim) = setup();
        sim.create_venue("MEME", 7.5, 0.0);
        sim.mint_tokens("MEME", "acct-2", 1_000.0);
        sim.mint_tokens("MEME", "acct-3", 2_000.0);
        sim.fail_swaps_for("acct-3");

        let orchestrator = ExtractionOrchestrator::new(pool, sim.clone(), vec![]);
        let report = orchestrator.extract("MEME").await.unwrap();

        // Only account 2's dump succeeded
        assert_relative_eq!(report.total_tokens_sold, 1_000.0);
        assert_relative_eq!(report.total_proceeds, 1_000.0 * SIM_SELL_PRICE);
        assert_relative_eq!(
            report.total_recovered,
            1_000.0 * SIM_SELL_PRICE + 7.5,
            epsilon = 1e-9
        );
        assert_eq!(report.failure_count, 1);
        assert!(report.liquidity_error.is_none());
        assert_relative_eq!(report.liquidity.as_ref().unwrap().recovered_base, 7.5);

        // Everything swept to the primary
        assert_relative_eq!(sim.base_balance("acct-2"), 0.0, epsilon = 1e-9);
        assert_relative_eq!(sim.base_balance("acct-3"), 0.0, epsilon = 1e-9);
        assert_relative_eq!(
            sim.base_balance("acct-1"),
            1.0 + 1.0 + 1.0 + 1_000.0 * SIM_SELL_PRICE,
            epsilon = 1e-9
        );
        assert_relative_eq!(report.consolidated_base, 2.0 + 0.9, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_empty_positions_still_listed_per_account() {
        let (pool, sim) = setup();
        sim.create_venue("MEME", 5.0, 0.0);
        sim.mint_tokens("MEME", "acct-3", 100.0);

        let orchestrator = ExtractionOrchestrator::new(pool, sim.clone(), vec![]);
        let report = orchestrator.extract("MEME").await.unwrap();

        // Both trading accounts show up, including the one with no tokens
        assert_eq!(report.sales.len(), 2);
        let idle = report.sales.iter().find(|s| s.account == 2).unwrap();
        assert!(idle.success);
        assert_relative_eq!(idle.tokens_sold, 0.0);
        assert_relative_eq!(idle.proceeds, 0.0);
        assert!(idle.error.is_none());
        assert_eq!(report.failure_count, 0);
        assert_relative_eq!(report.total_tokens_sold, 100.0);
    }

    #[tokio::test]
    async fn test_withdraw_failure_recorded_and_sweep_still_runs() {
        let (pool, sim) = setup();
        sim.create_venue("MEME", 5.0, 0.0);
        sim.fail_withdraw(true);

        let orchestrator = ExtractionOrchestrator::new(pool, sim.clone(), vec![]);
        let report = orchestrator.extract("MEME").await.unwrap();

        assert!(report.liquidity.is_none());
        assert!(report.liquidity_error.is_some());
        assert_eq!(report.failure_count, 1);
        assert_relative_eq!(sim.base_balance("acct-1"), 3.0, epsilon = 1e-9);
    }
}
