//! Per-token trade tax.
//!
//! Each token can carry a policy: separate flat percentages for buys and
//! sells, a collector account the levy is routed to, and an exemption set.
//! Tokens without a policy trade tax-free. Collections are tallied per token
//! with a per-side breakdown.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::account::AccountId;
use crate::domain::error::EngineError;
use crate::domain::trade::TradeKind;

pub const DEFAULT_BUY_TAX_PERCENT: f64 = 3.0;
pub const DEFAULT_SELL_TAX_PERCENT: f64 = 5.0;
/// Rates above this are clamped rather than rejected
pub const MAX_TAX_PERCENT: f64 = 99.0;

#[derive(Debug, Clone, Serialize)]
pub struct TaxPolicy {
    pub buy_percent: f64,
    pub sell_percent: f64,
    pub collector: AccountId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaxStats {
    pub total_collected: f64,
    pub total_buy_tax: f64,
    pub total_sell_tax: f64,
    pub transaction_count: u64,
    pub last_collection_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxSummary {
    pub policies: HashMap<String, TaxPolicy>,
    pub stats: HashMap<String, TaxStats>,
    pub exemptions: HashMap<String, Vec<AccountId>>,
}

pub struct TaxEngine {
    /// Default collector used by `enable`
    default_collector: AccountId,
    policies: RwLock<HashMap<String, TaxPolicy>>,
    stats: RwLock<HashMap<String, TaxStats>>,
    exempt: RwLock<HashMap<String, HashSet<AccountId>>>,
}

impl TaxEngine {
    pub fn new(default_collector: AccountId) -> Self {
        Self {
            default_collector,
            policies: RwLock::new(HashMap::new()),
            stats: RwLock::new(HashMap::new()),
            exempt: RwLock::new(HashMap::new()),
        }
    }

    /// Install the default 3%/5% policy for a token
    pub async fn enable(&self, token: &str) -> TaxPolicy {
        let policy = TaxPolicy {
            buy_percent: DEFAULT_BUY_TAX_PERCENT,
            sell_percent: DEFAULT_SELL_TAX_PERCENT,
            collector: self.default_collector,
        };
        self.policies
            .write()
            .await
            .insert(token.to_string(), policy.clone());
        tracing::info!(token, "tax enabled at default rates");
        policy
    }

    /// Remove the token's policy. Returns whether one existed.
    pub async fn disable(&self, token: &str) -> bool {
        let removed = self.policies.write().await.remove(token).is_some();
        if removed {
            tracing::info!(token, "tax disabled");
        }
        removed
    }

    /// Install or replace a token's policy. Rejects NaN and negative rates,
    /// clamps anything above [`MAX_TAX_PERCENT`].
    pub async fn set_policy(
        &self,
        token: &str,
        buy_percent: f64,
        sell_percent: f64,
        collector: AccountId,
    ) -> Result<TaxPolicy, EngineError> {
        for (name, pct) in [("buy", buy_percent), ("sell", sell_percent)] {
            if pct.is_nan() || pct < 0.0 {
                return Err(EngineError::Validation(format!(
                    "{name} tax rate must be a non-negative number, got {pct}"
                )));
            }
        }
        let policy = TaxPolicy {
            buy_percent: buy_percent.min(MAX_TAX_PERCENT),
            sell_percent: sell_percent.min(MAX_TAX_PERCENT),
            collector,
        };
        self.policies
            .write()
            .await
            .insert(token.to_string(), policy.clone());
        Ok(policy)
    }

    pub async fn policy(&self, token: &str) -> Option<TaxPolicy> {
        self.policies.read().await.get(token).cloned()
    }

    pub async fn exempt_account(&self, token: &str, account: AccountId) {
        self.exempt
            .write()
            .await
            .entry(token.to_string())
            .or_default()
            .insert(account);
    }

    pub async fn unexempt_account(&self, token: &str, account: AccountId) {
        if let Some(set) = self.exempt.write().await.get_mut(token) {
            set.remove(&account);
        }
    }

    pub async fn is_exempt(&self, token: &str, account: AccountId) -> bool {
        self.exempt
            .read()
            .await
            .get(token)
            .is_some_and(|set| set.contains(&account))
    }

    /// Tax owed on the base-asset leg of a trade. Zero when the token has no
    /// policy or the actor is exempt for it.
    pub async fn calculate_tax(
        &self,
        token: &str,
        kind: TradeKind,
        base_amount: f64,
        actor: AccountId,
    ) -> f64 {
        if self.is_exempt(token, actor).await {
            return 0.0;
        }
        let policies = self.policies.read().await;
        let Some(policy) = policies.get(token) else {
            return 0.0;
        };
        let rate = match kind {
            TradeKind::Buy => policy.buy_percent,
            TradeKind::Sell => policy.sell_percent,
        };
        base_amount * rate / 100.0
    }

    /// Tally a successfully routed collection
    pub async fn record_collection(&self, token: &str, kind: TradeKind, amount: f64) {
        let mut stats = self.stats.write().await;
        let entry = stats.entry(token.to_string()).or_default();
        entry.total_collected += amount;
        match kind {
            TradeKind::Buy => entry.total_buy_tax += amount,
            TradeKind::Sell => entry.total_sell_tax += amount,
        }
        entry.transaction_count += 1;
        entry.last_collection_time = Some(Utc::now());
    }

    pub async fn stats(&self, token: &str) -> Option<TaxStats> {
        self.stats.read().await.get(token).cloned()
    }

    pub async fn summary(&self) -> TaxSummary {
        let exemptions = self
            .exempt
            .read()
            .await
            .iter()
            .map(|(token, set)| {
                let mut accounts: Vec<AccountId> = set.iter().copied().collect();
                accounts.sort_unstable();
                (token.clone(), accounts)
            })
            .collect();
        TaxSummary {
            policies: self.policies.read().await.clone(),
            stats: self.stats.read().await.clone(),
            exemptions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_enable_installs_default_rates() {
        let tax = TaxEngine::new(1);
        let policy = tax.enable("MEME").await;
        assert_relative_eq!(policy.buy_percent, 3.0);
        assert_relative_eq!(policy.sell_percent, 5.0);
        assert_eq!(policy.collector, 1);
    }

    #[tokio::test]
    async fn test_no_policy_means_no_tax() {
        let tax = TaxEngine::new(1);
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Sell, 100.0, 2).await,
            0.0
        );
        tax.enable("MEME").await;
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Sell, 100.0, 2).await,
            5.0
        );
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Buy, 100.0, 2).await,
            3.0
        );
        // Other tokens are still untaxed
        assert_relative_eq!(
            tax.calculate_tax("OTHER", TradeKind::Sell, 100.0, 2).await,
            0.0
        );
    }

    #[tokio::test]
    async fn test_exemption_is_per_token() {
        let tax = TaxEngine::new(1);
        tax.enable("MEME").await;
        tax.enable("OTHER").await;
        tax.exempt_account("MEME", 3).await;

        assert!(tax.is_exempt("MEME", 3).await);
        assert!(!tax.is_exempt("OTHER", 3).await);
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Sell, 100.0, 3).await,
            0.0
        );
        assert_relative_eq!(
            tax.calculate_tax("OTHER", TradeKind::Sell, 100.0, 3).await,
            5.0
        );

        tax.unexempt_account("MEME", 3).await;
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Sell, 100.0, 3).await,
            5.0
        );
    }

    #[tokio::test]
    async fn test_set_policy_clamps_and_validates() {
        let tax = TaxEngine::new(1);
        let policy = tax.set_policy("MEME", 150.0, 10.0, 2).await.unwrap();
        assert_relative_eq!(policy.buy_percent, 99.0);
        assert_relative_eq!(policy.sell_percent, 10.0);
        assert_eq!(policy.collector, 2);

        assert!(tax.set_policy("MEME", -1.0, 5.0, 1).await.is_err());
        assert!(tax.set_policy("MEME", 5.0, f64::NAN, 1).await.is_err());
        // Failed update leaves the installed policy untouched
        assert_relative_eq!(tax.policy("MEME").await.unwrap().buy_percent, 99.0);
    }

    #[tokio::test]
    async fn test_disable_removes_policy() {
        let tax = TaxEngine::new(1);
        tax.enable("MEME").await;
        assert!(tax.disable("MEME").await);
        assert!(!tax.disable("MEME").await);
        assert_relative_eq!(
            tax.calculate_tax("MEME", TradeKind::Sell, 100.0, 2).await,
            0.0
        );
    }

    #[tokio::test]
    async fn test_collection_book_per_token_and_side() {
        let tax = TaxEngine::new(1);
        tax.record_collection("MEME", TradeKind::Sell, 0.5).await;
        tax.record_collection("MEME", TradeKind::Buy, 0.25).await;
        tax.record_collection("OTHER", TradeKind::Buy, 1.0).await;

        let stats = tax.stats("MEME").await.unwrap();
        assert_relative_eq!(stats.total_collected, 0.75);
        assert_relative_eq!(stats.total_buy_tax, 0.25);
        assert_relative_eq!(stats.total_sell_tax, 0.5);
        assert_eq!(stats.transaction_count, 2);
        assert!(stats.last_collection_time.is_some());
        assert!(tax.stats("MISSING").await.is_none());
    }
}
