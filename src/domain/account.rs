//! Account pool.
//!
//! A fixed set of identity-bound funds holders created at process start. The
//! first account is the primary: it collects during equalization, receives
//! extraction proceeds and acts as the default tax collector. Cached balances
//! are mutated only through pool operations; live values come from the ledger
//! client on refresh.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::error::EngineError;
use crate::ports::ledger::LedgerClient;

pub type AccountId = u8;

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub label: String,
    /// Identity handle on the external ledger
    pub pubkey: String,
    /// Cached base-asset balance
    pub base_balance: f64,
    /// Cached token balances by mint
    pub token_balances: HashMap<String, f64>,
}

/// Aggregate snapshot for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub account_count: usize,
    pub total_base: f64,
    pub accounts: Vec<Account>,
}

pub struct AccountPool {
    accounts: RwLock<Vec<Account>>,
    primary: AccountId,
}

impl AccountPool {
    /// Build the pool from (label, pubkey, initial balance) triples.
    /// The first entry becomes the primary account.
    pub fn new(entries: Vec<(String, String, f64)>) -> Result<Self, EngineError> {
        if entries.len() < 2 {
            return Err(EngineError::Validation(format!(
                "pool needs at least 2 accounts, got {}",
                entries.len()
            )));
        }
        let accounts = entries
            .into_iter()
            .enumerate()
            .map(|(i, (label, pubkey, balance))| Account {
                id: (i + 1) as AccountId,
                label,
                pubkey,
                base_balance: balance,
                token_balances: HashMap::new(),
            })
            .collect::<Vec<_>>();
        let primary = accounts[0].id;
        Ok(Self {
            accounts: RwLock::new(accounts),
            primary,
        })
    }

    pub fn primary_id(&self) -> AccountId {
        self.primary
    }

    pub async fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub async fn pubkey(&self, id: AccountId) -> Result<String, EngineError> {
        self.get(id)
            .await
            .map(|a| a.pubkey)
            .ok_or_else(|| EngineError::NotFound(format!("account {id}")))
    }

    pub async fn list(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    /// Ids of the non-primary (trading) accounts
    pub async fn trading_ids(&self) -> Vec<AccountId> {
        self.accounts
            .read()
            .await
            .iter()
            .filter(|a| a.id != self.primary)
            .map(|a| a.id)
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn total_base(&self) -> f64 {
        self.accounts
            .read()
            .await
            .iter()
            .map(|a| a.base_balance)
            .sum()
    }

    /// Refresh cached base balances from the ledger. Best effort: one
    /// account's failure is logged and the rest are still refreshed.
    pub async fn refresh_balances(&self, ledger: &Arc<dyn LedgerClient>) {
        let keys: Vec<(AccountId, String)> = self
            .accounts
            .read()
            .await
            .iter()
            .map(|a| (a.id, a.pubkey.clone()))
            .collect();

        for (id, pubkey) in keys {
            match ledger.refresh_balance(&pubkey).await {
                Ok(balance) => {
                    let mut accounts = self.accounts.write().await;
                    if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
                        account.base_balance = balance;
                    }
                }
                Err(e) => {
                    tracing::warn!("balance refresh failed for account {}: {}", id, e);
                }
            }
        }
    }

    /// Transfer base asset between two pool accounts through the ledger.
    ///
    /// Pre-flight: rejects with `InsufficientFunds` when the cached source
    /// balance is already known to be below `amount`, before any external
    /// call.
    pub async fn transfer(
        &self,
        ledger: &Arc<dyn LedgerClient>,
        from: AccountId,
        to: AccountId,
        amount: f64,
    ) -> Result<String, EngineError> {
        let (from_key, have) = {
            let accounts = self.accounts.read().await;
            let src = accounts
                .iter()
                .find(|a| a.id == from)
                .ok_or_else(|| EngineError::NotFound(format!("account {from}")))?;
            accounts
                .iter()
                .find(|a| a.id == to)
                .ok_or_else(|| EngineError::NotFound(format!("account {to}")))?;
            (src.pubkey.clone(), src.base_balance)
        };
        if have < amount {
            return Err(EngineError::InsufficientFunds { have, need: amount });
        }

        let to_key = self.pubkey(to).await?;
        let signature = ledger
            .transfer(&from_key, &to_key, amount)
            .await
            .map_err(|e| EngineError::ExternalCall(e.to_string()))?;

        let mut accounts = self.accounts.write().await;
        if let Some(src) = accounts.iter_mut().find(|a| a.id == from) {
            src.base_balance -= amount;
        }
        if let Some(dst) = accounts.iter_mut().find(|a| a.id == to) {
            dst.base_balance += amount;
        }
        Ok(signature)
    }

    /// Apply a buy fill to the cached balances
    pub async fn record_buy(&self, id: AccountId, token: &str, base_spent: f64, tokens: f64) {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.base_balance -= base_spent;
            *account
                .token_balances
                .entry(token.to_string())
                .or_insert(0.0) += tokens;
        }
    }

    /// Apply a sell fill to the cached balances
    pub async fn record_sell(&self, id: AccountId, token: &str, tokens_sold: f64, proceeds: f64) {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.iter_mut().find(|a| a.id == id) {
            account.base_balance += proceeds;
            *account
                .token_balances
                .entry(token.to_string())
                .or_insert(0.0) -= tokens_sold;
        }
    }

    pub async fn summary(&self) -> PoolSummary {
        let accounts = self.accounts.read().await.clone();
        PoolSummary {
            account_count: accounts.len(),
            total_base: accounts.iter().map(|a| a.base_balance).sum(),
            accounts,
        }
    }
}
