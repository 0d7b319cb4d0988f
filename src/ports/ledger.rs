//! Ledger client port.
//!
//! Everything the engine needs from the outside world to move funds: balance
//! reads, transfers between pool accounts, venue swaps and liquidity
//! withdrawal. Transaction construction and signing live behind this trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The venue or ledger rejected the operation (bad balance, bad params)
    #[error("ledger rejected: {0}")]
    Rejected(String),

    /// Transport-level failure talking to the ledger
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Fill from a base-asset -> token swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyFill {
    pub base_spent: f64,
    pub tokens_received: f64,
    pub price: f64,
}

/// Fill from a token -> base-asset swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellFill {
    pub tokens_sold: f64,
    pub proceeds: f64,
    pub price: f64,
}

/// Result of draining a venue's pooled liquidity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityWithdrawal {
    pub recovered_base: f64,
    pub recovered_tokens: f64,
}

#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch the live base-asset balance for an account
    async fn refresh_balance(&self, pubkey: &str) -> Result<f64, LedgerError>;

    /// Fetch the live token balance for an account
    async fn token_balance(&self, token: &str, pubkey: &str) -> Result<f64, LedgerError>;

    /// Move base asset between two pool accounts, returns the signature
    async fn transfer(&self, from: &str, to: &str, amount: f64) -> Result<String, LedgerError>;

    /// Spend `base_amount` buying `token` for the given account
    async fn swap_buy(
        &self,
        token: &str,
        base_amount: f64,
        pubkey: &str,
    ) -> Result<BuyFill, LedgerError>;

    /// Sell `token_amount` of `token` from the given account
    async fn swap_sell(
        &self,
        token: &str,
        token_amount: f64,
        pubkey: &str,
    ) -> Result<SellFill, LedgerError>;

    /// Drain the pooled liquidity position for `token`
    async fn withdraw_liquidity(&self, token: &str) -> Result<LiquidityWithdrawal, LedgerError>;

    /// Whether a liquidity venue exists for `token`
    async fn has_venue(&self, token: &str) -> bool;
}
