//! Price feed port.
//!
//! The condition monitor reads the token's price change from here; trade
//! counts are tracked internally from observed trades, not fetched.

use super::ledger::LedgerError;

#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    /// Price change since venue creation, in percent (negative = drop)
    async fn price_change_percent(&self, token: &str) -> Result<f64, LedgerError>;
}
