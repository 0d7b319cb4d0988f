//! In-memory ledger and price feed doubles.
//!
//! `SimLedger` models a single liquidity venue with the flat conversion rates
//! the paper-trading mode uses (buys fill at 0.001 base per token, sells at
//! 0.0009 to imitate slippage). It records every call and supports targeted
//! failure injection so tests can drive partial-failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::ledger::{BuyFill, LedgerClient, LedgerError, LiquidityWithdrawal, SellFill};
use super::price_feed::PriceFeed;

/// Base units received per token on a sim sell
pub const SIM_SELL_PRICE: f64 = 0.0009;
/// Base units spent per token on a sim buy
pub const SIM_BUY_PRICE: f64 = 0.001;

#[derive(Debug, Default)]
struct Venue {
    base_reserve: f64,
    token_reserve: f64,
    withdrawn: bool,
}

#[derive(Debug, Default)]
struct SimState {
    base: HashMap<String, f64>,
    tokens: HashMap<String, HashMap<String, f64>>,
    venues: HashMap<String, Venue>,
    calls: Vec<String>,
    fail_transfers: bool,
    mask_next_transfer: bool,
    fail_withdraw: bool,
    fail_swaps_for: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct SimLedger {
    state: Mutex<SimState>,
}

impl SimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with a base-asset balance
    pub fn fund(&self, pubkey: &str, amount: f64) {
        let mut s = self.state.lock().unwrap();
        *s.base.entry(pubkey.to_string()).or_insert(0.0) += amount;
    }

    /// Seed an account with a token balance
    pub fn mint_tokens(&self, token: &str, pubkey: &str, amount: f64) {
        let mut s = self.state.lock().unwrap();
        *s.tokens
            .entry(token.to_string())
            .or_default()
            .entry(pubkey.to_string())
            .or_insert(0.0) += amount;
    }

    /// Create a liquidity venue with pooled reserves
    pub fn create_venue(&self, token: &str, base_reserve: f64, token_reserve: f64) {
        let mut s = self.state.lock().unwrap();
        s.venues.insert(
            token.to_string(),
            Venue {
                base_reserve,
                token_reserve,
                withdrawn: false,
            },
        );
    }

    /// Make every subsequent transfer fail
    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().unwrap().fail_transfers = fail;
    }

    /// Make the next transfer land on the ledger but report an error, the
    /// way a dropped rpc response masks a confirmed transaction
    pub fn mask_next_transfer(&self) {
        self.state.lock().unwrap().mask_next_transfer = true;
    }

    /// Make liquidity withdrawal fail
    pub fn fail_withdraw(&self, fail: bool) {
        self.state.lock().unwrap().fail_withdraw = fail;
    }

    /// Make swaps fail for one account only
    pub fn fail_swaps_for(&self, pubkey: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_swaps_for
            .insert(pubkey.to_string());
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn base_balance(&self, pubkey: &str) -> f64 {
        *self.state.lock().unwrap().base.get(pubkey).unwrap_or(&0.0)
    }

    pub fn token_balance_of(&self, token: &str, pubkey: &str) -> f64 {
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(token)
            .and_then(|t| t.get(pubkey))
            .copied()
            .unwrap_or(0.0)
    }
}

#[async_trait::async_trait]
impl LedgerClient for SimLedger {
    async fn refresh_balance(&self, pubkey: &str) -> Result<f64, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("refresh_balance {pubkey}"));
        Ok(*s.base.get(pubkey).unwrap_or(&0.0))
    }

    async fn token_balance(&self, token: &str, pubkey: &str) -> Result<f64, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("token_balance {token} {pubkey}"));
        Ok(s.tokens
            .get(token)
            .and_then(|t| t.get(pubkey))
            .copied()
            .unwrap_or(0.0))
    }

    async fn transfer(&self, from: &str, to: &str, amount: f64) -> Result<String, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("transfer {from} -> {to} {amount:.4}"));
        if s.fail_transfers {
            return Err(LedgerError::Unavailable("transfer rpc down".to_string()));
        }
        let have = *s.base.get(from).unwrap_or(&0.0);
        if have < amount {
            return Err(LedgerError::Rejected(format!(
                "balance {have:.4} below transfer amount {amount:.4}"
            )));
        }
        *s.base.entry(from.to_string()).or_insert(0.0) -= amount;
        *s.base.entry(to.to_string()).or_insert(0.0) += amount;
        if s.mask_next_transfer {
            s.mask_next_transfer = false;
            return Err(LedgerError::Unavailable(
                "confirmation timed out".to_string(),
            ));
        }
        Ok(format!("sim-sig-{}", s.calls.len()))
    }

    async fn swap_buy(
        &self,
        token: &str,
        base_amount: f64,
        pubkey: &str,
    ) -> Result<BuyFill, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls
            .push(format!("swap_buy {token} {base_amount:.4} {pubkey}"));
        if s.fail_swaps_for.contains(pubkey) {
            return Err(LedgerError::Rejected(format!("swap rejected for {pubkey}")));
        }
        if !s.venues.contains_key(token) {
            return Err(LedgerError::Rejected(format!("no venue for {token}")));
        }
        let have = *s.base.get(pubkey).unwrap_or(&0.0);
        if have < base_amount {
            return Err(LedgerError::Rejected(format!(
                "balance {have:.4} below buy amount {base_amount:.4}"
            )));
        }
        let tokens_received = base_amount / SIM_BUY_PRICE;
        *s.base.entry(pubkey.to_string()).or_insert(0.0) -= base_amount;
        *s.tokens
            .entry(token.to_string())
            .or_default()
            .entry(pubkey.to_string())
            .or_insert(0.0) += tokens_received;
        if let Some(venue) = s.venues.get_mut(token) {
            venue.base_reserve += base_amount;
        }
        Ok(BuyFill {
            base_spent: base_amount,
            tokens_received,
            price: SIM_BUY_PRICE,
        })
    }

    async fn swap_sell(
        &self,
        token: &str,
        token_amount: f64,
        pubkey: &str,
    ) -> Result<SellFill, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls
            .push(format!("swap_sell {token} {token_amount:.4} {pubkey}"));
        if s.fail_swaps_for.contains(pubkey) {
            return Err(LedgerError::Rejected(format!("swap rejected for {pubkey}")));
        }
        if !s.venues.contains_key(token) {
            return Err(LedgerError::Rejected(format!("no venue for {token}")));
        }
        let have = s
            .tokens
            .get(token)
            .and_then(|t| t.get(pubkey))
            .copied()
            .unwrap_or(0.0);
        if have < token_amount {
            return Err(LedgerError::Rejected(format!(
                "token balance {have:.4} below sell amount {token_amount:.4}"
            )));
        }
        let proceeds = token_amount * SIM_SELL_PRICE;
        *s.tokens
            .entry(token.to_string())
            .or_default()
            .entry(pubkey.to_string())
            .or_insert(0.0) -= token_amount;
        *s.base.entry(pubkey.to_string()).or_insert(0.0) += proceeds;
        if let Some(venue) = s.venues.get_mut(token) {
            venue.token_reserve += token_amount;
        }
        Ok(SellFill {
            tokens_sold: token_amount,
            proceeds,
            price: SIM_SELL_PRICE,
        })
    }

    async fn withdraw_liquidity(&self, token: &str) -> Result<LiquidityWithdrawal, LedgerError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(format!("withdraw_liquidity {token}"));
        if s.fail_withdraw {
            return Err(LedgerError::Unavailable("withdraw rpc down".to_string()));
        }
        let venue = s
            .venues
            .get_mut(token)
            .ok_or_else(|| LedgerError::Rejected(format!("no venue for {token}")))?;
        if venue.withdrawn {
            return Err(LedgerError::Rejected(format!(
                "liquidity already withdrawn for {token}"
            )));
        }
        venue.withdrawn = true;
        let withdrawal = LiquidityWithdrawal {
            recovered_base: venue.base_reserve,
            recovered_tokens: venue.token_reserve,
        };
        venue.base_reserve = 0.0;
        venue.token_reserve = 0.0;
        Ok(withdrawal)
    }

    async fn has_venue(&self, token: &str) -> bool {
        self.state.lock().unwrap().venues.contains_key(token)
    }
}

/// Price feed double with a settable change percentage
#[derive(Debug)]
pub struct SimPriceFeed {
    change_percent: Mutex<f64>,
    fail: Mutex<bool>,
}

impl SimPriceFeed {
    pub fn new(change_percent: f64) -> Self {
        Self {
            change_percent: Mutex::new(change_percent),
            fail: Mutex::new(false),
        }
    }

    pub fn set_change_percent(&self, pct: f64) {
        *self.change_percent.lock().unwrap() = pct;
    }

    pub fn fail_next(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

impl Default for SimPriceFeed {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[async_trait::async_trait]
impl PriceFeed for SimPriceFeed {
    async fn price_change_percent(&self, _token: &str) -> Result<f64, LedgerError> {
        if *self.fail.lock().unwrap() {
            return Err(LedgerError::Unavailable("price feed down".to_string()));
        }
        Ok(*self.change_percent.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_buy_moves_balances_and_records_call() {
        let sim = SimLedger::new();
        sim.fund("acct-2", 1.0);
        sim.create_venue("MEME", 10.0, 1_000_000.0);

        let fill = sim.swap_buy("MEME", 0.05, "acct-2").await.unwrap();
        assert_relative_eq!(fill.tokens_received, 50.0);
        assert_relative_eq!(sim.base_balance("acct-2"), 0.95);
        assert_relative_eq!(sim.token_balance_of("MEME", "acct-2"), 50.0);
        assert!(sim.calls().iter().any(|c| c.starts_with("swap_buy MEME")));
    }

    #[tokio::test]
    async fn test_sell_applies_slippage_price() {
        let sim = SimLedger::new();
        sim.mint_tokens("MEME", "acct-3", 1_000.0);
        sim.create_venue("MEME", 10.0, 0.0);

        let fill = sim.swap_sell("MEME", 1_000.0, "acct-3").await.unwrap();
        assert_relative_eq!(fill.proceeds, 0.9);
        assert_relative_eq!(sim.token_balance_of("MEME", "acct-3"), 0.0);
    }

    #[tokio::test]
    async fn test_overdraw_rejected() {
        let sim = SimLedger::new();
        sim.fund("acct-2", 0.01);
        sim.create_venue("MEME", 0.0, 0.0);
        assert!(sim.swap_buy("MEME", 0.05, "acct-2").await.is_err());
    }

    #[tokio::test]
    async fn test_withdraw_liquidity_is_one_shot() {
        let sim = SimLedger::new();
        sim.create_venue("MEME", 12.5, 500.0);

        let w = sim.withdraw_liquidity("MEME").await.unwrap();
        assert_relative_eq!(w.recovered_base, 12.5);
        assert_relative_eq!(w.recovered_tokens, 500.0);
        assert!(sim.withdraw_liquidity("MEME").await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_failure_injection() {
        let sim = SimLedger::new();
        sim.fund("acct-1", 5.0);
        sim.fail_transfers(true);
        assert!(sim.transfer("acct-1", "acct-2", 1.0).await.is_err());
        sim.fail_transfers(false);
        assert!(sim.transfer("acct-1", "acct-2", 1.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_masked_transfer_lands_but_errors_once() {
        let sim = SimLedger::new();
        sim.fund("acct-1", 5.0);
        sim.mask_next_transfer();
        assert!(sim.transfer("acct-1", "acct-2", 1.0).await.is_err());
        assert_relative_eq!(sim.base_balance("acct-2"), 1.0);
        assert!(sim.transfer("acct-1", "acct-2", 1.0).await.is_ok());
        assert_relative_eq!(sim.base_balance("acct-2"), 2.0);
    }

    #[tokio::test]
    async fn test_price_feed_failure_injection() {
        let feed = SimPriceFeed::new(-12.0);
        assert_relative_eq!(feed.price_change_percent("MEME").await.unwrap(), -12.0);
        feed.fail_next(true);
        assert!(feed.price_change_percent("MEME").await.is_err());
    }
}
