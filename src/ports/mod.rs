//! Ports layer - trait definitions for external dependencies.
//!
//! Following hexagonal architecture, these traits abstract what the engine
//! consumes from the outside:
//! - the ledger client (balances, transfers, venue swaps, liquidity withdrawal)
//! - the price feed (price change percentage for the condition monitor)
//!
//! `sim` provides in-memory implementations used by paper mode and tests.

pub mod ledger;
pub mod price_feed;
pub mod sim;

pub use ledger::{BuyFill, LedgerClient, LedgerError, LiquidityWithdrawal, SellFill};
pub use price_feed::PriceFeed;
pub use sim::{SimLedger, SimPriceFeed};
