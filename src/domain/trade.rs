//! Trade vocabulary shared by the scheduler and extraction flows.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::account::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Buy => write!(f, "buy"),
            TradeKind::Sell => write!(f, "sell"),
        }
    }
}

/// A trade the scheduler decided to attempt
#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    pub account: AccountId,
    pub kind: TradeKind,
    pub token: String,
    /// Base units for a buy, token units for a sell
    pub amount: f64,
}

/// Result of one executed trade, as seen by observers
#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub account: AccountId,
    pub kind: TradeKind,
    pub token: String,
    /// Base units moved by the trade
    pub base_amount: f64,
    /// Token units moved by the trade
    pub token_amount: f64,
    pub tax_paid: f64,
}

/// Running totals for one trading session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub buys: u64,
    pub sells: u64,
    pub failures: u64,
    pub base_spent: f64,
    pub base_received: f64,
    pub tax_collected: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    /// Fresh totals stamped with the session start
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Attempts made this session, failed ones included
    pub fn total_trades(&self) -> u64 {
        self.buys + self.sells + self.failures
    }

    pub fn record(&mut self, outcome: &TradeOutcome) {
        match outcome.kind {
            TradeKind::Buy => {
                self.buys += 1;
                self.base_spent += outcome.base_amount;
            }
            TradeKind::Sell => {
                self.sells += 1;
                self.base_received += outcome.base_amount;
            }
        }
        self.tax_collected += outcome.tax_paid;
        self.last_trade_at = Some(Utc::now());
    }
}

/// Hook for components that react to trade activity, such as the
/// volume-tracking side of the condition monitor. Observers hear about
/// failed attempts too, with a no-op default.
pub trait TradeObserver: Send + Sync {
    fn on_trade(&self, outcome: &TradeOutcome);

    fn on_trade_failed(&self, _intent: &TradeIntent, _error: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stats_accumulate_by_kind() {
        let mut stats = SessionStats::default();
        stats.record(&TradeOutcome {
            account: 2,
            kind: TradeKind::Buy,
            token: "MEME".into(),
            base_amount: 0.05,
            token_amount: 50.0,
            tax_paid: 0.0015,
        });
        stats.record(&TradeOutcome {
            account: 3,
            kind: TradeKind::Sell,
            token: "MEME".into(),
            base_amount: 0.02,
            token_amount: 22.2,
            tax_paid: 0.001,
        });

        assert_eq!(stats.total_trades(), 2);
        assert_eq!(stats.buys, 1);
        assert_eq!(stats.sells, 1);

        // Failed attempts count toward the total
        stats.failures += 1;
        assert_eq!(stats.total_trades(), 3);
        assert_relative_eq!(stats.base_spent, 0.05);
        assert_relative_eq!(stats.base_received, 0.02);
        assert_relative_eq!(stats.tax_collected, 0.0025);
        assert!(stats.last_trade_at.is_some());
    }

    #[test]
    fn test_started_now_stamps_start() {
        let stats = SessionStats::started_now();
        assert!(stats.started_at.is_some());
        assert!(stats.last_trade_at.is_none());
        assert_eq!(stats.total_trades(), 0);
    }

    #[test]
    fn test_trade_kind_display() {
        assert_eq!(TradeKind::Buy.to_string(), "buy");
        assert_eq!(TradeKind::Sell.to_string(), "sell");
    }
}
