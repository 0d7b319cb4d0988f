//! Randomized trade loops.
//!
//! One scheduler owns one repeating session: when started it spawns a single
//! loop that each tick picks a random trading account, flips a weighted coin,
//! executes the resulting buy or sell through the ledger, levies tax on the
//! base leg and feeds the fill to registered observers. Failed trades are
//! counted and the loop keeps going. A second scheduler instance with the
//! chart profile drives the slower price-support pattern.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Duration;

use crate::domain::account::{AccountId, AccountPool};
use crate::domain::error::EngineError;
use crate::domain::task::RepeatingTask;
use crate::domain::tax::TaxEngine;
use crate::domain::trade::{SessionStats, TradeIntent, TradeKind, TradeObserver, TradeOutcome};
use crate::ports::ledger::LedgerClient;

/// Knobs for one loop flavor. Delay fields are (min, max) ranges drawn per
/// sleep; equal bounds give a fixed period.
#[derive(Debug, Clone, Serialize)]
pub struct TradingProfile {
    /// Probability a tick buys instead of sells
    pub buy_weight: f64,
    /// Base units per buy
    pub buy_min: f64,
    pub buy_max: f64,
    /// Fraction of the account's token balance sold per sell
    pub sell_fraction_min: f64,
    pub sell_fraction_max: f64,
    pub initial_delay_ms: (u64, u64),
    pub tick_delay_ms: (u64, u64),
}

impl TradingProfile {
    /// The default high-churn pattern
    pub fn normal() -> Self {
        Self {
            buy_weight: 0.7,
            buy_min: 0.01,
            buy_max: 0.05,
            sell_fraction_min: 0.10,
            sell_fraction_max: 0.50,
            initial_delay_ms: (5_000, 15_000),
            tick_delay_ms: (30_000, 90_000),
        }
    }

    /// The slow buy-leaning pattern that keeps the chart moving. First tick
    /// fires immediately, then every ten minutes.
    pub fn chart() -> Self {
        Self {
            buy_weight: 0.6,
            buy_min: 0.005,
            buy_max: 0.02,
            sell_fraction_min: 0.05,
            sell_fraction_max: 0.15,
            initial_delay_ms: (0, 0),
            tick_delay_ms: (600_000, 600_000),
        }
    }
}

struct SchedulerCore {
    pool: Arc<AccountPool>,
    ledger: Arc<dyn LedgerClient>,
    tax: Arc<TaxEngine>,
    token: String,
    observers: Vec<Arc<dyn TradeObserver>>,
    stats: RwLock<SessionStats>,
}

pub struct TradeScheduler {
    core: Arc<SchedulerCore>,
    profile: TradingProfile,
    /// Used in conflict errors and logs
    label: &'static str,
    task: RwLock<Option<RepeatingTask>>,
}

impl TradeScheduler {
    pub fn new(
        pool: Arc<AccountPool>,
        ledger: Arc<dyn LedgerClient>,
        tax: Arc<TaxEngine>,
        token: String,
        profile: TradingProfile,
        label: &'static str,
        observers: Vec<Arc<dyn TradeObserver>>,
    ) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                pool,
                ledger,
                tax,
                token,
                observers,
                stats: RwLock::new(SessionStats::default()),
            }),
            profile,
            label,
            task: RwLock::new(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.task.read().await.is_some()
    }

    pub async fn stats(&self) -> SessionStats {
        self.core.stats.read().await.clone()
    }

    /// Start the session loop; each tick trades through a uniformly random
    /// trading account. Fails with a conflict while a session is already
    /// running, and up front when the token has no liquidity venue to trade
    /// against.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut task = self.task.write().await;
        if task.is_some() {
            return Err(EngineError::ConcurrencyConflict(self.label.to_string()));
        }
        if !self.core.ledger.has_venue(&self.core.token).await {
            return Err(EngineError::NotFound(format!(
                "liquidity venue for {}",
                self.core.token
            )));
        }
        let accounts = self.core.pool.trading_ids().await;
        if accounts.is_empty() {
            return Err(EngineError::Validation(
                "no trading accounts to run".to_string(),
            ));
        }
        *self.core.stats.write().await = SessionStats::started_now();

        tracing::info!(
            label = self.label,
            accounts = accounts.len(),
            "starting trade loop"
        );
        let core = self.core.clone();
        let profile = self.profile.clone();
        *task = Some(RepeatingTask::spawn(async move {
            tokio::time::sleep(draw_delay(profile.initial_delay_ms)).await;
            loop {
                let account = {
                    let mut rng = rand::thread_rng();
                    accounts[rng.gen_range(0..accounts.len())]
                };
                run_tick(&core, account, &profile).await;
                tokio::time::sleep(draw_delay(profile.tick_delay_ms)).await;
            }
        }));
        Ok(())
    }

    /// Cancel the loop. Returns the session totals, or `None` when no
    /// session was running.
    pub async fn stop(&self) -> Option<SessionStats> {
        let task = self.task.write().await.take()?;
        task.cancel();
        let stats = self.core.stats.read().await.clone();
        tracing::info!(
            label = self.label,
            trades = stats.total_trades(),
            failures = stats.failures,
            "trade loop stopped"
        );
        Some(stats)
    }
}

fn draw_delay((min, max): (u64, u64)) -> Duration {
    let ms = if min >= max {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    Duration::from_millis(ms)
}

async fn run_tick(core: &Arc<SchedulerCore>, account: AccountId, profile: &TradingProfile) {
    // Draw everything up front so the rng is not held across awaits
    let (want_buy, buy_amount, sell_fraction) = {
        let mut rng = rand::thread_rng();
        (
            rng.gen_bool(profile.buy_weight),
            rng.gen_range(profile.buy_min..=profile.buy_max),
            rng.gen_range(profile.sell_fraction_min..=profile.sell_fraction_max),
        )
    };
    let kind = if want_buy {
        TradeKind::Buy
    } else {
        TradeKind::Sell
    };
    execute_trade(core, account, kind, buy_amount, sell_fraction).await;
}

/// Execute one trade intent against the ledger. A sell against an empty
/// token balance falls back to a buy so the tick still produces volume.
async fn execute_trade(
    core: &Arc<SchedulerCore>,
    account: AccountId,
    kind: TradeKind,
    buy_amount: f64,
    sell_fraction: f64,
) -> Option<TradeOutcome> {
    let pubkey = match core.pool.pubkey(account).await {
        Ok(k) => k,
        Err(e) => {
            tracing::warn!("tick skipped: {}", e);
            return None;
        }
    };

    let mut kind = kind;
    let mut sell_amount = 0.0;
    if kind == TradeKind::Sell {
        match core.ledger.token_balance(&core.token, &pubkey).await {
            Ok(balance) if balance > 0.0 => sell_amount = balance * sell_fraction,
            Ok(_) => {
                tracing::debug!(account, "no tokens to sell, buying instead");
                kind = TradeKind::Buy;
            }
            Err(e) => {
                tracing::warn!(account, "token balance lookup failed: {}", e);
                record_failure(core, account, kind, sell_fraction, &e.to_string()).await;
                return None;
            }
        }
    }

    let result = match kind {
        TradeKind::Buy => core
            .ledger
            .swap_buy(&core.token, buy_amount, &pubkey)
            .await
            .map(|fill| (fill.base_spent, fill.tokens_received)),
        TradeKind::Sell => core
            .ledger
            .swap_sell(&core.token, sell_amount, &pubkey)
            .await
            .map(|fill| (fill.proceeds, fill.tokens_sold)),
    };

    let (base_amount, token_amount) = match result {
        Ok(amounts) => amounts,
        Err(e) => {
            tracing::warn!(account, %kind, "trade failed: {}", e);
            let attempted = match kind {
                TradeKind::Buy => buy_amount,
                TradeKind::Sell => sell_amount,
            };
            record_failure(core, account, kind, attempted, &e.to_string()).await;
            return None;
        }
    };

    match kind {
        TradeKind::Buy => {
            core.pool
                .record_buy(account, &core.token, base_amount, token_amount)
                .await
        }
        TradeKind::Sell => {
            core.pool
                .record_sell(account, &core.token, token_amount, base_amount)
                .await
        }
    }

    let tax_paid = collect_tax(core, account, kind, base_amount).await;

    let outcome = TradeOutcome {
        account,
        kind,
        token: core.token.clone(),
        base_amount,
        token_amount,
        tax_paid,
    };
    core.stats.write().await.record(&outcome);
    for observer in &core.observers {
        observer.on_trade(&outcome);
    }
    tracing::debug!(
        account,
        %kind,
        base_amount,
        token_amount,
        tax_paid,
        "trade filled"
    );
    Some(outcome)
}

async fn record_failure(
    core: &Arc<SchedulerCore>,
    account: AccountId,
    kind: TradeKind,
    amount: f64,
    error: &str,
) {
    core.stats.write().await.failures += 1;
    let intent = TradeIntent {
        account,
        kind,
        token: core.token.clone(),
        amount,
    };
    for observer in &core.observers {
        observer.on_trade_failed(&intent, error);
    }
}

/// Levy tax on the base leg and route it to the collector. Routing is best
/// effort: a failed transfer is logged and the trade still stands.
async fn collect_tax(
    core: &Arc<SchedulerCore>,
    account: AccountId,
    kind: TradeKind,
    base_amount: f64,
) -> f64 {
    let owed = core
        .tax
        .calculate_tax(&core.token, kind, base_amount, account)
        .await;
    if owed <= 0.0 {
        return 0.0;
    }
    let Some(policy) = core.tax.policy(&core.token).await else {
        return 0.0;
    };
    if policy.collector == account {
        return 0.0;
    }
    match core
        .pool
        .transfer(&core.ledger, account, policy.collector, owed)
        .await
    {
        Ok(_) => {
            core.tax.record_collection(&core.token, kind, owed).await;
            owed
        }
        Err(e) => {
            tracing::warn!(account, "tax routing failed: {}", e);
            0.0
        }
    }
}
