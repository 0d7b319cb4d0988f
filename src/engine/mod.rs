//! Application layer: the engine facade over the trading components.

pub mod equalizer;
pub mod extraction;
pub mod monitor;
pub mod scheduler;

pub use equalizer::{BalanceEqualizer, EqualizationReport, TransferPhase, TransferRecord};
pub use extraction::{AccountSale, ExtractionOrchestrator, ExtractionReport};
pub use monitor::{
    ConditionMonitor, MonitorConditions, MonitorOutcome, MonitorStatus, TriggerReason,
    VolumeTracker,
};
pub use scheduler::{TradeScheduler, TradingProfile};

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Duration;

use crate::config::Config;
use crate::domain::account::{AccountPool, PoolSummary};
use crate::domain::error::EngineError;
use crate::domain::tax::{TaxEngine, TaxSummary};
use crate::domain::trade::{SessionStats, TradeObserver};
use crate::ports::ledger::LedgerClient;
use crate::ports::price_feed::PriceFeed;

/// One status snapshot across every component, for the status command
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub token: String,
    pub pool: PoolSummary,
    pub trading_active: bool,
    pub trading: SessionStats,
    pub chart_active: bool,
    pub chart: SessionStats,
    pub tax: TaxSummary,
    pub monitor: Option<MonitorStatus>,
}

/// Owns and wires every component. One instance per process; nothing is
/// persisted, a restart starts from the configured pool.
pub struct Engine {
    token: String,
    reserve: f64,
    monitor_defaults: MonitorConditions,
    pool: Arc<AccountPool>,
    tax: Arc<TaxEngine>,
    trading: Arc<TradeScheduler>,
    chart: Arc<TradeScheduler>,
    equalizer: BalanceEqualizer,
    extraction: Arc<ExtractionOrchestrator>,
    monitor: ConditionMonitor,
}

impl Engine {
    pub async fn new(
        config: &Config,
        ledger: Arc<dyn LedgerClient>,
        feed: Arc<dyn PriceFeed>,
    ) -> Result<Self, EngineError> {
        let token = config.trading.token.clone();
        let entries = (1..=config.accounts.count)
            .map(|i| {
                let name = format!("{}-{}", config.accounts.label_prefix, i);
                (name.clone(), name, config.accounts.initial_balance)
            })
            .collect();
        let pool = Arc::new(AccountPool::new(entries)?);

        let tax = Arc::new(TaxEngine::new(pool.primary_id()));
        if config.tax.enabled {
            tax.set_policy(
                &token,
                config.tax.buy_percent,
                config.tax.sell_percent,
                pool.primary_id(),
            )
            .await?;
        }

        let volume = Arc::new(VolumeTracker::new());
        let observers: Vec<Arc<dyn TradeObserver>> = vec![volume.clone()];

        let trading = Arc::new(TradeScheduler::new(
            pool.clone(),
            ledger.clone(),
            tax.clone(),
            token.clone(),
            config.trading.profile(),
            "trading",
            observers.clone(),
        ));
        let chart = Arc::new(TradeScheduler::new(
            pool.clone(),
            ledger.clone(),
            tax.clone(),
            token.clone(),
            config.chart.profile(),
            "chart activity",
            observers,
        ));

        let equalizer = BalanceEqualizer::new(pool.clone(), ledger.clone());
        let extraction = Arc::new(ExtractionOrchestrator::new(
            pool.clone(),
            ledger,
            vec![trading.clone(), chart.clone()],
        ));
        let monitor = ConditionMonitor::with_period(
            extraction.clone(),
            feed,
            volume,
            Duration::from_secs(config.monitor.eval_period_secs),
        );

        Ok(Self {
            token,
            reserve: config.equalizer.reserve,
            monitor_defaults: MonitorConditions {
                volume_threshold: config.monitor.volume_threshold,
                time_limit_minutes: config.monitor.time_limit_minutes,
                drop_percent_threshold: config.monitor.drop_percent_threshold,
            },
            pool,
            tax,
            trading,
            chart,
            equalizer,
            extraction,
            monitor,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }

    pub fn tax(&self) -> &Arc<TaxEngine> {
        &self.tax
    }

    pub fn monitor(&self) -> &ConditionMonitor {
        &self.monitor
    }

    pub async fn start_trading(&self) -> Result<(), EngineError> {
        self.trading.start().await
    }

    pub async fn stop_trading(&self) -> Option<SessionStats> {
        self.trading.stop().await
    }

    pub async fn start_chart(&self) -> Result<(), EngineError> {
        self.chart.start().await
    }

    pub async fn stop_chart(&self) -> Option<SessionStats> {
        self.chart.stop().await
    }

    pub async fn equalize(&self, reserve: Option<f64>) -> Result<EqualizationReport, EngineError> {
        self.equalizer
            .equalize(reserve.unwrap_or(self.reserve))
            .await
    }

    pub async fn extract(&self) -> Result<ExtractionReport, EngineError> {
        self.extraction.extract(&self.token).await
    }

    /// Arm the monitor, falling back to the configured thresholds
    pub async fn start_monitor(
        &self,
        conditions: Option<MonitorConditions>,
    ) -> Result<(), EngineError> {
        self.monitor
            .start(&self.token, conditions.unwrap_or_else(|| self.monitor_defaults.clone()))
            .await
    }

    pub async fn cancel_monitor(&self) -> bool {
        self.monitor.cancel().await
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            token: self.token.clone(),
            pool: self.pool.summary().await,
            trading_active: self.trading.is_active().await,
            trading: self.trading.stats().await,
            chart_active: self.chart.is_active().await,
            chart: self.chart.stats().await,
            tax: self.tax.summary().await,
            monitor: self.monitor.status().await,
        }
    }

    /// Stop every loop and the monitor. Used on shutdown.
    pub async fn shutdown(&self) {
        self.trading.stop().await;
        self.chart.stop().await;
        self.monitor.cancel().await;
        tracing::info!("engine shut down");
    }
}
