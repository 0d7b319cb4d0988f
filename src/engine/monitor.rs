//! Conditional extraction trigger.
//!
//! Watches three signals on a periodic timer: the number of trades made
//! since the monitor was armed, elapsed time, and the token's price change.
//! The first condition to fire wins, in a fixed priority order, and kicks
//! off a full extraction. Evaluation errors disarm the monitor instead of
//! leaving it running blind.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::Duration;

use crate::domain::error::EngineError;
use crate::domain::task::RepeatingTask;
use crate::domain::trade::{TradeIntent, TradeObserver, TradeOutcome};
use crate::engine::extraction::{ExtractionOrchestrator, ExtractionReport};
use crate::ports::price_feed::PriceFeed;

pub const DEFAULT_EVAL_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct MonitorConditions {
    /// Trade count that trips the trigger
    pub volume_threshold: u64,
    pub time_limit_minutes: u64,
    /// Price drop, in percent, that trips the trigger
    pub drop_percent_threshold: f64,
}

impl MonitorConditions {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.time_limit_minutes == 0 {
            return Err(EngineError::Validation(
                "time limit must be at least one minute".to_string(),
            ));
        }
        if !(self.drop_percent_threshold > 0.0 && self.drop_percent_threshold <= 100.0) {
            return Err(EngineError::Validation(format!(
                "drop threshold must be in (0, 100], got {}",
                self.drop_percent_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerReason {
    Volume,
    Time,
    Drop,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Volume => write!(f, "volume"),
            TriggerReason::Time => write!(f, "time"),
            TriggerReason::Drop => write!(f, "drop"),
        }
    }
}

/// Fixed-priority condition check. Volume beats time beats drop, even when
/// several conditions hold at once.
pub fn pick_trigger(
    conditions: &MonitorConditions,
    trades: u64,
    elapsed_minutes: f64,
    change_percent: f64,
) -> Option<TriggerReason> {
    if trades >= conditions.volume_threshold {
        Some(TriggerReason::Volume)
    } else if elapsed_minutes >= conditions.time_limit_minutes as f64 {
        Some(TriggerReason::Time)
    } else if change_percent <= -conditions.drop_percent_threshold {
        Some(TriggerReason::Drop)
    } else {
        None
    }
}

/// How an armed monitor ended
#[derive(Debug, Clone, Serialize)]
pub enum MonitorOutcome {
    Triggered {
        reason: TriggerReason,
        extraction: ExtractionReport,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub token: String,
    pub conditions: MonitorConditions,
    /// Trades made since the monitor was armed
    pub volume: u64,
    pub elapsed_seconds: u64,
    pub start_time: DateTime<Utc>,
}

/// Counts every trade attempt the loops make, successful or not. Shared
/// between the schedulers (as a [`TradeObserver`]) and the monitor.
#[derive(Debug, Default)]
pub struct VolumeTracker {
    trades: Mutex<u64>,
}

impl VolumeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> u64 {
        *self.trades.lock().unwrap()
    }

    pub fn reset(&self) {
        *self.trades.lock().unwrap() = 0;
    }
}

impl TradeObserver for VolumeTracker {
    fn on_trade(&self, _outcome: &TradeOutcome) {
        *self.trades.lock().unwrap() += 1;
    }

    fn on_trade_failed(&self, _intent: &TradeIntent, _error: &str) {
        *self.trades.lock().unwrap() += 1;
    }
}

struct ActiveState {
    token: String,
    conditions: MonitorConditions,
    armed_at: Instant,
    start_time: DateTime<Utc>,
}

struct MonitorCore {
    extraction: Arc<ExtractionOrchestrator>,
    feed: Arc<dyn PriceFeed>,
    volume: Arc<VolumeTracker>,
    active: RwLock<Option<ActiveState>>,
    outcome_tx: watch::Sender<Option<MonitorOutcome>>,
}

pub struct ConditionMonitor {
    core: Arc<MonitorCore>,
    period: Duration,
    task: RwLock<Option<RepeatingTask>>,
}

impl ConditionMonitor {
    pub fn new(
        extraction: Arc<ExtractionOrchestrator>,
        feed: Arc<dyn PriceFeed>,
        volume: Arc<VolumeTracker>,
    ) -> Self {
        Self::with_period(extraction, feed, volume, DEFAULT_EVAL_PERIOD)
    }

    pub fn with_period(
        extraction: Arc<ExtractionOrchestrator>,
        feed: Arc<dyn PriceFeed>,
        volume: Arc<VolumeTracker>,
        period: Duration,
    ) -> Self {
        let (outcome_tx, _) = watch::channel(None);
        Self {
            core: Arc::new(MonitorCore {
                extraction,
                feed,
                volume,
                active: RwLock::new(None),
                outcome_tx,
            }),
            period,
            task: RwLock::new(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.core.active.read().await.is_some()
    }

    /// Watch for the monitor's terminal outcome
    pub fn subscribe(&self) -> watch::Receiver<Option<MonitorOutcome>> {
        self.core.outcome_tx.subscribe()
    }

    pub fn outcome(&self) -> Option<MonitorOutcome> {
        self.core.outcome_tx.borrow().clone()
    }

    /// Arm the monitor. Fails while already armed or on out-of-range
    /// conditions; trade counting starts from zero.
    pub async fn start(
        &self,
        token: &str,
        conditions: MonitorConditions,
    ) -> Result<(), EngineError> {
        conditions.validate()?;
        let mut active = self.core.active.write().await;
        if active.is_some() {
            return Err(EngineError::ConcurrencyConflict("monitor".to_string()));
        }
        self.core.volume.reset();
        self.core.outcome_tx.send_replace(None);
        tracing::info!(
            token,
            volume_threshold = conditions.volume_threshold,
            time_limit_minutes = conditions.time_limit_minutes,
            drop_percent_threshold = conditions.drop_percent_threshold,
            "monitor armed"
        );
        *active = Some(ActiveState {
            token: token.to_string(),
            conditions,
            armed_at: Instant::now(),
            start_time: Utc::now(),
        });
        drop(active);

        let core = self.core.clone();
        let period = self.period;
        *self.task.write().await = Some(RepeatingTask::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if evaluate(&core).await {
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Disarm without extracting. Returns whether a monitor was armed.
    pub async fn cancel(&self) -> bool {
        let was_armed = self.core.active.write().await.take().is_some();
        if let Some(task) = self.task.write().await.take() {
            task.cancel();
        }
        if was_armed {
            tracing::info!("monitor cancelled");
        }
        was_armed
    }

    pub async fn status(&self) -> Option<MonitorStatus> {
        self.core.active.read().await.as_ref().map(|s| MonitorStatus {
            token: s.token.clone(),
            conditions: s.conditions.clone(),
            volume: self.core.volume.trades(),
            elapsed_seconds: s.armed_at.elapsed().as_secs(),
            start_time: s.start_time,
        })
    }
}

/// One evaluation pass. Returns true when the monitor reached a terminal
/// state and the timer loop should stop.
async fn evaluate(core: &Arc<MonitorCore>) -> bool {
    let (token, conditions, elapsed_minutes) = {
        let active = core.active.read().await;
        let Some(state) = active.as_ref() else {
            return true;
        };
        (
            state.token.clone(),
            state.conditions.clone(),
            state.armed_at.elapsed().as_secs_f64() / 60.0,
        )
    };

    let change_percent = match core.feed.price_change_percent(&token).await {
        Ok(pct) => pct,
        Err(e) => {
            tracing::error!("price feed failed, disarming monitor: {}", e);
            *core.active.write().await = None;
            core.outcome_tx
                .send_replace(Some(MonitorOutcome::Failed {
                    error: e.to_string(),
                }));
            return true;
        }
    };

    let trades = core.volume.trades();
    let Some(reason) = pick_trigger(&conditions, trades, elapsed_minutes, change_percent) else {
        tracing::debug!(
            token = %token,
            trades,
            elapsed_minutes,
            change_percent,
            "monitor conditions not met"
        );
        return false;
    };

    tracing::warn!(token = %token, %reason, "monitor triggered, extracting");
    *core.active.write().await = None;
    let outcome = match core.extraction.extract(&token).await {
        Ok(extraction) => MonitorOutcome::Triggered { reason, extraction },
        Err(e) => MonitorOutcome::Failed {
            error: e.to_string(),
        },
    };
    core.outcome_tx.send_replace(Some(outcome));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountPool;
    use crate::ports::sim::{SimLedger, SimPriceFeed};
    use approx::assert_relative_eq;

    fn conditions(volume: u64, time: u64, drop: f64) -> MonitorConditions {
        MonitorConditions {
            volume_threshold: volume,
            time_limit_minutes: time,
            drop_percent_threshold: drop,
        }
    }

    #[test]
    fn test_priority_volume_beats_time_beats_drop() {
        let c = conditions(100, 10, 30.0);
        // All three hold
        assert_eq!(
            pick_trigger(&c, 150, 20.0, -50.0),
            Some(TriggerReason::Volume)
        );
        // Time and drop hold
        assert_eq!(pick_trigger(&c, 50, 20.0, -50.0), Some(TriggerReason::Time));
        // Drop only
        assert_eq!(pick_trigger(&c, 50, 5.0, -50.0), Some(TriggerReason::Drop));
        // Nothing holds
        assert_eq!(pick_trigger(&c, 50, 5.0, -10.0), None);
    }

    #[test]
    fn test_condition_validation() {
        assert!(conditions(0, 10, 30.0).validate().is_ok());
        assert!(conditions(100, 0, 30.0).validate().is_err());
        assert!(conditions(100, 10, 0.0).validate().is_err());
        assert!(conditions(100, 10, 150.0).validate().is_err());
        assert!(conditions(100, 10, 100.0).validate().is_ok());
    }

    fn build_monitor(
        change_percent: f64,
    ) -> (
        ConditionMonitor,
        Arc<SimLedger>,
        Arc<SimPriceFeed>,
        Arc<VolumeTracker>,
    ) {
        let sim = Arc::new(SimLedger::new());
        sim.create_venue("MEME", 5.0, 0.0);
        let entries = (1..=3)
            .map(|i| {
                let key = format!("acct-{i}");
                sim.fund(&key, 1.0);
                (format!("wallet-{i}"), key, 1.0)
            })
            .collect();
        let pool = Arc::new(AccountPool::new(entries).unwrap());
        let extraction = Arc::new(ExtractionOrchestrator::new(pool, sim.clone(), vec![]));
        let feed = Arc::new(SimPriceFeed::new(change_percent));
        let volume = Arc::new(VolumeTracker::new());
        let monitor = ConditionMonitor::with_period(
            extraction,
            feed.clone(),
            volume.clone(),
            Duration::from_millis(10),
        );
        (monitor, sim, feed, volume)
    }

    #[tokio::test]
    async fn test_double_start_conflicts() {
        let (monitor, _, _, _) = build_monitor(0.0);
        monitor.start("MEME", conditions(1_000, 60, 30.0)).await.unwrap();
        let err = monitor
            .start("MEME", conditions(1_000, 60, 30.0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
        monitor.cancel().await;
    }

    #[tokio::test]
    async fn test_cancel_when_inactive_is_false() {
        let (monitor, _, _, _) = build_monitor(0.0);
        assert!(!monitor.cancel().await);
    }

    async fn wait_for_outcome(monitor: &ConditionMonitor) {
        let mut rx = monitor.subscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if rx.borrow().is_some() {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_drop_triggers_extraction() {
        let (monitor, sim, _, _) = build_monitor(-50.0);
        monitor.start("MEME", conditions(1_000, 60, 30.0)).await.unwrap();
        wait_for_outcome(&monitor).await;

        match monitor.outcome().unwrap() {
            MonitorOutcome::Triggered { reason, extraction } => {
                assert_eq!(reason, TriggerReason::Drop);
                assert_relative_eq!(
                    extraction.liquidity.as_ref().unwrap().recovered_base,
                    5.0
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!monitor.is_active().await);
        assert!(sim.calls().iter().any(|c| c.starts_with("withdraw_liquidity")));
    }

    #[tokio::test]
    async fn test_volume_trigger_wins_over_drop() {
        let (monitor, _, _, _) = build_monitor(-50.0);
        monitor.start("MEME", conditions(0, 60, 30.0)).await.unwrap();
        wait_for_outcome(&monitor).await;
        match monitor.outcome().unwrap() {
            MonitorOutcome::Triggered { reason, .. } => {
                assert_eq!(reason, TriggerReason::Volume)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trade_count_reaches_volume_threshold() {
        use crate::domain::trade::TradeKind;

        let (monitor, _, _, volume) = build_monitor(0.0);
        monitor.start("MEME", conditions(5, 60, 30.0)).await.unwrap();

        // Ten small trades must trip a threshold of five trades, no matter
        // how little base each one moved
        for _ in 0..10 {
            volume.on_trade(&TradeOutcome {
                account: 2,
                kind: TradeKind::Buy,
                token: "MEME".to_string(),
                base_amount: 0.01,
                token_amount: 10.0,
                tax_paid: 0.0,
            });
        }
        assert_eq!(volume.trades(), 10);

        wait_for_outcome(&monitor).await;
        match monitor.outcome().unwrap() {
            MonitorOutcome::Triggered { reason, .. } => {
                assert_eq!(reason, TriggerReason::Volume)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_feed_failure_disarms() {
        let (monitor, _, feed, _) = build_monitor(0.0);
        feed.fail_next(true);
        monitor.start("MEME", conditions(1_000, 60, 30.0)).await.unwrap();
        wait_for_outcome(&monitor).await;
        assert!(matches!(
            monitor.outcome().unwrap(),
            MonitorOutcome::Failed { .. }
        ));
        assert!(!monitor.is_active().await);
    }

    #[tokio::test]
    async fn test_status_reflects_armed_state() {
        let (monitor, _, _, _) = build_monitor(0.0);
        assert!(monitor.status().await.is_none());
        monitor.start("MEME", conditions(500, 60, 30.0)).await.unwrap();
        let status = monitor.status().await.unwrap();
        assert_eq!(status.token, "MEME");
        assert_eq!(status.conditions.volume_threshold, 500);
        monitor.cancel().await;
    }
}
