//! Application wiring.
//!
//! Builds the bus, the components, and their task loops; owns shutdown.
//! Components hold no references to each other; everything flows through
//! typed bus channels, with the order manager's read view injected where
//! the strategy and risk gate need snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pmm_bus::{BusConfig, EventBus};
use pmm_core::Decision;
use pmm_exec::{DynExchangeAdapter, ExecutionEngine, PaperExchange};
use pmm_orders::OrderManager;
use pmm_price::ReferencePriceEstimator;
use pmm_risk::RiskGate;
use pmm_strategy::StrategyEngine;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::scheduler;

/// How long shutdown waits for the live pool to drain.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The assembled engine.
pub struct Application {
    config: AppConfig,
    bus: Arc<EventBus>,
    manager: Arc<OrderManager>,
    adapter: DynExchangeAdapter,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Application {
    /// Build the engine with the adapter chosen by configuration.
    ///
    /// The live exchange adapter is an external collaborator; without one
    /// injected, paper mode runs against the in-process exchange.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        if !config.api.testnet {
            warn!("no live exchange adapter wired, falling back to paper trading");
        }
        Self::with_adapter(config, Arc::new(PaperExchange::new()))
    }

    /// Build the engine around an injected exchange adapter.
    pub fn with_adapter(config: AppConfig, adapter: DynExchangeAdapter) -> AppResult<Self> {
        config.validate()?;
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        let manager = Arc::new(OrderManager::new(config.order_management.clone(), bus.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            manager,
            adapter,
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        })
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn manager(&self) -> Arc<OrderManager> {
        self.manager.clone()
    }

    /// Spawn every component task. Market data may flow once this returns.
    pub async fn start(&mut self) {
        info!(symbol = %self.config.strategy.symbol, "starting engine");

        let estimator = ReferencePriceEstimator::new(self.config.price.clone());
        self.handles.push(tokio::spawn(pmm_price::run_estimator(
            estimator,
            self.bus.clone(),
            self.shutdown_rx.clone(),
        )));

        let strategy = StrategyEngine::new(self.config.strategy.clone());
        self.handles.push(tokio::spawn(pmm_strategy::run_strategy(
            strategy,
            self.manager.clone(),
            self.bus.clone(),
            self.shutdown_rx.clone(),
        )));

        let gate = RiskGate::new(self.config.risk.clone());
        self.handles.push(tokio::spawn(pmm_risk::run_risk_gate(
            gate,
            self.manager.clone(),
            self.bus.clone(),
            Duration::from_secs(self.config.risk.check_interval.max(1)),
            self.shutdown_rx.clone(),
        )));

        self.handles.push(tokio::spawn(pmm_orders::run_order_manager(
            self.manager.clone(),
            self.bus.clone(),
            Duration::from_secs(self.config.order_management.cleanup_interval.max(1)),
            self.shutdown_rx.clone(),
        )));

        let execution = ExecutionEngine::new(
            self.config.execution.clone(),
            self.config.strategy.symbol.clone(),
            self.adapter.clone(),
            self.manager.clone(),
            self.bus.clone(),
        );
        self.handles.push(tokio::spawn(pmm_exec::run_execution(
            execution,
            self.shutdown_rx.clone(),
        )));

        self.handles.push(tokio::spawn(scheduler::run_reset_scheduler(
            self.manager.clone(),
            self.bus.clone(),
            Duration::from_secs(self.config.order_management.reset_interval.max(1)),
            self.shutdown_rx.clone(),
        )));

        // Let every task reach its subscription point before events flow.
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!("engine started");
    }

    /// Graceful teardown: cancel the live pool, wait for the drain, then
    /// stop every task. In-flight exchange calls complete before their
    /// workers exit.
    pub async fn shutdown(self) {
        info!("shutting down: flushing live orders");
        for order in self.manager.non_terminal_orders() {
            if order.is_live() {
                self.bus.publish_approved_decision(Decision::Cancel {
                    client_order_id: order.client_order_id,
                });
            }
        }

        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.manager.active_order_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let leftover = self.manager.active_order_count();
        if leftover > 0 {
            warn!(leftover, "shutdown drain timed out with orders still open");
        }

        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        let stats = self.bus.stats();
        info!(
            published = stats.published,
            dropped = stats.dropped,
            "engine stopped"
        );
    }
}
