//! Decision dispatch, worker pools, and retry handling.
//!
//! The dispatcher routes approved decisions into two queues: places and
//! cancels share the transactional pool, amends get their own pool so a
//! burst of amendments can never starve a cancel. Each pool draws from its
//! own token bucket. Workers translate every exchange response into exactly
//! one `ExchangeEvent` publication.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pmm_bus::EventBus;
use pmm_core::{ClientOrderId, Decision, ExchangeEvent, Order, OrderStatus};
use pmm_orders::{AmendSubmission, OrderManager};
use pmm_telemetry::metrics;

use crate::adapter::{DynExchangeAdapter, ExchangeError, PlaceRequest};
use crate::config::ExecutionConfig;
use crate::limiter::TokenBucket;

#[derive(Debug, Clone)]
enum ExecTask {
    Place(ClientOrderId),
    Cancel(ClientOrderId),
    Amend(ClientOrderId),
}

impl ExecTask {
    fn operation(&self) -> &'static str {
        match self {
            Self::Place(_) => "place",
            Self::Cancel(_) => "cancel",
            Self::Amend(_) => "amend",
        }
    }
}

struct WorkerCtx {
    config: ExecutionConfig,
    adapter: DynExchangeAdapter,
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    limiter: TokenBucket,
}

/// The execution engine.
pub struct ExecutionEngine {
    config: ExecutionConfig,
    symbol: String,
    adapter: DynExchangeAdapter,
    manager: Arc<OrderManager>,
    bus: Arc<EventBus>,
    halted: Arc<AtomicBool>,
}

impl ExecutionEngine {
    pub fn new(
        config: ExecutionConfig,
        symbol: String,
        adapter: DynExchangeAdapter,
        manager: Arc<OrderManager>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            symbol,
            adapter,
            manager,
            bus,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn worker_ctx(&self, limiter: TokenBucket) -> WorkerCtx {
        WorkerCtx {
            config: self.config.clone(),
            adapter: self.adapter.clone(),
            manager: self.manager.clone(),
            bus: self.bus.clone(),
            limiter,
        }
    }
}

/// Run the execution engine until shutdown: spawns both worker pools and
/// drives the dispatcher loop.
pub async fn run_execution(engine: ExecutionEngine, shutdown: watch::Receiver<bool>) {
    let queue_depth = engine.config.batch_size.max(1);
    let (txn_tx, txn_rx) = mpsc::channel::<ExecTask>(queue_depth);
    let (amend_tx, amend_rx) = mpsc::channel::<ExecTask>(queue_depth);

    let txn_ctx = Arc::new(engine.worker_ctx(TokenBucket::new(engine.config.rate_limit)));
    let amend_ctx = Arc::new(engine.worker_ctx(TokenBucket::new(engine.config.modify_rate_limit)));

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    let txn_rx = Arc::new(Mutex::new(txn_rx));
    for _ in 0..engine.config.worker_count.max(1) {
        workers.push(tokio::spawn(worker_loop(
            txn_ctx.clone(),
            txn_rx.clone(),
            shutdown.clone(),
        )));
    }
    let amend_rx = Arc::new(Mutex::new(amend_rx));
    for _ in 0..engine.config.modify_worker_count.max(1) {
        workers.push(tokio::spawn(worker_loop(
            amend_ctx.clone(),
            amend_rx.clone(),
            shutdown.clone(),
        )));
    }

    dispatcher_loop(&engine, txn_tx, amend_tx, shutdown).await;

    for worker in workers {
        let _ = worker.await;
    }
    info!("execution engine stopped");
}

async fn dispatcher_loop(
    engine: &ExecutionEngine,
    txn_tx: mpsc::Sender<ExecTask>,
    amend_tx: mpsc::Sender<ExecTask>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut approved = engine.bus.approved_decisions();
    let mut emergency = engine.bus.emergency_stops();

    info!(
        workers = engine.config.worker_count,
        amend_workers = engine.config.modify_worker_count,
        "execution engine started"
    );
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = emergency.recv() => {
                let Some(event) = event else { break };
                warn!(reason = %event.payload.reason, "execution halting non-cancel intake");
                engine.halted.store(true, Ordering::Release);
            }
            event = approved.recv() => {
                let Some(event) = event else { break };
                dispatch(engine, &txn_tx, &amend_tx, event.payload).await;
            }
        }
    }
}

async fn dispatch(
    engine: &ExecutionEngine,
    txn_tx: &mpsc::Sender<ExecTask>,
    amend_tx: &mpsc::Sender<ExecTask>,
    decision: Decision,
) {
    let halted = engine.halted.load(Ordering::Acquire);
    match decision {
        Decision::Place {
            side,
            price,
            quantity,
        } => {
            if halted {
                debug!("halted: dropping place decision");
                return;
            }
            let order = Order::new(
                ClientOrderId::new(),
                engine.symbol.clone(),
                side,
                price,
                quantity,
            );
            let id = order.client_order_id.clone();
            if let Err(err) = engine.manager.insert_pending(order) {
                warn!(%err, "could not register new order");
                return;
            }
            let _ = txn_tx.send(ExecTask::Place(id)).await;
        }
        Decision::Cancel { client_order_id } => {
            match engine.manager.submit_cancel(&client_order_id) {
                Ok(_) => {
                    let _ = txn_tx.send(ExecTask::Cancel(client_order_id)).await;
                }
                Err(err) => debug!(%err, "dropping cancel decision"),
            }
        }
        Decision::Amend {
            client_order_id,
            new_price,
            new_quantity,
        } => {
            if halted {
                debug!("halted: dropping amend decision");
                return;
            }
            let target = pmm_core::AmendTarget {
                price: new_price,
                quantity: new_quantity,
            };
            match engine.manager.submit_amend(&client_order_id, target) {
                Ok(AmendSubmission::Submitted(_)) => {
                    let _ = amend_tx.send(ExecTask::Amend(client_order_id)).await;
                }
                Ok(AmendSubmission::NoChange) => {
                    debug!(id = %client_order_id, "amend target matches resting order");
                }
                Err(err) => {
                    // The strategy re-plans this order as cancel+place on
                    // its next cycle.
                    warn!(%err, id = %client_order_id, "amend refused by order manager");
                }
            }
        }
    }
}

async fn worker_loop(
    ctx: Arc<WorkerCtx>,
    queue: Arc<Mutex<mpsc::Receiver<ExecTask>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let task = {
            let mut rx = queue.lock().await;
            tokio::select! {
                _ = shutdown.changed() => return,
                task = rx.recv() => match task {
                    Some(task) => task,
                    None => return,
                },
            }
        };
        execute_with_retries(&ctx, task).await;
    }
}

/// Ceiling on any single exchange round-trip.
const EXCHANGE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one task against the exchange, retrying transient failures with
/// exponential backoff. Exactly one `ExchangeEvent` is published per task
/// unless the order vanished underneath it.
async fn execute_with_retries(ctx: &WorkerCtx, task: ExecTask) {
    let mut rate_limit_requeued = false;
    let mut attempt: u32 = 0;

    loop {
        ctx.limiter.acquire().await;

        let result = match tokio::time::timeout(EXCHANGE_CALL_TIMEOUT, execute_once(ctx, &task)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Transient("exchange call timed out".to_string())),
        };
        let err = match result {
            Ok(Some(event)) => {
                ctx.bus.publish_exchange_event(event);
                return;
            }
            // The order resolved some other way while the task was queued.
            Ok(None) => return,
            Err(err) => err,
        };

        match err {
            ExchangeError::RateLimited => {
                ctx.limiter.penalize();
                // Requeued once without counting against the retry budget.
                if !rate_limit_requeued {
                    rate_limit_requeued = true;
                    continue;
                }
            }
            ExchangeError::Permanent(ref reason) => {
                warn!(operation = task.operation(), %reason, "permanent exchange failure");
                publish_reject(ctx, &task, reason.clone());
                return;
            }
            ExchangeError::Transient(_) => {}
        }

        if attempt >= ctx.config.max_retries {
            warn!(
                operation = task.operation(),
                attempts = attempt + 1,
                "retries exhausted"
            );
            publish_reject(ctx, &task, format!("retries exhausted: {err}"));
            return;
        }

        let delay = ctx.config.retry_delay * 2f64.powi(attempt as i32);
        metrics::EXEC_RETRIES_TOTAL
            .with_label_values(&[task.operation()])
            .inc();
        debug!(
            operation = task.operation(),
            attempt, delay, "transient failure, backing off"
        );
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        attempt += 1;
    }
}

/// One exchange round-trip. `Ok(None)` means the task is moot (the order is
/// gone or no longer in the expected state).
async fn execute_once(
    ctx: &WorkerCtx,
    task: &ExecTask,
) -> Result<Option<ExchangeEvent>, ExchangeError> {
    match task {
        ExecTask::Place(id) => {
            let Some(order) = ctx.manager.get(id) else {
                return Ok(None);
            };
            if order.status != OrderStatus::PendingNew {
                return Ok(None);
            }
            let ack = ctx
                .adapter
                .place(PlaceRequest {
                    symbol: order.symbol.clone(),
                    side: order.side,
                    price: order.price,
                    quantity: order.original_quantity,
                    client_order_id: id.clone(),
                })
                .await?;
            Ok(Some(ExchangeEvent::OrderAck {
                client_order_id: id.clone(),
                order_id: ack.order_id,
            }))
        }
        ExecTask::Cancel(id) => {
            let Some(order) = ctx.manager.get(id) else {
                return Ok(None);
            };
            if order.status != OrderStatus::PendingCancel {
                return Ok(None);
            }
            let Some(order_id) = order.order_id else {
                // No exchange id yet; the ack may still be on the wire.
                return Err(ExchangeError::Transient(
                    "cancel before exchange id assigned".to_string(),
                ));
            };
            ctx.adapter.cancel(&order_id).await?;
            Ok(Some(ExchangeEvent::CancelAck {
                client_order_id: id.clone(),
            }))
        }
        ExecTask::Amend(id) => {
            let Some(order) = ctx.manager.get(id) else {
                return Ok(None);
            };
            let (Some(target), Some(order_id)) = (order.pending_amend, order.order_id) else {
                return Ok(None);
            };
            if order.status != OrderStatus::PendingAmend {
                return Ok(None);
            }
            ctx.adapter
                .amend(&order_id, target.price, target.quantity)
                .await?;
            Ok(Some(ExchangeEvent::AmendAck {
                client_order_id: id.clone(),
            }))
        }
    }
}

fn publish_reject(ctx: &WorkerCtx, task: &ExecTask, reason: String) {
    let event = match task {
        ExecTask::Place(id) => ExchangeEvent::OrderReject {
            client_order_id: id.clone(),
            reason,
        },
        ExecTask::Cancel(id) => ExchangeEvent::CancelReject {
            client_order_id: id.clone(),
            reason,
        },
        ExecTask::Amend(id) => ExchangeEvent::AmendReject {
            client_order_id: id.clone(),
            reason,
        },
    };
    ctx.bus.publish_exchange_event(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PaperExchange;
    use pmm_core::{OrderSide, Price, Qty};
    use pmm_orders::OrderManagementConfig;
    use rust_decimal_macros::dec;

    fn ctx(adapter: Arc<PaperExchange>, config: ExecutionConfig) -> (Arc<WorkerCtx>, Arc<OrderManager>, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let manager = Arc::new(OrderManager::new(
            OrderManagementConfig::default(),
            bus.clone(),
        ));
        let rate = config.rate_limit;
        let ctx = Arc::new(WorkerCtx {
            config,
            adapter,
            manager: manager.clone(),
            bus: bus.clone(),
            limiter: TokenBucket::new(rate),
        });
        (ctx, manager, bus)
    }

    fn pending_order(manager: &OrderManager) -> ClientOrderId {
        let order = Order::new(
            ClientOrderId::new(),
            "BTCUSDT".to_string(),
            OrderSide::Buy,
            Price::new(dec!(29910)),
            Qty::new(dec!(0.5)),
        );
        let id = order.client_order_id.clone();
        manager.insert_pending(order).unwrap();
        id
    }

    #[tokio::test]
    async fn test_place_publishes_ack() {
        let exchange = Arc::new(PaperExchange::new());
        let (ctx, manager, bus) = ctx(exchange.clone(), ExecutionConfig::default());
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        execute_with_retries(&ctx, ExecTask::Place(id.clone())).await;

        let event = events.try_recv().unwrap().payload;
        assert!(matches!(event, ExchangeEvent::OrderAck { client_order_id, .. } if client_order_id == id));
        assert_eq!(exchange.placed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_then_succeed() {
        // S6: two network errors then success; the order ends up acked.
        let exchange = Arc::new(PaperExchange::new());
        exchange.fail_places_with([
            ExchangeError::Transient("net".to_string()),
            ExchangeError::Transient("net".to_string()),
        ]);
        let (ctx, manager, bus) = ctx(exchange.clone(), ExecutionConfig::default());
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        let start = tokio::time::Instant::now();
        execute_with_retries(&ctx, ExecTask::Place(id.clone())).await;

        let event = events.try_recv().unwrap().payload;
        assert!(matches!(event, ExchangeEvent::OrderAck { .. }));
        // P8: backoff 0.5 * 2^0 + 0.5 * 2^1 = 1.5s minimum.
        assert!(start.elapsed() >= Duration::from_millis(1400));
        assert_eq!(exchange.placed().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_publishes_reject() {
        let exchange = Arc::new(PaperExchange::new());
        exchange.fail_places_with(
            std::iter::repeat(ExchangeError::Transient("net".to_string())).take(10),
        );
        let config = ExecutionConfig {
            max_retries: 2,
            ..ExecutionConfig::default()
        };
        let (ctx, manager, bus) = ctx(exchange, config);
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        execute_with_retries(&ctx, ExecTask::Place(id.clone())).await;

        let event = events.try_recv().unwrap().payload;
        assert!(matches!(event, ExchangeEvent::OrderReject { .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_rejects_without_retry() {
        let exchange = Arc::new(PaperExchange::new());
        exchange.fail_places_with([ExchangeError::Permanent("bad params".to_string())]);
        let (ctx, manager, bus) = ctx(exchange.clone(), ExecutionConfig::default());
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        execute_with_retries(&ctx, ExecTask::Place(id)).await;

        let event = events.try_recv().unwrap().payload;
        assert!(matches!(event, ExchangeEvent::OrderReject { reason, .. } if reason.contains("bad params")));
        // Never reached the book.
        assert!(exchange.placed().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_refusal_requeues_once_and_penalizes() {
        let exchange = Arc::new(PaperExchange::new());
        exchange.fail_places_with([ExchangeError::RateLimited]);
        let (ctx, manager, bus) = ctx(exchange.clone(), ExecutionConfig::default());
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        execute_with_retries(&ctx, ExecTask::Place(id)).await;

        let event = events.try_recv().unwrap().payload;
        assert!(matches!(event, ExchangeEvent::OrderAck { .. }));
        assert_eq!(exchange.placed().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_task_is_moot() {
        let exchange = Arc::new(PaperExchange::new());
        let (ctx, manager, bus) = ctx(exchange.clone(), ExecutionConfig::default());
        let mut events = bus.exchange_events();

        let id = pending_order(&manager);
        // The order was rejected before the worker got to it.
        manager.apply_exchange_event(&ExchangeEvent::OrderReject {
            client_order_id: id.clone(),
            reason: "balance".to_string(),
        });
        execute_with_retries(&ctx, ExecTask::Place(id)).await;

        assert!(events.try_recv().is_none());
        assert!(exchange.placed().is_empty());
    }
}
