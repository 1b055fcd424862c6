//! Event bus implementation.
//!
//! Delivery properties:
//! - per-publisher FIFO order within a channel
//! - at-least-once within the process; every event carries a global
//!   sequence number for idempotent consumption
//! - bounded channels; a lagging subscriber on a droppable channel loses
//!   the oldest events and a `BusOverflow` warning is published
//! - market-data and exchange-response channels are critical: sized an
//!   order of magnitude deeper, and a lag there is an error condition

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, warn};

use pmm_core::{
    BookUpdate, BusOverflow, Decision, EmergencyStop, ExchangeEvent, MarketTrade,
    OrderStateChanged, PriceUpdate, ResetTick, RiskAlert,
};

/// An event stamped with its bus-wide sequence number.
#[derive(Debug, Clone)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub payload: T,
}

/// Bus sizing configuration.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Capacity of critical channels (market data, exchange responses).
    pub critical_capacity: usize,
    /// Capacity of droppable channels (decisions, control events).
    pub control_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            critical_capacity: 4096,
            control_capacity: 256,
        }
    }
}

/// Running counters for the bus.
#[derive(Debug, Default)]
pub struct BusStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`BusStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    pub published: u64,
    pub dropped: u64,
}

impl BusStats {
    fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

struct Channel<T> {
    name: &'static str,
    critical: bool,
    tx: broadcast::Sender<Sequenced<T>>,
}

impl<T: Clone> Channel<T> {
    fn new(name: &'static str, critical: bool, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { name, critical, tx }
    }
}

/// A subscription to one event kind.
///
/// `recv` transparently absorbs lag: dropped events are counted, reported
/// through a `BusOverflow` publication, and reception continues with the
/// oldest retained event.
pub struct BusReceiver<T> {
    name: &'static str,
    critical: bool,
    rx: broadcast::Receiver<Sequenced<T>>,
    stats: Arc<BusStats>,
    seq: Arc<AtomicU64>,
    overflow_tx: Option<broadcast::Sender<Sequenced<BusOverflow>>>,
}

impl<T: Clone> BusReceiver<T> {
    /// Receive the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Sequenced<T>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.record_dropped(n);
                    pmm_telemetry::metrics::BUS_OVERFLOW_TOTAL
                        .with_label_values(&[self.name])
                        .inc_by(n as f64);
                    if self.critical {
                        error!(channel = self.name, dropped = n, "critical bus channel lagged");
                    } else {
                        warn!(channel = self.name, dropped = n, "bus channel overflow, events dropped");
                    }
                    if let Some(overflow_tx) = &self.overflow_tx {
                        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                        let _ = overflow_tx.send(Sequenced {
                            seq,
                            payload: BusOverflow {
                                channel: self.name.to_string(),
                                dropped: n,
                            },
                        });
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, `None` when the channel is currently empty
    /// or closed. Lagged events are absorbed the same way as in `recv`.
    pub fn try_recv(&mut self) -> Option<Sequenced<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.stats.record_dropped(n);
                    pmm_telemetry::metrics::BUS_OVERFLOW_TOTAL
                        .with_label_values(&[self.name])
                        .inc_by(n as f64);
                    warn!(channel = self.name, dropped = n, "bus channel overflow, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

/// The engine's event bus: one typed channel per event kind.
pub struct EventBus {
    seq: Arc<AtomicU64>,
    stats: Arc<BusStats>,
    trades: Channel<MarketTrade>,
    book_updates: Channel<BookUpdate>,
    price_updates: Channel<PriceUpdate>,
    decisions: Channel<Decision>,
    approved_decisions: Channel<Decision>,
    exchange_events: Channel<ExchangeEvent>,
    order_state: Channel<OrderStateChanged>,
    reset_ticks: Channel<ResetTick>,
    risk_alerts: Channel<RiskAlert>,
    emergency_stops: Channel<EmergencyStop>,
    overflows: Channel<BusOverflow>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let crit = config.critical_capacity;
        let ctl = config.control_capacity;
        Self {
            seq: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(BusStats::default()),
            trades: Channel::new("market_trades", true, crit),
            book_updates: Channel::new("book_updates", true, crit),
            price_updates: Channel::new("price_updates", true, crit),
            decisions: Channel::new("decisions", false, ctl),
            approved_decisions: Channel::new("approved_decisions", false, ctl),
            exchange_events: Channel::new("exchange_events", true, crit),
            order_state: Channel::new("order_state", false, ctl),
            reset_ticks: Channel::new("reset_ticks", false, ctl),
            risk_alerts: Channel::new("risk_alerts", false, ctl),
            emergency_stops: Channel::new("emergency_stops", false, ctl),
            overflows: Channel::new("bus_overflows", false, ctl),
        }
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        self.stats.snapshot()
    }

    fn publish_on<T: Clone>(&self, channel: &Channel<T>, payload: T) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.stats.record_published();
        // A send error only means no subscriber is currently attached.
        let _ = channel.tx.send(Sequenced { seq, payload });
        seq
    }

    fn subscribe_on<T: Clone>(&self, channel: &Channel<T>) -> BusReceiver<T> {
        // The overflow channel must not feed itself.
        let overflow_tx = if channel.name == self.overflows.name {
            None
        } else {
            Some(self.overflows.tx.clone())
        };
        BusReceiver {
            name: channel.name,
            critical: channel.critical,
            rx: channel.tx.subscribe(),
            stats: self.stats.clone(),
            seq: self.seq.clone(),
            overflow_tx,
        }
    }

    // === Publishers ===

    pub fn publish_trade(&self, trade: MarketTrade) -> u64 {
        self.publish_on(&self.trades, trade)
    }

    pub fn publish_book_update(&self, update: BookUpdate) -> u64 {
        self.publish_on(&self.book_updates, update)
    }

    pub fn publish_price_update(&self, update: PriceUpdate) -> u64 {
        self.publish_on(&self.price_updates, update)
    }

    pub fn publish_decision(&self, decision: Decision) -> u64 {
        self.publish_on(&self.decisions, decision)
    }

    pub fn publish_approved_decision(&self, decision: Decision) -> u64 {
        self.publish_on(&self.approved_decisions, decision)
    }

    pub fn publish_exchange_event(&self, event: ExchangeEvent) -> u64 {
        self.publish_on(&self.exchange_events, event)
    }

    pub fn publish_order_state(&self, change: OrderStateChanged) -> u64 {
        self.publish_on(&self.order_state, change)
    }

    pub fn publish_reset_tick(&self, tick: ResetTick) -> u64 {
        self.publish_on(&self.reset_ticks, tick)
    }

    pub fn publish_risk_alert(&self, alert: RiskAlert) -> u64 {
        self.publish_on(&self.risk_alerts, alert)
    }

    pub fn publish_emergency_stop(&self, stop: EmergencyStop) -> u64 {
        self.publish_on(&self.emergency_stops, stop)
    }

    // === Subscribers ===

    pub fn trades(&self) -> BusReceiver<MarketTrade> {
        self.subscribe_on(&self.trades)
    }

    pub fn book_updates(&self) -> BusReceiver<BookUpdate> {
        self.subscribe_on(&self.book_updates)
    }

    pub fn price_updates(&self) -> BusReceiver<PriceUpdate> {
        self.subscribe_on(&self.price_updates)
    }

    pub fn decisions(&self) -> BusReceiver<Decision> {
        self.subscribe_on(&self.decisions)
    }

    pub fn approved_decisions(&self) -> BusReceiver<Decision> {
        self.subscribe_on(&self.approved_decisions)
    }

    pub fn exchange_events(&self) -> BusReceiver<ExchangeEvent> {
        self.subscribe_on(&self.exchange_events)
    }

    pub fn order_state(&self) -> BusReceiver<OrderStateChanged> {
        self.subscribe_on(&self.order_state)
    }

    pub fn reset_ticks(&self) -> BusReceiver<ResetTick> {
        self.subscribe_on(&self.reset_ticks)
    }

    pub fn risk_alerts(&self) -> BusReceiver<RiskAlert> {
        self.subscribe_on(&self.risk_alerts)
    }

    pub fn emergency_stops(&self) -> BusReceiver<EmergencyStop> {
        self.subscribe_on(&self.emergency_stops)
    }

    pub fn overflows(&self) -> BusReceiver<BusOverflow> {
        self.subscribe_on(&self.overflows)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::{Price, Qty};
    use rust_decimal_macros::dec;

    fn trade(ts: u64) -> MarketTrade {
        MarketTrade {
            price: Price::new(dec!(30000)),
            quantity: Qty::new(dec!(0.1)),
            timestamp_ms: ts,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe_fifo() {
        let bus = EventBus::default();
        let mut rx = bus.trades();

        bus.publish_trade(trade(1));
        bus.publish_trade(trade(2));
        bus.publish_trade(trade(3));

        assert_eq!(rx.recv().await.unwrap().payload.timestamp_ms, 1);
        assert_eq!(rx.recv().await.unwrap().payload.timestamp_ms, 2);
        assert_eq!(rx.recv().await.unwrap().payload.timestamp_ms, 3);
    }

    #[tokio::test]
    async fn test_sequence_numbers_strictly_increase() {
        let bus = EventBus::default();
        let mut rx = bus.trades();

        bus.publish_trade(trade(1));
        bus.publish_price_update(PriceUpdate {
            value: Price::new(dec!(30000)),
            timestamp_ms: 1,
        });
        bus.publish_trade(trade(2));

        let first = rx.recv().await.unwrap().seq;
        let second = rx.recv().await.unwrap().seq;
        // The price update consumed a sequence number in between.
        assert!(second > first + 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_get_events() {
        let bus = EventBus::default();
        let mut rx1 = bus.price_updates();
        let mut rx2 = bus.price_updates();

        bus.publish_price_update(PriceUpdate {
            value: Price::new(dec!(30000)),
            timestamp_ms: 7,
        });

        assert_eq!(rx1.recv().await.unwrap().payload.timestamp_ms, 7);
        assert_eq!(rx2.recv().await.unwrap().payload.timestamp_ms, 7);
    }

    #[tokio::test]
    async fn test_overflow_publishes_warning_and_counts() {
        let bus = EventBus::new(BusConfig {
            critical_capacity: 4096,
            control_capacity: 4,
        });
        let mut decisions = bus.decisions();
        let mut overflows = bus.overflows();

        // Overrun the 4-slot decision channel while the subscriber sleeps.
        for _ in 0..16 {
            bus.publish_decision(Decision::Cancel {
                client_order_id: pmm_core::ClientOrderId::new(),
            });
        }

        // First recv absorbs the lag and reports it.
        assert!(decisions.recv().await.is_some());
        let overflow = overflows.recv().await.unwrap().payload;
        assert_eq!(overflow.channel, "decisions");
        assert!(overflow.dropped > 0);
        assert!(bus.stats().dropped > 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::default();
        let mut rx = bus.reset_ticks();
        assert!(rx.try_recv().is_none());

        bus.publish_reset_tick(ResetTick { at_ms: 5 });
        assert_eq!(rx.try_recv().unwrap().payload.at_ms, 5);
    }
}
