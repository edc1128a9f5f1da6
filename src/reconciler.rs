use crate::allocation::plan_allocation;
use crate::broker::{BrokerEvent, BrokerTransport};
use crate::config::{LiveConfig, StrategyConfig};
use crate::error::TransportError;
use crate::models::{Bar, DailySignal, Order, OrderSide, TargetAllocation};
use crate::retry::backoff_delay;
use crate::signals::latest_signal;
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Disconnected,
    Connected,
    AwaitingHistory,
    Ready,
    Submitting,
    Idle,
}

impl ReconcilerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilerState::Disconnected => "disconnected",
            ReconcilerState::Connected => "connected",
            ReconcilerState::AwaitingHistory => "awaiting_history",
            ReconcilerState::Ready => "ready",
            ReconcilerState::Submitting => "submitting",
            ReconcilerState::Idle => "idle",
        }
    }
}

/// What one refresh cycle decided.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub allocation: TargetAllocation,
    pub orders: Vec<Order>,
    /// Symbols excluded from this cycle because their history failed or
    /// timed out.
    pub excluded: Vec<String>,
}

enum IdleOutcome {
    Refresh,
    Disconnected,
    Stop,
}

/// Converges broker holdings to the target allocation, one refresh cycle at
/// a time.
///
/// Each cycle starts from a broker-reported position snapshot (never an
/// assumed-empty book), fans out one history request per symbol, computes
/// signals from whatever arrived before the gate timeout, and submits the
/// minimal diff as market orders in lexical symbol order. Local memory is
/// only used to dedupe submissions within a cycle; the broker snapshot is
/// the ground truth between cycles.
pub struct LiveReconciler<T: BrokerTransport> {
    transport: T,
    strategy: StrategyConfig,
    live: LiveConfig,
    state: ReconcilerState,
    owned: BTreeMap<String, bool>,
    submitted_this_cycle: HashSet<(String, OrderSide)>,
    /// Symbols the broker does not know; excluded until configuration
    /// changes, logged once.
    unavailable: BTreeSet<String>,
    history: HashMap<String, Vec<Bar>>,
}

impl<T: BrokerTransport> LiveReconciler<T> {
    pub fn new(transport: T, strategy: StrategyConfig, live: LiveConfig) -> Self {
        Self {
            transport,
            strategy,
            live,
            state: ReconcilerState::Disconnected,
            owned: BTreeMap::new(),
            submitted_this_cycle: HashSet::new(),
            unavailable: BTreeSet::new(),
            history: HashMap::new(),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn owns(&self, symbol: &str) -> bool {
        self.owned.get(symbol).copied().unwrap_or(false)
    }

    pub fn is_unavailable(&self, symbol: &str) -> bool {
        self.unavailable.contains(symbol)
    }

    /// Runs refresh cycles until the stop signal fires. A disconnect at any
    /// point falls back to the reconnect loop; a stop abandons pending work
    /// without submitting further orders. Orders already submitted remain
    /// the broker's responsibility.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> anyhow::Result<()> {
        'reconnect: loop {
            if *stop.borrow() {
                break;
            }
            if !self.connect_with_backoff(&mut stop).await {
                break;
            }
            self.set_state(ReconcilerState::Connected);

            loop {
                self.begin_cycle();
                let cycle = tokio::select! {
                    result = self.run_cycle() => result,
                    _ = wait_for_stop(&mut stop) => {
                        info!("Stop requested; abandoning cycle in flight");
                        break 'reconnect;
                    }
                };
                match cycle {
                    Ok(outcome) => {
                        info!(
                            "Cycle complete: {} order{} submitted, {} invested weight, {} symbol{} excluded",
                            outcome.orders.len(),
                            if outcome.orders.len() == 1 { "" } else { "s" },
                            outcome.allocation.invested(),
                            outcome.excluded.len(),
                            if outcome.excluded.len() == 1 { "" } else { "s" },
                        );
                    }
                    Err(err) => {
                        warn!("Cycle aborted: {}; reconnecting", err);
                        self.set_state(ReconcilerState::Disconnected);
                        continue 'reconnect;
                    }
                }

                match self.idle_until_refresh(&mut stop).await {
                    IdleOutcome::Refresh => {}
                    IdleOutcome::Disconnected => {
                        warn!("Broker session dropped while idle; reconnecting");
                        self.set_state(ReconcilerState::Disconnected);
                        continue 'reconnect;
                    }
                    IdleOutcome::Stop => break 'reconnect,
                }
            }
        }

        info!("Reconciler stopped; submitted orders remain with the broker");
        Ok(())
    }

    /// Retries the transport connect with capped exponential backoff.
    /// Returns false when stopped before a connection was established.
    pub async fn connect_with_backoff(&mut self, stop: &mut watch::Receiver<bool>) -> bool {
        let mut attempt = 0u32;
        loop {
            if *stop.borrow() {
                return false;
            }
            match self.transport.connect().await {
                Ok(()) => {
                    info!("Connected to broker gateway");
                    return true;
                }
                Err(err) => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Connect attempt {} failed: {}. Retrying in {}s.",
                        attempt + 1,
                        err,
                        delay.as_secs()
                    );
                    attempt += 1;
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = wait_for_stop(stop) => return false,
                    }
                }
            }
        }
    }

    /// Clears the per-cycle dedupe and history buffers. Called once per
    /// scheduled refresh; a reentrant trigger that skips this keeps the
    /// dedupe set and cannot double-submit.
    pub fn begin_cycle(&mut self) {
        self.submitted_this_cycle.clear();
        self.history.clear();
    }

    /// One full refresh: positions snapshot, history fan-out with a bounded
    /// gate, signal + allocation computation, diff-driven submissions.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, TransportError> {
        self.set_state(ReconcilerState::AwaitingHistory);

        self.transport.request_positions();
        let positions = self.await_positions().await?;
        self.owned = self
            .strategy
            .universe
            .iter()
            .map(|symbol| {
                let owned = positions
                    .iter()
                    .any(|position| &position.symbol == symbol && position.owned);
                (symbol.clone(), owned)
            })
            .collect();

        let mut pending: BTreeSet<String> = self
            .strategy
            .universe
            .iter()
            .filter(|symbol| !self.unavailable.contains(*symbol))
            .cloned()
            .collect();
        for symbol in &pending {
            self.transport
                .request_history(symbol, self.live.history_lookback_days);
        }

        let mut excluded = Vec::new();
        let deadline = Instant::now() + self.live.history_timeout;
        while !pending.is_empty() {
            let event = match timeout_at(deadline, self.transport.recv_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(TransportError::Network(
                        "broker event stream closed".to_string(),
                    ));
                }
                Err(_) => break,
            };
            match event {
                BrokerEvent::HistoryBars { symbol, bars } => {
                    if pending.remove(&symbol) {
                        self.history.insert(symbol, bars);
                    }
                }
                BrokerEvent::HistoryFailed { symbol, error } => {
                    if pending.remove(&symbol) {
                        warn!("History request failed for {}: {}", symbol, error);
                        if error.is_permanent() {
                            warn!(
                                "Excluding {} until the configured universe changes",
                                symbol
                            );
                            self.unavailable.insert(symbol.clone());
                        }
                        excluded.push(symbol);
                    }
                }
                BrokerEvent::Disconnected => {
                    return Err(TransportError::Network(
                        "disconnected while awaiting history".to_string(),
                    ));
                }
                other => self.apply_async_event(other),
            }
        }
        for symbol in std::mem::take(&mut pending) {
            warn!(
                "History for {} timed out after {}s; excluded this cycle",
                symbol,
                self.live.history_timeout.as_secs()
            );
            excluded.push(symbol);
        }

        self.set_state(ReconcilerState::Ready);
        let mut latest: HashMap<String, DailySignal> = HashMap::new();
        for (symbol, bars) in &self.history {
            match latest_signal(bars, self.strategy.window) {
                Some(signal) => {
                    latest.insert(symbol.clone(), signal);
                }
                None => {
                    warn!(
                        "Insufficient history for {} ({} bars, need {}); no stance this cycle",
                        symbol,
                        bars.len(),
                        self.strategy.window
                    );
                }
            }
        }
        let allocation = plan_allocation(&latest, &self.strategy.universe);

        self.set_state(ReconcilerState::Submitting);
        let orders = self.plan_orders(&latest, &allocation);
        for order in &orders {
            info!(
                "Submitting {} {} (client id {})",
                order.side, order.symbol, order.client_order_id
            );
            self.transport.place_order(order);
        }
        self.set_state(ReconcilerState::Idle);

        Ok(CycleOutcome {
            allocation,
            orders,
            excluded,
        })
    }

    /// Diffs the target allocation against broker-reported ownership.
    ///
    /// A symbol with no defined signal this cycle is unknown, and unknown
    /// never trades — neither a buy nor a sell. At most one submission per
    /// (symbol, side) survives the dedupe set within a cycle.
    fn plan_orders(
        &mut self,
        latest: &HashMap<String, DailySignal>,
        allocation: &TargetAllocation,
    ) -> Vec<Order> {
        let mut orders = Vec::new();
        for symbol in &self.strategy.universe {
            if !latest.contains_key(symbol) {
                continue;
            }
            let owned = self.owned.get(symbol).copied().unwrap_or(false);
            let target = allocation.weight(symbol);
            let side = if target > 0.0 && !owned {
                OrderSide::Buy
            } else if target == 0.0 && owned {
                OrderSide::Sell
            } else {
                continue;
            };

            let key = (symbol.clone(), side);
            if self.submitted_this_cycle.contains(&key) {
                info!("Suppressing duplicate {} {} within this cycle", side, symbol);
                continue;
            }
            self.submitted_this_cycle.insert(key);
            orders.push(Order::market(symbol, side, self.live.order_notional));
        }
        orders
    }

    async fn await_positions(&mut self) -> Result<Vec<crate::models::Position>, TransportError> {
        let deadline = Instant::now() + self.live.history_timeout;
        loop {
            let event = match timeout_at(deadline, self.transport.recv_event()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Err(TransportError::Network(
                        "broker event stream closed".to_string(),
                    ));
                }
                Err(_) => return Err(TransportError::Timeout("positions".to_string())),
            };
            match event {
                BrokerEvent::Positions(positions) => return Ok(positions),
                BrokerEvent::Disconnected => {
                    return Err(TransportError::Network(
                        "disconnected while awaiting positions".to_string(),
                    ));
                }
                other => self.apply_async_event(other),
            }
        }
    }

    /// Handles events that arrive outside the gates: fills flip the owned
    /// cache, rejects leave it unchanged so the next cycle retries the diff.
    fn apply_async_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::OrderAccepted { symbol, side } => {
                info!("Order accepted: {} {}", side, symbol);
            }
            BrokerEvent::OrderRejected {
                symbol,
                side,
                reason,
            } => {
                warn!(
                    "Order rejected: {} {} ({}); holdings unchanged, next cycle retries",
                    side, symbol, reason
                );
            }
            BrokerEvent::Filled { symbol, side } => {
                let owned = side == OrderSide::Buy;
                info!("Fill confirmed: {} {} (owned={})", side, symbol, owned);
                self.owned.insert(symbol, owned);
            }
            BrokerEvent::Positions(positions) => {
                // Unsolicited snapshot; still authoritative.
                for symbol in self.strategy.universe.clone() {
                    let owned = positions
                        .iter()
                        .any(|position| position.symbol == symbol && position.owned);
                    self.owned.insert(symbol, owned);
                }
            }
            BrokerEvent::HistoryBars { symbol, .. }
            | BrokerEvent::HistoryFailed { symbol, .. } => {
                // Stale answer from an abandoned cycle.
                info!("Ignoring late history response for {}", symbol);
            }
            BrokerEvent::Disconnected => {}
        }
    }

    async fn idle_until_refresh(&mut self, stop: &mut watch::Receiver<bool>) -> IdleOutcome {
        self.set_state(ReconcilerState::Idle);
        let deadline = Instant::now() + self.live.refresh_interval;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return IdleOutcome::Refresh,
                _ = wait_for_stop(stop) => return IdleOutcome::Stop,
                event = self.transport.recv_event() => match event {
                    Some(BrokerEvent::Disconnected) | None => return IdleOutcome::Disconnected,
                    Some(other) => self.apply_async_event(other),
                },
            }
        }
    }

    fn set_state(&mut self, next: ReconcilerState) {
        if self.state != next {
            info!("Reconciler {} -> {}", self.state.as_str(), next.as_str());
            self.state = next;
        }
    }
}

async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedTransport {
        events: VecDeque<BrokerEvent>,
        orders: Vec<Order>,
        history_requests: Vec<String>,
        connect_failures: usize,
        connect_attempts: usize,
    }

    impl ScriptedTransport {
        fn new(events: Vec<BrokerEvent>) -> Self {
            Self {
                events: events.into(),
                orders: Vec::new(),
                history_requests: Vec::new(),
                connect_failures: 0,
                connect_attempts: 0,
            }
        }

        fn push_events(&mut self, events: Vec<BrokerEvent>) {
            self.events.extend(events);
        }
    }

    impl BrokerTransport for ScriptedTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            self.connect_attempts += 1;
            if self.connect_attempts <= self.connect_failures {
                return Err(TransportError::ConnRefused("scripted refusal".to_string()));
            }
            Ok(())
        }

        fn request_positions(&mut self) {}

        fn request_history(&mut self, symbol: &str, _lookback_days: u32) {
            self.history_requests.push(symbol.to_string());
        }

        fn place_order(&mut self, order: &Order) {
            self.orders.push(order.clone());
        }

        async fn recv_event(&mut self) -> Option<BrokerEvent> {
            match self.events.pop_front() {
                Some(event) => Some(event),
                // Nothing scripted: behave like a quiet connection so gate
                // timeouts, not stream closure, decide the outcome.
                None => std::future::pending().await,
            }
        }
    }

    const WINDOW: usize = 3;

    fn strategy(universe: &[&str]) -> StrategyConfig {
        StrategyConfig {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            benchmark: "SPY".to_string(),
            window: WINDOW,
            display_window: 2,
        }
    }

    fn live() -> LiveConfig {
        LiveConfig {
            refresh_interval: Duration::from_secs(3600),
            history_lookback_days: 30,
            history_timeout: Duration::from_millis(200),
            order_notional: 500.0,
        }
    }

    fn bars(symbol: &str, closes: &[f64]) -> Vec<Bar> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                symbol: symbol.to_string(),
                date: base + ChronoDuration::days(i as i64),
                close,
            })
            .collect()
    }

    fn above_bars(symbol: &str) -> Vec<Bar> {
        bars(symbol, &[10.0, 11.0, 12.0, 13.0])
    }

    fn below_bars(symbol: &str) -> Vec<Bar> {
        bars(symbol, &[13.0, 12.0, 11.0, 10.0])
    }

    fn position(symbol: &str) -> Position {
        Position {
            symbol: symbol.to_string(),
            shares: 10,
            owned: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn diff_emits_exactly_the_minimal_order_set() {
        // Target {A: 1/3, B: 0, C: 1/3} against holdings {A, B}: A is
        // converged, B must be sold, C must be bought.
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(vec![position("A"), position("B")]),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
            BrokerEvent::HistoryBars {
                symbol: "B".to_string(),
                bars: below_bars("B"),
            },
            BrokerEvent::HistoryBars {
                symbol: "C".to_string(),
                bars: above_bars("C"),
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A", "B", "C"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();

        let submitted: Vec<(String, OrderSide)> = outcome
            .orders
            .iter()
            .map(|order| (order.symbol.clone(), order.side))
            .collect();
        assert_eq!(
            submitted,
            vec![
                ("B".to_string(), OrderSide::Sell),
                ("C".to_string(), OrderSide::Buy)
            ]
        );
        assert!((outcome.allocation.weight("A") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(outcome.allocation.weight("B"), 0.0);
        assert!(outcome.excluded.is_empty());
        assert_eq!(reconciler.state(), ReconcilerState::Idle);
        assert_eq!(reconciler.transport.orders.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_trigger_within_a_cycle_submits_once() {
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.begin_cycle();
        let first = reconciler.run_cycle().await.unwrap();
        assert_eq!(first.orders.len(), 1);

        // Reentrant refresh: same cycle (no begin_cycle), fresh events.
        reconciler.transport.push_events(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
        ]);
        let second = reconciler.run_cycle().await.unwrap();
        assert!(second.orders.is_empty(), "dedupe must suppress the buy");
        assert_eq!(reconciler.transport.orders.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_symbol_is_excluded_without_aborting_the_cycle() {
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
            // B never answers.
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A", "B"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();

        assert_eq!(outcome.excluded, vec!["B".to_string()]);
        assert_eq!(outcome.orders.len(), 1);
        assert_eq!(outcome.orders[0].symbol, "A");
        // B is only excluded for this cycle, not permanently.
        assert!(!reconciler.is_unavailable("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_symbol_is_excluded_permanently() {
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
            BrokerEvent::HistoryFailed {
                symbol: "B".to_string(),
                error: TransportError::NotFound("B".to_string()),
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A", "B"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();
        assert_eq!(outcome.excluded, vec!["B".to_string()]);
        assert!(reconciler.is_unavailable("B"));

        // Next cycle never re-requests B.
        reconciler.transport.history_requests.clear();
        reconciler.transport.push_events(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
        ]);
        reconciler.begin_cycle();
        reconciler.run_cycle().await.unwrap();
        assert_eq!(reconciler.transport.history_requests, vec!["A".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_history_never_sells_an_owned_position() {
        // A is owned but its history failed this cycle: no stance, no order.
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(vec![position("A")]),
            BrokerEvent::HistoryFailed {
                symbol: "A".to_string(),
                error: TransportError::Network("flaky".to_string()),
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();
        assert!(outcome.orders.is_empty());
        assert!(reconciler.owns("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_history_produces_no_position() {
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: bars("A", &[10.0, 11.0]), // shorter than the window
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();
        assert!(outcome.orders.is_empty());
        assert_eq!(outcome.allocation.weight("A"), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_history_gate_aborts_the_cycle() {
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::Disconnected,
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.begin_cycle();
        let err = reconciler.run_cycle().await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(reconciler.transport.orders.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fills_flip_the_owned_cache_and_rejects_leave_it() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.apply_async_event(BrokerEvent::Filled {
            symbol: "A".to_string(),
            side: OrderSide::Buy,
        });
        assert!(reconciler.owns("A"));

        reconciler.apply_async_event(BrokerEvent::OrderRejected {
            symbol: "A".to_string(),
            side: OrderSide::Sell,
            reason: "insufficient shares".to_string(),
        });
        assert!(reconciler.owns("A"), "a reject must not touch holdings");

        reconciler.apply_async_event(BrokerEvent::Filled {
            symbol: "A".to_string(),
            side: OrderSide::Sell,
        });
        assert!(!reconciler.owns("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_retries_with_backoff_until_success() {
        let mut transport = ScriptedTransport::new(Vec::new());
        transport.connect_failures = 2;
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        let (_tx, mut stop) = watch::channel(false);
        assert!(reconciler.connect_with_backoff(&mut stop).await);
        assert_eq!(reconciler.transport.connect_attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_interrupts_the_reconnect_loop() {
        let mut transport = ScriptedTransport::new(Vec::new());
        transport.connect_failures = usize::MAX;
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        let (tx, mut stop) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(!reconciler.connect_with_backoff(&mut stop).await);
    }

    #[tokio::test(start_paused = true)]
    async fn owned_cache_is_rebuilt_from_broker_snapshot_each_cycle() {
        // First cycle reports A owned, second cycle reports nothing owned:
        // the broker snapshot wins over local memory.
        let transport = ScriptedTransport::new(vec![
            BrokerEvent::Positions(vec![position("A")]),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
        ]);
        let mut reconciler = LiveReconciler::new(transport, strategy(&["A"]), live());

        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();
        assert!(outcome.orders.is_empty(), "already converged");

        reconciler.transport.push_events(vec![
            BrokerEvent::Positions(Vec::new()),
            BrokerEvent::HistoryBars {
                symbol: "A".to_string(),
                bars: above_bars("A"),
            },
        ]);
        reconciler.begin_cycle();
        let outcome = reconciler.run_cycle().await.unwrap();
        assert_eq!(outcome.orders.len(), 1);
        assert_eq!(outcome.orders[0].side, OrderSide::Buy);
    }
}
