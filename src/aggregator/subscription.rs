// =============================================================================
// Subscription — polling loop with start/stop lifecycle
// =============================================================================
//
// State machine:
//
//   Idle ──start / settings change──▶ Loading ──both fetches ok──▶ Ready
//                                        │                           │
//                                        └──unexpected error──▶ Failed
//   Ready/Failed ──every refresh interval──▶ Loading
//   any ──stop──▶ Idle (terminal until the next start)
//
// Cycles are spawned as independent tasks so a slow fetch never blocks the
// timer or a settings change.  A cycle is tagged with the settings epoch it
// started under plus a monotonically increasing request token; its results
// are published only when the epoch is still current and no newer cycle has
// published already.  Stale cycles run to completion and are dropped.
//
// Snapshots are delivered through a `tokio::sync::watch` channel so every
// reader sees the latest state and is woken on each publish.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::{
    compute_cycle, AggregatorState, DashboardSnapshot, StockSettings, FETCH_FAILED_MESSAGE,
};
use crate::provider::MarketDataProvider;

/// Settings tagged with the epoch they were installed under.
#[derive(Debug, Clone)]
struct Generation {
    epoch: u64,
    settings: StockSettings,
}

struct Shared<P> {
    provider: P,
    generation: watch::Sender<Generation>,
    snapshot: watch::Sender<DashboardSnapshot>,
    next_token: AtomicU64,
    /// Token of the newest cycle that has published. Also serialises publishes.
    applied_token: Mutex<u64>,
    active: AtomicBool,
    refresh_interval: Duration,
}

impl<P: MarketDataProvider> Shared<P> {
    /// Allocate the request token for a cycle about to be spawned.
    fn issue_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.generation.borrow().epoch
    }

    /// Apply `update` to the snapshot if the cycle (`epoch`, `token`) is still
    /// allowed to publish. Returns whether it was applied.
    fn publish(
        &self,
        epoch: u64,
        token: u64,
        update: impl FnOnce(&mut DashboardSnapshot),
    ) -> bool {
        let mut applied = self.applied_token.lock();
        if !self.active.load(Ordering::SeqCst)
            || epoch != self.current_epoch()
            || token < *applied
        {
            return false;
        }
        *applied = token;
        self.snapshot.send_modify(|snap| {
            snap.version += 1;
            update(snap);
        });
        true
    }
}

/// An explicitly owned polling subscription for one parameter tuple at a time.
pub struct Subscription<P: MarketDataProvider> {
    shared: Arc<Shared<P>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: MarketDataProvider> Subscription<P> {
    /// Create an idle subscription. Nothing is fetched until [`start`](Self::start).
    pub fn new(provider: P, settings: StockSettings, refresh_interval: Duration) -> Self {
        let (generation, _) = watch::channel(Generation { epoch: 0, settings: settings.clone() });
        let (snapshot, _) = watch::channel(DashboardSnapshot::idle(settings));

        Self {
            shared: Arc::new(Shared {
                provider,
                generation,
                snapshot,
                next_token: AtomicU64::new(0),
                applied_token: Mutex::new(0),
                active: AtomicBool::new(false),
                refresh_interval,
            }),
            task: Mutex::new(None),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start polling. A no-op when the loop is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("subscription already running — start ignored");
            return;
        }

        self.shared.active.store(true, Ordering::SeqCst);
        let rx = self.shared.generation.subscribe();
        *task = Some(tokio::spawn(poll_loop(Arc::clone(&self.shared), rx)));

        info!(
            symbol = %self.settings().symbol,
            interval_secs = self.shared.refresh_interval.as_secs(),
            "subscription started"
        );
    }

    /// Cancel the timer and stop publishing. In-flight fetches are left to
    /// finish but their results are discarded.
    pub fn stop(&self) {
        let Some(handle) = self.task.lock().take() else {
            return;
        };
        handle.abort();

        // Holding the publish lock guarantees no cycle lands after Idle.
        // Tokens issued so far become stale for any later restart.
        let mut applied = self.shared.applied_token.lock();
        *applied = self.shared.next_token.load(Ordering::SeqCst) + 1;
        self.shared.active.store(false, Ordering::SeqCst);
        self.shared.snapshot.send_modify(|snap| {
            snap.version += 1;
            snap.state = AggregatorState::Idle;
            snap.result.loading = false;
        });

        info!("subscription stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Install a new parameter tuple. Returns `Ok(false)` when it equals the
    /// current tuple (no new cycle), `Ok(true)` when a new cycle was triggered.
    pub fn update_settings(&self, settings: StockSettings) -> Result<bool> {
        let settings = settings.normalized()?;

        let changed = self.shared.generation.send_if_modified(|generation| {
            if generation.settings == settings {
                return false;
            }
            generation.epoch += 1;
            generation.settings = settings.clone();
            true
        });

        if changed {
            info!(
                symbol = %settings.symbol,
                timeframe = %settings.timeframe,
                epoch = self.shared.current_epoch(),
                "subscription settings changed"
            );
        }
        Ok(changed)
    }

    pub fn settings(&self) -> StockSettings {
        self.shared.generation.borrow().settings.clone()
    }

    // -------------------------------------------------------------------------
    // Output
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver woken on every published snapshot.
    pub fn watch(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl<P: MarketDataProvider> Drop for Subscription<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
        self.shared.active.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Polling loop
// =============================================================================

async fn poll_loop<P: MarketDataProvider>(
    shared: Arc<Shared<P>>,
    mut generation_rx: watch::Receiver<Generation>,
) {
    let mut ticker = interval(shared.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = generation_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                // New tuple: refresh now and restart the cadence from here.
                ticker.reset();
            }
        }

        let generation = generation_rx.borrow_and_update().clone();
        let token = shared.issue_token();
        tokio::spawn(run_cycle(Arc::clone(&shared), generation, token));
    }
}

async fn run_cycle<P: MarketDataProvider>(
    shared: Arc<Shared<P>>,
    generation: Generation,
    token: u64,
) {
    let Generation { epoch, settings } = generation;

    let started = shared.publish(epoch, token, |snap| {
        snap.state = AggregatorState::Loading;
        snap.settings = settings.clone();
        snap.result.loading = true;
        snap.result.error = None;
    });
    if !started {
        debug!(epoch, token, "cycle superseded before start — skipped");
        return;
    }

    match compute_cycle(&shared.provider, &settings).await {
        Ok((quote, chart)) => {
            let bars = chart.prices.len();
            let applied = shared.publish(epoch, token, |snap| {
                snap.state = AggregatorState::Ready;
                snap.result.loading = false;
                snap.result.error = None;
                snap.result.quote = Some(quote);
                snap.result.chart_data = Some(chart);
            });
            if applied {
                debug!(symbol = %settings.symbol, bars, price = quote.price, "cycle ready");
            } else {
                debug!(symbol = %settings.symbol, epoch, token, "stale cycle result discarded");
            }
        }
        Err(e) => {
            error!(symbol = %settings.symbol, error = %format!("{e:#}"), "refresh cycle failed");
            shared.publish(epoch, token, |snap| {
                snap.state = AggregatorState::Failed;
                snap.result.loading = false;
                snap.result.error = Some(FETCH_FAILED_MESSAGE.to_string());
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bar, Quote, Series, Timeframe};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    const REFRESH: Duration = Duration::from_secs(60);

    /// In-memory provider: the quote price encodes the symbol so tests can
    /// tell which cycle produced a snapshot.
    #[derive(Default)]
    struct StubProvider {
        prices: HashMap<&'static str, f64>,
        delays: HashMap<&'static str, Duration>,
        fail: AtomicBool,
        quote_calls: AtomicUsize,
    }

    impl StubProvider {
        fn with(symbols: &[(&'static str, f64, u64)]) -> Self {
            let mut stub = Self::default();
            for (symbol, price, delay_secs) in symbols {
                stub.prices.insert(symbol, *price);
                stub.delays.insert(symbol, Duration::from_secs(*delay_secs));
            }
            stub
        }

        fn delay(&self, symbol: &str) -> Duration {
            self.delays.get(symbol).copied().unwrap_or_default()
        }
    }

    impl MarketDataProvider for Arc<StubProvider> {
        async fn quote(&self, symbol: &str) -> anyhow::Result<Quote> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay(symbol)).await;
            let c = self.prices.get(symbol).copied().unwrap_or(173.45);
            Ok(Quote { c, h: c, l: c, o: c, pc: 171.2, t: 0 })
        }

        async fn series(&self, symbol: &str, _timeframe: &Timeframe) -> anyhow::Result<Series> {
            tokio::time::sleep(self.delay(symbol)).await;
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("provider exploded");
            }
            Ok((0..30)
                .map(|i| {
                    let close = 100.0 + (i as f64 * 0.8).sin() * 3.0;
                    Bar {
                        date: format!("2024-02-{:02}", i + 1),
                        open: 100.0,
                        high: close.max(100.0) + 1.0,
                        low: close.min(100.0) - 1.0,
                        close,
                        volume: 1_000_000,
                    }
                })
                .collect())
        }
    }

    fn settings_for(symbol: &str) -> StockSettings {
        StockSettings {
            symbol: symbol.to_string(),
            ..StockSettings::default()
        }
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<DashboardSnapshot>,
        state: AggregatorState,
    ) -> DashboardSnapshot {
        rx.wait_for(|s| s.state == state).await.unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn new_subscription_is_idle() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);

        let snap = sub.snapshot();
        assert_eq!(snap.state, AggregatorState::Idle);
        assert!(!snap.result.loading);
        assert!(snap.result.quote.is_none());
        assert!(!sub.is_running());
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_reaches_ready_with_full_chart() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        let loading = wait_for_state(&mut rx, AggregatorState::Loading).await;
        assert!(loading.result.loading);

        let snap = wait_for_state(&mut rx, AggregatorState::Ready).await;
        assert!(!snap.result.loading);
        assert!(snap.result.error.is_none());

        let quote = snap.result.quote.unwrap();
        assert!((quote.change - 2.25).abs() < 1e-9);
        assert!((quote.change_percent - 1.314).abs() < 1e-3);

        let chart = snap.result.chart_data.unwrap();
        assert_eq!(chart.dema.short.len(), 30);
        assert_eq!(chart.dema.long.len(), 30);
        assert!(chart.dema.short[..8].iter().all(|v| *v == 0.0));
        assert!(chart.dema.long[..20].iter().all(|v| *v == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_every_interval() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        let first = wait_for_state(&mut rx, AggregatorState::Ready).await;
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let second = sub.snapshot();
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.state, AggregatorState::Ready);
        assert!(second.version > first.version);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_a_single_timer() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);

        sub.start();
        sub.start();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_stale_data_visible() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        let ready = wait_for_state(&mut rx, AggregatorState::Ready).await;

        stub.fail.store(true, Ordering::SeqCst);
        let failed = wait_for_state(&mut rx, AggregatorState::Failed).await;

        assert!(!failed.result.loading);
        assert_eq!(failed.result.error.as_deref(), Some(FETCH_FAILED_MESSAGE));
        assert_eq!(failed.result.quote, ready.result.quote);
        assert_eq!(failed.result.chart_data, ready.result.chart_data);

        // The next successful cycle clears the error.
        stub.fail.store(false, Ordering::SeqCst);
        let recovered = wait_for_state(&mut rx, AggregatorState::Ready).await;
        assert!(recovered.result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cycle_never_overwrites_newer_settings() {
        // Known hazard: the SLOW cycle is still in flight when the tuple
        // changes, and it completes after the FAST cycle.
        let stub = Arc::new(StubProvider::with(&[("SLOW", 10.0, 10), ("FAST", 20.0, 1)]));
        let sub = Subscription::new(stub.clone(), settings_for("SLOW"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Loading).await;
        assert!(sub.update_settings(settings_for("FAST")).unwrap());

        let ready = wait_for_state(&mut rx, AggregatorState::Ready).await;
        assert_eq!(ready.settings.symbol, "FAST");
        assert_eq!(ready.result.quote.unwrap().price, 20.0);

        // Let the SLOW fetch land.
        tokio::time::sleep(Duration::from_secs(15)).await;
        let after = sub.snapshot();
        assert_eq!(after.version, ready.version);
        assert_eq!(after.settings.symbol, "FAST");
        assert_eq!(after.result.quote.unwrap().price, 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_settings_do_not_trigger_a_cycle() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Ready).await;

        assert!(!sub.update_settings(settings_for("aapl")).unwrap());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_change_refreshes_immediately() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Ready).await;

        let new = StockSettings {
            dema_short_period: 5,
            ..settings_for("AAPL")
        };
        assert!(sub.update_settings(new).unwrap());
        let snap = rx
            .wait_for(|s| s.state == AggregatorState::Ready && s.settings.dema_short_period == 5)
            .await
            .unwrap()
            .clone();

        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
        let chart = snap.result.chart_data.unwrap();
        assert!(chart.dema.short[..4].iter().all(|v| *v == 0.0));
        assert!(chart.dema.short[4] != 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_settings_are_rejected() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub, settings_for("AAPL"), REFRESH);

        let bad = StockSettings {
            dema_long_period: 0,
            ..settings_for("AAPL")
        };
        assert!(sub.update_settings(bad).is_err());
        assert_eq!(sub.settings().dema_long_period, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn token_issued_before_stop_cannot_publish_after_restart() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub, settings_for("AAPL"), REFRESH);

        sub.start();
        // A cycle that was spawned but not yet polled when stop() ran.
        let token = sub.shared.issue_token();
        sub.stop();
        sub.start();

        let epoch = sub.shared.current_epoch();
        let before = sub.snapshot().version;
        assert!(!sub.shared.publish(epoch, token, |snap| {
            snap.state = AggregatorState::Loading;
        }));
        assert_eq!(sub.snapshot().version, before);
        assert_eq!(sub.snapshot().state, AggregatorState::Idle);

        // Tokens issued after the restart still publish.
        let fresh = sub.shared.issue_token();
        assert!(sub.shared.publish(epoch, fresh, |_| {}));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_tears_down_and_silences_in_flight_cycles() {
        let stub = Arc::new(StubProvider::with(&[("SLOW", 10.0, 10)]));
        let sub = Subscription::new(stub.clone(), settings_for("SLOW"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Loading).await;
        sub.stop();

        let stopped = sub.snapshot();
        assert_eq!(stopped.state, AggregatorState::Idle);
        assert!(!stopped.result.loading);
        assert!(!sub.is_running());

        tokio::time::sleep(Duration::from_secs(200)).await;
        let later = sub.snapshot();
        assert_eq!(later.version, stopped.version);
        assert!(later.result.quote.is_none());
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_polls_again() {
        let stub = Arc::new(StubProvider::default());
        let sub = Subscription::new(stub.clone(), settings_for("AAPL"), REFRESH);
        let mut rx = sub.watch();

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Ready).await;
        sub.stop();
        wait_for_state(&mut rx, AggregatorState::Idle).await;

        sub.start();
        wait_for_state(&mut rx, AggregatorState::Ready).await;
        assert_eq!(stub.quote_calls.load(Ordering::SeqCst), 2);
    }
}
