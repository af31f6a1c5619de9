use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::constant::DEFAULT_BAR_COUNT;
use common::{align_timestamp, now_ms, Period, SymbolInfo};
use connector::{BarCallback, Datafeed};
use tracing::debug;

use crate::sink::{ChartSink, LoadMoreHook};

/// Feeds one chart from one datafeed for a fixed (symbol, period): initial
/// backfill, scroll-triggered pagination, live merge, teardown. One instance
/// per chart; never shared.
///
/// `has_more_older` is the `returned >= requested` heuristic. The provider
/// gives no explicit end-of-history signal, so near the dataset's true start
/// the flag can point either way; the chart simply stops offering backfill
/// once it goes false.
pub struct DatafeedBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    chart: Arc<dyn ChartSink>,
    datafeed: Arc<dyn Datafeed>,
    symbol: SymbolInfo,
    period: Period,
    bar_count: usize,
    loading: AtomicBool,
    disposed: AtomicBool,
}

impl DatafeedBridge {
    pub fn new(
        chart: Arc<dyn ChartSink>,
        datafeed: Arc<dyn Datafeed>,
        symbol: SymbolInfo,
        period: Period,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                chart,
                datafeed,
                symbol,
                period,
                bar_count: DEFAULT_BAR_COUNT,
                loading: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Override the per-page bar count. Must be called before `connect`,
    /// while this handle is the sole owner of the inner state.
    pub fn with_bar_count(mut self, bar_count: usize) -> Self {
        let inner = Arc::get_mut(&mut self.inner);
        debug_assert!(inner.is_some(), "bar count set after the bridge was shared");
        if let Some(inner) = inner {
            inner.bar_count = bar_count.max(1);
        }
        self
    }

    /// Wire the chart up: register the pagination hook, apply the initial
    /// snapshot, then start the live subscription.
    pub async fn connect(&self) {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        // The guard must be armed before the chart can see the hook, and
        // the hook must exist before the initial fetch is issued: a scroll
        // arriving any time mid-load is dropped by the guard instead of
        // racing the snapshot.
        inner.loading.store(true, Ordering::SeqCst);
        let hook_target = Arc::downgrade(inner);
        let hook: LoadMoreHook = Arc::new(move |before| {
            if let Some(inner) = hook_target.upgrade() {
                BridgeInner::accept_load_more(inner, before);
            }
        });
        inner.chart.register_load_more(hook);

        let period_ms = inner.period.period_ms();
        let to = align_timestamp(now_ms(), period_ms);
        let from = to - inner.bar_count as i64 * period_ms;
        let bars = inner
            .datafeed
            .history(&inner.symbol, &inner.period, from, to)
            .await;
        if inner.disposed.load(Ordering::SeqCst) {
            inner.loading.store(false, Ordering::SeqCst);
            return;
        }
        let has_more = bars.len() >= inner.bar_count;
        inner.chart.replace_all(bars, has_more);
        inner.loading.store(false, Ordering::SeqCst);

        // Live updates start only once the snapshot is applied.
        let live_target = Arc::downgrade(inner);
        let callback: BarCallback = Arc::new(move |bar| {
            if let Some(inner) = live_target.upgrade() {
                if !inner.disposed.load(Ordering::SeqCst) {
                    inner.chart.update_latest(bar);
                }
            }
        });
        inner
            .datafeed
            .subscribe(&inner.symbol, &inner.period, callback)
            .await;
        if inner.disposed.load(Ordering::SeqCst) {
            // disposed while the subscribe was in flight
            inner
                .datafeed
                .unsubscribe(&inner.symbol, &inner.period)
                .await;
        }
    }

    /// Tear the bridge down. Idempotent; once this is called no sink method
    /// will be invoked again, including from fetches already in flight.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner
            .datafeed
            .unsubscribe(&self.inner.symbol, &self.inner.period)
            .await;
    }
}

impl BridgeInner {
    /// Entry point for the chart's pull signal.
    fn accept_load_more(inner: Arc<BridgeInner>, before: Option<i64>) {
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        // Single in-flight guard: a signal arriving while any fetch is out
        // is dropped, not queued; the chart retries on the next scroll.
        if inner.loading.swap(true, Ordering::SeqCst) {
            debug!(
                symbol = %inner.symbol.ticker,
                period = %inner.period.text,
                "pagination signal dropped, fetch already in flight"
            );
            return;
        }
        tokio::spawn(async move {
            let period_ms = inner.period.period_ms();
            let to = before.unwrap_or_else(now_ms);
            let from = to - inner.bar_count as i64 * period_ms;
            let bars = inner
                .datafeed
                .history(&inner.symbol, &inner.period, from, to)
                .await;
            if !inner.disposed.load(Ordering::SeqCst) {
                let has_more = bars.len() >= inner.bar_count;
                inner.chart.prepend_older(bars, has_more);
            }
            inner.loading.store(false, Ordering::SeqCst);
        });
    }
}
