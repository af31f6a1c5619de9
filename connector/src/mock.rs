use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use common::constant::{MOCK_HISTORY_BAR_CAP, MOCK_TICK_INTERVAL_MS};
use common::{align_timestamp, now_ms, Bar, Period, SymbolInfo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::datafeed::{subscription_key, BarCallback, Datafeed};

const MOCK_BASE_PRICE: f64 = 42_000.0;
const MOCK_FALLBACK_PRICE: f64 = 44_000.0;

/// Offline datafeed double. History is fabricated deterministically from the
/// requested window, live pushes come from an in-process timer mutating one
/// open bar until the period boundary rolls over. Subscription semantics
/// match the live provider so the bridge cannot tell them apart.
pub struct MockDatafeed {
    tick_interval: Duration,
    last_close: StdMutex<f64>,
    subscriptions: Mutex<HashMap<String, MockSubscription>>,
}

struct MockSubscription {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MockDatafeed {
    pub fn new() -> Self {
        Self {
            tick_interval: Duration::from_millis(MOCK_TICK_INTERVAL_MS),
            last_close: StdMutex::new(0.0),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Override the simulated tick cadence. Tests run this on a paused clock.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    async fn teardown(&self, key: &str) {
        let sub = self.subscriptions.lock().await.remove(key);
        if let Some(sub) = sub {
            let _ = sub.shutdown.send(true);
            let _ = sub.task.await;
        }
    }
}

impl Default for MockDatafeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Datafeed for MockDatafeed {
    async fn search_symbols(&self, query: &str) -> Vec<SymbolInfo> {
        let catalogue = [
            ("BTCUSDT", "Bitcoin / USDT"),
            ("ETHUSDT", "Ethereum / USDT"),
            ("SOLUSDT", "Solana / USDT"),
        ];
        let needle = query.to_lowercase();
        catalogue
            .iter()
            .filter(|(ticker, name)| {
                ticker.to_lowercase().contains(&needle) || name.to_lowercase().contains(&needle)
            })
            .map(|(ticker, name)| {
                SymbolInfo::new(*ticker)
                    .with_name(*name)
                    .with_exchange("Mock")
            })
            .collect()
    }

    async fn history(
        &self,
        _symbol: &SymbolInfo,
        period: &Period,
        from_ms: i64,
        to_ms: i64,
    ) -> Vec<Bar> {
        let period_ms = period.period_ms();
        if period_ms <= 0 {
            return Vec::new();
        }
        let to = align_timestamp(to_ms, period_ms);
        if to <= from_ms {
            return Vec::new();
        }
        let count = (((to - from_ms) / period_ms) as usize).min(MOCK_HISTORY_BAR_CAP);
        let bars = generate_history(count, to, period_ms);
        if let Some(last) = bars.last() {
            let mut guard = self.last_close.lock().unwrap();
            *guard = last.close;
        }
        bars
    }

    async fn subscribe(&self, symbol: &SymbolInfo, period: &Period, callback: BarCallback) {
        let key = subscription_key(symbol, period);
        self.teardown(&key).await;

        let period_ms = period.period_ms();
        let seed_price = {
            let guard = self.last_close.lock().unwrap();
            if *guard > 0.0 {
                *guard
            } else {
                MOCK_FALLBACK_PRICE
            }
        };
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        let tick_every = self.tick_interval;
        let live_key = key.clone();
        let task = tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(mix_seed(live_key.as_bytes()));
            let mut bar_ts = align_timestamp(now_ms(), period_ms);
            let mut open = seed_price;
            let mut high = seed_price;
            let mut low = seed_price;
            let mut close = seed_price;
            let mut volume = 0.0;
            let mut ticker = interval(tick_every);
            loop {
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let now_ts = align_timestamp(now_ms(), period_ms);
                        if now_ts > bar_ts {
                            // boundary rolled over: the next bar opens at the
                            // previous close
                            bar_ts = now_ts;
                            open = close;
                            high = open;
                            low = open;
                            volume = 0.0;
                        }
                        let change = (rng.gen::<f64>() - 0.5) * 0.001;
                        close *= 1.0 + change;
                        high = high.max(close);
                        low = low.min(close);
                        volume += rng.gen::<f64>() * 10.0;
                        callback(Bar::new(
                            bar_ts,
                            round2(open),
                            round2(high),
                            round2(low),
                            round2(close),
                            round2(volume),
                        ));
                    }
                }
            }
        });
        self.subscriptions.lock().await.insert(
            key,
            MockSubscription {
                shutdown: shutdown_tx,
                task,
            },
        );
    }

    async fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period) {
        let key = subscription_key(symbol, period);
        self.teardown(&key).await;
    }
}

/// Fabricate `count` bars ending at the aligned `to_ms`. The walk is seeded
/// from the request itself, so identical requests return identical data.
fn generate_history(count: usize, to_ms: i64, period_ms: i64) -> Vec<Bar> {
    if count == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(
        mix_seed(&to_ms.to_le_bytes())
            ^ mix_seed(&(count as u64).to_le_bytes())
            ^ mix_seed(&period_ms.to_le_bytes()),
    );
    let mut base = MOCK_BASE_PRICE + ((to_ms % 10_000) as f64 / 10_000.0) * 5_000.0;
    let start = to_ms - count as i64 * period_ms;
    let mut bars = Vec::with_capacity(count);
    for i in 0..count {
        let timestamp = start + i as i64 * period_ms;
        let volatility = 0.002 + rng.gen::<f64>() * 0.008;
        let trend = (i as f64 / 50.0).sin() * 0.001;
        let change = (rng.gen::<f64>() - 0.5 + trend) * volatility;
        let open = base;
        let close = open * (1.0 + change);
        let high = open.max(close) * (1.0 + rng.gen::<f64>() * volatility * 0.5);
        let low = open.min(close) * (1.0 - rng.gen::<f64>() * volatility * 0.5);
        let volume = 100.0 + rng.gen::<f64>() * 1_000.0;
        bars.push(Bar::new(
            timestamp,
            round2(open),
            round2(high),
            round2(low),
            round2(close),
            round2(volume),
        ));
        base = close;
    }
    bars
}

fn mix_seed(bytes: &[u8]) -> u64 {
    // FNV-1a, enough to decorrelate nearby windows
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
