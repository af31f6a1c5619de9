use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Bar, Period, SymbolInfo};
use tokio::sync::Mutex;
use tracing::warn;

use crate::datafeed::{subscription_key, BarCallback, Datafeed};
use crate::rest::RestClient;
use crate::stream::{connect_binance_stream, StreamHandle};
use crate::DatafeedConfig;

/// Live Binance datafeed: REST klines for history, one websocket connection
/// per subscription key for live pushes. The key→stream registry is owned by
/// this instance, so separate instances stay isolated.
pub struct BinanceDatafeed {
    config: DatafeedConfig,
    rest: RestClient,
    streams: Arc<Mutex<HashMap<String, StreamHandle>>>,
}

impl BinanceDatafeed {
    pub fn new(config: DatafeedConfig) -> Self {
        let rest = RestClient::new(config.rest_endpoint.clone());
        Self {
            config,
            rest,
            streams: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn page_limit(&self) -> usize {
        self.config.page_limit
    }

    /// Remove and fully stop the key's stream, if any. Safe when absent.
    async fn teardown(&self, key: &str) {
        let handle = self.streams.lock().await.remove(key);
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}

impl Default for BinanceDatafeed {
    fn default() -> Self {
        Self::new(DatafeedConfig::default())
    }
}

#[async_trait]
impl Datafeed for BinanceDatafeed {
    async fn search_symbols(&self, query: &str) -> Vec<SymbolInfo> {
        match self.rest.search_symbols(query).await {
            Ok(found) => found,
            Err(err) => {
                warn!(?err, query, "symbol search failed");
                Vec::new()
            }
        }
    }

    async fn history(
        &self,
        symbol: &SymbolInfo,
        period: &Period,
        from_ms: i64,
        to_ms: i64,
    ) -> Vec<Bar> {
        let interval = period.interval();
        match self
            .rest
            .fetch_klines(
                &symbol.ticker,
                &interval,
                from_ms,
                to_ms,
                self.config.page_limit,
            )
            .await
        {
            Ok(bars) => bars,
            Err(err) => {
                warn!(?err, symbol = symbol.ticker, interval, "failed to fetch klines");
                Vec::new()
            }
        }
    }

    async fn subscribe(&self, symbol: &SymbolInfo, period: &Period, callback: BarCallback) {
        let key = subscription_key(symbol, period);
        // Replace semantics: the previous connection for this key is fully
        // gone before the new one exists.
        self.teardown(&key).await;
        let url = format!(
            "{}/{}@kline_{}",
            self.config.ws_endpoint,
            symbol.ticker.to_lowercase(),
            period.interval()
        );
        let connect = move || connect_binance_stream(url.clone());
        let handle = StreamHandle::spawn(
            key.clone(),
            connect,
            Duration::from_millis(self.config.throttle_ms),
            Duration::from_millis(self.config.reconnect_delay_ms),
            callback,
        );
        self.streams.lock().await.insert(key, handle);
    }

    async fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period) {
        let key = subscription_key(symbol, period);
        self.teardown(&key).await;
    }
}
