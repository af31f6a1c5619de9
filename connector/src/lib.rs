mod binance;
mod datafeed;
mod mock;
mod rest;
mod stream;

use common::constant::{
    BINANCE_MAX_KLINE_LIMIT, BINANCE_SPOT_API_BASE, BINANCE_SPOT_WS_BASE,
    DEFAULT_STREAM_RECONNECT_DELAY_MS, DEFAULT_STREAM_THROTTLE_MS,
};

pub use binance::BinanceDatafeed;
pub use datafeed::{subscription_key, BarCallback, Datafeed};
pub use mock::MockDatafeed;
pub use rest::{RestClient, RestError};
pub use stream::StreamError;

/// Connection settings shared by every live datafeed instance.
#[derive(Clone, Debug)]
pub struct DatafeedConfig {
    pub rest_endpoint: String,
    pub ws_endpoint: String,
    /// Provider page cap per history request.
    pub page_limit: usize,
    /// Throttle window applied to the kline push stream.
    pub throttle_ms: u64,
    /// Wait before reopening an unexpectedly closed stream.
    pub reconnect_delay_ms: u64,
}

impl Default for DatafeedConfig {
    fn default() -> Self {
        Self {
            rest_endpoint: BINANCE_SPOT_API_BASE.to_string(),
            ws_endpoint: BINANCE_SPOT_WS_BASE.to_string(),
            page_limit: BINANCE_MAX_KLINE_LIMIT,
            throttle_ms: DEFAULT_STREAM_THROTTLE_MS,
            reconnect_delay_ms: DEFAULT_STREAM_RECONNECT_DELAY_MS,
        }
    }
}
