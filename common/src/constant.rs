/// Base URL for Binance spot REST endpoints.
pub const BINANCE_SPOT_API_BASE: &str = "https://api.binance.com";
/// Base URL for Binance spot websocket raw streams.
pub const BINANCE_SPOT_WS_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Maximum number of kline rows Binance returns per REST call.
pub const BINANCE_MAX_KLINE_LIMIT: usize = 1000;
/// Maximum symbol matches returned by a search.
pub const SYMBOL_SEARCH_LIMIT: usize = 20;

/// Bars requested per initial load or pagination page.
pub const DEFAULT_BAR_COUNT: usize = 500;
/// Window over which bursty kline pushes collapse to one delivery.
pub const DEFAULT_STREAM_THROTTLE_MS: u64 = 500;
/// Delay before a dropped websocket connection is reopened.
pub const DEFAULT_STREAM_RECONNECT_DELAY_MS: u64 = 3_000;

/// Tick cadence of the synthetic live feed.
pub const MOCK_TICK_INTERVAL_MS: u64 = 1_500;
/// Most bars the synthetic provider fabricates per history request.
pub const MOCK_HISTORY_BAR_CAP: usize = 500;
