use std::sync::Arc;

use async_trait::async_trait;
use common::{Bar, Period, SymbolInfo};

/// Receives one bar per live delivery.
pub type BarCallback = Arc<dyn Fn(Bar) + Send + Sync>;

/// Market-data capability consumed by the ingestion bridge. Implemented by
/// the live Binance provider and the synthetic offline provider; callers
/// depend only on this contract.
///
/// Failure policy: transport problems never cross this boundary. `search`
/// and `history` degrade to empty results, subscribe/unsubscribe are
/// idempotent per key.
#[async_trait]
pub trait Datafeed: Send + Sync {
    /// Best-effort symbol lookup. Empty on transport failure.
    async fn search_symbols(&self, query: &str) -> Vec<SymbolInfo>;

    /// Bars in `[from_ms, to_ms]`, ascending, capped at the provider page
    /// limit. Empty on transport failure.
    async fn history(
        &self,
        symbol: &SymbolInfo,
        period: &Period,
        from_ms: i64,
        to_ms: i64,
    ) -> Vec<Bar>;

    /// Open a live connection for the (symbol, period) key. A second call
    /// for the same key tears the first connection down before opening the
    /// replacement.
    async fn subscribe(&self, symbol: &SymbolInfo, period: &Period, callback: BarCallback);

    /// Tear down the key's connection. No-op when none exists.
    async fn unsubscribe(&self, symbol: &SymbolInfo, period: &Period);
}

/// Registry key identifying at most one live connection.
pub fn subscription_key(symbol: &SymbolInfo, period: &Period) -> String {
    format!("{}_{}", symbol.ticker, period.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PeriodUnit;

    #[test]
    fn key_derives_from_ticker_and_period_text() {
        let symbol = SymbolInfo::new("BTCUSDT");
        assert_eq!(
            subscription_key(&symbol, &Period::new(1, PeriodUnit::Hour)),
            "BTCUSDT_1H"
        );
        assert_eq!(
            subscription_key(&symbol, &Period::new(5, PeriodUnit::Minute)),
            "BTCUSDT_5m"
        );
    }
}
