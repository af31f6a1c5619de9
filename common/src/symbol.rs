use serde::{Deserialize, Serialize};

/// Instrument metadata surfaced by symbol search. Precision fields only
/// govern display rounding, never series semantics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Venue ticker, e.g. `BTCUSDT`.
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub price_precision: Option<u32>,
    pub volume_precision: Option<u32>,
}

impl SymbolInfo {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            exchange: None,
            price_precision: None,
            volume_precision: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }
}
