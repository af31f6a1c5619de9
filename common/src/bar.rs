use serde::{Deserialize, Serialize};

/// One OHLCV sample for a fixed period, timestamped at the period open.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Period-boundary aligned open time in milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Quote-asset volume when the venue reports it.
    pub turnover: Option<f64>,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            turnover: None,
        }
    }

    pub fn with_turnover(mut self, turnover: f64) -> Self {
        self.turnover = Some(turnover);
        self
    }
}
