use std::time::Duration;

use common::constant::{BINANCE_MAX_KLINE_LIMIT, SYMBOL_SEARCH_LIMIT};
use common::{Bar, SymbolInfo};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    InvalidPayload(&'static str),
}

/// Thin client for the public Binance spot REST endpoints the datafeed uses.
pub struct RestClient {
    http: Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    status: String,
    #[serde(rename = "baseAsset")]
    base_asset: String,
    #[serde(rename = "quoteAsset")]
    quote_asset: String,
    #[serde(rename = "quotePrecision")]
    quote_precision: Option<u32>,
    #[serde(rename = "baseAssetPrecision")]
    base_asset_precision: Option<u32>,
}

impl RestClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("chartfeed-binance-connector")
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Fetch klines for `[start_ms, end_ms]`. Rows arrive as
    /// `[openTime, open, high, low, close, volume, closeTime, quoteVolume, ..]`;
    /// short or malformed rows are skipped rather than failing the page.
    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>, RestError> {
        let url = format!("{}/api/v3/klines", self.endpoint);
        let limited = limit.min(BINANCE_MAX_KLINE_LIMIT).to_string();
        let start = start_ms.to_string();
        let end = end_ms.to_string();
        let resp = self
            .http
            .get(url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval),
                ("startTime", start.as_str()),
                ("endTime", end.as_str()),
                ("limit", limited.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let rows: Vec<Vec<Value>> = resp.json().await?;
        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(bar) = parse_kline_row(&row) {
                bars.push(bar);
            }
        }
        Ok(bars)
    }

    /// Symbol search over exchangeInfo: tradable USDT pairs whose ticker
    /// contains the query, first few matches only.
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolInfo>, RestError> {
        let url = format!("{}/api/v3/exchangeInfo", self.endpoint);
        let resp = self.http.get(url).send().await?.error_for_status()?;
        let info: ExchangeInfo = resp.json().await?;
        let needle = query.to_uppercase();
        let matches = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.quote_asset == "USDT")
            .filter(|s| s.symbol.contains(&needle))
            .take(SYMBOL_SEARCH_LIMIT)
            .map(|s| SymbolInfo {
                name: Some(format!("{} / {}", s.base_asset, s.quote_asset)),
                ticker: s.symbol,
                exchange: Some("Binance".to_string()),
                price_precision: s.quote_precision,
                volume_precision: s.base_asset_precision,
            })
            .collect();
        Ok(matches)
    }
}

fn parse_kline_row(row: &[Value]) -> Option<Bar> {
    if row.len() < 7 {
        return None;
    }
    let timestamp = row.first().and_then(Value::as_i64)?;
    let open = row.get(1).and_then(parse_f64)?;
    let high = row.get(2).and_then(parse_f64)?;
    let low = row.get(3).and_then(parse_f64)?;
    let close = row.get(4).and_then(parse_f64)?;
    let volume = row.get(5).and_then(parse_f64)?;
    let turnover = row.get(7).and_then(parse_f64);
    Some(Bar {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        turnover,
    })
}

pub(crate) fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(num) => num.as_f64(),
        _ => None,
    }
}
