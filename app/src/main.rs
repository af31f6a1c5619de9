use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use bridge::{ChartSink, DatafeedBridge, LoadMoreHook};
use clap::Parser;
use common::{logger, Bar, BarSeries, Period, SeriesUpdate, SymbolInfo};
use connector::{BinanceDatafeed, Datafeed, DatafeedConfig, MockDatafeed};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chartfeed", about = "Stream market bars into a logging chart sink")]
struct Cli {
    /// Ticker to chart, e.g. BTCUSDT.
    #[arg(long, default_value = "BTCUSDT")]
    symbol: String,

    /// Bar period, e.g. 1m, 15m, 1H, 1D.
    #[arg(long, default_value = "1m")]
    period: String,

    /// Use the live Binance feed instead of the built-in mock.
    #[arg(long)]
    live: bool,

    /// How long to keep the feed open before tearing it down.
    #[arg(long, default_value_t = 30)]
    run_secs: u64,
}

/// Stand-in chart: keeps a [`BarSeries`] and logs every bridge call.
#[derive(Default)]
struct LoggingChart {
    series: Mutex<BarSeries>,
    load_more: Mutex<Option<LoadMoreHook>>,
}

impl LoggingChart {
    fn bar_count(&self) -> usize {
        self.series.lock().unwrap().bars().len()
    }

    /// Simulate the user scrolling past the oldest loaded bar.
    fn scroll_back(&self) {
        let oldest = self
            .series
            .lock()
            .unwrap()
            .bars()
            .first()
            .map(|bar| bar.timestamp);
        let hook = self.load_more.lock().unwrap().clone();
        match hook {
            Some(hook) => hook(oldest),
            None => warn!("scroll ignored, no pagination hook registered"),
        }
    }
}

impl ChartSink for LoggingChart {
    fn register_load_more(&self, hook: LoadMoreHook) {
        *self.load_more.lock().unwrap() = Some(hook);
    }

    fn replace_all(&self, bars: Vec<Bar>, has_more_older: bool) {
        info!(count = bars.len(), has_more_older, "initial snapshot");
        self.series.lock().unwrap().replace_all(bars);
    }

    fn prepend_older(&self, bars: Vec<Bar>, has_more_older: bool) {
        info!(count = bars.len(), has_more_older, "older page");
        self.series.lock().unwrap().prepend_older(bars);
    }

    fn update_latest(&self, bar: Bar) {
        let outcome = self.series.lock().unwrap().apply_update(bar.clone());
        match outcome {
            SeriesUpdate::ReplacedLast => {
                info!(timestamp = bar.timestamp, close = bar.close, "bar updated")
            }
            SeriesUpdate::Appended => {
                info!(timestamp = bar.timestamp, close = bar.close, "bar opened")
            }
            SeriesUpdate::IgnoredStale => {
                warn!(timestamp = bar.timestamp, "stale bar dropped")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logging();

    let cli = Cli::parse();
    let period: Period = cli.period.parse().context("invalid --period")?;
    let symbol = SymbolInfo::new(cli.symbol.to_uppercase());

    let datafeed: Arc<dyn Datafeed> = if cli.live {
        info!(ticker = %symbol.ticker, "using live Binance datafeed");
        Arc::new(BinanceDatafeed::new(DatafeedConfig::default()))
    } else {
        info!(ticker = %symbol.ticker, "using mock datafeed");
        Arc::new(MockDatafeed::new())
    };

    let chart = Arc::new(LoggingChart::default());
    let bridge = DatafeedBridge::new(chart.clone(), datafeed, symbol, period);

    bridge.connect().await;
    info!(bars = chart.bar_count(), "chart connected");

    let half = Duration::from_secs(cli.run_secs.max(2) / 2);
    sleep(half).await;

    // Pull one older page mid-run, the way a chart would on scroll.
    chart.scroll_back();
    sleep(half).await;

    bridge.dispose().await;
    info!(bars = chart.bar_count(), "chart disposed");
    Ok(())
}
