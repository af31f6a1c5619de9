use std::sync::Arc;

use common::Bar;

/// Pull signal handed to the chart at connect time: "need older data before
/// this timestamp" (`None` means now). Invoking it is cheap and non-blocking;
/// the answer arrives later through [`ChartSink::prepend_older`].
pub type LoadMoreHook = Arc<dyn Fn(Option<i64>) + Send + Sync>;

/// Consumer boundary of the bridge. Implemented by whatever owns the chart's
/// bar series; the bridge never sees the series itself.
pub trait ChartSink: Send + Sync {
    /// Receives the pagination hook before any data call is made.
    fn register_load_more(&self, hook: LoadMoreHook);

    /// Initial snapshot. `has_more_older` tells the chart whether offering
    /// further backfill is worthwhile.
    fn replace_all(&self, bars: Vec<Bar>, has_more_older: bool);

    /// Pagination result extending the series leftward.
    fn prepend_older(&self, bars: Vec<Bar>, has_more_older: bool);

    /// One live bar: same timestamp as the series' last bar rewrites it,
    /// a newer timestamp starts the next bar.
    fn update_latest(&self, bar: Bar);
}
