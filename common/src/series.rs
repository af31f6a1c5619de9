use crate::Bar;

/// Outcome of merging one live bar into a series.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeriesUpdate {
    /// Timestamp matched the last bar; it was rewritten in place.
    ReplacedLast,
    /// Timestamp was newer than the last bar; it was appended.
    Appended,
    /// Timestamp was older than the last bar; the update was discarded.
    IgnoredStale,
}

/// In-memory bar series with strictly increasing timestamps. The consumer
/// side of the bridge keeps one of these per chart.
#[derive(Debug, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self { bars: Vec::new() }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Full replace from an initial load.
    pub fn replace_all(&mut self, bars: Vec<Bar>) {
        self.bars = bars;
    }

    /// Extend the series leftward with a pagination result. Bars at or past
    /// the current oldest timestamp are dropped so a window overlap at the
    /// seam cannot introduce duplicates.
    pub fn prepend_older(&mut self, mut older: Vec<Bar>) {
        if let Some(first) = self.bars.first() {
            let cutoff = first.timestamp;
            older.retain(|bar| bar.timestamp < cutoff);
        }
        older.append(&mut self.bars);
        self.bars = older;
    }

    /// Merge one live bar: equal timestamp rewrites the open bar, a newer
    /// timestamp appends, an older one is ignored.
    pub fn apply_update(&mut self, bar: Bar) -> SeriesUpdate {
        match self.bars.last_mut() {
            Some(last) if bar.timestamp == last.timestamp => {
                *last = bar;
                SeriesUpdate::ReplacedLast
            }
            Some(last) if bar.timestamp < last.timestamp => SeriesUpdate::IgnoredStale,
            _ => {
                self.bars.push(bar);
                SeriesUpdate::Appended
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close, close, close, 1.0)
    }

    #[test]
    fn equal_timestamp_replaces_in_place() {
        let mut series = BarSeries::new();
        series.replace_all(vec![bar(0, 1.0), bar(60_000, 2.0)]);
        let outcome = series.apply_update(bar(60_000, 3.0));
        assert_eq!(outcome, SeriesUpdate::ReplacedLast);
        assert_eq!(series.len(), 2);
        assert_eq!(series.last().unwrap().close, 3.0);
    }

    #[test]
    fn newer_timestamp_appends() {
        let mut series = BarSeries::new();
        series.replace_all(vec![bar(0, 1.0)]);
        assert_eq!(series.apply_update(bar(60_000, 2.0)), SeriesUpdate::Appended);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn stale_timestamp_is_ignored() {
        let mut series = BarSeries::new();
        series.replace_all(vec![bar(60_000, 2.0)]);
        assert_eq!(series.apply_update(bar(0, 9.0)), SeriesUpdate::IgnoredStale);
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().close, 2.0);
    }

    #[test]
    fn first_update_on_empty_series_appends() {
        let mut series = BarSeries::new();
        assert_eq!(series.apply_update(bar(0, 1.0)), SeriesUpdate::Appended);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn prepend_drops_overlap_at_seam() {
        let mut series = BarSeries::new();
        series.replace_all(vec![bar(120_000, 3.0), bar(180_000, 4.0)]);
        series.prepend_older(vec![bar(0, 1.0), bar(60_000, 2.0), bar(120_000, 9.0)]);
        let stamps: Vec<i64> = series.bars().iter().map(|b| b.timestamp).collect();
        assert_eq!(stamps, vec![0, 60_000, 120_000, 180_000]);
        // the overlapping bar keeps the value the series already had
        assert_eq!(series.bars()[2].close, 3.0);
    }
}
