use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;
const WEEK_MS: i64 = 604_800_000;
const MONTH_MS: i64 = 2_592_000_000;
const YEAR_MS: i64 = 31_536_000_000;

/// Time unit of a bar period.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum PeriodUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    /// Fixed millisecond duration of one unit.
    pub fn as_millis(self) -> i64 {
        match self {
            PeriodUnit::Minute => MINUTE_MS,
            PeriodUnit::Hour => HOUR_MS,
            PeriodUnit::Day => DAY_MS,
            PeriodUnit::Week => WEEK_MS,
            PeriodUnit::Month => MONTH_MS,
            PeriodUnit::Year => YEAR_MS,
        }
    }

    /// Suffix used in period display text, `5m` / `1H` style.
    fn text_suffix(self) -> char {
        match self {
            PeriodUnit::Minute => 'm',
            PeriodUnit::Hour => 'H',
            PeriodUnit::Day => 'D',
            PeriodUnit::Week => 'W',
            PeriodUnit::Month => 'M',
            PeriodUnit::Year => 'Y',
        }
    }

    /// Suffix used in Binance kline interval strings. Binance has no year
    /// interval; `y` is only meaningful to offline providers.
    pub fn interval_suffix(self) -> char {
        match self {
            PeriodUnit::Minute => 'm',
            PeriodUnit::Hour => 'h',
            PeriodUnit::Day => 'd',
            PeriodUnit::Week => 'w',
            PeriodUnit::Month => 'M',
            PeriodUnit::Year => 'y',
        }
    }
}

/// Bar interval: a positive multiplier of a time unit, plus its display text.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Period {
    pub multiplier: u32,
    pub unit: PeriodUnit,
    pub text: String,
}

impl Period {
    pub fn new(multiplier: u32, unit: PeriodUnit) -> Self {
        let text = format!("{}{}", multiplier, unit.text_suffix());
        Self {
            multiplier,
            unit,
            text,
        }
    }

    /// Total duration of one bar in milliseconds.
    pub fn period_ms(&self) -> i64 {
        i64::from(self.multiplier) * self.unit.as_millis()
    }

    /// Binance kline interval string, e.g. `5m`, `1h`, `1d`.
    pub fn interval(&self) -> String {
        format!("{}{}", self.multiplier, self.unit.interval_suffix())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Debug)]
pub struct ParsePeriodError;

impl fmt::Display for ParsePeriodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period must look like 1m, 15m, 1H, 1D, 1W, 1M or 1Y")
    }
}

impl std::error::Error for ParsePeriodError {}

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 2 {
            return Err(ParsePeriodError);
        }
        let (digits, suffix) = s.split_at(s.len() - 1);
        let multiplier: u32 = digits.parse().map_err(|_| ParsePeriodError)?;
        if multiplier == 0 {
            return Err(ParsePeriodError);
        }
        let unit = match suffix {
            "m" => PeriodUnit::Minute,
            "H" | "h" => PeriodUnit::Hour,
            "D" | "d" => PeriodUnit::Day,
            "W" | "w" => PeriodUnit::Week,
            "M" => PeriodUnit::Month,
            "Y" | "y" => PeriodUnit::Year,
            _ => return Err(ParsePeriodError),
        };
        Ok(Period::new(multiplier, unit))
    }
}

/// Floor a timestamp to the nearest period boundary at or before it.
pub fn align_timestamp(ts_ms: i64, period_ms: i64) -> i64 {
    if period_ms <= 0 {
        return ts_ms;
    }
    ts_ms.div_euclid(period_ms) * period_ms
}

/// Periods offered by the stock period picker.
pub fn default_periods() -> Vec<Period> {
    vec![
        Period::new(1, PeriodUnit::Minute),
        Period::new(5, PeriodUnit::Minute),
        Period::new(15, PeriodUnit::Minute),
        Period::new(30, PeriodUnit::Minute),
        Period::new(1, PeriodUnit::Hour),
        Period::new(2, PeriodUnit::Hour),
        Period::new(4, PeriodUnit::Hour),
        Period::new(6, PeriodUnit::Hour),
        Period::new(12, PeriodUnit::Hour),
        Period::new(1, PeriodUnit::Day),
        Period::new(3, PeriodUnit::Day),
        Period::new(1, PeriodUnit::Week),
        Period::new(1, PeriodUnit::Month),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_ms_scales_with_multiplier() {
        assert_eq!(Period::new(1, PeriodUnit::Minute).period_ms(), 60_000);
        assert_eq!(Period::new(5, PeriodUnit::Minute).period_ms(), 300_000);
        assert_eq!(Period::new(1, PeriodUnit::Hour).period_ms(), 3_600_000);
        assert_eq!(Period::new(1, PeriodUnit::Week).period_ms(), 604_800_000);
    }

    #[test]
    fn interval_string_matches_binance_format() {
        assert_eq!(Period::new(5, PeriodUnit::Minute).interval(), "5m");
        assert_eq!(Period::new(1, PeriodUnit::Hour).interval(), "1h");
        assert_eq!(Period::new(1, PeriodUnit::Day).interval(), "1d");
        assert_eq!(Period::new(1, PeriodUnit::Month).interval(), "1M");
    }

    #[test]
    fn display_text_uses_chart_casing() {
        assert_eq!(Period::new(15, PeriodUnit::Minute).text, "15m");
        assert_eq!(Period::new(4, PeriodUnit::Hour).text, "4H");
        assert_eq!(Period::new(1, PeriodUnit::Day).text, "1D");
    }

    #[test]
    fn parse_round_trips_default_periods() {
        for period in default_periods() {
            let parsed: Period = period.text.parse().unwrap();
            assert_eq!(parsed, period);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Period>().is_err());
        assert!("m".parse::<Period>().is_err());
        assert!("0m".parse::<Period>().is_err());
        assert!("5x".parse::<Period>().is_err());
    }

    #[test]
    fn align_floors_to_boundary() {
        assert_eq!(align_timestamp(3_600_001, 3_600_000), 3_600_000);
        assert_eq!(align_timestamp(3_600_000, 3_600_000), 3_600_000);
        assert_eq!(align_timestamp(59_999, 60_000), 0);
    }
}
