use chrono::{DateTime, Utc};

pub mod bar;
pub mod constant;
pub mod logger;
pub mod period;
pub mod series;
pub mod symbol;

pub use bar::*;
pub use period::*;
pub use series::*;
pub use symbol::*;

/// Current wall-clock time in milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    let now: DateTime<Utc> = Utc::now();
    now.timestamp_millis()
}
