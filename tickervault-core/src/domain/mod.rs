//! Domain types: bars and the interval catalog.

pub mod bar;
pub mod interval;

pub use bar::Bar;
pub use interval::{Interval, MAX_LOOKBACK_DAYS};

use chrono_tz::Tz;

/// Exchange-local timezone every stored and served timestamp is expressed in.
pub const EXCHANGE_TZ: Tz = chrono_tz::America::New_York;
