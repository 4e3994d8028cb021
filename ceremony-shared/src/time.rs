//! Conversions of durations into human readable countdowns

use std::fmt;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// A duration split into days, hours, minutes and seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Countdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

///
/// Splits `millis` into days, hours, minutes and seconds.
///
/// Every level is floored and clamped to its modulus, so hours never
/// exceed 23 and minutes and seconds never exceed 59. Negative
/// durations yield a zero countdown.
///
pub fn get_seconds_minutes_hours_from_millis(millis: i64) -> Countdown {
    if millis <= 0 {
        return Countdown::default();
    }

    let days = millis / MILLIS_PER_DAY;
    let hours = (millis % MILLIS_PER_DAY) / MILLIS_PER_HOUR;
    let minutes = (millis % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (millis % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;

    Countdown {
        days: days as u64,
        hours: hours.min(23) as u64,
        minutes: minutes.min(59) as u64,
        seconds: seconds.min(59) as u64,
    }
}

/// Pads a number to at least two digits, e.g. `7` as `07`.
pub fn convert_to_double_digits(value: u64) -> String {
    format!("{:02}", value)
}

/// Returns the milliseconds left until `end_date`, zero if it has passed.
pub fn remaining_millis(end_date: i64, now: i64) -> i64 {
    end_date.saturating_sub(now).max(0)
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            convert_to_double_digits(self.days),
            convert_to_double_digits(self.hours),
            convert_to_double_digits(self.minutes),
            convert_to_double_digits(self.seconds)
        )
    }
}
