//! Signed time span with microsecond resolution.
//!
//! Used for timer periods and frame intervals. Spans can be built from
//! components, parsed from `HH:MM:SS[.ffffff]` (optionally prefixed with
//! `D.` days), and written to a [`Stream`] as a single `i64` of micros.

use crate::core::stream::{Stream, Streamable};
use crate::error::{Error, Result};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use std::time::Duration;

pub const MICROS_PER_MILLI: i64 = 1_000;
pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
pub const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;
pub const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeSpan {
    micros: i64,
}

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan { micros: 0 };

    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self::from_micros(millis * MICROS_PER_MILLI)
    }

    pub const fn from_seconds(seconds: i64) -> Self {
        Self::from_micros(seconds * MICROS_PER_SECOND)
    }

    pub const fn from_parts(
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
        millis: i64,
        micros: i64,
    ) -> Self {
        Self::from_micros(
            days * MICROS_PER_DAY
                + hours * MICROS_PER_HOUR
                + minutes * MICROS_PER_MINUTE
                + seconds * MICROS_PER_SECOND
                + millis * MICROS_PER_MILLI
                + micros,
        )
    }

    pub fn days(&self) -> i64 {
        self.micros / MICROS_PER_DAY
    }

    pub fn hours(&self) -> i64 {
        (self.micros % MICROS_PER_DAY) / MICROS_PER_HOUR
    }

    pub fn minutes(&self) -> i64 {
        (self.micros % MICROS_PER_HOUR) / MICROS_PER_MINUTE
    }

    pub fn seconds(&self) -> i64 {
        (self.micros % MICROS_PER_MINUTE) / MICROS_PER_SECOND
    }

    pub fn millis(&self) -> i64 {
        (self.micros % MICROS_PER_SECOND) / MICROS_PER_MILLI
    }

    pub fn micros(&self) -> i64 {
        self.micros % MICROS_PER_MILLI
    }

    pub fn total_seconds(&self) -> i64 {
        self.micros / MICROS_PER_SECOND
    }

    pub fn total_millis(&self) -> i64 {
        self.micros / MICROS_PER_MILLI
    }

    pub fn total_micros(&self) -> i64 {
        self.micros
    }

    pub fn is_negative(&self) -> bool {
        self.micros < 0
    }

    /// Negative spans clamp to zero.
    pub fn to_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }
}

impl From<Duration> for TimeSpan {
    fn from(duration: Duration) -> Self {
        TimeSpan::from_micros(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }
}

impl From<TimeSpan> for Duration {
    fn from(span: TimeSpan) -> Self {
        span.to_duration()
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan::from_micros(self.micros.saturating_add(rhs.micros))
    }
}

impl Sub for TimeSpan {
    type Output = TimeSpan;

    fn sub(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan::from_micros(self.micros.saturating_sub(rhs.micros))
    }
}

impl AddAssign for TimeSpan {
    fn add_assign(&mut self, rhs: TimeSpan) {
        *self = *self + rhs;
    }
}

impl SubAssign for TimeSpan {
    fn sub_assign(&mut self, rhs: TimeSpan) {
        *self = *self - rhs;
    }
}

impl Neg for TimeSpan {
    type Output = TimeSpan;

    fn neg(self) -> TimeSpan {
        TimeSpan::from_micros(self.micros.saturating_neg())
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = TimeSpan::from_micros(self.micros.saturating_abs());
        if self.is_negative() {
            f.write_str("-")?;
        }
        if abs.days() != 0 {
            write!(f, "{}.", abs.days())?;
        }
        write!(
            f,
            "{:02}:{:02}:{:02}.{:06}",
            abs.hours(),
            abs.minutes(),
            abs.seconds(),
            abs.micros % MICROS_PER_SECOND
        )
    }
}

impl FromStr for TimeSpan {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidData(format!("invalid time span: '{text}'"));

        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut fields = body.split(':');
        let (hours_part, minutes, seconds_part) =
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some(h), Some(m), Some(s), None) => (h, m, s),
                _ => return Err(invalid()),
            };

        let (days, hours) = match hours_part.split_once('.') {
            Some((d, h)) => (d, h),
            None => ("0", hours_part),
        };
        let (seconds, fraction) = match seconds_part.split_once('.') {
            Some((s, f)) => (s, f),
            None => (seconds_part, ""),
        };
        if fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let parse = |s: &str| s.parse::<i64>().map_err(|_| invalid());
        let (days, hours, minutes, seconds) =
            (parse(days)?, parse(hours)?, parse(minutes)?, parse(seconds)?);
        let in_range = days >= 0
            && (0..24).contains(&hours)
            && (0..60).contains(&minutes)
            && (0..60).contains(&seconds);
        if !in_range {
            return Err(invalid());
        }
        let micros = if fraction.is_empty() {
            0
        } else {
            parse(&format!("{fraction:0<6}"))?
        };

        let span = TimeSpan::from_parts(days, hours, minutes, seconds, 0, micros);
        Ok(if negative { -span } else { span })
    }
}

impl Streamable for TimeSpan {
    fn encode(&self, stream: &mut Stream) -> Result<()> {
        stream.write(self.micros);
        Ok(())
    }

    fn decode(stream: &mut Stream) -> Result<Self> {
        stream.read::<i64>().map(TimeSpan::from_micros)
    }
}
