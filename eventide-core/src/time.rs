//! Virtual time for the simulation kernel.
//!
//! A [`Time`] is a signed tick count. How long a tick lasts is decided by a
//! process-wide resolution that is fixed on first use: either explicitly via
//! [`Time::set_resolution`] or implicitly the first time a unit conversion
//! needs it. Arithmetic saturates at [`Time::MAX`], which doubles as the
//! "no deadline" sentinel.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;

/// Resolution shared by every `Time` in the process.
static RESOLUTION: OnceLock<Unit> = OnceLock::new();

/// Errors raised by time configuration and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The resolution was already fixed to a different unit.
    #[error("Time resolution already fixed to {current}, cannot change it")]
    ResolutionFrozen {
        /// Resolution currently in effect
        current: Unit,
    },

    /// A unit suffix could not be recognized.
    #[error("Invalid time unit: {value}")]
    InvalidUnit {
        /// Text that failed to parse
        value: String,
    },
}

/// Decimal time units usable as a resolution or as a conversion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    /// Seconds
    Seconds,
    /// Milliseconds
    Millis,
    /// Microseconds
    Micros,
    /// Nanoseconds
    Nanos,
    /// Picoseconds
    Picos,
    /// Femtoseconds
    Femtos,
}

impl Unit {
    /// Power of ten of one unit, expressed in seconds.
    fn exponent(self) -> i32 {
        match self {
            Unit::Seconds => 0,
            Unit::Millis => -3,
            Unit::Micros => -6,
            Unit::Nanos => -9,
            Unit::Picos => -12,
            Unit::Femtos => -15,
        }
    }

    /// Short suffix used when printing times.
    pub fn suffix(self) -> &'static str {
        match self {
            Unit::Seconds => "s",
            Unit::Millis => "ms",
            Unit::Micros => "us",
            Unit::Nanos => "ns",
            Unit::Picos => "ps",
            Unit::Femtos => "fs",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Unit {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(Unit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(Unit::Millis),
            "us" | "micros" | "microseconds" => Ok(Unit::Micros),
            "ns" | "nanos" | "nanoseconds" => Ok(Unit::Nanos),
            "ps" | "picos" | "picoseconds" => Ok(Unit::Picos),
            "fs" | "femtos" | "femtoseconds" => Ok(Unit::Femtos),
            _ => Err(TimeError::InvalidUnit {
                value: s.to_string(),
            }),
        }
    }
}

/// A point (or span) in virtual time, measured in resolution ticks.
///
/// Ordering is structural on the tick count. There is no coupling to the
/// wall clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time(i64);

impl Time {
    /// Simulation start.
    pub const ZERO: Time = Time(0);

    /// Largest representable time; "never".
    pub const MAX: Time = Time(i64::MAX);

    /// Smallest representable time.
    pub const MIN: Time = Time(i64::MIN);

    /// Creates a time from a raw tick count.
    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Time(ticks)
    }

    /// Returns the raw tick count.
    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns the resolution in effect, fixing it to nanoseconds if nothing
    /// chose one yet.
    pub fn resolution() -> Unit {
        *RESOLUTION.get_or_init(|| Unit::Nanos)
    }

    /// Fixes the process-wide resolution.
    ///
    /// Succeeds when the resolution is still open or already equal to `unit`.
    ///
    /// # Errors
    ///
    /// - `TimeError::ResolutionFrozen` - A different resolution is already in use
    pub fn set_resolution(unit: Unit) -> Result<(), TimeError> {
        let current = *RESOLUTION.get_or_init(|| unit);
        if current == unit {
            Ok(())
        } else {
            Err(TimeError::ResolutionFrozen { current })
        }
    }

    /// Converts `value` expressed in `unit` into ticks, saturating on
    /// overflow and truncating sub-tick remainders.
    pub fn from_unit(value: i64, unit: Unit) -> Self {
        let shift = unit.exponent() - Self::resolution().exponent();
        let scaled = if shift >= 0 {
            i128::from(value) * 10i128.pow(shift.unsigned_abs())
        } else {
            i128::from(value) / 10i128.pow(shift.unsigned_abs())
        };
        Time(clamp_i128(scaled))
    }

    /// Expresses this time in `unit`, truncating toward zero.
    pub fn as_unit(self, unit: Unit) -> i64 {
        let shift = Self::resolution().exponent() - unit.exponent();
        let scaled = if shift >= 0 {
            i128::from(self.0) * 10i128.pow(shift.unsigned_abs())
        } else {
            i128::from(self.0) / 10i128.pow(shift.unsigned_abs())
        };
        clamp_i128(scaled)
    }

    /// Whole seconds.
    pub fn from_secs(secs: i64) -> Self {
        Self::from_unit(secs, Unit::Seconds)
    }

    /// Milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self::from_unit(millis, Unit::Millis)
    }

    /// Microseconds.
    pub fn from_micros(micros: i64) -> Self {
        Self::from_unit(micros, Unit::Micros)
    }

    /// Nanoseconds.
    pub fn from_nanos(nanos: i64) -> Self {
        Self::from_unit(nanos, Unit::Nanos)
    }

    /// Fractional seconds, rounded to the nearest tick.
    pub fn from_secs_f64(secs: f64) -> Self {
        let per_second = 10f64.powi(-Self::resolution().exponent());
        Time::from_ticks_f64(secs * per_second)
    }

    /// This time in fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 * 10f64.powi(Self::resolution().exponent())
    }

    /// Scales by a floating-point factor, rounding to the nearest tick.
    pub fn mul_f64(self, factor: f64) -> Self {
        Time::from_ticks_f64(self.0 as f64 * factor)
    }

    fn from_ticks_f64(ticks: f64) -> Self {
        if ticks.is_nan() {
            return Time::ZERO;
        }
        // `as` saturates on out-of-range floats.
        Time(ticks.round() as i64)
    }

    /// True for times strictly below zero.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True at simulation start.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// True for the "never" sentinel.
    #[inline]
    pub fn is_max(self) -> bool {
        self == Time::MAX
    }

    /// Adds without saturating; `None` on overflow.
    #[inline]
    pub fn checked_add(self, rhs: Time) -> Option<Time> {
        self.0.checked_add(rhs.0).map(Time)
    }

    /// Span between `earlier` and `self`, or `None` if `earlier` is later.
    #[inline]
    pub fn duration_since(self, earlier: Time) -> Option<Time> {
        if earlier > self {
            None
        } else {
            Some(self - earlier)
        }
    }
}

fn clamp_i128(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

impl Add for Time {
    type Output = Time;

    #[inline]
    fn add(self, rhs: Time) -> Time {
        Time(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Time {
    #[inline]
    fn add_assign(&mut self, rhs: Time) {
        *self = *self + rhs;
    }
}

impl Sub for Time {
    type Output = Time;

    #[inline]
    fn sub(self, rhs: Time) -> Time {
        Time(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Time {
    type Output = Time;

    #[inline]
    fn neg(self) -> Time {
        Time(self.0.saturating_neg())
    }
}

impl Mul<i64> for Time {
    type Output = Time;

    #[inline]
    fn mul(self, rhs: i64) -> Time {
        Time(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_max() {
            return f.write_str("+inf");
        }
        write!(f, "{:+}{}", self.0, Self::resolution())
    }
}
