//! Mapping between instants and plane coordinates.
//!
//! Plane units are fractional days since 1970-01-01T00:00, the same on both axes:
//! x carries valid time, y carries transaction time.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::instant::{format_caption_date, format_instant, serde_instant, Instant};
use crate::KernelError;

const SECONDS_PER_DAY: f64 = 86_400.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;
const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_DAY: i128 = 86_400_000_000_000;

/// One cursor position expressed on both time axes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct TemporalPoint {
    #[serde(with = "serde_instant")]
    pub transaction: Instant,
    #[serde(with = "serde_instant")]
    pub valid: Instant,
}

impl TemporalPoint {
    #[must_use]
    pub fn new(transaction: Instant, valid: Instant) -> Self {
        Self { transaction, valid }
    }

    /// Two-line cursor readout, e.g. `Transaction: 01-Jun-2024\nValid: 01-Jan-2021`.
    #[must_use]
    pub fn caption(&self) -> String {
        format!(
            "Transaction: {}\nValid: {}",
            format_caption_date(self.transaction),
            format_caption_date(self.valid)
        )
    }
}

impl Display for TemporalPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(transaction={}, valid={})",
            format_instant(self.transaction),
            format_instant(self.valid)
        )
    }
}

/// Linear day-number scale with a fixed rounding resolution for inversion.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AxisScale {
    resolution_nanos: i128,
}

impl Default for AxisScale {
    fn default() -> Self {
        Self { resolution_nanos: 1_000_000_000 }
    }
}

impl AxisScale {
    /// # Errors
    /// Returns [`KernelError::InvalidScale`] unless `1 ms <= resolution <= 1 day`.
    pub fn new(resolution: Duration) -> Result<Self, KernelError> {
        let resolution_nanos = resolution.whole_nanoseconds();
        if resolution_nanos < NANOS_PER_MILLI || resolution_nanos > NANOS_PER_DAY {
            return Err(KernelError::InvalidScale(format!(
                "resolution MUST be within [1 ms, 1 day], got {resolution}"
            )));
        }
        Ok(Self { resolution_nanos })
    }

    #[must_use]
    pub fn resolution(&self) -> Duration {
        Duration::nanoseconds(i64::try_from(self.resolution_nanos).unwrap_or(i64::MAX))
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_plane(&self, instant: Instant) -> f64 {
        let utc = instant.assume_utc();
        let seconds = utc.unix_timestamp() as f64;
        let nanos = f64::from(utc.nanosecond());
        seconds / SECONDS_PER_DAY + nanos / (SECONDS_PER_DAY * 1e9)
    }

    /// Inverse of [`AxisScale::to_plane`], rounded up to the next resolution tick.
    ///
    /// The coordinate is first settled on the nearest millisecond, which absorbs the
    /// float error of [`AxisScale::to_plane`]. Rounding up never moves an instant
    /// below the lower bound it was projected from, so a rectangle's lower-left
    /// corner inverts into its own record whenever the record spans at least one
    /// tick on each axis.
    ///
    /// Finite coordinates beyond the calendar saturate at its limits.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidCoordinate`] for NaN or infinite input.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_plane(&self, coordinate: f64) -> Result<Instant, KernelError> {
        if !coordinate.is_finite() {
            return Err(KernelError::InvalidCoordinate(format!(
                "coordinate MUST be finite, got {coordinate}"
            )));
        }

        let millis = (coordinate * MILLIS_PER_DAY).round() as i128;
        let settled = millis.saturating_mul(NANOS_PER_MILLI);
        let mut ticks = settled.div_euclid(self.resolution_nanos);
        if settled.rem_euclid(self.resolution_nanos) != 0 {
            ticks = ticks.saturating_add(1);
        }
        let min_nanos = PrimitiveDateTime::MIN.assume_utc().unix_timestamp_nanos();
        let max_nanos = PrimitiveDateTime::MAX.assume_utc().unix_timestamp_nanos();
        let nanos = ticks.saturating_mul(self.resolution_nanos).clamp(min_nanos, max_nanos);

        Ok(OffsetDateTime::from_unix_timestamp_nanos(nanos).map_or_else(
            |_| if nanos < 0 { PrimitiveDateTime::MIN } else { PrimitiveDateTime::MAX },
            |utc| PrimitiveDateTime::new(utc.date(), utc.time()),
        ))
    }
}

/// Turns a plane coordinate back into the temporal point it encodes.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PointInverter {
    scale: AxisScale,
}

impl PointInverter {
    #[must_use]
    pub fn new(scale: AxisScale) -> Self {
        Self { scale }
    }

    #[must_use]
    pub fn scale(&self) -> AxisScale {
        self.scale
    }

    /// x is valid time, y is transaction time.
    ///
    /// # Errors
    /// Returns [`KernelError::InvalidCoordinate`] when either coordinate is not finite.
    pub fn invert(&self, plane_x: f64, plane_y: f64) -> Result<TemporalPoint, KernelError> {
        let valid = self.scale.from_plane(plane_x)?;
        let transaction = self.scale.from_plane(plane_y)?;
        Ok(TemporalPoint { transaction, valid })
    }

    /// Plane coordinate `(x, y)` of a temporal point.
    #[must_use]
    pub fn locate(&self, point: TemporalPoint) -> (f64, f64) {
        (self.scale.to_plane(point.valid), self.scale.to_plane(point.transaction))
    }
}
