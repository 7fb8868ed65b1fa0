//! Fixed-point ingredient quantities and scale factors.
//!
//! A [`Quantity`] is a non-negative count of hundredths held in a `u32`.
//! `u32::MAX` is reserved as the saturation sentinel [`Quantity::MAX`]:
//! arithmetic that overflows lands there and callers mark the affected line
//! item unavailable. Real amounts top out at [`Quantity::LARGEST`]
//! (42 949 672.94); one that lands exactly on the sentinel is clamped down
//! to it instead.
//!
//! A [`ScaleFactor`] carries nine fractional digits. Scaling multiplies in
//! integer space and truncates the result to hundredths.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};

const HUNDREDTHS_PER_UNIT: u64 = 100;
const NANOS_PER_UNIT: u64 = 1_000_000_000;
const NANOS_PER_HUNDREDTH: u64 = NANOS_PER_UNIT / HUNDREDTHS_PER_UNIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub const ZERO: Self = Self(0);
    /// Saturation sentinel; never a real amount.
    pub const MAX: Self = Self(u32::MAX);
    pub const LARGEST: Self = Self(u32::MAX - 1);

    /// `u32::MAX` hundredths clamps to [`Quantity::LARGEST`].
    pub const fn from_hundredths(hundredths: u32) -> Self {
        if hundredths == u32::MAX {
            Self::LARGEST
        } else {
            Self(hundredths)
        }
    }

    /// Whole units, e.g. `Quantity::from_units(300)` is 300.00.
    pub const fn from_units(units: u32) -> Self {
        Self::from_wide(units as u128 * HUNDREDTHS_PER_UNIT as u128)
    }

    /// Computed hundredths: past the `u32` range saturates, exactly on the
    /// sentinel clamps to [`Quantity::LARGEST`].
    const fn from_wide(hundredths: u128) -> Self {
        if hundredths > u32::MAX as u128 {
            Self::MAX
        } else {
            Self::from_hundredths(hundredths as u32)
        }
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Parse user input. Digits past the second decimal are truncated and
    /// values above the representable range saturate.
    pub fn from_f64(value: f64) -> PlanResult<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(PlanError::InvalidQuantity(value));
        }
        if value > Self::MAX.as_f64() {
            return Ok(Self::MAX);
        }
        // Round at nine digits first so 2.3 does not truncate to 2.29.
        let nanos = (value * NANOS_PER_UNIT as f64).round() as u64;
        Ok(Self::from_wide(u128::from(nanos / NANOS_PER_HUNDREDTH)))
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / HUNDREDTHS_PER_UNIT as f64
    }

    pub fn is_saturated(self) -> bool {
        self == Self::MAX
    }

    /// A saturated operand keeps the sum saturated.
    pub fn saturating_add(self, other: Self) -> Self {
        if self.is_saturated() || other.is_saturated() {
            return Self::MAX;
        }
        Self::from_wide(u128::from(self.0) + u128::from(other.0))
    }

    /// Multiply by `factor`, truncating to hundredths and saturating at
    /// [`Quantity::MAX`].
    pub fn scale(self, factor: ScaleFactor) -> Self {
        if self.is_saturated() {
            return Self::MAX;
        }
        Self::from_wide(u128::from(self.0) * u128::from(factor.0) / u128::from(NANOS_PER_UNIT))
    }

    /// Decode a `BIGINT` hundredths column. A stored sentinel stays
    /// saturated.
    pub fn from_db(hundredths: i64) -> PlanResult<Self> {
        if hundredths < 0 {
            return Err(PlanError::InvalidQuantity(hundredths as f64 / 100.0));
        }
        Ok(u32::try_from(hundredths).map_or(Self::MAX, Self))
    }

    pub fn to_db(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / HUNDREDTHS_PER_UNIT as u32;
        let frac = self.0 % HUNDREDTHS_PER_UNIT as u32;
        write!(f, "{whole}.{frac:02}")
    }
}

/// A strictly positive multiplier with nine fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScaleFactor(u64);

impl ScaleFactor {
    pub const ONE: Self = Self(NANOS_PER_UNIT);

    pub fn new(value: f64) -> PlanResult<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(PlanError::InvalidScale(value));
        }
        let nanos = (value * NANOS_PER_UNIT as f64).round();
        if nanos < 1.0 || nanos >= u64::MAX as f64 {
            return Err(PlanError::InvalidScale(value));
        }
        Ok(Self(nanos as u64))
    }

    /// Product of two factors, truncated to nine fractional digits.
    ///
    /// Fails with [`PlanError::InvalidScale`] if the product truncates to
    /// zero or does not fit.
    pub fn compose(self, other: Self) -> PlanResult<Self> {
        let product = u128::from(self.0) * u128::from(other.0) / u128::from(NANOS_PER_UNIT);
        match u64::try_from(product) {
            Ok(0) | Err(_) => Err(PlanError::InvalidScale(self.as_f64() * other.as_f64())),
            Ok(nanos) => Ok(Self(nanos)),
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_UNIT as f64
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

/// `scale(q, factor)` for callers holding a raw factor.
pub fn scale(quantity: Quantity, factor: f64) -> PlanResult<Quantity> {
    Ok(quantity.scale(ScaleFactor::new(factor)?))
}

/// A minimum amount with an optional upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuantityRange {
    pub min: Quantity,
    pub max: Option<Quantity>,
}

impl QuantityRange {
    pub const fn exact(min: Quantity) -> Self {
        Self { min, max: None }
    }

    pub const fn between(min: Quantity, max: Quantity) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn scale(self, factor: ScaleFactor) -> Self {
        Self {
            min: self.min.scale(factor),
            max: self.max.map(|m| m.scale(factor)),
        }
    }

    /// Sum two ranges. Maxima combine as: both present sum, one present
    /// wins, neither stays absent.
    pub fn merge(self, other: Self) -> Self {
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.saturating_add(b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        Self {
            min: self.min.saturating_add(other.min),
            max,
        }
    }

    pub fn is_saturated(self) -> bool {
        self.min.is_saturated() || self.max.is_some_and(Quantity::is_saturated)
    }
}

impl fmt::Display for QuantityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}-{}", self.min, max),
            None => write!(f, "{}", self.min),
        }
    }
}

/// A range tagged with its measurement unit id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measured {
    pub unit_id: String,
    pub range: QuantityRange,
}

impl Measured {
    pub fn new(unit_id: impl Into<String>, range: QuantityRange) -> Self {
        Self {
            unit_id: unit_id.into(),
            range,
        }
    }

    /// Merge two amounts of the same unit. Units are never converted.
    pub fn merge(&self, other: &Self) -> PlanResult<Self> {
        if self.unit_id != other.unit_id {
            return Err(PlanError::UnitMismatch {
                left: self.unit_id.clone(),
                right: other.unit_id.clone(),
            });
        }
        Ok(Self {
            unit_id: self.unit_id.clone(),
            range: self.range.merge(other.range),
        })
    }
}
