//! Flow-control credit.
//!
//! A [`Demand`] says how many more values a subscriber is willing to accept.
//! It is either a finite count in `0..=2^63-1` or `unlimited`. All arithmetic
//! saturates: nothing ever goes below zero and nothing overflows past
//! `unlimited`.

use std::{
  fmt::{Debug, Display, Formatter},
  ops::{Add, AddAssign, Mul, Sub, SubAssign},
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DemandError;

const UNLIMITED_RAW: u64 = 1 << 63;
const MAX_FINITE: u64 = UNLIMITED_RAW - 1;

/// Number of values a subscriber still accepts.
///
/// The raw representation is the wire form: finite `n` is stored as `n`,
/// `unlimited` as `2^63`. Because every finite value is below `2^63` the
/// derived ordering puts `unlimited` above every finite demand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Demand(u64);

impl Demand {
  /// No demand.
  pub const NONE: Demand = Demand(0);

  /// Demand without a bound.
  pub const UNLIMITED: Demand = Demand(UNLIMITED_RAW);

  /// Finite demand of `count` values.
  ///
  /// # Panics
  ///
  /// When `count` does not fit the finite range (`count >= 2^63`).
  #[inline]
  pub const fn max(count: u64) -> Demand {
    assert!(count <= MAX_FINITE, "finite demand must be below 2^63");
    Demand(count)
  }

  #[inline]
  pub const fn is_unlimited(&self) -> bool { self.0 == UNLIMITED_RAW }

  #[inline]
  pub const fn is_zero(&self) -> bool { self.0 == 0 }

  /// The finite count, or `None` for `unlimited`.
  #[inline]
  pub const fn max_count(&self) -> Option<u64> {
    if self.is_unlimited() { None } else { Some(self.0) }
  }

  /// Encodes the demand as its single `u64` wire field.
  #[inline]
  pub const fn to_wire(self) -> u64 { self.0 }

  /// Decodes a demand from its wire field.
  pub const fn from_wire(raw: u64) -> Result<Demand, DemandError> {
    if raw > UNLIMITED_RAW { Err(DemandError::OutOfRange(raw)) } else { Ok(Demand(raw)) }
  }

  /// Takes one unit of credit if any is left. `unlimited` is never consumed.
  #[inline]
  pub fn take_one(&mut self) -> bool {
    if self.is_zero() {
      false
    } else {
      if !self.is_unlimited() {
        self.0 -= 1;
      }
      true
    }
  }
}

impl Add for Demand {
  type Output = Demand;

  fn add(self, rhs: Demand) -> Demand {
    if self.is_unlimited() || rhs.is_unlimited() {
      return Demand::UNLIMITED;
    }
    // Both operands are below 2^63, the sum cannot wrap a u64.
    let sum = self.0 + rhs.0;
    if sum > MAX_FINITE { Demand::UNLIMITED } else { Demand(sum) }
  }
}

impl AddAssign for Demand {
  #[inline]
  fn add_assign(&mut self, rhs: Demand) { *self = *self + rhs; }
}

impl Sub for Demand {
  type Output = Demand;

  fn sub(self, rhs: Demand) -> Demand {
    match (self.is_unlimited(), rhs.is_unlimited()) {
      (true, _) => Demand::UNLIMITED,
      (false, true) => Demand::NONE,
      (false, false) => Demand(self.0.saturating_sub(rhs.0)),
    }
  }
}

impl SubAssign for Demand {
  #[inline]
  fn sub_assign(&mut self, rhs: Demand) { *self = *self - rhs; }
}

impl Mul<i64> for Demand {
  type Output = Demand;

  /// # Panics
  ///
  /// When `rhs` is negative.
  fn mul(self, rhs: i64) -> Demand {
    assert!(rhs >= 0, "demand multiplier must not be negative, got {rhs}");
    if self.is_unlimited() {
      return Demand::UNLIMITED;
    }
    match self.0.checked_mul(rhs as u64) {
      Some(product) if product <= MAX_FINITE => Demand(product),
      _ => Demand::UNLIMITED,
    }
  }
}

impl Display for Demand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.max_count() {
      Some(count) => write!(f, "max({count})"),
      None => f.write_str("unlimited"),
    }
  }
}

impl Debug for Demand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { Display::fmt(self, f) }
}

impl Serialize for Demand {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(self.to_wire())
  }
}

impl<'de> Deserialize<'de> for Demand {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Demand, D::Error> {
    let raw = u64::deserialize(deserializer)?;
    Demand::from_wire(raw).map_err(de::Error::custom)
  }
}
