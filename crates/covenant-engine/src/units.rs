//! Shared unit newtypes: basis points, token amounts, block heights.
//!
//! Every monetary and rate quantity in the engine is an unsigned integer —
//! rates and ratios in basis points (1 bps = 0.01%), values in smallest
//! token units, time in block heights. Each quantity uses a distinct
//! newtype to prevent cross-unit confusion at compile time. Intermediate
//! products widen to `u128` so bps multiplication cannot overflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Denominator for all basis-point arithmetic: 10_000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

// ---------------------------------------------------------------------------
// BasisPoints — rates and ratios
// ---------------------------------------------------------------------------

/// A rate or ratio expressed in basis points.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether this value is a valid fraction of a whole (`0 < x <= 10000`).
    pub fn is_valid_ratio(&self) -> bool {
        self.0 > 0 && u64::from(self.0) <= BPS_DENOMINATOR
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Apply this rate to an amount: `amount * bps / 10_000`, truncating
    /// toward zero. Widens through `u128`; the narrowing back to `u64` is
    /// lossless whenever the rate is at most 10_000 bps.
    pub fn apply_to(self, amount: TokenAmount) -> TokenAmount {
        let scaled =
            u128::from(amount.as_u64()) * u128::from(self.0) / u128::from(BPS_DENOMINATOR);
        TokenAmount::new(saturating_u128_to_u64(scaled))
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// ---------------------------------------------------------------------------
// TokenAmount — values in smallest token units
// ---------------------------------------------------------------------------

/// A value in smallest token units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}u", self.0)
    }
}

// ---------------------------------------------------------------------------
// BlockHeight — chain time
// ---------------------------------------------------------------------------

/// A block height supplied by the host execution environment. The engine
/// owns no clock; deadline checks compare caller-supplied heights.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, blocks: u64) -> Self {
        Self(self.0.saturating_add(blocks))
    }

    /// Blocks elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) fn saturating_u128_to_u64(value: u128) -> u64 {
    if value > u128::from(u64::MAX) {
        u64::MAX
    } else {
        value as u64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bps_ratio_validity() {
        assert!(!BasisPoints::new(0).is_valid_ratio());
        assert!(BasisPoints::new(1).is_valid_ratio());
        assert!(BasisPoints::new(10_000).is_valid_ratio());
        assert!(!BasisPoints::new(10_001).is_valid_ratio());
    }

    #[test]
    fn apply_to_truncates_toward_zero() {
        let rate = BasisPoints::new(800);
        let coverage = TokenAmount::new(100_000_000);
        assert_eq!(rate.apply_to(coverage), TokenAmount::new(8_000_000));

        // 333 bps of 1001 units is 33.33..., truncated to 33.
        assert_eq!(
            BasisPoints::new(333).apply_to(TokenAmount::new(1_001)),
            TokenAmount::new(33)
        );
    }

    #[test]
    fn apply_to_does_not_overflow_at_extremes() {
        let rate = BasisPoints::new(10_000);
        assert_eq!(
            rate.apply_to(TokenAmount::new(u64::MAX)),
            TokenAmount::new(u64::MAX)
        );
    }

    #[test]
    fn elapsed_since_is_zero_for_future_heights() {
        let earlier = BlockHeight::new(100);
        let later = BlockHeight::new(250);
        assert_eq!(later.elapsed_since(earlier), 150);
        assert_eq!(earlier.elapsed_since(later), 0);
    }

    #[test]
    fn display_forms() {
        assert_eq!(BasisPoints::new(5000).to_string(), "5000bps");
        assert_eq!(TokenAmount::new(42).to_string(), "42u");
        assert_eq!(BlockHeight::new(7).to_string(), "#7");
    }
}
