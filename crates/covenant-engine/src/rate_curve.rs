//! Rate-curve strategies for loan pricing.
//!
//! A collection declares a curve kind at registration; underwriting asks
//! the curve for an interest rate given the loan-to-value ratio and the
//! collection's rate band. Every curve is a total, deterministic function
//! of its inputs, so identical applications always price identically.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{BasisPoints, BPS_DENOMINATOR};

/// Named interest-rate curve.
///
/// `Linear` interpolates between the band endpoints as utilization rises:
/// a loan at 0% LTV prices at `min_rate`, a loan at 100% LTV at `max_rate`.
/// `Flat` always prices at `min_rate` regardless of LTV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateCurveKind {
    Linear,
    Flat,
}

impl RateCurveKind {
    /// Parse the boundary string form (`"linear"`, `"flat"`).
    pub fn parse(name: &str) -> Result<Self, RateCurveError> {
        match name {
            "linear" => Ok(Self::Linear),
            "flat" => Ok(Self::Flat),
            other => Err(RateCurveError::UnknownKind {
                name: other.to_string(),
            }),
        }
    }

    /// Price a loan: map `ltv` onto the `[min_rate, max_rate]` band.
    ///
    /// Total for every input combination. An inverted band (max < min)
    /// collapses to `min_rate`; LTV above 100% clamps to `max_rate`.
    pub fn rate(&self, ltv: BasisPoints, min_rate: BasisPoints, max_rate: BasisPoints) -> BasisPoints {
        match self {
            Self::Flat => min_rate,
            Self::Linear => {
                let span = u64::from(max_rate.as_u32().saturating_sub(min_rate.as_u32()));
                let clamped_ltv = u64::from(ltv.as_u32()).min(BPS_DENOMINATOR);
                let offset = span * clamped_ltv / BPS_DENOMINATOR;
                BasisPoints::new(min_rate.as_u32().saturating_add(offset as u32))
            }
        }
    }
}

impl fmt::Display for RateCurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linear => "linear",
            Self::Flat => "flat",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateCurveError {
    UnknownKind { name: String },
}

impl fmt::Display for RateCurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKind { name } => write!(f, "unknown rate curve kind '{name}'"),
        }
    }
}

impl std::error::Error for RateCurveError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
