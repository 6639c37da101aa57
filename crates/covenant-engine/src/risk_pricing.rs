//! Risk profiles and pure premium computation.
//!
//! A risk profile prices one peril type: a base rate plus a per-location
//! adjustment, both in basis points. Premium computation is a total,
//! side-effect-free function — it is designed to be polled any number of
//! times with identical results, so nothing here mutates on read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peril::{Location, PerilType};
use crate::units::{BasisPoints, TokenAmount, BPS_DENOMINATOR};

// ---------------------------------------------------------------------------
// ProfileId / RiskProfile
// ---------------------------------------------------------------------------

/// Monotonically allocated risk profile id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProfileId(u64);

impl ProfileId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "profile-{}", self.0)
    }
}

/// Static reference data pricing one peril type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub id: ProfileId,
    pub peril: PerilType,
    pub base_rate: BasisPoints,
    /// Location-specific surcharge; locations not listed pay no surcharge.
    pub adjustments: BTreeMap<Location, BasisPoints>,
}

impl RiskProfile {
    /// Total rate for a location: base plus surcharge.
    pub fn total_rate(&self, location: &Location) -> BasisPoints {
        let adjustment = self
            .adjustments
            .get(location)
            .copied()
            .unwrap_or_default();
        self.base_rate.saturating_add(adjustment)
    }
}

// ---------------------------------------------------------------------------
// RiskPricingError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskPricingError {
    UnknownProfile {
        id: ProfileId,
    },
    /// Registration-time bound: no location's total rate may exceed 100%.
    RateOutOfRange {
        total: BasisPoints,
    },
}

impl fmt::Display for RiskPricingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProfile { id } => write!(f, "risk {id} is not registered"),
            Self::RateOutOfRange { total } => write!(
                f,
                "total rate {total} exceeds the {BPS_DENOMINATOR}bps cap"
            ),
        }
    }
}

impl std::error::Error for RiskPricingError {}

// ---------------------------------------------------------------------------
// RiskBook
// ---------------------------------------------------------------------------

/// The risk profile table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskBook {
    profiles: BTreeMap<ProfileId, RiskProfile>,
    next_id: u64,
}

impl RiskBook {
    pub fn new() -> Self {
        Self {
            profiles: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a profile. The base rate alone and every per-location
    /// total must stay at or below 10_000 bps, so a premium can never
    /// exceed the coverage it prices.
    pub fn register(
        &mut self,
        peril: PerilType,
        base_rate: BasisPoints,
        adjustments: BTreeMap<Location, BasisPoints>,
    ) -> Result<ProfileId, RiskPricingError> {
        let worst = adjustments
            .values()
            .copied()
            .max()
            .unwrap_or_default();
        let total = base_rate.saturating_add(worst);
        if u64::from(total.as_u32()) > BPS_DENOMINATOR {
            return Err(RiskPricingError::RateOutOfRange { total });
        }

        let id = ProfileId(self.next_id);
        self.next_id += 1;
        self.profiles.insert(
            id,
            RiskProfile {
                id,
                peril,
                base_rate,
                adjustments,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: ProfileId) -> Option<&RiskProfile> {
        self.profiles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Premium for covering `coverage` at `location`:
    /// `coverage * (base + adjustment) / 10_000`, truncating toward zero.
    /// Read-only and total for registered profiles.
    pub fn calculate_premium(
        &self,
        id: ProfileId,
        coverage: TokenAmount,
        location: &Location,
    ) -> Result<TokenAmount, RiskPricingError> {
        let profile = self
            .profiles
            .get(&id)
            .ok_or(RiskPricingError::UnknownProfile { id })?;
        Ok(profile.total_rate(location).apply_to(coverage))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
