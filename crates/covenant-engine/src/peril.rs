//! Peril types and locations for the insurance side of the engine.
//!
//! A peril type is a closed category of insurable risk event; a location is
//! a validated ascii label the host uses to geo-partition oracle data and
//! policies. Both have stable string forms used at the external boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PerilType — closed set of insurable risk categories
// ---------------------------------------------------------------------------

/// Category of insurable risk event. Selects which risk profile prices a
/// policy and which oracle data points can trigger it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PerilType {
    Drought,
    Rainfall,
    Windstorm,
    Flood,
}

impl PerilType {
    /// Parse the boundary string form (`"drought"`, `"rainfall"`, ...).
    pub fn parse(name: &str) -> Result<Self, PerilError> {
        match name {
            "drought" => Ok(Self::Drought),
            "rainfall" => Ok(Self::Rainfall),
            "windstorm" => Ok(Self::Windstorm),
            "flood" => Ok(Self::Flood),
            other => Err(PerilError::UnknownPeril {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PerilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drought => "drought",
            Self::Rainfall => "rainfall",
            Self::Windstorm => "windstorm",
            Self::Flood => "flood",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Location — geo-partition label
// ---------------------------------------------------------------------------

const MAX_LOCATION_LEN: usize = 64;

/// Validated location label (`"Kaduna"`, `"lagos-north"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    /// Create a new `Location`. Returns `Err` if the label is empty,
    /// longer than 64 bytes, or contains characters outside
    /// `[A-Za-z0-9._-]`.
    pub fn new(label: impl Into<String>) -> Result<Self, PerilError> {
        let label = label.into();
        if label.is_empty() {
            return Err(PerilError::InvalidLocation {
                label,
                reason: "must not be empty",
            });
        }
        if label.len() > MAX_LOCATION_LEN {
            return Err(PerilError::InvalidLocation {
                label,
                reason: "longer than the 64-byte cap",
            });
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(PerilError::InvalidLocation {
                label,
                reason: "contains characters outside [A-Za-z0-9._-]",
            });
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerilError {
    UnknownPeril { name: String },
    InvalidLocation { label: String, reason: &'static str },
}

impl fmt::Display for PerilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeril { name } => write!(f, "unknown peril type '{name}'"),
            Self::InvalidLocation { label, reason } => {
                write!(f, "invalid location '{label}': {reason}")
            }
        }
    }
}

impl std::error::Error for PerilError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peril_roundtrips_through_string_form() {
        for peril in [
            PerilType::Drought,
            PerilType::Rainfall,
            PerilType::Windstorm,
            PerilType::Flood,
        ] {
            assert_eq!(PerilType::parse(&peril.to_string()), Ok(peril));
        }
    }

    #[test]
    fn unknown_peril_is_rejected() {
        assert_eq!(
            PerilType::parse("earthquake"),
            Err(PerilError::UnknownPeril {
                name: "earthquake".to_string()
            })
        );
    }

    #[test]
    fn location_validation() {
        assert!(Location::new("Kaduna").is_ok());
        assert!(Location::new("lagos-north").is_ok());
        assert!(Location::new("").is_err());
        assert!(Location::new("two words").is_err());
    }
}
