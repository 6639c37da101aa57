//! Append-only oracle data feed with replay protection.
//!
//! Unlike appraisals, oracle data needs no quorum: insurance triggers
//! evaluate a time series, not a single snapshot, so every accepted
//! submission is an independent fact appended to the feed. The only
//! consensus-adjacent rule is replay protection — each oracle's
//! timestamps must be strictly increasing, so a stale or replayed report
//! can never displace a newer one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peril::{Location, PerilType};
use crate::registry::{Oracle, OracleId};

/// One reported fact: a peril magnitude at a location and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleDataPoint {
    pub oracle: OracleId,
    pub peril: PerilType,
    pub location: Location,
    /// Peril-specific magnitude (mm of rainfall, days of drought, ...).
    pub magnitude: u64,
    /// Oracle-supplied observation timestamp, strictly increasing per
    /// oracle.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedError {
    /// Oracle is unknown or has been deactivated.
    UnauthorizedOracle {
        id: OracleId,
    },
    /// Reported peril does not match the oracle's registered peril type.
    PerilMismatch {
        oracle: OracleId,
        registered: PerilType,
        reported: PerilType,
    },
    /// Timestamp not strictly greater than the oracle's previous report.
    InvalidTimestamp {
        oracle: OracleId,
        submitted: u64,
        last_seen: u64,
    },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnauthorizedOracle { id } => {
                write!(f, "oracle '{id}' is not authorized to submit data")
            }
            Self::PerilMismatch {
                oracle,
                registered,
                reported,
            } => write!(
                f,
                "oracle '{oracle}' is registered for {registered}, reported {reported}"
            ),
            Self::InvalidTimestamp {
                oracle,
                submitted,
                last_seen,
            } => write!(
                f,
                "oracle '{oracle}' timestamp {submitted} does not advance past {last_seen}"
            ),
        }
    }
}

impl std::error::Error for FeedError {}

/// The append-only data-point ledger, plus each oracle's high-water
/// timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleFeed {
    points: Vec<OracleDataPoint>,
    last_seen: BTreeMap<OracleId, u64>,
}

impl OracleFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fact. The caller resolves the [`Oracle`] record from the
    /// registry; this checks the active flag, the peril binding, and the
    /// monotonic-timestamp rule before appending.
    pub fn append(
        &mut self,
        oracle: &Oracle,
        peril: PerilType,
        location: Location,
        magnitude: u64,
        timestamp: u64,
    ) -> Result<&OracleDataPoint, FeedError> {
        if !oracle.active {
            return Err(FeedError::UnauthorizedOracle {
                id: oracle.id.clone(),
            });
        }
        if peril != oracle.peril {
            return Err(FeedError::PerilMismatch {
                oracle: oracle.id.clone(),
                registered: oracle.peril,
                reported: peril,
            });
        }
        if let Some(&last) = self.last_seen.get(&oracle.id) {
            if timestamp <= last {
                return Err(FeedError::InvalidTimestamp {
                    oracle: oracle.id.clone(),
                    submitted: timestamp,
                    last_seen: last,
                });
            }
        }

        self.last_seen.insert(oracle.id.clone(), timestamp);
        self.points.push(OracleDataPoint {
            oracle: oracle.id.clone(),
            peril,
            location,
            magnitude,
            timestamp,
        });
        Ok(self.points.last().expect("just pushed"))
    }

    /// The most recent data point matching a peril and location whose
    /// timestamp falls in the inclusive `[start, end]` window. Among equal
    /// timestamps the later-appended point wins.
    pub fn latest_matching(
        &self,
        peril: PerilType,
        location: &Location,
        window: (u64, u64),
    ) -> Option<&OracleDataPoint> {
        let (start, end) = window;
        self.points
            .iter()
            .filter(|p| {
                p.peril == peril
                    && p.location == *location
                    && p.timestamp >= start
                    && p.timestamp <= end
            })
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OracleDataPoint> {
        self.points.iter()
    }

    /// Last accepted timestamp for an oracle, if it has ever reported.
    pub fn last_seen(&self, oracle: &OracleId) -> Option<u64> {
        self.last_seen.get(oracle).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
