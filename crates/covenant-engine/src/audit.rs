//! Hash-chained audit ledger of protocol decisions.
//!
//! Every state transition the facade commits — registration,
//! finalization, origination, settlement — appends one entry here. Each
//! entry's digest is SHA-256 over the previous entry's digest plus the
//! canonical JSON encoding of `(sequence, height, event)`, so any
//! after-the-fact edit breaks the chain and is detectable by
//! [`AuditLog::verify`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::appraisal::RequestId;
use crate::claims::PolicyId;
use crate::peril::{Location, PerilType};
use crate::principal::PrincipalId;
use crate::registry::{CollectionId, OracleId};
use crate::risk_pricing::ProfileId;
use crate::underwriting::LoanId;
use crate::units::{BasisPoints, BlockHeight, TokenAmount};

// ---------------------------------------------------------------------------
// ContentDigest — SHA-256 chain link
// ---------------------------------------------------------------------------

/// SHA-256 digest of an audit entry's canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Chain seed: the digest of the ledger name itself.
    pub fn genesis() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"covenant-audit-genesis");
        Self(hasher.finalize().into())
    }

    fn chain(previous: &ContentDigest, content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(previous.0);
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuditEvent — one protocol decision
// ---------------------------------------------------------------------------

/// A committed protocol decision worth auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    CollectionRegistered {
        collection: CollectionId,
    },
    AppraiserAuthorized {
        appraiser: PrincipalId,
        collection: CollectionId,
    },
    AppraiserRevoked {
        appraiser: PrincipalId,
        collection: CollectionId,
    },
    AppraisalRequested {
        request: RequestId,
        collection: CollectionId,
        item_id: u64,
    },
    AppraisalSubmitted {
        request: RequestId,
        appraiser: PrincipalId,
    },
    AppraisalFinalized {
        request: RequestId,
        final_value: TokenAmount,
    },
    AppraisalExpired {
        request: RequestId,
    },
    LoanOriginated {
        loan: LoanId,
        borrower: PrincipalId,
        principal: TokenAmount,
        rate: BasisPoints,
    },
    LoanRepaid {
        loan: LoanId,
        amount: TokenAmount,
    },
    LoanDefaulted {
        loan: LoanId,
    },
    LoanLiquidated {
        loan: LoanId,
    },
    OracleRegistered {
        oracle: OracleId,
        peril: PerilType,
    },
    OracleStatusChanged {
        oracle: OracleId,
        active: bool,
    },
    OracleDataAccepted {
        oracle: OracleId,
        peril: PerilType,
        location: Location,
        magnitude: u64,
        timestamp: u64,
    },
    RiskProfileRegistered {
        profile: ProfileId,
    },
    PolicyRegistered {
        policy: PolicyId,
    },
    PolicyExpired {
        policy: PolicyId,
    },
    ClaimSettled {
        policy: PolicyId,
        payout: TokenAmount,
    },
}

/// One link in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub at: BlockHeight,
    pub event: AuditEvent,
    pub previous: ContentDigest,
    pub digest: ContentDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditError {
    /// An entry's digest does not chain from its predecessor.
    ChainMismatch { sequence: u64 },
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChainMismatch { sequence } => {
                write!(f, "audit chain broken at sequence {sequence}")
            }
        }
    }
}

impl std::error::Error for AuditError {}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only, hash-chained event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event, chaining its digest from the previous entry.
    pub fn append(&mut self, at: BlockHeight, event: AuditEvent) -> &AuditEntry {
        let sequence = self.entries.len() as u64;
        let previous = self
            .entries
            .last()
            .map(|e| e.digest)
            .unwrap_or_else(ContentDigest::genesis);
        let digest = ContentDigest::chain(&previous, &canonical_content(sequence, at, &event));
        self.entries.push(AuditEntry {
            sequence,
            at,
            event,
            previous,
            digest,
        });
        self.entries.last().expect("just pushed")
    }

    /// Re-derive every digest and check the chain end to end.
    pub fn verify(&self) -> Result<(), AuditError> {
        let mut previous = ContentDigest::genesis();
        for entry in &self.entries {
            let expected =
                ContentDigest::chain(&previous, &canonical_content(entry.sequence, entry.at, &entry.event));
            if entry.previous != previous || entry.digest != expected {
                return Err(AuditError::ChainMismatch {
                    sequence: entry.sequence,
                });
            }
            previous = entry.digest;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }
}

/// Canonical bytes for an entry's chained content. Field order in the
/// serialized tuple is fixed, and every embedded type serializes
/// deterministically, so equal entries always hash identically.
fn canonical_content(sequence: u64, at: BlockHeight, event: &AuditEvent) -> Vec<u8> {
    serde_json::to_vec(&(sequence, at, event)).expect("audit events serialize infallibly")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> CollectionId {
        CollectionId::new("test-collection-1").expect("id")
    }

    fn sample_log() -> AuditLog {
        let mut log = AuditLog::new();
        log.append(
            BlockHeight::new(10),
            AuditEvent::CollectionRegistered {
                collection: collection(),
            },
        );
        log.append(
            BlockHeight::new(11),
            AuditEvent::AppraiserAuthorized {
                appraiser: PrincipalId::new("appraiser-1").expect("principal"),
                collection: collection(),
            },
        );
        log.append(
            BlockHeight::new(12),
            AuditEvent::PolicyRegistered {
                policy: PolicyId::new(1),
            },
        );
        log
    }

    #[test]
    fn sequences_and_chain_links_advance() {
        let log = sample_log();
        assert_eq!(log.len(), 3);
        let entries: Vec<&AuditEntry> = log.iter().collect();
        assert_eq!(entries[0].sequence, 0);
        assert_eq!(entries[0].previous, ContentDigest::genesis());
        assert_eq!(entries[1].previous, entries[0].digest);
        assert_eq!(entries[2].previous, entries[1].digest);
    }

    #[test]
    fn intact_chain_verifies() {
        assert_eq!(sample_log().verify(), Ok(()));
        assert_eq!(AuditLog::new().verify(), Ok(()));
    }

    #[test]
    fn tampered_event_breaks_the_chain() {
        let mut log = sample_log();
        log.entries[1].event = AuditEvent::AppraiserRevoked {
            appraiser: PrincipalId::new("appraiser-1").expect("principal"),
            collection: collection(),
        };
        assert_eq!(
            log.verify(),
            Err(AuditError::ChainMismatch { sequence: 1 })
        );
    }

    #[test]
    fn tampered_digest_breaks_the_chain() {
        let mut log = sample_log();
        log.entries[2].digest = ContentDigest::genesis();
        assert_eq!(
            log.verify(),
            Err(AuditError::ChainMismatch { sequence: 2 })
        );
    }

    #[test]
    fn identical_histories_hash_identically() {
        let first = sample_log();
        let second = sample_log();
        assert_eq!(
            first.last().expect("entry").digest,
            second.last().expect("entry").digest
        );
    }
}
