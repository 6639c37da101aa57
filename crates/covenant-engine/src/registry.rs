//! Collection, appraiser, and oracle registry.
//!
//! Pure lookup tables keyed by stable ids, created at deployment and alive
//! for the process lifetime. The registry knows nothing about callers —
//! administrator gating happens at the protocol boundary. Records are
//! append-style: collections and oracles are never deleted, and collection
//! parameters are immutable once registered.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peril::PerilType;
use crate::principal::PrincipalId;
use crate::rate_curve::RateCurveKind;
use crate::units::{BasisPoints, TokenAmount};

// ---------------------------------------------------------------------------
// CollectionId / OracleId — validated ascii keys
// ---------------------------------------------------------------------------

const MAX_ID_LEN: usize = 64;

fn validate_id(id: &str, what: &'static str) -> Result<(), RegistryError> {
    if id.is_empty() {
        return Err(RegistryError::InvalidId {
            what,
            id: id.to_string(),
            reason: "must not be empty",
        });
    }
    if id.len() > MAX_ID_LEN {
        return Err(RegistryError::InvalidId {
            what,
            id: id.to_string(),
            reason: "longer than the 64-byte cap",
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(RegistryError::InvalidId {
            what,
            id: id.to_string(),
            reason: "must contain only [a-z0-9-]",
        });
    }
    Ok(())
}

/// Unique identifier for a registered NFT collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        validate_id(&id, "collection id")?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a registered oracle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OracleId(String);

impl OracleId {
    pub fn new(id: impl Into<String>) -> Result<Self, RegistryError> {
        let id = id.into();
        validate_id(&id, "oracle id")?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OracleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Collection — immutable lending terms for one NFT collection
// ---------------------------------------------------------------------------

/// Registration parameters for a collection, validated on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionParams {
    pub id: CollectionId,
    /// Reference to the NFT contract holding the underlying items.
    pub nft_contract: PrincipalId,
    pub metadata_uri: String,
    /// Cap on `loan / appraised value`, `0 < x <= 10000`.
    pub max_ltv: BasisPoints,
    pub min_rate: BasisPoints,
    pub max_rate: BasisPoints,
    pub curve: RateCurveKind,
    /// Ordered rarity tiers, commonest first.
    pub rarity_tiers: Vec<String>,
    /// Plausibility band for submitted appraisal values.
    pub min_value: TokenAmount,
    pub max_value: TokenAmount,
}

/// An immutable registered collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub nft_contract: PrincipalId,
    pub metadata_uri: String,
    pub max_ltv: BasisPoints,
    pub min_rate: BasisPoints,
    pub max_rate: BasisPoints,
    pub curve: RateCurveKind,
    pub rarity_tiers: Vec<String>,
    pub min_value: TokenAmount,
    pub max_value: TokenAmount,
}

// ---------------------------------------------------------------------------
// Oracle — registered data submitter for one peril type
// ---------------------------------------------------------------------------

/// A registered oracle. Inactive oracles keep their history but may no
/// longer submit data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub id: OracleId,
    pub name: String,
    pub peril: PerilType,
    pub active: bool,
}

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryError {
    InvalidId {
        what: &'static str,
        id: String,
        reason: &'static str,
    },
    InvalidParameters {
        field: &'static str,
        reason: &'static str,
    },
    DuplicateCollection {
        id: CollectionId,
    },
    UnknownCollection {
        id: CollectionId,
    },
    DuplicateOracle {
        id: OracleId,
    },
    UnknownOracle {
        id: OracleId,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { what, id, reason } => {
                write!(f, "invalid {what} '{id}': {reason}")
            }
            Self::InvalidParameters { field, reason } => {
                write!(f, "invalid parameter `{field}`: {reason}")
            }
            Self::DuplicateCollection { id } => {
                write!(f, "collection '{id}' is already registered")
            }
            Self::UnknownCollection { id } => write!(f, "collection '{id}' is not registered"),
            Self::DuplicateOracle { id } => write!(f, "oracle '{id}' is already registered"),
            Self::UnknownOracle { id } => write!(f, "oracle '{id}' is not registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

// ---------------------------------------------------------------------------
// Registry — the tables
// ---------------------------------------------------------------------------

/// Collection, appraiser-authorization, and oracle tables.
///
/// `BTreeMap`-backed for deterministic iteration order, which keeps audit
/// digests replayable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    collections: BTreeMap<CollectionId, Collection>,
    appraisers: BTreeMap<CollectionId, BTreeSet<PrincipalId>>,
    oracles: BTreeMap<OracleId, Oracle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new collection. Fails on duplicate ids and on parameter
    /// bound violations: `min_rate <= max_rate`, `min_value < max_value`,
    /// `0 < max_ltv <= 10000`, non-empty metadata uri.
    pub fn register_collection(
        &mut self,
        params: CollectionParams,
    ) -> Result<&Collection, RegistryError> {
        if self.collections.contains_key(&params.id) {
            return Err(RegistryError::DuplicateCollection { id: params.id });
        }
        if !params.max_ltv.is_valid_ratio() {
            return Err(RegistryError::InvalidParameters {
                field: "max_ltv",
                reason: "must be in (0, 10000] basis points",
            });
        }
        if params.min_rate > params.max_rate {
            return Err(RegistryError::InvalidParameters {
                field: "min_rate",
                reason: "must not exceed max_rate",
            });
        }
        if params.min_value >= params.max_value {
            return Err(RegistryError::InvalidParameters {
                field: "min_value",
                reason: "must be strictly below max_value",
            });
        }
        if params.metadata_uri.is_empty() {
            return Err(RegistryError::InvalidParameters {
                field: "metadata_uri",
                reason: "must not be empty",
            });
        }

        let id = params.id.clone();
        let collection = Collection {
            id: id.clone(),
            nft_contract: params.nft_contract,
            metadata_uri: params.metadata_uri,
            max_ltv: params.max_ltv,
            min_rate: params.min_rate,
            max_rate: params.max_rate,
            curve: params.curve,
            rarity_tiers: params.rarity_tiers,
            min_value: params.min_value,
            max_value: params.max_value,
        };
        self.collections.insert(id.clone(), collection);
        Ok(self.collections.get(&id).expect("just inserted"))
    }

    pub fn collection(&self, id: &CollectionId) -> Option<&Collection> {
        self.collections.get(id)
    }

    /// Look up a collection, turning a miss into the typed error.
    pub fn require_collection(&self, id: &CollectionId) -> Result<&Collection, RegistryError> {
        self.collections
            .get(id)
            .ok_or_else(|| RegistryError::UnknownCollection { id: id.clone() })
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Authorize `appraiser` for every listed collection. Fails (without
    /// any partial grant) if a collection is unknown.
    pub fn authorize_appraiser(
        &mut self,
        appraiser: &PrincipalId,
        collections: &[CollectionId],
    ) -> Result<(), RegistryError> {
        for id in collections {
            self.require_collection(id)?;
        }
        for id in collections {
            self.appraisers
                .entry(id.clone())
                .or_default()
                .insert(appraiser.clone());
        }
        Ok(())
    }

    /// Revoke `appraiser` for one collection. Submissions already recorded
    /// on pending requests are not struck.
    pub fn revoke_appraiser(
        &mut self,
        appraiser: &PrincipalId,
        collection: &CollectionId,
    ) -> Result<(), RegistryError> {
        self.require_collection(collection)?;
        if let Some(set) = self.appraisers.get_mut(collection) {
            set.remove(appraiser);
        }
        Ok(())
    }

    pub fn is_authorized_appraiser(
        &self,
        appraiser: &PrincipalId,
        collection: &CollectionId,
    ) -> bool {
        self.appraisers
            .get(collection)
            .is_some_and(|set| set.contains(appraiser))
    }

    /// The authorized appraiser set for a collection, empty if none.
    pub fn authorized_appraisers(&self, collection: &CollectionId) -> BTreeSet<PrincipalId> {
        self.appraisers.get(collection).cloned().unwrap_or_default()
    }

    /// Register a new oracle, active from the start.
    pub fn register_oracle(
        &mut self,
        id: OracleId,
        name: impl Into<String>,
        peril: PerilType,
    ) -> Result<&Oracle, RegistryError> {
        if self.oracles.contains_key(&id) {
            return Err(RegistryError::DuplicateOracle { id });
        }
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::InvalidParameters {
                field: "name",
                reason: "must not be empty",
            });
        }
        let oracle = Oracle {
            id: id.clone(),
            name,
            peril,
            active: true,
        };
        self.oracles.insert(id.clone(), oracle);
        Ok(self.oracles.get(&id).expect("just inserted"))
    }

    pub fn oracle(&self, id: &OracleId) -> Option<&Oracle> {
        self.oracles.get(id)
    }

    pub fn require_oracle(&self, id: &OracleId) -> Result<&Oracle, RegistryError> {
        self.oracles
            .get(id)
            .ok_or_else(|| RegistryError::UnknownOracle { id: id.clone() })
    }

    /// Flip an oracle's active flag. Deactivation stops further data
    /// submissions; history is retained.
    pub fn set_oracle_active(
        &mut self,
        id: &OracleId,
        active: bool,
    ) -> Result<(), RegistryError> {
        let oracle = self
            .oracles
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownOracle { id: id.clone() })?;
        oracle.active = active;
        Ok(())
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(id: &str) -> PrincipalId {
        PrincipalId::new(id).expect("principal")
    }

    fn test_params(id: &str) -> CollectionParams {
        CollectionParams {
            id: CollectionId::new(id).expect("collection id"),
            nft_contract: principal("ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM.test-nft"),
            metadata_uri: "https://example.com/api/nft/".to_string(),
            max_ltv: BasisPoints::new(5_000),
            min_rate: BasisPoints::new(500),
            max_rate: BasisPoints::new(2_000),
            curve: RateCurveKind::Linear,
            rarity_tiers: ["Common", "Uncommon", "Rare", "Epic", "Legendary"]
                .map(String::from)
                .to_vec(),
            min_value: TokenAmount::new(1_000_000),
            max_value: TokenAmount::new(100_000_000),
        }
    }

    #[test]
    fn register_and_look_up_collection() {
        let mut registry = Registry::new();
        let collection = registry
            .register_collection(test_params("test-collection-1"))
            .expect("register");
        assert_eq!(collection.max_ltv, BasisPoints::new(5_000));
        assert_eq!(registry.collection_count(), 1);

        let id = CollectionId::new("test-collection-1").expect("id");
        assert!(registry.collection(&id).is_some());
    }

    #[test]
    fn duplicate_collection_rejected() {
        let mut registry = Registry::new();
        registry
            .register_collection(test_params("test-collection-1"))
            .expect("first");
        let err = registry
            .register_collection(test_params("test-collection-1"))
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::DuplicateCollection { .. }));
    }

    #[test]
    fn parameter_bounds_enforced() {
        let mut registry = Registry::new();

        let mut params = test_params("bad-ltv");
        params.max_ltv = BasisPoints::new(10_001);
        assert!(matches!(
            registry.register_collection(params),
            Err(RegistryError::InvalidParameters { field: "max_ltv", .. })
        ));

        let mut params = test_params("bad-rates");
        params.min_rate = BasisPoints::new(3_000);
        assert!(matches!(
            registry.register_collection(params),
            Err(RegistryError::InvalidParameters { field: "min_rate", .. })
        ));

        let mut params = test_params("bad-values");
        params.min_value = TokenAmount::new(100_000_000);
        assert!(matches!(
            registry.register_collection(params),
            Err(RegistryError::InvalidParameters { field: "min_value", .. })
        ));
    }

    #[test]
    fn collection_id_charset() {
        assert!(CollectionId::new("test-collection-1").is_ok());
        assert!(CollectionId::new("Test").is_err());
        assert!(CollectionId::new("").is_err());
    }

    #[test]
    fn appraiser_authorization_roundtrip() {
        let mut registry = Registry::new();
        registry
            .register_collection(test_params("test-collection-1"))
            .expect("register");
        let id = CollectionId::new("test-collection-1").expect("id");
        let appraiser = principal("ST2REHHS5J3CERCRBEPMGH7921Q6PYKAADT7JP2VB");

        registry
            .authorize_appraiser(&appraiser, std::slice::from_ref(&id))
            .expect("authorize");
        assert!(registry.is_authorized_appraiser(&appraiser, &id));
        assert_eq!(registry.authorized_appraisers(&id).len(), 1);

        registry.revoke_appraiser(&appraiser, &id).expect("revoke");
        assert!(!registry.is_authorized_appraiser(&appraiser, &id));
    }

    #[test]
    fn authorize_for_unknown_collection_grants_nothing() {
        let mut registry = Registry::new();
        registry
            .register_collection(test_params("known"))
            .expect("register");
        let known = CollectionId::new("known").expect("id");
        let unknown = CollectionId::new("unknown").expect("id");
        let appraiser = principal("appraiser-1");

        let err = registry
            .authorize_appraiser(&appraiser, &[known.clone(), unknown])
            .expect_err("must fail");
        assert!(matches!(err, RegistryError::UnknownCollection { .. }));
        // No partial grant for the known collection.
        assert!(!registry.is_authorized_appraiser(&appraiser, &known));
    }

    #[test]
    fn oracle_registration_and_deactivation() {
        let mut registry = Registry::new();
        let id = OracleId::new("weather-1").expect("id");
        registry
            .register_oracle(id.clone(), "Kaduna Weather Station", PerilType::Drought)
            .expect("register");

        assert!(registry.oracle(&id).expect("oracle").active);
        assert!(matches!(
            registry.register_oracle(id.clone(), "dup", PerilType::Drought),
            Err(RegistryError::DuplicateOracle { .. })
        ));

        registry.set_oracle_active(&id, false).expect("deactivate");
        assert!(!registry.oracle(&id).expect("oracle").active);
    }
}
