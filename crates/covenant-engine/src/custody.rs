//! Collateral custody seam.
//!
//! Token transfer and NFT escrow belong to the host environment, not the
//! core. The engine only needs two capabilities — take an item into
//! escrow for the lifetime of a loan, and hand it back (to the borrower
//! on repayment, to the protocol on liquidation). [`CollateralCustodian`]
//! is that seam; [`InMemoryCustodian`] is the process-local
//! implementation used by the engine facade and the test suites.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::principal::PrincipalId;
use crate::registry::CollectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("collateral {collection}/{item_id} is already held in custody")]
    AlreadyHeld { collection: CollectionId, item_id: u64 },
    #[error("collateral {collection}/{item_id} is not held in custody")]
    NotHeld { collection: CollectionId, item_id: u64 },
}

/// External collateral custody collaborator.
pub trait CollateralCustodian {
    /// Take `(collection, item)` into escrow on behalf of `owner`.
    fn lock(
        &mut self,
        collection: &CollectionId,
        item_id: u64,
        owner: &PrincipalId,
    ) -> Result<(), CustodyError>;

    /// Release `(collection, item)` from escrow to `recipient`.
    fn release(
        &mut self,
        collection: &CollectionId,
        item_id: u64,
        recipient: &PrincipalId,
    ) -> Result<(), CustodyError>;

    /// Whether `(collection, item)` is currently escrowed.
    fn is_held(&self, collection: &CollectionId, item_id: u64) -> bool;
}

/// Process-local custodian keeping escrowed items in a table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustodian {
    held: BTreeMap<(CollectionId, u64), PrincipalId>,
}

impl InMemoryCustodian {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollateralCustodian for InMemoryCustodian {
    fn lock(
        &mut self,
        collection: &CollectionId,
        item_id: u64,
        owner: &PrincipalId,
    ) -> Result<(), CustodyError> {
        let key = (collection.clone(), item_id);
        if self.held.contains_key(&key) {
            return Err(CustodyError::AlreadyHeld {
                collection: collection.clone(),
                item_id,
            });
        }
        self.held.insert(key, owner.clone());
        Ok(())
    }

    fn release(
        &mut self,
        collection: &CollectionId,
        item_id: u64,
        _recipient: &PrincipalId,
    ) -> Result<(), CustodyError> {
        let key = (collection.clone(), item_id);
        if self.held.remove(&key).is_none() {
            return Err(CustodyError::NotHeld {
                collection: collection.clone(),
                item_id,
            });
        }
        Ok(())
    }

    fn is_held(&self, collection: &CollectionId, item_id: u64) -> bool {
        self.held.contains_key(&(collection.clone(), item_id))
    }
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

    fn owner() -> PrincipalId {
        PrincipalId::new("borrower-1").expect("principal")
    }

    #[test]
    fn lock_release_roundtrip() {
        let mut custodian = InMemoryCustodian::new();
        custodian.lock(&collection(), 1, &owner()).expect("lock");
        assert!(custodian.is_held(&collection(), 1));

        custodian.release(&collection(), 1, &owner()).expect("release");
        assert!(!custodian.is_held(&collection(), 1));
    }

    #[test]
    fn double_lock_rejected() {
        let mut custodian = InMemoryCustodian::new();
        custodian.lock(&collection(), 1, &owner()).expect("lock");
        assert_eq!(
            custodian.lock(&collection(), 1, &owner()),
            Err(CustodyError::AlreadyHeld {
                collection: collection(),
                item_id: 1
            })
        );
    }

    #[test]
    fn release_of_unheld_item_rejected() {
        let mut custodian = InMemoryCustodian::new();
        assert_eq!(
            custodian.release(&collection(), 9, &owner()),
            Err(CustodyError::NotHeld {
                collection: collection(),
                item_id: 9
            })
        );
    }
}
