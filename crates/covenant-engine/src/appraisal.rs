//! Appraisal request ledger: quorum-tracked consensus over collateral value.
//!
//! Several independent authorized appraisers report a value for the same
//! `(collection, item)`; once enough distinct reports arrive the ledger
//! computes one canonical value and locks it in. The aggregation rule is
//! the **median** of the submitted values (even cardinality takes the
//! truncating integer mean of the two middle values): order-independent,
//! and a single outlier appraiser cannot drag the canonical value outside
//! the honest range.
//!
//! Requests are never deleted — the table is the audit trail. Finalization
//! is irreversible by construction: the `Completed` phase has no
//! submission operation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::principal::PrincipalId;
use crate::registry::CollectionId;
use crate::units::{BlockHeight, TokenAmount};

// ---------------------------------------------------------------------------
// RequestId — monotonic appraisal request identifier
// ---------------------------------------------------------------------------

/// Monotonically allocated appraisal request id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AppraisalPhase — pending submissions, or an irreversible outcome
// ---------------------------------------------------------------------------

/// Lifecycle phase of an appraisal request.
///
/// Only `Pending` carries submissions; once a request is `Completed` or
/// `Expired` there is no operation that re-opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppraisalPhase {
    Pending {
        /// Distinct submitters and the value each reported.
        submissions: BTreeMap<PrincipalId, TokenAmount>,
    },
    Completed {
        final_value: TokenAmount,
        finalized_at: BlockHeight,
    },
    Expired {
        expired_at: BlockHeight,
    },
}

impl AppraisalPhase {
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Completed { .. } => "completed",
            Self::Expired { .. } => "expired",
        }
    }
}

/// One appraisal request, kept forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppraisalRequest {
    pub id: RequestId,
    pub collection: CollectionId,
    pub item_id: u64,
    pub phase: AppraisalPhase,
    pub created_at: BlockHeight,
}

impl AppraisalRequest {
    /// The canonical value, present only once finalized.
    pub fn final_value(&self) -> Option<TokenAmount> {
        match &self.phase {
            AppraisalPhase::Completed { final_value, .. } => Some(*final_value),
            _ => None,
        }
    }

    pub fn submission_count(&self) -> usize {
        match &self.phase {
            AppraisalPhase::Pending { submissions } => submissions.len(),
            _ => 0,
        }
    }
}

/// What a valid submission did to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionOutcome {
    /// Appended; quorum not yet reached.
    Accepted { submissions: u32, quorum: u32 },
    /// This submission reached quorum and finalized the request.
    Finalized { final_value: TokenAmount },
}

// ---------------------------------------------------------------------------
// AppraisalError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppraisalError {
    RequestNotFound {
        id: RequestId,
    },
    RequestAlreadyFinalized {
        id: RequestId,
    },
    RequestExpired {
        id: RequestId,
    },
    UnauthorizedAppraiser {
        appraiser: PrincipalId,
        collection: CollectionId,
    },
    DuplicateSubmission {
        appraiser: PrincipalId,
        id: RequestId,
    },
    ValueOutOfBounds {
        value: TokenAmount,
        min: TokenAmount,
        max: TokenAmount,
    },
    DeadlineNotReached {
        id: RequestId,
        current: BlockHeight,
        deadline: BlockHeight,
    },
}

impl fmt::Display for AppraisalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestNotFound { id } => write!(f, "{id} not found"),
            Self::RequestAlreadyFinalized { id } => {
                write!(f, "{id} is already finalized")
            }
            Self::RequestExpired { id } => write!(f, "{id} has expired"),
            Self::UnauthorizedAppraiser {
                appraiser,
                collection,
            } => write!(
                f,
                "'{appraiser}' is not an authorized appraiser for collection '{collection}'"
            ),
            Self::DuplicateSubmission { appraiser, id } => {
                write!(f, "'{appraiser}' already submitted for {id}")
            }
            Self::ValueOutOfBounds { value, min, max } => write!(
                f,
                "submitted value {value} is outside the collection band [{min}, {max}]"
            ),
            Self::DeadlineNotReached {
                id,
                current,
                deadline,
            } => write!(
                f,
                "{id} cannot expire at {current}, deadline is {deadline}"
            ),
        }
    }
}

impl std::error::Error for AppraisalError {}

// ---------------------------------------------------------------------------
// AppraisalLedger
// ---------------------------------------------------------------------------

/// Quorum configuration for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppraisalConfig {
    /// A request finalizes once `min(authorized_count, quorum_threshold)`
    /// distinct appraisers have submitted.
    pub quorum_threshold: u32,
    /// Blocks a request stays open before it becomes expirable.
    pub ttl_blocks: u64,
}

impl Default for AppraisalConfig {
    fn default() -> Self {
        Self {
            quorum_threshold: 3,
            ttl_blocks: 144,
        }
    }
}

/// The appraisal request table. Requests are append-only; only the phase
/// of a pending request ever mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppraisalLedger {
    requests: BTreeMap<RequestId, AppraisalRequest>,
    next_id: u64,
    config: AppraisalConfig,
}

impl AppraisalLedger {
    pub fn new(config: AppraisalConfig) -> Self {
        Self {
            requests: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> AppraisalConfig {
        self.config
    }

    /// Open a new pending request and return its freshly allocated id.
    /// Collection existence is the caller's concern — the ledger does not
    /// hold the registry.
    pub fn open(
        &mut self,
        collection: CollectionId,
        item_id: u64,
        created_at: BlockHeight,
    ) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.requests.insert(
            id,
            AppraisalRequest {
                id,
                collection,
                item_id,
                phase: AppraisalPhase::Pending {
                    submissions: BTreeMap::new(),
                },
                created_at,
            },
        );
        id
    }

    pub fn get(&self, id: RequestId) -> Option<&AppraisalRequest> {
        self.requests.get(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Record one appraiser's value for a pending request.
    ///
    /// `authorized` is the collection's current appraiser set and
    /// `value_band` the collection's `[min_value, max_value]` plausibility
    /// band, both resolved by the caller from the registry; `at` is the
    /// height recorded if this submission reaches quorum. Validation is
    /// complete before any mutation, so a rejected submission changes
    /// nothing.
    pub fn submit(
        &mut self,
        id: RequestId,
        appraiser: PrincipalId,
        value: TokenAmount,
        authorized: &BTreeSet<PrincipalId>,
        value_band: (TokenAmount, TokenAmount),
        at: BlockHeight,
    ) -> Result<SubmissionOutcome, AppraisalError> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(AppraisalError::RequestNotFound { id })?;

        let submissions = match &mut request.phase {
            AppraisalPhase::Pending { submissions } => submissions,
            AppraisalPhase::Completed { .. } => {
                return Err(AppraisalError::RequestAlreadyFinalized { id });
            }
            AppraisalPhase::Expired { .. } => {
                return Err(AppraisalError::RequestExpired { id });
            }
        };

        if !authorized.contains(&appraiser) {
            return Err(AppraisalError::UnauthorizedAppraiser {
                appraiser,
                collection: request.collection.clone(),
            });
        }
        if submissions.contains_key(&appraiser) {
            return Err(AppraisalError::DuplicateSubmission { appraiser, id });
        }
        let (min, max) = value_band;
        if value < min || value > max {
            return Err(AppraisalError::ValueOutOfBounds { value, min, max });
        }

        submissions.insert(appraiser, value);
        let count = submissions.len() as u32;
        let quorum = quorum_target(authorized.len() as u32, self.config.quorum_threshold);

        if count >= quorum {
            let final_value = median(submissions.values().copied());
            request.phase = AppraisalPhase::Completed {
                final_value,
                finalized_at: at,
            };
            Ok(SubmissionOutcome::Finalized { final_value })
        } else {
            Ok(SubmissionOutcome::Accepted {
                submissions: count,
                quorum,
            })
        }
    }

    /// Expire a pending request whose TTL has elapsed. Deadline semantics
    /// are lazy: any caller may trigger this once the supplied height has
    /// passed `created_at + ttl_blocks`.
    pub fn expire(&mut self, id: RequestId, at: BlockHeight) -> Result<(), AppraisalError> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(AppraisalError::RequestNotFound { id })?;
        match &request.phase {
            AppraisalPhase::Pending { .. } => {
                let deadline = request.created_at.saturating_add(self.config.ttl_blocks);
                if at < deadline {
                    return Err(AppraisalError::DeadlineNotReached {
                        id,
                        current: at,
                        deadline,
                    });
                }
                request.phase = AppraisalPhase::Expired { expired_at: at };
                Ok(())
            }
            AppraisalPhase::Completed { .. } => {
                Err(AppraisalError::RequestAlreadyFinalized { id })
            }
            AppraisalPhase::Expired { .. } => Err(AppraisalError::RequestExpired { id }),
        }
    }

    /// The canonical value for `(collection, item)`: the most recently
    /// finalized request, if any.
    pub fn finalized_value(
        &self,
        collection: &CollectionId,
        item_id: u64,
    ) -> Option<TokenAmount> {
        self.requests
            .values()
            .rev()
            .filter(|r| r.collection == *collection && r.item_id == item_id)
            .find_map(AppraisalRequest::final_value)
    }
}

fn quorum_target(authorized_count: u32, threshold: u32) -> u32 {
    authorized_count.min(threshold).max(1)
}

/// Median of a non-empty value set; even cardinality takes the truncating
/// integer mean of the two middle values.
fn median(values: impl Iterator<Item = TokenAmount>) -> TokenAmount {
    let mut sorted: Vec<u64> = values.map(|v| v.as_u64()).collect();
    sorted.sort_unstable();
    debug_assert!(!sorted.is_empty(), "median of an empty submission set");
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        TokenAmount::new(sorted[mid])
    } else {
        let low = u128::from(sorted[mid - 1]);
        let high = u128::from(sorted[mid]);
        TokenAmount::new(((low + high) / 2) as u64)
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

    fn collection() -> CollectionId {
        CollectionId::new("test-collection-1").expect("collection id")
    }

    fn band() -> (TokenAmount, TokenAmount) {
        (TokenAmount::new(1_000_000), TokenAmount::new(100_000_000))
    }

    fn three_appraisers() -> BTreeSet<PrincipalId> {
        ["appraiser-1", "appraiser-2", "appraiser-3"]
            .into_iter()
            .map(principal)
            .collect()
    }

    fn ledger() -> AppraisalLedger {
        AppraisalLedger::new(AppraisalConfig::default())
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ledger = ledger();
        let first = ledger.open(collection(), 1, BlockHeight::new(10));
        let second = ledger.open(collection(), 2, BlockHeight::new(10));
        assert!(second.as_u64() > first.as_u64());
    }

    #[test]
    fn quorum_finalizes_at_median() {
        let mut ledger = ledger();
        let authorized = three_appraisers();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));

        let out = ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(10_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("first");
        assert_eq!(
            out,
            SubmissionOutcome::Accepted {
                submissions: 1,
                quorum: 3
            }
        );

        ledger
            .submit(
                id,
                principal("appraiser-2"),
                TokenAmount::new(11_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("second");

        let out = ledger
            .submit(
                id,
                principal("appraiser-3"),
                TokenAmount::new(12_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("third");
        assert_eq!(
            out,
            SubmissionOutcome::Finalized {
                final_value: TokenAmount::new(11_000_000)
            }
        );
    }

    #[test]
    fn median_is_permutation_independent() {
        let values = [10_000_000u64, 11_000_000, 12_000_000];
        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        let names = ["appraiser-1", "appraiser-2", "appraiser-3"];
        for order in orders {
            let mut ledger = ledger();
            let authorized = three_appraisers();
            let id = ledger.open(collection(), 1, BlockHeight::new(10));
            let mut last = None;
            for slot in order {
                last = Some(
                    ledger
                        .submit(
                            id,
                            principal(names[slot]),
                            TokenAmount::new(values[slot]),
                            &authorized,
                            band(),
                            BlockHeight::new(20),
                        )
                        .expect("submit"),
                );
            }
            assert_eq!(
                last,
                Some(SubmissionOutcome::Finalized {
                    final_value: TokenAmount::new(11_000_000)
                })
            );
        }
    }

    #[test]
    fn even_cardinality_takes_middle_mean() {
        let vals: Vec<TokenAmount> = [4u64, 1, 3, 2].map(TokenAmount::new).to_vec();
        assert_eq!(median(vals.into_iter()), TokenAmount::new(2));

        let vals: Vec<TokenAmount> =
            [10_000_000u64, 12_000_000].map(TokenAmount::new).to_vec();
        assert_eq!(median(vals.into_iter()), TokenAmount::new(11_000_000));
    }

    #[test]
    fn duplicate_submission_rejected_without_mutation() {
        let mut ledger = ledger();
        let authorized = three_appraisers();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));

        ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(10_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("first");
        let err = ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(99_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect_err("duplicate");
        assert!(matches!(err, AppraisalError::DuplicateSubmission { .. }));
        assert_eq!(ledger.get(id).expect("request").submission_count(), 1);
    }

    #[test]
    fn unauthorized_appraiser_rejected() {
        let mut ledger = ledger();
        let authorized = three_appraisers();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));

        let err = ledger
            .submit(
                id,
                principal("intruder"),
                TokenAmount::new(10_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect_err("unauthorized");
        assert!(matches!(err, AppraisalError::UnauthorizedAppraiser { .. }));
    }

    #[test]
    fn value_band_enforced() {
        let mut ledger = ledger();
        let authorized = three_appraisers();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));

        let err = ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(999),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect_err("below band");
        assert!(matches!(err, AppraisalError::ValueOutOfBounds { .. }));
    }

    #[test]
    fn finalized_request_rejects_further_submissions() {
        let mut ledger = ledger();
        let authorized = three_appraisers();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));
        for (name, value) in [
            ("appraiser-1", 10_000_000u64),
            ("appraiser-2", 11_000_000),
            ("appraiser-3", 12_000_000),
        ] {
            ledger
                .submit(
                    id,
                    principal(name),
                    TokenAmount::new(value),
                    &authorized,
                    band(),
                    BlockHeight::new(20),
                )
                .expect("submit");
        }

        let late = principal("appraiser-1");
        let err = ledger
            .submit(
                id,
                late,
                TokenAmount::new(50_000_000),
                &authorized,
                band(),
                BlockHeight::new(21),
            )
            .expect_err("already finalized");
        assert!(matches!(err, AppraisalError::RequestAlreadyFinalized { .. }));
        assert_eq!(
            ledger.get(id).expect("request").final_value(),
            Some(TokenAmount::new(11_000_000))
        );
    }

    #[test]
    fn quorum_is_capped_by_authorized_count() {
        // Two authorized appraisers, threshold three: quorum is two.
        let mut ledger = ledger();
        let authorized: BTreeSet<PrincipalId> =
            ["appraiser-1", "appraiser-2"].into_iter().map(principal).collect();
        let id = ledger.open(collection(), 1, BlockHeight::new(10));

        ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(10_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("first");
        let out = ledger
            .submit(
                id,
                principal("appraiser-2"),
                TokenAmount::new(12_000_000),
                &authorized,
                band(),
                BlockHeight::new(20),
            )
            .expect("second");
        assert_eq!(
            out,
            SubmissionOutcome::Finalized {
                final_value: TokenAmount::new(11_000_000)
            }
        );
    }

    #[test]
    fn expiry_respects_deadline() {
        let mut ledger = ledger();
        let id = ledger.open(collection(), 1, BlockHeight::new(100));

        let err = ledger
            .expire(id, BlockHeight::new(150))
            .expect_err("too early");
        assert!(matches!(err, AppraisalError::DeadlineNotReached { .. }));

        ledger.expire(id, BlockHeight::new(244)).expect("expire");
        assert_eq!(
            ledger.get(id).expect("request").phase.status_label(),
            "expired"
        );

        // Expired requests reject submissions.
        let err = ledger
            .submit(
                id,
                principal("appraiser-1"),
                TokenAmount::new(10_000_000),
                &three_appraisers(),
                band(),
                BlockHeight::new(245),
            )
            .expect_err("expired");
        assert!(matches!(err, AppraisalError::RequestExpired { .. }));
    }

    #[test]
    fn finalized_value_prefers_latest_request() {
        // A single authorized appraiser finalizes each request immediately.
        let mut ledger = ledger();
        let solo: BTreeSet<PrincipalId> = [principal("appraiser-1")].into_iter().collect();
        let first = ledger.open(collection(), 7, BlockHeight::new(10));
        let second = ledger.open(collection(), 7, BlockHeight::new(20));
        ledger
            .submit(
                first,
                principal("appraiser-1"),
                TokenAmount::new(5_000_000),
                &solo,
                band(),
                BlockHeight::new(15),
            )
            .expect("finalize first");
        ledger
            .submit(
                second,
                principal("appraiser-1"),
                TokenAmount::new(6_000_000),
                &solo,
                band(),
                BlockHeight::new(25),
            )
            .expect("finalize second");

        assert_eq!(
            ledger.finalized_value(&collection(), 7),
            Some(TokenAmount::new(6_000_000))
        );
        assert_eq!(ledger.finalized_value(&collection(), 8), None);
    }
}
