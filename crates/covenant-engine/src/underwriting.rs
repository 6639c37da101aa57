//! Loan book: origination against a finalized appraisal, repayment,
//! default, and liquidation.
//!
//! Terms are fixed at origination — principal and rate never change — and
//! the state machine only moves forward:
//!
//! ```text
//! Active ──repay──────────▶ Repaid
//!   │ └──mark_defaulted──▶ Defaulted ─┐
//!   └───────liquidate──────────────────┴▶ Liquidated
//! ```
//!
//! Operations with external side effects (custody lock/release) are split
//! into a pure check step and an infallible commit step so the caller can
//! sequence the external call between them without ever leaving a
//! half-written loan behind.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::principal::PrincipalId;
use crate::registry::{Collection, CollectionId};
use crate::units::{saturating_u128_to_u64, BasisPoints, BlockHeight, TokenAmount, BPS_DENOMINATOR};

// ---------------------------------------------------------------------------
// LoanId / LoanState
// ---------------------------------------------------------------------------

/// Monotonically allocated loan id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LoanId(u64);

impl LoanId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loan-{}", self.0)
    }
}

/// Loan lifecycle state. The numeric form is part of the external
/// interface (`Active` is `0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanState {
    Active,
    Repaid,
    Defaulted,
    Liquidated,
}

impl LoanState {
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Repaid => 1,
            Self::Defaulted => 2,
            Self::Liquidated => 3,
        }
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Repaid => "repaid",
            Self::Defaulted => "defaulted",
            Self::Liquidated => "liquidated",
        };
        f.write_str(name)
    }
}

/// One loan. Principal and rate are immutable after origination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: PrincipalId,
    pub collection: CollectionId,
    pub item_id: u64,
    pub principal: TokenAmount,
    /// Per-term simple interest rate.
    pub rate: BasisPoints,
    pub duration_blocks: u64,
    pub state: LoanState,
    pub start_height: BlockHeight,
}

impl Loan {
    pub fn maturity(&self) -> BlockHeight {
        self.start_height.saturating_add(self.duration_blocks)
    }

    /// Interest accrued by `at`: simple interest pro-rated linearly over
    /// the term and capped at the full term.
    pub fn accrued_interest(&self, at: BlockHeight) -> TokenAmount {
        let elapsed = at.elapsed_since(self.start_height).min(self.duration_blocks);
        if self.duration_blocks == 0 {
            return TokenAmount::ZERO;
        }
        let interest = u128::from(self.principal.as_u64())
            * u128::from(self.rate.as_u32())
            * u128::from(elapsed)
            / (u128::from(BPS_DENOMINATOR) * u128::from(self.duration_blocks));
        TokenAmount::new(saturating_u128_to_u64(interest))
    }

    /// Principal plus accrued interest at `at`.
    pub fn outstanding(&self, at: BlockHeight) -> TokenAmount {
        self.principal.saturating_add(self.accrued_interest(at))
    }
}

/// Validated pricing for a prospective loan, produced by [`LoanBook::quote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub ltv: BasisPoints,
    pub rate: BasisPoints,
}

// ---------------------------------------------------------------------------
// UnderwritingError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnderwritingError {
    NoFinalizedAppraisal {
        collection: CollectionId,
        item_id: u64,
    },
    ExceedsMaxLtv {
        requested: TokenAmount,
        max_loan: TokenAmount,
    },
    InvalidDuration {
        requested: u64,
        min: u64,
        max: u64,
    },
    InvalidAmount,
    LoanNotFound {
        id: LoanId,
    },
    LoanNotActive {
        id: LoanId,
        state: LoanState,
    },
    NotBorrower {
        id: LoanId,
        caller: PrincipalId,
    },
    InsufficientRepayment {
        id: LoanId,
        required: TokenAmount,
        offered: TokenAmount,
    },
    DeadlineNotReached {
        id: LoanId,
        current: BlockHeight,
        maturity: BlockHeight,
    },
}

impl fmt::Display for UnderwritingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFinalizedAppraisal {
                collection,
                item_id,
            } => write!(
                f,
                "no finalized appraisal for item {item_id} of collection '{collection}'"
            ),
            Self::ExceedsMaxLtv {
                requested,
                max_loan,
            } => write!(
                f,
                "requested {requested} exceeds the LTV-capped maximum {max_loan}"
            ),
            Self::InvalidDuration {
                requested,
                min,
                max,
            } => write!(
                f,
                "duration {requested} blocks is outside the [{min}, {max}] bound"
            ),
            Self::InvalidAmount => f.write_str("loan amount must be greater than zero"),
            Self::LoanNotFound { id } => write!(f, "{id} not found"),
            Self::LoanNotActive { id, state } => {
                write!(f, "{id} is {state}, not active")
            }
            Self::NotBorrower { id, caller } => {
                write!(f, "'{caller}' is not the borrower of {id}")
            }
            Self::InsufficientRepayment {
                id,
                required,
                offered,
            } => write!(
                f,
                "repayment of {offered} does not cover the {required} outstanding on {id}"
            ),
            Self::DeadlineNotReached {
                id,
                current,
                maturity,
            } => write!(f, "{id} matures at {maturity}, current height is {current}"),
        }
    }
}

impl std::error::Error for UnderwritingError {}

// ---------------------------------------------------------------------------
// LoanBook
// ---------------------------------------------------------------------------

/// Duration bounds applied to every origination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub min_duration_blocks: u64,
    pub max_duration_blocks: u64,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            min_duration_blocks: 144,
            max_duration_blocks: 52_560,
        }
    }
}

/// The loan table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanBook {
    loans: BTreeMap<LoanId, Loan>,
    next_id: u64,
    terms: LoanTerms,
}

impl LoanBook {
    pub fn new(terms: LoanTerms) -> Self {
        Self {
            loans: BTreeMap::new(),
            next_id: 1,
            terms,
        }
    }

    pub fn terms(&self) -> LoanTerms {
        self.terms
    }

    pub fn get(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(&id)
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// Validate a prospective loan and price it. Pure: the book is not
    /// touched, so the caller can lock custody between quoting and
    /// [`open`](Self::open).
    ///
    /// The LTV bound is checked by cross-multiplication,
    /// `amount * 10000 <= max_ltv * final_value`, so the boundary amount
    /// itself is accepted and one unit above it is rejected.
    pub fn quote(
        &self,
        collection: &Collection,
        amount: TokenAmount,
        duration_blocks: u64,
        final_value: TokenAmount,
    ) -> Result<LoanQuote, UnderwritingError> {
        if amount.is_zero() {
            return Err(UnderwritingError::InvalidAmount);
        }
        if duration_blocks < self.terms.min_duration_blocks
            || duration_blocks > self.terms.max_duration_blocks
        {
            return Err(UnderwritingError::InvalidDuration {
                requested: duration_blocks,
                min: self.terms.min_duration_blocks,
                max: self.terms.max_duration_blocks,
            });
        }

        let requested = u128::from(amount.as_u64()) * u128::from(BPS_DENOMINATOR);
        let permitted =
            u128::from(collection.max_ltv.as_u32()) * u128::from(final_value.as_u64());
        if requested > permitted {
            let max_loan = collection.max_ltv.apply_to(final_value);
            return Err(UnderwritingError::ExceedsMaxLtv {
                requested: amount,
                max_loan,
            });
        }

        // The LTV bound passed, so requested / final_value <= 10000 bps
        // and the narrowing cannot truncate.
        let ltv_bps = requested / u128::from(final_value.as_u64().max(1));
        let ltv = BasisPoints::new(ltv_bps as u32);
        let rate = collection
            .curve
            .rate(ltv, collection.min_rate, collection.max_rate);
        Ok(LoanQuote { ltv, rate })
    }

    /// Commit an origination already validated by [`quote`](Self::quote).
    /// Infallible so it can run after the custody lock succeeded.
    pub fn open(
        &mut self,
        borrower: PrincipalId,
        collection: CollectionId,
        item_id: u64,
        principal: TokenAmount,
        quote: LoanQuote,
        duration_blocks: u64,
        at: BlockHeight,
    ) -> LoanId {
        let id = LoanId(self.next_id);
        self.next_id += 1;
        self.loans.insert(
            id,
            Loan {
                id,
                borrower,
                collection,
                item_id,
                principal,
                rate: quote.rate,
                duration_blocks,
                state: LoanState::Active,
                start_height: at,
            },
        );
        id
    }

    /// Check a repayment without committing it: caller must be the
    /// borrower, the loan active, and `amount` must cover the outstanding
    /// principal plus accrued interest. Returns the amount due.
    pub fn repayment_due(
        &self,
        id: LoanId,
        caller: &PrincipalId,
        amount: TokenAmount,
        at: BlockHeight,
    ) -> Result<TokenAmount, UnderwritingError> {
        let loan = self.loans.get(&id).ok_or(UnderwritingError::LoanNotFound { id })?;
        if loan.state != LoanState::Active {
            return Err(UnderwritingError::LoanNotActive {
                id,
                state: loan.state,
            });
        }
        if loan.borrower != *caller {
            return Err(UnderwritingError::NotBorrower {
                id,
                caller: caller.clone(),
            });
        }
        let required = loan.outstanding(at);
        if amount < required {
            return Err(UnderwritingError::InsufficientRepayment {
                id,
                required,
                offered: amount,
            });
        }
        Ok(required)
    }

    /// Commit a repayment checked by [`repayment_due`](Self::repayment_due).
    pub fn settle_repayment(&mut self, id: LoanId) -> &Loan {
        let loan = self.loans.get_mut(&id).expect("checked by repayment_due");
        debug_assert_eq!(loan.state, LoanState::Active);
        loan.state = LoanState::Repaid;
        loan
    }

    /// Flag a matured, unrepaid loan as defaulted. Single-step: no
    /// external side effect is involved.
    pub fn mark_defaulted(
        &mut self,
        id: LoanId,
        at: BlockHeight,
    ) -> Result<&Loan, UnderwritingError> {
        let loan = self.loans.get_mut(&id).ok_or(UnderwritingError::LoanNotFound { id })?;
        if loan.state != LoanState::Active {
            return Err(UnderwritingError::LoanNotActive {
                id,
                state: loan.state,
            });
        }
        let maturity = loan.maturity();
        if at < maturity {
            return Err(UnderwritingError::DeadlineNotReached {
                id,
                current: at,
                maturity,
            });
        }
        loan.state = LoanState::Defaulted;
        Ok(self.loans.get(&id).expect("loan exists"))
    }

    /// Check a liquidation without committing it: the loan must be
    /// `Active` or `Defaulted` and past maturity.
    pub fn ensure_liquidatable(
        &self,
        id: LoanId,
        at: BlockHeight,
    ) -> Result<&Loan, UnderwritingError> {
        let loan = self.loans.get(&id).ok_or(UnderwritingError::LoanNotFound { id })?;
        if !matches!(loan.state, LoanState::Active | LoanState::Defaulted) {
            return Err(UnderwritingError::LoanNotActive {
                id,
                state: loan.state,
            });
        }
        let maturity = loan.maturity();
        if at < maturity {
            return Err(UnderwritingError::DeadlineNotReached {
                id,
                current: at,
                maturity,
            });
        }
        Ok(loan)
    }

    /// Commit a liquidation checked by
    /// [`ensure_liquidatable`](Self::ensure_liquidatable).
    pub fn mark_liquidated(&mut self, id: LoanId) -> &Loan {
        let loan = self.loans.get_mut(&id).expect("checked by ensure_liquidatable");
        debug_assert!(matches!(
            loan.state,
            LoanState::Active | LoanState::Defaulted
        ));
        loan.state = LoanState::Liquidated;
        loan
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
