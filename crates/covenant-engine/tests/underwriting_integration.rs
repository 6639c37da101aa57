//! Integration tests for loan origination and lifecycle.
//!
//! Exercises the LTV boundary, rate-curve pricing, custody interplay,
//! repayment arithmetic, and the forward-only state machine through the
//! protocol facade.

#![forbid(unsafe_code)]

use covenant_engine::principal::PrincipalId;
use covenant_engine::protocol::{EngineConfig, ProtocolEngine, ProtocolError};
use covenant_engine::rate_curve::RateCurveKind;
use covenant_engine::registry::{CollectionId, CollectionParams};
use covenant_engine::underwriting::UnderwritingError;
use covenant_engine::units::{BasisPoints, BlockHeight, TokenAmount};

fn principal(id: &str) -> PrincipalId {
    PrincipalId::new(id).expect("principal")
}

fn admin() -> PrincipalId {
    principal("protocol-admin")
}

fn borrower() -> PrincipalId {
    principal("borrower-1")
}

fn collection_id() -> CollectionId {
    CollectionId::new("test-collection-1").expect("collection id")
}

fn at(height: u64) -> BlockHeight {
    BlockHeight::new(height)
}

/// Engine with the standard collection, three appraisers, and a finalized
/// 11M appraisal for item 1.
fn engine_with_finalized_appraisal() -> ProtocolEngine {
    let mut engine = ProtocolEngine::new(admin(), EngineConfig::default()).expect("engine");
    engine
        .register_collection(
            &admin(),
            at(1),
            CollectionParams {
                id: collection_id(),
                nft_contract: principal("nft-contract"),
                metadata_uri: "https://example.com/api/nft/".to_string(),
                max_ltv: BasisPoints::new(5_000),
                min_rate: BasisPoints::new(500),
                max_rate: BasisPoints::new(2_000),
                curve: RateCurveKind::Linear,
                rarity_tiers: ["Common", "Rare"].map(String::from).to_vec(),
                min_value: TokenAmount::new(1_000_000),
                max_value: TokenAmount::new(100_000_000),
            },
        )
        .expect("collection");
    for name in ["appraiser-1", "appraiser-2", "appraiser-3"] {
        engine
            .authorize_appraiser(&admin(), at(2), &principal(name), &[collection_id()])
            .expect("authorize");
    }
    let request = engine
        .request_appraisal(at(10), &collection_id(), 1)
        .expect("request");
    for (name, value) in [
        ("appraiser-1", 10_000_000u64),
        ("appraiser-2", 11_000_000),
        ("appraiser-3", 12_000_000),
    ] {
        engine
            .submit_appraisal(&principal(name), at(11), request, TokenAmount::new(value))
            .expect("submit");
    }
    engine
}

// ---------------------------------------------------------------------------
// Origination
// ---------------------------------------------------------------------------

#[test]
fn loan_is_active_and_owned_by_the_caller() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");

    let record = engine.get_loan(loan).expect("record");
    assert_eq!(record.state.as_u8(), 0);
    assert_eq!(record.borrower, borrower());
    assert_eq!(record.principal, TokenAmount::new(5_000_000));
    assert_eq!(record.start_height, at(20));
}

#[test]
fn ltv_boundary_is_exact() {
    // final value 11M at max LTV 5000 bps: the cap is 5.5M.
    let mut engine = engine_with_finalized_appraisal();
    let err = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_500_001),
            1_440,
        )
        .expect_err("one unit over");
    match err {
        ProtocolError::Underwriting(UnderwritingError::ExceedsMaxLtv {
            requested,
            max_loan,
        }) => {
            assert_eq!(requested, TokenAmount::new(5_500_001));
            assert_eq!(max_loan, TokenAmount::new(5_500_000));
        }
        other => panic!("unexpected error: {other}"),
    }

    engine
        .apply_for_loan(
            &borrower(),
            at(21),
            &collection_id(),
            1,
            TokenAmount::new(5_500_000),
            1_440,
        )
        .expect("boundary amount");
}

#[test]
fn rate_comes_from_the_collection_curve() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_500_000),
            1_440,
        )
        .expect("loan");
    // LTV = 5_500_000 / 11_000_000 = 5000 bps; linear on 500..2000 -> 1250.
    assert_eq!(
        engine.get_loan(loan).expect("record").rate,
        BasisPoints::new(1_250)
    );
}

#[test]
fn duration_bounds_are_collection_configured() {
    let mut engine = engine_with_finalized_appraisal();
    for bad in [1u64, 143, 52_561] {
        let err = engine
            .apply_for_loan(
                &borrower(),
                at(20),
                &collection_id(),
                1,
                TokenAmount::new(1_000_000),
                bad,
            )
            .expect_err("bad duration");
        assert!(matches!(
            err,
            ProtocolError::Underwriting(UnderwritingError::InvalidDuration { .. })
        ));
    }
}

#[test]
fn unappraised_items_cannot_be_borrowed_against() {
    let mut engine = engine_with_finalized_appraisal();
    let err = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            2,
            TokenAmount::new(1_000_000),
            1_440,
        )
        .expect_err("item 2 was never appraised");
    assert!(matches!(
        err,
        ProtocolError::Underwriting(UnderwritingError::NoFinalizedAppraisal { .. })
    ));
}

// ---------------------------------------------------------------------------
// Repayment
// ---------------------------------------------------------------------------

#[test]
fn repayment_covers_principal_plus_prorated_interest() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_500_000),
            1_440,
        )
        .expect("loan");

    // Rate is 1250 bps per term. Half the term accrues half of that.
    let halfway = at(20 + 720);
    let record = engine.get_loan(loan).expect("record");
    assert_eq!(record.accrued_interest(halfway), TokenAmount::new(343_750));
    let due = record.outstanding(halfway);
    assert_eq!(due, TokenAmount::new(5_843_750));

    let err = engine
        .repay_loan(&borrower(), halfway, loan, TokenAmount::new(5_843_749))
        .expect_err("one unit short");
    assert!(matches!(
        err,
        ProtocolError::Underwriting(UnderwritingError::InsufficientRepayment { .. })
    ));

    let receipt = engine
        .repay_loan(&borrower(), halfway, loan, due)
        .expect("full repayment");
    assert_eq!(receipt.amount_due, due);
    assert_eq!(engine.get_loan(loan).expect("record").state.as_u8(), 1);
}

#[test]
fn strangers_cannot_repay_someone_elses_loan() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");
    let err = engine
        .repay_loan(
            &principal("stranger"),
            at(100),
            loan,
            TokenAmount::new(99_000_000),
        )
        .expect_err("not the borrower");
    assert!(matches!(
        err,
        ProtocolError::Underwriting(UnderwritingError::NotBorrower { .. })
    ));
}

#[test]
fn collateral_is_released_on_repayment() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");
    let due = engine.get_loan(loan).expect("record").outstanding(at(100));
    engine
        .repay_loan(&borrower(), at(100), loan, due)
        .expect("repay");

    // The same item can collateralize a fresh loan again.
    engine
        .apply_for_loan(
            &borrower(),
            at(101),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("second loan after release");
}

// ---------------------------------------------------------------------------
// Default and liquidation
// ---------------------------------------------------------------------------

#[test]
fn default_then_liquidation_walks_the_state_machine_forward() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");
    let maturity = at(20 + 1_440);

    assert!(matches!(
        engine.mark_defaulted(at(100), loan),
        Err(ProtocolError::Underwriting(
            UnderwritingError::DeadlineNotReached { .. }
        ))
    ));

    engine.mark_defaulted(maturity, loan).expect("default");
    assert_eq!(engine.get_loan(loan).expect("record").state.as_u8(), 2);

    // Defaulted loans cannot be repaid.
    assert!(matches!(
        engine.repay_loan(&borrower(), maturity, loan, TokenAmount::new(99_000_000)),
        Err(ProtocolError::Underwriting(UnderwritingError::LoanNotActive { .. }))
    ));

    engine
        .liquidate_loan(&admin(), maturity, loan)
        .expect("liquidate");
    assert_eq!(engine.get_loan(loan).expect("record").state.as_u8(), 3);

    // Liquidated is terminal.
    assert!(matches!(
        engine.liquidate_loan(&admin(), maturity, loan),
        Err(ProtocolError::Underwriting(UnderwritingError::LoanNotActive { .. }))
    ));
}

#[test]
fn liquidation_without_prior_default_flag_is_permitted_at_maturity() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");
    engine
        .liquidate_loan(&admin(), at(20 + 1_440), loan)
        .expect("direct liquidation");
    assert_eq!(engine.get_loan(loan).expect("record").state.as_u8(), 3);
}

#[test]
fn terms_are_immutable_after_origination() {
    let mut engine = engine_with_finalized_appraisal();
    let loan = engine
        .apply_for_loan(
            &borrower(),
            at(20),
            &collection_id(),
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .expect("loan");
    let before = engine.get_loan(loan).expect("record").clone();

    // A later appraisal for the same item does not touch the open loan.
    let request = engine
        .request_appraisal(at(30), &collection_id(), 1)
        .expect("request");
    for (name, value) in [
        ("appraiser-1", 50_000_000u64),
        ("appraiser-2", 60_000_000),
        ("appraiser-3", 70_000_000),
    ] {
        engine
            .submit_appraisal(&principal(name), at(31), request, TokenAmount::new(value))
            .expect("submit");
    }

    let after = engine.get_loan(loan).expect("record");
    assert_eq!(after.principal, before.principal);
    assert_eq!(after.rate, before.rate);
    assert_eq!(after.duration_blocks, before.duration_blocks);
}
