//! Scenario runner: drives the full lending and insurance pipelines
//! against a fresh engine and prints a JSON summary, for smoke-testing a
//! deployment configuration from the command line.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use covenant_engine::claims::PolicyParams;
use covenant_engine::peril::{Location, PerilType};
use covenant_engine::principal::PrincipalId;
use covenant_engine::rate_curve::RateCurveKind;
use covenant_engine::registry::{CollectionId, CollectionParams, OracleId};
use covenant_engine::units::{BasisPoints, BlockHeight, TokenAmount};
use covenant_engine::{EngineConfig, ProtocolEngine};

fn main() {
    if let Err(error) = run(std::env::args().skip(1).collect()) {
        eprintln!("{error}");
        std::process::exit(2);
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut pretty = false;
    let mut scenario: Option<&str> = None;

    for arg in &args {
        match arg.as_str() {
            "--pretty" => pretty = true,
            "lending" | "insurance" | "all" => scenario = Some(arg.as_str()),
            "help" | "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            flag => return Err(format!("unknown argument '{flag}'\n\n{}", usage())),
        }
    }

    let scenario = scenario.ok_or_else(usage)?;
    let mut report = ScenarioReport {
        generated_at: Utc::now().to_rfc3339(),
        scenario: scenario.to_string(),
        lending: None,
        insurance: None,
        audit_entries: 0,
        audit_chain_intact: false,
    };

    let admin = principal("protocol-admin");
    let mut engine = ProtocolEngine::new(admin.clone(), EngineConfig::default())
        .map_err(|e| e.to_string())?;

    if matches!(scenario, "lending" | "all") {
        report.lending = Some(run_lending(&mut engine, &admin)?);
    }
    if matches!(scenario, "insurance" | "all") {
        report.insurance = Some(run_insurance(&mut engine, &admin)?);
    }

    report.audit_entries = engine.audit().len();
    report.audit_chain_intact = engine.audit().verify().is_ok();

    let rendered = if pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    }
    .map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn usage() -> String {
    [
        "covenant_scenario usage:",
        "  covenant_scenario <lending|insurance|all> [--pretty]",
    ]
    .join("\n")
}

fn principal(id: &str) -> PrincipalId {
    PrincipalId::new(id).expect("static principal ids are valid")
}

#[derive(Serialize)]
struct ScenarioReport {
    generated_at: String,
    scenario: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    lending: Option<LendingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insurance: Option<InsuranceSummary>,
    audit_entries: usize,
    audit_chain_intact: bool,
}

#[derive(Serialize)]
struct LendingSummary {
    final_value: u64,
    loan_id: u64,
    interest_rate_bps: u32,
    amount_due_at_term: u64,
    loan_state_after_repayment: u8,
}

#[derive(Serialize)]
struct InsuranceSummary {
    premium: u64,
    trigger_met_before_data: bool,
    trigger_met_after_data: bool,
    payout: u64,
}

fn run_lending(
    engine: &mut ProtocolEngine,
    admin: &PrincipalId,
) -> Result<LendingSummary, String> {
    let collection =
        CollectionId::new("scenario-collection").map_err(|e| e.to_string())?;
    engine
        .register_collection(
            admin,
            BlockHeight::new(1),
            CollectionParams {
                id: collection.clone(),
                nft_contract: principal("nft-contract"),
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
            },
        )
        .map_err(|e| e.to_string())?;

    let appraisers = ["appraiser-1", "appraiser-2", "appraiser-3"].map(principal);
    for appraiser in &appraisers {
        engine
            .authorize_appraiser(
                admin,
                BlockHeight::new(2),
                appraiser,
                std::slice::from_ref(&collection),
            )
            .map_err(|e| e.to_string())?;
    }

    let request = engine
        .request_appraisal(BlockHeight::new(10), &collection, 1)
        .map_err(|e| e.to_string())?;
    let values = [10_000_000u64, 11_000_000, 12_000_000];
    let mut final_value = 0u64;
    for (appraiser, value) in appraisers.iter().zip(values) {
        let receipt = engine
            .submit_appraisal(
                appraiser,
                BlockHeight::new(11),
                request,
                TokenAmount::new(value),
            )
            .map_err(|e| e.to_string())?;
        if let Some(value) = receipt.final_value {
            final_value = value.as_u64();
        }
    }

    let borrower = principal("borrower-1");
    let loan = engine
        .apply_for_loan(
            &borrower,
            BlockHeight::new(20),
            &collection,
            1,
            TokenAmount::new(5_000_000),
            1_440,
        )
        .map_err(|e| e.to_string())?;
    let record = engine.get_loan(loan).ok_or("loan record missing")?;
    let rate = record.rate.as_u32();
    let due = record.outstanding(BlockHeight::new(20 + 1_440));

    engine
        .repay_loan(&borrower, BlockHeight::new(20 + 1_440), loan, due)
        .map_err(|e| e.to_string())?;
    let state = engine
        .get_loan(loan)
        .ok_or("loan record missing")?
        .state
        .as_u8();

    Ok(LendingSummary {
        final_value,
        loan_id: loan.as_u64(),
        interest_rate_bps: rate,
        amount_due_at_term: due.as_u64(),
        loan_state_after_repayment: state,
    })
}

fn run_insurance(
    engine: &mut ProtocolEngine,
    admin: &PrincipalId,
) -> Result<InsuranceSummary, String> {
    let kaduna = Location::new("Kaduna").map_err(|e| e.to_string())?;
    let oracle = OracleId::new("drought-1").map_err(|e| e.to_string())?;

    engine
        .register_oracle(
            admin,
            BlockHeight::new(30),
            oracle.clone(),
            "Kaduna drought index",
            PerilType::Drought,
        )
        .map_err(|e| e.to_string())?;

    let adjustments: BTreeMap<Location, BasisPoints> =
        [(kaduna.clone(), BasisPoints::new(300))].into_iter().collect();
    let profile = engine
        .register_risk_profile(
            admin,
            BlockHeight::new(31),
            PerilType::Drought,
            BasisPoints::new(500),
            adjustments,
        )
        .map_err(|e| e.to_string())?;

    let coverage = TokenAmount::new(100_000_000);
    let premium = engine
        .calculate_premium(profile, coverage, &kaduna)
        .map_err(|e| e.to_string())?;

    let insured = principal("insured-1");
    let policy = engine
        .register_policy(
            &insured,
            BlockHeight::new(32),
            PolicyParams {
                insured: insured.clone(),
                coverage,
                peril: PerilType::Drought,
                location: kaduna.clone(),
                trigger_threshold: 30,
                window_start: 100,
                window_end: 1_000,
                premium_paid: premium,
            },
        )
        .map_err(|e| e.to_string())?;

    let before = engine.some_condition_met(policy);
    engine
        .submit_oracle_data(
            BlockHeight::new(33),
            &oracle,
            PerilType::Drought,
            kaduna,
            45,
            500,
        )
        .map_err(|e| e.to_string())?;
    let after = engine.some_condition_met(policy);

    let payout = engine
        .settle_claim(admin, BlockHeight::new(34), policy)
        .map_err(|e| e.to_string())?;

    Ok(InsuranceSummary {
        premium: premium.as_u64(),
        trigger_met_before_data: before,
        trigger_met_after_data: after,
        payout: payout.as_u64(),
    })
}
