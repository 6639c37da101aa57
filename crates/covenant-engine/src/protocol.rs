//! Protocol facade: the external entry points.
//!
//! `ProtocolEngine` owns every table and wires the pipeline together:
//! registry authorization feeds the appraisal ledger, finalized values
//! feed underwriting, oracle facts feed claims. Execution is strictly
//! sequential and transactional — each entry point validates completely
//! before mutating, and operations with an external custody side effect
//! sequence check → custody call → infallible commit, so a failure at any
//! step leaves no partial writes.
//!
//! Caller identity and the current block height are explicit leading
//! arguments; the engine owns no clock and trusts the host to order
//! calls.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use crate::appraisal::{
    AppraisalConfig, AppraisalError, AppraisalLedger, AppraisalRequest, RequestId,
    SubmissionOutcome,
};
use crate::audit::{AuditEvent, AuditLog};
use crate::claims::{
    ClaimsError, Policy, PolicyBook, PolicyId, PolicyParams, TriggerOutcome,
};
use crate::custody::{CollateralCustodian, CustodyError, InMemoryCustodian};
use crate::oracle_feed::{FeedError, OracleFeed};
use crate::peril::{Location, PerilType};
use crate::principal::PrincipalId;
use crate::registry::{
    Collection, CollectionId, CollectionParams, Oracle, OracleId, Registry, RegistryError,
};
use crate::risk_pricing::{ProfileId, RiskBook, RiskPricingError, RiskProfile};
use crate::underwriting::{Loan, LoanBook, LoanId, LoanTerms, UnderwritingError};
use crate::units::{BasisPoints, BlockHeight, TokenAmount};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Deployment configuration, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Appraisal quorum threshold (capped by the authorized count).
    pub quorum_threshold: u32,
    /// Blocks an appraisal request stays open before it can expire.
    pub appraisal_ttl_blocks: u64,
    pub min_loan_duration_blocks: u64,
    pub max_loan_duration_blocks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quorum_threshold: 3,
            appraisal_ttl_blocks: 144,
            min_loan_duration_blocks: 144,
            max_loan_duration_blocks: 52_560,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ProtocolError> {
        if self.quorum_threshold == 0 {
            return Err(ProtocolError::InvalidConfig {
                field: "quorum_threshold",
                reason: "must be at least one",
            });
        }
        if self.appraisal_ttl_blocks == 0 {
            return Err(ProtocolError::InvalidConfig {
                field: "appraisal_ttl_blocks",
                reason: "must be at least one block",
            });
        }
        if self.min_loan_duration_blocks == 0
            || self.min_loan_duration_blocks > self.max_loan_duration_blocks
        {
            return Err(ProtocolError::InvalidConfig {
                field: "min_loan_duration_blocks",
                reason: "must be nonzero and at most max_loan_duration_blocks",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProtocolError — the closed external error taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Unauthorized {
        caller: PrincipalId,
        action: &'static str,
    },
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
    Registry(RegistryError),
    Appraisal(AppraisalError),
    Feed(FeedError),
    Underwriting(UnderwritingError),
    RiskPricing(RiskPricingError),
    Claims(ClaimsError),
    Custody(CustodyError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { caller, action } => {
                write!(f, "'{caller}' is not authorized to {action}")
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "invalid engine config `{field}`: {reason}")
            }
            Self::Registry(e) => e.fmt(f),
            Self::Appraisal(e) => e.fmt(f),
            Self::Feed(e) => e.fmt(f),
            Self::Underwriting(e) => e.fmt(f),
            Self::RiskPricing(e) => e.fmt(f),
            Self::Claims(e) => e.fmt(f),
            Self::Custody(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registry(e) => Some(e),
            Self::Appraisal(e) => Some(e),
            Self::Feed(e) => Some(e),
            Self::Underwriting(e) => Some(e),
            Self::RiskPricing(e) => Some(e),
            Self::Claims(e) => Some(e),
            Self::Custody(e) => Some(e),
            Self::Unauthorized { .. } | Self::InvalidConfig { .. } => None,
        }
    }
}

impl From<RegistryError> for ProtocolError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<AppraisalError> for ProtocolError {
    fn from(e: AppraisalError) -> Self {
        Self::Appraisal(e)
    }
}

impl From<FeedError> for ProtocolError {
    fn from(e: FeedError) -> Self {
        Self::Feed(e)
    }
}

impl From<UnderwritingError> for ProtocolError {
    fn from(e: UnderwritingError) -> Self {
        Self::Underwriting(e)
    }
}

impl From<RiskPricingError> for ProtocolError {
    fn from(e: RiskPricingError) -> Self {
        Self::RiskPricing(e)
    }
}

impl From<ClaimsError> for ProtocolError {
    fn from(e: ClaimsError) -> Self {
        Self::Claims(e)
    }
}

impl From<CustodyError> for ProtocolError {
    fn from(e: CustodyError) -> Self {
        Self::Custody(e)
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// What a valid appraisal submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub request: RequestId,
    pub submissions: u32,
    pub quorum: u32,
    /// Set iff this submission finalized the request.
    pub final_value: Option<TokenAmount>,
}

/// Result of a committed repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepaymentReceipt {
    pub loan: LoanId,
    /// Principal plus accrued interest actually due.
    pub amount_due: TokenAmount,
}

// ---------------------------------------------------------------------------
// ProtocolEngine
// ---------------------------------------------------------------------------

/// The deployed protocol instance.
pub struct ProtocolEngine {
    admin: PrincipalId,
    registry: Registry,
    appraisals: AppraisalLedger,
    feed: OracleFeed,
    loans: LoanBook,
    risks: RiskBook,
    policies: PolicyBook,
    custodian: Box<dyn CollateralCustodian>,
    audit: AuditLog,
}

impl fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("admin", &self.admin)
            .field("registry", &self.registry)
            .field("appraisals", &self.appraisals)
            .field("feed", &self.feed)
            .field("loans", &self.loans)
            .field("risks", &self.risks)
            .field("policies", &self.policies)
            .field("custodian", &"<dyn CollateralCustodian>")
            .field("audit", &self.audit)
            .finish()
    }
}

impl ProtocolEngine {
    /// Deploy with the in-memory custodian.
    pub fn new(admin: PrincipalId, config: EngineConfig) -> Result<Self, ProtocolError> {
        Self::with_custodian(admin, config, Box::new(InMemoryCustodian::new()))
    }

    /// Deploy against an external custody collaborator.
    pub fn with_custodian(
        admin: PrincipalId,
        config: EngineConfig,
        custodian: Box<dyn CollateralCustodian>,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        Ok(Self {
            admin,
            registry: Registry::new(),
            appraisals: AppraisalLedger::new(AppraisalConfig {
                quorum_threshold: config.quorum_threshold,
                ttl_blocks: config.appraisal_ttl_blocks,
            }),
            feed: OracleFeed::new(),
            loans: LoanBook::new(LoanTerms {
                min_duration_blocks: config.min_loan_duration_blocks,
                max_duration_blocks: config.max_loan_duration_blocks,
            }),
            risks: RiskBook::new(),
            policies: PolicyBook::new(),
            custodian,
            audit: AuditLog::new(),
        })
    }

    pub fn admin(&self) -> &PrincipalId {
        &self.admin
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    fn ensure_admin(
        &self,
        caller: &PrincipalId,
        action: &'static str,
    ) -> Result<(), ProtocolError> {
        if *caller != self.admin {
            return Err(ProtocolError::Unauthorized {
                caller: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    // -- registry ----------------------------------------------------------

    /// Register a collection. Administrator only.
    pub fn register_collection(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        params: CollectionParams,
    ) -> Result<CollectionId, ProtocolError> {
        self.ensure_admin(caller, "register a collection")?;
        let id = self.registry.register_collection(params)?.id.clone();
        self.audit.append(
            at,
            AuditEvent::CollectionRegistered {
                collection: id.clone(),
            },
        );
        info!(collection = %id, "collection registered");
        Ok(id)
    }

    pub fn get_collection(&self, id: &CollectionId) -> Option<&Collection> {
        self.registry.collection(id)
    }

    /// Authorize an appraiser for several collections at once.
    /// Administrator only; fails without partial grants.
    pub fn authorize_appraiser(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        appraiser: &PrincipalId,
        collections: &[CollectionId],
    ) -> Result<(), ProtocolError> {
        self.ensure_admin(caller, "authorize an appraiser")?;
        self.registry.authorize_appraiser(appraiser, collections)?;
        for collection in collections {
            self.audit.append(
                at,
                AuditEvent::AppraiserAuthorized {
                    appraiser: appraiser.clone(),
                    collection: collection.clone(),
                },
            );
        }
        debug!(appraiser = %appraiser, count = collections.len(), "appraiser authorized");
        Ok(())
    }

    /// Revoke an appraiser for one collection. Administrator only.
    pub fn revoke_appraiser(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        appraiser: &PrincipalId,
        collection: &CollectionId,
    ) -> Result<(), ProtocolError> {
        self.ensure_admin(caller, "revoke an appraiser")?;
        self.registry.revoke_appraiser(appraiser, collection)?;
        self.audit.append(
            at,
            AuditEvent::AppraiserRevoked {
                appraiser: appraiser.clone(),
                collection: collection.clone(),
            },
        );
        Ok(())
    }

    /// Register an oracle. Administrator only.
    pub fn register_oracle(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        oracle_id: OracleId,
        name: impl Into<String>,
        peril: PerilType,
    ) -> Result<(), ProtocolError> {
        self.ensure_admin(caller, "register an oracle")?;
        let oracle = self.registry.register_oracle(oracle_id, name, peril)?;
        let id = oracle.id.clone();
        self.audit
            .append(at, AuditEvent::OracleRegistered { oracle: id.clone(), peril });
        info!(oracle = %id, peril = %peril, "oracle registered");
        Ok(())
    }

    /// Activate or deactivate an oracle. Administrator only.
    pub fn set_oracle_active(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        oracle_id: &OracleId,
        active: bool,
    ) -> Result<(), ProtocolError> {
        self.ensure_admin(caller, "change oracle status")?;
        self.registry.set_oracle_active(oracle_id, active)?;
        self.audit.append(
            at,
            AuditEvent::OracleStatusChanged {
                oracle: oracle_id.clone(),
                active,
            },
        );
        Ok(())
    }

    pub fn get_oracle(&self, id: &OracleId) -> Option<&Oracle> {
        self.registry.oracle(id)
    }

    // -- appraisal consensus ----------------------------------------------

    /// Open an appraisal request for `(collection, item)`.
    pub fn request_appraisal(
        &mut self,
        at: BlockHeight,
        collection: &CollectionId,
        item_id: u64,
    ) -> Result<RequestId, ProtocolError> {
        self.registry.require_collection(collection)?;
        let request = self.appraisals.open(collection.clone(), item_id, at);
        self.audit.append(
            at,
            AuditEvent::AppraisalRequested {
                request,
                collection: collection.clone(),
                item_id,
            },
        );
        debug!(request = %request, collection = %collection, item_id, "appraisal requested");
        Ok(request)
    }

    /// Submit one appraiser's value. Finalizes the request at the median
    /// once quorum is reached.
    pub fn submit_appraisal(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        request_id: RequestId,
        value: TokenAmount,
    ) -> Result<SubmissionReceipt, ProtocolError> {
        let collection_id = self
            .appraisals
            .get(request_id)
            .ok_or(AppraisalError::RequestNotFound { id: request_id })?
            .collection
            .clone();
        let collection = self.registry.require_collection(&collection_id)?;
        let authorized = self.registry.authorized_appraisers(&collection_id);
        let band = (collection.min_value, collection.max_value);

        let outcome =
            self.appraisals
                .submit(request_id, caller.clone(), value, &authorized, band, at)?;

        self.audit.append(
            at,
            AuditEvent::AppraisalSubmitted {
                request: request_id,
                appraiser: caller.clone(),
            },
        );

        let quorum = (authorized.len() as u32).min(self.appraisals.config().quorum_threshold);
        match outcome {
            SubmissionOutcome::Accepted {
                submissions,
                quorum,
            } => {
                debug!(request = %request_id, submissions, quorum, "appraisal submitted");
                Ok(SubmissionReceipt {
                    request: request_id,
                    submissions,
                    quorum,
                    final_value: None,
                })
            }
            SubmissionOutcome::Finalized { final_value } => {
                self.audit.append(
                    at,
                    AuditEvent::AppraisalFinalized {
                        request: request_id,
                        final_value,
                    },
                );
                info!(request = %request_id, final_value = %final_value, "appraisal finalized");
                Ok(SubmissionReceipt {
                    request: request_id,
                    submissions: quorum,
                    quorum,
                    final_value: Some(final_value),
                })
            }
        }
    }

    pub fn get_appraisal_request(&self, id: RequestId) -> Option<&AppraisalRequest> {
        self.appraisals.get(id)
    }

    /// Expire a pending request whose TTL has elapsed. Open to any caller;
    /// the deadline itself is the guard.
    pub fn expire_appraisal(
        &mut self,
        at: BlockHeight,
        request_id: RequestId,
    ) -> Result<(), ProtocolError> {
        self.appraisals.expire(request_id, at)?;
        self.audit
            .append(at, AuditEvent::AppraisalExpired { request: request_id });
        warn!(request = %request_id, "appraisal expired without reaching quorum");
        Ok(())
    }

    // -- underwriting ------------------------------------------------------

    /// Originate a loan against the latest finalized appraisal for
    /// `(collection, item)`. Locks the collateral before committing.
    pub fn apply_for_loan(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        collection_id: &CollectionId,
        item_id: u64,
        amount: TokenAmount,
        duration_blocks: u64,
    ) -> Result<LoanId, ProtocolError> {
        let collection = self.registry.require_collection(collection_id)?;
        let final_value = self
            .appraisals
            .finalized_value(collection_id, item_id)
            .ok_or(UnderwritingError::NoFinalizedAppraisal {
                collection: collection_id.clone(),
                item_id,
            })?;
        let quote = self.loans.quote(collection, amount, duration_blocks, final_value)?;

        self.custodian.lock(collection_id, item_id, caller)?;
        let loan = self.loans.open(
            caller.clone(),
            collection_id.clone(),
            item_id,
            amount,
            quote,
            duration_blocks,
            at,
        );
        self.audit.append(
            at,
            AuditEvent::LoanOriginated {
                loan,
                borrower: caller.clone(),
                principal: amount,
                rate: quote.rate,
            },
        );
        info!(loan = %loan, borrower = %caller, principal = %amount, rate = %quote.rate, "loan originated");
        Ok(loan)
    }

    pub fn get_loan(&self, id: LoanId) -> Option<&Loan> {
        self.loans.get(id)
    }

    /// Repay a loan in full (principal plus accrued interest). Borrower
    /// only; releases the collateral back to the borrower.
    pub fn repay_loan(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        loan_id: LoanId,
        amount: TokenAmount,
    ) -> Result<RepaymentReceipt, ProtocolError> {
        let amount_due = self.loans.repayment_due(loan_id, caller, amount, at)?;
        let (collection, item_id) = {
            let loan = self.loans.get(loan_id).expect("validated by repayment_due");
            (loan.collection.clone(), loan.item_id)
        };
        self.custodian.release(&collection, item_id, caller)?;
        self.loans.settle_repayment(loan_id);
        self.audit.append(
            at,
            AuditEvent::LoanRepaid {
                loan: loan_id,
                amount: amount_due,
            },
        );
        info!(loan = %loan_id, amount = %amount_due, "loan repaid");
        Ok(RepaymentReceipt {
            loan: loan_id,
            amount_due,
        })
    }

    /// Flag a matured, unrepaid loan as defaulted. Open to any caller.
    pub fn mark_defaulted(
        &mut self,
        at: BlockHeight,
        loan_id: LoanId,
    ) -> Result<(), ProtocolError> {
        self.loans.mark_defaulted(loan_id, at)?;
        self.audit.append(at, AuditEvent::LoanDefaulted { loan: loan_id });
        warn!(loan = %loan_id, "loan matured unrepaid, flagged defaulted");
        Ok(())
    }

    /// Liquidate a matured loan, moving the collateral to the protocol.
    /// Administrator only.
    pub fn liquidate_loan(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        loan_id: LoanId,
    ) -> Result<(), ProtocolError> {
        self.ensure_admin(caller, "liquidate a loan")?;
        let (collection, item_id) = {
            let loan = self.loans.ensure_liquidatable(loan_id, at)?;
            (loan.collection.clone(), loan.item_id)
        };
        let admin = self.admin.clone();
        self.custodian.release(&collection, item_id, &admin)?;
        self.loans.mark_liquidated(loan_id);
        self.audit.append(at, AuditEvent::LoanLiquidated { loan: loan_id });
        info!(loan = %loan_id, "loan liquidated");
        Ok(())
    }

    // -- oracle ingestion --------------------------------------------------

    /// Append one oracle fact. Unknown and deactivated oracles are both
    /// rejected as unauthorized.
    pub fn submit_oracle_data(
        &mut self,
        at: BlockHeight,
        oracle_id: &OracleId,
        peril: PerilType,
        location: Location,
        magnitude: u64,
        timestamp: u64,
    ) -> Result<(), ProtocolError> {
        let oracle = self
            .registry
            .oracle(oracle_id)
            .ok_or_else(|| FeedError::UnauthorizedOracle {
                id: oracle_id.clone(),
            })?
            .clone();
        self.feed
            .append(&oracle, peril, location.clone(), magnitude, timestamp)?;
        self.audit.append(
            at,
            AuditEvent::OracleDataAccepted {
                oracle: oracle_id.clone(),
                peril,
                location,
                magnitude,
                timestamp,
            },
        );
        debug!(oracle = %oracle_id, peril = %peril, magnitude, timestamp, "oracle data accepted");
        Ok(())
    }

    // -- risk pricing ------------------------------------------------------

    /// Register a risk profile. Administrator only.
    pub fn register_risk_profile(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        peril: PerilType,
        base_rate: BasisPoints,
        adjustments: BTreeMap<Location, BasisPoints>,
    ) -> Result<ProfileId, ProtocolError> {
        self.ensure_admin(caller, "register a risk profile")?;
        let id = self.risks.register(peril, base_rate, adjustments)?;
        self.audit
            .append(at, AuditEvent::RiskProfileRegistered { profile: id });
        Ok(id)
    }

    pub fn get_risk_profile(&self, id: ProfileId) -> Option<&RiskProfile> {
        self.risks.get(id)
    }

    /// Pure premium computation; read-only and repeatable.
    pub fn calculate_premium(
        &self,
        profile: ProfileId,
        coverage: TokenAmount,
        location: &Location,
    ) -> Result<TokenAmount, ProtocolError> {
        Ok(self.risks.calculate_premium(profile, coverage, location)?)
    }

    // -- policies and claims ----------------------------------------------

    /// Register a policy. The caller must be the insured principal.
    pub fn register_policy(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        params: PolicyParams,
    ) -> Result<PolicyId, ProtocolError> {
        if params.insured != *caller {
            return Err(ProtocolError::Unauthorized {
                caller: caller.clone(),
                action: "register a policy for another principal",
            });
        }
        let id = self.policies.register(params)?;
        self.audit.append(at, AuditEvent::PolicyRegistered { policy: id });
        info!(policy = %id, "policy registered");
        Ok(id)
    }

    pub fn get_policy(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.get(id)
    }

    /// Three-valued trigger evaluation; pure.
    pub fn evaluate_trigger(&self, policy: PolicyId) -> TriggerOutcome {
        self.policies.evaluate_trigger(policy, &self.feed)
    }

    /// The external boundary predicate: never fails, reads missing
    /// policies and missing data as `false`.
    pub fn some_condition_met(&self, policy: PolicyId) -> bool {
        self.policies.some_condition_met(policy, &self.feed)
    }

    /// Settle a triggered claim, returning the payout amount for the
    /// external transfer collaborator. Administrator only.
    pub fn settle_claim(
        &mut self,
        caller: &PrincipalId,
        at: BlockHeight,
        policy: PolicyId,
    ) -> Result<TokenAmount, ProtocolError> {
        self.ensure_admin(caller, "settle a claim")?;
        let payout = self.policies.settle(policy, &self.feed)?;
        self.audit
            .append(at, AuditEvent::ClaimSettled { policy, payout });
        info!(policy = %policy, payout = %payout, "claim settled");
        Ok(payout)
    }

    /// Expire a policy whose trigger window has fully passed. Open to any
    /// caller; `now` is an oracle-timestamp, the unit policy windows use.
    pub fn expire_policy(
        &mut self,
        at: BlockHeight,
        policy: PolicyId,
        now: u64,
    ) -> Result<(), ProtocolError> {
        self.policies.expire(policy, now)?;
        self.audit.append(at, AuditEvent::PolicyExpired { policy });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
