//! Stable numeric error codes for the external boundary.
//!
//! Hosts that surface failures as tagged unsigned integers map every
//! [`ProtocolError`] through [`error_code`]. Codes are grouped by
//! subsystem in blocks of one hundred and are permanent: a code is never
//! reused or renumbered, only marked deprecated.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::appraisal::AppraisalError;
use crate::claims::ClaimsError;
use crate::custody::CustodyError;
use crate::oracle_feed::FeedError;
use crate::protocol::ProtocolError;
use crate::registry::RegistryError;
use crate::risk_pricing::RiskPricingError;
use crate::underwriting::UnderwritingError;

pub const ERROR_CODE_REGISTRY_VERSION: u32 = 1;
pub const ERROR_CODE_COMPATIBILITY_POLICY: &str =
    "append-only: assigned codes are permanent, never reused, and may only be marked deprecated";

/// Subsystem that owns a code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSubsystem {
    Protocol,
    Registry,
    Appraisal,
    OracleFeed,
    Underwriting,
    RiskPricing,
    Claims,
    Custody,
}

impl fmt::Display for ErrorSubsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Protocol => "protocol",
            Self::Registry => "registry",
            Self::Appraisal => "appraisal",
            Self::OracleFeed => "oracle_feed",
            Self::Underwriting => "underwriting",
            Self::RiskPricing => "risk_pricing",
            Self::Claims => "claims",
            Self::Custody => "custody",
        };
        f.write_str(name)
    }
}

/// One permanently assigned code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCodeEntry {
    pub code: u32,
    pub name: &'static str,
    pub subsystem: ErrorSubsystem,
}

/// The full assignment table, ordered by code.
pub const ERROR_CODES: &[ErrorCodeEntry] = &[
    ErrorCodeEntry { code: 100, name: "unauthorized", subsystem: ErrorSubsystem::Protocol },
    ErrorCodeEntry { code: 101, name: "invalid_config", subsystem: ErrorSubsystem::Protocol },
    ErrorCodeEntry { code: 110, name: "invalid_id", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 111, name: "invalid_parameters", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 112, name: "duplicate_collection", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 113, name: "unknown_collection", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 114, name: "duplicate_oracle", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 115, name: "unknown_oracle", subsystem: ErrorSubsystem::Registry },
    ErrorCodeEntry { code: 200, name: "request_not_found", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 201, name: "request_already_finalized", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 202, name: "request_expired", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 203, name: "unauthorized_appraiser", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 204, name: "duplicate_submission", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 205, name: "value_out_of_bounds", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 206, name: "appraisal_deadline_not_reached", subsystem: ErrorSubsystem::Appraisal },
    ErrorCodeEntry { code: 300, name: "unauthorized_oracle", subsystem: ErrorSubsystem::OracleFeed },
    ErrorCodeEntry { code: 301, name: "peril_mismatch", subsystem: ErrorSubsystem::OracleFeed },
    ErrorCodeEntry { code: 302, name: "invalid_timestamp", subsystem: ErrorSubsystem::OracleFeed },
    ErrorCodeEntry { code: 400, name: "no_finalized_appraisal", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 401, name: "exceeds_max_ltv", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 402, name: "invalid_duration", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 403, name: "invalid_amount", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 404, name: "loan_not_found", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 405, name: "loan_not_active", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 406, name: "not_borrower", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 407, name: "insufficient_repayment", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 408, name: "loan_deadline_not_reached", subsystem: ErrorSubsystem::Underwriting },
    ErrorCodeEntry { code: 500, name: "unknown_profile", subsystem: ErrorSubsystem::RiskPricing },
    ErrorCodeEntry { code: 501, name: "rate_out_of_range", subsystem: ErrorSubsystem::RiskPricing },
    ErrorCodeEntry { code: 600, name: "policy_not_found", subsystem: ErrorSubsystem::Claims },
    ErrorCodeEntry { code: 601, name: "policy_not_active", subsystem: ErrorSubsystem::Claims },
    ErrorCodeEntry { code: 602, name: "trigger_not_met", subsystem: ErrorSubsystem::Claims },
    ErrorCodeEntry { code: 603, name: "invalid_policy", subsystem: ErrorSubsystem::Claims },
    ErrorCodeEntry { code: 604, name: "window_still_open", subsystem: ErrorSubsystem::Claims },
    ErrorCodeEntry { code: 700, name: "collateral_already_held", subsystem: ErrorSubsystem::Custody },
    ErrorCodeEntry { code: 701, name: "collateral_not_held", subsystem: ErrorSubsystem::Custody },
];

/// The permanent code for an error.
pub fn error_code(error: &ProtocolError) -> u32 {
    match error {
        ProtocolError::Unauthorized { .. } => 100,
        ProtocolError::InvalidConfig { .. } => 101,
        ProtocolError::Registry(e) => match e {
            RegistryError::InvalidId { .. } => 110,
            RegistryError::InvalidParameters { .. } => 111,
            RegistryError::DuplicateCollection { .. } => 112,
            RegistryError::UnknownCollection { .. } => 113,
            RegistryError::DuplicateOracle { .. } => 114,
            RegistryError::UnknownOracle { .. } => 115,
        },
        ProtocolError::Appraisal(e) => match e {
            AppraisalError::RequestNotFound { .. } => 200,
            AppraisalError::RequestAlreadyFinalized { .. } => 201,
            AppraisalError::RequestExpired { .. } => 202,
            AppraisalError::UnauthorizedAppraiser { .. } => 203,
            AppraisalError::DuplicateSubmission { .. } => 204,
            AppraisalError::ValueOutOfBounds { .. } => 205,
            AppraisalError::DeadlineNotReached { .. } => 206,
        },
        ProtocolError::Feed(e) => match e {
            FeedError::UnauthorizedOracle { .. } => 300,
            FeedError::PerilMismatch { .. } => 301,
            FeedError::InvalidTimestamp { .. } => 302,
        },
        ProtocolError::Underwriting(e) => match e {
            UnderwritingError::NoFinalizedAppraisal { .. } => 400,
            UnderwritingError::ExceedsMaxLtv { .. } => 401,
            UnderwritingError::InvalidDuration { .. } => 402,
            UnderwritingError::InvalidAmount => 403,
            UnderwritingError::LoanNotFound { .. } => 404,
            UnderwritingError::LoanNotActive { .. } => 405,
            UnderwritingError::NotBorrower { .. } => 406,
            UnderwritingError::InsufficientRepayment { .. } => 407,
            UnderwritingError::DeadlineNotReached { .. } => 408,
        },
        ProtocolError::RiskPricing(e) => match e {
            RiskPricingError::UnknownProfile { .. } => 500,
            RiskPricingError::RateOutOfRange { .. } => 501,
        },
        ProtocolError::Claims(e) => match e {
            ClaimsError::PolicyNotFound { .. } => 600,
            ClaimsError::PolicyNotActive { .. } => 601,
            ClaimsError::TriggerNotMet { .. } => 602,
            ClaimsError::InvalidPolicy { .. } => 603,
            ClaimsError::WindowStillOpen { .. } => 604,
        },
        ProtocolError::Custody(e) => match e {
            CustodyError::AlreadyHeld { .. } => 700,
            CustodyError::NotHeld { .. } => 701,
        },
    }
}

/// Look up the registry entry for a code.
pub fn lookup(code: u32) -> Option<&'static ErrorCodeEntry> {
    ERROR_CODES.iter().find(|entry| entry.code == code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
