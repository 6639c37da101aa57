//! Policy book and deterministic claim-trigger evaluation.
//!
//! Trigger evaluation is a pure predicate over the policy and the oracle
//! feed. Internally it is three-valued — missing data is kept distinct
//! from an observed non-trigger — and collapses to `bool` only at the
//! external boundary, where absent policies and absent data both read as
//! "not met" rather than an error. Settlement is the only mutation: a
//! triggered, active policy transitions to `Claimed` exactly once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::oracle_feed::OracleFeed;
use crate::peril::{Location, PerilType};
use crate::principal::PrincipalId;
use crate::units::TokenAmount;

// ---------------------------------------------------------------------------
// PolicyId / PolicyStatus / Policy
// ---------------------------------------------------------------------------

/// Monotonically allocated policy id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PolicyId(u64);

impl PolicyId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyStatus {
    Active,
    Claimed,
    Expired,
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Registration parameters for a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParams {
    pub insured: PrincipalId,
    pub coverage: TokenAmount,
    pub peril: PerilType,
    pub location: Location,
    /// Minimum magnitude that constitutes a trigger.
    pub trigger_threshold: u64,
    /// Inclusive oracle-timestamp window the policy covers.
    pub window_start: u64,
    pub window_end: u64,
    pub premium_paid: TokenAmount,
}

/// One insurance policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub insured: PrincipalId,
    pub coverage: TokenAmount,
    pub peril: PerilType,
    pub location: Location,
    pub trigger_threshold: u64,
    pub window_start: u64,
    pub window_end: u64,
    pub premium_paid: TokenAmount,
    pub status: PolicyStatus,
}

// ---------------------------------------------------------------------------
// TriggerOutcome — three-valued evaluation result
// ---------------------------------------------------------------------------

/// Result of evaluating a policy's trigger condition.
///
/// `NoData` covers every "nothing to evaluate" case: unknown policy,
/// non-active policy, or no qualifying data point. The external boundary
/// collapses this to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOutcome {
    NoData,
    NotTriggered {
        observed: u64,
        threshold: u64,
    },
    Triggered {
        magnitude: u64,
        observed_at: u64,
    },
}

impl TriggerOutcome {
    /// The boundary form: only a real observed trigger reads as met.
    pub fn is_met(&self) -> bool {
        matches!(self, Self::Triggered { .. })
    }
}

// ---------------------------------------------------------------------------
// ClaimsError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimsError {
    PolicyNotFound {
        id: PolicyId,
    },
    PolicyNotActive {
        id: PolicyId,
        status: PolicyStatus,
    },
    TriggerNotMet {
        id: PolicyId,
    },
    InvalidPolicy {
        field: &'static str,
        reason: &'static str,
    },
    WindowStillOpen {
        id: PolicyId,
        window_end: u64,
        now: u64,
    },
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyNotFound { id } => write!(f, "{id} not found"),
            Self::PolicyNotActive { id, status } => {
                write!(f, "{id} is {status}, not active")
            }
            Self::TriggerNotMet { id } => {
                write!(f, "trigger condition for {id} is not met")
            }
            Self::InvalidPolicy { field, reason } => {
                write!(f, "invalid policy parameter `{field}`: {reason}")
            }
            Self::WindowStillOpen {
                id,
                window_end,
                now,
            } => write!(
                f,
                "{id} window runs to {window_end}, cannot expire at {now}"
            ),
        }
    }
}

impl std::error::Error for ClaimsError {}

// ---------------------------------------------------------------------------
// PolicyBook
// ---------------------------------------------------------------------------

/// The policy table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyBook {
    policies: BTreeMap<PolicyId, Policy>,
    next_id: u64,
}

impl PolicyBook {
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a policy, active from the start.
    pub fn register(&mut self, params: PolicyParams) -> Result<PolicyId, ClaimsError> {
        if params.coverage.is_zero() {
            return Err(ClaimsError::InvalidPolicy {
                field: "coverage",
                reason: "must be greater than zero",
            });
        }
        if params.trigger_threshold == 0 {
            return Err(ClaimsError::InvalidPolicy {
                field: "trigger_threshold",
                reason: "must be greater than zero",
            });
        }
        if params.window_start > params.window_end {
            return Err(ClaimsError::InvalidPolicy {
                field: "window_start",
                reason: "must not be after window_end",
            });
        }

        let id = PolicyId(self.next_id);
        self.next_id += 1;
        self.policies.insert(
            id,
            Policy {
                id,
                insured: params.insured,
                coverage: params.coverage,
                peril: params.peril,
                location: params.location,
                trigger_threshold: params.trigger_threshold,
                window_start: params.window_start,
                window_end: params.window_end,
                premium_paid: params.premium_paid,
                status: PolicyStatus::Active,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Evaluate a policy's trigger against the feed. Pure and total:
    /// safe to poll.
    pub fn evaluate_trigger(&self, id: PolicyId, feed: &OracleFeed) -> TriggerOutcome {
        let Some(policy) = self.policies.get(&id) else {
            return TriggerOutcome::NoData;
        };
        if policy.status != PolicyStatus::Active {
            return TriggerOutcome::NoData;
        }
        let Some(point) = feed.latest_matching(
            policy.peril,
            &policy.location,
            (policy.window_start, policy.window_end),
        ) else {
            return TriggerOutcome::NoData;
        };

        if point.magnitude >= policy.trigger_threshold {
            TriggerOutcome::Triggered {
                magnitude: point.magnitude,
                observed_at: point.timestamp,
            }
        } else {
            TriggerOutcome::NotTriggered {
                observed: point.magnitude,
                threshold: policy.trigger_threshold,
            }
        }
    }

    /// The external predicate: `true` iff the trigger is currently met.
    /// Never fails — unknown policies and missing data read as `false`.
    pub fn some_condition_met(&self, id: PolicyId, feed: &OracleFeed) -> bool {
        self.evaluate_trigger(id, feed).is_met()
    }

    /// Settle a triggered claim: transition `Active -> Claimed` and return
    /// the coverage amount for the external payout collaborator.
    pub fn settle(
        &mut self,
        id: PolicyId,
        feed: &OracleFeed,
    ) -> Result<TokenAmount, ClaimsError> {
        let policy = self
            .policies
            .get(&id)
            .ok_or(ClaimsError::PolicyNotFound { id })?;
        if policy.status != PolicyStatus::Active {
            return Err(ClaimsError::PolicyNotActive {
                id,
                status: policy.status,
            });
        }
        if !self.evaluate_trigger(id, feed).is_met() {
            return Err(ClaimsError::TriggerNotMet { id });
        }

        let policy = self.policies.get_mut(&id).expect("looked up above");
        policy.status = PolicyStatus::Claimed;
        Ok(policy.coverage)
    }

    /// Expire a policy whose window has fully passed. Lazy, caller-clocked
    /// like every deadline in the engine.
    pub fn expire(&mut self, id: PolicyId, now: u64) -> Result<(), ClaimsError> {
        let policy = self
            .policies
            .get_mut(&id)
            .ok_or(ClaimsError::PolicyNotFound { id })?;
        if policy.status != PolicyStatus::Active {
            return Err(ClaimsError::PolicyNotActive {
                id,
                status: policy.status,
            });
        }
        if now <= policy.window_end {
            return Err(ClaimsError::WindowStillOpen {
                id,
                window_end: policy.window_end,
                now,
            });
        }
        policy.status = PolicyStatus::Expired;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
