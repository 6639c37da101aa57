//! Validated principal identities.
//!
//! Every caller the engine sees — administrator, borrower, appraiser,
//! oracle operator, insured — is a [`PrincipalId`]: a short ascii string
//! assigned by the host identity layer. The engine never interprets the
//! contents beyond validation; it only compares and stores them.

use std::fmt;

use serde::{Deserialize, Serialize};

const MAX_PRINCIPAL_LEN: usize = 128;

/// Opaque, validated identity of a transaction principal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a new `PrincipalId`. Returns `Err` if the id is empty,
    /// longer than 128 bytes, or contains characters outside
    /// `[A-Za-z0-9._-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, PrincipalError> {
        let id = id.into();
        if id.is_empty() {
            return Err(PrincipalError::Empty);
        }
        if id.len() > MAX_PRINCIPAL_LEN {
            return Err(PrincipalError::TooLong { len: id.len() });
        }
        if let Some(ch) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(PrincipalError::InvalidCharacter { ch });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PrincipalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalError {
    Empty,
    TooLong { len: usize },
    InvalidCharacter { ch: char },
}

impl fmt::Display for PrincipalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("principal id must not be empty"),
            Self::TooLong { len } => write!(
                f,
                "principal id is {len} bytes, longer than the {MAX_PRINCIPAL_LEN}-byte cap"
            ),
            Self::InvalidCharacter { ch } => {
                write!(f, "principal id contains invalid character '{ch}'")
            }
        }
    }
}

impl std::error::Error for PrincipalError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
