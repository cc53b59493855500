//! Error taxonomy for authentication and admin operations.
//!
//! Callers only ever see the generic forms: `AuthFailure` never says whether the
//! email exists, and `Lockout` carries a retry hint but no attempt counters.

use std::time::Duration;
use thiserror::Error;

/// Malformed or policy-violating input. Safe to surface with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error(
        "password must meet at least 4 of: 12+ characters, uppercase, lowercase, digit, symbol"
    )]
    WeakPassword { score: u8 },
    #[error("name must be at least 2 characters")]
    InvalidName,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("new password must differ from the current password")]
    PasswordReuse,
    #[error("admins cannot change their own role or status")]
    SelfModification,
    #[error("{0}")]
    Invalid(String),
}

/// A dependency (credential store, audit sink) did not answer in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} unavailable after {attempts} attempt(s)")]
pub struct DependencyError {
    pub operation: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("authentication failed")]
    AuthFailure,
    #[error("too many attempts")]
    Lockout { retry_after: Duration },
    #[error("service unavailable: {0}")]
    Dependency(#[from] DependencyError),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
}

impl AuthError {
    /// Retry hint in whole seconds, rounded up so clients never retry early.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Lockout { retry_after } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    Some(secs + 1)
                } else {
                    Some(secs.max(1))
                }
            }
            _ => None,
        }
    }
}
