//! Typed error hierarchy for the signing subsystem.
//!
//! Three top-level enums cover the three layers:
//! - `VerificationError`: SMS challenge issuance and confirmation
//! - `CommitError`: durable signature recording
//! - `SigningError`: conditions the wizard cannot recover from locally

use thiserror::Error;

use crate::signing::models::FieldError;

/// Errors from the SMS verification service.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Invalid phone number format: {phone_number}")]
    InvalidPhoneFormat { phone_number: String },

    #[error("Verification code does not match")]
    CodeMismatch,

    #[error("Verification challenge expired or is no longer active")]
    ChallengeExpired,

    #[error("Too many failed attempts ({attempts}), request a new code")]
    AttemptsExhausted { attempts: u32 },

    #[error("SMS gateway did not respond within {timeout_ms}ms")]
    DispatchTimeout { timeout_ms: u64 },

    #[error("SMS dispatch failed: {0}")]
    DispatchFailed(String),
}

impl VerificationError {
    /// Transport failures the signer may retry by re-requesting a code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationError::DispatchTimeout { .. } | VerificationError::DispatchFailed(_)
        )
    }
}

/// Errors from committing a signature.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Signer {signer_id} has already signed initiative {initiative_id}")]
    AlreadySigned {
        initiative_id: i64,
        signer_id: String,
    },

    #[error("Validation failed: {}", describe_reasons(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("Initiative {id} not found")]
    InitiativeNotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

fn describe_reasons(reasons: &[FieldError]) -> String {
    reasons
        .iter()
        .map(|r| format!("{} {}", r.field, r.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors the signature wizard surfaces to its caller.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Initiative {id} not found")]
    InitiativeNotFound { id: i64 },

    #[error("Initiative {id} is not accepting signatures")]
    NotPermitted { id: i64 },

    #[error("No signer identity on request")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
