//! The module contains the errors the engine can return.
//!
//! Wallet and ride errors are always returned to the caller of the mutating
//! operation. Push delivery failures never show up here: they are logged by
//! the [`Dispatcher`] and the persisted notification stays authoritative.
//!
//! Errors split in two families, see [`EngineError::is_retryable`]:
//!
//! - retryable: [`InsufficientFunds`], [`CodeMismatch`], gateway trouble and
//!   database failures. The same request can succeed later.
//! - fatal: not-found, invalid transitions, bad signatures, mismatches.
//!
//!  [`Dispatcher`]: crate::Dispatcher
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`CodeMismatch`]: EngineError::CodeMismatch
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("\"{0}\" user not found!")]
    UserNotFound(String),
    #[error("\"{0}\" ride not found!")]
    RideNotFound(String),
    #[error("\"{0}\" notification not found!")]
    NotificationNotFound(String),
    #[error("Verification code does not match")]
    CodeMismatch,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("\"{0}\" reference already used!")]
    DuplicateReference(String),
    #[error("Invalid webhook signature")]
    SignatureInvalid,
    #[error("Amount mismatch: {0}")]
    AmountMismatch(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid rating: {0}")]
    InvalidRating(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Payment gateway timed out")]
    GatewayTimeout,
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Whether the client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds(_)
                | Self::CodeMismatch
                | Self::GatewayTimeout
                | Self::Gateway(_)
                | Self::Database(_)
        )
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::UserNotFound(a), Self::UserNotFound(b)) => a == b,
            (Self::RideNotFound(a), Self::RideNotFound(b)) => a == b,
            (Self::NotificationNotFound(a), Self::NotificationNotFound(b)) => a == b,
            (Self::CodeMismatch, Self::CodeMismatch) => true,
            (Self::InvalidTransition(a), Self::InvalidTransition(b)) => a == b,
            (Self::DuplicateReference(a), Self::DuplicateReference(b)) => a == b,
            (Self::SignatureInvalid, Self::SignatureInvalid) => true,
            (Self::AmountMismatch(a), Self::AmountMismatch(b)) => a == b,
            (Self::InvalidPayload(a), Self::InvalidPayload(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidRating(a), Self::InvalidRating(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::GatewayTimeout, Self::GatewayTimeout) => true,
            (Self::Gateway(a), Self::Gateway(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
