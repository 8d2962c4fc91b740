//! Error taxonomy for the lifecycle engine
use sled::transaction::{ConflictableTransactionError, TransactionError};

/// Faults of the embedded store and the record codec.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Sled(#[from] sled::Error),
    #[error("failed to encode {entity}: {reason}")]
    Encode { entity: &'static str, reason: String },
    #[error("failed to decode {entity}: {reason}")]
    Decode { entity: &'static str, reason: String },
    #[error("failed to generate an identifier: {0}")]
    Identifier(String),
}

/// Rejections of a draft or amendment before anything is written.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("net value {net} exceeds the submitted amount {amount}")]
    NetExceedsAmount { net: u64, amount: u64 },
    #[error("tax percentage {0} must be between 0 and 100")]
    TaxPercentageOutOfRange(f64),
    #[error("payment term must be at least one day")]
    InvalidPaymentTerm,
    #[error("provider {0} has not been validated yet")]
    ProviderNotValidated(String),
}

/// Errors surfaced to callers of the invoice and onboarding machines.
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("role '{role}' is not permitted to perform '{action}'")]
    Forbidden { role: String, action: &'static str },
    #[error("cannot move from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },
    #[error("{entity} {id} changed since it was read; reload and retry")]
    Conflict { entity: &'static str, id: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Notification delivery failures. Never propagated past the orchestrator.
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("mail relay rejected the message: {0}")]
    Email(String),
    #[error("in-app delivery failed: {0}")]
    InApp(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A side effect that could not be completed. Logged and kept for retry.
#[derive(thiserror::Error, Debug)]
pub enum EffectError {
    #[error("invoice {0} no longer exists")]
    MissingInvoice(String),
    #[error("project {0} referenced by the invoice does not exist")]
    MissingProject(String),
    #[error("invoice {id} is {status}, expenses are only created for approved invoices")]
    NotApproved { id: String, status: String },
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by project deletion. Dependent failures are reported, not raised.
#[derive(thiserror::Error, Debug)]
pub enum CascadeError {
    #[error("project {0} not found")]
    NotFound(String),
    #[error("failed to delete project {project_id}: {source}")]
    Fatal {
        project_id: String,
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sled::Error> for LifecycleError {
    fn from(value: sled::Error) -> Self {
        LifecycleError::Store(value.into())
    }
}

impl From<sled::Error> for EffectError {
    fn from(value: sled::Error) -> Self {
        EffectError::Store(value.into())
    }
}

/// Wrap an error so it aborts the surrounding sled transaction.
pub(crate) fn abort<E>(error: E) -> ConflictableTransactionError<E> {
    ConflictableTransactionError::Abort(error)
}

/// Flatten a finished transaction back into the caller's error type.
pub(crate) fn settle<T, E: From<StoreError>>(
    result: Result<T, TransactionError<E>>,
) -> Result<T, E> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::from(e).into(),
    })
}
