//! The module contains the errors the engine can throw.
//!
//! Every failure a caller can observe is a variant of [`EngineError`], so
//! callers match on kinds instead of comparing messages. The most common ones
//! are:
//!
//! - [`NotFound`] thrown when a user, item, quest or discount tier is missing.
//! - [`InsufficientFunds`] / [`InsufficientStock`] thrown by purchases.
//! - [`OperationInProgress`] thrown when another caller holds the same
//!   idempotency key.
//!
//!  [`NotFound`]: EngineError::NotFound
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`InsufficientStock`]: EngineError::InsufficientStock
//!  [`OperationInProgress`]: EngineError::OperationInProgress
use std::fmt;

use sea_orm::DbErr;
use thiserror::Error;

use crate::Decimal;

/// The entity a [`EngineError::NotFound`] refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotFound {
    User(i64),
    Item(String),
    Quest(String),
    DiscountTier(i64),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user {id}"),
            Self::Item(code) => write!(f, "item \"{code}\""),
            Self::Quest(id) => write!(f, "quest \"{id}\""),
            Self::DiscountTier(id) => write!(f, "discount tier {id}"),
        }
    }
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(NotFound),
    #[error("item \"{0}\" is not available")]
    ItemUnavailable(String),
    #[error("insufficient stock for \"{item}\": {available} left, {requested} requested")]
    InsufficientStock {
        item: String,
        available: i64,
        requested: i64,
    },
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Decimal, required: Decimal },
    #[error("completion ratio must be within [0, 1], got {0}")]
    InvalidCompletionRatio(String),
    #[error("invalid timezone \"{0}\"")]
    InvalidTimezone(String),
    #[error("operation in progress for idempotency key \"{0}\"")]
    OperationInProgress(String),
    #[error("idempotency key \"{0}\" was already used for a different request")]
    DuplicateRequest(String),
    #[error("idempotency key \"{0}\" already exists")]
    IdempotencyKeyExists(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid numeric literal \"{0}\"")]
    InvalidNumericLiteral(String),
    #[error("numeric overflow: {0}")]
    NumericOverflow(String),
    #[error("operation timed out")]
    Timeout,
    #[error("transaction failure: {0}")]
    TransactionFailure(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid quest: {0}")]
    InvalidQuest(String),
    #[error("quest \"{0}\" is not active")]
    QuestUnavailable(String),
    #[error("quest \"{quest}\" is cooling down for another {retry_after_secs}s")]
    CooldownActive { quest: String, retry_after_secs: i64 },
    #[error("scheduler error: {0}")]
    Scheduler(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::ItemUnavailable(a), Self::ItemUnavailable(b)) => a == b,
            (
                Self::InsufficientStock {
                    item: a,
                    available: a_available,
                    requested: a_requested,
                },
                Self::InsufficientStock {
                    item: b,
                    available: b_available,
                    requested: b_requested,
                },
            ) => a == b && a_available == b_available && a_requested == b_requested,
            (
                Self::InsufficientFunds {
                    balance: a_balance,
                    required: a_required,
                },
                Self::InsufficientFunds {
                    balance: b_balance,
                    required: b_required,
                },
            ) => a_balance == b_balance && a_required == b_required,
            (Self::InvalidCompletionRatio(a), Self::InvalidCompletionRatio(b)) => a == b,
            (Self::InvalidTimezone(a), Self::InvalidTimezone(b)) => a == b,
            (Self::OperationInProgress(a), Self::OperationInProgress(b)) => a == b,
            (Self::DuplicateRequest(a), Self::DuplicateRequest(b)) => a == b,
            (Self::IdempotencyKeyExists(a), Self::IdempotencyKeyExists(b)) => a == b,
            (Self::DivisionByZero, Self::DivisionByZero) => true,
            (Self::InvalidNumericLiteral(a), Self::InvalidNumericLiteral(b)) => a == b,
            (Self::NumericOverflow(a), Self::NumericOverflow(b)) => a == b,
            (Self::Timeout, Self::Timeout) => true,
            (Self::TransactionFailure(a), Self::TransactionFailure(b)) => a == b,
            (Self::InvalidRequest(a), Self::InvalidRequest(b)) => a == b,
            (Self::InvalidQuest(a), Self::InvalidQuest(b)) => a == b,
            (Self::QuestUnavailable(a), Self::QuestUnavailable(b)) => a == b,
            (
                Self::CooldownActive {
                    quest: a,
                    retry_after_secs: a_secs,
                },
                Self::CooldownActive {
                    quest: b,
                    retry_after_secs: b_secs,
                },
            ) => a == b && a_secs == b_secs,
            (Self::Scheduler(a), Self::Scheduler(b)) => a == b,
            (Self::Serialization(a), Self::Serialization(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
