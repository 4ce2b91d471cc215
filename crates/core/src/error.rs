//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (missing
/// records, stock shortfalls, lifecycle gates). Infrastructure concerns are
/// mapped into these kinds at the service boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown product, order, entry or transaction identifier.
    #[error("not found")]
    NotFound,

    /// A credit or reservation would drive stock on hand or sellable stock
    /// below zero. State is left untouched.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Operation not permitted for the order's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Order entries may no longer be edited at this status.
    #[error("order locked: {0}")]
    OrderLocked(String),

    /// Non-positive amount, or fulfillment beyond the remaining quantity.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Duplicate SKU creation.
    #[error("already exists")]
    AlreadyExists,

    /// A per-record lock could not be acquired within the wait bound.
    /// Safe to retry with backoff; no state was changed.
    #[error("busy: {0}")]
    Busy(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// An internal invariant violation. Fatal: logged at error level where
    /// raised, never swallowed; recovery is the reconciliation pass.
    #[error("inconsistent: {0}")]
    Inconsistent(String),
}

impl DomainError {
    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn order_locked(msg: impl Into<String>) -> Self {
        Self::OrderLocked(msg.into())
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self::InvalidAmount(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::Inconsistent(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Whether the caller may retry without any state change first.
    ///
    /// Only lock-wait timeouts qualify; everything else needs new input or a
    /// status change.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
