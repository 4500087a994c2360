//! Error taxonomy surfaced to callbacks, and administrative errors for
//! set membership operations.

use std::fmt;

/// Terminal reason delivered to [`PendingCallbacks::on_error`](crate::PendingCallbacks::on_error).
///
/// `Display` produces the exact reason strings from the coordination
/// core's error taxonomy, so logs and metrics keyed on text match the
/// documented behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    /// `try` reached `retry` while the item was still sleeping.
    NoSuccessAfterRetries {
        /// The retry budget that was exhausted.
        retries: u32,
    },
    /// The set-wide `maxtime` deadline expired with the item not done.
    Timeout,
    /// The installed continuation reported a recoverable failure and
    /// retries were subsequently exhausted.
    ErrorWhileReceiving,
    /// The item's descriptor reported exceptional readiness.
    ConnectionReset,
}

impl fmt::Display for PendingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuccessAfterRetries { retries } => {
                write!(f, "no success after {retries} retries")
            }
            Self::Timeout => write!(f, "timeout"),
            Self::ErrorWhileReceiving => write!(f, "error while receiving"),
            Self::ConnectionReset => write!(f, "connection reset"),
        }
    }
}

impl std::error::Error for PendingError {}

/// Errors raised by [`PendingSet::add`](crate::PendingSet::add) and
/// [`PendingSet::remove`](crate::PendingSet::remove).
///
/// These are caller misuse, not request outcomes — they never reach
/// [`PendingCallbacks::on_error`](crate::PendingCallbacks::on_error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingSetError<Id> {
    /// `add` was called with an `id` already present in the set.
    AlreadyPresent(Id),
    /// `remove` was called with an `id` absent from the set.
    NotPresent(Id),
}

impl<Id: fmt::Debug> fmt::Display for PendingSetError<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyPresent(id) => write!(f, "item {id:?} is already present in the set"),
            Self::NotPresent(id) => write!(f, "item {id:?} is not present in the set"),
        }
    }
}

impl<Id: fmt::Debug> std::error::Error for PendingSetError<Id> {}
