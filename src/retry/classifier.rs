use crate::capability::DriverCapability;
use crate::error::SqlReconnectError;

use super::message_matches;

/// Why a failed operation may or may not be retried through a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Close, reopen and run the operation again.
    Reconnect,
    /// `attempt` reached the budget.
    BudgetExhausted,
    /// A transaction is open; reconnecting would silently drop its uncommitted work.
    InTransaction,
    /// The error matches no reconnect signature.
    NotTransient,
}

/// Classify `error` for the `attempt`-th retry (0-based).
///
/// Rules are checked in order: budget, open transaction, signature match. A budget of
/// zero (driver opted out) is caught by the first rule for every attempt.
#[must_use]
pub fn classify(
    error: &SqlReconnectError,
    attempt: u32,
    nesting_level: u32,
    attempt_budget: u32,
    capability: &dyn DriverCapability,
) -> Verdict {
    if attempt >= attempt_budget {
        return Verdict::BudgetExhausted;
    }
    if nesting_level >= 1 {
        return Verdict::InTransaction;
    }
    if message_matches(&error.message_chain(), capability.reconnect_exceptions()) {
        Verdict::Reconnect
    } else {
        Verdict::NotTransient
    }
}

/// `true` when `error` should be answered with a reconnect and another attempt.
#[must_use]
pub fn should_retry(
    error: &SqlReconnectError,
    attempt: u32,
    nesting_level: u32,
    attempt_budget: u32,
    capability: &dyn DriverCapability,
) -> bool {
    classify(error, attempt, nesting_level, attempt_budget, capability) == Verdict::Reconnect
}
