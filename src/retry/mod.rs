//! Retry decisions shared by connections and statements.

pub mod classifier;
pub mod lock;
pub mod stall;

use crate::capability::Signature;

pub use classifier::{Verdict, classify, should_retry};
pub use lock::{LockRetryPolicy, run_with_lock_retry};
pub use stall::StallPolicy;

/// Case-insensitive substring match of `message` against any signature.
pub(crate) fn message_matches(message: &str, signatures: &[Signature]) -> bool {
    if signatures.is_empty() {
        return false;
    }
    let haystack = message.to_lowercase();
    signatures
        .iter()
        .any(|sig| !sig.is_empty() && haystack.contains(&sig.to_lowercase()))
}
