//! Turns the per-recipient results of one attempt into a verdict for the
//! whole message.

use crate::{DeliveryResult, Severity};

/// What happens to the message record after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from the store
    Delete,
    /// Write the message back for another attempt
    Retry,
}

impl Disposition {
    /// Delete on the last attempt, or when nothing is left to retry.
    #[must_use]
    pub const fn decide(is_last_attempt: bool, completed: bool) -> Self {
        if is_last_attempt || completed {
            Self::Delete
        } else {
            Self::Retry
        }
    }
}

/// The classified outcome of one delivery attempt.
#[derive(Debug)]
pub struct Classification<'a> {
    /// Recipients that get reported in a bounce
    pub failed: Vec<&'a DeliveryResult>,
    /// No recipient is waiting for a retry
    pub completed: bool,
    pub disposition: Disposition,
}

/// Classify the results of one attempt.
///
/// Permanent failures always count as failed. Transient failures count as
/// failed only on the last attempt; before that they keep the message alive.
#[must_use]
pub fn classify(results: &[DeliveryResult], is_last_attempt: bool) -> Classification<'_> {
    let failed = results
        .iter()
        .filter(|result| match result.severity {
            Severity::PermanentNegative => true,
            Severity::TransientNegative => is_last_attempt,
            Severity::Success => false,
        })
        .collect();

    let completed = !results
        .iter()
        .any(|result| result.severity == Severity::TransientNegative);

    Classification {
        failed,
        completed,
        disposition: Disposition::decide(is_last_attempt, completed),
    }
}
