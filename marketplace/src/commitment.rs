//! Commitment bookkeeping applied during session settlement.
//!
//! Absences push the commitment's scheduling window out so the contracted
//! session count stays achievable without manual admin action; completions
//! count toward finishing the commitment.

use crate::types::{CommitmentStatus, LearningCommitment};

/// Weeks of extension owed for a number of not-conducted sessions.
///
/// Two absences earn one make-up week.
#[must_use]
pub const fn required_extension_weeks(absent_sessions: u32) -> u32 {
    absent_sessions.div_ceil(2)
}

/// Record a session settled as not conducted.
///
/// Increments the absence counter and, when the owed extension exceeds what
/// was already granted, widens the window. Returns the newly granted weeks,
/// if any. Monotone: the end date never moves backwards.
pub fn record_absence(commitment: &mut LearningCommitment) -> Option<u32> {
    commitment.absent_sessions += 1;
    let required = required_extension_weeks(commitment.absent_sessions);
    if required > commitment.extended_weeks {
        let granted = required - commitment.extended_weeks;
        commitment.extended_weeks = required;
        Some(granted)
    } else {
        None
    }
}

/// Record a session settled as completed.
///
/// Returns `true` when this completion finishes the commitment - the one
/// transition that notifies both parties and triggers settlement.
pub fn record_completion(commitment: &mut LearningCommitment) -> bool {
    commitment.completed_sessions += 1;
    if commitment.completed_sessions >= commitment.total_sessions
        && commitment.status == CommitmentStatus::Active
    {
        commitment.status = CommitmentStatus::Completed;
        true
    } else {
        false
    }
}
