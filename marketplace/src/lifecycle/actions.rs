//! Actions for the session lifecycle reducer.

use crate::scheduling::SlotTemplate;
use crate::types::{CommitmentId, DisputeDecision, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The student's pre-session decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationDecision {
    /// Accept the proposed session
    Accepted,
    /// Reject it
    Rejected,
}

/// Every input the session lifecycle accepts.
///
/// Commands carry the caller's identity; the reducer resolves it to a role
/// through the owning commitment and rejects non-participants. `SweepTimeouts`
/// and `SettlementCompleted` are system-originated.
#[derive(Clone, Debug)]
pub enum LifecycleAction {
    /// Tutor proposes a single session under a commitment
    CreateSession {
        /// Pre-generated id for the new session
        session_id: SessionId,
        /// Owning commitment
        commitment_id: CommitmentId,
        /// Must be the commitment's tutor
        caller: UserId,
        /// Scheduled start
        start_time: DateTime<Utc>,
        /// Scheduled end
        end_time: DateTime<Utc>,
        /// Meeting location
        location: Option<String>,
        /// Tutor notes
        notes: Option<String>,
    },

    /// Tutor projects a weekly template into a batch of sessions
    ScheduleRecurring {
        /// Owning commitment
        commitment_id: CommitmentId,
        /// Must be the commitment's tutor
        caller: UserId,
        /// One representative occurrence per weekly slot
        slots: Vec<SlotTemplate>,
        /// Meeting location for every created session
        location: Option<String>,
        /// Notes for every created session
        notes: Option<String>,
    },

    /// Student accepts or rejects a proposed session
    ConfirmParticipation {
        /// Target session
        session_id: SessionId,
        /// Must be the commitment's student
        caller: UserId,
        /// Accept or reject
        decision: ParticipationDecision,
    },

    /// A party declares the session happened
    CheckIn {
        /// Target session
        session_id: SessionId,
        /// Tutor or student of the commitment
        caller: UserId,
    },

    /// A party reports absence, or the student contests the tutor's claim
    RejectAttendance {
        /// Target session
        session_id: SessionId,
        /// Tutor or student of the commitment
        caller: UserId,
        /// Why attendance is rejected
        reason: String,
        /// Supporting evidence URLs (required for a dispute)
        evidence_urls: Vec<String>,
    },

    /// A participant cancels an upcoming session
    CancelSession {
        /// Target session
        session_id: SessionId,
        /// Tutor or student of the commitment
        caller: UserId,
        /// Why
        reason: String,
    },

    /// Admin arbitrates an open dispute
    ResolveDispute {
        /// Target session
        session_id: SessionId,
        /// The arbitrating admin
        admin: UserId,
        /// Final outcome
        decision: DisputeDecision,
        /// Recorded as the absence reason on a not-conducted outcome
        admin_notes: String,
    },

    /// Idempotent timeout sweep over every session
    ///
    /// Dispatched before every read and by the periodic sweeper task.
    SweepTimeouts,

    /// Feedback: the settlement gateway confirmed the completion transfer
    SettlementCompleted {
        /// The settled commitment
        commitment_id: CommitmentId,
    },
}
