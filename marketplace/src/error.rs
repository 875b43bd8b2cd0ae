//! Error types for marketplace operations.

use crate::types::{CommitmentId, ParticipantRole, SessionId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for marketplace operations.
pub type Result<T> = std::result::Result<T, MarketplaceError>;

/// Coarse error category, used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Session or commitment absent - terminal, no retry
    NotFound,
    /// Caller is not a participant, or not the right role - terminal
    Forbidden,
    /// Precondition violated - caller must re-fetch state before retrying
    BadRequest,
    /// Missing or invalid caller identity
    Unauthorized,
}

/// Error taxonomy for the session lifecycle and scheduling core.
///
/// Every variant is terminal for the call that produced it; there are no
/// transient kinds inside this core. Messages are user-facing and propagate
/// unchanged to the boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketplaceError {
    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════

    /// No session with this id.
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// No commitment with this id.
    #[error("Commitment {0} not found")]
    CommitmentNotFound(CommitmentId),

    // ═══════════════════════════════════════════════════════════
    // Forbidden
    // ═══════════════════════════════════════════════════════════

    /// Caller is neither the tutor nor the student of the commitment.
    #[error("Caller is not a participant of this commitment")]
    NotAParticipant,

    /// Only the student may confirm or reject participation.
    #[error("Only the student may decide participation")]
    NotTheStudent,

    /// Only the tutor may create or batch-schedule sessions.
    #[error("Only the tutor may schedule sessions")]
    NotTheTutor,

    // ═══════════════════════════════════════════════════════════
    // Bad request - confirmation
    // ═══════════════════════════════════════════════════════════

    /// The student already decided participation.
    #[error("Confirmation already made")]
    ConfirmationAlreadyMade,

    /// The confirmation window closed before the student answered.
    #[error("The confirmation deadline has passed")]
    ConfirmationDeadlinePassed,

    // ═══════════════════════════════════════════════════════════
    // Bad request - attendance settlement
    // ═══════════════════════════════════════════════════════════

    /// Attendance actions are only valid once the session has started.
    #[error("Session has not started yet")]
    SessionNotStarted,

    /// The session is not in a state that accepts attendance actions.
    #[error("Session is not awaiting attendance settlement")]
    NotAwaitingSettlement,

    /// The caller's grace window has closed.
    #[error("The {role} check-in deadline has passed")]
    DeadlinePassed {
        /// Whose window closed
        role: ParticipantRole,
    },

    /// Students may act only after the tutor has checked in.
    #[error("Tutor has not checked in yet")]
    TutorNotCheckedIn,

    /// This role already made its attendance decision.
    #[error("Attendance already decided")]
    AttendanceAlreadyDecided,

    /// Opening a dispute requires a reason and evidence.
    #[error("A dispute requires a reason and at least one evidence URL")]
    EvidenceRequired,

    /// Dispute arbitration requires an open dispute.
    #[error("Session {0} has no open dispute")]
    NoOpenDispute(SessionId),

    // ═══════════════════════════════════════════════════════════
    // Bad request - cancellation
    // ═══════════════════════════════════════════════════════════

    /// Only upcoming scheduled/confirmed sessions can be cancelled.
    #[error("Session can no longer be cancelled")]
    CannotCancel,

    // ═══════════════════════════════════════════════════════════
    // Bad request - scheduling
    // ═══════════════════════════════════════════════════════════

    /// Sessions may only be scheduled under an active commitment.
    #[error("Commitment is not active")]
    CommitmentNotActive,

    /// Sessions may only be scheduled once the commitment is fully paid.
    #[error("Commitment is not fully paid")]
    CommitmentNotPaid,

    /// The commitment has no session slots left to schedule.
    #[error("No remaining session slots to schedule")]
    NoRemainingSlots,

    /// Batch scheduling needs at least one weekly template slot.
    #[error("At least one weekly slot is required")]
    NoSlots,

    /// A slot or session has `start >= end`.
    #[error("Session start must be before its end")]
    InvalidTimeRange,

    /// A candidate collides with an existing booking of either party.
    #[error("Schedule conflict with an existing session at {0}")]
    ScheduleConflict(DateTime<Utc>),

    /// Every candidate fell outside the commitment's date window.
    #[error("No schedulable slots within the commitment window")]
    NoSchedulableSlots,

    // ═══════════════════════════════════════════════════════════
    // Unauthorized
    // ═══════════════════════════════════════════════════════════

    /// The request carried no usable caller identity.
    #[error("Missing or invalid caller identity")]
    MissingIdentity,
}

impl MarketplaceError {
    /// The coarse category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) | Self::CommitmentNotFound(_) => ErrorKind::NotFound,
            Self::NotAParticipant | Self::NotTheStudent | Self::NotTheTutor => ErrorKind::Forbidden,
            Self::MissingIdentity => ErrorKind::Unauthorized,
            _ => ErrorKind::BadRequest,
        }
    }
}
