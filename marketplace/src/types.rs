//! Domain types for the Tutorlink marketplace.
//!
//! This module contains identifiers, the session entity with its confirmation
//! sub-objects, the learning commitment, and the state container the
//! lifecycle reducer operates on.

use crate::error::MarketplaceError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random `SessionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `SessionId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a learning commitment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentId(Uuid);

impl CommitmentId {
    /// Creates a new random `CommitmentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `CommitmentId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommitmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (tutor, student or admin)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles and statuses
// ============================================================================

/// The party a caller resolves to within a commitment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    /// The commitment's tutor
    Tutor,
    /// The commitment's student
    Student,
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tutor => write!(f, "tutor"),
            Self::Student => write!(f, "student"),
        }
    }
}

/// Actor recorded in the append-only attendance log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    /// The commitment's tutor
    Tutor,
    /// The commitment's student
    Student,
    /// The timeout resolver
    System,
    /// A dispute arbitrator
    Admin,
}

/// Lifecycle status of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Proposed by the tutor, awaiting student confirmation
    Scheduled,
    /// Confirmed by the student, awaiting attendance settlement
    Confirmed,
    /// Rejected by the student before it took place
    Rejected,
    /// Both parties checked in - the session happened
    Completed,
    /// At least one party did not attend
    NotConducted,
    /// Cancelled by a participant before start
    Cancelled,
    /// Student contested the tutor's attendance claim; awaiting arbitration
    Disputed,
}

/// State of a single confirmation decision (pre-session or per-role check-in)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// No decision yet
    Pending,
    /// Confirmed / checked in
    Accepted,
    /// Declined / reported absent
    Rejected,
}

// ============================================================================
// Session sub-objects
// ============================================================================

/// The student's pre-session accept/reject decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentConfirmation {
    /// Decision state
    pub status: ConfirmationStatus,
    /// When the decision was made
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl StudentConfirmation {
    /// A fresh, undecided confirmation
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: ConfirmationStatus::Pending,
            confirmed_at: None,
        }
    }
}

/// One role's post-session check-in decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyCheckIn {
    /// Decision state
    pub status: ConfirmationStatus,
    /// When the decision was made
    pub decided_at: Option<DateTime<Utc>>,
}

impl PartyCheckIn {
    /// A fresh, undecided check-in
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: ConfirmationStatus::Pending,
            decided_at: None,
        }
    }

    /// Whether this side has not decided yet
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ConfirmationStatus::Pending
    }
}

/// Dual-sided attendance settlement state
///
/// The tutor and student fields are independent; each is updated only while
/// its own status is `Pending`, which is what makes concurrent settlement and
/// timeout sweeps safe without record locking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceConfirmation {
    /// Tutor's check-in
    pub tutor: PartyCheckIn,
    /// Student's check-in
    pub student: PartyCheckIn,
    /// Whether the session is settled as attended
    pub is_attended: bool,
    /// Set exactly once, when the session reaches a terminal outcome
    pub finalized_at: Option<DateTime<Utc>>,
}

impl AttendanceConfirmation {
    /// A fresh settlement with both sides pending
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            tutor: PartyCheckIn::pending(),
            student: PartyCheckIn::pending(),
            is_attended: false,
            finalized_at: None,
        }
    }
}

/// Deadlines for the post-session check-in grace windows
///
/// Computed once (at creation) from the session end time and persisted;
/// stored windows are reused, never recomputed on later checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceWindow {
    /// Last instant the tutor may check in
    pub tutor_deadline: DateTime<Utc>,
    /// Last instant the student may check in (always >= the tutor deadline)
    pub student_deadline: DateTime<Utc>,
}

/// Absence record, populated when a session settles as not conducted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Absence {
    /// Whether the student failed to attend
    pub student_absent: bool,
    /// Whether the tutor failed to attend
    pub tutor_absent: bool,
    /// Why the absence was recorded
    pub reason: String,
    /// Supporting evidence URLs
    pub evidence_urls: Vec<String>,
    /// When the absence was decided
    pub decided_at: DateTime<Utc>,
}

/// Dispute state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// Awaiting admin arbitration
    Open,
    /// Arbitrated
    Resolved,
}

/// Admin arbitration outcome for a disputed session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeDecision {
    /// The session counts as conducted
    Completed,
    /// The session counts as not conducted
    NotConducted,
}

/// A dispute opened by the student against the tutor's attendance claim
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    /// Open or resolved
    pub status: DisputeStatus,
    /// Who opened the dispute
    pub opened_by: UserId,
    /// The student's stated reason
    pub reason: String,
    /// Supporting evidence URLs (at least one required to open)
    pub evidence_urls: Vec<String>,
    /// When the dispute was opened
    pub opened_at: DateTime<Utc>,
    /// When the dispute was arbitrated
    pub resolved_at: Option<DateTime<Utc>>,
    /// The arbitrating admin
    pub resolved_by: Option<UserId>,
    /// The arbitration decision
    pub decision: Option<DisputeDecision>,
    /// The admin's notes
    pub admin_notes: Option<String>,
}

/// Cancellation record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    /// Who cancelled
    pub cancelled_by: UserId,
    /// Why
    pub reason: String,
    /// When
    pub cancelled_at: DateTime<Utc>,
}

/// One entry in the append-only attendance audit trail
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLogEntry {
    /// Who acted
    pub actor: ActorRole,
    /// What happened (e.g. `checked_in`, `auto_rejected`)
    pub action: String,
    /// Optional free-form note
    pub note: Option<String>,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// One scheduled meeting between a tutor and a student under a commitment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id
    pub id: SessionId,
    /// Owning commitment
    pub commitment_id: CommitmentId,
    /// Scheduled start (strictly before end)
    pub start_time: DateTime<Utc>,
    /// Scheduled end
    pub end_time: DateTime<Utc>,
    /// Meeting location
    pub location: Option<String>,
    /// Tutor notes
    pub notes: Option<String>,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Persisted check-in deadlines
    pub attendance_window: AttendanceWindow,
    /// Pre-session student confirmation
    pub student_confirmation: StudentConfirmation,
    /// Post-session dual check-in
    pub attendance: AttendanceConfirmation,
    /// Populated when the session settles as not conducted
    pub absence: Option<Absence>,
    /// Populated when the student opens a dispute
    pub dispute: Option<Dispute>,
    /// Populated when a participant cancels
    pub cancellation: Option<Cancellation>,
    /// Logical deletion flag - sessions are never physically removed
    pub is_deleted: bool,
    /// When the session was soft-deleted
    pub deleted_at: Option<DateTime<Utc>>,
    /// Who soft-deleted it
    pub deleted_by: Option<UserId>,
    /// Append-only audit trail
    pub attendance_logs: Vec<AttendanceLogEntry>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a freshly proposed session
    #[must_use]
    #[allow(clippy::too_many_arguments)] // Entity constructor mirrors the record
    pub fn new(
        id: SessionId,
        commitment_id: CommitmentId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        attendance_window: AttendanceWindow,
        location: Option<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            commitment_id,
            start_time,
            end_time,
            location,
            notes,
            status: SessionStatus::Scheduled,
            attendance_window,
            student_confirmation: StudentConfirmation::pending(),
            attendance: AttendanceConfirmation::pending(),
            absence: None,
            dispute: None,
            cancellation: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
            attendance_logs: Vec::new(),
            created_at,
        }
    }

    /// Append an audit entry; the log is never mutated otherwise
    pub fn log(
        &mut self,
        actor: ActorRole,
        action: impl Into<String>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.attendance_logs.push(AttendanceLogEntry {
            actor,
            action: action.into(),
            note,
            created_at: at,
        });
    }

    /// Soft-delete the session
    pub fn soft_delete(&mut self, by: Option<UserId>, at: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = by;
    }

    /// Whether this session blocks other bookings in conflict detection
    #[must_use]
    pub fn blocks_schedule(&self) -> bool {
        !self.is_deleted
            && !matches!(
                self.status,
                SessionStatus::Cancelled | SessionStatus::Rejected | SessionStatus::NotConducted
            )
    }

    /// Whether `[start, end)` overlaps this session's time window
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end_time && self.start_time < end
    }
}

// ============================================================================
// Learning commitment
// ============================================================================

/// Lifecycle status of a commitment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitmentStatus {
    /// Terms proposed, not yet agreed
    PendingAgreement,
    /// Sessions may be scheduled and held
    Active,
    /// Every contracted session is completed
    Completed,
    /// Abandoned
    Cancelled,
}

/// Multi-session contract between one tutor and one student
///
/// Schedule boundaries, payment gating and the absence counters live here;
/// the session lifecycle reads them and updates the counters on settlement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningCommitment {
    /// Unique commitment id
    pub id: CommitmentId,
    /// The tutor party
    pub tutor_id: UserId,
    /// The student party
    pub student_id: UserId,
    /// Lifecycle status
    pub status: CommitmentStatus,
    /// Contracted session count
    pub total_sessions: u32,
    /// Weekly scheduling quota
    pub sessions_per_week: u32,
    /// When the commitment's calendar window opens
    pub start_date: DateTime<Utc>,
    /// Extra weeks granted to absorb not-conducted sessions
    pub extended_weeks: u32,
    /// Sessions settled as completed
    pub completed_sessions: u32,
    /// Sessions settled as not conducted
    pub absent_sessions: u32,
    /// Make-up sessions already scheduled against `absent_sessions`
    pub makeup_sessions_issued: u32,
    /// Full contract price, in cents
    pub total_amount: i64,
    /// What the student has paid so far, in cents
    pub student_paid_amount: i64,
    /// Idempotency guard for the completion money transfer
    pub is_money_transferred: bool,
}

impl LearningCommitment {
    /// Whether the student has paid the full contract price
    #[must_use]
    pub fn is_fully_paid(&self) -> bool {
        self.student_paid_amount >= self.total_amount
    }

    /// Resolve a user to their role within this commitment, if any
    #[must_use]
    pub fn role_of(&self, user: UserId) -> Option<ParticipantRole> {
        if user == self.tutor_id {
            Some(ParticipantRole::Tutor)
        } else if user == self.student_id {
            Some(ParticipantRole::Student)
        } else {
            None
        }
    }

    /// The counterparty of the given role
    #[must_use]
    pub const fn counterparty(&self, role: ParticipantRole) -> UserId {
        match role {
            ParticipantRole::Tutor => self.student_id,
            ParticipantRole::Student => self.tutor_id,
        }
    }

    /// Planned calendar length in weeks, before extensions
    #[must_use]
    pub fn planned_weeks(&self) -> u32 {
        if self.sessions_per_week == 0 {
            return 0;
        }
        self.total_sessions.div_ceil(self.sessions_per_week)
    }

    /// End of the valid scheduling window, extensions included
    #[must_use]
    pub fn end_date(&self) -> DateTime<Utc> {
        self.start_date + Duration::weeks(i64::from(self.planned_weeks() + self.extended_weeks))
    }

    /// Absences that have not yet been compensated with a make-up session
    #[must_use]
    pub fn uncompensated_absences(&self) -> u32 {
        self.absent_sessions
            .saturating_sub(self.makeup_sessions_issued)
    }
}

// ============================================================================
// State container
// ============================================================================

/// State for the lifecycle reducer: every session and commitment, plus the
/// transient channels the store shell reads back after a dispatch.
#[derive(Clone, Debug, Default)]
pub struct MarketplaceState {
    sessions: HashMap<SessionId, Session>,
    commitments: HashMap<CommitmentId, LearningCommitment>,
    /// Validation failure of the last dispatched command, if any
    pub last_error: Option<MarketplaceError>,
    /// Sessions inserted by the last batch-scheduling command
    pub last_scheduled: Vec<SessionId>,
}

impl MarketplaceState {
    /// Create a new empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a session
    pub fn insert_session(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Insert or replace a commitment
    pub fn insert_commitment(&mut self, commitment: LearningCommitment) {
        self.commitments.insert(commitment.id, commitment);
    }

    /// Get a session by id
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Get a mutable session by id
    pub fn session_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Get a commitment by id
    #[must_use]
    pub fn commitment(&self, id: &CommitmentId) -> Option<&LearningCommitment> {
        self.commitments.get(id)
    }

    /// Get a mutable commitment by id
    pub fn commitment_mut(&mut self, id: &CommitmentId) -> Option<&mut LearningCommitment> {
        self.commitments.get_mut(id)
    }

    /// All sessions
    #[must_use]
    pub const fn sessions(&self) -> &HashMap<SessionId, Session> {
        &self.sessions
    }

    /// All commitments
    #[must_use]
    pub const fn commitments(&self) -> &HashMap<CommitmentId, LearningCommitment> {
        &self.commitments
    }

    /// Sessions belonging to one commitment (soft-deleted ones included)
    pub fn sessions_of(&self, commitment_id: &CommitmentId) -> impl Iterator<Item = &Session> {
        self.sessions
            .values()
            .filter(move |s| s.commitment_id == *commitment_id)
    }
}
