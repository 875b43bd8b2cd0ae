//! Reducer for the session lifecycle and attendance settlement state machine.
//!
//! All preconditions are expressed as status guards (`if the sub-status is
//! still Pending ...`), so a user action racing the timeout sweep resolves to
//! whichever write lands first; the loser becomes a no-op or a clean
//! precondition error. That guard discipline is what makes the sweep safe to
//! run on every read.

use crate::commitment;
use crate::error::MarketplaceError;
use crate::lifecycle::actions::{LifecycleAction, ParticipationDecision};
use crate::lifecycle::environment::LifecycleEnvironment;
use crate::scheduling;
use crate::types::{
    Absence, ActorRole, CommitmentId, ConfirmationStatus, Dispute, DisputeDecision, DisputeStatus,
    MarketplaceState, ParticipantRole, Session, SessionId, SessionStatus, StudentConfirmation,
    UserId,
};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::sync::Arc;
use tutorlink_core::{effect::Effect, reducer::Reducer};

/// Effect vector returned by the lifecycle reducer.
pub(crate) type Effects = SmallVec<[Effect<LifecycleAction>; 4]>;

/// Record a validation failure and return no effects.
pub(crate) fn fail(state: &mut MarketplaceState, error: MarketplaceError) -> Effects {
    state.last_error = Some(error);
    SmallVec::new()
}

/// Build a fire-and-forget notification effect.
///
/// Failures are logged and dropped; a broken delivery channel must never fail
/// the operation that queued the send.
pub(crate) fn notify_effect(
    env: &LifecycleEnvironment,
    user: UserId,
    title: &str,
    message: String,
) -> Effect<LifecycleAction> {
    let notifier = Arc::clone(&env.notifier);
    let title = title.to_string();
    Effect::fire_and_forget(async move {
        if let Err(error) = notifier.send(user, &title, &message).await {
            tracing::warn!(%user, %error, "dropping failed notification");
        }
    })
}

/// Build the completion money-transfer effect.
///
/// On success the gateway's acknowledgement feeds back as
/// [`LifecycleAction::SettlementCompleted`], which sets the commitment's
/// `is_money_transferred` guard. On failure the transfer is simply retried by
/// the next sweep.
fn settlement_effect(
    env: &LifecycleEnvironment,
    commitment_id: CommitmentId,
) -> Effect<LifecycleAction> {
    let gateway = Arc::clone(&env.settlement);
    Effect::Future(Box::pin(async move {
        match gateway.transfer_on_completion(commitment_id).await {
            Ok(()) => Some(LifecycleAction::SettlementCompleted { commitment_id }),
            Err(error) => {
                tracing::warn!(%commitment_id, %error, "completion transfer failed; next sweep retries");
                None
            }
        }
    }))
}

/// Terminal outcome produced by [`finalize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settled {
    /// Both sides accepted - the session happened
    Completed,
    /// At least one side failed to attend
    NotConducted,
}

/// Reducer for sessions and their owning commitments.
///
/// One reducer covers creation, participation confirmation, dual check-in,
/// rejection/dispute, cancellation, arbitration, batch scheduling and the
/// timeout sweep: they all mutate the same session records and share the
/// finalization rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new `LifecycleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for LifecycleReducer {
    type State = MarketplaceState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects {
        match action {
            LifecycleAction::CreateSession {
                session_id,
                commitment_id,
                caller,
                start_time,
                end_time,
                location,
                notes,
            } => handle_create(
                state,
                env,
                session_id,
                commitment_id,
                caller,
                start_time,
                end_time,
                location,
                notes,
            ),

            LifecycleAction::ScheduleRecurring {
                commitment_id,
                caller,
                slots,
                location,
                notes,
            } => scheduling::handle_schedule_recurring(
                state,
                env,
                commitment_id,
                caller,
                &slots,
                location,
                notes,
            ),

            LifecycleAction::ConfirmParticipation {
                session_id,
                caller,
                decision,
            } => handle_confirm(state, env, session_id, caller, decision),

            LifecycleAction::CheckIn { session_id, caller } => {
                handle_check_in(state, env, session_id, caller)
            }

            LifecycleAction::RejectAttendance {
                session_id,
                caller,
                reason,
                evidence_urls,
            } => handle_reject_attendance(state, env, session_id, caller, reason, evidence_urls),

            LifecycleAction::CancelSession {
                session_id,
                caller,
                reason,
            } => handle_cancel(state, env, session_id, caller, reason),

            LifecycleAction::ResolveDispute {
                session_id,
                admin,
                decision,
                admin_notes,
            } => handle_resolve_dispute(state, env, session_id, admin, decision, admin_notes),

            LifecycleAction::SweepTimeouts => handle_sweep(state, env),

            LifecycleAction::SettlementCompleted { commitment_id } => {
                if let Some(c) = state.commitment_mut(&commitment_id) {
                    c.is_money_transferred = true;
                }
                SmallVec::new()
            }
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

#[allow(clippy::too_many_arguments)] // Mirrors the command
fn handle_create(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    commitment_id: CommitmentId,
    caller: UserId,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    location: Option<String>,
    notes: Option<String>,
) -> Effects {
    let now = env.clock.now();

    let Some(c) = state.commitment(&commitment_id) else {
        return fail(state, MarketplaceError::CommitmentNotFound(commitment_id));
    };
    match c.role_of(caller) {
        Some(ParticipantRole::Tutor) => {}
        Some(ParticipantRole::Student) => return fail(state, MarketplaceError::NotTheTutor),
        None => return fail(state, MarketplaceError::NotAParticipant),
    }
    if c.status != crate::types::CommitmentStatus::Active {
        return fail(state, MarketplaceError::CommitmentNotActive);
    }
    if !c.is_fully_paid() {
        return fail(state, MarketplaceError::CommitmentNotPaid);
    }
    if start_time >= end_time {
        return fail(state, MarketplaceError::InvalidTimeRange);
    }
    let (tutor_id, student_id) = (c.tutor_id, c.student_id);
    if let Some(at) = scheduling::find_conflict(state, tutor_id, student_id, start_time, end_time) {
        return fail(state, MarketplaceError::ScheduleConflict(at));
    }

    let window = env.grace.attendance_window(end_time);
    let mut session = Session::new(
        session_id,
        commitment_id,
        start_time,
        end_time,
        window,
        location,
        notes,
        now,
    );
    session.log(ActorRole::Tutor, "session_created", None, now);
    state.insert_session(session);

    smallvec::smallvec![notify_effect(
        env,
        student_id,
        "New session proposed",
        format!("Your tutor proposed a session starting at {start_time}"),
    )]
}

// ============================================================================
// Participation confirmation
// ============================================================================

/// Apply the same mutations as an explicit student rejection, attributed to
/// the timeout resolver.
fn force_auto_reject(session: &mut Session, now: DateTime<Utc>) {
    session.student_confirmation = StudentConfirmation {
        status: ConfirmationStatus::Rejected,
        confirmed_at: Some(now),
    };
    session.status = SessionStatus::Rejected;
    session.soft_delete(None, now);
    session.log(
        ActorRole::System,
        "auto_rejected",
        Some("No confirmation before the deadline".to_string()),
        now,
    );
}

fn handle_confirm(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    caller: UserId,
    decision: ParticipationDecision,
) -> Effects {
    let now = env.clock.now();

    let Some(session) = state.session(&session_id) else {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    };
    let commitment_id = session.commitment_id;
    let Some(c) = state.commitment(&commitment_id) else {
        return fail(state, MarketplaceError::CommitmentNotFound(commitment_id));
    };
    match c.role_of(caller) {
        Some(ParticipantRole::Student) => {}
        Some(ParticipantRole::Tutor) => return fail(state, MarketplaceError::NotTheStudent),
        None => return fail(state, MarketplaceError::NotAParticipant),
    }
    let tutor_id = c.tutor_id;

    let Some(session) = state.session_mut(&session_id) else {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    };
    if session.student_confirmation.status != ConfirmationStatus::Pending {
        return fail(state, MarketplaceError::ConfirmationAlreadyMade);
    }
    if now > env.grace.confirmation_deadline(session.start_time) {
        // Too late: resolve the timeout inline so the record is finalized
        // immediately, then surface the precondition error. The auto-reject
        // notification still goes out even though the command fails.
        force_auto_reject(session, now);
        let effects: Effects = smallvec::smallvec![notify_effect(
            env,
            tutor_id,
            "Session auto-rejected",
            "The student did not confirm the session in time".to_string(),
        )];
        state.last_error = Some(MarketplaceError::ConfirmationDeadlinePassed);
        return effects;
    }

    match decision {
        ParticipationDecision::Accepted => {
            session.student_confirmation = StudentConfirmation {
                status: ConfirmationStatus::Accepted,
                confirmed_at: Some(now),
            };
            session.status = SessionStatus::Confirmed;
            session.log(ActorRole::Student, "participation_accepted", None, now);

            // Once the student has engaged with the commitment, remaining
            // proposed sessions are presumed accepted. Best-effort side
            // operation: it can never fail the primary confirmation.
            let siblings: Vec<SessionId> = state
                .sessions_of(&commitment_id)
                .filter(|s| {
                    s.id != session_id
                        && !s.is_deleted
                        && s.status == SessionStatus::Scheduled
                        && s.student_confirmation.status == ConfirmationStatus::Pending
                })
                .map(|s| s.id)
                .collect();
            for id in siblings {
                if let Some(s) = state.session_mut(&id) {
                    s.student_confirmation = StudentConfirmation {
                        status: ConfirmationStatus::Accepted,
                        confirmed_at: Some(now),
                    };
                    s.status = SessionStatus::Confirmed;
                    s.log(
                        ActorRole::System,
                        "auto_accepted",
                        Some("Student engaged with the commitment".to_string()),
                        now,
                    );
                }
            }

            smallvec::smallvec![notify_effect(
                env,
                tutor_id,
                "Session confirmed",
                "The student confirmed the session".to_string(),
            )]
        }
        ParticipationDecision::Rejected => {
            session.student_confirmation = StudentConfirmation {
                status: ConfirmationStatus::Rejected,
                confirmed_at: Some(now),
            };
            session.status = SessionStatus::Rejected;
            session.soft_delete(Some(caller), now);
            session.log(ActorRole::Student, "participation_rejected", None, now);

            smallvec::smallvec![notify_effect(
                env,
                tutor_id,
                "Session rejected",
                "The student rejected the session".to_string(),
            )]
        }
    }
}

// ============================================================================
// Attendance settlement
// ============================================================================

/// Set one side's check-in to rejected and record the matching absence.
fn mark_absent(
    session: &mut Session,
    role: ParticipantRole,
    reason: &str,
    evidence_urls: Vec<String>,
    now: DateTime<Utc>,
) {
    let side = match role {
        ParticipantRole::Tutor => &mut session.attendance.tutor,
        ParticipantRole::Student => &mut session.attendance.student,
    };
    side.status = ConfirmationStatus::Rejected;
    side.decided_at = Some(now);

    let absence = session.absence.get_or_insert_with(|| Absence {
        student_absent: false,
        tutor_absent: false,
        reason: String::new(),
        evidence_urls: Vec::new(),
        decided_at: now,
    });
    match role {
        ParticipantRole::Tutor => absence.tutor_absent = true,
        ParticipantRole::Student => absence.student_absent = true,
    }
    if absence.reason.is_empty() {
        absence.reason = reason.to_string();
    }
    absence.evidence_urls.extend(evidence_urls);
    absence.decided_at = now;
}

/// The centralized finalization rule, applied after every mutating path.
///
/// One-way: once `finalized_at` is set the session never changes outcome
/// again, which is what makes repeated sweeps idempotent.
///
/// A tutor-side rejection is authoritative and terminal - the session settles
/// as not conducted immediately, without waiting for the student half.
fn finalize(session: &mut Session, now: DateTime<Utc>) -> Option<Settled> {
    if session.attendance.finalized_at.is_some() {
        return None;
    }
    let tutor = session.attendance.tutor.status;
    let student = session.attendance.student.status;

    if session.status == SessionStatus::Disputed {
        // The outcome stays open for arbitration, but both sides have acted.
        if tutor != ConfirmationStatus::Pending && student != ConfirmationStatus::Pending {
            session.attendance.finalized_at = Some(now);
        }
        return None;
    }

    if tutor == ConfirmationStatus::Rejected {
        session.attendance.is_attended = false;
        session.attendance.finalized_at = Some(now);
        session.status = SessionStatus::NotConducted;
        return Some(Settled::NotConducted);
    }
    if tutor == ConfirmationStatus::Pending || student == ConfirmationStatus::Pending {
        return None;
    }
    if student == ConfirmationStatus::Accepted {
        session.attendance.is_attended = true;
        session.attendance.finalized_at = Some(now);
        session.status = SessionStatus::Completed;
        return Some(Settled::Completed);
    }
    session.attendance.is_attended = false;
    session.attendance.finalized_at = Some(now);
    session.status = SessionStatus::NotConducted;
    Some(Settled::NotConducted)
}

/// Apply a terminal outcome to the owning commitment.
fn apply_outcome(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    commitment_id: CommitmentId,
    outcome: Settled,
) -> Effects {
    let Some(c) = state.commitment_mut(&commitment_id) else {
        return SmallVec::new();
    };
    match outcome {
        Settled::Completed => {
            if commitment::record_completion(c) {
                let (tutor_id, student_id) = (c.tutor_id, c.student_id);
                let needs_transfer = !c.is_money_transferred;
                let mut effects: Effects = smallvec::smallvec![
                    notify_effect(
                        env,
                        tutor_id,
                        "Commitment completed",
                        "Every contracted session is completed".to_string(),
                    ),
                    notify_effect(
                        env,
                        student_id,
                        "Commitment completed",
                        "Every contracted session is completed".to_string(),
                    ),
                ];
                if needs_transfer {
                    effects.push(settlement_effect(env, commitment_id));
                }
                effects
            } else {
                SmallVec::new()
            }
        }
        Settled::NotConducted => {
            if let Some(granted) = commitment::record_absence(c) {
                tracing::debug!(%commitment_id, granted, "commitment window extended");
            }
            SmallVec::new()
        }
    }
}

/// Validation shared by check-in and rejection. Returns the caller's role and
/// the counterparty, or records the error.
///
/// A past-deadline attempt resolves the session's timeouts inline before the
/// error surfaces, so the record is finalized rather than left dangling; the
/// resolution's effects are returned alongside the recorded error.
fn attendance_gate(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    caller: UserId,
    now: DateTime<Utc>,
) -> Result<(ParticipantRole, UserId), Effects> {
    let Some(session) = state.session(&session_id) else {
        return Err(fail(state, MarketplaceError::SessionNotFound(session_id)));
    };
    if session.is_deleted {
        return Err(fail(state, MarketplaceError::SessionNotFound(session_id)));
    }
    let commitment_id = session.commitment_id;
    let Some(c) = state.commitment(&commitment_id) else {
        return Err(fail(state, MarketplaceError::CommitmentNotFound(commitment_id)));
    };
    let Some(role) = c.role_of(caller) else {
        return Err(fail(state, MarketplaceError::NotAParticipant));
    };
    let counterparty = c.counterparty(role);

    let Some(session) = state.session(&session_id) else {
        return Err(fail(state, MarketplaceError::SessionNotFound(session_id)));
    };
    if session.status != SessionStatus::Confirmed {
        return Err(fail(state, MarketplaceError::NotAwaitingSettlement));
    }
    if now < session.start_time {
        return Err(fail(state, MarketplaceError::SessionNotStarted));
    }
    let deadline = match role {
        ParticipantRole::Tutor => session.attendance_window.tutor_deadline,
        ParticipantRole::Student => session.attendance_window.student_deadline,
    };
    if now > deadline {
        let effects = resolve_session(state, env, session_id, now);
        state.last_error = Some(MarketplaceError::DeadlinePassed { role });
        return Err(effects);
    }
    Ok((role, counterparty))
}

fn handle_check_in(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    caller: UserId,
) -> Effects {
    let now = env.clock.now();
    let (role, _) = match attendance_gate(state, env, session_id, caller, now) {
        Ok(resolved) => resolved,
        Err(effects) => return effects,
    };
    let commitment_id = {
        let Some(session) = state.session_mut(&session_id) else {
            return fail(state, MarketplaceError::SessionNotFound(session_id));
        };
        match role {
            ParticipantRole::Tutor => {
                if !session.attendance.tutor.is_pending() {
                    return fail(state, MarketplaceError::AttendanceAlreadyDecided);
                }
                session.attendance.tutor.status = ConfirmationStatus::Accepted;
                session.attendance.tutor.decided_at = Some(now);
                session.log(ActorRole::Tutor, "checked_in", None, now);
            }
            ParticipantRole::Student => {
                if session.attendance.tutor.status != ConfirmationStatus::Accepted {
                    return fail(state, MarketplaceError::TutorNotCheckedIn);
                }
                if !session.attendance.student.is_pending() {
                    return fail(state, MarketplaceError::AttendanceAlreadyDecided);
                }
                session.attendance.student.status = ConfirmationStatus::Accepted;
                session.attendance.student.decided_at = Some(now);
                session.log(ActorRole::Student, "checked_in", None, now);
            }
        }
        session.commitment_id
    };

    let outcome = {
        let Some(session) = state.session_mut(&session_id) else {
            return SmallVec::new();
        };
        finalize(session, now)
    };
    outcome.map_or_else(SmallVec::new, |o| apply_outcome(state, env, commitment_id, o))
}

fn handle_reject_attendance(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    caller: UserId,
    reason: String,
    evidence_urls: Vec<String>,
) -> Effects {
    let now = env.clock.now();
    let (role, counterparty) = match attendance_gate(state, env, session_id, caller, now) {
        Ok(resolved) => resolved,
        Err(effects) => return effects,
    };

    let commitment_id;
    let outcome;
    {
        let Some(session) = state.session_mut(&session_id) else {
            return fail(state, MarketplaceError::SessionNotFound(session_id));
        };
        commitment_id = session.commitment_id;
        match role {
            ParticipantRole::Tutor => {
                if !session.attendance.tutor.is_pending() {
                    return fail(state, MarketplaceError::AttendanceAlreadyDecided);
                }
                mark_absent(session, ParticipantRole::Tutor, &reason, evidence_urls, now);
                session.log(
                    ActorRole::Tutor,
                    "attendance_rejected",
                    Some(reason.clone()),
                    now,
                );
                outcome = finalize(session, now);
            }
            ParticipantRole::Student => {
                if session.attendance.tutor.is_pending() {
                    return fail(state, MarketplaceError::TutorNotCheckedIn);
                }
                if !session.attendance.student.is_pending() {
                    return fail(state, MarketplaceError::AttendanceAlreadyDecided);
                }
                // The tutor has claimed attendance: contesting it is a
                // dispute and needs substantiation.
                if reason.trim().is_empty() || evidence_urls.is_empty() {
                    return fail(state, MarketplaceError::EvidenceRequired);
                }
                session.attendance.student.status = ConfirmationStatus::Rejected;
                session.attendance.student.decided_at = Some(now);
                session.dispute = Some(Dispute {
                    status: DisputeStatus::Open,
                    opened_by: caller,
                    reason: reason.clone(),
                    evidence_urls,
                    opened_at: now,
                    resolved_at: None,
                    resolved_by: None,
                    decision: None,
                    admin_notes: None,
                });
                session.status = SessionStatus::Disputed;
                session.log(ActorRole::Student, "dispute_opened", Some(reason), now);
                outcome = finalize(session, now);
            }
        }
    }

    let mut effects: Effects = smallvec::smallvec![notify_effect(
        env,
        counterparty,
        match role {
            ParticipantRole::Tutor => "Session marked not conducted",
            ParticipantRole::Student => "Attendance disputed",
        },
        "The counterparty rejected attendance for your session".to_string(),
    )];
    if let Some(o) = outcome {
        effects.extend(apply_outcome(state, env, commitment_id, o));
    }
    effects
}

// ============================================================================
// Cancellation
// ============================================================================

fn handle_cancel(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    caller: UserId,
    reason: String,
) -> Effects {
    let now = env.clock.now();
    let Some(session) = state.session(&session_id) else {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    };
    if session.is_deleted {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    }
    let commitment_id = session.commitment_id;
    let Some(c) = state.commitment(&commitment_id) else {
        return fail(state, MarketplaceError::CommitmentNotFound(commitment_id));
    };
    let Some(role) = c.role_of(caller) else {
        return fail(state, MarketplaceError::NotAParticipant);
    };
    let counterparty = c.counterparty(role);

    let Some(session) = state.session_mut(&session_id) else {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    };
    if !matches!(
        session.status,
        SessionStatus::Scheduled | SessionStatus::Confirmed
    ) || now >= session.start_time
    {
        return fail(state, MarketplaceError::CannotCancel);
    }
    session.cancellation = Some(crate::types::Cancellation {
        cancelled_by: caller,
        reason: reason.clone(),
        cancelled_at: now,
    });
    session.status = SessionStatus::Cancelled;
    if session.student_confirmation.status == ConfirmationStatus::Pending {
        // Never entered the confirmation flow; the proposal disappears.
        session.soft_delete(Some(caller), now);
    }
    let actor = match role {
        ParticipantRole::Tutor => ActorRole::Tutor,
        ParticipantRole::Student => ActorRole::Student,
    };
    session.log(actor, "session_cancelled", Some(reason), now);

    smallvec::smallvec![notify_effect(
        env,
        counterparty,
        "Session cancelled",
        "An upcoming session was cancelled".to_string(),
    )]
}

// ============================================================================
// Dispute arbitration
// ============================================================================

fn handle_resolve_dispute(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    admin: UserId,
    decision: DisputeDecision,
    admin_notes: String,
) -> Effects {
    let now = env.clock.now();
    let Some(session) = state.session(&session_id) else {
        return fail(state, MarketplaceError::SessionNotFound(session_id));
    };
    let commitment_id = session.commitment_id;
    if !session
        .dispute
        .as_ref()
        .is_some_and(|d| d.status == DisputeStatus::Open)
    {
        return fail(state, MarketplaceError::NoOpenDispute(session_id));
    }

    let outcome = {
        let Some(session) = state.session_mut(&session_id) else {
            return fail(state, MarketplaceError::SessionNotFound(session_id));
        };
        if let Some(dispute) = session.dispute.as_mut() {
            dispute.status = DisputeStatus::Resolved;
            dispute.resolved_at = Some(now);
            dispute.resolved_by = Some(admin);
            dispute.decision = Some(decision);
            dispute.admin_notes = Some(admin_notes.clone());
        }
        match decision {
            DisputeDecision::Completed => {
                session.attendance.tutor.status = ConfirmationStatus::Accepted;
                session.attendance.tutor.decided_at.get_or_insert(now);
                session.attendance.student.status = ConfirmationStatus::Accepted;
                session.attendance.student.decided_at = Some(now);
                session.attendance.is_attended = true;
                session.attendance.finalized_at.get_or_insert(now);
                session.status = SessionStatus::Completed;
                session.log(
                    ActorRole::Admin,
                    "dispute_resolved_completed",
                    Some(admin_notes),
                    now,
                );
                Settled::Completed
            }
            DisputeDecision::NotConducted => {
                mark_absent(
                    session,
                    ParticipantRole::Tutor,
                    &admin_notes,
                    Vec::new(),
                    now,
                );
                mark_absent(
                    session,
                    ParticipantRole::Student,
                    &admin_notes,
                    Vec::new(),
                    now,
                );
                session.attendance.is_attended = false;
                session.attendance.finalized_at.get_or_insert(now);
                session.status = SessionStatus::NotConducted;
                session.log(
                    ActorRole::Admin,
                    "dispute_resolved_not_conducted",
                    Some(admin_notes),
                    now,
                );
                Settled::NotConducted
            }
        }
    };

    let mut effects = apply_outcome(state, env, commitment_id, outcome);
    if let Some(c) = state.commitment(&commitment_id) {
        effects.push(notify_effect(
            env,
            c.tutor_id,
            "Dispute resolved",
            "An admin resolved the dispute on your session".to_string(),
        ));
        effects.push(notify_effect(
            env,
            c.student_id,
            "Dispute resolved",
            "An admin resolved the dispute on your session".to_string(),
        ));
    }
    effects
}

// ============================================================================
// Timeout sweep
// ============================================================================

fn handle_sweep(state: &mut MarketplaceState, env: &LifecycleEnvironment) -> Effects {
    let now = env.clock.now();
    let mut effects: Effects = SmallVec::new();

    let ids: Vec<SessionId> = state.sessions().keys().copied().collect();
    for id in ids {
        effects.extend(resolve_session(state, env, id, now));
    }

    // Completed commitments whose money transfer has not landed yet are
    // retried here; the transfer is idempotent behind its guard.
    let unsettled: Vec<CommitmentId> = state
        .commitments()
        .values()
        .filter(|c| {
            c.status == crate::types::CommitmentStatus::Completed && !c.is_money_transferred
        })
        .map(|c| c.id)
        .collect();
    for id in unsettled {
        effects.push(settlement_effect(env, id));
    }

    effects
}

/// Resolve one session's expired deadlines. Idempotent: every mutation is
/// gated on a Pending sub-status or a non-terminal status, so re-running on
/// an already-resolved session is a no-op.
fn resolve_session(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Effects {
    let Some(session) = state.session(&session_id) else {
        return SmallVec::new();
    };
    if session.is_deleted {
        return SmallVec::new();
    }
    let commitment_id = session.commitment_id;
    let Some(c) = state.commitment(&commitment_id) else {
        return SmallVec::new();
    };
    let (tutor_id, student_id) = (c.tutor_id, c.student_id);

    let mut effects: Effects = SmallVec::new();
    let outcome = {
        let Some(session) = state.session_mut(&session_id) else {
            return SmallVec::new();
        };

        // Pre-session: an unconfirmed proposal dies at start - 15min.
        if session.status == SessionStatus::Scheduled
            && session.student_confirmation.status == ConfirmationStatus::Pending
            && now > env.grace.confirmation_deadline(session.start_time)
        {
            force_auto_reject(session, now);
            effects.push(notify_effect(
                env,
                tutor_id,
                "Session auto-rejected",
                "The student did not confirm the session in time".to_string(),
            ));
            return effects;
        }

        // Post-session: only confirmed sessions settle attendance.
        if session.status != SessionStatus::Confirmed {
            return effects;
        }
        let window = session.attendance_window;
        if session.attendance.tutor.is_pending() && now > window.tutor_deadline {
            mark_absent(
                session,
                ParticipantRole::Tutor,
                "Tutor did not check in before the deadline",
                Vec::new(),
                now,
            );
            session.log(ActorRole::System, "auto_marked_tutor_absent", None, now);
            effects.push(notify_effect(
                env,
                student_id,
                "Session not conducted",
                "The tutor missed the check-in deadline".to_string(),
            ));
            finalize(session, now)
        } else if session.attendance.tutor.status == ConfirmationStatus::Accepted
            && session.attendance.student.is_pending()
            && now > window.student_deadline
        {
            mark_absent(
                session,
                ParticipantRole::Student,
                "Student did not check in before the deadline",
                Vec::new(),
                now,
            );
            session.log(ActorRole::System, "auto_marked_student_absent", None, now);
            effects.push(notify_effect(
                env,
                tutor_id,
                "Session not conducted",
                "The student missed the check-in deadline".to_string(),
            ));
            finalize(session, now)
        } else {
            None
        }
    };

    if let Some(o) = outcome {
        effects.extend(apply_outcome(state, env, commitment_id, o));
    }
    effects
}
