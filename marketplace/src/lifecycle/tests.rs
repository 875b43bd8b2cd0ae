//! Scenario tests for the lifecycle reducer.
//!
//! These drive the reducer directly against a stepping clock, so a whole
//! deadline story (propose, confirm, cross a grace boundary, sweep) runs
//! deterministically in one test.

#![allow(clippy::unwrap_used)]

use super::actions::{LifecycleAction, ParticipationDecision};
use super::environment::mocks::{NullNotifier, NullSettlementGateway};
use super::environment::LifecycleEnvironment;
use super::reducer::LifecycleReducer;
use crate::deadlines::GracePolicy;
use crate::error::MarketplaceError;
use crate::scheduling::SlotTemplate;
use crate::types::{
    CommitmentId, CommitmentStatus, ConfirmationStatus, DisputeDecision, DisputeStatus,
    LearningCommitment, MarketplaceState, SessionId, SessionStatus, UserId,
};
use chrono::{DateTime, Duration, Utc};
use smallvec::SmallVec;
use std::sync::Arc;
use tutorlink_core::effect::Effect;
use tutorlink_core::environment::Clock;
use tutorlink_core::reducer::Reducer;
use tutorlink_testing::assertions::{assert_has_future_effect, assert_no_effects};
use tutorlink_testing::mocks::{test_epoch, SteppingClock};
use tutorlink_testing::ReducerTest;

struct Fixture {
    reducer: LifecycleReducer,
    env: LifecycleEnvironment,
    clock: Arc<SteppingClock>,
    state: MarketplaceState,
    commitment_id: CommitmentId,
    tutor: UserId,
    student: UserId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_total_sessions(8)
    }

    fn with_total_sessions(total: u32) -> Self {
        let clock = Arc::new(SteppingClock::new(test_epoch()));
        let env = LifecycleEnvironment::new(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(NullNotifier),
            Arc::new(NullSettlementGateway),
            GracePolicy::default(),
        );
        let tutor = UserId::new();
        let student = UserId::new();
        let commitment = LearningCommitment {
            id: CommitmentId::new(),
            tutor_id: tutor,
            student_id: student,
            status: CommitmentStatus::Active,
            total_sessions: total,
            sessions_per_week: 2,
            start_date: test_epoch(),
            extended_weeks: 0,
            completed_sessions: 0,
            absent_sessions: 0,
            makeup_sessions_issued: 0,
            total_amount: 100 * i64::from(total),
            student_paid_amount: 100 * i64::from(total),
            is_money_transferred: false,
        };
        let commitment_id = commitment.id;
        let mut state = MarketplaceState::new();
        state.insert_commitment(commitment);
        Self {
            reducer: LifecycleReducer::new(),
            env,
            clock,
            state,
            commitment_id,
            tutor,
            student,
        }
    }

    fn reduce(&mut self, action: LifecycleAction) -> SmallVec<[Effect<LifecycleAction>; 4]> {
        self.state.last_error = None;
        self.reducer.reduce(&mut self.state, action, &self.env)
    }

    fn error(&self) -> Option<MarketplaceError> {
        self.state.last_error.clone()
    }

    fn create_session(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> SessionId {
        let session_id = SessionId::new();
        self.reduce(LifecycleAction::CreateSession {
            session_id,
            commitment_id: self.commitment_id,
            caller: self.tutor,
            start_time: start,
            end_time: end,
            location: None,
            notes: None,
        });
        assert_eq!(self.error(), None);
        session_id
    }

    fn confirmed_session(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> SessionId {
        let session_id = self.create_session(start, end);
        self.reduce(LifecycleAction::ConfirmParticipation {
            session_id,
            caller: self.student,
            decision: ParticipationDecision::Accepted,
        });
        assert_eq!(self.error(), None);
        session_id
    }

    fn check_in(&mut self, session_id: SessionId, caller: UserId) {
        self.reduce(LifecycleAction::CheckIn { session_id, caller });
    }

    fn sweep(&mut self) -> SmallVec<[Effect<LifecycleAction>; 4]> {
        self.reduce(LifecycleAction::SweepTimeouts)
    }
}

fn day_after_epoch() -> (DateTime<Utc>, DateTime<Utc>) {
    let start = test_epoch() + Duration::hours(24);
    (start, start + Duration::hours(1))
}

// ============================================================================
// Creation and confirmation
// ============================================================================

#[test]
fn create_requires_full_payment() {
    let mut f = Fixture::new();
    let commitment_id = f.commitment_id;
    if let Some(c) = f.state.commitment_mut(&commitment_id) {
        c.student_paid_amount = 0;
    }
    let (start, end) = day_after_epoch();
    let effects = f.reduce(LifecycleAction::CreateSession {
        session_id: SessionId::new(),
        commitment_id: f.commitment_id,
        caller: f.tutor,
        start_time: start,
        end_time: end,
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::CommitmentNotPaid));
    assert_no_effects(&effects);
}

#[test]
fn create_is_tutor_only() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    f.reduce(LifecycleAction::CreateSession {
        session_id: SessionId::new(),
        commitment_id: f.commitment_id,
        caller: f.student,
        start_time: start,
        end_time: end,
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::NotTheTutor));
}

#[test]
fn create_rejects_overlap_with_existing_booking() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    f.create_session(start, end);
    f.reduce(LifecycleAction::CreateSession {
        session_id: SessionId::new(),
        commitment_id: f.commitment_id,
        caller: f.tutor,
        start_time: start + Duration::minutes(30),
        end_time: end + Duration::minutes(30),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::ScheduleConflict(start)));
}

#[test]
fn confirmation_accept_moves_to_confirmed() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.create_session(start, end);
    f.reduce(LifecycleAction::ConfirmParticipation {
        session_id: id,
        caller: f.student,
        decision: ParticipationDecision::Accepted,
    });
    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Confirmed);
    assert_eq!(
        session.student_confirmation.status,
        ConfirmationStatus::Accepted
    );
}

#[test]
fn confirmation_is_single_shot() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.reduce(LifecycleAction::ConfirmParticipation {
        session_id: id,
        caller: f.student,
        decision: ParticipationDecision::Rejected,
    });
    assert_eq!(f.error(), Some(MarketplaceError::ConfirmationAlreadyMade));
    assert_eq!(
        f.state.session(&id).unwrap().status,
        SessionStatus::Confirmed
    );
}

#[test]
fn confirmation_reject_soft_deletes() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.create_session(start, end);
    f.reduce(LifecycleAction::ConfirmParticipation {
        session_id: id,
        caller: f.student,
        decision: ParticipationDecision::Rejected,
    });
    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Rejected);
    assert!(session.is_deleted);
}

#[test]
fn accepting_one_session_auto_accepts_siblings() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let first = f.create_session(start, end);
    let second = f.create_session(start + Duration::days(2), end + Duration::days(2));
    f.reduce(LifecycleAction::ConfirmParticipation {
        session_id: first,
        caller: f.student,
        decision: ParticipationDecision::Accepted,
    });
    assert_eq!(
        f.state.session(&second).unwrap().status,
        SessionStatus::Confirmed
    );
    assert_eq!(
        f.state
            .session(&second)
            .unwrap()
            .student_confirmation
            .status,
        ConfirmationStatus::Accepted
    );
}

#[test]
fn unconfirmed_session_auto_rejects_at_deadline() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.create_session(start, end);

    // Just inside the lead window: nothing happens yet.
    f.clock.set(start - Duration::minutes(16));
    let effects = f.sweep();
    assert_no_effects(&effects);
    assert_eq!(
        f.state.session(&id).unwrap().status,
        SessionStatus::Scheduled
    );

    f.clock.set(start - Duration::minutes(10));
    f.sweep();
    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Rejected);
    assert!(session.is_deleted);
    assert_eq!(
        session.student_confirmation.status,
        ConfirmationStatus::Rejected
    );

    // Re-sweeping the resolved record is a no-op.
    let effects = f.sweep();
    assert_no_effects(&effects);
}

#[test]
fn late_confirmation_resolves_then_fails() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.create_session(start, end);
    f.clock.set(start - Duration::minutes(5));
    f.reduce(LifecycleAction::ConfirmParticipation {
        session_id: id,
        caller: f.student,
        decision: ParticipationDecision::Accepted,
    });
    assert_eq!(
        f.error(),
        Some(MarketplaceError::ConfirmationDeadlinePassed)
    );
    assert_eq!(f.state.session(&id).unwrap().status, SessionStatus::Rejected);
}

// ============================================================================
// Attendance settlement
// ============================================================================

#[test]
fn dual_check_in_completes_session() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    assert_eq!(f.error(), None);
    f.check_in(id, f.student);
    assert_eq!(f.error(), None);

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.attendance.is_attended);
    assert!(session.attendance.finalized_at.is_some());
    assert!(session.absence.is_none());

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.completed_sessions, 1);
}

#[test]
fn check_in_requires_session_started() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.check_in(id, f.tutor);
    assert_eq!(f.error(), Some(MarketplaceError::SessionNotStarted));
}

#[test]
fn student_cannot_check_in_before_tutor() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.student);
    assert_eq!(f.error(), Some(MarketplaceError::TutorNotCheckedIn));
}

#[test]
fn student_cannot_reject_before_tutor_acts() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.reduce(LifecycleAction::RejectAttendance {
        session_id: id,
        caller: f.student,
        reason: "nobody showed up".to_string(),
        evidence_urls: vec!["https://evidence.example/1".to_string()],
    });
    assert_eq!(f.error(), Some(MarketplaceError::TutorNotCheckedIn));
}

#[test]
fn check_in_is_single_shot_per_side() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    f.check_in(id, f.tutor);
    assert_eq!(f.error(), Some(MarketplaceError::AttendanceAlreadyDecided));
}

#[test]
fn tutor_rejection_settles_immediately() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.reduce(LifecycleAction::RejectAttendance {
        session_id: id,
        caller: f.tutor,
        reason: "Student never arrived".to_string(),
        evidence_urls: Vec::new(),
    });
    assert_eq!(f.error(), None);

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::NotConducted);
    assert!(!session.attendance.is_attended);
    let absence = session.absence.as_ref().unwrap();
    assert!(absence.tutor_absent);
    assert!(!absence.student_absent);

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.absent_sessions, 1);
    assert_eq!(c.extended_weeks, 1);
}

#[test]
fn late_check_in_resolves_timeouts_inline() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(end + Duration::minutes(20));
    f.check_in(id, f.tutor);
    assert_eq!(
        f.error(),
        Some(MarketplaceError::DeadlinePassed {
            role: crate::types::ParticipantRole::Tutor
        })
    );
    // The failed attempt still finalized the record.
    assert_eq!(
        f.state.session(&id).unwrap().status,
        SessionStatus::NotConducted
    );
}

// ============================================================================
// Timeout sweep
// ============================================================================

#[test]
fn tutor_no_show_marks_session_not_conducted() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(end + Duration::minutes(16));
    f.sweep();

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::NotConducted);
    let absence = session.absence.as_ref().unwrap();
    assert!(absence.tutor_absent);
    assert!(!absence.student_absent);
    assert!(session.attendance.finalized_at.is_some());
}

#[test]
fn student_no_show_waits_for_the_longer_grace() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(30));
    f.check_in(id, f.tutor);

    // Tutor deadline passed but the student still has grace left.
    f.clock.set(end + Duration::minutes(20));
    f.sweep();
    assert_eq!(
        f.state.session(&id).unwrap().status,
        SessionStatus::Confirmed
    );

    f.clock.set(end + Duration::minutes(31));
    f.sweep();
    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::NotConducted);
    let absence = session.absence.as_ref().unwrap();
    assert!(absence.student_absent);
    assert!(!absence.tutor_absent);
}

#[test]
fn sweep_is_idempotent_over_commitment_counters() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    f.confirmed_session(start, end);
    f.clock.set(end + Duration::minutes(16));
    f.sweep();
    f.sweep();
    f.sweep();

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.absent_sessions, 1);
    assert_eq!(c.extended_weeks, 1);
}

#[test]
fn completing_the_last_session_finishes_and_settles() {
    let mut f = Fixture::with_total_sessions(1);
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    let effects = f.reduce(LifecycleAction::CheckIn {
        session_id: id,
        caller: f.student,
    });

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.status, CommitmentStatus::Completed);
    assert!(!c.is_money_transferred);
    // Two notifications plus the settlement trigger.
    assert_has_future_effect(&effects);

    // The gateway acknowledgement feeds back and latches the guard.
    f.reduce(LifecycleAction::SettlementCompleted {
        commitment_id: f.commitment_id,
    });
    assert!(
        f.state
            .commitment(&f.commitment_id)
            .unwrap()
            .is_money_transferred
    );

    // Once latched, sweeps stop retrying the transfer.
    let effects = f.sweep();
    assert_no_effects(&effects);
}

#[test]
fn sweep_retries_unsettled_completed_commitment() {
    let mut f = Fixture::with_total_sessions(1);
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    f.check_in(id, f.student);

    let effects = f.sweep();
    assert_has_future_effect(&effects);
}

// ============================================================================
// Disputes
// ============================================================================

fn disputed_session(f: &mut Fixture) -> SessionId {
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    f.reduce(LifecycleAction::RejectAttendance {
        session_id: id,
        caller: f.student,
        reason: "The tutor left after five minutes".to_string(),
        evidence_urls: vec!["https://evidence.example/chat".to_string()],
    });
    assert_eq!(f.error(), None);
    id
}

#[test]
fn student_rejection_against_check_in_opens_dispute() {
    let mut f = Fixture::new();
    let id = disputed_session(&mut f);

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Disputed);
    let dispute = session.dispute.as_ref().unwrap();
    assert_eq!(dispute.status, DisputeStatus::Open);
    assert_eq!(dispute.opened_by, f.student);
    // Arbitration owns the outcome: no counters moved yet.
    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.completed_sessions, 0);
    assert_eq!(c.absent_sessions, 0);
}

#[test]
fn dispute_requires_evidence() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(5));
    f.check_in(id, f.tutor);
    f.reduce(LifecycleAction::RejectAttendance {
        session_id: id,
        caller: f.student,
        reason: "did not happen".to_string(),
        evidence_urls: Vec::new(),
    });
    assert_eq!(f.error(), Some(MarketplaceError::EvidenceRequired));
    assert_eq!(f.state.session(&id).unwrap().status, SessionStatus::Confirmed);
}

#[test]
fn disputed_session_is_shielded_from_the_sweep() {
    let mut f = Fixture::new();
    let id = disputed_session(&mut f);
    let (_, end) = day_after_epoch();
    f.clock.set(end + Duration::hours(48));
    f.sweep();
    assert_eq!(f.state.session(&id).unwrap().status, SessionStatus::Disputed);
}

#[test]
fn arbitration_completed_counts_the_session() {
    let mut f = Fixture::new();
    let id = disputed_session(&mut f);
    let admin = UserId::new();
    f.reduce(LifecycleAction::ResolveDispute {
        session_id: id,
        admin,
        decision: DisputeDecision::Completed,
        admin_notes: "Chat log shows the full hour".to_string(),
    });
    assert_eq!(f.error(), None);

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.attendance.is_attended);
    let dispute = session.dispute.as_ref().unwrap();
    assert_eq!(dispute.status, DisputeStatus::Resolved);
    assert_eq!(dispute.resolved_by, Some(admin));
    assert_eq!(dispute.decision, Some(DisputeDecision::Completed));

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.completed_sessions, 1);
    assert_eq!(c.absent_sessions, 0);
}

#[test]
fn arbitration_not_conducted_records_the_absence() {
    let mut f = Fixture::new();
    let id = disputed_session(&mut f);
    f.reduce(LifecycleAction::ResolveDispute {
        session_id: id,
        admin: UserId::new(),
        decision: DisputeDecision::NotConducted,
        admin_notes: "Evidence supports the student".to_string(),
    });

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::NotConducted);
    assert!(!session.attendance.is_attended);
    assert!(session.absence.is_some());

    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.completed_sessions, 0);
    assert_eq!(c.absent_sessions, 1);
}

#[test]
fn arbitration_requires_an_open_dispute() {
    let mut f = Fixture::new();
    let id = disputed_session(&mut f);
    f.reduce(LifecycleAction::ResolveDispute {
        session_id: id,
        admin: UserId::new(),
        decision: DisputeDecision::Completed,
        admin_notes: String::new(),
    });
    f.reduce(LifecycleAction::ResolveDispute {
        session_id: id,
        admin: UserId::new(),
        decision: DisputeDecision::NotConducted,
        admin_notes: String::new(),
    });
    assert_eq!(f.error(), Some(MarketplaceError::NoOpenDispute(id)));
    // First ruling stands.
    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.completed_sessions, 1);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn cancel_before_start_by_either_party() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.reduce(LifecycleAction::CancelSession {
        session_id: id,
        caller: f.student,
        reason: "Sick today".to_string(),
    });
    assert_eq!(f.error(), None);

    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    let cancellation = session.cancellation.as_ref().unwrap();
    assert_eq!(cancellation.cancelled_by, f.student);
    // A confirmed session keeps its record visible after cancellation.
    assert!(!session.is_deleted);
}

#[test]
fn cancel_unconfirmed_proposal_removes_it() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.create_session(start, end);
    f.reduce(LifecycleAction::CancelSession {
        session_id: id,
        caller: f.tutor,
        reason: "Wrong time".to_string(),
    });
    let session = f.state.session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(session.is_deleted);
}

#[test]
fn cancel_after_start_is_rejected() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.clock.set(start + Duration::minutes(1));
    f.reduce(LifecycleAction::CancelSession {
        session_id: id,
        caller: f.tutor,
        reason: "too late".to_string(),
    });
    assert_eq!(f.error(), Some(MarketplaceError::CannotCancel));
}

#[test]
fn cancelled_slot_frees_the_calendar() {
    let mut f = Fixture::new();
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    f.reduce(LifecycleAction::CancelSession {
        session_id: id,
        caller: f.tutor,
        reason: "Rescheduling".to_string(),
    });
    // The slot can be booked again.
    f.create_session(start, end);
    assert_eq!(f.error(), None);
}

#[test]
fn terminal_states_keep_attendance_and_absence_exclusive() {
    let mut f = Fixture::new();
    let day = |k: i64| {
        let start = test_epoch() + Duration::hours(24 * k);
        (start, start + Duration::hours(1))
    };
    // One session per day, each driven to a different terminal state.
    let (s1, end1) = day(1);
    let attended = f.confirmed_session(s1, end1);
    let (s2, end2) = day(2);
    let rejected_by_tutor = f.confirmed_session(s2, end2);
    let (s3, end3) = day(3);
    let swept_no_show = f.confirmed_session(s3, end3);
    let (s4, end4) = day(4);
    let arbitrated_attended = f.confirmed_session(s4, end4);
    let (s5, end5) = day(5);
    let arbitrated_absent = f.confirmed_session(s5, end5);
    let (s6, end6) = day(6);
    let cancelled = f.confirmed_session(s6, end6);

    f.clock.set(s1 + Duration::minutes(5));
    f.check_in(attended, f.tutor);
    f.check_in(attended, f.student);

    f.clock.set(s2 + Duration::minutes(5));
    f.reduce(LifecycleAction::RejectAttendance {
        session_id: rejected_by_tutor,
        caller: f.tutor,
        reason: "Student never arrived".to_string(),
        evidence_urls: vec![],
    });

    f.clock.set(end3 + Duration::minutes(31));
    f.sweep();

    for (start, id, decision) in [
        (s4, arbitrated_attended, DisputeDecision::Completed),
        (s5, arbitrated_absent, DisputeDecision::NotConducted),
    ] {
        f.clock.set(start + Duration::minutes(5));
        f.check_in(id, f.tutor);
        f.reduce(LifecycleAction::RejectAttendance {
            session_id: id,
            caller: f.student,
            reason: "The tutor left early".to_string(),
            evidence_urls: vec!["https://evidence.example/chat".to_string()],
        });
        f.reduce(LifecycleAction::ResolveDispute {
            session_id: id,
            admin: UserId::new(),
            decision,
            admin_notes: String::new(),
        });
        assert_eq!(f.error(), None);
    }

    f.reduce(LifecycleAction::CancelSession {
        session_id: cancelled,
        caller: f.student,
        reason: "Travelling".to_string(),
    });
    assert_eq!(f.error(), None);

    assert_eq!(
        f.state.session(&attended).unwrap().status,
        SessionStatus::Completed
    );
    assert_eq!(
        f.state.session(&rejected_by_tutor).unwrap().status,
        SessionStatus::NotConducted
    );
    assert_eq!(
        f.state.session(&swept_no_show).unwrap().status,
        SessionStatus::NotConducted
    );
    assert_eq!(
        f.state.session(&arbitrated_attended).unwrap().status,
        SessionStatus::Completed
    );
    assert_eq!(
        f.state.session(&arbitrated_absent).unwrap().status,
        SessionStatus::NotConducted
    );
    assert_eq!(
        f.state.session(&cancelled).unwrap().status,
        SessionStatus::Cancelled
    );

    for session in f.state.sessions().values() {
        // Attendance and non-conduct are mutually exclusive causes.
        assert!(
            !(session.attendance.is_attended && session.status == SessionStatus::NotConducted),
            "session {:?} is both attended and not conducted",
            session.id
        );
        match session.status {
            SessionStatus::Completed => assert!(session.attendance.is_attended),
            SessionStatus::NotConducted => {
                let absence = session.absence.as_ref().unwrap();
                assert!(absence.student_absent || absence.tutor_absent);
                assert!(!session.attendance.is_attended);
            }
            _ => assert!(!session.attendance.is_attended),
        }
    }
}

// ============================================================================
// Recurring batches
// ============================================================================

fn weekly_slots(first: DateTime<Utc>) -> Vec<SlotTemplate> {
    vec![
        SlotTemplate {
            start_time: first,
            end_time: first + Duration::hours(1),
        },
        SlotTemplate {
            start_time: first + Duration::days(2),
            end_time: first + Duration::days(2) + Duration::hours(1),
        },
    ]
}

#[test]
fn batch_fills_remaining_capacity_in_order() {
    let mut f = Fixture::new();
    let first = test_epoch() + Duration::hours(10);
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: weekly_slots(first),
        location: Some("Room 2".to_string()),
        notes: None,
    });
    assert_eq!(f.error(), None);
    assert_eq!(f.state.last_scheduled.len(), 8);

    let mut starts: Vec<DateTime<Utc>> = f
        .state
        .last_scheduled
        .iter()
        .map(|id| f.state.session(id).unwrap().start_time)
        .collect();
    let sorted = {
        let mut s = starts.clone();
        s.sort();
        s
    };
    assert_eq!(starts, sorted);
    // Two slots a week for a 2-per-week commitment: 4 calendar weeks.
    starts.dedup();
    assert_eq!(starts.len(), 8);
}

#[test]
fn batch_respects_weekly_quota() {
    let mut f = Fixture::new();
    let first = test_epoch() + Duration::hours(10);
    // Three weekly slots against a 2-per-week commitment: the third defers.
    let mut slots = weekly_slots(first);
    slots.push(SlotTemplate {
        start_time: first + Duration::days(3),
        end_time: first + Duration::days(3) + Duration::hours(1),
    });
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots,
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), None);

    use std::collections::HashMap;
    let mut per_week: HashMap<(i32, u32), usize> = HashMap::new();
    for id in &f.state.last_scheduled {
        let start = f.state.session(id).unwrap().start_time;
        use chrono::Datelike;
        let week = start.iso_week();
        *per_week.entry((week.year(), week.week())).or_default() += 1;
    }
    assert!(per_week.values().all(|&count| count <= 2));
}

#[test]
fn batch_conflict_fails_whole_batch() {
    let mut f = Fixture::new();
    let first = test_epoch() + Duration::hours(10);
    // Pre-book a session on top of the first occurrence. The clash must sit
    // on a candidate that clears the weekly quota, because a quota-deferred
    // candidate moves a week ahead without ever being conflict-checked.
    f.create_session(first, first + Duration::hours(1));
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: weekly_slots(first),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::ScheduleConflict(first)));
    assert!(f.state.last_scheduled.is_empty());
}

#[test]
fn quota_deferral_steps_a_masked_clash_over() {
    let mut f = Fixture::new();
    let first = test_epoch() + Duration::hours(10);
    // Fill the first ISO week with a booking on the second occurrence: the
    // Wednesday candidate books, the clashing Friday candidate is already
    // over quota and defers to the following week, clear of the clash.
    let clash = first + Duration::days(2);
    f.create_session(clash, clash + Duration::hours(1));
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: weekly_slots(first),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), None);
    assert!(
        f.state
            .last_scheduled
            .iter()
            .all(|id| f.state.session(id).unwrap().start_time != clash)
    );
}

#[test]
fn batch_counts_pending_sessions_against_capacity() {
    let mut f = Fixture::with_total_sessions(2);
    let (start, end) = day_after_epoch();
    f.create_session(start, end);
    f.create_session(start + Duration::days(7), end + Duration::days(7));
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: weekly_slots(test_epoch() + Duration::hours(10)),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::NoRemainingSlots));
}

#[test]
fn capacity_cap_limits_makeup_grants() {
    let mut f = Fixture::with_total_sessions(2);
    let (start, end) = day_after_epoch();
    let id = f.confirmed_session(start, end);
    // Tutor no-show: one absence, one make-up slot earned.
    f.clock.set(end + Duration::minutes(16));
    f.sweep();
    assert_eq!(
        f.state.session(&id).unwrap().status,
        SessionStatus::NotConducted
    );

    let first = f.clock.now() + Duration::hours(10);
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: weekly_slots(first),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), None);
    // 2 contracted - 0 completed - 0 pending + 1 make-up, capped at the
    // contract size of 2. The booking fits inside base capacity, so the
    // make-up grant stays unconsumed.
    assert_eq!(f.state.last_scheduled.len(), 2);
    let c = f.state.commitment(&f.commitment_id).unwrap();
    assert_eq!(c.makeup_sessions_issued, 0);
    assert_eq!(c.uncompensated_absences(), 1);
}

#[test]
fn makeup_consumption_is_recorded() {
    let mut f = Fixture::with_total_sessions(4);
    let commitment_id = f.commitment_id;
    // Well into the commitment: three delivered, two tutor absences.
    if let Some(c) = f.state.commitment_mut(&commitment_id) {
        c.completed_sessions = 3;
        c.absent_sessions = 2;
        c.extended_weeks = 1;
    }

    // Base capacity is 1; the other two bookable slots come out of the
    // make-up grant and must be recorded as issued.
    let first = test_epoch() + Duration::hours(10);
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id,
        caller: f.tutor,
        slots: weekly_slots(first),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), None);
    assert_eq!(f.state.last_scheduled.len(), 3);
    let c = f.state.commitment(&commitment_id).unwrap();
    assert_eq!(c.makeup_sessions_issued, 2);
    assert_eq!(c.uncompensated_absences(), 0);
}

#[test]
fn batch_requires_at_least_one_slot() {
    let mut f = Fixture::new();
    f.reduce(LifecycleAction::ScheduleRecurring {
        commitment_id: f.commitment_id,
        caller: f.tutor,
        slots: Vec::new(),
        location: None,
        notes: None,
    });
    assert_eq!(f.error(), Some(MarketplaceError::NoSlots));
}

// ============================================================================
// Harness-style checks
// ============================================================================

#[test]
fn sweep_on_empty_state_is_a_no_op() {
    let env = LifecycleEnvironment::new(
        Arc::new(SteppingClock::new(test_epoch())),
        Arc::new(NullNotifier),
        Arc::new(NullSettlementGateway),
        GracePolicy::default(),
    );
    ReducerTest::new(LifecycleReducer::new())
        .with_env(env)
        .given_state(MarketplaceState::new())
        .when_action(LifecycleAction::SweepTimeouts)
        .then_state(|state| assert!(state.sessions().is_empty()))
        .then_effects(|effects| assert_no_effects(effects))
        .run();
}

#[test]
fn unknown_session_is_reported_as_missing() {
    let env = LifecycleEnvironment::new(
        Arc::new(SteppingClock::new(test_epoch())),
        Arc::new(NullNotifier),
        Arc::new(NullSettlementGateway),
        GracePolicy::default(),
    );
    let missing = SessionId::new();
    ReducerTest::new(LifecycleReducer::new())
        .with_env(env)
        .given_state(MarketplaceState::new())
        .when_action(LifecycleAction::CheckIn {
            session_id: missing,
            caller: UserId::new(),
        })
        .then_state(move |state| {
            assert_eq!(
                state.last_error,
                Some(MarketplaceError::SessionNotFound(missing))
            );
        })
        .run();
}
