//! Recurring-slot batch scheduling.
//!
//! The tutor submits one representative occurrence per weekly slot; the
//! planner projects each slot forward in 7-day steps and books sessions until
//! the commitment's remaining capacity is used up or its date window runs
//! out. Projection is earliest-first across slots via a min-heap, so the
//! created sessions come out in chronological order.

use crate::error::MarketplaceError;
use crate::lifecycle::environment::LifecycleEnvironment;
use crate::lifecycle::reducer::{fail, notify_effect, Effects};
use crate::types::{
    ActorRole, CommitmentId, CommitmentStatus, MarketplaceState, ParticipantRole, Session,
    SessionId, SessionStatus, UserId,
};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One weekly slot, given as a single representative occurrence. The weekday
/// and time-of-day are taken from it; the planner repeats it every 7 days.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTemplate {
    /// Start of the representative occurrence
    pub start_time: DateTime<Utc>,
    /// End of the representative occurrence
    pub end_time: DateTime<Utc>,
}

/// Upper bound on projection steps, so a degenerate quota/window combination
/// can never spin the planner.
const MAX_PROJECTION_STEPS: usize = 1_000;

/// Earliest schedule-blocking session of either party overlapping
/// `[start, end)`, if any.
///
/// Soft-deleted and terminal-without-blocking sessions (cancelled, rejected,
/// not conducted) do not count; a record's party membership comes from its
/// owning commitment.
pub fn find_conflict(
    state: &MarketplaceState,
    tutor_id: UserId,
    student_id: UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    state
        .sessions()
        .values()
        .filter(|s| s.blocks_schedule() && s.overlaps(start, end))
        .filter(|s| {
            state.commitment(&s.commitment_id).is_some_and(|c| {
                c.tutor_id == tutor_id
                    || c.student_id == tutor_id
                    || c.tutor_id == student_id
                    || c.student_id == student_id
            })
        })
        .map(|s| s.start_time)
        .min()
}

fn iso_week_key(at: DateTime<Utc>) -> (i32, u32) {
    let week = at.iso_week();
    (week.year(), week.week())
}

/// Plan and create a batch of recurring sessions. All-or-nothing: a conflict
/// with an existing booking fails the whole batch, whereas a slot that runs
/// past the commitment window or a full weekly quota just stops or defers
/// that slot.
///
/// Created session ids are reported through `state.last_scheduled`.
#[allow(clippy::too_many_lines)]
pub(crate) fn handle_schedule_recurring(
    state: &mut MarketplaceState,
    env: &LifecycleEnvironment,
    commitment_id: CommitmentId,
    caller: UserId,
    slots: &[SlotTemplate],
    location: Option<String>,
    notes: Option<String>,
) -> Effects {
    state.last_scheduled.clear();
    let now = env.clock.now();

    let Some(c) = state.commitment(&commitment_id) else {
        return fail(state, MarketplaceError::CommitmentNotFound(commitment_id));
    };
    match c.role_of(caller) {
        Some(ParticipantRole::Tutor) => {}
        Some(ParticipantRole::Student) => return fail(state, MarketplaceError::NotTheTutor),
        None => return fail(state, MarketplaceError::NotAParticipant),
    }
    if c.status != CommitmentStatus::Active {
        return fail(state, MarketplaceError::CommitmentNotActive);
    }
    if !c.is_fully_paid() {
        return fail(state, MarketplaceError::CommitmentNotPaid);
    }
    if slots.is_empty() {
        return fail(state, MarketplaceError::NoSlots);
    }
    if slots.iter().any(|s| s.start_time >= s.end_time) {
        return fail(state, MarketplaceError::InvalidTimeRange);
    }
    let c = c.clone();

    // Remaining capacity: contracted minus completed minus already pending,
    // plus make-up slots earned through uncompensated absences. Capped at the
    // contract size so absences can never inflate a batch past it.
    let pending = state
        .sessions_of(&commitment_id)
        .filter(|s| {
            !s.is_deleted
                && matches!(s.status, SessionStatus::Scheduled | SessionStatus::Confirmed)
        })
        .count();
    let base_capacity = i64::from(c.total_sessions)
        - i64::from(c.completed_sessions)
        - i64::try_from(pending).unwrap_or(i64::MAX);
    let makeup_available = i64::from(c.uncompensated_absences());
    let remaining = base_capacity + makeup_available;
    if remaining <= 0 {
        return fail(state, MarketplaceError::NoRemainingSlots);
    }
    let target = usize::try_from(remaining.min(i64::from(c.total_sessions))).unwrap_or(0);

    let window_end = c.end_date();
    let horizon_start = now.max(c.start_date);

    let mut heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>> = BinaryHeap::new();
    for (idx, slot) in slots.iter().enumerate() {
        let mut start = slot.start_time;
        while start < horizon_start {
            start += Duration::days(7);
        }
        heap.push(Reverse((start, idx)));
    }

    let mut planned: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
    let mut steps = 0;
    while planned.len() < target && steps < MAX_PROJECTION_STEPS {
        steps += 1;
        let Some(Reverse((start, idx))) = heap.pop() else {
            break;
        };
        // Out of the commitment window: the slot is exhausted, not retried.
        if start >= window_end {
            continue;
        }
        let end = start + (slots[idx].end_time - slots[idx].start_time);

        // A full ISO week defers the occurrence to the following week.
        let key = iso_week_key(start);
        let booked_in_week = state
            .sessions_of(&commitment_id)
            .filter(|s| s.blocks_schedule() && iso_week_key(s.start_time) == key)
            .count()
            + planned
                .iter()
                .filter(|(ps, _)| iso_week_key(*ps) == key)
                .count();
        if booked_in_week >= usize::try_from(c.sessions_per_week).unwrap_or(usize::MAX) {
            heap.push(Reverse((start + Duration::days(7), idx)));
            continue;
        }

        // A clash with an existing booking of either party fails the batch.
        if let Some(at) = find_conflict(state, c.tutor_id, c.student_id, start, end) {
            return fail(state, MarketplaceError::ScheduleConflict(at));
        }
        if planned.iter().any(|(ps, pe)| start < *pe && *ps < end) {
            return fail(state, MarketplaceError::ScheduleConflict(start));
        }

        planned.push((start, end));
        heap.push(Reverse((start + Duration::days(7), idx)));
    }

    if planned.is_empty() {
        return fail(state, MarketplaceError::NoSchedulableSlots);
    }

    for (start, end) in &planned {
        let window = env.grace.attendance_window(*end);
        let mut session = Session::new(
            SessionId::new(),
            commitment_id,
            *start,
            *end,
            window,
            location.clone(),
            notes.clone(),
            now,
        );
        session.log(
            ActorRole::Tutor,
            "session_created",
            Some("recurring batch".to_string()),
            now,
        );
        state.last_scheduled.push(session.id);
        state.insert_session(session);
    }

    // Whatever the batch booked beyond the base capacity consumed make-up
    // slots; record them as issued so they are not granted twice.
    let consumed = (i64::try_from(planned.len()).unwrap_or(0) - base_capacity.max(0))
        .clamp(0, makeup_available);
    if consumed > 0 {
        if let Some(cm) = state.commitment_mut(&commitment_id) {
            cm.makeup_sessions_issued += u32::try_from(consumed).unwrap_or(0);
        }
    }

    tracing::info!(
        %commitment_id,
        created = planned.len(),
        makeup_consumed = consumed,
        "recurring batch scheduled"
    );
    smallvec::smallvec![notify_effect(
        env,
        c.student_id,
        "Sessions scheduled",
        format!("{} sessions were scheduled for your commitment", planned.len()),
    )]
}
