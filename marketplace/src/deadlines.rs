//! Deadline policy for the session lifecycle.
//!
//! Pure and stateless: deadlines are computed from a session's time window
//! and fixed grace periods. Attendance windows are computed once, at session
//! creation, and persisted - later checks reuse the stored window.

use crate::types::AttendanceWindow;
use chrono::{DateTime, Duration, Utc};

/// Post-session grace window for the tutor's check-in, in minutes.
pub const TUTOR_GRACE_MINUTES: i64 = 15;

/// Post-session grace window for the student's check-in, in minutes.
pub const STUDENT_GRACE_MINUTES: i64 = 30;

/// How long before start the student must have decided participation, in minutes.
pub const CONFIRMATION_LEAD_MINUTES: i64 = 15;

/// The grace periods in force for a deployment.
///
/// Defaults to the contract values above; a deployment may shorten or extend
/// them through configuration. Construction keeps the student window at least
/// as long as the tutor window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GracePolicy {
    tutor_grace: Duration,
    student_grace: Duration,
    confirmation_lead: Duration,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            tutor_grace: Duration::minutes(TUTOR_GRACE_MINUTES),
            student_grace: Duration::minutes(STUDENT_GRACE_MINUTES),
            confirmation_lead: Duration::minutes(CONFIRMATION_LEAD_MINUTES),
        }
    }
}

impl GracePolicy {
    /// Build a policy from minute values.
    ///
    /// The student grace is clamped to be at least the tutor grace, so the
    /// invariant `student_deadline >= tutor_deadline` holds for any input.
    #[must_use]
    pub fn from_minutes(tutor: i64, student: i64, confirmation_lead: i64) -> Self {
        Self {
            tutor_grace: Duration::minutes(tutor),
            student_grace: Duration::minutes(student.max(tutor)),
            confirmation_lead: Duration::minutes(confirmation_lead),
        }
    }

    /// Compute the attendance window for a session ending at `end_time`.
    #[must_use]
    pub fn attendance_window(&self, end_time: DateTime<Utc>) -> AttendanceWindow {
        AttendanceWindow {
            tutor_deadline: end_time + self.tutor_grace,
            student_deadline: end_time + self.student_grace,
        }
    }

    /// Last instant the student may still decide participation.
    #[must_use]
    pub fn confirmation_deadline(&self, start_time: DateTime<Utc>) -> DateTime<Utc> {
        start_time - self.confirmation_lead
    }
}
