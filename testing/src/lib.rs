//! # Tutorlink Testing
//!
//! Testing utilities and helpers for the Tutorlink backend.
//!
//! This crate provides:
//! - Deterministic clock implementations for deadline logic
//! - The fluent Given-When-Then [`ReducerTest`] harness
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use tutorlink_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LifecycleReducer::new())
//!     .with_env(test_environment())
//!     .given_state(MarketplaceState::new())
//!     .when_action(LifecycleAction::SweepTimeouts)
//!     .then_state(|state| assert!(state.sessions().is_empty()))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use tutorlink_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tutorlink_testing::mocks::FixedClock;
    /// use tutorlink_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Settable clock for multi-step deadline scenarios
    ///
    /// Attendance tests need to confirm a session, cross a grace deadline,
    /// then sweep - all against one environment. `SteppingClock` starts at a
    /// fixed time and can be moved forward between actions.
    #[derive(Debug)]
    pub struct SteppingClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl SteppingClock {
        /// Create a new stepping clock at the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock to an absolute time
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned, which only happens if a
        /// previous test panicked while holding it.
        #[allow(clippy::unwrap_used)] // Test infrastructure
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Advance the clock by a duration
        ///
        /// # Panics
        ///
        /// Panics if the internal lock is poisoned.
        #[allow(clippy::unwrap_used)] // Test infrastructure
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)] // Test infrastructure
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// The instant all deterministic tests anchor on (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which should never
    /// happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, SteppingClock, test_clock, test_epoch};
