//! # Tutorlink Marketplace
//!
//! Session lifecycle and attendance settlement for a tutoring marketplace.
//!
//! A [`types::LearningCommitment`] is a paid agreement between a tutor and a
//! student for a number of weekly sessions. Each [`types::Session`] walks a
//! state machine:
//!
//! ```text
//! Scheduled ──confirm──▶ Confirmed ──check-ins──▶ Completed
//!     │                      │                        ▲
//!     │ reject /             │ rejection          admin ruling
//!     │ timeout              ▼                        │
//!  Rejected              Disputed ────────────────────┤
//!                            │                        ▼
//!  Cancelled ◀──cancel──     └──admin ruling──▶ NotConducted
//! ```
//!
//! Attendance settles through dual check-in after the session ends: the tutor
//! first (15 minutes of grace past the end), then the student (30 minutes).
//! Missed deadlines are resolved lazily by a sweep that runs on every read
//! and periodically in the background; every timeout mutation is guarded on a
//! pending status, so sweeping is idempotent and safe to race with users.
//!
//! The crate follows the reducer architecture from `tutorlink_core`: all
//! transitions live in the pure [`lifecycle::LifecycleReducer`], and the
//! [`lifecycle::MarketplaceStore`] shell owns the state, executes effects and
//! backs the HTTP handlers in [`api`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod commitment;
pub mod config;
pub mod deadlines;
pub mod error;
pub mod lifecycle;
pub mod scheduling;
pub mod types;

pub use config::Config;
pub use error::MarketplaceError;
pub use lifecycle::{LifecycleEnvironment, LifecycleReducer, MarketplaceStore};
