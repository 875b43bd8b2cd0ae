//! Store shell: owns the marketplace state behind a lock, dispatches actions
//! through the reducer and executes the returned effects.
//!
//! The reducer stays pure; everything imperative lives here. Effects run on
//! spawned tasks after the state lock is released, so a slow notification
//! channel can never stall a dispatch. An effect that produces a feedback
//! action re-enters the store through a fresh dispatch.

use crate::error::MarketplaceError;
use crate::lifecycle::actions::{LifecycleAction, ParticipationDecision};
use crate::lifecycle::environment::LifecycleEnvironment;
use crate::lifecycle::reducer::LifecycleReducer;
use crate::scheduling::SlotTemplate;
use crate::types::{
    CommitmentId, DisputeDecision, LearningCommitment, MarketplaceState, Session, SessionId,
    UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tutorlink_core::effect::Effect;
use tutorlink_core::reducer::Reducer;

/// Handle to the shared marketplace state. Cheap to clone; every clone
/// dispatches into the same state.
#[derive(Clone)]
pub struct MarketplaceStore {
    state: Arc<RwLock<MarketplaceState>>,
    reducer: LifecycleReducer,
    env: LifecycleEnvironment,
}

impl MarketplaceStore {
    /// Create a store with empty state.
    #[must_use]
    pub fn new(env: LifecycleEnvironment) -> Self {
        Self {
            state: Arc::new(RwLock::new(MarketplaceState::new())),
            reducer: LifecycleReducer::new(),
            env,
        }
    }

    /// Dispatch an action and read a result back under the same write lock,
    /// so the snapshot cannot interleave with a concurrent dispatch. Effects
    /// are spawned after the lock is released - including when the command
    /// itself failed, because a past-deadline command may have resolved
    /// timeouts inline and those resolutions still notify.
    async fn dispatch_then<R>(
        &self,
        action: LifecycleAction,
        read: impl FnOnce(&MarketplaceState) -> R,
    ) -> Result<R, MarketplaceError> {
        let (result, effects) = {
            let mut state = self.state.write().await;
            state.last_error = None;
            let effects = self.reducer.reduce(&mut state, action, &self.env);
            match state.last_error.take() {
                Some(error) => (Err(error), effects),
                None => (Ok(read(&state)), effects),
            }
        };
        for effect in effects {
            self.spawn_effect(effect);
        }
        result
    }

    /// Dispatch an action, discarding the post-state.
    pub async fn dispatch(&self, action: LifecycleAction) -> Result<(), MarketplaceError> {
        self.dispatch_then(action, |_| ()).await
    }

    fn spawn_effect(&self, effect: Effect<LifecycleAction>) {
        let store = self.clone();
        tokio::spawn(execute_effect(store, effect));
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Propose a single session on a commitment. Tutor only.
    pub async fn create_session(
        &self,
        commitment_id: CommitmentId,
        caller: UserId,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        location: Option<String>,
        notes: Option<String>,
    ) -> Result<Session, MarketplaceError> {
        let session_id = SessionId::new();
        self.dispatch_then(
            LifecycleAction::CreateSession {
                session_id,
                commitment_id,
                caller,
                start_time,
                end_time,
                location,
                notes,
            },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    /// Book a batch of recurring sessions. Tutor only; all-or-nothing.
    pub async fn schedule_recurring(
        &self,
        commitment_id: CommitmentId,
        caller: UserId,
        slots: Vec<SlotTemplate>,
        location: Option<String>,
        notes: Option<String>,
    ) -> Result<Vec<Session>, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::ScheduleRecurring {
                commitment_id,
                caller,
                slots,
                location,
                notes,
            },
            |state| {
                let mut created: Vec<Session> = state
                    .last_scheduled
                    .iter()
                    .filter_map(|id| state.session(id))
                    .cloned()
                    .collect();
                created.sort_by_key(|s| s.start_time);
                created
            },
        )
        .await
    }

    /// Accept or reject a proposed session. Student only.
    pub async fn confirm_participation(
        &self,
        session_id: SessionId,
        caller: UserId,
        decision: ParticipationDecision,
    ) -> Result<Session, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::ConfirmParticipation {
                session_id,
                caller,
                decision,
            },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    /// Check in for a session's attendance settlement.
    pub async fn check_in(
        &self,
        session_id: SessionId,
        caller: UserId,
    ) -> Result<Session, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::CheckIn { session_id, caller },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    /// Reject attendance: a tutor records a no-show, a student opens a
    /// dispute against the tutor's check-in.
    pub async fn reject_attendance(
        &self,
        session_id: SessionId,
        caller: UserId,
        reason: String,
        evidence_urls: Vec<String>,
    ) -> Result<Session, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::RejectAttendance {
                session_id,
                caller,
                reason,
                evidence_urls,
            },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    /// Cancel an upcoming session. Either participant, before start only.
    pub async fn cancel_session(
        &self,
        session_id: SessionId,
        caller: UserId,
        reason: String,
    ) -> Result<Session, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::CancelSession {
                session_id,
                caller,
                reason,
            },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    /// Arbitrate an open dispute. Admin only.
    pub async fn resolve_dispute(
        &self,
        session_id: SessionId,
        admin: UserId,
        decision: DisputeDecision,
        admin_notes: String,
    ) -> Result<Session, MarketplaceError> {
        self.dispatch_then(
            LifecycleAction::ResolveDispute {
                session_id,
                admin,
                decision,
                admin_notes,
            },
            move |state| state.session(&session_id).cloned(),
        )
        .await?
        .ok_or(MarketplaceError::SessionNotFound(session_id))
    }

    // ------------------------------------------------------------------
    // Queries (timeouts resolve on read)
    // ------------------------------------------------------------------

    /// Resolve every expired deadline. Always succeeds; every mutation inside
    /// is guarded on a pending status.
    pub async fn sweep(&self) -> Result<(), MarketplaceError> {
        self.dispatch(LifecycleAction::SweepTimeouts).await
    }

    /// Fetch one session, expired deadlines resolved first. Soft-deleted
    /// records are still returned here so an auto-rejected proposal stays
    /// observable by id.
    pub async fn session(&self, id: SessionId) -> Result<Session, MarketplaceError> {
        self.sweep().await?;
        self.state
            .read()
            .await
            .session(&id)
            .cloned()
            .ok_or(MarketplaceError::SessionNotFound(id))
    }

    /// List a commitment's sessions, expired deadlines resolved first.
    /// Soft-deleted records are excluded; ordered by start time.
    pub async fn sessions_for_commitment(
        &self,
        commitment_id: CommitmentId,
    ) -> Result<Vec<Session>, MarketplaceError> {
        self.sweep().await?;
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions_of(&commitment_id)
            .filter(|s| !s.is_deleted)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    /// Fetch one commitment.
    pub async fn commitment(
        &self,
        id: CommitmentId,
    ) -> Result<LearningCommitment, MarketplaceError> {
        self.sweep().await?;
        self.state
            .read()
            .await
            .commitment(&id)
            .cloned()
            .ok_or(MarketplaceError::CommitmentNotFound(id))
    }

    /// Insert or replace a commitment. Commitment intake (agreement,
    /// payment) happens upstream; the lifecycle only needs the record.
    pub async fn upsert_commitment(&self, commitment: LearningCommitment) {
        self.state.write().await.insert_commitment(commitment);
    }

    /// Spawn the periodic background sweep. Resolver-on-read already keeps
    /// answers fresh; the sweeper bounds how stale an unread record and its
    /// notifications can get.
    pub fn spawn_sweeper(&self, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(error) = store.sweep().await {
                    tracing::warn!(%error, "timeout sweep failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for MarketplaceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceStore").finish_non_exhaustive()
    }
}

/// Execute one effect tree. Boxed because sequential and parallel effects
/// recurse.
fn execute_effect(
    store: MarketplaceStore,
    effect: Effect<LifecycleAction>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        match effect {
            Effect::None => {}
            Effect::Parallel(children) => {
                let handles: Vec<_> = children
                    .into_iter()
                    .map(|child| tokio::spawn(execute_effect(store.clone(), child)))
                    .collect();
                for handle in handles {
                    if let Err(error) = handle.await {
                        tracing::warn!(%error, "parallel effect panicked");
                    }
                }
            }
            Effect::Sequential(children) => {
                for child in children {
                    execute_effect(store.clone(), child).await;
                }
            }
            Effect::Future(future) => {
                if let Some(action) = future.await {
                    if let Err(error) = store.dispatch(action).await {
                        tracing::warn!(%error, "feedback action rejected");
                    }
                }
            }
        }
    })
}
