//! Environment for the session lifecycle reducer.
//!
//! External collaborators sit behind object-safe traits so the reducer stays
//! pure and tests can swap in deterministic implementations.

use crate::deadlines::GracePolicy;
use crate::types::{CommitmentId, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tutorlink_core::environment::Clock;

/// Notification delivery failed.
///
/// Never propagated to the operation that queued the send; logged and dropped.
#[derive(Debug, Error, Clone)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget notification sender, keyed by user id.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification. At-least-once; the core never consumes the result
    /// beyond logging a failure.
    async fn send(&self, user: UserId, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// The completion money transfer failed; it will be retried on a later sweep.
#[derive(Debug, Error, Clone)]
#[error("settlement transfer failed: {0}")]
pub struct SettlementError(pub String);

/// Moves the commitment's balances across the three parties when it
/// completes. The transfer must be atomic on the gateway side; the lifecycle
/// guards re-invocation with the commitment's `is_money_transferred` flag.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Run the completion transfer for a commitment.
    async fn transfer_on_completion(&self, commitment: CommitmentId) -> Result<(), SettlementError>;
}

/// Environment dependencies for the lifecycle reducer.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Clock for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
    /// Notification sender
    pub notifier: Arc<dyn Notifier>,
    /// Completion settlement gateway
    pub settlement: Arc<dyn SettlementGateway>,
    /// Grace periods in force
    pub grace: GracePolicy,
}

impl LifecycleEnvironment {
    /// Creates a new `LifecycleEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        settlement: Arc<dyn SettlementGateway>,
        grace: GracePolicy,
    ) -> Self {
        Self {
            clock,
            notifier,
            settlement,
            grace,
        }
    }
}

/// Production notifier that records sends in the log.
///
/// Delivery itself (push, email) is an external service; this stands at the
/// boundary the real sender plugs into.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, user: UserId, title: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(%user, title, message, "notification queued");
        Ok(())
    }
}

/// Production stand-in gateway that acknowledges transfers in the log.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettlementGateway;

#[async_trait]
impl SettlementGateway for LoggingSettlementGateway {
    async fn transfer_on_completion(
        &self,
        commitment: CommitmentId,
    ) -> Result<(), SettlementError> {
        tracing::info!(%commitment, "completion transfer executed");
        Ok(())
    }
}

/// Mock implementations for tests.
pub mod mocks {
    use super::{
        CommitmentId, NotifyError, Notifier, SettlementError, SettlementGateway, UserId,
        async_trait,
    };

    /// Notifier that silently succeeds.
    #[derive(Debug, Clone, Default)]
    pub struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _: UserId, _: &str, _: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    /// Notifier that always fails, for verifying that notification failures
    /// never fail the primary operation.
    #[derive(Debug, Clone, Default)]
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _: UserId, _: &str, _: &str) -> Result<(), NotifyError> {
            Err(NotifyError("delivery channel down".to_string()))
        }
    }

    /// Gateway that silently succeeds.
    #[derive(Debug, Clone, Default)]
    pub struct NullSettlementGateway;

    #[async_trait]
    impl SettlementGateway for NullSettlementGateway {
        async fn transfer_on_completion(&self, _: CommitmentId) -> Result<(), SettlementError> {
            Ok(())
        }
    }

    /// Gateway that always fails, for exercising the retry-on-sweep path.
    #[derive(Debug, Clone, Default)]
    pub struct FailingSettlementGateway;

    #[async_trait]
    impl SettlementGateway for FailingSettlementGateway {
        async fn transfer_on_completion(&self, _: CommitmentId) -> Result<(), SettlementError> {
            Err(SettlementError("ledger unavailable".to_string()))
        }
    }
}
