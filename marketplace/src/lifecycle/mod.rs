//! Session lifecycle: creation, confirmation, attendance settlement,
//! disputes, cancellation and timeout resolution.
//!
//! The module follows the reducer architecture from `tutorlink_core`:
//! [`reducer::LifecycleReducer`] holds every state transition as a pure
//! function, [`store::MarketplaceStore`] is the imperative shell that owns
//! the state and executes effects, and [`environment::LifecycleEnvironment`]
//! injects the clock, notifier and settlement gateway.

pub mod actions;
pub mod environment;
pub mod reducer;
pub mod store;

pub use actions::{LifecycleAction, ParticipationDecision};
pub use environment::{LifecycleEnvironment, Notifier, SettlementGateway};
pub use reducer::LifecycleReducer;
pub use store::MarketplaceStore;

#[cfg(test)]
mod tests;
