//! # Tutorlink Core
//!
//! Core traits and types for the Tutorlink backend architecture.
//!
//! The session lifecycle, dispute arbitration and scheduling features are all
//! built on the same pattern:
//!
//! - **State**: owned domain state for a feature (sessions, commitments)
//! - **Action**: every input a feature accepts (commands and recorded facts)
//! - **Reducer**: pure function `(State, Action, Environment) → Effects`
//! - **Effect**: side-effect *descriptions* (notification sends, settlement
//!   triggers), executed by the store shell, never inside the reducer
//! - **Environment**: injected dependencies behind traits (clock, notifier)
//!
//! Keeping all I/O in effect values is what makes the attendance state
//! machine unit-testable: a test asserts on the returned effects instead of
//! mocking a notification service.
//!
//! ## Example
//!
//! ```ignore
//! use tutorlink_core::{effect::Effect, reducer::Reducer};
//!
//! impl Reducer for LifecycleReducer {
//!     type State = MarketplaceState;
//!     type Action = LifecycleAction;
//!     type Environment = LifecycleEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut MarketplaceState,
//!         action: LifecycleAction,
//!         env: &LifecycleEnvironment,
//!     ) -> SmallVec<[Effect<LifecycleAction>; 4]> {
//!         // Business logic goes here
//!         smallvec![]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Effects`.
/// They validate an action against the current state, mutate the state in
/// place, and return descriptions of the side effects that should follow.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: the domain state this reducer operates on
    /// - `Action`: the action type this reducer processes
    /// - `Environment`: the injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce at most a handful of effects, so the return
        /// type is a `SmallVec` that stays on the stack.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects are values, not execution. A reducer returns them and the store
/// shell runs them, which keeps the state machine free of hidden I/O.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the store.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: the action type that effects can feed back into the reducer
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into
        /// the reducer. Notification sends and settlement triggers are built
        /// this way; they return `None` because their failures are logged,
        /// never propagated.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Build a fire-and-forget effect from a future that produces no
        /// feedback action
        pub fn fire_and_forget<F>(future: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                future.await;
                None
            }))
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected via
/// the Environment parameter. The marketplace crate adds its own collaborator
/// traits (notifier, settlement gateway) on top of the clock defined here.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Every deadline decision in the session lifecycle reads the clock from
    /// the environment, so tests can pin or step time deterministically.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
