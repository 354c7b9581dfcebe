use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ApiError;

/// UI-facing state of one resource or list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceState<T> {
    Loading,
    Success {
        data: T,
        is_refreshing: bool,
        has_more: bool,
    },
    Empty,
    Error {
        message: String,
    },
    RequiresAuth,
}

impl<T> ResourceState<T> {
    pub fn tag(&self) -> StateTag {
        match self {
            Self::Loading => StateTag::Loading,
            Self::Success { .. } => StateTag::Success,
            Self::Empty => StateTag::Empty,
            Self::Error { .. } => StateTag::Error,
            Self::RequiresAuth => StateTag::RequiresAuth,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        matches!(self, Self::Success { has_more: true, .. })
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(
            self,
            Self::Success {
                is_refreshing: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    Loading,
    Success,
    Empty,
    Error,
    RequiresAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while in {from:?}")]
pub struct TransitionError {
    pub from: StateTag,
    pub action: &'static str,
}

/// Single-writer cell holding a [`ResourceState`]; observers subscribe through
/// a watch channel and always see the latest value.
///
/// ```text
/// Loading      -> Success | Empty | Error | RequiresAuth
/// Success      -> Success (refreshing, replaced, updated) | Error
/// Error        -> Loading (retry)
/// RequiresAuth -> Loading (auth completed)
/// any          -> Loading via refresh, RequiresAuth on 401
/// ```
#[derive(Debug)]
pub struct ResourceStateMachine<T> {
    tx: watch::Sender<ResourceState<T>>,
}

impl<T: Clone> Default for ResourceStateMachine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ResourceStateMachine<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ResourceState::Loading);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<T> {
        self.tx.borrow().clone()
    }

    pub fn tag(&self) -> StateTag {
        self.tx.borrow().tag()
    }

    /// Back to `Loading`, dropping any data. Used on construction and scope change.
    pub fn reset(&self) {
        self.tx.send_replace(ResourceState::Loading);
    }

    /// `Success` keeps its data and shows a refresh indicator; anything else
    /// re-enters `Loading`.
    pub fn begin_refresh(&self) {
        self.tx.send_modify(|state| {
            if let ResourceState::Success { is_refreshing, .. } = state {
                *is_refreshing = true;
            } else {
                *state = ResourceState::Loading;
            }
        });
    }

    pub fn retry(&self) -> Result<(), TransitionError> {
        self.guarded("retry", &[StateTag::Error], |state| {
            *state = ResourceState::Loading;
        })
    }

    pub fn auth_completed(&self) -> Result<(), TransitionError> {
        self.guarded("complete auth", &[StateTag::RequiresAuth], |state| {
            *state = ResourceState::Loading;
        })
    }

    /// Allowed from every state.
    pub fn require_auth(&self) {
        self.tx.send_replace(ResourceState::RequiresAuth);
    }

    /// Result of an initial load or refresh. Replaces any previous data.
    pub fn succeed(&self, data: T, has_more: bool) -> Result<(), TransitionError> {
        self.guarded(
            "apply loaded data",
            &[StateTag::Loading, StateTag::Success],
            |state| {
                *state = ResourceState::Success {
                    data,
                    is_refreshing: false,
                    has_more,
                };
            },
        )
    }

    /// A successful initial load that returned nothing.
    pub fn succeed_empty(&self) -> Result<(), TransitionError> {
        self.guarded(
            "apply empty result",
            &[StateTag::Loading, StateTag::Success],
            |state| *state = ResourceState::Empty,
        )
    }

    /// Classified failure of an initial load or refresh. `Unauthorized` always
    /// lands in `RequiresAuth`.
    pub fn fail(&self, error: &ApiError) -> Result<(), TransitionError> {
        if error.requires_auth() {
            self.require_auth();
            return Ok(());
        }
        let message = error.user_message();
        self.guarded(
            "apply failure",
            &[StateTag::Loading, StateTag::Success],
            |state| *state = ResourceState::Error { message },
        )
    }

    /// In-place edit of `Success` data (appended pages, optimistic edits).
    pub fn update_success(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut T, &mut bool),
    ) -> Result<(), TransitionError> {
        self.guarded(action, &[StateTag::Success], |state| {
            if let ResourceState::Success { data, has_more, .. } = state {
                f(data, has_more);
            }
        })
    }

    fn guarded(
        &self,
        action: &'static str,
        allowed: &[StateTag],
        apply: impl FnOnce(&mut ResourceState<T>),
    ) -> Result<(), TransitionError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|state| {
            let from = state.tag();
            if !allowed.contains(&from) {
                outcome = Err(TransitionError { from, action });
                return false;
            }
            apply(state);
            true
        });
        if let Err(e) = &outcome {
            debug!(error = %e, "rejected state transition");
        }
        outcome
    }
}

/// Alive flag plus scope generation shared by a controller's async work.
///
/// Work captures a [`ScopeTicket`] before suspending and checks it afterwards;
/// a disposed controller or a newer scope turns the late result into a no-op.
#[derive(Debug, Default)]
pub struct Lifecycle {
    disposed: AtomicBool,
    generation: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeTicket(u64);

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(&self) -> ScopeTicket {
        ScopeTicket(self.generation.load(Ordering::SeqCst))
    }

    /// Invalidates every outstanding ticket.
    pub fn advance(&self) -> ScopeTicket {
        ScopeTicket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_current(&self, ticket: ScopeTicket) -> bool {
        self.is_alive() && self.generation.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkFailure;

    fn machine() -> ResourceStateMachine<Vec<u32>> {
        ResourceStateMachine::new()
    }

    #[test]
    fn test_starts_loading() {
        assert_eq!(machine().snapshot(), ResourceState::Loading);
    }

    #[test]
    fn test_loading_to_success_and_refresh() {
        let m = machine();
        m.succeed(vec![1], true).unwrap();
        m.begin_refresh();
        assert!(m.snapshot().is_refreshing());
        assert_eq!(m.snapshot().data(), Some(&vec![1]));
        m.succeed(vec![2], false).unwrap();
        assert_eq!(
            m.snapshot(),
            ResourceState::Success {
                data: vec![2],
                is_refreshing: false,
                has_more: false
            }
        );
    }

    #[test]
    fn test_failure_message_comes_from_classification() {
        let m = machine();
        m.fail(&ApiError::Network(NetworkFailure::NoConnection)).unwrap();
        assert_eq!(
            m.snapshot(),
            ResourceState::Error {
                message: "Network error. Check your connection and try again.".into()
            }
        );
    }

    #[test]
    fn test_unauthorized_preempts_any_state() {
        let m = machine();
        m.succeed(vec![1], false).unwrap();
        m.fail(&ApiError::Unauthorized).unwrap();
        assert_eq!(m.tag(), StateTag::RequiresAuth);

        let m = machine();
        m.fail(&ApiError::NotFound).unwrap();
        m.fail(&ApiError::Unauthorized).unwrap();
        assert_eq!(m.tag(), StateTag::RequiresAuth);
    }

    #[test]
    fn test_invalid_transitions_leave_state_unchanged() {
        let m = machine();
        m.fail(&ApiError::NotFound).unwrap();
        let err = m.succeed(vec![1], false).unwrap_err();
        assert_eq!(err.from, StateTag::Error);
        assert_eq!(m.tag(), StateTag::Error);

        assert!(m.auth_completed().is_err());
        m.retry().unwrap();
        assert_eq!(m.tag(), StateTag::Loading);
        assert!(m.retry().is_err());
    }

    #[test]
    fn test_empty_is_not_reachable_from_error() {
        let m = machine();
        m.fail(&ApiError::ServiceUnavailable).unwrap();
        assert!(m.succeed_empty().is_err());
        m.begin_refresh();
        m.succeed_empty().unwrap();
        assert_eq!(m.tag(), StateTag::Empty);
    }

    #[test]
    fn test_requires_auth_recovers_through_loading() {
        let m = machine();
        m.require_auth();
        m.auth_completed().unwrap();
        assert_eq!(m.tag(), StateTag::Loading);
    }

    #[test]
    fn test_update_success_only_in_success() {
        let m = machine();
        assert!(m.update_success("append", |d, _| d.push(1)).is_err());
        m.succeed(vec![1], true).unwrap();
        m.update_success("append", |d, more| {
            d.push(2);
            *more = false;
        })
        .unwrap();
        assert_eq!(m.snapshot().data(), Some(&vec![1, 2]));
        assert!(!m.snapshot().has_more());
    }

    #[tokio::test]
    async fn test_observers_see_latest_state() {
        let m = machine();
        let mut rx = m.subscribe();
        m.succeed(vec![7], false).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().data(), Some(&vec![7]));
    }

    #[test]
    fn test_lifecycle_tickets() {
        let lifecycle = Lifecycle::new();
        let ticket = lifecycle.ticket();
        assert!(lifecycle.is_current(ticket));
        let next = lifecycle.advance();
        assert!(!lifecycle.is_current(ticket));
        assert!(lifecycle.is_current(next));
        lifecycle.dispose();
        assert!(!lifecycle.is_current(next));
        assert!(!lifecycle.is_alive());
    }
}
