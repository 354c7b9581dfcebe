//! Optimistic writes: apply locally, confirm or restore once the server answers.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::event::{EventBus, SyncEvent, ToastMessage};
use crate::lock;
use crate::state::Lifecycle;

/// One pending change to a single resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent<S> {
    pub mutation_id: String,
    pub resource_id: String,
    pub previous: S,
    pub desired: S,
}

impl<S> MutationIntent<S> {
    pub fn new(resource_id: impl Into<String>, previous: S, desired: S) -> Self {
        Self {
            mutation_id: Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            previous,
            desired,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<S> {
    /// Server agreed; carries the state it reported.
    Confirmed(S),
    /// Server refused or was unreachable; `restored` is the exact prior state.
    RolledBack { restored: S, error: ApiError },
    /// Another mutation for the same resource is still outstanding.
    Rejected,
    /// The owning screen went away before the answer; nothing was applied.
    Abandoned,
}

impl<S> MutationOutcome<S> {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Serializes mutations per resource id and owns the toast on failure.
pub struct OptimisticMutator {
    in_flight: Mutex<HashSet<String>>,
    events: EventBus,
    lifecycle: Arc<Lifecycle>,
}

struct Claim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    resource_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.resource_id);
    }
}

impl OptimisticMutator {
    pub fn new(events: EventBus, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            events,
            lifecycle,
        }
    }

    pub fn is_pending(&self, resource_id: &str) -> bool {
        lock(&self.in_flight).contains(resource_id)
    }

    /// Applies `intent.desired` through `apply`, runs `request`, then applies
    /// either the confirmed state or `intent.previous`.
    ///
    /// `request` is not called when a mutation for the same resource is
    /// already pending. On failure a toast with `failure_message` is emitted,
    /// or `SessionExpired` for a 401.
    #[instrument(skip_all, fields(resource = %intent.resource_id, mutation = %intent.mutation_id))]
    pub async fn mutate<S, A, R, Fut>(
        &self,
        intent: MutationIntent<S>,
        apply: A,
        request: R,
        failure_message: &str,
    ) -> MutationOutcome<S>
    where
        S: Clone,
        A: Fn(&S),
        R: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<S>>,
    {
        let Some(_claim) = self.claim(&intent.resource_id) else {
            debug!("mutation rejected, another one is pending");
            return MutationOutcome::Rejected;
        };

        let ticket = self.lifecycle.ticket();
        apply(&intent.desired);
        let result = request().await;
        if !self.lifecycle.is_current(ticket) {
            debug!("mutation answer arrived after disposal");
            return MutationOutcome::Abandoned;
        }

        match result {
            Ok(confirmed) => {
                apply(&confirmed);
                debug!("mutation confirmed");
                MutationOutcome::Confirmed(confirmed)
            }
            Err(error) => {
                apply(&intent.previous);
                warn!(%error, "mutation failed, restored previous state");
                if error.requires_auth() {
                    self.events.emit(SyncEvent::SessionExpired);
                } else {
                    self.events.toast(ToastMessage::error(failure_message));
                }
                MutationOutcome::RolledBack {
                    restored: intent.previous,
                    error,
                }
            }
        }
    }

    fn claim(&self, resource_id: &str) -> Option<Claim<'_>> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(resource_id.to_string()) {
            return None;
        }
        Some(Claim {
            in_flight: &self.in_flight,
            resource_id: resource_id.to_string(),
        })
    }
}
