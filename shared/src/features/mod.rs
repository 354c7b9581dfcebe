//! Screen-level controllers. Each owns its state cells and a [`Lifecycle`];
//! anything other screens care about goes out on the [`EventBus`].

mod inbox;
mod listing;
mod payments;
mod reviews;
mod thread;
mod wishlist;

use std::sync::Arc;
use tracing::warn;

use crate::api::MarketplaceApi;
use crate::capabilities::{HttpClient, SessionProvider};
use crate::config::SyncConfig;
use crate::error::{ApiError, MutationError};
use crate::event::{EventBus, SyncEvent};
use crate::model::Identified;
use crate::mutator::MutationOutcome;
use crate::state::ResourceStateMachine;

pub use self::inbox::InboxController;
pub use self::listing::ListingDetailController;
pub use self::payments::PaymentMethodsController;
pub use self::reviews::ReviewsController;
pub use self::thread::ThreadController;
pub use self::wishlist::WishlistController;

/// Collaborators shared by every controller.
#[derive(Clone)]
pub struct SyncContext {
    pub api: MarketplaceApi,
    pub session: Arc<dyn SessionProvider>,
    pub events: EventBus,
}

impl SyncContext {
    pub fn new(client: Arc<dyn HttpClient>, session: Arc<dyn SessionProvider>, config: SyncConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            api: MarketplaceApi::new(client, config),
            session,
            events,
        }
    }

    /// Session side effects of a 401: the provider is told and the host is notified.
    pub(crate) fn report_unauthorized(&self, error: &ApiError) {
        if error.requires_auth() {
            self.session.on_unauthorized();
            self.events.emit(SyncEvent::SessionExpired);
        }
    }

    /// Host notification for a 401 the paginator already reported to the session.
    pub(crate) fn announce_expiry<T>(&self, result: &Result<T, ApiError>) {
        if matches!(result, Err(e) if e.requires_auth()) {
            self.events.emit(SyncEvent::SessionExpired);
        }
    }

    /// Maps a mutator outcome onto the error type controllers return. The
    /// mutator already announced a 401; the session still has to hear about it.
    pub(crate) fn settle<S>(&self, outcome: MutationOutcome<S>, resource: &str) -> Result<Option<S>, MutationError> {
        match outcome {
            MutationOutcome::Confirmed(value) => Ok(Some(value)),
            MutationOutcome::RolledBack { error, .. } => {
                if error.requires_auth() {
                    self.session.on_unauthorized();
                }
                Err(MutationError::Api(error))
            }
            MutationOutcome::Rejected => Err(MutationError::AlreadyPending(resource.to_string())),
            MutationOutcome::Abandoned => Ok(None),
        }
    }

    /// Guard for writes that need a signed-in user.
    pub(crate) fn require_session(&self) -> Result<(), MutationError> {
        if self.session.is_authenticated() {
            return Ok(());
        }
        self.events.emit(SyncEvent::SessionExpired);
        Err(MutationError::Api(ApiError::Unauthorized))
    }
}

/// A list entry taken out optimistically, with the position it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Removed<T> {
    index: usize,
    item: T,
}

impl<T: Identified + Clone> Removed<T> {
    /// Finds `key` in the loaded list.
    pub(crate) fn find(state: &ResourceStateMachine<Vec<T>>, key: &str) -> Option<Self> {
        let snapshot = state.snapshot();
        let items = snapshot.data()?;
        items
            .iter()
            .position(|item| item.key() == key)
            .map(|index| Self {
                index,
                item: items[index].clone(),
            })
    }
}

/// `None` removes the entry with `key`; `Some` puts the entry back where it was.
pub(crate) fn apply_removal<T: Identified + Clone>(
    state: &ResourceStateMachine<Vec<T>>,
    key: &str,
    removal: Option<&Removed<T>>,
) {
    let applied = state.update_success("apply removal", |items, _| match removal {
        None => items.retain(|item| item.key() != key),
        Some(removed) => {
            if !items.iter().any(|item| item.key() == key) {
                let at = removed.index.min(items.len());
                items.insert(at, removed.item.clone());
            }
        }
    });
    if let Err(e) = applied {
        warn!(error = %e, key, "list changed state during removal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::{ScriptedHttpClient, StaticSession};
    use crate::model::{PaymentMethod, PaymentMethodId};

    fn method(id: &str) -> PaymentMethod {
        PaymentMethod {
            id: PaymentMethodId::new(id),
            brand: "visa".into(),
            last4: None,
            exp_month: None,
            exp_year: None,
            is_default: false,
        }
    }

    fn ids(state: &ResourceStateMachine<Vec<PaymentMethod>>) -> Vec<String> {
        state
            .snapshot()
            .data()
            .map(|items| items.iter().map(|m| m.id.to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_removal_and_restore_keep_position() {
        let state = ResourceStateMachine::new();
        state
            .succeed(vec![method("a"), method("b"), method("c")], false)
            .unwrap();

        let removed = Removed::find(&state, "b").unwrap();
        apply_removal(&state, "b", None);
        assert_eq!(ids(&state), vec!["a", "c"]);

        apply_removal(&state, "b", Some(&removed));
        assert_eq!(ids(&state), vec!["a", "b", "c"]);

        apply_removal(&state, "b", Some(&removed));
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_settle_maps_outcomes() {
        let session = StaticSession::signed_in();
        let ctx = SyncContext::new(
            ScriptedHttpClient::new(),
            Arc::clone(&session) as Arc<dyn SessionProvider>,
            SyncConfig::new("https://api.example.com/v1/").unwrap(),
        );

        assert_eq!(ctx.settle(MutationOutcome::Confirmed(1), "x"), Ok(Some(1)));
        assert_eq!(
            ctx.settle::<u8>(MutationOutcome::Rejected, "x"),
            Err(MutationError::AlreadyPending("x".into()))
        );
        assert_eq!(ctx.settle::<u8>(MutationOutcome::Abandoned, "x"), Ok(None));
        assert_eq!(
            ctx.settle(
                MutationOutcome::RolledBack {
                    restored: 0_u8,
                    error: ApiError::Unauthorized
                },
                "x"
            ),
            Err(MutationError::Api(ApiError::Unauthorized))
        );
        assert_eq!(session.rejections(), 1);
    }
}
