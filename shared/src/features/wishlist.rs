use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::{apply_removal, Removed, SyncContext};
use crate::error::{ApiResult, MutationError};
use crate::event::SyncEvent;
use crate::model::{WishlistItem, WishlistItemId, WishlistToggleResult};
use crate::mutator::{MutationIntent, OptimisticMutator};
use crate::state::{Lifecycle, ResourceState, ResourceStateMachine};

/// The row to show after a confirmed removal: none, or the entry again when
/// the server reports the listing as still saved.
fn still_saved(
    mut entry: Removed<WishlistItem>,
    result: &WishlistToggleResult,
) -> Option<Removed<WishlistItem>> {
    if !result.is_favorite {
        return None;
    }
    if let Some(id) = &result.wishlist_item_id {
        entry.item.id = id.clone();
    }
    Some(entry)
}

/// The saved-listings screen.
pub struct WishlistController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    state: ResourceStateMachine<Vec<WishlistItem>>,
    mutator: OptimisticMutator,
}

impl WishlistController {
    pub fn new(ctx: SyncContext) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let mutator = OptimisticMutator::new(ctx.events.clone(), Arc::clone(&lifecycle));
        Self {
            ctx,
            lifecycle,
            state: ResourceStateMachine::new(),
            mutator,
        }
    }

    pub fn state(&self) -> watch::Receiver<ResourceState<Vec<WishlistItem>>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<Vec<WishlistItem>> {
        self.state.snapshot()
    }

    #[instrument(skip_all)]
    pub async fn load(&self) -> ApiResult<()> {
        self.fetch(false).await
    }

    pub async fn refresh(&self) -> ApiResult<()> {
        self.fetch(true).await
    }

    async fn fetch(&self, keep_data: bool) -> ApiResult<()> {
        if !self.ctx.session.is_authenticated() {
            self.state.require_auth();
            return Ok(());
        }
        if keep_data {
            self.state.begin_refresh();
        } else {
            self.state.reset();
        }

        let ticket = self.lifecycle.ticket();
        let result = self.ctx.api.wishlist().await;
        if !self.lifecycle.is_current(ticket) {
            debug!("discarding wishlist for disposed screen");
            return Ok(());
        }
        let applied = match &result {
            Ok(page) if page.items.is_empty() => self.state.succeed_empty(),
            Ok(page) => self.state.succeed(page.items.clone(), false),
            Err(error) => {
                self.ctx.report_unauthorized(error);
                self.state.fail(error)
            }
        };
        if let Err(e) = applied {
            warn!(error = %e, "wishlist result not applied");
        }
        result.map(|_| ())
    }

    /// Drops the item from the list at once; it comes back in place if the
    /// server refuses. When the fallback toggle route answers that the listing
    /// is still saved, the row returns under the server's item id.
    #[instrument(skip_all, fields(item = %item_id))]
    pub async fn remove(&self, item_id: &WishlistItemId) -> Result<(), MutationError> {
        let Some(removed) = Removed::find(&self.state, item_id.as_str()) else {
            return Err(MutationError::invalid(
                "wishlist_item",
                "This listing is no longer in your wishlist.",
            ));
        };
        let listing_id = removed.item.listing_id.clone();
        let kept = removed.clone();

        let intent = MutationIntent::new(listing_id.as_str(), Some(removed), None);
        let api = &self.ctx.api;
        let target = &listing_id;
        let outcome = self
            .mutator
            .mutate(
                intent,
                |removal: &Option<Removed<WishlistItem>>| {
                    apply_removal(&self.state, item_id.as_str(), removal.as_ref());
                },
                move || async move {
                    api.remove_from_wishlist(target, Some(item_id))
                        .await
                        .map(|result| still_saved(kept, &result))
                },
                "Could not remove from wishlist.",
            )
            .await;

        if let Some(confirmed) = self.ctx.settle(outcome, listing_id.as_str())? {
            if confirmed.is_some() {
                debug!("server kept the listing saved");
            }
            self.ctx.events.emit(SyncEvent::WishlistChanged {
                listing_id,
                is_favorite: confirmed.is_some(),
                wishlist_item_id: confirmed.map(|restored| restored.item.id),
            });
        }
        Ok(())
    }

    /// Applies favourites removed elsewhere. Additions only show up on the
    /// next [`refresh`](Self::refresh) since the item details are unknown here.
    pub fn handle_event(&self, event: &SyncEvent) {
        let SyncEvent::WishlistChanged {
            listing_id,
            is_favorite: false,
            ..
        } = event
        else {
            return;
        };
        if self.mutator.is_pending(listing_id.as_str()) {
            return;
        }
        let item_id = self.state.snapshot().data().and_then(|items| {
            items
                .iter()
                .find(|item| &item.listing_id == listing_id)
                .map(|item| item.id.clone())
        });
        if let Some(item_id) = item_id {
            apply_removal(&self.state, item_id.as_str(), None);
        }
    }

    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
