use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::SyncContext;
use crate::error::{ApiResult, MutationError};
use crate::event::SyncEvent;
use crate::lock;
use crate::model::{ListingDetail, ListingId, ListingKind, WishlistToggleResult};
use crate::mutator::{MutationIntent, OptimisticMutator};
use crate::state::{Lifecycle, ResourceState, ResourceStateMachine};

/// One listing's detail page with its favourite heart.
pub struct ListingDetailController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    state: ResourceStateMachine<ListingDetail>,
    mutator: OptimisticMutator,
    current: Mutex<Option<(ListingId, ListingKind)>>,
}

impl ListingDetailController {
    pub fn new(ctx: SyncContext) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let mutator = OptimisticMutator::new(ctx.events.clone(), Arc::clone(&lifecycle));
        Self {
            ctx,
            lifecycle,
            state: ResourceStateMachine::new(),
            mutator,
            current: Mutex::new(None),
        }
    }

    pub fn state(&self) -> watch::Receiver<ResourceState<ListingDetail>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<ListingDetail> {
        self.state.snapshot()
    }

    /// Loads `id`, trying the routes for `kind` first. Switching to another
    /// listing discards whatever the previous one still had in flight.
    #[instrument(skip(self))]
    pub async fn load(&self, id: &ListingId, kind: ListingKind) -> ApiResult<()> {
        let switched = {
            let mut current = lock(&self.current);
            let switched = current.as_ref().is_some_and(|(loaded, _)| loaded != id);
            *current = Some((id.clone(), kind));
            switched
        };
        if switched {
            self.lifecycle.advance();
        }
        self.state.reset();
        self.fetch(id, kind).await
    }

    /// Reloads the current listing, keeping it on screen meanwhile.
    pub async fn refresh(&self) -> ApiResult<()> {
        let Some((id, kind)) = lock(&self.current).clone() else {
            debug!("refresh before any listing was loaded");
            return Ok(());
        };
        self.state.begin_refresh();
        self.fetch(&id, kind).await
    }

    async fn fetch(&self, id: &ListingId, kind: ListingKind) -> ApiResult<()> {
        let ticket = self.lifecycle.ticket();
        let result = self.ctx.api.listing_detail(id, kind).await;
        if !self.lifecycle.is_current(ticket) {
            debug!(listing = %id, "discarding detail for stale listing");
            return Ok(());
        }
        match result {
            Ok(detail) => {
                if let Err(e) = self.state.succeed(detail, false) {
                    warn!(error = %e, "listing detail not applied");
                }
                Ok(())
            }
            Err(error) => {
                self.ctx.report_unauthorized(&error);
                if let Err(e) = self.state.fail(&error) {
                    warn!(error = %e, "listing failure not applied");
                }
                Err(error)
            }
        }
    }

    /// Flips the favourite flag immediately, then confirms it through the
    /// wishlist routes. Returns `None` when the screen went away first.
    #[instrument(skip_all)]
    pub async fn toggle_favorite(&self) -> Result<Option<WishlistToggleResult>, MutationError> {
        self.ctx.require_session()?;
        let Some(detail) = self.state.snapshot().data().cloned() else {
            return Err(MutationError::invalid(
                "listing",
                "The listing has not finished loading.",
            ));
        };

        let previous = WishlistToggleResult {
            is_favorite: detail.is_favorite,
            wishlist_item_id: detail.wishlist_item_id.clone(),
        };
        let desired = WishlistToggleResult {
            is_favorite: !detail.is_favorite,
            wishlist_item_id: None,
        };
        let listing_id = detail.id;
        let was_favorite = previous.is_favorite;
        let known_item = previous.wishlist_item_id.clone();
        let intent = MutationIntent::new(listing_id.as_str(), previous, desired);

        let api = &self.ctx.api;
        let target = &listing_id;
        let outcome = self
            .mutator
            .mutate(
                intent,
                |shown: &WishlistToggleResult| self.show_favorite(shown),
                move || async move {
                    if was_favorite {
                        api.remove_from_wishlist(target, known_item.as_ref()).await
                    } else {
                        api.add_to_wishlist(target).await
                    }
                },
                "Could not update wishlist.",
            )
            .await;

        let confirmed = self.ctx.settle(outcome, listing_id.as_str())?;
        if let Some(result) = &confirmed {
            info!(listing = %listing_id, is_favorite = result.is_favorite, "favourite updated");
            self.ctx.events.emit(SyncEvent::WishlistChanged {
                listing_id: listing_id.clone(),
                is_favorite: result.is_favorite,
                wishlist_item_id: result.wishlist_item_id.clone(),
            });
        }
        Ok(confirmed)
    }

    fn show_favorite(&self, shown: &WishlistToggleResult) {
        let applied = self.state.update_success("show favourite", |detail, _| {
            detail.is_favorite = shown.is_favorite;
            detail.wishlist_item_id.clone_from(&shown.wishlist_item_id);
        });
        if let Err(e) = applied {
            warn!(error = %e, "favourite not shown");
        }
    }

    /// Keeps the heart in sync with changes made on other screens.
    pub fn handle_event(&self, event: &SyncEvent) {
        let SyncEvent::WishlistChanged {
            listing_id,
            is_favorite,
            wishlist_item_id,
        } = event
        else {
            return;
        };
        let shows_listing = self
            .state
            .snapshot()
            .data()
            .is_some_and(|detail| &detail.id == listing_id);
        if shows_listing && !self.mutator.is_pending(listing_id.as_str()) {
            self.show_favorite(&WishlistToggleResult {
                is_favorite: *is_favorite,
                wishlist_item_id: wishlist_item_id.clone(),
            });
        }
    }

    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
