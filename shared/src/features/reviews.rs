use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::SyncContext;
use crate::api::MarketplaceApi;
use crate::capabilities::PublicAccess;
use crate::error::{ApiResult, MutationError};
use crate::event::ToastMessage;
use crate::model::{Cursor, ListingId, Page, Review, ReviewDraft, ReviewSummary};
use crate::paginator::{
    CursorPaginator, LoadOutcome, PageDirection, PageSource, PaginationScope, ScopeKey,
};
use crate::state::{Lifecycle, ResourceState};

/// Review pages for one listing. The summary block rides along with the
/// first page.
struct ReviewPages {
    api: MarketplaceApi,
    lifecycle: Arc<Lifecycle>,
    summary: Arc<watch::Sender<ReviewSummary>>,
}

#[async_trait]
impl PageSource<Review> for ReviewPages {
    async fn fetch_page(&self, scope: &ScopeKey, cursor: Option<&Cursor>) -> ApiResult<Page<Review>> {
        let listing = ListingId::new(scope.discriminator());
        let payload = self.api.reviews(&listing, cursor).await?;
        if cursor.is_none() && self.lifecycle.is_alive() {
            self.summary.send_replace(payload.summary);
        }
        Ok(payload.page)
    }
}

pub struct ReviewsController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    listing_id: ListingId,
    key: ScopeKey,
    reviews: CursorPaginator<Review>,
    summary: Arc<watch::Sender<ReviewSummary>>,
}

impl ReviewsController {
    pub fn new(ctx: SyncContext, listing_id: ListingId) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let (summary, _) = watch::channel(ReviewSummary::default());
        let summary = Arc::new(summary);
        let reviews = CursorPaginator::new(
            Arc::new(ReviewPages {
                api: ctx.api.clone(),
                lifecycle: Arc::clone(&lifecycle),
                summary: Arc::clone(&summary),
            }),
            // Reviews are public; signed-out users still see them.
            Arc::new(PublicAccess),
            Arc::clone(&lifecycle),
        );
        let key = ScopeKey::new("reviews", &listing_id);
        Self {
            ctx,
            lifecycle,
            listing_id,
            key,
            reviews,
            summary,
        }
    }

    pub fn listing_id(&self) -> &ListingId {
        &self.listing_id
    }

    fn scope(&self) -> Arc<PaginationScope<Review>> {
        self.reviews.open_scope(&self.key, PageDirection::Append)
    }

    pub fn state(&self) -> watch::Receiver<ResourceState<Vec<Review>>> {
        self.scope().state().subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<Vec<Review>> {
        self.scope().snapshot()
    }

    pub fn summary(&self) -> watch::Receiver<ReviewSummary> {
        self.summary.subscribe()
    }

    #[instrument(skip_all, fields(listing = %self.listing_id))]
    pub async fn load(&self) -> ApiResult<LoadOutcome<Review>> {
        self.reviews.load_initial(&self.key).await
    }

    pub async fn refresh(&self) -> ApiResult<LoadOutcome<Review>> {
        self.reviews.refresh(&self.key).await
    }

    pub async fn load_more(&self) -> ApiResult<LoadOutcome<Review>> {
        self.reviews.load_more(&self.key).await
    }

    /// Validates and submits a review, then shows it at the top of the list.
    #[instrument(skip_all, fields(listing = %self.listing_id, rating = rating))]
    pub async fn create_review(&self, rating: u8, comment: &str) -> Result<Review, MutationError> {
        let draft = ReviewDraft::new(self.listing_id.clone(), rating, comment)?;
        self.ctx.require_session()?;

        let review = match self.ctx.api.create_review(&draft).await {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "review not submitted");
                if error.requires_auth() {
                    self.ctx.report_unauthorized(&error);
                } else {
                    self.ctx
                        .events
                        .toast(ToastMessage::error("Could not submit your review."));
                }
                return Err(error.into());
            }
        };
        if !self.lifecycle.is_alive() {
            debug!("review confirmed after disposal");
            return Ok(review);
        }

        let inserted = self.scope().state().update_success("insert new review", |items, _| {
            if !items.iter().any(|r| r.id == review.id) {
                items.insert(0, review.clone());
            }
        });
        match inserted {
            Ok(()) => {
                self.summary
                    .send_modify(|summary| *summary = summary.with_new_rating(rating));
            }
            Err(_) => {
                if let Err(error) = self.reviews.refresh(&self.key).await {
                    warn!(%error, "reviews not reloaded after submit");
                }
            }
        }
        Ok(review)
    }

    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
