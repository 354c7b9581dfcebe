use serde_json::json;
use tracing::instrument;

use super::MarketplaceApi;
use crate::capabilities::RequestSpec;
use crate::decode::{decode_one, ReviewsPayload};
use crate::error::ApiResult;
use crate::model::{Cursor, ListingId, Review, ReviewDraft};

impl MarketplaceApi {
    /// `GET reviews/property/:id`. Public, so no auth header is sent.
    #[instrument(skip_all, fields(listing = %listing))]
    pub async fn reviews(&self, listing: &ListingId, cursor: Option<&Cursor>) -> ApiResult<ReviewsPayload> {
        let limit = self.config.review_page_size.to_string();
        let url = self.config.api_url_with_query(
            &["reviews", "property", listing.as_str()],
            &[
                ("limit", Some(limit.as_str())),
                ("cursor", cursor.map(Cursor::as_str)),
            ],
        );
        let raw = self.fetch(RequestSpec::get(url).without_auth()).await?;
        Ok(ReviewsPayload::decode(&raw)?)
    }

    /// `POST reviews {listingId, rating, comment}`
    #[instrument(skip_all, fields(listing = %draft.listing_id(), rating = draft.rating()))]
    pub async fn create_review(&self, draft: &ReviewDraft) -> ApiResult<Review> {
        let body = json!({
            "listingId": draft.listing_id().as_str(),
            "rating": draft.rating(),
            "comment": draft.comment(),
        });
        let raw = self
            .fetch(RequestSpec::post(self.config.api_url(&["reviews"]), &body))
            .await?;
        Ok(decode_one(&raw)?)
    }
}
