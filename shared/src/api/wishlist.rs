use serde_json::json;
use tracing::instrument;

use super::MarketplaceApi;
use crate::capabilities::RequestSpec;
use crate::config::SyncConfig;
use crate::decode::{decode_toggle_result, decode_wishlist, parse_payload};
use crate::error::ApiResult;
use crate::model::{ListingId, Page, WishlistItem, WishlistItemId, WishlistToggleResult};

fn toggle_variant(config: &SyncConfig, listing: &ListingId) -> RequestSpec {
    RequestSpec::post(
        config.api_url(&["account", "wishlist", "toggle"]),
        &json!({ "itemId": listing.as_str(), "listingId": listing.as_str() }),
    )
}

/// `wishlists/add` keyed by `listing_id`, then by `property_id`, then the
/// account toggle route.
pub fn wishlist_add_variants(config: &SyncConfig, listing: &ListingId) -> Vec<RequestSpec> {
    let add = config.api_url(&["wishlists", "add"]);
    vec![
        RequestSpec::post(add.clone(), &json!({ "listing_id": listing.as_str() })),
        RequestSpec::post(add, &json!({ "property_id": listing.as_str() })),
        toggle_variant(config, listing),
    ]
}

impl MarketplaceApi {
    #[instrument(skip_all, fields(listing = %listing))]
    pub async fn add_to_wishlist(&self, listing: &ListingId) -> ApiResult<WishlistToggleResult> {
        let variants = wishlist_add_variants(&self.config, listing);
        let result = self
            .chain(&self.config.mutation_fallback)
            .attempt(&variants, |body| Ok(decode_toggle_result(body, true)))
            .await?;
        Ok(result.value)
    }

    /// `DELETE wishlists/:item` when the item id is known, else (or on a
    /// mismatch) the account toggle route.
    #[instrument(skip_all, fields(listing = %listing))]
    pub async fn remove_from_wishlist(
        &self,
        listing: &ListingId,
        item: Option<&WishlistItemId>,
    ) -> ApiResult<WishlistToggleResult> {
        let mut variants = Vec::with_capacity(2);
        if let Some(item) = item {
            variants.push(RequestSpec::delete(
                self.config.api_url(&["wishlists", item.as_str()]),
            ));
        }
        variants.push(toggle_variant(&self.config, listing));
        let result = self
            .chain(&self.config.mutation_fallback)
            .attempt(&variants, |body| Ok(decode_toggle_result(body, false)))
            .await?;
        Ok(result.value)
    }

    /// `GET wishlists`, falling back to `GET account/wishlist`.
    pub async fn wishlist(&self) -> ApiResult<Page<WishlistItem>> {
        let variants = [
            RequestSpec::get(self.config.api_url(&["wishlists"])),
            RequestSpec::get(self.config.api_url(&["account", "wishlist"])),
        ];
        let result = self
            .chain(&self.config.read_fallback)
            .attempt(&variants, |body| {
                let raw = parse_payload(body)?;
                Ok(decode_wishlist(&raw)?)
            })
            .await?;
        Ok(result.value)
    }
}
