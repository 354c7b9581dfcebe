use tracing::instrument;

use super::MarketplaceApi;
use crate::capabilities::RequestSpec;
use crate::config::SyncConfig;
use crate::decode::{decode_one, parse_payload};
use crate::error::ApiResult;
use crate::model::{ListingDetail, ListingId, ListingKind};

/// Detail routes for a listing, most specific first. Every kind ends with the
/// generic `listings/:id`.
pub fn listing_detail_variants(config: &SyncConfig, id: &ListingId, kind: ListingKind) -> Vec<RequestSpec> {
    let id = id.as_str();
    let mut routes: Vec<Vec<&str>> = match kind {
        ListingKind::TimeBased => vec![vec!["properties", id]],
        ListingKind::Gear => vec![vec!["gear-rentals", id], vec!["gear-rentals", "get", id]],
        ListingKind::SplitStay => vec![vec!["roommate", id], vec!["roommate", "get", id]],
        ListingKind::Unknown => Vec::new(),
    };
    routes.push(vec!["listings", id]);
    routes
        .iter()
        .map(|segments| RequestSpec::get(config.api_url(segments)))
        .collect()
}

impl MarketplaceApi {
    #[instrument(skip_all, fields(listing = %id, ?kind))]
    pub async fn listing_detail(&self, id: &ListingId, kind: ListingKind) -> ApiResult<ListingDetail> {
        let variants = listing_detail_variants(&self.config, id, kind);
        let found = self
            .chain(&self.config.read_fallback)
            .attempt(&variants, |body| {
                let raw = parse_payload(body)?;
                Ok(decode_one::<ListingDetail>(&raw)?)
            })
            .await?;
        Ok(found.value)
    }
}
