//! Endpoint layer: URL building, request variants and decoding per feature.
//!
//! Every call goes through the injected [`HttpClient`]; nothing here keeps
//! state beyond the config.

mod inbox;
mod listing;
mod payments;
mod reviews;
mod wishlist;

use std::sync::Arc;
use tracing::debug;

use crate::capabilities::{HttpClient, RequestSpec};
use crate::config::SyncConfig;
use crate::decode::{parse_payload, RawPayload};
use crate::error::ApiResult;
use crate::fallback::{ContractMismatchPolicy, EndpointFallbackChain};

pub use self::listing::listing_detail_variants;
pub use self::wishlist::wishlist_add_variants;

#[derive(Clone)]
pub struct MarketplaceApi {
    client: Arc<dyn HttpClient>,
    config: SyncConfig,
}

impl MarketplaceApi {
    pub fn new(client: Arc<dyn HttpClient>, config: SyncConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sends `spec` and parses the body into a payload tree.
    async fn fetch(&self, spec: RequestSpec) -> ApiResult<RawPayload> {
        let body = spec.send(self.client.as_ref()).await?;
        debug!(
            request = %spec.label(),
            request_id = spec.request_id(),
            bytes = body.len(),
            "response received"
        );
        Ok(parse_payload(&body)?)
    }

    /// Sends `spec` for its side effect. Empty bodies count as success.
    async fn execute(&self, spec: RequestSpec) -> ApiResult<Option<RawPayload>> {
        let body = spec.send(self.client.as_ref()).await?;
        debug!(request = %spec.label(), request_id = spec.request_id(), "request executed");
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(parse_payload(&body).ok())
    }

    fn chain<'a>(&'a self, policy: &'a ContractMismatchPolicy) -> EndpointFallbackChain<'a> {
        EndpointFallbackChain::new(self.client.as_ref(), policy)
    }
}
