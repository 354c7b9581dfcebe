use serde_json::json;
use tracing::instrument;

use super::MarketplaceApi;
use crate::capabilities::RequestSpec;
use crate::decode::{decode_items, ensure_success_envelope, locate_list, Decode, RawPayload};
use crate::error::ApiResult;
use crate::model::{PaymentMethod, PaymentMethodId};

/// The methods list in a payments response, or `None` when the body carries
/// no list (some write routes answer with a bare `{success: true}`).
fn methods_in(raw: &RawPayload) -> ApiResult<Option<Vec<PaymentMethod>>> {
    ensure_success_envelope(raw)?;
    Ok(locate_list(raw, PaymentMethod::SHAPE.list_keys()).map(|list| decode_items(list.items)))
}

impl MarketplaceApi {
    /// `GET account/payment-methods`
    pub async fn payment_methods(&self) -> ApiResult<Vec<PaymentMethod>> {
        let url = self.config.api_url(&["account", "payment-methods"]);
        let raw = self.fetch(RequestSpec::get(url)).await?;
        Ok(methods_in(&raw)?.unwrap_or_default())
    }

    /// `POST account/payment-methods/default {paymentMethodId}`; returns the
    /// updated list when the server sent one.
    #[instrument(skip_all, fields(method = %id))]
    pub async fn set_default_payment_method(
        &self,
        id: &PaymentMethodId,
    ) -> ApiResult<Option<Vec<PaymentMethod>>> {
        let url = self
            .config
            .api_url(&["account", "payment-methods", "default"]);
        let body = json!({ "paymentMethodId": id.as_str() });
        match self.execute(RequestSpec::post(url, &body)).await? {
            Some(raw) => methods_in(&raw),
            None => Ok(None),
        }
    }

    /// `DELETE account/payment-methods/:id`
    #[instrument(skip_all, fields(method = %id))]
    pub async fn delete_payment_method(
        &self,
        id: &PaymentMethodId,
    ) -> ApiResult<Option<Vec<PaymentMethod>>> {
        let url = self
            .config
            .api_url(&["account", "payment-methods", id.as_str()]);
        match self.execute(RequestSpec::delete(url)).await? {
            Some(raw) => methods_in(&raw),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::ScriptedHttpClient;
    use crate::capabilities::{HttpClient, HttpMethod};
    use crate::config::SyncConfig;
    use crate::error::ApiError;
    use std::sync::Arc;

    fn api(client: &Arc<ScriptedHttpClient>) -> MarketplaceApi {
        let http: Arc<dyn HttpClient> = client.clone();
        MarketplaceApi::new(http, SyncConfig::new("https://api.example.com/v1/").unwrap())
    }

    #[tokio::test]
    async fn test_failure_envelope_is_server_error() {
        let client = ScriptedHttpClient::new();
        client.respond_json(
            HttpMethod::Get,
            "payment-methods",
            json!({"success": false, "code": 402, "error": "Billing account suspended"}),
        );

        let err = api(&client).payment_methods().await.unwrap_err();

        assert_eq!(
            err,
            ApiError::ServerError {
                code: 402,
                message: "Billing account suspended".into()
            }
        );
    }

    #[tokio::test]
    async fn test_set_default_returns_updated_list() {
        let client = ScriptedHttpClient::new();
        client.respond_json(
            HttpMethod::Post,
            "payment-methods/default",
            json!({"success": true, "data": {"paymentMethods": [
                {"id": "pm1", "brand": "visa", "last4": "4242", "isDefault": false},
                {"id": "pm2", "brand": "amex", "last4": "0005", "isDefault": true}
            ]}}),
        );

        let list = api(&client)
            .set_default_payment_method(&PaymentMethodId::new("pm2"))
            .await
            .unwrap()
            .unwrap();

        assert!(list[1].is_default);
        assert_eq!(
            client.calls()[0].body.as_deref(),
            Some(r#"{"paymentMethodId":"pm2"}"#)
        );
    }

    #[tokio::test]
    async fn test_delete_without_list_returns_none() {
        let client = ScriptedHttpClient::new();
        client.respond_json(HttpMethod::Delete, "payment-methods/pm1", json!({"success": true}));

        let list = api(&client)
            .delete_payment_method(&PaymentMethodId::new("pm1"))
            .await
            .unwrap();

        assert_eq!(list, None);
    }
}
