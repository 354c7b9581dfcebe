//! Ordered request variants for operations whose backend contract is not fixed.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::capabilities::{HttpClient, RequestSpec};
use crate::error::{ApiError, ApiResult};

/// Which failures mean "the backend does not know this request shape".
///
/// Kept per endpoint family: a 400 from a route that is known to exist is
/// more likely a real validation error than a shape mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractMismatchPolicy {
    pub not_found: bool,
    pub status_codes: Vec<u16>,
    /// A 2xx whose body could not be decoded also moves on to the next variant.
    pub decode_failures: bool,
}

impl Default for ContractMismatchPolicy {
    fn default() -> Self {
        Self {
            not_found: true,
            status_codes: vec![400, 404],
            decode_failures: false,
        }
    }
}

impl ContractMismatchPolicy {
    /// Only `NotFound` continues the chain.
    pub fn not_found_only() -> Self {
        Self {
            not_found: true,
            status_codes: Vec::new(),
            decode_failures: false,
        }
    }

    #[must_use]
    pub fn with_decode_failures(mut self) -> Self {
        self.decode_failures = true;
        self
    }

    #[must_use]
    pub fn is_mismatch(&self, error: &ApiError) -> bool {
        match error {
            ApiError::NotFound => self.not_found || self.status_codes.contains(&404),
            ApiError::ServerError { code, .. } => self.status_codes.contains(code),
            ApiError::Decode(_) => self.decode_failures,
            _ => false,
        }
    }
}

/// Result of a chain run: the decoded value and which variant produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess<T> {
    pub value: T,
    pub variant_index: usize,
    pub attempts: usize,
}

pub struct EndpointFallbackChain<'a> {
    client: &'a dyn HttpClient,
    policy: &'a ContractMismatchPolicy,
}

impl<'a> EndpointFallbackChain<'a> {
    pub fn new(client: &'a dyn HttpClient, policy: &'a ContractMismatchPolicy) -> Self {
        Self { client, policy }
    }

    /// Runs `variants` in order until one succeeds and decodes.
    ///
    /// Only contract mismatches move on to the next variant; any other failure
    /// is returned immediately. When every variant mismatches, the last failure
    /// is returned.
    #[instrument(skip_all, fields(variants = variants.len()))]
    pub async fn attempt<T, D>(
        &self,
        variants: &[RequestSpec],
        decode: D,
    ) -> ApiResult<FallbackSuccess<T>>
    where
        D: Fn(&str) -> ApiResult<T>,
    {
        let mut last_error = ApiError::NotFound;
        for (index, spec) in variants.iter().enumerate() {
            let outcome = match spec.send(self.client).await {
                Ok(body) => decode(&body),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => {
                    debug!(variant = index, request = %spec.label(), request_id = spec.request_id(), "fallback chain succeeded");
                    return Ok(FallbackSuccess {
                        value,
                        variant_index: index,
                        attempts: index + 1,
                    });
                }
                Err(error) if self.policy.is_mismatch(&error) => {
                    debug!(variant = index, request = %spec.label(), request_id = spec.request_id(), %error, "contract mismatch, trying next variant");
                    last_error = error;
                }
                Err(error) => {
                    warn!(variant = index, request = %spec.label(), request_id = spec.request_id(), %error, "fallback chain stopped");
                    return Err(error);
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::ScriptedHttpClient;
    use crate::capabilities::HttpMethod;
    use crate::error::{DecodeFailure, NetworkFailure};
    use serde_json::json;
    use url::Url;

    fn spec(path: &str) -> RequestSpec {
        let url = Url::parse("https://api.example.com/v1/")
            .and_then(|base| base.join(path))
            .unwrap();
        RequestSpec::post(url, &json!({}))
    }

    fn variants() -> Vec<RequestSpec> {
        vec![spec("one"), spec("two"), spec("three")]
    }

    fn echo(body: &str) -> ApiResult<String> {
        Ok(body.to_string())
    }

    #[test]
    fn test_default_policy() {
        let policy = ContractMismatchPolicy::default();
        assert!(policy.is_mismatch(&ApiError::NotFound));
        assert!(policy.is_mismatch(&ApiError::ServerError {
            code: 400,
            message: String::new()
        }));
        assert!(!policy.is_mismatch(&ApiError::ServerError {
            code: 500,
            message: String::new()
        }));
        assert!(!policy.is_mismatch(&ApiError::Unauthorized));
        assert!(!policy.is_mismatch(&ApiError::Network(NetworkFailure::Timeout)));
        assert!(!policy.is_mismatch(&ApiError::Decode(DecodeFailure::malformed("x"))));
    }

    #[test]
    fn test_not_found_only_policy() {
        let policy = ContractMismatchPolicy::not_found_only();
        assert!(policy.is_mismatch(&ApiError::NotFound));
        assert!(!policy.is_mismatch(&ApiError::ServerError {
            code: 400,
            message: String::new()
        }));
    }

    #[tokio::test]
    async fn test_second_variant_wins_with_two_calls() {
        let client = ScriptedHttpClient::new();
        client.respond(HttpMethod::Post, "/one", Err(ApiError::NotFound));
        client.respond(HttpMethod::Post, "/two", Ok("second".into()));
        client.respond(HttpMethod::Post, "/three", Ok("third".into()));

        let policy = ContractMismatchPolicy::default();
        let chain = EndpointFallbackChain::new(client.as_ref(), &policy);
        let result = chain.attempt(&variants(), echo).await.unwrap();

        assert_eq!(result.value, "second");
        assert_eq!(result.variant_index, 1);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_terminal_failure_stops_chain() {
        let client = ScriptedHttpClient::new();
        client.respond(HttpMethod::Post, "/one", Err(ApiError::Unauthorized));
        client.respond(HttpMethod::Post, "/two", Ok("second".into()));

        let policy = ContractMismatchPolicy::default();
        let chain = EndpointFallbackChain::new(client.as_ref(), &policy);
        let err = chain.attempt(&variants(), echo).await.unwrap_err();

        assert_eq!(err, ApiError::Unauthorized);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_last_failure() {
        let client = ScriptedHttpClient::new();
        client.respond(HttpMethod::Post, "/one", Err(ApiError::NotFound));
        client.respond(
            HttpMethod::Post,
            "/two",
            Err(ApiError::ServerError {
                code: 400,
                message: "bad shape".into(),
            }),
        );
        client.respond(
            HttpMethod::Post,
            "/three",
            Err(ApiError::ServerError {
                code: 404,
                message: "last".into(),
            }),
        );

        let policy = ContractMismatchPolicy::default();
        let chain = EndpointFallbackChain::new(client.as_ref(), &policy);
        let err = chain.attempt(&variants(), echo).await.unwrap_err();

        assert_eq!(
            err,
            ApiError::ServerError {
                code: 404,
                message: "last".into()
            }
        );
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_decode_failure_continues_only_when_policy_allows() {
        let client = ScriptedHttpClient::new();
        client.respond(HttpMethod::Post, "/one", Ok("<html>".into()));
        client.respond(HttpMethod::Post, "/two", Ok("ok".into()));
        let strict = |body: &str| -> ApiResult<String> {
            if body.starts_with('<') {
                Err(DecodeFailure::malformed("html").into())
            } else {
                Ok(body.to_string())
            }
        };

        let policy = ContractMismatchPolicy::default();
        let chain = EndpointFallbackChain::new(client.as_ref(), &policy);
        assert!(matches!(
            chain.attempt(&variants(), strict).await,
            Err(ApiError::Decode(_))
        ));

        client.respond(HttpMethod::Post, "/one", Ok("<html>".into()));
        let policy = ContractMismatchPolicy::default().with_decode_failures();
        let chain = EndpointFallbackChain::new(client.as_ref(), &policy);
        let result = chain.attempt(&variants(), strict).await.unwrap();
        assert_eq!(result.value, "ok");
        assert_eq!(result.attempts, 2);
    }
}
