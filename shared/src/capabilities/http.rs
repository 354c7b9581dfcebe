use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::error::ApiResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn has_request_body(&self) -> bool {
        matches!(self, HttpMethod::Post)
    }
}

/// Transport collaborator. Implementations own TLS, pooling, timeouts and
/// auth headers, and map every non-2xx into an [`ApiError`](crate::ApiError)
/// (see [`ApiError::from_status`](crate::ApiError::from_status)).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &Url, include_auth: bool) -> ApiResult<String>;
    async fn post(&self, url: &Url, body: &str, include_auth: bool) -> ApiResult<String>;
    async fn delete(&self, url: &Url, include_auth: bool) -> ApiResult<String>;
}

/// One concrete request: method, URL and (for POST) a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: HttpMethod,
    url: Url,
    body: Option<String>,
    include_auth: bool,
    request_id: String,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            include_auth: true,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: Url, body: &Value) -> Self {
        Self::new(HttpMethod::Post, url).with_json(body)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Ignored for methods without a request body.
    #[must_use]
    pub fn with_json(mut self, body: &Value) -> Self {
        if self.method.has_request_body() {
            self.body = Some(body.to_string());
        }
        self
    }

    #[must_use]
    pub fn without_auth(mut self) -> Self {
        self.include_auth = false;
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn includes_auth(&self) -> bool {
        self.include_auth
    }

    /// Logged with the response, so each attempt of a fallback chain can be
    /// told apart.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// `"POST /v1/wishlists/add"`, for logs.
    pub fn label(&self) -> String {
        format!("{} {}", self.method.as_str(), self.url.path())
    }

    pub async fn send(&self, client: &dyn HttpClient) -> ApiResult<String> {
        match self.method {
            HttpMethod::Get => client.get(&self.url, self.include_auth).await,
            HttpMethod::Post => {
                let body = self.body.as_deref().unwrap_or("{}");
                client.post(&self.url, body, self.include_auth).await
            }
            HttpMethod::Delete => client.delete(&self.url, self.include_auth).await,
        }
    }
}
