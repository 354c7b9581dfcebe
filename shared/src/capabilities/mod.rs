mod http;
mod session;

pub use self::http::{HttpClient, HttpMethod, RequestSpec};
pub use self::session::{PublicAccess, SessionProvider};

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! Scripted collaborators for driving controllers without a network.

    use super::*;
    use crate::error::{ApiError, ApiResult};
    use crate::lock;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;
    use url::Url;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub method: HttpMethod,
        pub url: String,
        pub body: Option<String>,
        pub include_auth: bool,
    }

    struct Route {
        method: HttpMethod,
        pattern: String,
        responses: VecDeque<Scripted>,
    }

    struct Scripted {
        result: ApiResult<String>,
        gate: Option<Arc<Notify>>,
    }

    /// Answers requests from per-route FIFO queues and records every call.
    ///
    /// A route matches when the method is equal and the full URL contains the
    /// pattern. Routes are checked in registration order; exhausted routes are
    /// skipped.
    #[derive(Default)]
    pub struct ScriptedHttpClient {
        routes: Mutex<Vec<Route>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedHttpClient {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn respond(&self, method: HttpMethod, pattern: &str, result: ApiResult<String>) {
            self.push(method, pattern, result, None);
        }

        pub fn respond_json(&self, method: HttpMethod, pattern: &str, body: serde_json::Value) {
            self.respond(method, pattern, Ok(body.to_string()));
        }

        /// The response is held back until the returned gate is notified.
        pub fn respond_gated(
            &self,
            method: HttpMethod,
            pattern: &str,
            result: ApiResult<String>,
        ) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            self.push(method, pattern, result, Some(Arc::clone(&gate)));
            gate
        }

        fn push(
            &self,
            method: HttpMethod,
            pattern: &str,
            result: ApiResult<String>,
            gate: Option<Arc<Notify>>,
        ) {
            let mut routes = lock(&self.routes);
            let scripted = Scripted { result, gate };
            if let Some(route) = routes
                .iter_mut()
                .find(|r| r.method == method && r.pattern == pattern)
            {
                route.responses.push_back(scripted);
                return;
            }
            routes.push(Route {
                method,
                pattern: pattern.to_string(),
                responses: VecDeque::from([scripted]),
            });
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            lock(&self.calls).clone()
        }

        pub fn call_count(&self) -> usize {
            lock(&self.calls).len()
        }

        pub fn calls_matching(&self, pattern: &str) -> usize {
            lock(&self.calls)
                .iter()
                .filter(|c| c.url.contains(pattern))
                .count()
        }

        async fn answer(
            &self,
            method: HttpMethod,
            url: &Url,
            body: Option<&str>,
            include_auth: bool,
        ) -> ApiResult<String> {
            lock(&self.calls).push(RecordedCall {
                method,
                url: url.to_string(),
                body: body.map(str::to_string),
                include_auth,
            });

            let next = {
                let mut routes = lock(&self.routes);
                routes
                    .iter_mut()
                    .filter(|r| r.method == method && url.as_str().contains(&r.pattern))
                    .find_map(|r| r.responses.pop_front())
            };

            let Some(scripted) = next else {
                return Err(ApiError::ServerError {
                    code: 599,
                    message: format!("no scripted response for {} {url}", method.as_str()),
                });
            };
            if let Some(gate) = scripted.gate {
                gate.notified().await;
            }
            scripted.result
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn get(&self, url: &Url, include_auth: bool) -> ApiResult<String> {
            self.answer(HttpMethod::Get, url, None, include_auth).await
        }

        async fn post(&self, url: &Url, body: &str, include_auth: bool) -> ApiResult<String> {
            self.answer(HttpMethod::Post, url, Some(body), include_auth)
                .await
        }

        async fn delete(&self, url: &Url, include_auth: bool) -> ApiResult<String> {
            self.answer(HttpMethod::Delete, url, None, include_auth).await
        }
    }

    /// Session whose state is flipped by the test.
    pub struct StaticSession {
        authenticated: AtomicBool,
        rejections: Mutex<u32>,
    }

    impl StaticSession {
        pub fn signed_in() -> Arc<Self> {
            Arc::new(Self {
                authenticated: AtomicBool::new(true),
                rejections: Mutex::new(0),
            })
        }

        pub fn signed_out() -> Arc<Self> {
            let session = Self::signed_in();
            session.set_authenticated(false);
            session
        }

        pub fn set_authenticated(&self, value: bool) {
            self.authenticated.store(value, Ordering::SeqCst);
        }

        pub fn rejections(&self) -> u32 {
            *lock(&self.rejections)
        }
    }

    impl SessionProvider for StaticSession {
        fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        fn on_unauthorized(&self) {
            *lock(&self.rejections) += 1;
            self.set_authenticated(false);
        }
    }
}
