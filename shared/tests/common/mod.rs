#![allow(dead_code)]

use async_trait::async_trait;
use marketplace_sync::{
    ApiError, ApiResult, HttpClient, HttpMethod, SessionProvider, SyncConfig, SyncContext,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use url::Url;

#[derive(Debug, Clone)]
pub struct Call {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
}

struct Reply {
    result: ApiResult<String>,
    gate: Option<Arc<Notify>>,
}

struct Route {
    method: HttpMethod,
    pattern: String,
    replies: VecDeque<Reply>,
}

/// In-memory backend: FIFO replies per (method, URL substring).
#[derive(Default)]
pub struct FakeBackend {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn json(&self, method: HttpMethod, pattern: &str, body: Value) {
        self.push(method, pattern, Ok(body.to_string()), None);
    }

    pub fn fail(&self, method: HttpMethod, pattern: &str, error: ApiError) {
        self.push(method, pattern, Err(error), None);
    }

    pub fn empty(&self, method: HttpMethod, pattern: &str) {
        self.push(method, pattern, Ok(String::new()), None);
    }

    /// The reply waits until the returned gate is notified.
    pub fn gated_json(&self, method: HttpMethod, pattern: &str, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(method, pattern, Ok(body.to_string()), Some(Arc::clone(&gate)));
        gate
    }

    fn push(&self, method: HttpMethod, pattern: &str, result: ApiResult<String>, gate: Option<Arc<Notify>>) {
        let mut routes = self.routes.lock().unwrap();
        let reply = Reply { result, gate };
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.url.contains(pattern))
            .count()
    }

    async fn reply(&self, method: HttpMethod, url: &Url, body: Option<&str>) -> ApiResult<String> {
        self.calls.lock().unwrap().push(Call {
            method,
            url: url.to_string(),
            body: body.map(str::to_string),
        });
        let next = self
            .routes
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|r| r.method == method && url.as_str().contains(&r.pattern))
            .find_map(|r| r.replies.pop_front());
        let reply = next.unwrap_or_else(|| panic!("unexpected {} {url}", method.as_str()));
        if let Some(gate) = reply.gate {
            gate.notified().await;
        }
        reply.result
    }
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn get(&self, url: &Url, _include_auth: bool) -> ApiResult<String> {
        self.reply(HttpMethod::Get, url, None).await
    }

    async fn post(&self, url: &Url, body: &str, _include_auth: bool) -> ApiResult<String> {
        self.reply(HttpMethod::Post, url, Some(body)).await
    }

    async fn delete(&self, url: &Url, _include_auth: bool) -> ApiResult<String> {
        self.reply(HttpMethod::Delete, url, None).await
    }
}

pub struct TestSession {
    signed_in: AtomicBool,
    sign_outs: AtomicU32,
}

impl TestSession {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            signed_in: AtomicBool::new(true),
            sign_outs: AtomicU32::new(0),
        })
    }

    pub fn sign_outs(&self) -> u32 {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

impl SessionProvider for TestSession {
    fn is_authenticated(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    fn on_unauthorized(&self) {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.signed_in.store(false, Ordering::SeqCst);
    }
}

pub fn context(backend: &Arc<FakeBackend>, session: &Arc<TestSession>) -> SyncContext {
    let client: Arc<dyn HttpClient> = backend.clone();
    let session: Arc<dyn SessionProvider> = session.clone();
    SyncContext::new(
        client,
        session,
        SyncConfig::new("https://api.example.com/v1/").unwrap(),
    )
}
