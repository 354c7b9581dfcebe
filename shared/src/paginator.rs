//! Cursor pagination with one in-flight request per scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

use crate::capabilities::SessionProvider;
use crate::error::{ApiError, ApiResult};
use crate::model::{Cursor, Page};
use crate::state::{Lifecycle, ResourceState, ResourceStateMachine, StateTag};
use crate::lock;

/// Identifies one independent list, e.g. `inbox:guest` or `thread:t1`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn new(kind: &str, discriminator: impl fmt::Display) -> Self {
        Self(format!("{kind}:{discriminator}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after the kind, e.g. `guest` in `inbox:guest`.
    pub fn discriminator(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, rest)| rest)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where `load_more` puts the next page.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageDirection {
    #[default]
    Append,
    /// Older items go in front (message history).
    Prepend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    Loaded(Page<T>),
    Skipped(SkipReason),
}

impl<T> LoadOutcome<T> {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    /// The last page had no cursor.
    Terminal,
    /// `load_more` before a successful first page.
    NotLoaded,
    Unauthenticated,
    /// The controller was disposed or moved to another scope meanwhile.
    Stale,
}

/// Fetches one page for a scope. `cursor` is `None` for the first page.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, scope: &ScopeKey, cursor: Option<&Cursor>) -> ApiResult<Page<T>>;
}

#[derive(Debug, Default)]
struct ScopeCursor {
    cursor: Option<Cursor>,
    in_flight: bool,
}

pub struct PaginationScope<T> {
    key: ScopeKey,
    direction: PageDirection,
    state: ResourceStateMachine<Vec<T>>,
    cursor: Mutex<ScopeCursor>,
}

impl<T: Clone> PaginationScope<T> {
    fn new(key: ScopeKey, direction: PageDirection) -> Self {
        Self {
            key,
            direction,
            state: ResourceStateMachine::new(),
            cursor: Mutex::new(ScopeCursor::default()),
        }
    }

    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    pub fn direction(&self) -> PageDirection {
        self.direction
    }

    pub fn state(&self) -> &ResourceStateMachine<Vec<T>> {
        &self.state
    }

    pub fn snapshot(&self) -> ResourceState<Vec<T>> {
        self.state.snapshot()
    }

    pub fn cursor(&self) -> Option<Cursor> {
        lock(&self.cursor).cursor.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.cursor).in_flight
    }

    /// Marks the scope busy, or says why the request should not be made.
    fn claim(self: &Arc<Self>, reset_cursor: bool) -> Result<InFlight<T>, SkipReason> {
        let mut guard = lock(&self.cursor);
        if guard.in_flight {
            return Err(SkipReason::InFlight);
        }
        if reset_cursor {
            guard.cursor = None;
        } else if guard.cursor.is_none() {
            return Err(SkipReason::Terminal);
        }
        guard.in_flight = true;
        Ok(InFlight {
            scope: Arc::clone(self),
            cursor: guard.cursor.clone(),
        })
    }
}

/// Clears the in-flight flag when the fetch completes or is dropped.
struct InFlight<T> {
    scope: Arc<PaginationScope<T>>,
    cursor: Option<Cursor>,
}

impl<T> InFlight<T> {
    fn store_cursor(&self, next: Option<Cursor>) {
        lock(&self.scope.cursor).cursor = next;
    }
}

impl<T> Drop for InFlight<T> {
    fn drop(&mut self) {
        lock(&self.scope.cursor).in_flight = false;
    }
}

pub struct CursorPaginator<T> {
    source: Arc<dyn PageSource<T>>,
    session: Arc<dyn SessionProvider>,
    lifecycle: Arc<Lifecycle>,
    scopes: Mutex<HashMap<ScopeKey, Arc<PaginationScope<T>>>>,
}

impl<T> CursorPaginator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        source: Arc<dyn PageSource<T>>,
        session: Arc<dyn SessionProvider>,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self {
            source,
            session,
            lifecycle,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the scope for `key`, creating it in `Loading` if needed.
    pub fn open_scope(&self, key: &ScopeKey, direction: PageDirection) -> Arc<PaginationScope<T>> {
        let mut scopes = lock(&self.scopes);
        Arc::clone(
            scopes
                .entry(key.clone())
                .or_insert_with(|| Arc::new(PaginationScope::new(key.clone(), direction))),
        )
    }

    pub fn scope(&self, key: &ScopeKey) -> Option<Arc<PaginationScope<T>>> {
        lock(&self.scopes).get(key).cloned()
    }

    pub fn close_scope(&self, key: &ScopeKey) {
        lock(&self.scopes).remove(key);
    }

    /// First page, replacing whatever the scope held. State goes through `Loading`.
    #[instrument(skip_all, fields(scope = %key))]
    pub async fn load_initial(&self, key: &ScopeKey) -> ApiResult<LoadOutcome<T>> {
        self.load_first_page(key, false).await
    }

    /// First page again. `Success` stays visible with `is_refreshing` set.
    #[instrument(skip_all, fields(scope = %key))]
    pub async fn refresh(&self, key: &ScopeKey) -> ApiResult<LoadOutcome<T>> {
        self.load_first_page(key, true).await
    }

    async fn load_first_page(&self, key: &ScopeKey, keep_data: bool) -> ApiResult<LoadOutcome<T>> {
        let scope = self.open_scope(key, PageDirection::default());
        if !self.session.is_authenticated() {
            scope.state.require_auth();
            return Ok(LoadOutcome::Skipped(SkipReason::Unauthenticated));
        }

        let flight = match scope.claim(true) {
            Ok(flight) => flight,
            Err(reason) => {
                debug!(?reason, "first page skipped");
                return Ok(LoadOutcome::Skipped(reason));
            }
        };
        if keep_data {
            scope.state.begin_refresh();
        } else {
            scope.state.reset();
        }

        let ticket = self.lifecycle.ticket();
        let result = self.source.fetch_page(key, None).await;
        if !self.lifecycle.is_current(ticket) {
            debug!("discarding first page for stale scope");
            return Ok(LoadOutcome::Skipped(SkipReason::Stale));
        }

        match result {
            Ok(page) => {
                flight.store_cursor(page.next_cursor.clone());
                let applied = if page.items.is_empty() {
                    scope.state.succeed_empty()
                } else {
                    scope.state.succeed(page.items.clone(), page.has_more())
                };
                if let Err(e) = applied {
                    warn!(error = %e, "first page not applied");
                }
                debug!(items = page.items.len(), has_more = page.has_more(), "first page loaded");
                Ok(LoadOutcome::Loaded(page))
            }
            Err(error) => {
                self.apply_failure(&scope, &error);
                Err(error)
            }
        }
    }

    /// Next page using the stored cursor.
    ///
    /// No-op while a request is outstanding, after the terminal page, or
    /// before a first page succeeded. A failure leaves the loaded items as they
    /// were; only `Unauthorized` changes the state.
    #[instrument(skip_all, fields(scope = %key))]
    pub async fn load_more(&self, key: &ScopeKey) -> ApiResult<LoadOutcome<T>> {
        let Some(scope) = self.scope(key) else {
            return Ok(LoadOutcome::Skipped(SkipReason::NotLoaded));
        };
        if scope.state.tag() != StateTag::Success {
            return Ok(LoadOutcome::Skipped(SkipReason::NotLoaded));
        }
        let flight = match scope.claim(false) {
            Ok(flight) => flight,
            Err(reason) => {
                debug!(?reason, "load more skipped");
                return Ok(LoadOutcome::Skipped(reason));
            }
        };

        let ticket = self.lifecycle.ticket();
        let result = self
            .source
            .fetch_page(key, flight.cursor.as_ref())
            .await;
        if !self.lifecycle.is_current(ticket) {
            debug!("discarding page for stale scope");
            return Ok(LoadOutcome::Skipped(SkipReason::Stale));
        }

        match result {
            Ok(page) => {
                let incoming = page.items.clone();
                let next_has_more = page.has_more();
                let direction = scope.direction;
                let applied = scope.state.update_success("append page", move |items, has_more| {
                    match direction {
                        PageDirection::Append => items.extend(incoming),
                        PageDirection::Prepend => {
                            let older = std::mem::replace(items, incoming);
                            items.extend(older);
                        }
                    }
                    *has_more = next_has_more;
                });
                match applied {
                    Ok(()) => flight.store_cursor(page.next_cursor.clone()),
                    Err(e) => warn!(error = %e, "page not applied"),
                }
                Ok(LoadOutcome::Loaded(page))
            }
            Err(error) => {
                if error.requires_auth() {
                    self.apply_failure(&scope, &error);
                } else {
                    warn!(%error, "load more failed, keeping loaded items");
                }
                Err(error)
            }
        }
    }

    fn apply_failure(&self, scope: &PaginationScope<T>, error: &ApiError) {
        if error.requires_auth() {
            self.session.on_unauthorized();
        }
        if let Err(e) = scope.state.fail(error) {
            warn!(error = %e, "failure not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::StaticSession;
    use crate::error::NetworkFailure;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Pages handed out in order; an optional gate holds the next response.
    #[derive(Default)]
    struct QueuedSource {
        pages: Mutex<VecDeque<ApiResult<Page<u32>>>>,
        cursors_seen: Mutex<Vec<Option<String>>>,
        calls: AtomicUsize,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl QueuedSource {
        fn with(pages: Vec<ApiResult<Page<u32>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                ..Self::default()
            })
        }

        fn gate_next(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *lock(&self.gate) = Some(Arc::clone(&gate));
            gate
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource<u32> for QueuedSource {
        async fn fetch_page(&self, _scope: &ScopeKey, cursor: Option<&Cursor>) -> ApiResult<Page<u32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            lock(&self.cursors_seen).push(cursor.map(|c| c.as_str().to_string()));
            let gate = lock(&self.gate).take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            lock(&self.pages)
                .pop_front()
                .unwrap_or(Err(ApiError::NotFound))
        }
    }

    fn page(items: &[u32], cursor: Option<&str>) -> ApiResult<Page<u32>> {
        Ok(Page::new(items.to_vec(), cursor.map(Cursor::from_server)))
    }

    fn paginator(source: Arc<QueuedSource>) -> CursorPaginator<u32> {
        CursorPaginator::new(source, StaticSession::signed_in(), Arc::new(Lifecycle::new()))
    }

    fn key() -> ScopeKey {
        ScopeKey::new("test", "a")
    }

    #[tokio::test]
    async fn test_initial_then_append() {
        let source = QueuedSource::with(vec![page(&[1, 2], Some("c1")), page(&[3], None)]);
        let p = paginator(Arc::clone(&source));

        p.load_initial(&key()).await.unwrap();
        p.load_more(&key()).await.unwrap();

        let scope = p.scope(&key()).unwrap();
        assert_eq!(
            scope.snapshot(),
            ResourceState::Success {
                data: vec![1, 2, 3],
                is_refreshing: false,
                has_more: false
            }
        );
        assert_eq!(
            *lock(&source.cursors_seen),
            vec![None, Some("c1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_prepend_direction() {
        let source = QueuedSource::with(vec![page(&[5, 6], Some("older")), page(&[3, 4], None)]);
        let p = paginator(Arc::clone(&source));
        p.open_scope(&key(), PageDirection::Prepend);

        p.load_initial(&key()).await.unwrap();
        p.load_more(&key()).await.unwrap();

        assert_eq!(
            p.scope(&key()).unwrap().snapshot().data(),
            Some(&vec![3, 4, 5, 6])
        );
    }

    #[tokio::test]
    async fn test_terminal_page_makes_no_call() {
        let source = QueuedSource::with(vec![page(&[1], None)]);
        let p = paginator(Arc::clone(&source));

        p.load_initial(&key()).await.unwrap();
        let outcome = p.load_more(&key()).await.unwrap();

        assert_eq!(outcome, LoadOutcome::Skipped(SkipReason::Terminal));
        assert_eq!(source.calls(), 1);
        assert!(!p.scope(&key()).unwrap().snapshot().has_more());
    }

    #[tokio::test]
    async fn test_overlapping_load_more_is_single_call() {
        let source = QueuedSource::with(vec![page(&[1], Some("c1")), page(&[2], Some("c2"))]);
        let p = paginator(Arc::clone(&source));
        p.load_initial(&key()).await.unwrap();

        let gate = source.gate_next();
        let k = key();
        let (first, second, ()) = tokio::join!(p.load_more(&k), p.load_more(&k), async {
            gate.notify_one();
        });

        assert!(matches!(first.unwrap(), LoadOutcome::Loaded(_)));
        assert_eq!(second.unwrap(), LoadOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(source.calls(), 2);
        assert_eq!(p.scope(&k).unwrap().snapshot().data(), Some(&vec![1, 2]));
    }

    #[tokio::test]
    async fn test_load_more_failure_keeps_success() {
        let source = QueuedSource::with(vec![
            page(&[1], Some("c1")),
            Err(ApiError::Network(NetworkFailure::Timeout)),
            page(&[2], None),
        ]);
        let p = paginator(Arc::clone(&source));
        p.load_initial(&key()).await.unwrap();

        assert!(p.load_more(&key()).await.is_err());
        let scope = p.scope(&key()).unwrap();
        assert_eq!(scope.snapshot().data(), Some(&vec![1]));
        assert!(scope.snapshot().has_more());
        assert!(!scope.is_in_flight());
        assert_eq!(scope.cursor().as_ref().map(Cursor::as_str), Some("c1"));

        p.load_more(&key()).await.unwrap();
        assert_eq!(scope.snapshot().data(), Some(&vec![1, 2]));
    }

    #[tokio::test]
    async fn test_initial_failure_is_error_and_empty_is_empty() {
        let source = QueuedSource::with(vec![Err(ApiError::ServiceUnavailable), page(&[], None)]);
        let p = paginator(Arc::clone(&source));

        assert!(p.load_initial(&key()).await.is_err());
        assert_eq!(p.scope(&key()).unwrap().state().tag(), StateTag::Error);

        p.load_initial(&key()).await.unwrap();
        assert_eq!(p.scope(&key()).unwrap().snapshot(), ResourceState::Empty);
    }

    #[tokio::test]
    async fn test_refresh_replaces_items_wholesale() {
        let source = QueuedSource::with(vec![
            page(&[1], Some("c1")),
            page(&[2], None),
            page(&[9], Some("c9")),
        ]);
        let p = paginator(Arc::clone(&source));
        p.load_initial(&key()).await.unwrap();
        p.load_more(&key()).await.unwrap();

        p.refresh(&key()).await.unwrap();
        let scope = p.scope(&key()).unwrap();
        assert_eq!(scope.snapshot().data(), Some(&vec![9]));
        assert_eq!(scope.cursor().as_ref().map(Cursor::as_str), Some("c9"));
        assert_eq!(lock(&source.cursors_seen)[2], None);
    }

    #[tokio::test]
    async fn test_unauthenticated_skips_fetch() {
        let source = QueuedSource::with(vec![page(&[1], None)]);
        let p = CursorPaginator::new(
            Arc::clone(&source) as Arc<dyn PageSource<u32>>,
            StaticSession::signed_out(),
            Arc::new(Lifecycle::new()),
        );

        let outcome = p.load_initial(&key()).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Skipped(SkipReason::Unauthenticated));
        assert_eq!(source.calls(), 0);
        assert_eq!(p.scope(&key()).unwrap().state().tag(), StateTag::RequiresAuth);
    }

    #[tokio::test]
    async fn test_unauthorized_load_more_requires_auth() {
        let source = QueuedSource::with(vec![page(&[1], Some("c1")), Err(ApiError::Unauthorized)]);
        let session = StaticSession::signed_in();
        let p = CursorPaginator::new(
            Arc::clone(&source) as Arc<dyn PageSource<u32>>,
            Arc::clone(&session) as Arc<dyn SessionProvider>,
            Arc::new(Lifecycle::new()),
        );
        p.load_initial(&key()).await.unwrap();

        assert_eq!(p.load_more(&key()).await, Err(ApiError::Unauthorized));
        assert_eq!(p.scope(&key()).unwrap().state().tag(), StateTag::RequiresAuth);
        assert_eq!(session.rejections(), 1);
    }

    #[tokio::test]
    async fn test_disposed_controller_ignores_late_page() {
        let source = QueuedSource::with(vec![page(&[1], None)]);
        let lifecycle = Arc::new(Lifecycle::new());
        let p = CursorPaginator::new(
            Arc::clone(&source) as Arc<dyn PageSource<u32>>,
            StaticSession::signed_in(),
            Arc::clone(&lifecycle),
        );

        let gate = source.gate_next();
        let k = key();
        let (outcome, ()) = tokio::join!(p.load_initial(&k), async {
            lifecycle.dispose();
            gate.notify_one();
        });

        assert_eq!(outcome.unwrap(), LoadOutcome::Skipped(SkipReason::Stale));
        let scope = p.scope(&k).unwrap();
        assert_eq!(scope.state().tag(), StateTag::Loading);
        assert!(!scope.is_in_flight());
    }
}
