use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::{apply_removal, Removed, SyncContext};
use crate::api::MarketplaceApi;
use crate::error::{ApiResult, MutationError};
use crate::event::{SyncEvent, ToastMessage};
use crate::lock;
use crate::model::{Cursor, InboxMode, ListingId, Page, Thread, ThreadId, UnreadCounts, UserId};
use crate::mutator::{MutationIntent, OptimisticMutator};
use crate::paginator::{
    CursorPaginator, LoadOutcome, PageDirection, PageSource, PaginationScope, ScopeKey,
};
use crate::state::{Lifecycle, ResourceState};

struct InboxPages {
    api: MarketplaceApi,
}

#[async_trait]
impl PageSource<Thread> for InboxPages {
    async fn fetch_page(&self, scope: &ScopeKey, cursor: Option<&Cursor>) -> ApiResult<Page<Thread>> {
        let mode = InboxMode::from_query(scope.discriminator()).unwrap_or_default();
        self.api.threads(mode, cursor).await
    }
}

fn scope_key(mode: InboxMode) -> ScopeKey {
    ScopeKey::new("inbox", mode.as_query())
}

/// Thread list for one inbox mode at a time, plus the unread badge.
pub struct InboxController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    threads: CursorPaginator<Thread>,
    mutator: OptimisticMutator,
    mode: Mutex<InboxMode>,
    unread: watch::Sender<UnreadCounts>,
}

impl InboxController {
    pub fn new(ctx: SyncContext) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let threads = CursorPaginator::new(
            Arc::new(InboxPages {
                api: ctx.api.clone(),
            }),
            Arc::clone(&ctx.session),
            Arc::clone(&lifecycle),
        );
        let mutator = OptimisticMutator::new(ctx.events.clone(), Arc::clone(&lifecycle));
        let (unread, _) = watch::channel(UnreadCounts::default());
        Self {
            ctx,
            lifecycle,
            threads,
            mutator,
            mode: Mutex::new(InboxMode::default()),
            unread,
        }
    }

    pub fn mode(&self) -> InboxMode {
        *lock(&self.mode)
    }

    fn scope(&self) -> Arc<PaginationScope<Thread>> {
        self.threads
            .open_scope(&scope_key(self.mode()), PageDirection::Append)
    }

    /// State of the current mode's list. A mode switch replaces the scope, so
    /// observers re-subscribe after [`switch_mode`](Self::switch_mode).
    pub fn state(&self) -> watch::Receiver<ResourceState<Vec<Thread>>> {
        self.scope().state().subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<Vec<Thread>> {
        self.scope().snapshot()
    }

    pub fn unread_counts(&self) -> watch::Receiver<UnreadCounts> {
        self.unread.subscribe()
    }

    #[instrument(skip_all, fields(mode = self.mode().as_query()))]
    pub async fn load(&self) -> ApiResult<LoadOutcome<Thread>> {
        let key = scope_key(self.mode());
        let result = self.threads.load_initial(&key).await;
        self.after_first_page(&result).await;
        result
    }

    pub async fn refresh(&self) -> ApiResult<LoadOutcome<Thread>> {
        let key = scope_key(self.mode());
        let result = self.threads.refresh(&key).await;
        self.after_first_page(&result).await;
        result
    }

    pub async fn load_more(&self) -> ApiResult<LoadOutcome<Thread>> {
        let result = self.threads.load_more(&scope_key(self.mode())).await;
        self.ctx.announce_expiry(&result);
        result
    }

    /// Switches guest/host. The new scope starts in `Loading`; anything still
    /// in flight for the old mode is dropped on arrival.
    #[instrument(skip(self))]
    pub async fn switch_mode(&self, mode: InboxMode) -> ApiResult<LoadOutcome<Thread>> {
        let previous = {
            let mut current = lock(&self.mode);
            std::mem::replace(&mut *current, mode)
        };
        if previous != mode {
            info!(from = previous.as_query(), to = mode.as_query(), "inbox mode switched");
            self.lifecycle.advance();
            self.threads.close_scope(&scope_key(previous));
        }
        self.load().await
    }

    /// Fetches the badge counts and publishes them when they changed.
    pub async fn refresh_unread_counts(&self) -> ApiResult<UnreadCounts> {
        if !self.ctx.session.is_authenticated() {
            return Ok(*self.unread.borrow());
        }
        let result = self.ctx.api.unread_counts().await;
        match &result {
            Ok(counts) if self.lifecycle.is_alive() => {
                let changed = self.unread.send_if_modified(|current| {
                    if current == counts {
                        return false;
                    }
                    *current = *counts;
                    true
                });
                if changed {
                    self.ctx
                        .events
                        .emit(SyncEvent::UnreadCountsChanged { counts: *counts });
                }
            }
            Ok(_) => debug!("unread counts arrived after disposal"),
            Err(error) => self.ctx.report_unauthorized(error),
        }
        result
    }

    /// The badge follows every first page that actually arrived.
    async fn after_first_page(&self, result: &ApiResult<LoadOutcome<Thread>>) {
        self.ctx.announce_expiry(result);
        if !matches!(result, Ok(LoadOutcome::Loaded(_))) {
            return;
        }
        if let Err(error) = self.refresh_unread_counts().await {
            warn!(%error, "unread counts not refreshed");
        }
    }

    /// Removes the thread from the list at once and archives it on the server;
    /// the thread returns to its position if the server refuses.
    #[instrument(skip_all, fields(thread = %thread_id))]
    pub async fn archive(&self, thread_id: &ThreadId) -> Result<(), MutationError> {
        let scope = self.scope();
        let Some(removed) = Removed::find(scope.state(), thread_id.as_str()) else {
            return Err(MutationError::invalid(
                "thread",
                "This conversation is no longer in your inbox.",
            ));
        };

        let intent = MutationIntent::new(thread_id.as_str(), Some(removed), None);
        let api = &self.ctx.api;
        let outcome = self
            .mutator
            .mutate(
                intent,
                |removal: &Option<Removed<Thread>>| {
                    apply_removal(scope.state(), thread_id.as_str(), removal.as_ref());
                },
                move || async move { api.archive_thread(thread_id).await.map(|()| None) },
                "Could not archive conversation.",
            )
            .await;

        if self.ctx.settle(outcome, thread_id.as_str())?.is_some() {
            self.ctx.events.emit(SyncEvent::ThreadArchived {
                thread_id: thread_id.clone(),
            });
        }
        Ok(())
    }

    /// Finds or creates the conversation with `participant`, e.g. from a
    /// listing's "contact host" action.
    pub async fn start_conversation(
        &self,
        participant: &UserId,
        listing: Option<&ListingId>,
    ) -> Result<ThreadId, MutationError> {
        self.ctx.require_session()?;
        match self.ctx.api.ensure_thread(participant, listing).await {
            Ok(thread_id) => Ok(thread_id),
            Err(error) => {
                warn!(%error, "conversation not started");
                if error.requires_auth() {
                    self.ctx.report_unauthorized(&error);
                } else {
                    self.ctx
                        .events
                        .toast(ToastMessage::error("Could not start a conversation."));
                }
                Err(error.into())
            }
        }
    }

    /// Later completions of this controller's requests are ignored.
    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
