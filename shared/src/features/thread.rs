use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use super::SyncContext;
use crate::api::MarketplaceApi;
use crate::error::{ApiResult, MutationError};
use crate::event::ToastMessage;
use crate::model::{Cursor, Message, Page, ThreadId};
use crate::paginator::{
    CursorPaginator, LoadOutcome, PageDirection, PageSource, PaginationScope, ScopeKey,
};
use crate::state::{Lifecycle, ResourceState};

struct MessagePages {
    api: MarketplaceApi,
}

#[async_trait]
impl PageSource<Message> for MessagePages {
    async fn fetch_page(&self, scope: &ScopeKey, cursor: Option<&Cursor>) -> ApiResult<Page<Message>> {
        let thread_id = ThreadId::new(scope.discriminator());
        self.api.messages(&thread_id, cursor).await
    }
}

/// Message history of one conversation, oldest first. Older pages go in
/// front; sent messages go at the end.
pub struct ThreadController {
    ctx: SyncContext,
    lifecycle: Arc<Lifecycle>,
    thread_id: ThreadId,
    key: ScopeKey,
    messages: CursorPaginator<Message>,
}

impl ThreadController {
    pub fn new(ctx: SyncContext, thread_id: ThreadId) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let messages = CursorPaginator::new(
            Arc::new(MessagePages {
                api: ctx.api.clone(),
            }),
            Arc::clone(&ctx.session),
            Arc::clone(&lifecycle),
        );
        let key = ScopeKey::new("thread", &thread_id);
        messages.open_scope(&key, PageDirection::Prepend);
        Self {
            ctx,
            lifecycle,
            thread_id,
            key,
            messages,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    fn scope(&self) -> Arc<PaginationScope<Message>> {
        self.messages.open_scope(&self.key, PageDirection::Prepend)
    }

    pub fn state(&self) -> watch::Receiver<ResourceState<Vec<Message>>> {
        self.scope().state().subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<Vec<Message>> {
        self.scope().snapshot()
    }

    #[instrument(skip_all, fields(thread = %self.thread_id))]
    pub async fn load(&self) -> ApiResult<LoadOutcome<Message>> {
        let result = self.messages.load_initial(&self.key).await;
        self.ctx.announce_expiry(&result);
        result
    }

    pub async fn refresh(&self) -> ApiResult<LoadOutcome<Message>> {
        let result = self.messages.refresh(&self.key).await;
        self.ctx.announce_expiry(&result);
        result
    }

    /// Older messages, using the server's `before` cursor.
    pub async fn load_older(&self) -> ApiResult<LoadOutcome<Message>> {
        let result = self.messages.load_more(&self.key).await;
        self.ctx.announce_expiry(&result);
        result
    }

    /// Sends a message and appends the server's copy. Nothing is shown
    /// before the server answers.
    #[instrument(skip_all, fields(thread = %self.thread_id, attachments = attachments.len()))]
    pub async fn send_message(
        &self,
        text: &str,
        attachments: &[String],
    ) -> Result<Message, MutationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MutationError::invalid("text", "Message cannot be empty."));
        }
        self.ctx.require_session()?;

        let ticket = self.lifecycle.ticket();
        let result = self
            .ctx
            .api
            .send_message(&self.thread_id, text, attachments)
            .await;
        let message = match result {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "message not sent");
                if error.requires_auth() {
                    self.ctx.report_unauthorized(&error);
                } else {
                    self.ctx
                        .events
                        .toast(ToastMessage::error("Failed to send message."));
                }
                return Err(error.into());
            }
        };
        if !self.lifecycle.is_current(ticket) {
            debug!("sent message arrived after disposal");
            return Ok(message);
        }

        let scope = self.scope();
        let appended = scope.state().update_success("append sent message", |items, _| {
            if !items.iter().any(|m| m.id == message.id) {
                items.push(message.clone());
            }
        });
        if appended.is_err() {
            // Empty or errored history: the server copy is the new first page.
            if let Err(error) = self.messages.refresh(&self.key).await {
                warn!(%error, "history not reloaded after send");
            }
        }
        Ok(message)
    }

    pub fn dispose(&self) {
        self.lifecycle.dispose();
    }
}
