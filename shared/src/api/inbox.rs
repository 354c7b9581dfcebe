use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::MarketplaceApi;
use crate::capabilities::RequestSpec;
use crate::decode::{
    decode_created_thread_id, decode_one, decode_page, decode_unread_counts, ensure_success_envelope,
    parse_payload,
};
use crate::error::ApiResult;
use crate::model::{Cursor, InboxMode, ListingId, Message, Page, Thread, ThreadId, UnreadCounts, UserId};

/// Page size used when looking for an existing conversation before creating one.
const EXISTING_THREAD_SCAN: u32 = 50;

impl MarketplaceApi {
    /// `GET inbox/threads?limit&cursor&mode`
    #[instrument(skip_all, fields(mode = mode.as_query()))]
    pub async fn threads(&self, mode: InboxMode, cursor: Option<&Cursor>) -> ApiResult<Page<Thread>> {
        self.threads_with_limit(mode, cursor, self.config.thread_page_size)
            .await
    }

    async fn threads_with_limit(
        &self,
        mode: InboxMode,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> ApiResult<Page<Thread>> {
        let limit = limit.to_string();
        let url = self.config.api_url_with_query(
            &["inbox", "threads"],
            &[
                ("limit", Some(limit.as_str())),
                ("cursor", cursor.map(Cursor::as_str)),
                ("mode", Some(mode.as_query())),
            ],
        );
        let raw = self.fetch(RequestSpec::get(url)).await?;
        Ok(decode_page(&raw)?)
    }

    /// `GET inbox/unread-counts`
    pub async fn unread_counts(&self) -> ApiResult<UnreadCounts> {
        let url = self.config.api_url(&["inbox", "unread-counts"]);
        let raw = self.fetch(RequestSpec::get(url)).await?;
        Ok(decode_unread_counts(&raw)?)
    }

    /// `GET inbox/threads/:id/messages?limit&before`
    #[instrument(skip_all, fields(thread = %thread_id))]
    pub async fn messages(&self, thread_id: &ThreadId, before: Option<&Cursor>) -> ApiResult<Page<Message>> {
        let limit = self.config.message_page_size.to_string();
        let url = self.config.api_url_with_query(
            &["inbox", "threads", thread_id.as_str(), "messages"],
            &[
                ("limit", Some(limit.as_str())),
                ("before", before.map(Cursor::as_str)),
            ],
        );
        let raw = self.fetch(RequestSpec::get(url)).await?;
        Ok(decode_page(&raw)?)
    }

    /// `POST inbox/threads/:id/messages {text, attachments}`; `attachments` is
    /// omitted when empty.
    #[instrument(skip_all, fields(thread = %thread_id))]
    pub async fn send_message(
        &self,
        thread_id: &ThreadId,
        text: &str,
        attachments: &[String],
    ) -> ApiResult<Message> {
        let url = self
            .config
            .api_url(&["inbox", "threads", thread_id.as_str(), "messages"]);
        let mut body = json!({ "text": text });
        if !attachments.is_empty() {
            body["attachments"] = json!(attachments);
        }
        let raw = self.fetch(RequestSpec::post(url, &body)).await?;
        ensure_success_envelope(&raw)?;
        Ok(decode_one(&raw)?)
    }

    /// `POST inbox/threads/:id/archive`
    pub async fn archive_thread(&self, thread_id: &ThreadId) -> ApiResult<()> {
        let url = self
            .config
            .api_url(&["inbox", "threads", thread_id.as_str(), "archive"]);
        if let Some(raw) = self.execute(RequestSpec::post(url, &json!({}))).await? {
            ensure_success_envelope(&raw)?;
        }
        Ok(())
    }

    /// Returns the conversation with `participant`, creating it if the first
    /// page of the guest inbox has none.
    ///
    /// Creation tries `POST inbox/threads` then `POST inbox/thread`.
    #[instrument(skip_all, fields(participant = %participant))]
    pub async fn ensure_thread(
        &self,
        participant: &UserId,
        listing: Option<&ListingId>,
    ) -> ApiResult<ThreadId> {
        let existing = self
            .threads_with_limit(InboxMode::Guest, None, EXISTING_THREAD_SCAN)
            .await?;
        if let Some(thread) = existing
            .items
            .into_iter()
            .find(|t| t.participant_ids.contains(participant))
        {
            debug!(thread = %thread.id, "reusing existing thread");
            return Ok(thread.id);
        }

        let mut body = Map::new();
        body.insert("participantId".into(), json!(participant.as_str()));
        if let Some(listing) = listing {
            body.insert("listingId".into(), json!(listing.as_str()));
        }
        let body = Value::Object(body);
        let variants = [
            RequestSpec::post(self.config.api_url(&["inbox", "threads"]), &body),
            RequestSpec::post(self.config.api_url(&["inbox", "thread"]), &body),
        ];
        let created = self
            .chain(&self.config.mutation_fallback)
            .attempt(&variants, |body| {
                let raw = parse_payload(body)?;
                Ok(decode_created_thread_id(&raw)?)
            })
            .await?;
        Ok(created.value)
    }
}
