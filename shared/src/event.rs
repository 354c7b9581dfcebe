use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{ListingId, ThreadId, UnreadCounts, WishlistItemId};

/// Cross-screen notifications. State of individual screens travels through
/// their own watch channels; this bus carries what other screens react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    UnreadCountsChanged {
        counts: UnreadCounts,
    },
    WishlistChanged {
        listing_id: ListingId,
        is_favorite: bool,
        wishlist_item_id: Option<WishlistItemId>,
    },
    ThreadArchived {
        thread_id: ThreadId,
    },
    Toast {
        toast: ToastMessage,
    },
    /// A 401 was seen; the host should route to sign-in.
    SessionExpired,
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnreadCountsChanged { .. } => "unread_counts_changed",
            Self::WishlistChanged { .. } => "wishlist_changed",
            Self::ThreadArchived { .. } => "thread_archived",
            Self::Toast { .. } => "toast",
            Self::SessionExpired => "session_expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
            duration_ms: kind.default_duration_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, ToastKind::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

pub type EventStream = broadcast::Receiver<SyncEvent>;

/// Fan-out of [`SyncEvent`]s. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> EventStream {
        self.tx.subscribe()
    }

    /// Best-effort; slow subscribers see `Lagged` from the channel.
    pub fn emit(&self, event: SyncEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "event emitted"),
            Err(_) => debug!(event = name, "event dropped, no subscribers"),
        }
    }

    pub fn toast(&self, toast: ToastMessage) {
        self.emit(SyncEvent::Toast { toast });
    }
}
