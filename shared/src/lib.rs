//! Client-side data synchronization for the marketplace app.
//!
//! The host shell supplies an [`HttpClient`] and a [`SessionProvider`]; the
//! crate turns loosely shaped backend responses into typed models, paginates
//! them, applies optimistic writes, and publishes screen state through watch
//! channels. Cross-screen notifications go out on the [`EventBus`].

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod capabilities;
pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod fallback;
pub mod features;
pub mod model;
pub mod mutator;
pub mod paginator;
pub mod state;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::MarketplaceApi;
pub use capabilities::{HttpClient, HttpMethod, PublicAccess, RequestSpec, SessionProvider};
pub use config::{ConfigError, SyncConfig};
pub use error::{ApiError, ApiResult, DecodeFailure, MutationError, NetworkFailure};
pub use event::{EventBus, EventStream, SyncEvent, ToastKind, ToastMessage};
pub use fallback::{ContractMismatchPolicy, EndpointFallbackChain};
pub use features::{
    InboxController, ListingDetailController, PaymentMethodsController, ReviewsController,
    SyncContext, ThreadController, WishlistController,
};
pub use mutator::{MutationIntent, MutationOutcome, OptimisticMutator};
pub use paginator::{CursorPaginator, LoadOutcome, PageDirection, PageSource, ScopeKey, SkipReason};
pub use state::{Lifecycle, ResourceState, ResourceStateMachine, StateTag, TransitionError};

pub const DEFAULT_THREAD_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 50;
pub const DEFAULT_REVIEW_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;
/// Characters of the last message shown in an inbox row.
pub const PREVIEW_LENGTH: usize = 100;

/// Locks are only held for short, synchronous sections, so a panic while
/// holding one leaves the data consistent enough to keep going.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
