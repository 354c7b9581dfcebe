use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MutationError;
use crate::PREVIEW_LENGTH;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(ThreadId);
typed_id!(MessageId);
typed_id!(UserId);
typed_id!(ListingId);
typed_id!(ReviewId);
typed_id!(PaymentMethodId);
typed_id!(WishlistItemId);

/// Opaque pagination token issued by the server.
///
/// Only the decoder can mint one; the client echoes it back verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub(crate) fn from_server(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of a cursor-paginated list. `next_cursor == None` marks the last page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn terminal(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Anything with a stable server id; presentation keys lists off it.
pub trait Identified {
    fn key(&self) -> &str;
}

// ============================================================================
// Inbox
// ============================================================================

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InboxMode {
    #[default]
    Guest,
    Host,
}

impl InboxMode {
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Host => "host",
        }
    }

    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "guest" => Some(Self::Guest),
            "host" => Some(Self::Host),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Thread {
    pub id: ThreadId,
    pub participant_ids: Vec<UserId>,
    pub counterpart: Option<ThreadParticipant>,
    pub listing: Option<ThreadListing>,
    pub last_message: Option<Message>,
    pub unread_count: u32,
    pub is_unread: bool,
    pub updated_at: Option<String>,
}

impl Thread {
    /// Name of the other party, or a placeholder when the payload omitted it.
    pub fn display_name(&self) -> &str {
        self.counterpart
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or("User")
    }

    pub fn preview(&self) -> String {
        let text = self
            .last_message
            .as_ref()
            .map_or("", |m| m.text.as_str());
        if text.chars().count() <= PREVIEW_LENGTH {
            return text.to_string();
        }
        let mut cut: String = text.chars().take(PREVIEW_LENGTH).collect();
        cut.push('…');
        cut
    }
}

impl Identified for Thread {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ThreadParticipant {
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ThreadListing {
    pub id: Option<ListingId>,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: Option<ThreadId>,
    pub text: String,
    pub sender_id: Option<UserId>,
    pub sender_name: String,
    pub created_at: Option<String>,
    pub attachments: Vec<String>,
    pub is_read: bool,
}

impl Identified for Message {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnreadCounts {
    pub guest: u32,
    pub host: u32,
}

impl UnreadCounts {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.guest.saturating_add(self.host)
    }

    #[must_use]
    pub fn for_mode(&self, mode: InboxMode) -> u32 {
        match mode {
            InboxMode::Guest => self.guest,
            InboxMode::Host => self.host,
        }
    }
}

// ============================================================================
// Listings
// ============================================================================

/// Listing family; decides which detail routes are tried and in what order.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ListingKind {
    TimeBased,
    Gear,
    SplitStay,
    #[default]
    Unknown,
}

impl ListingKind {
    /// Parses the loose type hints the backend and deep links use.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "time-based" | "property" | "properties" | "space" => Self::TimeBased,
            "gear" | "gear-rental" | "gear-rentals" => Self::Gear,
            "split-stay" | "roommate" | "roommates" => Self::SplitStay,
            _ => Self::Unknown,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListingDetail {
    pub id: ListingId,
    pub title: String,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub location: Option<ListingLocation>,
    pub pricing: Option<ListingPricing>,
    pub host: Option<ListingHost>,
    pub amenities: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub max_guests: Option<u32>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub is_favorite: bool,
    pub wishlist_item_id: Option<WishlistItemId>,
}

impl ListingDetail {
    pub fn host_name(&self) -> &str {
        self.host
            .as_ref()
            .and_then(|h| h.name.as_deref())
            .unwrap_or("Host")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListingLocation {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ListingLocation {
    /// "City, State" style line, skipping missing parts.
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ListingPricing {
    pub base_price: Option<f64>,
    pub hourly_from: Option<f64>,
    pub currency: Option<String>,
    pub frequency: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListingHost {
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_superhost: bool,
    pub is_verified: bool,
}

// ============================================================================
// Reviews
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub author_id: Option<UserId>,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub rating: f64,
    pub comment: String,
    pub created_at: Option<String>,
}

impl Identified for Review {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Average per rating category, when the backend breaks the score down.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CategoryRatings {
    pub cleanliness: Option<f64>,
    pub accuracy: Option<f64>,
    pub communication: Option<f64>,
    pub location: Option<f64>,
    pub check_in: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Default, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReviewSummary {
    pub average_rating: f64,
    pub total_count: u32,
    pub category_averages: Option<CategoryRatings>,
    /// Reviews per star, `1..=5`. Stars the server did not report are absent.
    pub distribution: BTreeMap<u8, u32>,
}

impl ReviewSummary {
    /// Summary derived from the reviews at hand when the server sent none.
    pub fn from_reviews(reviews: &[Review]) -> Self {
        if reviews.is_empty() {
            return Self::default();
        }
        let sum: f64 = reviews.iter().map(|r| r.rating).sum();
        let count = u32::try_from(reviews.len()).unwrap_or(u32::MAX);
        Self {
            average_rating: sum / f64::from(count),
            total_count: count,
            ..Self::default()
        }
    }

    /// The summary once one more review with `stars` is counted.
    #[must_use]
    pub fn with_new_rating(&self, stars: u8) -> Self {
        let total = self.total_count.saturating_add(1);
        let sum = self.average_rating * f64::from(self.total_count) + f64::from(stars);
        let mut updated = self.clone();
        updated.average_rating = sum / f64::from(total);
        updated.total_count = total;
        if !updated.distribution.is_empty() {
            *updated.distribution.entry(stars).or_insert(0) += 1;
        }
        updated
    }
}

/// A review ready to submit. Construction validates the rating.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraft {
    listing_id: ListingId,
    rating: u8,
    comment: String,
}

impl ReviewDraft {
    pub fn new(
        listing_id: ListingId,
        rating: u8,
        comment: impl Into<String>,
    ) -> Result<Self, MutationError> {
        if !(1..=5).contains(&rating) {
            return Err(MutationError::invalid(
                "rating",
                "Please choose a rating between 1 and 5.",
            ));
        }
        Ok(Self {
            listing_id,
            rating,
            comment: comment.into().trim().to_string(),
        })
    }

    pub fn listing_id(&self) -> &ListingId {
        &self.listing_id
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

// ============================================================================
// Wishlist
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub listing_id: ListingId,
    pub title: String,
    pub image_url: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub rating: Option<f64>,
}

impl Identified for WishlistItem {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Server-confirmed state of a favourite after an add/remove/toggle call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WishlistToggleResult {
    pub is_favorite: bool,
    pub wishlist_item_id: Option<WishlistItemId>,
}

// ============================================================================
// Payment methods
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub brand: String,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub is_default: bool,
}

impl PaymentMethod {
    pub fn label(&self) -> String {
        match &self.last4 {
            Some(last4) => format!("{} •••• {last4}", self.brand),
            None => self.brand.clone(),
        }
    }
}

impl Identified for PaymentMethod {
    fn key(&self) -> &str {
        self.id.as_str()
    }
}
