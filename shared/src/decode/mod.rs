//! Tolerant response decoding.
//!
//! Payloads are parsed once into a [`RawPayload`] tree. Each canonical type
//! implements [`Decode`] for a single item; the functions here handle the
//! envelope around it and the skip-and-log batch policy.

mod envelope;
mod fields;
mod inbox;
mod listing;
mod payments;
mod reviews;
mod wishlist;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{extract_server_message, ApiError, DecodeFailure};
use crate::model::{
    ListingDetail, Message, Page, PaymentMethod, Review, Thread, WishlistItem,
    WishlistToggleResult,
};

pub use self::envelope::{locate_list, locate_object, next_cursor, ListLocation};
pub use self::fields::{Fields, JsonObject};
pub use self::inbox::{decode_created_thread_id, decode_unread_counts};
pub use self::reviews::{decode_review_summary, ReviewsPayload};
pub use self::wishlist::{decode_toggle_result, decode_wishlist};

/// Untyped response tree. Discarded once decoding is done.
pub type RawPayload = Value;

/// The canonical types a payload can decode into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceShape {
    Thread,
    Message,
    ListingDetail,
    Review,
    PaymentMethod,
    WishlistItem,
    WishlistToggleResult,
}

impl ResourceShape {
    pub fn name(self) -> &'static str {
        match self {
            Self::Thread => "thread",
            Self::Message => "message",
            Self::ListingDetail => "listing_detail",
            Self::Review => "review",
            Self::PaymentMethod => "payment_method",
            Self::WishlistItem => "wishlist_item",
            Self::WishlistToggleResult => "wishlist_toggle",
        }
    }

    /// Named keys a list of this shape may sit under.
    pub fn list_keys(self) -> &'static [&'static str] {
        match self {
            Self::Thread => &["threads", "items", "conversations"],
            Self::Message => &["messages", "items", "data"],
            Self::Review => &["reviews", "items", "results"],
            Self::PaymentMethod => &["paymentMethods", "payment_methods", "methods", "items"],
            Self::WishlistItem => &["items", "wishlist", "favorites"],
            Self::ListingDetail => &["listings", "items", "results"],
            Self::WishlistToggleResult => &[],
        }
    }

    /// Named keys a single object of this shape may sit under.
    pub fn object_keys(self) -> &'static [&'static str] {
        match self {
            Self::Thread => &["thread"],
            Self::Message => &["message"],
            Self::ListingDetail => &["listing", "item", "property"],
            Self::Review => &["review"],
            Self::PaymentMethod => &["paymentMethod", "payment_method"],
            Self::WishlistItem => &["item"],
            Self::WishlistToggleResult => &[],
        }
    }
}

/// Decoded, typed form of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalResource {
    Thread(Thread),
    Message(Message),
    ListingDetail(Box<ListingDetail>),
    Review(Review),
    PaymentMethod(PaymentMethod),
    WishlistItem(WishlistItem),
    WishlistToggleResult(WishlistToggleResult),
}

/// Single-item decoding for a canonical type.
pub trait Decode: Sized {
    const SHAPE: ResourceShape;

    /// Fails with [`DecodeFailure::ItemSkipped`] when a mandatory field is missing.
    fn decode_item(fields: Fields<'_>) -> Result<Self, DecodeFailure>;
}

pub(crate) fn missing(shape: ResourceShape, field: &str) -> DecodeFailure {
    DecodeFailure::skipped(shape.name(), format!("missing {field}"))
}

/// Parses a response body. Anything that is not a JSON object or array is malformed.
pub fn parse_payload(body: &str) -> Result<RawPayload, DecodeFailure> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| DecodeFailure::malformed(e.to_string()))?;
    match value {
        Value::Object(_) | Value::Array(_) => Ok(value),
        other => Err(DecodeFailure::malformed(format!(
            "expected object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decodes a payload as a single resource of `shape`.
pub fn decode(raw: &RawPayload, shape: ResourceShape) -> Result<CanonicalResource, DecodeFailure> {
    Ok(match shape {
        ResourceShape::Thread => CanonicalResource::Thread(decode_one(raw)?),
        ResourceShape::Message => CanonicalResource::Message(decode_one(raw)?),
        ResourceShape::ListingDetail => {
            CanonicalResource::ListingDetail(Box::new(decode_one(raw)?))
        }
        ResourceShape::Review => CanonicalResource::Review(decode_one(raw)?),
        ResourceShape::PaymentMethod => CanonicalResource::PaymentMethod(decode_one(raw)?),
        ResourceShape::WishlistItem => CanonicalResource::WishlistItem(decode_one(raw)?),
        ResourceShape::WishlistToggleResult => {
            CanonicalResource::WishlistToggleResult(decode_one(raw)?)
        }
    })
}

pub fn decode_one<T: Decode>(raw: &RawPayload) -> Result<T, DecodeFailure> {
    let obj = locate_object(raw, T::SHAPE.object_keys()).ok_or_else(|| {
        DecodeFailure::malformed(format!("no {} object in payload", T::SHAPE.name()))
    })?;
    T::decode_item(Fields::new(obj))
}

/// Decodes a list page. Items that fail to decode are dropped and logged.
pub fn decode_page<T: Decode>(raw: &RawPayload) -> Result<Page<T>, DecodeFailure> {
    if !(raw.is_object() || raw.is_array()) {
        return Err(DecodeFailure::malformed(format!(
            "expected object or array, got {}",
            json_kind(raw)
        )));
    }
    let Some(location) = locate_list(raw, T::SHAPE.list_keys()) else {
        debug!(shape = T::SHAPE.name(), "no list in payload, treating as empty page");
        return Ok(Page::terminal(Vec::new()));
    };
    let cursor = next_cursor(raw, &location);
    Ok(Page::new(decode_items(location.items), cursor))
}

/// Skip-and-log batch decoding.
pub fn decode_items<T: Decode>(items: &[Value]) -> Vec<T> {
    let mut decoded = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            warn!(shape = T::SHAPE.name(), index, "skipping non-object list element");
            continue;
        };
        match T::decode_item(Fields::new(obj)) {
            Ok(value) => decoded.push(value),
            Err(failure) => warn!(shape = T::SHAPE.name(), index, %failure, "skipping item"),
        }
    }
    decoded
}

/// Rejects payloads that report failure in-band (`success: false`, `status: "error"`).
pub fn ensure_success_envelope(raw: &RawPayload) -> Result<(), ApiError> {
    let Some(obj) = raw.as_object() else {
        return Ok(());
    };
    let fields = Fields::new(obj);
    let flagged_false = fields.boolean(&["success", "status", "ok"]) == Some(false);
    let status_text = fields.string(&["status"]).map(|s| s.to_ascii_lowercase());
    let failed_status = matches!(status_text.as_deref(), Some("error" | "fail" | "failed"));
    if !(flagged_false || failed_status) {
        return Ok(());
    }

    let code = fields
        .int(&["code", "statusCode"])
        .and_then(|c| u16::try_from(c).ok())
        .filter(|c| (400..=599).contains(c))
        .unwrap_or(500);
    let message = extract_server_message(&raw.to_string())
        .unwrap_or_else(|| "Request failed. Please try again.".into());
    Err(ApiError::ServerError { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_malformed_and_scalars() {
        assert!(matches!(
            parse_payload("{\"threads\": ["),
            Err(DecodeFailure::MalformedPayload { .. })
        ));
        assert!(matches!(
            parse_payload("\"ok\""),
            Err(DecodeFailure::MalformedPayload { .. })
        ));
        assert!(parse_payload("[]").is_ok());
    }

    #[test]
    fn test_decode_dispatches_on_shape() {
        let raw = json!({"data": {"liked": true, "_id": "w1"}});
        let decoded = decode(&raw, ResourceShape::WishlistToggleResult).expect("decodes");
        assert!(matches!(
            decoded,
            CanonicalResource::WishlistToggleResult(WishlistToggleResult {
                is_favorite: true,
                ..
            })
        ));
    }

    #[test]
    fn test_page_without_list_is_empty_and_terminal() {
        let page: Page<Thread> = decode_page(&json!({"ok": true})).expect("page");
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn test_page_skips_bad_items() {
        let raw = json!({"threads": [{"_id": "t1"}, {"title": "no id"}, "junk", {"id": "t2"}]});
        let page: Page<Thread> = decode_page(&raw).expect("page");
        let ids: Vec<_> = page.items.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn test_single_missing_id_is_item_skipped() {
        let raw = json!({"data": {"title": "Loft"}});
        let err = decode(&raw, ResourceShape::ListingDetail).unwrap_err();
        assert!(err.is_item_level());
    }

    #[test]
    fn test_success_envelope() {
        assert!(ensure_success_envelope(&json!({"success": true, "data": []})).is_ok());
        assert!(ensure_success_envelope(&json!([1])).is_ok());

        let err = ensure_success_envelope(&json!({
            "success": false,
            "code": 422,
            "message": "Card declined"
        }))
        .unwrap_err();
        assert_eq!(
            err,
            ApiError::ServerError {
                code: 422,
                message: "Card declined".into()
            }
        );

        let err = ensure_success_envelope(&json!({"status": "error"})).unwrap_err();
        assert_eq!(err.status_code(), Some(500));
    }
}
