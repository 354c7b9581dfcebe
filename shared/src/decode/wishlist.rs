use serde_json::Value;
use tracing::warn;

use super::{
    decode_items, locate_list, locate_object, missing, parse_payload, Decode, Fields, RawPayload,
    ResourceShape,
};
use crate::error::DecodeFailure;
use crate::model::{ListingId, Page, WishlistItem, WishlistItemId, WishlistToggleResult};

/// Keys under which a wishlist groups its saved listings.
const GROUP_KEYS: &[&str] = &["properties", "items", "listings"];
const LIST_KEYS: &[&str] = &["items", "wishlists", "wishlist", "favorites"];

impl Decode for WishlistItem {
    const SHAPE: ResourceShape = ResourceShape::WishlistItem;

    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        let id = f
            .string(&["_id", "id", "wishlistItemId"])
            .ok_or_else(|| missing(Self::SHAPE, "id"))?;
        let listing = f.object(&["listing", "property", "item"]);
        let listing_id = f
            .string(&["listingId", "listing_id", "propertyId", "property_id"])
            .or_else(|| listing.and_then(|l| l.string(&["_id", "id"])))
            .unwrap_or_else(|| id.clone());
        let source = listing.unwrap_or(f);

        Ok(Self {
            id: WishlistItemId(id),
            listing_id: ListingId(listing_id),
            title: source
                .string(&["title", "name"])
                .or_else(|| f.string(&["title", "name"]))
                .unwrap_or_default(),
            image_url: source
                .string(&["image", "imageUrl", "thumbnail", "coverImage"])
                .or_else(|| source.strings(&["images", "gallery"]).into_iter().next()),
            price: source.double(&["price", "basePrice", "base_price", "hourlyFrom"]),
            location: source
                .string(&["location", "city", "address"])
                .or_else(|| source.object(&["location"]).and_then(|l| l.string(&["city"]))),
            rating: source.double(&["rating", "averageRating"]),
        })
    }
}

impl Decode for WishlistToggleResult {
    const SHAPE: ResourceShape = ResourceShape::WishlistToggleResult;

    /// Never skips. A response with no flag reads as "now favourited".
    fn decode_item(f: Fields<'_>) -> Result<Self, DecodeFailure> {
        Ok(read_toggle(f, true))
    }
}

fn read_toggle(f: Fields<'_>, requested: bool) -> WishlistToggleResult {
    let is_favorite = f
        .boolean(&["liked", "isFavorite", "is_favorite", "isLiked", "favorited"])
        .unwrap_or(requested);
    let wishlist_item_id = f
        .string(&["_id", "id", "wishlistId", "wishlistItemId"])
        .or_else(|| {
            f.object(&["wishlist", "item"])
                .and_then(|w| w.string(&["_id", "id"]))
        })
        .map(WishlistItemId);
    WishlistToggleResult {
        is_favorite,
        wishlist_item_id,
    }
}

/// Reads an add/remove/toggle response against the state that was asked for.
/// Bodies that are empty or not JSON objects confirm `requested` with no item id.
pub fn decode_toggle_result(body: &str, requested: bool) -> WishlistToggleResult {
    let raw = parse_payload(body).ok();
    match raw
        .as_ref()
        .and_then(|r| locate_object(r, WishlistToggleResult::SHAPE.object_keys()))
    {
        Some(obj) => read_toggle(Fields::new(obj), requested),
        None => WishlistToggleResult {
            is_favorite: requested,
            wishlist_item_id: None,
        },
    }
}

/// Wishlist listing. Groups carrying `properties`/`items`/`listings` are flattened
/// into their saved entries; anything else is read as an entry itself.
pub fn decode_wishlist(raw: &RawPayload) -> Result<Page<WishlistItem>, DecodeFailure> {
    if !(raw.is_object() || raw.is_array()) {
        return Err(DecodeFailure::malformed("wishlist payload is not an object or array"));
    }
    let Some(location) = locate_list(raw, LIST_KEYS) else {
        warn!("no wishlist array in payload");
        return Ok(Page::terminal(Vec::new()));
    };

    let mut flattened: Vec<Value> = Vec::with_capacity(location.items.len());
    for entry in location.items {
        let group = entry
            .as_object()
            .and_then(|obj| Fields::new(obj).array(GROUP_KEYS));
        match group {
            Some(children) => flattened.extend(children.iter().cloned()),
            None => flattened.push(entry.clone()),
        }
    }
    Ok(Page::terminal(decode_items(&flattened)))
}
